use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::config::Environment;
use crate::AppState;

async fn store_healthy(state: &AppState) -> bool {
    match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            false
        }
    }
}

fn environment_name(environment: &Environment) -> &'static str {
    match environment {
        Environment::Dev => "dev",
        Environment::Prod => "prod",
    }
}

/// GET /api/ping - liveness plus a store round-trip.
pub async fn ping(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store_healthy = store_healthy(&state).await;

    let status = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "success": store_healthy,
            "message": if store_healthy { "Service is running" } else { "Service is degraded" },
            "data": {
                "service": state.config.service_name,
                "version": state.config.service_version,
                "environment": environment_name(&state.config.environment),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "database": {
                    "connected": store_healthy,
                    "status": if store_healthy { "healthy" } else { "unhealthy" },
                },
            },
        })),
    )
}

/// GET /api/health - always 200; the store state is reported, not enforced.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let connected = store_healthy(&state).await;

    Json(json!({
        "success": true,
        "message": "Health check completed",
        "data": {
            "environment": environment_name(&state.config.environment),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "database": {
                "connected": connected,
                "message": if connected { "Connected" } else { "Not connected" },
            },
        },
    }))
}
