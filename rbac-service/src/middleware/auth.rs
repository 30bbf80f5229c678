use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::Identity;
use crate::services::{RequestGate, Requirement, ServiceError};

/// Gate plus the requirement of the route it guards.
#[derive(Clone)]
pub struct RouteGuard {
    pub gate: RequestGate,
    pub requirement: Requirement,
}

/// Middleware to require an identity that satisfies the route's requirement
pub async fn auth_middleware(
    State(guard): State<RouteGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = guard
        .gate
        .admit(req.headers(), &guard.requirement)
        .await
        .map_err(|rejection| AppError::from(ServiceError::from(rejection)))?;

    // Handlers read the principal from extensions
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Extractor to get the resolved identity in handlers
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extensions.get::<Identity>().ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("User not authenticated"))
        })?;

        Ok(AuthUser(identity.clone()))
    }
}
