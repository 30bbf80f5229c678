pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use service_core::axum::{
    body::Body,
    handler::Handler,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, on, post, MethodFilter, MethodRouter},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::RbacConfig;
use crate::middleware::{auth_middleware, RouteGuard};
use crate::services::{
    AuthService, CredentialStore, IdentityResolver, JwtService, PermissionService, RequestGate,
    RoleService, UserService,
};
use crate::utils::PasswordHasher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RbacConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub gate: RequestGate,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub role_service: RoleService,
    pub permission_service: PermissionService,
    pub login_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire every service against one store. Fails on unusable signing or
    /// hashing settings.
    pub fn new(config: RbacConfig, store: Arc<dyn CredentialStore>) -> Result<Self, AppError> {
        let tokens = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
        let hasher = PasswordHasher::new(&config.password)
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        let gate = RequestGate::new(tokens.clone(), IdentityResolver::new(store.clone()));
        let auth_service = AuthService::new(
            store.clone(),
            hasher.clone(),
            tokens,
            config.access.default_role.clone(),
        );

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Ok(Self {
            gate,
            auth_service,
            user_service: UserService::new(store.clone(), hasher),
            role_service: RoleService::new(store.clone()),
            permission_service: PermissionService::new(store.clone()),
            login_rate_limiter,
            ip_rate_limiter,
            store,
            config: Arc::new(config),
        })
    }
}

/// A single-method route guarded by the requirement `routes::ROUTE_POLICIES`
/// declares for it. A route missing from the table is a startup error.
fn guarded<H, T>(
    state: &AppState,
    method: Method,
    path: &'static str,
    handler: H,
) -> Result<MethodRouter<AppState>, AppError>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    let requirement = routes::policy(&method, path).ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!(
            "No access policy declared for {} {}",
            method,
            path
        ))
    })?;
    let filter = MethodFilter::try_from(method.clone()).map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Cannot route {} {}: {}", method, path, e))
    })?;

    let guard = RouteGuard {
        gate: state.gate.clone(),
        requirement,
    };

    Ok(on(filter, handler).route_layer(from_fn_with_state(guard, auth_middleware)))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed_origins.iter().filter_map(|o| {
            o.parse::<HeaderValue>()
                .inspect_err(|e| tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn route_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Route not found"))
}

/// Every endpoint is served under `/api`. Paths handed to `guarded` are the
/// ones inside the nest, matching `routes::ROUTE_POLICIES`.
pub fn build_router(state: AppState) -> Result<Router, AppError> {
    use handlers::{auth, health, permission, role, user};

    let login_route = post(auth::login).route_layer(from_fn_with_state(
        state.login_rate_limiter.clone(),
        ip_rate_limit_middleware,
    ));

    let api = Router::new()
        .route("/health", get(health::health))
        .route("/ping", get(health::ping))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", login_route)
        .route(
            "/auth/profile",
            guarded(&state, Method::GET, "/auth/profile", auth::profile)?,
        )
        // users
        .route("/users", guarded(&state, Method::GET, "/users", user::list_users)?)
        .route("/users/:id", guarded(&state, Method::GET, "/users/:id", user::get_user)?)
        .route("/users/:id", guarded(&state, Method::PUT, "/users/:id", user::update_user)?)
        .route(
            "/users/:id",
            guarded(&state, Method::DELETE, "/users/:id", user::delete_user)?,
        )
        // roles
        .route("/roles", guarded(&state, Method::GET, "/roles", role::list_roles)?)
        .route("/roles", guarded(&state, Method::POST, "/roles", role::create_role)?)
        .route("/roles/:id", guarded(&state, Method::GET, "/roles/:id", role::get_role)?)
        .route("/roles/:id", guarded(&state, Method::PUT, "/roles/:id", role::update_role)?)
        .route(
            "/roles/:id",
            guarded(&state, Method::DELETE, "/roles/:id", role::delete_role)?,
        )
        // permissions
        .route(
            "/permissions",
            guarded(&state, Method::GET, "/permissions", permission::list_permissions)?,
        )
        .route(
            "/permissions",
            guarded(&state, Method::POST, "/permissions", permission::create_permission)?,
        )
        .route(
            "/permissions/:id",
            guarded(&state, Method::GET, "/permissions/:id", permission::get_permission)?,
        )
        .route(
            "/permissions/:id",
            guarded(&state, Method::PUT, "/permissions/:id", permission::update_permission)?,
        )
        .route(
            "/permissions/:id",
            guarded(
                &state,
                Method::DELETE,
                "/permissions/:id",
                permission::delete_permission,
            )?,
        );

    let app = Router::new()
        .nest("/api", api)
        .fallback(route_not_found)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins));

    Ok(app)
}
