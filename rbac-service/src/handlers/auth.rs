//! Registration, login and the caller's own profile.

use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::{ApiResponse, LoginRequest, LoginResponse, ProfileResponse, RegisterRequest};
use crate::middleware::AuthUser;
use crate::models::UserWithRoles;
use crate::services::Registration;
use crate::utils::{Password, ValidatedJson};
use crate::AppState;

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserWithRoles>>), AppError> {
    let user = state
        .auth_service
        .register(Registration {
            username: req.username,
            password: Password::new(req.password),
            firstname: req.firstname,
            lastname: req.lastname,
            email: req.email,
            mobile: req.mobile,
            role_ids: req.role_ids,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User registered successfully", user)),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let outcome = state
        .auth_service
        .login(&req.username, Password::new(req.password))
        .await?;

    Ok(Json(ApiResponse::ok(
        "Login successful",
        LoginResponse {
            user: outcome.user,
            token: outcome.token,
            token_type: "Bearer",
            expires_in: outcome.expires_in,
        },
    )))
}

/// GET /auth/profile
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<ApiResponse<ProfileResponse>>, AppError> {
    let profile = state.auth_service.profile(&identity);

    Ok(Json(ApiResponse::ok(
        "User profile retrieved successfully",
        ProfileResponse {
            user: profile.user,
            roles: profile.roles,
        },
    )))
}
