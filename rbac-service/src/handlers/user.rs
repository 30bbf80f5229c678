use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{ApiResponse, UpdateUserRequest};
use crate::middleware::AuthUser;
use crate::models::UserWithRoles;
use crate::services::UserUpdate;
use crate::utils::{Password, ValidatedJson};
use crate::AppState;

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UserWithRoles>>>, AppError> {
    let users = state.user_service.list().await?;
    Ok(Json(ApiResponse::ok("Users retrieved successfully", users)))
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserWithRoles>>, AppError> {
    let user = state.user_service.get(id).await?;
    Ok(Json(ApiResponse::ok("User retrieved successfully", user)))
}

/// PUT /users/:id
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserWithRoles>>, AppError> {
    tracing::info!(
        caller_id = %caller.user.id,
        user_id = %id,
        replaces_roles = req.role_ids.is_some(),
        "Updating user"
    );

    let user = state
        .user_service
        .update(
            id,
            UserUpdate {
                username: req.username,
                password: req.password.map(Password::new),
                firstname: req.firstname,
                lastname: req.lastname,
                email: req.email,
                mobile: req.mobile,
                role_ids: req.role_ids,
            },
        )
        .await?;

    Ok(Json(ApiResponse::ok("User updated successfully", user)))
}

/// DELETE /users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    tracing::info!(caller_id = %caller.user.id, user_id = %id, "Deleting user");
    state.user_service.delete(id).await?;
    Ok(Json(ApiResponse::message("User deleted successfully")))
}
