//! Role management handlers.
//!
//! Permission id lists replace a role's grants wholesale; unknown ids reject
//! the whole request.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{ApiResponse, CreateRoleRequest, UpdateRoleRequest};
use crate::models::{NewRole, RoleChanges, RoleWithPermissions};
use crate::utils::ValidatedJson;
use crate::AppState;

/// GET /roles
pub async fn list_roles(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<RoleWithPermissions>>>, AppError> {
    let roles = state.role_service.list().await?;
    Ok(Json(ApiResponse::ok("Roles retrieved successfully", roles)))
}

/// GET /roles/:id
pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RoleWithPermissions>>, AppError> {
    let role = state.role_service.get(id).await?;
    Ok(Json(ApiResponse::ok("Role retrieved successfully", role)))
}

/// POST /roles
pub async fn create_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RoleWithPermissions>>), AppError> {
    let role = state
        .role_service
        .create(
            NewRole {
                name: req.name,
                description: req.description,
            },
            req.permission_ids,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Role created successfully", role)),
    ))
}

/// PUT /roles/:id
pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<RoleWithPermissions>>, AppError> {
    let role = state
        .role_service
        .update(
            id,
            RoleChanges {
                name: req.name,
                description: req.description,
            },
            req.permission_ids,
        )
        .await?;

    Ok(Json(ApiResponse::ok("Role updated successfully", role)))
}

/// DELETE /roles/:id
pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.role_service.delete(id).await?;
    Ok(Json(ApiResponse::message("Role deleted successfully")))
}
