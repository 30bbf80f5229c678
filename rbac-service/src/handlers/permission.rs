use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{ApiResponse, CreatePermissionRequest, UpdatePermissionRequest};
use crate::models::{NewPermission, Permission, PermissionChanges, PermissionWithChildren};
use crate::utils::ValidatedJson;
use crate::AppState;

/// GET /permissions
pub async fn list_permissions(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PermissionWithChildren>>>, AppError> {
    let permissions = state.permission_service.list().await?;
    Ok(Json(ApiResponse::ok(
        "Permissions retrieved successfully",
        permissions,
    )))
}

/// GET /permissions/:id
pub async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PermissionWithChildren>>, AppError> {
    let permission = state.permission_service.get(id).await?;
    Ok(Json(ApiResponse::ok(
        "Permission retrieved successfully",
        permission,
    )))
}

/// POST /permissions
pub async fn create_permission(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Permission>>), AppError> {
    let permission = state
        .permission_service
        .create(NewPermission {
            name: req.name,
            description: req.description,
            parent_id: req.parent_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Permission created successfully", permission)),
    ))
}

/// PUT /permissions/:id
pub async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdatePermissionRequest>,
) -> Result<Json<ApiResponse<Permission>>, AppError> {
    let permission = state
        .permission_service
        .update(
            id,
            PermissionChanges {
                name: req.name,
                description: req.description,
                parent_id: req.parent_id,
            },
        )
        .await?;

    Ok(Json(ApiResponse::ok(
        "Permission updated successfully",
        permission,
    )))
}

/// DELETE /permissions/:id
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.permission_service.delete(id).await?;
    Ok(Json(ApiResponse::message("Permission deleted successfully")))
}
