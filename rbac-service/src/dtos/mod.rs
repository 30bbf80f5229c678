//! Request bodies and the success envelope shared by every handler.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Role, User, UserWithRoles};

/// `{ "success": true, "message": ..., "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    pub firstname: Option<String>,
    pub lastname: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    pub mobile: Option<String>,

    #[serde(default, alias = "roleIds")]
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserWithRoles,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Profile view: the account plus role names and descriptions.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<Role>,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Username must not be empty"))]
    pub username: Option<String>,

    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: Option<String>,

    pub firstname: Option<String>,
    pub lastname: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    pub mobile: Option<String>,

    #[serde(default, alias = "roleIds")]
    pub role_ids: Option<Vec<Uuid>>,
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[serde(alias = "role_name")]
    #[validate(length(min = 1, max = 255, message = "Role name is required"))]
    pub name: String,

    #[serde(alias = "role_desc")]
    pub description: Option<String>,

    #[serde(default, alias = "permissionIds")]
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[serde(alias = "role_name")]
    #[validate(length(min = 1, max = 255, message = "Role name must not be empty"))]
    pub name: Option<String>,

    #[serde(alias = "role_desc")]
    pub description: Option<String>,

    #[serde(default, alias = "permissionIds")]
    pub permission_ids: Option<Vec<Uuid>>,
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePermissionRequest {
    #[serde(alias = "perm_name")]
    #[validate(length(min = 1, max = 255, message = "Permission name is required"))]
    pub name: String,

    #[serde(alias = "perm_desc")]
    pub description: Option<String>,

    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePermissionRequest {
    #[serde(alias = "perm_name")]
    #[validate(length(min = 1, max = 255, message = "Permission name must not be empty"))]
    pub name: Option<String>,

    #[serde(alias = "perm_desc")]
    pub description: Option<String>,

    /// Absent leaves the parent alone; `null` moves the permission to the root.
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_id_null_differs_from_absent() {
        let absent: UpdatePermissionRequest = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let null: UpdatePermissionRequest = serde_json::from_str(r#"{"parent_id":null}"#).unwrap();
        assert_eq!(null.parent_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdatePermissionRequest =
            serde_json::from_str(&format!(r#"{{"parent_id":"{}"}}"#, id)).unwrap();
        assert_eq!(set.parent_id, Some(Some(id)));
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let role: CreateRoleRequest =
            serde_json::from_str(r#"{"role_name":"editor","role_desc":"Edits","permissionIds":[]}"#)
                .unwrap();
        assert_eq!(role.name, "editor");
        assert_eq!(role.description.as_deref(), Some("Edits"));

        let register: RegisterRequest =
            serde_json::from_str(r#"{"username":"alice","password":"secret123"}"#).unwrap();
        assert!(register.role_ids.is_empty());
        assert!(register.validate().is_ok());
    }

    #[test]
    fn empty_credentials_fail_validation() {
        let login: LoginRequest = serde_json::from_str(r#"{"username":"","password":""}"#).unwrap();
        assert!(login.validate().is_err());
    }

    #[test]
    fn envelope_omits_missing_data() {
        let body = serde_json::to_value(ApiResponse::message("Role deleted successfully")).unwrap();
        assert_eq!(body["success"], true);
        assert!(body.get("data").is_none());
    }
}
