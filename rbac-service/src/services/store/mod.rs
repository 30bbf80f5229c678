//! Credential store - durable users, roles, permissions and their associations.
//!
//! Lookups that find nothing return `Ok(None)` / `Ok(false)`; `Err` always means
//! the write was refused or the backend failed. Writes that touch an
//! association set (user roles, role permissions) are all-or-nothing: the
//! entity row and the replacement set land together or not at all.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    NewPermission, NewRole, NewUser, Permission, PermissionChanges, Role, RoleChanges,
    RoleWithPermissions, TreeError, User, UserAccess, UserChanges, UserCredentials,
    UserWithRoles,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint hit (username, role name, permission name)
    #[error("{0} already exists")]
    Conflict(String),

    /// An id in an association list or a parent id does not exist
    #[error("Unknown {0}")]
    InvalidReference(String),

    /// Parent assignment refused; checked under the same lock as the write
    #[error("{0}")]
    Hierarchy(#[from] TreeError),

    #[error("Store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// User plus stored password hash; only the login path asks for this.
    async fn find_credentials(&self, username: &str) -> StoreResult<Option<UserCredentials>>;
    async fn find_user_with_roles(&self, id: Uuid) -> StoreResult<Option<UserWithRoles>>;
    /// User with every held role and each role's permissions.
    async fn find_user_with_access(&self, id: Uuid) -> StoreResult<Option<UserAccess>>;
    async fn list_users(&self) -> StoreResult<Vec<UserWithRoles>>;
    async fn create_user(&self, user: NewUser, role_ids: Vec<Uuid>) -> StoreResult<UserWithRoles>;
    /// `role_ids: Some(..)` replaces the held set; `None` leaves it alone.
    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
        role_ids: Option<Vec<Uuid>>,
    ) -> StoreResult<Option<UserWithRoles>>;
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    async fn find_role_by_id(&self, id: Uuid) -> StoreResult<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    async fn find_role_with_permissions(&self, id: Uuid) -> StoreResult<Option<RoleWithPermissions>>;
    async fn list_roles(&self) -> StoreResult<Vec<RoleWithPermissions>>;
    async fn create_role(
        &self,
        role: NewRole,
        permission_ids: Vec<Uuid>,
    ) -> StoreResult<RoleWithPermissions>;
    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
        permission_ids: Option<Vec<Uuid>>,
    ) -> StoreResult<Option<RoleWithPermissions>>;
    /// Removes the role and its assignments and grants; users and permissions stay.
    async fn delete_role(&self, id: Uuid) -> StoreResult<bool>;

    async fn find_permission_by_id(&self, id: Uuid) -> StoreResult<Option<Permission>>;
    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>>;
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;
    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission>;
    async fn update_permission(
        &self,
        id: Uuid,
        changes: PermissionChanges,
    ) -> StoreResult<Option<Permission>>;
    /// Removes the permission and its grants; direct children move to the root.
    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool>;
}

/// Drop repeated ids while keeping first-seen order.
pub(crate) fn dedup_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
