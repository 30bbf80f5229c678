use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::store::CredentialStore;
use crate::models::{NewRole, RoleChanges, RoleWithPermissions};

#[derive(Clone)]
pub struct RoleService {
    store: Arc<dyn CredentialStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<RoleWithPermissions>, ServiceError> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<RoleWithPermissions, ServiceError> {
        self.store
            .find_role_with_permissions(id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))
    }

    pub async fn create(
        &self,
        role: NewRole,
        permission_ids: Vec<Uuid>,
    ) -> Result<RoleWithPermissions, ServiceError> {
        let role = self.store.create_role(role, permission_ids).await?;
        tracing::info!(
            role_id = %role.role.id,
            role = %role.role.name,
            permissions = role.permissions.len(),
            "Role created"
        );
        Ok(role)
    }

    /// `permission_ids: Some(..)` replaces every grant of the role.
    pub async fn update(
        &self,
        id: Uuid,
        changes: RoleChanges,
        permission_ids: Option<Vec<Uuid>>,
    ) -> Result<RoleWithPermissions, ServiceError> {
        let role = self
            .store
            .update_role(id, changes, permission_ids)
            .await?
            .ok_or(ServiceError::NotFound("Role"))?;
        tracing::info!(role_id = %id, permissions = role.permissions.len(), "Role updated");
        Ok(role)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_role(id).await? {
            return Err(ServiceError::NotFound("Role"));
        }
        tracing::info!(role_id = %id, "Role deleted");
        Ok(())
    }
}
