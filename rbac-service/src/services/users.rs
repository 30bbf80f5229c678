use std::sync::Arc;
use uuid::Uuid;

use super::auth::hash_blocking;
use super::error::ServiceError;
use super::store::CredentialStore;
use crate::models::{UserChanges, UserWithRoles};
use crate::utils::{Password, PasswordHasher};

/// Partial user update as received from an administrator.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub password: Option<Password>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    /// Replaces the held role set when present.
    pub role_ids: Option<Vec<Uuid>>,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
}

impl UserService {
    pub fn new(store: Arc<dyn CredentialStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    pub async fn list(&self) -> Result<Vec<UserWithRoles>, ServiceError> {
        Ok(self.store.list_users().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<UserWithRoles, ServiceError> {
        self.store
            .find_user_with_roles(id)
            .await?
            .ok_or(ServiceError::NotFound("User"))
    }

    pub async fn update(&self, id: Uuid, update: UserUpdate) -> Result<UserWithRoles, ServiceError> {
        let password_hash = match update.password {
            Some(password) => Some(hash_blocking(&self.hasher, password).await?),
            None => None,
        };

        let changes = UserChanges {
            username: update.username,
            password_hash,
            firstname: update.firstname,
            lastname: update.lastname,
            email: update.email,
            mobile: update.mobile,
        };

        let user = self
            .store
            .update_user(id, changes, update.role_ids)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;

        tracing::info!(user_id = %id, roles = user.roles.len(), "User updated");
        Ok(user)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_user(id).await? {
            return Err(ServiceError::NotFound("User"));
        }
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }
}
