use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::jwt::Claims;
use super::store::{CredentialStore, StoreError};
use crate::models::{Identity, UserAccess};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("User {0} no longer exists")]
    UserNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Turns verified claims into the request principal.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn CredentialStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, claims: &Claims) -> Result<Identity, ResolveError> {
        let access = self
            .store
            .find_user_with_access(claims.id)
            .await?
            .ok_or(ResolveError::UserNotFound(claims.id))?;

        Ok(flatten(access))
    }
}

/// Collapse the role graph into role records and one deduplicated name set.
pub fn flatten(access: UserAccess) -> Identity {
    let mut permissions = BTreeSet::new();
    let mut roles = Vec::with_capacity(access.roles.len());

    for granted in access.roles {
        permissions.extend(granted.permissions.into_iter().map(|p| p.name));
        roles.push(granted.role);
    }

    Identity {
        user: access.user,
        roles,
        permissions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPermission, NewRole, NewUser};
    use crate::services::store::MemoryStore;

    async fn permission(store: &MemoryStore, name: &str) -> Uuid {
        store
            .create_permission(NewPermission {
                name: name.to_string(),
                description: None,
                parent_id: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn role(store: &MemoryStore, name: &str, permissions: Vec<Uuid>) -> Uuid {
        store
            .create_role(
                NewRole {
                    name: name.to_string(),
                    description: None,
                },
                permissions,
            )
            .await
            .unwrap()
            .role
            .id
    }

    fn claims_for(id: Uuid) -> Claims {
        Claims {
            id,
            username: "alice".to_string(),
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[tokio::test]
    async fn shared_permission_appears_once() {
        let store = Arc::new(MemoryStore::new());
        let p1 = permission(&store, "p1").await;
        let p2 = permission(&store, "p2").await;
        let a = role(&store, "A", vec![p1, p2]).await;
        let b = role(&store, "B", vec![p1]).await;
        let user = store
            .create_user(
                NewUser {
                    username: "alice".to_string(),
                    password_hash: "$argon2id$placeholder".to_string(),
                    firstname: None,
                    lastname: None,
                    email: None,
                    mobile: None,
                },
                vec![a, b],
            )
            .await
            .unwrap();

        let identity = IdentityResolver::new(store)
            .resolve(&claims_for(user.user.id))
            .await
            .unwrap();

        assert_eq!(identity.user.id, user.user.id);
        assert_eq!(identity.roles.len(), 2);
        assert_eq!(
            identity.permissions.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["p1", "p2"]
        );
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStore::new()));
        let ghost = Uuid::new_v4();

        let err = resolver.resolve(&claims_for(ghost)).await.unwrap_err();
        assert!(matches!(err, ResolveError::UserNotFound(id) if id == ghost));
    }
}
