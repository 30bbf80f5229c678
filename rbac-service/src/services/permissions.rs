use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::store::CredentialStore;
use crate::models::{
    with_children, NewPermission, Permission, PermissionChanges, PermissionWithChildren,
};

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn CredentialStore>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<PermissionWithChildren>, ServiceError> {
        Ok(with_children(self.store.list_permissions().await?))
    }

    pub async fn get(&self, id: Uuid) -> Result<PermissionWithChildren, ServiceError> {
        with_children(self.store.list_permissions().await?)
            .into_iter()
            .find(|p| p.permission.id == id)
            .ok_or(ServiceError::NotFound("Permission"))
    }

    pub async fn create(&self, permission: NewPermission) -> Result<Permission, ServiceError> {
        let created = self.store.create_permission(permission).await?;
        tracing::info!(
            permission_id = %created.id,
            permission = %created.name,
            parent_id = ?created.parent_id,
            "Permission created"
        );
        Ok(created)
    }

    /// Re-parenting is refused when the new parent is missing or sits below
    /// the permission itself. The store checks this inside the write.
    pub async fn update(&self, id: Uuid, changes: PermissionChanges) -> Result<Permission, ServiceError> {
        let updated = self
            .store
            .update_permission(id, changes)
            .await?
            .ok_or(ServiceError::NotFound("Permission"))?;
        tracing::info!(permission_id = %id, parent_id = ?updated.parent_id, "Permission updated");
        Ok(updated)
    }

    /// Grants of the permission go with it; its children move to the root.
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_permission(id).await? {
            return Err(ServiceError::NotFound("Permission"));
        }
        tracing::info!(permission_id = %id, "Permission deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;

    fn new_permission(name: &str, parent_id: Option<Uuid>) -> NewPermission {
        NewPermission {
            name: name.to_string(),
            description: None,
            parent_id,
        }
    }

    #[tokio::test]
    async fn create_rejects_missing_parent() {
        let service = PermissionService::new(Arc::new(MemoryStore::new()));
        let err = service
            .create(new_permission("users:read", Some(Uuid::new_v4())))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn update_rejects_cycles() {
        let service = PermissionService::new(Arc::new(MemoryStore::new()));
        let users = service.create(new_permission("users", None)).await.unwrap();
        let read = service.create(new_permission("users:read", Some(users.id))).await.unwrap();

        let err = service
            .update(
                users.id,
                PermissionChanges {
                    parent_id: Some(Some(read.id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("cycle")));

        let err = service
            .update(
                users.id,
                PermissionChanges {
                    parent_id: Some(Some(users.id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_swaps_keep_the_tree_acyclic() {
        let service = PermissionService::new(Arc::new(MemoryStore::new()));
        let a = service.create(new_permission("billing", None)).await.unwrap();
        let b = service.create(new_permission("reports", None)).await.unwrap();

        let swap = |id: Uuid, parent: Uuid| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .update(
                        id,
                        PermissionChanges {
                            parent_id: Some(Some(parent)),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };
        let first = swap(a.id, b.id);
        let second = swap(b.id, a.id);
        let (first, second) = (first.await.unwrap(), second.await.unwrap());

        assert!(first.is_ok() ^ second.is_ok());
        let a = service.get(a.id).await.unwrap().permission;
        let b = service.get(b.id).await.unwrap().permission;
        assert!(a.parent_id.is_none() || b.parent_id.is_none());
    }

    #[tokio::test]
    async fn detaching_to_root_is_allowed() {
        let service = PermissionService::new(Arc::new(MemoryStore::new()));
        let users = service.create(new_permission("users", None)).await.unwrap();
        let read = service.create(new_permission("users:read", Some(users.id))).await.unwrap();

        let updated = service
            .update(
                read.id,
                PermissionChanges {
                    parent_id: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.parent_id, None);
    }

    #[tokio::test]
    async fn get_includes_children() {
        let service = PermissionService::new(Arc::new(MemoryStore::new()));
        let users = service.create(new_permission("users", None)).await.unwrap();
        service.create(new_permission("users:read", Some(users.id))).await.unwrap();

        let fetched = service.get(users.id).await.unwrap();
        assert_eq!(fetched.children.len(), 1);
        assert_eq!(fetched.children[0].name, "users:read");

        assert!(matches!(
            service.get(Uuid::new_v4()).await.unwrap_err(),
            ServiceError::NotFound("Permission")
        ));
    }
}
