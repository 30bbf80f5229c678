use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{dedup_ids, CredentialStore, StoreError, StoreResult};
use crate::models::{
    NewPermission, NewRole, NewUser, Permission, PermissionChanges, PermissionTree, Role,
    RoleChanges, RoleWithPermissions, User, UserAccess, UserChanges, UserCredentials,
    UserWithRoles,
};

/// In-process credential store for tests and the `memory` backend.
///
/// One lock guards every table. Writes validate all references before the
/// first mutation, so a refused write leaves nothing behind.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserCredentials>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    /// (user_id, role_id)
    user_roles: BTreeSet<(Uuid, Uuid)>,
    /// (role_id, permission_id)
    role_permissions: BTreeSet<(Uuid, Uuid)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn roles_of(&self, user_id: Uuid) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .user_roles
            .range((user_id, Uuid::nil())..=(user_id, Uuid::from_u128(u128::MAX)))
            .filter_map(|(_, role_id)| self.roles.get(role_id).cloned())
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    fn permissions_of(&self, role_id: Uuid) -> Vec<Permission> {
        let mut permissions: Vec<Permission> = self
            .role_permissions
            .range((role_id, Uuid::nil())..=(role_id, Uuid::from_u128(u128::MAX)))
            .filter_map(|(_, permission_id)| self.permissions.get(permission_id).cloned())
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        permissions
    }

    fn user_with_roles(&self, user: &User) -> UserWithRoles {
        UserWithRoles {
            user: user.clone(),
            roles: self.roles_of(user.id),
        }
    }

    fn role_with_permissions(&self, role: &Role) -> RoleWithPermissions {
        RoleWithPermissions {
            role: role.clone(),
            permissions: self.permissions_of(role.id),
        }
    }

    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|c| c.user.username == username && Some(c.user.id) != except)
    }

    fn role_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.roles
            .values()
            .any(|r| r.name == name && Some(r.id) != except)
    }

    fn permission_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.permissions
            .values()
            .any(|p| p.name == name && Some(p.id) != except)
    }

    fn check_roles_exist(&self, role_ids: &[Uuid]) -> StoreResult<()> {
        match role_ids.iter().find(|id| !self.roles.contains_key(id)) {
            Some(missing) => Err(StoreError::InvalidReference(format!("role {}", missing))),
            None => Ok(()),
        }
    }

    fn check_permissions_exist(&self, permission_ids: &[Uuid]) -> StoreResult<()> {
        match permission_ids.iter().find(|id| !self.permissions.contains_key(id)) {
            Some(missing) => Err(StoreError::InvalidReference(format!("permission {}", missing))),
            None => Ok(()),
        }
    }

    fn replace_user_roles(&mut self, user_id: Uuid, role_ids: Vec<Uuid>) {
        self.user_roles.retain(|(u, _)| *u != user_id);
        self.user_roles
            .extend(role_ids.into_iter().map(|role_id| (user_id, role_id)));
    }

    fn replace_role_permissions(&mut self, role_id: Uuid, permission_ids: Vec<Uuid>) {
        self.role_permissions.retain(|(r, _)| *r != role_id);
        self.role_permissions
            .extend(permission_ids.into_iter().map(|p| (role_id, p)));
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|c| c.user.clone()))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|c| c.user.username == username)
            .map(|c| c.user.clone()))
    }

    async fn find_credentials(&self, username: &str) -> StoreResult<Option<UserCredentials>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|c| c.user.username == username)
            .cloned())
    }

    async fn find_user_with_roles(&self, id: Uuid) -> StoreResult<Option<UserWithRoles>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|c| state.user_with_roles(&c.user)))
    }

    async fn find_user_with_access(&self, id: Uuid) -> StoreResult<Option<UserAccess>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|c| UserAccess {
            user: c.user.clone(),
            roles: state
                .roles_of(id)
                .iter()
                .map(|role| state.role_with_permissions(role))
                .collect(),
        }))
    }

    async fn list_users(&self) -> StoreResult<Vec<UserWithRoles>> {
        let state = self.state.read().await;
        let mut users: Vec<&User> = state.users.values().map(|c| &c.user).collect();
        users.sort_by(|a, b| (a.created_at, &a.username).cmp(&(b.created_at, &b.username)));
        Ok(users.into_iter().map(|u| state.user_with_roles(u)).collect())
    }

    async fn create_user(&self, user: NewUser, role_ids: Vec<Uuid>) -> StoreResult<UserWithRoles> {
        let role_ids = dedup_ids(role_ids);
        let mut state = self.state.write().await;

        if state.username_taken(&user.username, None) {
            return Err(StoreError::Conflict(format!("Username '{}'", user.username)));
        }
        state.check_roles_exist(&role_ids)?;

        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            firstname: user.firstname,
            lastname: user.lastname,
            email: user.email,
            mobile: user.mobile,
            created_at: now,
            updated_at: now,
        };
        let id = record.id;

        state.users.insert(
            id,
            UserCredentials {
                user: record.clone(),
                password_hash: user.password_hash,
            },
        );
        state.replace_user_roles(id, role_ids);

        Ok(state.user_with_roles(&record))
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
        role_ids: Option<Vec<Uuid>>,
    ) -> StoreResult<Option<UserWithRoles>> {
        let role_ids = role_ids.map(dedup_ids);
        let mut state = self.state.write().await;

        if !state.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(username) = &changes.username {
            if state.username_taken(username, Some(id)) {
                return Err(StoreError::Conflict(format!("Username '{}'", username)));
            }
        }
        if let Some(role_ids) = &role_ids {
            state.check_roles_exist(role_ids)?;
        }

        let Some(stored) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(&mut stored.user);
        if let Some(hash) = changes.password_hash {
            stored.password_hash = hash;
        }
        stored.user.updated_at = Utc::now();
        let user = stored.user.clone();

        if let Some(role_ids) = role_ids {
            state.replace_user_roles(id, role_ids);
        }

        Ok(Some(state.user_with_roles(&user)))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.user_roles.retain(|(u, _)| *u != id);
        Ok(true)
    }

    async fn find_role_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    async fn find_role_with_permissions(&self, id: Uuid) -> StoreResult<Option<RoleWithPermissions>> {
        let state = self.state.read().await;
        Ok(state.roles.get(&id).map(|r| state.role_with_permissions(r)))
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleWithPermissions>> {
        let state = self.state.read().await;
        let mut roles: Vec<&Role> = state.roles.values().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles.into_iter().map(|r| state.role_with_permissions(r)).collect())
    }

    async fn create_role(
        &self,
        role: NewRole,
        permission_ids: Vec<Uuid>,
    ) -> StoreResult<RoleWithPermissions> {
        let permission_ids = dedup_ids(permission_ids);
        let mut state = self.state.write().await;

        if state.role_name_taken(&role.name, None) {
            return Err(StoreError::Conflict(format!("Role '{}'", role.name)));
        }
        state.check_permissions_exist(&permission_ids)?;

        let now = Utc::now();
        let record = Role {
            id: Uuid::new_v4(),
            name: role.name,
            description: role.description,
            created_at: now,
            updated_at: now,
        };
        state.roles.insert(record.id, record.clone());
        state.replace_role_permissions(record.id, permission_ids);

        Ok(state.role_with_permissions(&record))
    }

    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
        permission_ids: Option<Vec<Uuid>>,
    ) -> StoreResult<Option<RoleWithPermissions>> {
        let permission_ids = permission_ids.map(dedup_ids);
        let mut state = self.state.write().await;

        if !state.roles.contains_key(&id) {
            return Ok(None);
        }
        if let Some(name) = &changes.name {
            if state.role_name_taken(name, Some(id)) {
                return Err(StoreError::Conflict(format!("Role '{}'", name)));
            }
        }
        if let Some(permission_ids) = &permission_ids {
            state.check_permissions_exist(permission_ids)?;
        }

        let Some(role) = state.roles.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(role);
        role.updated_at = Utc::now();
        let role = role.clone();

        if let Some(permission_ids) = permission_ids {
            state.replace_role_permissions(id, permission_ids);
        }

        Ok(Some(state.role_with_permissions(&role)))
    }

    async fn delete_role(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.roles.remove(&id).is_none() {
            return Ok(false);
        }
        state.user_roles.retain(|(_, r)| *r != id);
        state.role_permissions.retain(|(r, _)| *r != id);
        Ok(true)
    }

    async fn find_permission_by_id(&self, id: Uuid) -> StoreResult<Option<Permission>> {
        let state = self.state.read().await;
        Ok(state.permissions.get(&id).cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        let state = self.state.read().await;
        Ok(state.permissions.values().find(|p| p.name == name).cloned())
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        let mut state = self.state.write().await;

        if state.permission_name_taken(&permission.name, None) {
            return Err(StoreError::Conflict(format!("Permission '{}'", permission.name)));
        }
        PermissionTree::new(state.permissions.values())
            .check_parent(None, permission.parent_id)?;

        let now = Utc::now();
        let record = Permission {
            id: Uuid::new_v4(),
            name: permission.name,
            description: permission.description,
            parent_id: permission.parent_id,
            created_at: now,
            updated_at: now,
        };
        state.permissions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_permission(
        &self,
        id: Uuid,
        changes: PermissionChanges,
    ) -> StoreResult<Option<Permission>> {
        let mut state = self.state.write().await;

        if !state.permissions.contains_key(&id) {
            return Ok(None);
        }
        if let Some(name) = &changes.name {
            if state.permission_name_taken(name, Some(id)) {
                return Err(StoreError::Conflict(format!("Permission '{}'", name)));
            }
        }
        if let Some(parent) = changes.parent_id {
            PermissionTree::new(state.permissions.values()).check_parent(Some(id), parent)?;
        }

        let Some(permission) = state.permissions.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(permission);
        permission.updated_at = Utc::now();
        Ok(Some(permission.clone()))
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.permissions.remove(&id).is_none() {
            return Ok(false);
        }
        state.role_permissions.retain(|(_, p)| *p != id);

        let now = Utc::now();
        for child in state.permissions.values_mut() {
            if child.parent_id == Some(id) {
                child.parent_id = None;
                child.updated_at = now;
            }
        }
        Ok(true)
    }
}
