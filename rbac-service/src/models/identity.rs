//! Resolved principal for a single request.

use serde::Serialize;
use std::collections::BTreeSet;

use super::{Role, RoleWithPermissions, User};

/// User with the full two-level role/permission graph, as loaded by the store.
#[derive(Debug, Clone)]
pub struct UserAccess {
    pub user: User,
    pub roles: Vec<RoleWithPermissions>,
}

/// Authenticated principal attached to the request context.
///
/// `permissions` is the flattened set of permission names reachable through
/// every held role; a name granted by several roles appears once.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub user: User,
    pub roles: Vec<Role>,
    pub permissions: BTreeSet<String>,
}

impl Identity {
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.name.as_str())
    }
}
