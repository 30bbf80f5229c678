//! Permission model - named capabilities arranged in an optional parent tree.
//!
//! The tree is kept as an arena keyed by permission id; parents are plain ids,
//! never owned pointers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Permission entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

/// Partial update. `parent_id: Some(None)` detaches the permission to the root.
#[derive(Debug, Clone, Default)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Option<Uuid>>,
}

impl PermissionChanges {
    pub fn apply_to(&self, permission: &mut Permission) {
        if let Some(name) = &self.name {
            permission.name = name.clone();
        }
        if let Some(description) = &self.description {
            permission.description = Some(description.clone());
        }
        if let Some(parent_id) = self.parent_id {
            permission.parent_id = parent_id;
        }
    }
}

/// Compact child entry embedded in permission responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl From<&Permission> for PermissionSummary {
    fn from(p: &Permission) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            description: p.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionWithChildren {
    #[serde(flatten)]
    pub permission: Permission,
    pub children: Vec<PermissionSummary>,
}

/// Why a parent assignment was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    MissingParent(Uuid),
    Cycle,
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::MissingParent(id) => write!(f, "Parent permission {} does not exist", id),
            TreeError::Cycle => write!(f, "Parent assignment would create a cycle"),
        }
    }
}

impl std::error::Error for TreeError {}

/// Arena view of the permission tree: id -> parent id.
#[derive(Debug, Clone, Default)]
pub struct PermissionTree {
    parents: HashMap<Uuid, Option<Uuid>>,
}

impl PermissionTree {
    pub fn new<'a>(permissions: impl IntoIterator<Item = &'a Permission>) -> Self {
        Self::from_links(permissions.into_iter().map(|p| (p.id, p.parent_id)))
    }

    /// Build from `(id, parent_id)` pairs, e.g. an ancestor chain read from the database.
    pub fn from_links(links: impl IntoIterator<Item = (Uuid, Option<Uuid>)>) -> Self {
        Self {
            parents: links.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.parents.contains_key(&id)
    }

    /// Check that `node` (absent for an insert) may hang under `parent`.
    ///
    /// Walks the chain upward from `parent`; reaching `node` is a cycle. The walk
    /// is bounded by the arena size so a pre-existing loop cannot spin forever.
    pub fn check_parent(&self, node: Option<Uuid>, parent: Option<Uuid>) -> Result<(), TreeError> {
        let Some(parent) = parent else {
            return Ok(());
        };
        if !self.contains(parent) {
            return Err(TreeError::MissingParent(parent));
        }

        let mut cursor = Some(parent);
        let mut steps = 0usize;
        while let Some(current) = cursor {
            if Some(current) == node {
                return Err(TreeError::Cycle);
            }
            steps += 1;
            if steps > self.parents.len() {
                return Err(TreeError::Cycle);
            }
            cursor = self.parents.get(&current).copied().flatten();
        }
        Ok(())
    }
}

/// Attach direct children to each permission, preserving input order.
pub fn with_children(permissions: Vec<Permission>) -> Vec<PermissionWithChildren> {
    let mut children: HashMap<Uuid, Vec<PermissionSummary>> = HashMap::new();
    for p in &permissions {
        if let Some(parent) = p.parent_id {
            children.entry(parent).or_default().push(PermissionSummary::from(p));
        }
    }

    permissions
        .into_iter()
        .map(|permission| PermissionWithChildren {
            children: children.remove(&permission.id).unwrap_or_default(),
            permission,
        })
        .collect()
}
