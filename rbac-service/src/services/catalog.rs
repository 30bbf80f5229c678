//! Startup checks and optional seeding of the role/permission catalog.

use std::collections::HashSet;
use std::sync::Arc;

use super::access::Requirement;
use super::error::ServiceError;
use super::store::{CredentialStore, StoreError};
use crate::models::{NewPermission, NewRole};
use crate::routes::{self, RoutePolicy};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
}

/// Make sure every permission the route table names exists, plus an `admin`
/// role holding all of them and the default role. Safe to run repeatedly.
pub async fn seed(
    store: &Arc<dyn CredentialStore>,
    default_role: &str,
) -> Result<SeedReport, ServiceError> {
    let mut report = SeedReport::default();
    let mut catalog_ids = Vec::new();

    for name in routes::referenced_permissions() {
        let permission = match store.find_permission_by_name(name).await? {
            Some(existing) => existing,
            None => {
                report.permissions_created += 1;
                store
                    .create_permission(NewPermission {
                        name: name.to_string(),
                        description: Some(format!("Grants {}", name)),
                        parent_id: None,
                    })
                    .await?
            }
        };
        catalog_ids.push(permission.id);
    }

    match store.find_role_by_name(ADMIN_ROLE).await? {
        Some(admin) => {
            let current = store
                .find_role_with_permissions(admin.id)
                .await?
                .map(|r| r.permissions)
                .unwrap_or_default();
            let mut grant: Vec<_> = current.iter().map(|p| p.id).collect();
            let before = grant.len();
            for id in &catalog_ids {
                if !grant.contains(id) {
                    grant.push(*id);
                }
            }
            if grant.len() != before {
                store
                    .update_role(admin.id, Default::default(), Some(grant))
                    .await?;
            }
        }
        None => {
            create_role_if_absent(store, ADMIN_ROLE, "Full administrative access", catalog_ids)
                .await?;
            report.roles_created += 1;
        }
    }

    if default_role != ADMIN_ROLE && store.find_role_by_name(default_role).await?.is_none() {
        create_role_if_absent(store, default_role, "Default role for new accounts", Vec::new())
            .await?;
        report.roles_created += 1;
    }

    tracing::info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "Access catalog seeded"
    );
    Ok(report)
}

async fn create_role_if_absent(
    store: &Arc<dyn CredentialStore>,
    name: &str,
    description: &str,
    permission_ids: Vec<uuid::Uuid>,
) -> Result<(), ServiceError> {
    let role = NewRole {
        name: name.to_string(),
        description: Some(description.to_string()),
    };
    match store.create_role(role, permission_ids).await {
        // Another instance seeded it first.
        Ok(_) | Err(StoreError::Conflict(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Findings of the route table check.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PolicyReport {
    pub unknown_permissions: Vec<&'static str>,
    pub unknown_roles: Vec<&'static str>,
}

/// Validate a route table against the store. Empty requirement sets are always
/// an error; names missing from the store are warnings unless `strict`.
pub async fn check_route_policies(
    store: &Arc<dyn CredentialStore>,
    policies: &[RoutePolicy],
    strict: bool,
) -> Result<PolicyReport, ServiceError> {
    if let Some(empty) = policies.iter().find(|p| p.requirement.is_empty_set()) {
        return Err(ServiceError::Validation(format!(
            "Route {} {} declares an empty requirement set",
            empty.method, empty.path
        )));
    }

    let known_permissions: HashSet<String> = store
        .list_permissions()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    let known_roles: HashSet<String> = store
        .list_roles()
        .await?
        .into_iter()
        .map(|r| r.role.name)
        .collect();

    let mut report = PolicyReport::default();
    for policy in policies {
        let (known, unknown) = match policy.requirement {
            Requirement::Authenticated => continue,
            Requirement::AnyRole(_) => (&known_roles, &mut report.unknown_roles),
            Requirement::AnyPermission(_) => {
                (&known_permissions, &mut report.unknown_permissions)
            }
        };
        for name in policy.requirement.names() {
            if !known.contains(*name) && !unknown.contains(name) {
                unknown.push(*name);
            }
        }
    }

    if report.unknown_permissions.is_empty() && report.unknown_roles.is_empty() {
        tracing::info!(routes = policies.len(), "Route policies validated");
        return Ok(report);
    }

    if strict {
        return Err(ServiceError::Validation(format!(
            "Route policies reference unknown names: permissions {:?}, roles {:?}",
            report.unknown_permissions, report.unknown_roles
        )));
    }

    tracing::warn!(
        unknown_permissions = ?report.unknown_permissions,
        unknown_roles = ?report.unknown_roles,
        "Route policies reference names missing from the store; those routes deny everyone until they exist"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::ROUTE_POLICIES;
    use crate::services::store::MemoryStore;
    use service_core::axum::http::Method;

    fn store() -> Arc<dyn CredentialStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = store();

        let first = seed(&store, "user").await.unwrap();
        assert_eq!(first.roles_created, 2);
        assert_eq!(first.permissions_created, routes::referenced_permissions().len());

        let second = seed(&store, "user").await.unwrap();
        assert_eq!(second, SeedReport::default());

        let admin = store.find_role_by_name(ADMIN_ROLE).await.unwrap().unwrap();
        let admin = store.find_role_with_permissions(admin.id).await.unwrap().unwrap();
        assert_eq!(admin.permissions.len(), routes::referenced_permissions().len());
    }

    #[tokio::test]
    async fn unknown_names_warn_or_fail() {
        let store = store();

        let report = check_route_policies(&store, ROUTE_POLICIES, false).await.unwrap();
        assert!(report.unknown_permissions.contains(&"users:read"));
        assert!(check_route_policies(&store, ROUTE_POLICIES, true).await.is_err());

        seed(&store, "user").await.unwrap();
        let report = check_route_policies(&store, ROUTE_POLICIES, true).await.unwrap();
        assert_eq!(report, PolicyReport::default());
    }

    #[tokio::test]
    async fn empty_requirement_set_fails_the_check() {
        let policies = [RoutePolicy {
            method: Method::GET,
            path: "/broken",
            requirement: Requirement::AnyPermission(&[]),
        }];
        assert!(matches!(
            check_route_policies(&store(), &policies, false).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
