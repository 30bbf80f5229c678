//! Route -> requirement table. Every guarded route in the router is looked up
//! here, so this table is the single place access rules are declared.
//!
//! Paths are relative to the `/api` mount point.

use service_core::axum::http::Method;

use crate::services::Requirement;

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub method: Method,
    pub path: &'static str,
    pub requirement: Requirement,
}

const fn policy_entry(method: Method, path: &'static str, requirement: Requirement) -> RoutePolicy {
    RoutePolicy {
        method,
        path,
        requirement,
    }
}

pub static ROUTE_POLICIES: &[RoutePolicy] = &[
    policy_entry(Method::GET, "/auth/profile", Requirement::Authenticated),
    // users
    policy_entry(Method::GET, "/users", Requirement::AnyPermission(&["users:read"])),
    policy_entry(Method::GET, "/users/:id", Requirement::AnyPermission(&["users:read"])),
    policy_entry(Method::PUT, "/users/:id", Requirement::AnyPermission(&["users:update"])),
    policy_entry(
        Method::DELETE,
        "/users/:id",
        Requirement::AnyPermission(&["users:delete", "admin"]),
    ),
    // roles
    policy_entry(Method::GET, "/roles", Requirement::AnyPermission(&["roles:read"])),
    policy_entry(Method::GET, "/roles/:id", Requirement::AnyPermission(&["roles:read"])),
    policy_entry(Method::POST, "/roles", Requirement::AnyPermission(&["roles:create"])),
    policy_entry(Method::PUT, "/roles/:id", Requirement::AnyPermission(&["roles:update"])),
    policy_entry(
        Method::DELETE,
        "/roles/:id",
        Requirement::AnyPermission(&["roles:delete", "admin"]),
    ),
    // permissions
    policy_entry(Method::GET, "/permissions", Requirement::AnyPermission(&["permissions:read"])),
    policy_entry(
        Method::GET,
        "/permissions/:id",
        Requirement::AnyPermission(&["permissions:read"]),
    ),
    policy_entry(
        Method::POST,
        "/permissions",
        Requirement::AnyPermission(&["permissions:create"]),
    ),
    policy_entry(
        Method::PUT,
        "/permissions/:id",
        Requirement::AnyPermission(&["permissions:update"]),
    ),
    policy_entry(
        Method::DELETE,
        "/permissions/:id",
        Requirement::AnyPermission(&["permissions:delete", "admin"]),
    ),
];

/// Requirement declared for `method path`, if the route is guarded.
pub fn policy(method: &Method, path: &str) -> Option<Requirement> {
    ROUTE_POLICIES
        .iter()
        .find(|p| p.method == *method && p.path == path)
        .map(|p| p.requirement)
}

/// Every permission name the table refers to, sorted and deduplicated.
pub fn referenced_permissions() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ROUTE_POLICIES
        .iter()
        .filter(|p| matches!(p.requirement, Requirement::AnyPermission(_)))
        .flat_map(|p| p.requirement.names().iter().copied())
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Every role name the table refers to.
pub fn referenced_roles() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ROUTE_POLICIES
        .iter()
        .filter(|p| matches!(p.requirement, Requirement::AnyRole(_)))
        .flat_map(|p| p.requirement.names().iter().copied())
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_policy_has_an_empty_requirement_set() {
        assert!(ROUTE_POLICIES.iter().all(|p| !p.requirement.is_empty_set()));
    }

    #[test]
    fn each_route_is_declared_once() {
        for (i, a) in ROUTE_POLICIES.iter().enumerate() {
            for b in &ROUTE_POLICIES[i + 1..] {
                assert!(
                    !(a.method == b.method && a.path == b.path),
                    "{} {} declared twice",
                    a.method,
                    a.path
                );
            }
        }
    }

    #[test]
    fn delete_routes_also_accept_admin() {
        assert_eq!(
            policy(&Method::DELETE, "/users/:id"),
            Some(Requirement::AnyPermission(&["users:delete", "admin"]))
        );
        assert_eq!(policy(&Method::PATCH, "/users/:id"), None);
    }

    #[test]
    fn referenced_permissions_are_deduplicated() {
        let names = referenced_permissions();
        assert!(names.contains(&"admin"));
        assert!(names.contains(&"users:read"));
        assert_eq!(names.iter().filter(|n| **n == "admin").count(), 1);
        assert!(referenced_roles().is_empty());
    }
}
