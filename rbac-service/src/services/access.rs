//! Access decisions over a resolved identity.
//!
//! Requirement lists use OR semantics: holding any one listed role or
//! permission is enough. Decisions are pure and never touch the store.

use crate::models::Identity;

/// What a route demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Any verified identity.
    Authenticated,
    /// At least one of the named roles.
    AnyRole(&'static [&'static str]),
    /// At least one of the named permissions.
    AnyPermission(&'static [&'static str]),
}

impl Requirement {
    /// Names this requirement refers to; empty for `Authenticated`.
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Requirement::Authenticated => &[],
            Requirement::AnyRole(names) | Requirement::AnyPermission(names) => names,
        }
    }

    /// A role or permission requirement with nothing listed can never be met.
    pub fn is_empty_set(&self) -> bool {
        !matches!(self, Requirement::Authenticated) && self.names().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden(&'static str),
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::Unauthenticated => write!(f, "User not authenticated"),
            Denial::Forbidden(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for Denial {}

pub fn has_any_role(identity: &Identity, required: &[&str]) -> bool {
    identity.role_names().any(|held| required.contains(&held))
}

pub fn has_any_permission(identity: &Identity, required: &[&str]) -> bool {
    required.iter().any(|name| identity.permissions.contains(*name))
}

/// Decide whether `identity` satisfies `requirement`. No identity fails closed.
pub fn evaluate(identity: Option<&Identity>, requirement: &Requirement) -> Result<(), Denial> {
    let Some(identity) = identity else {
        return Err(Denial::Unauthenticated);
    };

    if requirement.is_empty_set() {
        tracing::error!(?requirement, "Empty requirement set evaluated; denying");
        return Err(Denial::Forbidden("Insufficient permissions"));
    }

    match requirement {
        Requirement::Authenticated => Ok(()),
        Requirement::AnyRole(required) => {
            if has_any_role(identity, required) {
                Ok(())
            } else {
                Err(Denial::Forbidden("Insufficient role permissions"))
            }
        }
        Requirement::AnyPermission(required) => {
            if has_any_permission(identity, required) {
                Ok(())
            } else {
                Err(Denial::Forbidden("Insufficient permissions"))
            }
        }
    }
}
