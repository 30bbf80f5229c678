//! Services layer for rbac-service.
//!
//! Token issuance, identity resolution, access decisions and the account,
//! role and permission management built on the credential store.

pub mod access;
mod auth;
pub mod catalog;
pub mod error;
pub mod gate;
mod identity;
mod jwt;
mod permissions;
mod roles;
pub mod store;
mod users;

pub use access::{evaluate, has_any_permission, has_any_role, Denial, Requirement};
pub use auth::{AuthService, LoginOutcome, Registration};
pub use error::ServiceError;
pub use gate::{GateRejection, GateStage, RequestGate};
pub use identity::{flatten, IdentityResolver, ResolveError};
pub use jwt::{Claims, JwtService, TokenError};
pub use permissions::PermissionService;
pub use roles::RoleService;
pub use store::{CredentialStore, MemoryStore, PgStore, StoreError};
pub use users::{UserService, UserUpdate};
