pub mod identity;
pub mod permission;
pub mod role;
pub mod user;

pub use identity::{Identity, UserAccess};
pub use permission::{
    with_children, NewPermission, Permission, PermissionChanges, PermissionSummary,
    PermissionTree, PermissionWithChildren, TreeError,
};
pub use role::{NewRole, Role, RoleChanges, RoleWithPermissions};
pub use user::{NewUser, User, UserChanges, UserCredentials, UserWithRoles};
