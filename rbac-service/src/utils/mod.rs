pub mod password;
pub mod validation;

pub use password::{Password, PasswordError, PasswordHashString, PasswordHasher};
pub use validation::ValidatedJson;
