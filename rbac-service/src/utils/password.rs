use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

use crate::config::PasswordConfig;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Invalid password hash parameters: {0}")]
    Params(argon2::Error),

    #[error("Failed to hash password: {0}")]
    Hash(argon2::password_hash::Error),
}

/// Argon2id hasher with a cost fixed at startup.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: &PasswordConfig) -> Result<Self, PasswordError> {
        let params = Params::new(config.memory_kib, config.iterations, 1, None)
            .map_err(PasswordError::Params)?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt.
    ///
    /// Empty input is hashed like any other; presence is the caller's concern.
    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(PasswordError::Hash)?
            .to_string();

        Ok(PasswordHashString(password_hash))
    }

    /// Verify a password against a stored PHC string.
    ///
    /// The digest comparison is constant-time. An unparseable hash never matches.
    pub fn verify(&self, password: &Password, password_hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(password_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is malformed");
                return false;
            }
        };

        self.argon2()
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&PasswordConfig {
            iterations: 1,
            memory_kib: 1024,
        })
        .expect("Failed to build hasher")
    }

    #[test]
    fn test_hash_password() {
        let password = Password::new("secret123");
        let hash = hasher().hash(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(hash.as_str().contains("t=1"));
    }

    #[test]
    fn test_verify_password_correct() {
        let hasher = hasher();
        let password = Password::new("secret123");
        let hash = hasher.hash(&password).expect("Failed to hash password");

        assert!(hasher.verify(&password, hash.as_str()));
    }

    #[test]
    fn test_verify_password_incorrect() {
        let hasher = hasher();
        let hash = hasher
            .hash(&Password::new("secret123"))
            .expect("Failed to hash password");

        assert!(!hasher.verify(&Password::new("secret124"), hash.as_str()));
        assert!(!hasher.verify(&Password::new(""), hash.as_str()));
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hasher = hasher();
        let password = Password::new("secret123");
        let hash1 = hasher.hash(&password).expect("Failed to hash password");
        let hash2 = hasher.hash(&password).expect("Failed to hash password");

        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(hasher.verify(&password, hash1.as_str()));
        assert!(hasher.verify(&password, hash2.as_str()));
    }

    #[test]
    fn empty_password_hashes_without_error() {
        let hasher = hasher();
        let empty = Password::new("");
        let hash = hasher.hash(&empty).expect("Empty input should hash");
        assert!(hasher.verify(&empty, hash.as_str()));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!hasher().verify(&Password::new("secret123"), "not-a-phc-string"));
    }

    #[test]
    fn debug_output_hides_password() {
        assert_eq!(format!("{:?}", Password::new("secret123")), "Password(***)");
    }
}
