use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::jwt::JwtService;
use super::store::CredentialStore;
use crate::models::{Identity, NewUser, UserWithRoles};
use crate::utils::{Password, PasswordHasher};

/// Registration input; the password is still plaintext here.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: Password,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserWithRoles,
    pub token: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    tokens: JwtService,
    default_role: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        tokens: JwtService,
        default_role: impl Into<String>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            default_role: default_role.into(),
        }
    }

    /// Create an account. Explicit role ids become the user's role set; with
    /// none given the default role is assigned when it exists.
    pub async fn register(&self, registration: Registration) -> Result<UserWithRoles, ServiceError> {
        let role_ids = if registration.role_ids.is_empty() {
            match self.store.find_role_by_name(&self.default_role).await? {
                Some(role) => vec![role.id],
                None => {
                    tracing::info!(
                        role = %self.default_role,
                        "Default role does not exist; registering without roles"
                    );
                    Vec::new()
                }
            }
        } else {
            registration.role_ids
        };

        let password_hash = hash_blocking(&self.hasher, registration.password).await?;

        let user = self
            .store
            .create_user(
                NewUser {
                    username: registration.username,
                    password_hash,
                    firstname: registration.firstname,
                    lastname: registration.lastname,
                    email: registration.email,
                    mobile: registration.mobile,
                },
                role_ids,
            )
            .await?;

        tracing::info!(user_id = %user.user.id, roles = user.roles.len(), "User registered");
        Ok(user)
    }

    /// Check credentials and issue a token. Unknown user and wrong password
    /// produce the same error.
    pub async fn login(&self, username: &str, password: Password) -> Result<LoginOutcome, ServiceError> {
        let invalid = || ServiceError::Unauthenticated("Invalid username or password".to_string());

        let Some(credentials) = self.store.find_credentials(username).await? else {
            tracing::warn!("Login attempt for unknown username");
            return Err(invalid());
        };

        let hasher = self.hasher.clone();
        let stored_hash = credentials.password_hash;
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password verification task failed: {}", e)))?;

        if !verified {
            tracing::warn!(user_id = %credentials.user.id, "Login failed: wrong password");
            return Err(invalid());
        }

        let user_id = credentials.user.id;
        let token = self.tokens.issue(user_id, &credentials.user.username)?;

        let user = self
            .store
            .find_user_with_roles(user_id)
            .await?
            .ok_or_else(invalid)?;

        tracing::info!(user_id = %user_id, "User logged in");
        Ok(LoginOutcome {
            user,
            token,
            expires_in: self.tokens.expires_in_seconds(),
        })
    }

    /// The caller's own account, taken from the already-resolved identity.
    pub fn profile(&self, identity: &Identity) -> UserWithRoles {
        UserWithRoles {
            user: identity.user.clone(),
            roles: identity.roles.clone(),
        }
    }
}

/// Run the hasher off the async executor.
pub(crate) async fn hash_blocking(hasher: &PasswordHasher, password: Password) -> Result<String, ServiceError> {
    let hasher = hasher.clone();
    let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing task failed: {}", e)))??;
    Ok(hash.into_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JwtConfig, PasswordConfig};
    use crate::models::NewRole;
    use crate::services::store::MemoryStore;
    use secrecy::SecretString;
    use std::time::Duration;

    fn service(store: Arc<MemoryStore>) -> AuthService {
        let hasher = PasswordHasher::new(&PasswordConfig {
            iterations: 1,
            memory_kib: 1024,
        })
        .unwrap();
        let tokens = JwtService::new(&JwtConfig {
            secret: SecretString::new("auth-service-test-secret".to_string()),
            expires_in: Duration::from_secs(3600),
        })
        .unwrap();
        AuthService::new(store, hasher, tokens, "user")
    }

    fn registration(username: &str, role_ids: Vec<Uuid>) -> Registration {
        Registration {
            username: username.to_string(),
            password: Password::new("secret123"),
            firstname: Some("Alice".to_string()),
            lastname: None,
            email: None,
            mobile: None,
            role_ids,
        }
    }

    async fn create_role(store: &MemoryStore, name: &str) -> Uuid {
        store
            .create_role(
                NewRole {
                    name: name.to_string(),
                    description: None,
                },
                vec![],
            )
            .await
            .unwrap()
            .role
            .id
    }

    #[tokio::test]
    async fn register_assigns_default_role_when_none_given() {
        let store = Arc::new(MemoryStore::new());
        create_role(&store, "user").await;
        let auth = service(store.clone());

        let user = auth.register(registration("alice", vec![])).await.unwrap();
        assert_eq!(user.roles.len(), 1);
        assert_eq!(user.roles[0].name, "user");
    }

    #[tokio::test]
    async fn register_without_default_role_succeeds_with_no_roles() {
        let auth = service(Arc::new(MemoryStore::new()));
        let user = auth.register(registration("alice", vec![])).await.unwrap();
        assert!(user.roles.is_empty());
    }

    #[tokio::test]
    async fn explicit_roles_replace_the_default() {
        let store = Arc::new(MemoryStore::new());
        create_role(&store, "user").await;
        let editor = create_role(&store, "editor").await;
        let auth = service(store.clone());

        let user = auth.register(registration("alice", vec![editor])).await.unwrap();
        assert_eq!(user.roles.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["editor"]);
    }

    #[tokio::test]
    async fn unknown_role_id_fails_registration() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store.clone());

        let err = auth
            .register(registration("alice", vec![Uuid::new_v4()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(store.find_user_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_checks_the_password() {
        let auth = service(Arc::new(MemoryStore::new()));
        let registered = auth.register(registration("alice", vec![])).await.unwrap();

        let outcome = auth.login("alice", Password::new("secret123")).await.unwrap();
        assert_eq!(outcome.user.user.id, registered.user.id);
        assert_eq!(outcome.expires_in, 3600);

        let wrong = auth.login("alice", Password::new("secret124")).await.unwrap_err();
        let unknown = auth.login("bob", Password::new("secret123")).await.unwrap_err();
        assert_eq!(wrong.to_string(), "Invalid username or password");
        assert_eq!(unknown.to_string(), wrong.to_string());
    }
}
