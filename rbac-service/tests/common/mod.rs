//! Shared harness for rbac-service integration tests.
//!
//! Every test gets its own in-memory store with the catalog seeded, so tests
//! never share state and need no external services.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use http_body_util::BodyExt;
use rbac_service::{
    build_router,
    config::RbacConfig,
    models::{
        NewPermission, NewRole, NewUser, Permission, PermissionChanges, Role, RoleChanges,
        RoleWithPermissions, User, UserAccess, UserChanges, UserCredentials, UserWithRoles,
    },
    services::{catalog, store::StoreResult, CredentialStore, MemoryStore, StoreError},
    AppState,
};
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration-test-signing-secret";

pub fn test_config() -> RbacConfig {
    RbacConfig::from_lookup(CommonConfig::default(), |key| {
        let value = match key {
            "STORE_BACKEND" => "memory",
            "JWT_SECRET" => TEST_JWT_SECRET,
            "JWT_EXPIRES_IN" => "1h",
            "LOG_LEVEL" => "error",
            // Cheap hashing keeps the suite fast
            "PASSWORD_HASH_COST" => "1",
            "PASSWORD_HASH_MEMORY_KIB" => "1024",
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("Failed to build test config")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<dyn CredentialStore>,
}

pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = test_config();
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
        catalog::seed(&store, &config.access.default_role)
            .await
            .expect("Failed to seed catalog");

        Self::with_store(store)
    }

    /// App over an arbitrary store, not seeded.
    pub fn with_store(store: Arc<dyn CredentialStore>) -> Self {
        let state = AppState::new(test_config(), store.clone()).expect("Failed to build app state");
        let router = build_router(state.clone()).expect("Failed to build router");

        Self {
            router,
            state,
            store,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Reply { status, body }
    }

    pub async fn get(&self, uri: &str, token: &str) -> Reply {
        self.send(Method::GET, uri, Some(token), None).await
    }

    /// Register an account; returns its id.
    pub async fn register(&self, username: &str, password: &str, role_ids: &[Uuid]) -> Uuid {
        let reply = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "password": password,
                    "roleIds": role_ids,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        id_of(&reply.body["data"])
    }

    /// Log in and return the bearer token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let reply = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        reply.body["data"]["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }

    pub async fn role_id(&self, name: &str) -> Uuid {
        self.store
            .find_role_by_name(name)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("role {} missing", name))
            .id
    }

    pub async fn permission_id(&self, name: &str) -> Uuid {
        self.store
            .find_permission_by_name(name)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("permission {} missing", name))
            .id
    }

    /// Register a user holding the seeded `admin` role and log them in.
    pub async fn admin_token(&self) -> String {
        let admin = self.role_id("admin").await;
        self.register("root", "root-password", &[admin]).await;
        self.login("root", "root-password").await
    }

    /// Create a role carrying the named permissions; returns its id.
    pub async fn role_with(&self, admin_token: &str, name: &str, permissions: &[&str]) -> Uuid {
        let mut ids = Vec::new();
        for permission in permissions {
            ids.push(self.permission_id(permission).await);
        }
        let reply = self
            .send(
                Method::POST,
                "/api/roles",
                Some(admin_token),
                Some(json!({ "role_name": name, "permissionIds": ids })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        id_of(&reply.body["data"])
    }
}

pub fn id_of(value: &Value) -> Uuid {
    value["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("no id in {}", value))
}

pub fn names(values: &Value) -> Vec<String> {
    let mut names: Vec<String> = values
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Store whose every call fails, as when the database is unreachable.
pub struct UnavailableStore;

fn unavailable<T>() -> StoreResult<T> {
    Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
}

#[async_trait]
impl CredentialStore for UnavailableStore {
    async fn health_check(&self) -> StoreResult<()> {
        unavailable()
    }

    async fn find_user_by_id(&self, _: Uuid) -> StoreResult<Option<User>> {
        unavailable()
    }

    async fn find_user_by_username(&self, _: &str) -> StoreResult<Option<User>> {
        unavailable()
    }

    async fn find_credentials(&self, _: &str) -> StoreResult<Option<UserCredentials>> {
        unavailable()
    }

    async fn find_user_with_roles(&self, _: Uuid) -> StoreResult<Option<UserWithRoles>> {
        unavailable()
    }

    async fn find_user_with_access(&self, _: Uuid) -> StoreResult<Option<UserAccess>> {
        unavailable()
    }

    async fn list_users(&self) -> StoreResult<Vec<UserWithRoles>> {
        unavailable()
    }

    async fn create_user(&self, _: NewUser, _: Vec<Uuid>) -> StoreResult<UserWithRoles> {
        unavailable()
    }

    async fn update_user(
        &self,
        _: Uuid,
        _: UserChanges,
        _: Option<Vec<Uuid>>,
    ) -> StoreResult<Option<UserWithRoles>> {
        unavailable()
    }

    async fn delete_user(&self, _: Uuid) -> StoreResult<bool> {
        unavailable()
    }

    async fn find_role_by_id(&self, _: Uuid) -> StoreResult<Option<Role>> {
        unavailable()
    }

    async fn find_role_by_name(&self, _: &str) -> StoreResult<Option<Role>> {
        unavailable()
    }

    async fn find_role_with_permissions(&self, _: Uuid) -> StoreResult<Option<RoleWithPermissions>> {
        unavailable()
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleWithPermissions>> {
        unavailable()
    }

    async fn create_role(&self, _: NewRole, _: Vec<Uuid>) -> StoreResult<RoleWithPermissions> {
        unavailable()
    }

    async fn update_role(
        &self,
        _: Uuid,
        _: RoleChanges,
        _: Option<Vec<Uuid>>,
    ) -> StoreResult<Option<RoleWithPermissions>> {
        unavailable()
    }

    async fn delete_role(&self, _: Uuid) -> StoreResult<bool> {
        unavailable()
    }

    async fn find_permission_by_id(&self, _: Uuid) -> StoreResult<Option<Permission>> {
        unavailable()
    }

    async fn find_permission_by_name(&self, _: &str) -> StoreResult<Option<Permission>> {
        unavailable()
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        unavailable()
    }

    async fn create_permission(&self, _: NewPermission) -> StoreResult<Permission> {
        unavailable()
    }

    async fn update_permission(
        &self,
        _: Uuid,
        _: PermissionChanges,
    ) -> StoreResult<Option<Permission>> {
        unavailable()
    }

    async fn delete_permission(&self, _: Uuid) -> StoreResult<bool> {
        unavailable()
    }
}
