use async_trait::async_trait;
use sqlx::{postgres::PgPool, FromRow, PgConnection};
use std::collections::HashMap;
use uuid::Uuid;

use super::{dedup_ids, CredentialStore, StoreError, StoreResult};
use crate::models::{
    NewPermission, NewRole, NewUser, Permission, PermissionChanges, PermissionTree, Role,
    RoleChanges, RoleWithPermissions, User, UserAccess, UserChanges, UserCredentials,
    UserWithRoles,
};

const USER_COLUMNS: &str = "id, username, firstname, lastname, email, mobile, created_at, updated_at";
const ROLE_COLUMNS: &str = "id, name, description, created_at, updated_at";
const PERMISSION_COLUMNS: &str = "id, name, description, parent_id, created_at, updated_at";

/// PostgreSQL-backed credential store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: User,
    password_hash: String,
}

#[derive(FromRow)]
struct UserRoleRow {
    user_id: Uuid,
    #[sqlx(flatten)]
    role: Role,
}

#[derive(FromRow)]
struct RolePermissionRow {
    role_id: Uuid,
    #[sqlx(flatten)]
    permission: Permission,
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::anyhow!(e))
}

/// Map a write failure: unique hits become `Conflict`, broken foreign keys `InvalidReference`.
fn write_error(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(what.to_string());
        }
        if db.is_foreign_key_violation() {
            return StoreError::InvalidReference(format!("reference in {}", what));
        }
    }
    backend(e)
}

/// Fail with `InvalidReference` naming the first id not present in `table`.
async fn check_exist(
    conn: &mut PgConnection,
    table: &'static str,
    label: &'static str,
    ids: &[Uuid],
) -> StoreResult<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let found: Vec<(Uuid,)> = sqlx::query_as(&format!("SELECT id FROM {} WHERE id = ANY($1)", table))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)?;

    match ids.iter().find(|id| !found.iter().any(|(f,)| f == *id)) {
        Some(missing) => Err(StoreError::InvalidReference(format!("{} {}", label, missing))),
        None => Ok(()),
    }
}

/// Refuse hanging `node` (absent for an insert) under `parent` when that would
/// loop. Takes a lock that serializes parent changes for the rest of the
/// transaction, then reads the ancestor chain of `parent`.
async fn check_parent_chain(
    conn: &mut PgConnection,
    node: Option<Uuid>,
    parent: Option<Uuid>,
) -> StoreResult<()> {
    let Some(parent) = parent else {
        return Ok(());
    };

    sqlx::query("LOCK TABLE permissions IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *conn)
        .await
        .map_err(backend)?;

    // UNION drops repeated rows, so a damaged loop still terminates.
    let chain: Vec<(Uuid, Option<Uuid>)> = sqlx::query_as(
        r#"
        WITH RECURSIVE chain(id, parent_id) AS (
            SELECT id, parent_id FROM permissions WHERE id = $1
            UNION
            SELECT p.id, p.parent_id FROM permissions p JOIN chain c ON p.id = c.parent_id
        )
        SELECT id, parent_id FROM chain
        "#,
    )
    .bind(parent)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?;

    PermissionTree::from_links(chain).check_parent(node, Some(parent))?;
    Ok(())
}

async fn replace_user_roles(conn: &mut PgConnection, user_id: Uuid, role_ids: &[Uuid]) -> StoreResult<()> {
    check_exist(conn, "roles", "role", role_ids).await?;

    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;

    sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, UNNEST($2::uuid[])")
        .bind(user_id)
        .bind(role_ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "user role assignment"))?;

    Ok(())
}

async fn replace_role_permissions(
    conn: &mut PgConnection,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> StoreResult<()> {
    check_exist(conn, "permissions", "permission", permission_ids).await?;

    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;

    sqlx::query("INSERT INTO role_permissions (role_id, permission_id) SELECT $1, UNNEST($2::uuid[])")
        .bind(role_id)
        .bind(permission_ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "role permission grant"))?;

    Ok(())
}

async fn roles_of(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<Vec<Role>> {
    sqlx::query_as::<_, Role>(
        r#"
        SELECT r.id, r.name, r.description, r.created_at, r.updated_at
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = $1
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)
}

async fn permissions_of(conn: &mut PgConnection, role_id: Uuid) -> StoreResult<Vec<Permission>> {
    sqlx::query_as::<_, Permission>(
        r#"
        SELECT p.id, p.name, p.description, p.parent_id, p.created_at, p.updated_at
        FROM permissions p
        JOIN role_permissions rp ON rp.permission_id = p.id
        WHERE rp.role_id = $1
        ORDER BY p.name
        "#,
    )
    .bind(role_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn connection(&self) -> StoreResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool.acquire().await.map_err(backend)
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn find_credentials(&self, username: &str) -> StoreResult<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {}, password_hash FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|r| UserCredentials {
            user: r.user,
            password_hash: r.password_hash,
        }))
    }

    async fn find_user_with_roles(&self, id: Uuid) -> StoreResult<Option<UserWithRoles>> {
        let Some(user) = self.find_user_by_id(id).await? else {
            return Ok(None);
        };
        let mut conn = self.connection().await?;
        let roles = roles_of(&mut *conn, id).await?;
        Ok(Some(UserWithRoles { user, roles }))
    }

    async fn find_user_with_access(&self, id: Uuid) -> StoreResult<Option<UserAccess>> {
        let Some(user) = self.find_user_by_id(id).await? else {
            return Ok(None);
        };

        let mut conn = self.connection().await?;
        let roles = roles_of(&mut *conn, id).await?;

        let grants = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT rp.role_id, p.id, p.name, p.description, p.parent_id, p.created_at, p.updated_at
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(backend)?;

        let mut by_role: HashMap<Uuid, Vec<Permission>> = HashMap::new();
        for grant in grants {
            by_role.entry(grant.role_id).or_default().push(grant.permission);
        }

        let roles = roles
            .into_iter()
            .map(|role| RoleWithPermissions {
                permissions: by_role.remove(&role.id).unwrap_or_default(),
                role,
            })
            .collect();

        Ok(Some(UserAccess { user, roles }))
    }

    async fn list_users(&self) -> StoreResult<Vec<UserWithRoles>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at, username",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let assignments = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT ur.user_id, r.id, r.name, r.description, r.created_at, r.updated_at
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            ORDER BY r.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut by_user: HashMap<Uuid, Vec<Role>> = HashMap::new();
        for row in assignments {
            by_user.entry(row.user_id).or_default().push(row.role);
        }

        Ok(users
            .into_iter()
            .map(|user| UserWithRoles {
                roles: by_user.remove(&user.id).unwrap_or_default(),
                user,
            })
            .collect())
    }

    async fn create_user(&self, user: NewUser, role_ids: Vec<Uuid>) -> StoreResult<UserWithRoles> {
        let role_ids = dedup_ids(role_ids);
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, password_hash, firstname, lastname, email, mobile)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.firstname)
        .bind(&user.lastname)
        .bind(&user.email)
        .bind(&user.mobile)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error(e, &format!("Username '{}'", user.username)))?;

        replace_user_roles(&mut *tx, created.id, &role_ids).await?;
        let roles = roles_of(&mut *tx, created.id).await?;

        tx.commit().await.map_err(backend)?;

        Ok(UserWithRoles { user: created, roles })
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
        role_ids: Option<Vec<Uuid>>,
    ) -> StoreResult<Option<UserWithRoles>> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let conflict_label = match &changes.username {
            Some(username) => format!("Username '{}'", username),
            None => "Username".to_string(),
        };

        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                password_hash = COALESCE($3, password_hash),
                firstname = COALESCE($4, firstname),
                lastname = COALESCE($5, lastname),
                email = COALESCE($6, email),
                mobile = COALESCE($7, mobile),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&changes.username)
        .bind(&changes.password_hash)
        .bind(&changes.firstname)
        .bind(&changes.lastname)
        .bind(&changes.email)
        .bind(&changes.mobile)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| write_error(e, &conflict_label))?;

        let Some(user) = updated else {
            return Ok(None);
        };

        if let Some(role_ids) = role_ids {
            replace_user_roles(&mut *tx, id, &dedup_ids(role_ids)).await?;
        }
        let roles = roles_of(&mut *tx, id).await?;

        tx.commit().await.map_err(backend)?;

        Ok(Some(UserWithRoles { user, roles }))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_role_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        sqlx::query_as::<_, Role>(&format!("SELECT {} FROM roles WHERE id = $1", ROLE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        sqlx::query_as::<_, Role>(&format!("SELECT {} FROM roles WHERE name = $1", ROLE_COLUMNS))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn find_role_with_permissions(&self, id: Uuid) -> StoreResult<Option<RoleWithPermissions>> {
        let Some(role) = self.find_role_by_id(id).await? else {
            return Ok(None);
        };
        let mut conn = self.connection().await?;
        let permissions = permissions_of(&mut *conn, id).await?;
        Ok(Some(RoleWithPermissions { role, permissions }))
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleWithPermissions>> {
        let roles = sqlx::query_as::<_, Role>(&format!("SELECT {} FROM roles ORDER BY name", ROLE_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let grants = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT rp.role_id, p.id, p.name, p.description, p.parent_id, p.created_at, p.updated_at
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            ORDER BY p.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut by_role: HashMap<Uuid, Vec<Permission>> = HashMap::new();
        for grant in grants {
            by_role.entry(grant.role_id).or_default().push(grant.permission);
        }

        Ok(roles
            .into_iter()
            .map(|role| RoleWithPermissions {
                permissions: by_role.remove(&role.id).unwrap_or_default(),
                role,
            })
            .collect())
    }

    async fn create_role(
        &self,
        role: NewRole,
        permission_ids: Vec<Uuid>,
    ) -> StoreResult<RoleWithPermissions> {
        let permission_ids = dedup_ids(permission_ids);
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let created = sqlx::query_as::<_, Role>(&format!(
            "INSERT INTO roles (id, name, description) VALUES ($1, $2, $3) RETURNING {}",
            ROLE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&role.name)
        .bind(&role.description)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error(e, &format!("Role '{}'", role.name)))?;

        replace_role_permissions(&mut *tx, created.id, &permission_ids).await?;
        let permissions = permissions_of(&mut *tx, created.id).await?;

        tx.commit().await.map_err(backend)?;

        Ok(RoleWithPermissions {
            role: created,
            permissions,
        })
    }

    async fn update_role(
        &self,
        id: Uuid,
        changes: RoleChanges,
        permission_ids: Option<Vec<Uuid>>,
    ) -> StoreResult<Option<RoleWithPermissions>> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let conflict_label = format!("Role '{}'", changes.name.as_deref().unwrap_or_default());
        let updated = sqlx::query_as::<_, Role>(&format!(
            r#"
            UPDATE roles SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ROLE_COLUMNS
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| write_error(e, &conflict_label))?;

        let Some(role) = updated else {
            return Ok(None);
        };

        if let Some(permission_ids) = permission_ids {
            replace_role_permissions(&mut *tx, id, &dedup_ids(permission_ids)).await?;
        }
        let permissions = permissions_of(&mut *tx, id).await?;

        tx.commit().await.map_err(backend)?;

        Ok(Some(RoleWithPermissions { role, permissions }))
    }

    async fn delete_role(&self, id: Uuid) -> StoreResult<bool> {
        // user_roles and role_permissions rows cascade
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_permission_by_id(&self, id: Uuid) -> StoreResult<Option<Permission>> {
        sqlx::query_as::<_, Permission>(&format!(
            "SELECT {} FROM permissions WHERE id = $1",
            PERMISSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        sqlx::query_as::<_, Permission>(&format!(
            "SELECT {} FROM permissions WHERE name = $1",
            PERMISSION_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(&format!(
            "SELECT {} FROM permissions ORDER BY name",
            PERMISSION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }

    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        check_parent_chain(&mut *tx, None, permission.parent_id).await?;

        let created = sqlx::query_as::<_, Permission>(&format!(
            r#"
            INSERT INTO permissions (id, name, description, parent_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            PERMISSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(permission.parent_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error(e, &format!("Permission '{}'", permission.name)))?;

        tx.commit().await.map_err(backend)?;
        Ok(created)
    }

    async fn update_permission(
        &self,
        id: Uuid,
        changes: PermissionChanges,
    ) -> StoreResult<Option<Permission>> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        if let Some(parent) = changes.parent_id {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM permissions WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
            if exists.is_none() {
                return Ok(None);
            }
            check_parent_chain(&mut *tx, Some(id), parent).await?;
        }

        let conflict_label = format!("Permission '{}'", changes.name.as_deref().unwrap_or_default());
        let updated = sqlx::query_as::<_, Permission>(&format!(
            r#"
            UPDATE permissions SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                parent_id = CASE WHEN $4 THEN $5 ELSE parent_id END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PERMISSION_COLUMNS
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.parent_id.is_some())
        .bind(changes.parent_id.flatten())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| write_error(e, &conflict_label))?;

        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("UPDATE permissions SET parent_id = NULL, updated_at = NOW() WHERE parent_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        // role_permissions rows cascade
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}
