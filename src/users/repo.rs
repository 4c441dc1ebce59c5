use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::password::PasswordDigest;
use crate::users::model::{NewUser, User, UserChanges};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint on username or email was hit.
    #[error("username or email already taken")]
    Duplicate,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence client for user records. Lookups by username or email expect
/// lowercase input.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// Match `identifier` against username or email.
    async fn find_by_login(&self, identifier: &str) -> StoreResult<Option<User>>;
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn insert(&self, user: NewUser) -> StoreResult<User>;
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<()>;
    async fn set_password(&self, id: Uuid, password: &PasswordDigest) -> StoreResult<()>;
    async fn update_details(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>>;
    async fn set_avatar(&self, id: Uuid, url: &str) -> StoreResult<Option<User>>;
}

const USER_COLUMNS: &str = "id, name, username, email, password_hash, avatar, refresh_token, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_err(e: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Duplicate;
        }
    }
    StoreError::Backend(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_login(&self, identifier: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1 LIMIT 1"
        ))
        .bind(identifier)
        .fetch_optional(&self.db)
        .await
        .context("find user by login")?;
        Ok(user)
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 LIMIT 1"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by username or email")?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, username, email, password_hash, avatar)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.password.as_str())
        .bind(&user.avatar)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_err(e, "insert user"))?;
        Ok(row)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await
            .map_err(|e| map_write_err(e, "set refresh token"))?;
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password: &PasswordDigest) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password.as_str())
            .execute(&self.db)
            .await
            .map_err(|e| map_write_err(e, "set password"))?;
        Ok(())
    }

    async fn update_details(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   username = COALESCE($3, username),
                   email = COALESCE($4, email),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.username)
        .bind(&changes.email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_err(e, "update user details"))?;
        Ok(row)
    }

    async fn set_avatar(&self, id: Uuid, url: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET avatar = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_err(e, "set avatar"))?;
        Ok(row)
    }
}
