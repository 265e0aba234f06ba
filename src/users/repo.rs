use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, PendingReset, ProfileUpdate, User, UserWithPassword};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence for user credential records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_with_password_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserWithPassword>>;
    async fn find_with_password_by_email(
        &self,
        email: &str,
    ) -> anyhow::Result<Option<UserWithPassword>>;
    /// Looks up the holder of a reset token digest, expired or not.
    async fn find_by_reset_token(&self, token_hash: &str) -> anyhow::Result<Option<User>>;
    /// Overwrites (or clears, with `None`) the outstanding reset token.
    async fn set_reset_token(&self, id: Uuid, reset: Option<PendingReset>) -> anyhow::Result<()>;
    /// Stores a new password hash and clears any outstanding reset token.
    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<User>;
    /// Swaps in a new password hash only if `token_hash` is still outstanding
    /// and unexpired at `now`, clearing it in the same step. `None` means the
    /// token was unknown, expired, or already redeemed.
    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User, StoreError>;
    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>>;
}

const USER_COLUMNS: &str = "id, name, email, phone, role, password_changed_at, \
     password_reset_token, password_reset_expires, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_unique(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        _ => StoreError::Other(anyhow::Error::new(e)),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, phone, role, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.role)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_with_password_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserWithPassword>> {
        let user = sqlx::query_as::<_, UserWithPassword>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user with password by id")?;
        Ok(user)
    }

    async fn find_with_password_by_email(
        &self,
        email: &str,
    ) -> anyhow::Result<Option<UserWithPassword>> {
        let user = sqlx::query_as::<_, UserWithPassword>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user with password by email")?;
        Ok(user)
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE password_reset_token = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await
        .context("find user by reset token")?;
        Ok(user)
    }

    async fn set_reset_token(&self, id: Uuid, reset: Option<PendingReset>) -> anyhow::Result<()> {
        let (token_hash, expires_at) = match reset {
            Some(r) => (Some(r.token_hash), Some(r.expires_at)),
            None => (None, None),
        };
        sqlx::query(
            r#"
            UPDATE users
               SET password_reset_token = $2,
                   password_reset_expires = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .context("set reset token")?;
        Ok(())
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET password_hash = $2,
                   password_changed_at = $3,
                   password_reset_token = NULL,
                   password_reset_expires = NULL
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .fetch_one(&self.db)
        .await
        .context("set password")?;
        Ok(user)
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET password_hash = $3,
                   password_changed_at = $4,
                   password_reset_token = NULL,
                   password_reset_expires = NULL
             WHERE password_reset_token = $1
               AND password_reset_expires > $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .bind(password_hash)
        .bind(changed_at)
        .fetch_optional(&self.db)
        .await
        .context("redeem reset token")?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   phone = COALESCE($4, phone)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.email)
        .bind(update.phone)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)?;
        Ok(user)
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(rows)
    }
}
