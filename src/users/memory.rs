use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{NewUser, PendingReset, ProfileUpdate, User, UserWithPassword};

/// Process-local user store for development without Postgres and for tests.
/// Each method holds the lock for its whole read-modify-write, matching the
/// per-row atomicity of the SQL store.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, UserWithPassword>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.user.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            role: new.role,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(
            user.id,
            UserWithPassword {
                user: user.clone(),
                password_hash: new.password_hash,
            },
        );
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).map(|u| u.user.clone()))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.find_with_password_by_email(email).await?.map(|u| u.user))
    }

    async fn find_with_password_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserWithPassword>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_with_password_by_email(
        &self,
        email: &str,
    ) -> anyhow::Result<Option<UserWithPassword>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.user.email == email).cloned())
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.user.password_reset_token.as_deref() == Some(token_hash))
            .map(|u| u.user.clone()))
    }

    async fn set_reset_token(&self, id: Uuid, reset: Option<PendingReset>) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        let entry = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        let (token_hash, expires_at) = match reset {
            Some(r) => (Some(r.token_hash), Some(r.expires_at)),
            None => (None, None),
        };
        entry.user.password_reset_token = token_hash;
        entry.user.password_reset_expires = expires_at;
        Ok(())
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<User> {
        let mut users = self.users.write().await;
        let entry = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        entry.password_hash = password_hash.to_string();
        entry.user.password_changed_at = Some(changed_at);
        entry.user.password_reset_token = None;
        entry.user.password_reset_expires = None;
        Ok(entry.user.clone())
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        let Some(entry) = users.values_mut().find(|u| {
            u.user.password_reset_token.as_deref() == Some(token_hash)
                && u.user.password_reset_expires.is_some_and(|exp| exp > now)
        }) else {
            return Ok(None);
        };
        entry.password_hash = password_hash.to_string();
        entry.user.password_changed_at = Some(changed_at);
        entry.user.password_reset_token = None;
        entry.user.password_reset_expires = None;
        Ok(Some(entry.user.clone()))
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if let Some(email) = &update.email {
            if users.values().any(|u| u.user.id != id && &u.user.email == email) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let entry = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        if let Some(name) = update.name {
            entry.user.name = name;
        }
        if let Some(email) = update.email {
            entry.user.email = email;
        }
        if let Some(phone) = update.phone {
            entry.user.phone = Some(phone);
        }
        Ok(entry.user.clone())
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().map(|u| u.user.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}
