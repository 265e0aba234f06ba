use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::{jwt::JwtKeys, password::PasswordHasher, reset::ResetTokens};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::db;
use crate::mail::{HttpMailer, LogMailer, Mailer};
use crate::users::{memory::InMemoryUserStore, repo::PgUserStore, repo::UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
    pub jwt: JwtKeys,
    pub hasher: PasswordHasher,
    pub resets: ResetTokens,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => Arc::new(PgUserStore::new(db::connect(url).await?)),
            None => {
                warn!("DATABASE_URL not set; using in-memory user store, data is lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.mail {
            Some(mail) => Arc::new(HttpMailer::new(mail.clone())?),
            None => {
                info!("MAIL_API_URL not set; emails are only logged");
                Arc::new(LogMailer)
            }
        };

        Self::from_parts(config, users, mailer, Arc::new(SystemClock))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let jwt = JwtKeys::new(&config.jwt, clock.clone());
        let hasher = PasswordHasher::new(config.password)?;
        let resets = ResetTokens::new(config.reset.ttl_minutes);
        Ok(Self {
            config,
            users,
            mailer,
            clock,
            jwt,
            hasher,
            resets,
        })
    }
}

#[cfg(test)]
pub use fake::FakeState;
