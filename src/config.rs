use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => anyhow::bail!("unknown APP_ENV {other:?}"),
        }
    }

    /// Cookies carry `Secure` everywhere except local development.
    pub fn secure_cookies(self) -> bool {
        self == Self::Production
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2id work factor.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: Environment,
    pub public_url: String,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub reset: ResetConfig,
    pub mail: Option<MailConfig>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let env = match std::env::var("APP_ENV") {
            Ok(v) => Environment::parse(&v)?,
            Err(_) => Environment::Development,
        };
        let public_url = std::env::var("APP_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "fixdesk".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "fixdesk-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24 * 90),
        };
        anyhow::ensure!(!jwt.secret.is_empty(), "JWT_SECRET must not be empty");
        anyhow::ensure!(jwt.ttl_minutes > 0, "JWT_TTL_MINUTES must be positive");

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: env_or("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib),
            iterations: env_or("PASSWORD_HASH_ITERATIONS", defaults.iterations),
            parallelism: env_or("PASSWORD_HASH_PARALLELISM", defaults.parallelism),
        };

        let reset = ResetConfig {
            ttl_minutes: env_or("PASSWORD_RESET_TTL_MINUTES", 10),
        };
        anyhow::ensure!(reset.ttl_minutes > 0, "PASSWORD_RESET_TTL_MINUTES must be positive");

        let mail = match std::env::var("MAIL_API_URL") {
            Ok(api_url) if !api_url.is_empty() => Some(MailConfig {
                api_url,
                api_key: std::env::var("MAIL_API_KEY").ok(),
                from: std::env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "FixDesk <no-reply@fixdesk.local>".into()),
            }),
            _ => None,
        };

        Ok(Self {
            env,
            public_url,
            database_url,
            jwt,
            password,
            reset,
            mail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_names() {
        assert_eq!(Environment::parse("production").unwrap(), Environment::Production);
        assert_eq!(Environment::parse(" Dev ").unwrap(), Environment::Development);
        assert!(Environment::parse("staging").is_err());
    }

    #[test]
    fn only_production_sets_secure_cookies() {
        assert!(Environment::Production.secure_cookies());
        assert!(!Environment::Development.secure_cookies());
    }
}
