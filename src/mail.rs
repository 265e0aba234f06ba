use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Development mailer: records that a message went out. The body holds
/// one-time secrets, so it is never logged.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        info!(to = %email.to, subject = %email.subject, "email delivered to log mailer");
        Ok(())
    }
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Posts messages to a transactional mail HTTP API.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build mail http client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        let mut req = self.client.post(&self.config.api_url).json(&OutboundMessage {
            from: &self.config.from,
            to: &email.to,
            subject: &email.subject,
            text: &email.body,
        });
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.context("mail api request")?;
        let status = res.status();
        anyhow::ensure!(status.is_success(), "mail api responded {status}");
        debug!(to = %email.to, "email accepted by mail api");
        Ok(())
    }
}

#[cfg(test)]
pub use fakes::{FailingMailer, RecordingMailer};
