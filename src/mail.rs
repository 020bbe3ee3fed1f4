use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            body = %email.text,
            "email dispatched"
        );
        Ok(())
    }
}

/// Delivers notifications with retries, independently of the write that
/// triggered them.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    from: String,
    base_url: String,
    max_attempts: u32,
    backoff: Duration,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, cfg: &MailConfig, base_url: &str) -> Self {
        Self {
            mailer,
            from: cfg.from.clone(),
            base_url: base_url.to_string(),
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }

    pub fn verification_email(&self, to: &str, token: &str) -> Email {
        let link = format!("{}/auth/verify?token={}", self.base_url, token);
        Email {
            from: self.from.clone(),
            to: to.to_string(),
            subject: "Verify Your Email".into(),
            html: format!(
                "<p>Welcome! Please confirm your email address.</p>\
                 <p><a href=\"{link}\">Verify my email</a></p>\
                 <p>Verification token: <code>{token}</code></p>"
            ),
            text: format!("Confirm your email address: {link}\nVerification token: {token}"),
        }
    }

    /// Tries up to `max_attempts` times; returns the last error if all fail.
    pub async fn deliver(&self, email: &Email) -> anyhow::Result<()> {
        let mut attempt = 1;
        loop {
            match self.mailer.send(email).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    warn!(error = %e, attempt, to = %email.to, "mail delivery failed; retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!("mail delivery failed after {attempt} attempts")))
                }
            }
        }
    }
}
