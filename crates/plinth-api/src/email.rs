//! Outbound email.
//!
//! Sends are fire-and-forget from the request's point of view. A send that
//! fails in the background is queued as a `send_email` job so the queue's
//! retry policy takes over.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use plinth_core::{Error, JobRepository, JobType, Result};
use plinth_db::Database;

use crate::config::EmailConfig;

/// One plain-text message. The sender address is filled in by the mailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, msg: &EmailMessage) -> Result<()>;
}

/// Delivers through an HTTP email relay.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build email client: {}", e)))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, msg: &EmailMessage) -> Result<()> {
        let mut request = self.client.post(&self.api_url).json(&serde_json::json!({
            "from": self.from,
            "to": msg.to,
            "subject": msg.subject,
            "text": msg.text,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Email(format!("relay request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Email(format!("relay returned {}: {}", status, body)));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, msg: &EmailMessage) -> Result<()> {
        info!(
            subsystem = "email",
            to = %msg.to,
            subject = %msg.subject,
            "Email (log only)"
        );
        Ok(())
    }
}

/// Pick the mailer for a configuration.
pub fn build_mailer(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(
            url.clone(),
            config.api_key.clone(),
            config.from.clone(),
            config.timeout_secs,
        )?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    db: Database,
    base_url: String,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, db: Database, base_url: impl Into<String>) -> Self {
        Self {
            mailer,
            db,
            base_url: base_url.into(),
        }
    }

    pub fn mailer(&self) -> Arc<dyn Mailer> {
        self.mailer.clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send in the background. Failures are queued for retry.
    pub fn dispatch(&self, msg: EmailMessage) -> tokio::task::JoinHandle<()> {
        let mailer = self.mailer.clone();
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&msg).await {
                warn!(subsystem = "email", to = %msg.to, error = %e, "Email send failed, queueing retry");
                queue_retry(&db, &msg).await;
            }
        })
    }
}

async fn queue_retry(db: &Database, msg: &EmailMessage) {
    let payload = match serde_json::to_value(msg) {
        Ok(p) => p,
        Err(e) => {
            warn!(subsystem = "email", error = %e, "Failed to encode email for retry");
            return;
        }
    };
    if let Err(e) = db
        .jobs
        .queue(
            JobType::SendEmail,
            payload,
            JobType::SendEmail.default_priority(),
            plinth_core::defaults::JOB_MAX_ATTEMPTS,
        )
        .await
    {
        warn!(subsystem = "email", error = %e, "Failed to queue email retry");
    }
}

// =============================================================================
// TEMPLATES
// =============================================================================

pub fn verification_email(base_url: &str, to: &str, display_name: &str, token: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Confirm your email address".to_string(),
        text: format!(
            "Hi {},\n\nPlease confirm your email address by opening the link below:\n\n\
             {}/verify-email?token={}\n\nThe link expires in {} hours.\n",
            display_name,
            base_url,
            token,
            plinth_core::defaults::EMAIL_VERIFICATION_TTL_HOURS
        ),
    }
}

pub fn password_reset_email(base_url: &str, to: &str, display_name: &str, token: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        text: format!(
            "Hi {},\n\nSomeone asked to reset the password for this account. \
             If that was you, open the link below:\n\n{}/reset-password?token={}\n\n\
             The link expires in {} hour(s). If you did not ask for this, ignore this email.\n",
            display_name,
            base_url,
            token,
            plinth_core::defaults::PASSWORD_RESET_TTL_HOURS
        ),
    }
}

pub fn new_comment_email(
    base_url: &str,
    to: &str,
    commenter: &str,
    post_title: &str,
    post_slug: &str,
    body: &str,
) -> EmailMessage {
    const PREVIEW_CHARS: usize = 280;
    let mut preview: String = body.chars().take(PREVIEW_CHARS).collect();
    if body.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    EmailMessage {
        to: to.to_string(),
        subject: format!("New comment on \"{}\"", post_title),
        text: format!(
            "{} commented on your post \"{}\":\n\n{}\n\n{}/posts/{}\n",
            commenter, post_title, preview, base_url, post_slug
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_link_carries_token() {
        let msg = verification_email("https://plinth.example", "a@example.com", "Ada", "tok");
        assert_eq!(msg.to, "a@example.com");
        assert!(msg.text.contains("https://plinth.example/verify-email?token=tok"));
        assert!(msg.text.starts_with("Hi Ada"));
    }

    #[test]
    fn reset_link_carries_token() {
        let msg = password_reset_email("http://localhost:3000", "a@example.com", "Ada", "r3s3t");
        assert!(msg.text.contains("/reset-password?token=r3s3t"));
    }

    #[test]
    fn comment_preview_is_truncated() {
        let long = "x".repeat(400);
        let msg = new_comment_email("http://h", "a@example.com", "Bob", "Title", "title", &long);
        assert!(msg.subject.contains("Title"));
        assert!(msg.text.contains(&format!("{}...", "x".repeat(280))));
        assert!(!msg.text.contains(&"x".repeat(281)));
        assert!(msg.text.contains("http://h/posts/title"));
    }

    #[test]
    fn message_survives_job_payload_encoding() {
        let msg = verification_email("http://h", "a@example.com", "Ada", "t");
        let payload = serde_json::to_value(&msg).unwrap();
        let back: EmailMessage = serde_json::from_value(payload).unwrap();
        assert_eq!(back, msg);
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let msg = verification_email("http://h", "a@example.com", "Ada", "t");
        assert!(LogMailer.send(&msg).await.is_ok());
    }

    #[test]
    fn mailer_choice_follows_config() {
        let config = EmailConfig {
            api_url: Some("http://relay.local/send".to_string()),
            api_key: None,
            from: "no-reply@localhost".to_string(),
            timeout_secs: 5,
        };
        assert!(build_mailer(&config).is_ok());
    }
}
