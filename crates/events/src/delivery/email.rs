//! Email notification delivery via SMTP.
//!
//! [`EmailDelivery`] wraps the `lettre` async SMTP transport. Configuration
//! is loaded from environment variables; if `SMTP_HOST` is not set,
//! [`EmailConfig::from_env`] returns `None` and the log-only notifier
//! should be used instead.

use std::path::Path;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::notification::{Notification, Notifier, NotifyError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// A recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// An attachment could not be read from disk.
    #[error("Attachment {path} could not be read: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@hpc.local";

/// Prefix prepended to every subject line.
const SUBJECT_PREFIX: &str = "[HPC]";

/// Configuration for the SMTP email delivery service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable        | Required | Default             |
    /// |-----------------|----------|---------------------|
    /// | `SMTP_HOST`     | yes      |                     |
    /// | `SMTP_PORT`     | no       | `587`               |
    /// | `SMTP_FROM`     | no       | `noreply@hpc.local` |
    /// | `SMTP_USER`     | no       |                     |
    /// | `SMTP_PASSWORD` | no       |                     |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailDelivery
// ---------------------------------------------------------------------------

/// Sends notifications as emails via SMTP.
pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Assemble the MIME message, reading attachments from disk.
    pub async fn build_message(&self, notification: &Notification) -> Result<Message, EmailError> {
        let mut builder = Message::builder()
            .from(self.config.from_address.parse()?)
            .subject(format!("{SUBJECT_PREFIX} {}", notification.subject));
        for to in &notification.to {
            builder = builder.to(to.parse::<Mailbox>()?);
        }
        for cc in &notification.cc {
            builder = builder.cc(cc.parse::<Mailbox>()?);
        }

        if notification.attachments.is_empty() {
            return builder
                .header(ContentType::TEXT_PLAIN)
                .body(notification.body.clone())
                .map_err(|e| EmailError::Build(e.to_string()));
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(notification.body.clone()));
        for path in &notification.attachments {
            parts = parts.singlepart(attachment_part(path).await?);
        }
        builder
            .multipart(parts)
            .map_err(|e| EmailError::Build(e.to_string()))
    }
}

async fn attachment_part(path: &Path) -> Result<SinglePart, EmailError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| EmailError::Attachment {
            path: path.display().to_string(),
            source,
        })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|e| EmailError::Build(e.to_string()))?;
    Ok(Attachment::new(filename).body(content, content_type))
}

#[async_trait]
impl Notifier for EmailDelivery {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if notification.to.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        let email = self.build_message(notification).await?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(EmailError::from)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await.map_err(EmailError::from)?;

        tracing::info!(
            to = ?notification.to,
            subject = %notification.subject,
            "Notification email sent"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
