//! Fallback channel used when SMTP is not configured.

use async_trait::async_trait;

use crate::notification::{Notification, Notifier, NotifyError};

/// Writes each notification to the tracing log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if notification.to.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        tracing::info!(
            to = ?notification.to,
            cc = ?notification.cc,
            subject = %notification.subject,
            attachments = notification.attachments.len(),
            "Notification not sent (SMTP not configured)"
        );
        Ok(())
    }
}
