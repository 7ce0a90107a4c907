//! Outbound notification envelope and the delivery trait.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::delivery::email::EmailError;

/// A message to deliver once the producing transition has committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Files attached to the message, e.g. a rendered visa document.
    pub attachments: Vec<PathBuf>,
}

impl Notification {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_cc(mut self, cc: impl IntoIterator<Item = String>) -> Self {
        self.cc.extend(cc);
        self
    }

    pub fn with_attachment(mut self, path: PathBuf) -> Self {
        self.attachments.push(path);
        self
    }

    /// Every address the message goes to, `to` first.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to.iter().chain(self.cc.iter()).map(String::as_str)
    }
}

/// Error type for notification delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification has no recipients")]
    NoRecipients,

    #[error(transparent)]
    Email(#[from] EmailError),
}

/// A delivery channel for [`Notification`]s.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_list_to_before_cc() {
        let n = Notification::new("pi@lab.example", "Subject", "Body")
            .with_cc(vec!["admin@hpc.example".to_string()]);
        let all: Vec<_> = n.recipients().collect();
        assert_eq!(all, vec!["pi@lab.example", "admin@hpc.example"]);
    }
}
