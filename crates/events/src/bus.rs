//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans committed [`DomainEvent`]s out to any observer. It is
//! shared via `Arc<EventBus>`; publishing never blocks and never fails.

use chrono::{DateTime, Utc};
use hpcalloc_core::types::DbId;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::notification::Notification;

// ---------------------------------------------------------------------------
// Subject
// ---------------------------------------------------------------------------

/// The records an event is about. Mirrors the references of its audit row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub project_id: Option<DbId>,
    pub user_id: Option<DbId>,
    pub extension_id: Option<DbId>,
    pub registration_id: Option<DbId>,
    pub task_id: Option<DbId>,
}

impl Subject {
    pub fn project(id: DbId) -> Self {
        Self {
            project_id: Some(id),
            ..Default::default()
        }
    }

    pub fn registration(id: DbId) -> Self {
        Self {
            registration_id: Some(id),
            ..Default::default()
        }
    }

    pub fn task(id: DbId) -> Self {
        Self {
            task_id: Some(id),
            ..Default::default()
        }
    }

    pub fn with_project(mut self, id: Option<DbId>) -> Self {
        self.project_id = id.or(self.project_id);
        self
    }

    pub fn with_user(mut self, id: Option<DbId>) -> Self {
        self.user_id = id.or(self.user_id);
        self
    }

    pub fn with_extension(mut self, id: DbId) -> Self {
        self.extension_id = Some(id);
        self
    }
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// Something that happened in the workflow and has already been committed.
///
/// Built with [`DomainEvent::new`] and enriched with
/// [`with_actor`](DomainEvent::with_actor),
/// [`with_log_id`](DomainEvent::with_log_id) and
/// [`with_notification`](DomainEvent::with_notification).
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    /// Audit category, e.g. `"extended"`.
    pub category: String,
    pub subject: Subject,
    /// Human-readable description, identical to the audit row's text.
    pub description: String,
    pub actor_id: Option<DbId>,
    /// Id of the audit row written in the same transaction.
    pub log_event_id: Option<DbId>,
    #[serde(skip)]
    pub notification: Option<Notification>,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(category: impl Into<String>, subject: Subject, description: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subject,
            description: description.into(),
            actor_id: None,
            log_event_id: None,
            notification: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: Option<DbId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn with_log_id(mut self, id: DbId) -> Self {
        self.log_event_id = Some(id);
        self
    }

    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // A send error only means there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
