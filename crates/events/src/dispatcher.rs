//! Post-commit notification dispatch.
//!
//! [`NotificationDispatcher`] consumes the events of a committed transition.
//! Each event is published on the bus and its notification, if any, is sent
//! on a detached task. Delivery failures are logged and never reach the
//! caller: the transition has already committed.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::bus::{DomainEvent, EventBus};
use crate::notification::Notifier;

/// Fans committed events out to the bus and the notifier.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    bus: Arc<EventBus>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, bus: Arc<EventBus>) -> Self {
        Self { notifier, bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Fire and forget. Returns the delivery handles for callers that want
    /// to wait; dropping them does not cancel delivery.
    pub fn dispatch(&self, events: Vec<DomainEvent>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for event in events {
            tracing::info!(
                category = %event.category,
                log_event_id = ?event.log_event_id,
                actor_id = ?event.actor_id,
                description = %event.description,
                "Workflow event"
            );

            if let Some(notification) = event.notification.clone() {
                let notifier = Arc::clone(&self.notifier);
                let category = event.category.clone();
                handles.push(tokio::spawn(async move {
                    match notifier.send(&notification).await {
                        Ok(()) => tracing::debug!(
                            category = %category,
                            to = ?notification.to,
                            "Notification delivered"
                        ),
                        Err(e) => tracing::warn!(
                            error = %e,
                            category = %category,
                            to = ?notification.to,
                            "Notification delivery failed"
                        ),
                    }
                }));
            }

            self.bus.publish(event);
        }
        handles
    }

    /// Dispatch and wait until every delivery attempt has finished.
    pub async fn dispatch_and_wait(&self, events: Vec<DomainEvent>) {
        for result in join_all(self.dispatch(events)).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Notification task panicked");
            }
        }
    }
}
