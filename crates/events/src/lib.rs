//! Domain events and notification delivery for the allocation workflow.
//!
//! - [`DomainEvent`]: what a committed transition reports, with an optional
//!   outbound [`Notification`].
//! - [`EventBus`]: in-process fan-out for observers of committed events.
//! - [`Notifier`]: delivery channel; SMTP via [`EmailDelivery`] or the
//!   log-only fallback.
//! - [`NotificationDispatcher`]: sends notifications after commit without
//!   ever failing the transition that produced them.

pub mod bus;
pub mod delivery;
pub mod dispatcher;
pub mod notification;

pub use bus::{DomainEvent, EventBus, Subject};
pub use delivery::email::{EmailConfig, EmailDelivery, EmailError};
pub use delivery::log::LogNotifier;
pub use delivery::memory::RecordingNotifier;
pub use dispatcher::NotificationDispatcher;
pub use notification::{Notification, Notifier, NotifyError};
