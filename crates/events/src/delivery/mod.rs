//! Notification delivery channels.

pub mod email;
pub mod log;
pub mod memory;
