//! Row models and create DTOs, one module per table family.

pub mod accounting;
pub mod extension;
pub mod log_event;
pub mod project;
pub mod registration;
pub mod resource;
pub mod task;
pub mod user;
