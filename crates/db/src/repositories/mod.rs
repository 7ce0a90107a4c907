//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept a `PgExecutor` as the first argument.

pub mod accounting_repo;
pub mod extension_repo;
pub mod log_event_repo;
pub mod project_repo;
pub mod registration_repo;
pub mod resource_repo;
pub mod task_repo;
pub mod user_repo;

pub use accounting_repo::AccountingSampleRepo;
pub use extension_repo::ExtensionRepo;
pub use log_event_repo::LogEventRepo;
pub use project_repo::ProjectRepo;
pub use registration_repo::{RegistrationCommentRepo, RegistrationRepo};
pub use resource_repo::ResourceRepo;
pub use task_repo::TaskRepo;
pub use user_repo::{UserEditRepo, UserRepo};
