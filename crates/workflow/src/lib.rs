//! Request workflow engine for compute-allocation management.
//!
//! - [`Engine`]: extension requests, registrations, the task queue, direct
//!   allocation changes, expiry sweeps and usage collection.
//! - [`AllocationLifecycle`]: turns per-type policy into allocation plans.
//! - [`store::RecordStore`]: transactional persistence seam with Postgres
//!   and in-memory backends.
//! - [`render::DocumentRenderer`]: visa document generation.
//!
//! Every operation returns a [`Transition`] carrying the committed record
//! and the domain events to dispatch.

pub mod allocation;
pub mod config;
pub mod engine;
pub mod error;
pub mod extension;
pub mod mail;
pub mod projects;
pub mod registration;
pub mod render;
pub mod store;
pub mod sweep;
pub mod tasks;
pub mod transition;
pub mod usage;

pub use allocation::{AllocationLifecycle, Provenance};
pub use config::EngineConfig;
pub use engine::{Clock, Engine};
pub use error::{StoreError, StoreResult, WorkflowError, WorkflowResult};
pub use extension::{AcceptOptions, ExtensionSubmission};
pub use registration::RegistrationForm;
pub use render::{DocumentRenderer, PlainTextRenderer, RenderError};
pub use transition::Transition;
pub use store::memory::MemoryStore;
pub use store::postgres::PgStore;
pub use store::RecordStore;
