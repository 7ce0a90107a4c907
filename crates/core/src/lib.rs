//! Domain rules for the compute-allocation workflow.
//!
//! Everything here is pure: state derivation, guards, policy and TTL
//! arithmetic, usage formatting and descriptor encoding. Persistence,
//! delivery and external accounting live in the other workspace crates.

pub mod audit;
pub mod comment;
pub mod error;
pub mod lifecycle;
pub mod naming;
pub mod policy;
pub mod profile;
pub mod registration;
pub mod request_kind;
pub mod task_action;
pub mod types;
pub mod usage;
