//! Extension-request models.

use hpcalloc_core::error::CoreError;
use hpcalloc_core::lifecycle::ExtensionState;
use hpcalloc_core::request_kind::RequestKind;
use hpcalloc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `extensions` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ExtensionRequest {
    pub id: DbId,
    pub project_id: DbId,
    pub resource_id: Option<DbId>,
    pub author_id: DbId,
    pub approver_id: Option<DbId>,
    pub kind: String,
    pub transform_type: Option<String>,
    pub hours: i64,
    pub reason: String,
    pub exceptional: bool,
    pub present_use: i64,
    pub present_total: i64,
    pub usage_percent: String,
    pub processed: bool,
    pub accepted: bool,
    pub ignored: bool,
    pub done: bool,
    pub decision: Option<String>,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub done_at: Option<Timestamp>,
}

impl ExtensionRequest {
    pub fn state(&self) -> ExtensionState {
        ExtensionState::from_flags(self.processed, self.accepted, self.done, self.ignored)
    }

    pub fn request_kind(&self) -> Result<RequestKind, CoreError> {
        RequestKind::from_parts(&self.kind, self.transform_type.as_deref())
    }
}

/// DTO for a newly submitted request, including the usage snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateExtension {
    pub project_id: DbId,
    pub resource_id: Option<DbId>,
    pub author_id: DbId,
    pub kind: RequestKind,
    pub hours: i64,
    pub reason: String,
    pub exceptional: bool,
    pub present_use: i64,
    pub present_total: i64,
    pub usage_percent: String,
}

/// Latch values written by accept / reject / ignore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDecision {
    pub approver_id: DbId,
    pub accepted: bool,
    pub ignored: bool,
    pub decided_at: Timestamp,
    pub decision: Option<String>,
    /// Replaces the requested kind when the approver overrides extend/renew.
    pub kind: Option<RequestKind>,
    /// Replaces the requested hours when the approver overrides them.
    pub hours: Option<i64>,
}
