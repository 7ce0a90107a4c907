//! Allocation (resource) models.

use hpcalloc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `resources` table: a CPU-hour grant with an expiry.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Resource {
    pub id: DbId,
    pub project_id: DbId,
    pub cpu: i64,
    pub ttl: Timestamp,
    pub valid: bool,
    pub approver_id: Option<DbId>,
    pub extension_id: Option<DbId>,
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for inserting a new current allocation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResource {
    pub project_id: DbId,
    pub cpu: i64,
    pub ttl: Timestamp,
    pub approver_id: Option<DbId>,
    pub extension_id: Option<DbId>,
    pub comment: Option<String>,
    /// When the grant starts; consumption is counted from here.
    pub created_at: Timestamp,
}
