//! Project models.

use hpcalloc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `projects` table.
///
/// `resource_id` points at the current allocation; superseded allocations
/// keep their `project_id` but are no longer referenced here.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub name: String,
    pub title: String,
    pub type_code: String,
    pub type_label: String,
    pub active: bool,
    pub responsible_id: Option<DbId>,
    pub resource_id: Option<DbId>,
    pub registration_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub title: String,
    pub type_code: String,
    pub type_label: String,
    pub responsible_id: Option<DbId>,
    pub registration_id: Option<DbId>,
}

/// Type change applied when a project is transformed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectRetype {
    pub name: String,
    pub type_code: String,
    pub type_label: String,
}
