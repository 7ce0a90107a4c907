//! Daily accounting samples pulled from the batch scheduler.

use chrono::NaiveDate;
use hpcalloc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `accounting_samples` table.
///
/// `user_login = None` marks the project-wide total row.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AccountingSample {
    pub id: DbId,
    pub project_id: DbId,
    pub resource_id: DbId,
    pub user_login: Option<String>,
    pub day: NaiveDate,
    pub cpu_hours: i64,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateAccountingSample {
    pub project_id: DbId,
    pub resource_id: DbId,
    pub user_login: Option<String>,
    pub day: NaiveDate,
    pub cpu_hours: i64,
}
