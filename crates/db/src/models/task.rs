//! Administrative task models.

use hpcalloc_core::error::CoreError;
use hpcalloc_core::lifecycle::TaskDecision;
use hpcalloc_core::task_action::TaskAction;
use hpcalloc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub action: String,
    pub author_id: DbId,
    pub approver_id: Option<DbId>,
    pub user_id: Option<DbId>,
    pub project_id: Option<DbId>,
    pub decision: Option<String>,
    pub processed: bool,
    pub done: bool,
    pub result: Option<String>,
    pub comment: Option<String>,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub done_at: Option<Timestamp>,
}

impl Task {
    pub fn task_action(&self) -> Result<TaskAction, CoreError> {
        self.action.parse()
    }

    pub fn task_decision(&self) -> Option<TaskDecision> {
        self.decision.as_deref().and_then(|d| d.parse().ok())
    }
}

/// DTO for queueing a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub action: TaskAction,
    pub author_id: DbId,
    pub comment: Option<String>,
}

/// Side effect applied atomically with task completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEffect {
    ActivateUser { user_id: DbId },
    AddMember { user_id: DbId, project_id: DbId },
    RemoveMember { user_id: DbId, project_id: DbId },
    SetResponsible { user_id: DbId, project_id: DbId },
    /// Copy the staged profile onto the user and drop the staging row.
    ApplyProfileEdit { user_id: DbId },
}
