//! Repository for the `tasks` table.
//!
//! `uq_tasks_pending_action` rejects a second unprocessed task with the
//! same action descriptor; callers map that violation to a duplicate error.

use hpcalloc_core::lifecycle::TaskDecision;
use hpcalloc_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;

use crate::models::task::{CreateTask, Task};

const COLUMNS: &str = "\
    id, action, author_id, approver_id, user_id, project_id, decision, \
    processed, done, result, comment, created_at, processed_at, done_at";

/// Provides queue operations for administrative tasks.
pub struct TaskRepo;

impl TaskRepo {
    pub async fn create<'e>(db: impl PgExecutor<'e>, input: &CreateTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (action, author_id, user_id, project_id, comment) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(input.action.to_string())
            .bind(input.author_id)
            .bind(input.action.user_id())
            .bind(input.action.project_id())
            .bind(&input.comment)
            .fetch_one(db)
            .await
    }

    pub async fn find_by_id<'e>(db: impl PgExecutor<'e>, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// The unprocessed task for `action`, if one is queued.
    pub async fn find_pending_by_action<'e>(
        db: impl PgExecutor<'e>,
        action: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE action = $1 AND NOT processed");
        sqlx::query_as::<_, Task>(&query)
            .bind(action)
            .fetch_optional(db)
            .await
    }

    /// Set the processed latch. Returns `None` if it was already set.
    pub async fn decide<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        decision: TaskDecision,
        approver_id: DbId,
        at: Timestamp,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET processed = true, decision = $2, approver_id = $3, processed_at = $4 \
             WHERE id = $1 AND NOT processed RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(decision.as_str())
            .bind(approver_id)
            .bind(at)
            .fetch_optional(db)
            .await
    }

    /// Set the done latch on an accepted task.
    pub async fn complete<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        result: &str,
        at: Timestamp,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET done = true, result = $2, done_at = $3 \
             WHERE id = $1 AND processed AND decision = 'accept' AND NOT done \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(result)
            .bind(at)
            .fetch_optional(db)
            .await
    }

    /// Undecided tasks, oldest first.
    pub async fn list_pending<'e>(db: impl PgExecutor<'e>) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE NOT processed ORDER BY created_at, id");
        sqlx::query_as::<_, Task>(&query).fetch_all(db).await
    }
}
