//! Repository for the `extensions` table.
//!
//! Decisions and completion are compare-and-set updates: the `WHERE`
//! clause re-checks the latch, so a lost race returns `None` instead of
//! overwriting another caller's decision.

use hpcalloc_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;

use crate::models::extension::{CreateExtension, ExtensionDecision, ExtensionRequest};

const COLUMNS: &str = "\
    id, project_id, resource_id, author_id, approver_id, kind, transform_type, \
    hours, reason, exceptional, present_use, present_total, usage_percent, \
    processed, accepted, ignored, done, decision, created_at, processed_at, done_at";

/// Provides CRUD and latch operations for extension requests.
pub struct ExtensionRepo;

impl ExtensionRepo {
    pub async fn create<'e>(
        db: impl PgExecutor<'e>,
        input: &CreateExtension,
    ) -> Result<ExtensionRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO extensions \
                (project_id, resource_id, author_id, kind, transform_type, hours, reason, \
                 exceptional, present_use, present_total, usage_percent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(input.project_id)
            .bind(input.resource_id)
            .bind(input.author_id)
            .bind(input.kind.as_str())
            .bind(input.kind.transform_type())
            .bind(input.hours)
            .bind(&input.reason)
            .bind(input.exceptional)
            .bind(input.present_use)
            .bind(input.present_total)
            .bind(&input.usage_percent)
            .fetch_one(db)
            .await
    }

    pub async fn find_by_id<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<ExtensionRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM extensions WHERE id = $1");
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Set the processed latch. Returns `None` if it was already set.
    pub async fn decide<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        decision: &ExtensionDecision,
    ) -> Result<Option<ExtensionRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE extensions SET processed = true, accepted = $2, ignored = $3, \
                approver_id = $4, processed_at = $5, decision = $6, \
                kind = COALESCE($7, kind), hours = COALESCE($8, hours) \
             WHERE id = $1 AND NOT processed \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(id)
            .bind(decision.accepted)
            .bind(decision.ignored)
            .bind(decision.approver_id)
            .bind(decision.decided_at)
            .bind(&decision.decision)
            .bind(decision.kind.as_ref().map(|k| k.as_str()))
            .bind(decision.hours)
            .fetch_optional(db)
            .await
    }

    /// Set the done latch. Returns `None` unless the request was accepted
    /// and not yet done.
    pub async fn mark_done<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        at: Timestamp,
    ) -> Result<Option<ExtensionRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE extensions SET done = true, done_at = $2 \
             WHERE id = $1 AND processed AND accepted AND NOT done \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(id)
            .bind(at)
            .fetch_optional(db)
            .await
    }

    pub async fn list_for_project<'e>(
        db: impl PgExecutor<'e>,
        project_id: DbId,
    ) -> Result<Vec<ExtensionRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM extensions WHERE project_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ExtensionRequest>(&query)
            .bind(project_id)
            .fetch_all(db)
            .await
    }

    /// Requests still waiting for a decision, oldest first.
    pub async fn list_pending<'e>(db: impl PgExecutor<'e>) -> Result<Vec<ExtensionRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM extensions WHERE NOT processed ORDER BY created_at, id");
        sqlx::query_as::<_, ExtensionRequest>(&query).fetch_all(db).await
    }

    /// Accepted requests whose allocation change has not run yet.
    pub async fn list_awaiting_execution<'e>(
        db: impl PgExecutor<'e>,
    ) -> Result<Vec<ExtensionRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM extensions \
             WHERE processed AND accepted AND NOT done ORDER BY processed_at, id"
        );
        sqlx::query_as::<_, ExtensionRequest>(&query).fetch_all(db).await
    }
}
