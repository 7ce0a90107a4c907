//! Repository for the append-only `log_events` table.

use sqlx::PgExecutor;

use crate::models::log_event::{CreateLogEvent, LogEvent, LogEventQuery};

const COLUMNS: &str = "\
    id, actor_id, category, event, project_id, user_id, extension_id, \
    registration_id, task_id, created_at";

/// Provides insert and history queries for audit entries.
pub struct LogEventRepo;

impl LogEventRepo {
    pub async fn create<'e>(db: impl PgExecutor<'e>, input: &CreateLogEvent) -> Result<LogEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO log_events \
                (actor_id, category, event, project_id, user_id, extension_id, registration_id, task_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LogEvent>(&query)
            .bind(input.actor_id)
            .bind(&input.category)
            .bind(&input.event)
            .bind(input.project_id)
            .bind(input.user_id)
            .bind(input.extension_id)
            .bind(input.registration_id)
            .bind(input.task_id)
            .fetch_one(db)
            .await
    }

    /// Entries matching `filter`, oldest first.
    pub async fn query<'e>(
        db: impl PgExecutor<'e>,
        filter: &LogEventQuery,
    ) -> Result<Vec<LogEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM log_events \
             WHERE ($1::BIGINT IS NULL OR project_id = $1) \
               AND ($2::BIGINT IS NULL OR extension_id = $2) \
               AND ($3::BIGINT IS NULL OR registration_id = $3) \
               AND ($4::BIGINT IS NULL OR task_id = $4) \
               AND ($5::TEXT IS NULL OR category = $5) \
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, LogEvent>(&query)
            .bind(filter.project_id)
            .bind(filter.extension_id)
            .bind(filter.registration_id)
            .bind(filter.task_id)
            .bind(&filter.category)
            .fetch_all(db)
            .await
    }
}
