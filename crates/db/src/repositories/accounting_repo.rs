//! Repository for the `accounting_samples` table.

use hpcalloc_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::accounting::{AccountingSample, CreateAccountingSample};

const COLUMNS: &str = "id, project_id, resource_id, user_login, day, cpu_hours, created_at";

/// Provides storage for daily usage samples, one day per row.
pub struct AccountingSampleRepo;

impl AccountingSampleRepo {
    /// Insert or refresh the sample for `(resource, login, day)`.
    pub async fn upsert<'e>(
        db: impl PgExecutor<'e>,
        input: &CreateAccountingSample,
    ) -> Result<AccountingSample, sqlx::Error> {
        let query = format!(
            "INSERT INTO accounting_samples (project_id, resource_id, user_login, day, cpu_hours) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (resource_id, COALESCE(user_login, ''), day) \
             DO UPDATE SET cpu_hours = EXCLUDED.cpu_hours \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountingSample>(&query)
            .bind(input.project_id)
            .bind(input.resource_id)
            .bind(&input.user_login)
            .bind(input.day)
            .bind(input.cpu_hours)
            .fetch_one(db)
            .await
    }

    /// Samples of one allocation, oldest day first.
    pub async fn list_for_resource<'e>(
        db: impl PgExecutor<'e>,
        resource_id: DbId,
    ) -> Result<Vec<AccountingSample>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM accounting_samples WHERE resource_id = $1 \
             ORDER BY day, user_login NULLS FIRST"
        );
        sqlx::query_as::<_, AccountingSample>(&query)
            .bind(resource_id)
            .fetch_all(db)
            .await
    }
}
