//! Repository for the `resources` table.
//!
//! At most one row per project has `valid = true`; `uq_resources_current`
//! enforces it, so [`ResourceRepo::invalidate_current`] must run before a
//! replacement row is inserted.

use hpcalloc_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;

use crate::models::resource::{CreateResource, Resource};

const COLUMNS: &str = "\
    id, project_id, cpu, ttl, valid, approver_id, extension_id, comment, created_at";

/// Provides allocation queries and mutations.
pub struct ResourceRepo;

impl ResourceRepo {
    /// Insert a new valid allocation.
    pub async fn create<'e>(db: impl PgExecutor<'e>, input: &CreateResource) -> Result<Resource, sqlx::Error> {
        let query = format!(
            "INSERT INTO resources (project_id, cpu, ttl, valid, approver_id, extension_id, comment, created_at) \
             VALUES ($1, $2, $3, true, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(input.project_id)
            .bind(input.cpu)
            .bind(input.ttl)
            .bind(input.approver_id)
            .bind(input.extension_id)
            .bind(&input.comment)
            .bind(input.created_at)
            .fetch_one(db)
            .await
    }

    pub async fn find_by_id<'e>(db: impl PgExecutor<'e>, id: DbId) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM resources WHERE id = $1");
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// The allocation the project currently points at.
    pub async fn find_current<'e>(
        db: impl PgExecutor<'e>,
        project_id: DbId,
    ) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM resources \
             WHERE id = (SELECT resource_id FROM projects WHERE id = $1)"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(project_id)
            .fetch_optional(db)
            .await
    }

    /// Mark every valid allocation of the project as superseded.
    pub async fn invalidate_current<'e>(
        db: impl PgExecutor<'e>,
        project_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE resources SET valid = false WHERE project_id = $1 AND valid")
            .bind(project_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Add hours in place and mark the allocation valid again.
    ///
    /// The increment is applied in SQL so concurrent extensions commute.
    pub async fn add_hours<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        hours: i64,
        comment: &str,
    ) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!(
            "UPDATE resources SET cpu = cpu + $2, valid = true, \
                comment = CASE WHEN comment IS NULL OR comment = '' THEN $3 \
                               ELSE comment || E'\\n' || $3 END \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .bind(hours)
            .bind(comment)
            .fetch_optional(db)
            .await
    }

    pub async fn set_valid<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        valid: bool,
    ) -> Result<Option<Resource>, sqlx::Error> {
        let query = format!("UPDATE resources SET valid = $2 WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Resource>(&query)
            .bind(id)
            .bind(valid)
            .fetch_optional(db)
            .await
    }

    /// Every allocation ever granted to the project, newest first.
    pub async fn list_for_project<'e>(
        db: impl PgExecutor<'e>,
        project_id: DbId,
    ) -> Result<Vec<Resource>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM resources WHERE project_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(project_id)
            .fetch_all(db)
            .await
    }

    /// Current allocations of active projects expiring before `before`.
    pub async fn list_current_expiring<'e>(
        db: impl PgExecutor<'e>,
        before: Timestamp,
    ) -> Result<Vec<Resource>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM resources \
             WHERE id IN (SELECT resource_id FROM projects WHERE active AND resource_id IS NOT NULL) \
               AND ttl < $1 \
             ORDER BY ttl"
        );
        sqlx::query_as::<_, Resource>(&query)
            .bind(before)
            .fetch_all(db)
            .await
    }

    /// Current allocations of every active project.
    pub async fn list_current_active<'e>(db: impl PgExecutor<'e>) -> Result<Vec<Resource>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM resources \
             WHERE id IN (SELECT resource_id FROM projects WHERE active AND resource_id IS NOT NULL) \
             ORDER BY project_id"
        );
        sqlx::query_as::<_, Resource>(&query).fetch_all(db).await
    }
}
