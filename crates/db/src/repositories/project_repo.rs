//! Repository for the `projects` and `project_members` tables.

use hpcalloc_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::project::{CreateProject, Project, ProjectRetype};
use crate::models::user::User;

const COLUMNS: &str = "\
    id, name, title, type_code, type_label, active, responsible_id, \
    resource_id, registration_id, created_at, updated_at";

/// Provides CRUD operations for projects and their membership.
pub struct ProjectRepo;

impl ProjectRepo {
    pub async fn create<'e>(db: impl PgExecutor<'e>, input: &CreateProject) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (name, title, type_code, type_label, responsible_id, registration_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(&input.name)
            .bind(&input.title)
            .bind(&input.type_code)
            .bind(&input.type_label)
            .bind(input.responsible_id)
            .bind(input.registration_id)
            .fetch_one(db)
            .await
    }

    pub async fn find_by_id<'e>(db: impl PgExecutor<'e>, id: DbId) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Lock the project row for the rest of the transaction.
    pub async fn find_by_id_for_update<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Oldest project carrying `title`.
    pub async fn find_by_title<'e>(
        db: impl PgExecutor<'e>,
        title: &str,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE title = $1 ORDER BY id LIMIT 1");
        sqlx::query_as::<_, Project>(&query)
            .bind(title)
            .fetch_optional(db)
            .await
    }

    /// Point the project at a new current allocation.
    pub async fn set_resource<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        resource_id: DbId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects SET resource_id = $2, updated_at = NOW() WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(resource_id)
            .fetch_optional(db)
            .await
    }

    pub async fn retype<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        change: &ProjectRetype,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects SET name = $2, type_code = $3, type_label = $4, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(&change.name)
            .bind(&change.type_code)
            .bind(&change.type_label)
            .fetch_optional(db)
            .await
    }

    /// Flip the active flag. Returns `None` when the project is missing or
    /// already in the requested state.
    pub async fn set_active<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        active: bool,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects SET active = $2, updated_at = NOW() \
             WHERE id = $1 AND active <> $2 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(active)
            .fetch_optional(db)
            .await
    }

    pub async fn set_responsible<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects SET responsible_id = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    /// Idempotent: adding an existing member is a no-op.
    pub async fn add_member<'e>(
        db: impl PgExecutor<'e>,
        project_id: DbId,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO project_members (project_id, user_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(project_id)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_member<'e>(
        db: impl PgExecutor<'e>,
        project_id: DbId,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_members<'e>(
        db: impl PgExecutor<'e>,
        project_id: DbId,
    ) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT u.id, u.login, u.first_name, u.last_name, u.email, u.phone, u.lab, \
                    u.position, u.active, u.created_at, u.updated_at \
             FROM users u JOIN project_members m ON m.user_id = u.id \
             WHERE m.project_id = $1 ORDER BY u.id",
        )
        .bind(project_id)
        .fetch_all(db)
        .await
    }
}
