//! Repository for the `registrations` and `registration_comments` tables.

use hpcalloc_core::registration::CommitteeDecision;
use hpcalloc_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::registration::{
    CreateRegistration, Registration, RegistrationComment, RegistrationStep,
};

const COLUMNS: &str = "\
    id, title, description, scientific_fields, type_code, cpu_hours, \
    responsible_first_name, responsible_last_name, responsible_email, \
    responsible_phone, responsible_lab, responsible_position, \
    approve, approve_ts, approver_id, accepted, accepted_ts, visa, \
    processed, processed_ts, committee, decision, project_id, created_at";

const COMMENT_COLUMNS: &str = "id, registration_id, author_id, body, created_at";

/// Provides CRUD and step operations for registrations.
pub struct RegistrationRepo;

impl RegistrationRepo {
    pub async fn create<'e>(
        db: impl PgExecutor<'e>,
        input: &CreateRegistration,
    ) -> Result<Registration, sqlx::Error> {
        let query = format!(
            "INSERT INTO registrations \
                (title, description, scientific_fields, type_code, cpu_hours, \
                 responsible_first_name, responsible_last_name, responsible_email, \
                 responsible_phone, responsible_lab, responsible_position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        let r = &input.responsible;
        sqlx::query_as::<_, Registration>(&query)
            .bind(&input.title)
            .bind(&input.description)
            .bind(&input.scientific_fields)
            .bind(&input.type_code)
            .bind(input.cpu_hours)
            .bind(&r.first_name)
            .bind(&r.last_name)
            .bind(&r.email)
            .bind(&r.phone)
            .bind(&r.lab)
            .bind(&r.position)
            .fetch_one(db)
            .await
    }

    pub async fn find_by_id<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<Registration>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM registrations WHERE id = $1");
        sqlx::query_as::<_, Registration>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Apply one workflow step with its guard re-checked in SQL.
    ///
    /// Returns `None` when the row no longer satisfies the step's
    /// precondition (lost race or repeated call).
    pub async fn apply_step<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        step: &RegistrationStep,
    ) -> Result<Option<Registration>, sqlx::Error> {
        match step {
            RegistrationStep::Approve { approver_id, at } => {
                let query = format!(
                    "UPDATE registrations SET approve = true, approve_ts = $2, approver_id = $3 \
                     WHERE id = $1 AND NOT approve AND NOT processed \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Registration>(&query)
                    .bind(id)
                    .bind(at)
                    .bind(approver_id)
                    .fetch_optional(db)
                    .await
            }
            RegistrationStep::Visa {
                outcome,
                at,
                resend,
            } => {
                let query = format!(
                    "UPDATE registrations SET accepted = true, accepted_ts = $2, visa = $3 \
                     WHERE id = $1 AND approve AND NOT processed AND ($4 OR NOT accepted) \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Registration>(&query)
                    .bind(id)
                    .bind(at)
                    .bind(outcome.as_str())
                    .bind(resend)
                    .fetch_optional(db)
                    .await
            }
            RegistrationStep::Committee { decision, note, at } => {
                let needs_visa = *decision == CommitteeDecision::Accepted;
                let query = format!(
                    "UPDATE registrations SET processed = true, processed_ts = $2, \
                        committee = $3, decision = $4 \
                     WHERE id = $1 AND NOT processed AND (NOT $5 OR accepted) \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Registration>(&query)
                    .bind(id)
                    .bind(at)
                    .bind(decision.as_str())
                    .bind(note)
                    .bind(needs_visa)
                    .fetch_optional(db)
                    .await
            }
        }
    }

    /// Registrations without a committee decision, oldest first.
    pub async fn list_pending<'e>(db: impl PgExecutor<'e>) -> Result<Vec<Registration>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM registrations WHERE NOT processed ORDER BY created_at, id"
        );
        sqlx::query_as::<_, Registration>(&query).fetch_all(db).await
    }

    pub async fn link_project<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        project_id: DbId,
    ) -> Result<Option<Registration>, sqlx::Error> {
        let query = format!(
            "UPDATE registrations SET project_id = $2 WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Registration>(&query)
            .bind(id)
            .bind(project_id)
            .fetch_optional(db)
            .await
    }
}

/// Provides the append-only comment history of a registration.
pub struct RegistrationCommentRepo;

impl RegistrationCommentRepo {
    pub async fn create<'e>(
        db: impl PgExecutor<'e>,
        registration_id: DbId,
        author_id: Option<DbId>,
        body: &str,
    ) -> Result<RegistrationComment, sqlx::Error> {
        let query = format!(
            "INSERT INTO registration_comments (registration_id, author_id, body) \
             VALUES ($1, $2, $3) RETURNING {COMMENT_COLUMNS}"
        );
        sqlx::query_as::<_, RegistrationComment>(&query)
            .bind(registration_id)
            .bind(author_id)
            .bind(body)
            .fetch_one(db)
            .await
    }

    /// Oldest first.
    pub async fn list_for_registration<'e>(
        db: impl PgExecutor<'e>,
        registration_id: DbId,
    ) -> Result<Vec<RegistrationComment>, sqlx::Error> {
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM registration_comments \
             WHERE registration_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, RegistrationComment>(&query)
            .bind(registration_id)
            .fetch_all(db)
            .await
    }
}
