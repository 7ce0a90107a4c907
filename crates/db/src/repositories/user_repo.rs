//! Repository for the `users` and `user_edits` tables.

use hpcalloc_core::profile::UserProfile;
use hpcalloc_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::user::{CreateUser, User, UserEdit};

const COLUMNS: &str = "\
    id, login, first_name, last_name, email, phone, lab, position, \
    active, created_at, updated_at";

const EDIT_COLUMNS: &str = "\
    id, user_id, first_name, last_name, email, phone, lab, position, created_at";

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    pub async fn create<'e>(db: impl PgExecutor<'e>, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (login, first_name, last_name, email, phone, lab, position, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        let p = &input.profile;
        sqlx::query_as::<_, User>(&query)
            .bind(&input.login)
            .bind(&p.first_name)
            .bind(&p.last_name)
            .bind(&p.email)
            .bind(&p.phone)
            .bind(&p.lab)
            .bind(&p.position)
            .bind(input.active)
            .fetch_one(db)
            .await
    }

    pub async fn find_by_id<'e>(db: impl PgExecutor<'e>, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Case-insensitive lookup by email address.
    pub async fn find_by_email<'e>(
        db: impl PgExecutor<'e>,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE lower(email) = lower($1)");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(db)
            .await
    }

    /// Returns `None` if the user does not exist.
    pub async fn set_active<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        active: bool,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET active = $2, updated_at = NOW() WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(active)
            .fetch_optional(db)
            .await
    }

    /// Overwrite the editable profile fields.
    pub async fn apply_profile<'e>(
        db: impl PgExecutor<'e>,
        id: DbId,
        profile: &UserProfile,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET first_name = $2, last_name = $3, email = $4, phone = $5, \
             lab = $6, position = $7, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.email)
            .bind(&profile.phone)
            .bind(&profile.lab)
            .bind(&profile.position)
            .fetch_optional(db)
            .await
    }
}

/// Provides staging operations for pending profile edits.
pub struct UserEditRepo;

impl UserEditRepo {
    /// Stage an edit, replacing any edit already staged for the user.
    pub async fn upsert<'e>(
        db: impl PgExecutor<'e>,
        user_id: DbId,
        profile: &UserProfile,
    ) -> Result<UserEdit, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_edits (user_id, first_name, last_name, email, phone, lab, position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) DO UPDATE SET \
                first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name, \
                email = EXCLUDED.email, phone = EXCLUDED.phone, lab = EXCLUDED.lab, \
                position = EXCLUDED.position, created_at = NOW() \
             RETURNING {EDIT_COLUMNS}"
        );
        sqlx::query_as::<_, UserEdit>(&query)
            .bind(user_id)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.email)
            .bind(&profile.phone)
            .bind(&profile.lab)
            .bind(&profile.position)
            .fetch_one(db)
            .await
    }

    pub async fn find_by_user<'e>(
        db: impl PgExecutor<'e>,
        user_id: DbId,
    ) -> Result<Option<UserEdit>, sqlx::Error> {
        let query = format!("SELECT {EDIT_COLUMNS} FROM user_edits WHERE user_id = $1");
        sqlx::query_as::<_, UserEdit>(&query)
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    pub async fn delete_by_user<'e>(db: impl PgExecutor<'e>, user_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_edits WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
