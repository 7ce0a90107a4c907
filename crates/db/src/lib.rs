//! PostgreSQL persistence for the allocation workflow.
//!
//! Repositories are zero-sized structs whose methods accept any
//! [`sqlx::PgExecutor`], so the same call works against the pool or inside
//! a caller-owned transaction (`&mut *tx`).

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}

/// Name of the unique constraint a write violated, if that is why it failed.
///
/// Only constraints following the `uq_` naming convention are reported.
pub fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => db_err
            .constraint()
            .filter(|name| name.starts_with("uq_")),
        _ => None,
    }
}
