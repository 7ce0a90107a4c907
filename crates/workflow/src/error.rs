use hpcalloc_core::error::CoreError;
use hpcalloc_core::types::DbId;

use crate::render::RenderError;

/// Errors raised by a [`RecordStore`](crate::store::RecordStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// A compare-and-set lost its race or a unique index rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match hpcalloc_db::unique_violation(&err) {
            Some(constraint) => StoreError::Conflict(constraint.to_string()),
            None => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                WorkflowError::Core(CoreError::MissingEntity { entity, id })
            }
            other => WorkflowError::Store(other),
        }
    }
}

impl From<validator::ValidationErrors> for WorkflowError {
    fn from(errors: validator::ValidationErrors) -> Self {
        WorkflowError::Core(errors.into())
    }
}

impl WorkflowError {
    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            WorkflowError::Core(e) => Some(e),
            _ => None,
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
