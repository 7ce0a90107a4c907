use crate::types::{DbId, Timestamp};

/// Domain errors raised by the workflow rules.
///
/// Guard violations and input validation are recovered into these variants
/// and surfaced to the caller; none of them is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A request field is malformed or missing.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The processed latch is already set on the record.
    #[error("{entity} {id} has already been processed")]
    AlreadyProcessed { entity: &'static str, id: DbId },

    /// The record is not in a state that allows the requested action.
    #[error("Cannot {action} {entity} {id} in state {from}")]
    InvalidStateTransition {
        entity: &'static str,
        id: DbId,
        from: String,
        action: &'static str,
    },

    /// An unprocessed task with the same action descriptor already exists.
    #[error("Duplicate task: an unprocessed task for '{0}' already exists")]
    DuplicateTask(String),

    /// The project referenced by a request does not exist.
    #[error("Project not found: {0}")]
    MissingProject(String),

    /// A referenced entity does not exist.
    #[error("Entity not found: {entity} with id {id}")]
    MissingEntity { entity: &'static str, id: DbId },

    /// The visa for a registration was already sent.
    #[error("Visa for registration {0} was already sent")]
    AlreadySent(DbId),

    /// The computed expiry is not strictly after the reference time.
    #[error("Computed TTL {ttl} is not after {now}")]
    PastTtl { ttl: Timestamp, now: Timestamp },

    /// Deployment configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::InvalidInput`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    /// Whether the error is a latch or state-machine guard violation.
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            CoreError::AlreadyProcessed { .. }
                | CoreError::InvalidStateTransition { .. }
                | CoreError::AlreadySent(_)
        )
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::InvalidInput(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_processed_message_names_entity() {
        let err = CoreError::AlreadyProcessed {
            entity: "extension",
            id: 12,
        };
        assert_eq!(err.to_string(), "extension 12 has already been processed");
        assert!(err.is_guard_violation());
    }

    #[test]
    fn invalid_input_is_not_a_guard_violation() {
        assert!(!CoreError::invalid("reason is empty").is_guard_violation());
    }
}
