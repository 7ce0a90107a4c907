//! Two-phase processed/done latches for extension requests and tasks.
//!
//! Both entities persist three booleans (or a decision plus two booleans);
//! the state is always derived from them so the columns stay the single
//! source of truth.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Extension requests
// ---------------------------------------------------------------------------

/// Entity name used in extension error messages.
pub const EXTENSION_ENTITY: &str = "extension";

/// Entity name used in task error messages.
pub const TASK_ENTITY: &str = "task";

/// Lifecycle of an allocation-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionState {
    Pending,
    Accepted,
    Rejected,
    Ignored,
    Done,
}

impl ExtensionState {
    /// Derive the state from the persisted latch columns.
    ///
    /// `ignored` distinguishes a silent ignore from a rejection since both
    /// leave `accepted` false.
    pub fn from_flags(processed: bool, accepted: bool, done: bool, ignored: bool) -> Self {
        match (processed, accepted, done) {
            (false, _, _) => ExtensionState::Pending,
            (true, true, true) => ExtensionState::Done,
            (true, true, false) => ExtensionState::Accepted,
            (true, false, _) if ignored => ExtensionState::Ignored,
            (true, false, _) => ExtensionState::Rejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtensionState::Pending => "PENDING",
            ExtensionState::Accepted => "ACCEPTED",
            ExtensionState::Rejected => "REJECTED",
            ExtensionState::Ignored => "IGNORED",
            ExtensionState::Done => "DONE",
        }
    }
}

impl fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard for accept / reject / ignore.
pub fn ensure_extension_undecided(id: DbId, state: ExtensionState) -> Result<(), CoreError> {
    if state == ExtensionState::Pending {
        Ok(())
    } else {
        Err(CoreError::AlreadyProcessed {
            entity: EXTENSION_ENTITY,
            id,
        })
    }
}

/// What `execute` should do for a request in `state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionGate {
    Run,
    AlreadyDone,
}

/// Guard for execute: only accepted requests run, done ones are a no-op.
pub fn extension_execution_gate(id: DbId, state: ExtensionState) -> Result<ExecutionGate, CoreError> {
    match state {
        ExtensionState::Accepted => Ok(ExecutionGate::Run),
        ExtensionState::Done => Ok(ExecutionGate::AlreadyDone),
        other => Err(CoreError::InvalidStateTransition {
            entity: EXTENSION_ENTITY,
            id,
            from: other.to_string(),
            action: "execute",
        }),
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Decision taken on a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDecision {
    Accept,
    Reject,
    Ignore,
}

impl TaskDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskDecision::Accept => "accept",
            TaskDecision::Reject => "reject",
            TaskDecision::Ignore => "ignore",
        }
    }

    /// Whether the task author is told about the decision.
    pub fn notifies_author(self) -> bool {
        !matches!(self, TaskDecision::Ignore)
    }
}

impl fmt::Display for TaskDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskDecision {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(TaskDecision::Accept),
            "reject" => Ok(TaskDecision::Reject),
            "ignore" => Ok(TaskDecision::Ignore),
            other => Err(CoreError::invalid(format!(
                "Invalid decision '{other}'. Must be one of: accept, reject, ignore"
            ))),
        }
    }
}

/// Guard for task decisions.
pub fn ensure_task_undecided(id: DbId, processed: bool) -> Result<(), CoreError> {
    if processed {
        return Err(CoreError::AlreadyProcessed {
            entity: TASK_ENTITY,
            id,
        });
    }
    Ok(())
}

/// Guard for task completion: accepted and not yet done.
pub fn ensure_task_completable(
    id: DbId,
    processed: bool,
    decision: Option<TaskDecision>,
    done: bool,
) -> Result<(), CoreError> {
    let from = match (processed, decision, done) {
        (true, Some(TaskDecision::Accept), false) => return Ok(()),
        (_, _, true) => "done".to_string(),
        (false, _, _) => "pending".to_string(),
        (true, Some(d), false) => d.to_string(),
        (true, None, false) => "processed".to_string(),
    };
    Err(CoreError::InvalidStateTransition {
        entity: TASK_ENTITY,
        id,
        from,
        action: "complete",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn state_follows_latch_columns() {
        assert_eq!(ExtensionState::from_flags(false, false, false, false), ExtensionState::Pending);
        assert_eq!(ExtensionState::from_flags(true, true, false, false), ExtensionState::Accepted);
        assert_eq!(ExtensionState::from_flags(true, true, true, false), ExtensionState::Done);
        assert_eq!(ExtensionState::from_flags(true, false, false, false), ExtensionState::Rejected);
        assert_eq!(ExtensionState::from_flags(true, false, false, true), ExtensionState::Ignored);
    }

    #[test]
    fn decisions_require_pending() {
        assert!(ensure_extension_undecided(1, ExtensionState::Pending).is_ok());
        for state in [
            ExtensionState::Accepted,
            ExtensionState::Rejected,
            ExtensionState::Ignored,
            ExtensionState::Done,
        ] {
            assert_matches!(
                ensure_extension_undecided(1, state),
                Err(CoreError::AlreadyProcessed { id: 1, .. })
            );
        }
    }

    #[test]
    fn execution_requires_acceptance() {
        assert_eq!(
            extension_execution_gate(3, ExtensionState::Accepted).unwrap(),
            ExecutionGate::Run
        );
        assert_eq!(
            extension_execution_gate(3, ExtensionState::Done).unwrap(),
            ExecutionGate::AlreadyDone
        );
        assert_matches!(
            extension_execution_gate(3, ExtensionState::Rejected),
            Err(CoreError::InvalidStateTransition { action: "execute", .. })
        );
        assert_matches!(
            extension_execution_gate(3, ExtensionState::Pending),
            Err(CoreError::InvalidStateTransition { .. })
        );
    }

    #[test]
    fn task_decision_parses() {
        assert_eq!("reject".parse::<TaskDecision>().unwrap(), TaskDecision::Reject);
        assert!("maybe".parse::<TaskDecision>().is_err());
        assert!(!TaskDecision::Ignore.notifies_author());
        assert!(TaskDecision::Accept.notifies_author());
    }

    #[test]
    fn task_completion_requires_accepted_decision() {
        assert!(ensure_task_completable(5, true, Some(TaskDecision::Accept), false).is_ok());
        assert_matches!(
            ensure_task_completable(5, false, None, false),
            Err(CoreError::InvalidStateTransition { ref from, .. }) if from == "pending"
        );
        assert_matches!(
            ensure_task_completable(5, true, Some(TaskDecision::Reject), false),
            Err(CoreError::InvalidStateTransition { ref from, .. }) if from == "reject"
        );
        assert_matches!(
            ensure_task_completable(5, true, Some(TaskDecision::Accept), true),
            Err(CoreError::InvalidStateTransition { ref from, .. }) if from == "done"
        );
    }

    #[test]
    fn processed_task_cannot_be_decided_again() {
        assert!(ensure_task_undecided(9, false).is_ok());
        assert_matches!(
            ensure_task_undecided(9, true),
            Err(CoreError::AlreadyProcessed { entity: "task", id: 9 })
        );
    }
}
