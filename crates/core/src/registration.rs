//! Registration request lifecycle.
//!
//! ```text
//! SUBMITTED -> APPROVED -> VISA_SENT | VISA_SKIPPED
//!           -> COMMITTEE_ACCEPTED | COMMITTEE_REJECTED | COMMITTEE_IGNORED
//! COMMITTEE_ACCEPTED -> PROJECT_CREATED
//! ```
//!
//! Rejection and ignore are possible from any state before the committee
//! decision; acceptance needs the visa step.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Entity name used in registration error messages.
pub const REGISTRATION_ENTITY: &str = "registration";

/// How the visa step was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisaOutcome {
    Sent,
    Skipped,
}

/// Committee decision on a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitteeDecision {
    Accepted,
    Rejected,
    Ignored,
}

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::invalid(format!(
                        concat!("Invalid ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(VisaOutcome { Sent => "sent", Skipped => "skipped" });
text_enum!(CommitteeDecision {
    Accepted => "accepted",
    Rejected => "rejected",
    Ignored => "ignored",
});

/// Derived lifecycle state of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    Submitted,
    Approved,
    VisaSent,
    VisaSkipped,
    CommitteeAccepted,
    CommitteeRejected,
    CommitteeIgnored,
    ProjectCreated,
}

impl RegistrationState {
    /// Derive the state from the persisted columns.
    pub fn derive(
        approved: bool,
        visa: Option<VisaOutcome>,
        committee: Option<CommitteeDecision>,
        project_linked: bool,
    ) -> Self {
        match (committee, visa) {
            (Some(CommitteeDecision::Accepted), _) if project_linked => {
                RegistrationState::ProjectCreated
            }
            (Some(CommitteeDecision::Accepted), _) => RegistrationState::CommitteeAccepted,
            (Some(CommitteeDecision::Rejected), _) => RegistrationState::CommitteeRejected,
            (Some(CommitteeDecision::Ignored), _) => RegistrationState::CommitteeIgnored,
            (None, Some(VisaOutcome::Sent)) => RegistrationState::VisaSent,
            (None, Some(VisaOutcome::Skipped)) => RegistrationState::VisaSkipped,
            (None, None) if approved => RegistrationState::Approved,
            (None, None) => RegistrationState::Submitted,
        }
    }

    /// Whether the committee has decided.
    pub fn is_processed(self) -> bool {
        matches!(
            self,
            RegistrationState::CommitteeAccepted
                | RegistrationState::CommitteeRejected
                | RegistrationState::CommitteeIgnored
                | RegistrationState::ProjectCreated
        )
    }

    /// Whether the visa step has been completed.
    pub fn visa_done(self) -> bool {
        matches!(
            self,
            RegistrationState::VisaSent | RegistrationState::VisaSkipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationState::Submitted => "SUBMITTED",
            RegistrationState::Approved => "APPROVED",
            RegistrationState::VisaSent => "VISA_SENT",
            RegistrationState::VisaSkipped => "VISA_SKIPPED",
            RegistrationState::CommitteeAccepted => "COMMITTEE_ACCEPTED",
            RegistrationState::CommitteeRejected => "COMMITTEE_REJECTED",
            RegistrationState::CommitteeIgnored => "COMMITTEE_IGNORED",
            RegistrationState::ProjectCreated => "PROJECT_CREATED",
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration-level actions guarded by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationAction {
    Approve,
    SendVisa { force: bool },
    SkipVisa,
    CommitteeAccept,
    CommitteeReject,
    CommitteeIgnore,
}

impl RegistrationAction {
    fn name(self) -> &'static str {
        match self {
            RegistrationAction::Approve => "approve",
            RegistrationAction::SendVisa { .. } => "send visa for",
            RegistrationAction::SkipVisa => "skip visa for",
            RegistrationAction::CommitteeAccept => "accept",
            RegistrationAction::CommitteeReject => "reject",
            RegistrationAction::CommitteeIgnore => "ignore",
        }
    }
}

/// Check that `action` is allowed from `state`.
pub fn ensure_registration_transition(
    id: DbId,
    state: RegistrationState,
    action: RegistrationAction,
) -> Result<(), CoreError> {
    if state.is_processed() {
        return Err(CoreError::AlreadyProcessed {
            entity: REGISTRATION_ENTITY,
            id,
        });
    }

    let allowed = match action {
        RegistrationAction::Approve => state == RegistrationState::Submitted,
        RegistrationAction::SendVisa { force } => {
            if state.visa_done() {
                if !force {
                    return Err(CoreError::AlreadySent(id));
                }
                true
            } else {
                state == RegistrationState::Approved
            }
        }
        RegistrationAction::SkipVisa => state == RegistrationState::Approved,
        RegistrationAction::CommitteeAccept => state.visa_done(),
        RegistrationAction::CommitteeReject | RegistrationAction::CommitteeIgnore => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(CoreError::InvalidStateTransition {
            entity: REGISTRATION_ENTITY,
            id,
            from: state.to_string(),
            action: action.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn derives_each_state() {
        use RegistrationState as S;
        assert_eq!(S::derive(false, None, None, false), S::Submitted);
        assert_eq!(S::derive(true, None, None, false), S::Approved);
        assert_eq!(S::derive(true, Some(VisaOutcome::Sent), None, false), S::VisaSent);
        assert_eq!(S::derive(true, Some(VisaOutcome::Skipped), None, false), S::VisaSkipped);
        assert_eq!(
            S::derive(true, Some(VisaOutcome::Sent), Some(CommitteeDecision::Accepted), false),
            S::CommitteeAccepted
        );
        assert_eq!(
            S::derive(true, Some(VisaOutcome::Sent), Some(CommitteeDecision::Accepted), true),
            S::ProjectCreated
        );
        assert_eq!(
            S::derive(false, None, Some(CommitteeDecision::Rejected), false),
            S::CommitteeRejected
        );
    }

    #[test]
    fn approve_only_from_submitted() {
        assert!(ensure_registration_transition(1, RegistrationState::Submitted, RegistrationAction::Approve).is_ok());
        assert_matches!(
            ensure_registration_transition(1, RegistrationState::Approved, RegistrationAction::Approve),
            Err(CoreError::InvalidStateTransition { .. })
        );
    }

    #[test]
    fn visa_requires_approval() {
        assert_matches!(
            ensure_registration_transition(
                2,
                RegistrationState::Submitted,
                RegistrationAction::SendVisa { force: false }
            ),
            Err(CoreError::InvalidStateTransition { .. })
        );
        assert_matches!(
            ensure_registration_transition(2, RegistrationState::Submitted, RegistrationAction::SkipVisa),
            Err(CoreError::InvalidStateTransition { .. })
        );
        assert!(ensure_registration_transition(
            2,
            RegistrationState::Approved,
            RegistrationAction::SendVisa { force: false }
        )
        .is_ok());
    }

    #[test]
    fn resending_visa_needs_force() {
        assert_matches!(
            ensure_registration_transition(
                3,
                RegistrationState::VisaSent,
                RegistrationAction::SendVisa { force: false }
            ),
            Err(CoreError::AlreadySent(3))
        );
        assert!(ensure_registration_transition(
            3,
            RegistrationState::VisaSent,
            RegistrationAction::SendVisa { force: true }
        )
        .is_ok());
    }

    #[test]
    fn committee_accept_requires_visa_step() {
        assert_matches!(
            ensure_registration_transition(4, RegistrationState::Approved, RegistrationAction::CommitteeAccept),
            Err(CoreError::InvalidStateTransition { .. })
        );
        assert!(ensure_registration_transition(
            4,
            RegistrationState::VisaSkipped,
            RegistrationAction::CommitteeAccept
        )
        .is_ok());
    }

    #[test]
    fn reject_allowed_until_processed() {
        assert!(ensure_registration_transition(5, RegistrationState::Submitted, RegistrationAction::CommitteeReject).is_ok());
        assert_matches!(
            ensure_registration_transition(
                5,
                RegistrationState::CommitteeIgnored,
                RegistrationAction::CommitteeReject
            ),
            Err(CoreError::AlreadyProcessed { .. })
        );
    }

    #[test]
    fn text_enums_round_trip() {
        assert_eq!("skipped".parse::<VisaOutcome>().unwrap(), VisaOutcome::Skipped);
        assert_eq!(CommitteeDecision::Ignored.as_str(), "ignored");
        assert!("maybe".parse::<CommitteeDecision>().is_err());
    }
}
