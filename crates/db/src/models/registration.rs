//! Registration models.

use hpcalloc_core::comment::CommentEntry;
use hpcalloc_core::profile::UserProfile;
use hpcalloc_core::registration::{CommitteeDecision, RegistrationState, VisaOutcome};
use hpcalloc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `registrations` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Registration {
    pub id: DbId,
    pub title: String,
    pub description: String,
    pub scientific_fields: Option<String>,
    pub type_code: String,
    pub cpu_hours: i64,
    pub responsible_first_name: String,
    pub responsible_last_name: String,
    pub responsible_email: String,
    pub responsible_phone: Option<String>,
    pub responsible_lab: Option<String>,
    pub responsible_position: Option<String>,
    pub approve: bool,
    pub approve_ts: Option<Timestamp>,
    pub approver_id: Option<DbId>,
    pub accepted: bool,
    pub accepted_ts: Option<Timestamp>,
    pub visa: Option<String>,
    pub processed: bool,
    pub processed_ts: Option<Timestamp>,
    pub committee: Option<String>,
    pub decision: Option<String>,
    pub project_id: Option<DbId>,
    pub created_at: Timestamp,
}

impl Registration {
    pub fn visa_outcome(&self) -> Option<VisaOutcome> {
        self.visa.as_deref().and_then(|v| v.parse().ok())
    }

    pub fn committee_decision(&self) -> Option<CommitteeDecision> {
        self.committee.as_deref().and_then(|c| c.parse().ok())
    }

    pub fn state(&self) -> RegistrationState {
        RegistrationState::derive(
            self.approve,
            self.visa_outcome(),
            self.committee_decision(),
            self.project_id.is_some(),
        )
    }

    pub fn responsible_profile(&self) -> UserProfile {
        UserProfile {
            first_name: self.responsible_first_name.clone(),
            last_name: self.responsible_last_name.clone(),
            email: self.responsible_email.clone(),
            phone: self.responsible_phone.clone(),
            lab: self.responsible_lab.clone(),
            position: self.responsible_position.clone(),
        }
    }
}

/// DTO for a submitted registration.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRegistration {
    pub title: String,
    pub description: String,
    pub scientific_fields: Option<String>,
    pub type_code: String,
    pub cpu_hours: i64,
    pub responsible: UserProfile,
}

/// Column changes for one registration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStep {
    Approve { approver_id: DbId, at: Timestamp },
    /// `resend` lifts the "not yet sent" guard.
    Visa { outcome: VisaOutcome, at: Timestamp, resend: bool },
    Committee { decision: CommitteeDecision, note: Option<String>, at: Timestamp },
}

/// A row from the `registration_comments` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RegistrationComment {
    pub id: DbId,
    pub registration_id: DbId,
    pub author_id: Option<DbId>,
    pub body: String,
    pub created_at: Timestamp,
}

impl RegistrationComment {
    pub fn entry(&self) -> CommentEntry {
        CommentEntry::new(self.created_at, self.body.clone())
    }
}
