//! Registration-request operations.
//!
//! A registration is approved by the technical team, receives a visa (sent
//! or skipped) and is then decided by the committee. Acceptance
//! materializes the project, its responsible user and its first allocation
//! in one store transaction.

use hpcalloc_core::audit::categories;
use hpcalloc_core::comment::{render_log, CommentEntry};
use hpcalloc_core::error::CoreError;
use hpcalloc_core::naming::project_name;
use hpcalloc_core::profile::UserProfile;
use hpcalloc_core::registration::{
    ensure_registration_transition, CommitteeDecision, RegistrationAction, VisaOutcome,
    REGISTRATION_ENTITY,
};
use hpcalloc_core::types::DbId;
use hpcalloc_db::models::log_event::CreateLogEvent;
use hpcalloc_db::models::project::CreateProject;
use hpcalloc_db::models::registration::{CreateRegistration, Registration, RegistrationStep};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::engine::{event_for, Engine};
use crate::error::{StoreError, WorkflowError, WorkflowResult};
use crate::mail;
use crate::render::VISA_TEMPLATE;
use crate::store::{AcceptedRegistration, RegistrationAcceptance};
use crate::transition::Transition;

/// Registration form as submitted by a prospective project responsible.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegistrationForm {
    #[validate(length(min = 1, max = 256))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub scientific_fields: Option<String>,
    #[validate(length(min = 1, max = 16))]
    pub type_code: String,
    #[validate(range(min = 0))]
    pub cpu_hours: i64,
    #[validate(nested)]
    pub responsible: UserProfile,
}

impl From<RegistrationForm> for CreateRegistration {
    fn from(form: RegistrationForm) -> Self {
        Self {
            title: form.title.trim().to_string(),
            description: form.description,
            scientific_fields: form.scientific_fields,
            type_code: form.type_code,
            cpu_hours: form.cpu_hours,
            responsible: form.responsible,
        }
    }
}

/// Map a lost step race to the latch error.
fn step_conflict(id: DbId) -> impl FnOnce(StoreError) -> WorkflowError {
    move |e| match e {
        StoreError::Conflict(_) => CoreError::AlreadyProcessed {
            entity: REGISTRATION_ENTITY,
            id,
        }
        .into(),
        other => other.into(),
    }
}

impl Engine {
    pub async fn submit_registration(
        &self,
        form: RegistrationForm,
    ) -> WorkflowResult<Transition<Registration>> {
        form.validate()?;
        if !self.lifecycle.policy().is_known_type(&form.type_code) {
            tracing::warn!(type_code = %form.type_code, "Registration for an unconfigured project type");
        }
        let input = CreateRegistration::from(form);
        let audit = CreateLogEvent::new(
            None,
            categories::SUBMITTED,
            format!("Registration \"{}\" submitted", input.title),
        );
        let (reg, log) = self.store.insert_registration(&input, audit).await?;
        tracing::info!(registration_id = reg.id, title = %reg.title, "Registration submitted");

        let mut event = event_for(&log);
        if let Some(to) = &self.config.technical_email {
            event = event.with_notification(mail::registration_submitted(to, &reg));
        }
        Ok(Transition::new(reg).with_event(event))
    }

    /// Technical sign-off. Notifies the technical address.
    pub async fn approve_registration(
        &self,
        id: DbId,
        actor_id: DbId,
    ) -> WorkflowResult<Transition<Registration>> {
        let reg = self.store.get_registration(id).await?;
        ensure_registration_transition(id, reg.state(), RegistrationAction::Approve)?;

        let step = RegistrationStep::Approve {
            approver_id: actor_id,
            at: self.now(),
        };
        let audit = CreateLogEvent::new(
            Some(actor_id),
            categories::APPROVED,
            format!("Registration \"{}\" approved", reg.title),
        );
        let comment = format!("Approved by user #{actor_id}");
        let (reg, log) = self
            .store
            .apply_registration_step(id, &step, Some(actor_id), &comment, audit)
            .await
            .map_err(step_conflict(id))?;
        tracing::info!(registration_id = id, approver_id = actor_id, "Registration approved");

        let mut event = event_for(&log);
        if let Some(to) = &self.config.technical_email {
            event = event.with_notification(mail::registration_approved(to, &reg));
        }
        Ok(Transition::new(reg).with_event(event))
    }

    /// Render the visa and mail it to the responsible person.
    ///
    /// Fails with [`CoreError::AlreadySent`] when the visa step is done,
    /// unless `force` is set. A rendering failure aborts before anything is
    /// recorded.
    pub async fn send_visa(
        &self,
        id: DbId,
        actor_id: DbId,
        force: bool,
    ) -> WorkflowResult<Transition<Registration>> {
        let reg = self.store.get_registration(id).await?;
        ensure_registration_transition(id, reg.state(), RegistrationAction::SendVisa { force })?;

        let data = json!({
            "id": reg.id,
            "title": reg.title,
            "description": reg.description,
            "scientific_fields": reg.scientific_fields,
            "type": self.lifecycle.policy().label(&reg.type_code),
            "cpu_hours": reg.cpu_hours,
            "responsible": format!("{} {}", reg.responsible_first_name, reg.responsible_last_name),
            "email": reg.responsible_email,
            "lab": reg.responsible_lab,
            "position": reg.responsible_position,
        });
        let document = self.renderer.render(VISA_TEMPLATE, &data).await?;

        let step = RegistrationStep::Visa {
            outcome: VisaOutcome::Sent,
            at: self.now(),
            resend: force,
        };
        let audit = CreateLogEvent::new(
            Some(actor_id),
            categories::VISA_SENT,
            format!("Visa for \"{}\" sent to {}", reg.title, reg.responsible_email),
        );
        let comment = format!("Visa sent to {}", reg.responsible_email);
        let (reg, log) = self
            .store
            .apply_registration_step(id, &step, Some(actor_id), &comment, audit)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => WorkflowError::Core(CoreError::AlreadySent(id)),
                other => other.into(),
            })?;
        tracing::info!(registration_id = id, document = %document.display(), "Visa sent");

        let event = event_for(&log).with_notification(mail::visa(&reg, document));
        Ok(Transition::new(reg).with_event(event))
    }

    /// Complete the visa step without a document.
    pub async fn skip_visa(&self, id: DbId, actor_id: DbId) -> WorkflowResult<Transition<Registration>> {
        let reg = self.store.get_registration(id).await?;
        ensure_registration_transition(id, reg.state(), RegistrationAction::SkipVisa)?;

        let step = RegistrationStep::Visa {
            outcome: VisaOutcome::Skipped,
            at: self.now(),
            resend: false,
        };
        let audit = CreateLogEvent::new(
            Some(actor_id),
            categories::VISA_SKIPPED,
            format!("Visa for \"{}\" skipped", reg.title),
        );
        let (reg, log) = self
            .store
            .apply_registration_step(id, &step, Some(actor_id), "Visa skipped", audit)
            .await
            .map_err(step_conflict(id))?;
        tracing::info!(registration_id = id, "Visa skipped");

        Ok(Transition::new(reg).with_event(event_for(&log)))
    }

    /// Committee acceptance: latch the registration and find or create its
    /// project with the responsible user and initial allocation.
    pub async fn committee_accept(
        &self,
        id: DbId,
        actor_id: DbId,
        note: Option<String>,
    ) -> WorkflowResult<Transition<AcceptedRegistration>> {
        let reg = self.store.get_registration(id).await?;
        ensure_registration_transition(id, reg.state(), RegistrationAction::CommitteeAccept)?;

        let now = self.now();
        let ttl = self.lifecycle.compute_ttl(&reg.type_code, now)?;
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let acceptance = RegistrationAcceptance {
            note: note.clone(),
            at: now,
            actor_id: Some(actor_id),
            comment: match &note {
                Some(n) => format!("Accepted by the committee: {n}"),
                None => "Accepted by the committee".to_string(),
            },
            new_project: CreateProject {
                name: project_name(&reg.type_code, reg.id),
                title: reg.title.clone(),
                type_code: reg.type_code.clone(),
                type_label: self.lifecycle.policy().label(&reg.type_code),
                responsible_id: None,
                registration_id: Some(reg.id),
            },
            hours: reg.cpu_hours,
            ttl,
        };
        let accepted_audit = CreateLogEvent::new(
            Some(actor_id),
            categories::ACCEPTED,
            format!("Registration \"{}\" accepted by the committee", reg.title),
        );
        let created_audit = CreateLogEvent::new(
            Some(actor_id),
            categories::PROJECT_CREATED,
            format!("Project created from registration #{id}"),
        );

        let (accepted, logs) = self
            .store
            .accept_registration(id, &acceptance, accepted_audit, created_audit)
            .await
            .map_err(step_conflict(id))?;
        tracing::info!(
            registration_id = id,
            project_id = accepted.project.id,
            project = %accepted.project.name,
            project_created = accepted.project_created,
            "Registration accepted"
        );

        let mut events: Vec<_> = logs.iter().map(event_for).collect();
        if let Some(first) = events.first_mut() {
            first.notification = Some(mail::registration_accepted(
                &self.config.admin_cc,
                &accepted.registration,
                &accepted.project,
                &accepted.resource,
            ));
        }
        Ok(Transition {
            record: accepted,
            events,
        })
    }

    pub async fn committee_reject(
        &self,
        id: DbId,
        actor_id: DbId,
        note: Option<String>,
    ) -> WorkflowResult<Transition<Registration>> {
        self.committee_close(id, actor_id, CommitteeDecision::Rejected, note)
            .await
    }

    pub async fn committee_ignore(
        &self,
        id: DbId,
        actor_id: DbId,
    ) -> WorkflowResult<Transition<Registration>> {
        self.committee_close(id, actor_id, CommitteeDecision::Ignored, None)
            .await
    }

    async fn committee_close(
        &self,
        id: DbId,
        actor_id: DbId,
        decision: CommitteeDecision,
        note: Option<String>,
    ) -> WorkflowResult<Transition<Registration>> {
        let reg = self.store.get_registration(id).await?;
        let (action, category) = match decision {
            CommitteeDecision::Rejected => (RegistrationAction::CommitteeReject, categories::REJECTED),
            _ => (RegistrationAction::CommitteeIgnore, categories::IGNORED),
        };
        ensure_registration_transition(id, reg.state(), action)?;

        let note = match decision {
            CommitteeDecision::Ignored => Some(mail::IGNORED_NOTE.to_string()),
            _ => note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        };
        let comment = match &note {
            Some(n) => format!("Committee decision: {} ({n})", decision.as_str()),
            None => format!("Committee decision: {}", decision.as_str()),
        };
        let step = RegistrationStep::Committee {
            decision,
            note,
            at: self.now(),
        };
        let audit = CreateLogEvent::new(
            Some(actor_id),
            category,
            format!("Registration \"{}\" {} by the committee", reg.title, decision.as_str()),
        );
        let (reg, log) = self
            .store
            .apply_registration_step(id, &step, Some(actor_id), &comment, audit)
            .await
            .map_err(step_conflict(id))?;
        tracing::info!(registration_id = id, decision = decision.as_str(), "Registration closed");

        let mut event = event_for(&log);
        if decision == CommitteeDecision::Rejected {
            event = event.with_notification(mail::registration_rejected(&self.config.admin_cc, &reg));
        }
        Ok(Transition::new(reg).with_event(event))
    }

    pub async fn get_registration(&self, id: DbId) -> WorkflowResult<Registration> {
        Ok(self.store.get_registration(id).await?)
    }

    /// The registration's running comment log, oldest line first.
    pub async fn registration_log(&self, id: DbId) -> WorkflowResult<String> {
        let entries: Vec<CommentEntry> = self
            .store
            .registration_comments(id)
            .await?
            .iter()
            .map(|c| c.entry())
            .collect();
        Ok(render_log(&entries))
    }

    pub async fn pending_registrations(&self) -> WorkflowResult<Vec<Registration>> {
        Ok(self.store.pending_registrations().await?)
    }
}
