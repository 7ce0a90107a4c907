//! Extension-request operations: submit, accept, reject, ignore, execute.
//!
//! ```text
//! PENDING --accept--> ACCEPTED --execute--> DONE
//!    |----reject--> REJECTED
//!    `----ignore--> IGNORED
//! ```
//!
//! The processed latch is checked up front for a clear error and again by
//! the store's compare-and-set, which decides races.

use hpcalloc_core::audit::categories;
use hpcalloc_core::comment::append_line;
use hpcalloc_core::error::CoreError;
use hpcalloc_core::lifecycle::{
    ensure_extension_undecided, extension_execution_gate, ExecutionGate, ExtensionState,
    EXTENSION_ENTITY,
};
use hpcalloc_core::request_kind::RequestKind;
use hpcalloc_core::types::DbId;
use hpcalloc_db::models::extension::{CreateExtension, ExtensionDecision, ExtensionRequest};
use hpcalloc_db::models::log_event::CreateLogEvent;
use hpcalloc_db::models::project::Project;
use serde::Deserialize;

use crate::allocation::Provenance;
use crate::engine::{event_for, Engine};
use crate::error::{StoreError, WorkflowError, WorkflowResult};
use crate::mail;
use crate::transition::Transition;

/// Input for [`Engine::submit_extension`].
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionSubmission {
    pub project_id: DbId,
    pub author_id: DbId,
    pub kind: RequestKind,
    pub hours: i64,
    pub reason: String,
    #[serde(default)]
    pub exceptional: bool,
}

/// Manual adjustments an approver may make while accepting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptOptions {
    pub note: String,
    pub hours: Option<i64>,
    /// Switch a renewal to an extension (`true`) or back (`false`).
    pub extend: Option<bool>,
}

impl AcceptOptions {
    pub fn note(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            ..Self::default()
        }
    }
}

fn already_processed(id: DbId) -> WorkflowError {
    CoreError::AlreadyProcessed {
        entity: EXTENSION_ENTITY,
        id,
    }
    .into()
}

/// Map a lost decision race to the latch error.
fn decision_conflict(id: DbId) -> impl FnOnce(StoreError) -> WorkflowError {
    move |e| match e {
        StoreError::Conflict(_) => already_processed(id),
        other => other.into(),
    }
}

impl Engine {
    async fn extension_project(&self, ext: &ExtensionRequest) -> WorkflowResult<Project> {
        Ok(self.store.get_project(ext.project_id).await?)
    }

    /// Create a pending request with a snapshot of the project's usage.
    pub async fn submit_extension(
        &self,
        input: ExtensionSubmission,
    ) -> WorkflowResult<Transition<ExtensionRequest>> {
        if input.hours < 0 {
            return Err(CoreError::invalid("Requested hours must not be negative").into());
        }
        if input.reason.trim().is_empty() {
            return Err(CoreError::invalid("A reason is required").into());
        }
        if let RequestKind::Transform { target_type } = &input.kind {
            if !self.lifecycle.policy().is_known_type(target_type) {
                return Err(
                    CoreError::invalid(format!("Unknown project type '{target_type}'")).into(),
                );
            }
        }

        let project = match self.store.get_project(input.project_id).await {
            Ok(project) => project,
            Err(StoreError::NotFound { .. }) => {
                return Err(CoreError::MissingProject(input.project_id.to_string()).into())
            }
            Err(e) => return Err(e.into()),
        };

        let now = self.now();
        let current = self.store.current_allocation(project.id).await?;
        let (present_use, present_total) = match &current {
            Some(resource) => {
                let accounts = [project.name.clone()];
                let report = self
                    .accounting
                    .usage(&accounts, resource.created_at, now)
                    .await;
                (report.total(&project.name), resource.cpu)
            }
            None => (0, 0),
        };
        let usage_percent = self.lifecycle.usage(present_use, present_total);

        let create = CreateExtension {
            project_id: project.id,
            resource_id: current.as_ref().map(|r| r.id),
            author_id: input.author_id,
            kind: input.kind,
            hours: input.hours,
            reason: input.reason.trim().to_string(),
            exceptional: input.exceptional,
            present_use,
            present_total,
            usage_percent,
        };
        let audit = CreateLogEvent::new(
            Some(input.author_id),
            categories::SUBMITTED,
            format!(
                "{} request for {} hours submitted for {}",
                create.kind.as_str(),
                create.hours,
                project.name
            ),
        )
        .for_user(input.author_id);

        let (ext, log) = self.store.insert_extension(&create, audit).await?;
        tracing::info!(
            extension_id = ext.id,
            project_id = project.id,
            kind = %ext.kind,
            hours = ext.hours,
            "Extension request submitted"
        );

        let mut event = event_for(&log);
        if let Some(to) = &self.config.technical_email {
            event = event.with_notification(mail::extension_submitted(to, &project, &ext));
        }
        Ok(Transition::new(ext).with_event(event))
    }

    /// Accept a pending request, applying any overrides to hours or kind.
    pub async fn accept_extension(
        &self,
        id: DbId,
        actor_id: DbId,
        options: AcceptOptions,
    ) -> WorkflowResult<Transition<ExtensionRequest>> {
        let ext = self.store.get_extension(id).await?;
        ensure_extension_undecided(id, ext.state())?;
        let project = self.extension_project(&ext).await?;
        let kind = ext.request_kind()?;

        let mut note = options.note.trim().to_string();
        let hours = options.hours.filter(|h| *h != ext.hours);
        if let Some(h) = hours {
            if h < 0 {
                return Err(CoreError::invalid("Granted hours must not be negative").into());
            }
            note = append_line(
                Some(&note),
                &format!("Hours changed from {} to {h}", ext.hours),
            );
        }
        let new_kind = options
            .extend
            .map(|extend| kind.clone().with_extend_override(extend))
            .filter(|k| *k != kind);
        if let Some(k) = &new_kind {
            note = append_line(
                Some(&note),
                &format!("Request changed from {} to {}", kind.as_str(), k.as_str()),
            );
        }

        let decision = ExtensionDecision {
            approver_id: actor_id,
            accepted: true,
            ignored: false,
            decided_at: self.now(),
            decision: Some(note).filter(|n| !n.is_empty()),
            kind: new_kind,
            hours,
        };
        let audit = CreateLogEvent::new(
            Some(actor_id),
            categories::ACCEPTED,
            format!("{} request #{id} for {} accepted", kind.as_str(), project.name),
        );
        let (ext, log) = self
            .store
            .decide_extension(id, &decision, audit)
            .await
            .map_err(decision_conflict(id))?;
        tracing::info!(extension_id = id, approver_id = actor_id, "Extension request accepted");

        let mut event = event_for(&log);
        if let Some(to) = self.responsible_email(&project).await {
            event = event.with_notification(mail::extension_accepted(
                &to,
                &self.config.admin_cc,
                &project,
                &ext,
            ));
        }
        Ok(Transition::new(ext).with_event(event))
    }

    pub async fn reject_extension(
        &self,
        id: DbId,
        actor_id: DbId,
        note: &str,
    ) -> WorkflowResult<Transition<ExtensionRequest>> {
        let ext = self.store.get_extension(id).await?;
        ensure_extension_undecided(id, ext.state())?;
        let project = self.extension_project(&ext).await?;

        let decision = ExtensionDecision {
            approver_id: actor_id,
            accepted: false,
            ignored: false,
            decided_at: self.now(),
            decision: Some(note.trim().to_string()).filter(|n| !n.is_empty()),
            kind: None,
            hours: None,
        };
        let audit = CreateLogEvent::new(
            Some(actor_id),
            categories::REJECTED,
            format!("{} request #{id} for {} rejected", ext.kind, project.name),
        );
        let (ext, log) = self
            .store
            .decide_extension(id, &decision, audit)
            .await
            .map_err(decision_conflict(id))?;
        tracing::info!(extension_id = id, approver_id = actor_id, "Extension request rejected");

        let mut event = event_for(&log);
        if let Some(to) = self.responsible_email(&project).await {
            event = event.with_notification(mail::extension_rejected(
                &to,
                &self.config.admin_cc,
                &project,
                &ext,
            ));
        }
        Ok(Transition::new(ext).with_event(event))
    }

    pub async fn ignore_extension(
        &self,
        id: DbId,
        actor_id: DbId,
    ) -> WorkflowResult<Transition<ExtensionRequest>> {
        let ext = self.store.get_extension(id).await?;
        ensure_extension_undecided(id, ext.state())?;
        let project = self.extension_project(&ext).await?;

        let decision = ExtensionDecision {
            approver_id: actor_id,
            accepted: false,
            ignored: true,
            decided_at: self.now(),
            decision: Some(mail::IGNORED_NOTE.to_string()),
            kind: None,
            hours: None,
        };
        let audit = CreateLogEvent::new(
            Some(actor_id),
            categories::IGNORED,
            format!("{} request #{id} for {} ignored", ext.kind, project.name),
        );
        let (ext, log) = self
            .store
            .decide_extension(id, &decision, audit)
            .await
            .map_err(decision_conflict(id))?;
        tracing::info!(extension_id = id, approver_id = actor_id, "Extension request ignored");

        let mut event = event_for(&log);
        if let Some(to) = self.responsible_email(&project).await {
            event = event.with_notification(mail::extension_ignored(&to, &project, &ext));
        }
        Ok(Transition::new(ext).with_event(event))
    }

    /// Apply an accepted request to the project's allocation.
    ///
    /// Running it again once done changes nothing and reports no event.
    pub async fn execute_extension(
        &self,
        id: DbId,
        actor_id: Option<DbId>,
    ) -> WorkflowResult<Transition<ExtensionRequest>> {
        let ext = self.store.get_extension(id).await?;
        if extension_execution_gate(id, ext.state())? == ExecutionGate::AlreadyDone {
            tracing::debug!(extension_id = id, "Extension request already executed");
            return Ok(Transition::unchanged(ext));
        }
        let project = self.extension_project(&ext).await?;
        let kind = ext.request_kind()?;
        let outcome = self.lifecycle.resolve(&kind, &project.type_code);

        let from = Provenance {
            approver_id: ext.approver_id,
            extension_id: Some(id),
        };
        let now = self.now();
        let plan = self
            .lifecycle
            .plan_outcome(&project, &outcome, ext.hours, now, from)?;
        let audit = CreateLogEvent::new(
            actor_id.or(ext.approver_id),
            outcome.category(),
            format!("{} ({} hours, {})", project.name, ext.hours, plan.comment),
        );

        let (ext, outcome_state, log) = match self.store.execute_extension(id, &plan, now, audit).await {
            Ok(done) => done,
            Err(StoreError::Conflict(reason)) => {
                // A concurrent executor may have won; that is the same no-op.
                let current = self.store.get_extension(id).await?;
                if current.state() == ExtensionState::Done {
                    return Ok(Transition::unchanged(current));
                }
                return Err(StoreError::Conflict(reason).into());
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            extension_id = id,
            project_id = outcome_state.project.id,
            outcome = outcome.category(),
            cpu = outcome_state.resource.cpu,
            ttl = %outcome_state.resource.ttl,
            "Extension request executed"
        );

        Ok(Transition::new(ext).with_event(event_for(&log)))
    }

    /// Execute every accepted request that is not done yet.
    ///
    /// Failures are logged per request and do not stop the batch.
    pub async fn execute_accepted(&self) -> WorkflowResult<Vec<Transition<ExtensionRequest>>> {
        let waiting = self.store.extensions_awaiting_execution().await?;
        let mut done = Vec::with_capacity(waiting.len());
        for ext in waiting {
            match self.execute_extension(ext.id, None).await {
                Ok(transition) => done.push(transition),
                Err(e) => {
                    tracing::error!(extension_id = ext.id, error = %e, "Failed to execute extension request")
                }
            }
        }
        Ok(done)
    }

    pub async fn get_extension(&self, id: DbId) -> WorkflowResult<ExtensionRequest> {
        Ok(self.store.get_extension(id).await?)
    }

    pub async fn project_extensions(&self, project_id: DbId) -> WorkflowResult<Vec<ExtensionRequest>> {
        Ok(self.store.project_extensions(project_id).await?)
    }

    pub async fn pending_extensions(&self) -> WorkflowResult<Vec<ExtensionRequest>> {
        Ok(self.store.pending_extensions().await?)
    }
}
