//! Direct allocation changes made by administrators, outside any request.

use hpcalloc_core::audit::categories;
use hpcalloc_core::error::CoreError;
use hpcalloc_core::types::DbId;
use hpcalloc_db::models::log_event::CreateLogEvent;

use crate::allocation::Provenance;
use crate::engine::{event_for, Engine};
use crate::error::WorkflowResult;
use crate::store::{AllocationOutcome, AllocationPlan};
use crate::transition::Transition;

fn ensure_hours(hours: i64) -> Result<(), CoreError> {
    if hours < 0 {
        return Err(CoreError::invalid("Hours must not be negative"));
    }
    Ok(())
}

impl Engine {
    async fn apply_plan(
        &self,
        project_id: DbId,
        plan: AllocationPlan,
        category: &str,
        actor_id: DbId,
        project_name: &str,
    ) -> WorkflowResult<Transition<AllocationOutcome>> {
        let audit = CreateLogEvent::new(
            Some(actor_id),
            category,
            format!("{project_name}: {}", plan.comment),
        );
        let (outcome, log) = self.store.apply_allocation(project_id, &plan, self.now(), audit).await?;
        tracing::info!(
            project_id,
            category,
            cpu = outcome.resource.cpu,
            ttl = %outcome.resource.ttl,
            "Allocation changed"
        );
        Ok(Transition::new(outcome).with_event(event_for(&log)))
    }

    /// Replace the current allocation with `hours` and a fresh TTL.
    pub async fn renew_allocation(
        &self,
        project_id: DbId,
        hours: i64,
        actor_id: DbId,
    ) -> WorkflowResult<Transition<AllocationOutcome>> {
        ensure_hours(hours)?;
        let project = self.store.get_project(project_id).await?;
        let from = Provenance {
            approver_id: Some(actor_id),
            extension_id: None,
        };
        let plan = self.lifecycle.renew(&project, hours, self.now(), from)?;
        self.apply_plan(project_id, plan, categories::RENEWED, actor_id, &project.name)
            .await
    }

    /// Add `hours` to the current allocation in place.
    pub async fn extend_allocation(
        &self,
        project_id: DbId,
        hours: i64,
        actor_id: DbId,
    ) -> WorkflowResult<Transition<AllocationOutcome>> {
        ensure_hours(hours)?;
        let project = self.store.get_project(project_id).await?;
        let from = Provenance {
            approver_id: Some(actor_id),
            extension_id: None,
        };
        let plan = self.lifecycle.extend(hours, from);
        self.apply_plan(project_id, plan, categories::EXTENDED, actor_id, &project.name)
            .await
    }

    /// Move the project to `new_type` with a fresh allocation of `hours`.
    pub async fn transform_project(
        &self,
        project_id: DbId,
        hours: i64,
        new_type: &str,
        actor_id: DbId,
    ) -> WorkflowResult<Transition<AllocationOutcome>> {
        ensure_hours(hours)?;
        let project = self.store.get_project(project_id).await?;
        let from = Provenance {
            approver_id: Some(actor_id),
            extension_id: None,
        };
        let plan = self
            .lifecycle
            .transform(&project, hours, new_type, self.now(), from)?;
        self.apply_plan(project_id, plan, categories::TRANSFORMED, actor_id, &project.name)
            .await
    }
}
