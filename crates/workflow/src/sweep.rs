//! Periodic expiry handling, run by the worker.

use chrono::Duration;
use hpcalloc_core::audit::categories;
use hpcalloc_db::models::log_event::{CreateLogEvent, LogEventQuery};
use hpcalloc_db::models::project::Project;
use hpcalloc_db::models::resource::Resource;
use hpcalloc_events::DomainEvent;

use crate::engine::{event_for, Engine};
use crate::error::{StoreError, WorkflowResult};
use crate::mail;
use crate::transition::Transition;

impl Engine {
    /// Warn responsibles whose current allocation expires within `days`.
    ///
    /// Each project is warned once per expiry date, so daily runs over the
    /// window do not repeat the mail. Allocations already past their TTL
    /// are left to [`suspend_expired`](Engine::suspend_expired).
    pub async fn warn_expiring(&self, days: i64) -> WorkflowResult<Vec<DomainEvent>> {
        let now = self.now();
        let horizon = now + Duration::days(days);
        let expiring = self.store.expiring_allocations(horizon).await?;

        let mut events = Vec::new();
        for resource in expiring.iter().filter(|r| r.ttl > now) {
            match self.warn_one(resource).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => tracing::error!(
                    project_id = resource.project_id,
                    error = %e,
                    "Failed to record expiry warning"
                ),
            }
        }
        tracing::info!(count = events.len(), days, "Expiry warnings recorded");
        Ok(events)
    }

    async fn warn_one(&self, resource: &Resource) -> WorkflowResult<Option<DomainEvent>> {
        let project = self.store.get_project(resource.project_id).await?;
        let message = format!("Allocation of {} expires on {}", project.name, resource.ttl.date_naive());
        let earlier = self
            .store
            .log_events(&LogEventQuery {
                project_id: Some(project.id),
                category: Some(categories::EXPIRY_WARNING.to_string()),
                ..LogEventQuery::default()
            })
            .await?;
        if earlier.iter().any(|e| e.event == message) {
            tracing::debug!(project = %project.name, "Expiry already announced");
            return Ok(None);
        }

        let audit = CreateLogEvent::new(None, categories::EXPIRY_WARNING, message).for_project(project.id);
        let log = self.store.record_event(audit).await?;

        let mut event = event_for(&log);
        if let Some(to) = self.responsible_email(&project).await {
            event = event.with_notification(mail::expiry_warning(
                &to,
                &self.config.admin_cc,
                &project,
                resource,
            ));
        }
        Ok(Some(event))
    }

    /// Deactivate every active project whose current allocation has expired.
    pub async fn suspend_expired(&self) -> WorkflowResult<Vec<Transition<Project>>> {
        let expired = self.store.expiring_allocations(self.now()).await?;

        let mut suspended = Vec::new();
        for resource in &expired {
            let audit = CreateLogEvent::new(
                None,
                categories::SUSPENDED,
                format!("Allocation expired on {}", resource.ttl.date_naive()),
            );
            let (project, log) = match self.store.suspend_project(resource.project_id, audit).await {
                Ok(done) => done,
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => {
                    tracing::error!(project_id = resource.project_id, error = %e, "Failed to suspend project");
                    continue;
                }
            };
            tracing::info!(project_id = project.id, project = %project.name, "Project suspended");

            let mut event = event_for(&log);
            if let Some(to) = self.responsible_email(&project).await {
                event = event.with_notification(mail::suspended(&to, &self.config.admin_cc, &project));
            }
            suspended.push(Transition::new(project).with_event(event));
        }
        Ok(suspended)
    }
}
