//! The workflow engine.
//!
//! [`Engine`] holds the seams every transition needs (record store,
//! accounting source, document renderer), the allocation lifecycle and the
//! engine configuration. Operations live in the `extension`,
//! `registration`, `tasks`, `projects`, `sweep` and `usage` modules as
//! `impl Engine` blocks; each returns a [`Transition`](crate::Transition) whose events
//! the caller hands to a
//! [`NotificationDispatcher`](hpcalloc_events::NotificationDispatcher).

use std::sync::Arc;

use hpcalloc_accounting::AccountingSource;
use hpcalloc_core::types::{DbId, Timestamp};
use hpcalloc_db::models::log_event::{CreateLogEvent, LogEvent, LogEventQuery};
use hpcalloc_db::models::project::Project;
use hpcalloc_db::models::resource::Resource;
use hpcalloc_events::{DomainEvent, Subject};

use crate::allocation::AllocationLifecycle;
use crate::config::EngineConfig;
use crate::error::WorkflowResult;
use crate::render::DocumentRenderer;
use crate::store::RecordStore;

/// Source of "now" for every transition.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

pub struct Engine {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) accounting: Arc<dyn AccountingSource>,
    pub(crate) renderer: Arc<dyn DocumentRenderer>,
    pub(crate) lifecycle: AllocationLifecycle,
    pub(crate) config: EngineConfig,
    clock: Clock,
}

impl Engine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        accounting: Arc<dyn AccountingSource>,
        renderer: Arc<dyn DocumentRenderer>,
        lifecycle: AllocationLifecycle,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            accounting,
            renderer,
            lifecycle,
            config,
            clock: Arc::new(chrono::Utc::now),
        }
    }

    /// Replace the wall clock, for deterministic runs.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> Timestamp {
        (self.clock)()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn lifecycle(&self) -> &AllocationLifecycle {
        &self.lifecycle
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Append an audit entry that does not accompany a state change.
    pub async fn record(&self, audit: CreateLogEvent) -> WorkflowResult<DbId> {
        let log = self.store.record_event(audit).await?;
        Ok(log.id)
    }

    pub async fn log_events(&self, filter: &LogEventQuery) -> WorkflowResult<Vec<LogEvent>> {
        Ok(self.store.log_events(filter).await?)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Every allocation the project has held, newest first.
    pub async fn allocation_history(&self, project_id: DbId) -> WorkflowResult<Vec<Resource>> {
        self.store.get_project(project_id).await?;
        Ok(self.store.allocation_history(project_id).await?)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// E-mail of the project's responsible, if one is set and resolvable.
    pub(crate) async fn responsible_email(&self, project: &Project) -> Option<String> {
        let user_id = project.responsible_id?;
        match self.store.get_user(user_id).await {
            Ok(user) => Some(user.email),
            Err(e) => {
                tracing::warn!(
                    project_id = project.id,
                    user_id,
                    error = %e,
                    "Cannot resolve project responsible, notification skipped"
                );
                None
            }
        }
    }

    pub(crate) async fn user_email(&self, user_id: DbId) -> Option<String> {
        match self.store.get_user(user_id).await {
            Ok(user) => Some(user.email),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Cannot resolve user, notification skipped");
                None
            }
        }
    }
}

/// The event reported for a committed audit row.
pub(crate) fn event_for(log: &LogEvent) -> DomainEvent {
    let subject = Subject {
        project_id: log.project_id,
        user_id: log.user_id,
        extension_id: log.extension_id,
        registration_id: log.registration_id,
        task_id: log.task_id,
    };
    DomainEvent::new(log.category.clone(), subject, log.event.clone())
        .with_actor(log.actor_id)
        .with_log_id(log.id)
}
