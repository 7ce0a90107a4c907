//! Consumption collection and reporting.

use hpcalloc_core::audit::categories;
use hpcalloc_core::error::CoreError;
use hpcalloc_core::types::{start_of_day, DbId, Timestamp};
use hpcalloc_core::usage::{daily_windows, project_total};
use hpcalloc_db::models::accounting::CreateAccountingSample;
use hpcalloc_db::models::log_event::CreateLogEvent;
use hpcalloc_db::models::project::Project;
use hpcalloc_db::models::resource::Resource;

use crate::engine::{event_for, Engine};
use crate::error::WorkflowResult;
use crate::transition::Transition;

impl Engine {
    async fn current_of(&self, project_id: DbId) -> WorkflowResult<(Project, Resource)> {
        let project = self.store.get_project(project_id).await?;
        let resource = self
            .store
            .current_allocation(project_id)
            .await?
            .ok_or(CoreError::MissingEntity {
                entity: "resource",
                id: project_id,
            })?;
        Ok((project, resource))
    }

    /// Pull consumption for `[start, end)` and store it against the
    /// project's current allocation, one project-wide row plus one row per
    /// user, dated by the day of `start`.
    ///
    /// Collecting the same day again replaces its rows. An empty report
    /// stores nothing; the accounting source has already logged why.
    pub async fn collect_usage(
        &self,
        project_id: DbId,
        start: Timestamp,
        end: Timestamp,
    ) -> WorkflowResult<Transition<usize>> {
        let (project, resource) = self.current_of(project_id).await?;
        let accounts = [project.name.clone()];
        let report = self.accounting.usage(&accounts, start, end).await;
        if report.account(&project.name).is_none() {
            tracing::debug!(project = %project.name, "No usage reported");
            return Ok(Transition::new(0));
        }

        let day = start.date_naive();
        let mut samples = vec![CreateAccountingSample {
            project_id,
            resource_id: resource.id,
            user_login: None,
            day,
            cpu_hours: report.total(&project.name),
        }];
        samples.extend(report.users(&project.name).map(|(login, hours)| CreateAccountingSample {
            project_id,
            resource_id: resource.id,
            user_login: Some(login.to_string()),
            day,
            cpu_hours: hours,
        }));

        let audit = CreateLogEvent::new(
            None,
            categories::USAGE_COLLECTED,
            format!(
                "{} used {} of {} hours on {day}",
                project.name, samples[0].cpu_hours, resource.cpu
            ),
        )
        .for_project(project_id);
        let (stored, log) = self.store.store_usage(&samples, audit).await?;
        tracing::info!(project = %project.name, samples = stored, "Usage collected");

        Ok(Transition::new(stored).with_event(event_for(&log)))
    }

    /// Collect usage for every active allocation, one day at a time.
    ///
    /// Starts over from the last collected day, which may have been
    /// partial, or from the allocation's creation when nothing was stored.
    pub async fn collect_all_usage(&self) -> WorkflowResult<Vec<Transition<usize>>> {
        let now = self.now();
        let mut collected = Vec::new();
        for resource in self.store.active_allocations().await? {
            let since = match self.store.usage_samples(resource.id).await {
                Ok(samples) => samples
                    .iter()
                    .map(|s| start_of_day(s.day))
                    .max()
                    .map_or(resource.created_at, |day| day.max(resource.created_at)),
                Err(e) => {
                    tracing::error!(project_id = resource.project_id, error = %e, "Failed to read usage samples");
                    continue;
                }
            };
            for (start, end) in daily_windows(since, now) {
                match self.collect_usage(resource.project_id, start, end).await {
                    Ok(transition) => collected.push(transition),
                    Err(e) => {
                        tracing::error!(
                            project_id = resource.project_id,
                            day = %start.date_naive(),
                            error = %e,
                            "Failed to collect usage"
                        );
                        break;
                    }
                }
            }
        }
        Ok(collected)
    }

    /// Share of the current allocation consumed, e.g. `"25.0%"`: the sum
    /// of its project-wide samples against its grant.
    pub async fn allocation_usage(&self, project_id: DbId) -> WorkflowResult<String> {
        let (_, resource) = self.current_of(project_id).await?;
        let samples = self.store.usage_samples(resource.id).await?;
        let consumed = project_total(samples.iter().map(|s| (s.user_login.as_deref(), s.cpu_hours)));
        Ok(self.lifecycle.usage(consumed, resource.cpu))
    }
}
