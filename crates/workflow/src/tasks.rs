//! Administrative task queue.
//!
//! Tasks are enqueued with a [`TaskAction`] whose descriptor is unique
//! among pending tasks, decided once, and completed once accepted.
//! Completion applies the action's effects in the same transaction that
//! sets the done latch.

use hpcalloc_core::audit::categories;
use hpcalloc_core::error::CoreError;
use hpcalloc_core::lifecycle::{ensure_task_completable, ensure_task_undecided, TaskDecision, TASK_ENTITY};
use hpcalloc_core::profile::{diff_profiles, UserProfile};
use hpcalloc_core::task_action::TaskAction;
use hpcalloc_core::types::DbId;
use hpcalloc_db::models::log_event::CreateLogEvent;
use hpcalloc_db::models::task::{CreateTask, Task, TaskEffect};
use validator::Validate;

use crate::engine::{event_for, Engine};
use crate::error::{StoreError, WorkflowError, WorkflowResult};
use crate::mail;
use crate::transition::Transition;

/// Effects and result note for completing `action`.
///
/// `profile_summary` describes the staged edit of an update-user action.
pub fn completion_plan(action: &TaskAction, profile_summary: Option<&str>) -> (Vec<TaskEffect>, String) {
    match *action {
        TaskAction::CreateUser { user_id, project_id } => (
            vec![
                TaskEffect::ActivateUser { user_id },
                TaskEffect::AddMember { user_id, project_id },
            ],
            format!("User #{user_id} activated and added to project #{project_id}"),
        ),
        TaskAction::CreateResponsible { user_id, project_id } => (
            vec![
                TaskEffect::ActivateUser { user_id },
                TaskEffect::SetResponsible { user_id, project_id },
            ],
            format!("User #{user_id} activated as responsible of project #{project_id}"),
        ),
        TaskAction::AssignUser { user_id, project_id } => (
            vec![TaskEffect::AddMember { user_id, project_id }],
            format!("User #{user_id} added to project #{project_id}"),
        ),
        TaskAction::RemoveUser { user_id, project_id } => (
            vec![TaskEffect::RemoveMember { user_id, project_id }],
            format!("User #{user_id} removed from project #{project_id}"),
        ),
        TaskAction::AssignResponsible { user_id, project_id } => (
            vec![TaskEffect::SetResponsible { user_id, project_id }],
            format!("User #{user_id} is now responsible of project #{project_id}"),
        ),
        TaskAction::UpdateUser { user_id } => (
            vec![TaskEffect::ApplyProfileEdit { user_id }],
            format!(
                "Profile of user #{user_id} updated: {}",
                profile_summary.unwrap_or("no changes")
            ),
        ),
        // Credentials are handled outside the workflow.
        TaskAction::PasswordReset { user_id } => (Vec::new(), format!("Password of user #{user_id} reset")),
        TaskAction::SshKeyUpload { user_id } => (Vec::new(), format!("SSH key of user #{user_id} installed")),
    }
}

impl Engine {
    /// Queue an administrative action.
    ///
    /// Fails with [`CoreError::DuplicateTask`] while a task with the same
    /// descriptor is still undecided.
    pub async fn enqueue_task(
        &self,
        action: TaskAction,
        author_id: DbId,
        comment: Option<String>,
    ) -> WorkflowResult<Transition<Task>> {
        self.queue_task(action, author_id, comment, None).await
    }

    /// Stage a profile edit and queue the task that applies it.
    ///
    /// The edit is only staged if the task is queued, so a refused
    /// duplicate leaves the pending edit in place.
    pub async fn request_profile_update(
        &self,
        user_id: DbId,
        profile: UserProfile,
        author_id: DbId,
    ) -> WorkflowResult<Transition<Task>> {
        profile.validate()?;
        let user = self.store.get_user(user_id).await?;
        let changes = diff_profiles(&user.profile(), &profile);
        if changes.is_empty() {
            return Err(CoreError::invalid("The profile edit changes nothing").into());
        }
        self.queue_task(
            TaskAction::UpdateUser { user_id },
            author_id,
            Some(changes.summary()),
            Some(&profile),
        )
        .await
    }

    async fn queue_task(
        &self,
        action: TaskAction,
        author_id: DbId,
        comment: Option<String>,
        edit: Option<&UserProfile>,
    ) -> WorkflowResult<Transition<Task>> {
        self.store.get_user(action.user_id()).await?;
        if let Some(project_id) = action.project_id() {
            self.store.get_project(project_id).await?;
        }

        let descriptor = action.to_string();
        let input = CreateTask {
            action,
            author_id,
            comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        };
        let audit = CreateLogEvent::new(
            Some(author_id),
            categories::TASK_QUEUED,
            format!("Task queued: {}", action.describe()),
        );
        let (task, log) = self
            .store
            .insert_task(&input, edit, audit)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => CoreError::DuplicateTask(descriptor.clone()).into(),
                other => WorkflowError::from(other),
            })?;
        tracing::info!(task_id = task.id, action = %descriptor, "Task queued");

        let mut event = event_for(&log);
        if let Some(to) = &self.config.technical_email {
            event = event.with_notification(hpcalloc_events::Notification::new(
                to.clone(),
                format!("New task #{}", task.id),
                format!("Task #{} requests: {}", task.id, action.describe()),
            ));
        }
        Ok(Transition::new(task).with_event(event))
    }

    /// Record the decision on a pending task. The author is told unless
    /// the task is ignored.
    pub async fn decide_task(
        &self,
        id: DbId,
        actor_id: DbId,
        decision: TaskDecision,
    ) -> WorkflowResult<Transition<Task>> {
        let task = self.store.get_task(id).await?;
        ensure_task_undecided(id, task.processed)?;
        let action = task.task_action()?;

        let audit = CreateLogEvent::new(
            Some(actor_id),
            match decision {
                TaskDecision::Accept => categories::ACCEPTED,
                TaskDecision::Reject => categories::REJECTED,
                TaskDecision::Ignore => categories::IGNORED,
            },
            format!("Task #{id} ({}) {}", action.describe(), decision.as_str()),
        );
        let (task, log) = self
            .store
            .decide_task(id, decision, actor_id, self.now(), audit)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => CoreError::AlreadyProcessed {
                    entity: TASK_ENTITY,
                    id,
                }
                .into(),
                other => WorkflowError::from(other),
            })?;
        tracing::info!(task_id = id, decision = decision.as_str(), "Task decided");

        let mut event = event_for(&log);
        if decision.notifies_author() {
            if let Some(to) = self.user_email(task.author_id).await {
                event = event.with_notification(mail::task_decided(&to, &task, &action.describe()));
            }
        }
        Ok(Transition::new(task).with_event(event))
    }

    /// Apply an accepted task and set its done latch.
    pub async fn complete_task(
        &self,
        id: DbId,
        actor_id: Option<DbId>,
    ) -> WorkflowResult<Transition<Task>> {
        let task = self.store.get_task(id).await?;
        ensure_task_completable(id, task.processed, task.task_decision(), task.done)?;
        let action = task.task_action()?;

        let summary = match action {
            TaskAction::UpdateUser { user_id } => {
                let user = self.store.get_user(user_id).await?;
                let edit = self.store.get_user_edit(user_id).await?.ok_or(
                    CoreError::MissingEntity {
                        entity: "user_edit",
                        id: user_id,
                    },
                )?;
                Some(diff_profiles(&user.profile(), &edit.profile()).summary())
            }
            _ => None,
        };
        let (effects, result) = completion_plan(&action, summary.as_deref());

        let audit = CreateLogEvent::new(
            actor_id.or(task.approver_id),
            categories::TASK_DONE,
            format!("Task #{id} done: {result}"),
        );
        let (task, log) = match self
            .store
            .complete_task(id, &effects, &result, self.now(), audit)
            .await
        {
            Ok(done) => done,
            Err(StoreError::Conflict(reason)) => {
                let current = self.store.get_task(id).await?;
                ensure_task_completable(id, current.processed, current.task_decision(), current.done)?;
                return Err(StoreError::Conflict(reason).into());
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(task_id = id, result = %result, "Task completed");

        Ok(Transition::new(task).with_event(event_for(&log)))
    }

    pub async fn get_task(&self, id: DbId) -> WorkflowResult<Task> {
        Ok(self.store.get_task(id).await?)
    }

    pub async fn pending_tasks(&self) -> WorkflowResult<Vec<Task>> {
        Ok(self.store.pending_tasks().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_responsible_activates_then_assigns() {
        let (effects, result) = completion_plan(
            &TaskAction::CreateResponsible {
                user_id: 3,
                project_id: 8,
            },
            None,
        );
        assert_eq!(
            effects,
            vec![
                TaskEffect::ActivateUser { user_id: 3 },
                TaskEffect::SetResponsible {
                    user_id: 3,
                    project_id: 8
                },
            ]
        );
        assert_eq!(result, "User #3 activated as responsible of project #8");
    }

    #[test]
    fn credential_actions_have_no_effects() {
        let (effects, _) = completion_plan(&TaskAction::SshKeyUpload { user_id: 1 }, None);
        assert!(effects.is_empty());
    }

    #[test]
    fn profile_update_reports_summary() {
        let (_, result) = completion_plan(
            &TaskAction::UpdateUser { user_id: 5 },
            Some("lab: - -> HPC"),
        );
        assert_eq!(result, "Profile of user #5 updated: lab: - -> HPC");
    }
}
