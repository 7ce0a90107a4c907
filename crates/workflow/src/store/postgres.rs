//! PostgreSQL implementation of [`RecordStore`].
//!
//! Each mutation opens a transaction, runs the repository calls against it
//! and commits at the end; any early return rolls it back on drop. Guarded
//! updates that return no row mean the latch was already taken and surface
//! as [`StoreError::Conflict`].

use async_trait::async_trait;
use hpcalloc_core::lifecycle::TaskDecision;
use hpcalloc_core::profile::UserProfile;
use hpcalloc_core::registration::CommitteeDecision;
use hpcalloc_core::types::{DbId, Timestamp};
use hpcalloc_db::models::accounting::{AccountingSample, CreateAccountingSample};
use hpcalloc_db::models::extension::{CreateExtension, ExtensionDecision, ExtensionRequest};
use hpcalloc_db::models::log_event::{CreateLogEvent, LogEvent, LogEventQuery};
use hpcalloc_db::models::project::{CreateProject, Project};
use hpcalloc_db::models::registration::{
    CreateRegistration, Registration, RegistrationComment, RegistrationStep,
};
use hpcalloc_db::models::resource::{CreateResource, Resource};
use hpcalloc_db::models::task::{CreateTask, Task, TaskEffect};
use hpcalloc_db::models::user::{CreateUser, User, UserEdit};
use hpcalloc_db::repositories::{
    AccountingSampleRepo, ExtensionRepo, LogEventRepo, ProjectRepo, RegistrationCommentRepo,
    RegistrationRepo, ResourceRepo, TaskRepo, UserEditRepo, UserRepo,
};
use hpcalloc_db::DbPool;
use sqlx::PgConnection;

use super::{
    AcceptedRegistration, AllocationChange, AllocationOutcome, AllocationPlan, RecordStore,
    RegistrationAcceptance, StoreError, StoreResult,
};

fn not_found(entity: &'static str, id: DbId) -> StoreError {
    StoreError::NotFound { entity, id }
}

fn conflict(what: String) -> StoreError {
    StoreError::Conflict(what)
}

/// Store backed by the workflow database.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Transaction-scoped helpers
// ---------------------------------------------------------------------------

async fn apply_allocation_in(
    conn: &mut PgConnection,
    project_id: DbId,
    plan: &AllocationPlan,
    at: Timestamp,
) -> StoreResult<AllocationOutcome> {
    let project = ProjectRepo::find_by_id_for_update(&mut *conn, project_id)
        .await?
        .ok_or_else(|| not_found("project", project_id))?;

    let (resource, superseded) = match plan.change.replacement() {
        None => {
            let resource_id = project
                .resource_id
                .ok_or_else(|| not_found("resource", project_id))?;
            let resource =
                ResourceRepo::add_hours(&mut *conn, resource_id, plan.change.hours(), &plan.comment)
                    .await?
                    .ok_or_else(|| not_found("resource", resource_id))?;
            (resource, None)
        }
        Some((hours, ttl)) => {
            let superseded = match project.resource_id {
                Some(id) => ResourceRepo::find_by_id(&mut *conn, id).await?,
                None => None,
            };
            ResourceRepo::invalidate_current(&mut *conn, project_id).await?;
            let resource = ResourceRepo::create(
                &mut *conn,
                &CreateResource {
                    project_id,
                    cpu: hours,
                    ttl,
                    approver_id: plan.approver_id,
                    extension_id: plan.extension_id,
                    comment: Some(plan.comment.clone()),
                    created_at: at,
                },
            )
            .await?;
            ProjectRepo::set_resource(&mut *conn, project_id, resource.id).await?;
            let superseded = superseded.map(|mut r| {
                r.valid = false;
                r
            });
            (resource, superseded)
        }
    };

    let project = match &plan.change {
        AllocationChange::Transform { retype, .. } => {
            ProjectRepo::retype(&mut *conn, project_id, retype).await?
        }
        AllocationChange::Activate { .. } => {
            // Already active is fine; the row is re-read below.
            ProjectRepo::set_active(&mut *conn, project_id, true).await?
        }
        AllocationChange::Renew { .. } | AllocationChange::Extend { .. } => None,
    };
    let project = match project {
        Some(project) => project,
        None => ProjectRepo::find_by_id(&mut *conn, project_id)
            .await?
            .ok_or_else(|| not_found("project", project_id))?,
    };

    Ok(AllocationOutcome {
        project,
        resource,
        superseded,
    })
}

async fn apply_effect_in(conn: &mut PgConnection, effect: &TaskEffect) -> StoreResult<()> {
    match *effect {
        TaskEffect::ActivateUser { user_id } => {
            UserRepo::set_active(&mut *conn, user_id, true)
                .await?
                .ok_or_else(|| not_found("user", user_id))?;
        }
        TaskEffect::AddMember {
            user_id,
            project_id,
        } => {
            ProjectRepo::add_member(&mut *conn, project_id, user_id).await?;
        }
        TaskEffect::RemoveMember {
            user_id,
            project_id,
        } => {
            ProjectRepo::remove_member(&mut *conn, project_id, user_id).await?;
        }
        TaskEffect::SetResponsible {
            user_id,
            project_id,
        } => {
            ProjectRepo::set_responsible(&mut *conn, project_id, user_id)
                .await?
                .ok_or_else(|| not_found("project", project_id))?;
            ProjectRepo::add_member(&mut *conn, project_id, user_id).await?;
        }
        TaskEffect::ApplyProfileEdit { user_id } => {
            let edit = UserEditRepo::find_by_user(&mut *conn, user_id)
                .await?
                .ok_or_else(|| not_found("user_edit", user_id))?;
            UserRepo::apply_profile(&mut *conn, user_id, &edit.profile())
                .await?
                .ok_or_else(|| not_found("user", user_id))?;
            UserEditRepo::delete_by_user(&mut *conn, user_id).await?;
        }
    }
    Ok(())
}

async fn find_or_create_user(conn: &mut PgConnection, profile: &UserProfile) -> StoreResult<User> {
    if let Some(user) = UserRepo::find_by_email(&mut *conn, &profile.email).await? {
        return Ok(user);
    }
    let user = UserRepo::create(
        &mut *conn,
        &CreateUser {
            login: None,
            profile: profile.clone(),
            active: true,
        },
    )
    .await?;
    Ok(user)
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RecordStore for PgStore {
    // -- users -----------------------------------------------------------------

    async fn create_user(&self, input: &CreateUser) -> StoreResult<User> {
        Ok(UserRepo::create(&self.pool, input).await?)
    }

    async fn get_user(&self, id: DbId) -> StoreResult<User> {
        UserRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| not_found("user", id))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(UserRepo::find_by_email(&self.pool, email).await?)
    }

    async fn get_user_edit(&self, user_id: DbId) -> StoreResult<Option<UserEdit>> {
        Ok(UserEditRepo::find_by_user(&self.pool, user_id).await?)
    }

    // -- projects and allocations ---------------------------------------------

    async fn create_project(&self, input: &CreateProject) -> StoreResult<Project> {
        Ok(ProjectRepo::create(&self.pool, input).await?)
    }

    async fn get_project(&self, id: DbId) -> StoreResult<Project> {
        ProjectRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| not_found("project", id))
    }

    async fn find_project_by_title(&self, title: &str) -> StoreResult<Option<Project>> {
        Ok(ProjectRepo::find_by_title(&self.pool, title).await?)
    }

    async fn project_members(&self, project_id: DbId) -> StoreResult<Vec<User>> {
        Ok(ProjectRepo::list_members(&self.pool, project_id).await?)
    }

    async fn current_allocation(&self, project_id: DbId) -> StoreResult<Option<Resource>> {
        Ok(ResourceRepo::find_current(&self.pool, project_id).await?)
    }

    async fn allocation_history(&self, project_id: DbId) -> StoreResult<Vec<Resource>> {
        Ok(ResourceRepo::list_for_project(&self.pool, project_id).await?)
    }

    async fn expiring_allocations(&self, before: Timestamp) -> StoreResult<Vec<Resource>> {
        Ok(ResourceRepo::list_current_expiring(&self.pool, before).await?)
    }

    async fn active_allocations(&self) -> StoreResult<Vec<Resource>> {
        Ok(ResourceRepo::list_current_active(&self.pool).await?)
    }

    async fn apply_allocation(
        &self,
        project_id: DbId,
        plan: &AllocationPlan,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(AllocationOutcome, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        let outcome = apply_allocation_in(&mut *tx, project_id, plan, at).await?;
        let log = LogEventRepo::create(&mut *tx, &audit.or_project(project_id)).await?;
        tx.commit().await?;
        Ok((outcome, log))
    }

    async fn suspend_project(
        &self,
        project_id: DbId,
        audit: CreateLogEvent,
    ) -> StoreResult<(Project, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        ProjectRepo::find_by_id_for_update(&mut *tx, project_id)
            .await?
            .ok_or_else(|| not_found("project", project_id))?;
        let project = ProjectRepo::set_active(&mut *tx, project_id, false)
            .await?
            .ok_or_else(|| conflict(format!("project {project_id} is already inactive")))?;
        ResourceRepo::invalidate_current(&mut *tx, project_id).await?;
        let log = LogEventRepo::create(&mut *tx, &audit.or_project(project_id)).await?;
        tx.commit().await?;
        Ok((project, log))
    }

    // -- extensions ------------------------------------------------------------

    async fn insert_extension(
        &self,
        input: &CreateExtension,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        let ext = ExtensionRepo::create(&mut *tx, input).await?;
        let audit = audit.or_extension(ext.id).or_project(ext.project_id);
        let log = LogEventRepo::create(&mut *tx, &audit).await?;
        tx.commit().await?;
        Ok((ext, log))
    }

    async fn get_extension(&self, id: DbId) -> StoreResult<ExtensionRequest> {
        ExtensionRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| not_found("extension", id))
    }

    async fn decide_extension(
        &self,
        id: DbId,
        decision: &ExtensionDecision,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        let ext = ExtensionRepo::decide(&mut *tx, id, decision)
            .await?
            .ok_or_else(|| conflict(format!("extension {id} already processed")))?;
        let audit = audit.or_extension(id).or_project(ext.project_id);
        let log = LogEventRepo::create(&mut *tx, &audit).await?;
        tx.commit().await?;
        Ok((ext, log))
    }

    async fn execute_extension(
        &self,
        id: DbId,
        plan: &AllocationPlan,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, AllocationOutcome, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        // The latch goes first so a concurrent executor blocks on the row
        // and then finds nothing to update.
        let ext = ExtensionRepo::mark_done(&mut *tx, id, at)
            .await?
            .ok_or_else(|| conflict(format!("extension {id} is not awaiting execution")))?;
        let outcome = apply_allocation_in(&mut *tx, ext.project_id, plan, at).await?;
        let audit = audit.or_extension(id).or_project(ext.project_id);
        let log = LogEventRepo::create(&mut *tx, &audit).await?;
        tx.commit().await?;
        Ok((ext, outcome, log))
    }

    async fn project_extensions(&self, project_id: DbId) -> StoreResult<Vec<ExtensionRequest>> {
        Ok(ExtensionRepo::list_for_project(&self.pool, project_id).await?)
    }

    async fn pending_extensions(&self) -> StoreResult<Vec<ExtensionRequest>> {
        Ok(ExtensionRepo::list_pending(&self.pool).await?)
    }

    async fn extensions_awaiting_execution(&self) -> StoreResult<Vec<ExtensionRequest>> {
        Ok(ExtensionRepo::list_awaiting_execution(&self.pool).await?)
    }

    // -- registrations -----------------------------------------------------------

    async fn insert_registration(
        &self,
        input: &CreateRegistration,
        audit: CreateLogEvent,
    ) -> StoreResult<(Registration, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        let reg = RegistrationRepo::create(&mut *tx, input).await?;
        let log = LogEventRepo::create(&mut *tx, &audit.or_registration(reg.id)).await?;
        tx.commit().await?;
        Ok((reg, log))
    }

    async fn get_registration(&self, id: DbId) -> StoreResult<Registration> {
        RegistrationRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| not_found("registration", id))
    }

    async fn registration_comments(&self, id: DbId) -> StoreResult<Vec<RegistrationComment>> {
        Ok(RegistrationCommentRepo::list_for_registration(&self.pool, id).await?)
    }

    async fn apply_registration_step(
        &self,
        id: DbId,
        step: &RegistrationStep,
        actor_id: Option<DbId>,
        comment: &str,
        audit: CreateLogEvent,
    ) -> StoreResult<(Registration, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        let reg = RegistrationRepo::apply_step(&mut *tx, id, step)
            .await?
            .ok_or_else(|| conflict(format!("registration {id} no longer allows this step")))?;
        RegistrationCommentRepo::create(&mut *tx, id, actor_id, comment).await?;
        let log = LogEventRepo::create(&mut *tx, &audit.or_registration(id)).await?;
        tx.commit().await?;
        Ok((reg, log))
    }

    async fn accept_registration(
        &self,
        id: DbId,
        acceptance: &RegistrationAcceptance,
        accepted_audit: CreateLogEvent,
        created_audit: CreateLogEvent,
    ) -> StoreResult<(AcceptedRegistration, Vec<LogEvent>)> {
        let mut tx = self.pool.begin().await?;

        let step = RegistrationStep::Committee {
            decision: CommitteeDecision::Accepted,
            note: acceptance.note.clone(),
            at: acceptance.at,
        };
        let reg = RegistrationRepo::apply_step(&mut *tx, id, &step)
            .await?
            .ok_or_else(|| conflict(format!("registration {id} cannot be accepted")))?;

        let (project, project_created) =
            match ProjectRepo::find_by_title(&mut *tx, &reg.title).await? {
                Some(project) => (project, false),
                None => (ProjectRepo::create(&mut *tx, &acceptance.new_project).await?, true),
            };

        let responsible = match project.responsible_id {
            Some(user_id) => UserRepo::find_by_id(&mut *tx, user_id)
                .await?
                .ok_or_else(|| not_found("user", user_id))?,
            None => {
                let user = find_or_create_user(&mut *tx, &reg.responsible_profile()).await?;
                ProjectRepo::set_responsible(&mut *tx, project.id, user.id).await?;
                user
            }
        };
        ProjectRepo::add_member(&mut *tx, project.id, responsible.id).await?;

        let resource = match ResourceRepo::find_current(&mut *tx, project.id).await? {
            Some(resource) => resource,
            None => {
                let resource = ResourceRepo::create(
                    &mut *tx,
                    &CreateResource {
                        project_id: project.id,
                        cpu: acceptance.hours,
                        ttl: acceptance.ttl,
                        approver_id: acceptance.actor_id,
                        extension_id: None,
                        comment: None,
                        created_at: acceptance.at,
                    },
                )
                .await?;
                ProjectRepo::set_resource(&mut *tx, project.id, resource.id).await?;
                resource
            }
        };
        let project = ProjectRepo::find_by_id(&mut *tx, project.id)
            .await?
            .ok_or_else(|| not_found("project", project.id))?;

        let registration = RegistrationRepo::link_project(&mut *tx, id, project.id)
            .await?
            .ok_or_else(|| not_found("registration", id))?;
        RegistrationCommentRepo::create(&mut *tx, id, acceptance.actor_id, &acceptance.comment)
            .await?;

        let mut logs = vec![
            LogEventRepo::create(
                &mut *tx,
                &accepted_audit.or_registration(id).or_project(project.id),
            )
            .await?,
        ];
        if project_created {
            let audit = created_audit
                .or_registration(id)
                .or_project(project.id)
                .or_user(responsible.id);
            logs.push(LogEventRepo::create(&mut *tx, &audit).await?);
        }

        tx.commit().await?;
        Ok((
            AcceptedRegistration {
                registration,
                project,
                resource,
                responsible,
                project_created,
            },
            logs,
        ))
    }

    async fn pending_registrations(&self) -> StoreResult<Vec<Registration>> {
        Ok(RegistrationRepo::list_pending(&self.pool).await?)
    }

    // -- tasks -----------------------------------------------------------------

    async fn insert_task(
        &self,
        input: &CreateTask,
        edit: Option<&UserProfile>,
        audit: CreateLogEvent,
    ) -> StoreResult<(Task, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        // A duplicate task aborts the transaction before the edit is staged.
        let task = TaskRepo::create(&mut *tx, input).await?;
        if let Some(profile) = edit {
            UserEditRepo::upsert(&mut *tx, input.action.user_id(), profile).await?;
        }
        let mut audit = audit.or_task(task.id).or_user(input.action.user_id());
        if let Some(project_id) = task.project_id {
            audit = audit.or_project(project_id);
        }
        let log = LogEventRepo::create(&mut *tx, &audit).await?;
        tx.commit().await?;
        Ok((task, log))
    }

    async fn get_task(&self, id: DbId) -> StoreResult<Task> {
        TaskRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| not_found("task", id))
    }

    async fn decide_task(
        &self,
        id: DbId,
        decision: TaskDecision,
        approver_id: DbId,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(Task, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepo::decide(&mut *tx, id, decision, approver_id, at)
            .await?
            .ok_or_else(|| conflict(format!("task {id} already processed")))?;
        let log = LogEventRepo::create(&mut *tx, &audit.or_task(id)).await?;
        tx.commit().await?;
        Ok((task, log))
    }

    async fn complete_task(
        &self,
        id: DbId,
        effects: &[TaskEffect],
        result: &str,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(Task, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        let task = TaskRepo::complete(&mut *tx, id, result, at)
            .await?
            .ok_or_else(|| conflict(format!("task {id} is not awaiting completion")))?;
        for effect in effects {
            apply_effect_in(&mut *tx, effect).await?;
        }
        let log = LogEventRepo::create(&mut *tx, &audit.or_task(id)).await?;
        tx.commit().await?;
        Ok((task, log))
    }

    async fn pending_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::list_pending(&self.pool).await?)
    }

    // -- audit and accounting ---------------------------------------------------

    async fn record_event(&self, audit: CreateLogEvent) -> StoreResult<LogEvent> {
        Ok(LogEventRepo::create(&self.pool, &audit).await?)
    }

    async fn log_events(&self, filter: &LogEventQuery) -> StoreResult<Vec<LogEvent>> {
        Ok(LogEventRepo::query(&self.pool, filter).await?)
    }

    async fn store_usage(
        &self,
        samples: &[CreateAccountingSample],
        audit: CreateLogEvent,
    ) -> StoreResult<(usize, LogEvent)> {
        let mut tx = self.pool.begin().await?;
        for sample in samples {
            AccountingSampleRepo::upsert(&mut *tx, sample).await?;
        }
        let log = LogEventRepo::create(&mut *tx, &audit).await?;
        tx.commit().await?;
        Ok((samples.len(), log))
    }

    async fn usage_samples(&self, resource_id: DbId) -> StoreResult<Vec<AccountingSample>> {
        Ok(AccountingSampleRepo::list_for_resource(&self.pool, resource_id).await?)
    }
}
