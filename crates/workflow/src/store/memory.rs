//! In-memory implementation of [`RecordStore`].
//!
//! All tables live in one [`State`] behind a `tokio::sync::Mutex`. Every
//! mutation runs against a clone of the state which replaces the original
//! only if the whole operation succeeds, so a failed step leaves nothing
//! behind, like a rolled-back transaction.
//!
//! Uniqueness rules mirror the Postgres indexes and report the same
//! constraint names in [`StoreError::Conflict`].

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use hpcalloc_core::comment::append_line;
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
use tokio::sync::Mutex;

use super::{
    AcceptedRegistration, AllocationChange, AllocationOutcome, AllocationPlan, RecordStore,
    RegistrationAcceptance, StoreError, StoreResult,
};

fn not_found(entity: &'static str, id: DbId) -> StoreError {
    StoreError::NotFound { entity, id }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct State {
    next_id: DbId,
    users: BTreeMap<DbId, User>,
    /// Keyed by user id.
    user_edits: BTreeMap<DbId, UserEdit>,
    projects: BTreeMap<DbId, Project>,
    /// `(project_id, user_id)`.
    members: BTreeSet<(DbId, DbId)>,
    resources: BTreeMap<DbId, Resource>,
    extensions: BTreeMap<DbId, ExtensionRequest>,
    registrations: BTreeMap<DbId, Registration>,
    comments: Vec<RegistrationComment>,
    tasks: BTreeMap<DbId, Task>,
    log_events: Vec<LogEvent>,
    samples: Vec<AccountingSample>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn log(&mut self, audit: CreateLogEvent, at: Timestamp) -> LogEvent {
        let event = LogEvent {
            id: self.next_id(),
            actor_id: audit.actor_id,
            category: audit.category,
            event: audit.event,
            project_id: audit.project_id,
            user_id: audit.user_id,
            extension_id: audit.extension_id,
            registration_id: audit.registration_id,
            task_id: audit.task_id,
            created_at: at,
        };
        self.log_events.push(event.clone());
        event
    }

    // -- users ---------------------------------------------------------------

    fn email_taken(&self, email: &str, except: Option<DbId>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    fn insert_user(&mut self, input: &CreateUser) -> StoreResult<User> {
        if self.email_taken(&input.profile.email, None) {
            return Err(StoreError::Conflict("uq_users_email".into()));
        }
        if let Some(login) = &input.login {
            if self.users.values().any(|u| u.login.as_ref() == Some(login)) {
                return Err(StoreError::Conflict("uq_users_login".into()));
            }
        }
        let now = Utc::now();
        let p = &input.profile;
        let user = User {
            id: self.next_id(),
            login: input.login.clone(),
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            email: p.email.clone(),
            phone: p.phone.clone(),
            lab: p.lab.clone(),
            position: p.position.clone(),
            active: input.active,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn find_or_create_user(&mut self, profile: &UserProfile) -> StoreResult<User> {
        if let Some(user) = self
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(&profile.email))
        {
            return Ok(user.clone());
        }
        self.insert_user(&CreateUser {
            login: None,
            profile: profile.clone(),
            active: true,
        })
    }

    fn user_mut(&mut self, id: DbId) -> StoreResult<&mut User> {
        self.users.get_mut(&id).ok_or_else(|| not_found("user", id))
    }

    /// Replace the pending edit of `user_id`.
    fn stage_edit(&mut self, user_id: DbId, profile: &UserProfile) -> StoreResult<UserEdit> {
        self.user_mut(user_id)?;
        let edit = UserEdit {
            id: self.next_id(),
            user_id,
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            lab: profile.lab.clone(),
            position: profile.position.clone(),
            created_at: Utc::now(),
        };
        self.user_edits.insert(user_id, edit.clone());
        Ok(edit)
    }

    // -- projects and allocations --------------------------------------------

    fn insert_project(&mut self, input: &CreateProject) -> StoreResult<Project> {
        if self.projects.values().any(|p| p.name == input.name) {
            return Err(StoreError::Conflict("uq_projects_name".into()));
        }
        let now = Utc::now();
        let project = Project {
            id: self.next_id(),
            name: input.name.clone(),
            title: input.title.clone(),
            type_code: input.type_code.clone(),
            type_label: input.type_label.clone(),
            active: true,
            responsible_id: input.responsible_id,
            resource_id: None,
            registration_id: input.registration_id,
            created_at: now,
            updated_at: now,
        };
        self.projects.insert(project.id, project.clone());
        Ok(project)
    }

    fn project_mut(&mut self, id: DbId) -> StoreResult<&mut Project> {
        self.projects.get_mut(&id).ok_or_else(|| not_found("project", id))
    }

    fn current_resource(&self, project_id: DbId) -> Option<&Resource> {
        self.projects
            .get(&project_id)
            .and_then(|p| p.resource_id)
            .and_then(|id| self.resources.get(&id))
    }

    fn insert_resource(&mut self, input: &CreateResource) -> StoreResult<Resource> {
        let project_id = input.project_id;
        if self
            .resources
            .values()
            .any(|r| r.project_id == project_id && r.valid)
        {
            return Err(StoreError::Conflict("uq_resources_current".into()));
        }
        let resource = Resource {
            id: self.next_id(),
            project_id,
            cpu: input.cpu,
            ttl: input.ttl,
            valid: true,
            approver_id: input.approver_id,
            extension_id: input.extension_id,
            comment: input.comment.clone(),
            created_at: input.created_at,
        };
        self.resources.insert(resource.id, resource.clone());
        let project = self.project_mut(project_id)?;
        project.resource_id = Some(resource.id);
        project.updated_at = Utc::now();
        Ok(resource)
    }

    fn invalidate_current(&mut self, project_id: DbId) -> Option<Resource> {
        let current = self.projects.get(&project_id).and_then(|p| p.resource_id);
        for resource in self.resources.values_mut() {
            if resource.project_id == project_id {
                resource.valid = false;
            }
        }
        current.and_then(|id| self.resources.get(&id).cloned())
    }

    fn apply_allocation(
        &mut self,
        project_id: DbId,
        plan: &AllocationPlan,
        at: Timestamp,
    ) -> StoreResult<AllocationOutcome> {
        self.project_mut(project_id)?;

        let (resource, superseded) = match plan.change.replacement() {
            None => {
                let resource_id = self
                    .projects
                    .get(&project_id)
                    .and_then(|p| p.resource_id)
                    .ok_or_else(|| not_found("resource", project_id))?;
                let other_valid = self
                    .resources
                    .values()
                    .any(|r| r.project_id == project_id && r.valid && r.id != resource_id);
                if other_valid {
                    return Err(StoreError::Conflict("uq_resources_current".into()));
                }
                let resource = self
                    .resources
                    .get_mut(&resource_id)
                    .ok_or_else(|| not_found("resource", resource_id))?;
                resource.cpu += plan.change.hours();
                resource.valid = true;
                resource.comment = Some(append_line(resource.comment.as_deref(), &plan.comment));
                (resource.clone(), None)
            }
            Some((hours, ttl)) => {
                let superseded = self.invalidate_current(project_id);
                let resource = self.insert_resource(&CreateResource {
                    project_id,
                    cpu: hours,
                    ttl,
                    approver_id: plan.approver_id,
                    extension_id: plan.extension_id,
                    comment: Some(plan.comment.clone()),
                    created_at: at,
                })?;
                (resource, superseded)
            }
        };

        match &plan.change {
            AllocationChange::Transform { retype, .. } => {
                if self
                    .projects
                    .values()
                    .any(|p| p.id != project_id && p.name == retype.name)
                {
                    return Err(StoreError::Conflict("uq_projects_name".into()));
                }
                let project = self.project_mut(project_id)?;
                project.name = retype.name.clone();
                project.type_code = retype.type_code.clone();
                project.type_label = retype.type_label.clone();
            }
            AllocationChange::Activate { .. } => {
                self.project_mut(project_id)?.active = true;
            }
            AllocationChange::Renew { .. } | AllocationChange::Extend { .. } => {}
        }

        let project = self.project_mut(project_id)?.clone();
        Ok(AllocationOutcome {
            project,
            resource,
            superseded,
        })
    }

    // -- registrations --------------------------------------------------------

    fn registration_mut(&mut self, id: DbId) -> StoreResult<&mut Registration> {
        self.registrations
            .get_mut(&id)
            .ok_or_else(|| not_found("registration", id))
    }

    fn add_comment(&mut self, registration_id: DbId, author_id: Option<DbId>, body: &str) {
        let comment = RegistrationComment {
            id: self.next_id(),
            registration_id,
            author_id,
            body: body.to_string(),
            created_at: Utc::now(),
        };
        self.comments.push(comment);
    }

    // -- tasks -----------------------------------------------------------------

    fn apply_effect(&mut self, effect: &TaskEffect) -> StoreResult<()> {
        match *effect {
            TaskEffect::ActivateUser { user_id } => {
                let user = self.user_mut(user_id)?;
                user.active = true;
                user.updated_at = Utc::now();
            }
            TaskEffect::AddMember {
                user_id,
                project_id,
            } => {
                self.user_mut(user_id)?;
                self.project_mut(project_id)?;
                self.members.insert((project_id, user_id));
            }
            TaskEffect::RemoveMember {
                user_id,
                project_id,
            } => {
                self.members.remove(&(project_id, user_id));
            }
            TaskEffect::SetResponsible {
                user_id,
                project_id,
            } => {
                self.user_mut(user_id)?;
                let project = self.project_mut(project_id)?;
                project.responsible_id = Some(user_id);
                project.updated_at = Utc::now();
                self.members.insert((project_id, user_id));
            }
            TaskEffect::ApplyProfileEdit { user_id } => {
                let edit = self
                    .user_edits
                    .remove(&user_id)
                    .ok_or_else(|| not_found("user_edit", user_id))?;
                if self.email_taken(&edit.email, Some(user_id)) {
                    return Err(StoreError::Conflict("uq_users_email".into()));
                }
                let user = self.user_mut(user_id)?;
                user.first_name = edit.first_name;
                user.last_name = edit.last_name;
                user.email = edit.email;
                user.phone = edit.phone;
                user.lab = edit.lab;
                user.position = edit.position;
                user.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Non-durable store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a draft of the state and keep it only on success.
    async fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut State) -> StoreResult<T> + Send,
        T: Send,
    {
        let mut guard = self.state.lock().await;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        *guard = draft;
        Ok(out)
    }

    async fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&State) -> T + Send,
        T: Send,
    {
        let guard = self.state.lock().await;
        f(&guard)
    }
}

fn newest_first(mut resources: Vec<Resource>) -> Vec<Resource> {
    resources.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    resources
}

#[async_trait]
impl RecordStore for MemoryStore {
    // -- users -----------------------------------------------------------------

    async fn create_user(&self, input: &CreateUser) -> StoreResult<User> {
        self.transaction(|s| s.insert_user(input)).await
    }

    async fn get_user(&self, id: DbId) -> StoreResult<User> {
        self.read(|s| s.users.get(&id).cloned())
            .await
            .ok_or_else(|| not_found("user", id))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read(|s| {
                s.users
                    .values()
                    .find(|u| u.email.eq_ignore_ascii_case(email))
                    .cloned()
            })
            .await)
    }

    async fn get_user_edit(&self, user_id: DbId) -> StoreResult<Option<UserEdit>> {
        Ok(self.read(|s| s.user_edits.get(&user_id).cloned()).await)
    }

    // -- projects and allocations ---------------------------------------------

    async fn create_project(&self, input: &CreateProject) -> StoreResult<Project> {
        self.transaction(|s| s.insert_project(input)).await
    }

    async fn get_project(&self, id: DbId) -> StoreResult<Project> {
        self.read(|s| s.projects.get(&id).cloned())
            .await
            .ok_or_else(|| not_found("project", id))
    }

    async fn find_project_by_title(&self, title: &str) -> StoreResult<Option<Project>> {
        Ok(self
            .read(|s| s.projects.values().find(|p| p.title == title).cloned())
            .await)
    }

    async fn project_members(&self, project_id: DbId) -> StoreResult<Vec<User>> {
        Ok(self
            .read(|s| {
                s.members
                    .iter()
                    .filter(|(p, _)| *p == project_id)
                    .filter_map(|(_, u)| s.users.get(u).cloned())
                    .collect()
            })
            .await)
    }

    async fn current_allocation(&self, project_id: DbId) -> StoreResult<Option<Resource>> {
        Ok(self.read(|s| s.current_resource(project_id).cloned()).await)
    }

    async fn allocation_history(&self, project_id: DbId) -> StoreResult<Vec<Resource>> {
        let resources = self
            .read(|s| {
                s.resources
                    .values()
                    .filter(|r| r.project_id == project_id)
                    .cloned()
                    .collect()
            })
            .await;
        Ok(newest_first(resources))
    }

    async fn expiring_allocations(&self, before: Timestamp) -> StoreResult<Vec<Resource>> {
        let mut resources: Vec<Resource> = self
            .read(|s| {
                s.projects
                    .values()
                    .filter(|p| p.active)
                    .filter_map(|p| s.current_resource(p.id).cloned())
                    .filter(|r| r.ttl < before)
                    .collect()
            })
            .await;
        resources.sort_by_key(|r| r.ttl);
        Ok(resources)
    }

    async fn active_allocations(&self) -> StoreResult<Vec<Resource>> {
        Ok(self
            .read(|s| {
                s.projects
                    .values()
                    .filter(|p| p.active)
                    .filter_map(|p| s.current_resource(p.id).cloned())
                    .collect()
            })
            .await)
    }

    async fn apply_allocation(
        &self,
        project_id: DbId,
        plan: &AllocationPlan,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(AllocationOutcome, LogEvent)> {
        self.transaction(|s| {
            let outcome = s.apply_allocation(project_id, plan, at)?;
            let log = s.log(audit.or_project(project_id), Utc::now());
            Ok((outcome, log))
        })
        .await
    }

    async fn suspend_project(
        &self,
        project_id: DbId,
        audit: CreateLogEvent,
    ) -> StoreResult<(Project, LogEvent)> {
        self.transaction(|s| {
            let project = s.project_mut(project_id)?;
            if !project.active {
                return Err(StoreError::Conflict(format!(
                    "project {project_id} is already inactive"
                )));
            }
            project.active = false;
            project.updated_at = Utc::now();
            let project = project.clone();
            s.invalidate_current(project_id);
            let log = s.log(audit.or_project(project_id), Utc::now());
            Ok((project, log))
        })
        .await
    }

    // -- extensions ------------------------------------------------------------

    async fn insert_extension(
        &self,
        input: &CreateExtension,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, LogEvent)> {
        self.transaction(|s| {
            s.project_mut(input.project_id)?;
            let ext = ExtensionRequest {
                id: s.next_id(),
                project_id: input.project_id,
                resource_id: input.resource_id,
                author_id: input.author_id,
                approver_id: None,
                kind: input.kind.as_str().to_string(),
                transform_type: input.kind.transform_type().map(str::to_string),
                hours: input.hours,
                reason: input.reason.clone(),
                exceptional: input.exceptional,
                present_use: input.present_use,
                present_total: input.present_total,
                usage_percent: input.usage_percent.clone(),
                processed: false,
                accepted: false,
                ignored: false,
                done: false,
                decision: None,
                created_at: Utc::now(),
                processed_at: None,
                done_at: None,
            };
            s.extensions.insert(ext.id, ext.clone());
            let log = s.log(
                audit.or_extension(ext.id).or_project(ext.project_id),
                ext.created_at,
            );
            Ok((ext, log))
        })
        .await
    }

    async fn get_extension(&self, id: DbId) -> StoreResult<ExtensionRequest> {
        self.read(|s| s.extensions.get(&id).cloned())
            .await
            .ok_or_else(|| not_found("extension", id))
    }

    async fn decide_extension(
        &self,
        id: DbId,
        decision: &ExtensionDecision,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, LogEvent)> {
        self.transaction(|s| {
            let ext = s
                .extensions
                .get_mut(&id)
                .ok_or_else(|| not_found("extension", id))?;
            if ext.processed {
                return Err(StoreError::Conflict(format!("extension {id} already processed")));
            }
            ext.processed = true;
            ext.accepted = decision.accepted;
            ext.ignored = decision.ignored;
            ext.approver_id = Some(decision.approver_id);
            ext.processed_at = Some(decision.decided_at);
            ext.decision = decision.decision.clone();
            if let Some(kind) = &decision.kind {
                ext.kind = kind.as_str().to_string();
            }
            if let Some(hours) = decision.hours {
                ext.hours = hours;
            }
            let ext = ext.clone();
            let log = s.log(
                audit.or_extension(id).or_project(ext.project_id),
                Utc::now(),
            );
            Ok((ext, log))
        })
        .await
    }

    async fn execute_extension(
        &self,
        id: DbId,
        plan: &AllocationPlan,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, AllocationOutcome, LogEvent)> {
        self.transaction(|s| {
            let ext = s
                .extensions
                .get(&id)
                .ok_or_else(|| not_found("extension", id))?;
            if !(ext.processed && ext.accepted && !ext.done) {
                return Err(StoreError::Conflict(format!(
                    "extension {id} is not awaiting execution"
                )));
            }
            let project_id = ext.project_id;
            let outcome = s.apply_allocation(project_id, plan, at)?;
            let ext = s
                .extensions
                .get_mut(&id)
                .ok_or_else(|| not_found("extension", id))?;
            ext.done = true;
            ext.done_at = Some(at);
            let ext = ext.clone();
            let log = s.log(audit.or_extension(id).or_project(project_id), Utc::now());
            Ok((ext, outcome, log))
        })
        .await
    }

    async fn project_extensions(&self, project_id: DbId) -> StoreResult<Vec<ExtensionRequest>> {
        Ok(self
            .read(|s| {
                s.extensions
                    .values()
                    .rev()
                    .filter(|e| e.project_id == project_id)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn pending_extensions(&self) -> StoreResult<Vec<ExtensionRequest>> {
        Ok(self
            .read(|s| s.extensions.values().filter(|e| !e.processed).cloned().collect())
            .await)
    }

    async fn extensions_awaiting_execution(&self) -> StoreResult<Vec<ExtensionRequest>> {
        Ok(self
            .read(|s| {
                s.extensions
                    .values()
                    .filter(|e| e.processed && e.accepted && !e.done)
                    .cloned()
                    .collect()
            })
            .await)
    }

    // -- registrations -----------------------------------------------------------

    async fn insert_registration(
        &self,
        input: &CreateRegistration,
        audit: CreateLogEvent,
    ) -> StoreResult<(Registration, LogEvent)> {
        self.transaction(|s| {
            let r = &input.responsible;
            let reg = Registration {
                id: s.next_id(),
                title: input.title.clone(),
                description: input.description.clone(),
                scientific_fields: input.scientific_fields.clone(),
                type_code: input.type_code.clone(),
                cpu_hours: input.cpu_hours,
                responsible_first_name: r.first_name.clone(),
                responsible_last_name: r.last_name.clone(),
                responsible_email: r.email.clone(),
                responsible_phone: r.phone.clone(),
                responsible_lab: r.lab.clone(),
                responsible_position: r.position.clone(),
                approve: false,
                approve_ts: None,
                approver_id: None,
                accepted: false,
                accepted_ts: None,
                visa: None,
                processed: false,
                processed_ts: None,
                committee: None,
                decision: None,
                project_id: None,
                created_at: Utc::now(),
            };
            s.registrations.insert(reg.id, reg.clone());
            let log = s.log(audit.or_registration(reg.id), reg.created_at);
            Ok((reg, log))
        })
        .await
    }

    async fn get_registration(&self, id: DbId) -> StoreResult<Registration> {
        self.read(|s| s.registrations.get(&id).cloned())
            .await
            .ok_or_else(|| not_found("registration", id))
    }

    async fn registration_comments(&self, id: DbId) -> StoreResult<Vec<RegistrationComment>> {
        Ok(self
            .read(|s| {
                s.comments
                    .iter()
                    .filter(|c| c.registration_id == id)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn apply_registration_step(
        &self,
        id: DbId,
        step: &RegistrationStep,
        actor_id: Option<DbId>,
        comment: &str,
        audit: CreateLogEvent,
    ) -> StoreResult<(Registration, LogEvent)> {
        self.transaction(|s| {
            let reg = s.registration_mut(id)?;
            let applied = match step {
                RegistrationStep::Approve { approver_id, at } => {
                    let ok = !reg.approve && !reg.processed;
                    if ok {
                        reg.approve = true;
                        reg.approve_ts = Some(*at);
                        reg.approver_id = Some(*approver_id);
                    }
                    ok
                }
                RegistrationStep::Visa {
                    outcome,
                    at,
                    resend,
                } => {
                    let ok = reg.approve && !reg.processed && (*resend || !reg.accepted);
                    if ok {
                        reg.accepted = true;
                        reg.accepted_ts = Some(*at);
                        reg.visa = Some(outcome.as_str().to_string());
                    }
                    ok
                }
                RegistrationStep::Committee { decision, note, at } => {
                    let ok = !reg.processed
                        && (*decision != CommitteeDecision::Accepted || reg.accepted);
                    if ok {
                        reg.processed = true;
                        reg.processed_ts = Some(*at);
                        reg.committee = Some(decision.as_str().to_string());
                        reg.decision = note.clone();
                    }
                    ok
                }
            };
            if !applied {
                return Err(StoreError::Conflict(format!(
                    "registration {id} no longer allows this step"
                )));
            }
            let reg = reg.clone();
            s.add_comment(id, actor_id, comment);
            let log = s.log(audit.or_registration(id), Utc::now());
            Ok((reg, log))
        })
        .await
    }

    async fn accept_registration(
        &self,
        id: DbId,
        acceptance: &RegistrationAcceptance,
        accepted_audit: CreateLogEvent,
        created_audit: CreateLogEvent,
    ) -> StoreResult<(AcceptedRegistration, Vec<LogEvent>)> {
        self.transaction(|s| {
            let reg = s.registration_mut(id)?;
            if reg.processed || !reg.accepted {
                return Err(StoreError::Conflict(format!(
                    "registration {id} cannot be accepted"
                )));
            }
            let title = reg.title.clone();
            let profile = reg.responsible_profile();

            let existing = s.projects.values().find(|p| p.title == title).cloned();
            let (mut project, project_created) = match existing {
                Some(project) => (project, false),
                None => (s.insert_project(&acceptance.new_project)?, true),
            };

            let responsible = match project.responsible_id {
                Some(user_id) => s
                    .users
                    .get(&user_id)
                    .cloned()
                    .ok_or_else(|| not_found("user", user_id))?,
                None => {
                    let user = s.find_or_create_user(&profile)?;
                    let p = s.project_mut(project.id)?;
                    p.responsible_id = Some(user.id);
                    user
                }
            };
            s.members.insert((project.id, responsible.id));

            let resource = match s.current_resource(project.id).cloned() {
                Some(resource) => resource,
                None => s.insert_resource(&CreateResource {
                    project_id: project.id,
                    cpu: acceptance.hours,
                    ttl: acceptance.ttl,
                    approver_id: acceptance.actor_id,
                    extension_id: None,
                    comment: None,
                    created_at: acceptance.at,
                })?,
            };
            project = s.project_mut(project.id)?.clone();

            let reg = s.registration_mut(id)?;
            reg.processed = true;
            reg.processed_ts = Some(acceptance.at);
            reg.committee = Some(CommitteeDecision::Accepted.as_str().to_string());
            reg.decision = acceptance.note.clone();
            reg.project_id = Some(project.id);
            let registration = reg.clone();
            s.add_comment(id, acceptance.actor_id, &acceptance.comment);

            let mut logs = vec![s.log(
                accepted_audit.or_registration(id).or_project(project.id),
                Utc::now(),
            )];
            if project_created {
                logs.push(s.log(
                    created_audit
                        .or_registration(id)
                        .or_project(project.id)
                        .or_user(responsible.id),
                    resource.created_at,
                ));
            }

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
        })
        .await
    }

    async fn pending_registrations(&self) -> StoreResult<Vec<Registration>> {
        Ok(self
            .read(|s| s.registrations.values().filter(|r| !r.processed).cloned().collect())
            .await)
    }

    // -- tasks -----------------------------------------------------------------

    async fn insert_task(
        &self,
        input: &CreateTask,
        edit: Option<&UserProfile>,
        audit: CreateLogEvent,
    ) -> StoreResult<(Task, LogEvent)> {
        self.transaction(|s| {
            let action = input.action.to_string();
            if s.tasks.values().any(|t| !t.processed && t.action == action) {
                return Err(StoreError::Conflict("uq_tasks_pending_action".into()));
            }
            if let Some(profile) = edit {
                s.stage_edit(input.action.user_id(), profile)?;
            }
            let task = Task {
                id: s.next_id(),
                action,
                author_id: input.author_id,
                approver_id: None,
                user_id: Some(input.action.user_id()),
                project_id: input.action.project_id(),
                decision: None,
                processed: false,
                done: false,
                result: None,
                comment: input.comment.clone(),
                created_at: Utc::now(),
                processed_at: None,
                done_at: None,
            };
            s.tasks.insert(task.id, task.clone());
            let mut audit = audit.or_task(task.id).or_user(input.action.user_id());
            if let Some(project_id) = task.project_id {
                audit = audit.or_project(project_id);
            }
            let log = s.log(audit, task.created_at);
            Ok((task, log))
        })
        .await
    }

    async fn get_task(&self, id: DbId) -> StoreResult<Task> {
        self.read(|s| s.tasks.get(&id).cloned())
            .await
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
        self.transaction(|s| {
            let task = s.tasks.get_mut(&id).ok_or_else(|| not_found("task", id))?;
            if task.processed {
                return Err(StoreError::Conflict(format!("task {id} already processed")));
            }
            task.processed = true;
            task.decision = Some(decision.as_str().to_string());
            task.approver_id = Some(approver_id);
            task.processed_at = Some(at);
            let task = task.clone();
            let log = s.log(audit.or_task(id), at);
            Ok((task, log))
        })
        .await
    }

    async fn complete_task(
        &self,
        id: DbId,
        effects: &[TaskEffect],
        result: &str,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(Task, LogEvent)> {
        self.transaction(|s| {
            let task = s.tasks.get(&id).ok_or_else(|| not_found("task", id))?;
            let completable = task.processed
                && task.decision.as_deref() == Some(TaskDecision::Accept.as_str())
                && !task.done;
            if !completable {
                return Err(StoreError::Conflict(format!("task {id} is not awaiting completion")));
            }
            for effect in effects {
                s.apply_effect(effect)?;
            }
            let task = s.tasks.get_mut(&id).ok_or_else(|| not_found("task", id))?;
            task.done = true;
            task.result = Some(result.to_string());
            task.done_at = Some(at);
            let task = task.clone();
            let log = s.log(audit.or_task(id), at);
            Ok((task, log))
        })
        .await
    }

    async fn pending_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self
            .read(|s| s.tasks.values().filter(|t| !t.processed).cloned().collect())
            .await)
    }

    // -- audit and accounting ---------------------------------------------------

    async fn record_event(&self, audit: CreateLogEvent) -> StoreResult<LogEvent> {
        self.transaction(|s| Ok(s.log(audit, Utc::now()))).await
    }

    async fn log_events(&self, filter: &LogEventQuery) -> StoreResult<Vec<LogEvent>> {
        Ok(self
            .read(|s| {
                s.log_events
                    .iter()
                    .filter(|e| filter.matches(e))
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn store_usage(
        &self,
        samples: &[CreateAccountingSample],
        audit: CreateLogEvent,
    ) -> StoreResult<(usize, LogEvent)> {
        self.transaction(|s| {
            for input in samples {
                if !s.resources.contains_key(&input.resource_id) {
                    return Err(not_found("resource", input.resource_id));
                }
                let existing = s.samples.iter_mut().find(|x| {
                    x.resource_id == input.resource_id
                        && x.user_login == input.user_login
                        && x.day == input.day
                });
                match existing {
                    Some(sample) => sample.cpu_hours = input.cpu_hours,
                    None => {
                        let sample = AccountingSample {
                            id: s.next_id(),
                            project_id: input.project_id,
                            resource_id: input.resource_id,
                            user_login: input.user_login.clone(),
                            day: input.day,
                            cpu_hours: input.cpu_hours,
                            created_at: Utc::now(),
                        };
                        s.samples.push(sample);
                    }
                }
            }
            let log = s.log(audit, Utc::now());
            Ok((samples.len(), log))
        })
        .await
    }

    async fn usage_samples(&self, resource_id: DbId) -> StoreResult<Vec<AccountingSample>> {
        Ok(self
            .read(|s| {
                let mut samples: Vec<AccountingSample> = s
                    .samples
                    .iter()
                    .filter(|x| x.resource_id == resource_id)
                    .cloned()
                    .collect();
                samples.sort_by(|a, b| a.day.cmp(&b.day).then_with(|| a.user_login.cmp(&b.user_login)));
                samples
            })
            .await)
    }
}
