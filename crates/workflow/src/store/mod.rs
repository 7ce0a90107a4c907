//! Record store seam.
//!
//! Every mutating method is one atomic unit: the state change, the
//! compare-and-set on its latch and the audit row either all commit or none
//! do. Audit entries passed in with unset entity references are completed
//! by the store with the ids it assigns.
//!
//! Two backends: [`postgres::PgStore`] for deployments and
//! [`memory::MemoryStore`] for tests and dry runs.

use async_trait::async_trait;
use hpcalloc_core::lifecycle::TaskDecision;
use hpcalloc_core::profile::UserProfile;
use hpcalloc_core::types::{DbId, Timestamp};
use hpcalloc_db::models::accounting::{AccountingSample, CreateAccountingSample};
use hpcalloc_db::models::extension::{CreateExtension, ExtensionDecision, ExtensionRequest};
use hpcalloc_db::models::log_event::{CreateLogEvent, LogEvent, LogEventQuery};
use hpcalloc_db::models::project::{CreateProject, Project, ProjectRetype};
use hpcalloc_db::models::registration::{
    CreateRegistration, Registration, RegistrationComment, RegistrationStep,
};
use hpcalloc_db::models::resource::Resource;
use hpcalloc_db::models::task::{CreateTask, Task, TaskEffect};
use hpcalloc_db::models::user::{CreateUser, User, UserEdit};

pub use crate::error::{StoreError, StoreResult};

pub mod memory;
pub mod postgres;

// ---------------------------------------------------------------------------
// Allocation changes
// ---------------------------------------------------------------------------

/// How the current allocation of a project changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationChange {
    /// Supersede the current allocation with a fresh one.
    Renew { hours: i64, ttl: Timestamp },
    /// Add hours to the current allocation in place and mark it valid.
    Extend { hours: i64 },
    /// Retype the project and supersede its allocation.
    Transform {
        hours: i64,
        ttl: Timestamp,
        retype: ProjectRetype,
    },
    /// Re-activate the project with a fresh allocation.
    Activate { hours: i64, ttl: Timestamp },
}

impl AllocationChange {
    pub fn hours(&self) -> i64 {
        match self {
            AllocationChange::Renew { hours, .. }
            | AllocationChange::Extend { hours }
            | AllocationChange::Transform { hours, .. }
            | AllocationChange::Activate { hours, .. } => *hours,
        }
    }

    /// Grant and expiry of the replacement allocation; `None` for in-place
    /// extension.
    pub fn replacement(&self) -> Option<(i64, Timestamp)> {
        match self {
            AllocationChange::Renew { hours, ttl }
            | AllocationChange::Transform { hours, ttl, .. }
            | AllocationChange::Activate { hours, ttl } => Some((*hours, *ttl)),
            AllocationChange::Extend { .. } => None,
        }
    }
}

/// A change plus the provenance recorded on the allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    pub change: AllocationChange,
    pub approver_id: Option<DbId>,
    /// Request the change originates from.
    pub extension_id: Option<DbId>,
    /// Line appended to (or starting) the allocation's comment history.
    pub comment: String,
}

/// State after an allocation change.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub project: Project,
    pub resource: Resource,
    /// The allocation that was invalidated, for replacing changes.
    pub superseded: Option<Resource>,
}

// ---------------------------------------------------------------------------
// Registration acceptance
// ---------------------------------------------------------------------------

/// Everything committee acceptance needs to materialize the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationAcceptance {
    pub note: Option<String>,
    pub at: Timestamp,
    pub actor_id: Option<DbId>,
    /// Line appended to the registration's comment log.
    pub comment: String,
    /// Used when no project carries the registration's title yet.
    pub new_project: CreateProject,
    /// Grant of the initial allocation.
    pub hours: i64,
    pub ttl: Timestamp,
}

/// State after committee acceptance.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedRegistration {
    pub registration: Registration,
    pub project: Project,
    pub resource: Resource,
    pub responsible: User,
    /// Whether acceptance created the project rather than finding it.
    pub project_created: bool,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordStore: Send + Sync {
    // Users
    async fn create_user(&self, input: &CreateUser) -> StoreResult<User>;
    async fn get_user(&self, id: DbId) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn get_user_edit(&self, user_id: DbId) -> StoreResult<Option<UserEdit>>;

    // Projects and allocations
    async fn create_project(&self, input: &CreateProject) -> StoreResult<Project>;
    async fn get_project(&self, id: DbId) -> StoreResult<Project>;
    async fn find_project_by_title(&self, title: &str) -> StoreResult<Option<Project>>;
    async fn project_members(&self, project_id: DbId) -> StoreResult<Vec<User>>;
    async fn current_allocation(&self, project_id: DbId) -> StoreResult<Option<Resource>>;
    /// Every allocation of the project, newest first.
    async fn allocation_history(&self, project_id: DbId) -> StoreResult<Vec<Resource>>;
    /// Current allocations of active projects with `ttl < before`.
    async fn expiring_allocations(&self, before: Timestamp) -> StoreResult<Vec<Resource>>;
    async fn active_allocations(&self) -> StoreResult<Vec<Resource>>;
    /// Apply `plan`; a replacing allocation is dated `at`.
    async fn apply_allocation(
        &self,
        project_id: DbId,
        plan: &AllocationPlan,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(AllocationOutcome, LogEvent)>;
    /// Deactivate the project and invalidate its allocation.
    /// `Conflict` if the project is already inactive.
    async fn suspend_project(
        &self,
        project_id: DbId,
        audit: CreateLogEvent,
    ) -> StoreResult<(Project, LogEvent)>;

    // Extension requests
    async fn insert_extension(
        &self,
        input: &CreateExtension,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, LogEvent)>;
    async fn get_extension(&self, id: DbId) -> StoreResult<ExtensionRequest>;
    /// `Conflict` if the request was already processed.
    async fn decide_extension(
        &self,
        id: DbId,
        decision: &ExtensionDecision,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, LogEvent)>;
    /// Apply `plan` and set the done latch. `Conflict` unless the request is
    /// accepted and not yet done.
    async fn execute_extension(
        &self,
        id: DbId,
        plan: &AllocationPlan,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(ExtensionRequest, AllocationOutcome, LogEvent)>;
    async fn project_extensions(&self, project_id: DbId) -> StoreResult<Vec<ExtensionRequest>>;
    async fn pending_extensions(&self) -> StoreResult<Vec<ExtensionRequest>>;
    async fn extensions_awaiting_execution(&self) -> StoreResult<Vec<ExtensionRequest>>;

    // Registrations
    async fn insert_registration(
        &self,
        input: &CreateRegistration,
        audit: CreateLogEvent,
    ) -> StoreResult<(Registration, LogEvent)>;
    async fn get_registration(&self, id: DbId) -> StoreResult<Registration>;
    async fn registration_comments(&self, id: DbId) -> StoreResult<Vec<RegistrationComment>>;
    /// Apply `step` and append `comment`. `Conflict` if the step's
    /// precondition no longer holds.
    async fn apply_registration_step(
        &self,
        id: DbId,
        step: &RegistrationStep,
        actor_id: Option<DbId>,
        comment: &str,
        audit: CreateLogEvent,
    ) -> StoreResult<(Registration, LogEvent)>;
    /// Latch the registration as accepted and find or create its project,
    /// responsible user and initial allocation. The second audit entry is
    /// only written when the project is created.
    async fn accept_registration(
        &self,
        id: DbId,
        acceptance: &RegistrationAcceptance,
        accepted_audit: CreateLogEvent,
        created_audit: CreateLogEvent,
    ) -> StoreResult<(AcceptedRegistration, Vec<LogEvent>)>;
    async fn pending_registrations(&self) -> StoreResult<Vec<Registration>>;

    // Tasks
    /// `Conflict` if an unprocessed task has the same action descriptor.
    /// `edit` is staged for the task's user only once the task is in.
    async fn insert_task(
        &self,
        input: &CreateTask,
        edit: Option<&UserProfile>,
        audit: CreateLogEvent,
    ) -> StoreResult<(Task, LogEvent)>;
    async fn get_task(&self, id: DbId) -> StoreResult<Task>;
    /// `Conflict` if the task was already processed.
    async fn decide_task(
        &self,
        id: DbId,
        decision: TaskDecision,
        approver_id: DbId,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(Task, LogEvent)>;
    /// Apply `effects` and set the done latch. `Conflict` unless the task
    /// is accepted and not yet done.
    async fn complete_task(
        &self,
        id: DbId,
        effects: &[TaskEffect],
        result: &str,
        at: Timestamp,
        audit: CreateLogEvent,
    ) -> StoreResult<(Task, LogEvent)>;
    async fn pending_tasks(&self) -> StoreResult<Vec<Task>>;

    // Audit and accounting
    async fn record_event(&self, audit: CreateLogEvent) -> StoreResult<LogEvent>;
    async fn log_events(&self, filter: &LogEventQuery) -> StoreResult<Vec<LogEvent>>;
    async fn store_usage(
        &self,
        samples: &[CreateAccountingSample],
        audit: CreateLogEvent,
    ) -> StoreResult<(usize, LogEvent)>;
    /// Samples stored against an allocation, oldest day first.
    async fn usage_samples(&self, resource_id: DbId) -> StoreResult<Vec<AccountingSample>>;
}
