//! Integration tests for the compare-and-set latches and uniqueness rules.
//!
//! - extension decisions apply once; completion needs acceptance
//! - a second pending task with the same descriptor violates `uq_tasks_pending_action`
//! - only one allocation per project can be valid
//! - registration steps re-check their preconditions in SQL

use chrono::{Duration, Utc};
use hpcalloc_core::lifecycle::TaskDecision;
use hpcalloc_core::profile::UserProfile;
use hpcalloc_core::registration::{CommitteeDecision, VisaOutcome};
use hpcalloc_core::request_kind::RequestKind;
use hpcalloc_core::task_action::TaskAction;
use hpcalloc_db::models::extension::{CreateExtension, ExtensionDecision};
use hpcalloc_db::models::project::CreateProject;
use hpcalloc_db::models::registration::{CreateRegistration, RegistrationStep};
use hpcalloc_db::models::resource::CreateResource;
use hpcalloc_db::models::task::CreateTask;
use hpcalloc_db::models::user::CreateUser;
use hpcalloc_db::repositories::{
    ExtensionRepo, ProjectRepo, RegistrationRepo, ResourceRepo, TaskRepo, UserRepo,
};
use hpcalloc_db::unique_violation;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn profile(email: &str) -> UserProfile {
    UserProfile {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: email.to_string(),
        phone: None,
        lab: Some("LMA".to_string()),
        position: None,
    }
}

/// Returns (user_id, project_id, resource_id).
async fn setup_project(pool: &PgPool, suffix: &str) -> (i64, i64, i64) {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            login: Some(format!("ada_{suffix}")),
            profile: profile(&format!("ada_{suffix}@lab.example")),
            active: true,
        },
    )
    .await
    .unwrap();
    let project = ProjectRepo::create(
        pool,
        &CreateProject {
            name: format!("A{suffix}"),
            title: format!("Project {suffix}"),
            type_code: "A".to_string(),
            type_label: "Regular".to_string(),
            responsible_id: Some(user.id),
            registration_id: None,
        },
    )
    .await
    .unwrap();
    let resource = ResourceRepo::create(
        pool,
        &CreateResource {
            project_id: project.id,
            cpu: 1000,
            ttl: Utc::now() + Duration::days(180),
            approver_id: None,
            extension_id: None,
            comment: None,
            created_at: Utc::now(),
        },
    )
    .await
    .unwrap();
    ProjectRepo::set_resource(pool, project.id, resource.id)
        .await
        .unwrap();
    (user.id, project.id, resource.id)
}

fn new_extension(project_id: i64, resource_id: i64, author_id: i64) -> CreateExtension {
    CreateExtension {
        project_id,
        resource_id: Some(resource_id),
        author_id,
        kind: RequestKind::Extension,
        hours: 100,
        reason: "more simulations".to_string(),
        exceptional: false,
        present_use: 250,
        present_total: 1000,
        usage_percent: "25.0%".to_string(),
    }
}

fn accept(approver_id: i64) -> ExtensionDecision {
    ExtensionDecision {
        approver_id,
        accepted: true,
        ignored: false,
        decided_at: Utc::now(),
        decision: None,
        kind: None,
        hours: None,
    }
}

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_extension_decision_applies_once(pool: PgPool) {
    let (user_id, project_id, resource_id) = setup_project(&pool, "001").await;
    let ext = ExtensionRepo::create(&pool, &new_extension(project_id, resource_id, user_id))
        .await
        .unwrap();
    assert!(!ext.processed);
    assert_eq!(ext.kind, "extension");
    assert_eq!(ext.usage_percent, "25.0%");

    let first = ExtensionRepo::decide(&pool, ext.id, &accept(user_id))
        .await
        .unwrap();
    assert!(first.is_some_and(|e| e.processed && e.accepted));

    let second = ExtensionRepo::decide(&pool, ext.id, &accept(user_id))
        .await
        .unwrap();
    assert!(second.is_none(), "second decision must not overwrite the first");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_mark_done_requires_acceptance(pool: PgPool) {
    let (user_id, project_id, resource_id) = setup_project(&pool, "002").await;
    let ext = ExtensionRepo::create(&pool, &new_extension(project_id, resource_id, user_id))
        .await
        .unwrap();

    assert!(ExtensionRepo::mark_done(&pool, ext.id, Utc::now())
        .await
        .unwrap()
        .is_none());

    ExtensionRepo::decide(&pool, ext.id, &accept(user_id))
        .await
        .unwrap();
    let done = ExtensionRepo::mark_done(&pool, ext.id, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(done.done);

    assert!(ExtensionRepo::mark_done(&pool, ext.id, Utc::now())
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_decision_can_override_kind(pool: PgPool) {
    let (user_id, project_id, resource_id) = setup_project(&pool, "003").await;
    let ext = ExtensionRepo::create(&pool, &new_extension(project_id, resource_id, user_id))
        .await
        .unwrap();
    let mut decision = accept(user_id);
    decision.kind = Some(RequestKind::Renewal);
    decision.hours = Some(40);

    let decided = ExtensionRepo::decide(&pool, ext.id, &decision)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(decided.kind, "renewal");
    assert_eq!(decided.hours, 40);
}

// ---------------------------------------------------------------------------
// Allocations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_only_one_valid_allocation_per_project(pool: PgPool) {
    let (_, project_id, _) = setup_project(&pool, "004").await;
    let second = CreateResource {
        project_id,
        cpu: 50,
        ttl: Utc::now() + Duration::days(30),
        approver_id: None,
        extension_id: None,
        comment: None,
        created_at: Utc::now(),
    };

    let err = ResourceRepo::create(&pool, &second).await.unwrap_err();
    assert_eq!(unique_violation(&err), Some("uq_resources_current"));

    assert_eq!(ResourceRepo::invalidate_current(&pool, project_id).await.unwrap(), 1);
    let replacement = ResourceRepo::create(&pool, &second).await.unwrap();
    assert!(replacement.valid);
    assert_eq!(ResourceRepo::list_for_project(&pool, project_id).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_add_hours_increments_and_appends_comment(pool: PgPool) {
    let (_, project_id, resource_id) = setup_project(&pool, "005").await;

    ResourceRepo::add_hours(&pool, resource_id, 100, "first")
        .await
        .unwrap();
    let updated = ResourceRepo::add_hours(&pool, resource_id, 20, "second")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.cpu, 1120);
    assert_eq!(updated.comment.as_deref(), Some("first\nsecond"));

    let current = ResourceRepo::find_current(&pool, project_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.id, resource_id);
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_pending_task_is_rejected(pool: PgPool) {
    let (user_id, project_id, _) = setup_project(&pool, "006").await;
    let input = CreateTask {
        action: TaskAction::AssignUser {
            user_id,
            project_id,
        },
        author_id: user_id,
        comment: None,
    };

    let task = TaskRepo::create(&pool, &input).await.unwrap();
    assert_eq!(task.action, format!("assign|user|{user_id}|{project_id}"));

    let err = TaskRepo::create(&pool, &input).await.unwrap_err();
    assert_eq!(unique_violation(&err), Some("uq_tasks_pending_action"));

    TaskRepo::decide(&pool, task.id, TaskDecision::Reject, user_id, Utc::now())
        .await
        .unwrap()
        .unwrap();
    let requeued = TaskRepo::create(&pool, &input).await.unwrap();
    assert_ne!(requeued.id, task.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_task_completion_requires_accept(pool: PgPool) {
    let (user_id, _, _) = setup_project(&pool, "007").await;
    let task = TaskRepo::create(
        &pool,
        &CreateTask {
            action: TaskAction::PasswordReset { user_id },
            author_id: user_id,
            comment: None,
        },
    )
    .await
    .unwrap();

    TaskRepo::decide(&pool, task.id, TaskDecision::Ignore, user_id, Utc::now())
        .await
        .unwrap();
    assert!(TaskRepo::complete(&pool, task.id, "reset", Utc::now())
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Registrations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_registration_steps_recheck_preconditions(pool: PgPool) {
    let reg = RegistrationRepo::create(
        &pool,
        &CreateRegistration {
            title: "Turbulence".to_string(),
            description: "LES of channel flow".to_string(),
            scientific_fields: None,
            type_code: "A".to_string(),
            cpu_hours: 5000,
            responsible: profile("pi@lab.example"),
        },
    )
    .await
    .unwrap();

    let visa = RegistrationStep::Visa {
        outcome: VisaOutcome::Sent,
        at: Utc::now(),
        resend: false,
    };
    assert!(RegistrationRepo::apply_step(&pool, reg.id, &visa)
        .await
        .unwrap()
        .is_none());

    let approve = RegistrationStep::Approve {
        approver_id: setup_project(&pool, "008").await.0,
        at: Utc::now(),
    };
    assert!(RegistrationRepo::apply_step(&pool, reg.id, &approve)
        .await
        .unwrap()
        .is_some());
    assert!(RegistrationRepo::apply_step(&pool, reg.id, &visa)
        .await
        .unwrap()
        .is_some());
    assert!(RegistrationRepo::apply_step(&pool, reg.id, &visa)
        .await
        .unwrap()
        .is_none());

    let reject = RegistrationStep::Committee {
        decision: CommitteeDecision::Rejected,
        note: Some("out of scope".to_string()),
        at: Utc::now(),
    };
    let rejected = RegistrationRepo::apply_step(&pool, reg.id, &reject)
        .await
        .unwrap()
        .unwrap();
    assert!(rejected.processed);
    assert_eq!(rejected.committee.as_deref(), Some("rejected"));
    assert!(RegistrationRepo::apply_step(&pool, reg.id, &reject)
        .await
        .unwrap()
        .is_none());
}
