//! Administrative task queue.

mod common;

use assert_matches::assert_matches;
use common::{profile, Harness};
use hpcalloc_core::error::CoreError;
use hpcalloc_core::lifecycle::TaskDecision;
use hpcalloc_core::task_action::TaskAction;
use hpcalloc_db::models::user::CreateUser;
use hpcalloc_workflow::{RecordStore, WorkflowError};

#[tokio::test]
async fn duplicate_pending_task_is_refused_until_processed() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let member = harness.user("Bob", "bob@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;
    let action = TaskAction::AssignUser {
        user_id: member.id,
        project_id: project.id,
    };

    let first = engine.enqueue_task(action, responsible.id, None).await.unwrap();
    let duplicate = engine.enqueue_task(action, responsible.id, None).await;
    assert_matches!(
        duplicate,
        Err(WorkflowError::Core(CoreError::DuplicateTask(descriptor)))
            if descriptor == format!("assign|user|{}|{}", member.id, project.id)
    );
    assert_eq!(engine.pending_tasks().await.unwrap().len(), 1);

    engine
        .decide_task(first.record.id, 1, TaskDecision::Reject)
        .await
        .unwrap();
    let requeued = engine.enqueue_task(action, responsible.id, None).await.unwrap();
    assert_ne!(requeued.record.id, first.record.id);
}

#[tokio::test]
async fn accepted_task_applies_its_effects() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;
    let newcomer = harness
        .store
        .create_user(&CreateUser {
            login: None,
            profile: profile("Dan", "dan@lab.example"),
            active: false,
        })
        .await
        .unwrap();

    let action = TaskAction::CreateUser {
        user_id: newcomer.id,
        project_id: project.id,
    };
    let task = engine
        .enqueue_task(action, responsible.id, Some("New PhD student".into()))
        .await
        .unwrap()
        .record;

    let early = engine.complete_task(task.id, Some(1)).await;
    assert_matches!(early, Err(WorkflowError::Core(CoreError::InvalidStateTransition { .. })));

    let decided = engine.decide_task(task.id, 1, TaskDecision::Accept).await.unwrap();
    harness.dispatch(decided.events).await;
    assert_eq!(harness.sent_to("alice@lab.example").len(), 1);

    let done = engine.complete_task(task.id, Some(1)).await.unwrap().record;
    assert!(done.done);
    assert!(harness.store.get_user(newcomer.id).await.unwrap().active);
    assert_eq!(harness.store_members(project.id).await, vec![newcomer.id]);

    let again = engine.complete_task(task.id, Some(1)).await;
    assert_matches!(again, Err(WorkflowError::Core(CoreError::InvalidStateTransition { .. })));
    let redecide = engine.decide_task(task.id, 1, TaskDecision::Reject).await;
    assert_matches!(redecide, Err(WorkflowError::Core(CoreError::AlreadyProcessed { .. })));

    let requeued = engine.enqueue_task(action, responsible.id, None).await.unwrap();
    assert_ne!(requeued.record.id, task.id);
}

#[tokio::test]
async fn ignored_task_notifies_nobody() {
    let harness = Harness::new();
    let engine = harness.engine();
    let user = harness.user("Alice", "alice@lab.example").await;

    let task = engine
        .enqueue_task(TaskAction::PasswordReset { user_id: user.id }, user.id, None)
        .await
        .unwrap()
        .record;
    let ignored = engine.decide_task(task.id, 1, TaskDecision::Ignore).await.unwrap();
    harness.dispatch(ignored.events).await;
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn profile_update_is_staged_until_completed() {
    let harness = Harness::new();
    let engine = harness.engine();
    let user = harness.user("Alice", "alice@lab.example").await;

    let mut edit = profile("Alice", "alice@new.example");
    edit.phone = Some("+33 1 23".into());
    let task = engine
        .request_profile_update(user.id, edit, user.id)
        .await
        .unwrap()
        .record;
    assert_eq!(
        task.comment.as_deref(),
        Some("email: alice@lab.example -> alice@new.example; phone: - -> +33 1 23")
    );
    assert_eq!(harness.store.get_user(user.id).await.unwrap().email, "alice@lab.example");

    engine.decide_task(task.id, 1, TaskDecision::Accept).await.unwrap();
    let done = engine.complete_task(task.id, Some(1)).await.unwrap().record;
    assert!(done.result.unwrap().contains("alice@new.example"));

    let updated = harness.store.get_user(user.id).await.unwrap();
    assert_eq!(updated.email, "alice@new.example");
    assert_eq!(updated.phone.as_deref(), Some("+33 1 23"));
    assert!(harness.store.get_user_edit(user.id).await.unwrap().is_none());
}

#[tokio::test]
async fn refused_second_edit_keeps_the_pending_one() {
    let harness = Harness::new();
    let engine = harness.engine();
    let user = harness.user("Alice", "alice@lab.example").await;

    let task = engine
        .request_profile_update(user.id, profile("Alice", "alice@first.example"), user.id)
        .await
        .unwrap()
        .record;
    let second = engine
        .request_profile_update(user.id, profile("Alice", "mallory@evil.example"), user.id)
        .await;
    assert_matches!(
        second,
        Err(WorkflowError::Core(CoreError::DuplicateTask(ref d))) if *d == format!("update|user|{}", user.id)
    );

    engine.decide_task(task.id, 1, TaskDecision::Accept).await.unwrap();
    engine.complete_task(task.id, Some(1)).await.unwrap();
    let updated = harness.store.get_user(user.id).await.unwrap();
    assert_eq!(updated.email, "alice@first.example");
}

#[tokio::test]
async fn unchanged_profile_edit_is_refused() {
    let harness = Harness::new();
    let engine = harness.engine();
    let user = harness.user("Alice", "alice@lab.example").await;

    let result = engine
        .request_profile_update(user.id, user.profile(), user.id)
        .await;
    assert_matches!(result, Err(WorkflowError::Core(CoreError::InvalidInput(_))));
    assert!(engine.pending_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn task_for_unknown_user_is_refused() {
    let harness = Harness::new();
    let engine = harness.engine();
    let result = engine
        .enqueue_task(TaskAction::SshKeyUpload { user_id: 404 }, 1, None)
        .await;
    assert_matches!(
        result,
        Err(WorkflowError::Core(CoreError::MissingEntity { entity: "user", id: 404 }))
    );
}
