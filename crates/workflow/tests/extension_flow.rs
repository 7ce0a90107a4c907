//! Extension requests driven end to end over the in-memory store.

mod common;

use assert_matches::assert_matches;
use chrono::{Datelike, Duration};
use common::{cpu_of, jan_10, Harness, ADMIN_CC};
use hpcalloc_accounting::parse_report;
use hpcalloc_core::audit::categories;
use hpcalloc_core::error::CoreError;
use hpcalloc_core::lifecycle::ExtensionState;
use hpcalloc_core::request_kind::RequestKind;
use hpcalloc_core::types::DbId;
use hpcalloc_db::models::log_event::LogEventQuery;
use hpcalloc_workflow::{AcceptOptions, Engine, ExtensionSubmission, RecordStore, WorkflowError};

fn submission(project_id: DbId, author_id: DbId, kind: RequestKind, hours: i64) -> ExtensionSubmission {
    ExtensionSubmission {
        project_id,
        author_id,
        kind,
        hours,
        reason: "Production runs".into(),
        exceptional: false,
    }
}

async fn accepted_extension(engine: &Engine, project_id: DbId, author_id: DbId, hours: i64) -> DbId {
    let ext = engine
        .submit_extension(submission(project_id, author_id, RequestKind::Extension, hours))
        .await
        .unwrap()
        .record;
    engine
        .accept_extension(ext.id, 1, AcceptOptions::note("ok"))
        .await
        .unwrap();
    ext.id
}

#[tokio::test]
async fn accepted_extension_adds_hours_once() {
    let harness = Harness::new().with_usage("A001", 250, &[("alice", 250)]);
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let admin = harness.user("Root", "root@hpc.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;

    let submitted = engine
        .submit_extension(submission(project.id, responsible.id, RequestKind::Extension, 100))
        .await
        .unwrap();
    assert_eq!(submitted.record.present_use, 250);
    assert_eq!(submitted.record.present_total, 1000);
    assert_eq!(submitted.record.usage_percent, "25.0%");
    assert_eq!(submitted.record.state(), ExtensionState::Pending);
    harness.dispatch(submitted.events).await;

    let accepted = engine
        .accept_extension(submitted.record.id, admin.id, AcceptOptions::note("Granted"))
        .await
        .unwrap();
    assert_eq!(accepted.record.state(), ExtensionState::Accepted);
    harness.dispatch(accepted.events).await;

    let executed = engine
        .execute_extension(submitted.record.id, Some(admin.id))
        .await
        .unwrap();
    assert_eq!(executed.record.state(), ExtensionState::Done);
    assert_eq!(executed.events.len(), 1);
    harness.dispatch(executed.events).await;

    assert_eq!(cpu_of(&harness.store, project.id).await, 1100);

    let extended = engine
        .log_events(&LogEventQuery {
            project_id: Some(project.id),
            category: Some(categories::EXTENDED.into()),
            ..LogEventQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(extended.len(), 1);
    assert_eq!(extended[0].extension_id, Some(submitted.record.id));

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["alice@lab.example".to_string()]);
    assert_eq!(sent[0].cc, vec![ADMIN_CC.to_string()]);
}

#[tokio::test]
async fn second_decision_is_rejected_without_changes() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;

    let ext = engine
        .submit_extension(submission(project.id, responsible.id, RequestKind::Renewal, 500))
        .await
        .unwrap()
        .record;
    let rejected = engine
        .reject_extension(ext.id, 1, "Budget exhausted")
        .await
        .unwrap()
        .record;
    assert_eq!(rejected.state(), ExtensionState::Rejected);

    let again = engine
        .accept_extension(ext.id, 2, AcceptOptions::note("late"))
        .await;
    assert_matches!(
        again,
        Err(WorkflowError::Core(CoreError::AlreadyProcessed { id, .. })) if id == ext.id
    );
    let ignore = engine.ignore_extension(ext.id, 2).await;
    assert_matches!(ignore, Err(WorkflowError::Core(CoreError::AlreadyProcessed { .. })));

    let stored = engine.get_extension(ext.id).await.unwrap();
    assert_eq!(stored, rejected);
    assert_eq!(stored.decision.as_deref(), Some("Budget exhausted"));
}

#[tokio::test]
async fn ignored_request_is_distinct_from_rejected() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;

    let ext = engine
        .submit_extension(submission(project.id, responsible.id, RequestKind::Extension, 10))
        .await
        .unwrap()
        .record;
    let ignored = engine.ignore_extension(ext.id, 1).await.unwrap().record;
    assert_eq!(ignored.state(), ExtensionState::Ignored);
    assert!(ignored.ignored);
    assert!(!ignored.accepted);

    let execute = engine.execute_extension(ext.id, None).await;
    assert_matches!(execute, Err(WorkflowError::Core(CoreError::InvalidStateTransition { .. })));
}

#[tokio::test]
async fn executing_twice_is_a_no_op() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;
    let id = accepted_extension(&engine, project.id, responsible.id, 100).await;

    engine.execute_extension(id, None).await.unwrap();
    let done = engine.get_extension(id).await.unwrap();
    let second = engine.execute_extension(id, None).await.unwrap();

    assert!(second.events.is_empty());
    assert_eq!(second.record, done);
    assert_eq!(cpu_of(&harness.store, project.id).await, 1100);
}

#[tokio::test]
async fn extensions_commute() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let first = harness.project(&engine, "A001", &responsible).await;
    let second = harness.project(&engine, "A002", &responsible).await;

    let a = accepted_extension(&engine, first.id, responsible.id, 30).await;
    let b = accepted_extension(&engine, first.id, responsible.id, 70).await;
    engine.execute_extension(a, None).await.unwrap();
    engine.execute_extension(b, None).await.unwrap();

    let c = accepted_extension(&engine, second.id, responsible.id, 30).await;
    let d = accepted_extension(&engine, second.id, responsible.id, 70).await;
    engine.execute_extension(d, None).await.unwrap();
    engine.execute_extension(c, None).await.unwrap();

    assert_eq!(cpu_of(&harness.store, first.id).await, 1100);
    assert_eq!(cpu_of(&harness.store, second.id).await, 1100);
}

#[tokio::test]
async fn renewal_supersedes_current_allocation() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;
    let before = harness.store.current_allocation(project.id).await.unwrap().unwrap();

    let ext = engine
        .submit_extension(submission(project.id, responsible.id, RequestKind::Renewal, 400))
        .await
        .unwrap()
        .record;
    engine
        .accept_extension(ext.id, 1, AcceptOptions::note(""))
        .await
        .unwrap();
    engine.execute_extension(ext.id, None).await.unwrap();

    let history = engine.allocation_history(project.id).await.unwrap();
    assert_eq!(history.iter().filter(|r| r.valid).count(), 1);
    let current = harness.store.current_allocation(project.id).await.unwrap().unwrap();
    assert_ne!(current.id, before.id);
    assert_eq!(current.cpu, 400);
    assert_eq!(current.extension_id, Some(ext.id));
    assert_eq!((current.ttl.year(), current.ttl.month(), current.ttl.day()), (2024, 7, 10));
}

#[tokio::test]
async fn accept_overrides_are_recorded_in_the_decision() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;

    let ext = engine
        .submit_extension(submission(project.id, responsible.id, RequestKind::Renewal, 500))
        .await
        .unwrap()
        .record;
    let options = AcceptOptions {
        note: "Partial grant".into(),
        hours: Some(200),
        extend: Some(true),
    };
    let accepted = engine.accept_extension(ext.id, 1, options).await.unwrap().record;
    assert_eq!(accepted.hours, 200);
    assert_eq!(accepted.request_kind().unwrap(), RequestKind::Extension);
    let decision = accepted.decision.unwrap();
    assert!(decision.starts_with("Partial grant"));
    assert!(decision.contains("Hours changed from 500 to 200"));

    engine.execute_extension(ext.id, None).await.unwrap();
    assert_eq!(cpu_of(&harness.store, project.id).await, 1200);
}

#[tokio::test]
async fn submission_validates_input() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;

    let negative = engine
        .submit_extension(submission(project.id, responsible.id, RequestKind::Extension, -5))
        .await;
    assert_matches!(negative, Err(WorkflowError::Core(CoreError::InvalidInput(_))));

    let unknown_type = engine
        .submit_extension(submission(
            project.id,
            responsible.id,
            RequestKind::Transform { target_type: "Z".into() },
            5,
        ))
        .await;
    assert_matches!(unknown_type, Err(WorkflowError::Core(CoreError::InvalidInput(_))));

    let mut blank = submission(project.id, responsible.id, RequestKind::Extension, 5);
    blank.reason = "   ".into();
    let blank = engine.submit_extension(blank).await;
    assert_matches!(blank, Err(WorkflowError::Core(CoreError::InvalidInput(_))));

    let missing = engine
        .submit_extension(submission(9999, responsible.id, RequestKind::Extension, 5))
        .await;
    assert_matches!(missing, Err(WorkflowError::Core(CoreError::MissingProject(_))));
    assert!(engine.project_extensions(project.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn snapshot_reads_scheduler_accounts() {
    let output = "hpc|a001||A001 project|250\nhpc|a001|alice|Alice Durand|250\n";
    let harness = Harness::new().with_report(parse_report(output));
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;

    let ext = engine
        .submit_extension(submission(project.id, responsible.id, RequestKind::Extension, 100))
        .await
        .unwrap()
        .record;
    assert_eq!(ext.present_use, 250);
    assert_eq!(ext.usage_percent, "25.0%");
}

#[tokio::test]
async fn never_extend_type_renews_instead() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project_of_type(&engine, "P001", "P", &responsible).await;
    let before = harness.store.current_allocation(project.id).await.unwrap().unwrap();

    let id = accepted_extension(&engine, project.id, responsible.id, 100).await;
    engine.execute_extension(id, None).await.unwrap();

    let current = harness.store.current_allocation(project.id).await.unwrap().unwrap();
    assert_ne!(current.id, before.id);
    assert_eq!(current.cpu, 100);
    assert_eq!((current.ttl.year(), current.ttl.month(), current.ttl.day()), (2024, 4, 10));
    let renewed = engine
        .log_events(&LogEventQuery {
            extension_id: Some(id),
            category: Some(categories::RENEWED.into()),
            ..LogEventQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(renewed.len(), 1);
}

#[tokio::test]
async fn never_renew_type_extends_instead() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project_of_type(&engine, "B001", "B", &responsible).await;
    let before = harness.store.current_allocation(project.id).await.unwrap().unwrap();

    let ext = engine
        .submit_extension(submission(project.id, responsible.id, RequestKind::Renewal, 100))
        .await
        .unwrap()
        .record;
    engine
        .accept_extension(ext.id, 1, AcceptOptions::note("ok"))
        .await
        .unwrap();
    engine.execute_extension(ext.id, None).await.unwrap();

    let current = harness.store.current_allocation(project.id).await.unwrap().unwrap();
    assert_eq!(current.id, before.id);
    assert_eq!(current.cpu, 1100);
    assert_eq!(current.ttl, before.ttl);
    let extended = engine
        .log_events(&LogEventQuery {
            extension_id: Some(ext.id),
            category: Some(categories::EXTENDED.into()),
            ..LogEventQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(extended.len(), 1);
}

#[tokio::test]
async fn execution_is_stamped_with_the_engine_clock() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;
    let id = accepted_extension(&engine, project.id, responsible.id, 10).await;

    let later = harness.engine_at(jan_10() + Duration::days(3));
    let done = later.execute_extension(id, None).await.unwrap().record;
    assert_eq!(done.done_at, Some(jan_10() + Duration::days(3)));
}

#[tokio::test]
async fn batch_execution_runs_every_accepted_request() {
    let harness = Harness::new();
    let engine = harness.engine();
    let responsible = harness.user("Alice", "alice@lab.example").await;
    let project = harness.project(&engine, "A001", &responsible).await;
    accepted_extension(&engine, project.id, responsible.id, 10).await;
    accepted_extension(&engine, project.id, responsible.id, 20).await;

    let later = harness.engine_at(jan_10() + Duration::days(1));
    let done = later.execute_accepted().await.unwrap();
    assert_eq!(done.len(), 2);
    assert!(later.execute_accepted().await.unwrap().is_empty());
    assert_eq!(cpu_of(&harness.store, project.id).await, 1030);
}
