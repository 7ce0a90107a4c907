//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hpcalloc_accounting::{AccountingSource, StaticAccounting, UsageReport, TOTAL_KEY};
use hpcalloc_core::policy::PolicyConfig;
use hpcalloc_core::profile::UserProfile;
use hpcalloc_core::types::DbId;
use hpcalloc_db::models::project::{CreateProject, Project};
use hpcalloc_db::models::user::{CreateUser, User};
use hpcalloc_events::{DomainEvent, EventBus, Notification, NotificationDispatcher, RecordingNotifier};
use hpcalloc_workflow::{
    AllocationLifecycle, DocumentRenderer, Engine, EngineConfig, MemoryStore, PlainTextRenderer,
    RecordStore, RenderError,
};
use serde_json::Value;

pub const POLICY: &str = r#"{ "types": {
    "A": { "label": "Regular", "duration": "+6 months" },
    "B": { "label": "Big", "end_date": "2024-12-31", "never_renew": true },
    "P": { "label": "Preparatory", "duration": "+3 months", "never_extend": true }
} }"#;

pub const ADMIN_CC: &str = "hpc-admins@example.org";

pub fn jan_10() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
}

pub fn profile(first: &str, email: &str) -> UserProfile {
    UserProfile {
        first_name: first.into(),
        last_name: "Durand".into(),
        email: email.into(),
        phone: None,
        lab: Some("LMA".into()),
        position: None,
    }
}

pub struct FailingRenderer;

#[async_trait]
impl DocumentRenderer for FailingRenderer {
    async fn render(&self, template: &str, _data: &Value) -> Result<PathBuf, RenderError> {
        Err(RenderError::InvalidData {
            template: template.to_string(),
        })
    }
}

/// Answers each query with the report of the day the interval starts on.
#[derive(Default)]
pub struct DailyAccounting {
    days: BTreeMap<NaiveDate, UsageReport>,
}

impl DailyAccounting {
    pub fn day(mut self, date: NaiveDate, account: &str, total: i64) -> Self {
        self.days
            .entry(date)
            .or_default()
            .insert(account, TOTAL_KEY, total);
        self
    }
}

#[async_trait]
impl AccountingSource for DailyAccounting {
    async fn usage(&self, accounts: &[String], start: DateTime<Utc>, _end: DateTime<Utc>) -> UsageReport {
        self.days
            .get(&start.date_naive())
            .map(|report| report.restricted_to(accounts))
            .unwrap_or_default()
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub dispatcher: NotificationDispatcher,
    pub report: UsageReport,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub document_dir: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::new(notifier.clone(), Arc::new(EventBus::default()));
        let document_dir = std::env::temp_dir().join(format!(
            "hpcalloc-docs-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        Self {
            store: Arc::new(MemoryStore::new()),
            notifier,
            dispatcher,
            report: UsageReport::new(),
            renderer: Arc::new(PlainTextRenderer::new(document_dir.clone())),
            document_dir,
        }
    }

    pub fn with_usage(mut self, account: &str, total: i64, users: &[(&str, i64)]) -> Self {
        self.report.insert(account, TOTAL_KEY, total);
        for (login, hours) in users {
            self.report.insert(account, login, *hours);
        }
        self
    }

    pub fn with_report(mut self, report: UsageReport) -> Self {
        self.report = report;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Engine over the shared store with a fixed clock.
    pub fn engine_at(&self, now: DateTime<Utc>) -> Engine {
        self.engine_with(now, Arc::new(StaticAccounting::new(self.report.clone())))
    }

    pub fn engine_with(&self, now: DateTime<Utc>, accounting: Arc<dyn AccountingSource>) -> Engine {
        let policy = PolicyConfig::from_json(POLICY).unwrap();
        let config = EngineConfig {
            technical_email: None,
            admin_cc: vec![ADMIN_CC.to_string()],
            document_dir: self.document_dir.clone(),
            ..EngineConfig::default()
        };
        Engine::new(
            self.store.clone(),
            accounting,
            self.renderer.clone(),
            AllocationLifecycle::new(policy),
            config,
        )
        .with_clock(Arc::new(move || now))
    }

    pub fn engine(&self) -> Engine {
        self.engine_at(jan_10())
    }

    pub async fn user(&self, first: &str, email: &str) -> User {
        self.store
            .create_user(&CreateUser {
                login: Some(first.to_lowercase()),
                profile: profile(first, email),
                active: true,
            })
            .await
            .unwrap()
    }

    /// Type A project with a responsible and a 1000 hour allocation
    /// granted on January 10th.
    pub async fn project(&self, engine: &Engine, name: &str, responsible: &User) -> Project {
        self.project_of_type(engine, name, "A", responsible).await
    }

    pub async fn project_of_type(
        &self,
        engine: &Engine,
        name: &str,
        type_code: &str,
        responsible: &User,
    ) -> Project {
        let project = self
            .store
            .create_project(&CreateProject {
                name: name.into(),
                title: format!("{name} title"),
                type_code: type_code.into(),
                type_label: engine.lifecycle().policy().label(type_code),
                responsible_id: Some(responsible.id),
                registration_id: None,
            })
            .await
            .unwrap();
        engine
            .renew_allocation(project.id, 1000, responsible.id)
            .await
            .unwrap();
        self.store.get_project(project.id).await.unwrap()
    }

    pub async fn store_members(&self, project_id: DbId) -> Vec<DbId> {
        let mut ids: Vec<DbId> = self
            .store
            .project_members(project_id)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn dispatch(&self, events: Vec<DomainEvent>) {
        self.dispatcher.dispatch_and_wait(events).await;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.notifier.sent()
    }

    pub fn sent_to(&self, address: &str) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.to.iter().any(|t| t == address))
            .collect()
    }
}

pub async fn cpu_of(store: &MemoryStore, project_id: DbId) -> i64 {
    store
        .current_allocation(project_id)
        .await
        .unwrap()
        .map(|r| r.cpu)
        .unwrap_or(0)
}
