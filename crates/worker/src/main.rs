use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hpcalloc_accounting::{AccountingConfig, AccountingSource, CommandAccounting, StaticAccounting};
use hpcalloc_events::{
    DomainEvent, EmailConfig, EmailDelivery, EventBus, LogNotifier, NotificationDispatcher, Notifier,
};
use hpcalloc_workflow::{
    AllocationLifecycle, Engine, EngineConfig, PgStore, PlainTextRenderer, Transition,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hpcalloc_worker=info,hpcalloc_workflow=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = hpcalloc_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    hpcalloc_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    hpcalloc_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Configuration ---
    let config = EngineConfig::from_env().expect("Invalid engine configuration");
    let policy = config.load_policy().expect("Failed to load project type policy");

    let accounting: Arc<dyn AccountingSource> = match AccountingConfig::from_env() {
        Some(accounting) => Arc::new(CommandAccounting::new(accounting)),
        None => {
            tracing::warn!("ACCOUNTING_COMMAND not set, usage will be reported as empty");
            Arc::new(StaticAccounting::empty())
        }
    };
    let notifier: Arc<dyn Notifier> = match EmailConfig::from_env() {
        Some(email) => Arc::new(EmailDelivery::new(email)),
        None => {
            tracing::warn!("SMTP_HOST not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let dispatcher = NotificationDispatcher::new(notifier, Arc::new(EventBus::default()));

    let renderer = Arc::new(PlainTextRenderer::new(config.document_dir.clone()));
    let warn_days = config.expiry_warn_days;
    let engine = Engine::new(
        Arc::new(PgStore::new(pool)),
        accounting,
        renderer,
        AllocationLifecycle::new(policy),
        config,
    );

    if let Err(e) = run_once(&engine, &dispatcher, warn_days).await {
        tracing::error!(error = %e, "Worker run failed");
        std::process::exit(1);
    }
    tracing::info!("Worker run complete");
}

/// One cron pass: suspend, warn, execute accepted requests, collect usage.
///
/// Notifications of each step are delivered before the next one starts.
async fn run_once(
    engine: &Engine,
    dispatcher: &NotificationDispatcher,
    warn_days: i64,
) -> anyhow::Result<()> {
    let suspended = engine
        .suspend_expired()
        .await
        .context("Expiry suspension failed")?;
    tracing::info!(count = suspended.len(), "Expired projects suspended");
    dispatcher.dispatch_and_wait(events_of(suspended)).await;

    let warnings = engine
        .warn_expiring(warn_days)
        .await
        .context("Expiry warning sweep failed")?;
    dispatcher.dispatch_and_wait(warnings).await;

    let executed = engine
        .execute_accepted()
        .await
        .context("Executing accepted requests failed")?;
    tracing::info!(count = executed.len(), "Accepted requests executed");
    dispatcher.dispatch_and_wait(events_of(executed)).await;

    let collected = engine
        .collect_all_usage()
        .await
        .context("Usage collection failed")?;
    let samples: usize = collected.iter().map(|t| t.record).sum();
    tracing::info!(projects = collected.len(), samples, "Usage collected");
    dispatcher.dispatch_and_wait(events_of(collected)).await;

    Ok(())
}

fn events_of<T>(transitions: Vec<Transition<T>>) -> Vec<DomainEvent> {
    transitions
        .into_iter()
        .flat_map(|t| t.into_parts().1)
        .collect()
}
