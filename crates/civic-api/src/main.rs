//! Civic issue API server.

use civic_api::config::ApiConfig;
use civic_api::server::{self, AppState};
use civic_engine::{HttpImageStore, IssueEngine, LoggingImageStore};
use civic_monitor::SlaMonitor;
use civic_store::{InMemoryAuditStore, InMemoryIssueStore, JsonlAuditStore};
use civic_types::{AuditStore, Clock, ImageStore, IssueStore, SystemClock};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(feature = "sqlite")]
fn issue_store(config: &ApiConfig) -> Result<Arc<dyn IssueStore>, BoxError> {
    match config.sqlite_path {
        Some(ref path) => {
            tracing::info!(path = %path.display(), "issues stored in SQLite");
            Ok(Arc::new(civic_store::SqliteIssueStore::new(path)?))
        }
        None => Ok(Arc::new(InMemoryIssueStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
fn issue_store(config: &ApiConfig) -> Result<Arc<dyn IssueStore>, BoxError> {
    if config.sqlite_path.is_some() {
        tracing::warn!("CIVIC_SQLITE_PATH is set but the sqlite feature is off; using memory");
    }
    Ok(Arc::new(InMemoryIssueStore::new()))
}

fn audit_store(config: &ApiConfig) -> Result<Arc<dyn AuditStore>, BoxError> {
    if let Some(ref path) = config.audit_log {
        tracing::info!(path = %path.display(), "audit trail appended to JSONL file");
        return Ok(Arc::new(JsonlAuditStore::new(path)));
    }
    #[cfg(feature = "sqlite")]
    if let Some(ref path) = config.sqlite_path {
        return Ok(Arc::new(civic_store::SqliteAuditStore::new(path)?));
    }
    Ok(Arc::new(InMemoryAuditStore::new()))
}

fn image_store() -> Arc<dyn ImageStore> {
    match HttpImageStore::from_env() {
        Some(store) => Arc::new(store),
        None => Arc::new(LoggingImageStore),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env()?;
    let store = issue_store(&config)?;
    let audit = audit_store(&config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let engine = IssueEngine::new(
        Arc::clone(&store),
        Arc::clone(&audit),
        image_store(),
        Arc::clone(&clock),
    )
    .with_transition_policy(config.transition_policy);

    let monitor = SlaMonitor::new(store, audit, clock).with_max_duration(config.sweep_max);
    let monitor = civic_monitor::spawn(Arc::new(monitor));

    let app = server::router(Arc::new(AppState {
        engine: Arc::new(engine),
    }));
    tracing::info!(
        policy = ?config.transition_policy,
        "civic issue API listening on {}",
        config.listen
    );
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service(),
    )
    .await?;
    monitor.shutdown().await;
    Ok(())
}
