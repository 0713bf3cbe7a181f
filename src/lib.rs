//! RouterFleet engine: discovery and telemetry for a fleet of OpenWrt-class
//! routers, served over a small HTTP API.

pub mod collector;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod models;
pub mod probe;
pub mod registry;
pub mod repository;
pub mod scanner;
pub mod scheduler;
pub mod ssh;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use config::Config;
use http::AppState;
use registry::JobRegistry;
use repository::{PostgresRepository, Repository};
use scheduler::Scheduler;

pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Builds the fully wired application: repository, job registry, scheduler,
/// and HTTP router. Starting the scheduler is left to the caller so tests
/// can build an app without any background jobs running.
pub async fn build_app(config: &Config) -> anyhow::Result<(axum::Router, Arc<Mutex<Scheduler>>)> {
    let repository: Arc<dyn Repository> = Arc::new(PostgresRepository::connect(&config.database_url).await?);
    let registry = JobRegistry::new();
    registry.spawn_sweeper();

    let scheduler = Scheduler::new(repository.clone(), &config.metrics_collection_interval).await?;
    let scheduler = Arc::new(Mutex::new(scheduler));

    let state = AppState { repository, registry, scheduler: scheduler.clone() };
    let router = http::build_router(state);

    info!("application wired: HTTP router, job registry, and scheduler ready");
    Ok((router, scheduler))
}
