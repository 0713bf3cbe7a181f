//! Repository: persistence boundary for Routers and Metrics.
//!
//! The trait is the seam between the engine and storage; `postgres` backs it
//! with sqlx against a real database, `memory` backs it with a process-local
//! map for tests and for any caller that doesn't need durability.

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Metric, Router};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("router not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_router(&self, router: Router) -> Result<Router, RepositoryError>;
    async fn get_router(&self, id: Uuid) -> Result<Option<Router>, RepositoryError>;
    async fn list_routers(&self) -> Result<Vec<Router>, RepositoryError>;
    async fn list_monitored_routers(&self) -> Result<Vec<Router>, RepositoryError>;
    /// Looks up a Router by MAC, then IP, then hostname, in that priority
    /// order, returning the first match. Any of the three may be omitted.
    async fn find_router_by_mac_or_ip(
        &self,
        mac: Option<&str>,
        ip: Option<&str>,
        hostname: Option<&str>,
    ) -> Result<Option<Router>, RepositoryError>;
    async fn update_router(&self, router: Router) -> Result<Router, RepositoryError>;
    /// Deletes a router and cascades to its metrics. Returns whether a row
    /// was actually removed.
    async fn delete_router(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn insert_metric(&self, metric: Metric) -> Result<Metric, RepositoryError>;
    /// Newest-first, bounded by `limit`, optionally filtered to `since`.
    async fn list_metrics(
        &self,
        router_id: Uuid,
        limit: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Metric>, RepositoryError>;
    async fn delete_metrics_older_than(
        &self,
        router_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
}
