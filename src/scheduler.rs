//! Scheduler: periodic telemetry fan-out plus a daily retention sweep.
//!
//! Both jobs run under the same `tokio-cron-scheduler` instance. The
//! collection interval can be reconfigured at runtime — the previous job is
//! removed and a new one installed with the updated schedule.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collector;
use crate::repository::Repository;

const RETENTION_CRON: &str = "0 0 1 * * *";
const COLLECTION_CONCURRENCY: usize = 24;

/// Named collection intervals accepted in configuration, alongside the raw
/// cron strings they resolve to. Either form may be supplied directly.
pub const EVERY_MINUTE: &str = "0 * * * * *";
pub const EVERY_5_MINUTES: &str = "0 */5 * * * *";
pub const EVERY_15_MINUTES: &str = "0 */15 * * * *";
pub const EVERY_30_MINUTES: &str = "0 */30 * * * *";
pub const HOURLY: &str = "0 0 * * * *";
pub const DAILY: &str = "0 0 0 * * *";

/// Resolves a named interval label (e.g. `EVERY_5_MINUTES`) or an already
/// literal cron string into the cron string the scheduler should install.
pub fn resolve_interval(value: &str) -> String {
    match value {
        "EVERY_MINUTE" => EVERY_MINUTE.to_string(),
        "EVERY_5_MINUTES" => EVERY_5_MINUTES.to_string(),
        "EVERY_15_MINUTES" => EVERY_15_MINUTES.to_string(),
        "EVERY_30_MINUTES" => EVERY_30_MINUTES.to_string(),
        "HOURLY" => HOURLY.to_string(),
        "DAILY" => DAILY.to_string(),
        other => other.to_string(),
    }
}

pub struct Scheduler {
    scheduler: JobScheduler,
    repository: Arc<dyn Repository>,
    collection_job_id: Option<Uuid>,
    current_cron: String,
}

impl Scheduler {
    pub async fn new(repository: Arc<dyn Repository>, initial_interval: &str) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        let mut this = Self {
            scheduler,
            repository,
            collection_job_id: None,
            current_cron: resolve_interval(initial_interval),
        };
        this.install_collection_job().await?;
        this.install_retention_job().await?;
        Ok(this)
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }

    pub fn current_interval(&self) -> &str {
        &self.current_cron
    }

    /// Swaps the collection job for one on a new schedule. The retention job
    /// is left untouched.
    pub async fn reconfigure_interval(&mut self, interval: &str) -> anyhow::Result<()> {
        let cron = resolve_interval(interval);
        if cron == self.current_cron {
            return Ok(());
        }
        if let Some(id) = self.collection_job_id.take() {
            self.scheduler.remove(&id).await?;
        }
        self.current_cron = cron;
        self.install_collection_job().await?;
        Ok(())
    }

    async fn install_collection_job(&mut self) -> anyhow::Result<()> {
        let repository = self.repository.clone();
        let job = Job::new_async(self.current_cron.as_str(), move |_uuid, _lock| {
            let repository = repository.clone();
            Box::pin(async move {
                run_collection_round(repository).await;
            })
        })?;
        let id = self.scheduler.add(job).await?;
        self.collection_job_id = Some(id);
        info!("installed collection job on schedule '{}'", self.current_cron);
        Ok(())
    }

    async fn install_retention_job(&mut self) -> anyhow::Result<()> {
        let repository = self.repository.clone();
        let job = Job::new_async(RETENTION_CRON, move |_uuid, _lock| {
            let repository = repository.clone();
            Box::pin(async move {
                run_retention_round(repository).await;
            })
        })?;
        self.scheduler.add(job).await?;
        Ok(())
    }
}

async fn run_collection_round(repository: Arc<dyn Repository>) {
    let routers = match repository.list_monitored_routers().await {
        Ok(routers) => routers,
        Err(e) => {
            error!("collection round could not list monitored routers: {}", e);
            return;
        }
    };

    let semaphore = Arc::new(Semaphore::new(COLLECTION_CONCURRENCY));
    let mut set = JoinSet::new();

    for router in routers {
        let repository = repository.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = collector::collect(&router).await;
            let collected_real_telemetry = outcome.metric.error.is_none();

            if let Err(e) = repository.insert_metric(outcome.metric).await {
                warn!("failed to persist metric for router {}: {}", router.id, e);
            }

            let mut updated = router.clone();
            updated.status = outcome.status;
            if collected_real_telemetry {
                updated.last_seen = Some(chrono::Utc::now());
            }
            if let Err(e) = repository.update_router(updated).await {
                warn!("failed to update router {} status: {}", router.id, e);
            }
        });
    }

    let mut succeeded = 0usize;
    let mut total = 0usize;
    while let Some(res) = set.join_next().await {
        total += 1;
        if res.is_ok() {
            succeeded += 1;
        }
    }
    info!("collection round complete: {}/{} routers processed", succeeded, total);
}

async fn run_retention_round(repository: Arc<dyn Repository>) {
    let routers = match repository.list_routers().await {
        Ok(routers) => routers,
        Err(e) => {
            error!("retention round could not list routers: {}", e);
            return;
        }
    };

    let mut total_deleted = 0u64;
    for router in routers {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(router.metrics_retention_days as i64);
        match repository.delete_metrics_older_than(router.id, cutoff).await {
            Ok(count) => total_deleted += count,
            Err(e) => warn!("retention sweep failed for router {}: {}", router.id, e),
        }
    }
    info!("retention sweep deleted {} metric row(s)", total_deleted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credentials, Metric, Router, RouterStatus};
    use crate::repository::InMemoryRepository;

    #[test]
    fn resolves_named_labels() {
        assert_eq!(resolve_interval("EVERY_5_MINUTES"), EVERY_5_MINUTES);
        assert_eq!(resolve_interval("HOURLY"), HOURLY);
    }

    #[test]
    fn passes_through_literal_cron_strings() {
        let literal = "0 0 */2 * * *";
        assert_eq!(resolve_interval(literal), literal);
    }

    #[tokio::test]
    async fn retention_round_drops_only_metrics_past_the_routers_own_cutoff() {
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let now = chrono::Utc::now();
        let router = Router {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            ip_address: "127.0.0.1".to_string(),
            hostname: "test".to_string(),
            mac_address: None,
            ssh_port: 22,
            credentials: Credentials { username: "root".to_string(), password: Some("x".to_string()), ssh_key: None },
            monitoring_enabled: true,
            metrics_retention_days: 7,
            status: RouterStatus::Unknown,
            last_seen: None,
            created_at: now,
            updated_at: now,
        };
        repository.create_router(router.clone()).await.unwrap();

        for days_ago in [0i64, 6, 8] {
            let mut metric = Metric::sentinel(router.id, "seed");
            metric.timestamp = now - chrono::Duration::days(days_ago);
            repository.insert_metric(metric).await.unwrap();
        }

        run_retention_round(repository.clone()).await;

        let remaining = repository.list_metrics(router.id, 10, None).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|m| now - m.timestamp < chrono::Duration::days(7)));
    }
}
