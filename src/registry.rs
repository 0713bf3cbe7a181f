//! Job Registry: an in-memory, non-persistent store of ScanJobs.
//!
//! Backed by a `DashMap` so concurrent scan fan-outs can update progress
//! without a registry-wide lock. A background sweep evicts stale entries so
//! the map doesn't grow without bound across a long-running process.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::models::{ScanJob, ScanJobStatus, ScanResult};

const EVICTION_AGE: chrono::Duration = chrono::Duration::minutes(30);
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, ScanJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self { jobs: Arc::new(DashMap::new()) }
    }

    /// Creates a new pending job for `subnet` and stores it.
    pub fn create(&self, subnet: String) -> ScanJob {
        let job = ScanJob::pending(subnet);
        self.jobs.insert(job.id.clone(), job.clone());
        job
    }

    /// Marks an existing job running. No-op if the job is gone.
    pub fn start(&self, id: &str) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.status = ScanJobStatus::Running;
            job.message = "scanning".to_string();
            job.updated_at = Utc::now();
        }
    }

    /// Looks up a job by id. A previously-evicted or never-created id
    /// returns `None`, which callers surface as `notFound`.
    pub fn get(&self, id: &str) -> Option<ScanJob> {
        self.jobs.get(id).map(|entry| entry.clone())
    }

    /// Updates progress and message for a running job. Progress is clamped so
    /// it never moves backward within a single job's lifetime.
    pub fn update_progress(&self, id: &str, progress: u8, message: impl Into<String>) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.progress = job.progress.max(progress);
            job.message = message.into();
            job.updated_at = Utc::now();
        }
    }

    pub fn complete(&self, id: &str, result: ScanResult) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.status = ScanJobStatus::Completed;
            job.progress = 100;
            job.message = "done".to_string();
            job.result = Some(result);
            job.updated_at = Utc::now();
        }
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.status = ScanJobStatus::Error;
            job.error = Some(error.into());
            job.updated_at = Utc::now();
        }
    }

    /// Removes every job last updated more than 30 minutes ago. Only
    /// terminal (completed/error) jobs are eligible — a stuck running job is
    /// left for the scan-level deadline to fail instead.
    fn sweep(&self) {
        let cutoff = Utc::now() - EVICTION_AGE;
        let stale: Vec<String> = self
            .jobs
            .iter()
            .filter(|entry| {
                matches!(entry.status, ScanJobStatus::Completed | ScanJobStatus::Error)
                    && entry.updated_at < cutoff
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in &stale {
            self.jobs.remove(id);
        }
        if !stale.is_empty() {
            info!("evicted {} stale scan job(s)", stale.len());
        }
    }

    /// Spawns the background eviction sweep. Intended to be called once at
    /// startup; the returned handle runs for the lifetime of the process.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                debug!("running scan job eviction sweep");
                registry.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let registry = JobRegistry::new();
        let job = registry.create("192.168.1.".to_string());
        let fetched = registry.get(&job.id).unwrap();
        assert_eq!(fetched.status, ScanJobStatus::Pending);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = JobRegistry::new();
        assert!(registry.get("scan_0_0").is_none());
    }

    #[test]
    fn progress_never_moves_backward() {
        let registry = JobRegistry::new();
        let job = registry.create("192.168.1.".to_string());
        registry.start(&job.id);
        registry.update_progress(&job.id, 50, "half way");
        registry.update_progress(&job.id, 10, "should not regress");
        let fetched = registry.get(&job.id).unwrap();
        assert_eq!(fetched.progress, 50);
    }

    #[test]
    fn complete_sets_terminal_state() {
        let registry = JobRegistry::new();
        let job = registry.create("192.168.1.".to_string());
        registry.complete(&job.id, ScanResult::default());
        let fetched = registry.get(&job.id).unwrap();
        assert_eq!(fetched.status, ScanJobStatus::Completed);
        assert_eq!(fetched.progress, 100);
    }

    #[test]
    fn sweep_evicts_only_stale_terminal_jobs() {
        let registry = JobRegistry::new();
        let job = registry.create("192.168.1.".to_string());
        registry.complete(&job.id, ScanResult::default());
        if let Some(mut entry) = registry.jobs.get_mut(&job.id) {
            entry.updated_at = Utc::now() - chrono::Duration::hours(1);
        }
        registry.sweep();
        assert!(registry.get(&job.id).is_none());
    }
}
