//! In-memory Repository: a process-local fake used in tests and by anyone
//! who doesn't need durability across restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::models::{Metric, Router};

#[derive(Default)]
pub struct InMemoryRepository {
    routers: RwLock<HashMap<Uuid, Router>>,
    metrics: RwLock<Vec<Metric>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_router(&self, router: Router) -> Result<Router, RepositoryError> {
        self.routers.write().insert(router.id, router.clone());
        Ok(router)
    }

    async fn get_router(&self, id: Uuid) -> Result<Option<Router>, RepositoryError> {
        Ok(self.routers.read().get(&id).cloned())
    }

    async fn list_routers(&self) -> Result<Vec<Router>, RepositoryError> {
        Ok(self.routers.read().values().cloned().collect())
    }

    async fn list_monitored_routers(&self) -> Result<Vec<Router>, RepositoryError> {
        Ok(self
            .routers
            .read()
            .values()
            .filter(|r| r.monitoring_enabled)
            .cloned()
            .collect())
    }

    async fn find_router_by_mac_or_ip(
        &self,
        mac: Option<&str>,
        ip: Option<&str>,
        hostname: Option<&str>,
    ) -> Result<Option<Router>, RepositoryError> {
        let routers = self.routers.read();

        if let Some(mac) = mac {
            let mac = mac.to_lowercase();
            if let Some(router) = routers
                .values()
                .find(|r| r.mac_address.as_deref().map(str::to_lowercase).as_deref() == Some(mac.as_str()))
            {
                return Ok(Some(router.clone()));
            }
        }
        if let Some(ip) = ip {
            if let Some(router) = routers.values().find(|r| r.ip_address == ip) {
                return Ok(Some(router.clone()));
            }
        }
        if let Some(hostname) = hostname {
            if !hostname.is_empty() {
                if let Some(router) = routers.values().find(|r| r.hostname == hostname) {
                    return Ok(Some(router.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn update_router(&self, router: Router) -> Result<Router, RepositoryError> {
        let mut routers = self.routers.write();
        if !routers.contains_key(&router.id) {
            return Err(RepositoryError::NotFound);
        }
        routers.insert(router.id, router.clone());
        Ok(router)
    }

    async fn delete_router(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let removed = self.routers.write().remove(&id).is_some();
        if removed {
            self.metrics.write().retain(|m| m.router_id != id);
        }
        Ok(removed)
    }

    async fn insert_metric(&self, metric: Metric) -> Result<Metric, RepositoryError> {
        self.metrics.write().push(metric.clone());
        Ok(metric)
    }

    async fn list_metrics(
        &self,
        router_id: Uuid,
        limit: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Metric>, RepositoryError> {
        let mut matching: Vec<Metric> = self
            .metrics
            .read()
            .iter()
            .filter(|m| m.router_id == router_id)
            .filter(|m| since.map(|s| m.timestamp >= s).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }

    async fn delete_metrics_older_than(
        &self,
        router_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut metrics = self.metrics.write();
        let before = metrics.len();
        metrics.retain(|m| !(m.router_id == router_id && m.timestamp < cutoff));
        Ok((before - metrics.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credentials, RouterStatus};

    fn sample_router() -> Router {
        let now = Utc::now();
        Router {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            ip_address: "192.168.1.1".to_string(),
            hostname: "test".to_string(),
            mac_address: Some("aa:bb:cc:dd:ee:ff".to_string()),
            ssh_port: 22,
            credentials: Credentials { username: "root".to_string(), password: Some("x".to_string()), ssh_key: None },
            monitoring_enabled: true,
            metrics_retention_days: 30,
            status: RouterStatus::Unknown,
            last_seen: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = InMemoryRepository::new();
        let router = sample_router();
        repo.create_router(router.clone()).await.unwrap();
        let fetched = repo.get_router(router.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, router.id);
    }

    #[tokio::test]
    async fn delete_cascades_to_metrics() {
        let repo = InMemoryRepository::new();
        let router = sample_router();
        repo.create_router(router.clone()).await.unwrap();
        repo.insert_metric(Metric::sentinel(router.id, "test")).await.unwrap();

        assert!(repo.delete_router(router.id).await.unwrap());
        let metrics = repo.list_metrics(router.id, 10, None).await.unwrap();
        assert!(metrics.is_empty());
    }

    #[tokio::test]
    async fn list_metrics_is_newest_first_and_bounded() {
        let repo = InMemoryRepository::new();
        let router = sample_router();
        repo.create_router(router.clone()).await.unwrap();

        for i in 0..5 {
            let mut m = Metric::sentinel(router.id, "x");
            m.timestamp = Utc::now() + chrono::Duration::seconds(i);
            repo.insert_metric(m).await.unwrap();
        }

        let metrics = repo.list_metrics(router.id, 3, None).await.unwrap();
        assert_eq!(metrics.len(), 3);
        assert!(metrics[0].timestamp >= metrics[1].timestamp);
    }

    #[tokio::test]
    async fn update_unknown_router_is_not_found() {
        let repo = InMemoryRepository::new();
        let result = repo.update_router(sample_router()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }
}
