//! Postgres-backed Repository.
//!
//! Nested sub-records (credentials, memory/disk usage, interfaces) are
//! stored as `jsonb` columns rather than normalised out into their own
//! tables — none of them are queried independently of their parent row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::models::{Credentials, DiskUsage, MemoryUsage, Metric, NetworkInterface, Router, RouterStatus};

pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps a unique-index violation (routers.name, routers.mac_address) to
/// `Conflict`; everything else is an opaque storage failure.
fn map_sqlx(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return RepositoryError::Conflict(db_err.message().to_string());
        }
    }
    RepositoryError::Storage(e.to_string())
}

#[derive(FromRow)]
struct RouterRow {
    id: Uuid,
    name: String,
    ip_address: String,
    hostname: String,
    mac_address: Option<String>,
    ssh_port: i32,
    credentials: serde_json::Value,
    monitoring_enabled: bool,
    metrics_retention_days: i32,
    status: String,
    last_seen: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RouterRow {
    fn into_router(self) -> Router {
        Router {
            id: self.id,
            name: self.name,
            ip_address: self.ip_address,
            hostname: self.hostname,
            mac_address: self.mac_address,
            ssh_port: self.ssh_port as u16,
            credentials: serde_json::from_value(self.credentials).unwrap_or(Credentials {
                username: String::new(),
                password: None,
                ssh_key: None,
            }),
            monitoring_enabled: self.monitoring_enabled,
            metrics_retention_days: self.metrics_retention_days as u16,
            status: match self.status.as_str() {
                "online" => RouterStatus::Online,
                "offline" => RouterStatus::Offline,
                _ => RouterStatus::Unknown,
            },
            last_seen: self.last_seen,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn status_str(status: RouterStatus) -> &'static str {
    match status {
        RouterStatus::Online => "online",
        RouterStatus::Offline => "offline",
        RouterStatus::Unknown => "unknown",
    }
}

#[derive(FromRow)]
struct MetricRow {
    id: Uuid,
    router_id: Uuid,
    timestamp: DateTime<Utc>,
    uptime: String,
    cpu_load: f64,
    memory_usage: serde_json::Value,
    disk_usage: serde_json::Value,
    network_interfaces: serde_json::Value,
    wireless_clients: i32,
    error: Option<String>,
}

impl MetricRow {
    fn into_metric(self) -> Metric {
        Metric {
            id: self.id,
            router_id: self.router_id,
            timestamp: self.timestamp,
            uptime: self.uptime,
            cpu_load: self.cpu_load,
            memory_usage: serde_json::from_value(self.memory_usage).unwrap_or(MemoryUsage::default()),
            disk_usage: serde_json::from_value(self.disk_usage).unwrap_or(DiskUsage::default()),
            network_interfaces: serde_json::from_value::<Vec<NetworkInterface>>(self.network_interfaces)
                .unwrap_or_default(),
            wireless_clients: self.wireless_clients as u32,
            error: self.error,
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_router(&self, router: Router) -> Result<Router, RepositoryError> {
        sqlx::query(
            "INSERT INTO routers (id, name, ip_address, hostname, mac_address, ssh_port, credentials, \
             monitoring_enabled, metrics_retention_days, status, last_seen, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(router.id)
        .bind(&router.name)
        .bind(&router.ip_address)
        .bind(&router.hostname)
        .bind(&router.mac_address)
        .bind(router.ssh_port as i32)
        .bind(serde_json::to_value(&router.credentials).unwrap_or_default())
        .bind(router.monitoring_enabled)
        .bind(router.metrics_retention_days as i32)
        .bind(status_str(router.status))
        .bind(router.last_seen)
        .bind(router.created_at)
        .bind(router.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(router)
    }

    async fn get_router(&self, id: Uuid) -> Result<Option<Router>, RepositoryError> {
        let row: Option<RouterRow> = sqlx::query_as("SELECT * FROM routers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(RouterRow::into_router))
    }

    async fn list_routers(&self) -> Result<Vec<Router>, RepositoryError> {
        let rows: Vec<RouterRow> = sqlx::query_as("SELECT * FROM routers ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(RouterRow::into_router).collect())
    }

    async fn list_monitored_routers(&self) -> Result<Vec<Router>, RepositoryError> {
        let rows: Vec<RouterRow> =
            sqlx::query_as("SELECT * FROM routers WHERE monitoring_enabled = true ORDER BY created_at")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(RouterRow::into_router).collect())
    }

    async fn find_router_by_mac_or_ip(
        &self,
        mac: Option<&str>,
        ip: Option<&str>,
        hostname: Option<&str>,
    ) -> Result<Option<Router>, RepositoryError> {
        if let Some(mac) = mac {
            let row: Option<RouterRow> = sqlx::query_as("SELECT * FROM routers WHERE lower(mac_address) = lower($1)")
                .bind(mac)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if let Some(row) = row {
                return Ok(Some(row.into_router()));
            }
        }
        if let Some(ip) = ip {
            let row: Option<RouterRow> = sqlx::query_as("SELECT * FROM routers WHERE ip_address = $1")
                .bind(ip)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if let Some(row) = row {
                return Ok(Some(row.into_router()));
            }
        }
        if let Some(hostname) = hostname {
            if !hostname.is_empty() {
                let row: Option<RouterRow> = sqlx::query_as("SELECT * FROM routers WHERE hostname = $1")
                    .bind(hostname)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx)?;
                if let Some(row) = row {
                    return Ok(Some(row.into_router()));
                }
            }
        }
        Ok(None)
    }

    async fn update_router(&self, router: Router) -> Result<Router, RepositoryError> {
        let result = sqlx::query(
            "UPDATE routers SET name=$2, ip_address=$3, hostname=$4, mac_address=$5, ssh_port=$6, \
             credentials=$7, monitoring_enabled=$8, metrics_retention_days=$9, status=$10, last_seen=$11, \
             updated_at=$12 WHERE id=$1",
        )
        .bind(router.id)
        .bind(&router.name)
        .bind(&router.ip_address)
        .bind(&router.hostname)
        .bind(&router.mac_address)
        .bind(router.ssh_port as i32)
        .bind(serde_json::to_value(&router.credentials).unwrap_or_default())
        .bind(router.monitoring_enabled)
        .bind(router.metrics_retention_days as i32)
        .bind(status_str(router.status))
        .bind(router.last_seen)
        .bind(router.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(router)
    }

    async fn delete_router(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM routers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_metric(&self, metric: Metric) -> Result<Metric, RepositoryError> {
        sqlx::query(
            "INSERT INTO metrics (id, router_id, timestamp, uptime, cpu_load, memory_usage, disk_usage, \
             network_interfaces, wireless_clients, error) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(metric.id)
        .bind(metric.router_id)
        .bind(metric.timestamp)
        .bind(&metric.uptime)
        .bind(metric.cpu_load)
        .bind(serde_json::to_value(&metric.memory_usage).unwrap_or_default())
        .bind(serde_json::to_value(&metric.disk_usage).unwrap_or_default())
        .bind(serde_json::to_value(&metric.network_interfaces).unwrap_or_default())
        .bind(metric.wireless_clients as i32)
        .bind(&metric.error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(metric)
    }

    async fn list_metrics(
        &self,
        router_id: Uuid,
        limit: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Metric>, RepositoryError> {
        let rows: Vec<MetricRow> = sqlx::query_as(
            "SELECT * FROM metrics WHERE router_id = $1 AND timestamp >= COALESCE($2, to_timestamp(0)) \
             ORDER BY timestamp DESC LIMIT $3",
        )
        .bind(router_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(MetricRow::into_metric).collect())
    }

    async fn delete_metrics_older_than(
        &self,
        router_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM metrics WHERE router_id = $1 AND timestamp < $2")
            .bind(router_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}
