//! `/api/routers` and `/routers/{id}` handlers: CRUD, on-demand connection
//! test and metric collection, metric history, and the collection-interval
//! config endpoint.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::collector;
use crate::error::{AppError, AppResult};
use crate::fingerprint;
use crate::models::{clamp_retention_days, default_ssh_port, Credentials, Router, RouterStatus, RouterView};
use crate::probe::{probe_tcp, timeouts, ProbeOutcome};
use crate::scheduler;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRouterRequest {
    pub name: String,
    pub ip_address: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub monitoring_enabled: Option<bool>,
    #[serde(default)]
    pub metrics_retention_days: Option<u16>,
}

fn validate_ipv4(value: &str) -> bool {
    Ipv4Addr::from_str(value).is_ok()
}

fn validate_port(port: u16) -> bool {
    port >= 1
}

/// App-level uniqueness check ahead of persistence: a DB unique-index
/// violation would surface the same way via `RepositoryError::Conflict`, but
/// checking here lets `InMemoryRepository` (which enforces nothing) honor the
/// same contract and names the offending field up front.
async fn ensure_no_conflict(
    state: &AppState,
    name: &str,
    mac_address: Option<&str>,
    exclude_id: Option<Uuid>,
) -> AppResult<()> {
    let routers = state.repository.list_routers().await?;
    if routers.iter().any(|r| r.name == name && Some(r.id) != exclude_id) {
        return Err(AppError::Conflict("name already in use".to_string()));
    }
    if let Some(mac) = mac_address {
        let mac = mac.to_lowercase();
        if routers
            .iter()
            .any(|r| Some(r.id) != exclude_id && r.mac_address.as_deref().map(str::to_lowercase).as_deref() == Some(mac.as_str()))
        {
            return Err(AppError::Conflict("macAddress already in use".to_string()));
        }
    }
    Ok(())
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CreateRouterRequest>) -> AppResult<Json<RouterView>> {
    if !validate_ipv4(&req.ip_address) {
        return Err(AppError::InvalidInput(format!("{} is not a valid IPv4 address", req.ip_address)));
    }
    if !validate_port(req.ssh_port) {
        return Err(AppError::InvalidInput("sshPort must be between 1 and 65535".to_string()));
    }
    if req.password.is_none() && req.ssh_key.is_none() {
        return Err(AppError::InvalidInput("at least one of password or sshKey is required".to_string()));
    }
    ensure_no_conflict(&state, &req.name, req.mac_address.as_deref(), None).await?;

    let now = Utc::now();
    let mut router = Router {
        id: Uuid::new_v4(),
        name: req.name,
        ip_address: req.ip_address,
        hostname: req.hostname.unwrap_or_default(),
        mac_address: req.mac_address,
        ssh_port: req.ssh_port,
        credentials: Credentials { username: req.username, password: req.password, ssh_key: req.ssh_key },
        monitoring_enabled: req.monitoring_enabled.unwrap_or(true),
        metrics_retention_days: clamp_retention_days(req.metrics_retention_days.unwrap_or(30)),
        status: RouterStatus::Unknown,
        last_seen: None,
        created_at: now,
        updated_at: now,
    };

    // Best-effort fingerprint: a newly-registered router's status/hostname/MAC
    // are filled in immediately rather than waiting for the next collection
    // round, but a failure here never blocks creation.
    if probe_tcp(&router.ip_address, router.ssh_port, timeouts::QUICK).await == ProbeOutcome::Open {
        let device = fingerprint::fingerprint_quick(
            &router.ip_address,
            router.ssh_port,
            &router.credentials.username,
            router.credentials.effective_auth(),
        )
        .await;
        router.status = if device.ssh_success { RouterStatus::Online } else { RouterStatus::Unknown };
        if router.hostname.is_empty() && !device.hostname.is_empty() {
            router.hostname = device.hostname;
        }
        if router.mac_address.is_none() {
            router.mac_address = device.mac_address;
        }
        if device.ssh_success {
            router.last_seen = Some(now);
        }
    }

    let created = state.repository.create_router(router).await?;
    Ok(Json(created.into()))
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<RouterView>>> {
    let routers = state.repository.list_routers().await?;
    Ok(Json(routers.into_iter().map(RouterView::from).collect()))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<RouterView>> {
    state.repository.get_router(id).await?.map(|r| Json(r.into())).ok_or(AppError::NotFound)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRouterRequest {
    pub name: String,
    pub ip_address: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub monitoring_enabled: Option<bool>,
    #[serde(default)]
    pub metrics_retention_days: Option<u16>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRouterRequest>,
) -> AppResult<Json<RouterView>> {
    if !validate_ipv4(&req.ip_address) {
        return Err(AppError::InvalidInput(format!("{} is not a valid IPv4 address", req.ip_address)));
    }
    let mut existing = state.repository.get_router(id).await?.ok_or(AppError::NotFound)?;

    let effective_mac = req.mac_address.as_deref().or(existing.mac_address.as_deref()).map(str::to_string);
    ensure_no_conflict(&state, &req.name, effective_mac.as_deref(), Some(id)).await?;

    let ip_changed = existing.ip_address != req.ip_address;

    existing.name = req.name;
    existing.ip_address = req.ip_address;
    if let Some(hostname) = req.hostname {
        existing.hostname = hostname;
    }
    existing.mac_address = req.mac_address.or(existing.mac_address);
    existing.ssh_port = req.ssh_port;
    existing.credentials = Credentials {
        username: req.username,
        password: req.password.or(existing.credentials.password),
        ssh_key: req.ssh_key.or(existing.credentials.ssh_key),
    };
    if let Some(enabled) = req.monitoring_enabled {
        existing.monitoring_enabled = enabled;
    }
    if let Some(days) = req.metrics_retention_days {
        existing.metrics_retention_days = clamp_retention_days(days);
    }
    existing.updated_at = Utc::now();

    // IP changes invalidate any previously-fingerprinted hostname/MAC — best
    // effort re-fingerprint, same as on creation.
    if ip_changed && probe_tcp(&existing.ip_address, existing.ssh_port, timeouts::QUICK).await == ProbeOutcome::Open {
        let device = fingerprint::fingerprint_quick(
            &existing.ip_address,
            existing.ssh_port,
            &existing.credentials.username,
            existing.credentials.effective_auth(),
        )
        .await;
        if !device.hostname.is_empty() {
            existing.hostname = device.hostname;
        }
        if let Some(mac) = device.mac_address {
            existing.mac_address = Some(mac);
        }
        if device.ssh_success {
            existing.status = RouterStatus::Online;
            existing.last_seen = Some(Utc::now());
        }
    }

    let updated = state.repository.update_router(existing).await?;
    Ok(Json(updated.into()))
}

pub async fn delete_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<serde_json::Value>> {
    let removed = state.repository.delete_router(id).await?;
    if !removed {
        return Err(AppError::NotFound);
    }
    Ok(Json(serde_json::json!({ "message": "router deleted" })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionDetails {
    pub port_open: bool,
    pub ssh_connection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    pub details: TestConnectionDetails,
}

/// Shares the reachability-then-fingerprint pipeline the scanner uses,
/// rather than a bespoke connectivity check.
pub async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TestConnectionResponse>> {
    let router = state.repository.get_router(id).await?.ok_or(AppError::NotFound)?;

    if probe_tcp(&router.ip_address, router.ssh_port, timeouts::EXTENDED).await != ProbeOutcome::Open {
        return Ok(Json(TestConnectionResponse {
            success: false,
            message: "device not reachable".to_string(),
            details: TestConnectionDetails { port_open: false, ssh_connection: false, hostname: None, mac_address: None },
        }));
    }

    let device = fingerprint::fingerprint_quick(
        &router.ip_address,
        router.ssh_port,
        &router.credentials.username,
        router.credentials.effective_auth(),
    )
    .await;

    let message = if device.ssh_success {
        "connection succeeded".to_string()
    } else {
        device.note.clone().unwrap_or_else(|| "ssh authentication failed".to_string())
    };

    Ok(Json(TestConnectionResponse {
        success: device.ssh_success,
        message,
        details: TestConnectionDetails {
            port_open: true,
            ssh_connection: device.ssh_success,
            hostname: if device.hostname.is_empty() { None } else { Some(device.hostname) },
            mac_address: device.mac_address,
        },
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectMetricsResponse {
    pub message: String,
    pub online: bool,
    pub metrics: crate::models::Metric,
}

pub async fn collect_metrics(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<CollectMetricsResponse>> {
    let router = state.repository.get_router(id).await?.ok_or(AppError::NotFound)?;
    let outcome = collector::collect(&router).await;
    let online = outcome.metric.error.is_none();

    let mut updated = router;
    updated.status = outcome.status;
    if online {
        updated.last_seen = Some(Utc::now());
    }
    state.repository.update_router(updated).await?;

    let message = if online { "metrics collected".to_string() } else { outcome.metric.error.clone().unwrap_or_else(|| "collection failed".to_string()) };
    let metrics = state.repository.insert_metric(outcome.metric).await?;
    Ok(Json(CollectMetricsResponse { message, online, metrics }))
}

#[derive(Deserialize)]
pub struct MetricsQuery {
    pub limit: Option<i64>,
    pub timespan: Option<String>,
}

/// Parses a timespan like `24h` or `7d` into a cutoff offset from now.
fn parse_timespan(value: &str) -> Option<chrono::Duration> {
    let value = value.trim();
    let (number, unit) = value.split_at(value.len().saturating_sub(1));
    let amount: i64 = number.parse().ok()?;
    match unit {
        "h" => Some(chrono::Duration::hours(amount)),
        "d" => Some(chrono::Duration::days(amount)),
        "m" => Some(chrono::Duration::minutes(amount)),
        _ => None,
    }
}

pub async fn list_metrics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MetricsQuery>,
) -> AppResult<Json<Vec<crate::models::Metric>>> {
    let since = query.timespan.as_deref().and_then(parse_timespan).map(|d| Utc::now() - d);
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let metrics = state.repository.list_metrics(id, limit, since).await?;
    Ok(Json(metrics))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_routers: usize,
    pub online_routers: usize,
    pub offline_routers: usize,
    pub unknown_routers: usize,
    pub total_clients: u32,
}

pub async fn metrics_summary(State(state): State<AppState>) -> AppResult<Json<MetricsSummary>> {
    let routers = state.repository.list_routers().await?;

    let mut total_clients = 0u32;
    for router in &routers {
        if let Some(latest) = state.repository.list_metrics(router.id, 1, None).await?.into_iter().next() {
            total_clients += latest.wireless_clients;
        }
    }

    Ok(Json(MetricsSummary {
        total_routers: routers.len(),
        online_routers: routers.iter().filter(|r| r.status == RouterStatus::Online).count(),
        offline_routers: routers.iter().filter(|r| r.status == RouterStatus::Offline).count(),
        unknown_routers: routers.iter().filter(|r| r.status == RouterStatus::Unknown).count(),
        total_clients,
    }))
}

fn available_intervals() -> BTreeMap<String, String> {
    [
        ("EVERY_MINUTE", scheduler::EVERY_MINUTE),
        ("EVERY_5_MINUTES", scheduler::EVERY_5_MINUTES),
        ("EVERY_15_MINUTES", scheduler::EVERY_15_MINUTES),
        ("EVERY_30_MINUTES", scheduler::EVERY_30_MINUTES),
        ("HOURLY", scheduler::HOURLY),
        ("DAILY", scheduler::DAILY),
    ]
    .into_iter()
    .map(|(label, cron)| (label.to_string(), cron.to_string()))
    .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfigResponse {
    pub current_interval: String,
    pub available_intervals: BTreeMap<String, String>,
    pub status: String,
}

pub async fn get_metrics_config(State(state): State<AppState>) -> Json<MetricsConfigResponse> {
    let scheduler = state.scheduler.lock().await;
    Json(MetricsConfigResponse {
        current_interval: scheduler.current_interval().to_string(),
        available_intervals: available_intervals(),
        status: "ok".to_string(),
    })
}

#[derive(Deserialize)]
pub struct SetMetricsConfigRequest {
    pub interval: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMetricsConfigResponse {
    pub current_interval: String,
}

pub async fn set_metrics_config(
    State(state): State<AppState>,
    Json(req): Json<SetMetricsConfigRequest>,
) -> AppResult<Json<SetMetricsConfigResponse>> {
    let mut scheduler = state.scheduler.lock().await;
    scheduler
        .reconfigure_interval(&req.interval)
        .await
        .map_err(|e| AppError::InternalFailure(e.to_string()))?;
    Ok(Json(SetMetricsConfigResponse { current_interval: scheduler.current_interval().to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_dotted_quad() {
        assert!(validate_ipv4("192.168.1.1"));
        assert!(!validate_ipv4("not-an-ip"));
        assert!(!validate_ipv4("192.168.1.999"));
    }

    #[test]
    fn parses_hours_and_days() {
        assert_eq!(parse_timespan("24h"), Some(chrono::Duration::hours(24)));
        assert_eq!(parse_timespan("7d"), Some(chrono::Duration::days(7)));
        assert_eq!(parse_timespan("bogus"), None);
    }
}
