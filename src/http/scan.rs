//! `/scanner/*` handlers: kick off a subnet scan, poll its job, and the
//! single/multi "force add" endpoints for hosts already known by IP.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::fingerprint;
use crate::models::{
    default_retention_days, default_ssh_port, normalize_subnet, Credentials, DiscoveredDevice, Router, RouterStatus,
    RouterView, ScanJobStatus, ScanResult,
};
use crate::scanner;
use crate::ssh::AuthMethod;

const SCAN_DEADLINE: Duration = Duration::from_secs(10 * 60);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub subnet: String,
    #[serde(default)]
    pub hints: Vec<u8>,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanResponse {
    pub status: String,
    pub job_id: String,
    pub subnet: String,
    pub timestamp: DateTime<Utc>,
}

fn auth_from(password: &Option<String>, ssh_key: &Option<String>) -> AuthMethod {
    match ssh_key {
        Some(key) => AuthMethod::key(key.clone(), None),
        None => AuthMethod::password(password.clone().unwrap_or_default()),
    }
}

pub async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> AppResult<Json<StartScanResponse>> {
    if req.password.is_none() && req.ssh_key.is_none() {
        return Err(AppError::InvalidInput("at least one of password or sshKey is required".to_string()));
    }

    let subnet = normalize_subnet(&req.subnet);
    let job = state.registry.create(subnet.clone());
    let job_id = job.id.clone();

    let registry = state.registry.clone();
    let username = req.username.clone();
    let password = req.password.clone();
    let ssh_key = req.ssh_key.clone();
    let hints = req.hints.clone();

    tokio::spawn(async move {
        registry.start(&job_id);
        let run = async {
            registry.update_progress(&job_id, 10, "collecting candidates");
            let candidates = scanner::collect_candidates(&subnet, &hints).await;

            registry.update_progress(&job_id, 60, "fingerprinting candidates");
            let devices = scanner::fingerprint_candidates(&subnet, &candidates.ips, &hints, &username, || {
                auth_from(&password, &ssh_key)
            })
            .await;

            (devices, candidates.partial)
        };

        match tokio::time::timeout(SCAN_DEADLINE, run).await {
            Ok((devices, partial_scan)) => {
                registry.complete(&job_id, ScanResult { devices, partial_scan });
            }
            Err(_) => {
                registry.fail(&job_id, "timed out");
            }
        }
    });

    Ok(Json(StartScanResponse {
        status: "accepted".to_string(),
        job_id: job.id.clone(),
        subnet: job.subnet.clone(),
        timestamp: job.created_at,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJobResponse {
    pub status: ScanJobStatus,
    pub progress: u8,
    pub subnet: String,
    pub message: String,
    pub devices: Vec<DiscoveredDevice>,
    pub devices_found: usize,
    pub partial_scan: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub async fn get_scan(State(state): State<AppState>, Path(job_id): Path<String>) -> AppResult<Json<ScanJobResponse>> {
    let job = state.registry.get(&job_id).ok_or(AppError::NotFound)?;

    let mut devices = job.result.as_ref().map(|r| r.devices.clone()).unwrap_or_default();
    for device in &mut devices {
        device.exists = state
            .repository
            .find_router_by_mac_or_ip(device.mac_address.as_deref(), Some(&device.ip_address), None)
            .await?
            .is_some();
    }
    let partial_scan = job.result.as_ref().map(|r| r.partial_scan).unwrap_or(false);
    let devices_found = devices.len();

    Ok(Json(ScanJobResponse {
        status: job.status,
        progress: job.progress,
        subnet: job.subnet,
        message: job.message,
        devices,
        devices_found,
        partial_scan,
        error: job.error,
        timestamp: job.updated_at,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDeviceRequest {
    pub ip_address: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
}

/// Fingerprints the host, then upserts a Router for it: an existing Router
/// matched by MAC, then IP, then hostname is updated in place; otherwise a
/// new one is created. Returns the Router plus whether it was an update.
async fn upsert_discovered_router(state: &AppState, req: AddDeviceRequest) -> AppResult<(Router, bool)> {
    if req.password.is_none() && req.ssh_key.is_none() {
        return Err(AppError::InvalidInput("at least one of password or sshKey is required".to_string()));
    }

    let auth = auth_from(&req.password, &req.ssh_key);
    let device = fingerprint::fingerprint_extended(&req.ip_address, default_ssh_port(), &req.username, auth).await;

    let hostname = req.hostname.clone().unwrap_or_else(|| device.hostname.clone());
    let mac_address = req.mac_address.clone().or_else(|| device.mac_address.clone());

    let existing = state
        .repository
        .find_router_by_mac_or_ip(mac_address.as_deref(), Some(&req.ip_address), Some(&hostname))
        .await?;

    let now = Utc::now();
    let status = if device.ssh_success { RouterStatus::Online } else { RouterStatus::Unknown };
    let credentials = Credentials { username: req.username, password: req.password, ssh_key: req.ssh_key };

    match existing {
        Some(mut router) => {
            router.ip_address = req.ip_address;
            router.hostname = hostname;
            router.mac_address = mac_address.or(router.mac_address);
            router.credentials = credentials;
            router.status = status;
            if device.ssh_success {
                router.last_seen = Some(now);
            }
            router.updated_at = now;
            let updated = state.repository.update_router(router).await?;
            Ok((updated, true))
        }
        None => {
            let name = req.name.unwrap_or_else(|| if hostname.is_empty() { device.ip_address.clone() } else { hostname.clone() });
            let router = Router {
                id: Uuid::new_v4(),
                name,
                ip_address: req.ip_address,
                hostname,
                mac_address,
                ssh_port: default_ssh_port(),
                credentials,
                monitoring_enabled: true,
                metrics_retention_days: default_retention_days(),
                status,
                last_seen: if device.ssh_success { Some(now) } else { None },
                created_at: now,
                updated_at: now,
            };
            let created = state.repository.create_router(router).await?;
            Ok((created, false))
        }
    }
}

pub async fn add_device(State(state): State<AppState>, Json(req): Json<AddDeviceRequest>) -> AppResult<Json<RouterView>> {
    let (router, _was_update) = upsert_discovered_router(&state, req).await?;
    Ok(Json(router.into()))
}

#[derive(Deserialize)]
pub struct AddMultipleRequest {
    pub devices: Vec<AddDeviceRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMultipleSummary {
    pub added: usize,
    pub updated: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFailure {
    pub ip_address: String,
    pub reason: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMultipleResponse {
    pub summary: AddMultipleSummary,
    pub added: Vec<RouterView>,
    pub updated: Vec<RouterView>,
    pub failed: Vec<AddFailure>,
}

/// Upserts each listed device in turn. Sequential rather than fanned-out:
/// concurrent upserts racing against the same IP/MAC could both see "no
/// existing router" and create duplicates instead of one create + one update.
pub async fn add_multiple(
    State(state): State<AppState>,
    Json(req): Json<AddMultipleRequest>,
) -> AppResult<Json<AddMultipleResponse>> {
    let total = req.devices.len();
    let mut added = Vec::new();
    let mut updated = Vec::new();
    let mut failed = Vec::new();

    for device_req in req.devices {
        let ip_address = device_req.ip_address.clone();
        match upsert_discovered_router(&state, device_req).await {
            Ok((router, true)) => updated.push(router.into()),
            Ok((router, false)) => added.push(router.into()),
            Err(e) => failed.push(AddFailure { ip_address, reason: e.to_string() }),
        }
    }

    Ok(Json(AddMultipleResponse {
        summary: AddMultipleSummary { added: added.len(), updated: updated.len(), failed: failed.len(), total },
        added,
        updated,
        failed,
    }))
}
