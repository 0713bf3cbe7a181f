//! Data model shared across the engine: Router, Metric, ScanJob, and the
//! scan-time DiscoveredDevice descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A router's observed reachability state. Transitions are one-way: once a
/// Router is seen `Online` or `Offline` it never reverts to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterStatus {
    Online,
    Offline,
    Unknown,
}

impl Default for RouterStatus {
    fn default() -> Self {
        RouterStatus::Unknown
    }
}

/// Credential material for a Router. When both are present the key wins —
/// callers should check `effective_auth` rather than branch on the fields
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
}

impl Credentials {
    /// The auth method that wins when both password and key are set: the key.
    pub fn effective_auth(&self) -> crate::ssh::AuthMethod {
        match &self.ssh_key {
            Some(key) => crate::ssh::AuthMethod::key(key.clone(), None),
            None => crate::ssh::AuthMethod::password(self.password.clone().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    pub id: Uuid,
    pub name: String,
    pub ip_address: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub credentials: Credentials,
    #[serde(default = "default_true")]
    pub monitoring_enabled: bool,
    #[serde(default = "default_retention_days")]
    pub metrics_retention_days: u16,
    pub status: RouterStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Router as returned over the wire: identical to `Router` but with
/// `credentials` dropped so a stored password or key never serializes back
/// to a caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterView {
    pub id: Uuid,
    pub name: String,
    pub ip_address: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub ssh_port: u16,
    pub monitoring_enabled: bool,
    pub metrics_retention_days: u16,
    pub status: RouterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Router> for RouterView {
    fn from(r: Router) -> Self {
        Self {
            id: r.id,
            name: r.name,
            ip_address: r.ip_address,
            hostname: r.hostname,
            mac_address: r.mac_address,
            ssh_port: r.ssh_port,
            monitoring_enabled: r.monitoring_enabled,
            metrics_retention_days: r.metrics_retention_days,
            status: r.status,
            last_seen: r.last_seen,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub fn default_ssh_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

pub fn default_retention_days() -> u16 {
    30
}

/// Normalises a MAC address to lower-case colon form, e.g. `AA-BB-CC-DD-EE-FF`
/// → `aa:bb:cc:dd:ee:ff`. Returns `None` if the input has the wrong shape.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let cleaned: String = mac
        .trim()
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect();
    if cleaned.len() != 12 {
        return None;
    }
    let lower = cleaned.to_lowercase();
    Some(
        lower
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).unwrap())
            .collect::<Vec<_>>()
            .join(":"),
    )
}

/// Clamp metricsRetentionDays into the accepted [1, 365] range.
pub fn clamp_retention_days(days: u16) -> u16 {
    days.clamp(1, 365)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    #[serde(rename = "totalKB")]
    pub total_kb: u64,
    #[serde(rename = "freeKB")]
    pub free_kb: u64,
    #[serde(rename = "usedKB")]
    pub used_kb: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub percentage: f64,
    pub total_raw: String,
    pub free_raw: String,
    pub used_raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub status: InterfaceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: Uuid,
    pub router_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub uptime: String,
    pub cpu_load: f64,
    pub memory_usage: MemoryUsage,
    pub disk_usage: DiskUsage,
    pub network_interfaces: Vec<NetworkInterface>,
    pub wireless_clients: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Metric {
    /// A structurally-complete sentinel metric: every sub-field at its zero
    /// value, with `error` describing why no real telemetry was collected.
    pub fn sentinel(router_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            router_id,
            timestamp: Utc::now(),
            uptime: String::new(),
            cpu_load: 0.0,
            memory_usage: MemoryUsage::default(),
            disk_usage: DiskUsage::default(),
            network_interfaces: Vec::new(),
            wireless_clients: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanJobStatus {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub ip_address: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub is_open_wrt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub ssh_success: bool,
    #[serde(default)]
    pub exists: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub devices: Vec<DiscoveredDevice>,
    pub partial_scan: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub id: String,
    pub subnet: String,
    pub status: ScanJobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanJob {
    pub fn new_id() -> String {
        let now_ms = Utc::now().timestamp_millis();
        let rand: u32 = rand::random();
        format!("scan_{}_{:x}", now_ms, rand)
    }

    pub fn pending(subnet: String) -> Self {
        let now = Utc::now();
        Self {
            id: Self::new_id(),
            subnet,
            status: ScanJobStatus::Pending,
            created_at: now,
            updated_at: now,
            progress: 0,
            message: "queued".to_string(),
            result: None,
            error: None,
        }
    }
}

/// Normalises a subnet prefix to its trailing-dot form, e.g. `192.168.1` or
/// `192.168.1.` both become `192.168.1.`.
pub fn normalize_subnet(subnet: &str) -> String {
    let trimmed = subnet.trim().trim_end_matches('.');
    format!("{}.", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mac_from_dashes_and_uppercase() {
        assert_eq!(
            normalize_mac("AA-BB-CC-DD-EE-FF"),
            Some("aa:bb:cc:dd:ee:ff".to_string())
        );
    }

    #[test]
    fn rejects_short_mac() {
        assert_eq!(normalize_mac("AA:BB:CC"), None);
    }

    #[test]
    fn clamps_retention_days_to_bounds() {
        assert_eq!(clamp_retention_days(0), 1);
        assert_eq!(clamp_retention_days(400), 365);
        assert_eq!(clamp_retention_days(30), 30);
    }

    #[test]
    fn normalizes_subnet_with_and_without_trailing_dot() {
        assert_eq!(normalize_subnet("192.168.1"), "192.168.1.");
        assert_eq!(normalize_subnet("192.168.1."), "192.168.1.");
    }
}
