//! Collector: runs the metric battery against a known router and returns a
//! structurally-complete Metric, tolerating per-command failure.
//!
//! Grounded in the persistent-shell sampling idiom: one shell channel, a
//! battery of small commands, marker-delimited reads, and a result record
//! whose absent sub-fields take their zero value rather than propagating
//! `None` downstream.

use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{normalize_mac, DiskUsage, InterfaceStatus, MemoryUsage, Metric, NetworkInterface, Router, RouterStatus};
use crate::probe::{probe_tcp, ProbeOutcome};
use crate::ssh::{SshClient, SshConfig, SshSession};

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(2);
const SHELL_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(4);

/// Outcome of collecting one router's telemetry: either a populated metric
/// or a sentinel, paired with the status the Router should transition to.
pub struct CollectionOutcome {
    pub metric: Metric,
    pub status: RouterStatus,
}

pub async fn collect(router: &Router) -> CollectionOutcome {
    if probe_tcp(&router.ip_address, router.ssh_port, REACHABILITY_TIMEOUT).await != ProbeOutcome::Open {
        return CollectionOutcome {
            metric: Metric::sentinel(router.id, "Device not reachable"),
            status: RouterStatus::Offline,
        };
    }

    let config = SshConfig::new(
        router.ip_address.as_str(),
        router.ssh_port,
        router.credentials.username.as_str(),
        router.credentials.effective_auth(),
    )
    .with_timeout(REACHABILITY_TIMEOUT.as_secs());

    let session = match SshClient::new(config).connect().await {
        Ok(s) => s,
        Err(e) => {
            warn!("shell unavailable for router {}: {}", router.id, e);
            return CollectionOutcome {
                metric: Metric::sentinel(router.id, "SSH connection failed"),
                status: RouterStatus::Online,
            };
        }
    };

    if let Err(e) = session.open(SHELL_OPEN_TIMEOUT).await {
        warn!("shell unavailable for router {}: {}", router.id, e);
        return CollectionOutcome {
            metric: Metric::sentinel(router.id, "SSH connection failed"),
            status: RouterStatus::Online,
        };
    }

    let metric = run_battery(router.id, &session).await;
    session.close().await;

    CollectionOutcome {
        metric,
        status: RouterStatus::Online,
    }
}

async fn run_one(session: &SshSession, command: &str) -> Option<String> {
    match session.run(command, COMMAND_TIMEOUT).await {
        Ok(output) => Some(output.stdout),
        Err(e) => {
            debug!("collector command '{}' failed: {}", command, e);
            None
        }
    }
}

async fn run_battery(router_id: Uuid, session: &SshSession) -> Metric {
    let uptime = run_one(session, "uptime")
        .await
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let memory_usage = collect_memory(session).await;
    let cpu_load = collect_cpu_load(session).await;
    let disk_usage = collect_disk(session).await;
    let network_interfaces = collect_interfaces(session).await;
    let wireless_clients = collect_wireless_clients(session).await;

    Metric {
        id: Uuid::new_v4(),
        router_id,
        timestamp: chrono::Utc::now(),
        uptime,
        cpu_load,
        memory_usage,
        disk_usage,
        network_interfaces,
        wireless_clients,
        error: None,
    }
}

// ─── Memory ─────────────────────────────────────────────────────────────

async fn collect_memory(session: &SshSession) -> MemoryUsage {
    if let Some(raw) = run_one(session, "cat /proc/meminfo").await {
        if let Some(usage) = parse_meminfo(&raw) {
            return usage;
        }
    }
    if let Some(raw) = run_one(session, "free | grep Mem").await {
        if let Some(usage) = parse_free(&raw) {
            return usage;
        }
    }
    MemoryUsage::default()
}

fn extract_kb(raw: &str, key: &str) -> Option<u64> {
    raw.lines()
        .find(|l| l.trim_start().starts_with(key))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

fn parse_meminfo(raw: &str) -> Option<MemoryUsage> {
    let total_kb = extract_kb(raw, "MemTotal:")?;
    let free_kb = extract_kb(raw, "MemFree:").unwrap_or(0);
    let available_kb = extract_kb(raw, "MemAvailable:").unwrap_or(0);
    let buffers_kb = extract_kb(raw, "Buffers:").unwrap_or(0);
    let cached_kb = extract_kb(raw, "Cached:").unwrap_or(0);

    let effective_free_kb = if available_kb > 0 {
        available_kb
    } else {
        free_kb + buffers_kb + cached_kb
    };
    let used_kb = total_kb.saturating_sub(effective_free_kb);
    let percentage = if total_kb > 0 {
        ((used_kb as f64 / total_kb as f64) * 100.0).round()
    } else {
        0.0
    };

    Some(MemoryUsage {
        total_kb,
        free_kb: effective_free_kb,
        used_kb,
        percentage,
    })
}

/// Parses the `free | grep Mem` fallback line:
/// `Mem:  total  used  free  shared  buff/cache  available`
fn parse_free(raw: &str) -> Option<MemoryUsage> {
    let line = raw.lines().next()?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let total_kb: u64 = parts[1].parse().ok()?;
    let used_kb: u64 = parts[2].parse().ok()?;
    let free_kb: u64 = parts[3].parse().ok()?;
    let percentage = if total_kb > 0 {
        ((used_kb as f64 / total_kb as f64) * 100.0).round()
    } else {
        0.0
    };
    Some(MemoryUsage {
        total_kb,
        free_kb,
        used_kb,
        percentage,
    })
}

// ─── CPU load ───────────────────────────────────────────────────────────

async fn collect_cpu_load(session: &SshSession) -> f64 {
    if let Some(raw) = run_one(session, "cat /proc/loadavg").await {
        if let Some(load) = parse_loadavg(&raw) {
            return load;
        }
    }
    if let Some(raw) = run_one(session, "uptime").await {
        if let Some(load) = parse_uptime_load(&raw) {
            return load;
        }
    }
    if let Some(raw) = run_one(session, "top -bn1 | grep %Cpu | awk '{print $2}'").await {
        if let Ok(pct) = raw.trim().parse::<f64>() {
            return pct / 100.0;
        }
    }
    0.0
}

fn parse_loadavg(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

fn parse_uptime_load(raw: &str) -> Option<f64> {
    let re = Regex::new(r"load average:\s*([0-9.]+)").ok()?;
    let caps = re.captures(raw)?;
    caps.get(1)?.as_str().parse().ok()
}

// ─── Disk ───────────────────────────────────────────────────────────────

async fn collect_disk(session: &SshSession) -> DiskUsage {
    if let Some(raw) = run_one(session, "df -h / | tail -n 1").await {
        if let Some(usage) = parse_df(&raw) {
            return usage;
        }
    }
    DiskUsage::default()
}

/// Parses a `df -h` data line, e.g. `rootfs 98.3M 49.1M 49.2M 50% /`.
fn parse_df(raw: &str) -> Option<DiskUsage> {
    let line = raw.trim();
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }
    let total_raw = parts[1].to_string();
    let used_raw = parts[2].to_string();
    let free_raw = parts[3].to_string();
    let percentage: f64 = parts[4].trim_end_matches('%').parse().ok()?;

    let total_bytes = parse_size(&total_raw)?;
    let used_bytes = parse_size(&used_raw)?;
    let free_bytes = parse_size(&free_raw)?;

    Some(DiskUsage {
        total_bytes,
        free_bytes,
        used_bytes,
        percentage,
        total_raw,
        free_raw,
        used_raw,
    })
}

/// Parses a human-readable size like `98.3M`, `1.2G`, `512KB`, `2TB` into
/// bytes, 1024-based, case-insensitive.
fn parse_size(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let unit_start = raw.find(|c: char| c.is_alphabetic())?;
    let (number_part, unit_part) = raw.split_at(unit_start);
    let number: f64 = number_part.parse().ok()?;
    let unit = unit_part.to_uppercase();
    let unit = unit.trim_end_matches('B');

    let multiplier: f64 = match unit {
        "" => 1.0,
        "K" => 1024.0,
        "M" => 1024.0_f64.powi(2),
        "G" => 1024.0_f64.powi(3),
        "T" => 1024.0_f64.powi(4),
        _ => return None,
    };

    Some((number * multiplier).round() as u64)
}

// ─── Network interfaces ─────────────────────────────────────────────────

async fn collect_interfaces(session: &SshSession) -> Vec<NetworkInterface> {
    if let Some(raw) = run_one(session, "ifconfig").await {
        let interfaces = parse_ifconfig(&raw);
        if !interfaces.is_empty() {
            return interfaces;
        }
    }
    collect_interfaces_via_ip(session).await
}

/// Fallback for images without net-tools: list interfaces via `ip link show`,
/// then fill in IPv4/MAC per interface via `ip addr show <iface>`, falling
/// back further to `/sys/class/net/<iface>/address` for the MAC alone. RX/TX
/// byte counters are left at zero — neither `ip` subcommand surfaces them.
async fn collect_interfaces_via_ip(session: &SshSession) -> Vec<NetworkInterface> {
    let Some(link_raw) = run_one(session, "ip link show").await else {
        return Vec::new();
    };

    let mut interfaces = Vec::new();
    for (name, up) in parse_ip_link_entries(&link_raw) {
        let addr_raw = run_one(session, &format!("ip addr show {}", name)).await.unwrap_or_default();
        let ipv4 = extract_ipv4_from_ip_output(&addr_raw);

        let mac = match extract_mac_from_ip_output(&addr_raw) {
            Some(mac) => Some(mac),
            None => run_one(session, &format!("cat /sys/class/net/{}/address", name))
                .await
                .and_then(|raw| normalize_mac(raw.trim())),
        };

        interfaces.push(NetworkInterface {
            name,
            ipv4,
            mac,
            rx_bytes: 0,
            tx_bytes: 0,
            status: if up { InterfaceStatus::Up } else { InterfaceStatus::Down },
        });
    }
    interfaces
}

/// Parses `ip link show` header lines (`N: name: <FLAGS,...> ...`) into
/// `(name, is_up)` pairs.
fn parse_ip_link_entries(raw: &str) -> Vec<(String, bool)> {
    let header_re = Regex::new(r"^\d+:\s+([^:@\s]+)(?:@\S+)?:\s+<([^>]*)>").unwrap();
    raw.lines()
        .filter_map(|line| {
            let caps = header_re.captures(line.trim_start())?;
            Some((caps[1].to_string(), caps[2].contains("UP")))
        })
        .collect()
}

fn extract_ipv4_from_ip_output(raw: &str) -> Option<String> {
    let re = Regex::new(r"inet ([0-9.]+)").unwrap();
    re.captures(raw).map(|c| c[1].to_string())
}

fn extract_mac_from_ip_output(raw: &str) -> Option<String> {
    let re = Regex::new(r"link/ether ([0-9a-fA-F:]{17})").unwrap();
    re.captures(raw).and_then(|c| normalize_mac(&c[1]))
}

/// Parses `ifconfig`'s per-interface block format. Interfaces are separated
/// by blank lines; a new block starts at column 0.
fn parse_ifconfig(raw: &str) -> Vec<NetworkInterface> {
    let ipv4_re = Regex::new(r"inet (?:addr:)?([0-9.]+)").unwrap();
    let mac_re = Regex::new(r"(?i)(?:ether|HWaddr|link/ether) ([0-9a-f:]{17})").unwrap();
    let rx_re = Regex::new(r"RX bytes:(\d+)").unwrap();
    let tx_re = Regex::new(r"TX bytes:(\d+)").unwrap();

    let mut interfaces = Vec::new();
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        if !line.starts_with(char::is_whitespace) && !line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    for block in blocks {
        let name = block.split_whitespace().next().unwrap_or("").trim_end_matches(':').to_string();
        if name.is_empty() {
            continue;
        }
        let ipv4 = ipv4_re.captures(&block).map(|c| c[1].to_string());
        let mac = mac_re.captures(&block).map(|c| c[1].to_lowercase());
        let rx_bytes = rx_re.captures(&block).and_then(|c| c[1].parse().ok()).unwrap_or(0);
        let tx_bytes = tx_re.captures(&block).and_then(|c| c[1].parse().ok()).unwrap_or(0);
        let status = if block.contains("UP") {
            InterfaceStatus::Up
        } else {
            InterfaceStatus::Down
        };

        interfaces.push(NetworkInterface {
            name,
            ipv4,
            mac,
            rx_bytes,
            tx_bytes,
            status,
        });
    }

    interfaces
}

// ─── Wireless clients ───────────────────────────────────────────────────

async fn collect_wireless_clients(session: &SshSession) -> u32 {
    if run_one(session, "which iw").await.map(|s| !s.trim().is_empty()).unwrap_or(false) {
        if let Some(raw) = run_one(session, "iw dev wlan0 station dump | grep Station | wc -l").await {
            if let Ok(count) = raw.trim().parse() {
                return count;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_meminfo_seed_scenario() {
        let raw = "MemTotal: 64000 kB\nMemFree: 8000 kB\nMemAvailable: 16000 kB\nBuffers: 2000 kB\nCached: 4000 kB";
        let usage = parse_meminfo(raw).unwrap();
        assert_eq!(usage.total_kb, 64000);
        assert_eq!(usage.free_kb, 16000);
        assert_eq!(usage.used_kb, 48000);
        assert_eq!(usage.percentage, 75.0);
    }

    #[test]
    fn meminfo_falls_back_to_free_plus_buffers_when_available_absent() {
        let raw = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 50 kB";
        let usage = parse_meminfo(raw).unwrap();
        assert_eq!(usage.free_kb, 200);
        assert_eq!(usage.used_kb, 800);
    }

    #[test]
    fn parses_df_seed_scenario() {
        let usage = parse_df("rootfs 98.3M 49.1M 49.2M 50% /").unwrap();
        assert_eq!(usage.percentage, 50.0);
        assert_eq!(usage.total_raw, "98.3M");
        assert_eq!(usage.used_raw, "49.1M");
        let expected = 49.1 * 1024.0 * 1024.0;
        let diff = (usage.used_bytes as f64 - expected).abs() / expected;
        assert!(diff < 0.01);
    }

    #[test]
    fn parse_size_accepts_all_accepted_units() {
        assert_eq!(parse_size("1K"), Some(1024));
        assert_eq!(parse_size("1KB"), Some(1024));
        assert_eq!(parse_size("1M"), Some(1024 * 1024));
        assert_eq!(parse_size("1G"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size("1g"), Some(1024 * 1024 * 1024));
    }

    #[test]
    fn parses_loadavg_first_field() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 2/345 12345"), Some(0.52));
    }

    #[test]
    fn parses_uptime_load_average_fallback() {
        let raw = "10:00:00 up 1 day, 2:03, 1 user, load average: 0.15, 0.20, 0.18";
        assert_eq!(parse_uptime_load(raw), Some(0.15));
    }

    #[test]
    fn parses_ifconfig_block_excludes_lo_fields_correctly() {
        let raw = "eth0      Link encap:Ethernet  HWaddr AA:BB:CC:DD:EE:FF\n          inet addr:192.168.1.1  Bcast:192.168.1.255  Mask:255.255.255.0\n          UP BROADCAST RUNNING MULTICAST  MTU:1500  Metric:1\n          RX bytes:123456 (120.5 KiB)  TX bytes:654321 (639.0 KiB)\n\n";
        let interfaces = parse_ifconfig(raw);
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].name, "eth0");
        assert_eq!(interfaces[0].ipv4.as_deref(), Some("192.168.1.1"));
        assert_eq!(interfaces[0].mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(interfaces[0].rx_bytes, 123456);
        assert_eq!(interfaces[0].status, InterfaceStatus::Up);
    }

    #[test]
    fn parses_ip_link_show_entries() {
        let raw = "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN\n2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc pfifo_fast state UP\n3: wlan0: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN";
        let entries = parse_ip_link_entries(raw);
        assert_eq!(entries, vec![
            ("lo".to_string(), true),
            ("eth0".to_string(), true),
            ("wlan0".to_string(), false),
        ]);
    }

    #[test]
    fn extracts_ipv4_and_mac_from_ip_addr_show() {
        let raw = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc pfifo_fast state UP\n    link/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff\n    inet 192.168.1.1/24 brd 192.168.1.255 scope global eth0";
        assert_eq!(extract_ipv4_from_ip_output(raw), Some("192.168.1.1".to_string()));
        assert_eq!(extract_mac_from_ip_output(raw), Some("aa:bb:cc:dd:ee:ff".to_string()));
    }
}
