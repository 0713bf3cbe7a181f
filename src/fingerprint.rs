//! Fingerprinter: given an IP and credentials, decides whether the host is a
//! target-class router and extracts hostname + primary MAC.
//!
//! Both modes use the same underlying idiom — a list of candidate commands,
//! each independently fallible, first success wins — generalised from the
//! sequential-fallback shape the auth layer uses for its own alternatives.

use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::models::{normalize_mac, DiscoveredDevice};
use crate::ssh::{AuthMethod, SshClient, SshConfig};

const QUICK_BUDGET: Duration = Duration::from_millis(3_500);
const EXTENDED_BUDGET: Duration = Duration::from_millis(8_000);
const OPEN_OPEN_TIMEOUT: Duration = Duration::from_secs(3);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

const ROUTER_MARKERS: [&str; 3] = ["openwrt", "lede", "distrib_"];

fn mac_pattern() -> Regex {
    Regex::new(r"(?i)([0-9a-f]{2}[:\-]){5}[0-9a-f]{2}").unwrap()
}

fn extract_mac(text: &str) -> Option<String> {
    let re = mac_pattern();
    re.find(text).and_then(|m| normalize_mac(m.as_str()))
}

fn last_octet(ip: &str) -> &str {
    ip.rsplit('.').next().unwrap_or(ip)
}

/// Best-effort, degraded device record used whenever the shell never opens.
fn degraded_device(ip: &str, note: impl Into<String>) -> DiscoveredDevice {
    DiscoveredDevice {
        ip_address: ip.to_string(),
        hostname: format!("Router-{}", last_octet(ip)),
        mac_address: None,
        is_open_wrt: true,
        note: Some(note.into()),
        ssh_success: false,
        exists: false,
    }
}

/// Quick fingerprint: one session, one combined command, budget 3.5s total.
pub async fn fingerprint_quick(ip: &str, port: u16, username: &str, auth: AuthMethod) -> DiscoveredDevice {
    let result = tokio::time::timeout(QUICK_BUDGET, async {
        let config = SshConfig::new(ip, port, username, auth).with_timeout(2);
        let session = SshClient::new(config).connect().await?;
        session.open(Duration::from_secs(1)).await?;

        let command = "hostname; cat /etc/openwrt_release 2>/dev/null || cat /etc/os-release 2>/dev/null; ip link show | grep link/ether | head -1";
        let output = session.run(command, COMMAND_TIMEOUT).await?;
        session.close().await;
        Ok::<_, crate::ssh::SshError>(output.stdout)
    })
    .await;

    match result {
        Ok(Ok(output)) => parse_quick_output(ip, &output),
        Ok(Err(e)) => {
            debug!("quick fingerprint shell failed for {}: {}", ip, e);
            degraded_device(ip, format!("shell unavailable: {}", e))
        }
        Err(_) => {
            debug!("quick fingerprint timed out for {}", ip);
            degraded_device(ip, "fingerprint timed out")
        }
    }
}

fn parse_quick_output(ip: &str, output: &str) -> DiscoveredDevice {
    let hostname = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string();

    let lower = output.to_lowercase();
    let is_open_wrt = ROUTER_MARKERS.iter().any(|m| lower.contains(m));
    let mac_address = extract_mac(output);

    DiscoveredDevice {
        ip_address: ip.to_string(),
        hostname,
        mac_address,
        is_open_wrt,
        note: None,
        ssh_success: true,
        exists: false,
    }
}

struct FallbackChain<'a> {
    commands: &'a [&'a str],
}

impl<'a> FallbackChain<'a> {
    async fn first_success(
        &self,
        session: &crate::ssh::SshSession,
        accept: impl Fn(&str) -> bool,
    ) -> Option<String> {
        for cmd in self.commands {
            match session.run(cmd, COMMAND_TIMEOUT).await {
                Ok(output) => {
                    let trimmed = output.stdout.trim();
                    if !trimmed.is_empty() && accept(trimmed) {
                        return Some(trimmed.to_string());
                    }
                }
                Err(e) => {
                    debug!("fallback command '{}' failed: {}", cmd, e);
                }
            }
        }
        None
    }
}

const HOSTNAME_CHAIN: [&str; 5] = [
    "cat /proc/sys/kernel/hostname",
    "hostname",
    "uci get system.@system[0].hostname",
    "cat /etc/config/system | grep hostname | cut -d \"'\" -f 2",
    "cat /etc/hostname",
];

const ROUTER_CLASS_CHAIN: [&str; 4] = [
    "cat /etc/openwrt_release",
    "cat /etc/os-release | grep -i openwrt",
    "ubus call system board",
    "uci show system.@system[0]",
];

const MAC_CHAIN: [&str; 3] = [
    "ip link show | grep link/ether | awk '{print $2}' | head -1",
    "ifconfig | grep -E \"HWaddr|ether\" | head -1",
    "cat /sys/class/net/br-lan/address || cat /sys/class/net/eth0/address || cat /sys/class/net/wlan0/address",
];

/// Extended fingerprint: three independent fallback chains, budget 8s total.
/// Used for hosts that didn't answer the quick check but are strongly
/// suspected to be alive (hinted hosts).
pub async fn fingerprint_extended(ip: &str, port: u16, username: &str, auth: AuthMethod) -> DiscoveredDevice {
    let result = tokio::time::timeout(EXTENDED_BUDGET, async {
        let config = SshConfig::new(ip, port, username, auth).with_timeout(3);
        let session = SshClient::new(config).connect().await?;
        session.open(OPEN_OPEN_TIMEOUT).await?;

        let hostname_chain = FallbackChain { commands: &HOSTNAME_CHAIN };
        let hostname = hostname_chain.first_success(&session, |_| true).await;

        let class_chain = FallbackChain { commands: &ROUTER_CLASS_CHAIN };
        let class_output = class_chain.first_success(&session, |_| true).await;

        let mac_chain = FallbackChain { commands: &MAC_CHAIN };
        let mac_output = mac_chain.first_success(&session, |s| extract_mac(s).is_some()).await;

        session.close().await;
        Ok::<_, crate::ssh::SshError>((hostname, class_output, mac_output))
    })
    .await;

    match result {
        Ok(Ok((hostname, class_output, mac_output))) => {
            let is_open_wrt = class_output
                .as_deref()
                .map(|s| {
                    let lower = s.to_lowercase();
                    ROUTER_MARKERS.iter().any(|m| lower.contains(m))
                })
                .unwrap_or(false);
            DiscoveredDevice {
                ip_address: ip.to_string(),
                hostname: hostname.unwrap_or_default(),
                mac_address: mac_output.as_deref().and_then(extract_mac),
                is_open_wrt,
                note: None,
                ssh_success: true,
                exists: false,
            }
        }
        Ok(Err(e)) => {
            warn!("extended fingerprint shell failed for {}: {}", ip, e);
            degraded_device(ip, format!("shell unavailable: {}", e))
        }
        Err(_) => {
            warn!("extended fingerprint timed out for {}", ip);
            degraded_device(ip, "fingerprint timed out")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openwrt_marker_and_hostname() {
        let output = "my-router\nDISTRIB_ID='OpenWrt'\nlink/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff";
        let device = parse_quick_output("192.168.1.1", output);
        assert_eq!(device.hostname, "my-router");
        assert!(device.is_open_wrt);
        assert_eq!(device.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn non_router_output_is_not_flagged() {
        let output = "some-ubuntu-host\nNAME=\"Ubuntu\"\n";
        let device = parse_quick_output("192.168.1.5", output);
        assert!(!device.is_open_wrt);
        assert!(device.mac_address.is_none());
    }

    #[test]
    fn degraded_device_uses_last_octet() {
        let device = degraded_device("192.168.1.42", "no shell");
        assert_eq!(device.hostname, "Router-42");
        assert!(!device.ssh_success);
        assert!(device.is_open_wrt);
    }

    #[test]
    fn extracts_mac_with_dash_separators() {
        assert_eq!(
            extract_mac("HWaddr AA-BB-CC-DD-EE-FF"),
            Some("aa:bb:cc:dd:ee:ff".to_string())
        );
    }
}
