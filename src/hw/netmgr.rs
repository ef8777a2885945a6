//! NetworkManager (`nmcli`) adapter for the NetworkPresence capability.
//!
//! All queries use `nmcli -t` terse output. Parsing lives in free functions
//! so it can be unit-tested against captured output.

use std::collections::HashSet;
use std::process::Command;

use tracing::debug;

use super::traits::{NetworkPresence, WifiNetwork};
use crate::error::{Result, SentryError};

/// NetworkPresence over the NetworkManager CLI.
pub struct NmcliNetwork {
    interface: String,
}

impl NmcliNetwork {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    fn nmcli(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("nmcli")
            .args(args)
            .output()
            .map_err(|e| SentryError::network_error(format!("nmcli not runnable: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SentryError::network_error(format!(
                "nmcli {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl NetworkPresence for NmcliNetwork {
    fn is_connected(&self) -> bool {
        match self.nmcli(&["-t", "-f", "DEVICE,STATE", "device", "status"]) {
            Ok(out) => device_connected(&out, &self.interface),
            Err(e) => {
                debug!("connectivity check failed: {}", e);
                false
            }
        }
    }

    fn signal_strength(&self) -> Option<u8> {
        let out = self
            .nmcli(&["-t", "-f", "IN-USE,SSID,SIGNAL", "device", "wifi"])
            .ok()?;
        in_use_signal(&out)
    }

    fn start_access_point(&self, ssid: &str, password: &str) -> Result<()> {
        self.nmcli(&[
            "device",
            "wifi",
            "hotspot",
            "ifname",
            self.interface.as_str(),
            "ssid",
            ssid,
            "password",
            password,
        ])?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<WifiNetwork>> {
        // A failed rescan is not fatal; the list may just be stale.
        if let Err(e) = self.nmcli(&["device", "wifi", "rescan"]) {
            debug!("wifi rescan failed: {}", e);
        }
        let out = self.nmcli(&["-t", "-f", "SSID,SIGNAL,SECURITY", "device", "wifi", "list"])?;
        Ok(parse_scan(&out))
    }

    fn connect(&self, ssid: &str, password: &str) -> Result<()> {
        self.nmcli(&[
            "device",
            "wifi",
            "connect",
            ssid,
            "password",
            password,
            "ifname",
            self.interface.as_str(),
        ])?;
        Ok(())
    }
}

/// `nmcli -t -f DEVICE,STATE device status` → is `interface` connected.
fn device_connected(output: &str, interface: &str) -> bool {
    output.lines().any(|line| {
        let mut parts = line.trim().split(':');
        parts.next() == Some(interface) && parts.next() == Some("connected")
    })
}

/// `nmcli -t -f IN-USE,SSID,SIGNAL device wifi` → signal of the in-use row.
fn in_use_signal(output: &str) -> Option<u8> {
    output
        .lines()
        .find(|line| line.starts_with("*:"))
        .and_then(|line| line.split(':').nth(2))
        .and_then(|signal| signal.trim().parse().ok())
}

/// `nmcli -t -f SSID,SIGNAL,SECURITY device wifi list` → networks,
/// first occurrence wins per SSID.
fn parse_scan(output: &str) -> Vec<WifiNetwork> {
    let mut seen = HashSet::new();
    let mut networks = Vec::new();
    for line in output.lines() {
        let mut parts = line.splitn(3, ':');
        let ssid = parts.next().unwrap_or("").trim();
        let signal = parts.next().and_then(|s| s.trim().parse().ok());
        let security = parts.next().unwrap_or("").trim().to_string();
        if ssid.is_empty() || !seen.insert(ssid.to_string()) {
            continue;
        }
        networks.push(WifiNetwork {
            ssid: ssid.to_string(),
            signal,
            security,
        });
    }
    networks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_status_detects_connection() {
        let out = "lo:unmanaged\nwlan0:connected\neth0:unavailable\n";
        assert!(device_connected(out, "wlan0"));
        assert!(!device_connected(out, "eth0"));
        assert!(!device_connected(out, "wlan1"));
    }

    #[test]
    fn in_use_signal_reads_starred_row() {
        let out = ":HomeNet:54\n*:Workshop:87\n:Guest:31\n";
        assert_eq!(in_use_signal(out), Some(87));
        assert_eq!(in_use_signal(":OnlyIdle:42\n"), None);
    }

    #[test]
    fn scan_parses_and_dedupes() {
        let out = "Workshop:87:WPA2\nHomeNet:54:WPA2\nWorkshop:61:WPA2\n:17:\nOpenNet:12:\n";
        let networks = parse_scan(out);
        assert_eq!(networks.len(), 3);
        assert_eq!(networks[0].ssid, "Workshop");
        assert_eq!(networks[0].signal, Some(87));
        assert_eq!(networks[0].security, "WPA2");
        assert_eq!(networks[2].ssid, "OpenNet");
        assert_eq!(networks[2].security, "");
    }
}
