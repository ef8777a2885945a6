//! Host-level telemetry sources and the production critical action.

use std::process::Command;

use sysinfo::System;
use tracing::{error, warn};

use super::traits::CriticalAction;

const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// SoC temperature in degrees Celsius, read from the kernel thermal zone.
/// Absent on non-Linux hosts or read failure.
pub fn cpu_temp_c() -> Option<f64> {
    let raw = std::fs::read_to_string(THERMAL_ZONE_PATH).ok()?;
    parse_millidegrees(&raw)
}

/// 1-minute load average.
pub fn load_average_1m() -> Option<f64> {
    let load = System::load_average();
    load.one.is_finite().then_some(load.one)
}

/// The thermal zone reports millidegrees as a bare integer.
fn parse_millidegrees(raw: &str) -> Option<f64> {
    let millis: f64 = raw.trim().parse().ok()?;
    Some(millis / 1000.0)
}

/// Production critical action: ask the OS to power down.
pub struct HostShutdown;

impl CriticalAction for HostShutdown {
    fn execute(&mut self, reason: &str) {
        error!("requesting host shutdown: {}", reason);
        match Command::new("sudo").args(["shutdown", "-h", "now"]).status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("shutdown command exited with {}", status),
            Err(e) => warn!("failed to invoke shutdown command: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millidegrees_parse() {
        assert_eq!(parse_millidegrees("45678\n"), Some(45.678));
        assert_eq!(parse_millidegrees("60000"), Some(60.0));
        assert_eq!(parse_millidegrees("garbage"), None);
    }

    #[test]
    fn load_average_is_finite_when_present() {
        if let Some(load) = load_average_1m() {
            assert!(load >= 0.0);
        }
    }
}
