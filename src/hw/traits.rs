//! Capability traits for the appliance peripherals.
//!
//! Each runtime loop owns exactly one handle to its peripheral; every
//! capability has a simulated double in [`super::sim`] so the full runtime
//! can run on a development host and in tests.

use serde::Serialize;

use crate::error::Result;

/// One reading from the power monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    pub bus_voltage_v: f64,
    pub shunt_voltage_v: f64,
    pub current_a: f64,
    pub power_w: f64,
}

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);
    pub const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if hex.len() != 6 {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        Some(Self::new(
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ))
    }
}

/// Time-of-flight ranging sensor.
pub trait RangingSensor: Send {
    /// Non-blocking poll. `Ok(None)` means no fresh measurement since the
    /// last call, not an error. Distances are meters, never negative.
    fn poll(&mut self) -> Result<Option<f64>>;
}

/// Bus voltage / current / power monitor.
pub trait PowerSensor: Send {
    fn read(&mut self) -> Result<PowerReading>;
}

/// Addressable LED ring.
pub trait LedRing: Send {
    /// Scale factor applied to subsequent fills, clamped to [0, 1].
    fn set_brightness(&mut self, brightness: f32) -> Result<()>;
    /// Set every pixel to `color` and latch.
    fn fill(&mut self, color: Rgb) -> Result<()>;
    /// Turn the ring dark.
    fn off(&mut self) -> Result<()>;
}

/// A network visible in a Wi-Fi scan.
#[derive(Debug, Clone, Serialize)]
pub struct WifiNetwork {
    pub ssid: String,
    pub signal: Option<u8>,
    pub security: String,
}

/// Host network connectivity operations.
pub trait NetworkPresence: Send + Sync {
    /// Whether the managed interface is associated with a network.
    fn is_connected(&self) -> bool;
    /// Signal quality of the network in use, 0-100.
    fn signal_strength(&self) -> Option<u8>;
    /// Provision a local fallback access point.
    fn start_access_point(&self, ssid: &str, password: &str) -> Result<()>;
    /// Visible networks, deduplicated by SSID.
    fn scan(&self) -> Result<Vec<WifiNetwork>>;
    /// Join a network.
    fn connect(&self, ssid: &str, password: &str) -> Result<()>;
}

/// Escalation hook for critical conditions.
///
/// The production implementation powers the host down, so the telemetry
/// loop guards calls with a hold-off; tests substitute a recording double.
pub trait CriticalAction: Send {
    fn execute(&mut self, reason: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_with_and_without_hash() {
        assert_eq!(Rgb::from_hex("#FF0000"), Some(Rgb::RED));
        assert_eq!(Rgb::from_hex("00ff00"), Some(Rgb::new(0, 255, 0)));
        assert_eq!(Rgb::from_hex(" #0000FF "), Some(Rgb::new(0, 0, 255)));
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert_eq!(Rgb::from_hex(""), None);
        assert_eq!(Rgb::from_hex("#FFF"), None);
        assert_eq!(Rgb::from_hex("#GGHHII"), None);
        assert_eq!(Rgb::from_hex("#FF00001"), None);
    }
}
