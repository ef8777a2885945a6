//! Typed configuration snapshot over the string settings store.
//!
//! All settings live as strings in the store and are parsed here in one
//! place. Parsing is lenient: a missing or malformed value falls back to
//! its default so a bad write can never take a loop down. The battery
//! curve is the one strict exception; battery estimation stays off until
//! all three of its members parse.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::hw::Rgb;
use crate::store::Store;

/// Battery voltage curve for state-of-charge estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryCurve {
    pub voltage_full: f64,
    pub voltage_empty: f64,
    pub internal_resistance_ohm: f64,
}

/// Proximity warning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarnConfig {
    pub enabled: bool,
    pub distance_threshold_m: f64,
    pub freq_min_hz: f64,
    pub freq_max_hz: f64,
}

/// Distance band the blink-frequency map normalizes against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceBand {
    pub min_m: f64,
    pub max_m: f64,
}

/// LED ring output parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedConfig {
    pub master_on: bool,
    pub brightness: f32,
    pub color_white: Rgb,
    pub color_warn: Rgb,
}

/// Wi-Fi fallback access point parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WifiConfig {
    pub try_seconds: u64,
    pub ap_ssid: String,
    pub ap_password: String,
}

/// Ranging sensor tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TofConfig {
    pub timing_budget_ms: u16,
    /// 1 = short range, 2 = long range.
    pub distance_mode: u8,
    /// Weight kept on the previous smoothed distance, in [0, 1).
    pub smoothing_alpha: f64,
}

/// One parsed, validated view of the settings store.
///
/// Treated as immutable within a loop iteration; loops re-read it on the
/// reload signal or on their own poll interval.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub battery: Option<BatteryCurve>,
    /// Bus voltage at or below which the critical action fires; 0 disables.
    pub shutdown_voltage: f64,
    pub warn: WarnConfig,
    pub band: DistanceBand,
    pub led: LedConfig,
    pub wifi: WifiConfig,
    pub tof: TofConfig,
    pub shunt_ohms: f64,
}

impl LiveConfig {
    /// Parse a snapshot from raw settings.
    pub fn from_settings(settings: &HashMap<String, String>) -> Self {
        let battery = match (
            parse_f64(settings, "battery.voltage_full"),
            parse_f64(settings, "battery.voltage_empty"),
            parse_f64(settings, "battery.internal_resistance_ohm"),
        ) {
            (Some(voltage_full), Some(voltage_empty), Some(internal_resistance_ohm)) => {
                Some(BatteryCurve {
                    voltage_full,
                    voltage_empty,
                    internal_resistance_ohm,
                })
            }
            _ => None,
        };

        let mut band = DistanceBand {
            min_m: parse_f64_or(settings, "distance.min_m", 0.2),
            max_m: parse_f64_or(settings, "distance.max_m", 4.0),
        };
        if band.max_m <= band.min_m {
            band = DistanceBand {
                min_m: 0.2,
                max_m: 4.0,
            };
        }

        let mut warn = WarnConfig {
            enabled: parse_bool_or(settings, "warn.enabled", true),
            distance_threshold_m: parse_f64_or(settings, "warn.distance_threshold_m", 1.5),
            freq_min_hz: parse_f64_or(settings, "warn.freq_min_hz", 0.1),
            freq_max_hz: parse_f64_or(settings, "warn.freq_max_hz", 20.0),
        };
        if warn.freq_max_hz < warn.freq_min_hz || warn.freq_min_hz <= 0.0 {
            warn.freq_min_hz = 0.1;
            warn.freq_max_hz = 20.0;
        }

        let led = LedConfig {
            master_on: parse_bool_or(settings, "led.master_on", true),
            brightness: (parse_f64_or(settings, "led.brightness", 0.3) as f32).clamp(0.0, 1.0),
            color_white: parse_color_or(settings, "led.color_white", Rgb::WHITE),
            color_warn: parse_color_or(settings, "led.color_warn", Rgb::RED),
        };

        let wifi = WifiConfig {
            try_seconds: parse_or(settings, "wifi.try_seconds", 30u64),
            ap_ssid: settings
                .get("wifi.ap_ssid")
                .cloned()
                .unwrap_or_else(|| "PiSentry-AP".to_string()),
            ap_password: settings
                .get("wifi.ap_password")
                .cloned()
                .unwrap_or_else(|| "change-me-1234".to_string()),
        };

        let mut smoothing_alpha = parse_f64_or(settings, "tof.smoothing_alpha", 0.7);
        if !(0.0..1.0).contains(&smoothing_alpha) {
            smoothing_alpha = 0.7;
        }
        let distance_mode = match parse_or(settings, "tof.distance_mode", 1u8) {
            2 => 2,
            _ => 1,
        };
        let tof = TofConfig {
            timing_budget_ms: parse_or(settings, "tof.timing_budget_ms", 20u16),
            distance_mode,
            smoothing_alpha,
        };

        Self {
            battery,
            shutdown_voltage: parse_f64_or(settings, "battery.shutdown_voltage", 0.0),
            warn,
            band,
            led,
            wifi,
            tof,
            shunt_ohms: parse_f64_or(settings, "ina219.shunt_ohms", 0.1),
        }
    }

    /// Read and parse the current settings from the store.
    pub fn load(store: &Store) -> Result<Self> {
        Ok(Self::from_settings(&store.kv_all()?))
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::from_settings(&HashMap::new())
    }
}

/// Fire-and-forget settings-reload flag.
///
/// Set by the web layer after a settings write; consumed by the
/// illumination loop on its next tick.
#[derive(Debug, Clone, Default)]
pub struct ReloadSignal {
    flag: Arc<AtomicBool>,
}

impl ReloadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a reload.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request, returning whether one was set.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Peek without consuming.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

fn parse_or<T: FromStr>(settings: &HashMap<String, String>, key: &str, default: T) -> T {
    settings
        .get(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// Finite-only float parse; NaN and infinities count as malformed.
fn parse_f64(settings: &HashMap<String, String>, key: &str) -> Option<f64> {
    settings
        .get(key)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_f64_or(settings: &HashMap<String, String>, key: &str, default: f64) -> f64 {
    parse_f64(settings, key).unwrap_or(default)
}

fn parse_bool_or(settings: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match settings.get(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        Some(ref v) if v == "true" => true,
        Some(ref v) if v == "false" => false,
        _ => default,
    }
}

fn parse_color_or(settings: &HashMap<String, String>, key: &str, default: Rgb) -> Rgb {
    settings
        .get(key)
        .and_then(|raw| Rgb::from_hex(raw))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_settings_yield_defaults() {
        let cfg = LiveConfig::default();
        assert!(cfg.battery.is_none());
        assert_eq!(cfg.shutdown_voltage, 0.0);
        assert!(cfg.warn.enabled);
        assert_eq!(cfg.warn.distance_threshold_m, 1.5);
        assert_eq!(cfg.band.min_m, 0.2);
        assert_eq!(cfg.band.max_m, 4.0);
        assert!(cfg.led.master_on);
        assert_eq!(cfg.wifi.try_seconds, 30);
        assert_eq!(cfg.tof.timing_budget_ms, 20);
        assert_eq!(cfg.tof.smoothing_alpha, 0.7);
        assert_eq!(cfg.shunt_ohms, 0.1);
    }

    #[test]
    fn battery_curve_parses_only_when_complete() {
        let cfg = LiveConfig::from_settings(&settings(&[
            ("battery.voltage_full", "4.2"),
            ("battery.voltage_empty", "3.3"),
            ("battery.internal_resistance_ohm", "0.15"),
        ]));
        let curve = cfg.battery.unwrap();
        assert_eq!(curve.voltage_full, 4.2);
        assert_eq!(curve.voltage_empty, 3.3);

        let cfg = LiveConfig::from_settings(&settings(&[
            ("battery.voltage_full", "4.2"),
            ("battery.voltage_empty", "oops"),
            ("battery.internal_resistance_ohm", "0.15"),
        ]));
        assert!(cfg.battery.is_none());
    }

    #[test]
    fn malformed_values_fall_back_per_key() {
        let cfg = LiveConfig::from_settings(&settings(&[
            ("warn.distance_threshold_m", "not-a-number"),
            ("warn.freq_max_hz", "12.5"),
            ("led.master_on", "banana"),
        ]));
        assert_eq!(cfg.warn.distance_threshold_m, 1.5);
        assert_eq!(cfg.warn.freq_max_hz, 12.5);
        assert!(cfg.led.master_on);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let cfg = LiveConfig::from_settings(&settings(&[
            ("distance.min_m", "NaN"),
            ("distance.max_m", "inf"),
        ]));
        assert_eq!(cfg.band.min_m, 0.2);
        assert_eq!(cfg.band.max_m, 4.0);
    }

    #[test]
    fn inverted_band_and_frequencies_reset_to_defaults() {
        let cfg = LiveConfig::from_settings(&settings(&[
            ("distance.min_m", "5.0"),
            ("distance.max_m", "1.0"),
            ("warn.freq_min_hz", "30.0"),
            ("warn.freq_max_hz", "2.0"),
        ]));
        assert_eq!(cfg.band.min_m, 0.2);
        assert_eq!(cfg.band.max_m, 4.0);
        assert_eq!(cfg.warn.freq_min_hz, 0.1);
        assert_eq!(cfg.warn.freq_max_hz, 20.0);
    }

    #[test]
    fn colors_parse_from_hex() {
        let cfg = LiveConfig::from_settings(&settings(&[
            ("led.color_white", "#FFEEDD"),
            ("led.color_warn", "garbage"),
        ]));
        assert_eq!(cfg.led.color_white, Rgb::new(0xFF, 0xEE, 0xDD));
        assert_eq!(cfg.led.color_warn, Rgb::RED);
    }

    #[test]
    fn out_of_range_alpha_resets() {
        let cfg =
            LiveConfig::from_settings(&settings(&[("tof.smoothing_alpha", "1.5")]));
        assert_eq!(cfg.tof.smoothing_alpha, 0.7);
    }

    #[test]
    fn brightness_clamps_into_unit_range() {
        let cfg = LiveConfig::from_settings(&settings(&[("led.brightness", "7.0")]));
        assert_eq!(cfg.led.brightness, 1.0);
    }

    #[test]
    fn reload_signal_is_consumed_once() {
        let signal = ReloadSignal::new();
        assert!(!signal.is_set());
        signal.set();
        assert!(signal.is_set());
        assert!(signal.take());
        assert!(!signal.take());
    }
}
