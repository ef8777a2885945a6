//! Shared runtime state published by the sensor loops.
//!
//! One `SharedState` instance is created at startup and injected into every
//! loop and the web layer. Each field has exactly one writing loop; readers
//! take whole-record snapshots.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Last commanded LED ring state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedMode {
    /// Ring dark (master power off or not yet driven).
    #[default]
    Off,
    /// Solid white illumination.
    Illum,
    /// Proximity warning blink.
    Warn,
}

/// Point-in-time copy of every published reading.
///
/// Every field is independently optional: absence means "not yet read" or
/// "last read failed". No field's absence invalidates another's presence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateSnapshot {
    /// Smoothed ranging estimate in meters.
    pub distance_m: Option<f64>,
    /// Smoothed state-of-charge estimate, 0-100.
    pub battery_pct: Option<f64>,
    /// Latest bus voltage in volts.
    pub bus_voltage_v: Option<f64>,
    /// Latest discharge current in amperes.
    pub current_a: Option<f64>,
    /// Latest power draw in watts.
    pub power_w: Option<f64>,
    /// Wi-Fi signal quality, 0-100.
    pub wifi_signal: Option<u8>,
    /// SoC temperature in degrees Celsius.
    pub cpu_temp_c: Option<f64>,
    /// 1-minute load average.
    pub load_1: Option<f64>,
    /// Last commanded LED state.
    pub led_mode: LedMode,
}

/// Fields owned by the telemetry loop, written together once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryUpdate {
    pub battery_pct: Option<f64>,
    pub bus_voltage_v: Option<f64>,
    pub current_a: Option<f64>,
    pub power_w: Option<f64>,
    pub wifi_signal: Option<u8>,
    pub cpu_temp_c: Option<f64>,
    pub load_1: Option<f64>,
}

/// Thread-safe container for the current snapshot.
///
/// Guards are held only long enough to copy fields; no I/O happens under
/// the lock.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: RwLock<StateSnapshot>,
}

impl SharedState {
    /// Create a container with every reading absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> StateSnapshot {
        self.read().clone()
    }

    /// Latest smoothed distance, if any.
    pub fn distance_m(&self) -> Option<f64> {
        self.read().distance_m
    }

    /// Publish a new smoothed distance. Ranging loop only.
    pub fn set_distance(&self, meters: f64) {
        self.write().distance_m = Some(meters);
    }

    /// Publish the telemetry-owned fields. Telemetry loop only.
    pub fn apply_telemetry(&self, update: TelemetryUpdate) {
        let mut state = self.write();
        state.battery_pct = update.battery_pct;
        state.bus_voltage_v = update.bus_voltage_v;
        state.current_a = update.current_a;
        state.power_w = update.power_w;
        state.wifi_signal = update.wifi_signal;
        state.cpu_temp_c = update.cpu_temp_c;
        state.load_1 = update.load_1;
    }

    /// Publish the commanded LED state. Illumination loop only.
    pub fn set_led_mode(&self, mode: LedMode) {
        self.write().led_mode = mode;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StateSnapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StateSnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn new_state_has_no_readings() {
        let state = SharedState::new();
        let snap = state.snapshot();
        assert!(snap.distance_m.is_none());
        assert!(snap.battery_pct.is_none());
        assert!(snap.bus_voltage_v.is_none());
        assert_eq!(snap.led_mode, LedMode::Off);
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let state = SharedState::new();
        state.set_distance(1.25);
        let snap = state.snapshot();
        state.set_distance(2.5);
        assert_eq!(snap.distance_m, Some(1.25));
        assert_eq!(state.distance_m(), Some(2.5));
    }

    #[test]
    fn telemetry_update_replaces_owned_fields_only() {
        let state = SharedState::new();
        state.set_distance(0.9);
        state.set_led_mode(LedMode::Warn);
        state.apply_telemetry(TelemetryUpdate {
            battery_pct: Some(74.2),
            bus_voltage_v: Some(3.91),
            ..Default::default()
        });
        let snap = state.snapshot();
        assert_eq!(snap.battery_pct, Some(74.2));
        assert_eq!(snap.bus_voltage_v, Some(3.91));
        assert!(snap.current_a.is_none());
        // Fields owned by other loops are untouched.
        assert_eq!(snap.distance_m, Some(0.9));
        assert_eq!(snap.led_mode, LedMode::Warn);
    }

    #[test]
    fn concurrent_disjoint_writers_never_tear_reads() {
        let state = Arc::new(SharedState::new());
        let ranging = Arc::clone(&state);
        let telemetry = Arc::clone(&state);

        let w1 = thread::spawn(move || {
            for i in 0..1000 {
                ranging.set_distance(f64::from(i) / 100.0);
            }
        });
        let w2 = thread::spawn(move || {
            for i in 0..1000 {
                telemetry.apply_telemetry(TelemetryUpdate {
                    battery_pct: Some(f64::from(i % 101)),
                    bus_voltage_v: Some(3.7),
                    ..Default::default()
                });
            }
        });

        for _ in 0..1000 {
            let snap = state.snapshot();
            if let Some(pct) = snap.battery_pct {
                assert!((0.0..=100.0).contains(&pct));
            }
            if let Some(d) = snap.distance_m {
                assert!((0.0..10.0).contains(&d));
            }
        }
        w1.join().unwrap();
        w2.join().unwrap();
    }

    #[test]
    fn snapshot_serializes_with_mode_lowercase() {
        let state = SharedState::new();
        state.set_led_mode(LedMode::Illum);
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["led_mode"], "illum");
        assert!(json["distance_m"].is_null());
    }
}
