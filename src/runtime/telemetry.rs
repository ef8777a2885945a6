//! Telemetry loop: 1 Hz power sampling, battery estimation, event
//! detection, sample persistence, and minute rollups.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ewma, round_to};
use crate::config::{BatteryCurve, LiveConfig};
use crate::hw::{host, CriticalAction, NetworkPresence, PowerSensor};
use crate::state::{SharedState, TelemetryUpdate};
use crate::store::{minute_floor, now_ts, MinuteRollup, Sample, Store};

const TICK: Duration = Duration::from_secs(1);
/// Approach rate above which a distance warning fires, m/s.
const APPROACH_RATE_WARN: f64 = 0.3;
/// Weight of the newest sample in the battery EWMA.
const BATTERY_SAMPLE_WEIGHT: f64 = 0.2;
/// Minimum interval between critical-action firings.
const CRITICAL_HOLDOFF: Duration = Duration::from_secs(60);

/// State-of-charge estimate from one power reading, percent in [0, 100].
///
/// Discharge sags the terminal voltage across the cell's internal
/// resistance; compensate back to a rested voltage before mapping onto the
/// linear curve. Charging current (negative) is not compensated.
pub fn battery_percent(curve: &BatteryCurve, bus_voltage_v: f64, current_a: f64) -> f64 {
    let rested = bus_voltage_v + current_a.max(0.0) * curve.internal_resistance_ohm;
    let span = (curve.voltage_full - curve.voltage_empty).max(f64::EPSILON);
    ((rested - curve.voltage_empty) / span).clamp(0.0, 1.0) * 100.0
}

/// Stateless per-tick warning rule. Returns the approach rate when a
/// warning should fire. No hysteresis: every qualifying tick fires, which
/// event consumers must tolerate.
pub fn distance_warning(prev_m: Option<f64>, now_m: Option<f64>, threshold_m: f64) -> Option<f64> {
    let now_m = now_m?;
    let rate = prev_m.map(|prev| prev - now_m).unwrap_or(0.0);
    (rate > APPROACH_RATE_WARN || now_m < threshold_m).then_some(rate)
}

pub struct TelemetryLoop {
    state: Arc<SharedState>,
    store: Arc<Store>,
    power: Option<Box<dyn PowerSensor>>,
    network: Arc<dyn NetworkPresence>,
    critical: Box<dyn CriticalAction>,
}

impl TelemetryLoop {
    pub fn new(
        state: Arc<SharedState>,
        store: Arc<Store>,
        power: Option<Box<dyn PowerSensor>>,
        network: Arc<dyn NetworkPresence>,
        critical: Box<dyn CriticalAction>,
    ) -> Self {
        Self {
            state,
            store,
            power,
            network,
            critical,
        }
    }

    pub async fn run(mut self, token: CancellationToken) {
        let mut cfg = LiveConfig::load(&self.store).unwrap_or_else(|e| {
            warn!("settings read failed, using defaults: {}", e);
            LiveConfig::default()
        });
        let mut pct_smoothed: Option<f64> = None;
        let mut prev_distance: Option<f64> = None;
        let mut last_rollup_minute: i64 = 0;
        let mut last_critical: Option<Instant> = None;

        info!("telemetry loop started");
        loop {
            if token.is_cancelled() {
                break;
            }

            match LiveConfig::load(&self.store) {
                Ok(fresh) => cfg = fresh,
                Err(e) => warn!("settings re-read failed: {}", e),
            }

            let power = match self.power.as_mut() {
                Some(sensor) => match sensor.read() {
                    Ok(reading) => Some(reading),
                    Err(e) => {
                        debug!("power read failed: {}", e);
                        None
                    }
                },
                None => None,
            };

            // Battery percent needs both a reading and a parsed curve; the
            // EWMA accumulator survives gaps so recovery resumes smoothly.
            let battery_pct = match (power, cfg.battery.as_ref()) {
                (Some(p), Some(curve)) => {
                    let raw = battery_percent(curve, p.bus_voltage_v, p.current_a);
                    let value = ewma(pct_smoothed, raw, 1.0 - BATTERY_SAMPLE_WEIGHT);
                    pct_smoothed = Some(value);
                    Some(round_to(value, 1))
                }
                _ => None,
            };

            let distance = self.state.distance_m();
            let now = now_ts();

            self.state.apply_telemetry(TelemetryUpdate {
                battery_pct,
                bus_voltage_v: power.map(|p| p.bus_voltage_v),
                current_a: power.map(|p| p.current_a),
                power_w: power.map(|p| p.power_w),
                wifi_signal: self.network.signal_strength(),
                cpu_temp_c: host::cpu_temp_c(),
                load_1: host::load_average_1m(),
            });

            let sample = Sample {
                ts: now,
                distance_m: distance,
                ambient_rate: None,
                bus_voltage_v: power.map(|p| p.bus_voltage_v),
                shunt_voltage_v: power.map(|p| p.shunt_voltage_v),
                current_a: power.map(|p| p.current_a),
                power_w: power.map(|p| p.power_w),
            };
            if let Err(e) = self.store.insert_sample(&sample) {
                error!("sample insert failed: {}", e);
            }

            if let Some(rate) = distance_warning(prev_distance, distance, cfg.warn.distance_threshold_m)
            {
                let payload = json!({
                    "distance_m": distance,
                    "approach_rate": round_to(rate, 3),
                });
                if let Err(e) = self.store.insert_event(now, "distance_warn", &payload) {
                    error!("event insert failed: {}", e);
                }
            }
            prev_distance = distance;

            let minute = now.div_euclid(60);
            if minute != last_rollup_minute {
                let rollup = MinuteRollup {
                    minute_ts: minute_floor(now),
                    battery_pct,
                    bus_voltage_v: power.map(|p| p.bus_voltage_v),
                    current_a: power.map(|p| p.current_a),
                    power_w: power.map(|p| p.power_w),
                    distance_m: distance,
                };
                if let Err(e) = self.store.rollup_minute(&rollup) {
                    error!("minute rollup failed: {}", e);
                }
                last_rollup_minute = minute;
            }

            if cfg.shutdown_voltage > 0.0 {
                if let Some(p) = power {
                    if p.bus_voltage_v <= cfg.shutdown_voltage {
                        self.low_voltage(p.bus_voltage_v, cfg.shutdown_voltage, now, &mut last_critical);
                    }
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(TICK) => {}
            }
        }
        info!("telemetry loop stopped");
    }

    /// The one irreversible path. The hold-off guards both the event row
    /// and the action so a dying battery cannot flood either.
    fn low_voltage(
        &mut self,
        bus_voltage_v: f64,
        threshold_v: f64,
        now: i64,
        last_critical: &mut Option<Instant>,
    ) {
        if last_critical
            .map(|t| t.elapsed() < CRITICAL_HOLDOFF)
            .unwrap_or(false)
        {
            return;
        }
        *last_critical = Some(Instant::now());

        warn!(
            "bus voltage {:.2} V at or below shutdown threshold {:.2} V",
            bus_voltage_v, threshold_v
        );
        let payload = json!({
            "bus_voltage_v": bus_voltage_v,
            "threshold_v": threshold_v,
        });
        if let Err(e) = self.store.insert_event(now, "low_voltage_shutdown", &payload) {
            error!("event insert failed: {}", e);
        }
        self.critical.execute("bus voltage below shutdown threshold");
    }
}
