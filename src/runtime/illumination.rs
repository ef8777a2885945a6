//! Illumination loop: drive the LED ring from live distance and settings.
//!
//! The warn/illum/off state is recomputed from current inputs every tick;
//! there is no transition table to get stuck in. Warn mode blinks at a
//! frequency inversely proportional to normalized distance and alternates
//! white/warn color every half cycle through a phase accumulator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{LiveConfig, ReloadSignal};
use crate::hw::{LedRing, Rgb};
use crate::state::{LedMode, SharedState};
use crate::store::Store;

const TICK: Duration = Duration::from_millis(20);
/// Settings are re-read at least this often even without a reload signal.
const CONFIG_TTL: Duration = Duration::from_secs(2);

/// What the ring should display on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Frame {
    Off,
    Solid,
    Blink { frequency_hz: f64 },
}

/// Blink frequency for a distance: near maps to fast, far to slow.
pub fn blink_frequency(cfg: &LiveConfig, distance_m: f64) -> f64 {
    let clamped = distance_m.clamp(cfg.band.min_m, cfg.band.max_m);
    let t = (clamped - cfg.band.min_m) / (cfg.band.max_m - cfg.band.min_m);
    (cfg.warn.freq_min_hz + (1.0 - t) * (cfg.warn.freq_max_hz - cfg.warn.freq_min_hz))
        .clamp(cfg.warn.freq_min_hz, cfg.warn.freq_max_hz)
}

/// Resolve the frame for this tick. Master power gates everything; with it
/// on, a distance reading plus enabled warning blinks, anything else holds
/// solid white.
pub(crate) fn evaluate(cfg: &LiveConfig, distance_m: Option<f64>) -> Frame {
    if !cfg.led.master_on {
        return Frame::Off;
    }
    match distance_m {
        Some(d) if cfg.warn.enabled => Frame::Blink {
            frequency_hz: blink_frequency(cfg, d),
        },
        _ => Frame::Solid,
    }
}

/// First half-cycle white, second half warn color.
fn phase_color(cfg: &LiveConfig, phase: f64) -> Rgb {
    if (phase * 2.0).floor() as i64 % 2 == 0 {
        cfg.led.color_white
    } else {
        cfg.led.color_warn
    }
}

pub struct IlluminationLoop {
    state: Arc<SharedState>,
    store: Arc<Store>,
    ring: Box<dyn LedRing>,
    reload: ReloadSignal,
}

impl IlluminationLoop {
    pub fn new(
        state: Arc<SharedState>,
        store: Arc<Store>,
        ring: Box<dyn LedRing>,
        reload: ReloadSignal,
    ) -> Self {
        Self {
            state,
            store,
            ring,
            reload,
        }
    }

    pub async fn run(mut self, token: CancellationToken) {
        let mut cfg = LiveConfig::load(&self.store).unwrap_or_else(|e| {
            warn!("settings read failed, using defaults: {}", e);
            LiveConfig::default()
        });
        if let Err(e) = self.ring.set_brightness(cfg.led.brightness) {
            debug!("ring brightness failed: {}", e);
        }
        let mut config_age = Instant::now();
        let mut phase = 0.0f64;
        let mut last_tick = Instant::now();

        info!("illumination loop started");
        loop {
            if token.is_cancelled() {
                break;
            }

            // Reload on signal or ttl expiry; taking the signal clears it
            // even if the read then fails, matching its fire-and-forget
            // contract.
            if self.reload.take() || config_age.elapsed() >= CONFIG_TTL {
                match LiveConfig::load(&self.store) {
                    Ok(fresh) => {
                        if let Err(e) = self.ring.set_brightness(fresh.led.brightness) {
                            debug!("ring brightness failed: {}", e);
                        }
                        cfg = fresh;
                    }
                    Err(e) => warn!("settings re-read failed: {}", e),
                }
                config_age = Instant::now();
            }

            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f64();
            last_tick = now;

            let (mode, result) = match evaluate(&cfg, self.state.distance_m()) {
                Frame::Blink { frequency_hz } => {
                    phase += dt * frequency_hz;
                    (LedMode::Warn, self.ring.fill(phase_color(&cfg, phase)))
                }
                Frame::Solid => (LedMode::Illum, self.ring.fill(cfg.led.color_white)),
                Frame::Off => (LedMode::Off, self.ring.off()),
            };
            if let Err(e) = result {
                debug!("ring update failed: {}", e);
            }
            self.state.set_led_mode(mode);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(TICK) => {}
            }
        }

        // Leave the ring dark on the way out.
        if let Err(e) = self.ring.off() {
            debug!("ring off failed: {}", e);
        }
        self.state.set_led_mode(LedMode::Off);
        info!("illumination loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LiveConfig {
        LiveConfig::default()
    }

    #[test]
    fn nearest_distance_blinks_at_max_frequency() {
        assert_eq!(blink_frequency(&cfg(), 0.2), 20.0);
    }

    #[test]
    fn farthest_distance_blinks_at_min_frequency() {
        assert_eq!(blink_frequency(&cfg(), 4.0), 0.1);
    }

    #[test]
    fn out_of_band_distances_clamp() {
        assert_eq!(blink_frequency(&cfg(), 0.01), 20.0);
        assert_eq!(blink_frequency(&cfg(), 120.0), 0.1);
    }

    #[test]
    fn frequency_decreases_with_distance() {
        let near = blink_frequency(&cfg(), 1.0);
        let far = blink_frequency(&cfg(), 3.0);
        assert!(near > far);
    }

    #[test]
    fn master_off_forces_off_frame() {
        let mut c = cfg();
        c.led.master_on = false;
        assert_eq!(evaluate(&c, Some(0.5)), Frame::Off);
        assert_eq!(evaluate(&c, None), Frame::Off);
        c.warn.enabled = false;
        assert_eq!(evaluate(&c, Some(0.5)), Frame::Off);
    }

    #[test]
    fn warn_needs_a_distance_reading() {
        let c = cfg();
        assert!(matches!(evaluate(&c, Some(1.0)), Frame::Blink { .. }));
        assert_eq!(evaluate(&c, None), Frame::Solid);
    }

    #[test]
    fn warn_disabled_holds_solid() {
        let mut c = cfg();
        c.warn.enabled = false;
        assert_eq!(evaluate(&c, Some(1.0)), Frame::Solid);
    }

    #[test]
    fn phase_alternates_every_half_cycle() {
        let c = cfg();
        assert_eq!(phase_color(&c, 0.0), c.led.color_white);
        assert_eq!(phase_color(&c, 0.25), c.led.color_white);
        assert_eq!(phase_color(&c, 0.5), c.led.color_warn);
        assert_eq!(phase_color(&c, 0.75), c.led.color_warn);
        assert_eq!(phase_color(&c, 1.0), c.led.color_white);
        assert_eq!(phase_color(&c, 1.5), c.led.color_warn);
    }
}
