//! Fast ranging loop: poll the time-of-flight sensor, smooth, publish.
//!
//! Runs at tens of hertz, decoupled from the 1 Hz telemetry cadence. The
//! sensor's own data-ready flag gates smoothing; the loop sleep only bounds
//! poll latency and cancellation response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ewma, round_to};
use crate::config::LiveConfig;
use crate::error::Result;
use crate::hw::RangingSensor;
use crate::state::SharedState;
use crate::store::Store;

const TICK: Duration = Duration::from_millis(20);
const CONFIG_TTL: Duration = Duration::from_secs(2);
/// Delay between attempts to bring up a sensor that failed to construct.
const SENSOR_RETRY: Duration = Duration::from_secs(5);

/// Builds the ranging sensor from current tuning; called again after a
/// construction failure so a flaky bus degrades instead of crashing.
pub type RangingFactory =
    Box<dyn FnMut(&LiveConfig) -> Result<Box<dyn RangingSensor>> + Send>;

pub struct RangingLoop {
    state: Arc<SharedState>,
    store: Arc<Store>,
    factory: RangingFactory,
}

impl RangingLoop {
    pub fn new(state: Arc<SharedState>, store: Arc<Store>, factory: RangingFactory) -> Self {
        Self {
            state,
            store,
            factory,
        }
    }

    pub async fn run(mut self, token: CancellationToken) {
        let mut cfg = LiveConfig::load(&self.store).unwrap_or_else(|e| {
            warn!("settings read failed, using defaults: {}", e);
            LiveConfig::default()
        });
        let mut config_age = Instant::now();
        let mut sensor: Option<Box<dyn RangingSensor>> = None;
        let mut next_build = Instant::now();
        let mut smoothed: Option<f64> = None;

        info!("ranging loop started");
        loop {
            if token.is_cancelled() {
                break;
            }

            if config_age.elapsed() >= CONFIG_TTL {
                match LiveConfig::load(&self.store) {
                    Ok(fresh) => cfg = fresh,
                    Err(e) => warn!("settings re-read failed: {}", e),
                }
                config_age = Instant::now();
            }

            if sensor.is_none() && Instant::now() >= next_build {
                match (self.factory)(&cfg) {
                    Ok(built) => {
                        info!("ranging sensor ready");
                        sensor = Some(built);
                    }
                    Err(e) => {
                        warn!(
                            "ranging sensor unavailable ({}), retrying in {:?}",
                            e, SENSOR_RETRY
                        );
                        next_build = Instant::now() + SENSOR_RETRY;
                    }
                }
            }

            if let Some(active) = sensor.as_mut() {
                match active.poll() {
                    Ok(Some(reading)) => {
                        let value = ewma(smoothed, reading, cfg.tof.smoothing_alpha);
                        smoothed = Some(value);
                        self.state.set_distance(round_to(value, 3));
                    }
                    Ok(None) => {}
                    // Transient read failure: keep the last published value.
                    Err(e) => debug!("ranging poll failed: {}", e),
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(TICK) => {}
            }
        }
        info!("ranging loop stopped");
    }
}
