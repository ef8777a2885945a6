//! Lifecycle owner for the runtime loops.
//!
//! One cancellation token fans out to every loop as a child token; shutdown
//! cancels it, then waits a bounded grace period per task. Tasks that
//! overrun the grace period are abandoned rather than aborted so a wedged
//! hardware call cannot poison the teardown of the rest.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::illumination::IlluminationLoop;
use super::presence::PresenceTask;
use super::ranging::{RangingFactory, RangingLoop};
use super::telemetry::TelemetryLoop;
use crate::config::ReloadSignal;
use crate::hw::{CriticalAction, LedRing, NetworkPresence, PowerSensor};
use crate::state::SharedState;
use crate::store::Store;

/// Per-task grace period at shutdown.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Everything the runtime needs to touch the outside world. Each handle is
/// owned by exactly one loop; the network handle is shared because it is
/// read-only per call.
pub struct Peripherals {
    pub ranging: RangingFactory,
    pub power: Option<Box<dyn PowerSensor>>,
    pub ring: Box<dyn LedRing>,
    pub network: Arc<dyn NetworkPresence>,
    pub critical: Box<dyn CriticalAction>,
}

impl Peripherals {
    /// Full simulated peripheral set for development hosts.
    pub fn simulated() -> Self {
        use crate::hw::sim::{
            SimCriticalAction, SimLedRing, SimNetwork, SimPowerSensor, SimRangingSensor,
        };

        Self {
            ranging: Box::new(|_| Ok(Box::new(SimRangingSensor::new()))),
            power: Some(Box::new(SimPowerSensor)),
            ring: Box::new(SimLedRing::new()),
            network: Arc::new(SimNetwork::new(true)),
            critical: Box::new(SimCriticalAction::new()),
        }
    }
}

/// Owns the cancellation token, reload signal, and join handle for every
/// runtime task.
pub struct Supervisor {
    token: CancellationToken,
    reload: ReloadSignal,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Supervisor {
    /// Spawn the four loops onto the current tokio runtime.
    pub fn start(state: Arc<SharedState>, store: Arc<Store>, peripherals: Peripherals) -> Self {
        let token = CancellationToken::new();
        let reload = ReloadSignal::new();
        let mut tasks = Vec::new();

        let ranging = RangingLoop::new(
            Arc::clone(&state),
            Arc::clone(&store),
            peripherals.ranging,
        );
        tasks.push(("ranging", tokio::spawn(ranging.run(token.child_token()))));

        let telemetry = TelemetryLoop::new(
            Arc::clone(&state),
            Arc::clone(&store),
            peripherals.power,
            Arc::clone(&peripherals.network),
            peripherals.critical,
        );
        tasks.push(("telemetry", tokio::spawn(telemetry.run(token.child_token()))));

        let illumination = IlluminationLoop::new(
            Arc::clone(&state),
            Arc::clone(&store),
            peripherals.ring,
            reload.clone(),
        );
        tasks.push((
            "illumination",
            tokio::spawn(illumination.run(token.child_token())),
        ));

        let presence = PresenceTask::new(Arc::clone(&store), peripherals.network);
        tasks.push(("presence", tokio::spawn(presence.run(token.child_token()))));

        info!("runtime started ({} tasks)", tasks.len());
        Self {
            token,
            reload,
            tasks,
        }
    }

    /// Handle the web layer uses to request a settings reload.
    pub fn reload_signal(&self) -> ReloadSignal {
        self.reload.clone()
    }

    /// Request cancellation and wait up to the grace period for each task.
    pub async fn shutdown(self) {
        info!("stopping runtime");
        self.token.cancel();
        for (name, handle) in self.tasks {
            match timeout(STOP_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{} task panicked: {}", name, e),
                Err(_) => warn!("{} task did not stop within {:?}", name, STOP_GRACE),
            }
        }
        info!("runtime stopped");
    }
}
