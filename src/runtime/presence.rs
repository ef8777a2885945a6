//! One-shot network presence task: wait for connectivity at startup, else
//! provision the fallback access point.
//!
//! Terminates once either condition is met. Reconnection after the startup
//! window is the network manager's problem, not ours.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::LiveConfig;
use crate::hw::NetworkPresence;
use crate::store::{now_ts, Store};

const POLL: Duration = Duration::from_secs(2);

pub struct PresenceTask {
    store: Arc<Store>,
    network: Arc<dyn NetworkPresence>,
}

impl PresenceTask {
    pub fn new(store: Arc<Store>, network: Arc<dyn NetworkPresence>) -> Self {
        Self { store, network }
    }

    pub async fn run(self, token: CancellationToken) {
        let cfg = LiveConfig::load(&self.store).unwrap_or_else(|e| {
            warn!("settings read failed, using defaults: {}", e);
            LiveConfig::default()
        });
        let deadline = Instant::now() + Duration::from_secs(cfg.wifi.try_seconds);

        while Instant::now() < deadline {
            if self.network.is_connected() {
                info!("network connected within startup window");
                return;
            }
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(POLL) => {}
            }
        }

        // Final check before giving up on the window.
        if self.network.is_connected() {
            info!("network connected within startup window");
            return;
        }

        info!(
            "no connectivity after {} s, starting fallback access point '{}'",
            cfg.wifi.try_seconds, cfg.wifi.ap_ssid
        );
        let ts = now_ts();
        match self
            .network
            .start_access_point(&cfg.wifi.ap_ssid, &cfg.wifi.ap_password)
        {
            Ok(()) => {
                let payload = json!({ "ssid": cfg.wifi.ap_ssid });
                if let Err(e) = self.store.insert_event(ts, "wifi_ap", &payload) {
                    error!("event insert failed: {}", e);
                }
            }
            Err(e) => {
                warn!("fallback access point failed: {}", e);
                let payload = json!({ "ssid": cfg.wifi.ap_ssid, "error": e.to_string() });
                if let Err(err) = self.store.insert_event(ts, "wifi_ap_failed", &payload) {
                    error!("event insert failed: {}", err);
                }
            }
        }
    }
}
