//! Simulated peripherals for development hosts and tests.
//!
//! The sim set is deterministic: the ranging double sweeps an approach from
//! 2.5 m, the power double reports a healthy single cell, the ring records
//! the commands it was given.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::traits::{
    CriticalAction, LedRing, NetworkPresence, PowerReading, PowerSensor, RangingSensor, Rgb,
    WifiNetwork,
};
use crate::error::Result;

/// Ranging double: sweeps from 2.5 m toward 0 in 5 cm steps, then wraps.
pub struct SimRangingSensor {
    next_m: f64,
}

impl SimRangingSensor {
    pub fn new() -> Self {
        Self { next_m: 2.5 }
    }
}

impl Default for SimRangingSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl RangingSensor for SimRangingSensor {
    fn poll(&mut self) -> Result<Option<f64>> {
        let reading = self.next_m;
        self.next_m -= 0.05;
        if self.next_m < 0.0 {
            self.next_m = 2.5;
        }
        Ok(Some(reading))
    }
}

/// Power double: a healthy single cell under light load.
pub struct SimPowerSensor;

impl PowerSensor for SimPowerSensor {
    fn read(&mut self) -> Result<PowerReading> {
        Ok(PowerReading {
            bus_voltage_v: 3.9,
            shunt_voltage_v: 0.018,
            current_a: 0.18,
            power_w: 0.7,
        })
    }
}

/// A command accepted by [`SimLedRing`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RingCommand {
    Brightness(f32),
    Fill(Rgb),
    Off,
}

/// LED double that records every command.
#[derive(Default)]
pub struct SimLedRing {
    log: Arc<Mutex<Vec<RingCommand>>>,
}

impl SimLedRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting commands after the ring has been moved into a
    /// loop.
    pub fn log(&self) -> RingLog {
        RingLog(Arc::clone(&self.log))
    }
}

impl LedRing for SimLedRing {
    fn set_brightness(&mut self, brightness: f32) -> Result<()> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RingCommand::Brightness(brightness));
        Ok(())
    }

    fn fill(&mut self, color: Rgb) -> Result<()> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RingCommand::Fill(color));
        Ok(())
    }

    fn off(&mut self) -> Result<()> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RingCommand::Off);
        Ok(())
    }
}

/// Cloneable view of a [`SimLedRing`] command log.
#[derive(Clone)]
pub struct RingLog(Arc<Mutex<Vec<RingCommand>>>);

impl RingLog {
    pub fn commands(&self) -> Vec<RingCommand> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<RingCommand> {
        self.commands().last().copied()
    }
}

/// Network double with settable connectivity.
pub struct SimNetwork {
    connected: AtomicBool,
    ap_started: AtomicBool,
}

impl SimNetwork {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            ap_started: AtomicBool::new(false),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn ap_started(&self) -> bool {
        self.ap_started.load(Ordering::SeqCst)
    }
}

impl NetworkPresence for SimNetwork {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn signal_strength(&self) -> Option<u8> {
        self.is_connected().then_some(72)
    }

    fn start_access_point(&self, _ssid: &str, _password: &str) -> Result<()> {
        self.ap_started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<WifiNetwork>> {
        Ok(vec![
            WifiNetwork {
                ssid: "SimNet".to_string(),
                signal: Some(72),
                security: "WPA2".to_string(),
            },
            WifiNetwork {
                ssid: "Neighbor".to_string(),
                signal: Some(38),
                security: "WPA2".to_string(),
            },
        ])
    }

    fn connect(&self, _ssid: &str, _password: &str) -> Result<()> {
        self.set_connected(true);
        Ok(())
    }
}

/// Critical-action double that counts invocations instead of shutting the
/// host down.
#[derive(Default)]
pub struct SimCriticalAction {
    fired: Arc<AtomicUsize>,
}

impl SimCriticalAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter of how many times the action ran.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fired)
    }
}

impl CriticalAction for SimCriticalAction {
    fn execute(&mut self, reason: &str) {
        warn!("simulated critical action: {}", reason);
        self.fired.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranging_sweeps_down_and_wraps() {
        let mut sensor = SimRangingSensor::new();
        let first = sensor.poll().unwrap().unwrap();
        assert_eq!(first, 2.5);
        let mut last = first;
        for _ in 0..49 {
            last = sensor.poll().unwrap().unwrap();
        }
        assert!(last < first);
        for _ in 0..10 {
            let d = sensor.poll().unwrap().unwrap();
            assert!(d >= 0.0);
        }
    }

    #[test]
    fn ring_log_records_commands() {
        let mut ring = SimLedRing::new();
        let log = ring.log();
        ring.set_brightness(0.5).unwrap();
        ring.fill(Rgb::RED).unwrap();
        ring.off().unwrap();
        assert_eq!(
            log.commands(),
            vec![
                RingCommand::Brightness(0.5),
                RingCommand::Fill(Rgb::RED),
                RingCommand::Off,
            ]
        );
        assert_eq!(log.last(), Some(RingCommand::Off));
    }

    #[test]
    fn network_double_tracks_ap_state() {
        let net = SimNetwork::new(false);
        assert!(!net.is_connected());
        assert!(net.signal_strength().is_none());
        net.start_access_point("x", "y").unwrap();
        assert!(net.ap_started());
        net.connect("SimNet", "pw").unwrap();
        assert!(net.is_connected());
        assert_eq!(net.signal_strength(), Some(72));
    }
}
