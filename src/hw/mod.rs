//! Peripheral adapters: capability traits, hardware drivers, and simulated
//! doubles.
//!
//! The real drivers need the `hardware` feature (rppal, Linux I2C/SPI).
//! Everything else in the crate talks to the traits only.

pub mod host;
pub mod netmgr;
pub mod sim;
pub mod traits;

#[cfg(feature = "hardware")]
pub mod ina219;
#[cfg(feature = "hardware")]
pub mod neopixel;
#[cfg(feature = "hardware")]
pub mod vl53l1x;

pub use traits::{
    CriticalAction, LedRing, NetworkPresence, PowerReading, PowerSensor, RangingSensor, Rgb,
    WifiNetwork,
};
