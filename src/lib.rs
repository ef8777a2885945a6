//! # Pi Sentry - Proximity and Battery Monitoring Appliance
//!
//! A Rust crate for a Raspberry Pi appliance that watches an approach zone
//! with a time-of-flight sensor, estimates battery state of charge from an
//! INA219 power monitor, drives a WS2812 LED ring, and serves a local web
//! dashboard over its readings and settings.
//!
//! ## Features
//!
//! - **Fast ranging loop**: tens of Hz, smoothed distance published to shared state
//! - **Telemetry loop**: 1 Hz battery/host/network sampling with SQLite persistence
//! - **Illumination loop**: warn blink or solid illumination on the LED ring
//! - **Wi-Fi fallback**: provisions a local access point when no network appears
//! - **Web dashboard**: REST API and built-in status page via axum
//! - **Simulation mode**: full runtime on a development host, no hardware needed
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pi_sentry::{ApiContext, Peripherals, SharedState, Store, Supervisor, WebConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(Store::open("pi_sentry.db")?);
//!     let state = Arc::new(SharedState::new());
//!
//!     let peripherals = Peripherals::simulated();
//!     let network = Arc::clone(&peripherals.network);
//!     let supervisor = Supervisor::start(Arc::clone(&state), Arc::clone(&store), peripherals);
//!
//!     let ctx = Arc::new(ApiContext {
//!         state,
//!         store,
//!         reload: supervisor.reload_signal(),
//!         network,
//!     });
//!     pi_sentry::web::start_web_server(WebConfig::default(), ctx).await?;
//!     supervisor.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod hw;
pub mod runtime;
pub mod state;
pub mod store;
pub mod web;

// Re-export public API
pub use config::{LiveConfig, ReloadSignal};
pub use error::{Result, SentryError};
pub use runtime::{ewma, Peripherals, Supervisor};
pub use state::{LedMode, SharedState, StateSnapshot};
pub use store::{Sample, Store};
pub use web::{start_web_server, ApiContext, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;

/// The default database path
pub const DEFAULT_DB_PATH: &str = "pi_sentry.db";
