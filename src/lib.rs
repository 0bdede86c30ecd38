//! # Helios - go-eCharger Driver for Victron Venus OS
//!
//! A Rust driver that bridges go-eCharger wallboxes to the Victron D-Bus,
//! so Venus OS energy management can read charger telemetry and control
//! charging through the standard evcharger service interface.
//!
//! ## Features
//!
//! - **HTTP/JSON polling**: Talks to the charger's local API v2
//! - **D-Bus Integration**: VeDbus-compatible `com.victronenergy.evcharger`
//!   service per charger
//! - **Mode Control**: Manual, automatic (PV surplus) and scheduled modes
//!   with device-validated write-back
//! - **Session Tracking**: Charging time accumulated across polls
//! - **Multi-Charger**: One driver task and bus service per configured host
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `goe`: HTTP client for the charger's JSON API
//! - `driver`: Poll-and-translate loop per charger instance
//! - `bus`: D-Bus service, items and change signals
//! - `session`: Charging session time tracking
//! - `controls`: Mode state machine and write-back validation
//! - `flows`: System power flows for surplus charging

pub mod bus;
pub mod config;
pub mod controls;
pub mod driver;
pub mod error;
pub mod flows;
pub mod goe;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use driver::GoeDriver;
pub use error::{HeliosError, Result};
