//! # mqtt-pvinverter - MQTT PV inverter bridge for Victron Venus OS
//!
//! Subscribes to per-phase power telemetry on an MQTT broker and republishes
//! it as a `com.victronenergy.pvinverter` service on D-Bus, so a GX device
//! sees an ordinary three-phase PV inverter.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration, loaded once and validated
//! - `logging`: Structured logging and tracing
//! - `mqtt`: Broker session, topic routing and reconnect backoff
//! - `cache`: Latest reading per phase, shared between tasks
//! - `publisher`: Fixed-rate publication onto the device bus
//! - `dbus`: VeDbus-compatible service for Venus OS
//! - `driver`: Task orchestration and shutdown
//!
//! The broker task and the publish task only share the [`ValueCache`] and a
//! health watch channel; neither calls into the other.

pub mod cache;
pub mod config;
pub mod dbus;
pub mod driver;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod phase;
pub mod publisher;

// Re-export commonly used types
pub use cache::{PhaseSnapshot, ValueCache};
pub use config::Config;
pub use driver::{PvInverterDriver, RunSummary};
pub use error::{PvInverterError, Result};
pub use phase::{Phase, PhaseReading};
pub use publisher::PublishScheduler;
