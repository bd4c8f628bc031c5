//! # Telemetry Module
//!
//! Everything downstream of the packet dispatcher's telemetry output.
//!
//! This module handles:
//! - Keeping the latest value of every sensor ([`store`])
//! - Building the periodic report and the fixed binary record ([`record`])
//! - Publishing on a fixed cadence, atomically ([`publisher`])
//! - Writing JSONL logs with rotation ([`logger`])

pub mod logger;
pub mod publisher;
pub mod record;
pub mod store;

pub use publisher::TelemetryPublisher;
pub use record::{TelemetryRecord, TelemetryReport};
pub use store::{SensorState, TelemetryStore};
