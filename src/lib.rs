//! # CRSF Bridge Library
//!
//! Drive a flight controller over its CRSF serial link from a companion
//! computer, with fail-safe handling and remote control from a second node.
//!
//! The slave node owns the serial link: it decodes telemetry, tracks link
//! health and sends the 16 RC channels at a fixed cadence. The master node
//! forwards channel commands to the slave over TCP and serves an HTTP API.

pub mod bridge;
pub mod config;
pub mod control;
pub mod controller;
pub mod crsf;
pub mod error;
pub mod serial;
pub mod telemetry;
