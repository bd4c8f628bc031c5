//! # CRSF Protocol Module
//!
//! Implementation of the Crossfire (CRSF) protocol spoken by the flight controller.
//!
//! This module handles:
//! - CRC8-DVB-S2 checksum calculation
//! - Frame encoding and single-frame validation
//! - Streaming frame synchronization over a noisy serial link
//! - RC channels packing (16 channels, 11-bit resolution)
//! - Telemetry decoding (GPS, Battery, Attitude, Link Stats, Flight Mode)

pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod packet;
pub mod protocol;
pub mod reader;
