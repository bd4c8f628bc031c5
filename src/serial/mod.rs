//! # Serial Communication Module
//!
//! Handles the UART link to the flight controller.
//!
//! This module handles:
//! - Opening the configured serial port (420,000 baud, 8N1 by default)
//! - Async read/write through the [`SerialPortIO`] trait
//! - Falling back to common device paths when the configured one is missing

pub mod port_trait;

pub use port_trait::{SerialPortIO, StreamPort};

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// CRSF baud rate (420,000 baud)
pub const CRSF_BAUD_RATE: u32 = 420_000;

/// Device paths tried after the configured one (in order of preference)
pub const FALLBACK_DEVICE_PATHS: &[&str] = &[
    "/dev/serial0",  // Raspberry Pi primary UART alias
    "/dev/ttyAMA0",  // PL011 UART
    "/dev/ttyACM0",  // USB CDC flight controllers
    "/dev/ttyUSB0",  // USB-to-serial adapters
];

/// Serial link to the flight controller
pub struct CrsfSerial {
    port: StreamPort<tokio_serial::SerialStream>,
    device_path: String,
}

impl std::fmt::Debug for CrsfSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrsfSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl CrsfSerial {
    /// Open the configured port, falling back to [`FALLBACK_DEVICE_PATHS`]
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SerialPortNotFound`] listing every path tried
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_bridge::serial::CrsfSerial;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let serial = CrsfSerial::open("/dev/serial0", 420_000)?;
    ///     println!("Connected to {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let mut paths = vec![path];
        paths.extend(FALLBACK_DEVICE_PATHS.iter().copied().filter(|p| *p != path));
        Self::open_with_paths(&paths, baud_rate)
    }

    /// Open the first path that works
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened flight controller UART at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port: StreamPort::new(port),
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                }
            }
        }

        Err(BridgeError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Path of the device that was opened
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl SerialPortIO for CrsfSerial {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port.flush().await
    }

    async fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port.read_timeout(buf, timeout).await
    }
}
