//! # Joystick Device Module
//!
//! Opens a joystick through the Linux evdev interface and streams its stick
//! positions to the control loop.
//!
//! evdev reads block, so the device is read on a dedicated OS thread that
//! publishes [`JoystickAxes`] through a `tokio::sync::watch` channel. The
//! channel closes when the device goes away, which the control loop treats
//! as "no joystick".

use evdev::{AbsoluteAxisType, Device};
use std::path::Path;
use std::thread;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::mapper::{AxisRange, EventMapper, JoystickAxes, STICK_AXES};
use crate::error::{BridgeError, Result};

/// An opened joystick
pub struct Joystick {
    device: Device,
    device_path: String,
    mapper: EventMapper,
}

impl std::fmt::Debug for Joystick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joystick")
            .field("device_path", &self.device_path)
            .field("name", &self.device.name())
            .finish_non_exhaustive()
    }
}

fn has_stick_axes(device: &Device) -> bool {
    device.supported_absolute_axes().map_or(false, |axes| {
        axes.contains(AbsoluteAxisType::ABS_X) && axes.contains(AbsoluteAxisType::ABS_Y)
    })
}

impl Joystick {
    /// Opens `path`, or the first device with stick axes when `path` is empty
    ///
    /// # Errors
    ///
    /// - `ControllerNotFound`: auto-detect found nothing usable
    /// - `Controller`: the given device could not be opened
    pub fn open(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Self::detect();
        }

        let device = Device::open(path)
            .map_err(|e| BridgeError::Controller(format!("Failed to open {}: {}", path, e)))?;
        if !has_stick_axes(&device) {
            return Err(BridgeError::Controller(format!("{} has no stick axes", path)));
        }
        Ok(Self::from_device(device, path.to_string()))
    }

    /// Scans `/dev/input/event*` for the first device with stick axes
    pub fn detect() -> Result<Self> {
        let input_dir = Path::new("/dev/input");
        if !input_dir.exists() {
            return Err(BridgeError::ControllerNotFound);
        }

        let mut entries: Vec<_> = std::fs::read_dir(input_dir)
            .map_err(|e| BridgeError::Controller(format!("Failed to read /dev/input: {}", e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().starts_with("event"))
                    .unwrap_or(false)
            })
            .collect();

        // deterministic choice when several devices are present
        entries.sort();

        for path in entries {
            match Device::open(&path) {
                Ok(device) if has_stick_axes(&device) => {
                    let device_path = path.to_string_lossy().to_string();
                    info!(
                        "Found joystick at {} ({})",
                        device_path,
                        device.name().unwrap_or("unnamed")
                    );
                    return Ok(Self::from_device(device, device_path));
                }
                Ok(_) => debug!("Skipping {}: no stick axes", path.display()),
                Err(e) => debug!("Could not open {}: {}", path.display(), e),
            }
        }

        Err(BridgeError::ControllerNotFound)
    }

    fn from_device(device: Device, device_path: String) -> Self {
        let mut ranges = [AxisRange::default(); 4];
        match device.get_abs_state() {
            Ok(state) => {
                for (range, axis) in ranges.iter_mut().zip(STICK_AXES) {
                    if let Some(info) = state.get(axis.0 as usize) {
                        *range = AxisRange::new(info.minimum, info.maximum);
                    }
                }
            }
            Err(e) => warn!("Could not read axis ranges from {}: {}", device_path, e),
        }
        debug!("Joystick axis ranges: {:?}", ranges);

        Self {
            device,
            device_path,
            mapper: EventMapper::new(ranges),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Moves the device onto a reader thread
    ///
    /// The returned receiver always holds the latest stick positions; it is
    /// closed when the device errors out (for example when unplugged).
    pub fn spawn_reader(mut self) -> Result<watch::Receiver<JoystickAxes>> {
        let (tx, rx) = watch::channel(self.mapper.axes());

        thread::Builder::new()
            .name("joystick".to_string())
            .spawn(move || loop {
                let events = match self.device.fetch_events() {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("Joystick {} lost: {}", self.device_path, e);
                        return;
                    }
                };

                let mut changed = false;
                for event in events {
                    changed |= self.mapper.process_event(&event);
                }

                if changed && tx.send(self.mapper.axes()).is_err() {
                    debug!("Joystick receiver dropped, stopping reader");
                    return;
                }
            })?;

        Ok(rx)
    }
}
