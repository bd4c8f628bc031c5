//! # Telemetry Store
//!
//! Latest decoded value of every sensor, owned by the receive path and
//! published to readers through a `tokio::sync::watch` channel.
//!
//! Each sensor is replaced wholesale when a new frame for it arrives; a
//! reader therefore never sees a GPS fix whose latitude and longitude come
//! from different frames.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::crsf::packet::Telemetry;
use crate::crsf::protocol::{AttitudeData, BatterySensor, ChannelSet, GpsData, LinkStatistics};

/// Most recent value of each sensor; `None` until the first frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub gps: Option<GpsData>,
    pub battery: Option<BatterySensor>,
    pub attitude: Option<AttitudeData>,
    pub link_statistics: Option<LinkStatistics>,
    pub flight_mode: Option<String>,
    /// Last RC channels frame received from the flight controller
    pub rc_input: Option<ChannelSet>,
}

impl SensorState {
    /// Replaces the sensor the packet belongs to
    pub fn apply(&mut self, telemetry: Telemetry) {
        match telemetry {
            Telemetry::Gps(gps) => self.gps = Some(gps),
            Telemetry::Battery(battery) => self.battery = Some(battery),
            Telemetry::Attitude(attitude) => self.attitude = Some(attitude),
            Telemetry::LinkStatistics(stats) => self.link_statistics = Some(stats),
            Telemetry::FlightMode(mode) => self.flight_mode = Some(mode),
        }
    }
}

/// Cloneable publishing handle for [`SensorState`]
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    tx: Arc<watch::Sender<SensorState>>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SensorState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Publishes one decoded sensor value
    pub fn update(&self, telemetry: Telemetry) {
        self.tx.send_modify(|sensors| sensors.apply(telemetry));
    }

    /// Publishes the last RC channels seen on the wire
    pub fn set_rc_input(&self, channels: ChannelSet) {
        self.tx.send_modify(|sensors| sensors.rc_input = Some(channels));
    }

    /// Copy of the current sensor values
    pub fn snapshot(&self) -> SensorState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every update
    pub fn subscribe(&self) -> watch::Receiver<SensorState> {
        self.tx.subscribe()
    }
}
