//! # Telemetry Record
//!
//! Two views of the same periodic telemetry snapshot:
//!
//! - [`TelemetryReport`]: structured, serde-friendly; served by the bridge
//!   and written to the JSONL log.
//! - [`TelemetryRecord`]: the fixed 152-byte little-endian record published
//!   to a file for local readers that map it as a C struct.
//!
//! ## Record layout
//!
//! | Offset | Field | Type |
//! |-------:|-------|------|
//! | 0 | link_up | u8 + 3 pad |
//! | 4 | last_receive_ms | u32 |
//! | 8 | channels | i32 × 16 |
//! | 72 | latitude | f64 |
//! | 80 | longitude | f64 |
//! | 88 | altitude | f64 |
//! | 96 | speed | f64 |
//! | 104 | voltage | f32 |
//! | 108 | current | f32 |
//! | 112 | capacity | f32 |
//! | 116 | remaining | u8 + 3 pad |
//! | 120 | roll, pitch, yaw | f32 × 3 |
//! | 132 | roll_raw, pitch_raw, yaw_raw | i16 × 3 + 6 pad |
//! | 144 | timestamp_ms | u64 |

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::store::SensorState;
use crate::control::state::{ControlMode, SharedState};
use crate::crsf::protocol::{
    AttitudeData, BatterySensor, ChannelSet, GpsData, LinkStatistics, CRSF_NUM_CHANNELS,
};
use crate::error::{BridgeError, Result};

/// Size of the published binary record
pub const TELEMETRY_RECORD_SIZE: usize = 152;

/// Link section of the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    pub up: bool,
    /// Milliseconds since bridge start at the last valid frame
    pub last_receive_ms: Option<u64>,
    /// Milliseconds since the last valid frame
    pub age_ms: Option<u64>,
    pub statistics: Option<LinkStatistics>,
}

/// Structured telemetry snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    /// Unix time in milliseconds when the snapshot was taken
    pub timestamp_ms: u64,
    pub link: LinkReport,
    pub gps: Option<GpsData>,
    pub battery: Option<BatterySensor>,
    pub attitude: Option<AttitudeData>,
    pub flight_mode: Option<String>,
    /// Channels currently being sent to the flight controller
    pub channels: ChannelSet,
    /// Channels last received from the flight controller
    pub rc_input: Option<ChannelSet>,
    pub mode: ControlMode,
}

impl TelemetryReport {
    /// Builds a report from the shared channel/link state and the sensors
    pub fn capture(state: &SharedState, sensors: &SensorState, now: Instant, timestamp_ms: u64) -> Self {
        let snapshot = state.snapshot();
        let link = snapshot.link;
        let millis = |from: Instant, to: Instant| to.saturating_duration_since(from).as_millis() as u64;

        Self {
            timestamp_ms,
            link: LinkReport {
                up: link.up,
                last_receive_ms: link.last_receive.map(|at| millis(state.started(), at)),
                age_ms: link.last_receive.map(|at| millis(at, now)),
                statistics: sensors.link_statistics,
            },
            gps: sensors.gps,
            battery: sensors.battery,
            attitude: sensors.attitude,
            flight_mode: sensors.flight_mode.clone(),
            channels: snapshot.channels,
            rc_input: sensors.rc_input,
            mode: snapshot.mode,
        }
    }
}

/// Fixed-layout binary telemetry record
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryRecord {
    pub link_up: bool,
    pub last_receive_ms: u32,
    pub channels: [i32; CRSF_NUM_CHANNELS],
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Ground speed in km/h
    pub speed: f64,
    pub voltage: f32,
    pub current: f32,
    pub capacity: f32,
    pub remaining: u8,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll_raw: i16,
    pub pitch_raw: i16,
    pub yaw_raw: i16,
    pub timestamp_ms: u64,
}

impl From<&TelemetryReport> for TelemetryRecord {
    fn from(report: &TelemetryReport) -> Self {
        let gps = report.gps.unwrap_or_default();
        let battery = report.battery.unwrap_or_default();
        let attitude = report.attitude.unwrap_or_default();

        let mut channels = [0i32; CRSF_NUM_CHANNELS];
        for (slot, value) in channels.iter_mut().zip(report.channels.values()) {
            *slot = i32::from(*value);
        }

        Self {
            link_up: report.link.up,
            // wraps after ~49 days, like any 32-bit millisecond counter
            last_receive_ms: report.link.last_receive_ms.unwrap_or(0) as u32,
            channels,
            latitude: gps.latitude,
            longitude: gps.longitude,
            altitude: f64::from(gps.altitude),
            speed: f64::from(gps.ground_speed),
            voltage: battery.voltage,
            current: battery.current,
            capacity: battery.capacity_used as f32,
            remaining: battery.remaining_percent,
            roll: attitude.roll,
            pitch: attitude.pitch,
            yaw: attitude.yaw,
            roll_raw: attitude.roll_raw,
            pitch_raw: attitude.pitch_raw,
            yaw_raw: attitude.yaw_raw,
            timestamp_ms: report.timestamp_ms,
        }
    }
}

impl TelemetryRecord {
    /// Serializes to the 152-byte little-endian layout
    pub fn to_bytes(&self) -> [u8; TELEMETRY_RECORD_SIZE] {
        let mut out = [0u8; TELEMETRY_RECORD_SIZE];
        let mut buf = &mut out[..];

        buf.put_u8(u8::from(self.link_up));
        buf.put_bytes(0, 3);
        buf.put_u32_le(self.last_receive_ms);
        for channel in self.channels {
            buf.put_i32_le(channel);
        }
        buf.put_f64_le(self.latitude);
        buf.put_f64_le(self.longitude);
        buf.put_f64_le(self.altitude);
        buf.put_f64_le(self.speed);
        buf.put_f32_le(self.voltage);
        buf.put_f32_le(self.current);
        buf.put_f32_le(self.capacity);
        buf.put_u8(self.remaining);
        buf.put_bytes(0, 3);
        buf.put_f32_le(self.roll);
        buf.put_f32_le(self.pitch);
        buf.put_f32_le(self.yaw);
        buf.put_i16_le(self.roll_raw);
        buf.put_i16_le(self.pitch_raw);
        buf.put_i16_le(self.yaw_raw);
        buf.put_bytes(0, 6);
        buf.put_u64_le(self.timestamp_ms);

        out
    }

    /// Parses a record written by [`TelemetryRecord::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TELEMETRY_RECORD_SIZE {
            return Err(BridgeError::CrsfProtocol(format!(
                "Telemetry record must be {} bytes, got {}",
                TELEMETRY_RECORD_SIZE,
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let link_up = buf.get_u8() != 0;
        buf.advance(3);
        let last_receive_ms = buf.get_u32_le();
        let mut channels = [0i32; CRSF_NUM_CHANNELS];
        for channel in channels.iter_mut() {
            *channel = buf.get_i32_le();
        }
        let latitude = buf.get_f64_le();
        let longitude = buf.get_f64_le();
        let altitude = buf.get_f64_le();
        let speed = buf.get_f64_le();
        let voltage = buf.get_f32_le();
        let current = buf.get_f32_le();
        let capacity = buf.get_f32_le();
        let remaining = buf.get_u8();
        buf.advance(3);
        let roll = buf.get_f32_le();
        let pitch = buf.get_f32_le();
        let yaw = buf.get_f32_le();
        let roll_raw = buf.get_i16_le();
        let pitch_raw = buf.get_i16_le();
        let yaw_raw = buf.get_i16_le();
        buf.advance(6);
        let timestamp_ms = buf.get_u64_le();

        Ok(Self {
            link_up,
            last_receive_ms,
            channels,
            latitude,
            longitude,
            altitude,
            speed,
            voltage,
            current,
            capacity,
            remaining,
            roll,
            pitch,
            yaw,
            roll_raw,
            pitch_raw,
            yaw_raw,
            timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::link::LinkMonitor;
    use crate::crsf::packet::Telemetry;
    use std::time::Duration;

    fn sample_record() -> TelemetryRecord {
        let mut channels = [1500i32; 16];
        channels[2] = 1000;
        TelemetryRecord {
            link_up: true,
            last_receive_ms: 0x0102_0304,
            channels,
            latitude: 10.0,
            longitude: 20.0,
            altitude: 500.0,
            speed: 36.5,
            voltage: 16.8,
            current: 1.0,
            capacity: 100.0,
            remaining: 90,
            roll: 1.5,
            pitch: -2.5,
            yaw: 90.0,
            roll_raw: 262,
            pitch_raw: -436,
            yaw_raw: 15708,
            timestamp_ms: 1_700_000_000_123,
        }
    }

    #[test]
    fn test_record_field_offsets() {
        let bytes = sample_record().to_bytes();
        assert_eq!(bytes.len(), 152);

        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..4], &[0, 0, 0]);
        assert_eq!(&bytes[4..8], &0x0102_0304u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1500i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &1000i32.to_le_bytes());
        assert_eq!(&bytes[72..80], &10.0f64.to_le_bytes());
        assert_eq!(&bytes[80..88], &20.0f64.to_le_bytes());
        assert_eq!(&bytes[88..96], &500.0f64.to_le_bytes());
        assert_eq!(&bytes[96..104], &36.5f64.to_le_bytes());
        assert_eq!(&bytes[104..108], &16.8f32.to_le_bytes());
        assert_eq!(&bytes[112..116], &100.0f32.to_le_bytes());
        assert_eq!(bytes[116], 90);
        assert_eq!(&bytes[120..124], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[128..132], &90.0f32.to_le_bytes());
        assert_eq!(&bytes[132..134], &262i16.to_le_bytes());
        assert_eq!(&bytes[136..138], &15708i16.to_le_bytes());
        assert_eq!(&bytes[138..144], &[0u8; 6]);
        assert_eq!(&bytes[144..152], &1_700_000_000_123u64.to_le_bytes());
    }

    #[test]
    fn test_record_parses_back() {
        let record = sample_record();
        assert_eq!(TelemetryRecord::from_bytes(&record.to_bytes()).unwrap(), record);
        assert!(TelemetryRecord::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_capture_and_convert() {
        let state = SharedState::new(LinkMonitor::new(Duration::from_millis(300), false), 1500, 3, 1000);
        let now = state.started() + Duration::from_millis(250);
        state.on_frame(state.started() + Duration::from_millis(200));

        let mut sensors = SensorState::default();
        sensors.apply(Telemetry::Gps(GpsData {
            latitude: 10.0,
            longitude: 20.0,
            altitude: 500,
            ground_speed: 12.5,
            ..Default::default()
        }));

        let report = TelemetryReport::capture(&state, &sensors, now, 42);
        assert!(report.link.up);
        assert_eq!(report.link.last_receive_ms, Some(200));
        assert_eq!(report.link.age_ms, Some(50));
        assert_eq!(report.channels.get(3), Some(1000));
        assert!(report.battery.is_none());

        let record = TelemetryRecord::from(&report);
        assert!(record.link_up);
        assert_eq!(record.last_receive_ms, 200);
        assert_eq!(record.channels[2], 1000);
        assert_eq!(record.altitude, 500.0);
        assert_eq!(record.speed, 12.5);
        assert_eq!(record.voltage, 0.0);
        assert_eq!(record.timestamp_ms, 42);
    }

    #[test]
    fn test_capture_during_failsafe_reports_safe_throttle() {
        let state = SharedState::new(LinkMonitor::new(Duration::from_millis(300), false), 1500, 3, 1000);
        state.set_channel(3, 1800);

        let report = TelemetryReport::capture(&state, &SensorState::default(), Instant::now(), 1);
        assert!(!report.link.up);
        assert_eq!(report.channels.get(3), Some(1000));
        assert_eq!(report.channels.get(1), Some(1500));
    }

    #[test]
    fn test_report_json_shape() {
        let report = TelemetryReport::default();
        let json = serde_json::to_value(&report).unwrap();
        for key in ["timestamp_ms", "link", "gps", "battery", "attitude", "flight_mode", "channels", "mode"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["channels"].as_array().unwrap().len(), 16);
        assert_eq!(json["mode"], "manual");
    }
}
