//! # CRSF Protocol Constants and Types
//!
//! Core protocol definitions for CRSF (Crossfire) communication.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Flight controller address, used as the sync byte of every outbound frame
pub const CRSF_SYNC_BYTE: u8 = 0xC8;

/// Radio transmitter (handset) address
pub const CRSF_ADDRESS_RADIO_TRANSMITTER: u8 = 0xEA;

/// CRSF transmitter module address
pub const CRSF_ADDRESS_CRSF_TRANSMITTER: u8 = 0xEE;

/// Addresses accepted as the first byte of an inbound frame
pub const CRSF_ACCEPTED_SYNC_BYTES: &[u8] = &[
    CRSF_SYNC_BYTE,
    CRSF_ADDRESS_RADIO_TRANSMITTER,
    CRSF_ADDRESS_CRSF_TRANSMITTER,
];

/// Maximum frame size on the wire (sync + length + type + payload + crc)
pub const CRSF_MAX_FRAME_SIZE: usize = 64;

/// Maximum CRSF payload size
/// Frame structure: sync(1) + length(1) + type(1) + payload(N) + crc(1)
pub const CRSF_MAX_PAYLOAD_SIZE: usize = CRSF_MAX_FRAME_SIZE - 4;

/// Smallest legal length byte (type + crc)
pub const CRSF_MIN_LENGTH: u8 = 2;

/// Largest legal length byte (type + max payload + crc)
pub const CRSF_MAX_LENGTH: u8 = (CRSF_MAX_PAYLOAD_SIZE + 2) as u8;

/// RC channels payload size (22 bytes for 16 channels × 11 bits)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// RC channels frame length (type + payload + crc)
pub const CRSF_RC_CHANNELS_FRAME_LENGTH: u8 = 0x18; // 24 bytes

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// 11-bit wire codes for the ends and middle of the channel range
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 172;
pub const CRSF_CHANNEL_VALUE_CENTER: u16 = 992;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 1811;

/// Largest value an 11-bit code can hold
pub const CRSF_CHANNEL_CODE_MASK: u16 = 0x7FF;

/// Channel values in microseconds
pub const CHANNEL_US_MIN: u16 = 1000;
pub const CHANNEL_US_CENTER: u16 = 1500;
pub const CHANNEL_US_MAX: u16 = 2000;

/// Link Statistics payload size
pub const CRSF_LINK_STATS_PAYLOAD_SIZE: usize = 10;

/// Battery Sensor payload size
pub const CRSF_BATTERY_SENSOR_PAYLOAD_SIZE: usize = 8;

/// GPS payload size
pub const CRSF_GPS_PAYLOAD_SIZE: usize = 15;

/// Attitude payload size (pitch, roll, yaw as i16)
pub const CRSF_ATTITUDE_PAYLOAD_SIZE: usize = 6;

/// GPS altitude is sent with this bias added, in meters
pub const CRSF_GPS_ALTITUDE_OFFSET: i32 = 1000;

/// Attitude angles are sent in units of 100 µrad
pub const CRSF_ATTITUDE_SCALE: f32 = 10_000.0;

/// RC channels array type (16 channels, 11-bit wire codes)
pub type RcChannels = [u16; CRSF_NUM_CHANNELS];

/// Frame type tag.
///
/// Known tags get their own variant; everything else is kept as `Unknown`
/// so the dispatcher can skip it without losing what it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Gps,
    BatterySensor,
    LinkStatistics,
    RcChannelsPacked,
    Attitude,
    FlightMode,
    Unknown(u8),
}

impl FrameType {
    /// Wire value of the tag
    pub const fn as_u8(self) -> u8 {
        match self {
            FrameType::Gps => 0x02,
            FrameType::BatterySensor => 0x08,
            FrameType::LinkStatistics => 0x14,
            FrameType::RcChannelsPacked => 0x16,
            FrameType::Attitude => 0x1E,
            FrameType::FlightMode => 0x21,
            FrameType::Unknown(tag) => tag,
        }
    }
}

impl From<u8> for FrameType {
    fn from(tag: u8) -> Self {
        match tag {
            0x02 => FrameType::Gps,
            0x08 => FrameType::BatterySensor,
            0x14 => FrameType::LinkStatistics,
            0x16 => FrameType::RcChannelsPacked,
            0x1E => FrameType::Attitude,
            0x21 => FrameType::FlightMode,
            other => FrameType::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> Self {
        frame_type.as_u8()
    }
}

/// The 16 logical RC channels, in microseconds.
///
/// Channels are addressed 1-16 through [`ChannelSet::get`] and
/// [`ChannelSet::set`]; the raw array is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSet(pub [u16; CRSF_NUM_CHANNELS]);

impl Default for ChannelSet {
    fn default() -> Self {
        Self([CHANNEL_US_CENTER; CRSF_NUM_CHANNELS])
    }
}

impl ChannelSet {
    /// Returns the value of a 1-based channel.
    pub fn get(&self, channel: usize) -> Option<u16> {
        channel
            .checked_sub(1)
            .and_then(|idx| self.0.get(idx))
            .copied()
    }

    /// Sets a 1-based channel. Returns false if the channel does not exist.
    pub fn set(&mut self, channel: usize, value: u16) -> bool {
        match channel.checked_sub(1).and_then(|idx| self.0.get_mut(idx)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Raw values, index 0 = channel 1
    pub fn values(&self) -> &[u16; CRSF_NUM_CHANNELS] {
        &self.0
    }
}

/// Link statistics telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkStatistics {
    /// Uplink RSSI (antenna 1) in -dBm
    pub uplink_rssi_1: u8,

    /// Uplink RSSI (antenna 2) in -dBm (diversity)
    pub uplink_rssi_2: u8,

    /// Uplink link quality (0-100%)
    pub uplink_link_quality: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Active antenna (0 or 1)
    pub active_antenna: u8,

    /// RF mode / packet rate
    pub rf_mode: u8,

    /// Uplink TX power (encoded)
    pub uplink_tx_power: u8,

    /// Downlink RSSI in -dBm
    pub downlink_rssi: u8,

    /// Downlink link quality (0-100%)
    pub downlink_link_quality: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,
}

/// Battery sensor telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BatterySensor {
    /// Battery voltage in volts
    pub voltage: f32,

    /// Current draw in amperes
    pub current: f32,

    /// Capacity used in mAh
    pub capacity_used: u32,

    /// Battery remaining percentage (0-100%)
    pub remaining_percent: u8,
}

/// GPS telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsData {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Ground speed in km/h
    pub ground_speed: f32,

    /// Heading in degrees
    pub heading: f32,

    /// Altitude in meters (bias removed)
    pub altitude: i32,

    /// Number of satellites
    pub satellites: u8,
}

/// Attitude telemetry data.
///
/// Raw values are the wire integers (100 µrad units); the float fields are
/// the same angles converted to degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AttitudeData {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub pitch_raw: i16,
    pub roll_raw: i16,
    pub yaw_raw: i16,
}

impl AttitudeData {
    /// Builds attitude from raw wire values
    pub fn from_raw(pitch_raw: i16, roll_raw: i16, yaw_raw: i16) -> Self {
        let to_degrees = |raw: i16| (raw as f32 / CRSF_ATTITUDE_SCALE).to_degrees();
        Self {
            pitch: to_degrees(pitch_raw),
            roll: to_degrees(roll_raw),
            yaw: to_degrees(yaw_raw),
            pitch_raw,
            roll_raw,
            yaw_raw,
        }
    }
}

/// CRSF frame structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrsfFrame {
    /// Sync/address byte the frame started with
    pub address: u8,

    /// Frame type
    pub frame_type: u8,

    /// Payload data
    pub payload: Vec<u8>,
}

impl CrsfFrame {
    /// Create a new CRSF frame addressed to the flight controller
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds CRSF_MAX_PAYLOAD_SIZE (60 bytes)
    pub fn new(frame_type: u8, payload: Vec<u8>) -> Result<Self> {
        Self::with_address(CRSF_SYNC_BYTE, frame_type, payload)
    }

    /// Create a new CRSF frame with an explicit sync/address byte
    pub fn with_address(address: u8, frame_type: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > CRSF_MAX_PAYLOAD_SIZE {
            return Err(BridgeError::CrsfProtocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                CRSF_MAX_PAYLOAD_SIZE
            )));
        }

        Ok(Self {
            address,
            frame_type,
            payload,
        })
    }

    /// Get frame length byte (type + payload + crc)
    ///
    /// Cannot overflow since payload is validated to be ≤ 60 bytes
    pub fn length(&self) -> u8 {
        (1 + self.payload.len() + 1) as u8
    }

    /// Typed view of the frame tag
    pub fn kind(&self) -> FrameType {
        FrameType::from(self.frame_type)
    }
}
