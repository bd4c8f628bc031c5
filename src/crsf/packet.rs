//! # Packet Dispatcher
//!
//! Maps validated frames to typed packets and back.
//!
//! | Tag | Packet |
//! |-----|--------|
//! | 0x02 | [`Telemetry::Gps`] |
//! | 0x08 | [`Telemetry::Battery`] |
//! | 0x14 | [`Telemetry::LinkStatistics`] |
//! | 0x16 | [`Packet::RcChannels`] |
//! | 0x1E | [`Telemetry::Attitude`] |
//! | 0x21 | [`Telemetry::FlightMode`] |
//! | other | [`Packet::Unknown`] |

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decoder::{
    decode_attitude, decode_battery_sensor, decode_flight_mode, decode_gps,
    decode_link_statistics, decode_rc_channels_payload, rc_to_channel_set,
};
use super::encoder::{channel_set_to_rc, encode_rc_channels_payload};
use super::protocol::{
    AttitudeData, BatterySensor, ChannelSet, CrsfFrame, FrameType, GpsData, LinkStatistics,
    CRSF_SYNC_BYTE,
};
use crate::error::Result;

/// One decoded telemetry sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Telemetry {
    Gps(GpsData),
    Battery(BatterySensor),
    Attitude(AttitudeData),
    LinkStatistics(LinkStatistics),
    FlightMode(String),
}

/// A typed CRSF packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// RC channel values, already converted to microseconds
    RcChannels(ChannelSet),
    /// Sensor telemetry
    Telemetry(Telemetry),
    /// A frame this bridge does not interpret (or could not decode); skipped
    Unknown { frame_type: u8, len: usize },
}

impl Packet {
    /// Decode a validated frame
    ///
    /// Never fails: unsupported tags and short payloads become [`Packet::Unknown`].
    pub fn from_frame(frame: &CrsfFrame) -> Packet {
        let decoded = match frame.kind() {
            FrameType::Gps => decode_gps(&frame.payload).map(Telemetry::Gps).map(Packet::Telemetry),
            FrameType::BatterySensor => decode_battery_sensor(&frame.payload)
                .map(Telemetry::Battery)
                .map(Packet::Telemetry),
            FrameType::LinkStatistics => decode_link_statistics(&frame.payload)
                .map(Telemetry::LinkStatistics)
                .map(Packet::Telemetry),
            FrameType::Attitude => decode_attitude(&frame.payload)
                .map(Telemetry::Attitude)
                .map(Packet::Telemetry),
            FrameType::FlightMode => decode_flight_mode(&frame.payload)
                .map(Telemetry::FlightMode)
                .map(Packet::Telemetry),
            FrameType::RcChannelsPacked => decode_rc_channels_payload(&frame.payload)
                .map(|rc| Packet::RcChannels(rc_to_channel_set(&rc))),
            FrameType::Unknown(_) => return Packet::unknown(frame),
        };

        decoded.unwrap_or_else(|e| {
            debug!("Undecodable frame 0x{:02X}: {}", frame.frame_type, e);
            Packet::unknown(frame)
        })
    }

    /// Encode an RC channels packet into a frame
    ///
    /// Only RC channels are sent by this bridge; other packets return `None`.
    pub fn to_frame(&self) -> Option<Result<CrsfFrame>> {
        match self {
            Packet::RcChannels(channels) => {
                let payload = encode_rc_channels_payload(&channel_set_to_rc(channels));
                Some(CrsfFrame::with_address(
                    CRSF_SYNC_BYTE,
                    FrameType::RcChannelsPacked.as_u8(),
                    payload,
                ))
            }
            _ => None,
        }
    }

    fn unknown(frame: &CrsfFrame) -> Packet {
        Packet::Unknown {
            frame_type: frame.frame_type,
            len: frame.payload.len(),
        }
    }
}
