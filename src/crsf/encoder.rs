//! # CRSF Packet Encoder
//!
//! Builds complete frames and packs RC channels into the 22-byte payload.

use super::crc::crc8_dvb_s2;
use super::protocol::*;
use crate::error::Result;

/// Encode a frame into its wire form
///
/// Output is `sync + length + type + payload + crc`, ready for a single
/// transport write. The CRC covers type and payload only.
pub fn encode_frame(frame: &CrsfFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.payload.len() + 4);
    out.push(frame.address);
    out.push(frame.length());
    out.push(frame.frame_type);
    out.extend_from_slice(&frame.payload);

    let crc = crc8_dvb_s2(&out[2..]);
    out.push(crc);

    out
}

/// Encode a type tag and payload into a frame addressed to the flight controller
///
/// # Errors
///
/// Returns error if the payload is longer than 60 bytes
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::encoder::encode_raw_frame;
///
/// let bytes = encode_raw_frame(0x21, b"ACRO\0").unwrap();
/// assert_eq!(bytes[0], 0xC8);
/// assert_eq!(bytes[1] as usize, bytes.len() - 2);
/// ```
pub fn encode_raw_frame(frame_type: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let frame = CrsfFrame::new(frame_type, payload.to_vec())?;
    Ok(encode_frame(&frame))
}

/// Map a microsecond value onto the 11-bit wire code
///
/// Input is clamped to 1000-2000 µs, then mapped affinely onto 172-1811.
pub fn us_to_ticks(us: u16) -> u16 {
    let us = us.clamp(CHANNEL_US_MIN, CHANNEL_US_MAX) as u32;
    let span_ticks = (CRSF_CHANNEL_VALUE_MAX - CRSF_CHANNEL_VALUE_MIN) as u32;
    let span_us = (CHANNEL_US_MAX - CHANNEL_US_MIN) as u32;

    let offset = ((us - CHANNEL_US_MIN as u32) * span_ticks + span_us / 2) / span_us;
    CRSF_CHANNEL_VALUE_MIN + offset as u16
}

/// Convert a channel set in microseconds to wire codes
pub fn channel_set_to_rc(channels: &ChannelSet) -> RcChannels {
    let mut rc = [0u16; CRSF_NUM_CHANNELS];
    for (code, &us) in rc.iter_mut().zip(channels.values()) {
        *code = us_to_ticks(us);
    }
    rc
}

/// Encode RC channels into payload (22 bytes)
///
/// Packs 16 channels (11 bits each) as one little-endian bitstream:
/// ```text
/// Byte 0: Ch1[0:7]
/// Byte 1: Ch1[8:10] | Ch2[0:4]
/// Byte 2: Ch2[5:10] | Ch3[0:1]
/// ...
/// ```
pub fn encode_rc_channels_payload(channels: &RcChannels) -> Vec<u8> {
    let mut payload = Vec::with_capacity(CRSF_RC_CHANNELS_PAYLOAD_SIZE);
    let mut acc: u32 = 0;
    let mut acc_bits = 0u32;

    for &code in channels {
        acc |= ((code.min(CRSF_CHANNEL_CODE_MASK)) as u32) << acc_bits;
        acc_bits += 11;

        while acc_bits >= 8 {
            payload.push(acc as u8);
            acc >>= 8;
            acc_bits -= 8;
        }
    }

    payload
}

/// Encode RC channels (wire codes) into a complete CRSF frame
pub fn encode_rc_channels_frame(channels: &RcChannels) -> Vec<u8> {
    let frame = CrsfFrame {
        address: CRSF_SYNC_BYTE,
        frame_type: FrameType::RcChannelsPacked.as_u8(),
        payload: encode_rc_channels_payload(channels),
    };
    encode_frame(&frame)
}

/// Encode a channel set (microseconds) into a complete CRSF frame
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::encoder::encode_channel_set_frame;
/// use crsf_bridge::crsf::protocol::ChannelSet;
///
/// let frame = encode_channel_set_frame(&ChannelSet::default());
/// assert_eq!(frame.len(), 26);
/// ```
pub fn encode_channel_set_frame(channels: &ChannelSet) -> Vec<u8> {
    encode_rc_channels_frame(&channel_set_to_rc(channels))
}
