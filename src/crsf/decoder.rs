//! # CRSF Packet Decoder
//!
//! Validates single frames and decodes telemetry and RC channel payloads.

use super::crc::crc8_check;
use super::protocol::*;
use crate::error::{BridgeError, Result};

/// Decode a complete CRSF frame
///
/// # Arguments
///
/// * `frame` - Complete CRSF frame bytes (including sync, length, type, payload, crc)
///
/// # Errors
///
/// Returns error if:
/// - Frame is too short
/// - Sync byte is not an accepted address
/// - Length byte is out of range
/// - CRC check fails
pub fn decode_frame(frame: &[u8]) -> Result<CrsfFrame> {
    // Minimum frame size: sync(1) + length(1) + type(1) + crc(1) = 4 bytes
    if frame.len() < 4 {
        return Err(BridgeError::CrsfProtocol("Frame too short".to_string()));
    }

    if !CRSF_ACCEPTED_SYNC_BYTES.contains(&frame[0]) {
        return Err(BridgeError::CrsfProtocol(format!(
            "Invalid sync byte: 0x{:02X}",
            frame[0]
        )));
    }

    let length = frame[1];
    if !(CRSF_MIN_LENGTH..=CRSF_MAX_LENGTH).contains(&length) {
        return Err(BridgeError::CrsfProtocol(format!(
            "Invalid length byte: {}",
            length
        )));
    }

    let length = length as usize;
    if frame.len() < 2 + length {
        return Err(BridgeError::CrsfProtocol(format!(
            "Frame too short: expected {} bytes, got {}",
            2 + length,
            frame.len()
        )));
    }

    // CRC covers type + payload
    let received_crc = frame[1 + length];
    let covered = &frame[2..1 + length];
    if !crc8_check(covered, received_crc) {
        return Err(BridgeError::CrsfProtocol(format!(
            "CRC mismatch on frame type 0x{:02X}",
            frame[2]
        )));
    }

    CrsfFrame::with_address(frame[0], frame[2], frame[3..1 + length].to_vec())
}

fn ensure_len(payload: &[u8], needed: usize, what: &str) -> Result<()> {
    if payload.len() < needed {
        return Err(BridgeError::CrsfProtocol(format!(
            "{} payload too short: {} bytes",
            what,
            payload.len()
        )));
    }
    Ok(())
}

/// Decode Link Statistics telemetry packet (10 bytes)
pub fn decode_link_statistics(payload: &[u8]) -> Result<LinkStatistics> {
    ensure_len(payload, CRSF_LINK_STATS_PAYLOAD_SIZE, "Link stats")?;

    Ok(LinkStatistics {
        uplink_rssi_1: payload[0],
        uplink_rssi_2: payload[1],
        uplink_link_quality: payload[2],
        uplink_snr: payload[3] as i8,
        active_antenna: payload[4],
        rf_mode: payload[5],
        uplink_tx_power: payload[6],
        downlink_rssi: payload[7],
        downlink_link_quality: payload[8],
        downlink_snr: payload[9] as i8,
    })
}

/// Decode Battery Sensor telemetry packet (8 bytes)
///
/// Big-endian fields: voltage in 0.1 V, current in 0.1 A, 24-bit consumed
/// capacity in mAh, remaining percentage.
pub fn decode_battery_sensor(payload: &[u8]) -> Result<BatterySensor> {
    ensure_len(payload, CRSF_BATTERY_SENSOR_PAYLOAD_SIZE, "Battery sensor")?;

    let voltage_dv = u16::from_be_bytes([payload[0], payload[1]]);
    let current_da = u16::from_be_bytes([payload[2], payload[3]]);
    let capacity_used = u32::from_be_bytes([0, payload[4], payload[5], payload[6]]);

    Ok(BatterySensor {
        voltage: voltage_dv as f32 / 10.0,
        current: current_da as f32 / 10.0,
        capacity_used,
        remaining_percent: payload[7],
    })
}

/// Decode GPS telemetry packet (15 bytes)
pub fn decode_gps(payload: &[u8]) -> Result<GpsData> {
    ensure_len(payload, CRSF_GPS_PAYLOAD_SIZE, "GPS")?;

    // Latitude / longitude: degrees × 10^7
    let lat_raw = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let lon_raw = i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

    // Ground speed: km/h × 10
    let speed_raw = u16::from_be_bytes([payload[8], payload[9]]);

    // Heading: degrees × 100
    let heading_raw = u16::from_be_bytes([payload[10], payload[11]]);

    // Altitude: meters + 1000
    let altitude_raw = u16::from_be_bytes([payload[12], payload[13]]);

    Ok(GpsData {
        latitude: lat_raw as f64 / 10_000_000.0,
        longitude: lon_raw as f64 / 10_000_000.0,
        ground_speed: speed_raw as f32 / 10.0,
        heading: heading_raw as f32 / 100.0,
        altitude: altitude_raw as i32 - CRSF_GPS_ALTITUDE_OFFSET,
        satellites: payload[14],
    })
}

/// Decode Attitude telemetry packet (pitch, roll, yaw; i16 big-endian)
pub fn decode_attitude(payload: &[u8]) -> Result<AttitudeData> {
    ensure_len(payload, CRSF_ATTITUDE_PAYLOAD_SIZE, "Attitude")?;

    let pitch = i16::from_be_bytes([payload[0], payload[1]]);
    let roll = i16::from_be_bytes([payload[2], payload[3]]);
    let yaw = i16::from_be_bytes([payload[4], payload[5]]);

    Ok(AttitudeData::from_raw(pitch, roll, yaw))
}

/// Decode Flight Mode packet (null-terminated string)
pub fn decode_flight_mode(payload: &[u8]) -> Result<String> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    Ok(String::from_utf8_lossy(&payload[..end]).into_owned())
}

/// Unpack the 22-byte RC channels payload into 16 wire codes
pub fn decode_rc_channels_payload(payload: &[u8]) -> Result<RcChannels> {
    ensure_len(payload, CRSF_RC_CHANNELS_PAYLOAD_SIZE, "RC channels")?;

    let mut channels = [0u16; CRSF_NUM_CHANNELS];
    let mut acc: u32 = 0;
    let mut acc_bits = 0u32;
    let mut bytes = payload.iter();

    for code in channels.iter_mut() {
        while acc_bits < 11 {
            // length checked above, 22 bytes hold exactly 16 codes
            let byte = bytes.next().copied().unwrap_or(0);
            acc |= (byte as u32) << acc_bits;
            acc_bits += 8;
        }
        *code = (acc as u16) & CRSF_CHANNEL_CODE_MASK;
        acc >>= 11;
        acc_bits -= 11;
    }

    Ok(channels)
}

/// Map an 11-bit wire code back to microseconds (inverse of `us_to_ticks`)
pub fn ticks_to_us(ticks: u16) -> u16 {
    let span_ticks = (CRSF_CHANNEL_VALUE_MAX - CRSF_CHANNEL_VALUE_MIN) as i32;
    let span_us = (CHANNEL_US_MAX - CHANNEL_US_MIN) as i32;

    let num = (ticks as i32 - CRSF_CHANNEL_VALUE_MIN as i32) * span_us;
    let offset = if num >= 0 {
        (num + span_ticks / 2) / span_ticks
    } else {
        (num - span_ticks / 2) / span_ticks
    };

    (CHANNEL_US_MIN as i32 + offset).clamp(0, u16::MAX as i32) as u16
}

/// Convert wire codes to a channel set in microseconds
pub fn rc_to_channel_set(rc: &RcChannels) -> ChannelSet {
    let mut channels = ChannelSet::default();
    for (us, &code) in channels.0.iter_mut().zip(rc) {
        *us = ticks_to_us(code);
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::encoder::{
        encode_channel_set_frame, encode_raw_frame, encode_rc_channels_payload, us_to_ticks,
    };

    #[test]
    fn test_decode_frame_too_short() {
        assert!(decode_frame(&[CRSF_SYNC_BYTE, 0x03]).is_err());
    }

    #[test]
    fn test_decode_frame_invalid_sync() {
        assert!(decode_frame(&[0xFF, 0x02, 0x16, 0x00]).is_err());
    }

    #[test]
    fn test_decode_frame_invalid_length() {
        assert!(decode_frame(&[CRSF_SYNC_BYTE, 0x01, 0x16, 0x00]).is_err());
        assert!(decode_frame(&[CRSF_SYNC_BYTE, 0x50, 0x16, 0x00]).is_err());
    }

    #[test]
    fn test_decode_valid_rc_channels_frame() {
        let frame = encode_channel_set_frame(&ChannelSet::default());
        let decoded = decode_frame(&frame).unwrap();

        assert_eq!(decoded.frame_type, 0x16);
        assert_eq!(decoded.payload.len(), 22);
    }

    #[test]
    fn test_decode_frame_crc_error() {
        let mut frame = encode_channel_set_frame(&ChannelSet::default());
        frame[25] ^= 0xFF;
        assert!(decode_frame(&frame).is_err());
    }

    #[test]
    fn test_encode_decode_frame_preserves_type_and_payload() {
        for (frame_type, payload) in [
            (0x02u8, vec![1u8; 15]),
            (0x21, b"ANGL\0".to_vec()),
            (0x7F, vec![]),
            (0x08, (0u8..60).collect::<Vec<_>>()),
        ] {
            let bytes = encode_raw_frame(frame_type, &payload).unwrap();
            let decoded = decode_frame(&bytes).unwrap();
            assert_eq!(decoded.frame_type, frame_type);
            assert_eq!(decoded.payload, payload);
        }
    }

    #[test]
    fn test_decode_link_statistics() {
        let payload = [100u8, 95, 80, 10, 0, 0, 20, 90, 85, 12];
        let stats = decode_link_statistics(&payload).unwrap();

        assert_eq!(stats.uplink_rssi_1, 100);
        assert_eq!(stats.uplink_link_quality, 80);
        assert_eq!(stats.uplink_snr, 10);
        assert_eq!(stats.downlink_rssi, 90);
        assert_eq!(stats.downlink_snr, 12);

        assert!(decode_link_statistics(&payload[..5]).is_err());
    }

    #[test]
    fn test_decode_battery_sensor() {
        let payload = [
            0x00, 0xA8, // Voltage: 168 dV = 16.8 V
            0x00, 0x7D, // Current: 125 dA = 12.5 A
            0x00, 0x03, 0xE8, // Capacity: 1000 mAh
            0x4B, // Remaining: 75%
        ];

        let battery = decode_battery_sensor(&payload).unwrap();
        assert!((battery.voltage - 16.8).abs() < 0.01);
        assert!((battery.current - 12.5).abs() < 0.01);
        assert_eq!(battery.capacity_used, 1000);
        assert_eq!(battery.remaining_percent, 75);

        assert!(decode_battery_sensor(&payload[..4]).is_err());
    }

    #[test]
    fn test_decode_gps_scenario() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&100_000_000i32.to_be_bytes()); // 10.0°
        payload.extend_from_slice(&200_000_000i32.to_be_bytes()); // 20.0°
        payload.extend_from_slice(&255u16.to_be_bytes()); // 25.5 km/h
        payload.extend_from_slice(&9000u16.to_be_bytes()); // 90.0°
        payload.extend_from_slice(&1500u16.to_be_bytes()); // 500 m
        payload.push(12);

        let gps = decode_gps(&payload).unwrap();
        assert!((gps.latitude - 10.0).abs() < 1e-9);
        assert!((gps.longitude - 20.0).abs() < 1e-9);
        assert!((gps.ground_speed - 25.5).abs() < 0.01);
        assert!((gps.heading - 90.0).abs() < 0.01);
        assert_eq!(gps.altitude, 500);
        assert_eq!(gps.satellites, 12);
    }

    #[test]
    fn test_decode_gps_negative_coordinates() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&377_749_000i32.to_be_bytes());
        payload.extend_from_slice(&(-1_224_194_000i32).to_be_bytes());
        payload.extend_from_slice(&[0, 0, 0, 0]);
        payload.extend_from_slice(&900u16.to_be_bytes()); // below the bias: -100 m
        payload.push(0);

        let gps = decode_gps(&payload).unwrap();
        assert!((gps.latitude - 37.7749).abs() < 1e-6);
        assert!((gps.longitude + 122.4194).abs() < 1e-6);
        assert_eq!(gps.altitude, -100);

        assert!(decode_gps(&payload[..10]).is_err());
    }

    #[test]
    fn test_decode_attitude() {
        let payload = [0x13, 0x88, 0xEC, 0x78, 0x00, 0x00]; // 5000, -5000, 0
        let attitude = decode_attitude(&payload).unwrap();
        assert_eq!(attitude.pitch_raw, 5000);
        assert_eq!(attitude.roll_raw, -5000);
        assert_eq!(attitude.yaw_raw, 0);
        assert!((attitude.pitch - 28.648).abs() < 0.01);

        assert!(decode_attitude(&payload[..4]).is_err());
    }

    #[test]
    fn test_decode_flight_mode() {
        assert_eq!(decode_flight_mode(b"ACRO\0").unwrap(), "ACRO");
        assert_eq!(decode_flight_mode(b"HOR").unwrap(), "HOR");
        assert_eq!(decode_flight_mode(b"").unwrap(), "");
    }

    #[test]
    fn test_rc_payload_unpack_inverts_pack() {
        let mut codes = [0u16; CRSF_NUM_CHANNELS];
        for (i, code) in codes.iter_mut().enumerate() {
            *code = (i as u16 * 131 + 7) & CRSF_CHANNEL_CODE_MASK;
        }
        let payload = encode_rc_channels_payload(&codes);
        assert_eq!(decode_rc_channels_payload(&payload).unwrap(), codes);

        assert!(decode_rc_channels_payload(&payload[..21]).is_err());
    }

    #[test]
    fn test_channel_quantization_within_one_step() {
        for us in 1000u16..=2000 {
            let back = ticks_to_us(us_to_ticks(us));
            assert!(
                (back as i32 - us as i32).abs() <= 1,
                "{} us came back as {}",
                us,
                back
            );
        }
    }

    #[test]
    fn test_ticks_to_us_endpoints() {
        assert_eq!(ticks_to_us(CRSF_CHANNEL_VALUE_MIN), 1000);
        assert_eq!(ticks_to_us(CRSF_CHANNEL_VALUE_CENTER), 1500);
        assert_eq!(ticks_to_us(CRSF_CHANNEL_VALUE_MAX), 2000);
        // below the nominal range stays ordered
        assert!(ticks_to_us(0) < 1000);
    }
}
