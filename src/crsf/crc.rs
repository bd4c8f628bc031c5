//! # CRC8-DVB-S2
//!
//! Frame checksum used by CRSF. Computed over the type byte and the payload;
//! the sync and length bytes are not covered.
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00

/// CRC-8-DVB-S2 polynomial
const CRC8_POLY: u8 = 0xD5;

/// Lookup table, built at compile time
const CRC8_TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;

        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the CRC8-DVB-S2 checksum of `data`.
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::crc::{crc8_check, crc8_dvb_s2};
///
/// let data = [0x16, 0x00, 0x04];
/// let crc = crc8_dvb_s2(&data);
/// assert!(crc8_check(&data, crc));
/// ```
pub fn crc8_dvb_s2(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// Returns true when `expected` is the checksum of `data`.
#[inline]
pub fn crc8_check(data: &[u8], expected: u8) -> bool {
    crc8_dvb_s2(data) == expected
}
