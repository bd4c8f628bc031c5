//! # Streaming Frame Reader
//!
//! Turns an arbitrary chunked byte stream into validated CRSF frames.
//!
//! Bytes are appended to an internal buffer as they arrive. [`FrameReader::next_frame`]
//! scans for a sync byte, waits until the whole frame is buffered and checks
//! the CRC. A frame with a bad length or CRC costs exactly its sync byte: the
//! reader drops that one byte and scans again, so a real frame hiding behind
//! a corrupt one is still found. Corruption is counted, never returned as an
//! error.

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::crc::crc8_check;
use super::protocol::{CrsfFrame, CRSF_ACCEPTED_SYNC_BYTES, CRSF_MAX_LENGTH, CRSF_MIN_LENGTH};

/// Upper bound on buffered, unparsed bytes
pub const MAX_BUFFERED_BYTES: usize = 4096;

/// Counters describing what the reader has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Valid frames returned
    pub frames: u64,
    /// Candidate frames dropped for a CRC mismatch
    pub crc_errors: u64,
    /// Candidate frames dropped for an impossible length byte
    pub length_errors: u64,
    /// Bytes skipped while hunting for a sync byte or trimmed on overflow
    pub discarded_bytes: u64,
}

/// Incremental CRSF frame decoder
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::encoder::encode_raw_frame;
/// use crsf_bridge::crsf::reader::FrameReader;
///
/// let bytes = encode_raw_frame(0x21, b"ACRO\0").unwrap();
/// let mut reader = FrameReader::new();
///
/// reader.push(&bytes[..3]);
/// assert!(reader.next_frame().is_none()); // need more data
///
/// reader.push(&bytes[3..]);
/// let frame = reader.next_frame().unwrap();
/// assert_eq!(frame.frame_type, 0x21);
/// ```
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    sync: &'static [u8],
    stats: ReaderStats,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Creates a reader accepting the standard CRSF addresses as sync bytes
    pub fn new() -> Self {
        Self::with_sync_bytes(CRSF_ACCEPTED_SYNC_BYTES)
    }

    /// Creates a reader accepting only the given sync bytes
    pub fn with_sync_bytes(sync: &'static [u8]) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            sync,
            stats: ReaderStats::default(),
        }
    }

    /// Appends received bytes
    ///
    /// If the buffer would exceed [`MAX_BUFFERED_BYTES`], the oldest bytes are dropped.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);

        if self.buf.len() > MAX_BUFFERED_BYTES {
            let excess = self.buf.len() - MAX_BUFFERED_BYTES;
            self.buf.advance(excess);
            self.stats.discarded_bytes += excess as u64;
        }
    }

    /// Returns the next complete, valid frame, or `None` if more data is needed
    pub fn next_frame(&mut self) -> Option<CrsfFrame> {
        loop {
            match self.buf.iter().position(|b| self.sync.contains(b)) {
                Some(0) => {}
                Some(pos) => {
                    self.buf.advance(pos);
                    self.stats.discarded_bytes += pos as u64;
                }
                None => {
                    self.stats.discarded_bytes += self.buf.len() as u64;
                    self.buf.clear();
                    return None;
                }
            }

            if self.buf.len() < 2 {
                return None;
            }

            let length = self.buf[1];
            if !(CRSF_MIN_LENGTH..=CRSF_MAX_LENGTH).contains(&length) {
                trace!("Dropping sync byte: invalid length {}", length);
                self.stats.length_errors += 1;
                self.resync();
                continue;
            }

            let total = length as usize + 2;
            if self.buf.len() < total {
                return None;
            }

            if !crc8_check(&self.buf[2..total - 1], self.buf[total - 1]) {
                trace!("Dropping sync byte: CRC mismatch on type 0x{:02X}", self.buf[2]);
                self.stats.crc_errors += 1;
                self.resync();
                continue;
            }

            let raw = self.buf.split_to(total);
            self.stats.frames += 1;

            return Some(CrsfFrame {
                address: raw[0],
                frame_type: raw[2],
                payload: raw[3..total - 1].to_vec(),
            });
        }
    }

    /// Drains every frame currently available
    pub fn drain_frames(&mut self) -> Vec<CrsfFrame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Counters since creation
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Number of buffered, not yet parsed bytes
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn resync(&mut self) {
        self.buf.advance(1);
        self.stats.discarded_bytes += 1;
    }
}
