//! Decoding of fixed-width channel readings.
//!
//! The device sends each reading as three big-endian bytes. The firmware
//! describes the field as a signed 20-bit value, but the data observed on
//! the wire is combined as a plain unsigned 24-bit integer and kept that way.

use crate::error::DecodeError;

/// Width of a raw reading in bytes.
pub const READING_LEN: usize = 3;

/// Largest value a reading can decode to.
pub const MAX_SAMPLE: u32 = 0x00FF_FFFF;

/// Decode one raw reading into a sample in `0..=MAX_SAMPLE`.
pub fn decode(raw: &[u8]) -> Result<u32, DecodeError> {
    match *raw {
        [b0, b1, b2] => Ok((u32::from(b0) << 16) | (u32::from(b1) << 8) | u32::from(b2)),
        _ => Err(DecodeError::UnexpectedLength {
            expected: READING_LEN,
            actual: raw.len(),
        }),
    }
}
