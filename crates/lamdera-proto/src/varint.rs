//! Zigzag mapping and the range-partitioned variable-length integer encoding.
//!
//! Unlike a continuation-bit varint, each byte length here owns a disjoint
//! range of values and the first byte (or a fixed marker) identifies which
//! range was used. This keeps the common case (small non-negative integers,
//! which dominate string lengths and tags) at one byte while still reaching
//! full 64-bit range through a float64 fallback form.
//!
//! # Layout
//!
//! | Range of N | Bytes | First byte |
//! |---|---|---|
//! | 0..=215 | 1 | N itself |
//! | 216..=9431 | 2 | 216 + (N-216)/256, in [216, 251] |
//! | 9432..=65535 | 3 | 252 |
//! | 65536..=2^24-1 | 4 | 253 |
//! | 2^24..=2^32-1 | 5 | 254 |
//! | N >= 2^32 | 9 | 255, payload is IEEE-754 float64 little-endian |
//!
//! The 9-byte form loses precision above 2^53; callers must not rely on
//! exact round-trips for integers beyond that bound.

use crate::errors::{ProtocolError, Result};

const MARKER_3: u8 = 252;
const MARKER_4: u8 = 253;
const MARKER_5: u8 = 254;
const MARKER_FLOAT: u8 = 255;

const RANGE_1_MAX: u64 = 215;
const RANGE_2_BASE: u64 = 216;
const RANGE_2_MAX: u64 = 9431;
const RANGE_3_MAX: u64 = 65_535;
const RANGE_4_MAX: u64 = (1u64 << 24) - 1;
const RANGE_5_MAX: u64 = (1u64 << 32) - 1;

/// Maps a signed integer to an unsigned one so that small magnitudes (in
/// either direction) stay small, keeping the one-byte fast path useful for
/// negative numbers too.
#[must_use]
pub fn zigzag_encode(n: i64) -> u64 {
    let n = i128::from(n);
    (if n >= 0 { n * 2 } else { -n * 2 - 1 }) as u64
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub fn zigzag_decode(u: u64) -> i64 {
    let u = u128::from(u);
    (if u % 2 == 0 { (u / 2) as i128 } else { -(((u + 1) / 2) as i128) }) as i64
}

/// Encodes a non-negative integer using the range-partitioned layout above.
///
/// # Errors
///
/// Returns [`ProtocolError::NegativeInput`] if `n` is negative.
pub fn encode_unsigned(n: i64) -> Result<Vec<u8>> {
    if n < 0 {
        return Err(ProtocolError::NegativeInput(n));
    }
    let n = n as u64;

    Ok(match n {
        0..=RANGE_1_MAX => vec![n as u8],
        RANGE_2_BASE..=RANGE_2_MAX => {
            let offset = n - RANGE_2_BASE;
            vec![(RANGE_2_BASE + offset / 256) as u8, (offset % 256) as u8]
        },
        n if n <= RANGE_3_MAX => vec![MARKER_3, (n >> 8) as u8, (n & 0xFF) as u8],
        n if n <= RANGE_4_MAX => {
            vec![MARKER_4, (n >> 16) as u8, ((n >> 8) & 0xFF) as u8, (n & 0xFF) as u8]
        },
        n if n <= RANGE_5_MAX => {
            let bytes = (n as u32).to_be_bytes();
            vec![MARKER_5, bytes[0], bytes[1], bytes[2], bytes[3]]
        },
        n => {
            let mut out = vec![MARKER_FLOAT];
            out.extend_from_slice(&(n as f64).to_le_bytes());
            out
        },
    })
}

/// Decodes a non-negative integer, returning the value and the number of
/// bytes consumed.
///
/// # Errors
///
/// Returns [`ProtocolError::Truncated`] if `buf` is shorter than the form
/// the first byte declares.
pub fn decode_unsigned(buf: &[u8]) -> Result<(i64, usize)> {
    let &b0 = buf.first().ok_or(ProtocolError::Truncated { expected: 1, actual: 0 })?;

    match b0 {
        0..=215 => Ok((i64::from(b0), 1)),
        216..=251 => {
            let b1 = need(buf, 2)?[1];
            let value = RANGE_2_BASE + u64::from(b0 - 216) * 256 + u64::from(b1);
            Ok((value as i64, 2))
        },
        MARKER_3 => {
            let b = need(buf, 3)?;
            let value = (u64::from(b[1]) << 8) | u64::from(b[2]);
            Ok((value as i64, 3))
        },
        MARKER_4 => {
            let b = need(buf, 4)?;
            let value = (u64::from(b[1]) << 16) | (u64::from(b[2]) << 8) | u64::from(b[3]);
            Ok((value as i64, 4))
        },
        MARKER_5 => {
            let b = need(buf, 5)?;
            let value = u32::from_be_bytes([b[1], b[2], b[3], b[4]]);
            Ok((i64::from(value), 5))
        },
        MARKER_FLOAT => {
            let b = need(buf, 9)?;
            let mut float_bytes = [0u8; 8];
            float_bytes.copy_from_slice(&b[1..9]);
            let value = f64::from_le_bytes(float_bytes);
            Ok((value.floor() as i64, 9))
        },
    }
}

fn need(buf: &[u8], len: usize) -> Result<&[u8]> {
    if buf.len() < len {
        return Err(ProtocolError::Truncated { expected: len, actual: buf.len() });
    }
    Ok(&buf[..len])
}

/// Encodes a signed integer as `encode_unsigned(zigzag_encode(x))`.
///
/// # Errors
///
/// Never fails in practice (zigzag always produces a non-negative value);
/// the `Result` is kept for symmetry with [`encode_unsigned`].
pub fn encode_signed(x: i64) -> Result<Vec<u8>> {
    encode_unsigned(zigzag_encode(x) as i64)
}

/// Inverse of [`encode_signed`].
///
/// # Errors
///
/// See [`decode_unsigned`].
pub fn decode_signed(buf: &[u8]) -> Result<(i64, usize)> {
    let (u, len) = decode_unsigned(buf)?;
    Ok((zigzag_decode(u as u64), len))
}
