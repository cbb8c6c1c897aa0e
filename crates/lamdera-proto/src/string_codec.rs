//! Length-prefixed UTF-8 strings on top of the signed varint.
//!
//! The length prefix counts UTF-8 bytes, not Unicode scalar values, so a
//! decoder never needs to re-scan the string to find its end.

#![allow(clippy::expect_used, reason = "non-negative byte length always encodes")]

use crate::{
    errors::{ProtocolError, Result},
    varint,
};

/// Encodes `s` as `signed_varint(byte_len(s)) ++ utf8(s)`.
#[must_use]
pub fn encode_string(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    // `bytes.len()` always fits in an i64 for any string we can hold in memory.
    let mut out = varint::encode_signed(bytes.len() as i64)
        .expect("non-negative byte length always encodes");
    out.extend_from_slice(bytes);
    out
}

/// Decodes a length-prefixed UTF-8 string, returning the string and the
/// number of bytes consumed (prefix + payload).
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidLength`] if the decoded length prefix is
/// negative, [`ProtocolError::Truncated`] if fewer bytes remain than
/// declared, and [`ProtocolError::InvalidUtf8`] if the payload bytes are not
/// valid UTF-8.
pub fn decode_string(buf: &[u8]) -> Result<(String, usize)> {
    let (len, prefix_len) = varint::decode_signed(buf)?;
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }
    let len = len as usize;

    let payload_start = prefix_len;
    let payload_end = payload_start
        .checked_add(len)
        .ok_or(ProtocolError::Truncated { expected: len, actual: 0 })?;
    if buf.len() < payload_end {
        return Err(ProtocolError::Truncated { expected: payload_end, actual: buf.len() });
    }

    let s = std::str::from_utf8(&buf[payload_start..payload_end])?.to_owned();
    Ok((s, payload_end))
}
