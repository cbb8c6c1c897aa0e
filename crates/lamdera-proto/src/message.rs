//! The tagged message envelope: a one-byte constructor tag followed by
//! exactly one string payload.
//!
//! This is the only message shape the adapter speaks: the host's sum-type
//! encoding assigns constructor ordinals by lexical sort of constructor
//! name, and every application this adapter targets has a leading
//! constructor named `A` carrying a single string. Since `A` is the
//! lexical minimum of any valid constructor-name set, it always receives
//! ordinal 0 — see [`DEFAULT_TAG`].

use crate::string_codec;

/// The constructor ordinal assigned to a to-backend type's first
/// constructor (by convention, `A String`).
pub const DEFAULT_TAG: u8 = 0;

/// Encodes `payload` as `[tag] ++ encode_string(payload)`.
#[must_use]
pub fn encode_message(payload: &str, tag: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(tag);
    out.extend(string_codec::encode_string(payload));
    out
}

/// Decodes a message, but never raises an error: a buffer that is too
/// short, carries the wrong tag, or fails string decoding is reported as
/// `None` ("not a match") rather than propagated. This lets the transport
/// classifier try the message shape and fall back to a protocol frame
/// without special-casing failures.
#[must_use]
pub fn decode_message(buf: &[u8], expected_tag: u8) -> Option<String> {
    let (&tag, rest) = buf.split_first()?;
    if tag != expected_tag {
        return None;
    }
    string_codec::decode_string(rest).ok().map(|(s, _)| s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_vectors() {
        assert_eq!(encode_message("", 0), vec![0x00, 0x00]);
        assert_eq!(encode_message("hi", 0), vec![0x00, 0x04, 0x68, 0x69]);
        assert_eq!(encode_message("hello", 0), vec![
            0x00, 0x0A, 0x68, 0x65, 0x6C, 0x6C, 0x6F
        ]);
    }

    #[test]
    fn round_trip() {
        let encoded = encode_message("ping", DEFAULT_TAG);
        assert_eq!(decode_message(&encoded, DEFAULT_TAG), Some("ping".to_string()));
    }

    #[test]
    fn soft_mismatch_on_wrong_tag() {
        let encoded = encode_message("ping", 0);
        assert_eq!(decode_message(&encoded, 1), None);
    }

    #[test]
    fn soft_mismatch_on_short_buffer() {
        assert_eq!(decode_message(&[], 0), None);
    }

    #[test]
    fn soft_mismatch_on_truncated_string() {
        let mut encoded = encode_message("hello", 0);
        encoded.truncate(encoded.len() - 1);
        assert_eq!(decode_message(&encoded, 0), None);
    }

    #[test]
    fn soft_mismatch_for_every_non_matching_tag() {
        let encoded = encode_message("x", 5);
        for k in 0u16..256 {
            let k = k as u8;
            if k == 5 {
                continue;
            }
            assert_eq!(decode_message(&encoded, k), None);
        }
    }
}
