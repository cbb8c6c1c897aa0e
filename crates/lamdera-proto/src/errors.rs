//! Error types for the Wire3 codec and transport envelope.
//!
//! Decoding failures at the varint/string layer are real errors; the message
//! envelope layer above them converts them into a soft "not a match" result
//! instead of propagating (see [`crate::message::decode_message`]).

use thiserror::Error;

/// Errors produced by the Wire3 codec.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// An unsigned-varint encoder was given a negative integer.
    #[error("negative input: {0}")]
    NegativeInput(i64),

    /// The first byte of a varint did not match any recognized marker.
    #[error("invalid marker byte: {0:#04x}")]
    InvalidMarker(u8),

    /// Fewer bytes remained in the buffer than the encoding declared.
    #[error("truncated: expected {expected} bytes, found {actual}")]
    Truncated {
        /// Bytes required to complete the declared form.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// A string-length prefix decoded to a negative value.
    #[error("invalid string length: {0}")]
    InvalidLength(i64),

    /// String payload bytes were not valid UTF-8.
    #[error("invalid utf-8 in string payload")]
    InvalidUtf8,

    /// JSON envelope parsing failed.
    #[error("json error: {0}")]
    Json(String),

    /// Base64 payload decoding failed.
    #[error("base64 error: {0}")]
    Base64(String),
}

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(_: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64(err.to_string())
    }
}

/// Convenience alias used throughout the codec.
pub type Result<T> = std::result::Result<T, ProtocolError>;
