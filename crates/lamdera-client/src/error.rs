//! Error type returned by the public client surface.

use thiserror::Error;

/// Errors surfaced synchronously to the caller. Everything else (socket
/// errors, leader-avoidance exhaustion, transport parse errors) is
/// delivered through the callback surface instead, per the adapter's
/// error-propagation policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// `send()` was called while the connection is `CLOSING` or `CLOSED`.
    #[error("client is not open")]
    NotOpen,
    /// Construction-time configuration validation failed.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    /// The underlying WebSocket transport reported a fatal error that
    /// prevents it from being driven further (feature = "transport" only).
    #[error("transport error: {0}")]
    Transport(String),
}
