//! Error types for the connection state machine and leader-avoidance loop.
//!
//! We keep these distinct from `lamdera_proto::ProtocolError`: a protocol
//! decode failure is absorbed by the transport classifier before it ever
//! reaches this layer, so the errors here are about state-machine misuse,
//! not wire malformation.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors from the connection state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// An operation was attempted in a state that does not permit it.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State the connection was in when the operation was attempted.
        state: ConnectionState,
        /// Operation that was attempted.
        operation: String,
    },
}

/// Errors from the leader-avoidance loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaderAvoidanceError {
    /// The retry budget was exhausted without a successful handshake.
    #[error("leader-avoidance retries exhausted after {retry_count} attempt(s)")]
    RetriesExhausted {
        /// Final retry count at the moment of exhaustion.
        retry_count: u32,
    },
}
