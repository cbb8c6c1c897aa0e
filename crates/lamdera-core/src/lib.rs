//! Sans-IO connection state machine and leader-avoidance loop.
//!
//! # Architecture
//!
//! Both [`connection::Connection`] and [`leader::LeaderAvoidance`] follow
//! the action pattern: they take inbound data and, where timing matters,
//! an [`env::Environment`] reference, and return actions for the caller
//! (`lamdera_client`) to execute. Neither owns a socket or a clock.
//!
//! - [`env`]: the `Environment` trait, plus [`env::StdEnv`] (production)
//!   and [`env::MockEnv`] (deterministic tests).
//! - [`connection`]: ready state, outbound queue, handshake detection.
//! - [`leader`]: election tracking, retry count, jittered backoff.
//! - [`error`]: error types for both of the above.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod leader;

pub use connection::{Connection, ConnectionAction, ConnectionState};
pub use env::Environment;
pub use error::{ConnectionError, LeaderAvoidanceError};
pub use leader::{ElectionOutcome, LeaderAvoidance, LeaderAvoidanceConfig};
