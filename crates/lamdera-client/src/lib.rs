//! Client
//!
//! WebSocket adapter speaking the Lamdera-style Wire3 protocol: wraps a
//! raw WebSocket with the binary codec, session/cookie discipline, and
//! leader-avoidance loop from `lamdera_core` and `lamdera_proto`, and
//! exposes a small event-surface API to callers.
//!
//! # Architecture
//!
//! [`Client`] follows the same Sans-IO and action-based patterns as
//! `lamdera_core`. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`])
//! for a driver to execute.
//!
//! # Components
//!
//! - [`Client`]: Sans-IO orchestrator combining the connection state
//!   machine and the leader-avoidance loop
//! - [`ClientEvent`] / [`ClientAction`]: events fed in, actions produced
//! - [`ClientOptions`]: construction-time configuration
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`websocket::LamderaWebSocket`], a real `tokio-tungstenite`-backed
//! driver for [`Client`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod event;
mod options;

#[cfg(feature = "transport")]
pub mod websocket;

pub use client::Client;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
pub use lamdera_core::{ConnectionState, Environment};
pub use options::ClientOptions;
