//! Connection lifecycle and the outbound message queue.
//!
//! Uses the action pattern: methods take time (and, where relevant, parsed
//! inbound data) and return actions for the driver to execute. The state
//! machine itself never touches a socket.
//!
//! # State machine
//!
//! ```text
//! ┌────────────┐  socket open   ┌──────┐  caller close   ┌─────────┐
//! │ CONNECTING │───────────────>│ OPEN │────────────────>│ CLOSING │
//! └────────────┘                └──────┘                 └─────────┘
//!       ^                          │                           │
//!       │ self-election            │ socket close              │ socket close
//!       │ (leader-avoidance)       ↓                           ↓
//!       └──────────────────── (internal, not CLOSED)     ┌────────┐
//!                                                          │ CLOSED │
//!                                                          └────────┘
//! ```
//!
//! The self-election transition back to CONNECTING is internal to the
//! leader-avoidance loop (see `lamdera_core::leader`) and must not be
//! observed by the caller as a CLOSED event.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::ConnectionError;

/// Actions returned by the connection state machine for the driver to
/// execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Send this already-framed transport envelope to the socket.
    Send(String),
    /// Close the underlying socket with this reason.
    Close {
        /// Human-readable reason, used for logging only.
        reason: String,
    },
    /// The handshake completed: the first protocol frame carrying a
    /// non-empty connection id arrived. The driver fires `onopen` then
    /// `onsetup` exactly once in response.
    Handshake {
        /// The connection id (and, by the adapter's aliasing rule, client
        /// id) assigned by the host.
        connection_id: String,
    },
}

/// Connection ready state, mirroring the public `readyState` surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket handshake not yet complete; sends are queued.
    Connecting,
    /// Socket open and handshake complete; sends go straight through.
    Open,
    /// Caller requested close; waiting for the socket to confirm.
    Closing,
    /// Socket closed. Only reachable state transition out is back to
    /// `Connecting`, and only via the leader-avoidance loop starting a new
    /// attempt.
    Closed,
}

/// Owns the outbound message queue and tracks ready state/handshake
/// identity for a single underlying socket attempt.
///
/// Timing lives entirely in the leader-avoidance loop, which is the only
/// piece of this crate that needs to schedule delays — this state machine
/// has no notion of instants.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    queue: VecDeque<String>,
    connection_id: Option<String>,
    setup_fired: bool,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Creates a new connection in [`ConnectionState::Connecting`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            queue: VecDeque::new(),
            connection_id: None,
            setup_fired: false,
        }
    }

    /// Current ready state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection id assigned by the host. Aliased as the client id
    /// everywhere else in the adapter.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Number of frames currently queued (exposed as `bufferedAmount`).
    #[must_use]
    pub fn buffered_amount(&self) -> usize {
        self.queue.len()
    }

    /// Queues or sends a pre-framed transport envelope, per the caller
    /// ordering guarantee: frames queued while `CONNECTING` are flushed in
    /// the order they were queued, strictly before any frame sent once
    /// `OPEN`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidState`] if the connection is
    /// `CLOSING` or `CLOSED`.
    pub fn enqueue_or_send(
        &mut self,
        frame: String,
    ) -> Result<Option<ConnectionAction>, ConnectionError> {
        match self.state {
            ConnectionState::Open => Ok(Some(ConnectionAction::Send(frame))),
            ConnectionState::Connecting => {
                self.queue.push_back(frame);
                Ok(None)
            },
            ConnectionState::Closing | ConnectionState::Closed => {
                Err(ConnectionError::InvalidState { state: self.state, operation: "send".to_string() })
            },
        }
    }

    /// The underlying socket reported `open`. Transitions to `OPEN` and
    /// drains the queue in FIFO order.
    pub fn on_socket_open(&mut self) -> Vec<ConnectionAction> {
        debug!(old = ?self.state, new = ?ConnectionState::Open, "connection state transition");
        self.state = ConnectionState::Open;
        self.queue.drain(..).map(ConnectionAction::Send).collect()
    }

    /// Processes a protocol (non-election, non-message) inbound frame.
    /// Returns a [`ConnectionAction::Handshake`] the first time a
    /// non-empty connection id is seen.
    pub fn handle_protocol_frame(&mut self, connection_id: Option<&str>) -> Option<ConnectionAction> {
        let id = connection_id.filter(|id| !id.is_empty())?;
        if self.connection_id.is_some() {
            return None;
        }
        self.connection_id = Some(id.to_string());
        self.setup_fired = true;
        Some(ConnectionAction::Handshake { connection_id: id.to_string() })
    }

    /// Whether `onsetup` has already fired for this connection attempt.
    #[must_use]
    pub fn setup_fired(&self) -> bool {
        self.setup_fired
    }

    /// Caller-initiated close: transitions to `CLOSING` and instructs the
    /// driver to close the underlying socket, if one exists.
    pub fn close(&mut self) -> ConnectionAction {
        debug!(old = ?self.state, new = ?ConnectionState::Closing, "connection state transition");
        self.state = ConnectionState::Closing;
        ConnectionAction::Close { reason: "caller close".to_string() }
    }

    /// The underlying socket reported `close`. Transitions to `CLOSED` and
    /// clears identity, matching "reset to unset on disconnect".
    pub fn on_socket_close(&mut self) {
        debug!(old = ?self.state, new = ?ConnectionState::Closed, "connection state transition");
        self.state = ConnectionState::Closed;
        self.connection_id = None;
        self.queue.clear();
    }

    /// Tears down this attempt for a fresh one under a rotated session:
    /// discards the queue, clears identity, and resets `setup_fired` (a
    /// post-rotation handshake must fire `onsetup` again). Returns to
    /// `Connecting` rather than `Closed`, since this is an internal retry,
    /// not an observable disconnect.
    pub fn reset_for_retry(&mut self) {
        debug!(old = ?self.state, new = ?ConnectionState::Connecting, "connection state transition");
        self.state = ConnectionState::Connecting;
        self.queue.clear();
        self.connection_id = None;
        self.setup_fired = false;
    }

    /// Forces the connection to `CLOSED`, used when the leader-avoidance
    /// retry budget is exhausted.
    pub fn force_closed(&mut self) {
        debug!(old = ?self.state, new = ?ConnectionState::Closed, "connection state transition");
        self.state = ConnectionState::Closed;
        self.queue.clear();
        self.connection_id = None;
    }
}
