//! Client events and actions.

use std::time::Duration;

/// Events the driver feeds into the client.
///
/// The driver is responsible for:
/// - Reading frames off the underlying socket and handing them in as
///   `SocketMessage`
/// - Forwarding socket lifecycle notifications (`SocketOpen`,
///   `SocketClose`, `SocketError`)
/// - Forwarding caller intents (`Send`, `Close`)
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The underlying socket reported `open`.
    SocketOpen,

    /// A text frame arrived from the underlying socket.
    SocketMessage(String),

    /// The underlying socket reported `close`.
    SocketClose,

    /// The underlying socket reported a transport-level error. Passed
    /// through to `onerror`; never triggers leader-avoidance.
    SocketError(String),

    /// Caller wants to send an application payload.
    Send(String),

    /// Caller wants to close the connection.
    Close,
}

/// Actions the client produces for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send this already-framed transport envelope to the socket.
    SendFrame(String),

    /// Close the underlying socket.
    CloseSocket,

    /// A session rotation happened (self-election). The driver must
    /// reconnect using this session id and cookie once the scheduled
    /// delay elapses.
    RotateSession {
        /// Freshly generated session id.
        session_id: String,
        /// `sid=<session_id>` cookie string for the next upgrade request.
        cookie: String,
    },

    /// Schedule a reconnect after this delay, then open a new socket
    /// against the rotated session and feed back `SocketOpen`.
    ScheduleReconnect {
        /// Jittered backoff delay.
        after: Duration,
    },

    /// Fire the caller's `onopen` callback.
    FireOpen,

    /// Fire the caller's `onsetup` callback.
    FireSetup {
        /// Id assigned by the host at handshake (aliased as client id).
        connection_id: String,
        /// Currently-known leader id, if any election frame preceded the
        /// handshake.
        leader_id: Option<String>,
        /// Whether this client is itself the currently-known leader.
        is_leader: bool,
    },

    /// Fire the caller's `onmessage` callback.
    FireMessage(String),

    /// Fire the caller's `onclose` callback.
    FireClose,

    /// Fire the caller's `onerror` callback.
    FireError(String),

    /// Fire the caller's `onleaderdisconnect` callback: the retry budget
    /// was exhausted.
    FireLeaderDisconnect {
        /// Final retry count at the moment of exhaustion.
        retry_count: u32,
    },

    /// Log message for debugging. Never a substitute for a callback; used
    /// for the cases the protocol explicitly defines as silent (parse
    /// errors, dropped mid-avoidance sends).
    Log {
        /// Log message.
        message: String,
    },
}
