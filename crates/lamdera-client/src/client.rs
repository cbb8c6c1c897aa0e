//! Client state machine.
//!
//! `Client` is the Sans-IO orchestrator: it owns a
//! [`lamdera_core::Connection`] and a [`lamdera_core::LeaderAvoidance`],
//! classifies inbound frames, and turns caller/socket events into actions
//! for the driver (`websocket` module, or any embedder) to execute. It
//! never touches a socket directly.

use lamdera_core::{
    Connection, ConnectionAction, ConnectionState, ElectionOutcome, Environment, LeaderAvoidance,
};
use lamdera_proto::{envelope::InboundFrame, message, session};
use tracing::{debug, info, trace, warn};

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent},
    options::ClientOptions,
};

/// Orchestrates the connection state machine and leader-avoidance loop for
/// a single logical `LamderaWebSocket` instance across its lifetime
/// (surviving session rotations).
pub struct Client<E: Environment> {
    env: E,
    options: ClientOptions,
    connection: Connection,
    leader: LeaderAvoidance,
    session_id: String,
}

impl<E: Environment> Client<E> {
    /// Creates a new client. Validates `options` and generates (or adopts
    /// the caller-supplied) initial session id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if `options` fails
    /// validation (see `ClientOptions::validate`).
    pub fn new(env: E, options: ClientOptions) -> Result<Self, ClientError> {
        let leader_config = options.validate()?;
        let session_id = options
            .session_id
            .clone()
            .unwrap_or_else(|| generate_session_id(&env));
        Ok(Self {
            env,
            options,
            connection: Connection::new(),
            leader: LeaderAvoidance::new(leader_config),
            session_id,
        })
    }

    /// Current session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current `sid=<session_id>` cookie.
    #[must_use]
    pub fn session_cookie(&self) -> String {
        session::session_cookie(&self.session_id)
    }

    /// Host-assigned connection id, aliased as client id. `None` until the
    /// handshake completes.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection.connection_id()
    }

    /// Most recently observed leader id.
    #[must_use]
    pub fn leader_id(&self) -> Option<&str> {
        self.leader.leader_id()
    }

    /// Current ready state.
    #[must_use]
    pub fn ready_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Number of frames currently queued for send.
    #[must_use]
    pub fn buffered_amount(&self) -> usize {
        self.connection.buffered_amount()
    }

    /// The one-shot jitter the driver should wait before opening the very
    /// first socket.
    #[must_use]
    pub fn initial_connect_jitter(&self) -> std::time::Duration {
        self.leader.initial_connect_jitter(&self.env)
    }

    /// Dispatches one event and returns the actions for the driver to
    /// execute, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotOpen`] if [`ClientEvent::Send`] is issued
    /// while the connection is `CLOSING` or `CLOSED`.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::SocketOpen => Ok(self.handle_socket_open()),
            ClientEvent::SocketMessage(raw) => Ok(self.handle_socket_message(&raw)),
            ClientEvent::SocketClose => Ok(self.handle_socket_close()),
            ClientEvent::SocketError(message) => Ok(vec![ClientAction::FireError(message)]),
            ClientEvent::Send(payload) => self.handle_send(&payload),
            ClientEvent::Close => Ok(self.handle_close()),
        }
    }

    fn handle_socket_open(&mut self) -> Vec<ClientAction> {
        self.connection.on_socket_open().into_iter().filter_map(connection_to_client_action).collect()
    }

    fn handle_socket_close(&mut self) -> Vec<ClientAction> {
        self.connection.on_socket_close();
        vec![ClientAction::FireClose]
    }

    fn handle_close(&mut self) -> Vec<ClientAction> {
        let action = self.connection.close();
        connection_to_client_action(action).into_iter().collect()
    }

    fn handle_send(&mut self, payload: &str) -> Result<Vec<ClientAction>, ClientError> {
        if self.leader.is_mid_avoidance() {
            return Ok(vec![ClientAction::Log {
                message: "dropping send issued mid leader-avoidance retry".to_string(),
            }]);
        }

        let bytes = message::encode_message(payload, self.options.du_variant);
        let envelope = lamdera_proto::OutboundEnvelope::new(
            &self.session_id,
            self.connection.connection_id(),
            &bytes,
        );
        let frame = envelope.to_json().map_err(|err| ClientError::Transport(err.to_string()))?;

        match self.connection.enqueue_or_send(frame) {
            Ok(Some(ConnectionAction::Send(frame))) => Ok(vec![ClientAction::SendFrame(frame)]),
            Ok(_) => Ok(vec![]),
            Err(_) => Err(ClientError::NotOpen),
        }
    }

    fn handle_socket_message(&mut self, raw: &str) -> Vec<ClientAction> {
        if self.options.debug {
            trace!(raw = %raw, "inbound frame");
        }
        match lamdera_proto::envelope::classify(raw, self.options.du_variant) {
            InboundFrame::ParseError { raw } => {
                let truncated: String = raw.chars().take(200).collect();
                warn!(raw = %truncated, "transport parse error");
                vec![]
            },
            InboundFrame::Election { leader_id } => self.handle_election(&leader_id),
            InboundFrame::Message { data, .. } => {
                if self.connection.setup_fired() {
                    vec![ClientAction::FireMessage(data)]
                } else {
                    vec![]
                }
            },
            InboundFrame::Protocol { connection_id, .. } => {
                match self.connection.handle_protocol_frame(connection_id.as_deref()) {
                    Some(ConnectionAction::Handshake { connection_id }) => {
                        self.leader.reset_on_handshake(&connection_id);
                        info!(connection_id = %connection_id, "handshake complete");
                        let leader_id = self.leader.leader_id().map(str::to_string);
                        let is_leader = leader_id.as_deref() == Some(connection_id.as_str());
                        vec![
                            ClientAction::FireOpen,
                            ClientAction::FireSetup { connection_id, leader_id, is_leader },
                        ]
                    },
                    _ => vec![],
                }
            },
        }
    }

    fn handle_election(&mut self, leader_id: &str) -> Vec<ClientAction> {
        match self.leader.evaluate_election(leader_id, &self.env) {
            ElectionOutcome::FollowerUpdate { previous_leader, new_leader } => {
                debug!(?previous_leader, %new_leader, "leader election observed");
                vec![]
            },
            ElectionOutcome::SelfElected { retry_count, outcome } => {
                self.connection.reset_for_retry();
                let mut actions = vec![ClientAction::CloseSocket];
                match outcome {
                    Ok(delay) => {
                        let old_session = std::mem::replace(
                            &mut self.session_id,
                            generate_session_id(&self.env),
                        );
                        info!(
                            old_session = %old_session,
                            new_session = %self.session_id,
                            retry_count,
                            "session rotated after self-election"
                        );
                        actions.push(ClientAction::RotateSession {
                            session_id: self.session_id.clone(),
                            cookie: self.session_cookie(),
                        });
                        actions.push(ClientAction::ScheduleReconnect { after: delay });
                    },
                    Err(_) => {
                        self.connection.force_closed();
                        warn!(retry_count, "leader-avoidance retries exhausted");
                        actions.push(ClientAction::FireLeaderDisconnect { retry_count });
                    },
                }
                actions
            },
        }
    }
}

fn connection_to_client_action(action: ConnectionAction) -> Option<ClientAction> {
    match action {
        ConnectionAction::Send(frame) => Some(ClientAction::SendFrame(frame)),
        ConnectionAction::Close { reason } => {
            debug!(%reason, "closing underlying socket");
            Some(ClientAction::CloseSocket)
        },
        ConnectionAction::Handshake { .. } => None,
    }
}

fn generate_session_id<E: Environment>(env: &E) -> String {
    let r = 10_000 + (env.random_u64() % 990_000);
    let prefix = r.to_string();
    let pad_len = session::SESSION_ID_LEN.saturating_sub(prefix.len());
    format!("{prefix}{}", &session::SESSION_ID_SEED[..pad_len])
}

#[cfg(test)]
mod tests {
    use lamdera_core::env::MockEnv;

    use super::*;

    fn new_client(seed: u64) -> Client<MockEnv> {
        Client::new(MockEnv::new(seed), ClientOptions::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_options() {
        let options = ClientOptions { du_variant: 9, ..ClientOptions::default() };
        assert!(Client::new(MockEnv::new(1), options).is_err());
    }

    #[test]
    fn session_id_has_expected_layout() {
        let client = new_client(1);
        assert_eq!(client.session_id().len(), session::SESSION_ID_LEN);
    }

    #[test]
    fn handshake_fires_open_then_setup() {
        let mut client = new_client(2);
        client.handle(ClientEvent::SocketOpen).unwrap();
        let actions =
            client.handle(ClientEvent::SocketMessage(r#"{"s":"abc","c":"X1"}"#.to_string())).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], ClientAction::FireOpen));
        assert!(matches!(actions[1], ClientAction::FireSetup { .. }));
        assert_eq!(client.connection_id(), Some("X1"));
    }

    #[test]
    fn election_without_self_updates_leader_and_forwards_send() {
        let mut client = new_client(3);
        client.handle(ClientEvent::SocketOpen).unwrap();
        client.handle(ClientEvent::SocketMessage(r#"{"s":"abc","c":"X1"}"#.to_string())).unwrap();

        let actions =
            client.handle(ClientEvent::SocketMessage(r#"{"t":"e","l":"Y2"}"#.to_string())).unwrap();
        assert!(actions.is_empty());
        assert_eq!(client.leader_id(), Some("Y2"));
        assert_eq!(client.ready_state(), ConnectionState::Open);

        let actions = client.handle(ClientEvent::Send("ping".to_string())).unwrap();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            ClientAction::SendFrame(frame) => {
                assert!(frame.contains("\"c\":\"X1\""));
            },
            other => panic!("expected SendFrame, got {other:?}"),
        }
    }

    #[test]
    fn self_election_tears_down_and_rotates_session() {
        let mut client = new_client(4);
        client.handle(ClientEvent::SocketOpen).unwrap();
        client.handle(ClientEvent::SocketMessage(r#"{"s":"abc","c":"X1"}"#.to_string())).unwrap();
        let original_session = client.session_id().to_string();

        let actions =
            client.handle(ClientEvent::SocketMessage(r#"{"t":"e","l":"X1"}"#.to_string())).unwrap();
        assert!(matches!(actions[0], ClientAction::CloseSocket));
        assert!(actions.iter().any(|a| matches!(a, ClientAction::RotateSession { .. })));
        assert!(actions.iter().any(|a| matches!(a, ClientAction::ScheduleReconnect { .. })));
        assert_ne!(client.session_id(), original_session);
        assert_eq!(client.ready_state(), ConnectionState::Connecting);
    }

    #[test]
    fn leader_disconnect_fires_after_retry_budget_exhausted() {
        let options = ClientOptions { max_retries: 1, ..ClientOptions::default() };
        let mut client = Client::new(MockEnv::new(5), options).unwrap();
        client.handle(ClientEvent::SocketOpen).unwrap();
        client.handle(ClientEvent::SocketMessage(r#"{"s":"abc","c":"X1"}"#.to_string())).unwrap();
        client.handle(ClientEvent::SocketMessage(r#"{"t":"e","l":"X1"}"#.to_string())).unwrap();
        client.handle(ClientEvent::SocketOpen).unwrap();
        let actions =
            client.handle(ClientEvent::SocketMessage(r#"{"t":"e","l":"X1"}"#.to_string())).unwrap();
        assert!(actions.iter().any(|a| matches!(a, ClientAction::FireLeaderDisconnect { retry_count: 2 })));
        assert_eq!(client.ready_state(), ConnectionState::Closed);
    }

    fn payload_of(frame: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        let b64 = value["b"].as_str().unwrap();
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64).unwrap();
        message::decode_message(&bytes, 0).unwrap()
    }

    #[test]
    fn send_during_connecting_is_queued_then_drained_in_order() {
        let mut client = new_client(6);
        client.handle(ClientEvent::Send("a".to_string())).unwrap();
        client.handle(ClientEvent::Send("b".to_string())).unwrap();
        assert_eq!(client.buffered_amount(), 2);

        let actions = client.handle(ClientEvent::SocketOpen).unwrap();
        assert_eq!(actions.len(), 2);
        match (&actions[0], &actions[1]) {
            (ClientAction::SendFrame(first), ClientAction::SendFrame(second)) => {
                assert_eq!(payload_of(first), "a");
                assert_eq!(payload_of(second), "b");
            },
            other => panic!("expected two SendFrame actions, got {other:?}"),
        }
    }

    #[test]
    fn send_after_close_errors() {
        let mut client = new_client(7);
        client.handle(ClientEvent::Close).unwrap();
        let result = client.handle(ClientEvent::Send("a".to_string()));
        assert_eq!(result, Err(ClientError::NotOpen));
    }

    #[test]
    fn send_mid_avoidance_is_dropped_not_queued() {
        let mut client = new_client(8);
        client.handle(ClientEvent::SocketOpen).unwrap();
        client.handle(ClientEvent::SocketMessage(r#"{"s":"abc","c":"X1"}"#.to_string())).unwrap();
        client.handle(ClientEvent::SocketMessage(r#"{"t":"e","l":"X1"}"#.to_string())).unwrap();

        let actions = client.handle(ClientEvent::Send("ping".to_string())).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ClientAction::Log { .. }));
        assert_eq!(client.buffered_amount(), 0);
    }

    #[test]
    fn malformed_frame_is_silent() {
        let mut client = new_client(9);
        let actions = client.handle(ClientEvent::SocketMessage("not json".to_string())).unwrap();
        assert!(actions.is_empty());

        let actions =
            client.handle(ClientEvent::SocketMessage(r#"{"s":"abc","c":"X1"}"#.to_string())).unwrap();
        assert!(!actions.is_empty());
    }
}
