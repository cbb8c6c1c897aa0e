//! WebSocket transport for the client.
//!
//! `LamderaWebSocket` is the public adapter surface: it drives a Sans-IO
//! [`Client`] against a real `tokio-tungstenite` socket from a single
//! spawned task, reconnecting across leader-avoidance session rotations.
//! Protocol logic stays entirely in [`Client`] — this module is a thin
//! bridge between its actions and actual socket/callback I/O.

#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use lamdera_core::{ConnectionState, env::StdEnv};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::header::{COOKIE, SEC_WEBSOCKET_PROTOCOL},
    protocol::{CloseFrame, frame::coding::CloseCode},
    Message as WsMessage,
};
use tracing::debug;
use url::Url;

use crate::{
    client::Client,
    error::ClientError,
    event::{ClientAction, ClientEvent},
    options::ClientOptions,
};

/// Ready state exposed to callers.
pub type ReadyState = ConnectionState;

/// Cadence of the readiness-poll tick in the driver's `select!` loop, so
/// the public snapshot stays fresh even while the connection is otherwise
/// idle (no inbound frame, no caller event).
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

type OpenCallback = Box<dyn FnMut() + Send>;
type MessageCallback = Box<dyn FnMut(String) + Send>;
type CloseCallback = Box<dyn FnMut() + Send>;
type ErrorCallback = Box<dyn FnMut(String) + Send>;
type SetupCallback = Box<dyn FnMut(SetupInfo) + Send>;
type LeaderDisconnectCallback = Box<dyn FnMut(u32) + Send>;

/// Payload delivered to `onsetup`.
#[derive(Debug, Clone)]
pub struct SetupInfo {
    /// Id assigned by the host at handshake (aliased as client id).
    pub client_id: String,
    /// Currently-known leader id, if any.
    pub leader_id: Option<String>,
    /// Whether this client is itself the currently-known leader.
    pub is_leader: bool,
}

/// Polymorphic sink for the six caller-assignable callbacks. Each slot may
/// be absent; absence is a no-op, not an error. Replaceable at any time.
#[derive(Default)]
struct CallbackSet {
    onopen: Option<OpenCallback>,
    onmessage: Option<MessageCallback>,
    onclose: Option<CloseCallback>,
    onerror: Option<ErrorCallback>,
    onsetup: Option<SetupCallback>,
    onleaderdisconnect: Option<LeaderDisconnectCallback>,
}

/// Snapshot of the readable properties, refreshed by the driver task after
/// every event it processes.
struct Snapshot {
    ready_state: ReadyState,
    buffered_amount: usize,
    session_id: String,
    connection_id: Option<String>,
    leader_id: Option<String>,
}

/// A WebSocket adapter speaking the Lamdera-style Wire3 protocol.
///
/// Owns a background task that holds the actual socket; all public methods
/// are synchronous and non-blocking, handing work off to that task.
pub struct LamderaWebSocket {
    url: Url,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    callbacks: Arc<Mutex<CallbackSet>>,
    snapshot: Arc<Mutex<Snapshot>>,
    pending_close: Arc<Mutex<Option<CloseFrame<'static>>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for LamderaWebSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl LamderaWebSocket {
    /// Constructs the adapter and spawns its driver task. Must be called
    /// from within a running `tokio` runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if `options` fails
    /// validation.
    pub fn connect(
        url: Url,
        protocols: Vec<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let env = StdEnv;
        let client = Client::new(env.clone(), options)?;
        let snapshot = Arc::new(Mutex::new(Snapshot {
            ready_state: client.ready_state(),
            buffered_amount: client.buffered_amount(),
            session_id: client.session_id().to_string(),
            connection_id: client.connection_id().map(str::to_string),
            leader_id: client.leader_id().map(str::to_string),
        }));
        let callbacks = Arc::new(Mutex::new(CallbackSet::default()));
        let pending_close = Arc::new(Mutex::new(None));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(
            env,
            url.clone(),
            protocols,
            client,
            events_rx,
            Arc::clone(&callbacks),
            Arc::clone(&snapshot),
            Arc::clone(&pending_close),
        ));

        Ok(Self { url, events_tx, callbacks, snapshot, pending_close, task })
    }

    /// Sends an application payload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotOpen`] if the connection is not
    /// `CONNECTING` or `OPEN`, checked synchronously against the snapshot
    /// before anything is handed to the driver task. Returns
    /// [`ClientError::Transport`] if the driver task has already stopped.
    pub fn send(&self, data: impl Into<String>) -> Result<(), ClientError> {
        match self.ready_state() {
            ReadyState::Closing | ReadyState::Closed => return Err(ClientError::NotOpen),
            ReadyState::Connecting | ReadyState::Open => {},
        }
        self.events_tx
            .send(ClientEvent::Send(data.into()))
            .map_err(|_| ClientError::Transport("driver task has stopped".to_string()))
    }

    /// Requests a close. Synchronous with respect to the caller; the
    /// underlying socket closes asynchronously.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) {
        let frame = CloseFrame {
            code: code.map_or(CloseCode::Normal, CloseCode::from),
            reason: reason.unwrap_or_default().into(),
        };
        *self.pending_close.lock().expect("pending-close lock poisoned") = Some(frame);
        let _ = self.events_tx.send(ClientEvent::Close);
    }

    /// Assigns (or replaces) the `onopen` callback.
    pub fn set_onopen(&mut self, f: impl FnMut() + Send + 'static) {
        self.callbacks.lock().expect("callback lock poisoned").onopen = Some(Box::new(f));
    }

    /// Assigns (or replaces) the `onmessage` callback.
    pub fn set_onmessage(&mut self, f: impl FnMut(String) + Send + 'static) {
        self.callbacks.lock().expect("callback lock poisoned").onmessage = Some(Box::new(f));
    }

    /// Assigns (or replaces) the `onclose` callback.
    pub fn set_onclose(&mut self, f: impl FnMut() + Send + 'static) {
        self.callbacks.lock().expect("callback lock poisoned").onclose = Some(Box::new(f));
    }

    /// Assigns (or replaces) the `onerror` callback.
    pub fn set_onerror(&mut self, f: impl FnMut(String) + Send + 'static) {
        self.callbacks.lock().expect("callback lock poisoned").onerror = Some(Box::new(f));
    }

    /// Assigns (or replaces) the `onsetup` callback.
    pub fn set_onsetup(&mut self, f: impl FnMut(SetupInfo) + Send + 'static) {
        self.callbacks.lock().expect("callback lock poisoned").onsetup = Some(Box::new(f));
    }

    /// Assigns (or replaces) the `onleaderdisconnect` callback.
    pub fn set_onleaderdisconnect(&mut self, f: impl FnMut(u32) + Send + 'static) {
        self.callbacks.lock().expect("callback lock poisoned").onleaderdisconnect = Some(Box::new(f));
    }

    /// The URL this adapter was constructed with.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current ready state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.snapshot.lock().expect("snapshot lock poisoned").ready_state
    }

    /// Number of frames currently queued for send.
    #[must_use]
    pub fn buffered_amount(&self) -> usize {
        self.snapshot.lock().expect("snapshot lock poisoned").buffered_amount
    }

    /// Current session id.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.snapshot.lock().expect("snapshot lock poisoned").session_id.clone()
    }

    /// Host-assigned client id. Aliased to `connection_id`.
    #[must_use]
    pub fn client_id(&self) -> Option<String> {
        self.connection_id()
    }

    /// Host-assigned connection id. `None` until the handshake completes.
    #[must_use]
    pub fn connection_id(&self) -> Option<String> {
        self.snapshot.lock().expect("snapshot lock poisoned").connection_id.clone()
    }

    /// Most recently observed leader id.
    #[must_use]
    pub fn leader_id(&self) -> Option<String> {
        self.snapshot.lock().expect("snapshot lock poisoned").leader_id.clone()
    }
}

#[derive(Default)]
struct ExecOutcome {
    stop: bool,
    reconnect_after: Option<Duration>,
}

type WsSink =
    futures_util::stream::SplitSink<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, WsMessage>;

#[allow(clippy::too_many_lines)]
async fn run(
    env: StdEnv,
    url: Url,
    protocols: Vec<String>,
    mut client: Client<StdEnv>,
    mut events_rx: mpsc::UnboundedReceiver<ClientEvent>,
    callbacks: Arc<Mutex<CallbackSet>>,
    snapshot: Arc<Mutex<Snapshot>>,
    pending_close: Arc<Mutex<Option<CloseFrame<'static>>>>,
) {
    use lamdera_core::Environment as _;

    env.sleep(client.initial_connect_jitter()).await;

    'reconnect: loop {
        let request = match build_request(&url, &protocols, &client.session_cookie()) {
            Ok(request) => request,
            Err(err) => {
                fire_error(&callbacks, err.to_string());
                return;
            },
        };

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(pair) => pair,
            Err(err) => {
                fire_error(&callbacks, err.to_string());
                return;
            },
        };
        let (mut sink, mut stream) = ws_stream.split();

        let open_actions = client.handle(ClientEvent::SocketOpen).unwrap_or_default();
        sync_snapshot(&snapshot, &client);
        let outcome = execute(open_actions, &mut sink, &callbacks, &pending_close).await;
        if outcome.stop {
            break 'reconnect;
        }

        let mut readiness_tick = tokio::time::interval(READINESS_POLL_INTERVAL);
        readiness_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = readiness_tick.tick() => {
                    sync_snapshot(&snapshot, &client);
                },
                incoming = stream.next() => {
                    let event = match incoming {
                        Some(Ok(WsMessage::Text(text))) => ClientEvent::SocketMessage(text.to_string()),
                        Some(Ok(WsMessage::Close(_))) | None => ClientEvent::SocketClose,
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => ClientEvent::SocketError(err.to_string()),
                    };
                    let actions = client.handle(event).unwrap_or_default();
                    sync_snapshot(&snapshot, &client);
                    let outcome = execute(actions, &mut sink, &callbacks, &pending_close).await;
                    if outcome.stop {
                        break 'reconnect;
                    }
                    if let Some(delay) = outcome.reconnect_after {
                        env.sleep(delay).await;
                        continue 'reconnect;
                    }
                },
                maybe_event = events_rx.recv() => {
                    let Some(event) = maybe_event else { break 'reconnect };
                    match client.handle(event) {
                        Ok(actions) => {
                            sync_snapshot(&snapshot, &client);
                            let outcome = execute(actions, &mut sink, &callbacks, &pending_close).await;
                            if outcome.stop {
                                break 'reconnect;
                            }
                            if let Some(delay) = outcome.reconnect_after {
                                env.sleep(delay).await;
                                continue 'reconnect;
                            }
                        },
                        Err(err) => fire_error(&callbacks, err.to_string()),
                    }
                },
            }
        }
    }
}

async fn execute(
    actions: Vec<ClientAction>,
    sink: &mut WsSink,
    callbacks: &Arc<Mutex<CallbackSet>>,
    pending_close: &Arc<Mutex<Option<CloseFrame<'static>>>>,
) -> ExecOutcome {
    let mut outcome = ExecOutcome::default();
    for action in actions {
        match action {
            ClientAction::SendFrame(frame) => {
                if let Err(err) = sink.send(WsMessage::Text(frame.into())).await {
                    fire_error(callbacks, err.to_string());
                }
            },
            ClientAction::CloseSocket => {
                let frame = pending_close.lock().expect("pending-close lock poisoned").take();
                let _ = sink.send(WsMessage::Close(frame)).await;
            },
            ClientAction::RotateSession { .. } => {},
            ClientAction::ScheduleReconnect { after } => outcome.reconnect_after = Some(after),
            ClientAction::FireOpen => {
                if let Some(f) = callbacks.lock().expect("callback lock poisoned").onopen.as_mut() {
                    f();
                }
            },
            ClientAction::FireSetup { connection_id, leader_id, is_leader } => {
                if let Some(f) = callbacks.lock().expect("callback lock poisoned").onsetup.as_mut() {
                    f(SetupInfo { client_id: connection_id, leader_id, is_leader });
                }
            },
            ClientAction::FireMessage(data) => {
                if let Some(f) = callbacks.lock().expect("callback lock poisoned").onmessage.as_mut() {
                    f(data);
                }
            },
            ClientAction::FireClose => {
                outcome.stop = true;
                if let Some(f) = callbacks.lock().expect("callback lock poisoned").onclose.as_mut() {
                    f();
                }
            },
            ClientAction::FireError(message) => fire_error(callbacks, message),
            ClientAction::FireLeaderDisconnect { retry_count } => {
                outcome.stop = true;
                if let Some(f) =
                    callbacks.lock().expect("callback lock poisoned").onleaderdisconnect.as_mut()
                {
                    f(retry_count);
                }
            },
            ClientAction::Log { message } => debug!(%message, "client log"),
        }
    }
    outcome
}

fn fire_error(callbacks: &Arc<Mutex<CallbackSet>>, message: String) {
    if let Some(f) = callbacks.lock().expect("callback lock poisoned").onerror.as_mut() {
        f(message);
    }
}

fn sync_snapshot(snapshot: &Arc<Mutex<Snapshot>>, client: &Client<StdEnv>) {
    let mut guard = snapshot.lock().expect("snapshot lock poisoned");
    guard.ready_state = client.ready_state();
    guard.buffered_amount = client.buffered_amount();
    guard.session_id = client.session_id().to_string();
    guard.connection_id = client.connection_id().map(str::to_string);
    guard.leader_id = client.leader_id().map(str::to_string);
}

fn build_request(
    url: &Url,
    protocols: &[String],
    cookie: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, ClientError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|err| ClientError::Transport(err.to_string()))?;
    let headers = request.headers_mut();
    headers.insert(
        COOKIE,
        cookie.parse().map_err(|_| ClientError::Transport("invalid cookie header value".to_string()))?,
    );
    if !protocols.is_empty() {
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            protocols
                .join(", ")
                .parse()
                .map_err(|_| ClientError::Transport("invalid protocol header value".to_string()))?,
        );
    }
    Ok(request)
}
