//! Event stream client with bounded fixed-delay reconnect.
//!
//! Connects to the backend's WebSocket endpoint and streams parsed events
//! through a [`tokio::sync::broadcast`] channel. Connection state is
//! published on a [`tokio::sync::watch`] channel. When the socket drops,
//! the client retries after a fixed delay up to a capped number of attempts,
//! then stays [`ConnectionState::Disconnected`] until `connect` is called
//! again.
//!
//! # Example
//!
//! ```rust,ignore
//! use siac_api::websocket::{ReconnectConfig, StreamClient};
//! use url::Url;
//!
//! let client = StreamClient::new(ReconnectConfig::default(), None);
//! let mut events = client.subscribe();
//! client.connect(Url::parse("ws://localhost:8000/ws")?);
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.payload.type_name());
//! }
//!
//! client.disconnect();
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::auth::{self, CredentialStore};
use crate::error::Error;
use crate::models::{
    AlertRecord, DeviceDeleted, DeviceRecord, DeviceStatusChange, IdsLogRecord, TelemetryRecord,
};

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Fixed-delay reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay between attempts. Default: 3s.
    pub delay: Duration,

    /// Reconnect attempts after the initial one before giving up.
    /// Default: 5.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
            max_attempts: 5,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// A parsed frame from the event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Frame-level `ts`, when the backend sent one.
    pub ts: Option<DateTime<Utc>>,
    /// When this client decoded the frame.
    pub received_at: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Telemetry(TelemetryRecord),
    AlertRaised(AlertRecord),
    AlertUpdated(AlertRecord),
    DeviceStatus(DeviceStatusChange),
    DeviceUpdated(DeviceRecord),
    DeviceDeleted(DeviceDeleted),
    Intrusion(IdsLogRecord),
}

impl EventPayload {
    /// The wire discriminator for this payload.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Telemetry(_) => "telemetry_update",
            Self::AlertRaised(_) => "alert_raised",
            Self::AlertUpdated(_) => "alert_updated",
            Self::DeviceStatus(_) => "device_status",
            Self::DeviceUpdated(_) => "device_updated",
            Self::DeviceDeleted(_) => "device_deleted",
            Self::Intrusion(_) => "ids_event",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    ts: Option<DateTime<Utc>>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode one text frame. Malformed JSON, unknown `type` values and
/// payloads that don't match their type are all errors.
pub fn parse_frame(text: &str, received_at: DateTime<Utc>) -> Result<StreamEvent, Error> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    })?;

    let RawFrame { kind, ts, data } = raw;
    let payload = match kind.as_str() {
        "telemetry_update" => EventPayload::Telemetry(decode_data(data, &kind, text)?),
        "alert_raised" => EventPayload::AlertRaised(decode_data(data, &kind, text)?),
        "alert_updated" => EventPayload::AlertUpdated(decode_data(data, &kind, text)?),
        "device_status" => EventPayload::DeviceStatus(decode_data(data, &kind, text)?),
        "device_updated" => EventPayload::DeviceUpdated(decode_data(data, &kind, text)?),
        "device_deleted" => EventPayload::DeviceDeleted(decode_data(data, &kind, text)?),
        "ids_event" => EventPayload::Intrusion(decode_data(data, &kind, text)?),
        other => {
            return Err(Error::Deserialization {
                message: format!("unknown event type `{other}`"),
                body: text.to_owned(),
            });
        }
    };

    Ok(StreamEvent {
        ts,
        received_at,
        payload,
    })
}

fn decode_data<T: serde::de::DeserializeOwned>(
    data: serde_json::Value,
    kind: &str,
    text: &str,
) -> Result<T, Error> {
    serde_json::from_value(data).map_err(|e| Error::Deserialization {
        message: format!("{kind} payload: {e}"),
        body: text.to_owned(),
    })
}

// ── Socket abstraction ───────────────────────────────────────────────

/// One inbound frame, reduced to what the session loop cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
    /// Ping, pong, binary: nothing to do.
    Control,
}

/// An established event-stream connection.
pub trait EventSocket: Send + 'static {
    /// Next frame, or `None` once the stream has ended.
    fn recv(&mut self) -> impl Future<Output = Option<Result<Frame, Error>>> + Send;

    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), Error>> + Send;

    /// Best-effort close handshake.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Dials the event stream. Swappable so the reconnect policy can be
/// driven by a scripted connector under a paused clock.
pub trait Connector: Send + Sync + 'static {
    type Socket: EventSocket;

    fn connect(
        &self,
        url: &Url,
        bearer: Option<&SecretString>,
    ) -> impl Future<Output = Result<Self::Socket, Error>> + Send;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

pub struct TungsteniteSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connector for TungsteniteConnector {
    type Socket = TungsteniteSocket;

    async fn connect(
        &self,
        url: &Url,
        bearer: Option<&SecretString>,
    ) -> Result<Self::Socket, Error> {
        info!(url = %url, "connecting to event stream");

        let uri: tungstenite::http::Uri = url.as_str().parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()),
        )?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(token) = bearer {
            request =
                request.with_header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let (inner, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        Ok(TungsteniteSocket { inner })
    }
}

impl EventSocket for TungsteniteSocket {
    async fn recv(&mut self) -> Option<Result<Frame, Error>> {
        let message = match self.inner.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(Error::WebSocketConnect(e.to_string()))),
        };
        let frame = match message {
            tungstenite::Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            tungstenite::Message::Close(Some(cf)) => Frame::Close {
                code: u16::from(cf.code),
                reason: cf.reason.as_str().to_owned(),
            },
            tungstenite::Message::Close(None) => Frame::Close {
                code: 1005,
                reason: String::new(),
            },
            // tungstenite answers pings itself
            _ => Frame::Control,
        };
        Some(Ok(frame))
    }

    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.inner
            .send(tungstenite::Message::text(text))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "event stream close handshake failed");
        }
    }
}

// ── StreamClient ─────────────────────────────────────────────────────

/// Handle to the event stream. Cheap to clone; all clones share one
/// session.
///
/// The background session task keeps running until [`disconnect`] or
/// [`shutdown`] is called, or the reconnect cap is exhausted.
///
/// [`disconnect`]: Self::disconnect
/// [`shutdown`]: Self::shutdown
pub struct StreamClient<C: Connector = TungsteniteConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for StreamClient<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<C: Connector> {
    connector: C,
    reconnect: ReconnectConfig,
    credentials: Option<Arc<dyn CredentialStore>>,
    event_tx: broadcast::Sender<Arc<StreamEvent>>,
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped by every `connect`/`disconnect`. A session only publishes
    /// state while its generation is current.
    generation: AtomicU64,
    attempt: AtomicU32,
    gave_up: AtomicBool,
    session: Mutex<Option<Session>>,
}

struct Session {
    cancel: CancellationToken,
    outbound: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

impl StreamClient<TungsteniteConnector> {
    pub fn new(reconnect: ReconnectConfig, credentials: Option<Arc<dyn CredentialStore>>) -> Self {
        Self::with_connector(TungsteniteConnector, reconnect, credentials)
    }
}

impl<C: Connector> StreamClient<C> {
    pub fn with_connector(
        connector: C,
        reconnect: ReconnectConfig,
        credentials: Option<Arc<dyn CredentialStore>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                reconnect,
                credentials,
                event_tx,
                state_tx,
                generation: AtomicU64::new(0),
                attempt: AtomicU32::new(0),
                gave_up: AtomicBool::new(false),
                session: Mutex::new(None),
            }),
        }
    }

    /// Start (or restart) the session against `url`.
    ///
    /// Returns immediately; the handshake happens on a background task.
    /// Any running session is replaced and the attempt counter resets.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, url: Url) {
        let shared = &self.shared;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        shared.attempt.store(0, Ordering::SeqCst);
        shared.gave_up.store(false, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_session(
            Arc::clone(shared),
            generation,
            url,
            cancel.clone(),
            outbound_rx,
        ));

        let previous = self.lock_session().replace(Session {
            cancel,
            outbound,
            task,
        });
        if let Some(previous) = previous {
            debug!("replacing running event stream session");
            previous.cancel.cancel();
        }
    }

    /// Deliberately close the stream. Cancels a pending reconnect timer
    /// first, then closes the socket. No reconnect follows.
    pub fn disconnect(&self) {
        drop(self.detach());
    }

    /// [`disconnect`](Self::disconnect), then wait for the session task
    /// to finish its close handshake.
    pub async fn shutdown(&self) {
        if let Some(session) = self.detach() {
            if let Err(e) = session.task.await {
                debug!(error = %e, "event stream task ended abnormally");
            }
        }
    }

    fn detach(&self) -> Option<Session> {
        let shared = &self.shared;
        shared.generation.fetch_add(1, Ordering::SeqCst);
        let session = self.lock_session().take();
        if let Some(ref session) = session {
            info!("event stream disconnect requested");
            session.cancel.cancel();
        }
        shared.state_tx.send_if_modified(|current| {
            let changed = *current != ConnectionState::Disconnected;
            *current = ConnectionState::Disconnected;
            changed
        });
        session
    }

    /// Queue `payload` for the live socket. Best effort: a full queue drops
    /// the message with a warning.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), Error> {
        if self.current_state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let text = serde_json::to_string(payload).map_err(|e| Error::Deserialization {
            message: format!("failed to encode outbound message: {e}"),
            body: String::new(),
        })?;

        let session = self.lock_session();
        let Some(session) = session.as_ref() else {
            return Err(Error::NotConnected);
        };
        match session.outbound.try_send(text) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("event stream outbound queue full, dropping message");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::NotConnected),
        }
    }

    /// A new receiver for parsed events.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StreamEvent>> {
        self.shared.event_tx.subscribe()
    }

    /// A receiver for connection-state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Reconnect attempts made since the last successful handshake.
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.attempt.load(Ordering::SeqCst)
    }

    /// `true` once the reconnect cap was exhausted. Cleared by `connect`.
    pub fn has_given_up(&self) -> bool {
        self.shared.gave_up.load(Ordering::SeqCst)
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Connector> Shared<C> {
    fn publish(&self, generation: u64, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation || *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn bearer(&self) -> Option<SecretString> {
        self.credentials
            .as_deref()
            .and_then(auth::active_token)
    }
}

// ── Background session loop ──────────────────────────────────────────

/// connect → read → on drop, wait `delay` → reconnect, until cancelled or
/// the attempt cap is hit.
async fn run_session<C: Connector>(
    shared: Arc<Shared<C>>,
    generation: u64,
    url: Url,
    cancel: CancellationToken,
    mut outbound: mpsc::Receiver<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        shared.publish(generation, ConnectionState::Connecting);
        let bearer = shared.bearer();

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = shared.connector.connect(&url, bearer.as_ref()) => result,
        };

        match connected {
            Ok(socket) => {
                attempt = 0;
                shared.attempt.store(0, Ordering::SeqCst);
                shared.publish(generation, ConnectionState::Connected);
                info!("event stream connected");

                match read_until_closed(&shared, socket, &cancel, &mut outbound).await {
                    Ok(()) if cancel.is_cancelled() => break,
                    Ok(()) => info!("event stream ended by server"),
                    Err(e) => warn!(error = %e, "event stream dropped"),
                }
            }
            Err(e) => warn!(error = %e, attempt, "event stream connection failed"),
        }

        // `gave_up` is visible before the final Disconnected is published.
        let max_attempts = shared.reconnect.max_attempts;
        let exhausted = attempt >= max_attempts;
        if exhausted {
            error!(max_attempts, "event stream reconnection limit reached, giving up");
            if shared.generation.load(Ordering::SeqCst) == generation {
                shared.gave_up.store(true, Ordering::SeqCst);
            }
        }

        shared.publish(generation, ConnectionState::Disconnected);
        if exhausted {
            break;
        }

        attempt += 1;
        if shared.generation.load(Ordering::SeqCst) == generation {
            shared.attempt.store(attempt, Ordering::SeqCst);
        }
        let delay = shared.reconnect.delay;
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            max_attempts,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!(generation, "event stream session exiting");
}

/// Pump one live socket: inbound frames to the broadcast channel, queued
/// outbound messages to the socket. `Ok` on a close frame, end of stream,
/// or cancellation.
async fn read_until_closed<C: Connector>(
    shared: &Shared<C>,
    mut socket: C::Socket,
    cancel: &CancellationToken,
    outbound: &mut mpsc::Receiver<String>,
) -> Result<(), Error> {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                socket.close().await;
                return Ok(());
            }
            Some(text) = outbound.recv() => {
                socket.send_text(text).await?;
            }
            frame = socket.recv() => match frame {
                Some(Ok(Frame::Text(text))) => parse_and_broadcast(&text, &shared.event_tx),
                Some(Ok(Frame::Close { code, reason })) => {
                    info!(code, reason = %reason, "event stream close frame received");
                    return Ok(());
                }
                Some(Ok(Frame::Control)) => trace!("event stream control frame"),
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
        }
    }
}

fn parse_and_broadcast(text: &str, event_tx: &broadcast::Sender<Arc<StreamEvent>>) {
    match parse_frame(text, Utc::now()) {
        Ok(event) => {
            trace!(event_type = event.payload.type_name(), "event received");
            // No subscribers right now is fine.
            let _ = event_tx.send(Arc::new(event));
        }
        Err(e) => warn!(error = %e, "dropping event stream frame"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
