// ── Client ──
//
// Owns one Miniserver connection: connects, authenticates, then pumps
// binary frames through decode -> filter -> dispatch and publishes the
// resulting events. Single receive loop, no internal parallelism; the
// dispatcher cache is touched only from `listen`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use loxly_api::frame::{self, HEADER_LEN, MessageHeader};
use loxly_api::websocket::{self, WsStream};
use loxly_api::{AuthSession, StateId};

use crate::catalog::StructureCatalog;
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, StateEvent};
use crate::error::CoreError;
use crate::filter::SubscriptionFilter;
use crate::stream::{EventHandlers, EventStream, spawn_handler_task};

/// Poll interval while waiting for a full event channel to drain.
const HANDOFF_POLL: Duration = Duration::from_millis(1);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Listening,
    /// The socket was closed, by either side. `connect` may be called again.
    Closed,
}

/// Why [`Client::listen`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenExit {
    /// The requested duration passed. The connection stays open.
    DurationElapsed,
    /// The cancellation token fired. The connection stays open.
    Cancelled,
    /// The Miniserver closed the socket or the read failed.
    ConnectionClosed,
}

/// What one frame read produced.
enum Inbound {
    Updates(Vec<loxly_api::RawUpdate>),
    Nothing,
    Closed,
}

// ── Client ───────────────────────────────────────────────────────

/// Connection to one Miniserver.
///
/// Build with a [`StructureCatalog`], narrow the selection with the
/// `watch_*` methods, then [`connect`](Self::connect) and
/// [`listen`](Self::listen). Events are published to every receiver from
/// [`subscribe`](Self::subscribe), [`events`](Self::events) and
/// [`spawn_handlers`](Self::spawn_handlers).
pub struct Client {
    config: ClientConfig,
    catalog: Arc<StructureCatalog>,
    filter: SubscriptionFilter,
    dispatcher: Dispatcher,
    socket: Option<WsStream>,
    connection_state: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<StateEvent>,
    cancel: CancellationToken,
}

impl Client {
    /// Create a client. Does NOT connect.
    pub fn new(config: ClientConfig, catalog: impl Into<Arc<StructureCatalog>>) -> Self {
        let catalog = catalog.into();
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            dispatcher: Dispatcher::new(Arc::clone(&catalog)),
            catalog,
            config,
            filter: SubscriptionFilter::new(),
            socket: None,
            connection_state,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<StructureCatalog> {
        &self.catalog
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    // ── Selection ────────────────────────────────────────────────

    /// Report these ids. Returns how many were not already selected.
    pub fn watch_ids(&mut self, ids: impl IntoIterator<Item = StateId>) -> usize {
        self.filter.watch_ids(ids)
    }

    /// Report every state in `room` (case-insensitive exact name).
    pub fn watch_room(&mut self, room: &str) -> usize {
        self.filter.watch_room(&self.catalog, room)
    }

    /// Report every state of controls whose name contains `control`.
    pub fn watch_control(&mut self, control: &str) -> usize {
        self.filter.watch_control(&self.catalog, control)
    }

    /// Report every state whose key contains `state_key`.
    pub fn watch_state_key(&mut self, state_key: &str) -> usize {
        self.filter.watch_state_key(&self.catalog, state_key)
    }

    // ── Observation ──────────────────────────────────────────────

    /// Raw receiver on the event channel.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    /// Event channel as a `Stream`.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_tx.subscribe())
    }

    /// Run `handlers` on their own task. The task ends when the client is dropped.
    pub fn spawn_handlers(&self, handlers: EventHandlers) -> JoinHandle<()> {
        spawn_handler_task(self.event_tx.subscribe(), handlers)
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.subscribe()
    }

    /// Token that stops [`listen`](Self::listen) when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Open the WebSocket and authenticate.
    ///
    /// One attempt; handshake failures are returned as-is and leave the
    /// client disconnected.
    pub async fn connect(&mut self) -> Result<(), CoreError> {
        if self.socket.is_some() {
            debug!("connect() called while connected, ignoring");
            return Ok(());
        }

        let url = self.config.ws_url()?;
        self.set_state(ConnectionState::Connecting);

        let mut ws = match websocket::connect(&url).await {
            Ok(ws) => ws,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(CoreError::ConnectionFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        self.set_state(ConnectionState::Authenticating);
        let mut session = AuthSession::new(self.config.username.clone(), self.config.password.clone())
            .with_reply_timeout(self.config.handshake_timeout);

        if let Err(e) = session.authenticate(&mut ws).await {
            warn!(error = %e, "Handshake failed");
            let _ = ws.close(None).await;
            self.set_state(ConnectionState::Disconnected);
            return Err(match CoreError::from(e) {
                CoreError::ConnectionFailed { reason, .. } => CoreError::ConnectionFailed {
                    url: url.to_string(),
                    reason,
                },
                other => other,
            });
        }

        self.dispatcher.clear();
        self.socket = Some(ws);
        self.set_state(ConnectionState::Listening);
        info!(
            host = %self.config.host,
            watched = self.filter.len(),
            "Connected and listening"
        );
        Ok(())
    }

    /// Pump frames until `duration` passes, the token is cancelled, or the
    /// socket closes. `None` or a zero duration listens until one of the others.
    ///
    /// A socket that dies mid-read is not an error: the loop returns
    /// [`ListenExit::ConnectionClosed`] and the client is disconnected.
    pub async fn listen(&mut self, duration: Option<Duration>) -> Result<ListenExit, CoreError> {
        if self.socket.is_none() {
            return Err(CoreError::NotConnected);
        }

        let deadline = duration.filter(|d| !d.is_zero()).map(|d| Instant::now() + d);
        let exit = self.pump(deadline).await;

        if exit == ListenExit::ConnectionClosed {
            info!("Miniserver closed the connection");
            self.socket = None;
            self.dispatcher.clear();
            self.set_state(ConnectionState::Closed);
        } else {
            debug!(?exit, "Listen loop finished");
        }
        Ok(exit)
    }

    /// Close the socket. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        if let Some(mut ws) = self.socket.take() {
            if let Err(e) = ws.close(None).await {
                debug!(error = %e, "Close handshake failed");
            }
            self.dispatcher.clear();
            self.set_state(ConnectionState::Closed);
            info!("Disconnected");
        }
    }

    // ── Receive loop ─────────────────────────────────────────────

    async fn pump(&mut self, deadline: Option<Instant>) -> ListenExit {
        let Some(ws) = self.socket.as_mut() else {
            return ListenExit::ConnectionClosed;
        };
        let poll_interval = self.config.poll_interval;
        let payload_timeout = self.config.payload_timeout;

        loop {
            if self.cancel.is_cancelled() {
                return ListenExit::Cancelled;
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return ListenExit::DurationElapsed;
                    }
                    (deadline - now).min(poll_interval)
                }
                None => poll_interval,
            };

            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return ListenExit::Cancelled,
                next = tokio::time::timeout(wait, ws.next()) => next,
            };
            let Ok(next) = next else {
                trace!("Receive idle");
                continue;
            };

            match read_frame(ws, next, payload_timeout).await {
                Inbound::Updates(updates) => {
                    let handoff_deadline = Instant::now() + self.config.handoff_timeout;
                    for update in updates {
                        if !self.filter.matches(&update.id) {
                            continue;
                        }
                        if let Some(event) = self.dispatcher.process(update.id, update.value) {
                            let capacity = self.config.event_capacity.max(1);
                            wait_for_room(&self.event_tx, capacity, handoff_deadline).await;
                            trace!(name = event.name(), "Publishing event");
                            // No receivers is fine: nobody is watching yet.
                            let _ = self.event_tx.send(event);
                        }
                    }
                }
                Inbound::Nothing => {}
                Inbound::Closed => return ListenExit::ConnectionClosed,
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        trace!(?state, "Connection state");
        self.connection_state.send_replace(state);
    }
}

/// Let receivers catch up while the channel is full, until `deadline`.
///
/// One frame can carry thousands of initial values; pausing here keeps a
/// burst from overwriting events that a live consumer has not read yet.
/// Past the deadline the channel's drop-oldest policy applies.
async fn wait_for_room(tx: &broadcast::Sender<StateEvent>, capacity: usize, deadline: Instant) {
    let mut waited = false;
    while tx.len() >= capacity {
        if Instant::now() >= deadline {
            if waited {
                debug!(queued = tx.len(), "Event consumers still behind, dropping oldest");
            }
            return;
        }
        waited = true;
        tokio::time::sleep(HANDOFF_POLL).await;
    }
}

/// Interpret one received message, reading the payload that follows a header.
async fn read_frame(
    ws: &mut WsStream,
    message: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    payload_timeout: Duration,
) -> Inbound {
    let header_bytes: [u8; HEADER_LEN] = match message {
        Some(Ok(Message::Binary(bytes))) => match <[u8; HEADER_LEN]>::try_from(&bytes[..]) {
            Ok(raw) => raw,
            Err(_) => {
                trace!(len = bytes.len(), "Binary message outside a header, ignoring");
                return Inbound::Nothing;
            }
        },
        Some(Ok(Message::Close(_))) | None => return Inbound::Closed,
        Some(Err(e)) => {
            debug!(error = %e, "Receive failed");
            return Inbound::Closed;
        }
        Some(Ok(other)) => {
            trace!(kind = websocket::message_kind(&other), "Ignoring message");
            return Inbound::Nothing;
        }
    };

    let Some(header) = MessageHeader::parse(&header_bytes) else {
        trace!("8-byte message without header marker, ignoring");
        return Inbound::Nothing;
    };
    if header.estimated {
        trace!(message_type = %header.message_type, "Estimated header, waiting for exact one");
        return Inbound::Nothing;
    }
    if !header.message_type.has_payload() {
        trace!(message_type = %header.message_type, "Header-only message");
        return Inbound::Nothing;
    }

    match tokio::time::timeout(payload_timeout, ws.next()).await {
        Ok(Some(Ok(Message::Binary(payload)))) => {
            let updates = frame::decode(&header_bytes, &payload);
            trace!(
                message_type = %header.message_type,
                bytes = payload.len(),
                updates = updates.len(),
                "Decoded frame"
            );
            Inbound::Updates(updates)
        }
        Ok(Some(Ok(Message::Close(_))) | None) => Inbound::Closed,
        Ok(Some(Err(e))) => {
            debug!(error = %e, "Receive failed while waiting for payload");
            Inbound::Closed
        }
        Ok(Some(Ok(other))) => {
            trace!(
                message_type = %header.message_type,
                kind = websocket::message_kind(&other),
                "Non-binary payload, ignoring"
            );
            Inbound::Nothing
        }
        Err(_) => {
            debug!(
                message_type = %header.message_type,
                "Payload did not follow header in time"
            );
            Inbound::Nothing
        }
    }
}
