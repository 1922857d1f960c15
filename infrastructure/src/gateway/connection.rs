//! Connection lifecycle management.
//!
//! A [`Connection`] owns one WebSocket at a time and moves through
//! disconnected → connecting → connected, with a reconnecting state for
//! automatic recovery after an unplanned drop. A background reader task
//! drains the socket and feeds the correlator and the event bus; writes go
//! through a mutex-guarded sink. Explicit `disconnect` disables
//! auto-reconnect; a later explicit `connect` re-enables it per config.

use std::sync::Mutex as StdMutex;
use std::sync::RwLock as StdRwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atrium_application::ports::gateway::{ConnectionState, GatewayEvent};

use super::correlator::{Correlator, Settled};
use super::error::{GatewayClientError, Result};
use super::events::{event_from_wire, EventBus};
use super::frame::Frame;
use super::handshake::{self, HelloInfo};
use super::reconnect::{ReconnectPolicy, ReconnectState};
use crate::config::GatewayConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const STATE_CHANNEL_CAPACITY: usize = 16;

/// Handle to a managed gateway connection. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    config: GatewayConfig,
    policy: ReconnectPolicy,
    correlator: Correlator,
    events: EventBus,
    state: StdRwLock<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    writer: Mutex<Option<WsSink>>,
    /// Serializes connection attempts; never held across request traffic.
    connect_lock: Mutex<()>,
    reconnect: StdMutex<ReconnectState>,
    auto_reconnect: AtomicBool,
    /// Cancels the reader and any pending reconnect timer. Replaced with a
    /// fresh token on every teardown.
    tasks: StdMutex<CancellationToken>,
    /// Bumped on every (dis)connect so a stale reader's exit path can tell
    /// it no longer owns the socket.
    generation: AtomicU64,
    hello: StdRwLock<Option<HelloInfo>>,
}

impl Connection {
    pub fn new(config: GatewayConfig) -> Self {
        let policy = ReconnectPolicy::from_config(&config);
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ConnectionInner {
                config,
                policy,
                correlator: Correlator::new(),
                events: EventBus::new(),
                state: StdRwLock::new(ConnectionState::Disconnected),
                state_tx,
                writer: Mutex::new(None),
                connect_lock: Mutex::new(()),
                reconnect: StdMutex::new(ReconnectState::default()),
                auto_reconnect: AtomicBool::new(false),
                tasks: StdMutex::new(CancellationToken::new()),
                generation: AtomicU64::new(0),
                hello: StdRwLock::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.current_state()
    }

    /// Handshake result of the current connection, if any.
    pub fn hello(&self) -> Option<HelloInfo> {
        self.inner
            .hello
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    pub fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Establish and authenticate the connection.
    ///
    /// Idempotent: already connected returns immediately; an attempt in
    /// flight (connecting or reconnecting) is awaited rather than doubled.
    pub async fn connect(&self) -> Result<()> {
        self.inner
            .auto_reconnect
            .store(self.inner.config.auto_reconnect, Ordering::SeqCst);
        match self.inner.current_state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.inner.await_settled().await
            }
            ConnectionState::Disconnected => {
                let result = ConnectionInner::connect_attempt(&self.inner).await;
                if result.is_err() {
                    self.inner.set_state(ConnectionState::Disconnected);
                }
                result
            }
        }
    }

    /// Tear the connection down and stop reconnecting.
    ///
    /// Every pending request is rejected immediately. Safe to call in any
    /// state, including repeatedly.
    pub fn disconnect(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel_tasks();
        self.inner.correlator.reject_all();
        self.inner.set_state(ConnectionState::Disconnected);

        // The writer lock is only contended by in-flight sends; if one is
        // mid-write, hand the drop to a task instead of blocking here.
        if let Ok(mut writer) = self.inner.writer.try_lock() {
            writer.take();
        } else {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.writer.lock().await.take();
            });
        }
    }

    /// Send a request and await its correlated response, bounded by the
    /// configured request timeout.
    pub async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        if self.inner.current_state() != ConnectionState::Connected {
            return Err(GatewayClientError::NotConnected);
        }
        self.inner
            .send_request(method, params, self.inner.config.request_timeout())
            .await
    }
}

impl ConnectionInner {
    fn current_state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition and broadcast; repeated sets of the same state are
    /// swallowed so observers only see real transitions.
    fn set_state(&self, next: ConnectionState) {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if *state == next {
                return;
            }
            *state = next;
        }
        debug!(state = %next, "connection state changed");
        let _ = self.state_tx.send(next);
    }

    fn tasks_token(&self) -> CancellationToken {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn cancel_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.cancel();
        *tasks = CancellationToken::new();
    }

    /// Wait for an in-flight attempt (started by another caller) to settle.
    async fn await_settled(&self) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        // Re-check under the subscription so a transition between the
        // caller's check and this point is not missed.
        match self.current_state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Disconnected => return Err(GatewayClientError::NotConnected),
            _ => {}
        }
        loop {
            match rx.recv().await {
                Ok(ConnectionState::Connected) => return Ok(()),
                Ok(ConnectionState::Disconnected) => {
                    return Err(GatewayClientError::NotConnected);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(GatewayClientError::NotConnected);
                }
            }
        }
    }

    /// One full dial-and-handshake attempt. On failure the socket (if any)
    /// is torn down; the final state is the caller's responsibility.
    async fn connect_attempt(self: &Arc<Self>) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.current_state() == ConnectionState::Connected {
            return Ok(());
        }
        self.set_state(ConnectionState::Connecting);

        let (socket, _) = connect_async(self.config.endpoint.as_str())
            .await
            .map_err(|e| GatewayClientError::Transport(e.to_string()))?;
        let (sink, source) = socket.split();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.writer.lock().await = Some(sink);

        // Subscribe before the reader starts so the challenge cannot slip
        // past between accept and subscription.
        let mut challenge_rx = self.events.subscribe();
        let token = self.tasks_token().child_token();
        let reader = Arc::clone(self);
        tokio::spawn(async move {
            reader.reader_loop(source, token, generation).await;
        });

        match self.handshake(&mut challenge_rx).await {
            Ok(hello) => {
                info!(
                    gateway_id = %hello.gateway_id,
                    protocol = hello.protocol,
                    "gateway handshake complete"
                );
                *self.hello.write().unwrap_or_else(|e| e.into_inner()) = Some(hello);
                self.reconnect
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .attempts = 0;
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.teardown_socket().await;
                Err(e)
            }
        }
    }

    /// Wait for the server challenge, then answer with the `connect`
    /// request. Both phases share the handshake timeout.
    async fn handshake(self: &Arc<Self>, challenge_rx: &mut broadcast::Receiver<GatewayEvent>) -> Result<HelloInfo> {
        let wait = self.config.handshake_timeout();
        handshake::await_challenge(challenge_rx, wait).await?;

        let params = serde_json::to_value(handshake::connect_params(&self.config))?;
        let payload = self
            .send_request("connect", params, wait)
            .await
            .map_err(|e| match e {
                GatewayClientError::Rpc { code, message } => GatewayClientError::HandshakeFailed(
                    format!("gateway refused connect (code {code}): {message}"),
                ),
                GatewayClientError::Timeout { .. } => {
                    GatewayClientError::HandshakeFailed("connect response timed out".into())
                }
                other => other,
            })?;
        serde_json::from_value(payload)
            .map_err(|e| GatewayClientError::HandshakeFailed(format!("malformed hello: {e}")))
    }

    async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
        wait: Duration,
    ) -> Result<serde_json::Value> {
        let (id, rx) = self.correlator.register();
        let frame = Frame::request(id.clone(), method, params);
        if let Err(e) = self.write_frame(&frame).await {
            self.correlator.discard(&id);
            return Err(e);
        }
        match timeout(wait, rx).await {
            Err(_) => {
                // Timed-out entries leave the table now; a late response
                // is dropped by the correlator.
                self.correlator.discard(&id);
                Err(GatewayClientError::Timeout {
                    method: method.to_string(),
                })
            }
            Ok(Err(_)) => Err(GatewayClientError::Disconnected),
            Ok(Ok(Settled::Ok(payload))) => Ok(payload),
            Ok(Ok(Settled::Rejected(error))) => Err(GatewayClientError::Rpc {
                code: error.code,
                message: error.message,
            }),
            Ok(Ok(Settled::Disconnected)) => Err(GatewayClientError::Disconnected),
        }
    }

    async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let text = frame.encode()?;
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(GatewayClientError::NotConnected);
        };
        sink.send(Message::Text(text))
            .await
            .map_err(|e| GatewayClientError::Transport(e.to_string()))
    }

    /// Drain the socket until it closes or the token cancels. Runs as a
    /// background task; one per live socket.
    async fn reader_loop(
        self: Arc<Self>,
        mut source: WsSource,
        token: CancellationToken,
        generation: u64,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => self.dispatch_frame(&text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("gateway socket error: {}", e);
                        break;
                    }
                },
            }
        }
        self.on_socket_closed(generation).await;
    }

    fn dispatch_frame(&self, text: &str) {
        match Frame::decode(text) {
            Ok(Frame::Response {
                id,
                ok,
                payload,
                error,
            }) => self.correlator.settle(&id, ok, payload, error),
            Ok(Frame::Event { event, payload }) => {
                self.events.publish(event_from_wire(&event, payload));
            }
            Ok(Frame::Request { method, .. }) => {
                // This client exposes no server-callable methods.
                debug!(%method, "ignoring inbound request frame");
            }
            Err(e) => warn!("undecodable frame, dropping: {}", e),
        }
    }

    /// Exit path of the reader task for an unplanned close.
    async fn on_socket_closed(self: &Arc<Self>, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            // A newer connect or an explicit disconnect already owns
            // teardown for this socket.
            return;
        }
        warn!("gateway connection lost");
        self.writer.lock().await.take();
        self.correlator.reject_all();

        let was_connected = self.current_state() == ConnectionState::Connected;
        // Observers always see the drop before any reconnecting state, so
        // stale streaming flags can be cleared.
        self.set_state(ConnectionState::Disconnected);
        if was_connected && self.auto_reconnect.load(Ordering::SeqCst) {
            self.schedule_reconnect();
        }
    }

    /// Arm the next reconnect attempt per the backoff policy.
    fn schedule_reconnect(self: &Arc<Self>) {
        let attempt = {
            let mut state = self.reconnect.lock().unwrap_or_else(|e| e.into_inner());
            let attempt = state.attempts;
            state.attempts += 1;
            attempt
        };
        let Some(delay) = self.policy.delay_for(attempt) else {
            warn!(attempts = attempt, "reconnect attempts exhausted, giving up");
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        self.set_state(ConnectionState::Reconnecting);
        info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "reconnecting");

        let token = self.tasks_token();
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if !inner.auto_reconnect.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = ConnectionInner::connect_attempt(&inner).await {
                warn!("reconnect attempt failed: {}", e);
                inner.schedule_reconnect();
            }
        });
    }

    /// Undo a partially-established connection (failed handshake).
    async fn teardown_socket(&self) {
        self.cancel_tasks();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.writer.lock().await.take();
        self.correlator.reject_all();
    }
}
