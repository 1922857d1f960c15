//! Session–thread multiplexer.
//!
//! [`ChatService`] is the surface the dashboard talks to: it resolves thread
//! ids to session keys, sends chat messages over the gateway (falling back
//! to the HTTP path when the socket is down), and folds server-pushed
//! `agent`/`chat` events into per-session streaming state that the UI polls.

use crate::ports::fallback::FallbackSender;
use crate::ports::gateway::{ConnectionState, GatewayError, GatewayEvent, GatewayPort};
use atrium_domain::{
    ActivityMarker, ChatHistory, SessionKey, SessionState, thread_to_session_key,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Process-wide suffix for idempotency keys.
static IDEMPOTENCY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generates a fresh idempotency key for a chat send.
fn next_idempotency_key() -> String {
    let seq = IDEMPOTENCY_SEQ.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", Utc::now().timestamp_millis(), seq)
}

/// Result of [`ChatService::send_message`].
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub session_key: SessionKey,
    pub run_id: Option<String>,
    /// True when the message was delivered over the HTTP fallback path.
    pub via_fallback: bool,
}

/// The session–thread multiplexer.
///
/// Holds one `Arc<dyn GatewayPort>` and one `Arc<dyn FallbackSender>`
/// injected by the composition root — no process-global client. A
/// background tracker task consumes the gateway's event stream for as long
/// as the service lives.
pub struct ChatService {
    gateway: Arc<dyn GatewayPort>,
    fallback: Arc<dyn FallbackSender>,
    /// Uses `std::sync::RwLock`: the lock is only held for HashMap
    /// insert/lookup, never across an await point.
    sessions: Arc<RwLock<HashMap<SessionKey, SessionState>>>,
    using_http_fallback: Arc<AtomicBool>,
    tracker: JoinHandle<()>,
}

impl ChatService {
    pub fn new(gateway: Arc<dyn GatewayPort>, fallback: Arc<dyn FallbackSender>) -> Self {
        let sessions: Arc<RwLock<HashMap<SessionKey, SessionState>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let tracker = tokio::spawn(track_events(
            gateway.events(),
            gateway.state_changes(),
            Arc::clone(&sessions),
        ));

        Self {
            gateway,
            fallback,
            sessions,
            using_http_fallback: Arc::new(AtomicBool::new(false)),
            tracker,
        }
    }

    /// Send a message to a thread's session.
    ///
    /// Prefers the protocol path; any failure there (including "not
    /// connected") degrades to the HTTP fallback and flags
    /// [`is_using_http_fallback`](Self::is_using_http_fallback) instead of
    /// raising.
    pub async fn send_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<SendOutcome, GatewayError> {
        let session_key = thread_to_session_key(thread_id);
        let idempotency_key = next_idempotency_key();

        if self.gateway.state() == ConnectionState::Connected {
            match self
                .gateway
                .chat_send(&session_key, content, true, &idempotency_key)
                .await
            {
                Ok(receipt) => {
                    self.using_http_fallback.store(false, Ordering::Release);
                    return Ok(SendOutcome {
                        session_key,
                        run_id: receipt.run_id,
                        via_fallback: false,
                    });
                }
                Err(e) => {
                    warn!("chat.send failed, using HTTP fallback: {}", e);
                }
            }
        } else {
            debug!(
                "gateway {} — sending via HTTP fallback",
                self.gateway.state()
            );
        }

        let receipt = self
            .fallback
            .send(&session_key, content, &idempotency_key)
            .await?;
        self.using_http_fallback.store(true, Ordering::Release);

        Ok(SendOutcome {
            session_key,
            run_id: receipt.run_id,
            via_fallback: true,
        })
    }

    /// Fetch the most recent messages for a thread.
    pub async fn history(
        &self,
        thread_id: &str,
        limit: u32,
    ) -> Result<ChatHistory, GatewayError> {
        let session_key = thread_to_session_key(thread_id);
        self.gateway.chat_history(&session_key, limit).await
    }

    /// Ask the gateway to stop generating for a thread's session.
    /// Best-effort: in-flight request futures are not cancelled locally.
    pub async fn abort(&self, thread_id: &str) -> Result<(), GatewayError> {
        let session_key = thread_to_session_key(thread_id);
        self.gateway.chat_abort(&session_key).await
    }

    /// Snapshot of a session's streaming/activity state.
    pub fn session_state(&self, session_key: &SessionKey) -> SessionState {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_key).cloned().unwrap_or_default()
    }

    /// True while the most recent send went over the HTTP fallback path.
    pub fn is_using_http_fallback(&self) -> bool {
        self.using_http_fallback.load(Ordering::Acquire)
    }
}

impl Drop for ChatService {
    fn drop(&mut self) {
        self.tracker.abort();
    }
}

/// Background tracker: folds gateway events into per-session state.
///
/// A failure to handle one event is logged and never stops the loop, so a
/// malformed payload cannot starve later events.
async fn track_events(
    mut events: broadcast::Receiver<GatewayEvent>,
    mut states: broadcast::Receiver<ConnectionState>,
    sessions: Arc<RwLock<HashMap<SessionKey, SessionState>>>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => apply_event(&sessions, event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("session tracker lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            state = states.recv() => match state {
                // Streaming flags are stale across a drop; clear them until
                // fresh events arrive on the new socket.
                Ok(ConnectionState::Disconnected) => {
                    let mut sessions =
                        sessions.write().unwrap_or_else(|e| e.into_inner());
                    for state in sessions.values_mut() {
                        state.clear_streaming();
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("session tracker stopped");
}

fn apply_event(
    sessions: &Arc<RwLock<HashMap<SessionKey, SessionState>>>,
    event: GatewayEvent,
) {
    match event {
        GatewayEvent::Agent(notice) => {
            let marker = ActivityMarker {
                kind: notice.stream,
                at: Utc::now().timestamp_millis(),
                tool: notice.tool,
            };
            let mut sessions = sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions
                .entry(notice.session_key)
                .or_default()
                .apply_activity(marker);
        }
        GatewayEvent::Chat(notice) => {
            let mut sessions = sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions
                .entry(notice.session_key)
                .or_default()
                .apply_chat(notice.state);
        }
        GatewayEvent::Challenge | GatewayEvent::Other { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::gateway::{AgentNotice, ChatNotice};
    use async_trait::async_trait;
    use atrium_domain::{ActivityKind, ChatStreamState, SendReceipt};
    use std::sync::Mutex;

    /// Scripted gateway port for multiplexer tests.
    struct StubGateway {
        state: Mutex<ConnectionState>,
        fail_sends: bool,
        events_tx: broadcast::Sender<GatewayEvent>,
        states_tx: broadcast::Sender<ConnectionState>,
        sends: Mutex<Vec<(SessionKey, String, String)>>,
    }

    impl StubGateway {
        fn new(state: ConnectionState) -> Arc<Self> {
            Self::build(state, false)
        }

        fn failing_sends() -> Arc<Self> {
            Self::build(ConnectionState::Connected, true)
        }

        fn build(state: ConnectionState, fail_sends: bool) -> Arc<Self> {
            let (events_tx, _) = broadcast::channel(64);
            let (states_tx, _) = broadcast::channel(16);
            Arc::new(Self {
                state: Mutex::new(state),
                fail_sends,
                events_tx,
                states_tx,
                sends: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GatewayPort for StubGateway {
        fn state(&self) -> ConnectionState {
            *self.state.lock().unwrap()
        }

        async fn connect(&self) -> Result<(), GatewayError> {
            *self.state.lock().unwrap() = ConnectionState::Connected;
            Ok(())
        }

        fn disconnect(&self) {
            *self.state.lock().unwrap() = ConnectionState::Disconnected;
        }

        async fn chat_send(
            &self,
            session_key: &SessionKey,
            message: &str,
            _deliver: bool,
            idempotency_key: &str,
        ) -> Result<SendReceipt, GatewayError> {
            if self.fail_sends {
                return Err(GatewayError::Timeout {
                    method: "chat.send".into(),
                });
            }
            self.sends.lock().unwrap().push((
                session_key.clone(),
                message.to_string(),
                idempotency_key.to_string(),
            ));
            Ok(SendReceipt {
                run_id: Some("run-ws".into()),
            })
        }

        async fn chat_history(
            &self,
            _session_key: &SessionKey,
            _limit: u32,
        ) -> Result<ChatHistory, GatewayError> {
            Ok(ChatHistory::default())
        }

        async fn chat_abort(&self, _session_key: &SessionKey) -> Result<(), GatewayError> {
            Ok(())
        }

        fn events(&self) -> broadcast::Receiver<GatewayEvent> {
            self.events_tx.subscribe()
        }

        fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
            self.states_tx.subscribe()
        }
    }

    /// Poll until the tracker task has observed an event.
    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 1s");
    }

    #[derive(Default)]
    struct StubFallback {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FallbackSender for StubFallback {
        async fn send(
            &self,
            _session_key: &SessionKey,
            message: &str,
            _idempotency_key: &str,
        ) -> Result<SendReceipt, GatewayError> {
            self.calls.lock().unwrap().push(message.to_string());
            Ok(SendReceipt { run_id: None })
        }
    }

    #[tokio::test]
    async fn connected_send_goes_over_the_protocol() {
        let gateway = StubGateway::new(ConnectionState::Connected);
        let fallback = Arc::new(StubFallback::default());
        let service = ChatService::new(gateway.clone(), fallback.clone());

        let outcome = service.send_message("work", "status?").await.unwrap();

        assert!(!outcome.via_fallback);
        assert_eq!(outcome.run_id.as_deref(), Some("run-ws"));
        assert!(!service.is_using_http_fallback());
        assert!(fallback.calls.lock().unwrap().is_empty());

        let sends = gateway.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0.as_str(), "agent:work:atrium:work");
    }

    #[tokio::test]
    async fn disconnected_send_uses_fallback_without_raising() {
        let gateway = StubGateway::new(ConnectionState::Disconnected);
        let fallback = Arc::new(StubFallback::default());
        let service = ChatService::new(gateway, fallback.clone());

        let outcome = service.send_message("work", "anyone there?").await.unwrap();

        assert!(outcome.via_fallback);
        assert!(service.is_using_http_fallback());
        assert_eq!(fallback.calls.lock().unwrap().as_slice(), ["anyone there?"]);
    }

    #[tokio::test]
    async fn protocol_failure_degrades_to_fallback() {
        let gateway = StubGateway::failing_sends();
        let fallback = Arc::new(StubFallback::default());
        let service = ChatService::new(gateway, fallback.clone());

        let outcome = service.send_message("home", "ping").await.unwrap();

        assert!(outcome.via_fallback);
        assert!(service.is_using_http_fallback());
        assert_eq!(fallback.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn direct_success_clears_the_fallback_flag() {
        let gateway = StubGateway::new(ConnectionState::Disconnected);
        let fallback = Arc::new(StubFallback::default());
        let service = ChatService::new(gateway.clone(), fallback);

        service.send_message("work", "offline").await.unwrap();
        assert!(service.is_using_http_fallback());

        *gateway.state.lock().unwrap() = ConnectionState::Connected;
        service.send_message("work", "back online").await.unwrap();
        assert!(!service.is_using_http_fallback());
    }

    #[tokio::test]
    async fn tracker_folds_events_into_session_state() {
        let gateway = StubGateway::new(ConnectionState::Connected);
        let fallback = Arc::new(StubFallback::default());
        let service = ChatService::new(gateway.clone(), fallback);
        let key = thread_to_session_key("work");

        gateway
            .events_tx
            .send(GatewayEvent::Agent(AgentNotice {
                session_key: key.clone(),
                run_id: Some("run-1".into()),
                stream: ActivityKind::StreamingText,
                tool: None,
                content: Some("hel".into()),
            }))
            .unwrap();
        wait_until(|| service.session_state(&key).is_streaming).await;
        assert_eq!(
            service
                .session_state(&key)
                .last_activity
                .map(|m| m.kind),
            Some(ActivityKind::StreamingText)
        );

        gateway
            .events_tx
            .send(GatewayEvent::Chat(ChatNotice {
                session_key: key.clone(),
                run_id: Some("run-1".into()),
                state: ChatStreamState::Final,
            }))
            .unwrap();
        wait_until(|| !service.session_state(&key).is_streaming).await;
    }

    #[tokio::test]
    async fn disconnect_marks_streaming_state_stale() {
        let gateway = StubGateway::new(ConnectionState::Connected);
        let fallback = Arc::new(StubFallback::default());
        let service = ChatService::new(gateway.clone(), fallback);
        let key = thread_to_session_key("work");

        gateway
            .events_tx
            .send(GatewayEvent::Chat(ChatNotice {
                session_key: key.clone(),
                run_id: None,
                state: ChatStreamState::Delta,
            }))
            .unwrap();
        wait_until(|| service.session_state(&key).is_streaming).await;

        gateway
            .states_tx
            .send(ConnectionState::Disconnected)
            .unwrap();
        wait_until(|| !service.session_state(&key).is_streaming).await;
    }

    #[test]
    fn idempotency_keys_are_unique() {
        let a = next_idempotency_key();
        let b = next_idempotency_key();
        assert_ne!(a, b);
    }
}
