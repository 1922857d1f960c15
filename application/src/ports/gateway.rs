//! Gateway port
//!
//! Defines how the application layer talks to the gateway protocol client.
//! The implementation (the WebSocket client) lives in the infrastructure
//! layer; this module only fixes the contract: connection lifecycle, typed
//! request surface, and the two broadcast streams (gateway events and
//! connection-state transitions).

use async_trait::async_trait;
use atrium_domain::{ActivityKind, ChatHistory, ChatStreamState, SendReceipt, SessionKey};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can surface through the gateway port
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("not connected to the gateway")]
    NotConnected,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("gateway rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("request '{method}' timed out")]
    Timeout { method: String },

    #[error("disconnected while request was pending")]
    Disconnected,

    #[error("fallback delivery failed: {0}")]
    Fallback(String),

    #[error("{0}")]
    Other(String),
}

/// Connection lifecycle state, as observed through the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Low-level agent activity pushed by the gateway (`agent` events).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentNotice {
    pub session_key: SessionKey,
    #[serde(default)]
    pub run_id: Option<String>,
    pub stream: ActivityKind,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Higher-level chat stream notification (`chat` events).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNotice {
    pub session_key: SessionKey,
    #[serde(default)]
    pub run_id: Option<String>,
    pub state: ChatStreamState,
}

/// A server-pushed gateway event, already classified.
///
/// One tagged union instead of a string-keyed handler registry: consumers
/// hold independent broadcast receivers, so one slow or failing consumer
/// cannot block the others.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The server-initiated authentication challenge.
    Challenge,
    /// Per-token / per-tool agent activity.
    Agent(AgentNotice),
    /// Chat stream phase change (delta / final / error / aborted).
    Chat(ChatNotice),
    /// Anything this client does not model; payload preserved for logging.
    Other {
        name: String,
        payload: serde_json::Value,
    },
}

/// Gateway protocol client, as seen from the application layer.
#[async_trait]
pub trait GatewayPort: Send + Sync {
    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Establish and authenticate the connection. Idempotent while already
    /// connecting or connected.
    async fn connect(&self) -> Result<(), GatewayError>;

    /// Tear the connection down and disable auto-reconnect for this
    /// instance. Always succeeds.
    fn disconnect(&self);

    /// `chat.send` — queue a message for generation on the gateway.
    async fn chat_send(
        &self,
        session_key: &SessionKey,
        message: &str,
        deliver: bool,
        idempotency_key: &str,
    ) -> Result<SendReceipt, GatewayError>;

    /// `chat.history` — fetch the most recent messages for a session.
    async fn chat_history(
        &self,
        session_key: &SessionKey,
        limit: u32,
    ) -> Result<ChatHistory, GatewayError>;

    /// `chat.abort` — best-effort request to stop generation for a session.
    async fn chat_abort(&self, session_key: &SessionKey) -> Result<(), GatewayError>;

    /// Subscribe to server-pushed events.
    fn events(&self) -> broadcast::Receiver<GatewayEvent>;

    /// Subscribe to connection-state transitions (every transition is
    /// delivered, including intermediate connecting/reconnecting).
    fn state_changes(&self) -> broadcast::Receiver<ConnectionState>;
}
