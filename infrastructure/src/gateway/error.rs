//! Error types for the gateway protocol client

use thiserror::Error;

/// Result type alias for gateway client operations
pub type Result<T> = std::result::Result<T, GatewayClientError>;

/// Errors that can occur when communicating with the gateway
#[derive(Error, Debug)]
pub enum GatewayClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed by the gateway")]
    ConnectionClosed,

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("timed out waiting for connect.challenge")]
    ChallengeTimeout,

    #[error("gateway error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("request '{method}' timed out")]
    Timeout { method: String },

    #[error("not connected")]
    NotConnected,

    #[error("disconnected while request was pending")]
    Disconnected,

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
