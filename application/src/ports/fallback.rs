//! HTTP fallback port
//!
//! When the gateway socket is down, chat sends degrade to a plain HTTP
//! request path instead of failing. This port abstracts that path so the
//! multiplexer can be tested without a real HTTP client.

use async_trait::async_trait;
use atrium_domain::{SendReceipt, SessionKey};

use super::gateway::GatewayError;

/// Alternate delivery path for `chat.send` when the socket is unavailable.
#[async_trait]
pub trait FallbackSender: Send + Sync {
    async fn send(
        &self,
        session_key: &SessionKey,
        message: &str,
        idempotency_key: &str,
    ) -> Result<SendReceipt, GatewayError>;
}
