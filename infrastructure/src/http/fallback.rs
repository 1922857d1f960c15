//! Degraded chat-send path over plain HTTP.
//!
//! Used when the WebSocket connection is down: one POST per message, same
//! idempotency key as the protocol path so the gateway can dedupe retries
//! that raced a reconnect. Only `chat.send` degrades; history and abort
//! have no fallback.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use atrium_application::ports::fallback::FallbackSender;
use atrium_application::ports::gateway::GatewayError;
use atrium_domain::{SendReceipt, SessionKey};

use crate::config::GatewayConfig;

const SEND_PATH: &str = "/v1/chat/send";

/// HTTP fallback sender for chat messages.
pub struct HttpFallback {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    session_key: &'a SessionKey,
    message: &'a str,
    idempotency_key: &'a str,
}

impl HttpFallback {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }

    /// Build from config; the URL is derived from the WebSocket endpoint
    /// when `fallback_url` is unset.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let url = config
            .fallback_url
            .clone()
            .unwrap_or_else(|| derive_fallback_url(&config.endpoint));
        Self::new(url, config.token.clone())
    }
}

/// `ws://host` becomes `http://host/v1/chat/send` (`wss` likewise `https`).
fn derive_fallback_url(endpoint: &str) -> String {
    let base = if let Some(rest) = endpoint.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        endpoint.to_string()
    };
    format!("{}{}", base.trim_end_matches('/'), SEND_PATH)
}

#[async_trait]
impl FallbackSender for HttpFallback {
    async fn send(
        &self,
        session_key: &SessionKey,
        message: &str,
        idempotency_key: &str,
    ) -> Result<SendReceipt, GatewayError> {
        debug!(session = %session_key, "sending chat message over http fallback");
        let mut request = self.http.post(&self.url).json(&SendBody {
            session_key,
            message,
            idempotency_key,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Fallback(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Fallback(format!(
                "gateway returned {status}: {body}"
            )));
        }
        response
            .json::<SendReceipt>()
            .await
            .map_err(|e| GatewayError::Fallback(format!("malformed receipt: {e}")))
    }
}
