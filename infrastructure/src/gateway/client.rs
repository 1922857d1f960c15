//! Gateway protocol client — the [`GatewayPort`] implementation.
//!
//! Thin typed layer over [`Connection`]: each port operation serializes its
//! params, issues the wire request, and decodes the payload. Infrastructure
//! errors are mapped to the port's error taxonomy at this boundary.

use async_trait::async_trait;
use serde::Serialize;
use tracing::instrument;

use atrium_application::ports::gateway::{
    ConnectionState, GatewayError, GatewayEvent, GatewayPort,
};
use atrium_domain::{ChatHistory, SendReceipt, SessionKey};

use super::connection::Connection;
use super::error::GatewayClientError;
use super::handshake::HelloInfo;
use crate::config::GatewayConfig;

/// WebSocket gateway client.
#[derive(Clone)]
pub struct GatewayClient {
    connection: Connection,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatSendParams<'a> {
    session_key: &'a SessionKey,
    message: &'a str,
    deliver: bool,
    idempotency_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatHistoryParams<'a> {
    session_key: &'a SessionKey,
    limit: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatAbortParams<'a> {
    session_key: &'a SessionKey,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            connection: Connection::new(config),
        }
    }

    /// Handshake result of the current connection, if connected.
    pub fn hello(&self) -> Option<HelloInfo> {
        self.connection.hello()
    }

    async fn typed_request<P, R>(&self, method: &str, params: &P) -> Result<R, GatewayError>
    where
        P: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let params = serde_json::to_value(params)
            .map_err(|e| GatewayError::Other(format!("encoding {method} params: {e}")))?;
        let payload = self
            .connection
            .request(method, params)
            .await
            .map_err(map_error)?;
        serde_json::from_value(payload)
            .map_err(|e| GatewayError::Other(format!("decoding {method} payload: {e}")))
    }
}

fn map_error(error: GatewayClientError) -> GatewayError {
    match error {
        GatewayClientError::NotConnected => GatewayError::NotConnected,
        GatewayClientError::Disconnected => GatewayError::Disconnected,
        GatewayClientError::Timeout { method } => GatewayError::Timeout { method },
        GatewayClientError::Rpc { code, message } => GatewayError::Rejected { code, message },
        GatewayClientError::HandshakeFailed(reason) => GatewayError::Handshake(reason),
        GatewayClientError::ChallengeTimeout => {
            GatewayError::Handshake("timed out waiting for connect.challenge".into())
        }
        GatewayClientError::Transport(reason) => GatewayError::Connection(reason),
        GatewayClientError::ConnectionClosed => {
            GatewayError::Connection("connection closed by the gateway".into())
        }
        GatewayClientError::Serialization(e) => GatewayError::Other(e.to_string()),
    }
}

#[async_trait]
impl GatewayPort for GatewayClient {
    fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    async fn connect(&self) -> Result<(), GatewayError> {
        self.connection.connect().await.map_err(map_error)
    }

    fn disconnect(&self) {
        self.connection.disconnect();
    }

    #[instrument(skip(self, message), fields(session = %session_key))]
    async fn chat_send(
        &self,
        session_key: &SessionKey,
        message: &str,
        deliver: bool,
        idempotency_key: &str,
    ) -> Result<SendReceipt, GatewayError> {
        self.typed_request(
            "chat.send",
            &ChatSendParams {
                session_key,
                message,
                deliver,
                idempotency_key,
            },
        )
        .await
    }

    async fn chat_history(
        &self,
        session_key: &SessionKey,
        limit: u32,
    ) -> Result<ChatHistory, GatewayError> {
        self.typed_request("chat.history", &ChatHistoryParams { session_key, limit })
            .await
    }

    async fn chat_abort(&self, session_key: &SessionKey) -> Result<(), GatewayError> {
        // Payload is an empty object; decode into Value and discard.
        let _: serde_json::Value = self
            .typed_request("chat.abort", &ChatAbortParams { session_key })
            .await?;
        Ok(())
    }

    fn events(&self) -> tokio::sync::broadcast::Receiver<GatewayEvent> {
        self.connection.events()
    }

    fn state_changes(&self) -> tokio::sync::broadcast::Receiver<ConnectionState> {
        self.connection.state_changes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_send_params_wire_shape() {
        let key = SessionKey::from("agent:main:atrium:work".to_string());
        let params = ChatSendParams {
            session_key: &key,
            message: "hello",
            deliver: true,
            idempotency_key: "1724-0",
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["sessionKey"], "agent:main:atrium:work");
        assert_eq!(json["message"], "hello");
        assert_eq!(json["deliver"], true);
        assert_eq!(json["idempotencyKey"], "1724-0");
    }

    #[test]
    fn rpc_errors_map_to_rejections() {
        let mapped = map_error(GatewayClientError::Rpc {
            code: 401,
            message: "bad token".into(),
        });
        assert!(matches!(
            mapped,
            GatewayError::Rejected { code: 401, .. }
        ));
    }

    #[test]
    fn handshake_errors_keep_their_reason() {
        let mapped = map_error(GatewayClientError::ChallengeTimeout);
        match mapped {
            GatewayError::Handshake(reason) => assert!(reason.contains("connect.challenge")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
