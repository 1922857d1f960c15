//! Server-challenged authentication handshake.
//!
//! The client does nothing on socket-open except wait: the gateway opens
//! with a `connect.challenge` event, the client answers with a single
//! `connect` request carrying its protocol range, identity, and
//! credentials, and the correlated response settles the attempt. One
//! handshake per connection; both phases are bounded by the configurable
//! handshake timeout, which is independent from the generic request
//! timeout.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::timeout;

use atrium_application::ports::gateway::GatewayEvent;

use super::error::{GatewayClientError, Result};
use crate::config::GatewayConfig;

/// Lowest protocol revision this client speaks.
pub const MIN_PROTOCOL: u32 = 1;
/// Highest protocol revision this client speaks.
pub const MAX_PROTOCOL: u32 = 1;

const CLIENT_ID: &str = "atrium";
const CLIENT_MODE: &str = "backend";
const ROLE: &str = "operator";
const SCOPES: &[&str] = &["chat"];

/// Parameters of the `connect` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub role: String,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
}

/// Client identity declared during the handshake.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

/// Credentials: a shared-secret token or a password, never both.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Payload of a successful `connect` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloInfo {
    pub protocol: u32,
    pub gateway_id: String,
    pub session_id: String,
}

/// Build the `connect` request parameters for this client build.
pub(crate) fn connect_params(config: &GatewayConfig) -> ConnectParams {
    ConnectParams {
        min_protocol: MIN_PROTOCOL,
        max_protocol: MAX_PROTOCOL,
        client: ClientInfo {
            id: CLIENT_ID.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            platform: std::env::consts::OS.into(),
            mode: CLIENT_MODE.into(),
        },
        role: ROLE.into(),
        scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        auth: config.token.as_ref().map(|token| AuthParams {
            token: Some(token.clone()),
            password: None,
        }),
    }
}

/// Wait for the server-initiated challenge, bounded by the handshake
/// timeout. Other events arriving first are ignored, not consumed wrongly —
/// the receiver was subscribed before the reader task started, so the
/// challenge cannot be missed.
pub(crate) async fn await_challenge(
    events: &mut broadcast::Receiver<GatewayEvent>,
    wait: std::time::Duration,
) -> Result<()> {
    let challenge = async {
        loop {
            match events.recv().await {
                Ok(GatewayEvent::Challenge) => return Ok(()),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(GatewayClientError::ConnectionClosed);
                }
            }
        }
    };
    match timeout(wait, challenge).await {
        Ok(result) => result,
        Err(_) => Err(GatewayClientError::ChallengeTimeout),
    }
}
