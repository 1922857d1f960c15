//! Configuration for the gateway client.

mod loader;

pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway connection settings (raw config-file structure).
///
/// Every field has a default so a missing or empty config file still yields
/// a working local setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WebSocket endpoint of the gateway.
    pub endpoint: String,
    /// Shared-secret token presented during the handshake.
    pub token: Option<String>,
    /// Reconnect automatically after an unplanned drop.
    pub auto_reconnect: bool,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Generic per-request timeout.
    pub request_timeout_ms: u64,
    /// Bound on the challenge wait and the connect request, independent
    /// from `request_timeout_ms`.
    pub handshake_timeout_ms: u64,
    /// HTTP endpoint for the degraded chat-send path; derived from
    /// `endpoint` when unset.
    pub fallback_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:18789".into(),
            token: None,
            auto_reconnect: true,
            reconnect_max_attempts: 10,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            request_timeout_ms: 60_000,
            handshake_timeout_ms: 10_000,
            fallback_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}
