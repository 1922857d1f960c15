//! Wire frame codec for the gateway protocol.
//!
//! Three frame shapes travel over the duplex connection, distinguished by
//! the `type` field:
//!
//! - **Request**: `{ "type": "req", "id", "method", "params" }`
//! - **Response**: `{ "type": "res", "id", "ok", "payload"?, "error"? }`
//! - **Event**: `{ "type": "event", "event", "payload" }`
//!
//! Undecodable frames are the caller's problem to log and drop; nothing in
//! this module panics on bad input.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// One discrete JSON message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "req")]
    Request {
        id: String,
        method: String,
        params: serde_json::Value,
    },
    #[serde(rename = "res")]
    Response {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
    #[serde(rename = "event")]
    Event {
        event: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Error object carried by a failed response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

impl Frame {
    pub fn request(id: String, method: impl Into<String>, params: serde_json::Value) -> Self {
        Frame::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Per-client request id source.
///
/// Ids are never reused within a connection's lifetime; a plain counter
/// keeps them greppable in traces. One instance per client, not a process
/// global, so parallel clients in tests don't interleave id spaces.
#[derive(Debug)]
pub(crate) struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> String {
        self.0.fetch_add(1, Ordering::SeqCst).to_string()
    }
}
