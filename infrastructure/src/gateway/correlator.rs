//! Request/response correlation.
//!
//! Every outbound request registers a oneshot slot keyed by its id; the
//! reader task fulfils the slot when the matching response frame arrives.
//! Slots die three ways: a matching response, a timeout (the caller
//! discards the entry), or connection teardown (every slot is rejected at
//! once with a disconnect error).

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use super::frame::{RequestIds, WireError};

/// How a pending request was resolved.
#[derive(Debug)]
pub(crate) enum Settled {
    /// `ok: true` — the payload (Null when absent).
    Ok(serde_json::Value),
    /// `ok: false` — the gateway-supplied error.
    Rejected(WireError),
    /// The connection went away before a response arrived.
    Disconnected,
}

/// Owner of the pending-request table.
///
/// Uses `std::sync::Mutex`: the lock is only held for HashMap insert/remove
/// and the oneshot send, never across an await point.
pub(crate) struct Correlator {
    ids: RequestIds,
    pending: Mutex<HashMap<String, oneshot::Sender<Settled>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            ids: RequestIds::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh request id and its response slot.
    pub fn register(&self) -> (String, oneshot::Receiver<Settled>) {
        let id = self.ids.next();
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(id.clone(), tx);
        (id, rx)
    }

    /// Resolve a pending request from a response frame.
    ///
    /// A response with no matching entry (late arrival after a timeout
    /// removed it) is dropped with a debug log, never an error.
    pub fn settle(
        &self,
        id: &str,
        ok: bool,
        payload: Option<serde_json::Value>,
        error: Option<WireError>,
    ) {
        let sender = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(id)
        };
        let Some(tx) = sender else {
            debug!("no pending request for response id={}, dropping", id);
            return;
        };
        let settled = if ok {
            Settled::Ok(payload.unwrap_or(serde_json::Value::Null))
        } else {
            Settled::Rejected(error.unwrap_or(WireError {
                code: -1,
                message: "unspecified gateway error".into(),
            }))
        };
        let _ = tx.send(settled);
    }

    /// Drop a pending entry without resolving it (timeout, failed write).
    pub fn discard(&self, id: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(id);
    }

    /// Teardown: reject every still-pending request, regardless of its
    /// individual timeout, and clear the table.
    pub fn reject_all(&self) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Settled::Disconnected);
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
