//! Typed event dispatch.
//!
//! Incoming event frames are classified into [`GatewayEvent`] by a pure
//! function, then fanned out over a broadcast channel. Every subscriber
//! holds an independent receiver: a panicking, slow, or dropped consumer
//! cannot stop delivery to the others, which replaces the usual
//! string-keyed handler registry.

use atrium_application::ports::gateway::{AgentNotice, ChatNotice, GatewayEvent};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Sized for bursts of streaming deltas; a consumer that lags past this
/// observes `RecvError::Lagged` rather than blocking the reader.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast fan-out for gateway events.
pub(crate) struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: GatewayEvent) {
        // No subscribers is fine; events are fire-and-forget.
        if self.tx.send(event).is_err() {
            trace!("no event subscribers, dropping");
        }
    }
}

/// Classify a wire event frame into a typed [`GatewayEvent`].
///
/// Pure function, called once per event frame in the reader loop. Payloads
/// that fail to decode degrade to [`GatewayEvent::Other`] with a warning —
/// a malformed event must never take the connection down.
pub(crate) fn event_from_wire(name: &str, payload: serde_json::Value) -> GatewayEvent {
    match name {
        "connect.challenge" => GatewayEvent::Challenge,
        "agent" => match serde_json::from_value::<AgentNotice>(payload.clone()) {
            Ok(notice) => GatewayEvent::Agent(notice),
            Err(e) => {
                warn!("undecodable agent event: {}", e);
                GatewayEvent::Other {
                    name: name.to_string(),
                    payload,
                }
            }
        },
        "chat" => match serde_json::from_value::<ChatNotice>(payload.clone()) {
            Ok(notice) => GatewayEvent::Chat(notice),
            Err(e) => {
                warn!("undecodable chat event: {}", e);
                GatewayEvent::Other {
                    name: name.to_string(),
                    payload,
                }
            }
        },
        _ => GatewayEvent::Other {
            name: name.to_string(),
            payload,
        },
    }
}
