//! In-process mock gateway for integration tests.
//!
//! Accepts WebSocket connections, plays the server side of the handshake
//! (challenge event, `connect` response), and answers a small fixed method
//! set. Behavior toggles let individual tests exercise handshake failure
//! and reconnect paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

type ServerSink = Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    /// Never send `connect.challenge`; the client's handshake must time out.
    pub withhold_challenge: bool,
    /// Close the first connection right after its handshake completes.
    pub drop_first_connection: bool,
}

pub struct MockGateway {
    addr: std::net::SocketAddr,
    shutdown: Arc<Notify>,
    connections: Arc<AtomicUsize>,
}

impl MockGateway {
    pub async fn start() -> Self {
        Self::start_with(Behavior::default()).await
    }

    pub async fn start_with(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_shutdown = Arc::clone(&shutdown);
        let accept_connections = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.notified() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let index = accept_connections.fetch_add(1, Ordering::SeqCst) + 1;
                        tokio::spawn(handle_connection(stream, behavior, index));
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Total connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection(stream: TcpStream, behavior: Behavior, index: usize) {
    let Ok(socket) = accept_async(stream).await else {
        return;
    };
    let (sink, mut source) = socket.split();
    let sink: ServerSink = Arc::new(Mutex::new(sink));

    if !behavior.withhold_challenge {
        send_json(
            &sink,
            serde_json::json!({"type": "event", "event": "connect.challenge"}),
        )
        .await;
    }

    while let Some(Ok(message)) = source.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<serde_json::Value>(&text) else {
            continue;
        };
        if frame["type"] != "req" {
            continue;
        }
        let id = frame["id"].as_str().unwrap_or_default().to_string();
        let method = frame["method"].as_str().unwrap_or_default().to_string();
        let params = frame["params"].clone();

        match method.as_str() {
            "connect" => {
                respond_ok(
                    &sink,
                    &id,
                    serde_json::json!({
                        "protocol": 1,
                        "gatewayId": "mock-gw",
                        "sessionId": format!("s-{index}")
                    }),
                )
                .await;
                if behavior.drop_first_connection && index == 1 {
                    // Closing the stream simulates an unplanned drop.
                    return;
                }
            }
            "echo" => {
                let delay_ms = params["delayMs"].as_u64().unwrap_or(0);
                if delay_ms == 0 {
                    respond_ok(&sink, &id, params).await;
                } else {
                    let sink = Arc::clone(&sink);
                    tokio::spawn(async move {
                        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                        respond_ok(&sink, &id, params).await;
                    });
                }
            }
            // Deliberately never answered; drives the timeout path.
            "slow.op" => {}
            "fail.op" => {
                send_json(
                    &sink,
                    serde_json::json!({
                        "type": "res",
                        "id": id,
                        "ok": false,
                        "error": {"code": 42, "message": "nope"}
                    }),
                )
                .await;
            }
            "chat.send" => respond_ok(&sink, &id, serde_json::json!({"runId": "run-1"})).await,
            "chat.history" => {
                respond_ok(
                    &sink,
                    &id,
                    serde_json::json!({
                        "messages": [{"role": "assistant", "content": "hi"}],
                        "hasMore": false
                    }),
                )
                .await;
            }
            "chat.abort" => respond_ok(&sink, &id, serde_json::json!({})).await,
            // Responds ok, then pushes the params back as a `chat` event.
            "emit.chat" => {
                respond_ok(&sink, &id, serde_json::json!({})).await;
                send_json(
                    &sink,
                    serde_json::json!({"type": "event", "event": "chat", "payload": params}),
                )
                .await;
            }
            _ => {
                send_json(
                    &sink,
                    serde_json::json!({
                        "type": "res",
                        "id": id,
                        "ok": false,
                        "error": {"code": 404, "message": format!("unknown method {method}")}
                    }),
                )
                .await;
            }
        }
    }
}

async fn respond_ok(sink: &ServerSink, id: &str, payload: serde_json::Value) {
    send_json(
        sink,
        serde_json::json!({"type": "res", "id": id, "ok": true, "payload": payload}),
    )
    .await;
}

async fn send_json(sink: &ServerSink, value: serde_json::Value) {
    let _ = sink.lock().await.send(Message::Text(value.to_string())).await;
}
