//! Live activity state for a gateway session.
//!
//! Two event families feed this state: low-level `agent` activity markers
//! (thinking / tool use / streaming text / idle) and higher-level `chat`
//! stream states (`delta` / `final` / `error` / `aborted`). Sessions are
//! materialized lazily on first interaction and never destroyed; after a
//! reconnect their flags are stale until fresh events arrive.

use serde::{Deserialize, Serialize};

/// What the agent was last observed doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Thinking,
    ToolUse,
    StreamingText,
    Idle,
}

/// The last known activity marker for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityMarker {
    pub kind: ActivityKind,
    /// Milliseconds since the epoch, stamped on receipt.
    pub at: i64,
    /// Tool name when `kind` is [`ActivityKind::ToolUse`].
    pub tool: Option<String>,
}

/// Stream phase carried by a `chat` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStreamState {
    Delta,
    Final,
    Error,
    Aborted,
}

impl ChatStreamState {
    /// Returns true if this state ends the current generation run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatStreamState::Delta)
    }
}

/// Per-session streaming/activity state held by the multiplexer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub is_streaming: bool,
    pub last_activity: Option<ActivityMarker>,
}

impl SessionState {
    /// Fold a low-level agent activity marker into the state.
    pub fn apply_activity(&mut self, marker: ActivityMarker) {
        self.is_streaming = !matches!(marker.kind, ActivityKind::Idle);
        self.last_activity = Some(marker);
    }

    /// Fold a chat stream state into the state.
    pub fn apply_chat(&mut self, state: ChatStreamState) {
        self.is_streaming = !state.is_terminal();
    }

    /// Mark the streaming flag stale, e.g. after a reconnect.
    pub fn clear_streaming(&mut self) {
        self.is_streaming = false;
    }
}
