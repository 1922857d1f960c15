//! Chat message types exchanged with the gateway.
//!
//! These mirror the gateway's `chat.*` payloads and are deliberately thin:
//! persistence and rendering live elsewhere.

use serde::{Deserialize, Serialize};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message (instructions for the agent).
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message (human input).
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message (agent response).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A page of chat history, as returned by `chat.history`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatHistory {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

/// Acknowledgement of an accepted `chat.send`.
///
/// `run_id` identifies the generation run on the gateway side and correlates
/// later `agent`/`chat` events; the degraded HTTP path may omit it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendReceipt {
    pub run_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn history_deserializes_camel_case_with_defaults() {
        let json = serde_json::json!({
            "messages": [{"role": "assistant", "content": "hi"}],
            "hasMore": true
        });
        let history: ChatHistory = serde_json::from_value(json).unwrap();
        assert_eq!(history.messages.len(), 1);
        assert!(history.has_more);

        let empty: ChatHistory = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.messages.is_empty());
        assert!(!empty.has_more);
    }

    #[test]
    fn receipt_tolerates_missing_run_id() {
        let receipt: SendReceipt = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(receipt.run_id.is_none());

        let receipt: SendReceipt =
            serde_json::from_value(serde_json::json!({"runId": "r-1"})).unwrap();
        assert_eq!(receipt.run_id.as_deref(), Some("r-1"));
    }
}
