//! Thread → session key routing.
//!
//! The dashboard addresses conversations by thread id (`"work"`,
//! `"dev:projectX"`); the gateway addresses them by session key. The mapping
//! is pure and deterministic — the same thread id always yields the same key
//! within one build — so both sides can derive it independently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application id embedded in every session key.
pub const APP_ID: &str = "atrium";

/// Threads under this prefix belong to a dev workspace.
const WORKSPACE_PREFIX: &str = "dev:";

/// Root thread name shared by all workspace threads.
const WORKSPACE_ROOT: &str = "dev";

/// Agent handling workspace threads.
const CODER_AGENT: &str = "coder";

/// Agent used when a thread has no explicit mapping.
const DEFAULT_AGENT: &str = "main";

/// Static thread → agent table for non-workspace threads.
const THREAD_AGENTS: &[(&str, &str)] = &[("work", "work"), ("home", "main")];

/// A deterministic identifier for one logical conversation on the gateway.
///
/// Shape: `agent:<agentId>:<appId>:<threadId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Resolve the gateway session key for an application thread id.
///
/// Workspace threads (`dev:<project>`) all collapse onto the workspace root
/// thread under the fixed coder agent, so one gateway session serves the
/// whole workspace. Everything else goes through the static thread → agent
/// table, defaulting to the main agent.
pub fn thread_to_session_key(thread_id: &str) -> SessionKey {
    if thread_id.starts_with(WORKSPACE_PREFIX) {
        return SessionKey(format!("agent:{CODER_AGENT}:{APP_ID}:{WORKSPACE_ROOT}"));
    }

    let agent = THREAD_AGENTS
        .iter()
        .find(|(thread, _)| *thread == thread_id)
        .map(|(_, agent)| *agent)
        .unwrap_or(DEFAULT_AGENT);

    SessionKey(format!("agent:{agent}:{APP_ID}:{thread_id}"))
}
