//! Domain layer for atrium
//!
//! This crate contains the core entities and pure functions of the
//! assistant: chat messages, session keys, and per-session activity state.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Threads and sessions
//!
//! The dashboard thinks in **threads** (inbox, work, a dev workspace); the
//! gateway thinks in **sessions**. [`thread_to_session_key`] is the pure,
//! deterministic mapping between the two worlds.
//!
//! ## Activity state
//!
//! Each session carries a small amount of live state — whether the agent is
//! currently streaming, and what it last did — folded from gateway events by
//! the application layer.

pub mod chat;
pub mod session;

// Re-export commonly used types
pub use chat::{ChatHistory, ChatMessage, Role, SendReceipt};
pub use session::{
    ActivityKind, ActivityMarker, ChatStreamState, SessionKey, SessionState, APP_ID,
    thread_to_session_key,
};
