//! Application layer for atrium
//!
//! This crate contains the port definitions for the gateway protocol client
//! and the session–thread multiplexer that sits between the dashboard and
//! the gateway. It depends only on the domain layer.

pub mod ports;
pub mod services;

// Re-export commonly used types
pub use ports::{
    fallback::FallbackSender,
    gateway::{
        AgentNotice, ChatNotice, ConnectionState, GatewayError, GatewayEvent, GatewayPort,
    },
};
pub use services::chat::{ChatService, SendOutcome};
