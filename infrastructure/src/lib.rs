//! Infrastructure layer for atrium
//!
//! This crate contains the gateway protocol client — frame codec, request
//! correlation, event dispatch, authentication handshake, connection
//! lifecycle, reconnection — plus the HTTP fallback adapter and the
//! configuration file loader. It implements the ports defined in the
//! application layer.

pub mod config;
pub mod gateway;
pub mod http;

// Re-export commonly used types
pub use config::{ConfigLoader, GatewayConfig};
pub use gateway::{
    client::GatewayClient,
    connection::Connection,
    error::{GatewayClientError, Result},
    frame::{Frame, WireError},
    handshake::HelloInfo,
    reconnect::ReconnectPolicy,
};
pub use http::HttpFallback;
