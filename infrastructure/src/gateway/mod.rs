//! Gateway protocol client.
//!
//! Implements the wire protocol to the assistant gateway: three JSON frame
//! kinds over one WebSocket, request/response correlation, a typed event
//! bus, a server-challenged handshake, and bounded exponential reconnect.

pub mod client;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod events;
pub mod frame;
pub mod handshake;
pub mod reconnect;
