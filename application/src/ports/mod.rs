//! Ports: interfaces the infrastructure layer implements.

pub mod fallback;
pub mod gateway;
