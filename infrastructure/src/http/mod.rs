//! HTTP adapters.

mod fallback;

pub use fallback::HttpFallback;
