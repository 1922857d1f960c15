//! Session identity and per-session activity state.

mod activity;
mod key;

pub use activity::{ActivityKind, ActivityMarker, ChatStreamState, SessionState};
pub use key::{APP_ID, SessionKey, thread_to_session_key};
