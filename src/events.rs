//! Typed event fan-out.
//!
//! Each [`crate::session::Session`] owns a `broadcast` channel of
//! [`SessionEvent`]; the wait resolver subscribes directly. The registry
//! re-publishes every session's events, tagged with the session id, on a
//! single [`RegistryEvent`] channel the hook manager and ready poller
//! subscribe to -- this is the "single-threaded cooperative... insertion
//! order" dispatch spec.md §5 describes, implemented with `tokio::sync::
//! broadcast` rather than a hand-rolled subscriber list, the way the
//! teacher uses channel/task primitives from `tokio` rather than rolling
//! its own scheduler.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Events a single session emits.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A chunk of raw output bytes was appended to the output history.
    Output { data: String, at: SystemTime },
    /// The terminal engine finished applying the current output chunk.
    Screen,
    /// The session transitioned from busy to idle (shell at its prompt).
    Ready,
    /// The child process exited. Fired exactly once.
    Exit { code: i32 },
}

/// Events re-published at registry scope, tagged with the originating
/// session id, plus registry-level lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RegistryEvent {
    #[serde(rename = "create")]
    Create { session_id: String },
    #[serde(rename = "destroy")]
    Destroy { session_id: String },
    #[serde(rename = "output")]
    Output { session_id: String, data: String },
    #[serde(rename = "ready")]
    Ready { session_id: String },
    #[serde(rename = "exit")]
    Exit { session_id: String, code: i32 },
}

impl RegistryEvent {
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Create { session_id }
            | Self::Destroy { session_id }
            | Self::Output { session_id, .. }
            | Self::Ready { session_id }
            | Self::Exit { session_id, .. } => session_id,
        }
    }
}

/// Channel capacity for session/registry broadcast channels. Slow
/// subscribers that fall behind this many events lose the oldest ones
/// (tokio broadcast's standard lagging behavior) rather than applying
/// backpressure to the PTY reader -- matching spec.md §5's requirement
/// that no PTY-facing operation be allowed to block indefinitely.
pub const CHANNEL_CAPACITY: usize = 1024;
