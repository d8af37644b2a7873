//! Terminal engine contract.
//!
//! A session holds exactly one [`TerminalEngine`] implementation. The VT
//! parser itself is an external collaborator (out of scope, per spec.md
//! §1); this module defines the narrow contract the session drives it
//! through, plus the two implementations this crate ships: [`vt100_engine`]
//! (primary, backed by the real `vt100` crate) and [`fallback`] (a minimal
//! plain-text tracker used as the xterm-style fallback, or standalone under
//! [`crate::config::EngineSelection::FallbackOnly`]).

pub mod fallback;
pub mod vt100_engine;

use serde::{Deserialize, Serialize};

/// Output format requested from [`TerminalEngine::capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    /// Visible viewport as plain text, trailing spaces trimmed per row.
    Text,
    /// Visible viewport with SGR and cursor-positioning escapes sufficient
    /// for a faithful redisplay.
    Ansi,
}

/// A snapshot of the current visible terminal grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub content: String,
    pub format: CaptureFormat,
    pub cols: u16,
    pub rows: u16,
}

/// VT state model accepting raw bytes, resizable, capturable as a screen
/// snapshot. Every method here is synchronous in both implementations this
/// crate ships; `write` takes the "may update state synchronously" branch
/// of the engine contract in spec.md §4.4 -- a session observes the state
/// update as complete as soon as `write` returns, and fires its `screen`
/// event immediately after.
pub trait TerminalEngine: Send {
    /// Apply raw output bytes to the VT state.
    fn write(&mut self, bytes: &[u8]);

    /// Resize the live grid.
    fn resize(&mut self, cols: u16, rows: u16);

    /// Snapshot the current visible grid in the requested format.
    fn capture(&self, format: CaptureFormat) -> CaptureOutcome;

    /// Release any resources held by the engine. A no-op for both
    /// in-process implementations; present so a future engine backed by an
    /// external process/thread has somewhere to tear down.
    fn dispose(&mut self) {}
}
