//! Error taxonomy for the session engine.
//!
//! Kinds, not types: callers distinguish `NotFound` from `InvalidInput` from
//! `Lifecycle`, but never see the transient failures the engine swallows
//! internally (engine exceptions, hook subprocess failures, foreground-probe
//! failures, JSONL write failures) -- those are logged via `tracing` and
//! never cross this boundary. Wait outcomes are never represented as errors;
//! see [`crate::wait::WaitOutcome`].

use thiserror::Error;

/// Errors surfaced to callers of the session engine's public API.
#[derive(Debug, Error)]
pub enum UmuxError {
    /// Unknown session id or hook id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed regex, unknown key name, invalid wait request, or a
    /// duplicate session selector (id and name both given).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted on a session that is no longer alive, or an
    /// unrecognized signal/kill request.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// PTY or child-process spawn failure. The only fatal, process-level
    /// error kind; everything else is either returned or swallowed.
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
}

pub type Result<T> = std::result::Result<T, UmuxError>;
