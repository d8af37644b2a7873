//! umux: a programmatic terminal multiplexer for automated agents.
//!
//! Long-lived PTY sessions exposed through typed input, named wait
//! conditions with mandatory timeouts, and bounded output/screen history --
//! in place of ad-hoc polling loops around a raw PTY.
//!
//! The session engine is the crate's core; transport, CLI, and persistent
//! log formatting are deliberately left to callers embedding this crate.

pub mod config;
pub mod error;
pub mod events;
pub mod foreground;
pub mod guard;
pub mod history;
pub mod hooks;
pub mod keys;
pub mod log;
pub mod query;
pub mod registry;
pub mod session;
pub mod terminal;
pub mod wait;

pub use config::{EngineConfig, EngineSelection};
pub use error::{Result, UmuxError};
pub use events::{RegistryEvent, SessionEvent};
pub use registry::SessionRegistry;
pub use session::{HistoryKind, Session, SpawnOptions};
pub use wait::{wait_for, WaitOutcome, WaitReason, WaitRequest};
