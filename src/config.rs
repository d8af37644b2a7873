//! Explicit configuration for the session engine.
//!
//! The teacher reads environment variables ad hoc at point of use
//! (`AGENTSH_STRIP_ENV`). Per the "global mutable process state" design
//! note, every knob here is read once -- via [`EngineConfig::from_env`] or
//! set programmatically -- and threaded through the registry/session
//! constructors instead of re-read from the environment deep in the call
//! stack.

use std::time::Duration;

/// Which terminal engine backend a session should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineSelection {
    /// Primary engine (vt100-backed), falling back to the plain-text
    /// tracker on any primary exception.
    #[default]
    Primary,
    /// Primary engine only; an exception is fatal to the session's screen
    /// state rather than triggering a fallback swap.
    PrimaryStrict,
    /// Always use the plain-text fallback engine.
    FallbackOnly,
}

/// Engine-wide configuration, read once at construction time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-session FIFO line capacity for output/input history.
    pub history_capacity: usize,
    /// Program used when `spawn` receives an empty command string.
    pub default_shell: String,
    /// Directory to write per-session JSONL logs into, if any.
    pub log_directory: Option<std::path::PathBuf>,
    /// Whether `send`/`sendKey`/`sendKeys` calls are recorded into the
    /// input history and JSONL sink. Default on.
    pub input_logging: bool,
    /// Which terminal engine backend to use.
    pub engine: EngineSelection,
    /// Whether synthetic terminal-query replies are recorded into the
    /// JSONL sink (and, transitively, whether they count toward input
    /// history -- see `Session::send` and spec Open Questions).
    pub terminal_query_logging: bool,
    /// Default timeout applied to a wait request when the caller leaves it
    /// unset. The wait request itself still requires a timeout; this is
    /// only a convenience default for boundary callers (out of scope here,
    /// but threaded through for when a transport is added).
    pub default_wait_timeout: Duration,
    /// Reject dangerous commands (fork bombs, `rm -rf /`, `mkfs`, ...)
    /// before they reach the PTY. Off by default -- spec.md's input path
    /// sends exactly what the agent asked for; this is an opt-in
    /// supplement documented in SPEC_FULL.md and DESIGN.md.
    pub command_guard: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10_000,
            default_shell: default_shell(),
            log_directory: None,
            input_logging: true,
            engine: EngineSelection::default(),
            terminal_query_logging: false,
            default_wait_timeout: Duration::from_secs(30),
            command_guard: false,
        }
    }
}

impl EngineConfig {
    /// Build a config from environment variables, falling back to
    /// defaults for anything unset. Environment is read exactly once,
    /// here -- nothing downstream re-reads it.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(cap) = std::env::var("UMUX_HISTORY_CAPACITY") {
            if let Ok(n) = cap.parse() {
                cfg.history_capacity = n;
            }
        }
        if let Ok(shell) = std::env::var("UMUX_DEFAULT_SHELL") {
            if !shell.is_empty() {
                cfg.default_shell = shell;
            }
        }
        if let Ok(dir) = std::env::var("UMUX_LOG_DIR") {
            if !dir.is_empty() {
                cfg.log_directory = Some(std::path::PathBuf::from(dir));
            }
        }
        if let Ok(flag) = std::env::var("UMUX_INPUT_LOGGING") {
            cfg.input_logging = parse_bool(&flag, cfg.input_logging);
        }
        if let Ok(flag) = std::env::var("UMUX_TERMINAL_QUERY_LOGGING") {
            cfg.terminal_query_logging = parse_bool(&flag, cfg.terminal_query_logging);
        }
        if let Ok(flag) = std::env::var("UMUX_COMMAND_GUARD") {
            cfg.command_guard = parse_bool(&flag, cfg.command_guard);
        }
        if let Ok(secs) = std::env::var("UMUX_DEFAULT_WAIT_TIMEOUT_SECONDS") {
            if let Ok(n) = secs.parse() {
                cfg.default_wait_timeout = Duration::from_secs(n);
            }
        }
        if let Ok(engine) = std::env::var("UMUX_ENGINE") {
            cfg.engine = match engine.as_str() {
                "primary-strict" => EngineSelection::PrimaryStrict,
                "fallback-only" => EngineSelection::FallbackOnly,
                _ => EngineSelection::Primary,
            };
        }

        cfg
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}
