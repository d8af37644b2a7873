//! The session: owns the PTY, the child process, both histories, the
//! terminal engine, and the event fan-out.
//!
//! Grounded on the teacher's `ShellSession`/`SessionManager` (PTY spawn via
//! `setsid` + process-group kill) generalized from "marker-delimited bash
//! exec, one command at a time" to "long-lived PTY with typed input and a
//! background output reader" per the new session model. The read loop's
//! `tokio::select!` race between PTY read and child exit mirrors the
//! teacher's `tokio::select!`/`tokio::spawn` usage in `process::run` for its
//! stdout/stderr reader tasks.

use crate::config::{EngineConfig, EngineSelection};
use crate::error::{Result, UmuxError};
use crate::events::{SessionEvent, CHANNEL_CAPACITY};
use crate::foreground::{ForegroundProbe, ForegroundProcess, ProcFsProbe};
use crate::guard;
use crate::history::{History, SearchMatch};
use crate::keys::{self, KeyInput};
use crate::log::{EventSink, LogRecord};
use crate::query;
use crate::terminal::fallback::{FallbackEngine, REPLAY_WINDOW_BYTES};
use crate::terminal::vt100_engine::Vt100Engine;
use crate::terminal::{CaptureFormat, CaptureOutcome, TerminalEngine};

use pty_process::Size;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

/// Which of a session's two histories an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Output,
    Input,
}

/// Parameters for [`Session::spawn`].
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub cwd: Option<String>,
    pub env: Vec<(String, String)>,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
    pub name: Option<String>,
}

const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;
const QUERY_RESPONSE_NOTE: &str = "synthetic reply";
const READ_BUF_SIZE: usize = 4096;
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(50);
const DRAIN_MAX_ROUNDS: usize = 4;

struct SessionInner {
    id: String,
    name: String,
    cwd: Option<String>,
    child_pid: i32,
    created_at: SystemTime,
    size: StdMutex<(u16, u16)>,
    alive: AtomicBool,
    exit_code: StdMutex<Option<i32>>,
    output_history: StdMutex<History>,
    input_history: StdMutex<History>,
    engine: StdMutex<Box<dyn TerminalEngine>>,
    engine_mode: EngineSelection,
    engine_broken: AtomicBool,
    replay_tail: StdMutex<Vec<u8>>,
    query_tail: StdMutex<Vec<u8>>,
    pty_write: AsyncMutex<pty_process::OwnedWritePty>,
    events: broadcast::Sender<SessionEvent>,
    foreground_probe: Arc<dyn ForegroundProbe>,
    sink: Option<Arc<dyn EventSink>>,
    input_logging: bool,
    terminal_query_logging: bool,
    command_guard: bool,
}

/// A live (or recently exited) PTY session. Cheap to clone -- every clone
/// shares the same underlying session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Spawn a child program under a fresh PTY, generalizing the teacher's
    /// `setsid`-leader pattern in `process.rs` via `pty_process`'s own
    /// session-leader handling on `Command::spawn`.
    pub async fn spawn(command: &str, opts: SpawnOptions, config: &EngineConfig) -> Result<Self> {
        let cols = opts.cols.unwrap_or(DEFAULT_COLS);
        let rows = opts.rows.unwrap_or(DEFAULT_ROWS);

        let (pty, pts) =
            pty_process::open().map_err(|e| UmuxError::SpawnFailed(format!("failed to open pty: {e}")))?;
        pty.resize(Size::new(rows, cols))
            .map_err(|e| UmuxError::SpawnFailed(format!("failed to size pty: {e}")))?;

        let mut argv = if command.is_empty() {
            vec![config.default_shell.clone()]
        } else {
            command.split_whitespace().map(str::to_string).collect::<Vec<_>>()
        };
        let program = argv.remove(0);

        let mut cmd = pty_process::Command::new(&program)
            .args(argv)
            .env("TERM", "xterm-256color")
            .envs(opts.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &opts.cwd {
            cmd = cmd.current_dir(dir);
        }

        let child = cmd
            .spawn(pts)
            .map_err(|e| UmuxError::SpawnFailed(format!("failed to spawn {program}: {e}")))?;
        let child_pid = child
            .id()
            .ok_or_else(|| UmuxError::SpawnFailed("child exited immediately after spawn".to_string()))?
            as i32;

        let (read_half, write_half) = pty.into_split();

        let id = format!("sess-{}", short_token());
        let name = opts.name.clone().unwrap_or_else(|| id.clone());
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);

        let engine: Box<dyn TerminalEngine> = match config.engine {
            EngineSelection::FallbackOnly => Box::new(FallbackEngine::new(cols, rows)),
            _ => Box::new(Vt100Engine::new(cols, rows)),
        };

        let sink: Option<Arc<dyn EventSink>> = match &config.log_directory {
            Some(dir) => match crate::log::JsonlSink::create(dir, &id) {
                Ok(sink) => Some(Arc::new(sink)),
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "failed to open JSONL sink");
                    None
                }
            },
            None => None,
        };

        if let Some(sink) = &sink {
            sink.record(LogRecord::spawn(id.clone(), name.clone(), opts.cwd.clone()));
        }

        let inner = Arc::new(SessionInner {
            id,
            name,
            cwd: opts.cwd,
            child_pid,
            created_at: SystemTime::now(),
            size: StdMutex::new((cols, rows)),
            alive: AtomicBool::new(true),
            exit_code: StdMutex::new(None),
            output_history: StdMutex::new(History::new(config.history_capacity)),
            input_history: StdMutex::new(History::new(config.history_capacity)),
            engine: StdMutex::new(engine),
            engine_mode: config.engine,
            engine_broken: AtomicBool::new(false),
            replay_tail: StdMutex::new(Vec::new()),
            query_tail: StdMutex::new(Vec::new()),
            pty_write: AsyncMutex::new(write_half),
            events,
            foreground_probe: Arc::new(ProcFsProbe),
            sink,
            input_logging: config.input_logging,
            terminal_query_logging: config.terminal_query_logging,
            command_guard: config.command_guard,
        });

        tokio::spawn(read_loop(Arc::clone(&inner), child, read_half));

        Ok(Self { inner })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn cwd(&self) -> Option<&str> {
        self.inner.cwd.as_deref()
    }

    #[must_use]
    pub fn pid(&self) -> i32 {
        self.inner.child_pid
    }

    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.inner.created_at
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        *self.inner.exit_code.lock().unwrap()
    }

    #[must_use]
    pub fn size(&self) -> (u16, u16) {
        *self.inner.size.lock().unwrap()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Foreground process of this session's PTY, or `None` if the shell is
    /// at its prompt, the session isn't alive, or the probe couldn't tell.
    #[must_use]
    pub fn foreground(&self) -> Option<ForegroundProcess> {
        if !self.is_alive() {
            return None;
        }
        self.inner.foreground_probe.probe(self.inner.child_pid)
    }

    #[must_use]
    pub fn get_all(&self, which: HistoryKind) -> String {
        self.history(which).lock().unwrap().get_all()
    }

    #[must_use]
    pub fn tail(&self, which: HistoryKind, k: usize) -> String {
        self.history(which).lock().unwrap().tail(k)
    }

    #[must_use]
    pub fn head(&self, which: HistoryKind, k: usize) -> String {
        self.history(which).lock().unwrap().head(k)
    }

    #[must_use]
    pub fn slice(&self, which: HistoryKind, a: usize, b: usize) -> String {
        self.history(which).lock().unwrap().slice(a, b)
    }

    #[must_use]
    pub fn line_count(&self, which: HistoryKind) -> usize {
        self.history(which).lock().unwrap().line_count()
    }

    #[must_use]
    pub fn last_write(&self, which: HistoryKind) -> Option<SystemTime> {
        self.history(which).lock().unwrap().last_write()
    }

    pub fn search(&self, which: HistoryKind, pattern: &str, global: bool) -> Result<Vec<SearchMatch>> {
        self.history(which).lock().unwrap().search(pattern, global)
    }

    fn history(&self, which: HistoryKind) -> &StdMutex<History> {
        match which {
            HistoryKind::Output => &self.inner.output_history,
            HistoryKind::Input => &self.inner.input_history,
        }
    }

    /// Snapshot the live terminal grid.
    #[must_use]
    pub fn capture(&self, format: CaptureFormat) -> CaptureOutcome {
        if self.inner.engine_broken.load(Ordering::Relaxed) {
            let (cols, rows) = self.size();
            return CaptureOutcome {
                content: String::new(),
                format,
                cols,
                rows,
            };
        }
        self.inner.engine.lock().unwrap().capture(format)
    }

    /// Resize the PTY and the terminal engine.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        if !self.is_alive() {
            return Err(UmuxError::Lifecycle(format!("session {} is not alive", self.inner.id)));
        }
        *self.inner.size.lock().unwrap() = (cols, rows);
        self.inner.engine.lock().unwrap().resize(cols, rows);
        Ok(())
    }

    /// Send literal text.
    pub async fn send(&self, text: &str) -> Result<()> {
        if self.inner.command_guard {
            guard::validate_command(text)?;
        }
        if self.inner.input_logging {
            self.inner.input_history.lock().unwrap().append(text);
            if let Some(sink) = &self.inner.sink {
                sink.record(LogRecord::input_text(self.inner.id.clone(), text));
            }
        }
        self.write_raw(text.as_bytes()).await
    }

    /// Send a single typed key.
    pub async fn send_key(&self, key: &KeyInput) -> Result<()> {
        let bytes = keys::encode_key(key)?;
        if self.inner.input_logging {
            let token = keys::describe(key);
            self.inner
                .input_history
                .lock()
                .unwrap()
                .append(&format!("{token}\n"));
            if let Some(sink) = &self.inner.sink {
                sink.record(LogRecord::input_key(self.inner.id.clone(), token));
            }
        }
        self.write_raw(&bytes).await
    }

    /// Send a sequence of typed keys as one batch: all bytes are encoded
    /// and written together, and (unlike repeated `send_key` calls) the
    /// JSONL sink records one `kind:"keys"` entry for the whole batch
    /// rather than one `kind:"key"` entry per element.
    pub async fn send_keys(&self, input: &[KeyInput]) -> Result<()> {
        if self.inner.command_guard {
            for key in input {
                if let KeyInput::Text(text) = key {
                    guard::validate_command(text)?;
                }
            }
        }
        let bytes = keys::encode_keys(input)?;
        if self.inner.input_logging {
            let tokens: Vec<String> = input.iter().map(keys::describe).collect();
            self.inner
                .input_history
                .lock()
                .unwrap()
                .append(&format!("{}\n", tokens.join("")));
            if let Some(sink) = &self.inner.sink {
                sink.record(LogRecord::input_keys(self.inner.id.clone(), tokens));
            }
        }
        self.write_raw(&bytes).await
    }

    async fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(UmuxError::Lifecycle(format!("session {} is not alive", self.inner.id)));
        }
        let mut write_half = self.inner.pty_write.lock().await;
        write_half
            .write_all(bytes)
            .await
            .map_err(|e| UmuxError::Lifecycle(format!("pty write failed: {e}")))?;
        write_half
            .flush()
            .await
            .map_err(|e| UmuxError::Lifecycle(format!("pty flush failed: {e}")))
    }

    /// Kill the child if alive, dispose the terminal engine. The `exit`
    /// event still fires from the read loop once the kill takes effect.
    pub fn dispose(&self) {
        if self.is_alive() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(-self.inner.child_pid),
                nix::sys::signal::Signal::SIGKILL,
            );
        }
        self.inner.engine.lock().unwrap().dispose();
    }
}

fn short_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

async fn read_loop(
    inner: Arc<SessionInner>,
    mut child: tokio::process::Child,
    mut read_half: pty_process::OwnedReadPty,
) {
    let mut buf = vec![0u8; READ_BUF_SIZE];

    let exit_status = loop {
        tokio::select! {
            result = read_half.read(&mut buf) => {
                match result {
                    Ok(0) => break child.wait().await,
                    Ok(n) => handle_chunk(&inner, &buf[..n]).await,
                    Err(e) => {
                        tracing::warn!(session_id = %inner.id, error = %e, "pty read failed");
                        break child.wait().await;
                    }
                }
            }
            status = child.wait() => {
                drain_remaining(&inner, &mut read_half).await;
                break status;
            }
        }
    };

    let code = match exit_status {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            tracing::warn!(session_id = %inner.id, error = %e, "child wait failed");
            -1
        }
    };

    inner.alive.store(false, Ordering::SeqCst);
    *inner.exit_code.lock().unwrap() = Some(code);
    let _ = inner.events.send(SessionEvent::Exit { code });
    if let Some(sink) = &inner.sink {
        sink.record(LogRecord::exit(inner.id.clone(), code));
    }
}

/// After the child has exited, give the PTY a short bounded window to
/// deliver any output it already buffered before we fire `exit`.
async fn drain_remaining(inner: &Arc<SessionInner>, read_half: &mut pty_process::OwnedReadPty) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    for _ in 0..DRAIN_MAX_ROUNDS {
        match tokio::time::timeout(DRAIN_READ_TIMEOUT, read_half.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => handle_chunk(inner, &buf[..n]).await,
            Ok(Err(_)) => break,
        }
    }
}

async fn handle_chunk(inner: &Arc<SessionInner>, bytes: &[u8]) {
    respond_to_queries(inner, bytes).await;

    {
        let mut tail = inner.replay_tail.lock().unwrap();
        tail.extend_from_slice(bytes);
        if tail.len() > REPLAY_WINDOW_BYTES {
            let overflow = tail.len() - REPLAY_WINDOW_BYTES;
            tail.drain(0..overflow);
        }
    }

    let text = String::from_utf8_lossy(bytes).into_owned();
    inner.output_history.lock().unwrap().append(&text);
    let _ = inner.events.send(SessionEvent::Output {
        data: text,
        at: SystemTime::now(),
    });

    feed_engine(inner, bytes);
    let _ = inner.events.send(SessionEvent::Screen);
}

async fn respond_to_queries(inner: &Arc<SessionInner>, chunk: &[u8]) {
    let (cols, rows) = *inner.size.lock().unwrap();
    let tail = inner.query_tail.lock().unwrap().clone();
    let replies = query::scan(&tail, chunk, cols, rows);
    *inner.query_tail.lock().unwrap() = query::next_tail(&tail, chunk);

    for reply in replies {
        let mut write_half = inner.pty_write.lock().await;
        if write_half.write_all(&reply).await.is_err() {
            continue;
        }
        let _ = write_half.flush().await;
        drop(write_half);

        if inner.terminal_query_logging {
            if inner.input_logging {
                inner.input_history.lock().unwrap().append(QUERY_RESPONSE_NOTE);
            }
            if let Some(sink) = &inner.sink {
                sink.record(LogRecord::terminal_query_response(
                    inner.id.clone(),
                    QUERY_RESPONSE_NOTE,
                ));
            }
        }
    }
}

fn feed_engine(inner: &Arc<SessionInner>, bytes: &[u8]) {
    if inner.engine_broken.load(Ordering::Relaxed) {
        return;
    }

    let result = {
        let mut guard = inner.engine.lock().unwrap();
        catch_unwind(AssertUnwindSafe(|| guard.write(bytes)))
    };

    if result.is_err() {
        tracing::warn!(session_id = %inner.id, "terminal engine panicked on write");
        match inner.engine_mode {
            EngineSelection::Primary => {
                let (cols, rows) = *inner.size.lock().unwrap();
                let mut fallback = FallbackEngine::new(cols, rows);
                let tail = inner.replay_tail.lock().unwrap().clone();
                fallback.write(&tail);
                *inner.engine.lock().unwrap() = Box::new(fallback);
            }
            EngineSelection::PrimaryStrict => {
                inner.engine_broken.store(true, Ordering::Relaxed);
            }
            EngineSelection::FallbackOnly => {
                unreachable!("fallback engine must never panic")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[tokio::test]
    async fn echo_and_exit() {
        let config = EngineConfig::default();
        let session = Session::spawn("echo hello", SpawnOptions::default(), &config)
            .await
            .unwrap();

        for _ in 0..200 {
            if !session.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        assert!(!session.is_alive());
        assert_eq!(session.exit_code(), Some(0));
        assert!(session.get_all(HistoryKind::Output).contains("hello"));
    }

    #[tokio::test]
    async fn send_is_rejected_after_exit() {
        let config = EngineConfig::default();
        let session = Session::spawn("true", SpawnOptions::default(), &config)
            .await
            .unwrap();

        for _ in 0..200 {
            if !session.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, UmuxError::Lifecycle(_)));
    }

    #[tokio::test]
    async fn resize_rejected_when_not_alive() {
        let config = EngineConfig::default();
        let session = Session::spawn("true", SpawnOptions::default(), &config)
            .await
            .unwrap();

        for _ in 0..200 {
            if !session.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        assert!(session.resize(100, 30).is_err());
    }

    #[tokio::test]
    async fn send_key_ctrl_c_writes_control_byte() {
        let config = EngineConfig::default();
        let session = Session::spawn("cat", SpawnOptions::default(), &config)
            .await
            .unwrap();

        let key = KeyInput::Modified(crate::keys::Modified {
            key: crate::keys::KeyOrChar::Char('c'),
            ctrl: true,
            alt: false,
            shift: false,
            meta: false,
        });
        session.send_key(&key).await.unwrap();
        session.dispose();
    }

    #[tokio::test]
    async fn command_guard_rejects_dangerous_send_before_any_bytes_reach_the_pty() {
        let config = EngineConfig {
            command_guard: true,
            ..EngineConfig::default()
        };
        let session = Session::spawn("", SpawnOptions::default(), &config).await.unwrap();

        let err = session.send("rm -rf /\n").await.unwrap_err();
        assert!(matches!(err, UmuxError::InvalidInput(_)));
        assert!(session.get_all(HistoryKind::Input).is_empty());
        session.dispose();
    }

    #[tokio::test]
    async fn command_guard_off_by_default_allows_anything() {
        let config = EngineConfig::default();
        let session = Session::spawn("", SpawnOptions::default(), &config).await.unwrap();

        session.send("echo rm -rf / >/dev/null\n").await.unwrap();
        session.dispose();
    }
}
