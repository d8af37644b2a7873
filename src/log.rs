//! Optional per-session JSONL event sink.
//!
//! Disk I/O and log-directory management are named out-of-scope
//! collaborators (spec.md §1); this module specifies and implements the
//! narrow part that *is* in scope -- deciding what goes into each record
//! and appending it as one JSON line. A write failure is a transient
//! failure per spec.md §7: it is logged via `tracing::warn!` and the
//! record is dropped, never surfaced to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

/// One JSONL record. Mirrors spec.md §6's four record shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LogRecord {
    Spawn {
        ts: DateTime<Utc>,
        event: &'static str,
        session_id: String,
        name: String,
        cwd: Option<String>,
    },
    Output {
        ts: DateTime<Utc>,
        session_id: String,
        stream: &'static str,
        data: String,
    },
    Input {
        ts: DateTime<Utc>,
        session_id: String,
        stream: &'static str,
        kind: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        keys: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Exit {
        ts: DateTime<Utc>,
        event: &'static str,
        session_id: String,
        exit_code: i32,
    },
}

impl LogRecord {
    #[must_use]
    pub fn spawn(session_id: impl Into<String>, name: impl Into<String>, cwd: Option<String>) -> Self {
        Self::Spawn {
            ts: Utc::now(),
            event: "spawn",
            session_id: session_id.into(),
            name: name.into(),
            cwd,
        }
    }

    #[must_use]
    pub fn output(session_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Output {
            ts: Utc::now(),
            session_id: session_id.into(),
            stream: "output",
            data: data.into(),
        }
    }

    #[must_use]
    pub fn input_text(session_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Input {
            ts: Utc::now(),
            session_id: session_id.into(),
            stream: "input",
            kind: "text",
            data: Some(data.into()),
            key: None,
            keys: None,
            note: None,
        }
    }

    #[must_use]
    pub fn input_key(session_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self::Input {
            ts: Utc::now(),
            session_id: session_id.into(),
            stream: "input",
            kind: "key",
            data: None,
            key: Some(token.into()),
            keys: None,
            note: None,
        }
    }

    #[must_use]
    pub fn input_keys(session_id: impl Into<String>, tokens: Vec<String>) -> Self {
        Self::Input {
            ts: Utc::now(),
            session_id: session_id.into(),
            stream: "input",
            kind: "keys",
            data: None,
            key: None,
            keys: Some(tokens),
            note: None,
        }
    }

    #[must_use]
    pub fn terminal_query_response(session_id: impl Into<String>, note: impl Into<String>) -> Self {
        Self::Input {
            ts: Utc::now(),
            session_id: session_id.into(),
            stream: "input",
            kind: "terminal_query_response",
            data: None,
            key: None,
            keys: None,
            note: Some(note.into()),
        }
    }

    #[must_use]
    pub fn exit(session_id: impl Into<String>, exit_code: i32) -> Self {
        Self::Exit {
            ts: Utc::now(),
            event: "exit",
            session_id: session_id.into(),
            exit_code,
        }
    }
}

/// Where session lifecycle and I/O records go. The in-crate implementation
/// appends JSONL to a file; a transport layer could swap in one that
/// streams records elsewhere.
pub trait EventSink: Send + Sync {
    fn record(&self, record: LogRecord);
}

/// Appends JSONL records to `<log_directory>/YYYY-MM-DD_<session_id>.log.jsonl`.
pub struct JsonlSink {
    file: Mutex<std::fs::File>,
}

impl JsonlSink {
    /// Open (creating if needed) the JSONL file for `session_id` under
    /// `log_directory`, named per spec.md §6.
    pub fn create(log_directory: &std::path::Path, session_id: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(log_directory)?;
        let date = Utc::now().format("%Y-%m-%d");
        let path = log_directory.join(format!("{date}_{session_id}.log.jsonl"));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for JsonlSink {
    fn record(&self, record: LogRecord) {
        let Ok(mut line) = serde_json::to_string(&record) else {
            tracing::warn!("failed to serialize JSONL record");
            return;
        };
        line.push('\n');

        let Ok(mut file) = self.file.lock() else {
            tracing::warn!("JSONL sink mutex poisoned, dropping record");
            return;
        };
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "failed to write JSONL record, dropping");
        }
    }
}
