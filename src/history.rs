//! Bounded, line-oriented history buffer with a partial-line tail.
//!
//! Two instances live on each [`crate::session::Session`]: one for output
//! bytes the child writes, one for input bytes the caller sends. Appends
//! never fail; only `search`'s regex compilation can fail, which is
//! reported to the caller as [`UmuxError::InvalidInput`].

use crate::error::{Result, UmuxError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::SystemTime;

/// A single match produced by [`History::search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Index of the matched line within the searched range.
    pub line: usize,
    /// Byte column of the match start within the line.
    pub column: usize,
    /// The matched text.
    pub text: String,
    /// Surrounding lines for context.
    pub context: SearchContext,
}

/// Lines immediately before/after a search match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchContext {
    pub before: Vec<String>,
    pub after: Vec<String>,
}

const SEARCH_CONTEXT_LINES: usize = 2;

/// Bounded FIFO of complete lines, plus an in-progress partial line.
pub struct History {
    capacity: usize,
    lines: VecDeque<String>,
    partial: String,
    track_timestamp: bool,
    last_write: Option<SystemTime>,
}

impl History {
    /// Create a history with the given FIFO capacity (complete lines).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: VecDeque::new(),
            partial: String::new(),
            track_timestamp: true,
            last_write: None,
        }
    }

    /// Disable last-write timestamp tracking (for histories that don't need it).
    #[must_use]
    pub fn without_timestamp_tracking(mut self) -> Self {
        self.track_timestamp = false;
        self
    }

    /// Append raw bytes (lossily decoded as UTF-8, matching the VT/text
    /// path the rest of the engine operates on).
    pub fn append(&mut self, data: &str) {
        self.partial.push_str(data);

        // Split on '\n', keeping CR as part of the line content (the
        // terminal engine is responsible for CR/LF semantics; history is a
        // byte-faithful record modulo line splitting).
        if !self.partial.contains('\n') {
            if self.track_timestamp {
                self.last_write = Some(SystemTime::now());
            }
            return;
        }

        let mut rest = std::mem::take(&mut self.partial);
        loop {
            match rest.find('\n') {
                Some(idx) => {
                    let line = rest[..idx].to_string();
                    self.push_line(line);
                    rest = rest[idx + 1..].to_string();
                }
                None => {
                    self.partial = rest;
                    break;
                }
            }
        }

        if self.track_timestamp {
            self.last_write = Some(SystemTime::now());
        }
    }

    fn push_line(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Complete lines plus partial (if non-empty), joined with `\n`.
    #[must_use]
    pub fn get_all(&self) -> String {
        if self.partial.is_empty() {
            self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
        } else {
            let mut all: Vec<&str> = self.lines.iter().map(String::as_str).collect();
            all.push(self.partial.as_str());
            all.join("\n")
        }
    }

    /// Last `k` elements of (complete lines ++ [partial if non-empty]),
    /// joined with `\n`.
    #[must_use]
    pub fn tail(&self, k: usize) -> String {
        let mut all: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        if !self.partial.is_empty() {
            all.push(self.partial.as_str());
        }
        let start = all.len().saturating_sub(k);
        all[start..].join("\n")
    }

    /// First `k` complete lines, joined with `\n`.
    #[must_use]
    pub fn head(&self, k: usize) -> String {
        self.lines
            .iter()
            .take(k)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `[a, b)` of complete lines, joined with `\n`.
    #[must_use]
    pub fn slice(&self, a: usize, b: usize) -> String {
        let len = self.lines.len();
        let a = a.min(len);
        let b = b.min(len).max(a);
        self.lines
            .iter()
            .skip(a)
            .take(b - a)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Complete lines + (1 if partial non-empty).
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len() + usize::from(!self.partial.is_empty())
    }

    /// Timestamp of the most recent `append`, if tracking is enabled and at
    /// least one append has occurred.
    #[must_use]
    pub fn last_write(&self) -> Option<SystemTime> {
        self.last_write
    }

    /// Per-line regex scan. When `global` is false, returns the first match
    /// per matched line; when true, iterates all non-overlapping matches
    /// per line (explicit position reset at each new line -- no shared
    /// `lastIndex` state leaks across lines the way a naive global-regex
    /// reuse would).
    pub fn search(&self, pattern: &str, global: bool) -> Result<Vec<SearchMatch>> {
        let re = Regex::new(pattern)
            .map_err(|e| UmuxError::InvalidInput(format!("invalid regex: {e}")))?;

        let lines: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        let mut out = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if global {
                for m in re.find_iter(line) {
                    out.push(self.build_match(idx, &lines, m.start(), m.as_str()));
                }
            } else if let Some(m) = re.find(line) {
                out.push(self.build_match(idx, &lines, m.start(), m.as_str()));
            }
        }

        Ok(out)
    }

    fn build_match(&self, idx: usize, lines: &[&str], column: usize, text: &str) -> SearchMatch {
        let before_start = idx.saturating_sub(SEARCH_CONTEXT_LINES);
        let after_end = (idx + 1 + SEARCH_CONTEXT_LINES).min(lines.len());
        SearchMatch {
            line: idx,
            column,
            text: text.to_string(),
            context: SearchContext {
                before: lines[before_start..idx].iter().map(|s| s.to_string()).collect(),
                after: lines[idx + 1..after_end].iter().map(|s| s.to_string()).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_splits_on_newline_and_keeps_partial() {
        let mut h = History::new(10_000);
        h.append("hello\nwor");
        assert_eq!(h.line_count(), 2);
        h.append("ld\n");
        assert_eq!(h.line_count(), 2);
        assert_eq!(h.get_all(), "hello\nworld");
    }

    #[test]
    fn capacity_evicts_oldest_complete_lines() {
        let mut h = History::new(3);
        h.append("1\n2\n3\n4\n5\n");
        assert_eq!(h.line_count(), 3);
        assert_eq!(h.get_all(), "3\n4\n5");
    }

    #[test]
    fn tail_includes_partial_line() {
        let mut h = History::new(10_000);
        h.append("a\nb\nc\npart");
        assert_eq!(h.tail(2), "c\npart");
    }

    #[test]
    fn head_and_slice_only_cover_complete_lines() {
        let mut h = History::new(10_000);
        h.append("a\nb\nc\nd\n");
        assert_eq!(h.head(2), "a\nb");
        assert_eq!(h.slice(1, 3), "b\nc");
    }

    #[test]
    fn search_first_match_vs_global() {
        let mut h = History::new(10_000);
        h.append("foo bar foo\nbaz\nfoo foo\n");

        let first = h.search("foo", false).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].line, 0);
        assert_eq!(first[0].column, 0);

        let global = h.search("foo", true).unwrap();
        assert_eq!(global.len(), 4);
        assert_eq!(global[1].column, 8);
    }

    #[test]
    fn search_invalid_regex_is_surfaced() {
        let h = History::new(10_000);
        let err = h.search("(unclosed", false).unwrap_err();
        assert!(matches!(err, UmuxError::InvalidInput(_)));
    }

    #[test]
    fn line_count_includes_partial_when_nonempty() {
        let mut h = History::new(10_000);
        assert_eq!(h.line_count(), 0);
        h.append("no newline yet");
        assert_eq!(h.line_count(), 1);
    }
}
