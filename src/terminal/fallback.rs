//! Fallback terminal engine: a minimal plain-text screen tracker.
//!
//! Used as the xterm-style fallback a session swaps to on a primary-engine
//! exception (per spec.md §4.4), or standalone under
//! [`crate::config::EngineSelection::FallbackOnly`]. It tracks cursor
//! motion for the common control characters (`\n`, `\r`, `\b`, `\t`) and
//! strips everything else escape-like for the text capture, the same way
//! the teacher's `output::strip_ansi` regex cleans PTY output for display.
//! The ansi capture format for this engine is necessarily best-effort: it
//! replays the raw bytes the child produced (already containing whatever
//! SGR/cursor codes the child emitted) rather than re-deriving them from
//! tracked state.

use super::{CaptureFormat, CaptureOutcome, TerminalEngine};
use regex::Regex;
use std::sync::LazyLock;

/// Bound on the raw-byte buffer kept for the ansi capture format, matching
/// the sliding-window size the session uses when replaying into a fresh
/// fallback engine on primary-engine swap.
pub const REPLAY_WINDOW_BYTES: usize = 2 * 1024 * 1024;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?<=>!]*[a-zA-Z~]|\x1b\][^\x07]*\x07|\x1b[()][0-9A-B]|\x1b[a-zA-Z]")
        .expect("invalid ANSI regex")
});

pub struct FallbackEngine {
    cols: u16,
    rows: u16,
    grid: Vec<Vec<char>>,
    cursor_row: usize,
    cursor_col: usize,
    raw: Vec<u8>,
}

impl FallbackEngine {
    #[must_use]
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            grid: vec![vec![' '; cols as usize]; rows as usize],
            cursor_row: 0,
            cursor_col: 0,
            raw: Vec::new(),
        }
    }

    fn newline(&mut self) {
        if self.cursor_row + 1 < self.rows as usize {
            self.cursor_row += 1;
        } else {
            self.grid.remove(0);
            self.grid.push(vec![' '; self.cols as usize]);
        }
    }

    fn put_char(&mut self, c: char) {
        if self.cursor_col >= self.cols as usize {
            self.cursor_col = 0;
            self.newline();
        }
        if let Some(row) = self.grid.get_mut(self.cursor_row) {
            if let Some(cell) = row.get_mut(self.cursor_col) {
                *cell = c;
            }
        }
        self.cursor_col += 1;
    }

    fn apply_plain_text(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '\n' => {
                    self.cursor_col = 0;
                    self.newline();
                }
                '\r' => self.cursor_col = 0,
                '\u{8}' => self.cursor_col = self.cursor_col.saturating_sub(1),
                '\t' => self.cursor_col = (self.cursor_col / 8 + 1) * 8,
                c if c.is_control() => {}
                c => self.put_char(c),
            }
        }
    }
}

impl TerminalEngine for FallbackEngine {
    fn write(&mut self, bytes: &[u8]) {
        self.raw.extend_from_slice(bytes);
        if self.raw.len() > REPLAY_WINDOW_BYTES {
            let overflow = self.raw.len() - REPLAY_WINDOW_BYTES;
            self.raw.drain(0..overflow);
        }

        let text = String::from_utf8_lossy(bytes);
        let stripped = ANSI_ESCAPE.replace_all(&text, "");
        self.apply_plain_text(&stripped);
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        let mut grid = vec![vec![' '; cols as usize]; rows as usize];
        for (r, row) in self.grid.iter().enumerate().take(rows as usize) {
            for (c, ch) in row.iter().enumerate().take(cols as usize) {
                grid[r][c] = *ch;
            }
        }
        self.grid = grid;
        self.cols = cols;
        self.rows = rows;
        self.cursor_row = self.cursor_row.min(rows.saturating_sub(1) as usize);
        self.cursor_col = self.cursor_col.min(cols as usize);
    }

    fn capture(&self, format: CaptureFormat) -> CaptureOutcome {
        let content = match format {
            CaptureFormat::Text => self
                .grid
                .iter()
                .map(|row| row.iter().collect::<String>().trim_end().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            CaptureFormat::Ansi => String::from_utf8_lossy(&self.raw).into_owned(),
        };
        CaptureOutcome {
            content,
            format,
            cols: self.cols,
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_cursor_across_newlines() {
        let mut engine = FallbackEngine::new(10, 3);
        engine.write(b"ab\ncd\n");
        let capture = engine.capture(CaptureFormat::Text);
        assert_eq!(capture.content, "ab\ncd\n");
    }

    #[test]
    fn strips_ansi_escape_sequences_from_text_capture() {
        let mut engine = FallbackEngine::new(10, 1);
        engine.write(b"\x1b[31mhi\x1b[0m");
        let capture = engine.capture(CaptureFormat::Text);
        assert_eq!(capture.content, "hi");
    }

    #[test]
    fn ansi_capture_replays_raw_bytes() {
        let mut engine = FallbackEngine::new(10, 1);
        engine.write(b"\x1b[31mhi\x1b[0m");
        let capture = engine.capture(CaptureFormat::Ansi);
        assert!(capture.content.contains("\x1b[31m"));
    }

    #[test]
    fn resize_preserves_existing_content() {
        let mut engine = FallbackEngine::new(5, 2);
        engine.write(b"hi");
        engine.resize(10, 4);
        let capture = engine.capture(CaptureFormat::Text);
        assert!(capture.content.starts_with("hi"));
    }
}
