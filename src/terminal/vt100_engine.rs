//! Primary terminal engine, backed by the real `vt100` crate.
//!
//! Grounded on `other_examples/lelanhus-ptybox`, which drives a PTY session
//! through `vt100` the same way: feed raw bytes to a `vt100::Parser`, read
//! back a screen snapshot. `vt100::Screen::contents`/`contents_formatted`
//! map directly onto this crate's `CaptureFormat::Text`/`Ansi`.

use super::{CaptureFormat, CaptureOutcome, TerminalEngine};

/// Scrollback retained by the underlying `vt100::Parser`, independent of
/// this crate's own history buffers -- this only affects what `capture`
/// can see beyond the visible viewport (currently unused, kept at 0 since
/// `History` is the source of truth for scrollback).
const SCROLLBACK_LINES: usize = 0;

pub struct Vt100Engine {
    parser: vt100::Parser,
}

impl Vt100Engine {
    #[must_use]
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, SCROLLBACK_LINES),
        }
    }
}

impl TerminalEngine for Vt100Engine {
    fn write(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.parser.set_size(rows, cols);
    }

    fn capture(&self, format: CaptureFormat) -> CaptureOutcome {
        let screen = self.parser.screen();
        let (rows, cols) = screen.size();
        let content = match format {
            CaptureFormat::Text => screen.contents(),
            CaptureFormat::Ansi => String::from_utf8_lossy(&screen.contents_formatted()).into_owned(),
        };
        CaptureOutcome {
            content,
            format,
            cols,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_visible_in_text_capture() {
        let mut engine = Vt100Engine::new(80, 24);
        engine.write(b"hello world\r\n");
        let capture = engine.capture(CaptureFormat::Text);
        assert!(capture.content.starts_with("hello world"));
        assert_eq!(capture.cols, 80);
        assert_eq!(capture.rows, 24);
    }

    #[test]
    fn resize_updates_capture_dimensions() {
        let mut engine = Vt100Engine::new(80, 24);
        engine.resize(100, 30);
        let capture = engine.capture(CaptureFormat::Text);
        assert_eq!(capture.cols, 100);
        assert_eq!(capture.rows, 30);
    }

    #[test]
    fn ansi_capture_includes_escape_sequences_after_color() {
        let mut engine = Vt100Engine::new(80, 24);
        engine.write(b"\x1b[31mred\x1b[0m\r\n");
        let capture = engine.capture(CaptureFormat::Ansi);
        assert!(capture.content.contains('\x1b'));
    }
}
