//! Terminal-query auto-responder.
//!
//! Recognizes a fixed set of terminal queries (cursor position, device
//! attributes, kitty keyboard protocol, size queries, OSC color queries)
//! that well-behaved programs send expecting a reply from the terminal
//! emulator itself -- since umux's PTY has no real terminal emulator
//! attached, the session answers them synthetically so such programs don't
//! hang waiting for a reply that will never come. Unmatched queries pass
//! through untouched (best-effort, per spec.md §4.5).
//!
//! Matches are scanned over a rolling tail of the previous chunk
//! concatenated with the new one, so a query split across a PTY read
//! boundary is still recognized exactly once: a match fully contained in
//! the old tail was already handled on the previous scan and is skipped;
//! only matches that extend past the old tail boundary are new.

use regex::bytes::{Match, Regex};
use std::sync::LazyLock;

/// Rolling scan-tail size kept between chunks.
pub const QUERY_TAIL_BYTES: usize = 64;

struct QueryPattern {
    regex: Regex,
    reply: fn(&[u8], u16, u16) -> Vec<u8>,
}

static PATTERNS: LazyLock<Vec<QueryPattern>> = LazyLock::new(|| {
    vec![
        // CPR (cursor position report request)
        QueryPattern {
            regex: Regex::new(r"\x1b\[6n").unwrap(),
            reply: |_, _, _| b"\x1b[1;1R".to_vec(),
        },
        // DSR (device status report request)
        QueryPattern {
            regex: Regex::new(r"\x1b\[5n").unwrap(),
            reply: |_, _, _| b"\x1b[0n".to_vec(),
        },
        // DA1 (primary device attributes)
        QueryPattern {
            regex: Regex::new(r"\x1b\[0?c").unwrap(),
            reply: |_, _, _| b"\x1b[?1;2c".to_vec(),
        },
        // DA2 (secondary device attributes)
        QueryPattern {
            regex: Regex::new(r"\x1b\[>0?c").unwrap(),
            reply: |_, _, _| b"\x1b[>0;0;0c".to_vec(),
        },
        // DECID
        QueryPattern {
            regex: Regex::new(r"\x1bZ").unwrap(),
            reply: |_, _, _| b"\x1b[?1;2c".to_vec(),
        },
        // kitty keyboard protocol query
        QueryPattern {
            regex: Regex::new(r"\x1b\[\?u").unwrap(),
            reply: |_, _, _| b"\x1b[?0u".to_vec(),
        },
        // size in characters
        QueryPattern {
            regex: Regex::new(r"\x1b\[18t").unwrap(),
            reply: |_, cols, rows| format!("\x1b[8;{rows};{cols}t").into_bytes(),
        },
        // size in pixels
        QueryPattern {
            regex: Regex::new(r"\x1b\[14t").unwrap(),
            reply: |_, _, _| b"\x1b[4;0;0t".to_vec(),
        },
        // OSC 10/11/12 ? -- foreground/background/cursor color query
        QueryPattern {
            regex: Regex::new(r"\x1b\]10;\?(?:\x07|\x1b\\)").unwrap(),
            reply: |_, _, _| b"\x1b]10;rgb:ffff/ffff/ffff\x1b\\".to_vec(),
        },
        QueryPattern {
            regex: Regex::new(r"\x1b\]11;\?(?:\x07|\x1b\\)").unwrap(),
            reply: |_, _, _| b"\x1b]11;rgb:0000/0000/0000\x1b\\".to_vec(),
        },
        QueryPattern {
            regex: Regex::new(r"\x1b\]12;\?(?:\x07|\x1b\\)").unwrap(),
            reply: |_, _, _| b"\x1b]12;rgb:ffff/ffff/ffff\x1b\\".to_vec(),
        },
    ]
});

/// Scan `tail ++ chunk` for recognized queries, returning the reply bytes
/// for each new (not-already-handled) match, in order.
///
/// `tail` is the previous call's rolling tail; callers should replace it
/// with the last [`QUERY_TAIL_BYTES`] bytes of `tail ++ chunk` afterward.
pub fn scan(tail: &[u8], chunk: &[u8], cols: u16, rows: u16) -> Vec<Vec<u8>> {
    let mut combined = Vec::with_capacity(tail.len() + chunk.len());
    combined.extend_from_slice(tail);
    combined.extend_from_slice(chunk);

    let mut replies = Vec::new();
    for pattern in PATTERNS.iter() {
        for m in pattern.regex.find_iter(&combined) {
            if already_handled(&m, tail.len()) {
                continue;
            }
            replies.push((pattern.reply)(&combined, cols, rows));
        }
    }
    replies
}

fn already_handled(m: &Match, tail_len: usize) -> bool {
    m.end() <= tail_len
}

/// Compute the next rolling tail given the previous tail and the chunk just
/// scanned.
#[must_use]
pub fn next_tail(tail: &[u8], chunk: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(tail.len() + chunk.len());
    combined.extend_from_slice(tail);
    combined.extend_from_slice(chunk);
    let start = combined.len().saturating_sub(QUERY_TAIL_BYTES);
    combined[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_cursor_position_report() {
        let replies = scan(b"", b"\x1b[6n", 80, 24);
        assert_eq!(replies, vec![b"\x1b[1;1R".to_vec()]);
    }

    #[test]
    fn recognizes_split_query_across_chunk_boundary() {
        let tail = next_tail(b"", b"foo\x1b[6");
        let replies = scan(&tail, b"n", 80, 24);
        assert_eq!(replies, vec![b"\x1b[1;1R".to_vec()]);
    }

    #[test]
    fn does_not_duplicate_a_match_fully_inside_the_tail() {
        let tail = next_tail(b"", b"\x1b[6n");
        // The match is fully inside `tail`; it must not fire again.
        let replies = scan(&tail, b"more output", 80, 24);
        assert!(replies.is_empty());
    }

    #[test]
    fn unmatched_queries_produce_no_reply() {
        let replies = scan(b"", b"plain output\n", 80, 24);
        assert!(replies.is_empty());
    }

    #[test]
    fn size_query_reports_current_grid() {
        let replies = scan(b"", b"\x1b[18t", 132, 43);
        assert_eq!(replies, vec![b"\x1b[8;43;132t".to_vec()]);
    }
}
