//! Key codec: pure functions from typed key input to xterm-convention byte
//! sequences.
//!
//! Grounded on `other_examples/lelanhus-ptybox`'s `key_to_bytes` table
//! (Enter/arrows/Tab/Escape/Backspace/Delete/Home/End/PageUp/PageDown),
//! expanded per spec.md's full modifier table (F1-F12, Ctrl/Alt/Shift/Meta
//! arithmetic for arrows and Tab).

use crate::error::{Result, UmuxError};
use serde::{Deserialize, Serialize};

/// A named special key (no literal character associated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyName {
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

/// A modifier combination. Order for human-readable tokens is always
/// Ctrl, Alt, Shift, Meta (see [`Modified::describe`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    fn none(self) -> bool {
        !self.ctrl && !self.alt && !self.shift && !self.meta
    }

    /// CSI modifier parameter: `1 + shift + 2*alt + 4*ctrl + 8*meta`.
    fn csi_param(self) -> u8 {
        1 + u8::from(self.shift) + 2 * u8::from(self.alt) + 4 * u8::from(self.ctrl)
            + 8 * u8::from(self.meta)
    }
}

/// A key plus the modifiers held while pressing it. `key` is either a named
/// key or a single character (text with exactly one `char`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modified {
    pub key: KeyOrChar,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

/// Either a named key or a single character, as accepted inside a
/// [`Modified`] record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyOrChar {
    Named(KeyName),
    Char(char),
}

/// Typed key input: literal text, a bare named key, or a key with modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyInput {
    Text(String),
    Named(KeyName),
    Modified(Modified),
}

fn named_base_sequence(name: KeyName) -> &'static str {
    match name {
        KeyName::Enter => "\r",
        KeyName::Tab => "\t",
        KeyName::Escape => "\x1b",
        KeyName::Backspace => "\x7f",
        KeyName::Delete => "\x1b[3~",
        KeyName::Space => " ",
        KeyName::Up => "\x1b[A",
        KeyName::Down => "\x1b[B",
        KeyName::Right => "\x1b[C",
        KeyName::Left => "\x1b[D",
        KeyName::Home => "\x1b[H",
        KeyName::End => "\x1b[F",
        KeyName::PageUp => "\x1b[5~",
        KeyName::PageDown => "\x1b[6~",
        KeyName::Insert => "\x1b[2~",
        KeyName::F1 => "\x1bOP",
        KeyName::F2 => "\x1bOQ",
        KeyName::F3 => "\x1bOR",
        KeyName::F4 => "\x1bOS",
        KeyName::F5 => "\x1b[15~",
        KeyName::F6 => "\x1b[17~",
        KeyName::F7 => "\x1b[18~",
        KeyName::F8 => "\x1b[19~",
        KeyName::F9 => "\x1b[20~",
        KeyName::F10 => "\x1b[21~",
        KeyName::F11 => "\x1b[23~",
        KeyName::F12 => "\x1b[24~",
    }
}

/// The final byte of an arrow/Home/End CSI sequence, if the key is one of
/// those (used for the `\x1b[1;{mod}{letter}` modified form).
fn arrow_like_letter(name: KeyName) -> Option<char> {
    match name {
        KeyName::Up => Some('A'),
        KeyName::Down => Some('B'),
        KeyName::Right => Some('C'),
        KeyName::Left => Some('D'),
        KeyName::Home => Some('H'),
        KeyName::End => Some('F'),
        _ => None,
    }
}

/// Encode a single [`KeyInput`] into the byte sequence the child PTY expects.
pub fn encode_key(input: &KeyInput) -> Result<Vec<u8>> {
    match input {
        KeyInput::Text(s) => Ok(s.as_bytes().to_vec()),
        KeyInput::Named(name) => Ok(named_base_sequence(*name).as_bytes().to_vec()),
        KeyInput::Modified(m) => encode_modified(m),
    }
}

fn encode_modified(m: &Modified) -> Result<Vec<u8>> {
    let mods = Modifiers {
        ctrl: m.ctrl,
        alt: m.alt,
        shift: m.shift,
        meta: m.meta,
    };

    match &m.key {
        KeyOrChar::Char(c) => encode_modified_char(*c, mods),
        KeyOrChar::Named(name) => encode_modified_named(*name, mods),
    }
}

fn encode_modified_char(c: char, mods: Modifiers) -> Result<Vec<u8>> {
    if mods.none() {
        return Ok(c.to_string().into_bytes());
    }

    // Ctrl (no Alt, no Meta): fold to ASCII control code. Shift is absorbed.
    if mods.ctrl && !mods.alt && !mods.meta {
        if c.is_ascii_alphabetic() {
            let lower = c.to_ascii_lowercase();
            let byte = (lower as u8) - 0x60;
            return Ok(vec![byte]);
        }
        return Err(UmuxError::InvalidInput(format!(
            "Ctrl+{c} is not a recognized control-character combination"
        )));
    }

    // Alt (no Ctrl, no Meta): ESC prefix + character, case preserved.
    if mods.alt && !mods.ctrl && !mods.meta {
        let mut out = vec![0x1b];
        out.extend(c.to_string().into_bytes());
        return Ok(out);
    }

    Err(UmuxError::InvalidInput(format!(
        "unsupported modifier combination for character '{c}'"
    )))
}

fn encode_modified_named(name: KeyName, mods: Modifiers) -> Result<Vec<u8>> {
    if mods.none() {
        return Ok(named_base_sequence(name).as_bytes().to_vec());
    }

    if let Some(letter) = arrow_like_letter(name) {
        return Ok(format!("\x1b[1;{}{letter}", mods.csi_param()).into_bytes());
    }

    if name == KeyName::Tab {
        // Plain Shift+Tab has its own fixed sequence; any other combination
        // uses the general modifier form.
        if mods.shift && !mods.ctrl && !mods.alt && !mods.meta {
            return Ok(b"\x1b[Z".to_vec());
        }
        return Ok(format!("\x1b[1;{}Z", mods.csi_param()).into_bytes());
    }

    // Named key + Alt only: ESC prefix + base sequence.
    if mods.alt && !mods.ctrl && !mods.meta && !mods.shift {
        let mut out = vec![0x1b];
        out.extend(named_base_sequence(name).as_bytes());
        return Ok(out);
    }

    Err(UmuxError::InvalidInput(format!(
        "unsupported modifier combination for key {name:?}"
    )))
}

/// Encode a sequence of key inputs by concatenating their individual
/// encodings with no separator. Fails before any byte is produced if any
/// element is invalid.
pub fn encode_keys(inputs: &[KeyInput]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for input in inputs {
        out.extend(encode_key(input)?);
    }
    Ok(out)
}

/// Human-readable token for an input-history record, e.g. `<Ctrl+Alt+Shift+Up>`.
/// Modifier order is always Ctrl, Alt, Shift, Meta.
#[must_use]
pub fn describe(input: &KeyInput) -> String {
    match input {
        KeyInput::Text(s) => s.clone(),
        KeyInput::Named(name) => format!("<{name:?}>"),
        KeyInput::Modified(m) => {
            let mut parts: Vec<String> = Vec::new();
            if m.ctrl {
                parts.push("Ctrl".to_string());
            }
            if m.alt {
                parts.push("Alt".to_string());
            }
            if m.shift {
                parts.push("Shift".to_string());
            }
            if m.meta {
                parts.push("Meta".to_string());
            }
            parts.push(match &m.key {
                KeyOrChar::Named(n) => format!("{n:?}"),
                KeyOrChar::Char(c) => c.to_string(),
            });
            format!("<{}>", parts.join("+"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modified(key: KeyOrChar, ctrl: bool, alt: bool, shift: bool, meta: bool) -> KeyInput {
        KeyInput::Modified(Modified {
            key,
            ctrl,
            alt,
            shift,
            meta,
        })
    }

    #[test]
    fn plain_character_passes_through() {
        let bytes = encode_key(&modified(KeyOrChar::Char('x'), false, false, false, false)).unwrap();
        assert_eq!(bytes, b"x");
    }

    #[test]
    fn ctrl_c_is_0x03() {
        let bytes = encode_key(&modified(KeyOrChar::Char('c'), true, false, false, false)).unwrap();
        assert_eq!(bytes, vec![0x03]);
    }

    #[test]
    fn ctrl_shift_c_absorbs_shift() {
        let bytes = encode_key(&modified(KeyOrChar::Char('c'), true, false, true, false)).unwrap();
        assert_eq!(bytes, vec![0x03]);
    }

    #[test]
    fn shift_tab_is_fixed_sequence() {
        let bytes = encode_key(&modified(KeyOrChar::Named(KeyName::Tab), false, false, true, false))
            .unwrap();
        assert_eq!(bytes, b"\x1b[Z");
    }

    #[test]
    fn ctrl_up_uses_modifier_arithmetic() {
        let bytes = encode_key(&modified(KeyOrChar::Named(KeyName::Up), true, false, false, false))
            .unwrap();
        assert_eq!(bytes, b"\x1b[1;5A");
    }

    #[test]
    fn alt_character_gets_escape_prefix_case_preserved() {
        let bytes = encode_key(&modified(KeyOrChar::Char('X'), false, true, false, false)).unwrap();
        assert_eq!(bytes, b"\x1bX");
    }

    #[test]
    fn named_key_with_alt_gets_escape_prefix() {
        // Delete isn't one of the arrow/Home/End keys, so it takes the
        // general "Alt + named key" form rather than the CSI modifier form.
        let bytes = encode_key(&modified(KeyOrChar::Named(KeyName::Delete), false, true, false, false))
            .unwrap();
        assert_eq!(bytes, b"\x1b\x1b[3~");
    }

    #[test]
    fn encode_keys_concatenates_with_no_separator() {
        let inputs = vec![
            KeyInput::Text("ls".to_string()),
            KeyInput::Named(KeyName::Enter),
        ];
        let bytes = encode_keys(&inputs).unwrap();
        assert_eq!(bytes, b"ls\r");
    }

    #[test]
    fn unknown_combination_fails_before_any_byte_written() {
        let err = encode_key(&modified(KeyOrChar::Char('1'), true, false, false, false)).unwrap_err();
        assert!(matches!(err, UmuxError::InvalidInput(_)));
    }

    #[test]
    fn ctrl_meta_up_uses_full_modifier_param() {
        // mod = 1 + 0(shift) + 0(alt) + 4(ctrl) + 8(meta) = 13
        let bytes = encode_key(&modified(KeyOrChar::Named(KeyName::Up), true, false, false, true))
            .unwrap();
        assert_eq!(bytes, b"\x1b[1;13A");
    }
}
