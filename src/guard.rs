//! Optional pre-send command guard.
//!
//! Ported from the teacher's `process::validate_command` (fork-bomb,
//! `mkfs`, `dd`-to-device, protected-path `rm`/`chmod`/`chown` detection).
//! Off by default; `Session::send`/`send_keys` consult it only when
//! `EngineConfig::command_guard` is set, per SPEC_FULL.md §3.

use crate::error::{Result, UmuxError};
use regex::Regex;
use std::sync::LazyLock;

const PROTECTED_PATHS: &[&str] = &[
    "/", "/*", "/bin", "/sbin", "/usr", "/etc", "/var", "/home", "/root", "/lib", "/lib64", "/opt",
    "/boot", "/dev", "/sys", "/proc", "/System", "/Library", "/Applications", "/Users", "/private",
    "/private/var", "/private/etc",
];

struct DangerousPattern {
    regex: Regex,
    description: &'static str,
}

static DANGEROUS_PATTERNS: LazyLock<Vec<DangerousPattern>> = LazyLock::new(|| {
    vec![
        DangerousPattern {
            regex: Regex::new(r":\(\)\s*\{.*\|.*&\s*\}\s*;").unwrap(),
            description: "fork bomb",
        },
        DangerousPattern {
            regex: Regex::new(r"\bmkfs\b").unwrap(),
            description: "filesystem format (mkfs)",
        },
        DangerousPattern {
            regex: Regex::new(r"\bdd\b.*\bof=/dev/").unwrap(),
            description: "raw write to block device (dd of=/dev/...)",
        },
        DangerousPattern {
            regex: Regex::new(r">\s*/dev/(sd|nvme|hd|vd|xvd|disk|mapper/)").unwrap(),
            description: "redirect to block device",
        },
        DangerousPattern {
            regex: Regex::new(r"\b(shutdown|reboot|halt|poweroff)\b").unwrap(),
            description: "system shutdown/reboot",
        },
        DangerousPattern {
            regex: Regex::new(r"\binit\s+[06]\b").unwrap(),
            description: "system halt/reboot via init",
        },
    ]
});

/// Reject `text` if it matches a known-dangerous pattern. Called from
/// `Session::send`/`send_keys` only when the guard is enabled; the caller
/// classifies the error as `UmuxError::InvalidInput`.
pub fn validate_command(text: &str) -> Result<()> {
    for pattern in DANGEROUS_PATTERNS.iter() {
        if pattern.regex.is_match(text) {
            return Err(UmuxError::InvalidInput(format!(
                "blocked: command matches dangerous pattern ({}): {text}",
                pattern.description
            )));
        }
    }
    check_destructive_on_protected_paths(text)
}

fn check_destructive_on_protected_paths(command: &str) -> Result<()> {
    for subcmd in split_subcommands(command.trim()) {
        let subcmd = subcmd.trim();
        if subcmd.is_empty() {
            continue;
        }
        if is_dangerous_rm(subcmd) {
            return Err(UmuxError::InvalidInput(format!(
                "blocked: recursive delete targeting a protected system path: {subcmd}"
            )));
        }
        if is_dangerous_chmod_chown(subcmd, "chmod") {
            return Err(UmuxError::InvalidInput(format!(
                "blocked: recursive chmod on a protected system path: {subcmd}"
            )));
        }
        if is_dangerous_chmod_chown(subcmd, "chown") {
            return Err(UmuxError::InvalidInput(format!(
                "blocked: recursive chown on a protected system path: {subcmd}"
            )));
        }
    }
    Ok(())
}

/// Split a command string on shell operators (`;`, `&&`, `||`) to get
/// individual subcommands. Not a full shell parser, but catches the
/// common cases.
fn split_subcommands(cmd: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut remaining = cmd;
    while !remaining.is_empty() {
        if let Some(pos) = remaining
            .find("&&")
            .into_iter()
            .chain(remaining.find("||"))
            .chain(remaining.find(';'))
            .min()
        {
            parts.push(&remaining[..pos]);
            let sep_len = if remaining[pos..].starts_with("&&") || remaining[pos..].starts_with("||") {
                2
            } else {
                1
            };
            remaining = &remaining[pos + sep_len..];
        } else {
            parts.push(remaining);
            break;
        }
    }
    parts
}

fn is_dangerous_rm(subcmd: &str) -> bool {
    let words: Vec<&str> = subcmd.split_whitespace().collect();
    let Some(rm_pos) = words.iter().position(|w| *w == "rm") else {
        return false;
    };
    let args = &words[rm_pos + 1..];

    let has_recursive = args.iter().any(|a| {
        *a == "-r"
            || *a == "-R"
            || *a == "--recursive"
            || (a.starts_with('-') && !a.starts_with("--") && (a.contains('r') || a.contains('R')))
    });
    if !has_recursive {
        return false;
    }

    args.iter().any(|arg| !arg.starts_with('-') && targets_protected_path(arg))
}

fn is_dangerous_chmod_chown(subcmd: &str, cmd_name: &str) -> bool {
    let words: Vec<&str> = subcmd.split_whitespace().collect();
    let Some(cmd_pos) = words.iter().position(|w| *w == cmd_name) else {
        return false;
    };
    let args = &words[cmd_pos + 1..];

    let has_recursive = args
        .iter()
        .any(|a| *a == "-R" || *a == "--recursive" || (a.starts_with('-') && !a.starts_with("--") && a.contains('R')));
    if !has_recursive {
        return false;
    }

    args.iter().any(|arg| !arg.starts_with('-') && targets_protected_path(arg))
}

fn targets_protected_path(arg: &str) -> bool {
    let path = arg.trim_end_matches('/');
    let path_with_slash = if path.is_empty() { "/" } else { path };
    if arg == "/*" {
        return true;
    }
    PROTECTED_PATHS.iter().any(|protected| {
        let protected_trimmed = protected.trim_end_matches('/');
        let protected_cmp = if protected_trimmed.is_empty() { "/" } else { protected_trimmed };
        path_with_slash == protected_cmp
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_ordinary_commands() {
        assert!(validate_command("echo hello").is_ok());
        assert!(validate_command("ls -la /tmp").is_ok());
    }

    #[test]
    fn blocks_fork_bomb() {
        let err = validate_command(":(){ :|:& };:").unwrap_err();
        assert!(matches!(err, UmuxError::InvalidInput(_)));
    }

    #[test]
    fn blocks_mkfs() {
        assert!(validate_command("mkfs.ext4 /dev/sda1").is_err());
    }

    #[test]
    fn blocks_dd_to_device() {
        assert!(validate_command("dd if=/dev/zero of=/dev/sda").is_err());
    }

    #[test]
    fn blocks_recursive_rm_on_protected_path() {
        assert!(validate_command("rm -rf /").is_err());
        assert!(validate_command("sudo rm -rf /etc").is_err());
    }

    #[test]
    fn allows_recursive_rm_on_unprotected_path() {
        assert!(validate_command("rm -rf /tmp/build").is_ok());
    }

    #[test]
    fn blocks_recursive_chmod_on_protected_path() {
        assert!(validate_command("chmod -R 777 /usr").is_err());
    }
}
