//! Foreground-process probe.
//!
//! Best-effort, synchronous, bounded, and infallible from the caller's
//! perspective: any error collapses to `None`. Grounded on the teacher's use
//! of `nix` for process/signal work (`process::kill_process`,
//! `session.rs`'s `setsid` handling) -- rather than reach for a new
//! dependency, the POSIX backend reads `/proc` directly the way the
//! teacher already shells out to `nix::unistd`/`nix::sys::signal`.

use std::time::{Duration, Instant};

/// A foreground process observed in a PTY's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundProcess {
    pub pid: i32,
    pub command: String,
}

/// Bound on how long the probe is allowed to spend scanning `/proc`.
const PROBE_DEADLINE: Duration = Duration::from_millis(50);

/// A pluggable foreground-process probe, so non-POSIX backends can plug in
/// their own (per the "polling for foreground/ready" design note).
pub trait ForegroundProbe: Send + Sync {
    /// Returns the foreground process of the PTY leader `pty_leader_pid`,
    /// or `None` if the shell is at its prompt or the probe can't tell.
    fn probe(&self, pty_leader_pid: i32) -> Option<ForegroundProcess>;
}

/// POSIX `/proc`-based probe: lists immediate children of the PTY leader
/// and returns the first one whose state indicates it is running in the
/// terminal's foreground process group.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcFsProbe;

impl ForegroundProbe for ProcFsProbe {
    fn probe(&self, pty_leader_pid: i32) -> Option<ForegroundProcess> {
        let deadline = Instant::now() + PROBE_DEADLINE;
        let children = list_children(pty_leader_pid).ok()?;

        for pid in children {
            if Instant::now() > deadline {
                return None;
            }
            if let Some(proc) = foreground_candidate(pid) {
                return Some(proc);
            }
        }
        None
    }
}

fn list_children(parent: i32) -> std::io::Result<Vec<i32>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let entry = entry?;
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
            continue;
        };
        let stat_path = format!("/proc/{pid}/stat");
        let Ok(stat) = std::fs::read_to_string(&stat_path) else {
            continue;
        };
        if let Some(ppid) = parse_ppid(&stat) {
            if ppid == parent {
                out.push(pid);
            }
        }
    }
    Ok(out)
}

/// `/proc/<pid>/stat` fields are space-separated except field 2 (comm),
/// which is parenthesized and may itself contain spaces. Find the last
/// `)` to skip past it safely.
fn parse_ppid(stat: &str) -> Option<i32> {
    let close = stat.rfind(')')?;
    let rest = stat.get(close + 2..)?;
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

fn foreground_candidate(pid: i32) -> Option<ForegroundProcess> {
    let stat_path = format!("/proc/{pid}/stat");
    let stat = std::fs::read_to_string(&stat_path).ok()?;
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let command = stat.get(open + 1..close)?.to_string();
    let state = stat.get(close + 2..)?.split_whitespace().next()?;

    // State 'R' (running) or 'S'/'D' (sleeping) all indicate the process is
    // alive and plausibly the foreground job; 'T'/'Z' (stopped/zombie) are
    // not considered foreground.
    match state {
        "R" | "S" | "D" => Some(ForegroundProcess { pid, command }),
        _ => None,
    }
}
