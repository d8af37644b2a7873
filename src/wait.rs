//! Wait resolver: evaluates a wait condition against a session's live
//! events and existing state, resolving exactly once under a mandatory
//! timeout.
//!
//! Grounded on the teacher's `ShellSession::execute`, which races a marker
//! scan against a timeout with `tokio::select!`/`tokio::time::timeout`; this
//! generalizes that single-source race into the multi-source state machine
//! spec.md §4.6 describes (output, screen, exit, idle, ready, timeout all
//! racing via `tokio::select!` over one `loop`).

use crate::error::{Result, UmuxError};
use crate::events::SessionEvent;
use crate::session::{HistoryKind, Session};
use crate::terminal::CaptureFormat;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Rolling scan-tail kept per wait to catch matches straddling chunk
/// boundaries without rescanning the full history on every chunk.
const SCAN_TAIL_BYTES: usize = 8 * 1024;

/// Bound on the output snapshot embedded in a [`WaitOutcome`].
const SNAPSHOT_TAIL_LINES: usize = 200;

/// Foreground-probe poll interval when `ready` is requested.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A wait condition. At least one of `pattern`, `screen_pattern`, `idle`,
/// `exit`, `ready` must be set, or construction is rejected as
/// [`UmuxError::InvalidInput`].
#[derive(Debug, Clone, Default)]
pub struct WaitRequest {
    pub pattern: Option<String>,
    pub not: Option<String>,
    pub screen_pattern: Option<String>,
    pub idle: Option<Duration>,
    pub exit: bool,
    pub ready: bool,
    pub timeout: Duration,
}

impl WaitRequest {
    fn has_condition(&self) -> bool {
        self.pattern.is_some() || self.screen_pattern.is_some() || self.idle.is_some() || self.exit || self.ready
    }
}

/// Why a wait resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitReason {
    Pattern,
    Screen,
    Idle,
    Exit,
    Ready,
    Timeout,
    Rejected,
}

/// The result of a wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitOutcome {
    pub reason: WaitReason,
    #[serde(rename = "match")]
    pub matched: Option<Vec<String>>,
    pub exit_code: Option<i32>,
    pub output: String,
    pub waited_ms: u64,
}

/// Wait for `request` to resolve against `session`. Always returns an
/// outcome; never fails except for a malformed request.
pub async fn wait_for(session: &Session, request: WaitRequest) -> Result<WaitOutcome> {
    if !request.has_condition() {
        return Err(UmuxError::InvalidInput(
            "wait request must set at least one of pattern, screenPattern, idle, exit, ready".to_string(),
        ));
    }
    let not_re = request
        .not
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| UmuxError::InvalidInput(format!("invalid `not` regex: {e}")))?;
    let pattern_re = request
        .pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| UmuxError::InvalidInput(format!("invalid pattern regex: {e}")))?;
    let screen_re = request
        .screen_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| UmuxError::InvalidInput(format!("invalid screen pattern regex: {e}")))?;

    let start = Instant::now();

    if let Some(outcome) = pre_check(session, &request, not_re.as_ref(), pattern_re.as_ref(), screen_re.as_ref()) {
        return Ok(finish(outcome, session, start));
    }

    let mut receiver = session.subscribe();
    let mut scan_tail = String::new();

    let mut idle_timer = request.idle.map(|d| Box::pin(tokio::time::sleep(d)));
    let timeout_timer = tokio::time::sleep(request.timeout);
    tokio::pin!(timeout_timer);
    let mut ready_poll = request
        .ready
        .then(|| Box::pin(tokio::time::interval(READY_POLL_INTERVAL)));

    let reason = loop {
        tokio::select! {
            biased;

            () = &mut timeout_timer => break WaitReason::Timeout,

            () = maybe_sleep(&mut idle_timer) => break WaitReason::Idle,

            _ = maybe_tick(&mut ready_poll) => {
                if session.foreground().is_none() || !session.is_alive() {
                    break WaitReason::Ready;
                }
            }

            event = receiver.recv() => {
                match event {
                    Ok(SessionEvent::Output { data, .. }) => {
                        scan_tail.push_str(&data);
                        if scan_tail.len() > SCAN_TAIL_BYTES {
                            let overflow = scan_tail.len() - SCAN_TAIL_BYTES;
                            scan_tail.drain(0..overflow);
                        }

                        if let Some(re) = &not_re {
                            if re.is_match(&scan_tail) {
                                break WaitReason::Rejected;
                            }
                        }
                        if let Some(re) = &pattern_re {
                            if re.is_match(&scan_tail) {
                                break WaitReason::Pattern;
                            }
                        }
                        if let Some(timer) = idle_timer.as_mut() {
                            timer.as_mut().reset(tokio::time::Instant::now() + request.idle.unwrap());
                        }
                    }
                    Ok(SessionEvent::Screen) => {
                        if let Some(re) = &screen_re {
                            let capture = session.capture(CaptureFormat::Text);
                            if re.is_match(&capture.content) {
                                break WaitReason::Screen;
                            }
                        }
                    }
                    Ok(SessionEvent::Exit { .. }) => {
                        if request.exit {
                            break WaitReason::Exit;
                        }
                        if request.ready {
                            break WaitReason::Ready;
                        }
                    }
                    Ok(SessionEvent::Ready) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break WaitReason::Timeout,
                }
            }
        }
    };

    let matched = match reason {
        WaitReason::Pattern => pattern_re.as_ref().and_then(|re| captures_to_vec(re, &scan_tail)),
        _ => None,
    };

    Ok(finish(
        ResolvedOutcome {
            reason,
            matched,
            exit_code: session.exit_code(),
        },
        session,
        start,
    ))
}

struct ResolvedOutcome {
    reason: WaitReason,
    matched: Option<Vec<String>>,
    exit_code: Option<i32>,
}

fn pre_check(
    session: &Session,
    request: &WaitRequest,
    not_re: Option<&Regex>,
    pattern_re: Option<&Regex>,
    screen_re: Option<&Regex>,
) -> Option<ResolvedOutcome> {
    let full = session.get_all(HistoryKind::Output);

    if let Some(re) = not_re {
        if re.is_match(&full) {
            return Some(ResolvedOutcome {
                reason: WaitReason::Rejected,
                matched: None,
                exit_code: session.exit_code(),
            });
        }
    }
    if let Some(re) = pattern_re {
        if let Some(matched) = captures_to_vec(re, &full) {
            return Some(ResolvedOutcome {
                reason: WaitReason::Pattern,
                matched: Some(matched),
                exit_code: session.exit_code(),
            });
        }
    }
    if let Some(re) = screen_re {
        let capture = session.capture(CaptureFormat::Text);
        if re.is_match(&capture.content) {
            return Some(ResolvedOutcome {
                reason: WaitReason::Screen,
                matched: None,
                exit_code: session.exit_code(),
            });
        }
    }
    if request.ready && (!session.is_alive() || session.foreground().is_none()) {
        return Some(ResolvedOutcome {
            reason: WaitReason::Ready,
            matched: None,
            exit_code: session.exit_code(),
        });
    }
    if request.exit && !session.is_alive() {
        return Some(ResolvedOutcome {
            reason: WaitReason::Exit,
            matched: None,
            exit_code: session.exit_code(),
        });
    }
    None
}

/// Build the `match` vector spec.md §6 types as `[matched text, ...captures]`:
/// group 0 (the whole match) followed by each numbered capture group, with
/// unmatched optional groups rendered as an empty string so indices still
/// line up with the pattern's group count.
fn captures_to_vec(re: &Regex, haystack: &str) -> Option<Vec<String>> {
    let caps = re.captures(haystack)?;
    Some(
        caps.iter()
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect(),
    )
}

fn finish(outcome: ResolvedOutcome, session: &Session, start: Instant) -> WaitOutcome {
    WaitOutcome {
        reason: outcome.reason,
        matched: outcome.matched,
        exit_code: outcome.exit_code,
        output: session.tail(HistoryKind::Output, SNAPSHOT_TAIL_LINES),
        waited_ms: start.elapsed().as_millis() as u64,
    }
}

async fn maybe_sleep(timer: &mut Option<std::pin::Pin<Box<tokio::time::Sleep>>>) {
    match timer {
        Some(t) => t.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn maybe_tick(poll: &mut Option<std::pin::Pin<Box<tokio::time::Interval>>>) -> tokio::time::Instant {
    match poll {
        Some(p) => p.as_mut().tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::session::SpawnOptions;

    #[tokio::test]
    async fn echo_and_exit_resolves_exit() {
        let config = EngineConfig::default();
        let session = Session::spawn("echo hello", SpawnOptions::default(), &config)
            .await
            .unwrap();

        let outcome = wait_for(
            &session,
            WaitRequest {
                exit: true,
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.reason, WaitReason::Exit);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn pattern_on_live_output() {
        let config = EngineConfig::default();
        let session = Session::spawn("", SpawnOptions::default(), &config)
            .await
            .unwrap();
        session.send("echo READY\n").await.unwrap();

        let outcome = wait_for(
            &session,
            WaitRequest {
                pattern: Some("READY".to_string()),
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.reason, WaitReason::Pattern);
        assert_eq!(outcome.matched.as_deref(), Some(["READY".to_string()].as_slice()));
        session.dispose();
    }

    #[tokio::test]
    async fn rejection_wins_over_pattern() {
        let config = EngineConfig::default();
        let session = Session::spawn("echo error occurred", SpawnOptions::default(), &config)
            .await
            .unwrap();

        let outcome = wait_for(
            &session,
            WaitRequest {
                pattern: Some("success".to_string()),
                not: Some("error".to_string()),
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.reason, WaitReason::Rejected);
    }

    #[tokio::test]
    async fn timeout_fires_when_nothing_matches() {
        let config = EngineConfig::default();
        let session = Session::spawn("sleep 10", SpawnOptions::default(), &config)
            .await
            .unwrap();

        let outcome = wait_for(
            &session,
            WaitRequest {
                timeout: Duration::from_millis(100),
                pattern: Some("never".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.reason, WaitReason::Timeout);
        session.dispose();
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let config = EngineConfig::default();
        let session = Session::spawn("true", SpawnOptions::default(), &config)
            .await
            .unwrap();

        let err = wait_for(
            &session,
            WaitRequest {
                timeout: Duration::from_secs(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UmuxError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn idle_waits_for_quiet_period() {
        let config = EngineConfig::default();
        let session = Session::spawn("echo quick", SpawnOptions::default(), &config)
            .await
            .unwrap();

        let outcome = wait_for(
            &session,
            WaitRequest {
                idle: Some(Duration::from_millis(200)),
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.reason, WaitReason::Idle);
        assert!(outcome.waited_ms >= 200);
    }

    #[tokio::test]
    async fn pattern_does_not_resolve_on_unrelated_live_output() {
        let config = EngineConfig::default();
        let session = Session::spawn("", SpawnOptions::default(), &config)
            .await
            .unwrap();
        session.send("echo nope\n").await.unwrap();

        let outcome = wait_for(
            &session,
            WaitRequest {
                pattern: Some("READY".to_string()),
                timeout: Duration::from_millis(300),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.reason, WaitReason::Timeout);
        session.dispose();
    }

    #[tokio::test]
    async fn pattern_match_includes_capture_groups() {
        let config = EngineConfig::default();
        let session = Session::spawn("", SpawnOptions::default(), &config)
            .await
            .unwrap();
        session.send("echo build-42-ok\n").await.unwrap();

        let outcome = wait_for(
            &session,
            WaitRequest {
                pattern: Some(r"build-(\d+)-(\w+)".to_string()),
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.reason, WaitReason::Pattern);
        let matched = outcome.matched.unwrap();
        assert_eq!(matched, vec!["build-42-ok".to_string(), "42".to_string(), "ok".to_string()]);
        session.dispose();
    }
}
