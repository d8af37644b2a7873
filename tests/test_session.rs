//! End-to-end scenarios against real shells, exercising the public crate
//! API the way an embedding application would.

use std::time::Duration;
use umux::config::EngineConfig;
use umux::session::{HistoryKind, Session, SpawnOptions};
use umux::wait::{wait_for, WaitReason, WaitRequest};

fn config() -> EngineConfig {
    EngineConfig::default()
}

#[tokio::test]
async fn screen_pattern_resolves_against_the_live_grid() {
    let session = Session::spawn("echo screen-ok", SpawnOptions::default(), &config())
        .await
        .unwrap();

    let outcome = wait_for(
        &session,
        WaitRequest {
            screen_pattern: Some("screen-ok".to_string()),
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.reason, WaitReason::Screen);
    assert!(outcome.output.contains("screen-ok"));
}

#[tokio::test]
async fn ready_transition_after_a_foreground_command_finishes() {
    let session = Session::spawn("", SpawnOptions::default(), &config()).await.unwrap();
    session.send("sleep 0.3\n").await.unwrap();

    let outcome = wait_for(
        &session,
        WaitRequest {
            ready: true,
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.reason, WaitReason::Ready);
    session.dispose();
}

#[tokio::test]
async fn history_records_every_chunk_the_child_writes() {
    let session = Session::spawn("printf 'a\\nb\\nc\\n'", SpawnOptions::default(), &config())
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
    let all = session.get_all(HistoryKind::Output);
    assert!(all.contains('a') && all.contains('b') && all.contains('c'));
}

#[tokio::test]
async fn sent_text_is_recorded_in_input_history() {
    let session = Session::spawn("", SpawnOptions::default(), &config()).await.unwrap();
    session.send("echo hi\n").await.unwrap();
    assert!(session.get_all(HistoryKind::Input).contains("echo hi"));
    session.dispose();
}

#[tokio::test]
async fn dispose_kills_a_long_running_child() {
    let session = Session::spawn("sleep 30", SpawnOptions::default(), &config())
        .await
        .unwrap();
    session.dispose();

    for _ in 0..100 {
        if !session.is_alive() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(!session.is_alive());
}
