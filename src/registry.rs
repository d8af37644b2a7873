//! Session registry: keyed collection of sessions, a ready poller, and the
//! hook manager, wired together.
//!
//! Grounded on the teacher's `ProcessRegistry` (`HashMap` keyed by id behind
//! a `tokio::sync::Mutex`, `JoinHandle`-tracked background work, TTL-style
//! cleanup) generalized from "one-shot command tracking" to "long-lived
//! session ownership plus event re-publishing."

use crate::config::EngineConfig;
use crate::error::{Result, UmuxError};
use crate::events::{RegistryEvent, SessionEvent, CHANNEL_CAPACITY};
use crate::hooks::HookManager;
use crate::session::{Session, SpawnOptions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Ready-poller tick interval.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct RegistryState {
    sessions: HashMap<String, Session>,
    /// Last observed foreground state per session, for busy -> idle edge
    /// detection. Absent entries seed from the first tick without firing.
    last_foreground_busy: HashMap<String, bool>,
}

/// Owns every live session, re-publishes their events at registry scope,
/// runs the readiness poller, and dispatches to the hook manager.
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    config: EngineConfig,
    events: broadcast::Sender<RegistryEvent>,
    pub hooks: Arc<HookManager>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let registry = Arc::new(Self {
            state: Mutex::new(RegistryState {
                sessions: HashMap::new(),
                last_foreground_busy: HashMap::new(),
            }),
            config,
            events,
            hooks: Arc::new(HookManager::new()),
            poller: Mutex::new(None),
        });
        Self::start_poller(&registry);
        registry
    }

    fn start_poller(registry: &Arc<Self>) {
        let task_registry = Arc::clone(registry);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(READY_POLL_INTERVAL);
            loop {
                interval.tick().await;
                task_registry.poll_ready().await;
            }
        });
        // poller field is populated synchronously before any caller can
        // observe the registry, so this lock never contends.
        if let Ok(mut guard) = registry.poller.try_lock() {
            *guard = Some(handle);
        }
    }

    async fn poll_ready(&self) {
        let sessions: Vec<Session> = {
            let state = self.state.lock().await;
            state.sessions.values().cloned().collect()
        };

        for session in sessions {
            let busy_now = session.is_alive() && session.foreground().is_some();

            let mut state = self.state.lock().await;
            let prev = state.last_foreground_busy.insert(session.id().to_string(), busy_now);
            drop(state);

            if let Some(was_busy) = prev {
                if was_busy && !busy_now {
                    let _ = self.events.send(RegistryEvent::Ready {
                        session_id: session.id().to_string(),
                    });
                    self.hooks
                        .handle_event(&RegistryEvent::Ready {
                            session_id: session.id().to_string(),
                        })
                        .await;
                }
            }
        }
    }

    /// Spawn a new session and register it.
    pub async fn spawn(&self, command: &str, opts: SpawnOptions) -> Result<Session> {
        let session = Session::spawn(command, opts, &self.config).await?;

        {
            let mut state = self.state.lock().await;
            state.sessions.insert(session.id().to_string(), session.clone());
        }

        let _ = self.events.send(RegistryEvent::Create {
            session_id: session.id().to_string(),
        });
        self.spawn_forwarder(session.clone());

        Ok(session)
    }

    /// Forward a session's own events onto the registry-scope channel,
    /// tagged with its session id, and into the hook manager.
    fn spawn_forwarder(&self, session: Session) {
        let mut receiver = session.subscribe();
        let events = self.events.clone();
        let hooks = Arc::clone(&self.hooks);
        let session_id = session.id().to_string();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(SessionEvent::Output { data, .. }) => {
                        let event = RegistryEvent::Output {
                            session_id: session_id.clone(),
                            data,
                        };
                        let _ = events.send(event.clone());
                        hooks.handle_event(&event).await;
                    }
                    Ok(SessionEvent::Exit { code }) => {
                        let event = RegistryEvent::Exit {
                            session_id: session_id.clone(),
                            code,
                        };
                        let _ = events.send(event.clone());
                        hooks.handle_event(&event).await;
                        break;
                    }
                    Ok(SessionEvent::Screen | SessionEvent::Ready) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Look up a session by id.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.state
            .lock()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| UmuxError::NotFound(format!("no session with id {session_id}")))
    }

    /// Look up a session by exact name. Callers are responsible for
    /// resolving name collisions; the first match wins.
    pub async fn get_by_name(&self, name: &str) -> Result<Session> {
        self.state
            .lock()
            .await
            .sessions
            .values()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| UmuxError::NotFound(format!("no session named {name}")))
    }

    pub async fn list(&self) -> Vec<Session> {
        self.state.lock().await.sessions.values().cloned().collect()
    }

    /// Dispose a session and remove it from the registry.
    pub async fn destroy(&self, session_id: &str) -> Result<()> {
        let session = {
            let mut state = self.state.lock().await;
            state
                .sessions
                .remove(session_id)
                .ok_or_else(|| UmuxError::NotFound(format!("no session with id {session_id}")))?
        };
        session.dispose();
        let _ = self.events.send(RegistryEvent::Destroy {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Dispose every session and stop the readiness poller.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
        }
        let mut state = self.state.lock().await;
        for session in state.sessions.values() {
            session.dispose();
        }
        state.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SpawnOptions;

    #[tokio::test]
    async fn spawn_get_and_destroy() {
        let registry = SessionRegistry::new(EngineConfig::default());
        let session = registry.spawn("echo hi", SpawnOptions::default()).await.unwrap();
        let id = session.id().to_string();

        assert!(registry.get(&id).await.is_ok());
        registry.destroy(&id).await.unwrap();
        assert!(matches!(registry.get(&id).await, Err(UmuxError::NotFound(_))));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn get_by_name_resolves_session() {
        let registry = SessionRegistry::new(EngineConfig::default());
        let opts = SpawnOptions {
            name: Some("build".to_string()),
            ..Default::default()
        };
        let session = registry.spawn("echo hi", opts).await.unwrap();

        let found = registry.get_by_name("build").await.unwrap();
        assert_eq!(found.id(), session.id());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn destroy_unknown_session_is_not_found() {
        let registry = SessionRegistry::new(EngineConfig::default());
        let err = registry.destroy("sess-doesnotexist").await.unwrap_err();
        assert!(matches!(err, UmuxError::NotFound(_)));
        registry.shutdown().await;
    }
}
