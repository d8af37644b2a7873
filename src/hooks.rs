//! Hook manager: fires shell commands on recognized session events.
//!
//! Grounded on the teacher's `process::run`/`kill_process` fire-and-forget
//! subprocess pattern (spawn, don't block the caller on the result, log
//! failures) generalized from "run one command and capture its output" to
//! "spawn a command and discard the result, with an env overlay describing
//! the firing event."

use crate::events::RegistryEvent;
use regex::Regex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;

/// What triggers a hook.
#[derive(Debug, Clone)]
pub enum HookTrigger {
    OutputMatch(Regex),
    Ready,
    Exit,
}

/// A registered hook.
#[derive(Debug, Clone)]
pub struct Hook {
    pub id: String,
    pub session_id: String,
    pub command: String,
    pub trigger: HookTrigger,
    pub once: bool,
}

/// Unordered set of hooks keyed by id. Firing a hook for a session that no
/// longer exists in the registry is a no-op -- the hook holds only the
/// session id, never a strong reference.
#[derive(Default)]
pub struct HookManager {
    hooks: Mutex<HashMap<String, Hook>>,
}

impl HookManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, session_id: impl Into<String>, command: impl Into<String>, trigger: HookTrigger, once: bool) -> String {
        let id = format!("hook-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let hook = Hook {
            id: id.clone(),
            session_id: session_id.into(),
            command: command.into(),
            trigger,
            once,
        };
        self.hooks.lock().unwrap().insert(id.clone(), hook);
        id
    }

    pub fn remove(&self, hook_id: &str) -> Option<Hook> {
        self.hooks.lock().unwrap().remove(hook_id)
    }

    #[must_use]
    pub fn list(&self) -> Vec<Hook> {
        self.hooks.lock().unwrap().values().cloned().collect()
    }

    /// React to a registry event: find matching hooks, spawn their command,
    /// remove `once` hooks that fired.
    pub async fn handle_event(&self, event: &RegistryEvent) {
        let matches = self.matching(event);
        for (hook, env) in matches {
            spawn_hook_command(&hook, &env).await;
            if hook.once {
                self.hooks.lock().unwrap().remove(&hook.id);
            }
        }
    }

    fn matching(&self, event: &RegistryEvent) -> Vec<(Hook, Vec<(&'static str, String)>)> {
        let hooks = self.hooks.lock().unwrap();
        let session_id = event.session_id();

        hooks
            .values()
            .filter(|h| h.session_id == session_id)
            .filter_map(|h| match (&h.trigger, event) {
                (HookTrigger::OutputMatch(re), RegistryEvent::Output { data, .. }) => re
                    .find(data)
                    .map(|m| (h.clone(), vec![("UMUX_EVENT", "match".to_string()), ("UMUX_MATCH", m.as_str().to_string())])),
                (HookTrigger::Ready, RegistryEvent::Ready { .. }) => {
                    Some((h.clone(), vec![("UMUX_EVENT", "ready".to_string()), ("UMUX_MATCH", String::new())]))
                }
                (HookTrigger::Exit, RegistryEvent::Exit { .. }) => {
                    Some((h.clone(), vec![("UMUX_EVENT", "exit".to_string()), ("UMUX_MATCH", String::new())]))
                }
                _ => None,
            })
            .collect()
    }
}

async fn spawn_hook_command(hook: &Hook, env: &[(&'static str, String)]) {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c")
        .arg(&hook.command)
        .env("UMUX_SESSION_ID", &hook.session_id)
        .env("UMUX_HOOK_ID", &hook.id)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    for (k, v) in env {
        cmd.env(k, v);
    }

    match cmd.spawn() {
        Ok(mut child) => {
            tokio::spawn(async move {
                if let Err(e) = child.wait().await {
                    tracing::warn!(error = %e, "hook command failed");
                }
            });
        }
        Err(e) => {
            tracing::warn!(hook_id = %hook.id, error = %e, "failed to spawn hook command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn once_hook_fires_then_is_removed() {
        let manager = HookManager::new();
        let id = manager.add("sess-1", "true", HookTrigger::Ready, true);

        manager
            .handle_event(&RegistryEvent::Ready {
                session_id: "sess-1".to_string(),
            })
            .await;
        assert!(manager.list().iter().all(|h| h.id != id));

        manager
            .handle_event(&RegistryEvent::Ready {
                session_id: "sess-1".to_string(),
            })
            .await;
        assert!(manager.list().iter().all(|h| h.id != id));
    }

    #[tokio::test]
    async fn hook_for_different_session_is_not_triggered() {
        let manager = HookManager::new();
        manager.add("sess-1", "true", HookTrigger::Exit, false);

        manager
            .handle_event(&RegistryEvent::Exit {
                session_id: "sess-2".to_string(),
                code: 0,
            })
            .await;
        assert_eq!(manager.list().len(), 1);
    }

    #[test]
    fn output_match_hook_extracts_matched_text() {
        let manager = HookManager::new();
        manager.add("sess-1", "true", HookTrigger::OutputMatch(Regex::new("ERR.*").unwrap()), false);
        let matches = manager.matching(&RegistryEvent::Output {
            session_id: "sess-1".to_string(),
            data: "line one\nERR disk full\n".to_string(),
        });
        assert_eq!(matches.len(), 1);
    }
}
