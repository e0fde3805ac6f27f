// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Companion process manager.
//!
//! Companions are auxiliary processes bound to a tunnel: launched through a
//! wrapper re-invocation of the daemon binary, gated on a readiness
//! condition, streamed through a per-companion [`LogBus`], restarted in
//! place, and adopted across daemon generations. The two-level table
//! (alias → name → entry) sits behind the manager's mutex; entry fields sit
//! behind per-entry RwLocks.

mod launch;
mod monitor;
mod socket;

pub use socket::feed_wrapper_line;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use overseer_core::{
    CompanionConfig, CompanionRecord, CompanionState, EventLogger, LogBus, TokenRegistrar,
};
use parking_lot::{Mutex, RwLock};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::env;
use crate::proc;
use crate::protocol::Response;
use crate::validate;

const STOP_GRACE: Duration = Duration::from_secs(6);

/// One companion, live or dormant.
pub struct CompanionEntry {
    pub alias: String,
    pub name: String,
    /// Output bus; survives in-place restarts so attach sessions stay
    /// subscribed (history is cleared instead).
    pub output: Arc<LogBus>,
    state: RwLock<EntryState>,
}

impl std::fmt::Debug for CompanionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanionEntry")
            .field("alias", &self.alias)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct EntryState {
    config: CompanionConfig,
    pid: i32,
    start_time: Option<DateTime<Utc>>,
    state: CompanionState,
    exit_code: Option<i32>,
    exit_error: Option<String>,
    /// Absent iff adopted (or exited).
    child: Option<Child>,
    adopted: bool,
    token: Option<String>,
    socket_path: PathBuf,
    /// Cancels the listener task, the monitor, and any attach session tied
    /// to the current run.
    ctx: CancellationToken,
}

impl CompanionEntry {
    pub fn record(&self) -> CompanionRecord {
        let state = self.state.read();
        CompanionRecord {
            name: self.name.clone(),
            pid: state.pid,
            command: state.config.command.clone(),
            workdir: state.config.workdir.clone(),
            start_time: state.start_time,
            state: state.state,
        }
    }

    pub fn companion_state(&self) -> CompanionState {
        self.state.read().state
    }

    /// Cancellation handle for the current run; attach sessions select on it.
    pub fn ctx(&self) -> CancellationToken {
        self.state.read().ctx.clone()
    }

    fn status_json(&self) -> serde_json::Value {
        let state = self.state.read();
        serde_json::json!({
            "name": self.name,
            "pid": state.pid,
            "command": state.config.command,
            "state": state.state,
            "start_time": state.start_time,
            "exit_code": state.exit_code,
            "exit_error": state.exit_error,
            "persistent": state.config.persistent,
        })
    }
}

pub(crate) struct CmShared {
    pub settings: Arc<RwLock<Settings>>,
    pub tokens: Arc<dyn TokenRegistrar>,
    pub events: Arc<dyn EventLogger>,
    pub table: Mutex<HashMap<String, HashMap<String, Arc<CompanionEntry>>>>,
    pub root: CancellationToken,
}

/// Lifecycle manager for the companion table.
#[derive(Clone)]
pub struct CompanionManager {
    shared: Arc<CmShared>,
}

impl CompanionManager {
    pub fn new(
        settings: Arc<RwLock<Settings>>,
        tokens: Arc<dyn TokenRegistrar>,
        events: Arc<dyn EventLogger>,
        root: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(CmShared {
                settings,
                tokens,
                events,
                table: Mutex::new(HashMap::new()),
                root,
            }),
        }
    }

    /// Start `configs` for `alias`, sequentially, honouring each readiness
    /// gate. Returns false iff a blocking companion failed (the started ones
    /// are rolled back).
    pub async fn start_companions(
        &self,
        alias: &str,
        configs: &[CompanionConfig],
        progress: &mpsc::Sender<Response>,
    ) -> bool {
        for config in configs {
            match launch::start_one(&self.shared, alias, config, progress).await {
                launch::StartOutcome::Ok | launch::StartOutcome::AlreadyRunning => {}
                launch::StartOutcome::Failed { blocking } => {
                    if blocking {
                        let _ = progress
                            .send(Response::warn(format!(
                                "Rolling back companions for {alias}"
                            )))
                            .await;
                        self.stop_companions(alias, progress).await;
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Start a single named companion from the tunnel's configuration.
    pub async fn start_single(
        &self,
        alias: &str,
        name: &str,
        progress: &mpsc::Sender<Response>,
    ) -> bool {
        let config = match self.configured(alias, name) {
            Some(config) => config,
            None => {
                let _ = progress
                    .send(Response::error(format!(
                        "Companion {name} is not configured for tunnel {alias}"
                    )))
                    .await;
                return false;
            }
        };
        matches!(
            launch::start_one(&self.shared, alias, &config, progress).await,
            launch::StartOutcome::Ok | launch::StartOutcome::AlreadyRunning
        )
    }

    /// Stop every non-persistent companion of `alias`; entries stay dormant.
    pub async fn stop_companions(&self, alias: &str, progress: &mpsc::Sender<Response>) {
        for entry in self.entries_for(alias) {
            if entry.state.read().config.persistent {
                info!(alias, name = %entry.name, "skipping persistent companion");
                continue;
            }
            stop_entry(&self.shared, &entry).await;
            let _ = progress
                .send(Response::info(format!("Companion {} stopped for {alias}", entry.name)))
                .await;
        }
    }

    /// Stop one companion and drop its entry.
    pub async fn stop_single(
        &self,
        alias: &str,
        name: &str,
        progress: &mpsc::Sender<Response>,
    ) -> bool {
        let entry = match self.entry(alias, name) {
            Some(entry) => entry,
            None => {
                let _ = progress
                    .send(Response::error(format!(
                        "Companion {name} is not running for tunnel {alias}"
                    )))
                    .await;
                return false;
            }
        };
        stop_entry(&self.shared, &entry).await;
        {
            let mut table = self.shared.table.lock();
            if let Some(by_name) = table.get_mut(alias) {
                by_name.remove(name);
                if by_name.is_empty() {
                    table.remove(alias);
                }
            }
        }
        let _ = progress
            .send(Response::info(format!("Companion {name} stopped for {alias}")))
            .await;
        true
    }

    /// Stop everything, persistent companions included (full shutdown stops
    /// the world; `persistent` only survives per-tunnel stops).
    pub async fn stop_all(&self) {
        let entries: Vec<Arc<CompanionEntry>> = {
            let table = self.shared.table.lock();
            table.values().flat_map(|by_name| by_name.values().cloned()).collect()
        };
        for entry in entries {
            stop_entry(&self.shared, &entry).await;
        }
        self.shared.table.lock().clear();
    }

    /// Restart every instantiated companion of `alias` in place.
    pub async fn restart_companions(
        &self,
        alias: &str,
        progress: &mpsc::Sender<Response>,
    ) -> bool {
        let entries = self.entries_for(alias);
        if entries.is_empty() {
            let _ = progress
                .send(Response::error(format!("No companions running for tunnel {alias}")))
                .await;
            return false;
        }
        let mut ok = true;
        for entry in entries {
            if let Some(config) = self.configured(alias, &entry.name) {
                entry.state.write().config = config;
            }
            ok &= launch::restart_in_place(&self.shared, &entry, progress).await;
        }
        ok
    }

    pub async fn restart_single(
        &self,
        alias: &str,
        name: &str,
        progress: &mpsc::Sender<Response>,
    ) -> bool {
        match self.entry(alias, name) {
            Some(entry) => {
                // Config changes take effect on restart.
                if let Some(config) = self.configured(alias, name) {
                    entry.state.write().config = config;
                }
                launch::restart_in_place(&self.shared, &entry, progress).await
            }
            None => {
                // Not instantiated: a restart of a configured companion is
                // just a start.
                self.start_single(alias, name, progress).await
            }
        }
    }

    /// Resolve an attach request.
    ///
    /// Not configured → error. Configured but not instantiated → create a
    /// dormant entry so the session can wait for a later start.
    pub fn attach_entry(&self, alias: &str, name: &str) -> Result<Arc<CompanionEntry>, String> {
        if let Some(entry) = self.entry(alias, name) {
            return Ok(entry);
        }
        let config = self
            .configured(alias, name)
            .ok_or_else(|| format!("Companion {name} is not configured for tunnel {alias}"))?;
        Ok(self.insert_dormant(alias, config))
    }

    pub fn clear_history(&self, alias: &str) {
        for entry in self.entries_for(alias) {
            entry.output.clear_history();
        }
    }

    pub fn has_companions(&self, alias: &str) -> bool {
        self.shared.table.lock().get(alias).is_some_and(|by_name| !by_name.is_empty())
    }

    pub fn has_running_companions(&self, alias: &str) -> bool {
        self.entries_for(alias).iter().any(|e| e.companion_state().is_live())
    }

    /// Status payload: alias → companion summaries, names sorted.
    pub fn status_data(&self) -> serde_json::Value {
        let table = self.shared.table.lock();
        let mut by_alias = serde_json::Map::new();
        let mut aliases: Vec<&String> = table.keys().collect();
        aliases.sort();
        for alias in aliases {
            let mut entries: Vec<&Arc<CompanionEntry>> = table[alias].values().collect();
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            by_alias.insert(
                alias.clone(),
                serde_json::Value::Array(entries.iter().map(|e| e.status_json()).collect()),
            );
        }
        serde_json::json!({ "companions": by_alias })
    }

    /// Snapshot for the state file.
    pub fn records(&self) -> HashMap<String, Vec<CompanionRecord>> {
        let table = self.shared.table.lock();
        table
            .iter()
            .map(|(alias, by_name)| {
                (alias.clone(), by_name.values().map(|e| e.record()).collect())
            })
            .collect()
    }

    /// Adopt companions from a previous generation's snapshot. Each PID is
    /// validated against the wrapper command line before being claimed.
    /// Returns how many were adopted.
    pub fn adopt_companions(
        &self,
        snapshot: &HashMap<String, Vec<CompanionRecord>>,
    ) -> usize {
        let mut adopted = 0;
        for (alias, records) in snapshot {
            for record in records {
                let expected = vec![
                    std::env::current_exe()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_else(|_| "overseerd".to_string()),
                    "companion-wrap".to_string(),
                    record.command.clone(),
                ];
                if !validate::validate(record.pid, &expected, alias) {
                    info!(
                        alias,
                        name = %record.name,
                        pid = record.pid,
                        "refusing to adopt companion"
                    );
                    continue;
                }
                if launch::adopt_one(&self.shared, alias, record) {
                    adopted += 1;
                }
            }
        }
        adopted
    }

    pub(crate) fn entry(&self, alias: &str, name: &str) -> Option<Arc<CompanionEntry>> {
        self.shared.table.lock().get(alias).and_then(|by_name| by_name.get(name)).cloned()
    }

    fn entries_for(&self, alias: &str) -> Vec<Arc<CompanionEntry>> {
        let table = self.shared.table.lock();
        let mut entries: Vec<Arc<CompanionEntry>> = table
            .get(alias)
            .map(|by_name| by_name.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    fn configured(&self, alias: &str, name: &str) -> Option<CompanionConfig> {
        let settings = self.shared.settings.read();
        settings
            .tunnels
            .get(alias)?
            .companions
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    fn insert_dormant(&self, alias: &str, config: CompanionConfig) -> Arc<CompanionEntry> {
        let entry = Arc::new(CompanionEntry {
            alias: alias.to_string(),
            name: config.name.clone(),
            output: Arc::new(LogBus::new(effective_history(&self.shared, &config))),
            state: RwLock::new(EntryState {
                socket_path: env::companion_socket_path(alias, &config.name),
                config,
                pid: 0,
                start_time: None,
                state: CompanionState::Stopped,
                exit_code: None,
                exit_error: None,
                child: None,
                adopted: false,
                token: None,
                ctx: self.shared.root.child_token(),
            }),
        });
        self.shared
            .table
            .lock()
            .entry(alias.to_string())
            .or_default()
            .insert(entry.name.clone(), Arc::clone(&entry));
        entry
    }
}

/// Companion history size: per-companion config, else the daemon-wide
/// setting (LogBus normalises non-positive values).
fn effective_history(shared: &Arc<CmShared>, config: &CompanionConfig) -> i64 {
    if config.log_history > 0 {
        config.log_history
    } else {
        shared.settings.read().log_history
    }
}

/// Stop one companion: configured signal to the whole process group, a
/// bounded grace wait, then SIGKILL. The entry goes dormant (Stopped) with
/// its context cancelled and history cleared.
async fn stop_entry(shared: &Arc<CmShared>, entry: &Arc<CompanionEntry>) {
    let (pid, signal, token, ctx, socket_path) = {
        let mut state = entry.state.write();
        // Stopped first, so the monitor treats the exit as intentional.
        state.state = CompanionState::Stopped;
        let signal = proc::as_signal(state.config.stop_signal);
        (
            state.pid,
            signal,
            state.token.take(),
            state.ctx.clone(),
            state.socket_path.clone(),
        )
    };

    if pid > 0 && validate::pid_alive(pid) {
        info!(alias = %entry.alias, name = %entry.name, pid, ?signal, "stopping companion");
        proc::signal_group(pid, signal);
        if !proc::await_death(pid, STOP_GRACE).await {
            warn!(alias = %entry.alias, name = %entry.name, pid, "grace expired, SIGKILL");
            proc::signal_group(pid, nix::sys::signal::Signal::SIGKILL);
        }
    }

    // Reap an owned child so it doesn't linger as a zombie.
    let child = entry.state.write().child.take();
    if let Some(mut child) = child {
        let _ = child.wait().await;
    }

    if let Some(token) = token {
        shared.tokens.unregister(&token);
    }
    ctx.cancel();
    let _ = std::fs::remove_file(&socket_path);
    entry.output.clear_history();
    {
        let mut state = entry.state.write();
        state.pid = 0;
    }
    shared.events.append(&entry.alias, "companion-stopped", &entry.name);
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
