// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel supervisor: launch, verify, monitor, reconnect, adopt.
//!
//! One entry per alias, guarded by the outer table mutex; entry fields sit
//! behind a per-entry RwLock. Monitor tasks never hold a lock across a
//! blocking wait: they take the child handle out under the lock, wait, then
//! re-acquire to reconcile.

mod hooks;
mod monitor;
mod verify;

pub use hooks::dispatch_hook;
pub use verify::{verify_connection, ConnectError, VerifiedInfo};

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use overseer_core::{EventLogger, TunnelRecord, TunnelState};
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::askpass::{mint_token, TokenTables};
use crate::companion::CompanionManager;
use crate::config::{Settings, TunnelSettings};
use crate::env;
use crate::proc;
use crate::protocol::Response;
use crate::validate;

/// Looks up the secret configured for an alias. Keyring integration plugs in
/// here; the shipped implementation reads the tunnel's config section.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, alias: &str) -> Option<String>;
}

/// Credential store backed by the resolved settings.
pub struct ConfigCredentials {
    settings: Arc<RwLock<Settings>>,
}

impl ConfigCredentials {
    pub fn new(settings: Arc<RwLock<Settings>>) -> Self {
        Self { settings }
    }
}

impl CredentialStore for ConfigCredentials {
    fn lookup(&self, alias: &str) -> Option<String> {
        self.settings.read().tunnels.get(alias).and_then(|t| t.secret.clone())
    }
}

/// One supervised tunnel.
pub struct TunnelEntry {
    pub alias: String,
    state: RwLock<EntryState>,
}

struct EntryState {
    record: TunnelRecord,
    /// Absent iff the tunnel was adopted (or while the monitor is waiting).
    child: Option<Child>,
    adopted: bool,
    auth_token: Option<String>,
    cancel: CancellationToken,
    /// Bumped on every (re)launch; the adopted-poll monitor uses it to
    /// notice that a replacement child took over the entry.
    epoch: u64,
}

impl TunnelEntry {
    pub fn record(&self) -> TunnelRecord {
        self.state.read().record.clone()
    }
}

pub(crate) struct Shared {
    pub settings: Arc<RwLock<Settings>>,
    pub tokens: Arc<TokenTables>,
    pub companions: Arc<CompanionManager>,
    pub credentials: Arc<dyn CredentialStore>,
    pub events: Arc<dyn EventLogger>,
    /// Environment overlay tracked by the context integration.
    pub context_env: Arc<RwLock<HashMap<String, String>>>,
    /// True once the public IP is known; gates `start_tunnel_when_ip_ready`.
    pub ip_known: watch::Receiver<bool>,
    pub tunnels: Mutex<HashMap<String, Arc<TunnelEntry>>>,
    /// Wakes reconnect loops sleeping a backoff after a retry reset.
    pub retry_nudge: Arc<Notify>,
    /// Fired when the last tunnel goes away and auto-exit is configured.
    pub auto_exit: Arc<Notify>,
    pub root: CancellationToken,
}

/// Facade over the tunnel table and its monitor tasks.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<RwLock<Settings>>,
        tokens: Arc<TokenTables>,
        companions: Arc<CompanionManager>,
        credentials: Arc<dyn CredentialStore>,
        events: Arc<dyn EventLogger>,
        context_env: Arc<RwLock<HashMap<String, String>>>,
        ip_known: watch::Receiver<bool>,
        auto_exit: Arc<Notify>,
        root: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                tokens,
                companions,
                credentials,
                events,
                context_env,
                ip_known,
                tunnels: Mutex::new(HashMap::new()),
                retry_nudge: Arc::new(Notify::new()),
                auto_exit,
                root,
            }),
        }
    }

    /// Start a tunnel. Streams progress over `progress`; returns true iff
    /// the tunnel reached Connected.
    pub async fn start_tunnel(
        &self,
        alias: &str,
        tag: Option<&str>,
        progress: &mpsc::Sender<Response>,
    ) -> bool {
        let shared = &self.shared;

        // Reject a live entry; sweep a stale one.
        match self.check_existing(alias) {
            Existing::Healthy => {
                send(progress, Response::warn(format!("Tunnel {alias} is already running"))).await;
                return false;
            }
            Existing::Stale => {
                info!(alias, "removing stale tunnel entry");
                shared.tunnels.lock().remove(alias);
                shared.tokens.remove_tunnel_tokens_for(alias);
            }
            Existing::None => {}
        }

        let tunnel_settings = self.tunnel_settings(alias);
        let environment = self.effective_env(&tunnel_settings, tag);

        // Companions gated to run before the tunnel.
        let before: Vec<_> =
            tunnel_settings.companions.iter().filter(|c| c.run_before).cloned().collect();
        if !before.is_empty() && !shared.companions.start_companions(alias, &before, progress).await
        {
            send(progress, Response::error(format!("Tunnel {alias} not started: companion failed")))
                .await;
            return false;
        }

        // Claim the alias before the slow launch so a concurrent connect
        // sees exactly one entry.
        let entry = {
            let mut record = TunnelRecord::new(alias, &tunnel_settings.hostname);
            record.start_date = Some(Utc::now());
            record.auto_reconnect = tunnel_settings.auto_reconnect;
            record.jump_chain = tunnel_settings.jump_chain.clone();
            record.environment = tunnel_settings.environment.clone();
            let entry = Arc::new(TunnelEntry {
                alias: alias.to_string(),
                state: RwLock::new(EntryState {
                    record,
                    child: None,
                    adopted: false,
                    auth_token: None,
                    cancel: shared.root.child_token(),
                    epoch: 0,
                }),
            });
            shared.tunnels.lock().insert(alias.to_string(), Arc::clone(&entry));
            entry
        };

        match launch_ssh(shared, alias, &tunnel_settings, &environment).await {
            Ok(launch) => {
                let resolved = launch.info.resolved_host.clone();
                {
                    let mut state = entry.state.write();
                    state.record.pid = launch.pid;
                    state.record.state = TunnelState::Connected;
                    state.record.last_connected_time = Some(Utc::now());
                    state.record.resolved_host = launch.info.resolved_host.clone();
                    state.child = Some(launch.child);
                    state.auth_token = launch.auth_token;
                    state.epoch += 1;
                }
                shared.events.append(alias, "connected", resolved.as_deref().unwrap_or(""));
                dispatch_hook(
                    tunnel_settings.on_connect.as_deref(),
                    "on_connect",
                    "tunnel",
                    alias,
                    "connected",
                );

                let after: Vec<_> = tunnel_settings
                    .companions
                    .iter()
                    .filter(|c| !c.run_before)
                    .cloned()
                    .collect();
                if !after.is_empty() {
                    shared.companions.start_companions(alias, &after, progress).await;
                }

                monitor::spawn_owned(Arc::clone(shared), Arc::clone(&entry));

                let suffix = resolved.map(|h| format!(" ({h})")).unwrap_or_default();
                send(progress, Response::info(format!("Tunnel {alias} connected{suffix}"))).await;
                true
            }
            Err(e) => {
                shared.tunnels.lock().remove(alias);
                shared.events.append(alias, "connect-failed", &e.to_string());
                send(progress, Response::error(format!("Failed to connect {alias}: {e}"))).await;
                self.check_auto_exit();
                false
            }
        }
    }

    /// Wait for the public IP to become known, then start.
    pub async fn start_tunnel_when_ip_ready(
        &self,
        alias: &str,
        tag: Option<&str>,
        progress: &mpsc::Sender<Response>,
    ) -> bool {
        if matches!(self.check_existing(alias), Existing::Healthy) {
            send(progress, Response::warn(format!("Tunnel {alias} is already running"))).await;
            return false;
        }

        let mut ip_known = self.shared.ip_known.clone();
        if !*ip_known.borrow() {
            info!(alias, "waiting for public IP before connecting");
            loop {
                tokio::select! {
                    changed = ip_known.changed() => {
                        if changed.is_err() || *ip_known.borrow() {
                            break;
                        }
                    }
                    _ = self.shared.root.cancelled() => return false,
                }
            }
        }
        self.start_tunnel(alias, tag, progress).await
    }

    /// Stop a tunnel. `for_reconnect` keeps companions running and skips the
    /// disconnect hook, for an immediate relaunch by the caller.
    pub async fn stop_tunnel(
        &self,
        alias: &str,
        for_reconnect: bool,
        progress: &mpsc::Sender<Response>,
    ) -> bool {
        let entry = self.shared.tunnels.lock().remove(alias);
        let entry = match entry {
            Some(entry) => entry,
            None => {
                send(progress, Response::error(format!("Tunnel {alias} is not running"))).await;
                return false;
            }
        };

        let (pid, token, cancel) = {
            let mut state = entry.state.write();
            state.record.state = TunnelState::Disconnected;
            state.record.disconnected_time = Some(Utc::now());
            (state.record.pid, state.auth_token.take(), state.cancel.clone())
        };

        // Cancel first so the monitor sees an intentional stop, then kill.
        cancel.cancel();
        if let Some(token) = token {
            self.shared.tokens.unregister_tunnel(&token);
        }
        proc::terminate(pid, std::time::Duration::from_secs(5)).await;

        if !for_reconnect {
            self.shared.companions.stop_companions(alias, progress).await;
            let tunnel_settings = self.tunnel_settings(alias);
            dispatch_hook(
                tunnel_settings.on_disconnect.as_deref(),
                "on_disconnect",
                "tunnel",
                alias,
                "disconnected",
            );
        }

        self.shared.events.append(alias, "disconnected", "");
        send(progress, Response::info(format!("Tunnel {alias} disconnected"))).await;
        self.check_auto_exit();
        true
    }

    /// Stop every tunnel (shutdown path). Kills owned and adopted children
    /// alike by PID.
    pub async fn stop_all(&self) {
        let aliases: Vec<String> = self.shared.tunnels.lock().keys().cloned().collect();
        let (progress, mut sink) = mpsc::channel(16);
        let drain = tokio::spawn(async move { while sink.recv().await.is_some() {} });
        for alias in aliases {
            self.stop_tunnel(&alias, false, &progress).await;
        }
        drop(progress);
        let _ = drain.await;
    }

    /// Snapshot of every tunnel record, sorted by alias.
    pub fn records(&self) -> Vec<TunnelRecord> {
        let mut records: Vec<TunnelRecord> = self
            .shared
            .tunnels
            .lock()
            .values()
            .map(|entry| entry.record())
            .collect();
        records.sort_by(|a, b| a.alias.cmp(&b.alias));
        records
    }

    pub fn status_data(&self) -> serde_json::Value {
        serde_json::json!({ "tunnels": self.records() })
    }

    /// Reset retry bookkeeping for every tunnel in one atomic observation,
    /// then nudge any reconnect loop sleeping a backoff.
    pub fn reset_retries(&self) {
        let tunnels = self.shared.tunnels.lock();
        for entry in tunnels.values() {
            let mut state = entry.state.write();
            state.record.retry_count = 0;
            state.record.next_retry_time = None;
        }
        drop(tunnels);
        self.shared.retry_nudge.notify_waiters();
    }

    /// Claim a tunnel left behind by a previous daemon generation. The PID
    /// must still look like our SSH child; otherwise the entry is refused.
    pub fn adopt_tunnel(&self, mut record: TunnelRecord) -> bool {
        let expected = expected_cmdline(&record);
        if !validate::validate(record.pid, &expected, &record.alias) {
            info!(alias = %record.alias, pid = record.pid, "refusing to adopt tunnel");
            return false;
        }

        let alias = record.alias.clone();
        record.state = TunnelState::Connected;
        record.health_check_failures = 0;
        let entry = Arc::new(TunnelEntry {
            alias: alias.clone(),
            state: RwLock::new(EntryState {
                record,
                child: None,
                adopted: true,
                auth_token: None,
                cancel: self.shared.root.child_token(),
                epoch: 0,
            }),
        });
        self.shared.tunnels.lock().insert(alias.clone(), Arc::clone(&entry));
        monitor::spawn_adopted(Arc::clone(&self.shared), entry);
        self.shared.events.append(&alias, "adopted", "");
        true
    }

    pub fn entry(&self, alias: &str) -> Option<Arc<TunnelEntry>> {
        self.shared.tunnels.lock().get(alias).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.tunnels.lock().is_empty()
    }

    /// Force-kill a tunnel child (health checker, two strikes). The monitor
    /// observes the exit and runs the usual reconnect path.
    pub fn force_terminate(&self, alias: &str) {
        if let Some(entry) = self.entry(alias) {
            let pid = entry.state.read().record.pid;
            warn!(alias, pid, "health check failed twice, terminating tunnel child");
            proc::signal_pid(pid, nix::sys::signal::Signal::SIGKILL);
        }
    }

    /// Record a health probe outcome; returns the failure count after it.
    pub fn note_health(&self, alias: &str, healthy: bool) -> u32 {
        match self.entry(alias) {
            Some(entry) => {
                let mut state = entry.state.write();
                if healthy {
                    state.record.health_check_failures = 0;
                } else {
                    state.record.health_check_failures += 1;
                }
                state.record.health_check_failures
            }
            None => 0,
        }
    }

    /// Insert an entry without launching anything (test fixtures only).
    #[cfg(test)]
    pub(crate) fn insert_test_entry(&self, record: TunnelRecord) {
        let alias = record.alias.clone();
        let entry = Arc::new(TunnelEntry {
            alias: alias.clone(),
            state: RwLock::new(EntryState {
                record,
                child: None,
                adopted: false,
                auth_token: None,
                cancel: self.shared.root.child_token(),
                epoch: 0,
            }),
        });
        self.shared.tunnels.lock().insert(alias, entry);
    }

    fn check_existing(&self, alias: &str) -> Existing {
        let tunnels = self.shared.tunnels.lock();
        let entry = match tunnels.get(alias) {
            Some(entry) => entry,
            None => return Existing::None,
        };
        let state = entry.state.read();
        match state.record.state {
            // A launch or reconnect in flight still owns the alias.
            TunnelState::Connecting | TunnelState::Reconnecting => Existing::Healthy,
            _ if state.record.pid > 0 && validate::pid_alive(state.record.pid) => Existing::Healthy,
            _ => Existing::Stale,
        }
    }

    fn tunnel_settings(&self, alias: &str) -> TunnelSettings {
        self.shared.tunnel_settings_for(alias)
    }

    /// Process env, overlaid with context-tracked vars, the tunnel's config
    /// env, then the CLI tag.
    fn effective_env(
        &self,
        tunnel_settings: &TunnelSettings,
        tag: Option<&str>,
    ) -> HashMap<String, String> {
        let mut environment: HashMap<String, String> = std::env::vars().collect();
        environment.extend(self.shared.context_env.read().clone());
        environment.extend(tunnel_settings.environment.clone());
        if let Some(tag) = tag {
            environment.insert("OVERSEER_TAG".to_string(), tag.to_string());
        }
        environment
    }

    fn check_auto_exit(&self) {
        if self.is_empty() && self.shared.settings.read().auto_exit {
            info!("last tunnel removed, triggering auto-exit");
            self.shared.auto_exit.notify_one();
        }
    }
}

impl Shared {
    /// Settings for an alias; an unconfigured alias gets defaults with the
    /// alias doubling as the SSH destination.
    pub(super) fn tunnel_settings_for(&self, alias: &str) -> TunnelSettings {
        let settings = self.settings.read();
        settings.tunnels.get(alias).cloned().unwrap_or_else(|| TunnelSettings {
            hostname: alias.to_string(),
            auto_reconnect: true,
            max_retries: 10,
            jump_chain: Vec::new(),
            environment: HashMap::new(),
            secret: None,
            on_connect: None,
            on_disconnect: None,
            companions: Vec::new(),
        })
    }
}

enum Existing {
    Healthy,
    Stale,
    None,
}

/// Expected command-line tokens for adoption validation.
fn expected_cmdline(record: &TunnelRecord) -> Vec<String> {
    vec!["ssh".to_string(), "-N".to_string(), record.hostname.clone()]
}

pub(crate) struct Launch {
    pub child: Child,
    pub pid: i32,
    pub auth_token: Option<String>,
    pub info: VerifiedInfo,
}

/// Build the SSH command, spawn it in its own process group, and block on
/// the diagnostic verification. On failure the child is killed and the
/// askpass token unregistered before the error propagates.
pub(crate) async fn launch_ssh(
    shared: &Arc<Shared>,
    alias: &str,
    tunnel_settings: &TunnelSettings,
    environment: &HashMap<String, String>,
) -> Result<Launch, ConnectError> {
    let mut cmd = Command::new("ssh");
    cmd.arg("-v").arg("-N").arg("-o").arg("ExitOnForwardFailure=yes");
    if !tunnel_settings.jump_chain.is_empty() {
        cmd.arg("-J").arg(tunnel_settings.jump_chain.join(","));
    }
    cmd.arg(&tunnel_settings.hostname);
    cmd.envs(environment);

    // Credential path: hand the child a one-shot token and point SSH_ASKPASS
    // back at this binary.
    let auth_token = if shared.credentials.lookup(alias).is_some() {
        let token = mint_token();
        shared.tokens.register_tunnel(&token, alias);
        let exe = current_exe();
        cmd.env("SSH_ASKPASS", &exe);
        cmd.env("SSH_ASKPASS_REQUIRE", "force");
        cmd.env(env::ENV_ALIAS, alias);
        cmd.env(env::ENV_TOKEN, &token);
        cmd.env(env::ENV_SOCKET, &shared.settings.read().socket_path);
        if std::env::var_os("DISPLAY").is_none() {
            cmd.env("DISPLAY", ":0");
        }
        Some(token)
    } else {
        None
    };

    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());
    cmd.process_group(0);

    let spawned = cmd.spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            cleanup_token(shared, &auth_token);
            return Err(ConnectError::Io(e.to_string()));
        }
    };
    let pid = child.id().map(|id| id as i32).unwrap_or(0);

    let stderr = match child.stderr.take() {
        Some(stderr) => stderr,
        None => {
            cleanup_token(shared, &auth_token);
            let _ = child.start_kill();
            return Err(ConnectError::Io("no stderr pipe".to_string()));
        }
    };

    let mut lines = tokio::io::BufReader::new(stderr).lines();
    match verify_connection(&mut lines).await {
        Ok(info) => {
            // Keep draining the diagnostic stream so the child never blocks
            // on a full pipe.
            tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });
            Ok(Launch { child, pid, auth_token, info })
        }
        Err(e) => {
            cleanup_token(shared, &auth_token);
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(e)
        }
    }
}

fn cleanup_token(shared: &Arc<Shared>, token: &Option<String>) {
    if let Some(token) = token {
        shared.tokens.unregister_tunnel(token);
    }
}

fn current_exe() -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| PathBuf::from("overseerd"))
}

async fn send(progress: &mpsc::Sender<Response>, response: Response) {
    let _ = progress.send(response).await;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
