// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Companion launch sequence, readiness gates, and in-place restart.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use overseer_core::{CompanionConfig, CompanionRecord, CompanionState, LogBus, WaitMode};
use tokio::net::UnixListener;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::askpass::mint_token;
use crate::env;
use crate::proc;
use crate::protocol::Response;
use crate::validate;

use super::{effective_history, monitor, socket, CmShared, CompanionEntry, EntryState};

const RESTART_GRACE: Duration = Duration::from_secs(5);

pub(super) enum StartOutcome {
    Ok,
    AlreadyRunning,
    Failed { blocking: bool },
}

/// One step of the launch sequence: skip a live entry, restart a dormant
/// one, or create and gate a fresh one.
pub(super) async fn start_one(
    shared: &Arc<CmShared>,
    alias: &str,
    config: &CompanionConfig,
    progress: &mpsc::Sender<Response>,
) -> StartOutcome {
    let existing = shared
        .table
        .lock()
        .get(alias)
        .and_then(|by_name| by_name.get(&config.name))
        .cloned();

    if let Some(entry) = existing {
        if entry.companion_state().is_live() {
            let _ = progress
                .send(Response::warn(format!(
                    "Companion {} already running for {alias}",
                    config.name
                )))
                .await;
            return StartOutcome::AlreadyRunning;
        }
        // Re-entry into a dormant entry picks up the caller's (possibly
        // reloaded) configuration.
        entry.state.write().config = config.clone();
        return if restart_in_place(shared, &entry, progress).await {
            StartOutcome::Ok
        } else {
            StartOutcome::Failed { blocking: config.on_failure == overseer_core::OnFailure::Block }
        };
    }

    let entry = Arc::new(CompanionEntry {
        alias: alias.to_string(),
        name: config.name.clone(),
        output: Arc::new(LogBus::new(effective_history(shared, config))),
        state: parking_lot::RwLock::new(EntryState {
            socket_path: env::companion_socket_path(alias, &config.name),
            config: config.clone(),
            pid: 0,
            start_time: None,
            state: CompanionState::Starting,
            exit_code: None,
            exit_error: None,
            child: None,
            adopted: false,
            token: None,
            ctx: shared.root.child_token(),
        }),
    });
    shared
        .table
        .lock()
        .entry(alias.to_string())
        .or_default()
        .insert(config.name.clone(), Arc::clone(&entry));

    if launch_run(shared, &entry, progress).await {
        StartOutcome::Ok
    } else {
        StartOutcome::Failed { blocking: config.on_failure == overseer_core::OnFailure::Block }
    }
}

/// §restart-in-place: stop the old run (Stopped first so the old monitor
/// exits), tear down its listener and token, clear history, then launch a
/// fresh run through the same entry and re-enter the readiness gate.
pub(super) async fn restart_in_place(
    shared: &Arc<CmShared>,
    entry: &Arc<CompanionEntry>,
    progress: &mpsc::Sender<Response>,
) -> bool {
    let (old_pid, old_ctx, old_token, old_socket) = {
        let mut state = entry.state.write();
        state.state = CompanionState::Stopped;
        (
            state.pid,
            state.ctx.clone(),
            state.token.take(),
            state.socket_path.clone(),
        )
    };

    if old_pid > 0 && validate::pid_alive(old_pid) {
        info!(alias = %entry.alias, name = %entry.name, old_pid, "restarting companion in place");
        proc::terminate(old_pid, RESTART_GRACE).await;
    }
    old_ctx.cancel();
    let _ = std::fs::remove_file(&old_socket);
    if let Some(token) = old_token {
        shared.tokens.unregister(&token);
    }
    let old_child = entry.state.write().child.take();
    if let Some(mut child) = old_child {
        let _ = child.wait().await;
    }

    // A fresh run produces fresh output.
    entry.output.clear_history();

    launch_run(shared, entry, progress).await
}

/// Mint a token, bind the wrapper socket, spawn the wrapper child in its own
/// process group, then hold the companion at the readiness gate.
async fn launch_run(
    shared: &Arc<CmShared>,
    entry: &Arc<CompanionEntry>,
    progress: &mpsc::Sender<Response>,
) -> bool {
    let config = entry.state.read().config.clone();
    let alias = entry.alias.clone();
    let name = entry.name.clone();

    let socket_path = env::companion_socket_path(&alias, &name);
    let _ = std::fs::remove_file(&socket_path);
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            let reason = format!("socket unavailable: {e}");
            fail_entry(shared, entry, &reason).await;
            let _ = progress
                .send(Response::error(format!("Companion {name} failed for {alias}: {reason}")))
                .await;
            return false;
        }
    };

    let token = mint_token();
    shared.tokens.register(&token, &alias);
    let ctx = shared.root.child_token();
    socket::spawn_listener(Arc::clone(entry), listener, ctx.clone());

    let mut cmd = Command::new(
        std::env::current_exe().unwrap_or_else(|_| std::path::PathBuf::from("overseerd")),
    );
    cmd.arg("companion-wrap").arg(&config.command);
    if let Some(workdir) = &config.workdir {
        cmd.current_dir(workdir);
    }
    cmd.envs(&config.environment)
        .env(env::ENV_COMPANION_ALIAS, &alias)
        .env(env::ENV_COMPANION_NAME, &name)
        .env(env::ENV_COMPANION_TOKEN, &token)
        .env(env::ENV_SOCKET, &shared.settings.read().socket_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // Own session: the wrapper must outlive a dying daemon.
        .process_group(0);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            shared.tokens.unregister(&token);
            ctx.cancel();
            let reason = format!("failed to spawn wrapper: {e}");
            fail_entry(shared, entry, &reason).await;
            let _ = progress
                .send(Response::error(format!("Companion {name} failed for {alias}: {reason}")))
                .await;
            return false;
        }
    };

    let pid = child.id().map(|id| id as i32).unwrap_or(0);
    let start_time = Utc::now();
    {
        let mut state = entry.state.write();
        state.pid = pid;
        state.start_time = Some(start_time);
        state.state = CompanionState::Waiting;
        state.exit_code = None;
        state.exit_error = None;
        state.child = Some(child);
        state.adopted = false;
        state.token = Some(token);
        state.socket_path = socket_path;
        state.ctx = ctx.clone();
    }
    shared.events.append(&alias, "companion-waiting", &name);

    let gate = match config.wait_mode {
        WaitMode::Completion => wait_completion(entry, &config).await,
        WaitMode::String => wait_string(entry, &config, start_time).await,
    };

    match gate {
        Ok(()) => {
            entry.state.write().state = CompanionState::Ready;
            shared.events.append(&alias, "companion-ready", &name);
            if config.ready_delay > Duration::ZERO {
                tokio::select! {
                    _ = tokio::time::sleep(config.ready_delay) => {}
                    _ = ctx.cancelled() => return false,
                }
            }
            if config.keep_alive && config.wait_mode == WaitMode::String {
                entry.state.write().state = CompanionState::Running;
                monitor::spawn(Arc::clone(shared), Arc::clone(entry));
            }
            let message = match config.wait_mode {
                WaitMode::Completion => format!("Companion {name} completed for {alias}"),
                WaitMode::String => format!("Companion {name} ready for {alias}"),
            };
            let _ = progress.send(Response::info(message)).await;
            true
        }
        Err(reason) => {
            fail_entry(shared, entry, &reason).await;
            let _ = progress
                .send(Response::error(format!("Companion {name} failed for {alias}: {reason}")))
                .await;
            false
        }
    }
}

/// Completion gate: the wrapper exits with the command's status; zero means
/// ready. Timeout kills the process group.
async fn wait_completion(
    entry: &Arc<CompanionEntry>,
    config: &CompanionConfig,
) -> Result<(), String> {
    let (child, ctx, pid) = {
        let mut state = entry.state.write();
        (state.child.take(), state.ctx.clone(), state.pid)
    };
    let mut child = match child {
        Some(child) => child,
        None => return Err("no child to wait on".to_string()),
    };

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                entry.state.write().exit_code = status.code();
                if status.success() {
                    Ok(())
                } else {
                    Err(format!("exited with {status}"))
                }
            }
            Err(e) => Err(format!("wait failed: {e}")),
        },
        _ = tokio::time::sleep(config.timeout) => {
            proc::signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            let _ = child.wait().await;
            Err(format!("readiness timed out after {:?}", config.timeout))
        }
        _ = ctx.cancelled() => Err("cancelled".to_string()),
    }
}

/// String gate: look for the configured substring, first in history lines
/// stamped at or after this run's start, then in the live stream.
pub(super) async fn wait_string(
    entry: &Arc<CompanionEntry>,
    config: &CompanionConfig,
    start_time: DateTime<Utc>,
) -> Result<(), String> {
    let wait_for = match config.wait_for.as_deref() {
        Some(wait_for) if !wait_for.is_empty() => wait_for.to_string(),
        _ => return Err("wait_mode=string without wait_for".to_string()),
    };

    let capacity = entry.output.capacity();
    let (mut sub, history) = entry.output.subscribe_with_history(capacity);
    for line in &history {
        // Unstamped lines can predate this run; only trust stamped ones.
        if let Some(ts) = line_timestamp(line) {
            if ts >= start_time && line.contains(&wait_for) {
                return Ok(());
            }
        }
    }

    let ctx = entry.ctx();
    let deadline = tokio::time::Instant::now() + config.timeout;
    loop {
        tokio::select! {
            line = sub.recv() => match line {
                Some(line) if line.contains(&wait_for) => return Ok(()),
                Some(_) => continue,
                None => return Err("output stream closed".to_string()),
            },
            _ = tokio::time::sleep_until(deadline) => {
                let pid = entry.state.read().pid;
                proc::signal_group(pid, nix::sys::signal::Signal::SIGKILL);
                return Err(format!("readiness timed out after {:?}", config.timeout));
            }
            _ = ctx.cancelled() => return Err("cancelled".to_string()),
        }
    }
}

/// Parse the RFC3339 stamp the wrapper prefixes to each line.
pub(super) fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let first = line.split_whitespace().next()?;
    DateTime::parse_from_rfc3339(first)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

async fn fail_entry(shared: &Arc<CmShared>, entry: &Arc<CompanionEntry>, reason: &str) {
    warn!(alias = %entry.alias, name = %entry.name, reason, "companion failed");
    let (ctx, socket_path) = {
        let mut state = entry.state.write();
        state.state = CompanionState::Failed;
        state.exit_error = Some(reason.to_string());
        (state.ctx.clone(), state.socket_path.clone())
    };
    // Reap the wrapper if it is still ours.
    let child = entry.state.write().child.take();
    if let Some(mut child) = child {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
    let token = entry.state.write().token.take();
    if let Some(token) = token {
        shared.tokens.unregister(&token);
    }
    ctx.cancel();
    let _ = std::fs::remove_file(&socket_path);
    shared.events.append(&entry.alias, "companion-failed", reason);
}

/// Claim an adopted companion: entry with no child handle, a fresh wrapper
/// socket (the surviving wrapper reconnects and replays), and a polling
/// monitor.
pub(super) fn adopt_one(
    shared: &Arc<CmShared>,
    alias: &str,
    record: &CompanionRecord,
) -> bool {
    let config = {
        let settings = shared.settings.read();
        settings
            .tunnels
            .get(alias)
            .and_then(|t| t.companions.iter().find(|c| c.name == record.name))
            .cloned()
    }
    .unwrap_or_else(|| {
        // Configuration changed under us; reconstruct enough to supervise.
        let mut config = CompanionConfig::new(&record.name, &record.command);
        config.workdir = record.workdir.clone();
        config.keep_alive = true;
        config
    });

    let socket_path = env::companion_socket_path(alias, &record.name);
    let _ = std::fs::remove_file(&socket_path);
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(alias, name = %record.name, error = %e, "cannot bind wrapper socket, skipping adoption");
            return false;
        }
    };

    let ctx = shared.root.child_token();
    let entry = Arc::new(CompanionEntry {
        alias: alias.to_string(),
        name: record.name.clone(),
        output: Arc::new(LogBus::new(effective_history(shared, &config))),
        state: parking_lot::RwLock::new(EntryState {
            socket_path: socket_path.clone(),
            config,
            pid: record.pid,
            start_time: record.start_time,
            state: CompanionState::Running,
            exit_code: None,
            exit_error: None,
            child: None,
            adopted: true,
            token: None,
            ctx: ctx.clone(),
        }),
    });
    shared
        .table
        .lock()
        .entry(alias.to_string())
        .or_default()
        .insert(record.name.clone(), Arc::clone(&entry));

    socket::spawn_listener(Arc::clone(&entry), listener, ctx);
    monitor::spawn(Arc::clone(shared), Arc::clone(&entry));
    shared.events.append(alias, "companion-adopted", &record.name);
    info!(alias, name = %record.name, pid = record.pid, "adopted companion");
    true
}

/// Progress sink for monitor-initiated restarts (no client attached).
pub(super) fn sink() -> mpsc::Sender<Response> {
    let (tx, mut rx) = mpsc::channel(16);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    tx
}
