// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel monitor tasks: wait for exit, reconnect with backoff.
//!
//! Owned tunnels block on `Child::wait`; adopted tunnels (no child handle)
//! poll their PID with a null signal once per second. Both reconcile the
//! same way on exit. After a successful relaunch an adopted entry owns a
//! child again, so the poll loop hands off to the owned monitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use overseer_core::TunnelState;
use tracing::{info, warn};

use crate::validate::pid_alive;

use super::hooks::dispatch_hook;
use super::{launch_ssh, Shared, TunnelEntry};

const ADOPTED_POLL: Duration = Duration::from_secs(1);

pub(super) fn spawn_owned(shared: Arc<Shared>, entry: Arc<TunnelEntry>) {
    tokio::spawn(run_owned(shared, entry));
}

pub(super) fn spawn_adopted(shared: Arc<Shared>, entry: Arc<TunnelEntry>) {
    tokio::spawn(run_adopted(shared, entry));
}

async fn run_owned(shared: Arc<Shared>, entry: Arc<TunnelEntry>) {
    loop {
        // Capture the child under the lock, wait without it.
        let (mut child, cancel) = {
            let mut state = entry.state.write();
            let cancel = state.cancel.clone();
            match state.child.take() {
                Some(child) => (child, cancel),
                None => return,
            }
        };

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => return,
        };

        match &status {
            Ok(status) => info!(alias = %entry.alias, %status, "tunnel child exited"),
            Err(e) => warn!(alias = %entry.alias, error = %e, "tunnel child wait failed"),
        }

        if !handle_exit(&shared, &entry).await {
            return;
        }
    }
}

async fn run_adopted(shared: Arc<Shared>, entry: Arc<TunnelEntry>) {
    let my_epoch = entry.state.read().epoch;
    loop {
        let cancel = entry.state.read().cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(ADOPTED_POLL) => {}
            _ = cancel.cancelled() => return,
        }

        if !still_tracked(&shared, &entry) {
            return;
        }
        let (epoch, pid) = {
            let state = entry.state.read();
            (state.epoch, state.record.pid)
        };
        if epoch != my_epoch {
            // An explicit reconnect replaced the child; its own monitor owns
            // the entry now.
            return;
        }
        if pid_alive(pid) {
            continue;
        }

        info!(alias = %entry.alias, pid, "adopted tunnel process died");
        if handle_exit(&shared, &entry).await {
            // Relaunch succeeded: the entry holds an owned child again.
            run_owned(shared, entry).await;
        }
        return;
    }
}

/// Reconcile an observed exit: mark Disconnected, then either remove the
/// entry (reconnect disabled or retries spent) or retry with backoff
/// until connected.
///
/// Returns true iff the tunnel reconnected and the caller should keep
/// monitoring.
async fn handle_exit(shared: &Arc<Shared>, entry: &Arc<TunnelEntry>) -> bool {
    if !still_tracked(shared, entry) {
        return false;
    }

    let alias = entry.alias.clone();
    {
        let mut state = entry.state.write();
        state.record.state = TunnelState::Disconnected;
        state.record.disconnected_time = Some(Utc::now());
        if let Some(token) = state.auth_token.take() {
            shared.tokens.unregister_tunnel(&token);
        }
    }
    shared.events.append(&alias, "disconnected", "unexpected exit");

    let tunnel_settings = {
        let settings = shared.settings.read();
        settings.tunnels.get(&alias).cloned()
    };
    dispatch_hook(
        tunnel_settings.as_ref().and_then(|t| t.on_disconnect.as_deref()),
        "on_disconnect",
        "tunnel",
        &alias,
        "disconnected",
    );
    let max_retries = tunnel_settings.as_ref().map(|t| t.max_retries).unwrap_or(10);

    loop {
        let (auto_reconnect, retry_count) = {
            let state = entry.state.read();
            (state.record.auto_reconnect, state.record.retry_count)
        };

        if !auto_reconnect || retry_count >= max_retries {
            remove_entry(shared, entry, retry_count >= max_retries);
            return false;
        }

        // Schedule the retry, then sleep without any lock held.
        let delay = shared.settings.read().backoff.delay(retry_count as i32);
        {
            let mut state = entry.state.write();
            state.record.retry_count += 1;
            state.record.state = TunnelState::Reconnecting;
            state.record.next_retry_time =
                Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        }
        info!(alias, retry = retry_count + 1, ?delay, "scheduling reconnect");

        let cancel = entry.state.read().cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.retry_nudge.notified() => {
                info!(alias, "retry nudge, reconnecting early");
            }
            _ = cancel.cancelled() => return false,
        }
        if !still_tracked(shared, entry) {
            return false;
        }

        let settings =
            tunnel_settings.clone().unwrap_or_else(|| shared.tunnel_settings_for(&alias));
        let environment = {
            let mut environment: std::collections::HashMap<String, String> =
                std::env::vars().collect();
            environment.extend(shared.context_env.read().clone());
            environment.extend(settings.environment.clone());
            environment
        };

        match launch_ssh(shared, &alias, &settings, &environment).await {
            Ok(launch) => {
                let resolved = launch.info.resolved_host.clone();
                {
                    let mut state = entry.state.write();
                    state.record.pid = launch.pid;
                    state.record.state = TunnelState::Connected;
                    state.record.last_connected_time = Some(Utc::now());
                    state.record.retry_count = 0;
                    state.record.next_retry_time = None;
                    state.record.total_reconnects += 1;
                    state.record.resolved_host = launch.info.resolved_host;
                    state.record.health_check_failures = 0;
                    state.child = Some(launch.child);
                    state.auth_token = launch.auth_token;
                    state.adopted = false;
                    state.epoch += 1;
                }
                shared.events.append(&alias, "reconnected", resolved.as_deref().unwrap_or(""));
                dispatch_hook(
                    settings.on_connect.as_deref(),
                    "on_connect",
                    "tunnel",
                    &alias,
                    "connected",
                );
                return true;
            }
            Err(e) => {
                warn!(alias, error = %e, "reconnect attempt failed");
                shared.events.append(&alias, "reconnect-failed", &e.to_string());
            }
        }
    }
}

fn still_tracked(shared: &Arc<Shared>, entry: &Arc<TunnelEntry>) -> bool {
    shared
        .tunnels
        .lock()
        .get(&entry.alias)
        .is_some_and(|tracked| Arc::ptr_eq(tracked, entry))
}

fn remove_entry(shared: &Arc<Shared>, entry: &Arc<TunnelEntry>, exhausted: bool) {
    shared.tunnels.lock().remove(&entry.alias);
    shared.tokens.remove_tunnel_tokens_for(&entry.alias);
    if exhausted {
        warn!(alias = %entry.alias, "retries exhausted, removing tunnel");
        shared.events.append(&entry.alias, "removed", "max retries exceeded");
    } else {
        shared.events.append(&entry.alias, "removed", "auto-reconnect disabled");
    }
    if shared.tunnels.lock().is_empty() && shared.settings.read().auto_exit {
        info!("last tunnel removed, triggering auto-exit");
        shared.auto_exit.notify_one();
    }
}
