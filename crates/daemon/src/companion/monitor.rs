// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Companion monitors for kept-alive runs.
//!
//! Owned companions block on `Child::wait`; adopted ones poll their PID once
//! per second. On an unexpected exit the companion is either marked Exited
//! or restarted in place; a Stopped state means the exit was intentional and
//! the monitor just returns. A successful restart spawns its own monitor, so
//! each monitor task covers exactly one run.

use std::sync::Arc;
use std::time::Duration;

use overseer_core::CompanionState;
use tracing::{info, warn};

use crate::validate::pid_alive;

use super::{launch, CmShared, CompanionEntry};

const ADOPTED_POLL: Duration = Duration::from_secs(1);
const RESTART_PAUSE: Duration = Duration::from_secs(1);

pub(super) fn spawn(shared: Arc<CmShared>, entry: Arc<CompanionEntry>) {
    tokio::spawn(run(shared, entry));
}

async fn run(shared: Arc<CmShared>, entry: Arc<CompanionEntry>) {
    let (child, adopted, ctx) = {
        let mut state = entry.state.write();
        (state.child.take(), state.adopted, state.ctx.clone())
    };

    let exit_code = match child {
        Some(mut child) => {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = ctx.cancelled() => return,
            };
            match status {
                Ok(status) => {
                    info!(alias = %entry.alias, name = %entry.name, %status, "companion exited");
                    status.code()
                }
                Err(e) => {
                    warn!(alias = %entry.alias, name = %entry.name, error = %e, "companion wait failed");
                    None
                }
            }
        }
        None if adopted => {
            if !poll_adopted(&entry, &ctx).await {
                return;
            }
            info!(alias = %entry.alias, name = %entry.name, "adopted companion process died");
            None
        }
        None => return,
    };

    // Intentional stop: the stopper already reconciled.
    if entry.companion_state() == CompanionState::Stopped {
        return;
    }

    let auto_restart = {
        let mut state = entry.state.write();
        state.exit_code = exit_code;
        if exit_code.is_some_and(|code| code != 0) {
            state.exit_error = Some(format!("exited with code {}", exit_code.unwrap_or(-1)));
        }
        state.config.auto_restart
    };

    if !auto_restart {
        entry.state.write().state = CompanionState::Exited;
        shared.events.append(&entry.alias, "companion-exited", &entry.name);
        return;
    }

    shared.events.append(&entry.alias, "companion-restarting", &entry.name);
    tokio::select! {
        _ = tokio::time::sleep(RESTART_PAUSE) => {}
        _ = ctx.cancelled() => return,
    }
    if entry.companion_state() == CompanionState::Stopped {
        return;
    }

    // A successful restart re-enters the gate and spawns a fresh monitor
    // for the new run; either way this task is done.
    let progress = launch::sink();
    if !launch::restart_in_place(&shared, &entry, &progress).await {
        warn!(alias = %entry.alias, name = %entry.name, "auto-restart failed");
    }
}

/// Poll an adopted companion's PID. True iff the process died; false means
/// the run was cancelled or replaced by an owned child.
async fn poll_adopted(
    entry: &Arc<CompanionEntry>,
    ctx: &tokio_util::sync::CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(ADOPTED_POLL) => {}
            _ = ctx.cancelled() => return false,
        }
        let (pid, replaced) = {
            let state = entry.state.read();
            (state.pid, !state.adopted || state.child.is_some())
        };
        if replaced {
            return false;
        }
        if !pid_alive(pid) {
            return true;
        }
    }
}
