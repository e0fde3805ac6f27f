// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parent process monitor.
//!
//! When `OVERSEER_MONITOR_PID` names an external process, the daemon shuts
//! down gracefully once that process dies. Platforms with a kernel-level
//! parent-death signal can provide their own probe; the default polls with a
//! null signal, which works everywhere.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::env::ENV_MONITOR_PID;
use crate::validate::pid_alive;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Liveness probe for the watched process. The polling default is all most
/// platforms get; a kernel-backed implementation can replace it.
pub trait ParentProbe: Send + Sync {
    fn alive(&self, pid: i32) -> bool;
}

/// Default probe: null-signal poll.
pub struct SignalProbe;

impl ParentProbe for SignalProbe {
    fn alive(&self, pid: i32) -> bool {
        pid_alive(pid)
    }
}

/// The PID to watch, from `OVERSEER_MONITOR_PID`. Unset or unparsable means
/// no parent monitoring.
pub fn watched_pid() -> Option<i32> {
    let raw = std::env::var(ENV_MONITOR_PID).ok()?;
    match raw.parse::<i32>() {
        Ok(pid) if pid > 0 => Some(pid),
        _ => {
            warn!(value = raw, "ignoring unparsable {ENV_MONITOR_PID}");
            None
        }
    }
}

/// Watch `pid`; fire `shutdown` once when it dies.
pub fn spawn(
    pid: i32,
    probe: Arc<dyn ParentProbe>,
    shutdown: Arc<Notify>,
    root: CancellationToken,
) {
    tokio::spawn(async move {
        info!(pid, "watching parent process");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = root.cancelled() => return,
            }
            if !probe.alive(pid) {
                info!(pid, "watched parent died, shutting down");
                shutdown.notify_one();
                return;
            }
        }
    });
}
