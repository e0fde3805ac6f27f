// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic tunnel health checks.
//!
//! Connected tunnels past the grace period get a null-signal probe plus a
//! TCP connect to their resolved host. A success resets the failure count;
//! two consecutive failures force-terminate the child, which the monitor
//! then observes as an exit and reconnects per the usual path.

use std::time::Duration;

use chrono::{DateTime, Utc};
use overseer_core::{TunnelRecord, TunnelState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::supervisor::Supervisor;
use crate::validate::pid_alive;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FAILURES: u32 = 2;

/// Run the health-check loop until shutdown.
pub fn spawn(supervisor: Supervisor, interval: Duration, grace: Duration, root: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // immediate first tick
        loop {
            tokio::select! {
                _ = ticker.tick() => check_all(&supervisor, grace).await,
                _ = root.cancelled() => return,
            }
        }
    });
}

async fn check_all(supervisor: &Supervisor, grace: Duration) {
    for record in supervisor.records() {
        if !eligible(&record, grace, Utc::now()) {
            continue;
        }

        let alive = pid_alive(record.pid);
        let reachable = match (&record.resolved_host, alive) {
            // No address learned; process liveness is all we can check.
            (None, alive) => alive,
            (_, false) => false,
            (Some(host), true) => tcp_probe(host).await,
        };
        let healthy = alive && reachable;

        let failures = supervisor.note_health(&record.alias, healthy);
        if healthy {
            debug!(alias = %record.alias, "health check ok");
        } else {
            warn!(alias = %record.alias, failures, alive, reachable, "health check failed");
            if failures >= MAX_FAILURES {
                supervisor.force_terminate(&record.alias);
            }
        }
    }
}

/// Only Connected tunnels that have been up at least `grace` are probed, so
/// a just-started session isn't raced.
fn eligible(record: &TunnelRecord, grace: Duration, now: DateTime<Utc>) -> bool {
    if record.state != TunnelState::Connected {
        return false;
    }
    match record.last_connected_time {
        Some(connected) => {
            now.signed_duration_since(connected).to_std().unwrap_or_default() >= grace
        }
        None => false,
    }
}

/// TCP reachability probe against `addr:port`.
async fn tcp_probe(host: &str) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(host)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
