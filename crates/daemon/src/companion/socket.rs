// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-companion wrapper socket.
//!
//! The wrapper dials in and streams line-framed output. Two sentinel lines
//! are protocol control: `HISTORY_START` / `HISTORY_END` bracket a replay
//! block whose lines go only to the bus history, so a re-attaching
//! subscriber sees them without duplicating output to already-connected
//! sessions. Everything else is raw output and broadcast.

use std::sync::Arc;

use overseer_core::LogBus;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::CompanionEntry;

pub(super) const HISTORY_START: &str = "HISTORY_START";
pub(super) const HISTORY_END: &str = "HISTORY_END";

/// Accept wrapper connections until the run's context is cancelled.
///
/// The socket file itself is removed by whoever cancels the run (stop,
/// restart, failure); an in-place restart binds a fresh listener at the
/// same deterministic path, so cleanup here would race it.
pub(super) fn spawn_listener(
    entry: Arc<CompanionEntry>,
    listener: UnixListener,
    ctx: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        debug!(alias = %entry.alias, name = %entry.name, "wrapper connected");
                        tokio::spawn(read_wrapper(Arc::clone(&entry), stream, ctx.clone()));
                    }
                    Err(e) => {
                        warn!(alias = %entry.alias, name = %entry.name, error = %e, "wrapper accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
    });
}

async fn read_wrapper(entry: Arc<CompanionEntry>, stream: UnixStream, ctx: CancellationToken) {
    let mut lines = BufReader::new(stream).lines();
    let mut in_history = false;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = ctx.cancelled() => return,
        };
        match line {
            Ok(Some(line)) => feed_wrapper_line(&entry.output, &mut in_history, &line),
            Ok(None) => return,
            Err(e) => {
                debug!(alias = %entry.alias, name = %entry.name, error = %e, "wrapper stream error");
                return;
            }
        }
    }
}

/// Route one wrapper line: sentinels toggle replay mode, replayed lines fill
/// history only, everything else broadcasts.
pub fn feed_wrapper_line(bus: &LogBus, in_history: &mut bool, line: &str) {
    match line {
        HISTORY_START => *in_history = true,
        HISTORY_END => *in_history = false,
        _ if *in_history => bus.add_to_history(line),
        _ => bus.broadcast(line),
    }
}
