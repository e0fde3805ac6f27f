// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the IPC socket.
//!
//! Each accepted connection is handled by its own task: read one command
//! line, route by verb, stream `{message, status}` JSON objects back, then
//! half-close. Attach verbs keep the connection open and follow a log bus.

mod attach;
mod commands;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use overseer_core::LogBus;
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::askpass::TokenTables;
use crate::companion::CompanionManager;
use crate::config::Settings;
use crate::context::ContextIntegration;
use crate::protocol::{self, write_line, Command, Response};
use crate::supervisor::{CredentialStore, Supervisor};

const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub supervisor: Supervisor,
    pub companions: Arc<CompanionManager>,
    pub context: Arc<ContextIntegration>,
    pub tokens: Arc<TokenTables>,
    pub credentials: Arc<dyn CredentialStore>,
    /// The daemon's own event stream, served by LOGS/ATTACH.
    pub daemon_bus: Arc<LogBus>,
    pub settings: Arc<RwLock<Settings>>,
    pub config_dir: PathBuf,
    pub shutdown: Arc<Notify>,
    pub root: CancellationToken,
    pub start_time: Instant,
}

impl ListenCtx {
    /// Persist tunnel, companion, and sensor snapshots. Called after
    /// mutating commands and again on shutdown.
    pub fn save_state(&self) {
        if let Err(e) =
            overseer_storage::save_tunnel_state(&self.config_dir, &self.supervisor.records())
        {
            warn!(error = %e, "failed to save tunnel state");
        }
        if let Err(e) =
            overseer_storage::save_companion_state(&self.config_dir, &self.companions.records())
        {
            warn!(error = %e, "failed to save companion state");
        }
        if let Err(e) =
            overseer_storage::save_sensor_state(&self.config_dir, &self.context.sensor_records())
        {
            warn!(error = %e, "failed to save sensor state");
        }
    }
}

/// Accept loop; exits when the root token is cancelled.
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.ctx.root.cancelled() => {
                    debug!("listener stopping");
                    return;
                }
                accepted = self.unix.accept() => match accepted {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &ctx).await {
                                debug!(error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &Arc<ListenCtx>) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let line = match tokio::time::timeout(READ_TIMEOUT, lines.next_line()).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            write_line(&mut writer, &Response::error("timed out waiting for command")).await?;
            return Ok(());
        }
    };

    info!(command = %protocol::masked(&line), "ipc command");

    match Command::parse(&line) {
        Ok(command) => route(command, lines, writer, ctx).await,
        Err(e) => {
            write_line(&mut writer, &Response::error(e.to_string())).await?;
            Ok(())
        }
    }
}

type ReadLines = tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>;

async fn route(
    command: Command,
    lines: ReadLines,
    mut writer: OwnedWriteHalf,
    ctx: &Arc<ListenCtx>,
) -> std::io::Result<()> {
    match command {
        // Attach verbs own the connection.
        Command::Logs { count, history } => {
            attach::serve_logs(&mut writer, ctx, count, history).await
        }
        Command::Attach { count, history } => {
            attach::serve_attach(lines, writer, ctx, count, history).await
        }
        Command::CompanionAttach { alias, name, history_lines, history } => {
            attach::serve_companion_attach(lines, writer, ctx, &alias, &name, history_lines, history)
                .await
        }
        other => commands::dispatch(other, &mut writer, ctx).await,
    }
}
