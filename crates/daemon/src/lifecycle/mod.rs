// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, signal handling, shutdown.

mod startup;

pub use startup::startup;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use overseer_core::{EventLogger, LogBus};
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::listener::ListenCtx;

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The daemon's own event stream: structured lifecycle events, broadcast to
/// attach clients and mirrored to tracing.
pub struct DaemonLog {
    bus: Arc<LogBus>,
}

impl DaemonLog {
    pub fn new(bus: Arc<LogBus>) -> Self {
        Self { bus }
    }
}

impl EventLogger for DaemonLog {
    fn append(&self, alias: &str, kind: &str, details: &str) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = if details.is_empty() {
            format!("{stamp} [{alias}] {kind}")
        } else {
            format!("{stamp} [{alias}] {kind}: {details}")
        };
        info!(alias, kind, details, "event");
        self.bus.broadcast(&line);
    }
}

/// Running daemon state, as returned by [`startup`].
pub struct DaemonState {
    pub ctx: Arc<ListenCtx>,
    /// Held for the lifetime of the process to keep the PID file locked.
    #[allow(dead_code)]
    lock_file: std::fs::File,
    shutdown_done: AtomicBool,
}

impl DaemonState {
    /// Run until a termination signal, a parent-death notification, or
    /// auto-exit; then shut down. Returns the process exit code.
    pub async fn run(self) -> i32 {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                return 1;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cannot install SIGINT handler");
                return 1;
            }
        };
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cannot install SIGHUP handler");
                return 1;
            }
        };

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received");
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT received");
                    break;
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received, reloading config");
                    self.reload();
                }
                _ = self.ctx.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await;
        0
    }

    /// Re-parse the config. Live tunnels and companions are untouched;
    /// their configuration changes apply on their next restart. A broken
    /// config keeps the old one live.
    pub fn reload(&self) {
        match crate::config::Settings::load(&self.ctx.config_dir) {
            Ok(new_settings) => {
                self.ctx.context.replace_rules(new_settings.context_rules.clone());
                *self.ctx.settings.write() = new_settings;
                info!("config reloaded");
            }
            Err(e) => {
                warn!(error = %e, "reload failed, keeping previous config");
            }
        }
    }

    /// Idempotent shutdown: save state, stop the world, remove our files.
    /// A failure inside shutdown logs but never re-enters.
    pub async fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down");

        // 1. Snapshot state while children are still alive; a crashed next
        //    generation adopts from this, a clean one finds dead PIDs and
        //    discards it.
        self.ctx.save_state();

        // 2. Unblock the accept loop and every monitor/attach task.
        self.ctx.root.cancel();

        // 3. Kill tunnel children (owned or adopted) and all companions,
        //    persistent ones included.
        self.ctx.supervisor.stop_all().await;
        self.ctx.companions.stop_all().await;

        // 4. Remove socket and PID files. The lock file releases on drop.
        let settings = self.ctx.settings.read();
        for path in [&settings.socket_path, &settings.pid_path] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "cleanup failed");
                }
            }
        }

        info!("shutdown complete");
    }

    pub(super) fn new(ctx: Arc<ListenCtx>, lock_file: std::fs::File) -> Self {
        Self { ctx, lock_file, shutdown_done: AtomicBool::new(false) }
    }
}

/// Notify handle that external tasks (parent monitor, auto-exit) use to
/// request a graceful shutdown.
pub fn shutdown_notify() -> Arc<Notify> {
    Arc::new(Notify::new())
}

/// Root cancellation token for the whole daemon.
pub fn root_token() -> CancellationToken {
    CancellationToken::new()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
