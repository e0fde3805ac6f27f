// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: lock, bind, wire components, adopt, listen.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use overseer_core::{EventLogger, LogBus, TokenRegistrar};
use parking_lot::RwLock;
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::askpass::TokenTables;
use crate::companion::CompanionManager;
use crate::config::Settings;
use crate::context::{ContextIntegration, ContextIntent};
use crate::listener::{ListenCtx, Listener};
use crate::parent;
use crate::supervisor::{ConfigCredentials, CredentialStore, Supervisor};
use crate::{health, lifecycle};

use super::{DaemonLog, DaemonState, LifecycleError};

/// Bring the daemon up. On return the listener is accepting, adoption has
/// run, and background loops (health, context intents, parent monitor) are
/// live. The caller drives [`DaemonState::run`].
pub async fn startup(config_dir: &std::path::Path) -> Result<DaemonState, LifecycleError> {
    let settings = Settings::load(config_dir)?;
    std::fs::create_dir_all(config_dir)?;

    // Lock the PID file first; a second daemon must fail here before it
    // touches anything else. Open without truncating so a losing race
    // doesn't wipe the winner's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&settings.pid_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let root = lifecycle::root_token();
    let shutdown = lifecycle::shutdown_notify();

    let daemon_bus = Arc::new(LogBus::new(settings.log_history));
    let events: Arc<dyn EventLogger> = Arc::new(DaemonLog::new(Arc::clone(&daemon_bus)));
    let tokens = Arc::new(TokenTables::new());
    let settings = Arc::new(RwLock::new(settings));

    // Context integration, seeded from the sensor cache when one survives.
    let (context, mut intents_rx) =
        ContextIntegration::new(settings.read().context_rules.clone());
    match overseer_storage::load_sensor_state(config_dir) {
        Ok(Some(file)) => {
            info!(count = file.sensors.len(), "restoring sensor cache");
            context.restore(&file.sensors);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "sensor cache unusable, skipping"),
    }

    let companions = Arc::new(CompanionManager::new(
        Arc::clone(&settings),
        Arc::clone(&tokens) as Arc<dyn TokenRegistrar>,
        Arc::clone(&events),
        root.clone(),
    ));

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(ConfigCredentials::new(Arc::clone(&settings)));
    let supervisor = Supervisor::new(
        Arc::clone(&settings),
        Arc::clone(&tokens),
        Arc::clone(&companions),
        Arc::clone(&credentials),
        Arc::clone(&events),
        context.tracked_env(),
        context.ip_known(),
        Arc::clone(&shutdown),
        root.clone(),
    );

    // Bind the socket last among fallible steps, removing any stale file.
    let socket_path = settings.read().socket_path.clone();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix = UnixListener::bind(&socket_path)
        .map_err(|e| LifecycleError::BindFailed(socket_path.clone(), e))?;

    // Adopt the previous generation's children, then drop the state files
    // so a clean shutdown later never sees stale data.
    adopt(config_dir, &supervisor, &companions);

    let ctx = Arc::new(ListenCtx {
        supervisor: supervisor.clone(),
        companions: Arc::clone(&companions),
        context: Arc::clone(&context),
        tokens,
        credentials,
        daemon_bus,
        settings: Arc::clone(&settings),
        config_dir: config_dir.to_path_buf(),
        shutdown: Arc::clone(&shutdown),
        root: root.clone(),
        start_time: Instant::now(),
    });

    // Context intents → supervisor operations.
    {
        let supervisor = supervisor.clone();
        let ctx = Arc::clone(&ctx);
        let root = root.clone();
        tokio::spawn(async move {
            let (progress, mut sink) = tokio::sync::mpsc::channel(64);
            let drain = tokio::spawn(async move { while sink.recv().await.is_some() {} });
            loop {
                let intent = tokio::select! {
                    intent = intents_rx.recv() => intent,
                    _ = root.cancelled() => break,
                };
                match intent {
                    Some(ContextIntent::Connect { alias }) => {
                        supervisor.start_tunnel_when_ip_ready(&alias, None, &progress).await;
                        ctx.save_state();
                    }
                    Some(ContextIntent::Disconnect { alias }) => {
                        supervisor.stop_tunnel(&alias, false, &progress).await;
                        ctx.save_state();
                    }
                    Some(ContextIntent::ResetRetries) => supervisor.reset_retries(),
                    None => break,
                }
            }
            drop(progress);
            let _ = drain.await;
        });
    }

    // Health-check loop.
    {
        let (interval, grace) = {
            let settings = settings.read();
            (settings.health_check_interval, settings.health_check_grace)
        };
        health::spawn(supervisor.clone(), interval, grace, root.clone());
    }

    // Parent monitor, when a PID is designated.
    if let Some(pid) = parent::watched_pid() {
        parent::spawn(
            pid,
            Arc::new(parent::SignalProbe),
            Arc::clone(&shutdown),
            root.clone(),
        );
    }

    // Accept loop.
    tokio::spawn(Listener::new(unix, Arc::clone(&ctx)).run());

    info!(socket = %socket_path.display(), "daemon started");
    Ok(DaemonState::new(ctx, lock_file))
}

/// Claim surviving children from the previous generation's state files.
fn adopt(
    config_dir: &std::path::Path,
    supervisor: &Supervisor,
    companions: &Arc<CompanionManager>,
) {
    match overseer_storage::load_tunnel_state(config_dir) {
        Ok(Some(file)) => {
            let mut adopted = 0;
            let total = file.tunnels.len();
            for record in file.tunnels {
                if supervisor.adopt_tunnel(record) {
                    adopted += 1;
                }
            }
            info!(adopted, total, "tunnel adoption complete");
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "tunnel state unusable, skipping adoption"),
    }
    if let Err(e) = overseer_storage::remove_tunnel_state_file(config_dir) {
        warn!(error = %e, "failed to remove tunnel state file");
    }

    match overseer_storage::load_companion_state(config_dir) {
        Ok(Some(file)) => {
            let adopted = companions.adopt_companions(&file.companions);
            info!(adopted, "companion adoption complete");
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "companion state unusable, skipping adoption"),
    }
    if let Err(e) = overseer_storage::remove_companion_state_file(config_dir) {
        warn!(error = %e, "failed to remove companion state file");
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
