// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell hooks on tunnel state transitions.
//!
//! Hooks are fire-and-forget: a failure or hang must never stall the
//! supervisor, so each runs in its own task with a hard timeout.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::env;

const HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a configured hook command, if any, in the background. The hook
/// receives `OVERSEER_*` variables describing the event.
pub fn dispatch_hook(
    command: Option<&str>,
    hook_type: &str,
    target_type: &str,
    alias: &str,
    state: &str,
) {
    let command = match command {
        Some(command) if !command.is_empty() => command.to_string(),
        _ => return,
    };
    let hook_type = hook_type.to_string();
    let alias = alias.to_string();
    let target_type = target_type.to_string();
    let state = state.to_string();

    tokio::spawn(async move {
        debug!(hook = %hook_type, alias = %alias, "dispatching hook");
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .env(env::ENV_HOOK_TYPE, &hook_type)
            .env(env::ENV_HOOK_TARGET, &target_type)
            .env(env::ENV_HOOK_ALIAS, &alias)
            .env(env::ENV_HOOK_STATE, &state)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(hook = %hook_type, alias = %alias, error = %e, "hook failed to spawn");
                return;
            }
        };

        match tokio::time::timeout(HOOK_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                warn!(hook = %hook_type, alias = %alias, %status, "hook exited non-zero");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(hook = %hook_type, alias = %alias, error = %e, "hook wait failed"),
            Err(_) => {
                warn!(hook = %hook_type, alias = %alias, "hook timed out, killing");
                let _ = child.start_kill();
            }
        }
    });
}
