// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variable names and well-known paths.

use std::path::PathBuf;

/// Overrides the config directory (default `~/.config/overseer`).
pub const ENV_CONFIG_DIR: &str = "OVERSEER_CONFIG_DIR";

/// Overrides the IPC socket path for self-reinvoked helpers.
pub const ENV_SOCKET: &str = "OVERSEER_SOCKET";

/// Overrides which PID the parent monitor watches.
pub const ENV_MONITOR_PID: &str = "OVERSEER_MONITOR_PID";

/// Injected into companion wrappers.
pub const ENV_COMPANION_ALIAS: &str = "OVERSEER_COMPANION_ALIAS";
pub const ENV_COMPANION_NAME: &str = "OVERSEER_COMPANION_NAME";
pub const ENV_COMPANION_TOKEN: &str = "OVERSEER_COMPANION_TOKEN";

/// Injected into the askpass helper.
pub const ENV_ALIAS: &str = "OVERSEER_ALIAS";
pub const ENV_TOKEN: &str = "OVERSEER_TOKEN";

/// Injected into hook processes.
pub const ENV_HOOK_TYPE: &str = "OVERSEER_HOOK_TYPE";
pub const ENV_HOOK_TARGET: &str = "OVERSEER_HOOK_TARGET";
pub const ENV_HOOK_ALIAS: &str = "OVERSEER_HOOK_ALIAS";
pub const ENV_HOOK_STATE: &str = "OVERSEER_HOOK_STATE";

/// Config directory: `$OVERSEER_CONFIG_DIR`, else `~/.config/overseer`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::config_dir().unwrap_or_else(std::env::temp_dir).join("overseer")
}

/// Per-companion wrapper socket path.
pub fn companion_socket_path(alias: &str, name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("overseer-companion-{alias}-{name}.sock"))
}

/// Socket path the self-reinvoked helpers dial back to:
/// `$OVERSEER_SOCKET`, else the default under the config directory.
pub fn callback_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(ENV_SOCKET) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    config_dir().join("overseerd.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_socket_path_is_deterministic() {
        let a = companion_socket_path("work", "db");
        let b = companion_socket_path("work", "db");
        assert_eq!(a, b);
        assert!(a.to_string_lossy().ends_with("overseer-companion-work-db.sock"));
    }
}
