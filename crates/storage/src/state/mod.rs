// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State file persistence for cross-restart adoption.
//!
//! Save policy: only entries that name a live child (`pid > 0` and a runnable
//! state) are worth adopting, so only those are written. Load policy: a
//! missing file is "no state", not an error; a version mismatch or malformed
//! JSON is an error, and the caller skips adoption of those entries.

mod companions;
mod sensors;
mod tunnels;
mod types;

pub use companions::{load_companion_state, remove_companion_state_file, save_companion_state};
pub use sensors::{load_sensor_state, remove_sensor_state_file, save_sensor_state};
pub use tunnels::{load_tunnel_state, remove_tunnel_state_file, save_tunnel_state};
pub use types::{CompanionStateFile, SensorStateFile, TunnelStateFile};

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Current schema version for all three state files.
pub const STATE_VERSION: &str = "1";

pub const TUNNEL_STATE_FILE: &str = "tunnel_state.json";
pub const COMPANION_STATE_FILE: &str = "companion_state.json";
pub const SENSOR_STATE_FILE: &str = "sensor_state.json";

/// Errors from state file operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state file version mismatch: found {found:?}, expected {STATE_VERSION:?}")]
    VersionMismatch { found: String },
}

/// Write `value` as indented JSON to `path` via `<path>.tmp` + rename,
/// with owner-only permissions.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = tmp_path(path);

    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read and version-check a state file. Missing file is `Ok(None)`.
fn read_versioned<T>(path: &Path, version_of: impl Fn(&T) -> &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let value: T = serde_json::from_slice(&bytes)?;
    let found = version_of(&value);
    if found != STATE_VERSION {
        return Err(StoreError::VersionMismatch { found: found.to_string() });
    }
    Ok(Some(value))
}

/// Remove a state file, tolerating its absence.
fn remove_file(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    std::path::PathBuf::from(os)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
