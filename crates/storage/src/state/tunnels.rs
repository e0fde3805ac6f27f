// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel snapshot save/load.

use std::path::Path;

use overseer_core::TunnelRecord;
use tracing::debug;

use super::types::TunnelStateFile;
use super::{remove_file, read_versioned, write_atomic, StoreError, TUNNEL_STATE_FILE};

/// Persist the adoptable subset of the tunnel table: entries with a live PID
/// in a runnable state. Everything else is not worth claiming after restart.
pub fn save_tunnel_state(dir: &Path, tunnels: &[TunnelRecord]) -> Result<(), StoreError> {
    let adoptable: Vec<TunnelRecord> = tunnels
        .iter()
        .filter(|t| t.pid > 0 && t.state.is_runnable())
        .cloned()
        .collect();

    let path = dir.join(TUNNEL_STATE_FILE);
    debug!(count = adoptable.len(), path = %path.display(), "saving tunnel state");
    write_atomic(&path, &TunnelStateFile::new(adoptable))
}

/// Load the tunnel snapshot. `Ok(None)` when no file exists.
pub fn load_tunnel_state(dir: &Path) -> Result<Option<TunnelStateFile>, StoreError> {
    read_versioned(&dir.join(TUNNEL_STATE_FILE), |f: &TunnelStateFile| &f.version)
}

/// Remove the tunnel snapshot (after adoption completes, so a later clean
/// shutdown doesn't see stale data).
pub fn remove_tunnel_state_file(dir: &Path) -> Result<(), StoreError> {
    remove_file(&dir.join(TUNNEL_STATE_FILE))
}
