// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Companion snapshot save/load.

use std::collections::HashMap;
use std::path::Path;

use overseer_core::CompanionRecord;
use tracing::debug;

use super::types::CompanionStateFile;
use super::{remove_file, read_versioned, write_atomic, StoreError, COMPANION_STATE_FILE};

/// Persist the adoptable subset of the companion table, keyed by tunnel
/// alias. Only entries with a live PID in a runnable state are written;
/// aliases left with no adoptable companions are dropped entirely.
pub fn save_companion_state(
    dir: &Path,
    companions: &HashMap<String, Vec<CompanionRecord>>,
) -> Result<(), StoreError> {
    let adoptable: HashMap<String, Vec<CompanionRecord>> = companions
        .iter()
        .filter_map(|(alias, records)| {
            let keep: Vec<CompanionRecord> = records
                .iter()
                .filter(|r| r.pid > 0 && r.state.is_runnable())
                .cloned()
                .collect();
            if keep.is_empty() { None } else { Some((alias.clone(), keep)) }
        })
        .collect();

    let path = dir.join(COMPANION_STATE_FILE);
    debug!(aliases = adoptable.len(), path = %path.display(), "saving companion state");
    write_atomic(&path, &CompanionStateFile::new(adoptable))
}

/// Load the companion snapshot. `Ok(None)` when no file exists.
pub fn load_companion_state(dir: &Path) -> Result<Option<CompanionStateFile>, StoreError> {
    read_versioned(&dir.join(COMPANION_STATE_FILE), |f: &CompanionStateFile| &f.version)
}

/// Remove the companion snapshot.
pub fn remove_companion_state_file(dir: &Path) -> Result<(), StoreError> {
    remove_file(&dir.join(COMPANION_STATE_FILE))
}
