// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sensor cache save/load.

use std::path::Path;

use overseer_core::SensorRecord;
use tracing::debug;

use super::types::SensorStateFile;
use super::{remove_file, read_versioned, write_atomic, StoreError, SENSOR_STATE_FILE};

/// Persist the sensor cache. Sensor readings carry no PID; all are written.
pub fn save_sensor_state(dir: &Path, sensors: &[SensorRecord]) -> Result<(), StoreError> {
    let path = dir.join(SENSOR_STATE_FILE);
    debug!(count = sensors.len(), path = %path.display(), "saving sensor state");
    write_atomic(&path, &SensorStateFile::new(sensors.to_vec()))
}

/// Load the sensor cache. `Ok(None)` when no file exists.
pub fn load_sensor_state(dir: &Path) -> Result<Option<SensorStateFile>, StoreError> {
    read_versioned(&dir.join(SENSOR_STATE_FILE), |f: &SensorStateFile| &f.version)
}

/// Remove the sensor cache.
pub fn remove_sensor_state_file(dir: &Path) -> Result<(), StoreError> {
    remove_file(&dir.join(SENSOR_STATE_FILE))
}
