// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! overseer-storage: atomic JSON snapshots of supervisor state.
//!
//! Three documents live under the config directory: the tunnel snapshot, the
//! companion snapshot, and the sensor cache. Each carries a schema version
//! and a timestamp; writes go through a write-then-rename so a crash never
//! leaves a torn file behind.

pub mod state;

pub use state::{
    load_companion_state, load_sensor_state, load_tunnel_state, remove_companion_state_file,
    remove_sensor_state_file, remove_tunnel_state_file, save_companion_state, save_sensor_state,
    save_tunnel_state, CompanionStateFile, SensorStateFile, StoreError, TunnelStateFile,
    COMPANION_STATE_FILE, SENSOR_STATE_FILE, STATE_VERSION, TUNNEL_STATE_FILE,
};
