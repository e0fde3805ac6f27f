// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk schemas for the three state documents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use overseer_core::{CompanionRecord, SensorRecord, TunnelRecord};
use serde::{Deserialize, Serialize};

use super::STATE_VERSION;

/// `tunnel_state.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelStateFile {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub tunnels: Vec<TunnelRecord>,
}

impl TunnelStateFile {
    pub fn new(tunnels: Vec<TunnelRecord>) -> Self {
        Self { version: STATE_VERSION.to_string(), timestamp: Utc::now(), tunnels }
    }
}

/// `companion_state.json`, companions keyed by owning tunnel alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionStateFile {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub companions: HashMap<String, Vec<CompanionRecord>>,
}

impl CompanionStateFile {
    pub fn new(companions: HashMap<String, Vec<CompanionRecord>>) -> Self {
        Self { version: STATE_VERSION.to_string(), timestamp: Utc::now(), companions }
    }
}

/// `sensor_state.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorStateFile {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub sensors: Vec<SensorRecord>,
}

impl SensorStateFile {
    pub fn new(sensors: Vec<SensorRecord>) -> Self {
        Self { version: STATE_VERSION.to_string(), timestamp: Utc::now(), sensors }
    }
}
