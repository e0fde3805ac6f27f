// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cached environmental sensor readings.
//!
//! The context integration persists its last observations so a restarted
//! daemon can reason about the environment before the sensors re-fire.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single sensor observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SensorValue {
    Flag(bool),
    Text(String),
    Address(IpAddr),
}

/// Named sensor reading with its observation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub value: SensorValue,
}

impl SensorRecord {
    pub fn new(name: impl Into<String>, value: SensorValue) -> Self {
        Self { name: name.into(), timestamp: Utc::now(), value }
    }
}
