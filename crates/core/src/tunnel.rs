// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel record and state.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a supervised tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

impl TunnelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelState::Connecting => "connecting",
            TunnelState::Connected => "connected",
            TunnelState::Disconnected => "disconnected",
            TunnelState::Reconnecting => "reconnecting",
        }
    }

    /// States that qualify an entry for persistence across restarts.
    pub fn is_runnable(&self) -> bool {
        matches!(self, TunnelState::Connected)
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable snapshot of a tunnel entry.
///
/// This is the shape shared by the status query and the state file. Runtime
/// handles (child process, cancellation token, askpass token) live only in
/// the daemon's in-memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelRecord {
    pub alias: String,
    pub hostname: String,
    pub pid: i32,
    pub state: TunnelState,
    /// First-ever launch of this alias; never reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Reset on each successful connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    /// Monotonic; never decreases.
    #[serde(default)]
    pub total_reconnects: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_reconnect: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
    /// Remote address learned from the diagnostic stream (`addr:port`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_host: Option<String>,
    /// Ordered intermediate hops.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jump_chain: Vec<String>,
    #[serde(default)]
    pub health_check_failures: u32,
}

impl TunnelRecord {
    pub fn new(alias: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            hostname: hostname.into(),
            pid: 0,
            state: TunnelState::Connecting,
            start_date: None,
            last_connected_time: None,
            disconnected_time: None,
            retry_count: 0,
            total_reconnects: 0,
            next_retry_time: None,
            auto_reconnect: true,
            environment: HashMap::new(),
            resolved_host: None,
            jump_chain: Vec::new(),
            health_check_failures: 0,
        }
    }
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tests;
