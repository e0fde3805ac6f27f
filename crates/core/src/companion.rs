// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Companion process configuration and records.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a companion process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanionState {
    Starting,
    Waiting,
    Ready,
    Running,
    Stopped,
    Failed,
    Exited,
}

impl CompanionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanionState::Starting => "starting",
            CompanionState::Waiting => "waiting",
            CompanionState::Ready => "ready",
            CompanionState::Running => "running",
            CompanionState::Stopped => "stopped",
            CompanionState::Failed => "failed",
            CompanionState::Exited => "exited",
        }
    }

    /// States that qualify an entry for persistence across restarts.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            CompanionState::Running | CompanionState::Ready | CompanionState::Waiting
        )
    }

    /// States in which a launch request is a no-op ("already running").
    pub fn is_live(&self) -> bool {
        matches!(self, CompanionState::Running | CompanionState::Ready)
    }
}

impl fmt::Display for CompanionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness gate for a just-launched companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Await child exit; success iff zero exit status.
    #[default]
    Completion,
    /// Watch the output stream for a configured substring.
    String,
}

impl WaitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitMode::Completion => "completion",
            WaitMode::String => "string",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completion" => Some(WaitMode::Completion),
            "string" => Some(WaitMode::String),
            _ => None,
        }
    }
}

/// What a readiness failure does to the rest of the companion list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnFailure {
    /// Abort the list and roll back already-started companions.
    #[default]
    Block,
    /// Log and continue with the next companion.
    Continue,
}

impl OnFailure {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "block" => Some(OnFailure::Block),
            "continue" => Some(OnFailure::Continue),
            _ => None,
        }
    }
}

/// Signal used to stop a companion gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopSignal {
    #[default]
    Int,
    Term,
    Hup,
}

impl StopSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopSignal::Int => "INT",
            StopSignal::Term => "TERM",
            StopSignal::Hup => "HUP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim_start_matches("SIG") {
            "INT" => Some(StopSignal::Int),
            "TERM" => Some(StopSignal::Term),
            "HUP" => Some(StopSignal::Hup),
            _ => None,
        }
    }
}

/// Static configuration of one companion, resolved from the tunnel's config.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionConfig {
    pub name: String,
    /// Shell command line, run via `sh -c` by the wrapper.
    pub command: String,
    pub workdir: Option<PathBuf>,
    pub environment: HashMap<String, String>,
    /// Persistent companions are skipped by per-tunnel stop.
    pub persistent: bool,
    /// Started before the tunnel child launches (readiness-gated); the rest
    /// start after the connection is verified.
    pub run_before: bool,
    pub wait_mode: WaitMode,
    /// Substring the output must contain for `WaitMode::String`.
    pub wait_for: Option<String>,
    pub timeout: Duration,
    pub ready_delay: Duration,
    pub keep_alive: bool,
    pub auto_restart: bool,
    pub on_failure: OnFailure,
    pub stop_signal: StopSignal,
    pub log_history: i64,
}

impl CompanionConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            workdir: None,
            environment: HashMap::new(),
            persistent: false,
            run_before: false,
            wait_mode: WaitMode::default(),
            wait_for: None,
            timeout: Duration::from_secs(30),
            ready_delay: Duration::ZERO,
            keep_alive: false,
            auto_restart: false,
            on_failure: OnFailure::default(),
            stop_signal: StopSignal::default(),
            log_history: 0,
        }
    }
}

/// Serializable snapshot of a companion entry, as persisted in the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionRecord {
    pub name: String,
    pub pid: i32,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub state: CompanionState,
}

#[cfg(test)]
#[path = "companion_tests.rs"]
mod tests;
