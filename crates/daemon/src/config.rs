// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: `overseer.toml` under the config directory.
//!
//! The raw TOML shape is deserialized into `ConfigFile` and then resolved
//! into [`Settings`]: durations parsed, enums validated, backoff checked.
//! A missing file yields defaults with no tunnels; a malformed file is an
//! error so a SIGHUP reload can keep the old config live.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use overseer_core::{
    parse_duration, BackoffPolicy, CompanionConfig, OnFailure, StopSignal, WaitMode,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const CONFIG_FILE: &str = "overseer.toml";

const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_COMPANION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_HEALTH_GRACE: Duration = Duration::from_secs(60);

/// Errors from reading or resolving the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(#[from] toml::de::Error),

    #[error("tunnel {alias:?}: {reason}")]
    Tunnel { alias: String, reason: String },
}

// === Raw TOML shape ===

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    daemon: DaemonSection,
    backoff: BackoffSection,
    tunnels: HashMap<String, TunnelSection>,
    context: ContextSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DaemonSection {
    socket_path: Option<PathBuf>,
    auto_exit: bool,
    daemonize: bool,
    health_check_interval: Option<String>,
    health_check_grace: Option<String>,
    log_history: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BackoffSection {
    initial: Option<String>,
    max: Option<String>,
    factor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TunnelSection {
    hostname: Option<String>,
    auto_reconnect: Option<bool>,
    max_retries: Option<u32>,
    jump_chain: Vec<String>,
    environment: HashMap<String, String>,
    secret: Option<String>,
    on_connect: Option<String>,
    on_disconnect: Option<String>,
    companions: Vec<CompanionSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompanionSection {
    name: Option<String>,
    command: Option<String>,
    workdir: Option<PathBuf>,
    environment: HashMap<String, String>,
    persistent: bool,
    run_before: bool,
    wait_mode: Option<String>,
    wait_for: Option<String>,
    timeout: Option<String>,
    ready_delay: Option<String>,
    keep_alive: bool,
    auto_restart: bool,
    on_failure: Option<String>,
    stop_signal: Option<String>,
    log_history: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextSection {
    rules: Vec<ContextRuleSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextRuleSection {
    location: Option<String>,
    connect: Vec<String>,
    disconnect: Vec<String>,
}

// === Resolved settings ===

/// Fully resolved daemon settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub log_path: PathBuf,
    pub auto_exit: bool,
    pub daemonize: bool,
    pub health_check_interval: Duration,
    pub health_check_grace: Duration,
    pub log_history: i64,
    pub backoff: BackoffPolicy,
    pub tunnels: HashMap<String, TunnelSettings>,
    pub context_rules: Vec<ContextRule>,
}

/// Per-tunnel settings keyed by alias.
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    pub hostname: String,
    pub auto_reconnect: bool,
    pub max_retries: u32,
    pub jump_chain: Vec<String>,
    pub environment: HashMap<String, String>,
    /// Credential handed to the askpass path; keyring storage is a separate
    /// concern behind [`crate::supervisor::CredentialStore`].
    pub secret: Option<String>,
    pub on_connect: Option<String>,
    pub on_disconnect: Option<String>,
    pub companions: Vec<CompanionConfig>,
}

/// One context rule: when the location sensor reports `location`, connect
/// and/or disconnect the named aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRule {
    pub location: String,
    pub connect: Vec<String>,
    pub disconnect: Vec<String>,
}

impl Settings {
    /// Load and resolve `overseer.toml` from `config_dir`. A missing file is
    /// an empty config, not an error.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        let raw: ConfigFile = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigFile::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Self::resolve(config_dir, raw)
    }

    fn resolve(config_dir: &Path, raw: ConfigFile) -> Result<Self, ConfigError> {
        let socket_path = raw
            .daemon
            .socket_path
            .unwrap_or_else(|| config_dir.join("overseerd.sock"));
        let pid_path = socket_path.with_extension("pid");

        let mut tunnels = HashMap::new();
        for (alias, section) in raw.tunnels {
            let tunnel = resolve_tunnel(&alias, section)?;
            tunnels.insert(alias, tunnel);
        }

        let context_rules = raw
            .context
            .rules
            .into_iter()
            .filter_map(|r| match r.location {
                Some(location) => {
                    Some(ContextRule { location, connect: r.connect, disconnect: r.disconnect })
                }
                None => {
                    warn!("context rule without a location, ignoring");
                    None
                }
            })
            .collect();

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            socket_path,
            pid_path,
            log_path: config_dir.join("overseerd.log"),
            auto_exit: raw.daemon.auto_exit,
            daemonize: raw.daemon.daemonize,
            health_check_interval: duration_or(
                raw.daemon.health_check_interval.as_deref(),
                DEFAULT_HEALTH_INTERVAL,
                "daemon.health_check_interval",
            ),
            health_check_grace: duration_or(
                raw.daemon.health_check_grace.as_deref(),
                DEFAULT_HEALTH_GRACE,
                "daemon.health_check_grace",
            ),
            log_history: raw.daemon.log_history.unwrap_or(0),
            backoff: BackoffPolicy::from_config(
                raw.backoff.initial.as_deref(),
                raw.backoff.max.as_deref(),
                raw.backoff.factor,
            ),
            tunnels,
            context_rules,
        })
    }
}

fn resolve_tunnel(alias: &str, section: TunnelSection) -> Result<TunnelSettings, ConfigError> {
    // The alias doubles as the SSH destination when no hostname is given.
    let hostname = section.hostname.unwrap_or_else(|| alias.to_string());

    let mut companions = Vec::with_capacity(section.companions.len());
    for companion in section.companions {
        companions.push(resolve_companion(alias, companion)?);
    }

    Ok(TunnelSettings {
        hostname,
        auto_reconnect: section.auto_reconnect.unwrap_or(true),
        max_retries: section.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        jump_chain: section.jump_chain,
        environment: section.environment,
        secret: section.secret,
        on_connect: section.on_connect,
        on_disconnect: section.on_disconnect,
        companions,
    })
}

fn resolve_companion(
    alias: &str,
    section: CompanionSection,
) -> Result<CompanionConfig, ConfigError> {
    let invalid = |reason: String| ConfigError::Tunnel { alias: alias.to_string(), reason };

    let name = section
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("companion without a name".to_string()))?;
    let command = section
        .command
        .filter(|c| !c.is_empty())
        .ok_or_else(|| invalid(format!("companion {name:?} without a command")))?;

    let wait_mode = match section.wait_mode.as_deref() {
        None => WaitMode::default(),
        Some(s) => WaitMode::parse(s)
            .ok_or_else(|| invalid(format!("companion {name:?}: unknown wait_mode {s:?}")))?,
    };
    if wait_mode == WaitMode::String && section.wait_for.as_deref().unwrap_or("").is_empty() {
        return Err(invalid(format!("companion {name:?}: wait_mode=string requires wait_for")));
    }

    let on_failure = match section.on_failure.as_deref() {
        None => OnFailure::default(),
        Some(s) => OnFailure::parse(s)
            .ok_or_else(|| invalid(format!("companion {name:?}: unknown on_failure {s:?}")))?,
    };
    let stop_signal = match section.stop_signal.as_deref() {
        None => StopSignal::default(),
        Some(s) => StopSignal::parse(s)
            .ok_or_else(|| invalid(format!("companion {name:?}: unknown stop_signal {s:?}")))?,
    };

    Ok(CompanionConfig {
        workdir: section.workdir,
        environment: section.environment,
        persistent: section.persistent,
        run_before: section.run_before,
        wait_mode,
        wait_for: section.wait_for,
        timeout: duration_or(
            section.timeout.as_deref(),
            DEFAULT_COMPANION_TIMEOUT,
            "companion timeout",
        ),
        ready_delay: duration_or(
            section.ready_delay.as_deref(),
            Duration::ZERO,
            "companion ready_delay",
        ),
        keep_alive: section.keep_alive,
        auto_restart: section.auto_restart,
        on_failure,
        stop_signal,
        log_history: section.log_history.unwrap_or(0),
        name,
        command,
    })
}

fn duration_or(raw: Option<&str>, default: Duration, what: &str) -> Duration {
    match raw {
        None => default,
        Some(s) => match parse_duration(s) {
            Some(d) => d,
            None => {
                warn!(value = s, "unparsable {what}, using default {default:?}");
                default
            }
        },
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
