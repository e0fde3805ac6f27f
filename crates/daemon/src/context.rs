// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context integration: environmental sensor callbacks → tunnel intents.
//!
//! The sensing itself (network location, connectivity, public IP discovery)
//! lives outside this daemon; whatever does it calls [`ContextIntegration::
//! handle_event`]. Events update the tracked snapshot, feed the sensor
//! cache, and translate through the configured rules into connect /
//! disconnect intents that the lifecycle loop applies to the supervisor.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

use overseer_core::{SensorRecord, SensorValue};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::ContextRule;

const SENSOR_HISTORY: usize = 100;

/// Callback payload from the external sensor layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent {
    LocationChanged { location: String },
    ConnectivityChanged { online: bool },
    PublicIpChanged { ip: Option<IpAddr> },
}

/// What the supervisor should do about a context change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextIntent {
    Connect { alias: String },
    Disconnect { alias: String },
    /// Location changed: every tunnel's retry bookkeeping resets.
    ResetRetries,
}

#[derive(Default)]
struct Snapshot {
    location: Option<String>,
    online: Option<bool>,
    public_ip: Option<IpAddr>,
}

pub struct ContextIntegration {
    rules: RwLock<Vec<ContextRule>>,
    snapshot: Mutex<Snapshot>,
    history: Mutex<VecDeque<SensorRecord>>,
    /// Environment overlay for tunnel children (`OVERSEER_LOCATION`, …).
    tracked_env: Arc<RwLock<HashMap<String, String>>>,
    ip_known_tx: watch::Sender<bool>,
    intents: mpsc::Sender<ContextIntent>,
}

impl ContextIntegration {
    pub fn new(rules: Vec<ContextRule>) -> (Arc<Self>, mpsc::Receiver<ContextIntent>) {
        let (intents, intents_rx) = mpsc::channel(64);
        let (ip_known_tx, _) = watch::channel(false);
        (
            Arc::new(Self {
                rules: RwLock::new(rules),
                snapshot: Mutex::new(Snapshot::default()),
                history: Mutex::new(VecDeque::new()),
                tracked_env: Arc::new(RwLock::new(HashMap::new())),
                ip_known_tx,
                intents,
            }),
            intents_rx,
        )
    }

    pub fn tracked_env(&self) -> Arc<RwLock<HashMap<String, String>>> {
        Arc::clone(&self.tracked_env)
    }

    pub fn ip_known(&self) -> watch::Receiver<bool> {
        self.ip_known_tx.subscribe()
    }

    /// Swap the rule set (SIGHUP reload). The snapshot and cache persist.
    pub fn replace_rules(&self, rules: Vec<ContextRule>) {
        *self.rules.write() = rules;
    }

    /// Apply a sensor callback and emit the intents it implies.
    pub async fn handle_event(&self, event: ContextEvent) {
        match event {
            ContextEvent::LocationChanged { location } => {
                info!(location, "location changed");
                self.record(SensorRecord::new("location", SensorValue::Text(location.clone())));
                self.snapshot.lock().location = Some(location.clone());
                self.tracked_env
                    .write()
                    .insert("OVERSEER_LOCATION".to_string(), location.clone());

                // Counters reset first so fresh connects start from zero retries.
                self.emit(ContextIntent::ResetRetries).await;
                let rule = {
                    let rules = self.rules.read();
                    rules.iter().find(|r| r.location == location).cloned()
                };
                if let Some(rule) = rule {
                    for alias in rule.disconnect {
                        self.emit(ContextIntent::Disconnect { alias }).await;
                    }
                    for alias in rule.connect {
                        self.emit(ContextIntent::Connect { alias }).await;
                    }
                } else {
                    debug!(location, "no rule for location");
                }
            }
            ContextEvent::ConnectivityChanged { online } => {
                info!(online, "connectivity changed");
                self.record(SensorRecord::new("online", SensorValue::Flag(online)));
                self.snapshot.lock().online = Some(online);
            }
            ContextEvent::PublicIpChanged { ip } => {
                info!(?ip, "public IP changed");
                if let Some(ip) = ip {
                    self.record(SensorRecord::new("public_ip", SensorValue::Address(ip)));
                }
                self.snapshot.lock().public_ip = ip;
                let _ = self.ip_known_tx.send(ip.is_some());
            }
        }
    }

    /// Restore cached readings at startup. No intents fire; this only seeds
    /// the snapshot so status queries make sense before sensors re-fire.
    pub fn restore(&self, sensors: &[SensorRecord]) {
        let mut snapshot = self.snapshot.lock();
        for sensor in sensors {
            match (&sensor.name[..], &sensor.value) {
                ("location", SensorValue::Text(location)) => {
                    snapshot.location = Some(location.clone());
                    self.tracked_env
                        .write()
                        .insert("OVERSEER_LOCATION".to_string(), location.clone());
                }
                ("online", SensorValue::Flag(online)) => snapshot.online = Some(*online),
                ("public_ip", SensorValue::Address(ip)) => {
                    snapshot.public_ip = Some(*ip);
                    let _ = self.ip_known_tx.send(true);
                }
                _ => {}
            }
            self.record(sensor.clone());
        }
    }

    /// Current readings, for the sensor cache file.
    pub fn sensor_records(&self) -> Vec<SensorRecord> {
        let snapshot = self.snapshot.lock();
        let mut records = Vec::new();
        if let Some(location) = &snapshot.location {
            records.push(SensorRecord::new("location", SensorValue::Text(location.clone())));
        }
        if let Some(online) = snapshot.online {
            records.push(SensorRecord::new("online", SensorValue::Flag(online)));
        }
        if let Some(ip) = snapshot.public_ip {
            records.push(SensorRecord::new("public_ip", SensorValue::Address(ip)));
        }
        records
    }

    /// Status payload: current snapshot plus up to `limit` recent readings.
    pub fn status_data(&self, limit: Option<usize>) -> serde_json::Value {
        let snapshot = self.snapshot.lock();
        let history = self.history.lock();
        let take = limit.unwrap_or(history.len()).min(history.len());
        let recent: Vec<&SensorRecord> =
            history.iter().rev().take(take).collect();
        serde_json::json!({
            "location": snapshot.location,
            "online": snapshot.online,
            "public_ip": snapshot.public_ip,
            "recent": recent,
        })
    }

    fn record(&self, record: SensorRecord) {
        let mut history = self.history.lock();
        if history.len() == SENSOR_HISTORY {
            history.pop_front();
        }
        history.push_back(record);
    }

    async fn emit(&self, intent: ContextIntent) {
        let _ = self.intents.send(intent).await;
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
