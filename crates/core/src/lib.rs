// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! overseer-core: domain records and leaf components for the overseer daemon.

pub mod backoff;
pub mod bridge;
pub mod companion;
pub mod duration;
pub mod logbus;
pub mod sensor;
pub mod tunnel;

pub use backoff::BackoffPolicy;
pub use bridge::{EventLogger, TokenRegistrar};
pub use companion::{
    CompanionConfig, CompanionRecord, CompanionState, OnFailure, StopSignal, WaitMode,
};
pub use duration::parse_duration;
pub use logbus::{BusSubscriber, LogBus};
pub use sensor::{SensorRecord, SensorValue};
pub use tunnel::{TunnelRecord, TunnelState};
