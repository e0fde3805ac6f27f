// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect backoff policy.
//!
//! `delay(n) = clamp(initial * factor^n, initial, max)`, a pure function of
//! the retry count, so the supervisor can schedule without shared state.

use std::time::Duration;

use crate::duration::parse_duration;

const DEFAULT_INITIAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX: Duration = Duration::from_secs(300);
const DEFAULT_FACTOR: f64 = 2.0;

/// Exponential backoff parameters with an absolute ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { initial: DEFAULT_INITIAL, max: DEFAULT_MAX, factor: DEFAULT_FACTOR }
    }
}

impl BackoffPolicy {
    /// Build from raw config strings. Any unparsable or out-of-range value
    /// (zero initial, max below initial, factor below 1) falls back to the
    /// defaults of 1s / 5m / 2 with a logged warning.
    pub fn from_config(initial: Option<&str>, max: Option<&str>, factor: Option<f64>) -> Self {
        let defaults = Self::default();

        let parsed_initial = match initial {
            None => Some(defaults.initial),
            Some(s) => parse_duration(s),
        };
        let parsed_max = match max {
            None => Some(defaults.max),
            Some(s) => parse_duration(s),
        };
        let factor = factor.unwrap_or(defaults.factor);

        match (parsed_initial, parsed_max) {
            (Some(initial), Some(max))
                if initial > Duration::ZERO && max >= initial && factor >= 1.0 =>
            {
                Self { initial, max, factor }
            }
            _ => {
                tracing::warn!(
                    ?initial,
                    ?max,
                    factor,
                    "invalid backoff configuration, using defaults (1s / 5m / 2)"
                );
                defaults
            }
        }
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before retry number `retry_count`. Non-positive counts return
    /// the initial delay; the max is an absolute ceiling.
    pub fn delay(&self, retry_count: i32) -> Duration {
        if retry_count <= 0 {
            return self.initial;
        }
        let scaled = self.initial.as_secs_f64() * self.factor.powi(retry_count);
        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(scaled).clamp(self.initial, self.max)
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
