// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn policy_1s_1m_x2() -> BackoffPolicy {
    BackoffPolicy::from_config(Some("1s"), Some("1m"), Some(2.0))
}

#[parameterized(
    zero = { 0, 1 },
    one = { 1, 2 },
    two = { 2, 4 },
    three = { 3, 8 },
    four = { 4, 16 },
    five = { 5, 32 },
    capped = { 6, 60 },
    far_past_cap = { 100, 60 },
)]
fn doubling_curve_with_ceiling(retry_count: i32, expected_secs: u64) {
    assert_eq!(policy_1s_1m_x2().delay(retry_count), Duration::from_secs(expected_secs));
}

#[test]
fn negative_count_returns_initial() {
    assert_eq!(policy_1s_1m_x2().delay(-3), Duration::from_secs(1));
}

#[test]
fn delay_is_monotonic_until_the_cap() {
    let policy = policy_1s_1m_x2();
    let mut prev = Duration::ZERO;
    for n in 0..20 {
        let d = policy.delay(n);
        assert!(d >= prev, "delay({n}) regressed");
        assert!(d >= policy.initial() && d <= policy.max());
        prev = d;
    }
}

#[test]
fn defaults_are_one_second_to_five_minutes() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.initial(), Duration::from_secs(1));
    assert_eq!(policy.max(), Duration::from_secs(300));
    assert_eq!(policy.delay(1), Duration::from_secs(2));
}

#[parameterized(
    garbage_initial = { Some("soon"), Some("1m"), Some(2.0) },
    garbage_max = { Some("1s"), Some("later"), Some(2.0) },
    max_below_initial = { Some("10s"), Some("1s"), Some(2.0) },
    factor_below_one = { Some("1s"), Some("1m"), Some(0.5) },
    zero_initial = { Some("0s"), Some("1m"), Some(2.0) },
)]
fn bad_config_falls_back_to_defaults(
    initial: Option<&str>,
    max: Option<&str>,
    factor: Option<f64>,
) {
    assert_eq!(BackoffPolicy::from_config(initial, max, factor), BackoffPolicy::default());
}

#[test]
fn missing_values_use_defaults_without_warning() {
    let policy = BackoffPolicy::from_config(None, Some("2m"), None);
    assert_eq!(policy.initial(), Duration::from_secs(1));
    assert_eq!(policy.max(), Duration::from_secs(120));
}
