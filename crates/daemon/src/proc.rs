// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal delivery helpers for supervised children.

use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use overseer_core::StopSignal;

use crate::validate::pid_alive;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn as_signal(stop: StopSignal) -> Signal {
    match stop {
        StopSignal::Int => Signal::SIGINT,
        StopSignal::Term => Signal::SIGTERM,
        StopSignal::Hup => Signal::SIGHUP,
    }
}

/// Send `sig` to a single process.
pub fn signal_pid(pid: i32, sig: Signal) -> bool {
    pid > 0 && kill(Pid::from_raw(pid), sig).is_ok()
}

/// Send `sig` to the whole process group, so foreground children of a
/// wrapper die with it.
pub fn signal_group(pid: i32, sig: Signal) -> bool {
    pid > 0 && kill(Pid::from_raw(-pid), sig).is_ok()
}

/// Poll until the PID is gone or `grace` elapses. True iff it died.
pub async fn await_death(pid: i32, grace: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !pid_alive(pid) {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    !pid_alive(pid)
}

/// SIGTERM, wait up to `grace`, then SIGKILL if still alive.
pub async fn terminate(pid: i32, grace: Duration) {
    if pid <= 0 || !pid_alive(pid) {
        return;
    }
    signal_pid(pid, Signal::SIGTERM);
    if !await_death(pid, grace).await {
        signal_pid(pid, Signal::SIGKILL);
    }
}
