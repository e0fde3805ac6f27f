// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level specs: drive the built binaries end to end.

use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use tempfile::TempDir;

const STARTUP_WAIT: Duration = Duration::from_secs(10);

/// A daemon child bound to a temp config dir; killed on drop.
struct DaemonUnderTest {
    child: Child,
    dir: TempDir,
}

impl DaemonUnderTest {
    fn start() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let exe = assert_cmd::cargo::cargo_bin("overseerd");
        let child = std::process::Command::new(exe)
            .arg("--foreground")
            .arg("--config-dir")
            .arg(dir.path())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .expect("spawn overseerd");
        let daemon = Self { child, dir };
        assert!(
            wait_for(STARTUP_WAIT, || daemon.socket_path().exists()),
            "daemon socket never appeared"
        );
        daemon
    }

    fn socket_path(&self) -> PathBuf {
        self.dir.path().join("overseerd.sock")
    }

    fn config_dir(&self) -> &Path {
        self.dir.path()
    }

    fn client(&self) -> Command {
        let mut cmd = Command::cargo_bin("overseer").expect("overseer binary");
        cmd.arg("--config-dir").arg(self.config_dir());
        cmd
    }
}

impl Drop for DaemonUnderTest {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn wait_for(max: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + max;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    check()
}

#[test]
fn client_help_lists_subcommands() {
    let output = Command::cargo_bin("overseer")
        .expect("overseer binary")
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let help = String::from_utf8_lossy(&output);
    for verb in ["status", "connect", "disconnect", "companion", "attach", "daemon"] {
        assert!(help.contains(verb), "missing {verb} in help:\n{help}");
    }
}

#[test]
fn daemon_help_hides_internal_modes() {
    let output = Command::cargo_bin("overseerd")
        .expect("overseerd binary")
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let help = String::from_utf8_lossy(&output);
    assert!(!help.contains("companion-wrap"), "wrapper mode should be hidden:\n{help}");
}

#[test]
fn status_round_trips_over_the_socket() {
    let daemon = DaemonUnderTest::start();
    let assert = daemon.client().arg("status").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("0 tunnel"), "unexpected status output:\n{stdout}");
    assert!(stdout.contains("\"tunnels\""), "missing data object:\n{stdout}");
}

#[test]
fn version_reports_daemon_pid() {
    let daemon = DaemonUnderTest::start();
    let assert = daemon.client().arg("version").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("overseerd"), "unexpected version output:\n{stdout}");
    assert!(stdout.contains("\"pid\""), "missing data object:\n{stdout}");
}

#[test]
fn error_responses_drive_a_nonzero_exit() {
    let daemon = DaemonUnderTest::start();
    daemon.client().args(["disconnect", "ghost"]).assert().code(1);
}

#[test]
fn reset_succeeds_with_no_tunnels() {
    let daemon = DaemonUnderTest::start();
    daemon.client().arg("reset").assert().success();
}

#[test]
fn companion_status_is_empty_initially() {
    let daemon = DaemonUnderTest::start();
    let assert = daemon.client().args(["companion", "status"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("\"companions\""), "missing data object:\n{stdout}");
}

#[test]
fn daemon_stop_removes_its_files() {
    let daemon = DaemonUnderTest::start();
    let pid_path = daemon.config_dir().join("overseerd.pid");
    assert!(pid_path.exists());

    daemon.client().args(["daemon", "stop"]).assert().success();
    assert!(
        wait_for(STARTUP_WAIT, || !daemon.socket_path().exists() && !pid_path.exists()),
        "daemon did not clean up socket and PID file"
    );
}

#[test]
fn second_daemon_refuses_to_start() {
    let daemon = DaemonUnderTest::start();
    let exe = assert_cmd::cargo::cargo_bin("overseerd");
    let output = std::process::Command::new(exe)
        .arg("--foreground")
        .arg("--config-dir")
        .arg(daemon.config_dir())
        .output()
        .expect("run second daemon");
    assert!(!output.status.success(), "second daemon must fail to lock");
}
