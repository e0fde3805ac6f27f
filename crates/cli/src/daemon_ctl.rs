// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon process control: spawn `overseerd` detached, stop via its PID file.

use std::path::Path;
use std::process::{Command, ExitCode, Stdio};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Start `overseerd` in the background. Prefers the binary sitting next to
/// this one, falling back to `$PATH`.
pub fn start(config_dir: &Path) -> ExitCode {
    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("overseerd")))
        .filter(|path| path.exists());
    let program = sibling.unwrap_or_else(|| "overseerd".into());

    let mut cmd = Command::new(program);
    cmd.arg("--foreground")
        .arg("--config-dir")
        .arg(config_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    match cmd.spawn() {
        Ok(child) => {
            println!("overseerd started (pid {})", child.id());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("overseer: failed to start daemon: {e}");
            ExitCode::from(1)
        }
    }
}

/// Stop a running daemon by the PID recorded beside its socket.
pub fn stop(config_dir: &Path) -> ExitCode {
    let pid_path = config_dir.join("overseerd.pid");
    let pid = match std::fs::read_to_string(&pid_path) {
        Ok(text) => match text.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => pid,
            _ => {
                eprintln!("overseer: malformed PID file {}", pid_path.display());
                return ExitCode::from(1);
            }
        },
        Err(_) => {
            eprintln!("overseer: daemon not running (no PID file)");
            return ExitCode::from(1);
        }
    };

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => {
            println!("sent SIGTERM to overseerd (pid {pid})");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("overseer: failed to signal pid {pid}: {e}");
            ExitCode::from(1)
        }
    }
}
