// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! overseerd: the overseer supervisor daemon.
//!
//! Besides the daemon itself, this binary carries two self-reinvocation
//! modes: `companion-wrap` (executes a companion command and streams its
//! output back) and `askpass` (credential helper the SSH child calls). SSH
//! invokes `$SSH_ASKPASS` with a prompt argument, so askpass mode is also
//! detected from the token environment before argument parsing.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use overseer_daemon::env::{ENV_ALIAS, ENV_TOKEN};
use overseer_daemon::{env, lifecycle, wrapper};
use tracing::error;

#[derive(Parser)]
#[command(name = "overseerd", version, about = "SSH tunnel supervisor daemon")]
struct Cli {
    /// Stay in the foreground even when the config says daemonize.
    #[arg(long)]
    foreground: bool,

    /// Config directory (default: $OVERSEER_CONFIG_DIR or ~/.config/overseer).
    #[arg(long)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Run a companion command, streaming output to the daemon (internal).
    #[command(hide = true)]
    CompanionWrap {
        /// Shell command line to execute.
        command: String,
    },

    /// Credential helper callback (internal).
    #[command(hide = true)]
    Askpass,
}

#[tokio::main]
async fn main() -> ExitCode {
    // SSH calls $SSH_ASKPASS <prompt>; the prompt isn't one of our
    // subcommands, so detect askpass mode from the injected environment.
    if std::env::var(ENV_TOKEN).is_ok()
        && std::env::var(ENV_ALIAS).is_ok()
        && !std::env::args().any(|a| a == "companion-wrap")
    {
        return code(wrapper::run_askpass().await);
    }

    let cli = Cli::parse();

    match cli.mode {
        Some(Mode::CompanionWrap { command }) => {
            return code(wrapper::run_companion_wrap(&command).await);
        }
        Some(Mode::Askpass) => return code(wrapper::run_askpass().await),
        None => {}
    }

    let config_dir = cli.config_dir.unwrap_or_else(env::config_dir);
    init_tracing(&config_dir);

    // Daemonize by re-executing ourselves detached; no fork needed.
    let daemonize = match overseer_daemon::config::Settings::load(&config_dir) {
        Ok(settings) => settings.daemonize,
        Err(e) => {
            eprintln!("overseerd: {e}");
            return ExitCode::from(2);
        }
    };
    if daemonize && !cli.foreground {
        return respawn_detached(&config_dir);
    }

    match lifecycle::startup(&config_dir).await {
        Ok(daemon) => code(daemon.run().await),
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("overseerd: {e}");
            ExitCode::from(1)
        }
    }
}

fn respawn_detached(config_dir: &std::path::Path) -> ExitCode {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("overseerd: cannot find own binary: {e}");
            return ExitCode::from(1);
        }
    };
    let mut cmd = Command::new(exe);
    cmd.arg("--foreground")
        .arg("--config-dir")
        .arg(config_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0);

    match cmd.spawn() {
        Ok(child) => {
            println!("overseerd started (pid {})", child.id());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("overseerd: failed to daemonize: {e}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(config_dir: &std::path::Path) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let _ = std::fs::create_dir_all(config_dir);
    let appender = tracing_appender::rolling::never(config_dir, "overseerd.log");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(appender).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn code(status: i32) -> ExitCode {
    ExitCode::from(status.clamp(0, 255) as u8)
}
