// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! overseer: client for the overseer daemon.
//!
//! Every subcommand maps onto one IPC verb; the client streams the daemon's
//! response messages as they arrive and exits non-zero iff any carried
//! status ERROR.

mod client;
mod daemon_ctl;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "overseer", version, about = "SSH tunnel supervisor client")]
struct Cli {
    /// Config directory (default: $OVERSEER_CONFIG_DIR or ~/.config/overseer).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show tunnel status.
    Status,
    /// Show daemon version.
    Version,
    /// Connect a tunnel.
    Connect {
        alias: String,
        /// Environment tag override for this run.
        #[arg(long)]
        tag: Option<String>,
    },
    /// Disconnect a tunnel.
    Disconnect { alias: String },
    /// Disconnect every tunnel.
    DisconnectAll,
    /// Reconnect a tunnel (stop + start, companions kept).
    Reconnect { alias: String },
    /// Reset retry counters for all tunnels.
    Reset,
    /// Companion operations.
    #[command(subcommand)]
    Companion(CompanionCommand),
    /// Dump recent daemon log lines.
    Logs {
        /// How many history lines to show.
        count: Option<usize>,
        /// Skip history entirely.
        #[arg(long)]
        no_history: bool,
    },
    /// Follow the daemon log.
    Attach {
        /// How many history lines to show first.
        count: Option<usize>,
        /// Skip history, stream only new lines.
        #[arg(long)]
        no_history: bool,
    },
    /// Show context/sensor status.
    Context {
        /// Limit the number of recent readings shown.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Daemon process control.
    #[command(subcommand)]
    Daemon(DaemonCommand),
}

#[derive(Subcommand)]
enum CompanionCommand {
    /// Show companion status for all tunnels.
    Status,
    /// Start one companion.
    Start { alias: String, name: String },
    /// Stop one companion.
    Stop { alias: String, name: String },
    /// Restart one companion in place.
    Restart { alias: String, name: String },
    /// Attach to a companion's output.
    Attach {
        alias: String,
        name: String,
        /// How many history lines to show first.
        #[arg(long)]
        lines: Option<usize>,
        /// Skip history, stream only new lines.
        #[arg(long)]
        no_history: bool,
    },
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Start the daemon in the background.
    Start,
    /// Stop a running daemon.
    Stop,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_dir = cli.config_dir.unwrap_or_else(overseer_daemon::env::config_dir);

    let line = match cli.command {
        Command::Status => "STATUS".to_string(),
        Command::Version => "VERSION".to_string(),
        Command::Connect { alias, tag } => match tag {
            Some(tag) => format!("SSH_CONNECT {alias} {tag}"),
            None => format!("SSH_CONNECT {alias}"),
        },
        Command::Disconnect { alias } => format!("SSH_DISCONNECT {alias}"),
        Command::DisconnectAll => "SSH_DISCONNECT_ALL".to_string(),
        Command::Reconnect { alias } => format!("SSH_RECONNECT {alias}"),
        Command::Reset => "RESET".to_string(),
        Command::Companion(companion) => match companion {
            CompanionCommand::Status => "COMPANION_STATUS".to_string(),
            CompanionCommand::Start { alias, name } => format!("COMPANION_START {alias} {name}"),
            CompanionCommand::Stop { alias, name } => format!("COMPANION_STOP {alias} {name}"),
            CompanionCommand::Restart { alias, name } => {
                format!("COMPANION_RESTART {alias} {name}")
            }
            CompanionCommand::Attach { alias, name, lines, no_history } => {
                let mut line = format!("COMPANION_ATTACH {alias} {name}");
                if let Some(lines) = lines {
                    line.push_str(&format!(" {lines}"));
                }
                if no_history {
                    line.push_str(" no_history");
                }
                line
            }
        },
        Command::Logs { count, no_history } => history_line("LOGS", count, no_history),
        Command::Attach { count, no_history } => history_line("ATTACH", count, no_history),
        Command::Context { limit } => match limit {
            Some(limit) => format!("CONTEXT_STATUS {limit}"),
            None => "CONTEXT_STATUS".to_string(),
        },
        Command::Daemon(daemon) => {
            return match daemon {
                DaemonCommand::Start => daemon_ctl::start(&config_dir),
                DaemonCommand::Stop => daemon_ctl::stop(&config_dir),
            };
        }
    };

    match client::run(&config_dir, &line).await {
        Ok(any_error) => {
            if any_error {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("overseer: {e}");
            ExitCode::from(2)
        }
    }
}

fn history_line(verb: &str, count: Option<usize>, no_history: bool) -> String {
    let mut line = verb.to_string();
    if let Some(count) = count {
        line.push_str(&format!(" {count}"));
    }
    if no_history {
        line.push_str(" no_history");
    }
    line
}
