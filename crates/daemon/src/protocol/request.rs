// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line requests from the client.

use thiserror::Error;

/// Errors from parsing a request line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    UnknownVerb(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// A parsed request. Verbs are the exhaustive IPC surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Version,
    SshConnect { alias: String, tag: Option<String> },
    SshDisconnect { alias: String },
    SshDisconnectAll,
    SshReconnect { alias: String },
    Reset,
    Askpass { alias: String, token: String },
    CompanionStatus,
    CompanionInit { alias: String, name: String, token: String },
    CompanionStart { alias: String, name: String },
    CompanionStop { alias: String, name: String },
    CompanionRestart { alias: String, name: String },
    CompanionAttach { alias: String, name: String, history_lines: Option<usize>, history: bool },
    Logs { count: Option<usize>, history: bool },
    Attach { count: Option<usize>, history: bool },
    ContextStatus { limit: Option<usize> },
}

impl Command {
    /// Parse a whitespace-split command line.
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(RequestError::Empty)?;
        let args: Vec<&str> = parts.collect();

        match verb {
            "STATUS" => Ok(Command::Status),
            "VERSION" => Ok(Command::Version),
            "SSH_CONNECT" => match args.as_slice() {
                [alias] => Ok(Command::SshConnect { alias: alias.to_string(), tag: None }),
                [alias, tag] => Ok(Command::SshConnect {
                    alias: alias.to_string(),
                    tag: Some(tag.to_string()),
                }),
                _ => Err(RequestError::Usage("SSH_CONNECT <alias> [tag]")),
            },
            "SSH_DISCONNECT" => match args.as_slice() {
                [alias] => Ok(Command::SshDisconnect { alias: alias.to_string() }),
                _ => Err(RequestError::Usage("SSH_DISCONNECT <alias>")),
            },
            "SSH_DISCONNECT_ALL" => Ok(Command::SshDisconnectAll),
            "SSH_RECONNECT" => match args.as_slice() {
                [alias] => Ok(Command::SshReconnect { alias: alias.to_string() }),
                _ => Err(RequestError::Usage("SSH_RECONNECT <alias>")),
            },
            "RESET" => Ok(Command::Reset),
            "ASKPASS" => match args.as_slice() {
                [alias, token] => Ok(Command::Askpass {
                    alias: alias.to_string(),
                    token: token.to_string(),
                }),
                _ => Err(RequestError::Usage("ASKPASS <alias> <token>")),
            },
            "COMPANION_STATUS" => Ok(Command::CompanionStatus),
            "COMPANION_INIT" => match args.as_slice() {
                [alias, name, token] => Ok(Command::CompanionInit {
                    alias: alias.to_string(),
                    name: name.to_string(),
                    token: token.to_string(),
                }),
                _ => Err(RequestError::Usage("COMPANION_INIT <alias> <name> <token>")),
            },
            "COMPANION_START" | "COMPANION_STOP" | "COMPANION_RESTART" => {
                let (alias, name) = match args.as_slice() {
                    [alias, name] => (alias.to_string(), name.to_string()),
                    _ => {
                        return Err(RequestError::Usage(match verb {
                            "COMPANION_START" => "COMPANION_START <alias> <name>",
                            "COMPANION_STOP" => "COMPANION_STOP <alias> <name>",
                            _ => "COMPANION_RESTART <alias> <name>",
                        }))
                    }
                };
                Ok(match verb {
                    "COMPANION_START" => Command::CompanionStart { alias, name },
                    "COMPANION_STOP" => Command::CompanionStop { alias, name },
                    _ => Command::CompanionRestart { alias, name },
                })
            }
            "COMPANION_ATTACH" => match args.as_slice() {
                [alias, name, rest @ ..] => {
                    let (history_lines, history) = parse_history_args(rest)?;
                    Ok(Command::CompanionAttach {
                        alias: alias.to_string(),
                        name: name.to_string(),
                        history_lines,
                        history,
                    })
                }
                _ => Err(RequestError::Usage(
                    "COMPANION_ATTACH <alias> <name> [history-lines] [no_history]",
                )),
            },
            "LOGS" => {
                let (count, history) = parse_history_args(&args)?;
                Ok(Command::Logs { count, history })
            }
            "ATTACH" => {
                let (count, history) = parse_history_args(&args)?;
                Ok(Command::Attach { count, history })
            }
            "CONTEXT_STATUS" => match args.as_slice() {
                [] => Ok(Command::ContextStatus { limit: None }),
                [limit] => match limit.parse() {
                    Ok(limit) => Ok(Command::ContextStatus { limit: Some(limit) }),
                    Err(_) => Err(RequestError::Usage("CONTEXT_STATUS [limit]")),
                },
                _ => Err(RequestError::Usage("CONTEXT_STATUS [limit]")),
            },
            other => Err(RequestError::UnknownVerb(other.to_string())),
        }
    }
}

/// `[count]` and/or the literal `no_history`, in either order.
fn parse_history_args(args: &[&str]) -> Result<(Option<usize>, bool), RequestError> {
    let mut count = None;
    let mut history = true;
    for arg in args {
        if *arg == "no_history" {
            history = false;
        } else if let Ok(n) = arg.parse() {
            count = Some(n);
        } else {
            return Err(RequestError::Usage("[count | no_history]"));
        }
    }
    Ok((count, history))
}

/// Copy of the request line safe for the daemon's own log stream: token
/// arguments of ASKPASS and COMPANION_INIT are replaced with `****`.
pub fn masked(line: &str) -> String {
    let mut parts: Vec<&str> = line.split_whitespace().collect();
    let mask_at = match parts.first() {
        Some(&"ASKPASS") => Some(2),
        Some(&"COMPANION_INIT") => Some(3),
        _ => None,
    };
    if let Some(idx) = mask_at {
        if parts.len() > idx {
            parts[idx] = "****";
        }
    }
    parts.join(" ")
}
