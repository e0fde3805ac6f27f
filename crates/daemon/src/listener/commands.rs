// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-attach command handlers.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::protocol::{write_line, Command, Response};

use super::ListenCtx;

pub(super) async fn dispatch<W>(
    command: Command,
    writer: &mut W,
    ctx: &Arc<ListenCtx>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match command {
        Command::Status => {
            let records = ctx.supervisor.records();
            write_line(writer, &Response::info(format!("{} tunnel(s)", records.len()))).await?;
            write_line(writer, &Response::data(ctx.supervisor.status_data())).await
        }

        Command::Version => {
            let version = env!("CARGO_PKG_VERSION");
            write_line(writer, &Response::info(format!("overseerd {version}"))).await?;
            write_line(
                writer,
                &Response::data(serde_json::json!({
                    "version": version,
                    "pid": std::process::id(),
                    "uptime_secs": ctx.start_time.elapsed().as_secs(),
                })),
            )
            .await
        }

        Command::SshConnect { alias, tag } => {
            let supervisor = ctx.supervisor.clone();
            stream_op(writer, ctx, true, move |tx| async move {
                supervisor.start_tunnel(&alias, tag.as_deref(), &tx).await;
            })
            .await
        }

        Command::SshDisconnect { alias } => {
            let supervisor = ctx.supervisor.clone();
            stream_op(writer, ctx, true, move |tx| async move {
                supervisor.stop_tunnel(&alias, false, &tx).await;
            })
            .await
        }

        Command::SshDisconnectAll => {
            let supervisor = ctx.supervisor.clone();
            stream_op(writer, ctx, true, move |tx| async move {
                let aliases: Vec<String> =
                    supervisor.records().into_iter().map(|r| r.alias).collect();
                if aliases.is_empty() {
                    let _ = tx.send(Response::info("No tunnels running")).await;
                }
                for alias in aliases {
                    supervisor.stop_tunnel(&alias, false, &tx).await;
                }
            })
            .await
        }

        Command::SshReconnect { alias } => {
            let supervisor = ctx.supervisor.clone();
            stream_op(writer, ctx, true, move |tx| async move {
                if supervisor.stop_tunnel(&alias, true, &tx).await {
                    supervisor.start_tunnel(&alias, None, &tx).await;
                }
            })
            .await
        }

        Command::Reset => {
            ctx.supervisor.reset_retries();
            write_line(writer, &Response::info("Retry counters reset")).await
        }

        Command::Askpass { alias, token } => {
            if ctx.tokens.tunnel_token_matches(&token, &alias) {
                match ctx.credentials.lookup(&alias) {
                    Some(secret) => write_line(writer, &Response::info(secret)).await,
                    None => {
                        write_line(writer, &Response::error("no credential stored")).await
                    }
                }
            } else {
                write_line(writer, &Response::error("invalid askpass token")).await
            }
        }

        Command::CompanionInit { alias, name, token } => {
            if ctx.tokens.consume_companion(&token, &alias) {
                write_line(writer, &Response::info(format!("companion {name} registered"))).await
            } else {
                write_line(writer, &Response::error("invalid companion token")).await
            }
        }

        Command::CompanionStatus => {
            write_line(writer, &Response::data(ctx.companions.status_data())).await
        }

        Command::CompanionStart { alias, name } => {
            let companions = Arc::clone(&ctx.companions);
            stream_op(writer, ctx, true, move |tx| async move {
                companions.start_single(&alias, &name, &tx).await;
            })
            .await
        }

        Command::CompanionStop { alias, name } => {
            let companions = Arc::clone(&ctx.companions);
            stream_op(writer, ctx, true, move |tx| async move {
                companions.stop_single(&alias, &name, &tx).await;
            })
            .await
        }

        Command::CompanionRestart { alias, name } => {
            let companions = Arc::clone(&ctx.companions);
            stream_op(writer, ctx, true, move |tx| async move {
                companions.restart_single(&alias, &name, &tx).await;
            })
            .await
        }

        Command::ContextStatus { limit } => {
            write_line(writer, &Response::data(ctx.context.status_data(limit))).await
        }

        // Attach verbs are routed before dispatch.
        Command::Logs { .. } | Command::Attach { .. } | Command::CompanionAttach { .. } => {
            write_line(writer, &Response::error("internal routing error")).await
        }
    }
}

/// Run a long operation on its own task, forwarding its progress messages
/// to the connection as they arrive. Mutating operations persist state
/// afterwards.
async fn stream_op<W, F, Fut>(
    writer: &mut W,
    ctx: &Arc<ListenCtx>,
    mutates: bool,
    op: F,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    F: FnOnce(mpsc::Sender<Response>) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(64);
    let task = tokio::spawn(op(tx));
    while let Some(response) = rx.recv().await {
        write_line(writer, &response).await?;
    }
    let _ = task.await;
    if mutates {
        ctx.save_state();
    }
    Ok(())
}
