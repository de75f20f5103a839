//! TCP front-end: accept loop and per-connection request handling.
//!
//! A connection must authenticate, then join a group. Joining binds an
//! ffmpeg transport to the group's session if it has none and subscribes the
//! connection to that group's events.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use jukebox_session::{
    CommandReply, GroupId, PlaybackError, SessionRegistry, ValidationError, dispatch,
};

use crate::ffmpeg_transport::FfmpegTransport;
use crate::protocol::{EventLine, Reply, Request, parse_line};

/// Shared state handed to every connection.
pub struct ServerContext {
    pub registry: SessionRegistry,
    pub token: String,
    pub ffmpeg: PathBuf,
    pub sink_dir: Option<PathBuf>,
    pub runtime: Handle,
}

/// Accept connections until `cancel` fires.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                let cancel = cancel.child_token();
                tokio::spawn(async move {
                    tracing::info!(peer = %peer, "client connected");
                    if let Err(err) = handle_connection(stream, peer, ctx, cancel).await {
                        tracing::warn!(peer = %peer, error = %err, "connection failed");
                    }
                    tracing::info!(peer = %peer, "client disconnected");
                });
            }
            Err(err) => tracing::warn!(error = %err, "accept failed"),
        }
    }
    tracing::info!("accept loop stopped");
}

/// Per-connection protocol state.
#[derive(Debug, Default)]
struct ClientState {
    authenticated: bool,
    group: Option<GroupId>,
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    cancel: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut events = ctx.registry.events().subscribe();
    let mut state = ClientState::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = handle_line(&ctx, &mut state, &line).await;
                tracing::debug!(peer = %peer, ok = reply.ok, "request handled");
                write_json(&mut writer, &reply).await?;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if state.group.as_ref() == Some(&event.group) {
                        write_json(&mut writer, &EventLine::new(&event)).await?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(peer = %peer, skipped, "client lagging; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn handle_line(ctx: &ServerContext, state: &mut ClientState, line: &str) -> Reply {
    let request = match parse_line(line) {
        Ok(request) => request,
        Err(err) => return Reply::rejected(err.to_string()),
    };

    match request {
        Request::Auth(token) => {
            if token == ctx.token {
                state.authenticated = true;
                Reply::ok("Authenticated")
            } else {
                Reply::rejected("invalid token")
            }
        }
        _ if !state.authenticated => Reply::rejected("authenticate first: AUTH <token>"),
        Request::Join(group) => {
            join(ctx, &group).await;
            let reply = Reply::ok(format!("Joined {group}"));
            state.group = Some(group);
            reply
        }
        Request::Command(command) => {
            let Some(group) = state.group.clone() else {
                return Reply::rejected("join a group first: JOIN <group>");
            };
            // The session may have been left by this or another client.
            if !is_bound(ctx, &group).await {
                state.group = None;
                return Reply::from_error(&PlaybackError::from(ValidationError::NotConnected));
            }
            match dispatch(&ctx.registry, &group, command).await {
                Ok(CommandReply::Left) => {
                    state.group = None;
                    Reply::from_command(CommandReply::Left)
                }
                Ok(reply) => Reply::from_command(reply),
                Err(err) => {
                    tracing::debug!(group = %group, error = %err, "command rejected");
                    Reply::from_error(&err)
                }
            }
        }
    }
}

async fn is_bound(ctx: &ServerContext, group: &GroupId) -> bool {
    match ctx.registry.get(group) {
        Some(orchestrator) => orchestrator.is_connected().await,
        None => false,
    }
}

/// Bind an ffmpeg transport to the group's session unless one is bound.
async fn join(ctx: &ServerContext, group: &GroupId) {
    let orchestrator = ctx.registry.get_or_create(group);
    let transport = FfmpegTransport::new(
        group.clone(),
        ctx.ffmpeg.clone(),
        ctx.sink_dir.clone(),
        ctx.runtime.clone(),
    );
    if !orchestrator.bind_if_unbound(Arc::new(transport)).await {
        tracing::debug!(group = %group, "session already bound; sharing transport");
    }
}

async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jukebox_session::{EventBus, OrchestratorSettings};

    use crate::ytdlp::YtDlpResolver;

    fn context() -> ServerContext {
        ServerContext {
            registry: SessionRegistry::new(
                Arc::new(YtDlpResolver::new(PathBuf::from("yt-dlp"))),
                EventBus::new(),
                OrchestratorSettings::default(),
            ),
            token: "secret".to_string(),
            ffmpeg: PathBuf::from("ffmpeg"),
            sink_dir: None,
            runtime: Handle::current(),
        }
    }

    #[tokio::test]
    async fn commands_require_auth_then_join() {
        let ctx = context();
        let mut state = ClientState::default();

        let reply = handle_line(&ctx, &mut state, "SKIP").await;
        assert!(!reply.ok);
        assert!(reply.message.starts_with("authenticate first"));

        assert!(!handle_line(&ctx, &mut state, "AUTH wrong").await.ok);
        assert!(handle_line(&ctx, &mut state, "AUTH secret").await.ok);

        let reply = handle_line(&ctx, &mut state, "STATUS").await;
        assert_eq!(reply.message, "join a group first: JOIN <group>");
    }

    #[tokio::test]
    async fn join_binds_and_commands_reach_the_session() {
        let ctx = context();
        let mut state = ClientState {
            authenticated: true,
            group: None,
        };

        let reply = handle_line(&ctx, &mut state, "JOIN lounge").await;
        assert_eq!(reply.message, "Joined lounge");
        let group = GroupId::from("lounge");
        assert!(ctx.registry.get(&group).unwrap().is_connected().await);

        let reply = handle_line(&ctx, &mut state, "LOOP").await;
        assert_eq!(reply.message, "Loop: On");

        let reply = handle_line(&ctx, &mut state, "SKIP").await;
        assert!(!reply.ok);
        assert_eq!(reply.message, "nothing is playing");

        let reply = handle_line(&ctx, &mut state, "STATUS").await;
        let status = reply.status.unwrap();
        assert!(status.loop_current);
        assert!(status.connected);

        let reply = handle_line(&ctx, &mut state, "LEAVE").await;
        assert_eq!(reply.message, "Disconnected");
        assert!(ctx.registry.get(&group).is_none());
    }

    #[tokio::test]
    async fn leave_requires_a_new_join_before_playing() {
        let ctx = context();
        let mut state = ClientState {
            authenticated: true,
            group: None,
        };
        handle_line(&ctx, &mut state, "JOIN lounge").await;
        assert_eq!(handle_line(&ctx, &mut state, "LEAVE").await.message, "Disconnected");
        assert!(state.group.is_none());

        let reply = handle_line(&ctx, &mut state, "PLAY some song").await;
        assert!(!reply.ok);
        assert_eq!(reply.message, "join a group first: JOIN <group>");
        assert!(ctx.registry.get(&GroupId::from("lounge")).is_none());
    }

    #[tokio::test]
    async fn other_clients_lose_the_group_when_it_is_left() {
        let ctx = context();
        let mut first = ClientState {
            authenticated: true,
            group: None,
        };
        let mut second = ClientState {
            authenticated: true,
            group: None,
        };
        handle_line(&ctx, &mut first, "JOIN lounge").await;
        handle_line(&ctx, &mut second, "JOIN lounge").await;
        assert!(handle_line(&ctx, &mut first, "LEAVE").await.ok);

        let reply = handle_line(&ctx, &mut second, "PLAY some song").await;
        assert!(!reply.ok);
        assert_eq!(reply.message, "not connected to an audio sink");
        assert!(second.group.is_none());
        assert!(ctx.registry.is_empty());

        assert!(handle_line(&ctx, &mut second, "JOIN lounge").await.ok);
        assert!(ctx.registry.get(&GroupId::from("lounge")).unwrap().is_connected().await);
    }

    #[tokio::test]
    async fn malformed_lines_are_rejected() {
        let ctx = context();
        let mut state = ClientState::default();
        let reply = handle_line(&ctx, &mut state, "VOLUME").await;
        assert!(!reply.ok);
        assert_eq!(reply.message, "usage: VOLUME <0-100>");
    }
}
