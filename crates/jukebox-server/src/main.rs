mod cli;
mod config;
mod connection;
mod ffmpeg_transport;
mod preflight;
mod protocol;
mod ytdlp;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jukebox_session::{EventBus, OrchestratorSettings, SessionRegistry};

use crate::cli::Args;
use crate::config::ServerConfig;
use crate::connection::ServerContext;
use crate::ytdlp::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,jukebox_server=info,jukebox_session=info")
        }))
        .init();

    let cfg = ServerConfig::discover(args.config.as_deref())?;
    let bind = match args.bind {
        Some(addr) => addr,
        None => config::bind_from_config(&cfg)?,
    };
    let token = args.token.or_else(|| config::token_from_config(&cfg));
    let checks = preflight::check(
        token,
        cfg.ffmpeg_path.as_deref(),
        cfg.ytdlp_path.as_deref(),
    )?;

    let settings = OrchestratorSettings {
        default_volume: config::default_volume_from_config(&cfg)?,
        resolve_timeout: config::resolve_timeout_from_config(&cfg),
    };
    let sink_dir = args.sink_dir.or_else(|| config::sink_dir_from_config(&cfg));
    if let Some(dir) = sink_dir.as_ref() {
        std::fs::create_dir_all(dir).with_context(|| format!("create sink dir {:?}", dir))?;
    }
    tracing::info!(
        bind = %bind,
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("GIT_SHA"),
        default_volume = settings.default_volume,
        resolve_timeout_ms = settings.resolve_timeout.as_millis() as u64,
        sink_dir = ?sink_dir,
        "starting jukebox-server"
    );

    let registry = SessionRegistry::new(
        Arc::new(YtDlpResolver::new(checks.ytdlp.clone())),
        EventBus::new(),
        settings,
    );
    let ctx = Arc::new(ServerContext {
        registry,
        token: checks.token,
        ffmpeg: checks.ffmpeg,
        sink_dir,
        runtime: Handle::current(),
    });

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        shutdown.cancel();
    })
    .context("install ctrl-c handler")?;

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    connection::serve(listener, ctx.clone(), cancel).await;

    ctx.registry.shutdown().await;
    tracing::info!("all sessions closed");
    Ok(())
}
