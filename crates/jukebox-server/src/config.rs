//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_BIND: &str = "127.0.0.1:7878";
const DEFAULT_VOLUME_PERCENT: u8 = 50;
const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 30_000;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Control protocol bind address (host:port).
    pub bind: Option<String>,
    /// Access credential required from clients.
    pub token: Option<String>,
    /// Explicit ffmpeg binary path.
    pub ffmpeg_path: Option<String>,
    /// Explicit yt-dlp binary path.
    pub ytdlp_path: Option<String>,
    /// Volume for new sessions, in percent.
    pub default_volume: Option<u8>,
    /// Upper bound on one resolve call, in milliseconds.
    pub resolve_timeout_ms: Option<u64>,
    /// Directory that receives raw PCM per group.
    pub sink_dir: Option<String>,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Load `path` if given, else `config.toml` next to the executable, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let auto_path = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")));
        match auto_path {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                tracing::info!("no config file found; using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Bind address from config, falling back to loopback.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<SocketAddr> {
    let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
    bind.parse().with_context(|| format!("parse bind {bind}"))
}

/// Non-empty credential from config.
pub fn token_from_config(cfg: &ServerConfig) -> Option<String> {
    non_empty(cfg.token.as_deref()).map(str::to_string)
}

/// Default session volume as a gain in `0.0..=1.0`.
pub fn default_volume_from_config(cfg: &ServerConfig) -> Result<f32> {
    let percent = cfg.default_volume.unwrap_or(DEFAULT_VOLUME_PERCENT);
    if percent > 100 {
        anyhow::bail!("default_volume must be 0..=100, got {percent}");
    }
    Ok(f32::from(percent) / 100.0)
}

pub fn resolve_timeout_from_config(cfg: &ServerConfig) -> Duration {
    Duration::from_millis(
        cfg.resolve_timeout_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_RESOLVE_TIMEOUT_MS),
    )
}

pub fn sink_dir_from_config(cfg: &ServerConfig) -> Option<PathBuf> {
    non_empty(cfg.sink_dir.as_deref()).map(PathBuf::from)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
