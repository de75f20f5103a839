//! Startup checks: required binaries and the access credential.
//!
//! Anything missing here is fatal; the process exits with a diagnostic
//! before binding the control socket.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Everything the server needs from the host before it can start.
#[derive(Debug, Clone)]
pub struct Preflight {
    pub ffmpeg: PathBuf,
    pub ytdlp: PathBuf,
    pub token: String,
}

/// Locate the binaries and validate the credential.
pub fn check(
    token: Option<String>,
    ffmpeg_override: Option<&str>,
    ytdlp_override: Option<&str>,
) -> Result<Preflight> {
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        bail!("no access token configured; pass --token, set JUKEBOX_TOKEN, or add `token` to the config file");
    };

    let dirs = search_dirs();
    let Some(ffmpeg) = locate("ffmpeg", ffmpeg_override, &dirs) else {
        bail!(
            "ffmpeg not found in PATH or the working directory; install it or set `ffmpeg_path` in the config file"
        );
    };
    let Some(ytdlp) = locate("yt-dlp", ytdlp_override, &dirs) else {
        bail!(
            "yt-dlp not found in PATH or the working directory; install it or set `ytdlp_path` in the config file"
        );
    };

    tracing::info!(ffmpeg = %ffmpeg.display(), ytdlp = %ytdlp.display(), "preflight ok");
    Ok(Preflight {
        ffmpeg,
        ytdlp,
        token: token.trim().to_string(),
    })
}

/// PATH entries followed by the working directory.
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    dirs
}

/// An explicit override wins when it exists; otherwise search `dirs` in order.
fn locate(name: &str, explicit: Option<&str>, dirs: &[PathBuf]) -> Option<PathBuf> {
    if let Some(path) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        return path.is_file().then_some(path);
    }
    dirs.iter().find_map(|dir| candidate_in(dir, name))
}

fn candidate_in(dir: &Path, name: &str) -> Option<PathBuf> {
    [name.to_string(), format!("{name}.exe")]
        .into_iter()
        .map(|file| dir.join(file))
        .find(|path| path.is_file())
}
