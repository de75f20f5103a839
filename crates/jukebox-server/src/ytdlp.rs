//! `yt-dlp` backed [`SourceResolver`].
//!
//! Every call shells out to `yt-dlp -J` and reads the JSON dump. Search
//! terms fall back to a YouTube search; Spotify links are mirrored by
//! searching YouTube for their artist and title.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use jukebox_session::{
    Collection, PlayableRef, RefKind, ResolveError, ResolvedTrack, SourceResolver,
};

const AUDIO_FORMAT: &str = "bestaudio[ext=opus]/bestaudio[ext=m4a]/worstaudio/bestaudio";
const SPOTIFY_PREFIXES: [&str; 3] = ["track/", "album/", "playlist/"];

/// Subset of the `yt-dlp -J` dump the resolver reads.
#[derive(Debug, Default, Deserialize)]
struct YtInfo {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    artist: Option<String>,
    uploader: Option<String>,
    /// Present for searches and playlists; flat entries may be null.
    entries: Option<Vec<Option<YtInfo>>>,
}

impl YtInfo {
    /// Searches wrap the hit in `entries`; take the first one.
    fn into_first(self) -> Option<YtInfo> {
        match self.entries {
            Some(entries) => entries.into_iter().flatten().next(),
            None => Some(self),
        }
    }

    /// Page link for a playlist entry, falling back to the video id.
    fn entry_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| self.webpage_url.clone())
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={id}"))
            })
    }

    /// `artist title` when an artist is known, else the title.
    fn search_query(&self) -> Option<String> {
        let title = self.title.as_deref().filter(|t| !t.is_empty())?;
        let artist = self
            .artist
            .as_deref()
            .or(self.uploader.as_deref())
            .filter(|a| !a.is_empty());
        Some(match artist {
            Some(artist) => format!("{artist} {title}"),
            None => title.to_string(),
        })
    }
}

pub struct YtDlpResolver {
    binary: PathBuf,
}

impl YtDlpResolver {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    async fn dump(&self, target: &str, extra: &[&str]) -> Result<YtInfo, ResolveError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-J")
            .arg("--quiet")
            .arg("--no-warnings")
            .args(extra)
            .arg("--")
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|err| ResolveError::Network(format!("spawn yt-dlp: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(target = %target, stderr = %stderr.trim(), "yt-dlp failed");
            return Err(classify_failure(target, &stderr));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|err| ResolveError::Network(format!("unreadable yt-dlp output: {err}")))
    }

    /// Resolve a direct link or search term to a stream.
    async fn resolve_direct(&self, target: &str) -> Result<ResolvedTrack, ResolveError> {
        let info = self
            .dump(
                target,
                &["--no-playlist", "-f", AUDIO_FORMAT, "--default-search", "ytsearch"],
            )
            .await?
            .into_first()
            .ok_or_else(|| ResolveError::NotFound(target.to_string()))?;
        let stream_url = info
            .url
            .clone()
            .ok_or_else(|| ResolveError::NotFound(target.to_string()))?;
        let title = info.title.unwrap_or_else(|| target.to_string());
        Ok(ResolvedTrack::new(title, stream_url))
    }

    /// Find a YouTube page for a Spotify link.
    async fn mirror_spotify(&self, link: &str) -> Result<String, ResolveError> {
        let query = match self.dump(link, &["--no-playlist"]).await {
            Ok(info) => info
                .into_first()
                .and_then(|info| info.search_query())
                .ok_or_else(|| ResolveError::NotFound(link.to_string()))?,
            Err(err) if link.contains("track/") => {
                tracing::debug!(link = %link, error = %err, "spotify metadata unavailable; searching link");
                link.to_string()
            }
            Err(err) => return Err(err),
        };
        tracing::info!(link = %link, query = %query, "mirroring spotify link");
        let hit = self
            .dump(&format!("ytsearch1:{query}"), &["--flat-playlist"])
            .await?
            .into_first()
            .ok_or_else(|| ResolveError::NotFound(query.clone()))?;
        hit.webpage_url
            .clone()
            .or_else(|| hit.entry_url())
            .ok_or(ResolveError::NotFound(query))
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    fn classify(&self, reference: &PlayableRef) -> RefKind {
        if is_youtube_playlist(reference.as_str()) {
            RefKind::Collection
        } else {
            RefKind::Single
        }
    }

    async fn resolve(&self, reference: &PlayableRef) -> Result<ResolvedTrack, ResolveError> {
        let target = reference.as_str().trim();
        if target.is_empty() {
            return Err(ResolveError::NotFound(String::new()));
        }
        if is_spotify_url(target) {
            let page = self.mirror_spotify(target).await?;
            return self.resolve_direct(&page).await;
        }
        self.resolve_direct(target).await
    }

    async fn expand(&self, reference: &PlayableRef) -> Result<Collection, ResolveError> {
        let target = reference.as_str().trim();
        let info = self
            .dump(target, &["--flat-playlist", "--yes-playlist"])
            .await?;
        let label = info
            .title
            .clone()
            .unwrap_or_else(|| "Unknown Playlist".to_string());
        let entries = info
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.entry_url())
            .map(PlayableRef::new)
            .collect();
        Ok(Collection { label, entries })
    }
}

/// A YouTube playlist link that does not point at a single video.
pub fn is_youtube_playlist(url: &str) -> bool {
    if !url.contains("list=") || !url.contains("youtube.com") {
        return false;
    }
    if url.contains("v=") || url.contains("/watch?") {
        return false;
    }
    url.contains("/playlist?")
}

/// Spotify track, album, or playlist link.
pub fn is_spotify_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    let Some(path) = rest.and_then(|r| r.strip_prefix("open.spotify.com/")) else {
        return false;
    };
    SPOTIFY_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn classify_failure(target: &str, stderr: &str) -> ResolveError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("unsupported url") {
        ResolveError::Unsupported(target.to_string())
    } else if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("no video formats")
        || lower.contains("does not exist")
        || lower.contains("http error 404")
    {
        ResolveError::NotFound(target.to_string())
    } else {
        let line = stderr.lines().last().unwrap_or("yt-dlp failed").trim();
        ResolveError::Network(line.to_string())
    }
}
