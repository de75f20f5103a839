//! `ffmpeg` backed [`Transport`].
//!
//! Each play invocation spawns one ffmpeg child that converts the stream to
//! 48 kHz stereo `s16le` PCM in real time. A pump task applies the session
//! volume to the samples and appends them to the group's sink file (or
//! discards them), then reports how the invocation ended exactly once.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use jukebox_session::{
    CompletionNotifier, GroupId, PlaybackEndReason, ResolvedTrack, Transport, TransportError,
};

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u32 = 2;
/// 20 ms of stereo s16le audio.
const CHUNK_BYTES: usize = (SAMPLE_RATE / 50 * CHANNELS * 2) as usize;

/// Control handles of the invocation currently delivering audio.
struct LivePlayback {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

pub struct FfmpegTransport {
    group: GroupId,
    ffmpeg: PathBuf,
    sink: Option<PathBuf>,
    volume_percent: Arc<AtomicU8>,
    runtime: Handle,
    live: Mutex<Option<LivePlayback>>,
}

impl FfmpegTransport {
    /// `sink_dir`, when set, receives `<group>.pcm`.
    pub fn new(
        group: GroupId,
        ffmpeg: PathBuf,
        sink_dir: Option<PathBuf>,
        runtime: Handle,
    ) -> Self {
        let sink = sink_dir.map(|dir| dir.join(format!("{}.pcm", sink_file_stem(&group))));
        Self {
            group,
            ffmpeg,
            sink,
            volume_percent: Arc::new(AtomicU8::new(50)),
            runtime,
            live: Mutex::new(None),
        }
    }

    fn spawn_ffmpeg(&self, stream_url: &str) -> Result<Child, TransportError> {
        let _guard = self.runtime.enter();
        Command::new(&self.ffmpeg)
            .args(ffmpeg_args(stream_url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| TransportError::Start(format!("spawn ffmpeg: {err}")))
    }

    fn with_live<T>(
        &self,
        f: impl FnOnce(&LivePlayback) -> T,
    ) -> Result<T, TransportError> {
        let live = self.live.lock().unwrap_or_else(|err| err.into_inner());
        match live.as_ref() {
            Some(playback) if !playback.cancel.is_cancelled() => Ok(f(playback)),
            _ => Err(TransportError::Control("nothing is playing".to_string())),
        }
    }
}

impl Transport for FfmpegTransport {
    fn start(
        &self,
        track: ResolvedTrack,
        on_complete: CompletionNotifier,
    ) -> Result<(), TransportError> {
        let mut child = self.spawn_ffmpeg(&track.stream_url)?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(TransportError::Start("ffmpeg pipes unavailable".to_string()));
        };

        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);
        let previous = self
            .live
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .replace(LivePlayback {
                cancel: cancel.clone(),
                paused: paused_tx,
            });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        tracing::info!(
            group = %self.group,
            generation = on_complete.generation(),
            title = %track.title,
            "ffmpeg started"
        );
        let pump = Pump {
            group: self.group.clone(),
            sink: self.sink.clone(),
            volume_percent: self.volume_percent.clone(),
            cancel,
            paused: paused_rx,
        };
        self.runtime.spawn(log_stderr(self.group.clone(), stderr));
        self.runtime.spawn(pump.run(child, stdout, on_complete));
        Ok(())
    }

    fn stop(&self) -> Result<(), TransportError> {
        if let Some(live) = self
            .live
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take()
        {
            live.cancel.cancel();
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), TransportError> {
        self.with_live(|live| live.paused.send_replace(true))?;
        Ok(())
    }

    fn resume(&self) -> Result<(), TransportError> {
        self.with_live(|live| live.paused.send_replace(false))?;
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<(), TransportError> {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.volume_percent.store(percent, Ordering::Relaxed);
        Ok(())
    }
}

/// Moves PCM from one ffmpeg child to the sink.
struct Pump {
    group: GroupId,
    sink: Option<PathBuf>,
    volume_percent: Arc<AtomicU8>,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
}

impl Pump {
    async fn run(mut self, mut child: Child, stdout: ChildStdout, on_complete: CompletionNotifier) {
        let reason = self.deliver(stdout).await;
        let reason = match reason {
            PlaybackEndReason::Stopped => {
                if let Err(err) = child.kill().await {
                    tracing::debug!(group = %self.group, error = %err, "ffmpeg kill failed");
                }
                PlaybackEndReason::Stopped
            }
            other => match child.wait().await {
                Ok(status) if status.success() => other,
                Ok(status) => {
                    tracing::warn!(group = %self.group, status = %status, "ffmpeg exited with failure");
                    PlaybackEndReason::Error
                }
                Err(err) => {
                    tracing::warn!(group = %self.group, error = %err, "ffmpeg wait failed");
                    PlaybackEndReason::Error
                }
            },
        };
        tracing::debug!(group = %self.group, reason = ?reason, "playback ended");
        on_complete.notify(reason);
    }

    async fn deliver(&mut self, stdout: ChildStdout) -> PlaybackEndReason {
        let mut sink = self.open_sink().await;
        let mut reader = BufReader::new(stdout);
        let mut chunk = vec![0u8; CHUNK_BYTES];
        loop {
            if !self.wait_unpaused().await {
                return PlaybackEndReason::Stopped;
            }
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return PlaybackEndReason::Stopped,
                read = fill_chunk(&mut reader, &mut chunk) => read,
            };
            let filled = match read {
                Ok(filled) => filled,
                Err(err) => {
                    tracing::warn!(group = %self.group, error = %err, "reading ffmpeg output failed");
                    return PlaybackEndReason::Error;
                }
            };
            if filled == 0 {
                return PlaybackEndReason::Eof;
            }
            let pcm = &mut chunk[..filled];
            apply_gain(pcm, self.volume_percent.load(Ordering::Relaxed));
            if let Some(file) = sink.as_mut() {
                let written = match file.write_all(pcm).await {
                    Ok(()) => file.flush().await,
                    Err(err) => Err(err),
                };
                if let Err(err) = written {
                    tracing::warn!(group = %self.group, error = %err, "sink write failed; discarding audio");
                    sink = None;
                }
            }
            if filled < chunk.len() {
                return PlaybackEndReason::Eof;
            }
        }
    }

    /// Block while paused. Returns `false` when cancelled meanwhile.
    async fn wait_unpaused(&mut self) -> bool {
        while *self.paused.borrow_and_update() {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                changed = self.paused.changed() => {
                    if changed.is_err() {
                        return !self.cancel.is_cancelled();
                    }
                }
            }
        }
        !self.cancel.is_cancelled()
    }

    async fn open_sink(&self) -> Option<tokio::fs::File> {
        let path = self.sink.as_ref()?;
        let opened = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await;
        match opened {
            Ok(file) => Some(file),
            Err(err) => {
                tracing::warn!(
                    group = %self.group,
                    path = %path.display(),
                    error = %err,
                    "cannot open sink; discarding audio"
                );
                None
            }
        }
    }
}

/// Read until `buf` is full or the stream ends. Returns the bytes filled;
/// fewer than `buf.len()` means end of stream.
async fn fill_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

async fn log_stderr(group: GroupId, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(group = %group, line = %line, "ffmpeg");
    }
}

fn ffmpeg_args(stream_url: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-re"]
        .into_iter()
        .map(String::from)
        .collect();
    if stream_url.starts_with("http://") || stream_url.starts_with("https://") {
        args.extend(
            [
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
            ]
            .map(String::from),
        );
    }
    args.extend(["-i".to_string(), stream_url.to_string()]);
    let rate = SAMPLE_RATE.to_string();
    let channels = CHANNELS.to_string();
    args.extend(
        ["-vn", "-f", "s16le", "-ar", rate.as_str(), "-ac", channels.as_str(), "pipe:1"]
            .map(String::from),
    );
    args
}

/// Scale little-endian i16 samples in place by `percent`.
fn apply_gain(pcm: &mut [u8], percent: u8) {
    if percent >= 100 {
        return;
    }
    let gain = i32::from(percent);
    for sample in pcm.chunks_exact_mut(2) {
        let value = i32::from(i16::from_le_bytes([sample[0], sample[1]]));
        let scaled = (value * gain / 100) as i16;
        sample.copy_from_slice(&scaled.to_le_bytes());
    }
}

/// Group ids become file names; keep them to a safe alphabet.
fn sink_file_stem(group: &GroupId) -> String {
    group
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
