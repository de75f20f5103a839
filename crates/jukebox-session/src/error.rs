//! Error types for session commands and their external collaborators.

use thiserror::Error;

use jukebox_types::ErrorKind;

/// Failures reported by a [`SourceResolver`](crate::SourceResolver).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("nothing found for {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unsupported reference: {0}")]
    Unsupported(String),

    #[error("resolution timed out after {0} ms")]
    Timeout(u64),
}

/// Failures reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport offline")]
    Offline,

    #[error("failed to start playback: {0}")]
    Start(String),

    #[error("transport control failed: {0}")]
    Control(String),
}

/// Requests rejected before any state change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("volume must be between 0 and 100, got {0}")]
    VolumeOutOfRange(i64),

    #[error("not connected to an audio sink")]
    NotConnected,
}

/// Errors returned by orchestrator commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("nothing is playing")]
    NothingPlaying,

    #[error("nothing is paused")]
    NothingPaused,

    #[error("no previous track")]
    NoPreviousTrack,

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PlaybackError {
    /// Classification used when the error is published as an event.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybackError::Resolution(_) => ErrorKind::Resolution,
            PlaybackError::Transport(_) => ErrorKind::Transport,
            _ => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
