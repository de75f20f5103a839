use serde::{Deserialize, Serialize};

/// Reason why a single play invocation ended on the transport side.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of stream.
    Eof,
    /// Source, encoder, or sink error interrupted playback.
    Error,
    /// Playback was explicitly stopped by a command.
    Stopped,
}

/// Playback state of a single session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing is live on the transport.
    #[default]
    Idle,
    /// A play invocation is live and delivering audio.
    Playing,
    /// A play invocation is live but delivery is suspended.
    Paused,
    /// The transport binding has been torn down (left the sink).
    Stopped,
}

impl SessionState {
    /// `true` when the transport holds a live play invocation.
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Playing | SessionState::Paused)
    }
}

/// Coarse error classification carried by [`PlayerEvent::Error`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Resolution,
    Transport,
}

/// Events emitted by a session for the front-end to render.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// A track started. `looped` is set when the same track replays.
    NowPlaying { title: String, looped: bool },
    /// A reference was appended to the queue at 1-based `position`.
    Enqueued { position: usize },
    /// A failure the front-end should surface; playback carries on.
    Error { kind: ErrorKind, detail: String },
    /// The session ran out of work.
    Idle,
}

/// Read-only view of one session, used for status and queue listings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    /// Session instance id (`sess:<uuid>`).
    pub session_id: String,
    /// Group the session belongs to.
    pub group: String,
    pub state: SessionState,
    /// Replay the current track instead of advancing.
    pub loop_current: bool,
    /// Volume in `0.0..=1.0`.
    pub volume: f32,
    /// Title of the live track, if any.
    pub now_playing: Option<String>,
    /// Pending references, head first.
    pub queue: Vec<String>,
    /// Number of started tracks remembered for "previous".
    pub history_len: usize,
    /// `true` when a transport is bound to the session.
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_event_serializes_with_snake_case_tag() {
        let event = PlayerEvent::NowPlaying {
            title: "Song".to_string(),
            looped: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "now_playing");
        assert_eq!(json["title"], "Song");

        let json = serde_json::to_value(PlayerEvent::Error {
            kind: ErrorKind::Resolution,
            detail: "not found".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "resolution");
    }

    #[test]
    fn only_playing_and_paused_are_live() {
        assert!(SessionState::Playing.is_live());
        assert!(SessionState::Paused.is_live());
        assert!(!SessionState::Idle.is_live());
        assert!(!SessionState::Stopped.is_live());
    }
}
