//! Newline-delimited control protocol.
//!
//! Requests are `VERB [argument]` lines; every reply and every pushed event is
//! one JSON object per line.

use anyhow::{Result, anyhow, bail};
use serde::Serialize;

use jukebox_session::{Command, CommandReply, GroupId, PlaybackError, PlayableRef, SessionEvent};
use jukebox_types::{ErrorKind, PlayerEvent, SessionSnapshot};

/// One parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Auth(String),
    Join(GroupId),
    Command(Command),
}

/// Parse a request line. Verbs are case-insensitive; arguments keep their case.
pub fn parse_line(line: &str) -> Result<Request> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    if verb.is_empty() {
        bail!("empty request");
    }

    let request = match verb.to_ascii_uppercase().as_str() {
        "AUTH" => Request::Auth(required(rest, "AUTH <token>")?.to_string()),
        "JOIN" => Request::Join(GroupId::new(required(rest, "JOIN <group>")?)),
        "PLAY" => Request::Command(Command::Play(PlayableRef::new(required(
            rest,
            "PLAY <url or search>",
        )?))),
        "PLAYNOW" => Request::Command(Command::PlayNow(PlayableRef::new(required(
            rest,
            "PLAYNOW <url or search>",
        )?))),
        "VOLUME" => {
            let raw = required(rest, "VOLUME <0-100>")?;
            let percent = raw
                .parse::<i64>()
                .map_err(|_| anyhow!("volume must be a whole number, got {raw}"))?;
            Request::Command(Command::Volume(percent))
        }
        "SKIP" => Request::Command(Command::Skip),
        "PAUSE" => Request::Command(Command::Pause),
        "RESUME" => Request::Command(Command::Resume),
        "STOP" => Request::Command(Command::Stop),
        "PREV" | "PREVIOUS" => Request::Command(Command::Previous),
        "LOOP" => Request::Command(Command::ToggleLoop),
        "QUEUE" => Request::Command(Command::Queue),
        "STATUS" => Request::Command(Command::Status),
        "LEAVE" => Request::Command(Command::Leave),
        other => bail!("unknown command {other}"),
    };
    Ok(request)
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str> {
    if rest.is_empty() {
        bail!("usage: {usage}");
    }
    Ok(rest)
}

/// Reply line for a request.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionSnapshot>,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            kind: None,
            status: None,
        }
    }

    /// Protocol-level rejection (bad syntax, not authenticated, ...).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            kind: Some(ErrorKind::Validation),
            status: None,
        }
    }

    pub fn from_command(reply: CommandReply) -> Self {
        let message = reply.message();
        let status = match reply {
            CommandReply::Status(snapshot) => Some(snapshot),
            _ => None,
        };
        Self {
            ok: true,
            message,
            kind: None,
            status,
        }
    }

    pub fn from_error(err: &PlaybackError) -> Self {
        Self {
            ok: false,
            message: err.to_string(),
            kind: Some(err.kind()),
            status: None,
        }
    }
}

/// Event line pushed to connections joined to the event's group.
#[derive(Debug, Serialize)]
pub struct EventLine<'a> {
    pub group: &'a str,
    #[serde(flatten)]
    pub event: &'a PlayerEvent,
}

impl<'a> EventLine<'a> {
    pub fn new(event: &'a SessionEvent) -> Self {
        Self {
            group: event.group.as_str(),
            event: &event.event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jukebox_session::ValidationError;

    #[test]
    fn parses_verbs_case_insensitively() {
        assert_eq!(parse_line("skip").unwrap(), Request::Command(Command::Skip));
        assert_eq!(
            parse_line("  Loop  ").unwrap(),
            Request::Command(Command::ToggleLoop)
        );
        assert_eq!(parse_line("prev").unwrap(), Request::Command(Command::Previous));
    }

    #[test]
    fn keeps_argument_text() {
        assert_eq!(
            parse_line("PLAY Never Gonna Give You Up").unwrap(),
            Request::Command(Command::Play("Never Gonna Give You Up".into()))
        );
        assert_eq!(
            parse_line("join guild-42").unwrap(),
            Request::Join(GroupId::from("guild-42"))
        );
        assert_eq!(
            parse_line("AUTH s3cr3t").unwrap(),
            Request::Auth("s3cr3t".to_string())
        );
    }

    #[test]
    fn volume_is_parsed_but_not_range_checked() {
        assert_eq!(
            parse_line("VOLUME 150").unwrap(),
            Request::Command(Command::Volume(150))
        );
        assert!(parse_line("VOLUME loud").is_err());
    }

    #[test]
    fn rejects_missing_arguments_and_unknown_verbs() {
        assert!(parse_line("PLAY").is_err());
        assert!(parse_line("JOIN   ").is_err());
        assert!(parse_line("").is_err());
        let err = parse_line("DANCE").unwrap_err();
        assert_eq!(err.to_string(), "unknown command DANCE");
    }

    #[test]
    fn reply_serializes_errors_with_kind() {
        let err = PlaybackError::from(ValidationError::VolumeOutOfRange(150));
        let json = serde_json::to_value(Reply::from_error(&err)).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["kind"], "validation");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn event_line_flattens_event() {
        let event = SessionEvent {
            group: GroupId::from("g"),
            event: PlayerEvent::NowPlaying {
                title: "Song".to_string(),
                looped: true,
            },
        };
        let json = serde_json::to_value(EventLine::new(&event)).unwrap();
        assert_eq!(json["group"], "g");
        assert_eq!(json["event"], "now_playing");
        assert_eq!(json["looped"], true);
    }
}
