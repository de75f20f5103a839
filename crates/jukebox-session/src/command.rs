//! Front-end command contract.
//!
//! Maps the closed set of user commands onto orchestrator operations and
//! returns plain result values; rendering is left to the front-end.

use jukebox_types::SessionSnapshot;

use crate::error::{PlaybackError, Result, ValidationError};
use crate::orchestrator::{EnqueueOutcome, PlaybackOrchestrator};
use crate::reference::{GroupId, PlayableRef};
use crate::registry::SessionRegistry;
use crate::resolver::RefKind;

/// Queue entries included in a queue listing.
pub const QUEUE_PREVIEW_LIMIT: usize = 20;

/// Commands a front-end can issue for a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start or enqueue a track; collections are expanded.
    Play(PlayableRef),
    /// Interrupt the current track and play this one.
    PlayNow(PlayableRef),
    Skip,
    Pause,
    Resume,
    Stop,
    Previous,
    ToggleLoop,
    /// Volume as a percentage.
    Volume(i64),
    Queue,
    Status,
    Leave,
}

/// Outcome of a successfully dispatched command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Started { title: String },
    Queued { position: usize },
    CollectionQueued {
        label: String,
        queued: usize,
        truncated: bool,
        dropped: usize,
        started: Option<String>,
    },
    PlayingNow { title: String },
    Skipped,
    Paused,
    Resumed,
    Stopped,
    Previous { reference: String },
    Loop { enabled: bool },
    Volume { percent: u8 },
    Queue { entries: Vec<String>, remaining: usize },
    Status(SessionSnapshot),
    Left,
}

impl CommandReply {
    /// Short human-readable summary of the reply.
    pub fn message(&self) -> String {
        match self {
            CommandReply::Started { title } => format!("Started playing: {title}"),
            CommandReply::Queued { position } => format!("Added to queue! Position: {position}"),
            CommandReply::CollectionQueued {
                label,
                queued,
                truncated,
                dropped,
                ..
            } => {
                if *truncated {
                    format!(
                        "Added {queued} songs from playlist: {label} ({dropped} more skipped, max {})",
                        crate::queue::MAX_COLLECTION_ITEMS
                    )
                } else {
                    format!("Added {queued} songs from playlist: {label}")
                }
            }
            CommandReply::PlayingNow { title } => format!("Started playing immediately: {title}"),
            CommandReply::Skipped => "Skipped".to_string(),
            CommandReply::Paused => "Paused".to_string(),
            CommandReply::Resumed => "Resumed".to_string(),
            CommandReply::Stopped => "Stopped and cleared queue".to_string(),
            CommandReply::Previous { .. } => "Playing previous song...".to_string(),
            CommandReply::Loop { enabled } => {
                format!("Loop: {}", if *enabled { "On" } else { "Off" })
            }
            CommandReply::Volume { percent } => format!("Volume set to {percent}%"),
            CommandReply::Queue { entries, remaining } => {
                if entries.is_empty() {
                    return "The queue is empty!".to_string();
                }
                let mut out = String::from("Current Queue:");
                for (i, entry) in entries.iter().enumerate() {
                    out.push_str(&format!("\n{}. {entry}", i + 1));
                }
                if *remaining > 0 {
                    out.push_str(&format!("\n...and {remaining} more"));
                }
                out
            }
            CommandReply::Status(snapshot) => {
                let state = format!("{:?}", snapshot.state).to_lowercase();
                match snapshot.now_playing.as_deref() {
                    Some(title) => format!(
                        "{state}: {title} (queue {}, loop {})",
                        snapshot.queue.len(),
                        if snapshot.loop_current { "on" } else { "off" }
                    ),
                    None => format!("{state} (queue {})", snapshot.queue.len()),
                }
            }
            CommandReply::Left => "Disconnected".to_string(),
        }
    }
}

/// Run `command` against the session of `group`.
///
/// Every command except `Leave` creates the session on first use.
pub async fn dispatch(
    registry: &SessionRegistry,
    group: &GroupId,
    command: Command,
) -> Result<CommandReply> {
    if command == Command::Leave {
        return leave(registry, group).await;
    }
    let orchestrator = registry.get_or_create(group);
    tracing::debug!(group = %group, command = ?command, "dispatching command");
    run(&orchestrator, command).await
}

async fn leave(registry: &SessionRegistry, group: &GroupId) -> Result<CommandReply> {
    let connected = match registry.get(group) {
        Some(orchestrator) => orchestrator.is_connected().await,
        None => false,
    };
    if !connected {
        return Err(ValidationError::NotConnected.into());
    }
    registry.remove(group).await;
    Ok(CommandReply::Left)
}

async fn run(orchestrator: &PlaybackOrchestrator, command: Command) -> Result<CommandReply> {
    let reply = match command {
        Command::Play(reference) => match orchestrator.classify(&reference) {
            RefKind::Collection => {
                let outcome = orchestrator.enqueue_collection(reference).await?;
                CommandReply::CollectionQueued {
                    label: outcome.label,
                    queued: outcome.queued,
                    truncated: outcome.truncated,
                    dropped: outcome.dropped,
                    started: outcome.started,
                }
            }
            RefKind::Single => match orchestrator.enqueue(reference).await? {
                EnqueueOutcome::Started { title } => CommandReply::Started { title },
                EnqueueOutcome::Queued { position } => CommandReply::Queued { position },
            },
        },
        Command::PlayNow(reference) => CommandReply::PlayingNow {
            title: orchestrator.play_now(reference).await?,
        },
        Command::Skip => {
            orchestrator.skip().await?;
            CommandReply::Skipped
        }
        Command::Pause => {
            orchestrator.pause().await?;
            CommandReply::Paused
        }
        Command::Resume => {
            orchestrator.resume().await?;
            CommandReply::Resumed
        }
        Command::Stop => {
            orchestrator.stop().await?;
            CommandReply::Stopped
        }
        Command::Previous => CommandReply::Previous {
            reference: orchestrator.previous().await?.into_string(),
        },
        Command::ToggleLoop => CommandReply::Loop {
            enabled: orchestrator.toggle_loop().await,
        },
        Command::Volume(percent) => {
            let volume = orchestrator.set_volume(percent).await?;
            CommandReply::Volume {
                percent: (volume * 100.0).round() as u8,
            }
        }
        Command::Queue => {
            let snapshot = orchestrator.snapshot().await;
            let remaining = snapshot.queue.len().saturating_sub(QUEUE_PREVIEW_LIMIT);
            let entries = snapshot.queue.into_iter().take(QUEUE_PREVIEW_LIMIT).collect();
            CommandReply::Queue { entries, remaining }
        }
        Command::Status => CommandReply::Status(orchestrator.snapshot().await),
        Command::Leave => return Err(PlaybackError::Validation(ValidationError::NotConnected)),
    };
    Ok(reply)
}
