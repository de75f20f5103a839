//! Session-scoped playback orchestration.
//!
//! Each group (a chat room, a guild, ...) gets one [`PlaybackOrchestrator`]
//! holding its queue, history, and state machine. Transports report the end
//! of every play invocation through a generation-stamped
//! [`CompletionNotifier`]; a per-session worker feeds those notifications into
//! the advance protocol, which decides what plays next.
//!
//! Resolving references and delivering audio are delegated to the
//! [`SourceResolver`] and [`Transport`] traits.

pub mod command;
pub mod completion;
pub mod error;
pub mod events;
pub mod history;
pub mod orchestrator;
pub mod queue;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod transport;

pub use command::{Command, CommandReply, dispatch};
pub use completion::{Completion, CompletionNotifier};
pub use error::{PlaybackError, ResolveError, TransportError, ValidationError};
pub use events::{EventBus, SessionEvent};
pub use history::History;
pub use orchestrator::{
    CollectionOutcome, EnqueueOutcome, OrchestratorSettings, PlaybackOrchestrator,
};
pub use queue::{ExpandedCollection, MAX_COLLECTION_ITEMS, Queue};
pub use reference::{GroupId, PlayableRef, ResolvedTrack};
pub use registry::SessionRegistry;
pub use resolver::{Collection, RefKind, SourceResolver};
pub use session::Session;
pub use transport::Transport;

pub use jukebox_types::{ErrorKind, PlaybackEndReason, PlayerEvent, SessionSnapshot, SessionState};
