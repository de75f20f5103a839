//! Source resolver abstraction.

use async_trait::async_trait;

use crate::error::ResolveError;
use crate::reference::{PlayableRef, ResolvedTrack};

/// How a reference should be treated by the play command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A single track (or a search query resolving to one).
    Single,
    /// A playlist-like reference expanding into many tracks.
    Collection,
}

/// Raw expansion result, before the collection cap is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub label: String,
    pub entries: Vec<PlayableRef>,
}

/// Turns user-supplied references into playable tracks.
///
/// Calls may be slow (network bound) and may fail.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Classify a reference without touching the network.
    fn classify(&self, reference: &PlayableRef) -> RefKind;

    /// Resolve a single reference into a playable track.
    ///
    /// When the source unexpectedly yields several entries, the first one wins.
    async fn resolve(&self, reference: &PlayableRef) -> Result<ResolvedTrack, ResolveError>;

    /// List the entries of a collection reference.
    async fn expand(&self, reference: &PlayableRef) -> Result<Collection, ResolveError>;
}
