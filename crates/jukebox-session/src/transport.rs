//! Audio transport abstraction.
//!
//! Implementations deliver a resolved track to an audio sink and report the
//! end of each play invocation through the supplied notifier.

use crate::completion::CompletionNotifier;
use crate::error::TransportError;
use crate::reference::ResolvedTrack;

/// Delivery side of a session, bound to one audio sink.
///
/// Controls are synchronous and must not block on the session: completions
/// travel through the notifier channel instead of calling back in.
pub trait Transport: Send + Sync {
    /// Begin delivering `track`. Returns immediately; `on_complete` must be
    /// consumed exactly once when this invocation ends (naturally or stopped).
    fn start(
        &self,
        track: ResolvedTrack,
        on_complete: CompletionNotifier,
    ) -> Result<(), TransportError>;

    /// Stop the live invocation, which then fires its pending completion.
    /// A no-op when nothing is live.
    fn stop(&self) -> Result<(), TransportError>;

    fn pause(&self) -> Result<(), TransportError>;

    fn resume(&self) -> Result<(), TransportError>;

    /// Set output gain in `0.0..=1.0`.
    fn set_volume(&self, volume: f32) -> Result<(), TransportError>;
}
