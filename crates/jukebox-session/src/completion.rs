//! Generation-stamped completion notifications.
//!
//! Every play invocation gets its own [`CompletionNotifier`]. The transport
//! consumes it when delivery ends; the resulting [`Completion`] is queued on
//! the session's channel and handled by its advance worker in emission order.

use tokio::sync::mpsc;

use jukebox_types::PlaybackEndReason;

/// End of one play invocation, as seen by the advance protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Play generation the notification belongs to.
    pub generation: u64,
    pub reason: PlaybackEndReason,
}

/// One-shot handle given to a transport with each play invocation.
#[derive(Debug)]
pub struct CompletionNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<Completion>,
}

impl CompletionNotifier {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Completion>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report the end of the play invocation. Consumes the notifier.
    pub fn notify(self, reason: PlaybackEndReason) {
        let completion = Completion {
            generation: self.generation,
            reason,
        };
        if self.tx.send(completion).is_err() {
            tracing::debug!(
                generation = self.generation,
                "completion dropped; session already gone"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_stamps_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = CompletionNotifier::new(7, tx);
        assert_eq!(notifier.generation(), 7);
        notifier.notify(PlaybackEndReason::Eof);

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.generation, 7);
        assert_eq!(completion.reason, PlaybackEndReason::Eof);
    }

    #[test]
    fn notify_after_receiver_dropped_is_harmless() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        CompletionNotifier::new(1, tx).notify(PlaybackEndReason::Stopped);
    }
}
