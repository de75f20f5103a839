//! In-process event bus for session notifications.
//!
//! Provides a broadcast channel the front-end subscribes to for rendering.

use tokio::sync::broadcast;

use jukebox_types::{ErrorKind, PlayerEvent};

use crate::reference::GroupId;

/// A [`PlayerEvent`] tagged with the group it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub group: GroupId,
    pub event: PlayerEvent,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn now_playing(&self, group: &GroupId, title: &str, looped: bool) {
        self.publish(
            group,
            PlayerEvent::NowPlaying {
                title: title.to_string(),
                looped,
            },
        );
    }

    pub fn enqueued(&self, group: &GroupId, position: usize) {
        self.publish(group, PlayerEvent::Enqueued { position });
    }

    pub fn error(&self, group: &GroupId, kind: ErrorKind, detail: impl Into<String>) {
        self.publish(
            group,
            PlayerEvent::Error {
                kind,
                detail: detail.into(),
            },
        );
    }

    pub fn idle(&self, group: &GroupId) {
        self.publish(group, PlayerEvent::Idle);
    }

    fn publish(&self, group: &GroupId, event: PlayerEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.sender.send(SessionEvent {
            group: group.clone(),
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_group_tagged_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let group = GroupId::from("room-1");

        bus.enqueued(&group, 3);
        bus.idle(&group);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.group, group);
        assert_eq!(first.event, PlayerEvent::Enqueued { position: 3 });
        assert_eq!(rx.try_recv().unwrap().event, PlayerEvent::Idle);
    }

    #[test]
    fn publishing_without_subscribers_does_not_fail() {
        let bus = EventBus::new();
        bus.now_playing(&GroupId::from("g"), "Song", false);
    }
}
