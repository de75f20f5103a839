//! Pending-track queue.
//!
//! FIFO for normal advance, with head insertion for "previous" navigation.

use std::collections::VecDeque;

use crate::reference::PlayableRef;

/// Upper bound on references taken from one expanded collection.
pub const MAX_COLLECTION_ITEMS: usize = 50;

/// Ordered sequence of unresolved references waiting to play.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    items: VecDeque<PlayableRef>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail and return the 1-based position of the new entry.
    pub fn push_back(&mut self, reference: PlayableRef) -> usize {
        self.items.push_back(reference);
        self.items.len()
    }

    /// Append many references, preserving their order. Returns how many were added.
    pub fn extend(&mut self, references: impl IntoIterator<Item = PlayableRef>) -> usize {
        let before = self.items.len();
        self.items.extend(references);
        self.items.len() - before
    }

    /// Insert at the head so the reference plays next.
    pub fn push_front(&mut self, reference: PlayableRef) {
        self.items.push_front(reference);
    }

    pub fn pop_front(&mut self) -> Option<PlayableRef> {
        self.items.pop_front()
    }

    pub fn front(&self) -> Option<&PlayableRef> {
        self.items.front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayableRef> {
        self.items.iter()
    }
}

/// Result of expanding a collection reference, capped at [`MAX_COLLECTION_ITEMS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedCollection {
    /// Human label of the collection (playlist title).
    pub label: String,
    /// Kept references, in collection order.
    pub refs: Vec<PlayableRef>,
    /// `true` when entries beyond the cap were dropped.
    pub truncated: bool,
    /// Number of dropped entries.
    pub dropped: usize,
}

impl ExpandedCollection {
    /// Apply the collection cap to a freshly expanded entry list.
    pub fn capped(label: String, mut refs: Vec<PlayableRef>) -> Self {
        let dropped = refs.len().saturating_sub(MAX_COLLECTION_ITEMS);
        refs.truncate(MAX_COLLECTION_ITEMS);
        Self {
            label,
            refs,
            truncated: dropped > 0,
            dropped,
        }
    }
}
