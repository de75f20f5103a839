//! Started-track history used for "previous" navigation.

use crate::reference::PlayableRef;

/// Every reference that has started playing, oldest first.
///
/// Grows on forward play only; loop replays do not re-append.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<PlayableRef>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reference: PlayableRef) {
        self.entries.push(reference);
    }

    /// Most recently started reference.
    pub fn last(&self) -> Option<&PlayableRef> {
        self.entries.last()
    }

    /// Remove the current entry and the one before it, returning the prior.
    ///
    /// Returns `None` and leaves the history untouched when fewer than two
    /// entries exist.
    pub fn take_previous(&mut self) -> Option<PlayableRef> {
        if self.entries.len() < 2 {
            return None;
        }
        self.entries.pop();
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_previous_needs_two_entries() {
        let mut history = History::new();
        assert_eq!(history.take_previous(), None);
        history.push("a".into());
        assert_eq!(history.take_previous(), None);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn take_previous_pops_current_and_prior() {
        let mut history = History::new();
        history.push("a".into());
        history.push("b".into());
        history.push("c".into());

        assert_eq!(history.take_previous(), Some("b".into()));
        assert_eq!(history.len(), 1);
        assert_eq!(history.last(), Some(&"a".into()));
    }
}
