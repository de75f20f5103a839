//! Group → orchestrator registry.
//!
//! The only shared mutable structure across sessions. Lookups and inserts
//! happen under a short std mutex; no session work runs while it is held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::events::EventBus;
use crate::orchestrator::{OrchestratorSettings, PlaybackOrchestrator};
use crate::reference::GroupId;
use crate::resolver::SourceResolver;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<GroupId, Arc<PlaybackOrchestrator>>>,
    resolver: Arc<dyn SourceResolver>,
    events: EventBus,
    settings: OrchestratorSettings,
}

impl SessionRegistry {
    pub fn new(
        resolver: Arc<dyn SourceResolver>,
        events: EventBus,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            resolver,
            events,
            settings,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn resolver(&self) -> &Arc<dyn SourceResolver> {
        &self.resolver
    }

    /// Return the orchestrator for `group`, creating it on first access.
    ///
    /// Construction happens under the registry lock, so concurrent first
    /// commands for the same group share one orchestrator. Must be called
    /// from within a tokio runtime.
    pub fn get_or_create(&self, group: &GroupId) -> Arc<PlaybackOrchestrator> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|err| err.into_inner());
        sessions
            .entry(group.clone())
            .or_insert_with(|| {
                tracing::info!(group = %group, "creating session");
                PlaybackOrchestrator::spawn(
                    group.clone(),
                    self.resolver.clone(),
                    self.events.clone(),
                    self.settings.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, group: &GroupId) -> Option<Arc<PlaybackOrchestrator>> {
        self.sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(group)
            .cloned()
    }

    /// Leave the sink and evict the session. Returns `false` for unknown groups.
    pub async fn remove(&self, group: &GroupId) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(group);
        match removed {
            Some(orchestrator) => {
                orchestrator.leave().await;
                tracing::info!(group = %group, "session evicted");
                true
            }
            None => false,
        }
    }

    /// Leave and evict every session.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<PlaybackOrchestrator>> = self
            .sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .drain()
            .map(|(_, orchestrator)| orchestrator)
            .collect();
        for orchestrator in drained {
            orchestrator.leave().await;
        }
    }

    /// Known groups, sorted.
    pub fn groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self
            .sessions
            .lock()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        groups.sort();
        groups
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::ResolveError;
    use crate::reference::{PlayableRef, ResolvedTrack};
    use crate::resolver::{Collection, RefKind};

    struct EchoResolver;

    #[async_trait]
    impl SourceResolver for EchoResolver {
        fn classify(&self, _reference: &PlayableRef) -> RefKind {
            RefKind::Single
        }

        async fn resolve(&self, reference: &PlayableRef) -> Result<ResolvedTrack, ResolveError> {
            Ok(ResolvedTrack::new(reference.as_str(), reference.as_str()))
        }

        async fn expand(&self, reference: &PlayableRef) -> Result<Collection, ResolveError> {
            Err(ResolveError::Unsupported(reference.to_string()))
        }
    }

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(EchoResolver),
            EventBus::new(),
            OrchestratorSettings::default(),
        ))
    }

    #[tokio::test]
    async fn get_or_create_reuses_existing_session() {
        let registry = registry();
        let group = GroupId::from("guild-1");
        let a = registry.get_or_create(&group);
        let b = registry.get_or_create(&group);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_creates_one_session() {
        let registry = registry();
        let group = GroupId::from("guild-race");
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                let group = group.clone();
                tokio::spawn(async move { registry.get_or_create(&group) })
            })
            .collect();

        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.unwrap());
        }
        assert_eq!(registry.len(), 1);
        assert!(created.iter().all(|o| Arc::ptr_eq(o, &created[0])));
    }

    #[tokio::test]
    async fn sessions_are_independent_per_group() {
        let registry = registry();
        let a = registry.get_or_create(&GroupId::from("a"));
        let b = registry.get_or_create(&GroupId::from("b"));
        a.enqueue("one".into()).await.unwrap();
        a.toggle_loop().await;

        let snapshot_b = b.snapshot().await;
        assert!(snapshot_b.queue.is_empty());
        assert!(!snapshot_b.loop_current);
        assert_eq!(
            registry.groups(),
            vec![GroupId::from("a"), GroupId::from("b")]
        );
    }

    #[tokio::test]
    async fn remove_evicts_and_next_access_starts_fresh() {
        let registry = registry();
        let group = GroupId::from("guild-1");
        let first = registry.get_or_create(&group);
        first.enqueue("one".into()).await.unwrap();

        assert!(registry.remove(&group).await);
        assert!(!registry.remove(&group).await);
        assert!(registry.get(&group).is_none());

        let second = registry.get_or_create(&group);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.snapshot().await.queue.is_empty());
    }
}
