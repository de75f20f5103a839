//! Per-session playback orchestration and the completion-driven advance protocol.
//!
//! All mutations of a session go through its `tokio::sync::Mutex`, held for
//! the whole command including the resolve await. Transports never call back
//! into the session: their completions are queued on an mpsc channel and a
//! single worker task per session replays them, in order, through
//! [`PlaybackOrchestrator::handle_completion`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use jukebox_types::{ErrorKind, PlaybackEndReason, SessionSnapshot, SessionState};

use crate::completion::{Completion, CompletionNotifier};
use crate::error::{PlaybackError, ResolveError, Result, ValidationError};
use crate::events::EventBus;
use crate::queue::ExpandedCollection;
use crate::reference::{GroupId, PlayableRef, ResolvedTrack};
use crate::resolver::{RefKind, SourceResolver};
use crate::session::Session;
use crate::transport::Transport;

/// Tunables shared by every orchestrator a registry creates.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Volume applied to new sessions, `0.0..=1.0`.
    pub default_volume: f32,
    /// Upper bound on a single resolve/expand call.
    pub resolve_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            resolve_timeout: Duration::from_secs(30),
        }
    }
}

/// What [`PlaybackOrchestrator::enqueue`] did with the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The session was idle and the reference started right away.
    Started { title: String },
    /// The reference waits at this 1-based queue position.
    Queued { position: usize },
}

/// Result of queueing an expanded collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionOutcome {
    pub label: String,
    /// Entries appended to the queue (including one that started, if any).
    pub queued: usize,
    pub truncated: bool,
    pub dropped: usize,
    /// Title of the entry that started because the session was idle.
    pub started: Option<String>,
}

pub struct PlaybackOrchestrator {
    group: GroupId,
    resolver: Arc<dyn SourceResolver>,
    events: EventBus,
    settings: OrchestratorSettings,
    completions: mpsc::UnboundedSender<Completion>,
    session: Mutex<Session>,
}

impl PlaybackOrchestrator {
    /// Build an orchestrator and hand back its completion receiver.
    ///
    /// The caller is responsible for feeding received completions into
    /// [`handle_completion`](Self::handle_completion); [`spawn`](Self::spawn)
    /// does this on a background task.
    pub fn new(
        group: GroupId,
        resolver: Arc<dyn SourceResolver>,
        events: EventBus,
        settings: OrchestratorSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Completion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let session = Session::new(group.clone(), settings.default_volume);
        tracing::debug!(group = %group, session_id = %session.id(), "session created");
        let orchestrator = Arc::new(Self {
            group,
            resolver,
            events,
            settings,
            completions,
            session: Mutex::new(session),
        });
        (orchestrator, rx)
    }

    /// Build an orchestrator and start its completion worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        group: GroupId,
        resolver: Arc<dyn SourceResolver>,
        events: EventBus,
        settings: OrchestratorSettings,
    ) -> Arc<Self> {
        let (orchestrator, rx) = Self::new(group, resolver, events, settings);
        tokio::spawn(completion_worker(Arc::downgrade(&orchestrator), rx));
        orchestrator
    }

    pub fn group(&self) -> &GroupId {
        &self.group
    }

    /// Ask the resolver whether `reference` is a single track or a collection.
    pub fn classify(&self, reference: &PlayableRef) -> RefKind {
        self.resolver.classify(reference)
    }

    /// Attach the transport that delivers this session's audio.
    ///
    /// A previously bound transport is stopped and released first.
    pub async fn bind(&self, transport: Arc<dyn Transport>) {
        let mut session = self.session.lock().await;
        self.bind_locked(&mut session, transport);
    }

    /// Attach `transport` only when no transport is bound. Returns whether it was attached.
    pub async fn bind_if_unbound(&self, transport: Arc<dyn Transport>) -> bool {
        let mut session = self.session.lock().await;
        if session.is_connected() {
            return false;
        }
        self.bind_locked(&mut session, transport);
        true
    }

    fn bind_locked(&self, session: &mut Session, transport: Arc<dyn Transport>) {
        if session.state().is_live() {
            session.retire_generation();
            if let Some(previous) = session.transport() {
                if let Err(err) = previous.stop() {
                    tracing::warn!(group = %self.group, error = %err, "stop on rebind failed");
                }
            }
            session.on_idle();
        }
        if let Err(err) = transport.set_volume(session.volume()) {
            tracing::warn!(group = %self.group, error = %err, "initial volume not applied");
        }
        session.bind(transport);
        tracing::info!(group = %self.group, "transport bound");
    }

    /// Play `reference` now if the session is idle and bound, else queue it.
    pub async fn enqueue(&self, reference: PlayableRef) -> Result<EnqueueOutcome> {
        let mut session = self.session.lock().await;
        if session.state() == SessionState::Idle && session.is_connected() {
            let title = self.start_reference(&mut session, reference, false).await?;
            return Ok(EnqueueOutcome::Started { title });
        }
        let position = session.queue.push_back(reference);
        tracing::debug!(group = %self.group, position, "reference queued");
        self.events.enqueued(&self.group, position);
        Ok(EnqueueOutcome::Queued { position })
    }

    /// Interrupt whatever is live and play `reference` immediately.
    ///
    /// The queue is left untouched. When resolution fails the interrupted
    /// session keeps going from its queue instead of stalling.
    pub async fn play_now(&self, reference: PlayableRef) -> Result<String> {
        let mut session = self.session.lock().await;
        let transport = session.transport().ok_or(ValidationError::NotConnected)?;
        let interrupted = session.state().is_live();
        if interrupted {
            session.retire_generation();
            if let Err(err) = transport.stop() {
                tracing::warn!(group = %self.group, error = %err, "stop before play-now failed");
            }
        }
        match self.start_reference(&mut session, reference.clone(), false).await {
            Ok(title) => Ok(title),
            Err(err) => {
                self.report_failure(&reference, &err);
                if interrupted {
                    self.advance_locked(&mut session).await;
                }
                Err(err)
            }
        }
    }

    /// Stop the live track; its completion advances the session.
    pub async fn skip(&self) -> Result<()> {
        let session = self.session.lock().await;
        if session.state() != SessionState::Playing {
            return Err(PlaybackError::NothingPlaying);
        }
        let transport = session.transport().ok_or(ValidationError::NotConnected)?;
        transport.stop()?;
        tracing::debug!(group = %self.group, "skip requested");
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.state() != SessionState::Playing {
            return Err(PlaybackError::NothingPlaying);
        }
        let transport = session.transport().ok_or(ValidationError::NotConnected)?;
        transport.pause()?;
        session.on_paused();
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.state() != SessionState::Paused {
            return Err(PlaybackError::NothingPaused);
        }
        let transport = session.transport().ok_or(ValidationError::NotConnected)?;
        transport.resume()?;
        session.on_resumed();
        Ok(())
    }

    /// Clear the queue and loop flag and go idle. A no-op without a binding.
    pub async fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let Some(transport) = session.transport() else {
            return Ok(());
        };
        session.queue.clear();
        session.clear_loop();
        let was_live = session.state().is_live();
        session.retire_generation();
        session.on_idle();
        if was_live {
            if let Err(err) = transport.stop() {
                tracing::warn!(group = %self.group, error = %err, "transport stop failed");
            }
            self.events.idle(&self.group);
        }
        tracing::info!(group = %self.group, "stopped and cleared queue");
        Ok(())
    }

    /// Put the previously started track back at the head of the queue and
    /// move on to it. Returns the reference that will play.
    pub async fn previous(&self) -> Result<PlayableRef> {
        let mut session = self.session.lock().await;
        if session.history.len() < 2 {
            return Err(PlaybackError::NoPreviousTrack);
        }
        let transport = session.transport().ok_or(ValidationError::NotConnected)?;
        let prior = session
            .history
            .take_previous()
            .ok_or(PlaybackError::NoPreviousTrack)?;
        session.queue.push_front(prior.clone());
        session.request_loop_bypass();

        if !session.state().is_live() {
            self.advance_locked(&mut session).await;
            return Ok(prior);
        }
        if let Err(err) = transport.stop() {
            // No completion will arrive for a failed stop; advance directly.
            tracing::warn!(group = %self.group, error = %err, "stop for previous failed");
            session.retire_generation();
            self.advance_locked(&mut session).await;
        }
        Ok(prior)
    }

    /// Flip the loop flag and return its new value.
    pub async fn toggle_loop(&self) -> bool {
        let mut session = self.session.lock().await;
        let looping = session.toggle_loop();
        tracing::debug!(group = %self.group, looping, "loop toggled");
        looping
    }

    /// Set the volume from a percentage. Returns the applied gain.
    pub async fn set_volume(&self, percent: i64) -> Result<f32> {
        if !(0..=100).contains(&percent) {
            return Err(ValidationError::VolumeOutOfRange(percent).into());
        }
        let mut session = self.session.lock().await;
        if !session.state().is_live() {
            return Err(PlaybackError::NothingPlaying);
        }
        let transport = session.transport().ok_or(ValidationError::NotConnected)?;
        let volume = percent as f32 / 100.0;
        transport.set_volume(volume)?;
        session.set_volume(volume);
        Ok(volume)
    }

    /// Expand a collection reference, keeping at most the capped number of entries.
    pub async fn expand_collection(&self, reference: &PlayableRef) -> Result<ExpandedCollection> {
        let collection = tokio::time::timeout(
            self.settings.resolve_timeout,
            self.resolver.expand(reference),
        )
        .await
        .map_err(|_| self.timeout_error())??;
        let expanded = ExpandedCollection::capped(collection.label, collection.entries);
        if expanded.truncated {
            tracing::info!(
                group = %self.group,
                kept = expanded.refs.len(),
                dropped = expanded.dropped,
                "collection truncated"
            );
        }
        Ok(expanded)
    }

    /// Expand a collection and queue its entries, starting the first one
    /// when the session is idle.
    ///
    /// Expansion runs before the session lock is taken.
    pub async fn enqueue_collection(&self, reference: PlayableRef) -> Result<CollectionOutcome> {
        let expanded = self.expand_collection(&reference).await?;
        if expanded.refs.is_empty() {
            return Err(ResolveError::NotFound(reference.into_string()).into());
        }
        let mut session = self.session.lock().await;
        let queued = session.queue.extend(expanded.refs);
        let started = if session.state() == SessionState::Idle && session.is_connected() {
            let started = self.play_from_queue(&mut session).await;
            if started.is_none() {
                session.on_idle();
                self.events.idle(&self.group);
            }
            started
        } else {
            None
        };
        Ok(CollectionOutcome {
            label: expanded.label,
            queued,
            truncated: expanded.truncated,
            dropped: expanded.dropped,
            started,
        })
    }

    /// Stop playback, clear the queue and loop flag, and release the transport.
    pub async fn leave(&self) {
        let mut session = self.session.lock().await;
        session.queue.clear();
        session.clear_loop();
        let was_live = session.state().is_live();
        session.retire_generation();
        if let Some(transport) = session.unbind() {
            if was_live {
                if let Err(err) = transport.stop() {
                    tracing::warn!(group = %self.group, error = %err, "transport stop on leave failed");
                }
            }
        }
        if was_live {
            self.events.idle(&self.group);
        }
        tracing::info!(group = %self.group, "left sink");
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_connected()
    }

    /// Advance protocol entry point: one call per transport completion.
    ///
    /// Completions stamped with a superseded generation are ignored.
    pub async fn handle_completion(&self, completion: Completion) {
        let mut session = self.session.lock().await;
        if !session.accepts_completion(completion.generation) {
            tracing::debug!(
                group = %self.group,
                generation = completion.generation,
                current = session.generation(),
                "ignoring stale completion"
            );
            return;
        }
        if completion.reason == PlaybackEndReason::Error {
            let title = session.now_playing().unwrap_or("track").to_string();
            tracing::warn!(group = %self.group, title = %title, "playback ended with error");
            self.events.error(
                &self.group,
                ErrorKind::Transport,
                format!("playback of {title} was interrupted"),
            );
            // A broken track is skipped, never looped.
            session.request_loop_bypass();
        }
        self.advance_locked(&mut session).await;
    }

    /// Decide what plays next: loop replay, queue head, or idle.
    async fn advance_locked(&self, session: &mut Session) -> Option<String> {
        let bypass_loop = session.take_loop_bypass();
        if session.loop_current() && !bypass_loop {
            if let Some(current) = session.history.last().cloned() {
                match self.start_reference(session, current.clone(), true).await {
                    Ok(title) => return Some(title),
                    Err(err) => self.report_failure(&current, &err),
                }
            }
        }
        if let Some(title) = self.play_from_queue(session).await {
            return Some(title);
        }
        session.on_idle();
        self.events.idle(&self.group);
        tracing::info!(group = %self.group, "queue exhausted; session idle");
        None
    }

    /// Pop queue entries until one starts. Failing entries are reported and skipped.
    async fn play_from_queue(&self, session: &mut Session) -> Option<String> {
        if !session.is_connected() {
            return None;
        }
        let mut failures = 0usize;
        while let Some(next) = session.queue.pop_front() {
            match self.start_reference(session, next.clone(), false).await {
                Ok(title) => return Some(title),
                Err(err) => {
                    failures += 1;
                    self.report_failure(&next, &err);
                }
            }
        }
        if failures > 0 {
            self.events.error(
                &self.group,
                ErrorKind::Resolution,
                format!("{failures} queued track(s) could not be played"),
            );
        }
        None
    }

    /// Resolve `reference` and hand it to the transport under a fresh generation.
    ///
    /// `looped` replays keep the history as is; everything else is appended.
    async fn start_reference(
        &self,
        session: &mut Session,
        reference: PlayableRef,
        looped: bool,
    ) -> Result<String> {
        let transport = session.transport().ok_or(ValidationError::NotConnected)?;
        let track = self.resolve(&reference).await?;
        let title = track.title.clone();
        if let Err(err) = transport.set_volume(session.volume()) {
            tracing::warn!(group = %self.group, error = %err, "volume not applied");
        }
        let generation = session.next_generation();
        let notifier = CompletionNotifier::new(generation, self.completions.clone());
        transport.start(track, notifier)?;
        if !looped {
            session.history.push(reference);
        }
        session.on_started(title.clone());
        tracing::info!(group = %self.group, generation, looped, title = %title, "now playing");
        self.events.now_playing(&self.group, &title, looped);
        Ok(title)
    }

    async fn resolve(&self, reference: &PlayableRef) -> Result<ResolvedTrack> {
        let track = tokio::time::timeout(
            self.settings.resolve_timeout,
            self.resolver.resolve(reference),
        )
        .await
        .map_err(|_| self.timeout_error())??;
        Ok(track)
    }

    fn timeout_error(&self) -> ResolveError {
        ResolveError::Timeout(self.settings.resolve_timeout.as_millis() as u64)
    }

    fn report_failure(&self, reference: &PlayableRef, err: &PlaybackError) {
        tracing::warn!(
            group = %self.group,
            reference = %reference,
            error = %err,
            "track skipped"
        );
        self.events
            .error(&self.group, err.kind(), format!("{reference}: {err}"));
    }
}

/// Feed completions into the advance protocol until the session goes away.
async fn completion_worker(
    orchestrator: Weak<PlaybackOrchestrator>,
    mut rx: mpsc::UnboundedReceiver<Completion>,
) {
    while let Some(completion) = rx.recv().await {
        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };
        orchestrator.handle_completion(completion).await;
    }
    tracing::debug!("completion worker finished");
}
