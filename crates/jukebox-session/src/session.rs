//! Per-group session aggregate and its state transitions.

use std::sync::Arc;

use uuid::Uuid;

use jukebox_types::{SessionSnapshot, SessionState};

use crate::history::History;
use crate::queue::Queue;
use crate::reference::GroupId;
use crate::transport::Transport;

/// Queue, history, state machine, and transport binding of one group.
///
/// Only the owning orchestrator mutates it, always under its session lock.
pub struct Session {
    id: String,
    group: GroupId,
    pub(crate) queue: Queue,
    pub(crate) history: History,
    state: SessionState,
    loop_current: bool,
    /// Play generation; bumped on every start and whenever a live invocation
    /// is retired, so completions stamped earlier go stale.
    generation: u64,
    volume: f32,
    now_playing: Option<String>,
    /// Set by "previous": the next advance takes the queue head even when
    /// looping.
    bypass_loop_once: bool,
    transport: Option<Arc<dyn Transport>>,
}

impl Session {
    pub fn new(group: GroupId, volume: f32) -> Self {
        Self {
            id: format!("sess:{}", Uuid::new_v4()),
            group,
            queue: Queue::new(),
            history: History::new(),
            state: SessionState::Idle,
            loop_current: false,
            generation: 0,
            volume: volume.clamp(0.0, 1.0),
            now_playing: None,
            bypass_loop_once: false,
            transport: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group(&self) -> &GroupId {
        &self.group
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn loop_current(&self) -> bool {
        self.loop_current
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn now_playing(&self) -> Option<&str> {
        self.now_playing.as_deref()
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub(crate) fn bind(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
        if self.state == SessionState::Stopped {
            self.state = SessionState::Idle;
        }
    }

    /// Drop the binding. Any live invocation must already be retired.
    pub(crate) fn unbind(&mut self) -> Option<Arc<dyn Transport>> {
        self.state = SessionState::Stopped;
        self.now_playing = None;
        self.transport.take()
    }

    /// Reserve the generation for a new play invocation.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Invalidate the live invocation's completion without starting another.
    pub(crate) fn retire_generation(&mut self) {
        self.generation += 1;
    }

    /// `true` when a completion for `generation` belongs to the live invocation.
    pub(crate) fn accepts_completion(&self, generation: u64) -> bool {
        generation == self.generation && self.state.is_live()
    }

    pub(crate) fn on_started(&mut self, title: String) {
        self.state = SessionState::Playing;
        self.now_playing = Some(title);
    }

    pub(crate) fn on_paused(&mut self) {
        self.state = SessionState::Paused;
    }

    pub(crate) fn on_resumed(&mut self) {
        self.state = SessionState::Playing;
    }

    pub(crate) fn on_idle(&mut self) {
        if self.state != SessionState::Stopped {
            self.state = SessionState::Idle;
        }
        self.now_playing = None;
    }

    pub(crate) fn toggle_loop(&mut self) -> bool {
        self.loop_current = !self.loop_current;
        self.loop_current
    }

    pub(crate) fn clear_loop(&mut self) {
        self.loop_current = false;
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub(crate) fn request_loop_bypass(&mut self) {
        self.bypass_loop_once = true;
    }

    /// Consume the one-shot loop bypass flag.
    pub(crate) fn take_loop_bypass(&mut self) -> bool {
        std::mem::take(&mut self.bypass_loop_once)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            group: self.group.to_string(),
            state: self.state,
            loop_current: self.loop_current,
            volume: self.volume,
            now_playing: self.now_playing.clone(),
            queue: self.queue.iter().map(|r| r.as_str().to_string()).collect(),
            history_len: self.history.len(),
            connected: self.is_connected(),
        }
    }
}
