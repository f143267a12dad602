//! Session correlation engine.
//!
//! [`SessionEngine`] owns the task registry, the identifier correlation maps,
//! the force-commit clock and the per-task state machine.  Every mutation
//! happens under one `std::sync::Mutex`; the lock is never held across an
//! `.await`.  The engine is a cheap `Arc` handle, shared by the receive
//! loop, the audio-send loop, the trigger scheduler and any display reader.
//!
//! # Event flow
//!
//! ```text
//! speech_stopped ───────────────▶ create task (voice boundary), reset clock
//! conversation.item.created ────▶ bind item → current task, SourcePending
//! transcription.completed ──────▶ resolve item  → set source, SourceCaptured
//! response.created ─────────────▶ bind response → current task
//! response.text.done ───────────▶ resolve response → set translation
//!                                   ├─ source known → Completed
//!                                   └─ source missing → wait (bounded) → Completed
//! ```
//!
//! Resolution falls back to the most recently created task when an event's
//! identifier has no binding.  Fallbacks for events that *did* carry an
//! identifier are the misattribution risk; they are logged and counted in
//! [`EngineStats::fallback_resolutions`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::correlation::{CorrelationMap, Resolution};
use super::registry::TaskRegistry;
use super::scheduler::{CommitClock, TickOutcome};
use super::shutdown::ShutdownSignal;
use super::task::{Task, TaskId, TaskStatus, Trigger};
use crate::config::SessionConfig;
use crate::display::{DisplaySink, UnattachedText};
use crate::protocol::{ConversationItem, ServerEvent};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of retained tasks.
    pub task_cap: usize,
    /// Ceiling on the wait for a transcript that trails its translation.
    pub source_wait: Duration,
    /// Force a commit after this long without a boundary.
    pub force_commit_interval: Duration,
    /// Bindings for tasks this many ids behind the current one are pruned.
    /// Never below `task_cap`, so retained tasks keep their bindings.
    pub binding_retention_tasks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for EngineConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            task_cap: config.task_cap,
            source_wait: config.source_wait(),
            force_commit_interval: config.force_commit_interval(),
            binding_retention_tasks: config
                .binding_retention_tasks
                .max(config.task_cap as u64),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineStats
// ---------------------------------------------------------------------------

/// Counters for observing correlation quality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub tasks_created: u64,
    pub tasks_completed: u64,
    pub tasks_evicted: u64,
    /// Events whose identifier had no binding and were attributed to the
    /// current task.
    pub fallback_resolutions: u64,
    /// Events that arrived before any task existed.
    pub unattached_events: u64,
    /// Events for tasks that were evicted, whose bindings were pruned, or
    /// that had already completed without them.
    pub late_events: u64,
    /// Re-delivered bindings, transcripts and translations that were ignored.
    pub duplicate_events: u64,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// What [`SessionEngine::dispatch`] did with an event.
#[derive(Debug)]
pub enum Dispatch {
    /// The event was applied (or deliberately had no effect on tasks).
    Handled,
    /// Unknown event type.
    Ignored,
    /// The event could not be attributed to a retained task.
    Unattached,
    /// The translation arrived before its transcript; completion runs on
    /// this task once the transcript arrives or the wait ceiling passes.
    Deferred(JoinHandle<()>),
}

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

struct EngineState {
    registry: TaskRegistry,
    correlation: CorrelationMap,
    clock: CommitClock,
    stats: EngineStats,
    /// Streaming translation text of the response in progress.
    partial_translation: String,
}

struct EngineInner {
    state: Mutex<EngineState>,
    /// Notified whenever a transcript is stored.
    source_arrived: Notify,
    sink: Arc<dyn DisplaySink>,
    config: EngineConfig,
    shutdown: ShutdownSignal,
}

#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    /// Create an engine with no tasks.  Display callbacks are invoked while
    /// the engine lock is held, so `sink` must not call back into the engine.
    pub fn new(
        mut config: EngineConfig,
        sink: Arc<dyn DisplaySink>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let floor = config.task_cap as u64;
        if config.binding_retention_tasks < floor {
            log::warn!(
                "engine: binding retention {} is below the task cap; using {floor}",
                config.binding_retention_tasks
            );
            config.binding_retention_tasks = floor;
        }
        let state = EngineState {
            registry: TaskRegistry::new(config.task_cap),
            correlation: CorrelationMap::new(),
            clock: CommitClock::new(config.force_commit_interval, Instant::now()),
            stats: EngineStats::default(),
            partial_translation: String::new(),
        };
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(state),
                source_arrived: Notify::new(),
                sink,
                config,
                shutdown,
            }),
        }
    }

    /// Stop the engine: pending source waits finish immediately.
    ///
    /// Returns the final counters.
    pub fn close(&self) -> EngineStats {
        self.inner.shutdown.trigger();
        let stats = self.stats();
        log::info!(
            "engine: closed: {} created, {} completed, {} evicted, {} fallback, {} unattached",
            stats.tasks_created,
            stats.tasks_completed,
            stats.tasks_evicted,
            stats.fallback_resolutions,
            stats.unattached_events + stats.late_events,
        );
        stats
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Open a new task and make it the fallback target.
    pub fn create_task(&self, trigger: Trigger) -> TaskId {
        let mut st = self.lock();
        self.create_locked(&mut st, trigger)
    }

    fn create_locked(&self, st: &mut EngineState, trigger: Trigger) -> TaskId {
        let (id, evicted) = st.registry.create(trigger);
        st.stats.tasks_created += 1;
        log::info!("engine: task {id} created ({})", trigger.label());
        self.inner.sink.add_task(id, trigger);

        self.record_evictions(st, evicted);

        let retention = self.inner.config.binding_retention_tasks;
        if id.0 > retention {
            let pruned = st.correlation.prune_before(TaskId(id.0 - retention));
            if pruned > 0 {
                log::debug!("engine: pruned {pruned} stale bindings");
            }
        }
        id
    }

    fn record_evictions(&self, st: &mut EngineState, evicted: Vec<Task>) {
        for task in evicted {
            st.stats.tasks_evicted += 1;
            if task.is_completed() {
                log::debug!("engine: task {} evicted", task.id);
            } else {
                log::warn!(
                    "engine: task {} evicted before completing (status: {})",
                    task.id,
                    task.status.label()
                );
            }
            self.inner.sink.evict_task(task.id);
        }
    }

    /// Speech stopped: open a voice-boundary task and restart the
    /// force-commit interval.
    pub fn voice_boundary(&self, now: Instant) -> TaskId {
        let mut st = self.lock();
        st.clock.reset(now);
        self.create_locked(&mut st, Trigger::VoiceBoundary)
    }

    /// Count one audio unit sent since the last commit.
    pub fn record_audio_sent(&self) {
        self.lock().clock.record_sent();
    }

    /// Timeout check.  Returns the new task when a forced commit is due; the
    /// caller must then commit the remote buffer and request a response.
    pub fn poll_force_commit(&self, now: Instant) -> Option<TaskId> {
        let mut st = self.lock();
        match st.clock.poll(now) {
            TickOutcome::Waiting => None,
            TickOutcome::Idle => {
                log::trace!("engine: force-commit interval elapsed with no audio");
                None
            }
            TickOutcome::Fire { units } => {
                log::info!("engine: forcing commit of {units} pending audio chunks");
                Some(self.create_locked(&mut st, Trigger::Timeout))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Correlation
    // -----------------------------------------------------------------------

    /// Bind a conversation item to `task`.  Returns `false` if already bound.
    pub fn bind_item(&self, item_id: &str, task: TaskId) -> bool {
        self.lock().correlation.bind_item(item_id, task)
    }

    /// Bind a response to `task`.  Returns `false` if already bound.
    pub fn bind_response(&self, response_id: &str, task: TaskId) -> bool {
        self.lock().correlation.bind_response(response_id, task)
    }

    pub fn resolve_by_item(&self, item_id: &str) -> Resolution {
        let st = self.lock();
        st.correlation
            .resolve_item(Some(item_id), st.registry.last_task_id())
    }

    pub fn resolve_by_response(&self, response_id: &str) -> Resolution {
        let st = self.lock();
        st.correlation
            .resolve_response(Some(response_id), st.registry.last_task_id())
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn last_task_id(&self) -> Option<TaskId> {
        self.lock().registry.last_task_id()
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.lock().registry.get(id).cloned()
    }

    /// Retained tasks in ascending id order.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().registry.iter().cloned().collect()
    }

    /// Number of retained tasks that have not completed.
    pub fn in_flight(&self) -> usize {
        self.lock()
            .registry
            .iter()
            .filter(|t| !t.is_completed())
            .count()
    }

    pub fn stats(&self) -> EngineStats {
        self.lock().stats.clone()
    }

    pub fn pending_audio_units(&self) -> u64 {
        self.lock().clock.pending_units()
    }

    // -----------------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------------

    /// Apply one inbound event.  Never panics on unexpected input.
    ///
    /// Must be called from within a tokio runtime: a translation that beats
    /// its transcript spawns the bounded wait as a separate task so dispatch
    /// of later events is not blocked.
    pub fn dispatch(&self, event: ServerEvent) -> Dispatch {
        match event {
            ServerEvent::SessionCreated {} => {
                log::info!("engine: session created");
                Dispatch::Handled
            }
            ServerEvent::SessionUpdated {} => {
                log::info!("engine: session configuration applied");
                Dispatch::Handled
            }
            ServerEvent::SpeechStarted { .. } => {
                log::info!("engine: speech started");
                self.inner.sink.speech_started();
                Dispatch::Handled
            }
            ServerEvent::SpeechStopped { .. } => {
                self.voice_boundary(Instant::now());
                Dispatch::Handled
            }
            ServerEvent::AudioCommitted { item_id } => {
                log::debug!("engine: audio buffer committed (item {item_id:?})");
                Dispatch::Handled
            }
            ServerEvent::ItemCreated { item } => self.on_item_created(item),
            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => self.on_transcription(item_id.as_deref(), transcript),
            ServerEvent::ResponseCreated { response } => {
                self.on_response_created(response.id.as_deref())
            }
            ServerEvent::OutputItemDone { response_id } => {
                log::debug!("engine: output item done (response {response_id:?})");
                Dispatch::Handled
            }
            ServerEvent::TextDelta { delta, .. } => {
                self.lock().partial_translation.push_str(&delta);
                self.inner.sink.translation_delta(&delta);
                Dispatch::Handled
            }
            ServerEvent::TextDone { response_id, text } => {
                self.on_translation(response_id.as_deref(), text)
            }
            ServerEvent::ResponseDone { response } => {
                log::debug!(
                    "engine: response {:?} done ({})",
                    response.id,
                    response.status.as_deref().unwrap_or("unknown status")
                );
                self.lock().partial_translation.clear();
                Dispatch::Handled
            }
            ServerEvent::Error { error } => {
                let message = error.message_or_default();
                log::error!("engine: server error: {message}");
                self.inner.sink.show_error(message);
                Dispatch::Handled
            }
            ServerEvent::Unknown => Dispatch::Ignored,
        }
    }

    /// Translation text streamed so far for the response in progress.
    pub fn partial_translation(&self) -> String {
        self.lock().partial_translation.clone()
    }

    fn on_item_created(&self, item: ConversationItem) -> Dispatch {
        if !item.is_user_message() {
            log::debug!("engine: ignoring non-user item {:?}", item.id);
            return Dispatch::Handled;
        }

        let mut st = self.lock();
        let Some(task_id) = st.registry.last_task_id() else {
            st.stats.unattached_events += 1;
            log::warn!("engine: user item {:?} arrived before any task", item.id);
            return Dispatch::Unattached;
        };

        if let Some(item_id) = item.id.as_deref() {
            if !st.correlation.bind_item(item_id, task_id) {
                st.stats.duplicate_events += 1;
                log::debug!("engine: item {item_id} already bound");
                return Dispatch::Handled;
            }
            log::debug!("engine: item {item_id} → task {task_id}");
        } else {
            log::warn!("engine: user item without id; task {task_id} cannot be correlated by item");
        }

        if let Some(task) = st.registry.get_mut(task_id) {
            if task.status == TaskStatus::Created {
                task.status = TaskStatus::SourcePending;
                self.inner
                    .sink
                    .update_task_status(task_id, TaskStatus::SourcePending);
            }
        }

        let inline = item.inline_text().map(str::to_owned);
        match inline {
            Some(text) => {
                let stored = self.store_source(&mut st, task_id, text);
                drop(st);
                if stored {
                    self.inner.source_arrived.notify_waiters();
                }
            }
            None => drop(st),
        }
        Dispatch::Handled
    }

    fn on_transcription(&self, item_id: Option<&str>, transcript: String) -> Dispatch {
        let mut st = self.lock();
        let resolution = st
            .correlation
            .resolve_item(item_id, st.registry.last_task_id());

        let Some(task_id) = self.attach(&mut st, resolution, item_id, "item") else {
            drop(st);
            self.inner
                .sink
                .show_unattached(UnattachedText::Transcript, &transcript);
            return Dispatch::Unattached;
        };

        let stored = self.store_source(&mut st, task_id, transcript);
        drop(st);
        if stored {
            self.inner.source_arrived.notify_waiters();
        }
        Dispatch::Handled
    }

    fn on_response_created(&self, response_id: Option<&str>) -> Dispatch {
        let Some(response_id) = response_id else {
            log::debug!("engine: response created without id");
            return Dispatch::Handled;
        };

        let mut st = self.lock();
        let Some(task_id) = st.registry.last_task_id() else {
            st.stats.unattached_events += 1;
            log::warn!("engine: response {response_id} created before any task");
            return Dispatch::Unattached;
        };

        if st.correlation.bind_response(response_id, task_id) {
            log::debug!("engine: response {response_id} → task {task_id}");
        } else {
            st.stats.duplicate_events += 1;
        }
        Dispatch::Handled
    }

    fn on_translation(&self, response_id: Option<&str>, text: String) -> Dispatch {
        let mut st = self.lock();
        st.partial_translation.clear();
        let resolution = st
            .correlation
            .resolve_response(response_id, st.registry.last_task_id());

        let Some(task_id) = self.attach(&mut st, resolution, response_id, "response") else {
            drop(st);
            self.inner
                .sink
                .show_unattached(UnattachedText::Translation, &text);
            return Dispatch::Unattached;
        };

        let Some(task) = st.registry.get_mut(task_id) else {
            return Dispatch::Unattached;
        };
        if task.is_completed() || task.translation_text.is_some() {
            st.stats.duplicate_events += 1;
            log::debug!("engine: duplicate translation for task {task_id} ignored");
            return Dispatch::Handled;
        }

        log::info!("engine: translation for task {task_id}: {text}");
        task.translation_text = Some(text);

        if task.source_text.is_some() {
            self.complete_locked(&mut st, task_id);
            return Dispatch::Handled;
        }

        task.status = TaskStatus::TranslationPending;
        self.inner
            .sink
            .update_task_status(task_id, TaskStatus::TranslationPending);
        drop(st);

        log::debug!(
            "engine: task {task_id} translated before its transcript; waiting up to {:?}",
            self.inner.config.source_wait
        );
        let engine = self.clone();
        Dispatch::Deferred(tokio::spawn(async move {
            engine.await_source_then_complete(task_id).await;
        }))
    }

    /// Map a resolution to a retained task, recording why it failed if not.
    fn attach(
        &self,
        st: &mut EngineState,
        resolution: Resolution,
        identifier: Option<&str>,
        kind: &str,
    ) -> Option<TaskId> {
        match resolution {
            Resolution::Unattached => {
                st.stats.unattached_events += 1;
                log::warn!("engine: {kind} {identifier:?} arrived before any task");
                return None;
            }
            Resolution::Stale => {
                if let Some(floor) = st.correlation.pruned_below() {
                    st.stats.late_events += 1;
                    log::warn!(
                        "engine: {kind} {identifier:?} has no binding; \
                         it belongs to a task older than {floor}"
                    );
                } else {
                    st.stats.unattached_events += 1;
                    log::warn!(
                        "engine: {kind} {identifier:?} has no binding and the current task \
                         already has its own"
                    );
                }
                return None;
            }
            Resolution::Fallback(task_id) => {
                if let Some(id) = identifier {
                    st.stats.fallback_resolutions += 1;
                    match st.correlation.pruned_below() {
                        Some(floor) => log::warn!(
                            "engine: {kind} {id} has no binding; attributing to task {task_id} \
                             (bindings below {floor} were pruned)"
                        ),
                        None => log::warn!(
                            "engine: {kind} {id} has no binding; attributing to task {task_id}"
                        ),
                    }
                }
            }
            Resolution::Bound(_) => {}
        }

        let task_id = resolution.task_id()?;
        if st.registry.contains(task_id) {
            Some(task_id)
        } else {
            st.stats.late_events += 1;
            log::warn!("engine: {kind} {identifier:?} belongs to evicted task {task_id}");
            None
        }
    }

    /// Set a task's source text once.  Returns `true` if it was stored.
    fn store_source(&self, st: &mut EngineState, task_id: TaskId, text: String) -> bool {
        let Some(task) = st.registry.get_mut(task_id) else {
            return false;
        };
        if task.source_text.is_some() {
            st.stats.duplicate_events += 1;
            log::debug!("engine: transcript for task {task_id} ignored (already set)");
            return false;
        }
        if task.is_completed() {
            st.stats.late_events += 1;
            log::warn!("engine: transcript for task {task_id} arrived after it completed");
            return false;
        }

        log::info!("engine: transcript for task {task_id}: {text}");
        self.inner.sink.set_task_source(task_id, &text);
        task.source_text = Some(text);
        if task.advance(TaskStatus::SourceCaptured) {
            self.inner
                .sink
                .update_task_status(task_id, TaskStatus::SourceCaptured);
        }
        true
    }

    async fn await_source_then_complete(&self, task_id: TaskId) {
        let deadline = tokio::time::Instant::now() + self.inner.config.source_wait;
        loop {
            let notified = self.inner.source_arrived.notified();
            tokio::pin!(notified);

            if self.source_settled(task_id) {
                break;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    log::warn!("engine: transcript for task {task_id} did not arrive in time");
                    break;
                }
                _ = self.inner.shutdown.wait() => break,
            }
        }

        let mut st = self.lock();
        self.complete_locked(&mut st, task_id);
    }

    /// `true` when the task has its source or no longer needs one.
    fn source_settled(&self, task_id: TaskId) -> bool {
        self.lock()
            .registry
            .get(task_id)
            .map_or(true, |t| t.source_text.is_some() || t.is_completed())
    }

    fn complete_locked(&self, st: &mut EngineState, task_id: TaskId) {
        let Some(task) = st.registry.get_mut(task_id) else {
            st.stats.late_events += 1;
            log::warn!("engine: task {task_id} evicted before it could complete");
            return;
        };
        if task.is_completed() {
            return;
        }

        task.status = TaskStatus::Completed;
        let source = task.source_or_marker().to_owned();
        let translation = task.translation_text.clone().unwrap_or_default();
        st.stats.tasks_completed += 1;
        log::info!("engine: task {task_id} completed");
        self.inner.sink.complete_task(task_id, &source, &translation);

        let evicted = st.registry.evict_over_cap();
        self.record_evictions(st, evicted);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
