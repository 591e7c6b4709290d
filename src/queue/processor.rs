//! Queue processor: accepts actions and drains them when reachable.
//!
//! All queue state sits behind one async mutex, so the processor and its
//! retry scheduler are the only in-process writers. The lock is held
//! across persistence but never across a remote call.
//!
//! Other processes may share the persisted queue. Every write re-reads it
//! and folds in what they added or resolved since this processor last
//! synced with it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::action::{insert_sorted, new_action_id, sort_actions, ActionType, QueuedAction};
use super::connectivity::BackgroundSync;
use super::dispatch::DispatchTable;
use super::notify::{DrainReport, Notifier, TracingNotifier};
use super::retry::{RetryDecision, RetryPolicy, RetryScheduler};
use super::store::QueueStore;
use crate::core::{Clock, SystemClock};

/// Tag used for background sync registration unless configured otherwise.
pub const DEFAULT_SYNC_TAG: &str = "sync-offline-queue";

/// What the processor is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Reachable with nothing being drained.
    Idle,
    /// A drain loop is running.
    Draining,
    /// Unreachable; nothing is dispatched.
    Paused,
}

/// Per-call enqueue overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Use this priority instead of the type's default.
    pub priority: Option<i32>,
}

/// Counts for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Actions waiting in the active queue.
    pub pending: usize,
    /// Actions waiting out a retry backoff.
    pub in_backoff: usize,
    /// Creation time of the oldest unresolved action.
    pub oldest: Option<DateTime<Utc>>,
}

/// Collaborators and tuning for a [`QueueProcessor`].
pub struct ProcessorOptions {
    /// Retry budget and backoff base.
    pub policy: RetryPolicy,
    /// Receives one summary per drain pass.
    pub notifier: Arc<dyn Notifier>,
    /// Timestamps new actions.
    pub clock: Arc<dyn Clock>,
    /// Host facility asked to finish syncing in the background on resume.
    pub background_sync: Option<Arc<dyn BackgroundSync>>,
    /// Tag passed to `background_sync`.
    pub sync_tag: String,
    /// Connectivity at construction time.
    pub reachable: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            background_sync: None,
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            reachable: true,
        }
    }
}

struct Inner {
    pending: Vec<QueuedAction>,
    scheduler: RetryScheduler,
    state: ProcessorState,
    /// Ids in the persisted queue as of our last read or write.
    synced: HashSet<String>,
}

impl Inner {
    fn contains(&self, id: &str) -> bool {
        self.scheduler.contains(id) || self.pending.iter().any(|a| a.id == id)
    }

    fn count(&self) -> usize {
        self.pending.len() + self.scheduler.len()
    }

    /// Everything unresolved, in dispatch order.
    fn snapshot(&self) -> Vec<QueuedAction> {
        let mut all: Vec<QueuedAction> = self
            .pending
            .iter()
            .chain(self.scheduler.held())
            .cloned()
            .collect();
        sort_actions(&mut all);
        all
    }

    /// Fold another writer's changes into ours. Returns whether a held
    /// action was dropped.
    fn reconcile(&mut self, persisted: Vec<QueuedAction>) -> bool {
        let stored: HashSet<&str> = persisted.iter().map(|a| a.id.as_str()).collect();
        let resolved: Vec<String> = self
            .synced
            .iter()
            .filter(|id| !stored.contains(id.as_str()))
            .cloned()
            .collect();

        let mut timers_changed = false;
        for id in &resolved {
            if let Some(pos) = self.pending.iter().position(|a| &a.id == id) {
                self.pending.remove(pos);
            } else if self.scheduler.cancel(id).is_some() {
                timers_changed = true;
            }
        }

        let mut adopted = 0_usize;
        for action in persisted {
            if !self.synced.contains(&action.id) && !self.contains(&action.id) {
                insert_sorted(&mut self.pending, action);
                adopted += 1;
            }
        }
        if adopted > 0 || !resolved.is_empty() {
            tracing::debug!(adopted, resolved = resolved.len(), "merged changes from another writer");
        }
        timers_changed
    }

    fn release_due(&mut self, now: Instant) -> usize {
        let due = self.scheduler.take_due(now);
        let released = due.len();
        for action in due {
            insert_sorted(&mut self.pending, action);
        }
        released
    }
}

struct Shared {
    inner: Mutex<Inner>,
    store: QueueStore,
    dispatch: DispatchTable,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    background_sync: Option<Arc<dyn BackgroundSync>>,
    sync_tag: String,
    reachable: AtomicBool,
    draining: AtomicBool,
    timers_changed: Notify,
    status: watch::Sender<usize>,
    shutdown: watch::Sender<bool>,
    timer_task: StdMutex<Option<JoinHandle<()>>>,
}

/// Handle to the offline queue. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct QueueProcessor {
    shared: Arc<Shared>,
}

impl QueueProcessor {
    /// Load the persisted queue and build a processor with default options.
    pub async fn open(store: QueueStore, dispatch: DispatchTable) -> Self {
        Self::with_options(store, dispatch, ProcessorOptions::default()).await
    }

    /// Load the persisted queue and build a processor.
    pub async fn with_options(
        store: QueueStore,
        dispatch: DispatchTable,
        options: ProcessorOptions,
    ) -> Self {
        let mut pending = store.load().await;
        let mut seen = HashSet::new();
        pending.retain(|a| seen.insert(a.id.clone()));

        let state = if options.reachable {
            ProcessorState::Idle
        } else {
            ProcessorState::Paused
        };
        let synced = pending.iter().map(|a| a.id.clone()).collect();
        let (status, _) = watch::channel(pending.len());
        let (shutdown, _) = watch::channel(false);

        tracing::debug!(pending = pending.len(), "queue loaded");

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    pending,
                    scheduler: RetryScheduler::new(options.policy),
                    state,
                    synced,
                }),
                store,
                dispatch,
                notifier: options.notifier,
                clock: options.clock,
                background_sync: options.background_sync,
                sync_tag: options.sync_tag,
                reachable: AtomicBool::new(options.reachable),
                draining: AtomicBool::new(false),
                timers_changed: Notify::new(),
                status,
                shutdown,
                timer_task: StdMutex::new(None),
            }),
        }
    }

    /// Spawn the task that returns actions to the queue when their backoff
    /// ends. Calling it again is a no-op.
    pub fn start(&self) {
        let mut task = self
            .shared
            .timer_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let shutdown = self.shared.shutdown.subscribe();
        *task = Some(tokio::spawn(self.clone().run_timers(shutdown)));
    }

    /// Stop the timer task. Held actions stay persisted with their retry
    /// counts and are attempted fresh by the next process.
    pub async fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
        let task = self
            .shared
            .timer_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Queue an action. Starts a drain in the background when reachable.
    pub async fn enqueue(
        &self,
        action_type: ActionType,
        data: serde_json::Value,
        options: EnqueueOptions,
    ) -> String {
        let mut action = QueuedAction::new(action_type, data, self.shared.clock.now());
        if let Some(priority) = options.priority {
            action.priority = priority;
        }

        let id = {
            let mut inner = self.shared.inner.lock().await;
            while inner.contains(&action.id) {
                action.id = new_action_id();
            }
            let id = action.id.clone();
            tracing::debug!(
                action_id = %id,
                action_type = %action.action_type,
                priority = action.priority,
                "action queued"
            );
            insert_sorted(&mut inner.pending, action);
            self.persist(&mut inner).await;
            id
        };

        if self.is_reachable() {
            let _ = self.spawn_drain();
        }
        id
    }

    /// Drop an action whether it is queued or in backoff.
    pub async fn remove(&self, id: &str) -> bool {
        let mut inner = self.shared.inner.lock().await;
        if let Some(pos) = inner.pending.iter().position(|a| a.id == id) {
            inner.pending.remove(pos);
        } else if inner.scheduler.cancel(id).is_some() {
            self.shared.timers_changed.notify_one();
        } else {
            return false;
        }
        self.persist(&mut inner).await;
        tracing::debug!(action_id = id, "action removed");
        true
    }

    /// Drop every action.
    pub async fn clear(&self) -> usize {
        let mut inner = self.shared.inner.lock().await;
        let dropped = inner.count();
        inner.pending.clear();
        inner.scheduler.cancel_all();
        self.shared.timers_changed.notify_one();
        self.persist(&mut inner).await;
        dropped
    }

    /// Number of unresolved actions, including those in backoff.
    pub async fn count(&self) -> usize {
        self.shared.inner.lock().await.count()
    }

    /// Snapshot of unresolved actions in dispatch order.
    pub async fn list_pending(&self) -> Vec<QueuedAction> {
        self.shared.inner.lock().await.snapshot()
    }

    /// Counts for status displays.
    pub async fn stats(&self) -> QueueStats {
        let inner = self.shared.inner.lock().await;
        let oldest = inner
            .pending
            .iter()
            .chain(inner.scheduler.held())
            .map(|a| a.created_at)
            .min();
        QueueStats {
            pending: inner.pending.len(),
            in_backoff: inner.scheduler.len(),
            oldest,
        }
    }

    /// Current state.
    pub async fn state(&self) -> ProcessorState {
        self.shared.inner.lock().await.state
    }

    /// Whether the remote is believed reachable.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.shared.reachable.load(Ordering::SeqCst)
    }

    /// Receive the unresolved-action count after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.shared.status.subscribe()
    }

    /// Connectivity lost: stop draining at the next safe point and cancel
    /// every backoff timer. Held actions go back to the queue so they are
    /// attempted as soon as connectivity returns.
    pub async fn pause(&self) {
        self.shared.reachable.store(false, Ordering::SeqCst);
        let mut inner = self.shared.inner.lock().await;
        inner.state = ProcessorState::Paused;
        let released = inner.scheduler.cancel_all();
        let cancelled = released.len();
        for action in released {
            insert_sorted(&mut inner.pending, action);
        }
        self.shared.timers_changed.notify_one();
        tracing::info!(pending = inner.pending.len(), cancelled, "connectivity lost, queue paused");
    }

    /// Connectivity restored: ask the host to sync in the background, then
    /// drain in-process as well.
    pub async fn resume(&self) -> JoinHandle<Option<DrainReport>> {
        self.shared.reachable.store(true, Ordering::SeqCst);
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.state == ProcessorState::Paused {
                // A drain from before the pause may still be finishing its call
                inner.state = if self.shared.draining.load(Ordering::SeqCst) {
                    ProcessorState::Draining
                } else {
                    ProcessorState::Idle
                };
            }
            tracing::info!(pending = inner.count(), "connectivity restored");
        }

        if let Some(background) = &self.shared.background_sync {
            if let Err(e) = background.register(&self.shared.sync_tag).await {
                tracing::debug!(tag = %self.shared.sync_tag, error = %e, "background sync registration failed");
            }
        }

        self.spawn_drain()
    }

    fn spawn_drain(&self) -> JoinHandle<Option<DrainReport>> {
        let processor = self.clone();
        tokio::spawn(async move { processor.drain_now().await })
    }

    /// Drain the queue now.
    ///
    /// Returns `None` without doing anything when unreachable or when
    /// another drain is already running; that drain picks up anything
    /// queued after it started.
    pub async fn drain_now(&self) -> Option<DrainReport> {
        if !self.is_reachable() {
            tracing::debug!("drain skipped, unreachable");
            return None;
        }
        if !self.try_begin_drain() {
            tracing::debug!("drain already running");
            return None;
        }

        let mut total = DrainReport::default();
        loop {
            let report = self.run_pass().await;
            self.shared.draining.store(false, Ordering::SeqCst);

            if report.attempted() > 0 {
                self.shared.notifier.notify(&report.message(), report.level());
            }
            total.succeeded += report.succeeded;
            total.failed += report.failed;
            total.retried += report.retried;
            total.pending = report.pending;
            total.failed_ids.extend(report.failed_ids);

            // A trigger that arrived while we were finishing was coalesced
            if !self.is_reachable() || !self.has_ready().await || !self.try_begin_drain() {
                break;
            }
        }
        Some(total)
    }

    fn try_begin_drain(&self) -> bool {
        self.shared
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn has_ready(&self) -> bool {
        !self.shared.inner.lock().await.pending.is_empty()
    }

    async fn run_pass(&self) -> DrainReport {
        let mut report = DrainReport::default();
        {
            let mut inner = self.shared.inner.lock().await;
            inner.state = ProcessorState::Draining;
            if inner.release_due(Instant::now()) > 0 {
                self.persist(&mut inner).await;
            }
        }

        while self.is_reachable() {
            let Some(action) = self.shared.inner.lock().await.pending.first().cloned() else {
                break;
            };

            let result = self.shared.dispatch.dispatch(&action).await;

            let mut inner = self.shared.inner.lock().await;
            let Some(pos) = inner.pending.iter().position(|a| a.id == action.id) else {
                // Removed while in flight
                continue;
            };
            let action = inner.pending.remove(pos);

            match result {
                Ok(()) => {
                    tracing::debug!(action_id = %action.id, action_type = %action.action_type, "action synced");
                    report.succeeded += 1;
                }
                Err(e) if e.is_terminal() => {
                    tracing::warn!(
                        action_id = %action.id,
                        action_type = %action.action_type,
                        retries = action.retries,
                        error = %e,
                        "action dropped"
                    );
                    report.failed += 1;
                    report.failed_ids.push(action.id);
                }
                Err(e) => match inner.scheduler.on_failure(action.clone(), Instant::now()) {
                    RetryDecision::Scheduled { delay, retries, .. } => {
                        tracing::warn!(
                            action_id = %action.id,
                            action_type = %action.action_type,
                            retries,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %e,
                            "action failed, retry scheduled"
                        );
                        report.retried += 1;
                        self.shared.timers_changed.notify_one();
                    }
                    RetryDecision::Exhausted(dropped) => {
                        tracing::warn!(
                            action_id = %dropped.id,
                            action_type = %dropped.action_type,
                            retries = dropped.retries,
                            error = %e,
                            "retries exhausted, action dropped"
                        );
                        report.failed += 1;
                        report.failed_ids.push(dropped.id);
                    }
                },
            }

            self.persist(&mut inner).await;
        }

        let mut inner = self.shared.inner.lock().await;
        report.pending = inner.count();
        inner.state = if self.is_reachable() {
            ProcessorState::Idle
        } else {
            ProcessorState::Paused
        };
        report
    }

    async fn run_timers(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let next = self.shared.inner.lock().await.scheduler.next_deadline();
            let changed = self.shared.timers_changed.notified();

            match next {
                Some(deadline) => tokio::select! {
                    () = tokio::time::sleep_until(deadline) => self.fire_due().await,
                    () = changed => {}
                    _ = shutdown.changed() => {}
                },
                None => tokio::select! {
                    () = changed => {}
                    _ = shutdown.changed() => {}
                },
            }
        }
        tracing::debug!("retry timer stopped");
    }

    async fn fire_due(&self) {
        {
            let mut inner = self.shared.inner.lock().await;
            let released = inner.release_due(Instant::now());
            if released == 0 {
                return;
            }
            tracing::debug!(released, "backoff elapsed, actions requeued");
            self.persist(&mut inner).await;
        }

        if self.is_reachable() {
            let _ = self.spawn_drain();
        }
    }

    async fn persist(&self, inner: &mut Inner) {
        let mut timers_changed = false;
        let saved = self
            .shared
            .store
            .update(|persisted| {
                if let Some(persisted) = persisted {
                    timers_changed = inner.reconcile(persisted);
                }
                inner.snapshot()
            })
            .await;

        if saved {
            inner.synced = inner
                .pending
                .iter()
                .chain(inner.scheduler.held())
                .map(|a| a.id.clone())
                .collect();
        }
        if timers_changed {
            self.shared.timers_changed.notify_one();
        }
        self.shared.status.send_replace(inner.count());
    }
}
