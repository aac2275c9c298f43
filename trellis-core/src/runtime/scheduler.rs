//! Task Scheduler
//!
//! The scheduler decouples "a value changed" from "the UI is updated". Work
//! is queued as tasks and run in one batch on the next cooperative tick.
//!
//! # Batching
//!
//! 1. Tasks are appended to a single pending set. The first task added to an
//!    empty set marks a flush as scheduled and wakes whoever drives the
//!    engine.
//!
//! 2. A flush takes the whole pending set and clears it *before* running
//!    anything, so tasks queued while a batch runs land in the next batch.
//!
//! 3. Tasks queued on behalf of a subscriber are keyed by its id. A
//!    subscriber notified several times before the flush appears once, at
//!    the position of its first notification.
//!
//! Running the tasks is the runtime's job (see [`Runtime::flush`]), since it
//! needs the registry to skip tasks whose owner died in the meantime.
//!
//! [`Runtime::flush`]: super::Runtime::flush

use std::fmt;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::InstanceId;
use crate::reactive::SubscriberId;

/// Deferred work.
pub type Action = Box<dyn FnOnce() + Send>;

/// A deferred action and the instance that owns it, if any.
pub struct Task {
    action: Action,
    owner: Option<InstanceId>,
}

impl Task {
    pub fn new<F>(owner: Option<InstanceId>, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Box::new(action),
            owner,
        }
    }

    pub fn owner(&self) -> Option<InstanceId> {
        self.owner
    }

    pub(crate) fn into_parts(self) -> (Option<InstanceId>, Action) {
        (self.owner, self.action)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("owner", &self.owner).finish()
    }
}

/// Deduplication key for pending tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TaskKey {
    Subscriber(SubscriberId),
    Anonymous(u64),
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Tasks that ran to completion.
    pub executed: usize,
    /// Tasks dropped because their owner was no longer live.
    pub skipped: usize,
    /// Tasks that panicked.
    pub failed: usize,
}

impl FlushStats {
    pub fn total(&self) -> usize {
        self.executed + self.skipped + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for FlushStats {
    fn add_assign(&mut self, other: Self) {
        self.executed += other.executed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// The pending batch.
pub struct Scheduler {
    pending: Mutex<IndexMap<TaskKey, Task>>,
    flush_scheduled: AtomicBool,
    next_seq: AtomicU64,
    wake: Notify,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(IndexMap::new()),
            flush_scheduled: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            wake: Notify::new(),
        }
    }

    pub(crate) fn anonymous_key(&self) -> TaskKey {
        TaskKey::Anonymous(self.next_seq.fetch_add(1, Ordering::Relaxed))
    }

    /// Queue a task. Returns `false` if a task with the same key is already
    /// pending; the earlier one keeps its place.
    pub(crate) fn push(&self, key: TaskKey, task: Task) -> bool {
        let inserted = {
            let mut pending = self.pending.lock();
            if pending.contains_key(&key) {
                false
            } else {
                pending.insert(key, task);
                true
            }
        };
        if inserted && !self.flush_scheduled.swap(true, Ordering::AcqRel) {
            self.wake.notify_one();
        }
        inserted
    }

    /// Capture and clear the pending set.
    pub(crate) fn take_batch(&self) -> Vec<Task> {
        let batch = {
            let mut pending = self.pending.lock();
            self.flush_scheduled.store(false, Ordering::Release);
            std::mem::take(&mut *pending)
        };
        batch.into_values().collect()
    }

    /// Drop every pending task owned by `owner`.
    pub fn clear(&self, owner: InstanceId) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, task| task.owner != Some(owner));
        if pending.is_empty() {
            self.flush_scheduled.store(false, Ordering::Release);
        }
        before - pending.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Whether a flush has been requested since the last batch was taken.
    pub fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled.load(Ordering::Acquire)
    }

    /// Resolves once a flush is scheduled. A request made while nobody was
    /// waiting is remembered, so this never misses a tick.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending_len())
            .field("flush_scheduled", &self.is_flush_scheduled())
            .finish()
    }
}
