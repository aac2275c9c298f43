//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values:
//! derived signals, effect sites, and the live text/property bindings the
//! executor creates. Notifying a subscriber never runs it inline; the signal
//! hands it to the scheduler, which coalesces repeated notifications of the
//! same subscriber within one batch.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::runtime::InstanceId;

/// Unique identifier for a subscriber.
///
/// The scheduler keys pending notifications by this id, so one subscriber
/// runs at most once per batch no matter how many of its sources changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback run when a subscriber is notified.
pub type Notify = Arc<dyn Fn() + Send + Sync>;

/// A subscriber to reactive values.
///
/// Carries the instance that owns it, if any. Notifications for a subscriber
/// whose owner has been unmounted are dropped by the scheduler.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    owner: Option<InstanceId>,
    notify: Notify,
}

impl Subscriber {
    /// Create a free-standing subscriber with a fresh id.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_id(SubscriberId::new(), None, notify)
    }

    /// Create a subscriber owned by `owner`.
    pub fn owned<F>(owner: InstanceId, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_id(SubscriberId::new(), Some(owner), notify)
    }

    /// Create a subscriber with a caller-chosen id. Computations that
    /// re-subscribe on every run reuse their id so the scheduler keeps
    /// deduplicating them.
    pub fn with_id<F>(id: SubscriberId, owner: Option<InstanceId>, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            owner,
            notify: Arc::new(notify),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn owner(&self) -> Option<InstanceId> {
        self.owner
    }

    /// Run the notification callback now.
    pub fn notify(&self) {
        (self.notify)();
    }

    pub(crate) fn notifier(&self) -> Notify {
        Arc::clone(&self.notify)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish()
    }
}
