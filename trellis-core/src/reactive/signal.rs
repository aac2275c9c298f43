//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (derived signal or
//!    effect dependency evaluation), the signal registers that context as a
//!    subscriber.
//!
//! 2. When a signal's value changes, every subscriber is handed to the
//!    scheduler of the runtime that created the signal. Storage is
//!    synchronous; notification happens on the next flush.
//!
//! 3. Setting a value equal to the current one is a no-op: no subscriber is
//!    notified and nothing is scheduled.
//!
//! # Ownership
//!
//! Subscribers are held by the signal; the computations behind them hold
//! only weak [`Subscription`] handles back to the signal. A computation
//! cancels its subscriptions before re-running and when it is disposed.
//! The signal keeps a weak handle to its runtime, so dropping the runtime
//! does not leak through long-lived signals.

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, SubscriberId};
use crate::runtime::{Runtime, WeakRuntime};

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(u64);

impl SignalId {
    fn next() -> Self {
        Self(SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Type-erased view of a signal used by computations that only need to
/// subscribe and compare identities.
pub trait Source: Send + Sync {
    fn id(&self) -> SignalId;

    /// Number of successful writes so far.
    fn version(&self) -> u64;

    /// Register `subscriber` and return the handle that cancels it.
    fn subscribe(self: Arc<Self>, subscriber: Subscriber) -> Subscription;

    fn unsubscribe(&self, subscriber: SubscriberId);
}

/// A source that can render its current value as text. Reactive text nodes
/// and property bindings are built on this.
pub trait TextSource: Source {
    /// Current value as text, read without tracking.
    fn render(&self) -> String;
}

/// Handle to one subscriber registered on one signal.
///
/// Holds the signal weakly; cancelling after the signal is gone is a no-op.
#[derive(Clone)]
pub struct Subscription {
    source: Weak<dyn Source>,
    source_id: SignalId,
    subscriber: SubscriberId,
}

impl Subscription {
    pub fn source_id(&self) -> SignalId {
        self.source_id
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber
    }

    /// Remove the subscriber from the signal.
    pub fn cancel(&self) {
        if let Some(source) = self.source.upgrade() {
            source.unsubscribe(self.subscriber);
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("source", &self.source_id)
            .field("subscriber", &self.subscriber)
            .finish()
    }
}

struct SignalInner<T> {
    id: SignalId,
    version: AtomicU64,
    value: RwLock<T>,
    subscribers: Mutex<IndexMap<SubscriberId, Subscriber>>,
    runtime: WeakRuntime,
    /// Keeps the computation behind a derived signal alive for as long as
    /// the signal itself is reachable.
    anchor: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl<T> SignalInner<T> {
    fn insert(&self, subscriber: Subscriber) {
        self.subscribers.lock().insert(subscriber.id(), subscriber);
    }
}

impl<T> Source for SignalInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn id(&self) -> SignalId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn subscribe(self: Arc<Self>, subscriber: Subscriber) -> Subscription {
        let id = subscriber.id();
        self.insert(subscriber);
        let source: Weak<dyn Source> = Arc::downgrade(&self) as Weak<dyn Source>;
        Subscription {
            source,
            source_id: self.id,
            subscriber: id,
        }
    }

    fn unsubscribe(&self, subscriber: SubscriberId) {
        self.subscribers.lock().shift_remove(&subscriber);
    }
}

impl<T> TextSource for SignalInner<T>
where
    T: Clone + PartialEq + Display + Send + Sync + 'static,
{
    fn render(&self) -> String {
        self.value.read().to_string()
    }
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use trellis_core::{EngineConfig, Runtime};
///
/// let runtime = Runtime::new(EngineConfig::default());
/// let count = runtime.signal(0);
///
/// assert!(count.set(5));
/// assert!(!count.set(5)); // equal value, nothing happens
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a signal whose notifications go through `runtime`'s scheduler.
    pub(crate) fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: SignalId::next(),
                version: AtomicU64::new(0),
                value: RwLock::new(value),
                subscribers: Mutex::new(IndexMap::new()),
                runtime: runtime.downgrade(),
                anchor: Mutex::new(None),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Number of writes that changed the value.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.read().clone()
    }

    /// Borrow the current value, tracking the read like [`Signal::get`].
    ///
    /// The value stays read-locked while `f` runs, so `f` must not write
    /// this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.read())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and schedule every subscriber.
    ///
    /// Returns `false` (and does nothing else) when the value equals the
    /// current one.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        self.notify_subscribers();
        true
    }

    /// Update the value using a function of the current one.
    ///
    /// `f` runs on a snapshot with no lock held, so it may read or write
    /// this signal. Its result is what gets stored.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.inner.value.read().clone();
        let next = f(&current);
        self.set(next)
    }

    /// Register a free-standing callback, scheduled after every change.
    pub fn subscribe<F>(&self, notify: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::clone(&self.inner).subscribe(Subscriber::new(notify))
    }

    /// Register a prepared subscriber.
    pub fn subscribe_with(&self, subscriber: Subscriber) -> Subscription {
        Arc::clone(&self.inner).subscribe(subscriber)
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber: SubscriberId) {
        self.inner.unsubscribe(subscriber);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Type-erased handle, used for effect dependencies.
    pub fn source(&self) -> Arc<dyn Source> {
        Arc::clone(&self.inner) as Arc<dyn Source>
    }

    pub fn downgrade(&self) -> WeakSignal<T> {
        WeakSignal {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn anchor(&self, keep_alive: Arc<dyn Any + Send + Sync>) {
        *self.inner.anchor.lock() = Some(keep_alive);
    }

    fn track(&self) {
        let Some(subscriber) = ReactiveContext::current_subscriber() else {
            return;
        };
        if ReactiveContext::is_tracked(self.inner.id) {
            return;
        }
        let subscription = Arc::clone(&self.inner).subscribe(subscriber);
        ReactiveContext::track_dependency(subscription);
    }

    /// Hand every subscriber to the scheduler.
    fn notify_subscribers(&self) {
        let subscribers: Vec<Subscriber> = self.inner.subscribers.lock().values().cloned().collect();
        if subscribers.is_empty() {
            return;
        }
        let Some(runtime) = self.inner.runtime.upgrade() else {
            tracing::debug!(signal = ?self.inner.id, "runtime dropped; change not propagated");
            return;
        };
        for subscriber in &subscribers {
            runtime.schedule_subscriber(subscriber);
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Display + Send + Sync + 'static,
{
    /// Type-erased handle that can render the value as text.
    pub fn text_source(&self) -> Arc<dyn TextSource> {
        Arc::clone(&self.inner) as Arc<dyn TextSource>
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Weak handle to a signal.
pub struct WeakSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Weak<SignalInner<T>>,
}

impl<T> WeakSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn upgrade(&self) -> Option<Signal<T>> {
        self.inner.upgrade().map(|inner| Signal { inner })
    }
}

impl<T> Clone for WeakSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
