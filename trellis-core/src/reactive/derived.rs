//! Derived Signal Implementation
//!
//! A derived signal wraps a pure computation over other signals and exposes
//! its result as an ordinary [`Signal`].
//!
//! # How Derived Signals Work
//!
//! 1. On construction the computation runs inside a reactive context. Every
//!    signal it reads subscribes the derivation.
//!
//! 2. When any of those signals changes, the derivation is scheduled like
//!    every other subscriber. When its task runs, recomputation happens
//!    synchronously: old subscriptions are cancelled, the computation runs
//!    again under tracking, and the fresh read set becomes the new
//!    dependency list.
//!
//! 3. The result is written through [`Signal::set`], so downstream
//!    subscribers hear about it only if the value actually changed.
//!
//! # Ownership
//!
//! The output signal anchors the derivation. Source signals hold only a
//! weak handle to it, so a derived signal nobody reads any more stops
//! recomputing once its last handle is dropped.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::signal::{Signal, Subscription, WeakSignal};
use super::subscriber::{Subscriber, SubscriberId};
use crate::runtime::{InstanceId, Runtime};

/// Lifecycle of a derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedStatus {
    /// The output reflects the current dependency values.
    Clean,

    /// A dependency changed and the recompute task has not run yet.
    Dirty,

    /// Subscriptions were cancelled; the derivation will never run again.
    Disposed,
}

struct DerivedState {
    status: DerivedStatus,
    dependencies: SmallVec<[Subscription; 4]>,
    runs: usize,
}

/// The computation behind a derived signal.
pub(crate) struct Derivation<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    compute: Mutex<Arc<dyn Fn() -> T + Send + Sync>>,
    output: Mutex<Option<WeakSignal<T>>>,
    subscriber: SubscriberId,
    owner: Option<InstanceId>,
    state: Mutex<DerivedState>,
}

impl<T> Derivation<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Build the derivation, run it once, and return its output signal.
    pub(crate) fn create<F>(runtime: &Runtime, owner: Option<InstanceId>, compute: F) -> (Signal<T>, Arc<Self>)
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let derivation = Arc::new(Self {
            compute: Mutex::new(Arc::new(compute)),
            output: Mutex::new(None),
            subscriber: SubscriberId::new(),
            owner,
            state: Mutex::new(DerivedState {
                status: DerivedStatus::Dirty,
                dependencies: SmallVec::new(),
                runs: 0,
            }),
        });

        let initial = derivation.evaluate();
        let output = Signal::new(runtime, initial);
        *derivation.output.lock() = Some(output.downgrade());
        output.anchor(Arc::clone(&derivation) as Arc<dyn std::any::Any + Send + Sync>);

        (output, derivation)
    }

    pub(crate) fn status(&self) -> DerivedStatus {
        self.state.lock().status
    }

    pub(crate) fn runs(&self) -> usize {
        self.state.lock().runs
    }

    pub(crate) fn dependency_count(&self) -> usize {
        self.state.lock().dependencies.len()
    }

    /// Swap in a new computation and recompute right away.
    pub(crate) fn replace<F>(self: &Arc<Self>, compute: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        *self.compute.lock() = Arc::new(compute);
        self.recompute();
    }

    /// Cancel every subscription and stop recomputing.
    pub(crate) fn dispose(&self) {
        let dependencies = {
            let mut state = self.state.lock();
            state.status = DerivedStatus::Disposed;
            std::mem::take(&mut state.dependencies)
        };
        for dependency in &dependencies {
            dependency.cancel();
        }
    }

    fn subscriber(self: &Arc<Self>) -> Subscriber {
        let weak: Weak<Self> = Arc::downgrade(self);
        Subscriber::with_id(self.subscriber, self.owner, move || {
            if let Some(derivation) = weak.upgrade() {
                derivation.recompute();
            }
        })
    }

    /// Run the computation under tracking and replace the dependency list.
    fn evaluate(self: &Arc<Self>) -> T {
        let stale = std::mem::take(&mut self.state.lock().dependencies);
        for dependency in &stale {
            dependency.cancel();
        }

        let (value, dependencies) = {
            let _ctx = ReactiveContext::enter(self.subscriber());
            let compute = Arc::clone(&*self.compute.lock());
            let value = compute();
            (value, ReactiveContext::take_dependencies())
        };

        let mut state = self.state.lock();
        state.dependencies = dependencies;
        state.status = DerivedStatus::Clean;
        state.runs += 1;
        value
    }

    fn recompute(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.status == DerivedStatus::Disposed {
                return;
            }
            state.status = DerivedStatus::Dirty;
        }

        let output = self.output.lock().as_ref().and_then(WeakSignal::upgrade);
        let Some(output) = output else {
            self.dispose();
            return;
        };

        let value = self.evaluate();
        output.set(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn runtime() -> Runtime {
        Runtime::new(EngineConfig::default())
    }

    #[test]
    fn derived_computes_on_construction() {
        let rt = runtime();
        let a = rt.signal(2);
        let a_clone = a.clone();
        let (doubled, derivation) = Derivation::create(&rt, None, move || a_clone.get() * 2);

        assert_eq!(doubled.get(), 4);
        assert_eq!(derivation.runs(), 1);
        assert_eq!(derivation.status(), DerivedStatus::Clean);
        assert_eq!(derivation.dependency_count(), 1);
    }

    #[test]
    fn derived_recomputes_on_flush() {
        let rt = runtime();
        let a = rt.signal(1);
        let b = rt.signal(2);
        let (a2, b2) = (a.clone(), b.clone());
        let (sum, derivation) = Derivation::create(&rt, None, move || a2.get() + b2.get());

        assert_eq!(sum.get(), 3);
        a.set(5);
        // Storage is immediate, recomputation waits for the flush.
        assert_eq!(sum.get(), 3);
        assert_eq!(derivation.status(), DerivedStatus::Clean);

        rt.flush();
        assert_eq!(sum.get(), 7);
        assert_eq!(derivation.runs(), 2);
    }

    #[test]
    fn two_sources_in_one_tick_recompute_once() {
        let rt = runtime();
        let a = rt.signal(1);
        let b = rt.signal(1);
        let calls = Arc::new(AtomicI32::new(0));
        let (a2, b2, calls2) = (a.clone(), b.clone(), calls.clone());
        let (_sum, _derivation) = Derivation::create(&rt, None, move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            a2.get() + b2.get()
        });

        a.set(10);
        b.set(20);
        rt.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dependencies_follow_the_last_run() {
        let rt = runtime();
        let flag = rt.signal(true);
        let left = rt.signal(1);
        let right = rt.signal(2);
        let (f, l, r) = (flag.clone(), left.clone(), right.clone());
        let (picked, _derivation) = Derivation::create(&rt, None, move || if f.get() { l.get() } else { r.get() });

        assert_eq!(left.subscriber_count(), 1);
        assert_eq!(right.subscriber_count(), 0);

        flag.set(false);
        rt.flush();
        assert_eq!(picked.get(), 2);
        assert_eq!(left.subscriber_count(), 0);
        assert_eq!(right.subscriber_count(), 1);
    }

    #[test]
    fn unchanged_result_does_not_notify_downstream() {
        let rt = runtime();
        let a = rt.signal(3);
        let a2 = a.clone();
        let (parity, _derivation) = Derivation::create(&rt, None, move || a2.get() % 2);
        let downstream = Arc::new(AtomicI32::new(0));
        let downstream2 = downstream.clone();
        parity.subscribe(move || {
            downstream2.fetch_add(1, Ordering::SeqCst);
        });

        a.set(5);
        rt.flush();
        rt.flush();
        assert_eq!(parity.get(), 1);
        assert_eq!(downstream.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn replacing_the_computation_recomputes_in_place() {
        let rt = runtime();
        let a = rt.signal(3);
        let b = rt.signal(4);
        let a2 = a.clone();
        let (out, derivation) = Derivation::create(&rt, None, move || a2.get());

        let b2 = b.clone();
        derivation.replace(move || b2.get() * 2);
        assert_eq!(out.get(), 8);
        assert_eq!(derivation.runs(), 2);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn disposed_derivation_stops() {
        let rt = runtime();
        let a = rt.signal(1);
        let a2 = a.clone();
        let (out, derivation) = Derivation::create(&rt, None, move || a2.get());

        derivation.dispose();
        assert_eq!(a.subscriber_count(), 0);
        a.set(2);
        rt.flush();
        assert_eq!(out.get(), 1);
        assert_eq!(derivation.status(), DerivedStatus::Disposed);
    }
}
