//! Effect Implementation
//!
//! An effect is a side-effecting computation attached to a component
//! instance. Each call site inside a component body owns one
//! [`EffectSite`], found again on later renders by its position in the
//! body (the instance's hook cursor).
//!
//! # How Effects Work
//!
//! 1. On every invocation the optional dependency function runs inside a
//!    reactive context, so signals it reads re-invoke the site when they
//!    change.
//!
//! 2. The new dependency list is compared position by position with the one
//!    saved on the previous run. Values compare by equality; signals compare
//!    by identity and version, so a write to a watched signal counts as a
//!    change.
//!
//! 3. On the first run, or when the list changed, the previous cleanup runs,
//!    the body runs, its cleanup is kept, and every signal in the list is
//!    watched so that a write to it re-invokes the site on the owner's
//!    scheduler batch.
//!
//! # Cleanup
//!
//! The site registers one cleanup handle with its instance. Unmounting the
//! instance runs the pending body cleanup and cancels every subscription
//! the site holds.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::signal::{Signal, Source, Subscription};
use super::subscriber::{Subscriber, SubscriberId};
use crate::runtime::{Cleanup, InstanceId, WeakRuntime};

/// Effect body. The returned closure, if any, runs before the next body run
/// and when the owning instance unmounts.
pub type EffectFn = Arc<dyn Fn() -> Option<Cleanup> + Send + Sync>;

/// Produces the dependency list compared between runs.
pub type DepsFn = Arc<dyn Fn() -> Vec<Dep> + Send + Sync>;

/// One entry of an effect's dependency list.
#[derive(Clone)]
pub enum Dep {
    /// A plain value, compared by equality.
    Value(DepValue),

    /// A signal, compared by identity and version, and watched.
    Signal(Arc<dyn Source>),
}

/// Plain dependency values.
#[derive(Debug, Clone, PartialEq)]
pub enum DepValue {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
}

/// Snapshot of a dependency taken when the list is produced.
#[derive(Clone)]
struct DepSnapshot {
    dep: Dep,
    version: u64,
}

impl DepSnapshot {
    fn capture(dep: Dep) -> Self {
        let version = match &dep {
            Dep::Signal(source) => source.version(),
            Dep::Value(_) => 0,
        };
        Self { dep, version }
    }

    fn same_as(&self, other: &Self) -> bool {
        match (&self.dep, &other.dep) {
            (Dep::Value(a), Dep::Value(b)) => a == b,
            (Dep::Signal(a), Dep::Signal(b)) => a.id() == b.id() && self.version == other.version,
            _ => false,
        }
    }
}

fn same_deps(previous: &[DepSnapshot], next: &[DepSnapshot]) -> bool {
    previous.len() == next.len() && previous.iter().zip(next).all(|(a, b)| a.same_as(b))
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dep::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Dep::Signal(source) => f.debug_tuple("Signal").field(&source.id()).finish(),
        }
    }
}

impl From<()> for Dep {
    fn from(_: ()) -> Self {
        Dep::Value(DepValue::Unit)
    }
}

impl From<bool> for Dep {
    fn from(value: bool) -> Self {
        Dep::Value(DepValue::Bool(value))
    }
}

impl From<i64> for Dep {
    fn from(value: i64) -> Self {
        Dep::Value(DepValue::Int(value))
    }
}

impl From<i32> for Dep {
    fn from(value: i32) -> Self {
        Dep::Value(DepValue::Int(value.into()))
    }
}

impl From<u32> for Dep {
    fn from(value: u32) -> Self {
        Dep::Value(DepValue::Int(value.into()))
    }
}

impl From<usize> for Dep {
    fn from(value: usize) -> Self {
        Dep::Value(DepValue::Int(value as i64))
    }
}

impl From<f64> for Dep {
    fn from(value: f64) -> Self {
        Dep::Value(DepValue::Float(value))
    }
}

impl From<&str> for Dep {
    fn from(value: &str) -> Self {
        Dep::Value(DepValue::Str(value.into()))
    }
}

impl From<String> for Dep {
    fn from(value: String) -> Self {
        Dep::Value(DepValue::Str(value.into()))
    }
}

impl<T> From<&Signal<T>> for Dep
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(signal: &Signal<T>) -> Self {
        Dep::Signal(signal.source())
    }
}

struct SiteState {
    body: EffectFn,
    deps_fn: Option<DepsFn>,
    deps: Option<Vec<DepSnapshot>>,
    cleanup: Option<Cleanup>,
    subscriptions: SmallVec<[Subscription; 4]>,
    runs: usize,
    disposed: bool,
}

/// Persistent state of one effect call site on one instance.
pub(crate) struct EffectSite {
    owner: InstanceId,
    runtime: WeakRuntime,
    subscriber: SubscriberId,
    state: Mutex<SiteState>,
}

impl EffectSite {
    pub(crate) fn new(owner: InstanceId, runtime: WeakRuntime, body: EffectFn, deps_fn: Option<DepsFn>) -> Arc<Self> {
        Arc::new(Self {
            owner,
            runtime,
            subscriber: SubscriberId::new(),
            state: Mutex::new(SiteState {
                body,
                deps_fn,
                deps: None,
                cleanup: None,
                subscriptions: SmallVec::new(),
                runs: 0,
                disposed: false,
            }),
        })
    }

    /// Swap in the closures from the latest render.
    pub(crate) fn replace(&self, body: EffectFn, deps_fn: Option<DepsFn>) {
        let mut state = self.state.lock();
        state.body = body;
        state.deps_fn = deps_fn;
    }

    pub(crate) fn runs(&self) -> usize {
        self.state.lock().runs
    }

    fn subscriber(self: &Arc<Self>) -> Subscriber {
        let weak: Weak<Self> = Arc::downgrade(self);
        Subscriber::with_id(self.subscriber, Some(self.owner), move || {
            if let Some(site) = weak.upgrade() {
                site.run();
            }
        })
    }

    /// Evaluate dependencies and run the body if they changed.
    pub(crate) fn run(self: &Arc<Self>) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        if !runtime.is_alive(self.owner) {
            return;
        }

        let (deps_fn, stale) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            (state.deps_fn.clone(), std::mem::take(&mut state.subscriptions))
        };
        for subscription in &stale {
            subscription.cancel();
        }

        let (deps, mut subscriptions) = match deps_fn {
            Some(deps_fn) => {
                let _ctx = ReactiveContext::enter(self.subscriber());
                let deps: Vec<DepSnapshot> = deps_fn().into_iter().map(DepSnapshot::capture).collect();
                (deps, ReactiveContext::take_dependencies())
            }
            None => (Vec::new(), SmallVec::new()),
        };

        // Watch every signal in the list, skipping ones already read.
        for snapshot in &deps {
            if let Dep::Signal(source) = &snapshot.dep {
                if subscriptions.iter().all(|s| s.source_id() != source.id()) {
                    subscriptions.push(Arc::clone(source).subscribe(self.subscriber()));
                }
            }
        }

        let (body, previous_cleanup) = {
            let mut state = self.state.lock();
            state.subscriptions = subscriptions;
            let changed = state.deps.as_deref().map_or(true, |previous| !same_deps(previous, &deps));
            if !changed {
                return;
            }
            state.deps = Some(deps);
            (Arc::clone(&state.body), state.cleanup.take())
        };

        if let Some(cleanup) = previous_cleanup {
            runtime.run_cleanup(self.owner, cleanup);
        }

        let cleanup = runtime.run_task(Some(self.owner), || body()).ok().flatten();

        let mut state = self.state.lock();
        state.runs += 1;
        if state.disposed {
            drop(state);
            if let Some(cleanup) = cleanup {
                runtime.run_cleanup(self.owner, cleanup);
            }
            return;
        }
        state.cleanup = cleanup;
    }

    /// Run the pending cleanup and cancel every subscription.
    pub(crate) fn dispose(&self) {
        let (cleanup, subscriptions) = {
            let mut state = self.state.lock();
            state.disposed = true;
            (state.cleanup.take(), std::mem::take(&mut state.subscriptions))
        };
        for subscription in &subscriptions {
            subscription.cancel();
        }
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::runtime::Runtime;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        (count.clone(), count)
    }

    fn site(rt: &Runtime, body: EffectFn, deps: Option<DepsFn>) -> Arc<EffectSite> {
        let owner = rt.create_instance("test", None, None);
        EffectSite::new(owner, rt.downgrade(), body, deps)
    }

    #[test]
    fn dep_snapshots_compare_values_by_equality() {
        let a = DepSnapshot::capture(Dep::from(1i32));
        let b = DepSnapshot::capture(Dep::from(1i64));
        let c = DepSnapshot::capture(Dep::from("1"));
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn dep_snapshots_compare_signals_by_identity_and_version() {
        let rt = Runtime::new(EngineConfig::default());
        let signal = rt.signal(0);
        let other = rt.signal(0);

        let before = DepSnapshot::capture(Dep::from(&signal));
        assert!(before.same_as(&DepSnapshot::capture(Dep::from(&signal.clone()))));
        assert!(!before.same_as(&DepSnapshot::capture(Dep::from(&other))));

        signal.set(1);
        assert!(!before.same_as(&DepSnapshot::capture(Dep::from(&signal))));
    }

    #[test]
    fn effect_without_deps_runs_once() {
        let rt = Runtime::new(EngineConfig::default());
        let (runs, runs_clone) = counter();
        let site = site(
            &rt,
            Arc::new(move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                None
            }),
            None,
        );

        site.run();
        site.run();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(site.runs(), 1);
    }

    #[test]
    fn value_deps_gate_reruns() {
        let rt = Runtime::new(EngineConfig::default());
        let count = rt.signal(0);
        let (runs, runs_clone) = counter();
        let count_clone = count.clone();
        let site = site(
            &rt,
            Arc::new(move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                None
            }),
            Some(Arc::new(move || vec![Dep::from(count_clone.get() / 10)])),
        );

        site.run();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // 0 / 10 == 5 / 10: re-evaluated, body skipped
        count.set(5);
        rt.flush();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        count.set(12);
        rt.flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn watched_signal_reruns_and_cleans_up() {
        let rt = Runtime::new(EngineConfig::default());
        let source = rt.signal("a".to_string());
        let (runs, runs_clone) = counter();
        let (cleanups, cleanups_clone) = counter();
        let dep = source.clone();
        let site = site(
            &rt,
            Arc::new(move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                let cleanups = cleanups_clone.clone();
                Some(Box::new(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                }) as Cleanup)
            }),
            Some(Arc::new(move || vec![Dep::from(&dep)])),
        );

        site.run();
        source.set("b".to_string());
        rt.flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        site.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn panicking_body_is_contained() {
        let rt = Runtime::new(EngineConfig::default());
        let site = site(&rt, Arc::new(|| panic!("effect failed")), None);
        site.run();
        assert_eq!(site.runs(), 1);
    }
}
