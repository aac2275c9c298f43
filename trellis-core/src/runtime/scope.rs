//! Component Scope
//!
//! A scope is what a component body receives: the runtime plus the
//! instance the body is running for. Effects, lifecycle callbacks, owned
//! cleanups, and nested component instances are all registered through it.
//!
//! A scope without an instance (see `Engine::scope`) can build trees and
//! create signals, but instance-bound registrations are ignored with a
//! warning.

use std::fmt;
use std::sync::Arc;

use super::registry::{Cleanup, InstanceId, Phase};
use super::Runtime;
use crate::host::HostNode;
use crate::reactive::{Dep, DepsFn, EffectFn, Signal};
use crate::view::{self, Child, Node, Props, Tag};

#[derive(Clone)]
pub struct Scope {
    runtime: Runtime,
    instance: Option<InstanceId>,
}

impl Scope {
    pub(crate) fn new(runtime: Runtime, instance: Option<InstanceId>) -> Self {
        Self { runtime, instance }
    }

    /// A scope that is not bound to any instance.
    pub fn detached(runtime: Runtime) -> Self {
        Self::new(runtime, None)
    }

    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub(crate) fn for_instance(&self, instance: InstanceId) -> Self {
        Self::new(self.runtime.clone(), Some(instance))
    }

    /// Build a node. See [`view::h`].
    pub fn h(&self, tag: impl Into<Tag>, props: Props, children: impl Into<Child>) -> Node {
        view::h(self, tag, props, children)
    }

    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.runtime.signal(value)
    }

    /// Create a derived signal. Inside an instance the signal is kept at
    /// its call position across renders: later renders hand the existing
    /// derivation their computation instead of building a new one, and the
    /// derivation stops when the instance unmounts.
    pub fn derive<T, F>(&self, compute: F) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        match self.instance {
            Some(owner) => self.runtime.derived_site(owner, compute),
            None => self.runtime.derive(compute),
        }
    }

    /// Register an effect that runs once for this instance.
    pub fn effect<F>(&self, body: F)
    where
        F: Fn() -> Option<Cleanup> + Send + Sync + 'static,
    {
        self.install_effect(Arc::new(body), None);
    }

    /// Register an effect that re-runs whenever `deps` produces a different
    /// list. Signals read by `deps`, and signals placed in the list, cause
    /// the list to be evaluated again when they change.
    pub fn effect_with<F, D>(&self, body: F, deps: D)
    where
        F: Fn() -> Option<Cleanup> + Send + Sync + 'static,
        D: Fn() -> Vec<Dep> + Send + Sync + 'static,
    {
        self.install_effect(Arc::new(body), Some(Arc::new(deps)));
    }

    fn install_effect(&self, body: EffectFn, deps: Option<DepsFn>) {
        let Some(owner) = self.instance else {
            tracing::warn!("effect registered outside a component instance; ignored");
            return;
        };
        if let Some(site) = self.runtime.effect_site(owner, body, deps) {
            site.run();
        }
    }

    pub fn on_will_mount<F>(&self, callback: F)
    where
        F: Fn(Option<HostNode>) + Send + Sync + 'static,
    {
        self.on(Phase::WillMount, callback);
    }

    pub fn on_did_mount<F>(&self, callback: F)
    where
        F: Fn(Option<HostNode>) + Send + Sync + 'static,
    {
        self.on(Phase::DidMount, callback);
    }

    pub fn on_will_update<F>(&self, callback: F)
    where
        F: Fn(Option<HostNode>) + Send + Sync + 'static,
    {
        self.on(Phase::WillUpdate, callback);
    }

    pub fn on_did_update<F>(&self, callback: F)
    where
        F: Fn(Option<HostNode>) + Send + Sync + 'static,
    {
        self.on(Phase::DidUpdate, callback);
    }

    pub fn on_will_unmount<F>(&self, callback: F)
    where
        F: Fn(Option<HostNode>) + Send + Sync + 'static,
    {
        self.on(Phase::WillUnmount, callback);
    }

    /// The callback receives the detached host root.
    pub fn on_did_unmount<F>(&self, callback: F)
    where
        F: Fn(Option<HostNode>) + Send + Sync + 'static,
    {
        self.on(Phase::DidUnmount, callback);
    }

    /// Run `cleanup` when this instance unmounts.
    pub fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.instance {
            Some(owner) => {
                self.runtime.own_cleanup(owner, Box::new(cleanup));
            }
            None => tracing::warn!("cleanup registered outside a component instance; ignored"),
        }
    }

    fn on<F>(&self, phase: Phase, callback: F)
    where
        F: Fn(Option<HostNode>) + Send + Sync + 'static,
    {
        match self.instance {
            Some(id) => self.runtime.add_lifecycle(id, phase, Arc::new(callback)),
            None => tracing::warn!(%phase, "lifecycle callback registered outside a component instance; ignored"),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("instance", &self.instance).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn scope() -> Scope {
        let runtime = Runtime::new(EngineConfig::default());
        let id = runtime.create_instance("test", None, None);
        Scope::new(runtime, Some(id))
    }

    #[test]
    fn effect_runs_at_registration() {
        let cx = scope();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        cx.effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            None
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_outside_instance_is_ignored() {
        let cx = Scope::detached(Runtime::new(EngineConfig::default()));
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        cx.effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            None
        });
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn derived_signal_stops_with_its_instance() {
        let cx = scope();
        let source = cx.signal(1);
        let read = source.clone();
        let doubled = cx.derive(move || read.get() * 2);
        assert_eq!(source.subscriber_count(), 1);

        let id = cx.instance().unwrap();
        cx.runtime().destroy(id, false).unwrap();
        assert_eq!(source.subscriber_count(), 0);

        source.set(4);
        cx.runtime().flush();
        assert_eq!(doubled.get(), 2);
    }

    #[test]
    fn effect_cleanup_runs_on_destroy() {
        let cx = scope();
        let cleaned = Arc::new(AtomicI32::new(0));
        let cleaned_clone = cleaned.clone();
        cx.effect(move || {
            let cleaned = cleaned_clone.clone();
            Some(Box::new(move || {
                cleaned.fetch_add(1, Ordering::SeqCst);
            }) as Cleanup)
        });

        let id = cx.instance().unwrap();
        cx.runtime().destroy(id, false).unwrap();
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_with_signal_dep_reruns_on_flush() {
        let cx = scope();
        let count = cx.signal(0);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let dep = count.clone();
        cx.effect_with(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                None
            },
            move || vec![Dep::from(&dep)],
        );

        count.set(1);
        count.set(2);
        cx.runtime().flush();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
