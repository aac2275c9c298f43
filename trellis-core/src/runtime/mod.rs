//! Engine Runtime
//!
//! The runtime is the context object every part of the engine hangs off:
//! the pending-task batch, the instance registry, and the configuration.
//! Nothing in the engine is process-wide, so several runtimes can coexist
//! (one per test, for example) without seeing each other's state.
//!
//! # How It Works
//!
//! 1. Signals keep a weak handle to the runtime that created them. A write
//!    hands every subscriber to [`Runtime::schedule_subscriber`].
//!
//! 2. Tasks owned by an instance that is no longer live are dropped when
//!    they are queued and again when the batch reaches them.
//!
//! 3. [`Runtime::flush`] takes the batch and runs each task with panic
//!    containment. One failing task is logged and the rest still run.
//!
//! 4. [`Runtime::destroy`] marks an instance dead first, then runs its
//!    unmount lifecycle and cleanups, deletes the record and purges its
//!    pending tasks. That order is what keeps callbacks from firing on a
//!    deleted instance.
//!
//! # Locking
//!
//! The registry sits behind a `parking_lot` mutex. No user callback ever
//! runs while it is held: callbacks are cloned or taken out first.

mod registry;
mod scheduler;
mod scope;

pub use registry::{Cleanup, CleanupId, InstanceId, InstanceInfo, LifecycleFn, Phase, ViewFn};
pub use scheduler::{Action, FlushStats, Scheduler, Task};
pub use scope::Scope;

use registry::{Hook, Registry, Slot};

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::{catch_panic, EngineError, Result};
use crate::host::HostNode;
use crate::reactive::{Derivation, DepsFn, EffectFn, EffectSite, Signal, Subscriber};
use crate::view::{Key, Node};
use scheduler::TaskKey;

struct RuntimeInner {
    scheduler: Scheduler,
    registry: Mutex<Registry>,
    config: EngineConfig,
}

/// Shared handle to one engine's scheduler and registry.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Weak handle to a [`Runtime`], held by signals and effect sites.
#[derive(Clone, Default)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                scheduler: Scheduler::new(),
                registry: Mutex::new(Registry::new()),
                config,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    // ------------------------------------------------------------------
    // Reactive primitives
    // ------------------------------------------------------------------

    /// Create a signal whose subscribers are scheduled on this runtime.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        Signal::new(self, value)
    }

    /// Create a free-standing derived signal. It lives as long as the
    /// returned signal does.
    pub fn derive<T, F>(&self, compute: F) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Derivation::create(self, None, compute).0
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Queue a subscriber notification. Repeated notifications of the same
    /// subscriber before the next flush collapse into one.
    pub fn schedule_subscriber(&self, subscriber: &Subscriber) -> bool {
        let notify = subscriber.notifier();
        self.enqueue(
            TaskKey::Subscriber(subscriber.id()),
            Task::new(subscriber.owner(), move || notify()),
        )
    }

    /// Queue an action for the next flush. Returns `false` if the owner is
    /// no longer live, in which case the action is dropped.
    pub fn add_task<F>(&self, owner: Option<InstanceId>, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let key = self.inner.scheduler.anonymous_key();
        self.enqueue(key, Task::new(owner, action))
    }

    fn enqueue(&self, key: TaskKey, task: Task) -> bool {
        if let Some(owner) = task.owner() {
            if !self.is_alive(owner) {
                tracing::trace!(%owner, "dropping task for dead instance");
                return false;
            }
        }
        self.inner.scheduler.push(key, task)
    }

    /// Run `f` inside the task failure boundary.
    pub fn run_task<R>(&self, owner: Option<InstanceId>, f: impl FnOnce() -> R) -> Result<R> {
        if !self.inner.config.contain_panics {
            return Ok(f());
        }
        catch_panic(f).map_err(|message| {
            let err = EngineError::TaskPanicked { owner, message };
            tracing::error!(owner = ?owner, error = %err, "scheduler task failed");
            err
        })
    }

    /// Run a cleanup handle inside the cleanup failure boundary.
    pub fn run_cleanup(&self, owner: InstanceId, cleanup: Cleanup) {
        if !self.inner.config.contain_panics {
            cleanup();
            return;
        }
        if let Err(message) = catch_panic(cleanup) {
            let err = EngineError::CleanupPanicked { owner, message };
            tracing::error!(%owner, error = %err, "cleanup failed");
        }
    }

    /// Drain the pending batch once.
    pub fn flush(&self) -> FlushStats {
        let batch = self.inner.scheduler.take_batch();
        let mut stats = FlushStats::default();
        if batch.is_empty() {
            return stats;
        }
        tracing::trace!(tasks = batch.len(), "flushing batch");

        for task in batch {
            let (owner, action) = task.into_parts();
            if let Some(owner) = owner {
                if !self.is_alive(owner) {
                    stats.skipped += 1;
                    continue;
                }
            }
            match self.run_task(owner, action) {
                Ok(()) => stats.executed += 1,
                Err(_) => stats.failed += 1,
            }
        }
        stats
    }

    /// Flush until nothing is pending, up to `max_flush_rounds` batches.
    pub fn run_until_idle(&self) -> Result<FlushStats> {
        let rounds = self.inner.config.max_flush_rounds;
        let mut total = FlushStats::default();
        for _ in 0..rounds {
            if !self.inner.scheduler.has_pending() {
                return Ok(total);
            }
            total += self.flush();
        }
        if self.inner.scheduler.has_pending() {
            return Err(EngineError::Unsettled { rounds });
        }
        Ok(total)
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    pub fn is_alive(&self, id: InstanceId) -> bool {
        self.inner.registry.lock().is_alive(id)
    }

    pub fn create_instance(&self, label: &str, mount: Option<HostNode>, parent: Option<InstanceId>) -> InstanceId {
        let id = self.inner.registry.lock().create(label, mount, parent);
        tracing::debug!(%id, label, "instance created");
        id
    }

    pub fn instance(&self, id: InstanceId) -> Option<InstanceInfo> {
        self.inner.registry.lock().info(id)
    }

    pub fn instance_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Hand a cleanup to `owner`. If the owner is not live the cleanup runs
    /// immediately and `None` is returned.
    pub fn own_cleanup(&self, owner: InstanceId, cleanup: Cleanup) -> Option<CleanupId> {
        let refused = self.inner.registry.lock().own_cleanup(owner, cleanup);
        match refused {
            Ok(handle) => Some(handle),
            Err(cleanup) => {
                self.run_cleanup(owner, cleanup);
                None
            }
        }
    }

    /// Remove a cleanup from its owner without running it.
    pub fn take_cleanup(&self, owner: InstanceId, handle: CleanupId) -> Option<Cleanup> {
        self.inner
            .registry
            .lock()
            .get_mut(owner)
            .and_then(|instance| instance.cleanups.shift_remove(&handle))
    }

    pub fn add_lifecycle(&self, id: InstanceId, phase: Phase, callback: LifecycleFn) {
        if let Some(instance) = self.inner.registry.lock().live_mut(id) {
            instance.add_lifecycle(phase, callback);
        }
    }

    /// Run every callback registered for `phase`, in registration order.
    ///
    /// Deferred phases are queued as tasks owned by `id`. `didUnmount` is
    /// the one exception to the rule that nothing owned by a destroyed
    /// instance runs after the purge: it is queued free-standing, with the
    /// detached root, because its owner is gone by the time it runs.
    pub fn run_lifecycle(&self, id: InstanceId, phase: Phase, arg: Option<HostNode>) {
        let callbacks = match self.inner.registry.lock().get(id) {
            Some(instance) => instance.lifecycle(phase),
            None => return,
        };
        for callback in callbacks {
            if phase.is_deferred() {
                let owner = (phase != Phase::DidUnmount).then_some(id);
                self.add_task(owner, move || callback(arg));
            } else {
                let _ = self.run_task(Some(id), || callback(arg));
            }
        }
    }

    /// Tear down an instance and its child instances.
    ///
    /// With `run_lifecycle`, `willUnmount` runs now and `didUnmount` is
    /// queued with the instance's host root.
    pub fn destroy(&self, id: InstanceId, run_lifecycle: bool) -> Result<()> {
        let (root, parent, announced) = {
            let mut registry = self.inner.registry.lock();
            let instance = registry.live_mut(id).ok_or(EngineError::InstanceNotFound(id))?;
            instance.mounted = false;
            (instance.root, instance.parent, instance.unmount_announced)
        };

        if run_lifecycle {
            if !announced {
                self.run_lifecycle(id, Phase::WillUnmount, root);
            }
            self.run_lifecycle(id, Phase::DidUnmount, root);
        }

        let children = self
            .inner
            .registry
            .lock()
            .get(id)
            .map(|instance| instance.children())
            .unwrap_or_default();
        // Children never had their lifecycle run by the caller.
        for child in children {
            let _ = self.destroy(child, true);
        }

        let (cleanups, hooks) = {
            let mut registry = self.inner.registry.lock();
            match registry.get_mut(id) {
                Some(instance) => (
                    std::mem::take(&mut instance.cleanups),
                    std::mem::take(&mut instance.hooks),
                ),
                None => Default::default(),
            }
        };
        for (_, cleanup) in cleanups {
            self.run_cleanup(id, cleanup);
        }
        drop(hooks);

        {
            let mut registry = self.inner.registry.lock();
            registry.remove(id);
            if let Some(parent) = parent.and_then(|parent| registry.get_mut(parent)) {
                parent.slots.retain(|_, child| *child != id);
            }
        }
        let purged = self.inner.scheduler.clear(id);
        tracing::debug!(%id, purged, "instance destroyed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Render passes
    // ------------------------------------------------------------------

    pub(crate) fn begin_pass(&self, id: InstanceId) {
        if let Some(instance) = self.inner.registry.lock().live_mut(id) {
            instance.begin_pass();
        }
    }

    /// Find or create the child instance for the next component invocation
    /// under `parent`. A slot is reused only if it still holds a live
    /// instance of the same component.
    pub(crate) fn claim_child(&self, parent: InstanceId, label: &str, key: Option<Key>) -> Option<InstanceId> {
        let (slot, stale) = {
            let mut registry = self.inner.registry.lock();
            let instance = registry.live_mut(parent)?;
            let slot = match key {
                Some(key) => Slot::Keyed(key),
                None => {
                    instance.slot_cursor += 1;
                    Slot::Position(instance.slot_cursor - 1)
                }
            };
            let existing = instance.slots.get(&slot).copied();
            let reusable = existing.filter(|child| {
                registry
                    .get(*child)
                    .is_some_and(|record| record.mounted && record.label == label)
            });
            if let Some(child) = reusable {
                if let Some(instance) = registry.get_mut(parent) {
                    if !instance.claimed.insert(child) {
                        tracing::warn!(%parent, ?slot, "component slot claimed twice in one pass");
                    }
                }
                if let Some(record) = registry.get_mut(child) {
                    record.begin_pass();
                }
                return Some(child);
            }
            (slot, existing)
        };

        if let Some(stale) = stale {
            let _ = self.destroy(stale, true);
        }

        let child = self.create_instance(label, None, Some(parent));
        let mut registry = self.inner.registry.lock();
        let instance = registry.get_mut(parent)?;
        instance.slots.insert(slot, child);
        instance.claimed.insert(child);
        Some(child)
    }

    /// Split the children of `id` by whether its last pass claimed them.
    fn partition_children(&self, id: InstanceId) -> (Vec<InstanceId>, Vec<InstanceId>) {
        let registry = self.inner.registry.lock();
        let Some(instance) = registry.get(id) else {
            return Default::default();
        };
        instance
            .slots
            .values()
            .copied()
            .partition(|child| !instance.claimed.contains(child))
    }

    /// Run `willUnmount` for every instance under `id` that its last pass
    /// dropped, and for their descendants. Called before the patch so the
    /// callbacks still see their host trees attached; `sweep` then skips
    /// the phase for them.
    pub(crate) fn announce_unclaimed(&self, id: InstanceId) {
        let (unclaimed, claimed) = self.partition_children(id);
        for child in unclaimed {
            self.announce_unmount(child);
        }
        for child in claimed {
            self.announce_unclaimed(child);
        }
    }

    fn announce_unmount(&self, id: InstanceId) {
        let (root, children) = {
            let mut registry = self.inner.registry.lock();
            let Some(instance) = registry.live_mut(id) else {
                return;
            };
            if instance.unmount_announced {
                return;
            }
            instance.unmount_announced = true;
            (instance.root, instance.children())
        };
        self.run_lifecycle(id, Phase::WillUnmount, root);
        for child in children {
            self.announce_unmount(child);
        }
    }

    /// Destroy the children of `id` that were not claimed during its last
    /// pass, then recurse into the ones that were.
    pub(crate) fn sweep(&self, id: InstanceId) {
        let (unclaimed, claimed) = self.partition_children(id);
        for child in unclaimed {
            let _ = self.destroy(child, true);
        }
        for child in claimed {
            self.sweep(child);
        }
    }

    /// Return the effect site for the next effect call on `owner`, creating
    /// it on the first pass. `None` if the owner is not live.
    pub(crate) fn effect_site(&self, owner: InstanceId, body: EffectFn, deps: Option<DepsFn>) -> Option<Arc<EffectSite>> {
        let (created, displaced) = {
            let mut registry = self.inner.registry.lock();
            let instance = registry.live_mut(owner)?;
            let cursor = instance.hook_cursor;
            instance.hook_cursor += 1;
            if let Some(Hook::Effect(site)) = instance.hooks.get(cursor) {
                site.replace(body, deps);
                return Some(Arc::clone(site));
            }
            let site = EffectSite::new(owner, self.downgrade(), body, deps);
            let displaced = instance.set_hook(cursor, Hook::Effect(Arc::clone(&site)));
            (site, displaced)
        };
        if let Some(displaced) = displaced {
            tracing::warn!(%owner, "hook order changed between renders; previous hook disposed");
            displaced.dispose();
        }

        let disposer = Arc::clone(&created);
        self.own_cleanup(owner, Box::new(move || disposer.dispose()));
        Some(created)
    }

    /// Return the derived signal for the next `derive` call on `owner`.
    /// On later passes the existing derivation takes the new computation
    /// and recomputes; no new subscription or cleanup is added. Falls back
    /// to a free-standing derivation if the owner is not live.
    pub(crate) fn derived_site<T, F>(&self, owner: InstanceId, compute: F) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let claimed = {
            let mut registry = self.inner.registry.lock();
            registry.live_mut(owner).map(|instance| {
                let cursor = instance.hook_cursor;
                instance.hook_cursor += 1;
                (cursor, instance.hooks.get(cursor).cloned())
            })
        };
        let Some((cursor, existing)) = claimed else {
            return self.derive(compute);
        };

        if let Some(Hook::Derived { state, .. }) = &existing {
            if let Some((signal, derivation)) = state.downcast_ref::<(Signal<T>, Arc<Derivation<T>>)>() {
                derivation.replace(compute);
                return signal.clone();
            }
        }

        let (signal, derivation) = Derivation::create(self, Some(owner), compute);
        let disposer = Arc::clone(&derivation);
        let hook = Hook::Derived {
            state: Arc::new((signal.clone(), Arc::clone(&derivation))),
            dispose: Arc::new(move || disposer.dispose()),
        };
        let displaced = self
            .inner
            .registry
            .lock()
            .live_mut(owner)
            .and_then(|instance| instance.set_hook(cursor, hook));
        if let Some(displaced) = displaced {
            tracing::warn!(%owner, "hook order changed between renders; previous hook disposed");
            displaced.dispose();
        }

        self.own_cleanup(owner, Box::new(move || derivation.dispose()));
        signal
    }

    // ------------------------------------------------------------------
    // Instance fields used by the executor
    // ------------------------------------------------------------------

    pub(crate) fn set_root(&self, id: InstanceId, root: Option<HostNode>) {
        if let Some(instance) = self.inner.registry.lock().get_mut(id) {
            instance.root = root;
        }
    }

    pub(crate) fn set_label(&self, id: InstanceId, label: &str) {
        if let Some(instance) = self.inner.registry.lock().get_mut(id) {
            instance.label = label.to_string();
        }
    }

    pub(crate) fn set_view(&self, id: InstanceId, view: ViewFn) {
        if let Some(instance) = self.inner.registry.lock().get_mut(id) {
            instance.view = Some(view);
        }
    }

    pub(crate) fn view(&self, id: InstanceId) -> Option<ViewFn> {
        self.inner.registry.lock().get(id).and_then(|instance| instance.view.clone())
    }

    pub(crate) fn set_current(&self, id: InstanceId, node: Node) {
        if let Some(instance) = self.inner.registry.lock().get_mut(id) {
            instance.current = Some(node);
        }
    }

    pub(crate) fn current(&self, id: InstanceId) -> Option<Node> {
        self.inner.registry.lock().get(id).and_then(|instance| instance.current.clone())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("instances", &self.instance_count())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn runtime() -> Runtime {
        Runtime::new(EngineConfig::default())
    }

    fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        (count.clone(), count)
    }

    #[test]
    fn tasks_for_dead_owners_are_dropped_at_enqueue() {
        let rt = runtime();
        let id = rt.create_instance("a", None, None);
        rt.destroy(id, false).unwrap();

        assert!(!rt.add_task(Some(id), || panic!("must not run")));
        assert_eq!(rt.scheduler().pending_len(), 0);
    }

    #[test]
    fn destroy_purges_queued_tasks() {
        let rt = runtime();
        let id = rt.create_instance("a", None, None);
        let (ran, ran_clone) = counter();
        rt.add_task(Some(id), move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        rt.destroy(id, false).unwrap();
        assert_eq!(rt.flush().executed, 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_task_does_not_stop_the_batch() {
        let rt = runtime();
        let (ran, ran_clone) = counter();
        rt.add_task(None, || panic!("first task fails"));
        rt.add_task(None, move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        let stats = rt.flush();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.executed, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tasks_added_during_flush_join_the_next_batch() {
        let rt = runtime();
        let (ran, ran_clone) = counter();
        let inner = rt.clone();
        rt.add_task(None, move || {
            inner.add_task(None, move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(rt.flush().executed, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(rt.flush().executed, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_until_idle_gives_up_on_runaway_batches() {
        let config = EngineConfig {
            max_flush_rounds: 5,
            ..EngineConfig::default()
        };
        let rt = Runtime::new(config);
        let signal = rt.signal(0);
        let writer = signal.clone();
        signal.subscribe(move || {
            writer.update(|v| v + 1);
        });
        signal.set(1);

        let err = rt.run_until_idle().unwrap_err();
        assert!(matches!(err, EngineError::Unsettled { rounds: 5 }));
    }

    #[test]
    fn lifecycle_phases_split_between_inline_and_deferred() {
        let rt = runtime();
        let id = rt.create_instance("a", None, None);
        let (will, will_clone) = counter();
        let (did, did_clone) = counter();
        rt.add_lifecycle(id, Phase::WillUpdate, Arc::new(move |_| {
            will_clone.fetch_add(1, Ordering::SeqCst);
        }));
        rt.add_lifecycle(id, Phase::DidUpdate, Arc::new(move |_| {
            did_clone.fetch_add(1, Ordering::SeqCst);
        }));

        rt.run_lifecycle(id, Phase::WillUpdate, None);
        rt.run_lifecycle(id, Phase::DidUpdate, None);
        assert_eq!(will.load(Ordering::SeqCst), 1);
        assert_eq!(did.load(Ordering::SeqCst), 0);

        rt.flush();
        assert_eq!(did.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destroy_runs_cleanups_and_unmount_phases() {
        let rt = runtime();
        let id = rt.create_instance("a", None, None);
        let (cleaned, cleaned_clone) = counter();
        let (unmounted, unmounted_clone) = counter();

        rt.own_cleanup(id, Box::new(|| panic!("first cleanup fails")));
        rt.own_cleanup(id, Box::new(move || {
            cleaned_clone.fetch_add(1, Ordering::SeqCst);
        }));
        rt.add_lifecycle(id, Phase::DidUnmount, Arc::new(move |_| {
            unmounted_clone.fetch_add(1, Ordering::SeqCst);
        }));

        rt.destroy(id, true).unwrap();
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert!(rt.instance(id).is_none());

        // didUnmount outlives its owner.
        rt.flush();
        assert_eq!(unmounted.load(Ordering::SeqCst), 1);
        assert!(matches!(rt.destroy(id, true), Err(EngineError::InstanceNotFound(_))));
    }

    #[test]
    fn cleanup_for_missing_owner_runs_immediately() {
        let rt = runtime();
        let id = rt.create_instance("a", None, None);
        rt.destroy(id, false).unwrap();

        let (ran, ran_clone) = counter();
        let handle = rt.own_cleanup(id, Box::new(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(handle.is_none());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn claimed_children_survive_and_unclaimed_are_swept() {
        let rt = runtime();
        let parent = rt.create_instance("root", None, None);

        rt.begin_pass(parent);
        let first = rt.claim_child(parent, "Item", Some(Key::from("a"))).unwrap();
        let second = rt.claim_child(parent, "Item", Some(Key::from("b"))).unwrap();
        rt.sweep(parent);

        rt.begin_pass(parent);
        let again = rt.claim_child(parent, "Item", Some(Key::from("b"))).unwrap();
        rt.sweep(parent);

        assert_eq!(again, second);
        assert!(!rt.is_alive(first));
        assert_eq!(rt.instance(parent).unwrap().children, vec![second]);
    }

    #[test]
    fn positional_slot_with_a_different_component_is_replaced() {
        let rt = runtime();
        let parent = rt.create_instance("root", None, None);

        rt.begin_pass(parent);
        let first = rt.claim_child(parent, "Left", None).unwrap();

        rt.begin_pass(parent);
        let second = rt.claim_child(parent, "Right", None).unwrap();

        assert_ne!(first, second);
        assert!(!rt.is_alive(first));
        assert_eq!(rt.instance(second).unwrap().parent, Some(parent));
    }

    #[test]
    fn destroying_a_parent_destroys_children() {
        let rt = runtime();
        let parent = rt.create_instance("root", None, None);
        let child = rt.claim_child(parent, "Child", None).unwrap();
        let grandchild = rt.claim_child(child, "Leaf", None).unwrap();

        rt.destroy(parent, true).unwrap();
        assert!(!rt.is_alive(child));
        assert!(!rt.is_alive(grandchild));
        assert_eq!(rt.instance_count(), 0);
    }

    #[test]
    fn effect_sites_are_found_by_call_order() {
        let rt = runtime();
        let id = rt.create_instance("a", None, None);
        let body: EffectFn = Arc::new(|| None);

        let first = rt.effect_site(id, body.clone(), None).unwrap();
        let second = rt.effect_site(id, body.clone(), None).unwrap();
        rt.begin_pass(id);
        let first_again = rt.effect_site(id, body, None).unwrap();

        assert!(Arc::ptr_eq(&first, &first_again));
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(rt.instance(id).unwrap().effects, 2);
    }

    #[test]
    fn derived_sites_are_reused_across_passes() {
        let rt = runtime();
        let id = rt.create_instance("a", None, None);
        let source = rt.signal(2);

        let read = source.clone();
        let first = rt.derived_site(id, move || read.get() * 10);
        let cleanups = rt.instance(id).unwrap().cleanups;
        assert_eq!(first.get_untracked(), 20);

        for factor in 1..=5 {
            rt.begin_pass(id);
            let read = source.clone();
            let again = rt.derived_site(id, move || read.get() * factor);
            assert_eq!(again.id(), first.id());
            assert_eq!(again.get_untracked(), 2 * factor);
        }

        let info = rt.instance(id).unwrap();
        assert_eq!(info.derived, 1);
        assert_eq!(info.cleanups, cleanups);
        assert_eq!(source.subscriber_count(), 1);

        rt.destroy(id, false).unwrap();
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn announced_instances_skip_will_unmount_on_destroy() {
        let rt = runtime();
        let parent = rt.create_instance("parent", None, None);
        rt.begin_pass(parent);
        let child = rt.claim_child(parent, "Child", None).unwrap();
        let grandchild = rt.claim_child(child, "Leaf", None).unwrap();
        let (wills, wills_clone) = counter();
        for id in [child, grandchild] {
            let wills = wills_clone.clone();
            rt.add_lifecycle(id, Phase::WillUnmount, Arc::new(move |_| {
                wills.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // Next pass claims nothing.
        rt.begin_pass(parent);
        rt.announce_unclaimed(parent);
        assert_eq!(wills.load(Ordering::SeqCst), 2);
        assert!(rt.is_alive(child));

        rt.sweep(parent);
        assert_eq!(wills.load(Ordering::SeqCst), 2);
        assert!(!rt.is_alive(child));
        assert!(!rt.is_alive(grandchild));
    }
}
