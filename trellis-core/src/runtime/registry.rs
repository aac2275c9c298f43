//! Instance Registry
//!
//! The registry holds one record per live component instance: its identity,
//! where it is mounted in the host tree, its lifecycle callbacks, the
//! cleanup handles it owns, and the per-instance state that effect call
//! sites and nested components keep across renders.
//!
//! # Identity
//!
//! Identities come from a per-registry counter and are never reused, so a
//! stale identity held by a closure can always be recognised as dead.
//!
//! # Render passes
//!
//! Every time a component body runs for an instance, the instance starts a
//! new pass: the hook cursor and the child slot cursor go back to zero and
//! the lifecycle lists are emptied so the body can register them again.
//! Effect sites and child instances are then matched by call order (or by
//! key, for children that declare one).

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::scope::Scope;
use crate::host::HostNode;
use crate::reactive::EffectSite;
use crate::view::{Key, Node};

/// Identity of a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ei_{}", self.0)
    }
}

/// Lifecycle phases, in the order they occur for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    WillMount,
    DidMount,
    WillUpdate,
    DidUpdate,
    WillUnmount,
    DidUnmount,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::WillMount,
        Phase::DidMount,
        Phase::WillUpdate,
        Phase::DidUpdate,
        Phase::WillUnmount,
        Phase::DidUnmount,
    ];

    /// `did*` phases run on the next flush; `will*` phases run inline.
    pub fn is_deferred(self) -> bool {
        matches!(self, Phase::DidMount | Phase::DidUpdate | Phase::DidUnmount)
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::WillMount => "willMount",
            Phase::DidMount => "didMount",
            Phase::WillUpdate => "willUpdate",
            Phase::DidUpdate => "didUpdate",
            Phase::WillUnmount => "willUnmount",
            Phase::DidUnmount => "didUnmount",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle callback. Receives the instance's host root when one is known.
pub type LifecycleFn = Arc<dyn Fn(Option<HostNode>) + Send + Sync>;

/// A cleanup handle owned by an instance. Runs at most once.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// A view function re-run by `refresh`.
pub type ViewFn = Arc<dyn Fn(&Scope) -> Node + Send + Sync>;

/// Handle to one cleanup registered on one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupId(u64);

/// Where a child instance sits in its parent's render pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    Keyed(Key),
    Position(usize),
}

/// State kept at one hook position across render passes.
#[derive(Clone)]
pub(crate) enum Hook {
    Effect(Arc<EffectSite>),
    /// A derived signal and its derivation, type-erased.
    Derived {
        state: Arc<dyn Any + Send + Sync>,
        dispose: Arc<dyn Fn() + Send + Sync>,
    },
}

impl Hook {
    pub(crate) fn dispose(&self) {
        match self {
            Hook::Effect(site) => site.dispose(),
            Hook::Derived { dispose, .. } => dispose(),
        }
    }
}

/// The record kept for one instance.
pub(crate) struct Instance {
    pub(crate) id: InstanceId,
    pub(crate) label: String,
    pub(crate) parent: Option<InstanceId>,
    pub(crate) mount: Option<HostNode>,
    pub(crate) root: Option<HostNode>,
    pub(crate) mounted: bool,
    /// `willUnmount` already ran while the host tree was still attached.
    pub(crate) unmount_announced: bool,
    lifecycles: [SmallVec<[LifecycleFn; 2]>; 6],
    pub(crate) cleanups: IndexMap<CleanupId, Cleanup>,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) hook_cursor: usize,
    pub(crate) slots: IndexMap<Slot, InstanceId>,
    pub(crate) slot_cursor: usize,
    pub(crate) claimed: HashSet<InstanceId>,
    pub(crate) view: Option<ViewFn>,
    pub(crate) current: Option<Node>,
}

impl Instance {
    fn new(id: InstanceId, label: String, mount: Option<HostNode>, parent: Option<InstanceId>) -> Self {
        Self {
            id,
            label,
            parent,
            mount,
            root: None,
            mounted: true,
            unmount_announced: false,
            lifecycles: Default::default(),
            cleanups: IndexMap::new(),
            hooks: Vec::new(),
            hook_cursor: 0,
            slots: IndexMap::new(),
            slot_cursor: 0,
            claimed: HashSet::new(),
            view: None,
            current: None,
        }
    }

    pub(crate) fn add_lifecycle(&mut self, phase: Phase, callback: LifecycleFn) {
        self.lifecycles[phase.index()].push(callback);
    }

    pub(crate) fn lifecycle(&self, phase: Phase) -> SmallVec<[LifecycleFn; 2]> {
        self.lifecycles[phase.index()].clone()
    }

    /// Reset per-pass state before the component body runs again.
    pub(crate) fn begin_pass(&mut self) {
        self.hook_cursor = 0;
        self.slot_cursor = 0;
        self.claimed.clear();
        for list in &mut self.lifecycles {
            list.clear();
        }
    }

    /// Store `hook` at `cursor`, returning whatever was there before.
    pub(crate) fn set_hook(&mut self, cursor: usize, hook: Hook) -> Option<Hook> {
        match self.hooks.get_mut(cursor) {
            Some(slot) => Some(std::mem::replace(slot, hook)),
            None => {
                self.hooks.push(hook);
                None
            }
        }
    }

    pub(crate) fn children(&self) -> Vec<InstanceId> {
        self.slots.values().copied().collect()
    }

    fn info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.id,
            label: self.label.clone(),
            parent: self.parent,
            mount: self.mount,
            root: self.root,
            mounted: self.mounted,
            children: self.children(),
            cleanups: self.cleanups.len(),
            effects: self.hooks.iter().filter(|hook| matches!(hook, Hook::Effect(_))).count(),
            derived: self.hooks.iter().filter(|hook| matches!(hook, Hook::Derived { .. })).count(),
            refreshable: self.view.is_some(),
        }
    }
}

/// A point-in-time snapshot of an instance, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub label: String,
    pub parent: Option<InstanceId>,
    pub mount: Option<HostNode>,
    pub root: Option<HostNode>,
    pub mounted: bool,
    pub children: Vec<InstanceId>,
    pub cleanups: usize,
    pub effects: usize,
    pub derived: usize,
    pub refreshable: bool,
}

/// Arena of instance records keyed by identity.
pub(crate) struct Registry {
    next_id: u64,
    next_cleanup: u64,
    instances: HashMap<InstanceId, Instance>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            next_cleanup: 0,
            instances: HashMap::new(),
        }
    }

    pub(crate) fn create(&mut self, label: &str, mount: Option<HostNode>, parent: Option<InstanceId>) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.instances
            .insert(id, Instance::new(id, label.to_string(), mount, parent));
        id
    }

    pub(crate) fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    /// The record, only while it has not started tearing down.
    pub(crate) fn live_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(&id).filter(|instance| instance.mounted)
    }

    pub(crate) fn remove(&mut self, id: InstanceId) -> Option<Instance> {
        self.instances.remove(&id)
    }

    pub(crate) fn is_alive(&self, id: InstanceId) -> bool {
        self.instances.get(&id).is_some_and(|instance| instance.mounted)
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }

    pub(crate) fn info(&self, id: InstanceId) -> Option<InstanceInfo> {
        self.instances.get(&id).map(Instance::info)
    }

    /// Store `cleanup` on a live instance. Hands it back if there is none.
    pub(crate) fn own_cleanup(&mut self, id: InstanceId, cleanup: Cleanup) -> Result<CleanupId, Cleanup> {
        let handle = CleanupId(self.next_cleanup);
        match self.live_mut(id) {
            Some(instance) => {
                instance.cleanups.insert(handle, cleanup);
                self.next_cleanup += 1;
                Ok(handle)
            }
            None => Err(cleanup),
        }
    }
}
