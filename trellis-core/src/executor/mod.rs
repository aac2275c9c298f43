//! Executor
//!
//! The executor turns node descriptions into host nodes and keeps them in
//! step with newer descriptions.
//!
//! # Operations
//!
//! - **Create** materializes a description: text nodes for text, live text
//!   nodes for signals, elements with their properties and children.
//! - **Patch** diffs two descriptions against one existing host node and
//!   applies the smallest change it can find (see `patch.rs`).
//! - **Reconcile** matches old and new child lists by key, falling back to
//!   position, and moves host nodes instead of rebuilding them (see
//!   `reconcile.rs`).
//! - **Unmount** detaches an instance's host subtree and tears the
//!   instance down.
//!
//! # Bindings
//!
//! Every live binding from a signal to a host node (text content, a
//! property, or one style entry) is recorded per host node and slot. When
//! a slot is rebound or its host node leaves the tree during a patch, the
//! old subscription is cancelled right away instead of lingering until the
//! owning instance unmounts.

mod create;
mod patch;
mod reconcile;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{EngineError, Result};
use crate::host::{Host, HostNode};
use crate::reactive::{Subscriber, Subscription, TextSource};
use crate::runtime::{CleanupId, InstanceId, Phase, Runtime, Scope, ViewFn};
use crate::view::{Node, Value};

/// What a binding writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum BindingSlot {
    Text,
    Prop(String),
    Style(String),
}

struct Binding {
    owner: InstanceId,
    cleanup: CleanupId,
    subscription: Subscription,
}

/// Creates, patches, and unmounts host trees for one runtime.
pub struct Executor {
    runtime: Runtime,
    host: Arc<dyn Host>,
    bindings: Mutex<HashMap<(HostNode, BindingSlot), Binding>>,
}

impl Executor {
    pub fn new(runtime: Runtime, host: Arc<dyn Host>) -> Self {
        Self {
            runtime,
            host,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Number of live signal-to-host bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Materialize `node` under `mount` as a new instance.
    pub fn render(&self, node: Node, mount: HostNode) -> InstanceId {
        let label = node.label(&self.runtime.config().anonymous_label).to_string();
        let id = self.runtime.create_instance(&label, Some(mount), None);
        self.create_root(id, node, mount);
        id
    }

    /// Run `view` for a new instance and materialize the result under
    /// `mount`. The instance can be re-rendered with [`Executor::refresh`].
    pub fn mount(&self, mount: HostNode, view: ViewFn) -> InstanceId {
        let anonymous = self.runtime.config().anonymous_label.clone();
        let id = self.runtime.create_instance(&anonymous, Some(mount), None);
        self.runtime.set_view(id, Arc::clone(&view));
        self.runtime.begin_pass(id);

        let node = view(&Scope::new(self.runtime.clone(), Some(id)));
        self.runtime.set_label(id, node.label(&anonymous));
        self.create_root(id, node, mount);
        self.runtime.sweep(id);
        id
    }

    fn create_root(&self, id: InstanceId, node: Node, mount: HostNode) {
        self.runtime.run_lifecycle(id, Phase::WillMount, None);
        let dom = self.create(&node, id);
        self.host.append_child(mount, dom);
        self.runtime.set_root(id, Some(dom));
        self.runtime.set_current(id, node);
        self.runtime.run_lifecycle(id, Phase::DidMount, Some(dom));
        tracing::debug!(%id, %mount, root = %dom, "instance mounted");
    }

    /// Re-run the instance's view and patch the host tree with the result.
    pub fn refresh(&self, id: InstanceId) -> Result<()> {
        if !self.runtime.is_alive(id) {
            return Err(EngineError::InstanceNotFound(id));
        }
        let view = self.runtime.view(id).ok_or(EngineError::NotRefreshable(id))?;
        self.runtime.begin_pass(id);
        let node = view(&Scope::new(self.runtime.clone(), Some(id)));
        // Dropped children hear willUnmount while still attached.
        self.runtime.announce_unclaimed(id);
        self.update(id, node)?;
        self.runtime.sweep(id);
        Ok(())
    }

    /// Patch the instance's host tree from its last description to `node`.
    pub fn update(&self, id: InstanceId, node: Node) -> Result<()> {
        let root = self
            .runtime
            .instance(id)
            .filter(|info| info.mounted)
            .and_then(|info| info.root)
            .ok_or(EngineError::InstanceNotFound(id))?;
        let old = self
            .runtime
            .current(id)
            .ok_or(EngineError::InstanceNotFound(id))?;

        let dom = self.patch(root, &old, &node, id);
        if dom != root {
            self.runtime.set_root(id, Some(dom));
        }
        self.runtime.set_current(id, node);
        Ok(())
    }

    /// Detach the instance's host subtree and destroy the instance.
    pub fn unmount(&self, id: InstanceId) -> Result<()> {
        let info = self
            .runtime
            .instance(id)
            .filter(|info| info.mounted)
            .ok_or(EngineError::InstanceNotFound(id))?;
        let root = info.root;

        self.runtime.run_lifecycle(id, Phase::WillUnmount, root);
        if let Some(root) = root {
            if let Some(parent) = self.host.parent(root) {
                self.host.remove_child(parent, root);
            }
            self.release_subtree(root);
        }
        self.runtime.run_lifecycle(id, Phase::DidUnmount, root);
        self.runtime.destroy(id, false)?;
        tracing::debug!(%id, "instance unmounted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Keep `slot` of `node` in step with `source`, replacing any binding
    /// the slot already had.
    pub(crate) fn bind(&self, node: HostNode, slot: BindingSlot, source: &Arc<dyn TextSource>, owner: InstanceId) {
        let weak: Weak<dyn TextSource> = Arc::downgrade(source);
        let host = Arc::clone(&self.host);
        let target = slot.clone();
        let subscriber = Subscriber::owned(owner, move || {
            if let Some(source) = weak.upgrade() {
                write_slot(host.as_ref(), node, &target, &source.render());
            }
        });
        let subscription = Arc::clone(source).subscribe(subscriber);

        let cancel = subscription.clone();
        let Some(cleanup) = self
            .runtime
            .own_cleanup(owner, Box::new(move || cancel.cancel()))
        else {
            // The owner is gone and the cleanup already ran.
            return;
        };

        let previous = self.bindings.lock().insert(
            (node, slot),
            Binding {
                owner,
                cleanup,
                subscription,
            },
        );
        if let Some(previous) = previous {
            self.drop_binding(previous);
        }
    }

    pub(crate) fn release(&self, node: HostNode, slot: BindingSlot) {
        let binding = self.bindings.lock().remove(&(node, slot));
        if let Some(binding) = binding {
            self.drop_binding(binding);
        }
    }

    /// Cancel every binding on `root` and its descendants.
    pub(crate) fn release_subtree(&self, root: HostNode) {
        let mut nodes = HashSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if nodes.insert(node) {
                stack.extend(self.host.children(node));
            }
        }

        let released: Vec<Binding> = {
            let mut bindings = self.bindings.lock();
            let keys: Vec<_> = bindings
                .keys()
                .filter(|(node, _)| nodes.contains(node))
                .cloned()
                .collect();
            keys.iter().filter_map(|key| bindings.remove(key)).collect()
        };
        for binding in released {
            self.drop_binding(binding);
        }
    }

    fn drop_binding(&self, binding: Binding) {
        binding.subscription.cancel();
        // Already cancelled; the handle is discarded without running.
        drop(self.runtime.take_cleanup(binding.owner, binding.cleanup));
    }
}

/// Write a value to a named property, as a typed property when the host
/// knows the name and as an attribute otherwise.
pub(crate) fn write_value(host: &dyn Host, node: HostNode, name: &str, value: &Value) {
    if host.has_property(node, name) {
        host.set_property(node, name, value);
    } else {
        host.set_attribute(node, name, &value.to_string());
    }
}

fn write_slot(host: &dyn Host, node: HostNode, slot: &BindingSlot, text: &str) {
    match slot {
        BindingSlot::Text => host.set_text(node, text),
        BindingSlot::Prop(name) => write_value(host, node, name, &Value::Str(text.to_string())),
        BindingSlot::Style(name) => host.set_style(node, name, text),
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("runtime", &self.runtime)
            .field("bindings", &self.binding_count())
            .finish()
    }
}
