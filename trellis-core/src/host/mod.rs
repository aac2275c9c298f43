//! Host Tree Abstraction
//!
//! The engine never owns the live UI tree. It drives whatever implements
//! [`Host`]: a browser DOM binding, a terminal renderer, or the
//! [`MemoryHost`] used by tests and benchmarks.
//!
//! Nodes are addressed by opaque [`HostNode`] handles. All methods take
//! `&self`; hosts use interior mutability so that live bindings (which run
//! from scheduler tasks) can write to the tree.

mod memory;

pub use memory::{MemoryHost, MutationStats};

use std::fmt;
use std::sync::Arc;

use crate::view::Value;

/// Handle to a node in the host tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNode(u64);

impl HostNode {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An event delivered to a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Lowercased event name, e.g. `click`.
    pub name: String,
    pub target: HostNode,
}

/// Event listener. Listeners are compared by pointer identity.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Operations the engine needs from the host tree.
pub trait Host: Send + Sync {
    fn create_element(&self, tag: &str) -> HostNode;

    fn create_text(&self, text: &str) -> HostNode;

    fn set_attribute(&self, node: HostNode, name: &str, value: &str);

    fn remove_attribute(&self, node: HostNode, name: &str);

    /// Whether `name` is a native, typed field of `node`. Such names are
    /// written with [`Host::set_property`] instead of as attributes.
    fn has_property(&self, node: HostNode, name: &str) -> bool;

    fn set_property(&self, node: HostNode, name: &str, value: &Value);

    fn remove_property(&self, node: HostNode, name: &str);

    fn set_style(&self, node: HostNode, name: &str, value: &str);

    fn remove_style(&self, node: HostNode, name: &str);

    fn add_listener(&self, node: HostNode, event: &str, listener: Listener);

    fn remove_listener(&self, node: HostNode, event: &str, listener: &Listener);

    /// Append `child`, detaching it from its current parent first.
    fn append_child(&self, parent: HostNode, child: HostNode);

    /// Insert `child` before `reference`, or append when `reference` is
    /// `None`. Moves `child` if it is already attached.
    fn insert_before(&self, parent: HostNode, child: HostNode, reference: Option<HostNode>);

    fn replace_child(&self, parent: HostNode, new_child: HostNode, old_child: HostNode);

    fn remove_child(&self, parent: HostNode, child: HostNode);

    /// Text content of a text node.
    fn text(&self, node: HostNode) -> Option<String>;

    fn set_text(&self, node: HostNode, text: &str);

    fn parent(&self, node: HostNode) -> Option<HostNode>;

    fn children(&self, node: HostNode) -> Vec<HostNode>;

    fn child_at(&self, parent: HostNode, index: usize) -> Option<HostNode> {
        self.children(parent).get(index).copied()
    }

    fn next_sibling(&self, node: HostNode) -> Option<HostNode> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|sibling| *sibling == node)?;
        siblings.get(position + 1).copied()
    }
}
