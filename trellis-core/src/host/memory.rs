//! In-Memory Host
//!
//! A host tree kept in a hash map. It behaves like a small DOM: nodes have
//! one parent, inserting an attached node moves it, and a fixed set of
//! names are native properties rather than attributes.
//!
//! Every mutation is counted in [`MutationStats`], which is how tests check
//! that a patch recreated nothing or that a second identical patch wrote
//! nothing at all.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{Event, Host, HostNode, Listener};
use crate::view::Value;

/// Names treated as typed properties on every element.
const NATIVE_PROPERTIES: &[&str] = &["value", "checked", "selected", "disabled", "hidden", "className"];

/// Counters for every mutation applied to the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationStats {
    pub elements_created: usize,
    pub texts_created: usize,
    pub attribute_writes: usize,
    pub attribute_removals: usize,
    pub property_writes: usize,
    pub property_removals: usize,
    pub style_writes: usize,
    pub style_removals: usize,
    pub listeners_added: usize,
    pub listeners_removed: usize,
    pub text_writes: usize,
    pub inserts: usize,
    pub moves: usize,
    pub replaces: usize,
    pub removes: usize,
}

impl MutationStats {
    pub fn creates(&self) -> usize {
        self.elements_created + self.texts_created
    }

    pub fn total(&self) -> usize {
        self.creates()
            + self.attribute_writes
            + self.attribute_removals
            + self.property_writes
            + self.property_removals
            + self.style_writes
            + self.style_removals
            + self.listeners_added
            + self.listeners_removed
            + self.text_writes
            + self.inserts
            + self.moves
            + self.replaces
            + self.removes
    }
}

enum Content {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        properties: IndexMap<String, Value>,
        styles: IndexMap<String, String>,
        listeners: IndexMap<String, Vec<Listener>>,
        children: Vec<HostNode>,
    },
    Text(String),
}

struct MemoryNode {
    parent: Option<HostNode>,
    content: Content,
}

#[derive(Default)]
struct Tree {
    next_id: u64,
    nodes: HashMap<HostNode, MemoryNode>,
    stats: MutationStats,
}

impl Tree {
    fn insert(&mut self, content: Content) -> HostNode {
        let node = HostNode::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(node, MemoryNode { parent: None, content });
        node
    }

    fn element_mut(&mut self, node: HostNode) -> Option<ElementMut<'_>> {
        match &mut self.nodes.get_mut(&node)?.content {
            Content::Element {
                attributes,
                properties,
                styles,
                listeners,
                ..
            } => Some(ElementMut {
                attributes,
                properties,
                styles,
                listeners,
            }),
            Content::Text(_) => None,
        }
    }

    fn children_mut(&mut self, node: HostNode) -> Option<&mut Vec<HostNode>> {
        match &mut self.nodes.get_mut(&node)?.content {
            Content::Element { children, .. } => Some(children),
            Content::Text(_) => None,
        }
    }

    /// Unlink `child` from its parent. Returns whether it was attached.
    fn detach(&mut self, child: HostNode) -> bool {
        let Some(parent) = self.nodes.get(&child).and_then(|node| node.parent) else {
            return false;
        };
        if let Some(children) = self.children_mut(parent) {
            children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        true
    }

    fn attach(&mut self, parent: HostNode, child: HostNode, reference: Option<HostNode>) {
        let moved = self.detach(child);
        let Some(children) = self.children_mut(parent) else {
            return;
        };
        let index = reference
            .and_then(|reference| children.iter().position(|c| *c == reference))
            .unwrap_or(children.len());
        children.insert(index, child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if moved {
            self.stats.moves += 1;
        } else {
            self.stats.inserts += 1;
        }
    }
}

struct ElementMut<'a> {
    attributes: &'a mut IndexMap<String, String>,
    properties: &'a mut IndexMap<String, Value>,
    styles: &'a mut IndexMap<String, String>,
    listeners: &'a mut IndexMap<String, Vec<Listener>>,
}

/// A host tree living in memory.
#[derive(Default)]
pub struct MemoryHost {
    tree: Mutex<Tree>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MutationStats {
        self.tree.lock().stats
    }

    pub fn reset_stats(&self) {
        self.tree.lock().stats = MutationStats::default();
    }

    /// Number of nodes created over the host's lifetime. Removal only
    /// detaches a node, so detached nodes are still counted and still
    /// answer queries.
    pub fn created_count(&self) -> usize {
        self.tree.lock().nodes.len()
    }

    pub fn tag(&self, node: HostNode) -> Option<String> {
        match &self.tree.lock().nodes.get(&node)?.content {
            Content::Element { tag, .. } => Some(tag.clone()),
            Content::Text(_) => None,
        }
    }

    pub fn attribute(&self, node: HostNode, name: &str) -> Option<String> {
        match &self.tree.lock().nodes.get(&node)?.content {
            Content::Element { attributes, .. } => attributes.get(name).cloned(),
            Content::Text(_) => None,
        }
    }

    pub fn property(&self, node: HostNode, name: &str) -> Option<Value> {
        match &self.tree.lock().nodes.get(&node)?.content {
            Content::Element { properties, .. } => properties.get(name).cloned(),
            Content::Text(_) => None,
        }
    }

    pub fn style(&self, node: HostNode, name: &str) -> Option<String> {
        match &self.tree.lock().nodes.get(&node)?.content {
            Content::Element { styles, .. } => styles.get(name).cloned(),
            Content::Text(_) => None,
        }
    }

    pub fn listener_count(&self, node: HostNode, event: &str) -> usize {
        match self.tree.lock().nodes.get(&node).map(|n| &n.content) {
            Some(Content::Element { listeners, .. }) => listeners.get(event).map_or(0, Vec::len),
            _ => 0,
        }
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: HostNode) -> String {
        let tree = self.tree.lock();
        let mut out = String::new();
        collect_text(&tree, node, &mut out);
        out
    }

    /// Serialize the subtree rooted at `node`. Attributes and styles are
    /// written; typed properties are not, matching how a DOM serializes.
    pub fn to_html(&self, node: HostNode) -> String {
        let tree = self.tree.lock();
        let mut out = String::new();
        write_html(&tree, node, &mut out);
        out
    }

    /// Call every listener for `event` on `node`. Returns how many ran.
    pub fn dispatch(&self, node: HostNode, event: &str) -> usize {
        let listeners: Vec<Listener> = match self.tree.lock().nodes.get(&node).map(|n| &n.content) {
            Some(Content::Element { listeners, .. }) => listeners.get(event).cloned().unwrap_or_default(),
            _ => Vec::new(),
        };
        let payload = Event {
            name: event.to_string(),
            target: node,
        };
        for listener in &listeners {
            listener(&payload);
        }
        listeners.len()
    }
}

fn collect_text(tree: &Tree, node: HostNode, out: &mut String) {
    match tree.nodes.get(&node).map(|n| &n.content) {
        Some(Content::Text(text)) => out.push_str(text),
        Some(Content::Element { children, .. }) => {
            for child in children {
                collect_text(tree, *child, out);
            }
        }
        None => {}
    }
}

fn write_html(tree: &Tree, node: HostNode, out: &mut String) {
    match tree.nodes.get(&node).map(|n| &n.content) {
        Some(Content::Text(text)) => out.push_str(&escape(text)),
        Some(Content::Element {
            tag,
            attributes,
            styles,
            children,
            ..
        }) => {
            let _ = write!(out, "<{tag}");
            for (name, value) in attributes {
                let _ = write!(out, " {name}=\"{}\"", escape(value));
            }
            if !styles.is_empty() {
                let css: Vec<String> = styles.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                let _ = write!(out, " style=\"{}\"", escape(&css.join("; ")));
            }
            out.push('>');
            for child in children {
                write_html(tree, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
        None => {}
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Host for MemoryHost {
    fn create_element(&self, tag: &str) -> HostNode {
        let mut tree = self.tree.lock();
        tree.stats.elements_created += 1;
        tree.insert(Content::Element {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
            properties: IndexMap::new(),
            styles: IndexMap::new(),
            listeners: IndexMap::new(),
            children: Vec::new(),
        })
    }

    fn create_text(&self, text: &str) -> HostNode {
        let mut tree = self.tree.lock();
        tree.stats.texts_created += 1;
        tree.insert(Content::Text(text.to_string()))
    }

    fn set_attribute(&self, node: HostNode, name: &str, value: &str) {
        let mut tree = self.tree.lock();
        if let Some(element) = tree.element_mut(node) {
            element.attributes.insert(name.to_string(), value.to_string());
            tree.stats.attribute_writes += 1;
        }
    }

    fn remove_attribute(&self, node: HostNode, name: &str) {
        let mut tree = self.tree.lock();
        if let Some(element) = tree.element_mut(node) {
            if element.attributes.shift_remove(name).is_some() {
                tree.stats.attribute_removals += 1;
            }
        }
    }

    fn has_property(&self, node: HostNode, name: &str) -> bool {
        let tree = self.tree.lock();
        matches!(
            tree.nodes.get(&node).map(|n| &n.content),
            Some(Content::Element { .. })
        ) && NATIVE_PROPERTIES.contains(&name)
    }

    fn set_property(&self, node: HostNode, name: &str, value: &Value) {
        let mut tree = self.tree.lock();
        if let Some(element) = tree.element_mut(node) {
            element.properties.insert(name.to_string(), value.clone());
            tree.stats.property_writes += 1;
        }
    }

    fn remove_property(&self, node: HostNode, name: &str) {
        let mut tree = self.tree.lock();
        if let Some(element) = tree.element_mut(node) {
            if element.properties.shift_remove(name).is_some() {
                tree.stats.property_removals += 1;
            }
        }
    }

    fn set_style(&self, node: HostNode, name: &str, value: &str) {
        let mut tree = self.tree.lock();
        if let Some(element) = tree.element_mut(node) {
            element.styles.insert(name.to_string(), value.to_string());
            tree.stats.style_writes += 1;
        }
    }

    fn remove_style(&self, node: HostNode, name: &str) {
        let mut tree = self.tree.lock();
        if let Some(element) = tree.element_mut(node) {
            if element.styles.shift_remove(name).is_some() {
                tree.stats.style_removals += 1;
            }
        }
    }

    fn add_listener(&self, node: HostNode, event: &str, listener: Listener) {
        let mut tree = self.tree.lock();
        if let Some(element) = tree.element_mut(node) {
            element.listeners.entry(event.to_string()).or_default().push(listener);
            tree.stats.listeners_added += 1;
        }
    }

    fn remove_listener(&self, node: HostNode, event: &str, listener: &Listener) {
        let mut tree = self.tree.lock();
        if let Some(element) = tree.element_mut(node) {
            if let Some(list) = element.listeners.get_mut(event) {
                let before = list.len();
                list.retain(|existing| !Arc::ptr_eq(existing, listener));
                let removed = before - list.len();
                tree.stats.listeners_removed += removed;
            }
        }
    }

    fn append_child(&self, parent: HostNode, child: HostNode) {
        self.tree.lock().attach(parent, child, None);
    }

    fn insert_before(&self, parent: HostNode, child: HostNode, reference: Option<HostNode>) {
        if reference == Some(child) {
            return;
        }
        self.tree.lock().attach(parent, child, reference);
    }

    fn replace_child(&self, parent: HostNode, new_child: HostNode, old_child: HostNode) {
        let mut tree = self.tree.lock();
        tree.detach(new_child);
        let Some(children) = tree.children_mut(parent) else {
            return;
        };
        let Some(index) = children.iter().position(|c| *c == old_child) else {
            return;
        };
        children[index] = new_child;
        if let Some(node) = tree.nodes.get_mut(&old_child) {
            node.parent = None;
        }
        if let Some(node) = tree.nodes.get_mut(&new_child) {
            node.parent = Some(parent);
        }
        tree.stats.replaces += 1;
    }

    fn remove_child(&self, parent: HostNode, child: HostNode) {
        let mut tree = self.tree.lock();
        if tree.nodes.get(&child).and_then(|node| node.parent) != Some(parent) {
            return;
        }
        tree.detach(child);
        tree.stats.removes += 1;
    }

    fn text(&self, node: HostNode) -> Option<String> {
        match &self.tree.lock().nodes.get(&node)?.content {
            Content::Text(text) => Some(text.clone()),
            Content::Element { .. } => None,
        }
    }

    fn set_text(&self, node: HostNode, text: &str) {
        let mut tree = self.tree.lock();
        if let Some(MemoryNode {
            content: Content::Text(current),
            ..
        }) = tree.nodes.get_mut(&node)
        {
            *current = text.to_string();
            tree.stats.text_writes += 1;
        }
    }

    fn parent(&self, node: HostNode) -> Option<HostNode> {
        self.tree.lock().nodes.get(&node)?.parent
    }

    fn children(&self, node: HostNode) -> Vec<HostNode> {
        match self.tree.lock().nodes.get(&node).map(|n| &n.content) {
            Some(Content::Element { children, .. }) => children.clone(),
            _ => Vec::new(),
        }
    }
}
