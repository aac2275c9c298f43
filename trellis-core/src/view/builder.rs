//! Tree Builder
//!
//! `h` turns a tag or component, its properties, and its children into one
//! [`Node`]. It never touches the host.
//!
//! # Children
//!
//! Children are flattened depth-first: nested lists are spliced in order,
//! empty children are dropped, and lazy children are resolved once, here.
//!
//! # Components
//!
//! A component is expanded immediately; `h` returns whatever its body
//! returns. When the scope belongs to an instance, the component gets a
//! child instance of its own, matched across renders by key or by call
//! order. The element it returns records that instance, so the executor
//! can run the instance's lifecycle around the element's creation and
//! patching.

use std::sync::Arc;

use smallvec::smallvec;

use super::node::{Child, Component, Element, Leaf, Node, Props, Tag};
use crate::runtime::{InstanceId, Scope};

/// Build a node description.
///
/// ```rust
/// use trellis_core::{children, h, Engine, Props};
///
/// let engine = Engine::new();
/// let cx = engine.scope();
/// let node = h(&cx, "ul", Props::new(), children![
///     h(&cx, "li", Props::new(), "one"),
///     Some(h(&cx, "li", Props::new(), "two")),
///     None::<&str>,
/// ]);
/// assert_eq!(node.as_element().map(|e| e.children().len()), Some(2));
/// ```
pub fn h(cx: &Scope, tag: impl Into<Tag>, props: Props, children: impl Into<Child>) -> Node {
    let children = flatten(children.into());
    match tag.into() {
        Tag::Element(tag) => Node::Element(Arc::new(Element::new(tag, props, children))),
        Tag::Component(component) => expand(cx, &component, props, children),
    }
}

/// Flatten a child argument into nodes.
pub fn flatten(child: Child) -> Vec<Node> {
    let mut out = Vec::new();
    push_child(child, &mut out);
    out
}

fn push_child(child: Child, out: &mut Vec<Node>) {
    match child {
        Child::Empty => {}
        Child::Node(node) => out.push(node),
        Child::Many(children) => {
            for child in children {
                push_child(child, out);
            }
        }
        Child::Lazy(resolve) => push_child(resolve(), out),
    }
}

fn expand(cx: &Scope, component: &Component, props: Props, children: Vec<Node>) -> Node {
    let key = props.get_key().cloned();
    let instance = cx
        .instance()
        .and_then(|parent| cx.runtime().claim_child(parent, component.name(), key.clone()));

    let node = match instance {
        Some(child) => component.call(&cx.for_instance(child), props, children),
        None => component.call(cx, props, children),
    };
    annotate(node, component, instance, key)
}

/// Record the component (and its instance) on the node it returned. Text
/// from a component with an instance is wrapped so the instance still has
/// a root to mount, update, and unmount with.
fn annotate(node: Node, component: &Component, instance: Option<InstanceId>, key: Option<super::Key>) -> Node {
    match node {
        Node::Element(element) => {
            let mut element = Arc::unwrap_or_clone(element);
            element.origin = Some(component.shared_name());
            if let Some(id) = instance {
                element.instances.insert(0, id);
            }
            element.props.set_key_if_absent(key);
            Node::Element(Arc::new(element))
        }
        Node::Leaf(leaf) => {
            let mut leaf = Arc::unwrap_or_clone(leaf);
            leaf.origin = component.shared_name();
            if let Some(id) = instance {
                leaf.instances.insert(0, id);
            }
            if leaf.key.is_none() {
                leaf.key = key;
            }
            Node::Leaf(Arc::new(leaf))
        }
        text => match instance {
            Some(id) => Node::Leaf(Arc::new(Leaf {
                node: text,
                key,
                origin: component.shared_name(),
                instances: smallvec![id],
            })),
            None => text,
        },
    }
}
