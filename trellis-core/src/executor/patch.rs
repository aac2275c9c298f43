//! Patching
//!
//! `patch` diffs two descriptions against one existing host node:
//!
//! 1. Different kinds (text, live text, element tag, owning instances) or
//!    different keys: build the new subtree and swap it in.
//! 2. Two live text nodes: rebind if the signal changed, then write the
//!    current value if the host shows something else.
//! 3. Two text nodes: write only if the text changed.
//! 4. Two elements: diff properties, reconcile children, call the ref.
//! 5. Two component leaves: patch the wrapped text under the innermost
//!    instance.
//!
//! `willUpdate` runs before any of this and `didUpdate` is queued after,
//! once per instance-level patch.

use super::{BindingSlot, Executor};
use crate::host::HostNode;
use crate::runtime::{InstanceId, Phase};
use crate::view::{Node, PropValue, Props};

use super::create::event_name;

impl Executor {
    /// Patch `dom` from `old` to `new` on behalf of `owner`. Returns the
    /// host node now standing where `dom` was.
    pub fn patch(&self, dom: HostNode, old: &Node, new: &Node, owner: InstanceId) -> HostNode {
        if !self.runtime.is_alive(owner) {
            return dom;
        }
        self.runtime.run_lifecycle(owner, Phase::WillUpdate, Some(dom));
        let dom = self.patch_node(dom, old, new, owner);
        self.runtime.run_lifecycle(owner, Phase::DidUpdate, Some(dom));
        dom
    }

    pub(crate) fn patch_node(&self, dom: HostNode, old: &Node, new: &Node, owner: InstanceId) -> HostNode {
        if !old.same_kind(new) || old.key() != new.key() {
            return self.replace(dom, new, owner);
        }

        match (old, new) {
            (Node::Text(before), Node::Text(after)) => {
                if before != after {
                    self.host.set_text(dom, after);
                }
                dom
            }
            (Node::Reactive(before), Node::Reactive(after)) => {
                if before.id() != after.id() {
                    self.bind(dom, BindingSlot::Text, after, owner);
                }
                let text = after.render();
                if self.host.text(dom).as_deref() != Some(text.as_str()) {
                    self.host.set_text(dom, &text);
                }
                dom
            }
            (Node::Element(before), Node::Element(after)) => {
                for id in after.instances() {
                    self.runtime.run_lifecycle(*id, Phase::WillUpdate, Some(dom));
                }
                let owner = after.innermost_instance().unwrap_or(owner);

                self.update_props(dom, before.props(), after.props(), owner);
                self.reconcile(dom, before.children(), after.children(), owner);
                if let Some(node_ref) = after.props().get_node_ref() {
                    let _ = self.runtime.run_task(Some(owner), || node_ref(dom));
                }

                for id in after.instances() {
                    self.runtime.run_lifecycle(*id, Phase::DidUpdate, Some(dom));
                }
                dom
            }
            (Node::Leaf(before), Node::Leaf(after)) => {
                for id in after.instances() {
                    self.runtime.run_lifecycle(*id, Phase::WillUpdate, Some(dom));
                }
                let owner = after.innermost_instance().unwrap_or(owner);
                let dom = self.patch_node(dom, before.node(), after.node(), owner);
                for id in after.instances() {
                    self.runtime.set_root(*id, Some(dom));
                    self.runtime.run_lifecycle(*id, Phase::DidUpdate, Some(dom));
                }
                dom
            }
            _ => self.replace(dom, new, owner),
        }
    }

    /// Build `new` and substitute it for `dom`.
    fn replace(&self, dom: HostNode, new: &Node, owner: InstanceId) -> HostNode {
        let fresh = self.create(new, owner);
        if let Some(parent) = self.host.parent(dom) {
            self.host.replace_child(parent, fresh, dom);
        }
        self.release_subtree(dom);
        fresh
    }

    pub(crate) fn update_props(&self, dom: HostNode, old: &Props, new: &Props, owner: InstanceId) {
        for (name, value) in old.iter() {
            if new.get(name).is_none() {
                self.remove_prop(dom, name, value);
            }
        }

        for (name, value) in new.iter() {
            match old.get(name) {
                Some(previous) if previous == value => {}
                Some(PropValue::Style(before)) => match value {
                    PropValue::Style(after) => {
                        for (style, _) in before.iter().filter(|(style, _)| !after.contains_key(*style)) {
                            self.release(dom, BindingSlot::Style(style.clone()));
                            self.host.remove_style(dom, style);
                        }
                        for (style, entry) in after {
                            if before.get(style) != Some(entry) {
                                self.set_style(dom, style, entry, owner);
                            }
                        }
                    }
                    _ => {
                        self.remove_prop(dom, name, &PropValue::Style(before.clone()));
                        self.set_prop(dom, name, value, owner);
                    }
                },
                Some(PropValue::Handler(listener)) => {
                    self.host.remove_listener(dom, &event_name(name), listener);
                    self.set_prop(dom, name, value, owner);
                }
                Some(_) => {
                    // Value or Reactive: drop any binding, then write.
                    self.release(dom, BindingSlot::Prop(name.to_string()));
                    self.set_prop(dom, name, value, owner);
                }
                None => self.set_prop(dom, name, value, owner),
            }
        }
    }

    fn remove_prop(&self, dom: HostNode, name: &str, value: &PropValue) {
        match value {
            PropValue::Handler(listener) => {
                self.host.remove_listener(dom, &event_name(name), listener);
            }
            PropValue::Style(styles) => {
                for style in styles.keys() {
                    self.release(dom, BindingSlot::Style(style.clone()));
                    self.host.remove_style(dom, style);
                }
            }
            PropValue::Value(_) | PropValue::Reactive(_) => {
                self.release(dom, BindingSlot::Prop(name.to_string()));
                if self.host.has_property(dom, name) {
                    self.host.remove_property(dom, name);
                } else {
                    self.host.remove_attribute(dom, name);
                }
            }
        }
    }
}
