//! Host node creation.

use super::{write_value, BindingSlot, Executor};
use crate::host::HostNode;
use crate::runtime::{InstanceId, Phase};
use crate::view::{Node, PropValue, StyleValue};

/// Event name for a handler property: `onClick` listens for `click`.
pub(crate) fn event_name(prop: &str) -> String {
    prop.strip_prefix("on").unwrap_or(prop).to_lowercase()
}

impl Executor {
    /// Materialize `node`. Bindings and lifecycle callbacks belong to
    /// `owner` unless the node was produced by a component instance.
    pub(crate) fn create(&self, node: &Node, owner: InstanceId) -> HostNode {
        match node {
            Node::Text(text) => self.host.create_text(text),
            Node::Reactive(source) => {
                let dom = self.host.create_text(&source.render());
                self.bind(dom, BindingSlot::Text, source, owner);
                dom
            }
            Node::Element(element) => {
                for id in element.instances() {
                    self.runtime.run_lifecycle(*id, Phase::WillMount, None);
                }
                let owner = element.innermost_instance().unwrap_or(owner);

                let dom = self.host.create_element(element.tag());
                for (name, value) in element.props().iter() {
                    self.set_prop(dom, name, value, owner);
                }
                for child in element.children() {
                    let child = self.create(child, owner);
                    self.host.append_child(dom, child);
                }
                if let Some(node_ref) = element.props().get_node_ref() {
                    let _ = self.runtime.run_task(Some(owner), || node_ref(dom));
                }

                for id in element.instances() {
                    self.runtime.set_root(*id, Some(dom));
                    self.runtime.run_lifecycle(*id, Phase::DidMount, Some(dom));
                }
                dom
            }
            Node::Leaf(leaf) => {
                for id in leaf.instances() {
                    self.runtime.run_lifecycle(*id, Phase::WillMount, None);
                }
                let owner = leaf.innermost_instance().unwrap_or(owner);
                let dom = self.create(leaf.node(), owner);
                for id in leaf.instances() {
                    self.runtime.set_root(*id, Some(dom));
                    self.runtime.run_lifecycle(*id, Phase::DidMount, Some(dom));
                }
                dom
            }
        }
    }

    pub(crate) fn set_prop(&self, dom: HostNode, name: &str, value: &PropValue, owner: InstanceId) {
        match value {
            PropValue::Value(value) => write_value(self.host.as_ref(), dom, name, value),
            PropValue::Handler(listener) => {
                self.host.add_listener(dom, &event_name(name), listener.clone());
            }
            PropValue::Reactive(source) => {
                write_value(self.host.as_ref(), dom, name, &source.render().into());
                self.bind(dom, BindingSlot::Prop(name.to_string()), source, owner);
            }
            PropValue::Style(styles) => {
                for (style, value) in styles {
                    self.set_style(dom, style, value, owner);
                }
            }
        }
    }

    pub(crate) fn set_style(&self, dom: HostNode, name: &str, value: &StyleValue, owner: InstanceId) {
        match value {
            StyleValue::Static(text) => {
                self.release(dom, BindingSlot::Style(name.to_string()));
                self.host.set_style(dom, name, text);
            }
            StyleValue::Reactive(source) => {
                self.host.set_style(dom, name, &source.render());
                self.bind(dom, BindingSlot::Style(name.to_string()), source, owner);
            }
        }
    }
}
