//! Keyed Child Reconciliation
//!
//! Matches an old child list against a new one under the same host parent.
//!
//! # Algorithm
//!
//! We keep a mirror of the parent's children, each entry remembering which
//! old description it was built from. Walking the new list in order, the
//! mirror up to the current index always matches the new list so far:
//!
//! 1. A keyed child whose key was in the old list is patched in place and,
//!    if it is not already at the current index, moved there.
//! 2. A keyed child with an unknown key is created and inserted.
//! 3. An unkeyed child patches the node at the current index, unless that
//!    node was already claimed or carries a key the new list still uses;
//!    then a fresh node is inserted instead.
//!
//! Whatever is left past the end of the new list is removed, last first.
//! Swapping two keyed children therefore costs one move and no creations.

use std::collections::{HashMap, HashSet};

use super::Executor;
use crate::host::HostNode;
use crate::runtime::InstanceId;
use crate::view::{Key, Node};

impl Executor {
    pub(crate) fn reconcile(&self, parent: HostNode, old: &[Node], new: &[Node], owner: InstanceId) {
        let mut slots: Vec<(HostNode, Option<usize>)> = self
            .host
            .children(parent)
            .into_iter()
            .enumerate()
            .map(|(index, dom)| (dom, (index < old.len()).then_some(index)))
            .collect();

        let mut old_keyed: HashMap<&Key, usize> = HashMap::new();
        for (index, node) in old.iter().enumerate() {
            if let Some(key) = node.key() {
                old_keyed.entry(key).or_insert(index);
            }
        }
        let new_keys: HashSet<&Key> = new.iter().filter_map(Node::key).collect();
        let mut consumed = vec![false; old.len()];

        for (index, node) in new.iter().enumerate() {
            if let Some(key) = node.key() {
                let matched = old_keyed.get(key).copied().filter(|from| !consumed[*from]);
                let position = matched.and_then(|from| slots.iter().position(|(_, origin)| *origin == Some(from)));

                if let (Some(from), Some(position)) = (matched, position) {
                    consumed[from] = true;
                    let dom = self.patch_node(slots[position].0, &old[from], node, owner);
                    slots[position].0 = dom;
                    if position != index {
                        let entry = slots.remove(position);
                        let reference = slots.get(index).map(|(dom, _)| *dom);
                        self.host.insert_before(parent, entry.0, reference);
                        slots.insert(index, entry);
                    }
                } else {
                    self.insert_fresh(parent, &mut slots, index, node, owner);
                }
                continue;
            }

            let reusable = slots.get(index).and_then(|(dom, origin)| {
                let from = (*origin)?;
                let free = !consumed[from] && old[from].key().map_or(true, |key| !new_keys.contains(key));
                free.then_some((*dom, from))
            });
            match reusable {
                Some((dom, from)) => {
                    consumed[from] = true;
                    slots[index].0 = self.patch_node(dom, &old[from], node, owner);
                }
                None => self.insert_fresh(parent, &mut slots, index, node, owner),
            }
        }

        for (dom, _) in slots.drain(new.len().min(slots.len())..).rev() {
            self.host.remove_child(parent, dom);
            self.release_subtree(dom);
        }
    }

    fn insert_fresh(
        &self,
        parent: HostNode,
        slots: &mut Vec<(HostNode, Option<usize>)>,
        index: usize,
        node: &Node,
        owner: InstanceId,
    ) {
        let dom = self.create(node, owner);
        let reference = slots.get(index).map(|(dom, _)| *dom);
        self.host.insert_before(parent, dom, reference);
        slots.insert(index, (dom, None));
    }
}
