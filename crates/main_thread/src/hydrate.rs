//! Recycle merge: moves a rendered instance's elements onto another
//! instance of the same template and patches only what differs.
//!
//! Contract:
//! - `after` ends up owning `before`'s elements; `before` must be
//!   un-rendered by the caller afterwards.
//! - Value differences run the updaters with list recording suspended.
//! - Ordered children are matched by template with the keyed array diff;
//!   unmatched new children are built fresh.
//! - A nested list moves to the new holder and is re-described in full.

use crate::main_tree::MainTree;
use host::ElementHost;
use snapshot::{ArrayAction, NodeKey, SlotEntry, SlotKind, diff_keyed, is_direct_or_deep_equal};
use std::sync::Arc;

impl<H: ElementHost> MainTree<H> {
    pub(crate) fn hydrate_into(&mut self, before: NodeKey, after: NodeKey) {
        let (elements, root, slot_index, old_values) = match self.tree.data_mut(before) {
            Some(data) => (
                data.elements.take(),
                data.element_root.take(),
                data.current_slot_index,
                data.values.clone(),
            ),
            None => return,
        };
        let Some(data) = self.tree.data_mut(after) else {
            return;
        };
        data.elements = elements;
        data.element_root = root;
        data.current_slot_index = slot_index;
        let new_values = data.values.clone();
        let definition = Arc::clone(&data.definition);

        self.pending.suspend();
        let len = old_values
            .as_ref()
            .map_or(0, Vec::len)
            .max(new_values.as_ref().map_or(0, Vec::len));
        for index in 0..len {
            let old = old_values.as_ref().and_then(|v| v.get(index));
            let new = new_values.as_ref().and_then(|v| v.get(index));
            if !is_direct_or_deep_equal(old, new) {
                self.run_updater(after, index, old.cloned());
            }
        }
        self.pending.resume();

        if definition.is_list_holder() {
            self.transfer_list(after);
            return;
        }

        let old_children = self.tree.children(before);
        let new_children = self.tree.children(after);
        match definition.slot.as_slice() {
            [] => {}
            [SlotEntry(SlotKind::Children | SlotKind::ListChildren, target)] => {
                let Some(parent) = self.element_at(after, *target) else {
                    return;
                };
                let keys = |children: &[NodeKey]| -> Vec<Arc<str>> {
                    children
                        .iter()
                        .map(|c| {
                            self.tree
                                .get(*c)
                                .map(|n| Arc::clone(&n.template))
                                .unwrap_or_else(|| Arc::from(""))
                        })
                        .collect()
                };
                let diff = diff_keyed(&keys(&old_children), &keys(&new_children));
                for (old, new) in &diff.matched {
                    self.hydrate_into(old_children[*old], new_children[*new]);
                }
                for action in &diff.actions {
                    match action {
                        ArrayAction::Remove { old } => {
                            if let Some(element) = self.root_of(old_children[*old]) {
                                self.host.remove_element(parent, element);
                            }
                        }
                        ArrayAction::Insert { new, before } => {
                            self.ensure_key(new_children[*new]);
                            let anchor = before.and_then(|j| self.root_of(new_children[j]));
                            if let Some(element) = self.root_of(new_children[*new]) {
                                self.host.insert_element_before(parent, element, anchor);
                            }
                        }
                        ArrayAction::Move { new, before, .. } => {
                            let anchor = before.and_then(|j| self.root_of(new_children[j]));
                            if let Some(element) = self.root_of(new_children[*new]) {
                                self.host.remove_element(parent, element);
                                self.host.insert_element_before(parent, element, anchor);
                            }
                        }
                    }
                }
            }
            slots => {
                for (index, _) in slots.iter().enumerate() {
                    match (old_children.get(index), new_children.get(index)) {
                        (Some(old), Some(new)) => self.hydrate_into(*old, *new),
                        (None, Some(new)) => {
                            self.ensure_key(*new);
                            if let Some(root) = self.root_of(*new) {
                                self.attach_to_slot(after, index, root);
                            }
                        }
                        (Some(old), None) => log::warn!(
                            target: "hydrate",
                            "slot {index} emptied on reuse of {:?}",
                            self.tree.id_of(*old)
                        ),
                        (None, None) => {}
                    }
                }
            }
        }
    }

    /// Rebinds a reused list element to `holder` and describes the holder's
    /// children as a replacement of everything the list showed before.
    fn transfer_list(&mut self, holder: NodeKey) {
        let Some(element) = self.list_element_of(holder) else {
            return;
        };
        let previous = match self.lists.get_mut(&element) {
            Some(state) => {
                state.owner = holder;
                state.deferred.clear();
                state.cells.len()
            }
            None => return,
        };
        self.batches.retain(|_, batch| batch.list_id != element);
        self.pending.replace_all(&self.tree, holder, previous);
        self.flush_list(holder);
    }
}
