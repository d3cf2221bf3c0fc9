//! First-screen hydration.
//!
//! Reconciles a serialized main-thread tree against the live background
//! tree and returns the patch that makes the main side match.
//!
//! Contract:
//! - Each matched background node takes over the main id; the remap is
//!   recorded in the [`HydrationMap`](crate::HydrationMap).
//! - Values are compared by deep equality. Ref values are skipped and a
//!   missing value equals `null`.
//! - `Slot`/`MultiChildren` children are paired by position. Ordered
//!   children go through [`diff_keyed`] on template ids; a moved node is
//!   reinserted with a single `InsertBefore`, new nodes are rebuilt in full.
//! - Equivalent trees produce an empty patch.
//! - Ref updates queued before or during hydration are discarded.

use crate::background::BackgroundTree;
use crate::definition::SlotKind;
use crate::diff_array::{ArrayAction, diff_keyed};
use crate::patch::PatchOp;
use crate::serialized::SerializedInstance;
use crate::tree::{NodeKey, TreeError};
use crate::value::{AttrKey, Value, is_direct_or_deep_equal, is_ref};
use core_types::InstanceId;
use std::sync::Arc;

impl BackgroundTree {
    pub fn hydrate(
        &mut self,
        before: &SerializedInstance,
        after: InstanceId,
    ) -> Result<Vec<PatchOp>, TreeError> {
        let after = self.key(after)?;
        let outer = self.patch.replace(Vec::new());
        self.hydrate_node(before, after);
        let patch = std::mem::replace(&mut self.patch, outer).unwrap_or_default();
        self.refs.clear();
        log::debug!(
            target: "hydrate",
            "hydrated {} instances, {} ops",
            self.hydration_map.len(),
            patch.len()
        );
        Ok(patch)
    }

    fn hydrate_node(&mut self, before: &SerializedInstance, after: NodeKey) {
        let Some(after_id) = self.tree.id_of(after) else {
            return;
        };
        self.hydration_map.record(after_id, before.id);
        self.tree.remap(after_id, before.id);
        let id = before.id;

        let Some(node) = self.tree.get(after) else {
            return;
        };
        let definition = Arc::clone(&node.data.definition);
        let values = node.data.values.clone().unwrap_or_default();
        let extra_props: Vec<(Arc<str>, Value)> = node
            .data
            .extra_props
            .iter()
            .map(|(k, v)| (Arc::clone(k), v.clone()))
            .collect();

        let before_len = before.values.as_ref().map_or(0, Vec::len);
        for index in 0..values.len().max(before_len) {
            let value = values.get(index);
            if value.is_some_and(is_ref) {
                continue;
            }
            let old = before.value(index);
            if !is_direct_or_deep_equal(value, old) {
                self.push(PatchOp::SetAttribute {
                    id,
                    key: AttrKey::Index(index),
                    value: value.cloned().unwrap_or(Value::Null),
                });
            }
        }
        for (name, value) in &extra_props {
            if !is_direct_or_deep_equal(Some(value), before.extra_props.get(name)) {
                self.push(PatchOp::SetAttribute {
                    id,
                    key: AttrKey::Name(Arc::clone(name)),
                    value: value.clone(),
                });
            }
        }
        for (name, old) in &before.extra_props {
            let dropped = !extra_props.iter().any(|(k, _)| k == name);
            if dropped && !old.is_null() {
                self.push(PatchOp::SetAttribute {
                    id,
                    key: AttrKey::Name(Arc::clone(name)),
                    value: Value::Null,
                });
            }
        }

        let children = self.tree.children(after);
        match definition.slot.as_slice() {
            [] => {}
            [entry] if matches!(entry.0, SlotKind::Children | SlotKind::ListChildren) => {
                self.hydrate_children(id, &before.children, &children);
            }
            slots => {
                for (index, entry) in slots.iter().enumerate() {
                    if !matches!(entry.0, SlotKind::Slot | SlotKind::MultiChildren) {
                        log::warn!(target: "hydrate", "ordered slot {index} of {} is not alone", definition.template_id);
                    }
                    match (before.children.get(index), children.get(index)) {
                        (Some(b), Some(a)) => self.hydrate_node(b, *a),
                        (None, Some(a)) => {
                            self.emit_subtree(*a);
                            if let Some(child) = self.tree.id_of(*a) {
                                self.push(PatchOp::InsertBefore {
                                    parent: id,
                                    child,
                                    before: None,
                                });
                            }
                        }
                        (Some(b), None) => self.push(PatchOp::RemoveChild {
                            parent: id,
                            child: b.id,
                        }),
                        (None, None) => {}
                    }
                }
            }
        }
    }

    fn hydrate_children(&mut self, parent: InstanceId, before: &[SerializedInstance], after: &[NodeKey]) {
        let old_keys: Vec<&str> = before.iter().map(|b| b.template.as_ref()).collect();
        let new_keys: Vec<Arc<str>> = after
            .iter()
            .map(|k| {
                self.tree
                    .get(*k)
                    .map(|n| Arc::clone(&n.template))
                    .unwrap_or_else(|| Arc::from(""))
            })
            .collect();
        let new_refs: Vec<&str> = new_keys.iter().map(|k| k.as_ref()).collect();
        let diff = diff_keyed(&old_keys, &new_refs);

        for (old, new) in &diff.matched {
            self.hydrate_node(&before[*old], after[*new]);
        }

        let anchor = |tree: &BackgroundTree, at: Option<usize>| {
            at.and_then(|j| tree.tree.id_of(after[j]))
        };
        for action in &diff.actions {
            match *action {
                ArrayAction::Remove { old } => self.push(PatchOp::RemoveChild {
                    parent,
                    child: before[old].id,
                }),
                ArrayAction::Insert { new, before: at } => {
                    self.emit_subtree(after[new]);
                    let target = anchor(self, at);
                    if let Some(child) = self.tree.id_of(after[new]) {
                        self.push(PatchOp::InsertBefore {
                            parent,
                            child,
                            before: target,
                        });
                    }
                }
                ArrayAction::Move { old, before: at, .. } => {
                    let child = before[old].id;
                    let target = anchor(self, at);
                    self.push(PatchOp::InsertBefore {
                        parent,
                        child,
                        before: target,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, DefinitionRegistry, ElementTemplate};
    use serde_json::json;

    fn registry() -> DefinitionRegistry {
        let mut registry = DefinitionRegistry::new();
        for name in ["a", "b", "c", "view"] {
            registry.register(
                Definition::new(name)
                    .with_element(ElementTemplate::element("view"))
                    .with_slot(SlotKind::Children, 0),
            );
        }
        registry.register(
            Definition::new("two-slots")
                .with_element(ElementTemplate::element("view"))
                .with_element(ElementTemplate::element("view").child_of(0))
                .with_element(ElementTemplate::element("view").child_of(0))
                .with_slot(SlotKind::Slot, 1)
                .with_slot(SlotKind::Slot, 2),
        );
        registry
    }

    fn build(bg: &mut BackgroundTree, children: &[&str]) -> (InstanceId, Vec<InstanceId>) {
        let root = bg.create_instance("root").unwrap();
        let ids = children
            .iter()
            .map(|t| {
                let id = bg.create_instance(t).unwrap();
                bg.append_child(root, id).unwrap();
                id
            })
            .collect();
        (root, ids)
    }

    fn main_snapshot(children: &[(&str, i32)]) -> SerializedInstance {
        let mut root = SerializedInstance::new(InstanceId(-1), "root");
        for (template, id) in children {
            root.children
                .push(SerializedInstance::new(InstanceId(*id), template));
        }
        root
    }

    #[test]
    fn equivalent_trees_hydrate_to_nothing() {
        let mut bg = BackgroundTree::new(registry());
        let (root, ids) = build(&mut bg, &["a", "b"]);
        bg.set_values(ids[0], vec![json!({"x": [1]})]).unwrap();
        let mut snap = main_snapshot(&[("a", -2), ("b", -3)]);
        snap.children[0].values = Some(vec![json!({"x": [1]})]);

        let patch = bg.hydrate(&snap, root).unwrap();
        assert!(patch.is_empty(), "{patch:?}");
        assert_eq!(bg.child_nodes(InstanceId(-1)), vec![InstanceId(-2), InstanceId(-3)]);
        assert_eq!(bg.hydration_map().resolve(ids[1]), InstanceId(-3));
    }

    #[test]
    fn changed_values_emit_set_attribute() {
        let mut bg = BackgroundTree::new(registry());
        let (root, ids) = build(&mut bg, &["a"]);
        bg.set_values(ids[0], vec![json!("same"), json!("new"), Value::Null])
            .unwrap();
        bg.set_attribute(ids[0], "key", json!("k")).unwrap();
        let mut snap = main_snapshot(&[("a", -2)]);
        snap.children[0].values = Some(vec![json!("same"), json!("old")]);

        let patch = bg.hydrate(&snap, root).unwrap();
        assert_eq!(
            patch,
            vec![
                PatchOp::SetAttribute {
                    id: InstanceId(-2),
                    key: AttrKey::Index(1),
                    value: json!("new")
                },
                PatchOp::SetAttribute {
                    id: InstanceId(-2),
                    key: AttrKey::name("key"),
                    value: json!("k")
                },
            ]
        );
    }

    #[test]
    fn ref_values_are_skipped_and_refs_discarded() {
        let mut bg = BackgroundTree::new(registry());
        let (root, ids) = build(&mut bg, &["a"]);
        bg.set_values(ids[0], vec![json!({"__ref": 1})]).unwrap();
        assert_eq!(bg.queued_refs().len(), 1);
        let snap = main_snapshot(&[("a", -2)]);
        let patch = bg.hydrate(&snap, root).unwrap();
        assert!(patch.is_empty());
        assert!(bg.queued_refs().is_empty());
    }

    #[test]
    fn reorder_is_one_reinsertion() {
        let mut bg = BackgroundTree::new(registry());
        let (root, _) = build(&mut bg, &["b", "a", "c"]);
        let snap = main_snapshot(&[("a", -2), ("b", -3), ("c", -4)]);
        let patch = bg.hydrate(&snap, root).unwrap();
        assert_eq!(
            patch,
            vec![PatchOp::InsertBefore {
                parent: InstanceId(-1),
                child: InstanceId(-3),
                before: Some(InstanceId(-2))
            }]
        );
    }

    #[test]
    fn new_and_removed_children() {
        let mut bg = BackgroundTree::new(registry());
        let (root, ids) = build(&mut bg, &["a", "c"]);
        let grandchild = bg.create_instance("view").unwrap();
        bg.append_child(ids[1], grandchild).unwrap();
        bg.set_values(ids[1], vec![json!(9)]).unwrap();
        let snap = main_snapshot(&[("a", -2), ("b", -3)]);

        let patch = bg.hydrate(&snap, root).unwrap();
        assert_eq!(
            patch,
            vec![
                PatchOp::RemoveChild {
                    parent: InstanceId(-1),
                    child: InstanceId(-3)
                },
                PatchOp::CreateElement {
                    template: Arc::from("c"),
                    id: ids[1],
                    slot_index: None
                },
                PatchOp::SetAttributes {
                    id: ids[1],
                    values: vec![json!(9)]
                },
                PatchOp::CreateElement {
                    template: Arc::from("view"),
                    id: grandchild,
                    slot_index: None
                },
                PatchOp::InsertBefore {
                    parent: ids[1],
                    child: grandchild,
                    before: None
                },
                PatchOp::InsertBefore {
                    parent: InstanceId(-1),
                    child: ids[1],
                    before: None
                },
            ]
        );
    }

    #[test]
    fn slots_recurse_by_position() {
        let mut bg = BackgroundTree::new(registry());
        let root = bg.create_instance("root").unwrap();
        let holder = bg.create_instance("two-slots").unwrap();
        bg.append_child(root, holder).unwrap();
        let first = bg.create_instance("a").unwrap();
        let second = bg.create_instance("b").unwrap();
        bg.append_child(holder, first).unwrap();
        bg.append_child(holder, second).unwrap();
        bg.set_values(second, vec![json!(2)]).unwrap();

        let snap = SerializedInstance::new(InstanceId(-1), "root").with_child(
            SerializedInstance::new(InstanceId(-2), "two-slots")
                .with_child(SerializedInstance::new(InstanceId(-3), "a"))
                .with_child(SerializedInstance::new(InstanceId(-4), "b").with_values(vec![json!(1)])),
        );
        let patch = bg.hydrate(&snap, root).unwrap();
        assert_eq!(
            patch,
            vec![PatchOp::SetAttribute {
                id: InstanceId(-4),
                key: AttrKey::Index(0),
                value: json!(2)
            }]
        );
        assert_eq!(bg.parent_node(InstanceId(-4)), Some(InstanceId(-2)));
    }

    #[test]
    fn outer_patch_buffer_is_preserved() {
        let mut bg = BackgroundTree::new(registry());
        let (root, _) = build(&mut bg, &[]);
        bg.begin_patch();
        let _ = bg.create_instance("a").unwrap();
        let snap = main_snapshot(&[]);
        assert!(bg.hydrate(&snap, root).unwrap().is_empty());
        assert_eq!(bg.take_patch().len(), 1);
    }
}
