//! Background instance tree.
//!
//! Mirrors the main tree's structure and attributes without any native
//! elements. While a patch buffer is active every mutation appends the
//! matching [`PatchOp`]; without one, mutations only touch the tree.
//!
//! Invariants:
//! - Ids are assigned from 1 upwards and never reused.
//! - Ref values stay on this thread. Patches carry `1` in their place and
//!   the ref itself is queued in the [`RefQueue`].
//! - A node removed from the tree is flagged; inserting it again replays
//!   its whole subtree, since the main thread dropped it.

use crate::definition::{Definition, DefinitionRegistry};
use crate::hydration_map::HydrationMap;
use crate::patch::PatchOp;
use crate::refs::{RefQueue, RefUpdate};
use crate::serialized::SerializedInstance;
use crate::tree::{InstanceTree, NodeKey, TreeError};
use crate::value::{AttrKey, Value, committed_ref, is_direct_or_deep_equal, is_ref};
use core_types::InstanceId;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct BackgroundData {
    pub definition: Arc<Definition>,
    pub values: Option<Vec<Value>>,
    pub extra_props: BTreeMap<Arc<str>, Value>,
    pub removed_from_tree: bool,
}

pub struct BackgroundTree {
    registry: DefinitionRegistry,
    pub(crate) tree: InstanceTree<BackgroundData>,
    next_id: i32,
    pub(crate) patch: Option<Vec<PatchOp>>,
    pub(crate) refs: RefQueue,
    pub(crate) hydration_map: HydrationMap,
    removed: Vec<NodeKey>,
}

fn commit_value(value: &Value) -> Value {
    if is_ref(value) {
        committed_ref()
    } else {
        value.clone()
    }
}

impl BackgroundTree {
    pub fn new(registry: DefinitionRegistry) -> Self {
        Self {
            registry,
            tree: InstanceTree::new(),
            next_id: 1,
            patch: None,
            refs: RefQueue::default(),
            hydration_map: HydrationMap::default(),
            removed: Vec::new(),
        }
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DefinitionRegistry {
        &mut self.registry
    }

    /// Starts recording patches. An already active buffer is kept.
    pub fn begin_patch(&mut self) {
        if self.patch.is_some() {
            log::debug!(target: "background", "patch buffer already active");
            return;
        }
        self.patch = Some(Vec::new());
    }

    /// Swaps the active buffer for an empty one.
    pub fn take_patch(&mut self) -> Vec<PatchOp> {
        match self.patch.as_mut() {
            Some(patch) => std::mem::take(patch),
            None => Vec::new(),
        }
    }

    /// Takes the remaining ops and stops recording.
    pub fn end_patch(&mut self) -> Vec<PatchOp> {
        self.patch.take().unwrap_or_default()
    }

    pub fn is_buffering(&self) -> bool {
        self.patch.is_some()
    }

    pub(crate) fn push(&mut self, op: PatchOp) {
        if let Some(patch) = self.patch.as_mut() {
            log::trace!(target: "background", "patch {op:?}");
            patch.push(op);
        }
    }

    pub(crate) fn key(&self, id: InstanceId) -> Result<NodeKey, TreeError> {
        self.tree.lookup(id).ok_or(TreeError::UnknownInstance(id))
    }

    pub fn create_instance(&mut self, template: &str) -> Result<InstanceId, TreeError> {
        let definition = self
            .registry
            .get(template)
            .cloned()
            .ok_or_else(|| TreeError::UnknownTemplate(template.to_string()))?;
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        let template: Arc<str> = Arc::from(template);
        self.tree.insert(
            id,
            Arc::clone(&template),
            BackgroundData {
                definition,
                values: None,
                extra_props: BTreeMap::new(),
                removed_from_tree: false,
            },
        );
        self.push(PatchOp::CreateElement {
            template,
            id,
            slot_index: None,
        });
        Ok(id)
    }

    pub fn insert_before(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
        before: Option<InstanceId>,
    ) -> Result<(), TreeError> {
        let parent_key = self.key(parent)?;
        let child_key = self.key(child)?;
        let before_key = before.map(|b| self.key(b)).transpose()?;
        if self.tree.is_ancestor(child_key, parent_key) {
            return Err(TreeError::Cycle { parent, child });
        }

        let removed = self
            .tree
            .data(child_key)
            .is_some_and(|d| d.removed_from_tree);
        if removed {
            self.removed.retain(|k| *k != child_key);
            self.emit_subtree(child_key);
        }
        self.push(PatchOp::InsertBefore {
            parent,
            child,
            before,
        });
        self.tree.insert_before(parent_key, child_key, before_key);
        Ok(())
    }

    pub fn append_child(&mut self, parent: InstanceId, child: InstanceId) -> Result<(), TreeError> {
        self.insert_before(parent, child, None)
    }

    pub fn remove_child(&mut self, parent: InstanceId, child: InstanceId) -> Result<(), TreeError> {
        let parent_key = self.key(parent)?;
        let child_key = self.key(child)?;
        self.tree.remove_child(parent_key, child_key)?;
        self.push(PatchOp::RemoveChild { parent, child });
        self.queue_unrefs(child_key);
        if let Some(data) = self.tree.data_mut(child_key) {
            data.removed_from_tree = true;
        }
        self.removed.push(child_key);
        Ok(())
    }

    /// Replaces the whole value array.
    ///
    /// The first assignment ships every value in one `SetAttributes`; later
    /// ones send a `SetAttribute` per changed index.
    pub fn set_values(&mut self, id: InstanceId, values: Vec<Value>) -> Result<(), TreeError> {
        let key = self.key(id)?;
        let old = self.tree.data_mut(key).and_then(|d| d.values.take());
        let mut changed = Vec::new();
        for (index, value) in values.iter().enumerate() {
            let previous = old.as_ref().and_then(|o| o.get(index));
            if self.track_ref(id, index, previous, value) {
                changed.push(index);
            }
        }
        if let Some(old) = old.as_ref() {
            for index in values.len()..old.len() {
                if self.track_ref(id, index, old.get(index), &Value::Null) {
                    changed.push(index);
                }
            }
        }
        if old.is_some() {
            for index in changed {
                let value = values.get(index).map(commit_value).unwrap_or(Value::Null);
                self.push(PatchOp::SetAttribute {
                    id,
                    key: AttrKey::Index(index),
                    value,
                });
            }
        } else {
            self.push(PatchOp::SetAttributes {
                id,
                values: values.iter().map(commit_value).collect(),
            });
        }
        if let Some(data) = self.tree.data_mut(key) {
            data.values = Some(values);
        }
        Ok(())
    }

    pub fn set_attribute(
        &mut self,
        id: InstanceId,
        key: impl Into<AttrKey>,
        value: Value,
    ) -> Result<(), TreeError> {
        let node = self.key(id)?;
        match key.into() {
            AttrKey::Index(index) => {
                let previous = self
                    .tree
                    .data(node)
                    .and_then(|d| d.values.as_ref())
                    .and_then(|v| v.get(index))
                    .cloned();
                let changed = self.track_ref(id, index, previous.as_ref(), &value);
                if changed {
                    self.push(PatchOp::SetAttribute {
                        id,
                        key: AttrKey::Index(index),
                        value: commit_value(&value),
                    });
                }
                if let Some(data) = self.tree.data_mut(node) {
                    let values = data.values.get_or_insert_with(Vec::new);
                    if values.len() <= index {
                        values.resize(index + 1, Value::Null);
                    }
                    values[index] = value;
                }
            }
            AttrKey::Name(name) => {
                let previous = self
                    .tree
                    .data_mut(node)
                    .and_then(|d| d.extra_props.insert(Arc::clone(&name), value.clone()));
                if is_direct_or_deep_equal(previous.as_ref(), Some(&value)) {
                    return Ok(());
                }
                self.push(PatchOp::SetAttribute {
                    id,
                    key: AttrKey::Name(name),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Queues ref bookkeeping and reports whether a patch is needed.
    fn track_ref(
        &mut self,
        id: InstanceId,
        index: usize,
        old: Option<&Value>,
        new: &Value,
    ) -> bool {
        let old_is_ref = old.is_some_and(is_ref);
        if is_ref(new) {
            if old != Some(new) {
                self.refs.push(RefUpdate {
                    id,
                    index,
                    old: old.filter(|o| is_ref(o)).cloned(),
                    new: Some(new.clone()),
                });
            }
            return !old_is_ref;
        }
        if old_is_ref {
            self.refs.push(RefUpdate {
                id,
                index,
                old: old.cloned(),
                new: None,
            });
            return !is_direct_or_deep_equal(Some(&committed_ref()), Some(new));
        }
        !is_direct_or_deep_equal(old, Some(new))
    }

    fn queue_unrefs(&mut self, root: NodeKey) {
        for key in self.tree.subtree(root) {
            let Some(node) = self.tree.get(key) else {
                continue;
            };
            let id = node.id;
            let refs: Vec<(usize, Value)> = node
                .data
                .values
                .iter()
                .flatten()
                .enumerate()
                .filter(|(_, v)| is_ref(v))
                .map(|(i, v)| (i, v.clone()))
                .collect();
            for (index, old) in refs {
                self.refs.push(RefUpdate {
                    id,
                    index,
                    old: Some(old),
                    new: None,
                });
            }
        }
    }

    /// Emits creation ops for a subtree whose root is about to be inserted.
    pub(crate) fn emit_subtree(&mut self, key: NodeKey) {
        let Some(node) = self.tree.get(key) else {
            return;
        };
        let id = node.id;
        let template = Arc::clone(&node.template);
        let values = node.data.values.clone();
        let extra_props: Vec<(Arc<str>, Value)> = node
            .data
            .extra_props
            .iter()
            .map(|(k, v)| (Arc::clone(k), v.clone()))
            .collect();

        self.push(PatchOp::CreateElement {
            template,
            id,
            slot_index: None,
        });
        if let Some(values) = values {
            for (index, value) in values.iter().enumerate() {
                if is_ref(value) {
                    self.refs.push(RefUpdate {
                        id,
                        index,
                        old: None,
                        new: Some(value.clone()),
                    });
                }
            }
            self.push(PatchOp::SetAttributes {
                id,
                values: values.iter().map(commit_value).collect(),
            });
        }
        for (name, value) in extra_props {
            self.push(PatchOp::SetAttribute {
                id,
                key: AttrKey::Name(name),
                value,
            });
        }
        if let Some(data) = self.tree.data_mut(key) {
            data.removed_from_tree = false;
        }
        for child in self.tree.children(key) {
            self.emit_subtree(child);
            if let Some(child_id) = self.tree.id_of(child) {
                self.push(PatchOp::InsertBefore {
                    parent: id,
                    child: child_id,
                    before: None,
                });
            }
        }
    }

    /// Frees subtrees that were removed and never re-inserted.
    pub fn collect_removed(&mut self) -> usize {
        let mut freed = 0;
        for key in std::mem::take(&mut self.removed) {
            let detached = self
                .tree
                .get(key)
                .is_some_and(|n| n.parent.is_none() && n.data.removed_from_tree);
            if detached {
                freed += self.tree.free_subtree(key).len();
            }
        }
        freed
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.tree.contains_id(id)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn template(&self, id: InstanceId) -> Option<&str> {
        self.tree.by_id(id).map(|n| n.template.as_ref())
    }

    pub fn values(&self, id: InstanceId) -> Option<&[Value]> {
        self.tree
            .by_id(id)
            .and_then(|n| n.data.values.as_deref())
    }

    pub fn extra_prop(&self, id: InstanceId, name: &str) -> Option<&Value> {
        self.tree
            .by_id(id)
            .and_then(|n| n.data.extra_props.get(name))
    }

    pub fn child_nodes(&self, id: InstanceId) -> Vec<InstanceId> {
        self.tree
            .lookup(id)
            .map(|key| self.tree.child_ids(key))
            .unwrap_or_default()
    }

    pub fn parent_node(&self, id: InstanceId) -> Option<InstanceId> {
        let key = self.tree.lookup(id)?;
        let parent = self.tree.parent(key)?;
        self.tree.id_of(parent)
    }

    pub fn queued_refs(&self) -> &RefQueue {
        &self.refs
    }

    pub fn take_queued_refs(&mut self) -> Vec<RefUpdate> {
        self.refs.take()
    }

    pub fn clear_queued_refs(&mut self) {
        self.refs.clear();
    }

    pub fn hydration_map(&self) -> &HydrationMap {
        &self.hydration_map
    }

    /// Human readable report for a main-thread "context not found" event.
    pub fn report_ctx_not_found(&self, id: InstanceId) -> String {
        let template = self.template(id).unwrap_or("unknown");
        format!("snapshotPatchApply failed: ctx not found, snapshot type: '{template}'")
    }

    /// Snapshot of the subtree as the main thread would hold it.
    pub fn serialize(&self, id: InstanceId) -> Option<SerializedInstance> {
        self.tree.lookup(id).map(|key| self.serialize_node(key))
    }

    fn serialize_node(&self, key: NodeKey) -> SerializedInstance {
        let Some(node) = self.tree.get(key) else {
            return SerializedInstance::new(InstanceId::DETACHED, "");
        };
        SerializedInstance {
            id: node.id,
            template: Arc::clone(&node.template),
            values: node
                .data
                .values
                .as_ref()
                .map(|values| values.iter().map(commit_value).collect()),
            extra_props: node.data.extra_props.clone(),
            children: self
                .tree
                .children(key)
                .into_iter()
                .map(|child| self.serialize_node(child))
                .collect(),
        }
    }
}
