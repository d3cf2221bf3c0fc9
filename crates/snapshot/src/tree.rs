//! Arena-backed instance tree shared by the background and main variants.
//!
//! Invariants:
//! - Links are stored as [`NodeKey`]s, never as references.
//! - A node has at most one parent; linking detaches first.
//! - The id index maps each live `InstanceId` to one key. Nodes may stay in
//!   the arena after leaving the index (detached list cells, structural
//!   clones); callers free them explicitly.
//! - Keys are generational: a freed slot never resolves through a stale key.

use core_types::InstanceId;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    UnknownInstance(InstanceId),
    UnknownTemplate(String),
    /// The node to be removed is not a child of this node.
    InvalidChild { parent: InstanceId, child: InstanceId },
    /// Linking would place a node under itself or one of its descendants.
    Cycle { parent: InstanceId, child: InstanceId },
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::UnknownInstance(id) => write!(f, "instance {id} not found"),
            TreeError::UnknownTemplate(template) => write!(f, "Snapshot not found: {template}"),
            TreeError::InvalidChild { parent, child } => write!(
                f,
                "The node to be removed is not a child of this node (parent {parent}, child {child})."
            ),
            TreeError::Cycle { parent, child } => {
                write!(f, "cannot insert {child} under its own descendant {parent}")
            }
        }
    }
}

impl std::error::Error for TreeError {}

#[derive(Clone, Debug)]
pub struct InstanceNode<T> {
    pub id: InstanceId,
    pub template: Arc<str>,
    pub parent: Option<NodeKey>,
    pub first_child: Option<NodeKey>,
    pub last_child: Option<NodeKey>,
    pub prev_sibling: Option<NodeKey>,
    pub next_sibling: Option<NodeKey>,
    pub data: T,
}

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    node: Option<InstanceNode<T>>,
}

#[derive(Clone, Debug)]
pub struct InstanceTree<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    index: HashMap<InstanceId, NodeKey>,
}

impl<T> Default for InstanceTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InstanceTree<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Allocates a node without indexing it.
    pub fn alloc(&mut self, id: InstanceId, template: Arc<str>, data: T) -> NodeKey {
        let node = InstanceNode {
            id,
            template,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            data,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeKey {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeKey {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    /// Allocates a node and makes it the owner of `id`. A previous owner is
    /// silently unindexed but kept.
    pub fn insert(&mut self, id: InstanceId, template: Arc<str>, data: T) -> NodeKey {
        let key = self.alloc(id, template, data);
        if let Some(previous) = self.index.insert(id, key) {
            log::debug!(target: "instance_tree", "id {id} re-created, previous owner {previous:?} unindexed");
        }
        key
    }

    pub fn lookup(&self, id: InstanceId) -> Option<NodeKey> {
        self.index.get(&id).copied()
    }

    pub fn contains_id(&self, id: InstanceId) -> bool {
        self.index.contains_key(&id)
    }

    /// `true` if `key` is the current owner of its id.
    pub fn is_indexed(&self, key: NodeKey) -> bool {
        self.get(key)
            .is_some_and(|node| self.index.get(&node.id) == Some(&key))
    }

    pub fn unindex(&mut self, key: NodeKey) {
        if let Some(id) = self.get(key).map(|n| n.id)
            && self.index.get(&id) == Some(&key)
        {
            self.index.remove(&id);
        }
    }

    pub fn get(&self, key: NodeKey) -> Option<&InstanceNode<T>> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut InstanceNode<T>> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn by_id(&self, id: InstanceId) -> Option<&InstanceNode<T>> {
        self.lookup(id).and_then(|key| self.get(key))
    }

    pub fn data(&self, key: NodeKey) -> Option<&T> {
        self.get(key).map(|n| &n.data)
    }

    pub fn data_mut(&mut self, key: NodeKey) -> Option<&mut T> {
        self.get_mut(key).map(|n| &mut n.data)
    }

    pub fn id_of(&self, key: NodeKey) -> Option<InstanceId> {
        self.get(key).map(|n| n.id)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.get(key).and_then(|n| n.parent)
    }

    pub fn children(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut current = self.get(key).and_then(|n| n.first_child);
        while let Some(child) = current {
            out.push(child);
            current = self.get(child).and_then(|n| n.next_sibling);
        }
        out
    }

    pub fn child_ids(&self, key: NodeKey) -> Vec<InstanceId> {
        self.children(key)
            .into_iter()
            .filter_map(|child| self.id_of(child))
            .collect()
    }

    pub fn child_count(&self, key: NodeKey) -> usize {
        let mut count = 0;
        let mut current = self.get(key).and_then(|n| n.first_child);
        while let Some(child) = current {
            count += 1;
            current = self.get(child).and_then(|n| n.next_sibling);
        }
        count
    }

    pub fn index_of(&self, parent: NodeKey, child: NodeKey) -> Option<usize> {
        if self.parent(child) != Some(parent) {
            return None;
        }
        self.children(parent).iter().position(|c| *c == child)
    }

    pub fn is_child(&self, parent: NodeKey, child: NodeKey) -> bool {
        self.parent(child) == Some(parent)
    }

    /// Unlinks `child` from whatever parent it has.
    pub fn detach(&mut self, child: NodeKey) {
        let Some(node) = self.get(child) else {
            return;
        };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);
        let Some(parent) = parent else {
            return;
        };
        match prev {
            Some(prev) => {
                if let Some(n) = self.get_mut(prev) {
                    n.next_sibling = next;
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    n.first_child = next;
                }
            }
        }
        match next {
            Some(next) => {
                if let Some(n) = self.get_mut(next) {
                    n.prev_sibling = prev;
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    n.last_child = prev;
                }
            }
        }
        if let Some(n) = self.get_mut(child) {
            n.parent = None;
            n.prev_sibling = None;
            n.next_sibling = None;
        }
    }

    /// True when `node` is `ancestor` or lies somewhere below it.
    pub fn is_ancestor(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let mut cursor = Some(node);
        while let Some(key) = cursor {
            if key == ancestor {
                return true;
            }
            cursor = self.parent(key);
        }
        false
    }

    /// Links `child` under `parent`, before `before` or last.
    ///
    /// A `before` that is not currently a child of `parent` appends. Linking
    /// a node under itself or a descendant is refused and leaves the tree
    /// unchanged.
    pub fn insert_before(&mut self, parent: NodeKey, child: NodeKey, before: Option<NodeKey>) {
        if self.is_ancestor(child, parent) {
            log::warn!(
                target: "instance_tree",
                "refusing to link {:?} under its descendant {:?}",
                self.id_of(child),
                self.id_of(parent)
            );
            return;
        }
        if before == Some(child) {
            return;
        }
        self.detach(child);
        let before = match before {
            Some(b) if self.parent(b) == Some(parent) => Some(b),
            Some(b) => {
                log::warn!(
                    target: "instance_tree",
                    "insert_before target {:?} is not a child of {:?}; appending",
                    self.id_of(b),
                    self.id_of(parent)
                );
                None
            }
            None => None,
        };
        match before {
            Some(before) => {
                let prev = self.get(before).and_then(|n| n.prev_sibling);
                if let Some(n) = self.get_mut(child) {
                    n.parent = Some(parent);
                    n.prev_sibling = prev;
                    n.next_sibling = Some(before);
                }
                if let Some(n) = self.get_mut(before) {
                    n.prev_sibling = Some(child);
                }
                match prev {
                    Some(prev) => {
                        if let Some(n) = self.get_mut(prev) {
                            n.next_sibling = Some(child);
                        }
                    }
                    None => {
                        if let Some(n) = self.get_mut(parent) {
                            n.first_child = Some(child);
                        }
                    }
                }
            }
            None => {
                let last = self.get(parent).and_then(|n| n.last_child);
                if let Some(n) = self.get_mut(child) {
                    n.parent = Some(parent);
                    n.prev_sibling = last;
                    n.next_sibling = None;
                }
                match last {
                    Some(last) => {
                        if let Some(n) = self.get_mut(last) {
                            n.next_sibling = Some(child);
                        }
                    }
                    None => {
                        if let Some(n) = self.get_mut(parent) {
                            n.first_child = Some(child);
                        }
                    }
                }
                if let Some(n) = self.get_mut(parent) {
                    n.last_child = Some(child);
                }
            }
        }
    }

    /// Unlinks a direct child; anything else is an invalid child.
    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), TreeError> {
        if !self.is_child(parent, child) {
            return Err(TreeError::InvalidChild {
                parent: self.id_of(parent).unwrap_or(InstanceId::DETACHED),
                child: self.id_of(child).unwrap_or(InstanceId::DETACHED),
            });
        }
        self.detach(child);
        Ok(())
    }

    /// Clears parent and sibling links without touching the old neighbours.
    pub fn tear_down(&mut self, key: NodeKey) {
        if let Some(n) = self.get_mut(key) {
            n.parent = None;
            n.prev_sibling = None;
            n.next_sibling = None;
        }
    }

    /// Pre-order keys of the subtree rooted at `key`.
    pub fn subtree(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if self.get(current).is_none() {
                continue;
            }
            out.push(current);
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Releases a single slot; the caller is responsible for links.
    pub fn free(&mut self, key: NodeKey) -> Option<InstanceNode<T>> {
        self.unindex(key);
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        Some(node)
    }

    /// Detaches and releases a whole subtree.
    pub fn free_subtree(&mut self, key: NodeKey) -> Vec<InstanceNode<T>> {
        self.detach(key);
        self.subtree(key)
            .into_iter()
            .filter_map(|k| self.free(k))
            .collect()
    }

    /// Moves `old`'s index entry to `new` and rewrites the node's id.
    pub fn remap(&mut self, old: InstanceId, new: InstanceId) -> Option<NodeKey> {
        if old == new {
            return self.lookup(old);
        }
        let key = self.index.remove(&old)?;
        if let Some(node) = self.get_mut(key) {
            node.id = new;
        }
        if let Some(previous) = self.index.insert(new, key) {
            log::warn!(target: "instance_tree", "remap {old} -> {new} displaced {previous:?}");
        }
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn live_nodes(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(ids: &[i32]) -> (InstanceTree<()>, Vec<NodeKey>) {
        let mut tree = InstanceTree::new();
        let keys = ids
            .iter()
            .map(|id| tree.insert(InstanceId(*id), Arc::from("view"), ()))
            .collect();
        (tree, keys)
    }

    #[test]
    fn append_and_insert_before() {
        let (mut tree, k) = tree_with(&[1, 2, 3, 4]);
        tree.insert_before(k[0], k[1], None);
        tree.insert_before(k[0], k[3], None);
        tree.insert_before(k[0], k[2], Some(k[3]));
        assert_eq!(
            tree.child_ids(k[0]),
            vec![InstanceId(2), InstanceId(3), InstanceId(4)]
        );
        assert_eq!(tree.index_of(k[0], k[3]), Some(2));
        assert_eq!(tree.child_count(k[0]), 3);
    }

    #[test]
    fn insert_detaches_from_previous_parent() {
        let (mut tree, k) = tree_with(&[1, 2, 3]);
        tree.insert_before(k[0], k[2], None);
        tree.insert_before(k[1], k[2], None);
        assert!(tree.children(k[0]).is_empty());
        assert_eq!(tree.children(k[1]), vec![k[2]]);
        assert_eq!(tree.parent(k[2]), Some(k[1]));
    }

    #[test]
    fn moving_within_parent_keeps_links_consistent() {
        let (mut tree, k) = tree_with(&[1, 2, 3, 4]);
        for child in &k[1..] {
            tree.insert_before(k[0], *child, None);
        }
        tree.insert_before(k[0], k[3], Some(k[1]));
        assert_eq!(tree.children(k[0]), vec![k[3], k[1], k[2]]);
        tree.insert_before(k[0], k[3], None);
        assert_eq!(tree.children(k[0]), vec![k[1], k[2], k[3]]);
        assert_eq!(tree.get(k[0]).unwrap().last_child, Some(k[3]));
        assert_eq!(tree.get(k[3]).unwrap().prev_sibling, Some(k[2]));
    }

    #[test]
    fn foreign_before_appends() {
        let (mut tree, k) = tree_with(&[1, 2, 3, 4]);
        tree.insert_before(k[1], k[3], None);
        tree.insert_before(k[0], k[2], Some(k[3]));
        assert_eq!(tree.children(k[0]), vec![k[2]]);
        assert_eq!(tree.children(k[1]), vec![k[3]]);
    }

    #[test]
    fn linking_under_a_descendant_is_refused() {
        let (mut tree, k) = tree_with(&[1, 2, 3]);
        tree.insert_before(k[0], k[1], None);
        tree.insert_before(k[1], k[2], None);
        assert!(tree.is_ancestor(k[0], k[2]));
        assert!(!tree.is_ancestor(k[2], k[0]));

        tree.insert_before(k[2], k[0], None);
        tree.insert_before(k[0], k[0], None);
        assert_eq!(tree.parent(k[0]), None);
        assert_eq!(tree.parent(k[1]), Some(k[0]));
        assert_eq!(tree.children(k[2]), Vec::<NodeKey>::new());
        assert_eq!(tree.subtree(k[0]), vec![k[0], k[1], k[2]]);
    }

    #[test]
    fn remove_non_child_is_invalid() {
        let (mut tree, k) = tree_with(&[1, 2]);
        let err = tree.remove_child(k[0], k[1]).unwrap_err();
        assert_eq!(
            err,
            TreeError::InvalidChild {
                parent: InstanceId(1),
                child: InstanceId(2)
            }
        );
        tree.insert_before(k[0], k[1], None);
        tree.remove_child(k[0], k[1]).unwrap();
        assert!(tree.children(k[0]).is_empty());
    }

    #[test]
    fn freed_keys_do_not_resolve() {
        let (mut tree, k) = tree_with(&[1, 2]);
        tree.insert_before(k[0], k[1], None);
        let freed = tree.free_subtree(k[0]);
        assert_eq!(freed.len(), 2);
        assert!(tree.get(k[0]).is_none());
        assert!(!tree.contains_id(InstanceId(1)));
        let reused = tree.insert(InstanceId(9), Arc::from("view"), ());
        assert_ne!(reused, k[1]);
        assert!(tree.get(k[1]).is_none());
    }

    #[test]
    fn remap_moves_index_entry() {
        let (mut tree, k) = tree_with(&[5]);
        assert_eq!(tree.remap(InstanceId(5), InstanceId(-3)), Some(k[0]));
        assert_eq!(tree.lookup(InstanceId(-3)), Some(k[0]));
        assert!(tree.lookup(InstanceId(5)).is_none());
        assert_eq!(tree.id_of(k[0]), Some(InstanceId(-3)));
    }

    #[test]
    fn unindexed_nodes_stay_addressable() {
        let (mut tree, k) = tree_with(&[1]);
        tree.unindex(k[0]);
        assert!(!tree.is_indexed(k[0]));
        assert!(tree.get(k[0]).is_some());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.live_nodes(), 1);
    }
}
