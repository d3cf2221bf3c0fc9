//! Per-list recording of structural changes between flushes.
//!
//! Invariants:
//! - A recording snapshots the list's children when it is opened; indices in
//!   `removeAction` and `from` refer to that snapshot.
//! - A child inserted and removed inside one window leaves no trace.
//! - Recording is suspended while elements are (re)materialized so replayed
//!   values never show up as list updates.

use snapshot::{InstanceTree, NodeKey};
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Debug, Default)]
pub(crate) struct ListRecording {
    pub old_children: Vec<NodeKey>,
    /// Old children that left their position (removed or moved).
    pub removed: HashSet<NodeKey>,
    /// Children whose platform info changed, in first-change order.
    pub updated: Vec<NodeKey>,
    /// Positions `0..n` of a description the list never received from this owner.
    pub forced_removals: usize,
}

#[derive(Debug, Default)]
pub struct PendingListUpdates {
    recordings: BTreeMap<NodeKey, ListRecording>,
    suspended: u32,
}

impl PendingListUpdates {
    pub fn is_recording(&self) -> bool {
        self.suspended == 0
    }

    pub fn suspend(&mut self) {
        self.suspended += 1;
    }

    pub fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
    }

    /// Number of lists with an open recording.
    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    pub fn contains(&self, list: NodeKey) -> bool {
        self.recordings.contains_key(&list)
    }

    pub(crate) fn lists(&self) -> Vec<NodeKey> {
        self.recordings.keys().copied().collect()
    }

    fn recording_for<T>(&mut self, tree: &InstanceTree<T>, list: NodeKey) -> &mut ListRecording {
        self.recordings.entry(list).or_insert_with(|| ListRecording {
            old_children: tree.children(list),
            ..ListRecording::default()
        })
    }

    pub(crate) fn on_insert_before<T>(&mut self, tree: &InstanceTree<T>, list: NodeKey, child: NodeKey) {
        let recording = self.recording_for(tree, list);
        if tree.parent(child) == Some(list) && recording.old_children.contains(&child) {
            recording.removed.insert(child);
        }
    }

    pub(crate) fn on_remove_child<T>(&mut self, tree: &InstanceTree<T>, list: NodeKey, child: NodeKey) {
        let recording = self.recording_for(tree, list);
        if recording.old_children.contains(&child) {
            recording.removed.insert(child);
        }
    }

    pub(crate) fn on_set_attribute<T>(&mut self, tree: &InstanceTree<T>, list: NodeKey, child: NodeKey) {
        let recording = self.recording_for(tree, list);
        if !recording.updated.contains(&child) {
            recording.updated.push(child);
        }
    }

    /// Restarts `list`'s recording as a full replacement of `previous`
    /// cells the native list currently describes.
    pub(crate) fn replace_all<T>(&mut self, tree: &InstanceTree<T>, list: NodeKey, previous: usize) {
        let recording = self.recording_for(tree, list);
        recording.old_children.clear();
        recording.removed.clear();
        recording.forced_removals = previous;
    }

    pub(crate) fn take(&mut self, list: NodeKey) -> Option<ListRecording> {
        self.recordings.remove(&list)
    }

    pub(crate) fn discard(&mut self, list: NodeKey) {
        self.recordings.remove(&list);
    }

    pub fn clear(&mut self) {
        self.recordings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::InstanceId;
    use std::sync::Arc;

    fn tree_with(children: usize) -> (InstanceTree<()>, NodeKey, Vec<NodeKey>) {
        let mut tree = InstanceTree::new();
        let list = tree.insert(InstanceId(1), Arc::from("list"), ());
        let kids = (0..children)
            .map(|i| {
                let key = tree.insert(InstanceId(i as i32 + 2), Arc::from("item"), ());
                tree.insert_before(list, key, None);
                key
            })
            .collect();
        (tree, list, kids)
    }

    #[test]
    fn snapshot_is_taken_on_first_change() {
        let (mut tree, list, kids) = tree_with(2);
        let mut pending = PendingListUpdates::default();
        pending.on_remove_child(&tree, list, kids[0]);
        tree.detach(kids[0]);
        pending.on_remove_child(&tree, list, kids[1]);
        let recording = pending.take(list).unwrap();
        assert_eq!(recording.old_children, kids);
        assert_eq!(recording.removed.len(), 2);
        assert!(pending.is_empty());
    }

    #[test]
    fn fresh_children_are_not_marked_removed() {
        let (mut tree, list, _) = tree_with(1);
        let mut pending = PendingListUpdates::default();
        let fresh = tree.insert(InstanceId(10), Arc::from("item"), ());
        pending.on_insert_before(&tree, list, fresh);
        tree.insert_before(list, fresh, None);
        pending.on_remove_child(&tree, list, fresh);
        assert!(pending.take(list).unwrap().removed.is_empty());
    }

    #[test]
    fn suspension_nests() {
        let mut pending = PendingListUpdates::default();
        pending.suspend();
        pending.suspend();
        pending.resume();
        assert!(!pending.is_recording());
        pending.resume();
        assert!(pending.is_recording());
    }
}
