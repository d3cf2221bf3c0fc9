//! Keyed array diff with move detection.
//!
//! Contract:
//! - Old and new entries are matched greedily in order by key equality; the
//!   i-th new entry of a key takes the i-th old entry of the same key.
//! - Matched pairs on a longest increasing subsequence of old indices stay
//!   put; every other matched pair becomes a [`ArrayAction::Move`].
//! - Unmatched old entries become removals and are listed first, ascending.
//! - Inserts and moves follow right to left, each anchored before the next
//!   entry of the new array (or appended when last), so every anchor is
//!   already in its final place when it is referenced.
//!
//! Complexity: O(n log n) plus hashing of the keys.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayAction {
    Remove {
        old: usize,
    },
    Insert {
        new: usize,
        before: Option<usize>,
    },
    /// Remove then reinsert a matched entry. `before` is a new index.
    Move {
        old: usize,
        new: usize,
        before: Option<usize>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArrayDiff {
    /// `(old, new)` pairs in new order.
    pub matched: Vec<(usize, usize)>,
    pub actions: Vec<ArrayAction>,
}

impl ArrayDiff {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn moves(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, ArrayAction::Move { .. }))
            .count()
    }
}

pub fn diff_keyed<K: Hash + Eq>(old: &[K], new: &[K]) -> ArrayDiff {
    let mut pending: HashMap<&K, VecDeque<usize>> = HashMap::new();
    for (i, key) in old.iter().enumerate() {
        pending.entry(key).or_default().push_back(i);
    }

    let mut old_for_new: Vec<Option<usize>> = Vec::with_capacity(new.len());
    let mut matched = Vec::new();
    let mut old_used = vec![false; old.len()];
    for (j, key) in new.iter().enumerate() {
        let hit = pending.get_mut(key).and_then(VecDeque::pop_front);
        if let Some(i) = hit {
            old_used[i] = true;
            matched.push((i, j));
        }
        old_for_new.push(hit);
    }

    let sequence: Vec<usize> = matched.iter().map(|(i, _)| *i).collect();
    let mut stable = vec![false; new.len()];
    for pos in longest_increasing_subsequence(&sequence) {
        stable[matched[pos].1] = true;
    }

    let mut actions: Vec<ArrayAction> = old_used
        .iter()
        .enumerate()
        .filter(|(_, used)| !**used)
        .map(|(old, _)| ArrayAction::Remove { old })
        .collect();

    for j in (0..new.len()).rev() {
        let before = (j + 1 < new.len()).then_some(j + 1);
        match old_for_new[j] {
            None => actions.push(ArrayAction::Insert { new: j, before }),
            Some(old) if !stable[j] => actions.push(ArrayAction::Move {
                old,
                new: j,
                before,
            }),
            Some(_) => {}
        }
    }

    ArrayDiff { matched, actions }
}

/// Positions (into `seq`) of one longest strictly increasing subsequence.
pub fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    // tails[k] = position of the smallest tail of an increasing run of length k+1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (pos, value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&t| seq[t] < *value);
        if slot > 0 {
            prev[pos] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(pos);
        } else {
            tails[slot] = pos;
        }
    }
    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(pos) = cursor {
        out.push(pos);
        cursor = prev[pos];
    }
    out.reverse();
    out
}
