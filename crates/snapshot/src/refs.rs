//! Queued ref updates.
//!
//! Ref values never travel to the main thread. Setting or clearing one
//! queues an update for the external lifecycle to run after commit.

use crate::value::Value;
use core_types::InstanceId;

#[derive(Clone, Debug, PartialEq)]
pub struct RefUpdate {
    pub id: InstanceId,
    pub index: usize,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Clone, Debug, Default)]
pub struct RefQueue {
    queued: Vec<RefUpdate>,
}

impl RefQueue {
    pub fn push(&mut self, update: RefUpdate) {
        self.queued.push(update);
    }

    pub fn take(&mut self) -> Vec<RefUpdate> {
        std::mem::take(&mut self.queued)
    }

    /// Discards pending updates without running them.
    pub fn clear(&mut self) {
        if !self.queued.is_empty() {
            log::trace!(target: "refs", "discarding {} queued ref updates", self.queued.len());
        }
        self.queued.clear();
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}
