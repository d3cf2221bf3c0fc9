//! List virtualization: update descriptions, on-demand cell rendering and
//! element recycling.
//!
//! Contract:
//! - A list holder never attaches its children natively. Structural changes
//!   are recorded and described to the list element in one
//!   `update-list-info` attribute per flush.
//! - The native list asks for cells by index (`component_at_index`) and
//!   returns them by element id (`enqueue_component`).
//! - A cell element is either on screen (sign map) or in exactly one recycle
//!   bucket, never both.

mod engine;
pub mod pending;
pub mod platform_info;

pub use engine::CellRequest;
pub use pending::PendingListUpdates;
pub use platform_info::{PLATFORM_INFO_ATTRIBUTES, PlatformInfo, is_platform_info_key};

use crate::main_tree::MainData;
use core_types::{ElementId, OperationId};
use pending::ListRecording;
use serde::{Deserialize, Serialize};
use snapshot::{InstanceTree, NodeKey, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub const UPDATE_LIST_INFO: &str = "update-list-info";
pub const CUSTOM_LIST_NAME: &str = "custom-list-name";
pub const LIST_CONTAINER: &str = "list-container";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertAction {
    pub position: usize,
    #[serde(rename = "type")]
    pub template: Arc<str>,
    #[serde(flatten)]
    pub platform_info: BTreeMap<Arc<str>, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateAction {
    pub from: usize,
    pub to: usize,
    #[serde(rename = "type")]
    pub template: Arc<str>,
    pub flush: bool,
    #[serde(flatten)]
    pub platform_info: BTreeMap<Arc<str>, Value>,
}

/// One flush worth of list changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpdateInfo {
    pub insert_action: Vec<InsertAction>,
    pub remove_action: Vec<usize>,
    pub update_action: Vec<UpdateAction>,
}

impl ListUpdateInfo {
    pub fn is_empty(&self) -> bool {
        self.insert_action.is_empty() && self.remove_action.is_empty() && self.update_action.is_empty()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct DeferredCell {
    pub list: ElementId,
    pub request: CellRequest,
    /// `(batch id, position in the batch)`.
    pub batch: Option<(u64, usize)>,
}

#[derive(Clone, Debug)]
pub(crate) struct DeferredBatch {
    pub list: ElementId,
    pub list_id: ElementId,
    pub element_ids: Vec<Option<ElementId>>,
    pub operation_ids: Vec<OperationId>,
    pub waiting: usize,
}

/// Runtime state of one native list element.
#[derive(Clone, Debug)]
pub(crate) struct ListState {
    /// List holder instance currently bound to the element.
    pub owner: NodeKey,
    pub list_container: bool,
    /// Children as of the last flush; cell indices resolve through this.
    pub cells: Vec<NodeKey>,
    /// On-screen cell element → instance holding its elements.
    pub sign_map: HashMap<ElementId, NodeKey>,
    /// Bucket key → enqueued `(element, instance)`, most recent last.
    pub recycle: HashMap<String, Vec<(ElementId, NodeKey)>>,
    pub deferred: HashMap<NodeKey, DeferredCell>,
}

impl ListState {
    pub fn new(owner: NodeKey, list_container: bool) -> Self {
        Self {
            owner,
            list_container,
            cells: Vec::new(),
            sign_map: HashMap::new(),
            recycle: HashMap::new(),
            deferred: HashMap::new(),
        }
    }

    /// Every instance the list holds elements for.
    pub fn retained(&self) -> Vec<NodeKey> {
        self.sign_map
            .values()
            .copied()
            .chain(self.recycle.values().flatten().map(|(_, key)| *key))
            .collect()
    }
}

pub(crate) fn build_update_info(
    tree: &InstanceTree<MainData>,
    list: NodeKey,
    recording: &ListRecording,
    full_update: bool,
) -> ListUpdateInfo {
    let current = tree.children(list);
    let old_index: HashMap<NodeKey, usize> = recording
        .old_children
        .iter()
        .enumerate()
        .map(|(i, key)| (*key, i))
        .collect();
    let retained = |key: &NodeKey| old_index.contains_key(key) && !recording.removed.contains(key);

    let mut remove_action: Vec<usize> = (0..recording.forced_removals)
        .chain(
            recording
                .removed
                .iter()
                .filter_map(|key| old_index.get(key).copied()),
        )
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    remove_action.sort_unstable();

    let describe = |key: NodeKey| {
        let node = tree.get(key);
        let template = node
            .map(|n| Arc::clone(&n.template))
            .unwrap_or_else(|| Arc::from(""));
        let info = node
            .map(|n| n.data.platform_info.action_fields())
            .unwrap_or_default();
        (template, info)
    };

    let insert_action = current
        .iter()
        .enumerate()
        .filter(|(_, key)| !retained(*key))
        .map(|(position, key)| {
            let (template, platform_info) = describe(*key);
            InsertAction {
                position,
                template,
                platform_info,
            }
        })
        .collect();

    let update_action = if full_update {
        current
            .iter()
            .enumerate()
            .map(|(to, key)| {
                let from = if retained(key) { old_index[key] } else { to };
                let (template, platform_info) = describe(*key);
                UpdateAction {
                    from,
                    to,
                    template,
                    flush: false,
                    platform_info,
                }
            })
            .collect()
    } else {
        recording
            .updated
            .iter()
            .filter(|key| retained(*key))
            .filter_map(|key| {
                let to = current.iter().position(|c| c == key)?;
                let (template, platform_info) = describe(*key);
                Some(UpdateAction {
                    from: old_index[key],
                    to,
                    template,
                    flush: false,
                    platform_info,
                })
            })
            .collect()
    };

    ListUpdateInfo {
        insert_action,
        remove_action,
        update_action,
    }
}
