//! Messages exchanged between the background and main threads.
//!
//! Nothing crosses the boundary but these values; patches travel as their
//! opaque wire string.

use core_types::{ElementId, InstanceId, OperationId, ReloadVersion};
use snapshot::SerializedInstance;
use std::sync::mpsc::{self, Receiver, Sender};

/// One main-thread update as produced by a background commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchUpdate {
    pub reload_version: ReloadVersion,
    pub is_hydration: bool,
    /// Encoded patch list.
    pub data: String,
}

#[derive(Debug)]
pub enum MainCommand {
    UpdateMainThread(PatchUpdate),
    Reload {
        version: ReloadVersion,
    },

    // Native list container callbacks.
    ComponentAtIndex {
        list: ElementId,
        list_id: ElementId,
        cell_index: usize,
        operation_id: OperationId,
        enable_reuse_notification: bool,
        reply: Sender<Option<ElementId>>,
    },
    ComponentAtIndexes {
        list: ElementId,
        list_id: ElementId,
        cell_indexes: Vec<usize>,
        operation_ids: Vec<OperationId>,
        enable_reuse_notification: bool,
        async_flush: bool,
        reply: Sender<Vec<Option<ElementId>>>,
    },
    EnqueueComponent {
        list: ElementId,
        list_id: ElementId,
        sign: ElementId,
    },

    Shutdown,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackgroundEvent {
    /// Serialized main tree rendered before the background caught up.
    FirstScreen { snapshot: SerializedInstance },
    CtxNotFound { id: InstanceId },
    ListError { message: String },
    PatchRejected { message: String },
}

pub struct Bus {
    pub cmd_tx: Sender<MainCommand>,
    pub evt_rx: Receiver<BackgroundEvent>,
    pub evt_tx: Sender<BackgroundEvent>,
}

impl Bus {
    /// Creates both channels; the command receiver goes to the main thread.
    pub fn new() -> (Self, Receiver<MainCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        (
            Bus {
                cmd_tx,
                evt_rx,
                evt_tx,
            },
            cmd_rx,
        )
    }
}
