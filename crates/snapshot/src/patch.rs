//! Snapshot patch protocol.
//!
//! The background tree emits [`PatchOp`]s; the main thread replays them.
//!
//! Invariants:
//! - Patches are applied in order, exactly once.
//! - `CreateElement` introduces an id; every other op references ids that
//!   must already exist on the receiving side. Unknown references are a
//!   protocol desync reported back to the background thread.
//! - There is no move op. Reinserting an attached child with
//!   `InsertBefore` detaches it from its old position first; `RemoveChild`
//!   releases the child on the main side.
//! - `AddDefinition` is developer-mode only and may be ignored by appliers.
//!   A definition payload the decoder cannot read arrives as
//!   `OpaqueDefinition` and is never applied.

use crate::definition::Definition;
use crate::value::{AttrKey, Value};
use core_types::{FlushOptions, InstanceId};
use std::sync::Arc;

pub mod opcode {
    pub const CREATE_ELEMENT: u8 = 0;
    pub const INSERT_BEFORE: u8 = 1;
    pub const REMOVE_CHILD: u8 = 2;
    pub const SET_ATTRIBUTE: u8 = 3;
    pub const SET_ATTRIBUTES: u8 = 4;
    pub const DEV_ONLY_ADD_DEFINITION: u8 = 100;
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatchOp {
    CreateElement {
        template: Arc<str>,
        id: InstanceId,
        slot_index: Option<u32>,
    },
    InsertBefore {
        parent: InstanceId,
        child: InstanceId,
        before: Option<InstanceId>,
    },
    RemoveChild {
        parent: InstanceId,
        child: InstanceId,
    },
    SetAttribute {
        id: InstanceId,
        key: AttrKey,
        value: Value,
    },
    SetAttributes {
        id: InstanceId,
        values: Vec<Value>,
    },
    AddDefinition(Box<Definition>),
    /// Raw arguments of an `AddDefinition` that did not decode.
    OpaqueDefinition(Vec<Value>),
}

impl PatchOp {
    pub fn opcode(&self) -> u8 {
        match self {
            PatchOp::CreateElement { .. } => opcode::CREATE_ELEMENT,
            PatchOp::InsertBefore { .. } => opcode::INSERT_BEFORE,
            PatchOp::RemoveChild { .. } => opcode::REMOVE_CHILD,
            PatchOp::SetAttribute { .. } => opcode::SET_ATTRIBUTE,
            PatchOp::SetAttributes { .. } => opcode::SET_ATTRIBUTES,
            PatchOp::AddDefinition(_) | PatchOp::OpaqueDefinition(_) => {
                opcode::DEV_ONLY_ADD_DEFINITION
            }
        }
    }
}

/// One committed patch with its sequence id.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchBatch {
    pub id: u64,
    pub ops: Vec<PatchOp>,
}

/// Payload of one main-thread update: ordered batches plus the page flush
/// options used once all of them are applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchList {
    pub batches: Vec<PatchBatch>,
    pub flush_options: FlushOptions,
}
