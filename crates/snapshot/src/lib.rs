//! Shared reconciliation substrate: template definitions, the instance
//! arena, the patch protocol and its wire codec, the background instance
//! tree and first-screen hydration.

pub mod background;
pub mod definition;
pub mod diff_array;
mod hydrate;
pub mod hydration_map;
pub mod patch;
pub mod refs;
pub mod serialized;
pub mod tree;
pub mod value;
pub mod wire;

pub use background::{BackgroundData, BackgroundTree};
pub use definition::{
    DEFAULT_ENTRY_NAME, Definition, DefinitionRegistry, ElementKind, ElementTemplate,
    RAW_TEXT_TEMPLATE, ROOT_TEMPLATE, SlotEntry, SlotKind, UpdateContext, UpdateFn, Updater,
    WRAPPER_TEMPLATE, entry_unique_id,
};
pub use diff_array::{ArrayAction, ArrayDiff, diff_keyed};
pub use hydration_map::HydrationMap;
pub use patch::{PatchBatch, PatchList, PatchOp, opcode};
pub use refs::{RefQueue, RefUpdate};
pub use serialized::SerializedInstance;
pub use tree::{InstanceNode, InstanceTree, NodeKey, TreeError};
pub use value::{AttrKey, Value, is_direct_or_deep_equal, is_ref, is_truthy};
pub use wire::{WireError, decode, decode_patch_list, encode, encode_patch_list};
