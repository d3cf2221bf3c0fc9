//! Main-thread half of the runtime: the instance tree that owns native
//! elements, the patch applier, and list virtualization.

mod apply;
pub mod config;
pub mod error;
mod hydrate;
pub mod list;
pub mod main_tree;

pub use apply::{CtxNotFound, UpdateOutcome};
pub use config::{ConfigError, RuntimeConfig};
pub use error::{ListError, MainError};
pub use list::{CellRequest, InsertAction, ListUpdateInfo, PlatformInfo, UpdateAction};
pub use main_tree::{MainData, MainTree};
