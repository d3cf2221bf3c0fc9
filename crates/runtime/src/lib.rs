//! Thread-level plumbing: the background commit pipeline and the main-thread
//! runtime loop, connected over the [`bus`] channels.

pub mod background;
pub mod error;
pub mod main_loop;

pub use background::{BackgroundRuntime, DeferredUpdate};
pub use error::RuntimeError;
pub use main_loop::start_main_runtime;
