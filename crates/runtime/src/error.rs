use bus::PatchUpdate;
use snapshot::{TreeError, WireError};

#[derive(Debug)]
pub enum RuntimeError {
    Tree(TreeError),
    Wire(WireError),
    /// Hydration was requested before a first screen was rendered.
    NoRoot,
    AlreadyHydrated,
    /// Updates queued behind hydration failed. The hydration update was
    /// still built and must be shipped.
    QueuedUpdates {
        update: Box<PatchUpdate>,
        errors: Vec<TreeError>,
    },
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::Tree(err) => write!(f, "{err}"),
            RuntimeError::Wire(err) => write!(f, "patch encoding failed: {err}"),
            RuntimeError::NoRoot => write!(f, "no first screen rendered"),
            RuntimeError::AlreadyHydrated => write!(f, "already hydrated"),
            RuntimeError::QueuedUpdates { errors, .. } => {
                write!(f, "{} queued update(s) failed during hydration", errors.len())?;
                match errors.first() {
                    Some(first) => write!(f, ": {first}"),
                    None => Ok(()),
                }
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    /// The update that still has to reach the main thread, if any.
    pub fn into_update(self) -> Option<PatchUpdate> {
        match self {
            RuntimeError::QueuedUpdates { update, .. } => Some(*update),
            _ => None,
        }
    }
}

impl From<TreeError> for RuntimeError {
    fn from(err: TreeError) -> Self {
        RuntimeError::Tree(err)
    }
}

impl From<WireError> for RuntimeError {
    fn from(err: WireError) -> Self {
        RuntimeError::Wire(err)
    }
}
