use core_types::{ElementId, InstanceId};
use snapshot::TreeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainError {
    /// Constructing an instance of an unregistered template.
    UnknownTemplate(String),
    UnknownInstance(InstanceId),
    /// Removing a node that is not a current child.
    InvalidChild { parent: InstanceId, child: InstanceId },
    /// Inserting a node under itself or one of its descendants.
    Cycle { parent: InstanceId, child: InstanceId },
    List(ListError),
}

impl std::fmt::Display for MainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MainError::UnknownTemplate(template) => write!(f, "Snapshot not found: {template}"),
            MainError::UnknownInstance(id) => write!(f, "instance {id} not found"),
            MainError::InvalidChild { parent, child } => write!(
                f,
                "The node to be removed is not a child of this node (parent {parent}, child {child})."
            ),
            MainError::Cycle { parent, child } => {
                write!(f, "cannot insert {child} under its own descendant {parent}")
            }
            MainError::List(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for MainError {}

impl From<ListError> for MainError {
    fn from(err: ListError) -> Self {
        MainError::List(err)
    }
}

impl From<TreeError> for MainError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::UnknownInstance(id) => MainError::UnknownInstance(id),
            TreeError::UnknownTemplate(template) => MainError::UnknownTemplate(template),
            TreeError::InvalidChild { parent, child } => MainError::InvalidChild { parent, child },
            TreeError::Cycle { parent, child } => MainError::Cycle { parent, child },
        }
    }
}

/// Contract violations by the native list container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    ListRemoved {
        list_id: ElementId,
        operation: &'static str,
    },
    CellNotFound {
        list_id: ElementId,
        index: usize,
    },
    PendingDeferredCell {
        list_id: ElementId,
        index: usize,
    },
    DeferredRequiresListContainer {
        list_id: ElementId,
    },
    /// The cell's template constructs no elements.
    EmptyCell {
        template: String,
    },
}

impl std::fmt::Display for ListError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListError::ListRemoved { operation, .. } => {
                write!(f, "{operation} called on removed list")
            }
            ListError::CellNotFound { .. } => f.write_str("childCtx not found"),
            ListError::PendingDeferredCell { .. } => {
                f.write_str("componentAtIndex was called on a pending deferred list item")
            }
            ListError::DeferredRequiresListContainer { .. } => f.write_str(
                "Unsupported: `<list-item/>` with `defer={true}` must be used with `<list custom-list-name=\"list-container\"/>`",
            ),
            ListError::EmptyCell { template } => {
                write!(f, "list cell of type '{template}' has no elements")
            }
        }
    }
}

impl std::error::Error for ListError {}
