use serde::{Deserialize, Serialize};

/// Identity of an instance in either thread's tree.
///
/// Background-assigned ids count up from 1, ids minted on the main thread
/// count down from -1. The two spaces only meet after hydration remaps them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub i32);

impl InstanceId {
    /// Marks an instance that has been dropped from its thread's id index.
    pub const DETACHED: InstanceId = InstanceId(0);
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime-unique id of a native element (the "sign" of a list cell).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u32);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation id handed over by the native list container for each cell request.
pub type OperationId = i64;

/// Generation counter stamped on every patch update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReloadVersion(pub u64);

impl ReloadVersion {
    pub const INITIAL: ReloadVersion = ReloadVersion(0);

    pub fn next(self) -> Self {
        ReloadVersion(self.0 + 1)
    }
}

/// Sent along with a flush of a recycled list cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReuseNotification {
    pub list_element: ElementId,
    pub item_key: Option<String>,
}

/// Options record passed to the native "flush element subtree" primitive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlushOptions {
    pub trigger_layout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<OperationId>,
    pub async_flush: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_reuse_notification: Option<ReuseNotification>,
    /// Batched cell flush: element ids aligned with the requested indexes,
    /// `None` for cells whose materialization is deferred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_ids: Option<Vec<Option<ElementId>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_ids: Option<Vec<OperationId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_version_is_monotonic() {
        let v = ReloadVersion::INITIAL;
        assert!(v.next() > v);
        assert_eq!(v.next().next(), ReloadVersion(2));
    }

    #[test]
    fn flush_options_default_is_a_plain_flush() {
        let opts = FlushOptions::default();
        assert!(!opts.trigger_layout);
        assert!(opts.list_id.is_none());
        assert!(opts.element_ids.is_none());
    }
}
