use crate::value::Value;
use core_types::InstanceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serialized form of a main-thread instance subtree, shipped to the
/// background thread for first-screen hydration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedInstance {
    pub id: InstanceId,
    #[serde(rename = "type")]
    pub template: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_props: BTreeMap<Arc<str>, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedInstance>,
}

impl SerializedInstance {
    pub fn new(id: InstanceId, template: &str) -> Self {
        Self {
            id,
            template: Arc::from(template),
            values: None,
            extra_props: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = Some(values);
        self
    }

    pub fn with_child(mut self, child: SerializedInstance) -> Self {
        self.children.push(child);
        self
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.as_ref().and_then(|v| v.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_type_field() {
        let snap = SerializedInstance::new(InstanceId(-1), "root")
            .with_child(SerializedInstance::new(InstanceId(-2), "view").with_values(vec![json!(1)]));
        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(
            value,
            json!({"id": -1, "type": "root", "children": [{"id": -2, "type": "view", "values": [1]}]})
        );
        let back: SerializedInstance = serde_json::from_value(value).unwrap();
        assert_eq!(back, snap);
    }
}
