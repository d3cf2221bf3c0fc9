//! List cell metadata.
//!
//! Platform info is read by the list container through `update-list-info`
//! and the recycle bucket key. It is never set on the cell's element.

use snapshot::{Value, is_truthy};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const REUSE_IDENTIFIER: &str = "reuse-identifier";
pub const ITEM_KEY: &str = "item-key";
pub const DEFER: &str = "defer";

/// Keys recognised as cell metadata inside spread values.
pub const PLATFORM_INFO_ATTRIBUTES: [&str; 10] = [
    REUSE_IDENTIFIER,
    "full-span",
    ITEM_KEY,
    "sticky-top",
    "sticky-bottom",
    "estimated-height",
    "estimated-height-px",
    "estimated-main-axis-size-px",
    "recyclable",
    DEFER,
];

pub fn is_platform_info_key(name: &str) -> bool {
    PLATFORM_INFO_ATTRIBUTES.contains(&name)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlatformInfo {
    fields: BTreeMap<Arc<str>, Value>,
}

impl PlatformInfo {
    /// `None` or `null` removes the field.
    pub fn set(&mut self, name: &str, value: Option<Value>) {
        match value {
            Some(value) if !value.is_null() => {
                self.fields.insert(Arc::from(name), value);
            }
            _ => {
                self.fields.remove(name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn reuse_identifier(&self) -> String {
        match self.fields.get(REUSE_IDENTIFIER) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn item_key(&self) -> Option<String> {
        match self.fields.get(ITEM_KEY)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.fields.get(DEFER).is_some_and(is_truthy)
    }

    /// Cells with the same template and reuse identifier share a bucket.
    pub fn bucket_key(&self, template: &str) -> String {
        format!("{template}{}", self.reuse_identifier())
    }

    /// Fields reported in insert and update actions.
    pub fn action_fields(&self) -> BTreeMap<Arc<str>, Value> {
        self.fields
            .iter()
            .filter(|(name, _)| name.as_ref() != DEFER)
            .map(|(name, value)| (Arc::clone(name), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_clears_a_field() {
        let mut info = PlatformInfo::default();
        info.set("item-key", Some(json!("k1")));
        assert_eq!(info.item_key().as_deref(), Some("k1"));
        info.set("item-key", Some(Value::Null));
        assert!(info.is_empty());
    }

    #[test]
    fn bucket_key_joins_template_and_reuse_identifier() {
        let mut info = PlatformInfo::default();
        assert_eq!(info.bucket_key("item"), "item");
        info.set(REUSE_IDENTIFIER, Some(json!("big")));
        assert_eq!(info.bucket_key("item"), "itembig");
    }

    #[test]
    fn defer_is_not_reported() {
        let mut info = PlatformInfo::default();
        info.set(DEFER, Some(json!(true)));
        info.set("full-span", Some(json!(true)));
        assert!(info.is_deferred());
        let fields = info.action_fields();
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("full-span"));
    }

    #[test]
    fn recognised_keys() {
        assert!(is_platform_info_key("estimated-main-axis-size-px"));
        assert!(!is_platform_info_key("class"));
    }
}
