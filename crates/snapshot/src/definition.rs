//! Template definitions and the registry that owns them.
//!
//! A definition is pure data: a list of element templates that construct the
//! native element set, an updater table indexed by value position, and a slot
//! descriptor telling how children attach. Only [`Updater::Custom`] carries
//! code, which is why it does not travel over the wire.

use crate::value::Value;
use core_types::ElementId;
use host::ElementHost;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const ROOT_TEMPLATE: &str = "root";
pub const WRAPPER_TEMPLATE: &str = "wrapper";
pub const RAW_TEXT_TEMPLATE: &str = "raw-text";
pub const DEFAULT_ENTRY_NAME: &str = "__Card__";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    /// A placeholder element replaced by the child's root.
    Slot,
    /// Ordered children appended into the target element.
    Children,
    /// Ordered children owned by a virtualized list.
    ListChildren,
    /// Several values sharing one declared slot, wrapped when needed.
    MultiChildren,
}

/// `(kind, target element index)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry(pub SlotKind, pub usize);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ElementKind {
    Page,
    Element { tag: Arc<str> },
    RawText { text: Arc<str> },
    Wrapper,
    List,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementTemplate {
    #[serde(flatten)]
    pub kind: ElementKind,
    /// Index of the element this one is appended to during construction.
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub attributes: Vec<(Arc<str>, Value)>,
}

impl ElementTemplate {
    fn of(kind: ElementKind) -> Self {
        Self {
            kind,
            parent: None,
            attributes: Vec::new(),
        }
    }

    pub fn page() -> Self {
        Self::of(ElementKind::Page)
    }

    pub fn element(tag: &str) -> Self {
        Self::of(ElementKind::Element {
            tag: Arc::from(tag),
        })
    }

    pub fn raw_text(text: &str) -> Self {
        Self::of(ElementKind::RawText {
            text: Arc::from(text),
        })
    }

    pub fn wrapper() -> Self {
        Self::of(ElementKind::Wrapper)
    }

    pub fn list() -> Self {
        Self::of(ElementKind::List)
    }

    pub fn child_of(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: Value) -> Self {
        self.attributes.push((Arc::from(name), value));
        self
    }

    pub fn static_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(key, _)| key.as_ref() == name)
            .map(|(_, value)| value)
    }
}

/// Arguments of a custom updater.
pub struct UpdateContext<'a> {
    pub host: &'a mut dyn ElementHost,
    pub elements: &'a [ElementId],
    pub index: usize,
    pub value: Option<&'a Value>,
    pub old: Option<&'a Value>,
}

pub type UpdateFn = fn(&mut UpdateContext<'_>);

/// Strategy applied when the value at one index changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Updater {
    /// Sets a named attribute on one constructed element.
    Attribute { element: usize, name: Arc<str> },
    /// Sets the `text` attribute on one constructed element.
    Text { element: usize },
    /// Spreads an object value into attributes; removed keys are reset to null.
    Spread { element: usize },
    /// List cell metadata consumed by the list container.
    PlatformInfo { name: Arc<str> },
    #[serde(skip)]
    Custom(UpdateFn),
}

impl PartialEq for Updater {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Updater::Attribute { element: a, name: x },
                Updater::Attribute { element: b, name: y },
            ) => a == b && x == y,
            (Updater::Text { element: a }, Updater::Text { element: b }) => a == b,
            (Updater::Spread { element: a }, Updater::Spread { element: b }) => a == b,
            (Updater::PlatformInfo { name: a }, Updater::PlatformInfo { name: b }) => a == b,
            (Updater::Custom(a), Updater::Custom(b)) => std::ptr::fn_addr_eq(*a, *b),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub template_id: Arc<str>,
    pub elements: Vec<ElementTemplate>,
    #[serde(default)]
    pub updaters: Vec<Updater>,
    #[serde(default)]
    pub slot: Vec<SlotEntry>,
    #[serde(default)]
    pub style_scope_id: Option<u32>,
    #[serde(default)]
    pub entry_name: Option<Arc<str>>,
}

impl Definition {
    pub fn new(template_id: &str) -> Self {
        Self {
            template_id: Arc::from(template_id),
            elements: Vec::new(),
            updaters: Vec::new(),
            slot: Vec::new(),
            style_scope_id: None,
            entry_name: None,
        }
    }

    pub fn with_element(mut self, element: ElementTemplate) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_updater(mut self, updater: Updater) -> Self {
        self.updaters.push(updater);
        self
    }

    pub fn with_slot(mut self, kind: SlotKind, element: usize) -> Self {
        self.slot.push(SlotEntry(kind, element));
        self
    }

    pub fn with_style_scope(mut self, css_id: u32) -> Self {
        self.style_scope_id = Some(css_id);
        self
    }

    pub fn with_entry_name(mut self, entry_name: &str) -> Self {
        self.entry_name = Some(Arc::from(entry_name));
        self
    }

    /// Children of a list holder are virtualized instead of attached.
    pub fn is_list_holder(&self) -> bool {
        matches!(self.slot.first(), Some(SlotEntry(SlotKind::ListChildren, _)))
    }

    /// Key the definition is registered under.
    pub fn registry_key(&self) -> Arc<str> {
        match self.entry_name.as_deref() {
            Some(entry) if entry != DEFAULT_ENTRY_NAME => {
                Arc::from(entry_unique_id(&self.template_id, entry))
            }
            _ => Arc::clone(&self.template_id),
        }
    }
}

pub fn entry_unique_id(template_id: &str, entry_name: &str) -> String {
    format!("{entry_name}:{template_id}")
}

/// Template id → definition lookup.
///
/// Each thread owns its own registry; definitions are shared behind `Arc`.
#[derive(Clone, Debug, Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<Arc<str>, Arc<Definition>>,
}

impl DefinitionRegistry {
    /// Registry holding the `root`, `wrapper` and `raw-text` built-ins.
    pub fn new() -> Self {
        let mut registry = Self::default();
        for definition in builtin_definitions() {
            registry.register(definition);
        }
        registry
    }

    /// Registers a definition. The first registration of a key wins.
    pub fn register(&mut self, definition: Definition) -> bool {
        let key = definition.registry_key();
        if self.definitions.contains_key(&key) {
            log::warn!(target: "definition", "definition {key} already registered");
            return false;
        }
        log::trace!(target: "definition", "register {key}");
        self.definitions.insert(key, Arc::new(definition));
        true
    }

    /// Developer-mode registration received over the wire.
    ///
    /// Never called by the production apply path; the main thread routes
    /// `AddDefinition` here only when hot swap is enabled in its config.
    pub fn hot_swap(&mut self, definition: Definition) -> bool {
        let key = definition.registry_key();
        if self.definitions.contains_key(&key) {
            log::debug!(target: "definition", "hot swap of {key} ignored, already present");
            return false;
        }
        log::debug!(target: "definition", "hot swap registered {key}");
        self.definitions.insert(key, Arc::new(definition));
        true
    }

    pub fn get(&self, template_id: &str) -> Option<&Arc<Definition>> {
        self.definitions.get(template_id)
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.definitions.contains_key(template_id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Drops everything but the built-ins.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn builtin_definitions() -> Vec<Definition> {
    vec![
        Definition::new(ROOT_TEMPLATE)
            .with_element(ElementTemplate::page())
            .with_slot(SlotKind::Children, 0),
        Definition::new(WRAPPER_TEMPLATE)
            .with_element(ElementTemplate::wrapper())
            .with_slot(SlotKind::Children, 0),
        Definition::new(RAW_TEXT_TEMPLATE)
            .with_element(ElementTemplate::raw_text(""))
            .with_updater(Updater::Text { element: 0 }),
    ]
}
