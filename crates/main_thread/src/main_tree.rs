//! Main-thread instance tree.
//!
//! Every instance owns, once materialized, the native elements its
//! definition constructs. Children attach into the slots of their parent's
//! definition, except under a list holder where they stay virtual until the
//! list asks for them.
//!
//! Invariants:
//! - Ids minted here are negative; ids received in patches come from the
//!   background thread and are positive.
//! - `elements` and `element_root` are set together or not at all.
//! - A child is attached natively only when its parent is materialized.
//! - Instances that left the id index but still hold elements (detached
//!   list cells, structural clones) are owned by a list's sign map or
//!   recycle bucket and freed with it.

use crate::config::RuntimeConfig;
use crate::error::MainError;
use crate::list::{
    CUSTOM_LIST_NAME, DeferredBatch, LIST_CONTAINER, ListState, PendingListUpdates, PlatformInfo,
    is_platform_info_key,
};
use core_types::{ElementId, InstanceId, ReloadVersion};
use host::{ElementHost, WRAPPER_TAG};
use snapshot::{
    AttrKey, DEFAULT_ENTRY_NAME, Definition, DefinitionRegistry, ElementKind, InstanceTree, NodeKey,
    SerializedInstance, SlotEntry, SlotKind, UpdateContext, Updater, Value, is_direct_or_deep_equal,
    is_truthy,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub const IS_READY: &str = "isReady";

#[derive(Clone, Debug)]
pub struct MainData {
    pub definition: Arc<Definition>,
    pub values: Option<Vec<Value>>,
    pub extra_props: BTreeMap<Arc<str>, Value>,
    pub elements: Option<Vec<ElementId>>,
    pub element_root: Option<ElementId>,
    /// Next slot filled by an insertion into a multi-slot parent.
    pub current_slot_index: usize,
    pub platform_info: PlatformInfo,
}

impl MainData {
    fn new(definition: Arc<Definition>) -> Self {
        Self {
            definition,
            values: None,
            extra_props: BTreeMap::new(),
            elements: None,
            element_root: None,
            current_slot_index: 0,
            platform_info: PlatformInfo::default(),
        }
    }
}

pub struct MainTree<H: ElementHost> {
    pub(crate) tree: InstanceTree<MainData>,
    pub(crate) registry: DefinitionRegistry,
    pub(crate) host: H,
    pub(crate) pending: PendingListUpdates,
    pub(crate) lists: HashMap<ElementId, ListState>,
    pub(crate) batches: HashMap<u64, DeferredBatch>,
    pub(crate) next_batch: u64,
    pub(crate) config: RuntimeConfig,
    pub(crate) reload_version: ReloadVersion,
    next_id: i32,
}

impl<H: ElementHost> MainTree<H> {
    pub fn new(host: H, registry: DefinitionRegistry, config: RuntimeConfig) -> Self {
        Self {
            tree: InstanceTree::new(),
            registry,
            host,
            pending: PendingListUpdates::default(),
            lists: HashMap::new(),
            batches: HashMap::new(),
            next_batch: 0,
            config,
            reload_version: ReloadVersion::INITIAL,
            next_id: -1,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DefinitionRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn key(&self, id: InstanceId) -> Result<NodeKey, MainError> {
        self.tree.lookup(id).ok_or(MainError::UnknownInstance(id))
    }

    pub(crate) fn definition(&self, key: NodeKey) -> Option<Arc<Definition>> {
        self.tree.data(key).map(|d| Arc::clone(&d.definition))
    }

    pub(crate) fn is_list_holder(&self, key: NodeKey) -> bool {
        self.tree
            .data(key)
            .is_some_and(|d| d.definition.is_list_holder())
    }

    pub(crate) fn elements_of(&self, key: NodeKey) -> Option<&[ElementId]> {
        self.tree.data(key).and_then(|d| d.elements.as_deref())
    }

    pub(crate) fn element_at(&self, key: NodeKey, index: usize) -> Option<ElementId> {
        self.elements_of(key).and_then(|e| e.get(index)).copied()
    }

    pub(crate) fn root_of(&self, key: NodeKey) -> Option<ElementId> {
        self.tree.data(key).and_then(|d| d.element_root)
    }

    /// Native list element of a materialized list holder.
    pub(crate) fn list_element_of(&self, key: NodeKey) -> Option<ElementId> {
        let data = self.tree.data(key)?;
        let SlotEntry(SlotKind::ListChildren, target) = *data.definition.slot.first()? else {
            return None;
        };
        data.elements.as_ref()?.get(target).copied()
    }

    /// Creates an instance with a main-thread id.
    pub fn create_instance(&mut self, template: &str) -> Result<InstanceId, MainError> {
        let id = InstanceId(self.next_id);
        self.create_instance_with_id(template, id)?;
        self.next_id -= 1;
        Ok(id)
    }

    /// Creates an instance under an id chosen by the background thread.
    pub fn create_instance_with_id(&mut self, template: &str, id: InstanceId) -> Result<InstanceId, MainError> {
        let definition = self
            .registry
            .get(template)
            .cloned()
            .ok_or_else(|| MainError::UnknownTemplate(template.to_string()))?;
        self.tree
            .insert(id, Arc::from(template), MainData::new(definition));
        Ok(id)
    }

    /// Materializes `id` and every descendant that can attach.
    pub fn ensure_elements(&mut self, id: InstanceId) -> Result<(), MainError> {
        let key = self.key(id)?;
        self.ensure_key(key);
        Ok(())
    }

    pub(crate) fn ensure_key(&mut self, key: NodeKey) {
        let Some(data) = self.tree.data(key) else {
            return;
        };
        if data.elements.is_some() {
            return;
        }
        let definition = Arc::clone(&data.definition);
        let elements = self.construct(key, &definition);
        self.apply_style_scope(&definition, &elements);

        let values = {
            let Some(data) = self.tree.data_mut(key) else {
                return;
            };
            data.element_root = elements.first().copied();
            data.elements = Some(elements);
            data.current_slot_index = 0;
            data.values.take()
        };
        if let Some(values) = values {
            self.pending.suspend();
            self.set_values_key(key, values);
            self.pending.resume();
        }

        if definition.is_list_holder() {
            // the native list has seen none of the children yet
            self.pending.replace_all(&self.tree, key, 0);
            self.flush_list(key);
            return;
        }

        let mut slot_index = 0;
        for child in self.tree.children(key) {
            self.ensure_key(child);
            let Some(root) = self.root_of(child) else {
                continue;
            };
            match definition.slot.get(slot_index) {
                Some(SlotEntry(SlotKind::Slot | SlotKind::MultiChildren, _)) => {
                    self.attach_to_slot(key, slot_index, root);
                    slot_index += 1;
                }
                Some(SlotEntry(_, target)) => {
                    if let Some(parent) = self.element_at(key, *target) {
                        self.host.append_element(parent, root);
                    }
                }
                None => log::warn!(
                    target: "main_tree",
                    "{} has more children than slots",
                    definition.template_id
                ),
            }
        }
        if let Some(data) = self.tree.data_mut(key) {
            data.current_slot_index = slot_index;
        }
    }

    fn construct(&mut self, key: NodeKey, definition: &Definition) -> Vec<ElementId> {
        let mut elements: Vec<ElementId> = Vec::with_capacity(definition.elements.len());
        for template in &definition.elements {
            let element = match &template.kind {
                ElementKind::Page => self.host.page(),
                ElementKind::Element { tag } => self.host.create_element(tag),
                ElementKind::RawText { text } => self.host.create_raw_text(text),
                ElementKind::Wrapper => self.host.create_wrapper(),
                ElementKind::List => {
                    let element = self.host.create_list();
                    let list_container = template
                        .static_attribute(CUSTOM_LIST_NAME)
                        .and_then(Value::as_str)
                        == Some(LIST_CONTAINER);
                    self.lists
                        .insert(element, ListState::new(key, list_container));
                    element
                }
            };
            for (name, value) in &template.attributes {
                self.host.set_attribute(element, name, value);
            }
            if let Some(parent) = template.parent.and_then(|p| elements.get(p)) {
                self.host.append_element(*parent, element);
            }
            elements.push(element);
        }
        log::trace!(
            target: "main_tree",
            "constructed {} elements for {}",
            elements.len(),
            definition.template_id
        );
        elements
    }

    fn apply_style_scope(&mut self, definition: &Definition, elements: &[ElementId]) {
        let entry_name = definition
            .entry_name
            .as_deref()
            .filter(|entry| *entry != DEFAULT_ENTRY_NAME);
        match (definition.style_scope_id, entry_name) {
            (Some(css_id), entry) => self.host.set_css_id(elements, css_id, entry),
            (None, Some(entry)) => self.host.set_css_id(elements, 0, Some(entry)),
            (None, None) => {}
        }
    }

    /// Attaches `root` to the `slot_index`-th slot of a materialized parent.
    pub(crate) fn attach_to_slot(&mut self, parent: NodeKey, slot_index: usize, root: ElementId) {
        let Some(data) = self.tree.data(parent) else {
            return;
        };
        let Some(SlotEntry(kind, target)) = data.definition.slot.get(slot_index).copied() else {
            log::warn!(
                target: "main_tree",
                "{} has no slot {slot_index}",
                data.definition.template_id
            );
            return;
        };
        let Some(target_element) = self.element_at(parent, target) else {
            return;
        };
        let replace = match kind {
            SlotKind::Slot => true,
            SlotKind::MultiChildren => self.host.tag(target_element) == Some(WRAPPER_TAG),
            SlotKind::Children | SlotKind::ListChildren => false,
        };
        if replace {
            self.host.replace_element(root, target_element);
            if let Some(slot) = self
                .tree
                .data_mut(parent)
                .and_then(|d| d.elements.as_mut())
                .and_then(|e| e.get_mut(target))
            {
                *slot = root;
            }
        } else {
            self.host.append_element(target_element, root);
        }
    }

    pub fn insert_before(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
        before: Option<InstanceId>,
    ) -> Result<(), MainError> {
        let parent_key = self.key(parent)?;
        let child_key = self.key(child)?;
        let before = before.map(|b| self.key(b)).transpose()?;
        if self.tree.is_ancestor(child_key, parent_key) {
            return Err(MainError::Cycle { parent, child });
        }
        self.insert_before_keys(parent_key, child_key, before);
        Ok(())
    }

    pub fn append_child(&mut self, parent: InstanceId, child: InstanceId) -> Result<(), MainError> {
        self.insert_before(parent, child, None)
    }

    pub(crate) fn insert_before_keys(&mut self, parent: NodeKey, child: NodeKey, before: Option<NodeKey>) {
        let Some(definition) = self.definition(parent) else {
            return;
        };
        if definition.is_list_holder() {
            if self.pending.is_recording() {
                self.pending.on_insert_before(&self.tree, parent, child);
            }
            self.tree.insert_before(parent, child, before);
            return;
        }

        let was_child = self.tree.is_child(parent, child);
        self.tree.insert_before(parent, child, before);
        if self.elements_of(parent).is_none() {
            return;
        }
        self.ensure_key(child);
        let Some(root) = self.root_of(child) else {
            return;
        };
        match definition.slot.as_slice() {
            [] => log::warn!(
                target: "main_tree",
                "{} accepts no children",
                definition.template_id
            ),
            [SlotEntry(_, target)] => {
                let Some(target_element) = self.element_at(parent, *target) else {
                    return;
                };
                if was_child {
                    self.host.remove_element(target_element, root);
                }
                let anchor = before
                    .filter(|b| self.tree.is_child(parent, *b))
                    .and_then(|b| self.root_of(b));
                self.host.insert_element_before(target_element, root, anchor);
            }
            _ => {
                let slot_index = match self.tree.data_mut(parent) {
                    Some(data) => {
                        data.current_slot_index += 1;
                        data.current_slot_index - 1
                    }
                    None => return,
                };
                self.attach_to_slot(parent, slot_index, root);
            }
        }
    }

    pub fn remove_child(&mut self, parent: InstanceId, child: InstanceId) -> Result<(), MainError> {
        let parent_key = self.key(parent)?;
        let child_key = self.key(child)?;
        if !self.tree.is_child(parent_key, child_key) {
            return Err(MainError::InvalidChild { parent, child });
        }
        self.remove_child_keys(parent_key, child_key);
        Ok(())
    }

    pub(crate) fn remove_child_keys(&mut self, parent: NodeKey, child: NodeKey) {
        if self.is_list_holder(parent) {
            if self.pending.is_recording() {
                self.pending.on_remove_child(&self.tree, parent, child);
            }
            self.tree.detach(child);
            self.release_list_cell(child);
            return;
        }
        let target = self
            .tree
            .data(parent)
            .and_then(|d| d.definition.slot.first().copied());
        if let Some(SlotEntry(_, target)) = target
            && let Some(target_element) = self.element_at(parent, target)
            && let Some(root) = self.root_of(child)
        {
            self.host.remove_element(target_element, root);
        }
        self.tree.detach(child);
        self.free_detached_subtree(child);
    }

    /// Sets one value or extra prop.
    pub fn set_attribute(&mut self, id: InstanceId, key: AttrKey, value: Value) -> Result<(), MainError> {
        let node = self.key(id)?;
        match key {
            AttrKey::Index(index) => self.set_value_key(node, index, value),
            AttrKey::Name(name) => {
                let ready = name.as_ref() == IS_READY && is_truthy(&value);
                if let Some(data) = self.tree.data_mut(node) {
                    data.extra_props.insert(name, value);
                }
                if ready {
                    self.resolve_deferred_key(node)?;
                }
            }
        }
        Ok(())
    }

    pub fn set_values(&mut self, id: InstanceId, values: Vec<Value>) -> Result<(), MainError> {
        let key = self.key(id)?;
        self.set_values_key(key, values);
        Ok(())
    }

    pub(crate) fn set_values_key(&mut self, key: NodeKey, values: Vec<Value>) {
        let Some(data) = self.tree.data_mut(key) else {
            return;
        };
        let old = data.values.replace(values.clone());
        let len = values.len().max(old.as_ref().map_or(0, Vec::len));
        for index in 0..len {
            let previous = old.as_ref().and_then(|o| o.get(index));
            if !is_direct_or_deep_equal(previous, values.get(index)) {
                self.run_updater(key, index, previous.cloned());
            }
        }
    }

    fn set_value_key(&mut self, key: NodeKey, index: usize, value: Value) {
        let Some(data) = self.tree.data_mut(key) else {
            return;
        };
        let values = data.values.get_or_insert_with(Vec::new);
        if values.len() <= index {
            values.resize(index + 1, Value::Null);
        }
        if is_direct_or_deep_equal(Some(&values[index]), Some(&value)) {
            return;
        }
        let previous = std::mem::replace(&mut values[index], value);
        self.run_updater(key, index, Some(previous));
    }

    /// Runs the updater at `index` against the current value.
    pub(crate) fn run_updater(&mut self, key: NodeKey, index: usize, old: Option<Value>) {
        let Some(data) = self.tree.data(key) else {
            return;
        };
        let definition = Arc::clone(&data.definition);
        let Some(updater) = definition.updaters.get(index) else {
            log::trace!(
                target: "main_tree",
                "{} has no updater at {index}",
                definition.template_id
            );
            return;
        };
        let value = data.values.as_ref().and_then(|v| v.get(index)).cloned();
        let elements = data.elements.clone();
        let element = |at: usize| elements.as_ref().and_then(|e| e.get(at)).copied();

        match updater {
            Updater::Attribute { element: at, name } => {
                let Some(target) = element(*at) else {
                    return;
                };
                let value = value.unwrap_or(Value::Null);
                if name.as_ref() == CUSTOM_LIST_NAME
                    && let Some(state) = self.lists.get_mut(&target)
                {
                    state.list_container = value.as_str() == Some(LIST_CONTAINER);
                }
                self.host.set_attribute(target, name, &value);
            }
            Updater::Text { element: at } => {
                if let Some(target) = element(*at) {
                    self.host
                        .set_attribute(target, "text", &value.unwrap_or(Value::Null));
                }
            }
            Updater::Spread { element: at } => {
                let target = element(*at);
                self.apply_spread(key, target, value, old);
            }
            Updater::PlatformInfo { name } => self.update_platform_info(key, name, value),
            Updater::Custom(update) => {
                let Some(elements) = elements.as_deref() else {
                    return;
                };
                let mut ctx = UpdateContext {
                    host: &mut self.host,
                    elements,
                    index,
                    value: value.as_ref(),
                    old: old.as_ref(),
                };
                update(&mut ctx);
            }
        }
    }

    fn apply_spread(&mut self, key: NodeKey, target: Option<ElementId>, value: Option<Value>, old: Option<Value>) {
        let new_map = value.as_ref().and_then(Value::as_object);
        let old_map = old.as_ref().and_then(Value::as_object);
        if let Some(new_map) = new_map {
            for (name, value) in new_map {
                let previous = old_map.and_then(|m| m.get(name));
                if is_direct_or_deep_equal(previous, Some(value)) {
                    continue;
                }
                if is_platform_info_key(name) {
                    self.update_platform_info(key, name, Some(value.clone()));
                } else if let Some(target) = target {
                    self.host.set_attribute(target, name, value);
                }
            }
        }
        if let Some(old_map) = old_map {
            for name in old_map.keys() {
                if new_map.is_some_and(|m| m.contains_key(name)) {
                    continue;
                }
                if is_platform_info_key(name) {
                    self.update_platform_info(key, name, None);
                } else if let Some(target) = target {
                    self.host.set_attribute(target, name, &Value::Null);
                }
            }
        }
    }

    /// Stores cell metadata and marks the cell updated in its list.
    fn update_platform_info(&mut self, key: NodeKey, name: &str, value: Option<Value>) {
        let Some(data) = self.tree.data_mut(key) else {
            return;
        };
        data.platform_info.set(name, value);
        if self.pending.is_recording()
            && let Some(parent) = self.tree.parent(key)
            && self.is_list_holder(parent)
        {
            self.pending.on_set_attribute(&self.tree, parent, key);
        }
    }

    /// Drops element bindings. A list holder keeps its cells untouched.
    pub(crate) fn un_render_elements(&mut self, key: NodeKey) {
        let Some(data) = self.tree.data_mut(key) else {
            return;
        };
        data.elements = None;
        data.element_root = None;
        data.current_slot_index = 0;
        if data.definition.is_list_holder() {
            return;
        }
        for child in self.tree.children(key) {
            self.un_render_elements(child);
        }
    }

    /// Moves `key`'s elements into an unindexed structural clone, leaving
    /// `key` unmaterialized. Returns the clone.
    pub(crate) fn take_elements(&mut self, key: NodeKey) -> Option<NodeKey> {
        let node = self.tree.get(key)?;
        let (id, template) = (node.id, Arc::clone(&node.template));
        let list_element = self.list_element_of(key);
        let data = {
            let data = self.tree.data_mut(key)?;
            MainData {
                definition: Arc::clone(&data.definition),
                values: data.values.clone(),
                extra_props: data.extra_props.clone(),
                elements: data.elements.take(),
                element_root: data.element_root.take(),
                current_slot_index: std::mem::take(&mut data.current_slot_index),
                platform_info: data.platform_info.clone(),
            }
        };
        let list_holder = data.definition.is_list_holder();
        let clone = self.tree.alloc(id, template, data);
        if list_holder {
            if let Some(state) = list_element.and_then(|el| self.lists.get_mut(&el)) {
                state.owner = clone;
            }
        } else {
            for child in self.tree.children(key) {
                if let Some(child_clone) = self.take_elements(child) {
                    self.tree.insert_before(clone, child_clone, None);
                }
            }
        }
        Some(clone)
    }

    /// Frees a detached subtree together with the lists it owns.
    pub(crate) fn free_detached_subtree(&mut self, key: NodeKey) {
        let nodes: HashSet<NodeKey> = self.tree.subtree(key).into_iter().collect();
        let owned: Vec<ElementId> = self
            .lists
            .iter()
            .filter(|(_, state)| nodes.contains(&state.owner))
            .map(|(element, _)| *element)
            .collect();
        for element in owned {
            self.destroy_list(element);
        }
        self.tree.free_subtree(key);
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.tree.contains_id(id)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Arena slots in use, including unindexed cells and clones.
    pub fn live_nodes(&self) -> usize {
        self.tree.live_nodes()
    }

    pub fn template(&self, id: InstanceId) -> Option<&str> {
        self.tree.by_id(id).map(|n| n.template.as_ref())
    }

    pub fn values(&self, id: InstanceId) -> Option<&[Value]> {
        self.tree.by_id(id).and_then(|n| n.data.values.as_deref())
    }

    pub fn extra_prop(&self, id: InstanceId, name: &str) -> Option<&Value> {
        self.tree.by_id(id).and_then(|n| n.data.extra_props.get(name))
    }

    pub fn elements(&self, id: InstanceId) -> Option<&[ElementId]> {
        self.tree.by_id(id).and_then(|n| n.data.elements.as_deref())
    }

    pub fn element_root(&self, id: InstanceId) -> Option<ElementId> {
        self.tree.by_id(id).and_then(|n| n.data.element_root)
    }

    pub fn platform_info(&self, id: InstanceId) -> Option<&PlatformInfo> {
        self.tree.by_id(id).map(|n| &n.data.platform_info)
    }

    pub fn child_nodes(&self, id: InstanceId) -> Vec<InstanceId> {
        self.tree
            .lookup(id)
            .map(|key| self.tree.child_ids(key))
            .unwrap_or_default()
    }

    pub fn parent_node(&self, id: InstanceId) -> Option<InstanceId> {
        let key = self.tree.lookup(id)?;
        self.tree.parent(key).and_then(|p| self.tree.id_of(p))
    }

    /// Instance currently rendered into a list cell element.
    pub fn cell_instance(&self, list: ElementId, cell: ElementId) -> Option<InstanceId> {
        let key = self.lists.get(&list)?.sign_map.get(&cell)?;
        self.tree.id_of(*key)
    }

    pub fn is_list(&self, element: ElementId) -> bool {
        self.lists.contains_key(&element)
    }

    /// Lists with an unflushed recording.
    pub fn pending_list_count(&self) -> usize {
        self.pending.len()
    }

    pub fn serialize(&self, id: InstanceId) -> Option<SerializedInstance> {
        self.tree.lookup(id).map(|key| self.serialize_node(key))
    }

    fn serialize_node(&self, key: NodeKey) -> SerializedInstance {
        let Some(node) = self.tree.get(key) else {
            return SerializedInstance::new(InstanceId::DETACHED, "");
        };
        SerializedInstance {
            id: node.id,
            template: Arc::clone(&node.template),
            values: node.data.values.clone(),
            extra_props: node.data.extra_props.clone(),
            children: self
                .tree
                .children(key)
                .into_iter()
                .map(|child| self.serialize_node(child))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use host::ElementTree;
    use serde_json::json;
    use snapshot::ElementTemplate;

    fn write_id(ctx: &mut UpdateContext<'_>) {
        if let Some(el) = ctx.elements.first() {
            let value = ctx.value.cloned().unwrap_or(Value::Null);
            ctx.host.set_attribute(*el, "custom", &value);
        }
    }

    fn registry() -> DefinitionRegistry {
        let mut registry = DefinitionRegistry::new();
        registry.register(
            Definition::new("view")
                .with_element(ElementTemplate::element("view"))
                .with_updater(Updater::Attribute {
                    element: 0,
                    name: Arc::from("class"),
                })
                .with_updater(Updater::Spread { element: 0 })
                .with_updater(Updater::Custom(write_id))
                .with_slot(SlotKind::Children, 0),
        );
        registry.register(
            Definition::new("pair")
                .with_element(ElementTemplate::element("view"))
                .with_element(ElementTemplate::wrapper().child_of(0))
                .with_element(ElementTemplate::wrapper().child_of(0))
                .with_slot(SlotKind::Slot, 1)
                .with_slot(SlotKind::Slot, 2),
        );
        registry.register(
            Definition::new("scoped")
                .with_element(ElementTemplate::element("view"))
                .with_style_scope(7)
                .with_entry_name("lazy"),
        );
        registry
    }

    fn tree() -> MainTree<ElementTree> {
        MainTree::new(ElementTree::new(), registry(), RuntimeConfig::default())
    }

    #[test]
    fn main_ids_are_negative() {
        let mut main = tree();
        assert_eq!(main.create_instance("root").unwrap(), InstanceId(-1));
        assert_eq!(main.create_instance("view").unwrap(), InstanceId(-2));
        assert_eq!(
            main.create_instance("nope"),
            Err(MainError::UnknownTemplate("nope".into()))
        );
        assert_eq!(main.create_instance("view").unwrap(), InstanceId(-3));
    }

    #[test]
    fn values_before_materialization_are_replayed() {
        let mut main = tree();
        let root = main.create_instance("root").unwrap();
        let view = main.create_instance("view").unwrap();
        main.set_values(view, vec![json!("box"), json!({"id": 3})])
            .unwrap();
        assert!(main.elements(view).is_none());

        main.ensure_elements(root).unwrap();
        main.append_child(root, view).unwrap();
        let el = main.element_root(view).unwrap();
        assert_eq!(main.host().attribute(el, "class"), Some(&json!("box")));
        assert_eq!(main.host().attribute(el, "id"), Some(&json!(3)));
        assert_eq!(main.host().parent(el), Some(main.host().page()));
    }

    #[test]
    fn spread_resets_dropped_keys() {
        let mut main = tree();
        let view = main.create_instance("view").unwrap();
        main.ensure_elements(view).unwrap();
        main.set_attribute(view, AttrKey::Index(1), json!({"a": 1, "b": 2}))
            .unwrap();
        main.set_attribute(view, AttrKey::Index(1), json!({"a": 1}))
            .unwrap();
        let el = main.element_root(view).unwrap();
        assert_eq!(main.host().attribute(el, "a"), Some(&json!(1)));
        assert_eq!(main.host().attribute(el, "b"), Some(&Value::Null));
    }

    #[test]
    fn custom_updater_receives_the_element_set() {
        let mut main = tree();
        let view = main.create_instance("view").unwrap();
        main.ensure_elements(view).unwrap();
        main.set_attribute(view, AttrKey::Index(2), json!("x")).unwrap();
        let el = main.element_root(view).unwrap();
        assert_eq!(main.host().attribute(el, "custom"), Some(&json!("x")));
    }

    #[test]
    fn equal_values_do_not_touch_the_host() {
        let mut main = tree();
        let view = main.create_instance("view").unwrap();
        main.ensure_elements(view).unwrap();
        main.set_attribute(view, AttrKey::Index(0), json!("a")).unwrap();
        let el = main.element_root(view).unwrap();
        main.host_mut().set_attribute(el, "class", &json!("native"));
        main.set_attribute(view, AttrKey::Index(0), json!("a")).unwrap();
        assert_eq!(main.host().attribute(el, "class"), Some(&json!("native")));
    }

    #[test]
    fn slots_replace_their_placeholders() {
        let mut main = tree();
        let pair = main.create_instance("pair").unwrap();
        let a = main.create_instance("view").unwrap();
        let b = main.create_instance("view").unwrap();
        main.ensure_elements(pair).unwrap();
        main.append_child(pair, a).unwrap();
        main.append_child(pair, b).unwrap();
        let outer = main.element_root(pair).unwrap();
        let kids = main.host().children(outer).to_vec();
        assert_eq!(kids, vec![main.element_root(a).unwrap(), main.element_root(b).unwrap()]);
        assert_eq!(main.elements(pair).unwrap()[1], main.element_root(a).unwrap());
    }

    #[test]
    fn slots_fill_in_order_when_materialized_late() {
        let mut main = tree();
        let pair = main.create_instance("pair").unwrap();
        let a = main.create_instance("view").unwrap();
        let b = main.create_instance("view").unwrap();
        main.append_child(pair, a).unwrap();
        main.append_child(pair, b).unwrap();
        main.ensure_elements(pair).unwrap();
        let outer = main.element_root(pair).unwrap();
        assert_eq!(
            main.host().children(outer),
            &[main.element_root(a).unwrap(), main.element_root(b).unwrap()]
        );
    }

    #[test]
    fn reordering_moves_the_native_element() {
        let mut main = tree();
        let root = main.create_instance("root").unwrap();
        main.ensure_elements(root).unwrap();
        let a = main.create_instance("view").unwrap();
        let b = main.create_instance("view").unwrap();
        main.append_child(root, a).unwrap();
        main.append_child(root, b).unwrap();
        main.insert_before(root, b, Some(a)).unwrap();
        let page = main.host().page();
        assert_eq!(
            main.host().children(page),
            &[main.element_root(b).unwrap(), main.element_root(a).unwrap()]
        );
        assert_eq!(main.child_nodes(root), vec![b, a]);
    }

    #[test]
    fn removal_frees_the_subtree_and_rejects_strangers() {
        let mut main = tree();
        let root = main.create_instance("root").unwrap();
        main.ensure_elements(root).unwrap();
        let a = main.create_instance("view").unwrap();
        let inner = main.create_instance("view").unwrap();
        main.append_child(a, inner).unwrap();
        main.append_child(root, a).unwrap();
        let stranger = main.create_instance("view").unwrap();
        assert_eq!(
            main.remove_child(root, stranger),
            Err(MainError::InvalidChild {
                parent: root,
                child: stranger
            })
        );
        main.remove_child(root, a).unwrap();
        assert!(!main.contains(a));
        assert!(!main.contains(inner));
        assert!(main.host().children(main.host().page()).is_empty());
    }

    #[test]
    fn style_scope_and_entry_name_reach_the_host() {
        let mut main = tree();
        let scoped = main.create_instance("lazy:scoped").unwrap();
        main.ensure_elements(scoped).unwrap();
        let el = main.element_root(scoped).unwrap();
        assert_eq!(main.host().css_id(el), Some((7, Some("lazy"))));
    }

    #[test]
    fn extra_props_serialize_with_values() {
        let mut main = tree();
        let view = main.create_instance("view").unwrap();
        main.set_values(view, vec![json!("a")]).unwrap();
        main.set_attribute(view, AttrKey::name("title"), json!("t"))
            .unwrap();
        let out = main.serialize(view).unwrap();
        assert_eq!(out.values, Some(vec![json!("a")]));
        assert_eq!(out.extra_props.get("title"), Some(&json!("t")));
    }
}
