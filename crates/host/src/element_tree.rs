use crate::{ElementHost, LIST_TAG, PAGE_TAG, RAW_TEXT_TAG, WRAPPER_TAG};
use core_types::{ElementId, FlushOptions};
use serde_json::Value;
use std::fmt::Write;
use std::sync::Arc;

/// One call to [`ElementHost::flush_element_tree`], kept for inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct FlushRecord {
    pub element: ElementId,
    pub options: FlushOptions,
}

#[derive(Clone, Debug)]
struct ElementRecord {
    tag: Arc<str>,
    attributes: Vec<(Arc<str>, Value)>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    css: Option<(u32, Option<Arc<str>>)>,
}

/// In-memory element host.
///
/// Elements live in a dense vector indexed by `id - 1`; nothing is ever
/// freed, so stale ids stay inspectable after removal.
#[derive(Clone, Debug)]
pub struct ElementTree {
    nodes: Vec<ElementRecord>,
    page: ElementId,
    flushes: Vec<FlushRecord>,
}

impl ElementTree {
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            page: ElementId(0),
            flushes: Vec::new(),
        };
        tree.page = tree.alloc(PAGE_TAG);
        tree
    }

    fn alloc(&mut self, tag: &str) -> ElementId {
        self.nodes.push(ElementRecord {
            tag: Arc::from(tag),
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
            css: None,
        });
        ElementId(self.nodes.len() as u32)
    }

    fn record(&self, id: ElementId) -> Option<&ElementRecord> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.nodes.get(index))
    }

    fn record_mut(&mut self, id: ElementId) -> Option<&mut ElementRecord> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.nodes.get_mut(index))
    }

    fn detach(&mut self, child: ElementId) {
        let Some(parent) = self.record(child).and_then(|r| r.parent) else {
            return;
        };
        if let Some(record) = self.record_mut(parent) {
            record.children.retain(|c| *c != child);
        }
        if let Some(record) = self.record_mut(child) {
            record.parent = None;
        }
    }

    fn link_at(&mut self, parent: ElementId, child: ElementId, index: Option<usize>) {
        if parent == child || self.is_ancestor(child, parent) {
            log::warn!(target: "host", "refusing to create element cycle {child} -> {parent}");
            return;
        }
        self.detach(child);
        let Some(record) = self.record_mut(parent) else {
            log::warn!(target: "host", "unknown parent element {parent}");
            return;
        };
        match index {
            Some(index) if index <= record.children.len() => record.children.insert(index, child),
            _ => record.children.push(child),
        }
        if let Some(record) = self.record_mut(child) {
            record.parent = Some(parent);
        }
    }

    fn is_ancestor(&self, ancestor: ElementId, node: ElementId) -> bool {
        let mut current = self.record(node).and_then(|r| r.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.record(id).and_then(|r| r.parent);
        }
        false
    }

    pub fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.record(element).and_then(|r| r.parent)
    }

    pub fn children(&self, element: ElementId) -> &[ElementId] {
        self.record(element)
            .map(|r| r.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn attribute(&self, element: ElementId, name: &str) -> Option<&Value> {
        self.record(element).and_then(|r| {
            r.attributes
                .iter()
                .find(|(key, _)| key.as_ref() == name)
                .map(|(_, value)| value)
        })
    }

    pub fn css_id(&self, element: ElementId) -> Option<(u32, Option<&str>)> {
        self.record(element)
            .and_then(|r| r.css.as_ref())
            .map(|(id, entry)| (*id, entry.as_deref()))
    }

    pub fn flushes(&self) -> &[FlushRecord] {
        &self.flushes
    }

    pub fn take_flushes(&mut self) -> Vec<FlushRecord> {
        std::mem::take(&mut self.flushes)
    }

    pub fn element_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deterministic indented markup of the subtree rooted at `element`.
    ///
    /// Attribute values are rendered as JSON except for plain strings.
    pub fn render(&self, element: ElementId) -> String {
        let mut out = String::new();
        self.render_into(element, 0, &mut out);
        out
    }

    fn render_into(&self, element: ElementId, depth: usize, out: &mut String) {
        let Some(record) = self.record(element) else {
            return;
        };
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{indent}<{}", record.tag);
        for (name, value) in &record.attributes {
            match value {
                Value::String(s) => {
                    let _ = write!(out, " {name}=\"{s}\"");
                }
                other => {
                    let _ = write!(out, " {name}={other}");
                }
            }
        }
        if record.children.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push_str(">\n");
        for child in &record.children {
            self.render_into(*child, depth + 1, out);
        }
        let _ = writeln!(out, "{indent}</{}>", record.tag);
    }
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementHost for ElementTree {
    fn page(&self) -> ElementId {
        self.page
    }

    fn create_element(&mut self, tag: &str) -> ElementId {
        self.alloc(tag)
    }

    fn create_raw_text(&mut self, text: &str) -> ElementId {
        let id = self.alloc(RAW_TEXT_TAG);
        self.set_attribute(id, "text", &Value::String(text.to_string()));
        id
    }

    fn create_wrapper(&mut self) -> ElementId {
        self.alloc(WRAPPER_TAG)
    }

    fn create_list(&mut self) -> ElementId {
        self.alloc(LIST_TAG)
    }

    fn tag(&self, element: ElementId) -> Option<&str> {
        self.record(element).map(|r| r.tag.as_ref())
    }

    fn append_element(&mut self, parent: ElementId, child: ElementId) {
        self.link_at(parent, child, None);
    }

    fn insert_element_before(
        &mut self,
        parent: ElementId,
        child: ElementId,
        before: Option<ElementId>,
    ) {
        let Some(before) = before else {
            self.link_at(parent, child, None);
            return;
        };
        if before == child {
            return;
        }
        self.detach(child);
        let index = self.children(parent).iter().position(|c| *c == before);
        if index.is_none() {
            log::warn!(target: "host", "element {before} is not a child of {parent}; appending");
        }
        self.link_at(parent, child, index);
    }

    fn remove_element(&mut self, parent: ElementId, child: ElementId) {
        if self.parent(child) != Some(parent) {
            log::warn!(target: "host", "element {child} is not a child of {parent}");
            return;
        }
        self.detach(child);
    }

    fn replace_element(&mut self, new: ElementId, old: ElementId) {
        if new == old {
            return;
        }
        let Some(parent) = self.parent(old) else {
            log::warn!(target: "host", "cannot replace detached element {old}");
            return;
        };
        self.detach(new);
        let index = self.children(parent).iter().position(|c| *c == old);
        self.detach(old);
        self.link_at(parent, new, index);
    }

    fn set_attribute(&mut self, element: ElementId, name: &str, value: &Value) {
        let Some(record) = self.record_mut(element) else {
            log::warn!(target: "host", "set_attribute on unknown element {element}");
            return;
        };
        match record
            .attributes
            .iter_mut()
            .find(|(key, _)| key.as_ref() == name)
        {
            Some((_, slot)) => *slot = value.clone(),
            None => record.attributes.push((Arc::from(name), value.clone())),
        }
    }

    fn set_css_id(&mut self, elements: &[ElementId], css_id: u32, entry_name: Option<&str>) {
        for element in elements {
            if let Some(record) = self.record_mut(*element) {
                record.css = Some((css_id, entry_name.map(Arc::from)));
            }
        }
    }

    fn flush_element_tree(&mut self, element: ElementId, options: FlushOptions) {
        log::trace!(target: "host", "flush {element} {options:?}");
        self.flushes.push(FlushRecord { element, options });
    }
}
