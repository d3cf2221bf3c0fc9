//! Native element primitives.
//!
//! The reconciliation core never owns real native elements; it drives them
//! through [`ElementHost`]. [`ElementTree`] is an in-memory host used by the
//! demo binary and the tests.
//!
//! Contract:
//! - Element ids are unique for the lifetime of a host and never reused.
//! - Inserting or appending an element that already has a parent moves it.
//! - `insert_element_before` with `before == None` appends.
//! - `replace_element` puts `new` at `old`'s position and detaches `old`.

mod element_tree;

pub use core_types::{ElementId, FlushOptions};
pub use element_tree::{ElementTree, FlushRecord};
pub use serde_json::Value;

pub trait ElementHost {
    /// The page element the `root` template binds to.
    fn page(&self) -> ElementId;

    fn create_element(&mut self, tag: &str) -> ElementId;
    fn create_raw_text(&mut self, text: &str) -> ElementId;
    fn create_wrapper(&mut self) -> ElementId;
    fn create_list(&mut self) -> ElementId;

    fn tag(&self, element: ElementId) -> Option<&str>;

    fn append_element(&mut self, parent: ElementId, child: ElementId);
    fn insert_element_before(
        &mut self,
        parent: ElementId,
        child: ElementId,
        before: Option<ElementId>,
    );
    fn remove_element(&mut self, parent: ElementId, child: ElementId);
    fn replace_element(&mut self, new: ElementId, old: ElementId);

    fn set_attribute(&mut self, element: ElementId, name: &str, value: &Value);
    fn set_css_id(&mut self, elements: &[ElementId], css_id: u32, entry_name: Option<&str>);

    fn flush_element_tree(&mut self, element: ElementId, options: FlushOptions);
}

/// Tag the host reports for wrapper elements created by `create_wrapper`.
pub const WRAPPER_TAG: &str = "wrapper";
/// Tag the host reports for list containers.
pub const LIST_TAG: &str = "list";
/// Tag the host reports for raw text elements.
pub const RAW_TEXT_TAG: &str = "raw-text";
/// Tag of the page element.
pub const PAGE_TAG: &str = "page";
