//! Platform Node Operations
//!
//! The patch engine never touches a real DOM. Everything it does goes
//! through a [`NodeOps`] implementation, which owns the actual nodes and
//! hands out opaque [`DomRef`] handles for them.

use std::fmt;
use std::rc::Rc;

use crate::reactive::Value;

/// Opaque handle to a platform node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomRef(u64);

impl DomRef {
    /// Wrap a backend-assigned id.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DomRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// An event delivered to a DOM listener or emitted by a component.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,

    /// The node the event was dispatched on. `None` for component events.
    pub target: Option<DomRef>,

    /// Payload: the event detail for DOM events, the emitted arguments for
    /// component events.
    pub args: Vec<Value>,
}

impl Event {
    pub fn new(name: impl Into<String>, target: Option<DomRef>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            target,
            args,
        }
    }
}

/// A listener registered on a platform node.
pub type EventListener = Rc<dyn Fn(&Event)>;

/// Compare two listeners by identity.
pub fn same_listener(a: &EventListener, b: &EventListener) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// Primitive node operations required by the patch engine and the built-in
/// modules.
pub trait NodeOps {
    fn create_element(&self, tag: &str) -> DomRef;

    fn create_element_ns(&self, namespace: &str, tag: &str) -> DomRef;

    fn create_text_node(&self, text: &str) -> DomRef;

    fn create_comment(&self, text: &str) -> DomRef;

    /// Insert `node` before `reference` (or append when `reference` is
    /// `None`). A node that already has a parent is moved.
    fn insert_before(&self, parent: DomRef, node: DomRef, reference: Option<DomRef>);

    fn remove_child(&self, parent: DomRef, node: DomRef);

    fn append_child(&self, parent: DomRef, node: DomRef);

    fn parent_node(&self, node: DomRef) -> Option<DomRef>;

    fn next_sibling(&self, node: DomRef) -> Option<DomRef>;

    /// Upper-case tag name, like the DOM's `tagName`.
    fn tag_name(&self, node: DomRef) -> String;

    fn set_text_content(&self, node: DomRef, text: &str);

    /// Mark a node with a scoped-style attribute.
    fn set_style_scope(&self, node: DomRef, scope_id: &str);

    fn set_attribute(&self, node: DomRef, name: &str, value: &str);

    fn remove_attribute(&self, node: DomRef, name: &str);

    /// Set an inline style property. An empty value removes it.
    fn set_style_property(&self, node: DomRef, name: &str, value: &str);

    fn add_event_listener(&self, node: DomRef, event: &str, listener: EventListener);

    fn remove_event_listener(&self, node: DomRef, event: &str, listener: &EventListener);
}
