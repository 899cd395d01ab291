//! Virtual Nodes
//!
//! A [`VNode`] describes one node of a rendered tree: an element, a text
//! node, a comment, or a placeholder standing in for a child component. A
//! fresh tree is produced by every render; the previous one is kept only as
//! the baseline for the next diff.
//!
//! Nodes are shared handles. The patch engine compares them by reference
//! (an unchanged subtree is the *same* node) and records the bound platform
//! node, the namespace and the mounted component instance on the node
//! itself, so those fields use interior mutability. Child lists are shared
//! too: two nodes holding the same [`Children`] are known to have identical
//! children without looking at them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::ops::{DomRef, Event};
use super::patch::RemoveCallback;
use crate::component::{AsyncFactory, Component, ComponentDef, WeakComponent};
use crate::error::{warn, Result};
use crate::reactive::{untracked, Value};

/// Identity of a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    /// Bit pattern of the numeric key.
    Num(u64),
    Bool(bool),
}

impl Key {
    /// Convert a primitive value into a key. `Null` means "no key";
    /// containers cannot be keys.
    pub fn from_value(value: &Value) -> std::result::Result<Option<Key>, ()> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(Key::Bool(*b))),
            Value::Number(n) => Ok(Some(Key::from(*n))),
            Value::String(s) => Ok(Some(Key::Str(s.clone()))),
            Value::Object(_) | Value::Array(_) => Err(()),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s.into())
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        // -0 and 0 are the same key.
        let n = if n == 0.0 { 0.0 } else { n };
        Key::Num(n.to_bits())
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::from(f64::from(n))
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Key::from(n as f64)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{s}"),
            Key::Num(bits) => write!(f, "{}", Value::Number(f64::from_bits(*bits)).to_display_string()),
            Key::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Event handler attached through node data or component listeners.
pub type EventHandler = Rc<dyn Fn(&Event) -> Result<()>>;

/// Handlers bound to one event name.
pub type Handlers = SmallVec<[EventHandler; 1]>;

/// Hook receiving one node.
pub type NodeHook = Rc<dyn Fn(&VNode)>;

/// Hook receiving the old and the new node.
pub type PatchHook = Rc<dyn Fn(&VNode, &VNode)>;

/// Hook that delays removal until the callback is invoked.
pub type RemoveHook = Rc<dyn Fn(&VNode, RemoveCallback)>;

/// Per-node lifecycle hooks.
#[derive(Clone, Default)]
pub struct VNodeHooks {
    pub init: Option<NodeHook>,
    pub create: Option<NodeHook>,
    pub insert: Option<NodeHook>,
    pub prepatch: Option<PatchHook>,
    pub update: Option<PatchHook>,
    pub postpatch: Option<PatchHook>,
    pub remove: Option<RemoveHook>,
    pub destroy: Option<NodeHook>,
}

/// The data bag of a node.
#[derive(Clone, Default)]
pub struct VNodeData {
    pub key: Option<Key>,
    pub attrs: IndexMap<String, Value>,
    /// Bindings for component props.
    pub props: IndexMap<String, Value>,
    pub class: SmallVec<[String; 4]>,
    pub style: IndexMap<String, String>,
    pub on: IndexMap<String, Handlers>,
    pub hooks: VNodeHooks,
}

impl VNodeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Add one or more whitespace-separated classes.
    pub fn class(mut self, class: &str) -> Self {
        self.class
            .extend(class.split_whitespace().map(str::to_string));
        self
    }

    pub fn style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.style.insert(name.into(), value.into());
        self
    }

    pub fn on(
        mut self,
        event: impl Into<String>,
        handler: impl Fn(&Event) -> Result<()> + 'static,
    ) -> Self {
        self.on
            .entry(event.into())
            .or_default()
            .push(Rc::new(handler));
        self
    }

    pub fn hooks(mut self, hooks: VNodeHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Build node data from a plain value of the shape
    /// `{ key, attrs: {..}, props: {..}, class, style: {..} }`.
    ///
    /// `class` may be a string, an array of strings, or an object mapping
    /// class names to booleans. A non-primitive `key` is dropped with a
    /// warning.
    pub fn from_value(value: &Value) -> Self {
        untracked(|| {
            let mut data = VNodeData::default();
            let Some(object) = value.as_object() else {
                return data;
            };

            if let Some(key) = object.get("key") {
                match Key::from_value(&key) {
                    Ok(key) => data.key = key,
                    Err(()) => warn(
                        "Avoid using non-primitive value as key, use string/number value instead.",
                        None,
                    ),
                }
            }
            if let Some(Value::Object(attrs)) = object.get("attrs") {
                for name in attrs.keys() {
                    data.attrs.insert(name.clone(), attrs.get(&name).unwrap_or_default());
                }
            }
            if let Some(Value::Object(props)) = object.get("props") {
                for name in props.keys() {
                    data.props.insert(name.clone(), props.get(&name).unwrap_or_default());
                }
            }
            if let Some(class) = object.get("class") {
                push_classes(&mut data.class, &class);
            }
            if let Some(Value::Object(style)) = object.get("style") {
                for name in style.keys() {
                    let value = style.get(&name).unwrap_or_default();
                    data.style.insert(name, value.to_display_string());
                }
            }
            data
        })
    }
}

fn push_classes(out: &mut SmallVec<[String; 4]>, class: &Value) {
    match class {
        Value::String(s) => out.extend(s.split_whitespace().map(str::to_string)),
        Value::Array(items) => {
            for item in items.to_vec() {
                push_classes(out, &item);
            }
        }
        Value::Object(map) => {
            for name in map.keys() {
                let enabled = map.get(&name).is_some_and(|v| match v {
                    Value::Null => false,
                    Value::Bool(b) => b,
                    Value::Number(n) => n != 0.0 && !n.is_nan(),
                    Value::String(s) => !s.is_empty(),
                    _ => true,
                });
                if enabled {
                    out.push(name);
                }
            }
        }
        _ => {}
    }
}

/// Component association of a placeholder node.
#[derive(Clone)]
pub struct ComponentVNodeOptions {
    pub def: ComponentDef,
    /// Values for the component's declared props.
    pub props_data: IndexMap<String, Value>,
    /// Handlers for events the component emits.
    pub listeners: IndexMap<String, Handlers>,
    /// Child nodes passed to the component.
    pub children: Vec<VNode>,
    pub tag: String,
}

/// A shared, ordered child list.
#[derive(Clone, Default)]
pub struct Children(Rc<RefCell<Vec<VNode>>>);

impl Children {
    pub fn new(nodes: Vec<VNode>) -> Self {
        Self(Rc::new(RefCell::new(nodes)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<VNode> {
        self.0.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<VNode> {
        self.0.borrow().clone()
    }

    /// Check whether two lists are the same list.
    pub fn ptr_eq(&self, other: &Children) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Replace the entry at `index` (used when a reused node is cloned
    /// before being mounted again).
    pub(crate) fn replace(&self, index: usize, node: VNode) {
        if let Some(slot) = self.0.borrow_mut().get_mut(index) {
            *slot = node;
        }
    }
}

impl From<Vec<VNode>> for Children {
    fn from(nodes: Vec<VNode>) -> Self {
        Children::new(nodes)
    }
}

pub(crate) struct VNodeInner {
    tag: Option<Rc<str>>,
    data: Option<VNodeData>,
    children: Option<Children>,
    text: Option<Rc<str>>,
    key: Option<Key>,
    is_comment: bool,
    is_cloned: bool,
    component_options: Option<ComponentVNodeOptions>,
    async_factory: Option<AsyncFactory>,

    elm: Cell<Option<DomRef>>,
    ns: RefCell<Option<Rc<str>>>,
    context: RefCell<Option<WeakComponent>>,
    component_instance: RefCell<Option<Component>>,
    parent: RefCell<Weak<VNodeInner>>,
    pending_insert: RefCell<Option<Vec<VNode>>>,
    is_static: Cell<bool>,
    is_once: Cell<bool>,
    is_root_insert: Cell<bool>,
    is_async_placeholder: Cell<bool>,
    keep_alive: Cell<bool>,
}

/// Shared handle to a virtual node.
#[derive(Clone)]
pub struct VNode(pub(crate) Rc<VNodeInner>);

struct Parts {
    tag: Option<Rc<str>>,
    data: Option<VNodeData>,
    children: Option<Children>,
    text: Option<Rc<str>>,
    is_comment: bool,
    component_options: Option<ComponentVNodeOptions>,
    async_factory: Option<AsyncFactory>,
    context: Option<WeakComponent>,
}

impl Parts {
    fn empty() -> Self {
        Self {
            tag: None,
            data: None,
            children: None,
            text: None,
            is_comment: false,
            component_options: None,
            async_factory: None,
            context: None,
        }
    }
}

impl VNode {
    fn build(parts: Parts) -> VNode {
        let key = parts.data.as_ref().and_then(|data| data.key.clone());
        VNode(Rc::new(VNodeInner {
            tag: parts.tag,
            data: parts.data,
            children: parts.children,
            text: parts.text,
            key,
            is_comment: parts.is_comment,
            is_cloned: false,
            component_options: parts.component_options,
            async_factory: parts.async_factory,
            elm: Cell::new(None),
            ns: RefCell::new(None),
            context: RefCell::new(parts.context),
            component_instance: RefCell::new(None),
            parent: RefCell::new(Weak::new()),
            pending_insert: RefCell::new(None),
            is_static: Cell::new(false),
            is_once: Cell::new(false),
            is_root_insert: Cell::new(true),
            is_async_placeholder: Cell::new(false),
            keep_alive: Cell::new(false),
        }))
    }

    /// An element node. No tag classification happens here; see
    /// [`create_element`](super::create_element) for that.
    pub fn element(
        tag: impl Into<Rc<str>>,
        data: Option<VNodeData>,
        children: Option<Children>,
    ) -> VNode {
        Self::build(Parts {
            tag: Some(tag.into()),
            data,
            children,
            ..Parts::empty()
        })
    }

    pub fn text(text: impl Into<Rc<str>>) -> VNode {
        Self::build(Parts {
            text: Some(text.into()),
            ..Parts::empty()
        })
    }

    pub fn comment(text: impl Into<Rc<str>>) -> VNode {
        Self::build(Parts {
            text: Some(text.into()),
            is_comment: true,
            ..Parts::empty()
        })
    }

    /// The node rendered in place of nothing.
    pub fn empty() -> VNode {
        Self::comment("")
    }

    pub(crate) fn with_context(self, context: Option<WeakComponent>) -> VNode {
        *self.0.context.borrow_mut() = context;
        self
    }

    pub(crate) fn component_placeholder(
        tag: String,
        data: VNodeData,
        context: Option<WeakComponent>,
        options: ComponentVNodeOptions,
        async_factory: Option<AsyncFactory>,
    ) -> VNode {
        Self::build(Parts {
            tag: Some(tag.into()),
            data: Some(data),
            component_options: Some(options),
            async_factory,
            context,
            ..Parts::empty()
        })
    }

    pub(crate) fn async_placeholder(
        factory: AsyncFactory,
        data: Option<VNodeData>,
        context: Option<WeakComponent>,
    ) -> VNode {
        let node = Self::build(Parts {
            text: Some("".into()),
            is_comment: true,
            data,
            async_factory: Some(factory),
            context,
            ..Parts::empty()
        });
        node.0.is_async_placeholder.set(true);
        node
    }

    /// Shallow copy with an independent child list.
    ///
    /// The copy keeps the bound platform node but not the component
    /// instance, and is flagged as cloned.
    pub fn clone_node(&self) -> VNode {
        let inner = &self.0;
        VNode(Rc::new(VNodeInner {
            tag: inner.tag.clone(),
            data: inner.data.clone(),
            children: inner.children.as_ref().map(|c| Children::new(c.to_vec())),
            text: inner.text.clone(),
            key: inner.key.clone(),
            is_comment: inner.is_comment,
            is_cloned: true,
            component_options: inner.component_options.clone(),
            async_factory: inner.async_factory.clone(),
            elm: Cell::new(inner.elm.get()),
            ns: RefCell::new(inner.ns.borrow().clone()),
            context: RefCell::new(inner.context.borrow().clone()),
            component_instance: RefCell::new(None),
            parent: RefCell::new(Weak::new()),
            pending_insert: RefCell::new(None),
            is_static: Cell::new(inner.is_static.get()),
            is_once: Cell::new(inner.is_once.get()),
            is_root_insert: Cell::new(true),
            is_async_placeholder: Cell::new(inner.is_async_placeholder.get()),
            keep_alive: Cell::new(inner.keep_alive.get()),
        }))
    }

    /// Check whether two handles are the same node.
    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn tag(&self) -> Option<&str> {
        self.0.tag.as_deref()
    }

    pub fn data(&self) -> Option<&VNodeData> {
        self.0.data.as_ref()
    }

    pub fn children(&self) -> Option<&Children> {
        self.0.children.as_ref()
    }

    pub fn text_content(&self) -> Option<&str> {
        self.0.text.as_deref()
    }

    pub fn key(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }

    pub fn is_comment(&self) -> bool {
        self.0.is_comment
    }

    pub fn is_cloned(&self) -> bool {
        self.0.is_cloned
    }

    pub fn component_options(&self) -> Option<&ComponentVNodeOptions> {
        self.0.component_options.as_ref()
    }

    pub fn async_factory(&self) -> Option<&AsyncFactory> {
        self.0.async_factory.as_ref()
    }

    /// The bound platform node.
    pub fn elm(&self) -> Option<DomRef> {
        self.0.elm.get()
    }

    pub(crate) fn set_elm(&self, elm: Option<DomRef>) {
        self.0.elm.set(elm);
    }

    pub fn ns(&self) -> Option<Rc<str>> {
        self.0.ns.borrow().clone()
    }

    pub(crate) fn set_ns(&self, ns: Option<Rc<str>>) {
        *self.0.ns.borrow_mut() = ns;
    }

    /// The component whose render produced this node.
    pub fn context(&self) -> Option<Component> {
        self.0.context.borrow().as_ref().and_then(WeakComponent::upgrade)
    }

    pub(crate) fn weak_context(&self) -> Option<WeakComponent> {
        self.0.context.borrow().clone()
    }

    /// The component mounted on this placeholder.
    pub fn component_instance(&self) -> Option<Component> {
        self.0.component_instance.borrow().clone()
    }

    pub(crate) fn set_component_instance(&self, instance: Option<Component>) {
        *self.0.component_instance.borrow_mut() = instance;
    }

    /// The placeholder node of the component this node is the root of.
    pub fn parent(&self) -> Option<VNode> {
        self.0.parent.borrow().upgrade().map(VNode)
    }

    pub(crate) fn set_parent(&self, parent: Option<&VNode>) {
        *self.0.parent.borrow_mut() = parent.map_or_else(Weak::new, |p| Rc::downgrade(&p.0));
    }

    pub(crate) fn downgrade(&self) -> Weak<VNodeInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<VNodeInner>) -> Option<VNode> {
        weak.upgrade().map(VNode)
    }

    pub(crate) fn set_pending_insert(&self, queue: Vec<VNode>) {
        *self.0.pending_insert.borrow_mut() = Some(queue);
    }

    pub(crate) fn take_pending_insert(&self) -> Option<Vec<VNode>> {
        self.0.pending_insert.borrow_mut().take()
    }

    pub fn is_static(&self) -> bool {
        self.0.is_static.get()
    }

    /// Mark a subtree that can never change between renders.
    pub fn mark_static(&self) -> &Self {
        self.0.is_static.set(true);
        self
    }

    pub fn is_once(&self) -> bool {
        self.0.is_once.get()
    }

    /// Mark a subtree rendered only once.
    pub fn mark_once(&self) -> &Self {
        self.0.is_once.set(true);
        self
    }

    pub fn is_root_insert(&self) -> bool {
        self.0.is_root_insert.get()
    }

    pub(crate) fn set_root_insert(&self, value: bool) {
        self.0.is_root_insert.set(value);
    }

    pub fn is_async_placeholder(&self) -> bool {
        self.0.is_async_placeholder.get()
    }

    pub(crate) fn set_async_placeholder(&self, value: bool) {
        self.0.is_async_placeholder.set(value);
    }

    pub fn is_keep_alive(&self) -> bool {
        self.0.keep_alive.get()
    }

    pub(crate) fn set_keep_alive(&self, value: bool) {
        self.0.keep_alive.set(value);
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0.tag, &self.0.text) {
            (Some(tag), _) => {
                let mut s = f.debug_struct("VNode");
                s.field("tag", tag);
                if let Some(key) = &self.0.key {
                    s.field("key", key);
                }
                if let Some(children) = &self.0.children {
                    s.field("children", &children.to_vec());
                }
                s.finish()
            }
            (None, Some(text)) if self.0.is_comment => write!(f, "<!--{text}-->"),
            (None, Some(text)) => write!(f, "{text:?}"),
            (None, None) => write!(f, "VNode(empty)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_keys_normalise_zero() {
        assert_eq!(Key::from(0.0), Key::from(-0.0));
        assert_ne!(Key::from(1), Key::from("1"));
        assert_eq!(Key::from(3).to_string(), "3");
    }

    #[test]
    fn containers_are_not_keys() {
        assert!(Key::from_value(&Value::from_json(json!({}))).is_err());
        assert_eq!(Key::from_value(&Value::Null), Ok(None));
    }

    #[test]
    fn clone_node_copies_children_independently() {
        let original = VNode::element(
            "ul",
            Some(VNodeData::new().key("list")),
            Some(vec![VNode::text("a")].into()),
        );
        original.set_elm(Some(DomRef::from_raw(7)));
        original.mark_static();

        let clone = original.clone_node();
        clone
            .children()
            .unwrap()
            .replace(0, VNode::text("b"));

        assert!(clone.is_cloned());
        assert!(clone.is_static());
        assert_eq!(clone.key(), original.key());
        assert_eq!(clone.elm(), original.elm());
        assert!(!clone.children().unwrap().ptr_eq(original.children().unwrap()));
        assert_eq!(
            original.children().unwrap().get(0).unwrap().text_content(),
            Some("a")
        );
    }

    #[test]
    fn data_from_value_reads_known_fields() {
        let value = Value::from_json(json!({
            "key": "row-1",
            "attrs": { "id": "x" },
            "class": ["a", { "b": true, "c": false }, "d e"],
            "style": { "color": "red" }
        }));
        let data = VNodeData::from_value(&value);

        assert_eq!(data.key, Some(Key::from("row-1")));
        assert_eq!(data.attrs.get("id").and_then(|v| v.as_str()), Some("x"));
        assert_eq!(data.class.as_slice(), ["a", "b", "d", "e"]);
        assert_eq!(data.style.get("color").map(String::as_str), Some("red"));
    }

    #[test]
    fn parent_links_are_weak() {
        let child = VNode::element("div", None, None);
        {
            let placeholder = VNode::element("x", None, None);
            child.set_parent(Some(&placeholder));
            assert!(child.parent().is_some());
        }
        assert!(child.parent().is_none());
    }
}
