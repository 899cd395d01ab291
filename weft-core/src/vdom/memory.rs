//! In-memory [`NodeOps`] backend.
//!
//! Keeps a node table plus a log of every mutating operation, which makes it
//! the natural backend for tests and benchmarks: assertions can look at the
//! resulting tree, at the exact operations issued, or both.

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;

use super::ops::{same_listener, DomRef, Event, EventListener, NodeOps};
use crate::reactive::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element { tag: String, namespace: Option<String> },
    Text(String),
    Comment(String),
}

struct DomNode {
    kind: NodeKind,
    parent: Option<DomRef>,
    children: Vec<DomRef>,
    attrs: IndexMap<String, String>,
    style: IndexMap<String, String>,
    listeners: Vec<(String, EventListener)>,
}

impl DomNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attrs: IndexMap::new(),
            style: IndexMap::new(),
            listeners: Vec::new(),
        }
    }
}

/// A recorded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DomOp {
    CreateElement { node: DomRef, tag: String },
    CreateElementNs { node: DomRef, namespace: String, tag: String },
    CreateText { node: DomRef, text: String },
    CreateComment { node: DomRef, text: String },
    InsertBefore { parent: DomRef, node: DomRef, reference: Option<DomRef> },
    AppendChild { parent: DomRef, node: DomRef },
    RemoveChild { parent: DomRef, node: DomRef },
    SetTextContent { node: DomRef, text: String },
    SetAttribute { node: DomRef, name: String, value: String },
    RemoveAttribute { node: DomRef, name: String },
    SetStyle { node: DomRef, name: String, value: String },
    SetStyleScope { node: DomRef, scope: String },
    AddEventListener { node: DomRef, event: String },
    RemoveEventListener { node: DomRef, event: String },
}

#[derive(Default)]
struct DomState {
    nodes: HashMap<DomRef, DomNode>,
    next_id: u64,
    log: Vec<DomOp>,
}

impl DomState {
    fn alloc(&mut self, kind: NodeKind) -> DomRef {
        self.next_id += 1;
        let id = DomRef::from_raw(self.next_id);
        self.nodes.insert(id, DomNode::new(kind));
        id
    }

    fn detach(&mut self, node: DomRef) {
        let parent = self.nodes.get_mut(&node).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|&child| child != node);
        }
    }

    fn attach(&mut self, parent: DomRef, node: DomRef, reference: Option<DomRef>) {
        self.detach(node);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            let at = reference
                .and_then(|r| parent_node.children.iter().position(|&c| c == r))
                .unwrap_or(parent_node.children.len());
            parent_node.children.insert(at, node);
        }
        if let Some(child) = self.nodes.get_mut(&node) {
            child.parent = Some(parent);
        }
    }
}

/// A DOM living entirely in memory.
#[derive(Default)]
pub struct MemoryDom {
    state: RefCell<DomState>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element without logging it, e.g. a mount target.
    pub fn create_root(&self, tag: &str) -> DomRef {
        self.state.borrow_mut().alloc(NodeKind::Element {
            tag: tag.to_string(),
            namespace: None,
        })
    }

    /// Operations recorded so far.
    pub fn ops(&self) -> Vec<DomOp> {
        self.state.borrow().log.clone()
    }

    /// Drain the operation log.
    pub fn take_ops(&self) -> Vec<DomOp> {
        std::mem::take(&mut self.state.borrow_mut().log)
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().log.clear();
    }

    pub fn node_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    pub fn kind(&self, node: DomRef) -> Option<NodeKind> {
        self.state.borrow().nodes.get(&node).map(|n| n.kind.clone())
    }

    pub fn children(&self, node: DomRef) -> Vec<DomRef> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn attribute(&self, node: DomRef, name: &str) -> Option<String> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .and_then(|n| n.attrs.get(name).cloned())
    }

    pub fn style(&self, node: DomRef, name: &str) -> Option<String> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .and_then(|n| n.style.get(name).cloned())
    }

    pub fn listener_count(&self, node: DomRef, event: &str) -> usize {
        self.state.borrow().nodes.get(&node).map_or(0, |n| {
            n.listeners.iter().filter(|(name, _)| name == event).count()
        })
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self, node: DomRef) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        collect_text(&state, node, &mut out);
        out
    }

    /// Serialize a subtree. Attributes come out in insertion order, styles
    /// as a `style` attribute after them.
    pub fn to_html(&self, node: DomRef) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        write_html(&state, node, &mut out);
        out
    }

    /// Call every listener for `event` on `node`.
    ///
    /// Listeners run after the node table is released, so they may freely
    /// mutate the DOM.
    pub fn dispatch_event(&self, node: DomRef, event: &str, args: Vec<Value>) {
        let listeners: Vec<EventListener> = self
            .state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|(name, _)| name == event)
                    .map(|(_, listener)| listener.clone())
                    .collect()
            })
            .unwrap_or_default();
        let event = Event::new(event, Some(node), args);
        for listener in listeners {
            listener(&event);
        }
    }

    fn record(&self, op: DomOp) {
        tracing::trace!(?op, "dom");
        self.state.borrow_mut().log.push(op);
    }
}

fn collect_text(state: &DomState, node: DomRef, out: &mut String) {
    let Some(n) = state.nodes.get(&node) else {
        return;
    };
    match &n.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Comment(_) => {}
        NodeKind::Element { .. } => {
            for &child in &n.children {
                collect_text(state, child, out);
            }
        }
    }
}

fn write_html(state: &DomState, node: DomRef, out: &mut String) {
    let Some(n) = state.nodes.get(&node) else {
        return;
    };
    match &n.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Element { tag, .. } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in &n.attrs {
                out.push_str(&format!(" {name}=\"{value}\""));
            }
            if !n.style.is_empty() {
                let style: Vec<String> = n.style.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                out.push_str(&format!(" style=\"{}\"", style.join("; ")));
            }
            out.push('>');
            for &child in &n.children {
                write_html(state, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

impl NodeOps for MemoryDom {
    fn create_element(&self, tag: &str) -> DomRef {
        let node = self.state.borrow_mut().alloc(NodeKind::Element {
            tag: tag.to_string(),
            namespace: None,
        });
        self.record(DomOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_element_ns(&self, namespace: &str, tag: &str) -> DomRef {
        let node = self.state.borrow_mut().alloc(NodeKind::Element {
            tag: tag.to_string(),
            namespace: Some(namespace.to_string()),
        });
        self.record(DomOp::CreateElementNs {
            node,
            namespace: namespace.to_string(),
            tag: tag.to_string(),
        });
        node
    }

    fn create_text_node(&self, text: &str) -> DomRef {
        let node = self.state.borrow_mut().alloc(NodeKind::Text(text.to_string()));
        self.record(DomOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn create_comment(&self, text: &str) -> DomRef {
        let node = self
            .state
            .borrow_mut()
            .alloc(NodeKind::Comment(text.to_string()));
        self.record(DomOp::CreateComment {
            node,
            text: text.to_string(),
        });
        node
    }

    fn insert_before(&self, parent: DomRef, node: DomRef, reference: Option<DomRef>) {
        self.state.borrow_mut().attach(parent, node, reference);
        self.record(DomOp::InsertBefore {
            parent,
            node,
            reference,
        });
    }

    fn remove_child(&self, parent: DomRef, node: DomRef) {
        {
            let mut state = self.state.borrow_mut();
            if state.nodes.get(&node).and_then(|n| n.parent) != Some(parent) {
                return;
            }
            state.detach(node);
        }
        self.record(DomOp::RemoveChild { parent, node });
    }

    fn append_child(&self, parent: DomRef, node: DomRef) {
        self.state.borrow_mut().attach(parent, node, None);
        self.record(DomOp::AppendChild { parent, node });
    }

    fn parent_node(&self, node: DomRef) -> Option<DomRef> {
        self.state.borrow().nodes.get(&node).and_then(|n| n.parent)
    }

    fn next_sibling(&self, node: DomRef) -> Option<DomRef> {
        let state = self.state.borrow();
        let parent = state.nodes.get(&node)?.parent?;
        let siblings = &state.nodes.get(&parent)?.children;
        let at = siblings.iter().position(|&c| c == node)?;
        siblings.get(at + 1).copied()
    }

    fn tag_name(&self, node: DomRef) -> String {
        match self.kind(node) {
            Some(NodeKind::Element { tag, .. }) => tag.to_uppercase(),
            _ => String::new(),
        }
    }

    fn set_text_content(&self, node: DomRef, text: &str) {
        {
            let mut state = self.state.borrow_mut();
            let is_element = matches!(
                state.nodes.get(&node).map(|n| &n.kind),
                Some(NodeKind::Element { .. })
            );
            if is_element {
                let old_children = state
                    .nodes
                    .get_mut(&node)
                    .map(|n| std::mem::take(&mut n.children))
                    .unwrap_or_default();
                for child in old_children {
                    if let Some(c) = state.nodes.get_mut(&child) {
                        c.parent = None;
                    }
                }
                if !text.is_empty() {
                    let text_node = state.alloc(NodeKind::Text(text.to_string()));
                    state.attach(node, text_node, None);
                }
            } else if let Some(n) = state.nodes.get_mut(&node) {
                match &mut n.kind {
                    NodeKind::Text(t) | NodeKind::Comment(t) => *t = text.to_string(),
                    NodeKind::Element { .. } => {}
                }
            }
        }
        self.record(DomOp::SetTextContent {
            node,
            text: text.to_string(),
        });
    }

    fn set_style_scope(&self, node: DomRef, scope_id: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.attrs.insert(scope_id.to_string(), String::new());
        }
        self.record(DomOp::SetStyleScope {
            node,
            scope: scope_id.to_string(),
        });
    }

    fn set_attribute(&self, node: DomRef, name: &str, value: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.attrs.insert(name.to_string(), value.to_string());
        }
        self.record(DomOp::SetAttribute {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_attribute(&self, node: DomRef, name: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.attrs.shift_remove(name);
        }
        self.record(DomOp::RemoveAttribute {
            node,
            name: name.to_string(),
        });
    }

    fn set_style_property(&self, node: DomRef, name: &str, value: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            if value.is_empty() {
                n.style.shift_remove(name);
            } else {
                n.style.insert(name.to_string(), value.to_string());
            }
        }
        self.record(DomOp::SetStyle {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn add_event_listener(&self, node: DomRef, event: &str, listener: EventListener) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.listeners.push((event.to_string(), listener));
        }
        self.record(DomOp::AddEventListener {
            node,
            event: event.to_string(),
        });
    }

    fn remove_event_listener(&self, node: DomRef, event: &str, listener: &EventListener) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.listeners
                .retain(|(name, l)| !(name == event && same_listener(l, listener)));
        }
        self.record(DomOp::RemoveEventListener {
            node,
            event: event.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn insert_before_moves_nodes() {
        let dom = MemoryDom::new();
        let root = dom.create_root("div");
        let a = dom.create_text_node("a");
        let b = dom.create_text_node("b");
        dom.append_child(root, a);
        dom.append_child(root, b);

        dom.insert_before(root, b, Some(a));
        assert_eq!(dom.children(root), vec![b, a]);
        assert_eq!(dom.next_sibling(b), Some(a));
        assert_eq!(dom.next_sibling(a), None);
        assert_eq!(dom.text_content(root), "ba");
    }

    #[test]
    fn set_text_content_replaces_children() {
        let dom = MemoryDom::new();
        let root = dom.create_root("p");
        let span = dom.create_element("span");
        dom.append_child(root, span);
        dom.set_text_content(root, "hi");

        assert_eq!(dom.to_html(root), "<p>hi</p>");
        assert_eq!(dom.parent_node(span), None);
    }

    #[test]
    fn serializes_attrs_and_style() {
        let dom = MemoryDom::new();
        let root = dom.create_root("a");
        dom.set_attribute(root, "href", "/x");
        dom.set_style_property(root, "color", "red");
        let note = dom.create_comment("c");
        dom.append_child(root, note);

        assert_eq!(dom.to_html(root), "<a href=\"/x\" style=\"color: red\"><!--c--></a>");
        assert_eq!(dom.tag_name(root), "A");
    }

    #[test]
    fn listeners_can_be_removed_by_identity() {
        let dom = MemoryDom::new();
        let root = dom.create_root("button");
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let listener: EventListener = Rc::new(move |_: &Event| counter.set(counter.get() + 1));

        dom.add_event_listener(root, "click", listener.clone());
        dom.dispatch_event(root, "click", vec![]);
        dom.remove_event_listener(root, "click", &listener);
        dom.dispatch_event(root, "click", vec![]);

        assert_eq!(hits.get(), 1);
        assert_eq!(dom.listener_count(root, "click"), 0);
    }

    #[test]
    fn log_can_be_drained() {
        let dom = MemoryDom::new();
        let root = dom.create_root("div");
        assert!(dom.ops().is_empty());

        let text = dom.create_text_node("x");
        dom.append_child(root, text);
        assert_eq!(dom.take_ops().len(), 2);
        assert!(dom.ops().is_empty());
    }
}
