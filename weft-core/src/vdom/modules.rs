//! Patch Modules
//!
//! Modules apply one aspect of node data (attributes, classes, styles,
//! listeners) to platform nodes. The patcher calls every module at each
//! lifecycle point of an element; a module only issues operations for what
//! actually changed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use super::node::{Handlers, VNode};
use super::ops::{DomRef, Event, EventListener, NodeOps};
use super::patch::RemoveCallback;
use crate::error::invoke_with_error_handling;
use crate::reactive::Value;

/// Lifecycle callbacks of a patch module. All default to doing nothing.
pub trait Module {
    /// An element was created. `old` is the shared empty node.
    fn create(&self, _ops: &dyn NodeOps, _old: &VNode, _vnode: &VNode) {}

    /// A kept-alive component's root was re-inserted.
    fn activate(&self, _ops: &dyn NodeOps, _old: &VNode, _vnode: &VNode) {}

    fn update(&self, _ops: &dyn NodeOps, _old: &VNode, _vnode: &VNode) {}

    /// The element is about to be removed. Removal waits until `rm` is
    /// called.
    fn remove(&self, _ops: &dyn NodeOps, _vnode: &VNode, rm: RemoveCallback) {
        rm.call();
    }

    fn destroy(&self, _ops: &dyn NodeOps, _vnode: &VNode) {}
}

/// The modules a default [`Patcher`](super::Patcher) runs.
pub fn default_modules() -> Vec<Rc<dyn Module>> {
    vec![
        Rc::new(AttrsModule),
        Rc::new(ClassModule::default()),
        Rc::new(StyleModule::default()),
        Rc::new(EventsModule::default()),
    ]
}

/// Attributes: `null`/`false` removes, `true` sets the attribute to its own
/// name, anything else is stringified.
pub struct AttrsModule;

impl AttrsModule {
    fn apply(&self, ops: &dyn NodeOps, old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let empty = IndexMap::new();
        let old_attrs = old.data().map_or(&empty, |d| &d.attrs);
        let attrs = vnode.data().map_or(&empty, |d| &d.attrs);
        if old_attrs.is_empty() && attrs.is_empty() {
            return;
        }

        for (name, value) in attrs {
            if old_attrs.get(name).is_some_and(|old| old.same_value(value)) {
                continue;
            }
            match value {
                Value::Null | Value::Bool(false) => ops.remove_attribute(elm, name),
                Value::Bool(true) => ops.set_attribute(elm, name, name),
                other => ops.set_attribute(elm, name, &other.to_display_string()),
            }
        }
        for name in old_attrs.keys() {
            if !attrs.contains_key(name) {
                ops.remove_attribute(elm, name);
            }
        }
    }
}

impl Module for AttrsModule {
    fn create(&self, ops: &dyn NodeOps, old: &VNode, vnode: &VNode) {
        self.apply(ops, old, vnode);
    }

    fn update(&self, ops: &dyn NodeOps, old: &VNode, vnode: &VNode) {
        self.apply(ops, old, vnode);
    }
}

/// The `class` attribute, merged across a component's placeholder and its
/// root element.
#[derive(Default)]
pub struct ClassModule {
    applied: RefCell<HashMap<DomRef, String>>,
}

impl ClassModule {
    fn apply(&self, ops: &dyn NodeOps, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let class = class_for_vnode(vnode);
        let mut applied = self.applied.borrow_mut();
        let previous = applied.get(&elm).map(String::as_str).unwrap_or("");
        if previous == class {
            return;
        }
        if class.is_empty() {
            ops.remove_attribute(elm, "class");
            applied.remove(&elm);
        } else {
            ops.set_attribute(elm, "class", &class);
            applied.insert(elm, class);
        }
    }
}

/// Classes of a node: those of the component roots it resolves to, then its
/// own, then those of the placeholders it is the root of.
fn class_for_vnode(vnode: &VNode) -> String {
    let mut classes: Vec<String> = Vec::new();

    let mut roots = Vec::new();
    let mut node = vnode.clone();
    while let Some(root) = node.component_instance().and_then(|c| c.rendered_vnode()) {
        roots.push(root.clone());
        node = root;
    }
    for root in roots.iter().rev() {
        if let Some(data) = root.data() {
            classes.extend(data.class.iter().cloned());
        }
    }
    if let Some(data) = vnode.data() {
        classes.extend(data.class.iter().cloned());
    }
    let mut parent = vnode.parent();
    while let Some(node) = parent {
        if let Some(data) = node.data() {
            classes.extend(data.class.iter().cloned());
        }
        parent = node.parent();
    }

    let mut seen = Vec::with_capacity(classes.len());
    for class in classes {
        if !seen.contains(&class) {
            seen.push(class);
        }
    }
    seen.join(" ")
}

impl Module for ClassModule {
    fn create(&self, ops: &dyn NodeOps, _old: &VNode, vnode: &VNode) {
        self.apply(ops, vnode);
    }

    fn update(&self, ops: &dyn NodeOps, _old: &VNode, vnode: &VNode) {
        self.apply(ops, vnode);
    }

    fn destroy(&self, _ops: &dyn NodeOps, vnode: &VNode) {
        if let Some(elm) = vnode.elm() {
            self.applied.borrow_mut().remove(&elm);
        }
    }
}

/// Inline styles, merged like classes. Properties that disappear are
/// cleared.
#[derive(Default)]
pub struct StyleModule {
    applied: RefCell<HashMap<DomRef, IndexMap<String, String>>>,
}

impl StyleModule {
    fn apply(&self, ops: &dyn NodeOps, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let style = style_for_vnode(vnode);
        let mut applied = self.applied.borrow_mut();
        let previous = applied.remove(&elm).unwrap_or_default();

        for name in previous.keys() {
            if !style.contains_key(name) {
                ops.set_style_property(elm, name, "");
            }
        }
        for (name, value) in &style {
            if previous.get(name) != Some(value) {
                ops.set_style_property(elm, name, value);
            }
        }
        if !style.is_empty() {
            applied.insert(elm, style);
        }
    }
}

fn style_for_vnode(vnode: &VNode) -> IndexMap<String, String> {
    let mut style = IndexMap::new();
    let mut merge = |node: &VNode| {
        if let Some(data) = node.data() {
            for (name, value) in &data.style {
                style.insert(name.clone(), value.clone());
            }
        }
    };

    let mut roots = Vec::new();
    let mut node = vnode.clone();
    while let Some(root) = node.component_instance().and_then(|c| c.rendered_vnode()) {
        roots.push(root.clone());
        node = root;
    }
    for root in roots.iter().rev() {
        merge(root);
    }
    merge(vnode);
    let mut parent = vnode.parent();
    while let Some(node) = parent {
        merge(&node);
        parent = node.parent();
    }
    style
}

impl Module for StyleModule {
    fn create(&self, ops: &dyn NodeOps, _old: &VNode, vnode: &VNode) {
        self.apply(ops, vnode);
    }

    fn update(&self, ops: &dyn NodeOps, _old: &VNode, vnode: &VNode) {
        self.apply(ops, vnode);
    }

    fn destroy(&self, _ops: &dyn NodeOps, vnode: &VNode) {
        if let Some(elm) = vnode.elm() {
            self.applied.borrow_mut().remove(&elm);
        }
    }
}

/// One registered platform listener forwarding to a swappable handler list.
struct Invoker {
    handlers: Rc<RefCell<Handlers>>,
    listener: EventListener,
}

/// Event listeners. Each (element, event) pair gets a single platform
/// listener; later patches only swap the handlers behind it.
#[derive(Default)]
pub struct EventsModule {
    invokers: RefCell<HashMap<(DomRef, String), Invoker>>,
}

impl EventsModule {
    fn apply(&self, ops: &dyn NodeOps, old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let empty = IndexMap::new();
        let old_on = old.data().map_or(&empty, |d| &d.on);
        let on = vnode.data().map_or(&empty, |d| &d.on);
        if old_on.is_empty() && on.is_empty() {
            return;
        }

        let mut invokers = self.invokers.borrow_mut();
        for (name, handlers) in on {
            let slot = (elm, name.clone());
            match invokers.get(&slot) {
                Some(invoker) => *invoker.handlers.borrow_mut() = handlers.clone(),
                None => {
                    let invoker = create_invoker(name, handlers.clone());
                    ops.add_event_listener(elm, name, invoker.listener.clone());
                    invokers.insert(slot, invoker);
                }
            }
        }
        for name in old_on.keys() {
            if on.contains_key(name) {
                continue;
            }
            if let Some(invoker) = invokers.remove(&(elm, name.clone())) {
                ops.remove_event_listener(elm, name, &invoker.listener);
            }
        }
    }
}

fn create_invoker(name: &str, handlers: Handlers) -> Invoker {
    let handlers = Rc::new(RefCell::new(handlers));
    let current = handlers.clone();
    let info = format!("event handler for \"{name}\"");
    let listener: EventListener = Rc::new(move |event: &Event| {
        let fns = current.borrow().clone();
        for handler in fns {
            invoke_with_error_handling(None, &info, || handler(event));
        }
    });
    Invoker { handlers, listener }
}

impl Module for EventsModule {
    fn create(&self, ops: &dyn NodeOps, old: &VNode, vnode: &VNode) {
        self.apply(ops, old, vnode);
    }

    fn update(&self, ops: &dyn NodeOps, old: &VNode, vnode: &VNode) {
        self.apply(ops, old, vnode);
    }

    fn destroy(&self, ops: &dyn NodeOps, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let Some(data) = vnode.data() else {
            return;
        };
        // Only the node's own events: a component placeholder shares its
        // element with the component's root.
        let mut invokers = self.invokers.borrow_mut();
        for name in data.on.keys() {
            if let Some(invoker) = invokers.remove(&(elm, name.clone())) {
                ops.remove_event_listener(elm, name, &invoker.listener);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::memory::{DomOp, MemoryDom};
    use crate::vdom::{PatchTarget, Patcher, VNodeData};
    use std::cell::Cell;

    fn mounted(data: VNodeData) -> (Rc<MemoryDom>, Patcher, VNode) {
        let dom = Rc::new(MemoryDom::new());
        let patcher = Patcher::with_default_modules(dom.clone());
        let vnode = VNode::element("div", Some(data), None);
        patcher.patch(None, Some(&vnode), false);
        dom.clear_ops();
        (dom, patcher, vnode)
    }

    #[test]
    fn attrs_diff() {
        let (dom, patcher, old) = mounted(
            VNodeData::new()
                .attr("id", "a")
                .attr("title", "t")
                .attr("hidden", true),
        );
        let elm = old.elm().unwrap();
        assert_eq!(dom.attribute(elm, "hidden").as_deref(), Some("hidden"));

        let new = VNode::element(
            "div",
            Some(VNodeData::new().attr("id", "b").attr("hidden", false)),
            None,
        );
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        assert_eq!(dom.attribute(elm, "id").as_deref(), Some("b"));
        assert_eq!(dom.attribute(elm, "title"), None);
        assert_eq!(dom.attribute(elm, "hidden"), None);
    }

    #[test]
    fn unchanged_attrs_emit_nothing() {
        let (dom, patcher, old) = mounted(VNodeData::new().attr("id", "a").class("x y").style("color", "red"));
        let new = VNode::element(
            "div",
            Some(VNodeData::new().attr("id", "a").class("x y").style("color", "red")),
            None,
        );
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);
        assert!(dom.take_ops().is_empty());
    }

    #[test]
    fn class_and_style_changes() {
        let (dom, patcher, old) = mounted(VNodeData::new().class("a").style("color", "red").style("top", "0"));
        let elm = old.elm().unwrap();
        assert_eq!(dom.attribute(elm, "class").as_deref(), Some("a"));

        let new = VNode::element(
            "div",
            Some(VNodeData::new().class("a b").style("color", "blue")),
            None,
        );
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        assert_eq!(dom.attribute(elm, "class").as_deref(), Some("a b"));
        assert_eq!(dom.style(elm, "color").as_deref(), Some("blue"));
        assert_eq!(dom.style(elm, "top"), None);
    }

    #[test]
    fn listeners_are_swapped_in_place() {
        let hits = Rc::new(Cell::new(0));
        let first = hits.clone();
        let (dom, patcher, old) = mounted(VNodeData::new().on("click", move |_| {
            first.set(first.get() + 1);
            Ok(())
        }));
        let elm = old.elm().unwrap();
        dom.dispatch_event(elm, "click", vec![]);
        assert_eq!(hits.get(), 1);

        let second = hits.clone();
        let new = VNode::element(
            "div",
            Some(VNodeData::new().on("click", move |_| {
                second.set(second.get() + 10);
                Ok(())
            })),
            None,
        );
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        assert!(dom.take_ops().is_empty());
        assert_eq!(dom.listener_count(elm, "click"), 1);
        dom.dispatch_event(elm, "click", vec![]);
        assert_eq!(hits.get(), 11);

        let bare = VNode::element("div", Some(VNodeData::new()), None);
        patcher.patch(Some(PatchTarget::VNode(new)), Some(&bare), false);
        assert!(matches!(
            dom.take_ops().as_slice(),
            [DomOp::RemoveEventListener { .. }]
        ));
        assert_eq!(dom.listener_count(elm, "click"), 0);
    }

    #[test]
    fn handler_errors_are_reported() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        crate::config::set_error_handler(Some(Rc::new(move |err: &crate::error::Error, _: Option<&str>, info: &str| {
            sink.borrow_mut().push(format!("{info}: {err}"));
        })));

        let (dom, _patcher, vnode) = mounted(VNodeData::new().on("click", |_| Err("boom".into())));
        dom.dispatch_event(vnode.elm().unwrap(), "click", vec![]);

        assert_eq!(errors.borrow().as_slice(), ["event handler for \"click\": boom"]);
        crate::config::set_error_handler(None);
    }
}
