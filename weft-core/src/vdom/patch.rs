//! Patch Engine
//!
//! [`Patcher::patch`] turns the difference between two virtual trees into
//! platform node operations.
//!
//! # Algorithm
//!
//! 1. Two nodes are the "same" ([`same_vnode`]) when their keys, async
//!    factories, tags, comment flags and data presence agree (plus an input
//!    type check). Same nodes are updated in place; anything else is
//!    replaced.
//!
//! 2. Updating a node runs the module `update` callbacks and then diffs the
//!    children. Child lists are reconciled with four pointers: start/end of
//!    the old and new lists are compared pairwise (start-start, end-end,
//!    start-end, end-start) before falling back to a key lookup, so common
//!    edits (append, prepend, remove, reverse, move one) need no map at all.
//!
//! 3. Removal waits for every module and the node's own `remove` hook to
//!    signal completion through a shared [`RemoveCallback`]; the node is
//!    detached when the last one does.
//!
//! 4. `insert` hooks are queued while a subtree is built and run once the
//!    whole subtree is attached. A component's first render cannot know when
//!    that is, so its queue is parked on the component's placeholder node
//!    and merged into the parent's queue when the placeholder is created.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::create::{namespace_uri, platform};
use super::modules::{self, Module};
use super::node::{Children, Key, VNode, VNodeData};
use super::ops::{DomRef, NodeOps};
use crate::config;
use crate::error::warn;

/// Text-like input types that are interchangeable for node reuse.
const TEXT_INPUT_TYPES: &[&str] = &["text", "number", "password", "search", "email", "tel", "url"];

/// The old side of a patch.
#[derive(Debug, Clone)]
pub enum PatchTarget {
    /// The tree rendered last time.
    VNode(VNode),
    /// An existing platform element to replace (initial mount).
    Element(DomRef),
}

/// Countdown that detaches a node once every remove listener has signalled.
#[derive(Clone)]
pub struct RemoveCallback(Rc<RemoveState>);

struct RemoveState {
    listeners: Cell<usize>,
    elm: Option<DomRef>,
    ops: Rc<dyn NodeOps>,
}

impl RemoveCallback {
    fn new(ops: Rc<dyn NodeOps>, elm: Option<DomRef>, listeners: usize) -> Self {
        Self(Rc::new(RemoveState {
            listeners: Cell::new(listeners),
            elm,
            ops,
        }))
    }

    fn add_listeners(&self, count: usize) {
        self.0.listeners.set(self.0.listeners.get() + count);
    }

    /// Signal that one listener is done. The node is detached when the
    /// count reaches zero; later calls do nothing.
    pub fn call(&self) {
        let remaining = self.0.listeners.get();
        if remaining == 0 {
            return;
        }
        self.0.listeners.set(remaining - 1);
        if remaining == 1 {
            if let Some(elm) = self.0.elm {
                remove_node(&*self.0.ops, elm);
            }
        }
    }

    /// Listeners still outstanding.
    pub fn pending(&self) -> usize {
        self.0.listeners.get()
    }
}

fn remove_node(ops: &dyn NodeOps, elm: DomRef) {
    if let Some(parent) = ops.parent_node(elm) {
        ops.remove_child(parent, elm);
    }
}

/// Decide whether `b` can be patched onto `a`.
pub fn same_vnode(a: &VNode, b: &VNode) -> bool {
    if a.key() != b.key() || !same_factory(a, b) {
        return false;
    }
    let same_shape = a.tag() == b.tag()
        && a.is_comment() == b.is_comment()
        && a.data().is_some() == b.data().is_some()
        && same_input_type(a, b);
    let pending_async = a.is_async_placeholder()
        && b.async_factory().is_some_and(|factory| factory.error().is_none());
    same_shape || pending_async
}

fn same_factory(a: &VNode, b: &VNode) -> bool {
    match (a.async_factory(), b.async_factory()) {
        (None, None) => true,
        (Some(x), Some(y)) => x.ptr_eq(y),
        _ => false,
    }
}

fn same_input_type(a: &VNode, b: &VNode) -> bool {
    if a.tag() != Some("input") {
        return true;
    }
    let input_type = |node: &VNode| {
        node.data()
            .and_then(|data| data.attrs.get("type"))
            .map(|value| value.to_display_string())
    };
    let (type_a, type_b) = (input_type(a), input_type(b));
    let text_like =
        |t: &Option<String>| t.as_deref().is_some_and(|t| TEXT_INPUT_TYPES.contains(&t));
    type_a == type_b || (text_like(&type_a) && text_like(&type_b))
}

/// Entry of a child list that a freshly created or patched node may replace.
type Owner<'a> = Option<(&'a Children, usize)>;

/// Applies virtual trees to a platform through [`NodeOps`] and a set of
/// modules.
pub struct Patcher {
    ops: Rc<dyn NodeOps>,
    modules: Vec<Rc<dyn Module>>,
    empty: VNode,
}

impl Patcher {
    pub fn new(ops: Rc<dyn NodeOps>, modules: Vec<Rc<dyn Module>>) -> Self {
        Self {
            ops,
            modules,
            empty: VNode::element("", Some(VNodeData::default()), Some(Children::default())),
        }
    }

    /// A patcher with the attrs, class, style and events modules.
    pub fn with_default_modules(ops: Rc<dyn NodeOps>) -> Self {
        Self::new(ops, modules::default_modules())
    }

    pub fn ops(&self) -> &Rc<dyn NodeOps> {
        &self.ops
    }

    /// Patch `old` into `vnode` and return the resulting root platform node.
    ///
    /// - `vnode == None` destroys `old` (hooks only; nothing is detached).
    /// - `old == None` builds a detached tree for `vnode`.
    /// - Same nodes are updated in place; anything else is built next to the
    ///   old node, which is then removed.
    ///
    /// `remove_only` suppresses moves during child reconciliation.
    pub fn patch(
        &self,
        old: Option<PatchTarget>,
        vnode: Option<&VNode>,
        remove_only: bool,
    ) -> Option<DomRef> {
        let Some(vnode) = vnode else {
            if let Some(PatchTarget::VNode(old)) = old {
                self.invoke_destroy_hook(&old);
            }
            return None;
        };

        let mut queue = Vec::new();
        let mut initial = false;

        match old {
            None => {
                initial = true;
                self.create_elm(vnode, &mut queue, None, None, false, None);
            }
            Some(PatchTarget::VNode(old)) if same_vnode(&old, vnode) => {
                self.patch_vnode(&old, vnode, &mut queue, None, remove_only);
            }
            Some(target) => {
                let old = match target {
                    PatchTarget::Element(elm) => self.empty_node_at(elm),
                    PatchTarget::VNode(old) => old,
                };
                let old_elm = old.elm();
                let parent_elm = old_elm.and_then(|elm| self.ops.parent_node(elm));
                let ref_elm = old_elm.and_then(|elm| self.ops.next_sibling(elm));
                self.create_elm(vnode, &mut queue, parent_elm, ref_elm, false, None);

                self.update_ancestor_elements(vnode);

                if parent_elm.is_some() {
                    self.remove_vnodes(&[Some(old)], 0, 0);
                } else if old.tag().is_some() {
                    self.invoke_destroy_hook(&old);
                }
            }
        }

        self.invoke_insert_hook(vnode, queue, initial);
        vnode.elm()
    }

    /// A component's root was replaced: point every placeholder above it at
    /// the new element.
    fn update_ancestor_elements(&self, vnode: &VNode) {
        let patchable = self.is_patchable(vnode);
        let mut ancestor = vnode.parent();
        while let Some(node) = ancestor {
            for module in &self.modules {
                module.destroy(&*self.ops, &node);
            }
            node.set_elm(vnode.elm());
            if patchable {
                for module in &self.modules {
                    module.create(&*self.ops, &self.empty, &node);
                }
            }
            ancestor = node.parent();
        }
    }

    fn empty_node_at(&self, elm: DomRef) -> VNode {
        let tag = self.ops.tag_name(elm).to_lowercase();
        let node = VNode::element(tag, None, Some(Children::default()));
        node.set_elm(Some(elm));
        node
    }

    fn create_elm(
        &self,
        vnode: &VNode,
        queue: &mut Vec<VNode>,
        parent_elm: Option<DomRef>,
        ref_elm: Option<DomRef>,
        nested: bool,
        owner: Owner<'_>,
    ) {
        // A node that is already mounted somewhere is reused (static or
        // slot content): mount a copy instead.
        let vnode = match owner {
            Some((children, index)) if vnode.elm().is_some() => {
                let copy = vnode.clone_node();
                children.replace(index, copy.clone());
                copy
            }
            _ => vnode.clone(),
        };
        vnode.set_root_insert(!nested);

        if self.create_component(&vnode, queue, parent_elm, ref_elm) {
            return;
        }

        if let Some(tag) = vnode.tag() {
            if vnode.ns().is_none() && platform().is_unknown_element(tag) {
                warn(
                    &format!(
                        "Unknown custom element: <{tag}> - did you register the component correctly?"
                    ),
                    vnode.context().map(|c| c.name()).as_deref(),
                );
            }
            let elm = match vnode.ns() {
                Some(ns) => self.ops.create_element_ns(namespace_uri(&ns), tag),
                None => self.ops.create_element(tag),
            };
            vnode.set_elm(Some(elm));
            self.set_scope(&vnode, elm);
            self.create_children(&vnode, elm, queue);
            if vnode.data().is_some() {
                self.invoke_create_hooks(&vnode, queue);
            }
            self.insert(parent_elm, elm, ref_elm);
        } else {
            let text = vnode.text_content().unwrap_or_default();
            let elm = if vnode.is_comment() {
                self.ops.create_comment(text)
            } else {
                self.ops.create_text_node(text)
            };
            vnode.set_elm(Some(elm));
            self.insert(parent_elm, elm, ref_elm);
        }
    }

    fn create_component(
        &self,
        vnode: &VNode,
        queue: &mut Vec<VNode>,
        parent_elm: Option<DomRef>,
        ref_elm: Option<DomRef>,
    ) -> bool {
        let Some(data) = vnode.data() else {
            return false;
        };
        let reactivated = vnode.component_instance().is_some() && vnode.is_keep_alive();
        if let Some(init) = &data.hooks.init {
            init(vnode);
        }
        if vnode.component_instance().is_none() {
            return false;
        }

        self.init_component(vnode, queue);
        if let Some(elm) = vnode.elm() {
            self.insert(parent_elm, elm, ref_elm);
        }
        if reactivated {
            self.reactivate_component(vnode);
        }
        true
    }

    fn init_component(&self, vnode: &VNode, queue: &mut Vec<VNode>) {
        if let Some(pending) = vnode.take_pending_insert() {
            queue.extend(pending);
        }
        vnode.set_elm(vnode.component_instance().and_then(|c| c.el()));
        if self.is_patchable(vnode) {
            self.invoke_create_hooks(vnode, queue);
            if let Some(elm) = vnode.elm() {
                self.set_scope(vnode, elm);
            }
        } else {
            // Root is a comment or text node: still needs its insert hook.
            queue.push(vnode.clone());
        }
    }

    fn reactivate_component(&self, vnode: &VNode) {
        let mut inner = vnode.clone();
        while let Some(root) = inner.component_instance().and_then(|c| c.rendered_vnode()) {
            inner = root;
        }
        for module in &self.modules {
            module.activate(&*self.ops, &self.empty, &inner);
        }
    }

    fn insert(&self, parent: Option<DomRef>, elm: DomRef, reference: Option<DomRef>) {
        let Some(parent) = parent else {
            return;
        };
        match reference {
            Some(reference) if self.ops.parent_node(reference) == Some(parent) => {
                self.ops.insert_before(parent, elm, Some(reference));
            }
            Some(_) => {}
            None => self.ops.append_child(parent, elm),
        }
    }

    fn create_children(&self, vnode: &VNode, elm: DomRef, queue: &mut Vec<VNode>) {
        match vnode.children() {
            Some(children) => {
                self.check_duplicate_keys(vnode, &children.to_vec());
                for index in 0..children.len() {
                    if let Some(child) = children.get(index) {
                        self.create_elm(&child, queue, Some(elm), None, true, Some((children, index)));
                    }
                }
            }
            None => {
                if let Some(text) = vnode.text_content() {
                    let text_node = self.ops.create_text_node(text);
                    self.ops.append_child(elm, text_node);
                }
            }
        }
    }

    /// Whether the node (or the root it resolves to through component
    /// instances) is an element.
    fn is_patchable(&self, vnode: &VNode) -> bool {
        let mut node = vnode.clone();
        while let Some(root) = node.component_instance().and_then(|c| c.rendered_vnode()) {
            node = root;
        }
        node.tag().is_some()
    }

    fn invoke_create_hooks(&self, vnode: &VNode, queue: &mut Vec<VNode>) {
        for module in &self.modules {
            module.create(&*self.ops, &self.empty, vnode);
        }
        if let Some(data) = vnode.data() {
            if let Some(create) = &data.hooks.create {
                create(vnode);
            }
            if data.hooks.insert.is_some() {
                queue.push(vnode.clone());
            }
        }
    }

    /// Apply the scoped-style id of every component this node belongs to.
    fn set_scope(&self, vnode: &VNode, elm: DomRef) {
        let mut ancestor = Some(vnode.clone());
        while let Some(node) = ancestor {
            if let Some(scope) = node.context().and_then(|c| c.scope_id()) {
                self.ops.set_style_scope(elm, &scope);
            }
            ancestor = node.parent();
        }
    }

    fn add_vnodes(
        &self,
        parent: DomRef,
        ref_elm: Option<DomRef>,
        children: &Children,
        start: usize,
        end: usize,
        queue: &mut Vec<VNode>,
    ) {
        for index in start..=end {
            if let Some(child) = children.get(index) {
                self.create_elm(&child, queue, Some(parent), ref_elm, false, Some((children, index)));
            }
        }
    }

    fn invoke_destroy_hook(&self, vnode: &VNode) {
        if let Some(data) = vnode.data() {
            if let Some(destroy) = &data.hooks.destroy {
                destroy(vnode);
            }
            for module in &self.modules {
                module.destroy(&*self.ops, vnode);
            }
        }
        if let Some(children) = vnode.children() {
            for child in children.to_vec() {
                self.invoke_destroy_hook(&child);
            }
        }
    }

    fn remove_vnodes(&self, vnodes: &[Option<VNode>], start: usize, end: usize) {
        for node in vnodes.iter().take(end + 1).skip(start).flatten() {
            if node.tag().is_some() {
                self.remove_and_invoke_remove_hook(node, None);
                self.invoke_destroy_hook(node);
            } else if let Some(elm) = node.elm() {
                remove_node(&*self.ops, elm);
            }
        }
    }

    fn remove_and_invoke_remove_hook(&self, vnode: &VNode, rm: Option<RemoveCallback>) {
        if rm.is_none() && vnode.data().is_none() {
            if let Some(elm) = vnode.elm() {
                remove_node(&*self.ops, elm);
            }
            return;
        }

        let listeners = self.modules.len() + 1;
        let rm = match rm {
            Some(rm) => {
                rm.add_listeners(listeners);
                rm
            }
            None => RemoveCallback::new(self.ops.clone(), vnode.elm(), listeners),
        };

        // A component's root node gets its own remove hooks too.
        if let Some(root) = vnode.component_instance().and_then(|c| c.rendered_vnode()) {
            if root.data().is_some() {
                self.remove_and_invoke_remove_hook(&root, Some(rm.clone()));
            }
        }
        for module in &self.modules {
            module.remove(&*self.ops, vnode, rm.clone());
        }
        match vnode.data().and_then(|data| data.hooks.remove.clone()) {
            Some(remove) => remove(vnode, rm),
            None => rm.call(),
        }
    }

    fn check_duplicate_keys(&self, parent: &VNode, children: &[VNode]) {
        if !config::get().warn_duplicate_keys {
            return;
        }
        let mut seen: HashSet<&Key> = HashSet::new();
        for key in children.iter().filter_map(VNode::key) {
            if !seen.insert(key) {
                warn(
                    &format!("Duplicate keys detected: '{key}'. This may cause an update error."),
                    parent.context().map(|c| c.name()).as_deref(),
                );
            }
        }
    }

    fn update_children(
        &self,
        parent: DomRef,
        old_ch: &Children,
        new_ch: &Children,
        queue: &mut Vec<VNode>,
        remove_only: bool,
    ) {
        // Matched old entries are cleared so they are not considered twice.
        let mut old: Vec<Option<VNode>> = old_ch.to_vec().into_iter().map(Some).collect();
        let new_len = new_ch.len();
        if old.is_empty() && new_len == 0 {
            return;
        }
        let can_move = !remove_only;

        if let Some(first) = new_ch.get(0) {
            self.check_duplicate_keys(&first, &new_ch.to_vec());
        }

        let mut old_start: isize = 0;
        let mut old_end: isize = old.len() as isize - 1;
        let mut new_start: isize = 0;
        let mut new_end: isize = new_len as isize - 1;
        let mut key_to_old_idx: Option<HashMap<Key, usize>> = None;

        let node_at = |index: isize| new_ch.get(index as usize);

        while old_start <= old_end && new_start <= new_end {
            let Some(old_start_node) = old[old_start as usize].clone() else {
                old_start += 1;
                continue;
            };
            let Some(old_end_node) = old[old_end as usize].clone() else {
                old_end -= 1;
                continue;
            };
            let (Some(new_start_node), Some(new_end_node)) = (node_at(new_start), node_at(new_end))
            else {
                break;
            };

            if same_vnode(&old_start_node, &new_start_node) {
                self.patch_vnode(
                    &old_start_node,
                    &new_start_node,
                    queue,
                    Some((new_ch, new_start as usize)),
                    remove_only,
                );
                old_start += 1;
                new_start += 1;
            } else if same_vnode(&old_end_node, &new_end_node) {
                self.patch_vnode(
                    &old_end_node,
                    &new_end_node,
                    queue,
                    Some((new_ch, new_end as usize)),
                    remove_only,
                );
                old_end -= 1;
                new_end -= 1;
            } else if same_vnode(&old_start_node, &new_end_node) {
                // Moved right.
                self.patch_vnode(
                    &old_start_node,
                    &new_end_node,
                    queue,
                    Some((new_ch, new_end as usize)),
                    remove_only,
                );
                if can_move {
                    if let (Some(elm), Some(anchor)) = (old_start_node.elm(), old_end_node.elm()) {
                        let next = self.ops.next_sibling(anchor);
                        self.ops.insert_before(parent, elm, next);
                    }
                }
                old_start += 1;
                new_end -= 1;
            } else if same_vnode(&old_end_node, &new_start_node) {
                // Moved left.
                self.patch_vnode(
                    &old_end_node,
                    &new_start_node,
                    queue,
                    Some((new_ch, new_start as usize)),
                    remove_only,
                );
                if can_move {
                    if let Some(elm) = old_end_node.elm() {
                        self.ops.insert_before(parent, elm, old_start_node.elm());
                    }
                }
                old_end -= 1;
                new_start += 1;
            } else {
                let index_in_old = match new_start_node.key() {
                    Some(key) => key_to_old_idx
                        .get_or_insert_with(|| {
                            create_key_to_old_idx(&old, old_start as usize, old_end as usize)
                        })
                        .get(key)
                        .copied(),
                    None => find_idx_in_old(&new_start_node, &old, old_start as usize, old_end as usize),
                };
                let owner = Some((new_ch, new_start as usize));

                match index_in_old.and_then(|i| old[i].clone().map(|node| (i, node))) {
                    Some((i, to_move)) if same_vnode(&to_move, &new_start_node) => {
                        self.patch_vnode(&to_move, &new_start_node, queue, owner, remove_only);
                        old[i] = None;
                        if can_move {
                            if let Some(elm) = to_move.elm() {
                                self.ops.insert_before(parent, elm, old_start_node.elm());
                            }
                        }
                    }
                    // New element, or same key with a different shape.
                    _ => self.create_elm(
                        &new_start_node,
                        queue,
                        Some(parent),
                        old_start_node.elm(),
                        false,
                        owner,
                    ),
                }
                new_start += 1;
            }
        }

        if old_start > old_end {
            if new_start <= new_end {
                let ref_elm = node_at(new_end + 1).and_then(|node| node.elm());
                self.add_vnodes(parent, ref_elm, new_ch, new_start as usize, new_end as usize, queue);
            }
        } else if new_start > new_end {
            self.remove_vnodes(&old, old_start as usize, old_end as usize);
        }
    }

    fn patch_vnode(
        &self,
        old: &VNode,
        vnode: &VNode,
        queue: &mut Vec<VNode>,
        owner: Owner<'_>,
        remove_only: bool,
    ) {
        if old.ptr_eq(vnode) {
            return;
        }

        let vnode = match owner {
            Some((children, index)) if vnode.elm().is_some() => {
                let copy = vnode.clone_node();
                children.replace(index, copy.clone());
                copy
            }
            _ => vnode.clone(),
        };

        let elm = old.elm();
        vnode.set_elm(elm);

        if old.is_async_placeholder() {
            let resolved = vnode.async_factory().is_some_and(|f| f.resolved().is_some());
            match elm {
                Some(old_elm) if resolved && !vnode.is_async_placeholder() => {
                    // Resolved: build the component where the placeholder was.
                    vnode.set_elm(None);
                    let parent = self.ops.parent_node(old_elm);
                    self.create_elm(&vnode, queue, parent, Some(old_elm), false, None);
                    remove_node(&*self.ops, old_elm);
                }
                _ => vnode.set_async_placeholder(true),
            }
            return;
        }

        // Static trees can be reused; the component instance carries over.
        if vnode.is_static()
            && old.is_static()
            && vnode.key() == old.key()
            && (vnode.is_cloned() || vnode.is_once())
        {
            vnode.set_component_instance(old.component_instance());
            return;
        }

        let data = vnode.data();
        if let Some(prepatch) = data.and_then(|d| d.hooks.prepatch.as_ref()) {
            prepatch(old, &vnode);
        }

        if data.is_some() && self.is_patchable(&vnode) {
            for module in &self.modules {
                module.update(&*self.ops, old, &vnode);
            }
            if let Some(update) = data.and_then(|d| d.hooks.update.as_ref()) {
                update(old, &vnode);
            }
        }

        if let Some(elm) = elm {
            match vnode.text_content() {
                None => match (old.children(), vnode.children()) {
                    (Some(old_ch), Some(ch)) => {
                        if !old_ch.ptr_eq(ch) {
                            self.update_children(elm, old_ch, ch, queue, remove_only);
                        }
                    }
                    (None, Some(ch)) => {
                        self.check_duplicate_keys(&vnode, &ch.to_vec());
                        if old.text_content().is_some() {
                            self.ops.set_text_content(elm, "");
                        }
                        if !ch.is_empty() {
                            self.add_vnodes(elm, None, ch, 0, ch.len() - 1, queue);
                        }
                    }
                    (Some(old_ch), None) => {
                        let old_nodes: Vec<Option<VNode>> =
                            old_ch.to_vec().into_iter().map(Some).collect();
                        if !old_nodes.is_empty() {
                            self.remove_vnodes(&old_nodes, 0, old_nodes.len() - 1);
                        }
                    }
                    (None, None) => {
                        if old.text_content().is_some() {
                            self.ops.set_text_content(elm, "");
                        }
                    }
                },
                Some(text) => {
                    if old.text_content() != Some(text) {
                        self.ops.set_text_content(elm, text);
                    }
                }
            }
        }

        if let Some(postpatch) = data.and_then(|d| d.hooks.postpatch.as_ref()) {
            postpatch(old, &vnode);
        }
    }

    fn invoke_insert_hook(&self, vnode: &VNode, queue: Vec<VNode>, initial: bool) {
        // Delay insert hooks of a component's first render until its
        // placeholder is actually inserted.
        if initial {
            if let Some(parent) = vnode.parent() {
                parent.set_pending_insert(queue);
                return;
            }
        }
        for node in queue {
            if let Some(insert) = node.data().and_then(|d| d.hooks.insert.clone()) {
                insert(&node);
            }
        }
    }
}

fn create_key_to_old_idx(old: &[Option<VNode>], start: usize, end: usize) -> HashMap<Key, usize> {
    let mut map = HashMap::new();
    for (index, node) in old.iter().enumerate().take(end + 1).skip(start) {
        if let Some(key) = node.as_ref().and_then(VNode::key) {
            map.insert(key.clone(), index);
        }
    }
    map
}

fn find_idx_in_old(node: &VNode, old: &[Option<VNode>], start: usize, end: usize) -> Option<usize> {
    (start..end).find(|&index| {
        old[index]
            .as_ref()
            .is_some_and(|candidate| same_vnode(node, candidate))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::memory::{DomOp, MemoryDom};
    use crate::vdom::VNodeHooks;
    use std::cell::RefCell;

    fn setup() -> (Rc<MemoryDom>, Patcher, DomRef) {
        let dom = Rc::new(MemoryDom::new());
        let patcher = Patcher::with_default_modules(dom.clone());
        let root = dom.create_element("div");
        let app = dom.create_element("div");
        dom.append_child(root, app);
        dom.clear_ops();
        (dom, patcher, app)
    }

    fn keyed(tag: &str, key: &str, text: &str) -> VNode {
        VNode::element(
            tag,
            Some(VNodeData::new().key(key)),
            Some(vec![VNode::text(text)].into()),
        )
    }

    fn list(items: &[(&str, &str)]) -> VNode {
        VNode::element(
            "ul",
            Some(VNodeData::new()),
            Some(
                items
                    .iter()
                    .map(|(key, text)| keyed("li", key, text))
                    .collect::<Vec<_>>()
                    .into(),
            ),
        )
    }

    fn mount(patcher: &Patcher, target: DomRef, vnode: &VNode) {
        patcher.patch(Some(PatchTarget::Element(target)), Some(vnode), false);
    }

    fn child_elms(vnode: &VNode) -> Vec<DomRef> {
        vnode
            .children()
            .unwrap()
            .to_vec()
            .iter()
            .filter_map(VNode::elm)
            .collect()
    }

    #[test]
    fn initial_mount_replaces_the_target() {
        let (dom, patcher, app) = setup();
        let root = dom.parent_node(app).unwrap();
        let tree = list(&[("a", "A"), ("b", "B")]);

        mount(&patcher, app, &tree);

        assert_eq!(dom.children(root), vec![tree.elm().unwrap()]);
        assert_eq!(dom.to_html(root), "<div><ul><li>A</li><li>B</li></ul></div>");
    }

    #[test]
    fn keyed_rotation_only_moves() {
        let (dom, patcher, app) = setup();
        let old = list(&[("1", "A"), ("2", "B"), ("3", "C")]);
        mount(&patcher, app, &old);
        let before = child_elms(&old);
        dom.clear_ops();

        let new = list(&[("3", "C"), ("1", "A"), ("2", "B")]);
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        let ops = dom.take_ops();
        assert!(!ops.is_empty());
        assert!(ops.iter().all(|op| matches!(op, DomOp::InsertBefore { .. })));
        assert_eq!(child_elms(&new), vec![before[2], before[0], before[1]]);
        assert_eq!(
            dom.to_html(new.elm().unwrap()),
            "<ul><li>C</li><li>A</li><li>B</li></ul>"
        );
    }

    #[test]
    fn reversal_uses_the_cross_heuristics() {
        let (dom, patcher, app) = setup();
        let old = list(&[("a", "A"), ("b", "B"), ("c", "C"), ("d", "D")]);
        mount(&patcher, app, &old);
        dom.clear_ops();

        let new = list(&[("d", "D"), ("c", "C"), ("b", "B"), ("a", "A")]);
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        let ops = dom.take_ops();
        assert!(ops.iter().all(|op| matches!(op, DomOp::InsertBefore { .. })));
        assert_eq!(
            dom.to_html(new.elm().unwrap()),
            "<ul><li>D</li><li>C</li><li>B</li><li>A</li></ul>"
        );
    }

    #[test]
    fn insertions_and_removals_in_the_middle() {
        let (dom, patcher, app) = setup();
        let old = list(&[("a", "A"), ("b", "B"), ("c", "C")]);
        mount(&patcher, app, &old);

        let new = list(&[("a", "A"), ("x", "X"), ("c", "C"), ("y", "Y")]);
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        assert_eq!(
            dom.to_html(new.elm().unwrap()),
            "<ul><li>A</li><li>X</li><li>C</li><li>Y</li></ul>"
        );
    }

    #[test]
    fn text_update_is_a_single_write() {
        let (dom, patcher, app) = setup();
        let old = VNode::element("div", None, Some(vec![keyed("span", "a", "1")].into()));
        mount(&patcher, app, &old);
        dom.clear_ops();

        let new = VNode::element("div", None, Some(vec![keyed("span", "a", "2")].into()));
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        let ops = dom.take_ops();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], DomOp::SetTextContent { text, .. } if text == "2"));
    }

    #[test]
    fn identical_trees_produce_no_operations() {
        let (dom, patcher, app) = setup();
        let tree = list(&[("a", "A")]);
        mount(&patcher, app, &tree);
        dom.clear_ops();

        patcher.patch(Some(PatchTarget::VNode(tree.clone())), Some(&tree), false);
        assert!(dom.take_ops().is_empty());
    }

    #[test]
    fn shared_child_lists_are_not_diffed() {
        let (dom, patcher, app) = setup();
        let shared: Children = vec![keyed("li", "a", "A")].into();
        let old = VNode::element("ul", Some(VNodeData::new()), Some(shared.clone()));
        mount(&patcher, app, &old);
        dom.clear_ops();

        // Swap the entry behind the diff's back: with the same list on both
        // sides the change must go unnoticed.
        shared.replace(0, keyed("li", "b", "B"));
        let new = VNode::element("ul", Some(VNodeData::new()), Some(shared));
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        assert!(dom.take_ops().is_empty());
    }

    #[test]
    fn same_key_different_tag_is_recreated() {
        let (dom, patcher, app) = setup();
        let old = VNode::element("div", None, Some(vec![keyed("p", "k", "old")].into()));
        mount(&patcher, app, &old);
        let old_child = child_elms(&old)[0];

        let new = VNode::element("div", None, Some(vec![keyed("span", "k", "new")].into()));
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        assert_ne!(child_elms(&new)[0], old_child);
        assert_eq!(dom.to_html(new.elm().unwrap()), "<div><span>new</span></div>");
    }

    #[test]
    fn text_like_inputs_are_reused() {
        let input = |kind: &str| VNode::element("input", Some(VNodeData::new().attr("type", kind)), None);

        assert!(same_vnode(&input("text"), &input("email")));
        assert!(same_vnode(&input("password"), &input("password")));
        assert!(!same_vnode(&input("text"), &input("checkbox")));
        assert!(same_vnode(&input("checkbox"), &input("checkbox")));
    }

    #[test]
    fn keyless_nodes_match_by_position() {
        let a = VNode::element("div", None, None);
        let b = VNode::element("div", None, None);
        let with_data = VNode::element("div", Some(VNodeData::new()), None);
        assert!(same_vnode(&a, &b));
        assert!(!same_vnode(&a, &with_data));
        assert!(!same_vnode(&VNode::text("x"), &VNode::comment("x")));
    }

    #[test]
    fn svg_children_are_created_in_the_namespace() {
        let (dom, patcher, app) = setup();
        let tree = crate::vdom::create_element(
            None,
            "svg",
            crate::vdom::DataArg::None,
            vec![crate::vdom::create_element(None, "circle", crate::vdom::DataArg::None, vec![]).into()],
        );
        mount(&patcher, app, &tree);

        let ops = dom.take_ops();
        let namespaced = ops
            .iter()
            .filter(|op| matches!(op, DomOp::CreateElementNs { .. }))
            .count();
        assert_eq!(namespaced, 2);
    }

    #[test]
    fn remove_hook_delays_detachment() {
        let (dom, patcher, app) = setup();
        let pending: Rc<RefCell<Option<RemoveCallback>>> = Rc::new(RefCell::new(None));
        let slot = pending.clone();
        let leaving = VNode::element(
            "p",
            Some(VNodeData::new().key("leaving").hooks(VNodeHooks {
                remove: Some(Rc::new(move |_: &VNode, rm: RemoveCallback| {
                    *slot.borrow_mut() = Some(rm);
                })),
                ..Default::default()
            })),
            None,
        );
        let old = VNode::element("div", None, Some(vec![leaving].into()));
        mount(&patcher, app, &old);
        let p = child_elms(&old)[0];

        let new = VNode::element("div", None, Some(Vec::new().into()));
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);
        assert_eq!(dom.children(new.elm().unwrap()), vec![p]);

        let rm = pending.borrow_mut().take().unwrap();
        assert_eq!(rm.pending(), 1);
        rm.call();
        rm.call();
        assert!(dom.children(new.elm().unwrap()).is_empty());
    }

    #[test]
    fn hooks_fire_in_order() {
        let (_dom, patcher, app) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let hooked = |name: &'static str| {
            let create_log = log.clone();
            let insert_log = log.clone();
            let destroy_log = log.clone();
            VNode::element(
                "i",
                Some(VNodeData::new().key(name).hooks(VNodeHooks {
                    create: Some(Rc::new(move |_: &VNode| create_log.borrow_mut().push(format!("create {name}")))),
                    insert: Some(Rc::new(move |_: &VNode| insert_log.borrow_mut().push(format!("insert {name}")))),
                    destroy: Some(Rc::new(move |_: &VNode| destroy_log.borrow_mut().push(format!("destroy {name}")))),
                    ..Default::default()
                })),
                None,
            )
        };

        let tree = VNode::element("div", None, Some(vec![hooked("a"), hooked("b")].into()));
        mount(&patcher, app, &tree);
        patcher.patch(Some(PatchTarget::VNode(tree)), None, false);

        assert_eq!(
            log.borrow().as_slice(),
            ["create a", "create b", "insert a", "insert b", "destroy a", "destroy b"]
        );
    }

    #[test]
    fn static_reuse_skips_diffing() {
        let (dom, patcher, app) = setup();
        let hoisted = keyed("p", "static", "fixed");
        hoisted.mark_static();
        let old = VNode::element("div", None, Some(vec![hoisted.clone()].into()));
        mount(&patcher, app, &old);
        dom.clear_ops();

        // The same hoisted node rendered again is cloned into the new tree.
        let again = hoisted.clone_node();
        let new = VNode::element("div", None, Some(vec![again].into()));
        patcher.patch(Some(PatchTarget::VNode(old)), Some(&new), false);

        assert!(dom.take_ops().is_empty());
        assert_eq!(child_elms(&new), vec![hoisted.elm().unwrap()]);
    }

    #[test]
    fn remounting_a_bound_node_clones_it() {
        let (_dom, patcher, app) = setup();
        let reused = keyed("b", "r", "x");
        let first = VNode::element("div", None, Some(vec![reused.clone()].into()));
        mount(&patcher, app, &first);
        let first_elm = reused.elm().unwrap();

        let other = Patcher::with_default_modules(patcher.ops().clone());
        let second = VNode::element("section", None, Some(vec![reused.clone()].into()));
        other.patch(None, Some(&second), false);

        let mounted = second.children().unwrap().get(0).unwrap();
        assert!(!mounted.ptr_eq(&reused));
        assert_ne!(mounted.elm().unwrap(), first_elm);
        assert_eq!(reused.elm(), Some(first_elm));
    }

    #[test]
    fn duplicate_keys_warn() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        config::set_warn_handler(Some(Rc::new(move |msg: &str, _: Option<&str>| {
            sink.borrow_mut().push(msg.to_string());
        })));

        let (_dom, patcher, app) = setup();
        let tree = list(&[("a", "A"), ("a", "A2")]);
        mount(&patcher, app, &tree);

        assert!(warnings.borrow().iter().any(|w| w.contains("Duplicate keys")));
        config::set_warn_handler(None);
    }
}
