//! Component placeholders.
//!
//! A component used in a render function becomes a placeholder node whose
//! hooks create, update and tear down the child instance as the parent
//! tree is patched:
//!
//! - `init` instantiates and mounts the child (or reuses a kept-alive one),
//! - `prepatch` pushes new props, listeners and children into it,
//! - `insert` fires `mounted` (or `activated`) once the tree is attached,
//! - `destroy` destroys it (or deactivates a kept-alive one).

use std::rc::Rc;

use indexmap::IndexMap;

use super::def::{camelize, hyphenate, ComponentDef, LifecycleHook};
use super::instance::{active_instance, set_updating_child, Component, InstanceInit};
use super::render::RenderContext;
use super::AsyncFactory;
use crate::error::{handle_error, warn};
use crate::reactive::{toggle_observing, Object, Value};
use crate::scheduler::queue_activated;
use crate::vdom::{ComponentVNodeOptions, NodeHook, PatchHook, VNode, VNodeData, VNodeHooks};

/// Build the node standing for `def` in the tree of `context`.
///
/// Declared props are taken out of `data` (from `props`, then from `attrs`,
/// which lose the entry). Functional components are rendered right away and
/// their output is returned instead of a placeholder.
pub(crate) fn create_component_vnode(
    def: ComponentDef,
    data: Option<VNodeData>,
    context: Option<&Component>,
    children: Vec<VNode>,
    tag: &str,
    async_factory: Option<AsyncFactory>,
) -> VNode {
    let mut data = data.unwrap_or_default();
    let props_data = extract_props(&def, &mut data);

    if def.is_functional() {
        return render_functional(&def, data, props_data, context, children);
    }

    let listeners = std::mem::take(&mut data.on);
    install_component_hooks(&mut data.hooks);

    let name = if def.name().is_empty() { tag } else { def.name() };
    let placeholder_tag = format!("weft-component-{}-{}", def.cid(), name);
    VNode::component_placeholder(
        placeholder_tag,
        data,
        context.map(Component::downgrade),
        ComponentVNodeOptions {
            def,
            props_data,
            listeners,
            children,
            tag: tag.to_string(),
        },
        async_factory,
    )
}

fn extract_props(def: &ComponentDef, data: &mut VNodeData) -> IndexMap<String, Value> {
    let mut out = IndexMap::new();
    for prop in def.props() {
        let alt = hyphenate(&prop.name);
        let passed = data
            .props
            .get(&prop.name)
            .or_else(|| data.props.get(&alt))
            .cloned()
            .or_else(|| data.attrs.shift_remove(&prop.name))
            .or_else(|| data.attrs.shift_remove(&alt));
        if let Some(value) = passed {
            out.insert(prop.name.clone(), value);
        }
    }
    out
}

fn render_functional(
    def: &ComponentDef,
    data: VNodeData,
    props_data: IndexMap<String, Value>,
    context: Option<&Component>,
    children: Vec<VNode>,
) -> VNode {
    let props = Object::new();
    if def.props().is_empty() {
        // Undeclared: everything passed is a prop.
        for (key, value) in data.attrs.iter().chain(data.props.iter()) {
            props.assign(&camelize(key), value.clone());
        }
    } else {
        for prop in def.props() {
            let value = props_data
                .get(&prop.name)
                .cloned()
                .or_else(|| prop.default_value())
                .unwrap_or_default();
            props.assign(&prop.name, value);
        }
    }

    let ctx = RenderContext::functional(context, props, children, data.on);
    let result = match def.render_fn() {
        Some(render) => render(&ctx),
        None => Ok(VNode::empty()),
    };
    match result {
        Ok(vnode) => vnode.clone_node(),
        Err(err) => {
            let name = context.map(Component::name);
            handle_error(&err, name.as_deref(), "render");
            VNode::empty()
        }
    }
}

/// Put the component hooks in front of any hooks the caller supplied.
fn install_component_hooks(hooks: &mut VNodeHooks) {
    hooks.init = Some(merge_node_hook(Rc::new(init_hook), hooks.init.take()));
    hooks.prepatch = Some(merge_patch_hook(Rc::new(prepatch_hook), hooks.prepatch.take()));
    hooks.insert = Some(merge_node_hook(Rc::new(insert_hook), hooks.insert.take()));
    hooks.destroy = Some(merge_node_hook(Rc::new(destroy_hook), hooks.destroy.take()));
}

fn merge_node_hook(first: NodeHook, then: Option<NodeHook>) -> NodeHook {
    match then {
        Some(then) => Rc::new(move |vnode: &VNode| {
            first(vnode);
            then(vnode);
        }),
        None => first,
    }
}

fn merge_patch_hook(first: PatchHook, then: Option<PatchHook>) -> PatchHook {
    match then {
        Some(then) => Rc::new(move |old: &VNode, vnode: &VNode| {
            first(old, vnode);
            then(old, vnode);
        }),
        None => first,
    }
}

fn init_hook(vnode: &VNode) {
    if let Some(vm) = vnode.component_instance() {
        if !vm.is_destroyed() && vnode.is_keep_alive() {
            // Kept alive: treat re-creation as a patch onto itself.
            prepatch_hook(vnode, vnode);
            return;
        }
    }
    let Some(options) = vnode.component_options() else {
        return;
    };
    let Some(parent) = active_instance().or_else(|| vnode.context()) else {
        warn(
            &format!(
                "Component <{}> can only be created inside a mounted component's tree.",
                options.tag
            ),
            None,
        );
        return;
    };

    let vm = Component::init(
        &options.def,
        parent.patcher(),
        InstanceInit {
            parent: Some(parent),
            placeholder: Some(vnode.clone()),
            props_data: options.props_data.clone(),
            listeners: options.listeners.clone(),
            children: options.children.clone(),
        },
    );
    vnode.set_component_instance(Some(vm.clone()));
    if let Err(err) = vm.mount(None) {
        handle_error(&err, Some(&vm.name()), "mount");
    }
}

fn prepatch_hook(old: &VNode, vnode: &VNode) {
    let Some(vm) = old.component_instance() else {
        return;
    };
    vnode.set_component_instance(Some(vm.clone()));
    if let Some(options) = vnode.component_options() {
        update_child_component(&vm, options, vnode);
    }
}

/// Push what the parent just rendered into an existing child.
fn update_child_component(vm: &Component, options: &ComponentVNodeOptions, vnode: &VNode) {
    set_updating_child(true);

    let previous_placeholder = vm.placeholder();
    vm.set_placeholder(vnode);
    if let Some(root) = vm.rendered_vnode() {
        root.set_parent(Some(vnode));
    }

    let previous_children = vm.replace_slot_children(options.children.clone());
    let needs_force_update = !previous_children.is_empty() || !options.children.is_empty();

    toggle_observing(false);
    for prop in vm.def().props() {
        let passed_before = previous_placeholder
            .as_ref()
            .and_then(VNode::component_options)
            .is_some_and(|previous| previous.props_data.contains_key(&prop.name));
        if !passed_before && !options.props_data.contains_key(&prop.name) {
            // Still defaulted: keep the child's own default.
            continue;
        }
        let value = vm.prop_value(&options.props_data, &prop.name);
        vm.props().assign(&prop.name, value);
    }
    toggle_observing(true);

    vm.replace_listeners(options.listeners.clone());
    set_updating_child(false);

    if needs_force_update {
        vm.force_update();
    }
}

fn insert_hook(vnode: &VNode) {
    let Some(vm) = vnode.component_instance() else {
        return;
    };
    if !vm.is_mounted() {
        vm.set_mounted();
        vm.call_hook(LifecycleHook::Mounted);
    }
    if !vnode.is_keep_alive() {
        return;
    }
    if vnode.context().is_some_and(|context| context.is_mounted()) {
        // Activate after the flush so the whole updated tree is in place.
        vm.0.inactive.set(Some(false));
        let weak = vm.downgrade();
        queue_activated(move || {
            if let Some(vm) = weak.upgrade() {
                vm.0.inactive.set(Some(true));
                activate_child_component(&vm, true);
            }
        });
    } else {
        activate_child_component(&vm, true);
    }
}

fn destroy_hook(vnode: &VNode) {
    let Some(vm) = vnode.component_instance() else {
        return;
    };
    if vm.is_destroyed() {
        return;
    }
    if vnode.is_keep_alive() {
        deactivate_child_component(&vm, true);
    } else {
        vm.destroy();
    }
}

fn is_in_inactive_tree(vm: &Component) -> bool {
    let mut parent = vm.parent();
    while let Some(p) = parent {
        if p.is_inactive() {
            return true;
        }
        parent = p.parent();
    }
    false
}

/// Mark `vm` and its subtree active and fire `activated`.
pub(crate) fn activate_child_component(vm: &Component, direct: bool) {
    if direct {
        vm.0.direct_inactive.set(false);
        if is_in_inactive_tree(vm) {
            return;
        }
    } else if vm.0.direct_inactive.get() {
        return;
    }
    if vm.0.inactive.get() != Some(false) {
        vm.0.inactive.set(Some(false));
        for child in vm.children() {
            activate_child_component(&child, false);
        }
        vm.call_hook(LifecycleHook::Activated);
    }
}

/// Mark `vm` and its subtree inactive and fire `deactivated`.
pub(crate) fn deactivate_child_component(vm: &Component, direct: bool) {
    if direct {
        vm.0.direct_inactive.set(true);
        if is_in_inactive_tree(vm) {
            return;
        }
    }
    if !vm.is_inactive() {
        vm.0.inactive.set(Some(true));
        for child in vm.children() {
            deactivate_child_component(&child, false);
        }
        vm.call_hook(LifecycleHook::Deactivated);
    }
}
