//! Component Instances
//!
//! A [`Component`] owns the reactive state of one mounted component and the
//! render watcher that keeps its DOM in sync with that state.
//!
//! # Lifecycle
//!
//! 1. Creation: `beforeCreate`, then props, data, computed values and
//!    watchers are initialised, then `created`.
//! 2. [`Component::mount`]: `beforeMount`, then the render watcher is
//!    created. Its first run renders and patches the initial tree. Root
//!    components fire `mounted` right away; child components fire it from
//!    their placeholder's `insert` hook, once the whole parent tree is
//!    attached.
//! 3. Updates: state read during render notifies the render watcher, which
//!    the scheduler re-runs (`beforeUpdate` before, `updated` after the
//!    flush).
//! 4. [`Component::destroy`]: `beforeDestroy`, watchers torn down, the
//!    rendered tree's destroy hooks run, `destroyed`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::def::{ComponentDef, LifecycleHook, PropDef, WatchOptions};
use super::render::RenderContext;
use crate::error::{handle_error, invoke_with_error_handling, warn, Result};
use crate::reactive::{
    define_reactive, observe, parse_path, toggle_observing, untracked, Computed, ComputedSetter,
    DefineOptions, Object, Value, Watcher, WatcherCallback, WatcherId, WatcherOptions,
    WatcherOwner,
};
use crate::vdom::{DomRef, Event, EventHandler, Handlers, PatchTarget, Patcher, VNode};

thread_local! {
    static ACTIVE_INSTANCE: RefCell<Option<WeakComponent>> = const { RefCell::new(None) };
    static RENDERING_INSTANCE: RefCell<Option<WeakComponent>> = const { RefCell::new(None) };
    static UPDATING_CHILD: Cell<bool> = const { Cell::new(false) };
}

/// The component whose tree is being patched, i.e. the parent of any
/// component instantiated right now.
pub(crate) fn active_instance() -> Option<Component> {
    ACTIVE_INSTANCE.with(|slot| slot.borrow().as_ref().and_then(WeakComponent::upgrade))
}

/// The component whose render function is running.
pub fn current_rendering_instance() -> Option<Component> {
    RENDERING_INSTANCE.with(|slot| slot.borrow().as_ref().and_then(WeakComponent::upgrade))
}

fn swap_slot(
    key: &'static std::thread::LocalKey<RefCell<Option<WeakComponent>>>,
    value: Option<WeakComponent>,
) -> Option<WeakComponent> {
    key.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), value))
}

/// Whether a parent is currently pushing new props into a child.
pub(crate) fn is_updating_child() -> bool {
    UPDATING_CHILD.with(Cell::get)
}

pub(crate) fn set_updating_child(value: bool) {
    UPDATING_CHILD.with(|flag| flag.set(value));
}

pub(crate) struct ComponentInner {
    uid: u64,
    def: ComponentDef,
    patcher: Rc<Patcher>,
    parent: Option<WeakComponent>,
    children: RefCell<Vec<Component>>,

    data: RefCell<Option<Object>>,
    props: Object,
    computed: RefCell<IndexMap<String, Computed>>,
    watchers: RefCell<Vec<Watcher>>,
    render_watcher: RefCell<Option<Watcher>>,

    vnode: RefCell<Option<VNode>>,
    placeholder: RefCell<Weak<crate::vdom::node::VNodeInner>>,
    el: Cell<Option<DomRef>>,
    listeners: RefCell<IndexMap<String, Handlers>>,
    slot_children: RefCell<Vec<VNode>>,

    is_mounted: Cell<bool>,
    is_destroyed: Cell<bool>,
    is_being_destroyed: Cell<bool>,
    pub(crate) inactive: Cell<Option<bool>>,
    pub(crate) direct_inactive: Cell<bool>,
}

impl WatcherOwner for ComponentInner {
    fn context_name(&self) -> String {
        self.def.name().to_string()
    }

    fn is_being_destroyed(&self) -> bool {
        self.is_being_destroyed.get()
    }

    fn remove_watcher(&self, id: WatcherId) {
        self.watchers.borrow_mut().retain(|w| w.id() != id);
    }
}

/// Shared handle to a component instance.
#[derive(Clone)]
pub struct Component(pub(crate) Rc<ComponentInner>);

/// Non-owning handle, used by nodes and watchers that refer back to their
/// component.
#[derive(Clone)]
pub struct WeakComponent(Weak<ComponentInner>);

impl WeakComponent {
    pub fn upgrade(&self) -> Option<Component> {
        self.0.upgrade().map(Component)
    }

    pub(crate) fn ptr_eq_component(&self, component: &Component) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&component.0))
    }
}

/// Everything a new instance receives from its placeholder.
#[derive(Default)]
pub(crate) struct InstanceInit {
    pub parent: Option<Component>,
    pub placeholder: Option<VNode>,
    pub props_data: IndexMap<String, Value>,
    pub listeners: IndexMap<String, Handlers>,
    pub children: Vec<VNode>,
}

impl Component {
    /// Create a root instance.
    pub fn new(def: &ComponentDef, patcher: Rc<Patcher>) -> Component {
        Self::with_props(def, patcher, IndexMap::new())
    }

    /// Create a root instance with prop values.
    pub fn with_props(
        def: &ComponentDef,
        patcher: Rc<Patcher>,
        props_data: IndexMap<String, Value>,
    ) -> Component {
        Self::init(
            def,
            patcher,
            InstanceInit {
                props_data,
                ..Default::default()
            },
        )
    }

    pub(crate) fn init(def: &ComponentDef, patcher: Rc<Patcher>, init: InstanceInit) -> Component {
        static UID: AtomicU64 = AtomicU64::new(0);

        let InstanceInit {
            parent,
            placeholder,
            props_data,
            listeners,
            children,
        } = init;

        let vm = Component(Rc::new(ComponentInner {
            uid: UID.fetch_add(1, Ordering::Relaxed),
            def: def.clone(),
            patcher,
            parent: parent.as_ref().map(Component::downgrade),
            children: RefCell::new(Vec::new()),
            data: RefCell::new(None),
            props: Object::new(),
            computed: RefCell::new(IndexMap::new()),
            watchers: RefCell::new(Vec::new()),
            render_watcher: RefCell::new(None),
            vnode: RefCell::new(None),
            placeholder: RefCell::new(placeholder.as_ref().map_or_else(Weak::new, VNode::downgrade)),
            el: Cell::new(None),
            listeners: RefCell::new(listeners),
            slot_children: RefCell::new(children),
            is_mounted: Cell::new(false),
            is_destroyed: Cell::new(false),
            is_being_destroyed: Cell::new(false),
            inactive: Cell::new(None),
            direct_inactive: Cell::new(false),
        }));
        if let Some(parent) = &parent {
            parent.0.children.borrow_mut().push(vm.clone());
        }
        tracing::debug!(uid = vm.0.uid, name = def.name(), "component created");

        vm.call_hook(LifecycleHook::BeforeCreate);
        vm.init_props(props_data, parent.is_none());
        vm.init_data();
        vm.init_computed();
        vm.init_watch();
        vm.call_hook(LifecycleHook::Created);
        vm
    }

    fn init_props(&self, props_data: IndexMap<String, Value>, is_root: bool) {
        if !is_root {
            toggle_observing(false);
        }
        for prop in self.0.def.props() {
            let value = self.prop_value(&props_data, &prop.name);
            let custom_setter: Option<Rc<dyn Fn()>> = if is_root {
                None
            } else {
                let name = prop.name.clone();
                let weak = self.downgrade();
                Some(Rc::new(move || {
                    if is_updating_child() {
                        return;
                    }
                    let context = weak.upgrade().map(|vm| vm.name());
                    warn(
                        &format!(
                            "Avoid mutating a prop directly since the value will be overwritten whenever the parent component re-renders. Instead, use a data or computed property based on the prop's value. Prop being mutated: \"{name}\""
                        ),
                        context.as_deref(),
                    );
                }))
            };
            define_reactive(
                &self.0.props,
                &prop.name,
                Some(value),
                DefineOptions {
                    shallow: false,
                    custom_setter,
                },
            );
        }
        toggle_observing(true);
    }

    /// The value a prop takes: the passed value, else its default. Defaults
    /// are fresh values owned by the child and get observed.
    pub(crate) fn prop_value(&self, props_data: &IndexMap<String, Value>, name: &str) -> Value {
        if let Some(value) = props_data.get(name) {
            return value.clone();
        }
        let default = self
            .0
            .def
            .props()
            .iter()
            .find(|p| p.name == name)
            .and_then(PropDef::default_value)
            .unwrap_or_default();
        toggle_observing(true);
        observe(&default, false);
        if self.0.parent.is_some() {
            toggle_observing(false);
        }
        default
    }

    fn init_data(&self) {
        let name = self.name();
        let data = match self.0.def.data_fn() {
            Some(data_fn) => untracked(|| {
                invoke_with_error_handling(Some(&name), "data()", || data_fn())
            })
            .unwrap_or_default(),
            None => Value::Object(Object::new()),
        };
        let object = match data {
            Value::Object(object) => object,
            Value::Null => Object::new(),
            _ => {
                warn("data functions should return an object", Some(&name));
                Object::new()
            }
        };
        for key in object.keys() {
            if self.0.props.has_own(&key) {
                warn(
                    &format!(
                        "The data property \"{key}\" is already declared as a prop. Use prop default value instead."
                    ),
                    Some(&name),
                );
            }
        }
        observe(&Value::Object(object.clone()), true);
        *self.0.data.borrow_mut() = Some(object);
    }

    fn init_computed(&self) {
        let name = self.name();
        for def in self.0.def.computed() {
            if self.0.props.has_own(&def.name) {
                warn(
                    &format!("The computed property \"{}\" is already defined as a prop.", def.name),
                    Some(&name),
                );
                continue;
            }
            if self.data_object().is_some_and(|data| data.has_own(&def.name)) {
                warn(
                    &format!("The computed property \"{}\" is already defined in data.", def.name),
                    Some(&name),
                );
                continue;
            }

            let weak = self.downgrade();
            let get = def.get.clone();
            let getter = move || match weak.upgrade() {
                Some(vm) => get(&vm),
                None => Ok(Value::Null),
            };
            let setter = def.set.clone().map(|set| {
                let weak = self.downgrade();
                Rc::new(move |value: Value| match weak.upgrade() {
                    Some(vm) => set(&vm, value),
                    None => Ok(()),
                }) as ComputedSetter
            });
            match Computed::build(getter, setter, def.name.clone()) {
                Ok(computed) => {
                    self.0.computed.borrow_mut().insert(def.name.clone(), computed);
                }
                Err(err) => handle_error(&err, Some(&name), "computed"),
            }
        }
    }

    fn init_watch(&self) {
        for def in self.0.def.watch() {
            let handler = def.handler.clone();
            if let Err(err) = self.watch(&def.path, def.options, move |vm, new, old| {
                handler(vm, new, old)
            }) {
                handle_error(&err, Some(&self.name()), "watch");
            }
        }
    }

    /// Watch a dot-delimited path starting at a prop, data or computed key.
    ///
    /// The handler receives `(vm, new, old)`. With `immediate` it is also
    /// called once with the current value (and `Null` as the old one).
    pub fn watch(
        &self,
        path: &str,
        options: WatchOptions,
        handler: impl Fn(&Component, &Value, &Value) -> Result<()> + 'static,
    ) -> Result<Watcher> {
        let name = self.name();
        let getter_vm = self.downgrade();
        let getter: Box<dyn Fn() -> Result<Value>> = match parse_path(path) {
            Ok(parsed) => {
                let tail = parsed.tail();
                let head = parsed.segments().first().cloned().unwrap_or_default();
                Box::new(move || match getter_vm.upgrade() {
                    Some(vm) => Ok(tail.resolve(&vm.get(&head)?)),
                    None => Ok(Value::Null),
                })
            }
            Err(err) => {
                warn(&format!("{err}"), Some(&name));
                Box::new(|| Ok(Value::Null))
            }
        };

        let handler = Rc::new(handler);
        let callback_vm = self.downgrade();
        let callback_handler = handler.clone();
        let callback: WatcherCallback = Rc::new(move |new: &Value, old: &Value| {
            match callback_vm.upgrade() {
                Some(vm) => callback_handler(&vm, new, old),
                None => Ok(()),
            }
        });

        let watcher = Watcher::new(
            getter,
            Some(callback),
            WatcherOptions {
                deep: options.deep,
                sync: options.sync,
                user: true,
                expression: path.to_string(),
                owner: Some(self.owner_handle()),
                ..Default::default()
            },
        )?;
        self.0.watchers.borrow_mut().push(watcher.clone());

        if options.immediate {
            let value = watcher.value();
            untracked(|| {
                invoke_with_error_handling(
                    Some(&name),
                    &format!("callback for immediate watcher \"{path}\""),
                    || handler(self, &value, &Value::Null),
                )
            });
        }
        Ok(watcher)
    }

    fn owner_handle(&self) -> Weak<dyn WatcherOwner> {
        let weak: Weak<ComponentInner> = Rc::downgrade(&self.0);
        weak
    }

    /// Mount the instance: render, patch, and (for a root) fire `mounted`.
    ///
    /// `el` is an existing platform element to replace. Without one the
    /// tree is built detached and can be read back through [`Component::el`].
    pub fn mount(&self, el: Option<DomRef>) -> Result<()> {
        self.0.el.set(el);
        if self.0.def.render_fn().is_none() {
            warn(
                "Failed to mount component: template or render function not defined.",
                Some(&self.name()),
            );
        }
        self.call_hook(LifecycleHook::BeforeMount);

        let render_vm = self.downgrade();
        let before_vm = self.downgrade();
        let after_vm = self.downgrade();
        let watcher = Watcher::new(
            move || {
                if let Some(vm) = render_vm.upgrade() {
                    let vnode = vm.render();
                    vm.update(vnode);
                }
                Ok(Value::Null)
            },
            None,
            WatcherOptions {
                expression: format!("render of <{}>", self.name()),
                before: Some(Rc::new(move || {
                    if let Some(vm) = before_vm.upgrade() {
                        if vm.is_mounted() && !vm.is_destroyed() {
                            vm.call_hook(LifecycleHook::BeforeUpdate);
                        }
                    }
                })),
                after: Some(Rc::new(move || {
                    if let Some(vm) = after_vm.upgrade() {
                        if vm.is_mounted() && !vm.is_destroyed() {
                            vm.call_hook(LifecycleHook::Updated);
                        }
                    }
                })),
                owner: Some(self.owner_handle()),
                ..Default::default()
            },
        )?;
        *self.0.render_watcher.borrow_mut() = Some(watcher);

        if self.placeholder().is_none() {
            self.0.is_mounted.set(true);
            self.call_hook(LifecycleHook::Mounted);
        }
        Ok(())
    }

    /// Run the render function. Errors are reported and the previous tree
    /// (or an empty node) is used instead.
    pub(crate) fn render(&self) -> VNode {
        let name = self.name();
        let previous = swap_slot(&RENDERING_INSTANCE, Some(self.downgrade()));
        let result = match self.0.def.render_fn() {
            Some(render) => {
                let ctx = RenderContext::for_instance(self);
                render(&ctx)
            }
            None => Ok(VNode::empty()),
        };
        swap_slot(&RENDERING_INSTANCE, previous);

        let vnode = match result {
            Ok(vnode) => vnode,
            Err(err) => {
                handle_error(&err, Some(&name), "render");
                self.rendered_vnode().unwrap_or_else(VNode::empty)
            }
        };
        vnode.set_parent(self.placeholder().as_ref());
        vnode
    }

    /// Patch the rendered tree into the DOM.
    pub(crate) fn update(&self, vnode: VNode) {
        let previous_vnode = self.0.vnode.replace(Some(vnode.clone()));
        let previous_active = swap_slot(&ACTIVE_INSTANCE, Some(self.downgrade()));

        let old = match previous_vnode {
            Some(old) => Some(PatchTarget::VNode(old)),
            None => self.0.el.get().map(PatchTarget::Element),
        };
        let el = self.0.patcher.patch(old, Some(&vnode), false);
        self.0.el.set(el);

        swap_slot(&ACTIVE_INSTANCE, previous_active);

        // A parent whose root is this component shares its element.
        if let (Some(placeholder), Some(parent)) = (self.placeholder(), self.parent()) {
            if parent.rendered_vnode().is_some_and(|root| root.ptr_eq(&placeholder)) {
                parent.0.el.set(el);
            }
        }
        tracing::trace!(uid = self.0.uid, "component patched");
    }

    /// Schedule a re-render.
    pub fn force_update(&self) {
        let watcher = self.0.render_watcher.borrow().clone();
        if let Some(watcher) = watcher {
            watcher.update();
        }
    }

    /// Tear the instance down. Idempotent.
    pub fn destroy(&self) {
        if self.0.is_being_destroyed.get() {
            return;
        }
        self.call_hook(LifecycleHook::BeforeDestroy);
        self.0.is_being_destroyed.set(true);

        if let Some(parent) = self.parent() {
            if !parent.0.is_being_destroyed.get() {
                parent
                    .0
                    .children
                    .borrow_mut()
                    .retain(|child| !Rc::ptr_eq(&child.0, &self.0));
            }
        }

        let render_watcher = self.0.render_watcher.borrow_mut().take();
        if let Some(watcher) = render_watcher {
            watcher.teardown();
        }
        let watchers = std::mem::take(&mut *self.0.watchers.borrow_mut());
        for watcher in watchers {
            watcher.teardown();
        }
        let computed = std::mem::take(&mut *self.0.computed.borrow_mut());
        for computed in computed.values() {
            computed.teardown();
        }
        if let Some(observer) = self.data_object().and_then(|data| data.observer()) {
            observer.release_root();
        }

        self.0.is_destroyed.set(true);
        let vnode = self.0.vnode.borrow().clone();
        if let Some(vnode) = vnode {
            self.0.patcher.patch(Some(PatchTarget::VNode(vnode)), None, false);
        }
        self.call_hook(LifecycleHook::Destroyed);
        self.0.listeners.borrow_mut().clear();
        tracing::debug!(uid = self.0.uid, "component destroyed");
    }

    /// Read a prop, data or computed value (in that order). Reads are
    /// tracked.
    pub fn get(&self, key: &str) -> Result<Value> {
        if self.0.props.has_own(key) {
            return Ok(self.0.props.get(key).unwrap_or_default());
        }
        if let Some(data) = self.data_object() {
            if data.has_own(key) {
                return Ok(data.get(key).unwrap_or_default());
            }
        }
        let computed = self.0.computed.borrow().get(key).cloned();
        if let Some(computed) = computed {
            return computed.get();
        }
        warn(
            &format!("Property or method \"{key}\" is not defined on the instance but referenced during render."),
            Some(&self.name()),
        );
        Ok(Value::Null)
    }

    /// Write a prop, data or computed value.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.0.props.has_own(key) {
            self.0.props.assign(key, value);
            return Ok(());
        }
        if let Some(data) = self.data_object() {
            if data.has_own(key) {
                data.assign(key, value);
                return Ok(());
            }
        }
        let computed = self.0.computed.borrow().get(key).cloned();
        if let Some(computed) = computed {
            return computed.set(value);
        }
        warn(
            &format!("Property \"{key}\" is not declared; add it to data to make it reactive."),
            Some(&self.name()),
        );
        Ok(())
    }

    /// Register a handler for a component event.
    pub fn on(&self, event: impl Into<String>, handler: impl Fn(&Event) -> Result<()> + 'static) {
        let handler: EventHandler = Rc::new(handler);
        self.0
            .listeners
            .borrow_mut()
            .entry(event.into())
            .or_default()
            .push(handler);
    }

    /// Call every handler registered for `event`. Handler errors are
    /// reported, not returned.
    pub fn emit(&self, event: &str, args: Vec<Value>) {
        let handlers = self.0.listeners.borrow().get(event).cloned();
        let Some(handlers) = handlers else {
            return;
        };
        let payload = Event::new(event, None, args);
        let info = format!("event handler for \"{event}\"");
        let name = self.name();
        for handler in handlers {
            invoke_with_error_handling(Some(&name), &info, || handler(&payload));
        }
    }

    /// Run the hooks of one lifecycle stage. Hooks never track and their
    /// errors are reported.
    pub(crate) fn call_hook(&self, hook: LifecycleHook) {
        let hooks = self.0.def.hooks(hook);
        if hooks.is_empty() {
            return;
        }
        let name = self.name();
        let info = format!("{} hook", hook.name());
        untracked(|| {
            for f in hooks {
                invoke_with_error_handling(Some(&name), &info, || f(self));
            }
        });
    }

    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    pub fn name(&self) -> String {
        self.0.def.name().to_string()
    }

    pub fn def(&self) -> &ComponentDef {
        &self.0.def
    }

    /// The patcher shared by this instance's subtree.
    pub(crate) fn patcher(&self) -> Rc<Patcher> {
        self.0.patcher.clone()
    }

    pub fn parent(&self) -> Option<Component> {
        self.0.parent.as_ref().and_then(WeakComponent::upgrade)
    }

    pub fn children(&self) -> Vec<Component> {
        self.0.children.borrow().clone()
    }

    /// Root platform node of the rendered tree.
    pub fn el(&self) -> Option<DomRef> {
        self.0.el.get()
    }

    /// The tree produced by the last render.
    pub fn rendered_vnode(&self) -> Option<VNode> {
        self.0.vnode.borrow().clone()
    }

    /// The node standing for this component in its parent's tree.
    pub fn placeholder(&self) -> Option<VNode> {
        VNode::upgrade(&self.0.placeholder.borrow())
    }

    pub(crate) fn set_placeholder(&self, vnode: &VNode) {
        *self.0.placeholder.borrow_mut() = vnode.downgrade();
    }

    pub fn scope_id(&self) -> Option<String> {
        self.0.def.scope_id().map(str::to_string)
    }

    pub fn props(&self) -> &Object {
        &self.0.props
    }

    pub fn data_object(&self) -> Option<Object> {
        self.0.data.borrow().clone()
    }

    pub(crate) fn slot_children(&self) -> Vec<VNode> {
        self.0.slot_children.borrow().clone()
    }

    pub(crate) fn replace_slot_children(&self, children: Vec<VNode>) -> Vec<VNode> {
        self.0.slot_children.replace(children)
    }

    pub(crate) fn replace_listeners(&self, listeners: IndexMap<String, Handlers>) {
        *self.0.listeners.borrow_mut() = listeners;
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.0.render_watcher.borrow().clone()
    }

    /// User watchers still active.
    pub fn watchers(&self) -> Vec<Watcher> {
        self.0.watchers.borrow().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.0.is_mounted.get()
    }

    pub(crate) fn set_mounted(&self) {
        self.0.is_mounted.set(true);
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.is_destroyed.get()
    }

    /// Deactivated by a keep-alive ancestor.
    pub fn is_inactive(&self) -> bool {
        self.0.inactive.get() == Some(true)
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("uid", &self.0.uid)
            .field("name", &self.0.def.name())
            .field("mounted", &self.0.is_mounted.get())
            .field("destroyed", &self.0.is_destroyed.get())
            .finish()
    }
}
