//! Component definitions and the component registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::instance::Component;
use super::render::RenderContext;
use crate::error::Result;
use crate::reactive::Value;
use crate::vdom::VNode;

/// Lifecycle hook callback.
pub type HookFn = Rc<dyn Fn(&Component) -> Result<()>>;

/// Factory for a fresh data object per instance.
pub type DataFn = Rc<dyn Fn() -> Result<Value>>;

pub type ComputedGetFn = Rc<dyn Fn(&Component) -> Result<Value>>;

pub type ComputedSetFn = Rc<dyn Fn(&Component, Value) -> Result<()>>;

/// Watch handler, called with `(vm, new, old)`.
pub type WatchHandler = Rc<dyn Fn(&Component, &Value, &Value) -> Result<()>>;

pub type RenderFn = Rc<dyn Fn(&RenderContext) -> Result<VNode>>;

/// Builds a prop's default. Called once per instance that needs it.
pub type PropDefaultFn = Rc<dyn Fn() -> Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl LifecycleHook {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleHook::BeforeCreate => "beforeCreate",
            LifecycleHook::Created => "created",
            LifecycleHook::BeforeMount => "beforeMount",
            LifecycleHook::Mounted => "mounted",
            LifecycleHook::BeforeUpdate => "beforeUpdate",
            LifecycleHook::Updated => "updated",
            LifecycleHook::Activated => "activated",
            LifecycleHook::Deactivated => "deactivated",
            LifecycleHook::BeforeDestroy => "beforeDestroy",
            LifecycleHook::Destroyed => "destroyed",
        }
    }
}

#[derive(Clone)]
pub struct PropDef {
    pub name: String,
    pub default: Option<PropDefaultFn>,
}

impl PropDef {
    /// A fresh default value, or `None` when the prop declares none.
    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(|make| make())
    }
}

#[derive(Clone)]
pub struct ComputedDef {
    pub name: String,
    pub get: ComputedGetFn,
    pub set: Option<ComputedSetFn>,
}

/// Options of a user watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    pub deep: bool,
    /// Call the handler once with the initial value.
    pub immediate: bool,
    pub sync: bool,
}

#[derive(Clone)]
pub struct WatchDef {
    pub path: String,
    pub handler: WatchHandler,
    pub options: WatchOptions,
}

struct DefInner {
    cid: u64,
    name: String,
    props: Vec<PropDef>,
    data: Option<DataFn>,
    computed: Vec<ComputedDef>,
    watch: Vec<WatchDef>,
    render: Option<RenderFn>,
    hooks: HashMap<LifecycleHook, Vec<HookFn>>,
    components: IndexMap<String, ComponentDef>,
    scope_id: Option<String>,
    functional: bool,
}

/// An immutable component definition. Cloning shares it.
#[derive(Clone)]
pub struct ComponentDef(Rc<DefInner>);

impl ComponentDef {
    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder {
            inner: DefInner {
                cid: next_cid(),
                name: name.into(),
                props: Vec::new(),
                data: None,
                computed: Vec::new(),
                watch: Vec::new(),
                render: None,
                hooks: HashMap::new(),
                components: IndexMap::new(),
                scope_id: None,
                functional: false,
            },
        }
    }

    /// Unique constructor id.
    pub fn cid(&self) -> u64 {
        self.0.cid
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn props(&self) -> &[PropDef] {
        &self.0.props
    }

    pub fn data_fn(&self) -> Option<&DataFn> {
        self.0.data.as_ref()
    }

    pub fn computed(&self) -> &[ComputedDef] {
        &self.0.computed
    }

    pub fn watch(&self) -> &[WatchDef] {
        &self.0.watch
    }

    pub fn render_fn(&self) -> Option<&RenderFn> {
        self.0.render.as_ref()
    }

    pub fn hooks(&self, hook: LifecycleHook) -> &[HookFn] {
        self.0.hooks.get(&hook).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn components(&self) -> &IndexMap<String, ComponentDef> {
        &self.0.components
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.0.scope_id.as_deref()
    }

    pub fn is_functional(&self) -> bool {
        self.0.functional
    }

    pub fn ptr_eq(&self, other: &ComponentDef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("cid", &self.0.cid)
            .field("name", &self.0.name)
            .field("functional", &self.0.functional)
            .finish()
    }
}

fn next_cid() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub struct ComponentBuilder {
    inner: DefInner,
}

impl ComponentBuilder {
    pub fn prop(mut self, name: impl Into<String>) -> Self {
        self.inner.props.push(PropDef {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Declare a prop with a default. Object and array defaults are copied
    /// for every instance, so instances never share a container.
    pub fn prop_with_default(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        let template = default.into().to_json();
        self.prop_with_default_fn(name, move || Value::from_json(template.clone()))
    }

    pub fn prop_with_default_fn(
        mut self,
        name: impl Into<String>,
        default: impl Fn() -> Value + 'static,
    ) -> Self {
        self.inner.props.push(PropDef {
            name: name.into(),
            default: Some(Rc::new(default)),
        });
        self
    }

    pub fn data(mut self, data: impl Fn() -> Result<Value> + 'static) -> Self {
        self.inner.data = Some(Rc::new(data));
        self
    }

    pub fn computed(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&Component) -> Result<Value> + 'static,
    ) -> Self {
        self.inner.computed.push(ComputedDef {
            name: name.into(),
            get: Rc::new(get),
            set: None,
        });
        self
    }

    pub fn computed_with_setter(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&Component) -> Result<Value> + 'static,
        set: impl Fn(&Component, Value) -> Result<()> + 'static,
    ) -> Self {
        self.inner.computed.push(ComputedDef {
            name: name.into(),
            get: Rc::new(get),
            set: Some(Rc::new(set)),
        });
        self
    }

    pub fn watch(
        mut self,
        path: impl Into<String>,
        options: WatchOptions,
        handler: impl Fn(&Component, &Value, &Value) -> Result<()> + 'static,
    ) -> Self {
        self.inner.watch.push(WatchDef {
            path: path.into(),
            handler: Rc::new(handler),
            options,
        });
        self
    }

    pub fn render(mut self, render: impl Fn(&RenderContext) -> Result<VNode> + 'static) -> Self {
        self.inner.render = Some(Rc::new(render));
        self
    }

    pub fn hook(
        mut self,
        hook: LifecycleHook,
        f: impl Fn(&Component) -> Result<()> + 'static,
    ) -> Self {
        self.inner.hooks.entry(hook).or_default().push(Rc::new(f));
        self
    }

    /// Register a component visible only to this one's render function.
    pub fn component(mut self, name: impl Into<String>, def: ComponentDef) -> Self {
        self.inner.components.insert(name.into(), def);
        self
    }

    /// Scoped-style id stamped on every element this component renders.
    pub fn scope_id(mut self, id: impl Into<String>) -> Self {
        self.inner.scope_id = Some(id.into());
        self
    }

    /// Stateless: no instance, rendered inline into the parent's tree.
    pub fn functional(mut self) -> Self {
        self.inner.functional = true;
        self
    }

    pub fn build(self) -> ComponentDef {
        ComponentDef(Rc::new(self.inner))
    }
}

thread_local! {
    static REGISTRY: RefCell<IndexMap<String, ComponentDef>> = RefCell::new(IndexMap::new());
}

/// Register a component globally.
pub fn register(name: impl Into<String>, def: ComponentDef) {
    REGISTRY.with(|registry| {
        registry.borrow_mut().insert(name.into(), def);
    });
}

/// Resolve a component tag: the context's local registry first, then its
/// ancestors', then the global one. Each is tried with the tag as written,
/// camelized and PascalCased.
pub fn resolve_component(context: Option<&Component>, id: &str) -> Option<ComponentDef> {
    let camelized = camelize(id);
    let pascal = capitalize(&camelized);
    let candidates = [id, camelized.as_str(), pascal.as_str()];
    let lookup = |map: &IndexMap<String, ComponentDef>| {
        candidates.iter().find_map(|name| map.get(*name).cloned())
    };

    let mut owner = context.cloned();
    while let Some(vm) = owner {
        if let Some(def) = lookup(vm.def().components()) {
            return Some(def);
        }
        owner = vm.parent();
    }
    REGISTRY.with(|registry| lookup(&*registry.borrow()))
}

/// `my-comp` → `myComp`.
pub(crate) fn camelize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `myProp` → `my-prop`.
pub(crate) fn hyphenate(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
