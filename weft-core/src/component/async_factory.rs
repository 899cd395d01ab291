//! Async components.
//!
//! An [`AsyncFactory`] stands in for a component definition that is not
//! available yet. Rendering it produces an async placeholder (an empty
//! comment) and starts the loader once. When the loader resolves, every
//! component that rendered the placeholder is re-rendered; a rejected
//! factory renders nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::def::ComponentDef;
use super::instance::{Component, WeakComponent};
use crate::error::warn;

/// Loader invoked with the resolver the first time the factory is rendered.
pub type AsyncLoader = Rc<dyn Fn(AsyncResolver)>;

struct FactoryInner {
    loader: AsyncLoader,
    started: Cell<bool>,
    /// Set while the loader runs synchronously.
    sync: Cell<bool>,
    resolved: RefCell<Option<ComponentDef>>,
    error: RefCell<Option<String>>,
    owners: RefCell<Vec<WeakComponent>>,
}

/// Shared handle to an async component factory. Identity matters: two
/// placeholders match only when they come from the same factory.
#[derive(Clone)]
pub struct AsyncFactory(Rc<FactoryInner>);

impl AsyncFactory {
    pub fn new(loader: impl Fn(AsyncResolver) + 'static) -> Self {
        Self(Rc::new(FactoryInner {
            loader: Rc::new(loader),
            started: Cell::new(false),
            sync: Cell::new(false),
            resolved: RefCell::new(None),
            error: RefCell::new(None),
            owners: RefCell::new(Vec::new()),
        }))
    }

    pub fn resolved(&self) -> Option<ComponentDef> {
        self.0.resolved.borrow().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.0.error.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &AsyncFactory) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AsyncFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFactory")
            .field("resolved", &self.0.resolved.borrow().is_some())
            .field("error", &self.0.error.borrow())
            .finish()
    }
}

/// Completion handle passed to the loader. Only the first outcome counts.
#[derive(Clone)]
pub struct AsyncResolver {
    factory: Weak<FactoryInner>,
}

impl AsyncResolver {
    pub fn resolve(&self, def: ComponentDef) {
        let Some(inner) = self.factory.upgrade() else {
            return;
        };
        if inner.resolved.borrow().is_some() || inner.error.borrow().is_some() {
            return;
        }
        tracing::debug!(component = def.name(), "async component resolved");
        *inner.resolved.borrow_mut() = Some(def);
        settle(&inner);
    }

    pub fn reject(&self, reason: impl Into<String>) {
        let Some(inner) = self.factory.upgrade() else {
            return;
        };
        if inner.resolved.borrow().is_some() || inner.error.borrow().is_some() {
            return;
        }
        let reason = reason.into();
        warn(&format!("Failed to resolve async component: {reason}"), None);
        *inner.error.borrow_mut() = Some(reason);
        settle(&inner);
    }
}

/// Re-render the owners unless the outcome arrived during the render that
/// started the loader (which picks it up directly).
fn settle(inner: &FactoryInner) {
    let owners = std::mem::take(&mut *inner.owners.borrow_mut());
    if inner.sync.get() {
        return;
    }
    for owner in owners.iter().filter_map(WeakComponent::upgrade) {
        owner.force_update();
    }
}

/// Resolve `factory` for a render of `owner`.
///
/// Returns the definition once available. Otherwise the owner is
/// remembered for a re-render and the loader is started if it has not been.
pub fn resolve_async_component(
    factory: &AsyncFactory,
    owner: Option<&Component>,
) -> Option<ComponentDef> {
    let inner = &factory.0;
    if inner.error.borrow().is_some() {
        return None;
    }
    if let Some(def) = inner.resolved.borrow().clone() {
        return Some(def);
    }

    if let Some(owner) = owner {
        let mut owners = inner.owners.borrow_mut();
        if !owners.iter().any(|o| o.ptr_eq_component(owner)) {
            owners.push(owner.downgrade());
        }
    }

    if !inner.started.replace(true) {
        inner.sync.set(true);
        (inner.loader)(AsyncResolver {
            factory: Rc::downgrade(&factory.0),
        });
        inner.sync.set(false);
        return inner.resolved.borrow().clone();
    }
    None
}
