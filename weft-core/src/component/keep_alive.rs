//! Instance caching for components that are switched in and out.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::vdom::VNode;

/// Keeps the instances of component placeholders passed through
/// [`KeepAlive::wrap`] alive when they leave the tree, and reuses them when
/// a placeholder with the same cache key comes back.
///
/// A `KeepAlive` belongs to the component whose render function uses it,
/// usually captured in the render closure. Entries are evicted
/// least-recently-used first once `max` is exceeded; evicted instances are
/// destroyed.
#[derive(Default)]
pub struct KeepAlive {
    cache: RefCell<IndexMap<String, VNode>>,
    max: Option<usize>,
    include: Option<Vec<String>>,
    exclude: Vec<String>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache at most `max` entries. Zero means no limit.
    pub fn with_max(max: usize) -> Self {
        Self {
            max: (max > 0).then_some(max),
            ..Self::default()
        }
    }

    /// Only cache components with one of these names.
    pub fn include(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Never cache components with these names.
    pub fn exclude(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    /// Mark a component placeholder as kept alive, restoring its cached
    /// instance if there is one. Other nodes are returned untouched.
    pub fn wrap(&self, vnode: VNode) -> VNode {
        let Some(options) = vnode.component_options() else {
            return vnode;
        };
        let name = options.def.name();
        let included = self
            .include
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == name));
        if !included || self.exclude.iter().any(|n| n == name) {
            return vnode;
        }

        let key = match vnode.key() {
            Some(key) => key.to_string(),
            None => format!("{}::{}", options.def.cid(), options.tag),
        };

        let evicted = {
            let mut cache = self.cache.borrow_mut();
            match cache.shift_remove(&key) {
                Some(cached) => {
                    vnode.set_component_instance(cached.component_instance());
                    cache.insert(key, vnode.clone());
                    Vec::new()
                }
                None => {
                    cache.insert(key, vnode.clone());
                    let excess = self.max.map_or(0, |max| cache.len().saturating_sub(max));
                    cache.drain(..excess).collect::<Vec<_>>()
                }
            }
        };
        for (evicted_key, entry) in evicted {
            tracing::debug!(key = %evicted_key, "keep-alive entry evicted");
            if let Some(vm) = entry.component_instance() {
                vm.destroy();
            }
        }
        vnode.set_keep_alive(true);
        vnode
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    /// Cache keys, least recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.cache.borrow().keys().cloned().collect()
    }

    /// Drop one entry and destroy its instance.
    pub fn remove(&self, key: &str) {
        let evicted = self.cache.borrow_mut().shift_remove(key);
        if let Some(vm) = evicted.and_then(|vnode| vnode.component_instance()) {
            vm.destroy();
        }
    }

    /// Drop every entry and destroy the cached instances.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut *self.cache.borrow_mut());
        for vnode in entries.into_values() {
            if let Some(vm) = vnode.component_instance() {
                vm.destroy();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentDef, LifecycleHook};
    use crate::error::Result;
    use crate::reactive::Value;
    use crate::scheduler::run_until_idle;
    use crate::vdom::memory::MemoryDom;
    use crate::vdom::{DataArg, Patcher};
    use serde_json::json;
    use std::rc::Rc;

    fn tab(name: &'static str, log: Rc<RefCell<Vec<String>>>) -> ComponentDef {
        let hook = move |event: &'static str| {
            let log = log.clone();
            move |_: &Component| -> Result<()> {
                log.borrow_mut().push(format!("{name}:{event}"));
                Ok(())
            }
        };
        ComponentDef::builder(name)
            .render(move |ctx| Ok(ctx.h("section", DataArg::None, vec![name.into()])))
            .hook(LifecycleHook::Created, hook("created"))
            .hook(LifecycleHook::Activated, hook("activated"))
            .hook(LifecycleHook::Deactivated, hook("deactivated"))
            .hook(LifecycleHook::Destroyed, hook("destroyed"))
            .build()
    }

    fn switcher(keep: Rc<KeepAlive>, a: ComponentDef, b: ComponentDef) -> ComponentDef {
        ComponentDef::builder("Switcher")
            .data(|| Ok(Value::from_json(json!({ "current": "a" }))))
            .render(move |ctx| {
                let def = if ctx.get("current")?.as_str() == Some("a") { &a } else { &b };
                let inner = keep.wrap(ctx.h(def, DataArg::None, vec![]));
                Ok(ctx.h("div", DataArg::None, vec![inner.into()]))
            })
            .build()
    }

    #[test]
    fn switched_out_instances_are_reused() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let keep = Rc::new(KeepAlive::new());
        let def = switcher(keep.clone(), tab("A", log.clone()), tab("B", log.clone()));
        let dom = Rc::new(MemoryDom::new());
        let vm = Component::new(&def, Rc::new(Patcher::with_default_modules(dom.clone())));
        vm.mount(None).unwrap();
        let el = vm.el().unwrap();
        let first = vm.children().pop().unwrap();

        vm.set("current", "b").unwrap();
        run_until_idle();
        assert_eq!(dom.to_html(el), "<div><section>B</section></div>");
        assert!(first.is_inactive());
        assert!(!first.is_destroyed());

        vm.set("current", "a").unwrap();
        run_until_idle();
        assert_eq!(dom.to_html(el), "<div><section>A</section></div>");
        assert!(!first.is_inactive());
        assert_eq!(keep.len(), 2);

        assert_eq!(
            log.borrow().as_slice(),
            [
                "A:created",
                "A:activated",
                "B:created",
                "A:deactivated",
                "B:activated",
                "B:deactivated",
                "A:activated",
            ]
        );
    }

    #[test]
    fn max_evicts_the_least_recent_entry() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let keep = Rc::new(KeepAlive::with_max(1));
        let def = switcher(keep.clone(), tab("A", log.clone()), tab("B", log.clone()));
        let vm = Component::new(&def, Rc::new(Patcher::with_default_modules(Rc::new(MemoryDom::new()))));
        vm.mount(None).unwrap();
        let first = vm.children().pop().unwrap();

        vm.set("current", "b").unwrap();
        run_until_idle();
        assert!(first.is_destroyed());
        assert_eq!(keep.len(), 1);
        assert!(log.borrow().iter().any(|e| e == "A:destroyed"));
    }

    #[test]
    fn destroyed_hooks_may_inspect_the_cache() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let keep = Rc::new(KeepAlive::with_max(1));
        let (sink, cache) = (log.clone(), keep.clone());
        let a = ComponentDef::builder("A")
            .render(|ctx| Ok(ctx.h("section", DataArg::None, vec!["A".into()])))
            .hook(LifecycleHook::Destroyed, move |_: &Component| -> Result<()> {
                sink.borrow_mut().push(format!("A:destroyed:{:?}", cache.keys()));
                Ok(())
            })
            .build();
        let def = switcher(keep.clone(), a, tab("B", log.clone()));
        let vm = Component::new(&def, Rc::new(Patcher::with_default_modules(Rc::new(MemoryDom::new()))));
        vm.mount(None).unwrap();

        vm.set("current", "b").unwrap();
        run_until_idle();
        let b_key = keep.keys().pop().unwrap();
        assert!(log.borrow().contains(&format!("A:destroyed:{:?}", vec![b_key])));
    }

    #[test]
    fn zero_max_means_unbounded() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let keep = Rc::new(KeepAlive::with_max(0));
        let def = switcher(keep.clone(), tab("A", log.clone()), tab("B", log.clone()));
        let vm = Component::new(&def, Rc::new(Patcher::with_default_modules(Rc::new(MemoryDom::new()))));
        vm.mount(None).unwrap();
        let first = vm.children().pop().unwrap();
        assert_eq!(keep.len(), 1);

        vm.set("current", "b").unwrap();
        run_until_idle();
        vm.set("current", "a").unwrap();
        run_until_idle();

        assert_eq!(keep.len(), 2);
        assert!(!first.is_destroyed());
        assert!(!first.is_inactive());
        assert!(!log.borrow().iter().any(|e| e.ends_with(":destroyed")));
    }

    #[test]
    fn excluded_components_are_not_cached() {
        let keep = KeepAlive::new().exclude(["Plain"]);
        let def = ComponentDef::builder("Plain").build();
        let vnode = keep.wrap(crate::vdom::create_element(None, &def, DataArg::None, vec![]));
        assert!(!vnode.is_keep_alive());
        assert!(keep.is_empty());
    }
}
