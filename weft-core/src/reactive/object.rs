//! Reactive Objects
//!
//! An [`Object`] is an insertion-ordered map of named properties. Each
//! property is either a plain data slot or, once the object has been observed
//! (or the property was added through [`define_reactive`]), an instrumented
//! slot carrying its own [`Dep`]:
//!
//! - reading an instrumented slot while a watcher evaluates subscribes the
//!   watcher to the slot, to the value's own observer (if the value is an
//!   observed container) and, for arrays, to every nested element observer;
//! - writing a different value stores it, observes it if it is a container,
//!   and notifies the slot's subscribers.
//!
//! Plain slots behave like ordinary JavaScript properties: [`Object::assign`]
//! on a missing key adds an untracked property. Use
//! [`set`](super::observer::set) to add a reactive one.
//!
//! [`define_reactive`]: super::observer::define_reactive

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::array::depend_array;
use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::observer::{observe, Observer};
use super::value::Value;

/// User-supplied getter for an accessor property.
pub type Getter = Rc<dyn Fn() -> Value>;

/// User-supplied setter for an accessor property.
pub type Setter = Rc<dyn Fn(Value)>;

/// Getter/setter pair of an accessor property.
#[derive(Clone)]
pub struct Accessor {
    pub get: Getter,
    pub set: Option<Setter>,
}

/// One property slot.
pub(crate) struct Property {
    pub(crate) value: Value,
    pub(crate) accessor: Option<Accessor>,
    pub(crate) dep: Option<Dep>,
    pub(crate) configurable: bool,
    pub(crate) shallow: bool,
    pub(crate) custom_setter: Option<Rc<dyn Fn()>>,
}

impl Property {
    pub(crate) fn plain(value: Value) -> Self {
        Self {
            value,
            accessor: None,
            dep: None,
            configurable: true,
            shallow: false,
            custom_setter: None,
        }
    }
}

pub(crate) struct ObjectInner {
    pub(crate) props: RefCell<IndexMap<String, Property>>,
    pub(crate) observer: OnceCell<Rc<Observer>>,
    raw: Cell<bool>,
    extensible: Cell<bool>,
    frozen: Cell<bool>,
}

/// Shared handle to a reactive object.
#[derive(Clone)]
pub struct Object(pub(crate) Rc<ObjectInner>);

/// What a read needs once the property borrow is released.
struct ReadPlan {
    getter: Option<Getter>,
    stored: Value,
    dep: Option<DepId>,
    shallow: bool,
}

impl Object {
    /// Create an empty, unobserved object.
    pub fn new() -> Self {
        Self(Rc::new(ObjectInner {
            props: RefCell::new(IndexMap::new()),
            observer: OnceCell::new(),
            raw: Cell::new(false),
            extensible: Cell::new(true),
            frozen: Cell::new(false),
        }))
    }

    /// Create an object from key/value pairs.
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let object = Self::new();
        for (key, value) in pairs {
            object.assign(&key.into(), value);
        }
        object
    }

    /// Check whether two handles point to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Read a property.
    ///
    /// Inside a watcher evaluation this subscribes the watcher to the
    /// property (see the module docs).
    pub fn get(&self, key: &str) -> Option<Value> {
        let plan = {
            let props = self.0.props.borrow();
            let prop = props.get(key)?;
            ReadPlan {
                getter: prop.accessor.as_ref().map(|a| a.get.clone()),
                stored: prop.value.clone(),
                dep: prop.dep.as_ref().map(Dep::id),
                shallow: prop.shallow,
            }
        };

        let value = match plan.getter {
            Some(getter) => getter(),
            None => plan.stored,
        };

        if let Some(dep) = plan.dep {
            if ReactiveContext::is_tracking() {
                dep.depend();
                if !plan.shallow {
                    if let Some(child) = value.observer() {
                        child.dep().depend();
                        if let Value::Array(array) = &value {
                            depend_array(array);
                        }
                    }
                }
            }
        }

        Some(value)
    }

    /// Read a property without tracking.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        let _ctx = ReactiveContext::untracked();
        self.get(key)
    }

    /// Assign a property, like `obj[key] = value`.
    ///
    /// Instrumented properties notify their subscribers when the value
    /// changes. Missing keys become plain, untracked properties (unless the
    /// object is non-extensible, in which case the write is ignored).
    pub fn assign(&self, key: &str, value: Value) {
        enum Plan {
            Insert,
            Ignore,
            Plain(Option<Accessor>),
            Reactive {
                dep: DepId,
                accessor: Option<Accessor>,
                stored: Value,
                shallow: bool,
                custom_setter: Option<Rc<dyn Fn()>>,
            },
        }

        let plan = {
            let props = self.0.props.borrow();
            match props.get(key) {
                None if self.0.extensible.get() => Plan::Insert,
                None => Plan::Ignore,
                Some(_) if self.0.frozen.get() => Plan::Ignore,
                Some(prop) => match &prop.dep {
                    None => Plan::Plain(prop.accessor.clone()),
                    Some(dep) => Plan::Reactive {
                        dep: dep.id(),
                        accessor: prop.accessor.clone(),
                        stored: prop.value.clone(),
                        shallow: prop.shallow,
                        custom_setter: prop.custom_setter.clone(),
                    },
                },
            }
        };

        match plan {
            Plan::Ignore => {}
            Plan::Insert => {
                self.0
                    .props
                    .borrow_mut()
                    .insert(key.to_string(), Property::plain(value));
            }
            Plan::Plain(Some(accessor)) => {
                if let Some(setter) = accessor.set {
                    setter(value);
                }
            }
            Plan::Plain(None) => self.store(key, value),
            Plan::Reactive {
                dep,
                accessor,
                stored,
                shallow,
                custom_setter,
            } => {
                let current = match &accessor {
                    Some(accessor) => {
                        let _ctx = ReactiveContext::untracked();
                        (accessor.get)()
                    }
                    None => stored,
                };
                if value.same_value(&current) {
                    return;
                }
                if let Some(custom_setter) = custom_setter {
                    custom_setter();
                }
                match accessor {
                    // Getter without setter: read-only.
                    Some(Accessor { set: None, .. }) => return,
                    Some(Accessor { set: Some(setter), .. }) => setter(value.clone()),
                    None => self.store(key, value.clone()),
                }
                if !shallow {
                    observe(&value, false);
                }
                dep.notify();
            }
        }
    }

    fn store(&self, key: &str, value: Value) {
        if let Some(prop) = self.0.props.borrow_mut().get_mut(key) {
            prop.value = value;
        }
    }

    /// Define a plain data property with an explicit `configurable` flag.
    ///
    /// Non-configurable properties are never instrumented.
    pub fn define_property(&self, key: &str, value: Value, configurable: bool) {
        let mut prop = Property::plain(value);
        prop.configurable = configurable;
        self.0.props.borrow_mut().insert(key.to_string(), prop);
    }

    /// Define an accessor property. Without a setter the property is
    /// read-only.
    pub fn define_accessor(&self, key: &str, get: Getter, set: Option<Setter>) {
        let mut prop = Property::plain(Value::Null);
        prop.accessor = Some(Accessor { get, set });
        self.0.props.borrow_mut().insert(key.to_string(), prop);
    }

    /// Check for an own property.
    pub fn has_own(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Property names in insertion order. Not tracked.
    pub fn keys(&self) -> Vec<String> {
        self.0.props.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.props.borrow().is_empty()
    }

    /// Check whether the property carries its own dependency.
    pub fn is_reactive_property(&self, key: &str) -> bool {
        self.0
            .props
            .borrow()
            .get(key)
            .is_some_and(|prop| prop.dep.is_some())
    }

    /// Dependency id of an instrumented property.
    pub fn property_dep(&self, key: &str) -> Option<DepId> {
        self.0
            .props
            .borrow()
            .get(key)
            .and_then(|prop| prop.dep.as_ref().map(Dep::id))
    }

    /// Remove a property without notifying anyone. Returns whether it existed.
    pub(crate) fn remove_own(&self, key: &str) -> bool {
        if self.0.frozen.get() {
            return false;
        }
        self.0.props.borrow_mut().shift_remove(key).is_some()
    }

    /// Tag the object as non-reactive. It will never be observed.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// Forbid adding new properties.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    /// Forbid adding, removing and changing properties.
    pub fn freeze(&self) {
        self.0.extensible.set(false);
        self.0.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// The object's observer, if it has been observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.get().cloned()
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props = match self.0.props.try_borrow() {
            Ok(props) => props,
            Err(_) => return write!(f, "{{..}}"),
        };
        let mut map = f.debug_map();
        for (key, prop) in props.iter() {
            match &prop.accessor {
                Some(_) => map.entry(key, &"<accessor>"),
                None => map.entry(key, &prop.value),
            };
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Value, Watcher, WatcherOptions};
    use serde_json::json;
    use std::cell::Cell;

    fn tracking_reader(object: &Object, key: &'static str) -> Watcher {
        let object = object.clone();
        Watcher::new(
            move || Ok(object.get(key).unwrap_or_default()),
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn unobserved_objects_behave_like_plain_maps() {
        let object = Object::new();
        object.assign("a", Value::from(1));

        assert!(object.has_own("a"));
        assert!(!object.is_reactive_property("a"));
        assert_eq!(object.get("a").and_then(|v| v.as_f64()), Some(1.0));
    }

    #[test]
    fn observed_reads_subscribe_the_evaluating_watcher() {
        let state = Value::from_json(json!({ "a": 1, "b": 2 }));
        observe(&state, false);
        let object = state.as_object().unwrap();

        let watcher = tracking_reader(object, "a");
        watcher.evaluate().unwrap();

        let a_dep = object.property_dep("a").unwrap();
        let b_dep = object.property_dep("b").unwrap();
        assert_eq!(watcher.dep_ids(), vec![a_dep]);
        assert_ne!(a_dep, b_dep);
    }

    #[test]
    fn writes_to_untouched_properties_do_not_dirty_readers() {
        let state = Value::from_json(json!({ "a": 1, "b": 2 }));
        observe(&state, false);
        let object = state.as_object().unwrap();

        let watcher = tracking_reader(object, "a");
        watcher.evaluate().unwrap();

        object.assign("b", Value::from(3));
        assert!(!watcher.is_dirty());

        object.assign("a", Value::from(3));
        assert!(watcher.is_dirty());
    }

    #[test]
    fn equal_writes_are_suppressed() {
        let state = Value::from_json(json!({ "n": 1 }));
        observe(&state, false);
        let object = state.as_object().unwrap();
        object.assign("n", Value::Number(f64::NAN));

        let watcher = tracking_reader(object, "n");
        watcher.evaluate().unwrap();

        object.assign("n", Value::Number(f64::NAN));
        assert!(!watcher.is_dirty());
    }

    #[test]
    fn accessor_without_setter_is_read_only() {
        let object = Object::new();
        object.define_accessor("fixed", Rc::new(|| Value::from(7)), None);
        let state = Value::Object(object.clone());
        observe(&state, false);

        object.assign("fixed", Value::from(8));
        assert_eq!(object.get("fixed").and_then(|v| v.as_f64()), Some(7.0));
        assert!(object.is_reactive_property("fixed"));
    }

    #[test]
    fn accessor_setter_is_called_and_notifies() {
        let backing = Rc::new(Cell::new(1.0));
        let read = backing.clone();
        let write = backing.clone();

        let object = Object::new();
        object.define_accessor(
            "x",
            Rc::new(move || Value::Number(read.get())),
            Some(Rc::new(move |v: Value| write.set(v.as_f64().unwrap_or_default()))),
        );
        observe(&Value::Object(object.clone()), false);

        let watcher = tracking_reader(&object, "x");
        watcher.evaluate().unwrap();

        object.assign("x", Value::from(5));
        assert_eq!(backing.get(), 5.0);
        assert!(watcher.is_dirty());
    }

    #[test]
    fn frozen_objects_ignore_writes() {
        let object = Object::from_pairs([("a", Value::from(1))]);
        object.freeze();

        object.assign("a", Value::from(2));
        object.assign("b", Value::from(2));

        assert_eq!(object.get("a").and_then(|v| v.as_f64()), Some(1.0));
        assert!(!object.has_own("b"));
    }
}
