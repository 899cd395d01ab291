//! Observers
//!
//! An [`Observer`] is attached to a container the first time it is placed
//! into reactive state. It owns the container-level dependency used for
//! structural changes (properties added or deleted through [`set`]/[`del`],
//! array mutations) and counts how many components use the container as
//! their root state.
//!
//! # How Observation Works
//!
//! 1. [`observe`] is idempotent: a container has at most one observer, and
//!    observing it again returns the existing one.
//!
//! 2. Observing an object instruments each of its configurable properties
//!    with [`define_reactive`], which recursively observes the property
//!    values. Observing an array observes each element.
//!
//! 3. Primitives, containers tagged with `mark_raw`, and non-extensible
//!    objects are never observed. Observation can also be switched off
//!    temporarily with [`toggle_observing`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::object::{Accessor, Object, Property};
use super::value::Value;
use crate::error::warn;

/// The observed-value wrapper attached to an object or array.
pub struct Observer {
    dep: Dep,
    vm_count: Cell<usize>,
}

impl Observer {
    fn new() -> Self {
        Self {
            dep: Dep::new(),
            vm_count: Cell::new(0),
        }
    }

    /// The container-level dependency.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// Number of components using this container as root state.
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    pub(crate) fn release_root(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("vm_count", &self.vm_count.get())
            .finish()
    }
}

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable creation of new observers on this thread.
pub fn toggle_observing(value: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(value));
}

fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Attach an observer to `value` (if it is an observable container) and
/// return it. `as_root_data` pins the container as a component's root state.
pub fn observe(value: &Value, as_root_data: bool) -> Option<Rc<Observer>> {
    let observer = match value {
        Value::Object(object) => match object.observer() {
            Some(existing) => existing,
            None if should_observe() && !object.is_raw() && object.is_extensible() => {
                let observer = Rc::new(Observer::new());
                // Set before walking so cyclic graphs terminate.
                if object.0.observer.set(observer.clone()).is_err() {
                    return object.observer();
                }
                walk(object);
                observer
            }
            None => return None,
        },
        Value::Array(array) => match array.observer() {
            Some(existing) => existing,
            None if should_observe() && !array.is_raw() => {
                let observer = Rc::new(Observer::new());
                if array.0.observer.set(observer.clone()).is_err() {
                    return array.observer();
                }
                for item in array.to_vec() {
                    observe(&item, false);
                }
                observer
            }
            None => return None,
        },
        _ => return None,
    };

    if as_root_data {
        observer.vm_count.set(observer.vm_count.get() + 1);
    }
    Some(observer)
}

fn walk(object: &Object) {
    for key in object.keys() {
        define_reactive(object, &key, None, DefineOptions::default());
    }
}

/// Options for [`define_reactive`].
#[derive(Clone, Default)]
pub struct DefineOptions {
    /// Do not observe the property's value.
    pub shallow: bool,

    /// Called before every effective write (used to warn about direct prop
    /// mutation).
    pub custom_setter: Option<Rc<dyn Fn()>>,
}

/// Instrument `key` on `object` with its own dependency.
///
/// With `value == None` the current value is kept (read through the getter
/// when the property is an accessor with a setter). Non-configurable
/// properties are left untouched.
pub fn define_reactive(object: &Object, key: &str, value: Option<Value>, options: DefineOptions) {
    let (accessor, existing, configurable) = {
        let props = object.0.props.borrow();
        match props.get(key) {
            Some(prop) => (prop.accessor.clone(), prop.value.clone(), prop.configurable),
            None => (None, Value::Null, true),
        }
    };
    if !configurable {
        return;
    }

    let value = match value {
        Some(value) => value,
        None => match &accessor {
            Some(Accessor { get, set: Some(_) }) => {
                let _ctx = ReactiveContext::untracked();
                get()
            }
            Some(Accessor { set: None, .. }) => Value::Null,
            None => existing,
        },
    };

    if !options.shallow {
        observe(&value, false);
    }

    let property = Property {
        value,
        accessor,
        dep: Some(Dep::new()),
        configurable: true,
        shallow: options.shallow,
        custom_setter: options.custom_setter,
    };
    object
        .0
        .props
        .borrow_mut()
        .insert(key.to_string(), property);
}

/// Key for [`set`] and [`del`]: an array index or a property name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropKey {
    Index(usize),
    Name(String),
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Index(index)
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Name(name.to_string())
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Name(name)
    }
}

/// Set a property, adding it reactively if it does not exist yet.
///
/// Array indices go through `splice` so the array's observer fires. Adding a
/// property to a component's root state is refused with a warning. Returns
/// the value that was set.
pub fn set(target: &Value, key: impl Into<PropKey>, value: Value) -> Value {
    let key = key.into();
    match (target, key) {
        (Value::Array(array), PropKey::Index(index)) => {
            if index >= array.len() {
                array.assign_index(index, Value::Null);
            }
            array.splice(index, 1, [value.clone()]);
            value
        }
        (Value::Object(object), PropKey::Name(name)) => {
            if object.has_own(&name) {
                object.assign(&name, value.clone());
                return value;
            }
            let observer = object.observer();
            if observer.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                warn(
                    "Avoid adding reactive properties to a component's root state at runtime - \
                     declare it upfront in the data option.",
                    None,
                );
                return value;
            }
            match observer {
                None => object.assign(&name, value.clone()),
                Some(observer) => {
                    if !object.is_extensible() {
                        return value;
                    }
                    define_reactive(object, &name, Some(value.clone()), DefineOptions::default());
                    observer.dep().notify();
                }
            }
            value
        }
        (Value::Object(object), PropKey::Index(index)) => set(
            &Value::Object(object.clone()),
            PropKey::Name(index.to_string()),
            value,
        ),
        (Value::Array(_), PropKey::Name(name)) => {
            warn(
                &format!("Cannot set non-index property \"{name}\" on an array"),
                None,
            );
            value
        }
        (primitive, _) => {
            warn(
                &format!(
                    "Cannot set reactive property on null or primitive value: {primitive:?}"
                ),
                None,
            );
            value
        }
    }
}

/// Delete a property and notify the container's observer.
pub fn del(target: &Value, key: impl Into<PropKey>) {
    let key = key.into();
    match (target, key) {
        (Value::Array(array), PropKey::Index(index)) => {
            if index < array.len() {
                array.splice(index, 1, Vec::new());
            }
        }
        (Value::Object(object), key) => {
            let name = match key {
                PropKey::Name(name) => name,
                PropKey::Index(index) => index.to_string(),
            };
            let observer = object.observer();
            if observer.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                warn(
                    "Avoid deleting properties on a component's root state - just set it to null.",
                    None,
                );
                return;
            }
            if !object.remove_own(&name) {
                return;
            }
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        (primitive, _) => {
            warn(
                &format!(
                    "Cannot delete reactive property on null or primitive value: {primitive:?}"
                ),
                None,
            );
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::reactive::{Array, Watcher, WatcherOptions};
    use serde_json::json;
    use std::cell::RefCell;

    fn capture_warnings() -> Rc<RefCell<Vec<String>>> {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        config::set_warn_handler(Some(Rc::new(move |msg: &str, _: Option<&str>| {
            sink.borrow_mut().push(msg.to_string());
        })));
        warnings
    }

    fn container_reader(value: &Value) -> Watcher {
        let observer = value.observer().unwrap();
        Watcher::new(
            move || {
                observer.dep().depend();
                Ok(Value::Null)
            },
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn observe_is_idempotent() {
        let value = Value::from_json(json!({ "a": { "b": 1 } }));
        let first = observe(&value, false).unwrap();
        let second = observe(&value, false).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn observe_recurses_into_nested_values() {
        let value = Value::from_json(json!({ "a": { "b": [ { "c": 1 } ] } }));
        observe(&value, false);

        let a = value.get("a").unwrap();
        let b = a.get("b").unwrap();
        let c_holder = b.as_array().unwrap().get(0).unwrap();

        assert!(a.observer().is_some());
        assert!(b.observer().is_some());
        assert!(c_holder.as_object().unwrap().is_reactive_property("c"));
    }

    #[test]
    fn observe_skips_primitives_raw_and_non_extensible_values() {
        assert!(observe(&Value::from(1), false).is_none());

        let raw = Object::new();
        raw.mark_raw();
        assert!(observe(&Value::Object(raw), false).is_none());

        let sealed = Object::new();
        sealed.prevent_extensions();
        assert!(observe(&Value::Object(sealed), false).is_none());
    }

    #[test]
    fn observe_handles_cycles() {
        let object = Object::new();
        object.assign("me", Value::Object(object.clone()));
        let value = Value::Object(object.clone());

        assert!(observe(&value, false).is_some());
        assert!(object.is_reactive_property("me"));
    }

    #[test]
    fn toggle_observing_suspends_observation() {
        toggle_observing(false);
        let value = Value::from_json(json!({ "a": 1 }));
        assert!(observe(&value, false).is_none());
        toggle_observing(true);
        assert!(observe(&value, false).is_some());
    }

    #[test]
    fn non_configurable_properties_are_not_instrumented() {
        let object = Object::new();
        object.define_property("locked", Value::from(1), false);
        object.assign("open", Value::from(2));
        observe(&Value::Object(object.clone()), false);

        assert!(!object.is_reactive_property("locked"));
        assert!(object.is_reactive_property("open"));
    }

    #[test]
    fn root_data_is_pinned() {
        let value = Value::from_json(json!({}));
        let observer = observe(&value, true).unwrap();
        observe(&value, true);
        assert_eq!(observer.vm_count(), 2);
    }

    #[test]
    fn set_adds_reactive_property_and_notifies_container() {
        let value = Value::from_json(json!({ "a": 1 }));
        observe(&value, false);
        let watcher = container_reader(&value);
        watcher.evaluate().unwrap();

        set(&value, "b", Value::from(2));

        let object = value.as_object().unwrap();
        assert!(object.is_reactive_property("b"));
        assert!(watcher.is_dirty());
    }

    #[test]
    fn set_on_existing_key_assigns() {
        let value = Value::from_json(json!({ "a": 1 }));
        observe(&value, false);
        let watcher = container_reader(&value);
        watcher.evaluate().unwrap();

        set(&value, "a", Value::from(5));

        // Existing keys notify the property, not the container.
        assert!(!watcher.is_dirty());
        assert_eq!(value.get("a").and_then(|v| v.as_f64()), Some(5.0));
    }

    #[test]
    fn set_on_unobserved_object_is_plain() {
        let value = Value::from_json(json!({}));
        set(&value, "a", Value::from(1));
        let object = value.as_object().unwrap();
        assert!(object.has_own("a"));
        assert!(!object.is_reactive_property("a"));
    }

    #[test]
    fn set_on_array_index_splices() {
        let value = Value::Array(Array::from_vec(vec![Value::from(1), Value::from(2)]));
        observe(&value, false);
        let watcher = container_reader(&value);
        watcher.evaluate().unwrap();

        set(&value, 1usize, Value::from(9));
        set(&value, 3usize, Value::from(7));

        let array = value.as_array().unwrap();
        assert!(watcher.is_dirty());
        assert_eq!(array.len(), 4);
        assert_eq!(array.get(1).and_then(|v| v.as_f64()), Some(9.0));
        assert!(array.get(2).unwrap().is_null());
    }

    #[test]
    fn set_on_root_state_warns() {
        let warnings = capture_warnings();
        let value = Value::from_json(json!({}));
        observe(&value, true);

        set(&value, "late", Value::from(1));

        assert!(!value.as_object().unwrap().has_own("late"));
        assert_eq!(warnings.borrow().len(), 1);
        config::set_warn_handler(None);
    }

    #[test]
    fn set_on_primitive_warns() {
        let warnings = capture_warnings();
        set(&Value::from(1), "a", Value::Null);
        assert_eq!(warnings.borrow().len(), 1);
        config::set_warn_handler(None);
    }

    #[test]
    fn del_removes_and_notifies() {
        let value = Value::from_json(json!({ "a": 1 }));
        observe(&value, false);
        let watcher = container_reader(&value);
        watcher.evaluate().unwrap();

        del(&value, "missing");
        assert!(!watcher.is_dirty());

        del(&value, "a");
        assert!(watcher.is_dirty());
        assert!(!value.as_object().unwrap().has_own("a"));
    }

    #[test]
    fn del_on_array_index_splices() {
        let value = Value::from_json(json!([1, 2, 3]));
        observe(&value, false);
        del(&value, 0usize);
        assert_eq!(value.to_json(), json!([2, 3]));
    }
}
