//! Computed Values
//!
//! A [`Computed`] caches the result of a getter in a lazy watcher.
//!
//! # How It Works
//!
//! 1. Nothing runs at creation. The first [`Computed::get`] evaluates the
//!    getter and caches the value.
//!
//! 2. When a dependency changes the watcher only marks itself dirty. The
//!    getter runs again on the next read, exactly once.
//!
//! 3. Reading a computed value inside another watcher subscribes that
//!    watcher to the computed value's own dependencies, so it reacts to the
//!    underlying state directly.

use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::value::Value;
use super::watcher::{Watcher, WatcherOptions};
use crate::error::{warn, Result};

/// Setter of a writable computed value.
pub type ComputedSetter = Rc<dyn Fn(Value) -> Result<()>>;

/// A cached derived value.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
    setter: Option<ComputedSetter>,
}

impl Computed {
    /// Create a read-only computed value.
    pub fn new<F>(getter: F) -> Result<Self>
    where
        F: Fn() -> Result<Value> + 'static,
    {
        Self::build(getter, None, String::new())
    }

    /// Create a computed value that accepts writes through `setter`.
    pub fn with_setter<F>(getter: F, setter: ComputedSetter) -> Result<Self>
    where
        F: Fn() -> Result<Value> + 'static,
    {
        Self::build(getter, Some(setter), String::new())
    }

    pub(crate) fn build<F>(
        getter: F,
        setter: Option<ComputedSetter>,
        expression: String,
    ) -> Result<Self>
    where
        F: Fn() -> Result<Value> + 'static,
    {
        let watcher = Watcher::new(
            getter,
            None,
            WatcherOptions {
                lazy: true,
                expression,
                ..Default::default()
            },
        )?;
        Ok(Self { watcher, setter })
    }

    /// Read the value, recomputing it if stale.
    pub fn get(&self) -> Result<Value> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if ReactiveContext::is_tracking() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    /// Write through the setter. Without one this only warns.
    pub fn set(&self, value: Value) -> Result<()> {
        match &self.setter {
            Some(setter) => setter(value),
            None => {
                warn(
                    &format!(
                        "Computed property \"{}\" was assigned to but it has no setter.",
                        self.watcher.expression()
                    ),
                    None,
                );
                Ok(())
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The underlying lazy watcher.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Stop tracking.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("watcher", &self.watcher)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn getter_runs_once_until_a_dependency_changes() {
        let data = Value::from_json(json!({ "a": 2 }));
        observe(&data, false);
        let object = data.as_object().unwrap().clone();
        let runs = Rc::new(Cell::new(0));

        let counter = runs.clone();
        let reader = object.clone();
        let double = Computed::new(move || {
            counter.set(counter.get() + 1);
            let a = reader.get("a").and_then(|v| v.as_f64()).unwrap_or_default();
            Ok(Value::from(a * 2.0))
        })
        .unwrap();

        assert_eq!(runs.get(), 0);
        assert_eq!(double.get().unwrap().as_f64(), Some(4.0));
        assert_eq!(double.get().unwrap().as_f64(), Some(4.0));
        assert_eq!(runs.get(), 1);

        object.assign("a", Value::from(5));
        assert_eq!(runs.get(), 1);
        assert_eq!(double.get().unwrap().as_f64(), Some(10.0));
        double.get().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn readers_subscribe_to_underlying_state() {
        let data = Value::from_json(json!({ "a": 1 }));
        observe(&data, false);
        let object = data.as_object().unwrap().clone();

        let reader = object.clone();
        let computed = Computed::new(move || Ok(reader.get("a").unwrap_or_default())).unwrap();

        let source = computed.clone();
        let outer = Watcher::new(
            move || source.get(),
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )
        .unwrap();
        outer.evaluate().unwrap();

        assert_eq!(outer.dep_ids(), vec![object.property_dep("a").unwrap()]);

        object.assign("a", Value::from(2));
        assert!(outer.is_dirty());
    }

    #[test]
    fn setter_is_called() {
        let written = Rc::new(Cell::new(0.0));
        let sink = written.clone();
        let computed = Computed::with_setter(
            || Ok(Value::Null),
            Rc::new(move |v: Value| {
                sink.set(v.as_f64().unwrap_or_default());
                Ok(())
            }),
        )
        .unwrap();

        computed.set(Value::from(3)).unwrap();
        assert_eq!(written.get(), 3.0);
    }

    #[test]
    fn read_only_set_is_a_no_op() {
        let computed = Computed::new(|| Ok(Value::from(1))).unwrap();
        assert!(computed.set(Value::from(2)).is_ok());
        assert_eq!(computed.get().unwrap().as_f64(), Some(1.0));
    }
}
