//! Reactive Arrays
//!
//! Element access cannot be intercepted per index the way object properties
//! can, so an [`Array`] is tracked as a whole through its observer's
//! dependency. The mutating operations (`push`, `pop`, `shift`, `unshift`,
//! `splice`, `sort`, `reverse`) are implemented directly on the type and each
//! one, once the array is observed:
//!
//! 1. performs the mutation,
//! 2. observes any inserted elements,
//! 3. notifies the array's observer dependency.
//!
//! Operations that only remove or reorder still notify. On an unobserved
//! array they are plain mutations.

use std::cell::{Cell, OnceCell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::observer::{observe, Observer};
use super::value::Value;

pub(crate) struct ArrayInner {
    pub(crate) items: RefCell<Vec<Value>>,
    pub(crate) observer: OnceCell<Rc<Observer>>,
    raw: Cell<bool>,
}

/// Shared handle to a reactive array.
#[derive(Clone)]
pub struct Array(pub(crate) Rc<ArrayInner>);

impl Array {
    /// Create an empty, unobserved array.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayInner {
            items: RefCell::new(items),
            observer: OnceCell::new(),
            raw: Cell::new(false),
        }))
    }

    /// Check whether two handles point to the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    /// Element at `index`. Not tracked per index.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.borrow().get(index).cloned()
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Plain index assignment, like `arr[i] = value`. Not reactive: use
    /// [`set`](super::observer::set) for a tracked write.
    pub fn assign_index(&self, index: usize, value: Value) {
        let mut items = self.0.items.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        items[index] = value;
    }

    /// Append elements. Returns the new length.
    pub fn push(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let inserted: Vec<Value> = values.into_iter().collect();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.extend(inserted.iter().cloned());
            items.len()
        };
        self.mutated(&inserted);
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        let removed = self.0.items.borrow_mut().pop();
        self.mutated(&[]);
        removed
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        let removed = {
            let mut items = self.0.items.borrow_mut();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.mutated(&[]);
        removed
    }

    /// Prepend elements. Returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let inserted: Vec<Value> = values.into_iter().collect();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.splice(0..0, inserted.iter().cloned());
            items.len()
        };
        self.mutated(&inserted);
        len
    }

    /// Remove `delete_count` elements at `start` and insert `values` in their
    /// place. Returns the removed elements.
    ///
    /// `start` and `delete_count` are clamped to the array bounds.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let inserted: Vec<Value> = values.into_iter().collect();
        let removed = {
            let mut items = self.0.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let removed: Vec<Value> = items.splice(start..end, inserted.iter().cloned()).collect();
            removed
        };
        self.mutated(&inserted);
        removed
    }

    /// Sort by display string, nulls last.
    pub fn sort(&self) {
        self.sort_by(|a, b| match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.to_display_string().cmp(&b.to_display_string()),
        });
    }

    /// Stable sort with a comparator. The items are moved out while the
    /// comparator runs, so reading this array from it sees an empty array.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut items = std::mem::take(&mut *self.0.items.borrow_mut());
        items.sort_by(compare);
        *self.0.items.borrow_mut() = items;
        self.mutated(&[]);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.0.items.borrow_mut().reverse();
        self.mutated(&[]);
    }

    fn mutated(&self, inserted: &[Value]) {
        if let Some(observer) = self.observer() {
            for value in inserted {
                observe(value, false);
            }
            observer.dep().notify();
        }
    }

    /// Tag the array as non-reactive. It will never be observed.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// The array's observer, if it has been observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.get().cloned()
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.items.try_borrow() {
            Ok(items) => f.debug_list().entries(items.iter()).finish(),
            Err(_) => write!(f, "[..]"),
        }
    }
}

/// Subscribe the active watcher to every nested element observer.
///
/// Reading an array through a reactive property can only track the array as
/// a whole, so nested containers are depended on eagerly.
pub(crate) fn depend_array(array: &Array) {
    for item in array.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Watcher, WatcherOptions};
    use serde_json::json;

    fn observed(items: serde_json::Value) -> Array {
        let value = Value::from_json(items);
        observe(&value, false);
        value.as_array().unwrap().clone()
    }

    fn reader(array: &Array) -> Watcher {
        let dep = array.observer().unwrap();
        Watcher::new(
            move || {
                dep.dep().depend();
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

    fn assert_mutation_notifies(mutate: impl FnOnce(&Array)) {
        let array = observed(json!([3, 1, 2]));
        let watcher = reader(&array);
        watcher.evaluate().unwrap();
        assert!(!watcher.is_dirty());

        mutate(&array);
        assert!(watcher.is_dirty());
    }

    #[test]
    fn every_mutator_notifies() {
        assert_mutation_notifies(|a| {
            a.push([Value::from(4)]);
        });
        assert_mutation_notifies(|a| {
            a.pop();
        });
        assert_mutation_notifies(|a| {
            a.shift();
        });
        assert_mutation_notifies(|a| {
            a.unshift([Value::from(0)]);
        });
        assert_mutation_notifies(|a| {
            a.splice(1, 1, Vec::new());
        });
        assert_mutation_notifies(Array::sort);
        assert_mutation_notifies(Array::reverse);
    }

    #[test]
    fn inserted_containers_are_observed() {
        let array = observed(json!([]));
        let pushed = Value::from_json(json!({ "a": 1 }));
        let spliced = Value::from_json(json!({ "b": 2 }));

        array.push([pushed.clone()]);
        array.splice(0, 0, [spliced.clone()]);

        assert!(pushed.observer().is_some());
        assert!(spliced.observer().is_some());
        assert!(pushed.as_object().unwrap().is_reactive_property("a"));
    }

    #[test]
    fn unobserved_arrays_mutate_plainly() {
        let array = Array::from_vec(vec![Value::from(1)]);
        let pushed = Value::from_json(json!({ "a": 1 }));
        array.push([pushed.clone()]);

        assert_eq!(array.len(), 2);
        assert!(pushed.observer().is_none());
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let array = Array::from_vec(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let removed = array.splice(1, 10, [Value::from(9)]);

        assert_eq!(removed.len(), 2);
        assert_eq!(array.to_json_numbers(), vec![1.0, 9.0]);
    }

    #[test]
    fn default_sort_orders_by_string() {
        let array = Array::from_vec(vec![Value::from(10), Value::Null, Value::from(9)]);
        array.sort();
        let sorted: Vec<String> = array.to_vec().iter().map(Value::to_display_string).collect();
        assert_eq!(sorted, vec!["10", "9", ""]);
    }

    #[test]
    fn comparator_may_read_the_array() {
        let array = observed(json!([3, 1, 2]));
        let watcher = reader(&array);
        watcher.evaluate().unwrap();

        let inner = array.clone();
        let mut lengths = Vec::new();
        array.sort_by(|a, b| {
            lengths.push(inner.len());
            let _ = inner.get(0);
            a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
        });

        assert!(!lengths.is_empty());
        assert_eq!(array.to_json_numbers(), vec![1.0, 2.0, 3.0]);
        assert!(watcher.is_dirty());
    }

    impl Array {
        fn to_json_numbers(&self) -> Vec<f64> {
            self.to_vec().iter().filter_map(Value::as_f64).collect()
        }
    }
}
