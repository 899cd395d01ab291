//! Dependencies
//!
//! A [`Dep`] is the publisher side of one observable location: a property
//! slot of an observed object, or the "child observer" of an observed
//! container. Watchers that read the location while they evaluate become its
//! subscribers; writing the location notifies them.
//!
//! A `Dep` is owned by the slot it guards and is not `Clone`. Its subscriber
//! set lives in the runtime arena under its [`DepId`] and disappears when the
//! `Dep` is dropped together with the slot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::context::ReactiveContext;
use super::runtime;
use crate::config;

/// Unique identifier for a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Register the active watcher (if any) as a subscriber.
    ///
    /// Idempotent per watcher per run: the watcher deduplicates through its
    /// per-run id set.
    pub fn depend(self) {
        if let Some(target) = ReactiveContext::current() {
            target.add_dep(self);
        }
    }

    /// Invoke `update()` on every current subscriber.
    pub fn notify(self) {
        let mut subs = runtime::subscribers(self);

        // Synchronous mode flushes on enqueue, so subscription order would
        // leak into run order. Sort to keep creation order.
        if !config::get().async_mode {
            subs.sort_by_key(|w| w.id());
        }

        for watcher in subs {
            watcher.update();
        }
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

/// Publisher for one observable location.
pub struct Dep {
    id: DepId,
}

impl Dep {
    /// Create a dependency with an empty subscriber set.
    pub fn new() -> Self {
        let id = DepId::next();
        runtime::register_dep(id);
        Self { id }
    }

    /// Get the dependency's unique ID.
    pub fn id(&self) -> DepId {
        self.id
    }

    /// See [`DepId::depend`].
    pub fn depend(&self) {
        self.id.depend();
    }

    /// See [`DepId::notify`].
    pub fn notify(&self) {
        self.id.notify();
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        runtime::subscriber_count(self.id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dep {
    fn drop(&mut self) {
        runtime::unregister_dep(self.id);
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Value, Watcher, WatcherOptions};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn dep_ids_are_unique() {
        let d1 = Dep::new();
        let d2 = Dep::new();
        assert_ne!(d1.id(), d2.id());
    }

    #[test]
    fn depend_without_target_is_a_no_op() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn depend_registers_the_evaluating_watcher_once() {
        let dep = Rc::new(Dep::new());
        let reader = dep.clone();

        let watcher = Watcher::new(
            move || {
                reader.depend();
                reader.depend();
                Ok(Value::Null)
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();

        assert_eq!(dep.subscriber_count(), 1);
        assert_eq!(watcher.dep_ids(), vec![dep.id()]);
    }

    #[test]
    fn notify_marks_lazy_subscribers_dirty() {
        let dep = Rc::new(Dep::new());
        let reader = dep.clone();
        let evaluations = Rc::new(Cell::new(0));
        let counter = evaluations.clone();

        let watcher = Watcher::new(
            move || {
                counter.set(counter.get() + 1);
                reader.depend();
                Ok(Value::Null)
            },
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )
        .unwrap();

        watcher.evaluate().unwrap();
        assert!(!watcher.is_dirty());

        dep.notify();
        assert!(watcher.is_dirty());
        assert_eq!(evaluations.get(), 1);
    }
}
