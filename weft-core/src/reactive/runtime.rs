//! Reactive Runtime
//!
//! The runtime is the arena that connects dependencies and watchers. Neither
//! side owns the other: a [`Dep`](super::Dep) knows its subscribers only by
//! [`WatcherId`], and a watcher knows its dependencies only by [`DepId`].
//! Removing an edge is a set operation on ids rather than a graph walk, and
//! no reference cycle exists between the two.
//!
//! # How It Works
//!
//! 1. Creating a dependency registers an empty, insertion-ordered subscriber
//!    set for its id. Dropping the dependency removes the set.
//!
//! 2. Creating a watcher registers a weak reference to it, so the arena can
//!    turn subscriber ids back into watchers during notification without
//!    keeping them alive.
//!
//! 3. When a dependency notifies, the runtime resolves the subscriber ids to
//!    live watchers *before* invoking any of them, so no arena borrow is held
//!    while user code runs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

use indexmap::IndexSet;

use super::dep::DepId;
use super::watcher::{Watcher, WatcherId, WatcherInner};

#[derive(Default)]
struct Runtime {
    /// Subscriber ids per dependency, in subscription order.
    subscribers: HashMap<DepId, IndexSet<WatcherId>>,

    /// Weak handles to every live watcher on this thread.
    watchers: HashMap<WatcherId, Weak<WatcherInner>>,
}

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::default());
}

/// Run `f` against the arena, tolerating thread teardown and re-entrant use
/// from `Drop` impls.
fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> Option<R> {
    RUNTIME
        .try_with(|runtime| runtime.try_borrow_mut().ok().map(|mut rt| f(&mut rt)))
        .ok()
        .flatten()
}

pub(crate) fn register_dep(id: DepId) {
    with_runtime(|rt| {
        rt.subscribers.insert(id, IndexSet::new());
    });
}

pub(crate) fn unregister_dep(id: DepId) {
    with_runtime(|rt| {
        rt.subscribers.remove(&id);
    });
}

pub(crate) fn register_watcher(watcher: &Watcher) {
    let weak = watcher.downgrade();
    let id = watcher.id();
    with_runtime(|rt| {
        rt.watchers.insert(id, weak);
    });
}

/// Forget a watcher and every subscription it still holds.
pub(crate) fn unregister_watcher(id: WatcherId, deps: impl IntoIterator<Item = DepId>) {
    let deps: Vec<DepId> = deps.into_iter().collect();
    with_runtime(|rt| {
        rt.watchers.remove(&id);
        for dep in deps {
            if let Some(subs) = rt.subscribers.get_mut(&dep) {
                subs.shift_remove(&id);
            }
        }
    });
}

pub(crate) fn add_subscriber(dep: DepId, watcher: WatcherId) {
    with_runtime(|rt| {
        if let Some(subs) = rt.subscribers.get_mut(&dep) {
            subs.insert(watcher);
        }
    });
}

pub(crate) fn remove_subscriber(dep: DepId, watcher: WatcherId) {
    with_runtime(|rt| {
        if let Some(subs) = rt.subscribers.get_mut(&dep) {
            subs.shift_remove(&watcher);
        }
    });
}

/// Resolve the live subscribers of a dependency.
pub(crate) fn subscribers(dep: DepId) -> Vec<Watcher> {
    let weak: Vec<Weak<WatcherInner>> = with_runtime(|rt| {
        rt.subscribers
            .get(&dep)
            .map(|subs| {
                subs.iter()
                    .filter_map(|id| rt.watchers.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    })
    .unwrap_or_default();

    // Upgrade outside the borrow: a failed upgrade is just a skipped entry.
    weak.iter().filter_map(Watcher::upgrade).collect()
}

/// Number of subscribers currently recorded for a dependency.
pub fn subscriber_count(dep: DepId) -> usize {
    with_runtime(|rt| rt.subscribers.get(&dep).map_or(0, IndexSet::len)).unwrap_or(0)
}

/// Number of live watchers registered on this thread.
pub fn watcher_count() -> usize {
    with_runtime(|rt| rt.watchers.len()).unwrap_or(0)
}
