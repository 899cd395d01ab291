//! Watchers
//!
//! A [`Watcher`] is a tracked computation. Evaluating it runs its getter with
//! the watcher installed as the active target, so every reactive read the
//! getter performs subscribes the watcher to the dependency that was read.
//!
//! # Modes
//!
//! - **lazy**: a change only marks the watcher dirty. The value is recomputed
//!   by [`Watcher::evaluate`] when someone next reads it (see
//!   [`Computed`](super::Computed)).
//! - **sync**: a change re-runs the watcher immediately.
//! - default: a change hands the watcher to the scheduler, which runs it once
//!   per flush in creation order.
//!
//! # Dependency Bookkeeping
//!
//! Each evaluation collects the dependencies it reads into a fresh set. When
//! the evaluation finishes (successfully or not) subscriptions to
//! dependencies that were read last time but not this time are dropped, and
//! the fresh set becomes the current one. A watcher whose getter branches
//! therefore only ever reacts to what its latest run actually read.
//!
//! # User Watchers
//!
//! Watchers flagged `user` run user-supplied getters and callbacks. Their
//! errors never propagate: they are forwarded to the recoverable-error sink
//! with the watcher's expression attached.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

use super::context::ReactiveContext;
use super::dep::DepId;
use super::path::parse_path;
use super::runtime;
use super::traverse::traverse;
use super::value::Value;
use crate::error::{handle_error, invoke_with_error_handling, warn, Result};
use crate::scheduler;

/// Unique identifier for a watcher. Ids grow in creation order, which is the
/// order the scheduler runs watchers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher#{}", self.0)
    }
}

/// Tracked function of a watcher.
pub type WatcherGetter = Rc<dyn Fn() -> Result<Value>>;

/// Result callback, invoked with `(new, old)`.
pub type WatcherCallback = Rc<dyn Fn(&Value, &Value) -> Result<()>>;

/// Hook run by the scheduler around a watcher.
pub type WatcherHook = Rc<dyn Fn()>;

/// The component (or other owner) a watcher belongs to.
pub trait WatcherOwner {
    /// Name used when reporting errors raised by the watcher.
    fn context_name(&self) -> String;

    /// Whether the owner is tearing itself down (and will drop all of its
    /// watchers anyway).
    fn is_being_destroyed(&self) -> bool;

    /// Forget a watcher that was torn down individually.
    fn remove_watcher(&self, id: WatcherId);
}

/// Options for [`Watcher::new`].
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Defer evaluation until the value is read.
    pub lazy: bool,

    /// Re-run synchronously on change instead of going through the queue.
    pub sync: bool,

    /// Touch every nested property of the result, so nested mutations
    /// trigger the watcher too.
    pub deep: bool,

    /// Getter and callback are user code: route their errors to the error
    /// sink.
    pub user: bool,

    /// Human-readable source of the watcher, used in diagnostics.
    pub expression: String,

    /// Run by the scheduler right before the watcher runs.
    pub before: Option<WatcherHook>,

    /// Run by the scheduler after a flush that included the watcher, in
    /// reverse queue order.
    pub after: Option<WatcherHook>,

    pub owner: Option<Weak<dyn WatcherOwner>>,
}

struct WatcherState {
    value: Value,
    dirty: bool,
    active: bool,
    deps: IndexSet<DepId>,
    new_deps: IndexSet<DepId>,
}

pub(crate) struct WatcherInner {
    id: WatcherId,
    getter: WatcherGetter,
    callback: Option<WatcherCallback>,
    lazy: bool,
    sync: bool,
    deep: bool,
    user: bool,
    expression: String,
    before: Option<WatcherHook>,
    after: Option<WatcherHook>,
    owner: Option<Weak<dyn WatcherOwner>>,
    state: RefCell<WatcherState>,
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let deps: Vec<DepId> = state.deps.iter().chain(state.new_deps.iter()).copied().collect();
        runtime::unregister_watcher(self.id, deps);
    }
}

/// Shared handle to a tracked computation.
#[derive(Clone)]
pub struct Watcher(pub(crate) Rc<WatcherInner>);

impl Watcher {
    /// Create a watcher.
    ///
    /// Non-lazy watchers evaluate immediately to collect their initial
    /// dependencies; an error from that first evaluation is returned unless
    /// the watcher is a `user` watcher.
    pub fn new<F>(
        getter: F,
        callback: Option<WatcherCallback>,
        options: WatcherOptions,
    ) -> Result<Watcher>
    where
        F: Fn() -> Result<Value> + 'static,
    {
        let WatcherOptions {
            lazy,
            sync,
            deep,
            user,
            expression,
            before,
            after,
            owner,
        } = options;

        let watcher = Watcher(Rc::new(WatcherInner {
            id: WatcherId::next(),
            getter: Rc::new(getter),
            callback,
            lazy,
            sync,
            deep,
            user,
            expression,
            before,
            after,
            owner,
            state: RefCell::new(WatcherState {
                value: Value::Null,
                dirty: lazy,
                active: true,
                deps: IndexSet::new(),
                new_deps: IndexSet::new(),
            }),
        }));
        runtime::register_watcher(&watcher);

        if !lazy {
            let value = watcher.get()?;
            watcher.0.state.borrow_mut().value = value;
        }

        tracing::trace!(id = %watcher.id(), lazy, sync, user, "watcher created");
        Ok(watcher)
    }

    /// Watch a dot-delimited path below `root`.
    ///
    /// An invalid path warns and produces a watcher that never fires.
    pub fn watch_path(
        root: &Value,
        path: &str,
        callback: Option<WatcherCallback>,
        mut options: WatcherOptions,
    ) -> Result<Watcher> {
        if options.expression.is_empty() {
            options.expression = path.to_string();
        }
        let root = root.clone();
        match parse_path(path) {
            Ok(path) => Watcher::new(move || Ok(path.resolve(&root)), callback, options),
            Err(err) => {
                warn(&format!("{err}"), None);
                Watcher::new(|| Ok(Value::Null), callback, options)
            }
        }
    }

    /// Get the watcher's unique ID.
    pub fn id(&self) -> WatcherId {
        self.0.id
    }

    pub fn expression(&self) -> &str {
        &self.0.expression
    }

    pub fn is_lazy(&self) -> bool {
        self.0.lazy
    }

    pub fn is_user(&self) -> bool {
        self.0.user
    }

    /// `false` once torn down.
    pub fn is_active(&self) -> bool {
        self.0.state.borrow().active
    }

    /// Whether a lazy watcher's cached value is stale.
    pub fn is_dirty(&self) -> bool {
        self.0.state.borrow().dirty
    }

    /// The cached value from the last evaluation.
    pub fn value(&self) -> Value {
        self.0.state.borrow().value.clone()
    }

    /// Dependencies collected by the last completed evaluation.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.0.state.borrow().deps.iter().copied().collect()
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<WatcherInner>) -> Option<Watcher> {
        weak.upgrade().map(Watcher)
    }

    fn context_name(&self) -> Option<String> {
        self.0
            .owner
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|owner| owner.context_name())
    }

    /// Record a dependency read during the current evaluation.
    pub(crate) fn add_dep(&self, dep: DepId) {
        let subscribe = {
            let mut state = self.0.state.borrow_mut();
            state.new_deps.insert(dep) && !state.deps.contains(&dep)
        };
        if subscribe {
            runtime::add_subscriber(dep, self.0.id);
        }
    }

    /// Evaluate the getter with dependency collection.
    ///
    /// Errors from `user` watchers are reported and yield `Null`; other
    /// errors propagate. Subscriptions are reconciled either way.
    pub fn get(&self) -> Result<Value> {
        let result = {
            let _ctx = ReactiveContext::enter(Some(self.clone()));
            let result = (self.0.getter)();
            if self.0.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();

        match result {
            Ok(value) => Ok(value),
            Err(err) if self.0.user => {
                handle_error(
                    &err,
                    self.context_name().as_deref(),
                    &format!("getter for watcher \"{}\"", self.0.expression),
                );
                Ok(Value::Null)
            }
            Err(err) => Err(err),
        }
    }

    /// Drop subscriptions the last evaluation did not renew and promote the
    /// freshly collected set.
    fn cleanup_deps(&self) {
        let stale: Vec<DepId> = {
            let mut state = self.0.state.borrow_mut();
            let state = &mut *state;
            let stale = state
                .deps
                .iter()
                .filter(|dep| !state.new_deps.contains(*dep))
                .copied()
                .collect();
            std::mem::swap(&mut state.deps, &mut state.new_deps);
            state.new_deps.clear();
            stale
        };
        for dep in stale {
            runtime::remove_subscriber(dep, self.0.id);
        }
    }

    /// Subscriber interface: called when a dependency changes.
    pub fn update(&self) {
        if self.0.lazy {
            self.0.state.borrow_mut().dirty = true;
        } else if self.0.sync {
            if let Err(err) = self.run() {
                handle_error(&err, self.context_name().as_deref(), "sync watcher");
            }
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and invoke the callback if the value changed.
    ///
    /// Containers and deep watchers always count as changed, since in-place
    /// mutation keeps the reference equal.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let value = self.get()?;

        let old = {
            let mut state = self.0.state.borrow_mut();
            if value.same_value(&state.value) && !value.is_container() && !self.0.deep {
                return Ok(());
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        let Some(callback) = &self.0.callback else {
            return Ok(());
        };
        if self.0.user {
            invoke_with_error_handling(
                self.context_name().as_deref(),
                &format!("callback for watcher \"{}\"", self.0.expression),
                || callback(&value, &old),
            );
            Ok(())
        } else {
            callback(&value, &old)
        }
    }

    /// Recompute a lazy watcher's value and clear its dirty flag.
    pub fn evaluate(&self) -> Result<()> {
        let value = self.get()?;
        let mut state = self.0.state.borrow_mut();
        state.value = value;
        state.dirty = false;
        Ok(())
    }

    /// Subscribe the active watcher to every dependency this one holds.
    pub fn depend(&self) {
        for dep in self.dep_ids() {
            dep.depend();
        }
    }

    /// Unsubscribe from everything and stop reacting. Idempotent.
    pub fn teardown(&self) {
        if !self.is_active() {
            return;
        }
        if let Some(owner) = self.0.owner.as_ref().and_then(Weak::upgrade) {
            if !owner.is_being_destroyed() {
                owner.remove_watcher(self.0.id);
            }
        }
        let deps = {
            let mut state = self.0.state.borrow_mut();
            state.active = false;
            std::mem::take(&mut state.deps)
        };
        for dep in deps {
            runtime::remove_subscriber(dep, self.0.id);
        }
    }

    pub(crate) fn run_before_hook(&self) {
        if let Some(before) = &self.0.before {
            before();
        }
    }

    pub(crate) fn run_after_hook(&self) {
        if let Some(after) = &self.0.after {
            after();
        }
    }
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("expression", &self.0.expression)
            .field("lazy", &self.0.lazy)
            .field("user", &self.0.user)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
