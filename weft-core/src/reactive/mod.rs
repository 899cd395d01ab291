//! Reactive Core
//!
//! This module implements dependency tracking: observed state, the
//! dependencies guarding it, and the watchers that read it.
//!
//! # Concepts
//!
//! ## Values
//!
//! State is a tree of dynamic [`Value`]s. Objects and arrays are shared
//! handles. Once a container is observed, each of its properties carries a
//! private dependency, and the container itself carries one more (held by its
//! [`Observer`]) for structural changes.
//!
//! ## Dependencies
//!
//! A [`Dep`] is a publisher. When a property is read while a watcher is
//! evaluating, the property's dependency registers that watcher. When the
//! property is written, the dependency notifies its subscribers.
//!
//! ## Watchers
//!
//! A [`Watcher`] is a tracked computation: a component render, a user
//! `watch`, or the lazy evaluation behind a [`Computed`] value.
//!
//! # Implementation Notes
//!
//! Dependencies and watchers never own each other. Both register with a
//! thread-local arena (see `runtime`) and refer to each other by id, and the
//! watcher currently collecting dependencies is kept on a thread-local stack
//! (see [`ReactiveContext`]) so nested evaluations compose.

mod array;
mod computed;
mod context;
mod dep;
mod object;
mod observer;
mod path;
mod runtime;
mod traverse;
mod value;
mod watcher;

pub use array::Array;
pub use computed::{Computed, ComputedSetter};
pub use context::{untracked, ReactiveContext};
pub use dep::{Dep, DepId};
pub use object::{Accessor, Getter, Object, Setter};
pub use observer::{
    define_reactive, del, observe, set, toggle_observing, DefineOptions, Observer, PropKey,
};
pub use path::{parse_path, Path};
pub use runtime::{subscriber_count, watcher_count};
pub use traverse::traverse;
pub use value::Value;
pub use watcher::{
    Watcher, WatcherCallback, WatcherGetter, WatcherHook, WatcherId, WatcherOptions, WatcherOwner,
};
