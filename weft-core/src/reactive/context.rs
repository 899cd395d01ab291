//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating. This
//! enables automatic dependency tracking: when a reactive property is read,
//! the property's dependency registers the current watcher as a subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack of targets. Evaluating a watcher pushes it onto
//! the stack; the guard returned by [`ReactiveContext::enter`] pops it again,
//! even if the evaluation fails or panics.
//!
//! This design supports nested evaluation (a computed value read while a
//! component renders): the inner watcher becomes the target for the duration
//! of its own evaluation, and the outer one is restored afterwards.
//!
//! A target may also be `None`, which suspends tracking. Lifecycle hooks and
//! state initialisation run under [`ReactiveContext::untracked`] so that the
//! reads they perform are not attributed to whichever watcher happens to be
//! rendering.

use std::cell::RefCell;

use super::watcher::{Watcher, WatcherId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the target when dropped.
pub struct ReactiveContext {
    target: Option<WatcherId>,
}

impl ReactiveContext {
    /// Make `target` the active watcher until the guard is dropped.
    pub fn enter(target: Option<Watcher>) -> Self {
        let id = target.as_ref().map(Watcher::id);
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { target: id }
    }

    /// Suspend dependency tracking until the guard is dropped.
    pub fn untracked() -> Self {
        Self::enter(None)
    }

    /// The watcher currently collecting dependencies, if any.
    pub fn current() -> Option<Watcher> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Check whether reads are currently being tracked.
    pub fn is_tracking() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Number of nested contexts on this thread.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = TARGET_STACK.with(|stack| stack.borrow_mut().pop());

        // Catch mismatched push/pop pairs early.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.as_ref().map(Watcher::id),
                self.target,
                "ReactiveContext mismatch"
            );
        }
    }
}

/// Run `f` without tracking any reads.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Value, WatcherOptions};

    fn lazy_watcher() -> Watcher {
        Watcher::new(
            || Ok(Value::Null),
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn context_tracks_target() {
        let watcher = lazy_watcher();

        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::current().is_none());

        {
            let _ctx = ReactiveContext::enter(Some(watcher.clone()));
            assert!(ReactiveContext::is_tracking());
            assert_eq!(ReactiveContext::current().map(|w| w.id()), Some(watcher.id()));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_tracking());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts_restore_outer_target() {
        let outer = lazy_watcher();
        let inner = lazy_watcher();

        let _outer_ctx = ReactiveContext::enter(Some(outer.clone()));
        {
            let _inner_ctx = ReactiveContext::enter(Some(inner.clone()));
            assert_eq!(ReactiveContext::current().map(|w| w.id()), Some(inner.id()));

            {
                let _paused = ReactiveContext::untracked();
                assert!(!ReactiveContext::is_tracking());
                assert_eq!(ReactiveContext::depth(), 3);
            }
        }

        // After inner context drops, outer should be current
        assert_eq!(ReactiveContext::current().map(|w| w.id()), Some(outer.id()));
    }

    #[test]
    fn untracked_helper_pops_on_return() {
        let value = untracked(|| {
            assert!(!ReactiveContext::is_tracking());
            ReactiveContext::depth()
        });
        assert_eq!(value, 1);
        assert_eq!(ReactiveContext::depth(), 0);
    }
}
