//! Watcher Queue
//!
//! Watchers that need to re-run are collected into a deduplicated queue and
//! run together in one flush.
//!
//! # Algorithm
//!
//! 1. [`queue_watcher`] ignores a watcher that is already queued. The first
//!    enqueue of a batch schedules a flush on the next tick (or flushes right
//!    away when `async_mode` is off).
//!
//! 2. The flush sorts the queue by watcher id. Parents are created before
//!    their children and a component's render watcher is created after its
//!    user watchers, so this runs parents first and user watchers before
//!    the render that may read their effects.
//!
//! 3. The queue is walked by index, re-reading its length every step. A
//!    watcher enqueued during the flush is inserted in id order *after* the
//!    cursor, so it still runs in this flush without anything already passed
//!    being revisited.
//!
//! 4. A watcher that re-enters the queue more than `max_update_count` times
//!    in one flush aborts the flush with [`Error::InfiniteUpdateLoop`].
//!
//! 5. The scheduler state is reset *before* the post-flush hooks run, so
//!    mutations made by those hooks schedule a fresh flush.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::tick;
use crate::config;
use crate::error::{handle_error, Error, Result};
use crate::reactive::{Watcher, WatcherId};

/// Callback queued with [`queue_activated`].
pub type ActivatedHook = Box<dyn FnOnce()>;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    activated: Vec<ActivatedHook>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, usize>,
    waiting: bool,
    flushing: bool,
    index: usize,
    flush_timestamp: Option<Instant>,
}

impl SchedulerState {
    fn reset(&mut self) {
        self.queue.clear();
        self.activated.clear();
        self.has.clear();
        self.circular.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
    }
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

fn with_state<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    SCHEDULER.with(|state| f(&mut state.borrow_mut()))
}

/// Push a watcher into the queue.
///
/// Watchers already queued are skipped, unless they are already running in
/// the current flush.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule = with_state(|state| {
        if !state.has.insert(id) {
            return false;
        }
        if !state.flushing {
            state.queue.push(watcher);
        } else {
            let mut at = state.queue.len();
            while at > state.index + 1 && state.queue[at - 1].id() > id {
                at -= 1;
            }
            state.queue.insert(at, watcher);
        }
        if state.waiting {
            return false;
        }
        state.waiting = true;
        state.flush_timestamp = Some(Instant::now());
        true
    });

    if !schedule {
        return;
    }
    tracing::trace!(%id, "flush scheduled");
    if config::get().async_mode {
        tick::next_tick(|| report(flush_scheduler_queue()));
    } else {
        report(flush_scheduler_queue());
    }
}

/// Queue a keep-alive activation callback for the end of the current flush.
pub fn queue_activated(hook: impl FnOnce() + 'static) {
    with_state(|state| state.activated.push(Box::new(hook)));
}

fn report(result: Result<()>) {
    if let Err(err) = result {
        handle_error(&err, None, "nextTick");
    }
}

/// Flush the queue and run the post-flush hooks.
///
/// Errors from non-user watchers do not stop the flush; the first one is
/// returned once everything else has run. An infinite update loop aborts
/// the remaining queue.
pub fn flush_scheduler_queue() -> Result<()> {
    let started = Instant::now();
    with_state(|state| {
        state.flushing = true;
        state.flush_timestamp = Some(started);
        state.queue.sort_by_key(Watcher::id);
    });

    let max_update_count = config::get().max_update_count;
    let mut outcome = Ok(());
    let mut ran = 0usize;

    loop {
        let Some(watcher) = with_state(|state| state.queue.get(state.index).cloned()) else {
            break;
        };
        let id = watcher.id();

        watcher.run_before_hook();
        with_state(|state| state.has.remove(&id));
        if let Err(err) = watcher.run() {
            tracing::debug!(%id, error = %err, "watcher failed during flush");
            if outcome.is_ok() {
                outcome = Err(err);
            }
        }
        ran += 1;

        let looping = with_state(|state| {
            if !state.has.contains(&id) {
                return false;
            }
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            *count > max_update_count
        });
        if looping {
            outcome = Err(Error::InfiniteUpdateLoop {
                id: id.raw(),
                expression: watcher.expression().to_string(),
            });
            break;
        }

        with_state(|state| state.index += 1);
    }

    let (activated, updated) = with_state(|state| {
        let activated = std::mem::take(&mut state.activated);
        let updated = state.queue.clone();
        state.reset();
        (activated, updated)
    });

    for hook in activated {
        hook();
    }
    for watcher in updated.iter().rev() {
        watcher.run_after_hook();
    }

    tracing::debug!(ran, elapsed = ?started.elapsed(), "scheduler flushed");
    outcome
}

/// Time at which the current (or last) flush was scheduled or started.
pub fn current_flush_timestamp() -> Option<Instant> {
    with_state(|state| state.flush_timestamp)
}

/// Whether a flush is running right now.
pub fn is_flushing() -> bool {
    with_state(|state| state.flushing)
}

/// Whether a flush has been scheduled and not yet finished.
pub fn is_waiting() -> bool {
    with_state(|state| state.waiting)
}

/// Number of watchers in the queue.
pub fn queued_len() -> usize {
    with_state(|state| state.queue.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{observe, Object, Value, WatcherCallback, WatcherOptions};
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn counter_state() -> Object {
        let value = Value::from_json(json!({ "n": 0 }));
        observe(&value, false);
        value.as_object().unwrap().clone()
    }

    fn logging_watcher(
        object: &Object,
        label: &'static str,
        log: &Rc<RefCell<Vec<&'static str>>>,
    ) -> Watcher {
        let reader = object.clone();
        let log = log.clone();
        Watcher::new(
            move || {
                log.borrow_mut().push(label);
                Ok(reader.get("n").unwrap_or_default())
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn duplicate_enqueues_run_once() {
        let state = counter_state();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _w = logging_watcher(&state, "w", &log);
        log.borrow_mut().clear();

        for i in 1..=5 {
            state.assign("n", Value::from(i));
        }
        assert_eq!(queued_len(), 1);
        assert!(is_waiting());

        tick::flush_callbacks();
        assert_eq!(log.borrow().as_slice(), ["w"]);
        assert!(!is_waiting());
    }

    #[test]
    fn flush_runs_in_creation_order() {
        let state = counter_state();
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = logging_watcher(&state, "first", &log);
        let second = logging_watcher(&state, "second", &log);
        log.borrow_mut().clear();

        // Enqueue out of order.
        queue_watcher(second.clone());
        queue_watcher(first.clone());
        tick::flush_callbacks();

        assert_eq!(log.borrow().as_slice(), ["first", "second"]);
    }

    #[test]
    fn watchers_queued_mid_flush_run_in_the_same_flush() {
        let state = counter_state();
        let log = Rc::new(RefCell::new(Vec::new()));

        let trigger = state.clone();
        let trigger_log = log.clone();
        let _early = Watcher::new(
            move || Ok(trigger.get("n").unwrap_or_default()),
            Some(Rc::new(move |_: &Value, _: &Value| {
                trigger_log.borrow_mut().push("early");
                Ok(())
            }) as WatcherCallback),
            WatcherOptions::default(),
        )
        .unwrap();

        let other = Value::from_json(json!({ "m": 0 }));
        observe(&other, false);
        let other = other.as_object().unwrap().clone();
        let reader = other.clone();
        let late_log = log.clone();
        let _late = Watcher::new(
            move || {
                late_log.borrow_mut().push("late");
                Ok(reader.get("m").unwrap_or_default())
            },
            None,
            WatcherOptions::default(),
        )
        .unwrap();
        log.borrow_mut().clear();

        let writer = other.clone();
        let _bridge = Watcher::new(
            {
                let state = state.clone();
                move || Ok(state.get("n").unwrap_or_default())
            },
            Some(Rc::new(move |new: &Value, _: &Value| {
                writer.assign("m", new.clone());
                Ok(())
            }) as WatcherCallback),
            WatcherOptions::default(),
        )
        .unwrap();

        state.assign("n", Value::from(1));
        tick::flush_callbacks();

        // `late` was created before `bridge` but enqueued by it mid-flush:
        // it still runs, after the cursor.
        assert_eq!(log.borrow().as_slice(), ["early", "late"]);
        assert!(!tick::has_pending());
    }

    #[test]
    fn self_triggering_watcher_is_cut_off() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        config::set_error_handler(Some(Rc::new(move |err: &Error, _: Option<&str>, info: &str| {
            sink.borrow_mut().push((err.to_string(), info.to_string()));
        })));

        let state = counter_state();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = state.clone();
        let writer = state.clone();
        let _w = Watcher::new(
            move || Ok(reader.get("n").unwrap_or_default()),
            Some(Rc::new(move |new: &Value, _: &Value| {
                counter.set(counter.get() + 1);
                writer.assign("n", Value::from(new.as_f64().unwrap_or_default() + 1.0));
                Ok(())
            }) as WatcherCallback),
            WatcherOptions {
                expression: "n".into(),
                ..Default::default()
            },
        )
        .unwrap();

        state.assign("n", Value::from(1));
        tick::flush_callbacks();

        assert_eq!(runs.get(), config::DEFAULT_MAX_UPDATE_COUNT + 1);
        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].0.contains("infinite update loop"));
        assert_eq!(errors[0].1, "nextTick");
        assert!(!is_flushing());
        config::set_error_handler(None);
    }

    #[test]
    fn max_update_count_is_configurable() {
        config::update(|c| c.max_update_count = 3);
        config::set_error_handler(Some(Rc::new(|_: &Error, _: Option<&str>, _: &str| {})));

        let state = counter_state();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = state.clone();
        let writer = state.clone();
        let _w = Watcher::new(
            move || Ok(reader.get("n").unwrap_or_default()),
            Some(Rc::new(move |new: &Value, _: &Value| {
                counter.set(counter.get() + 1);
                writer.assign("n", Value::from(new.as_f64().unwrap_or_default() + 1.0));
                Ok(())
            }) as WatcherCallback),
            WatcherOptions::default(),
        )
        .unwrap();

        // Flush directly instead of through the tick so the result is
        // observable here.
        state.assign("n", Value::from(1));
        let result = flush_scheduler_queue();

        assert!(matches!(result, Err(Error::InfiniteUpdateLoop { .. })));
        assert_eq!(runs.get(), 4);
        config::set(config::Config::default());
        config::set_error_handler(None);
    }

    #[test]
    fn synchronous_mode_flushes_on_enqueue() {
        config::update(|c| c.async_mode = false);
        let state = counter_state();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _w = logging_watcher(&state, "w", &log);
        log.borrow_mut().clear();

        state.assign("n", Value::from(1));
        assert_eq!(log.borrow().as_slice(), ["w"]);
        assert!(!tick::has_pending());
        config::set(config::Config::default());
    }

    #[test]
    fn post_flush_hooks_fire_after_reset() {
        let state = counter_state();
        let order = Rc::new(RefCell::new(Vec::new()));

        let make = |label: &'static str| {
            let reader = state.clone();
            let before_log = order.clone();
            let after_log = order.clone();
            Watcher::new(
                move || Ok(reader.get("n").unwrap_or_default()),
                None,
                WatcherOptions {
                    before: Some(Rc::new(move || before_log.borrow_mut().push(format!("before {label}")))),
                    after: Some(Rc::new(move || {
                        assert!(!is_flushing());
                        after_log.borrow_mut().push(format!("after {label}"));
                    })),
                    ..Default::default()
                },
            )
            .unwrap()
        };
        let _parent = make("parent");
        let _child = make("child");

        let activated_log = order.clone();
        queue_activated(move || activated_log.borrow_mut().push("activated".to_string()));

        state.assign("n", Value::from(1));
        tick::flush_callbacks();

        assert_eq!(
            order.borrow().as_slice(),
            [
                "before parent",
                "before child",
                "activated",
                "after child",
                "after parent"
            ]
        );
    }

    #[test]
    fn torn_down_watchers_are_skipped() {
        let state = counter_state();
        let log = Rc::new(RefCell::new(Vec::new()));
        let w = logging_watcher(&state, "w", &log);
        log.borrow_mut().clear();

        state.assign("n", Value::from(1));
        w.teardown();
        tick::flush_callbacks();

        assert!(log.borrow().is_empty());
    }
}
