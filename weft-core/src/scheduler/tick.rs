//! Next Tick
//!
//! Callbacks passed to [`next_tick`] run once, together, after the current
//! synchronous stretch of code completes. Callbacks queued while a batch is
//! running land in the following batch. Within a batch callbacks run in the
//! order they were queued.
//!
//! # Drivers
//!
//! *When* a pending batch runs is decided by the installed [`TickDriver`]:
//!
//! - [`ManualDriver`] (the default) does nothing on its own. The host drains
//!   pending batches with [`flush_callbacks`] or
//!   [`run_until_idle`](super::run_until_idle), typically once per event
//!   loop turn.
//! - [`TokioDriver`] spawns the batch as a local task, so it runs at the
//!   next yield point of the current `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::oneshot;

/// Decides when a pending callback batch runs.
pub trait TickDriver {
    /// Arrange for [`flush_callbacks`] to be called after the current
    /// synchronous execution completes. Called at most once per batch.
    fn schedule(&self);

    /// Whether batches run before control returns to the host's rendering
    /// step (microtask semantics).
    fn uses_microtask(&self) -> bool;
}

/// Driver that leaves draining to the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualDriver;

impl TickDriver for ManualDriver {
    fn schedule(&self) {}

    fn uses_microtask(&self) -> bool {
        false
    }
}

/// Driver that runs batches as `spawn_local` tasks.
///
/// Must be used from within a `tokio::task::LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDriver;

impl TickDriver for TokioDriver {
    fn schedule(&self) {
        tokio::task::spawn_local(async {
            flush_callbacks();
        });
    }

    fn uses_microtask(&self) -> bool {
        true
    }
}

type Callback = Box<dyn FnOnce()>;

struct TickState {
    callbacks: Vec<Callback>,
    pending: bool,
    driver: Rc<dyn TickDriver>,
}

thread_local! {
    static TICK: RefCell<TickState> = RefCell::new(TickState {
        callbacks: Vec::new(),
        pending: false,
        driver: Rc::new(ManualDriver),
    });
}

/// Install the driver for this thread.
pub fn set_driver(driver: Rc<dyn TickDriver>) {
    TICK.with(|tick| tick.borrow_mut().driver = driver);
}

/// Whether the installed driver has microtask semantics.
pub fn uses_microtask() -> bool {
    TICK.with(|tick| tick.borrow().driver.uses_microtask())
}

/// Queue `callback` for the next batch.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    let driver = TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.callbacks.push(Box::new(callback));
        if tick.pending {
            None
        } else {
            tick.pending = true;
            Some(tick.driver.clone())
        }
    });

    // Schedule outside the borrow: a driver may flush synchronously.
    if let Some(driver) = driver {
        driver.schedule();
    }
}

/// A receiver that resolves once the next batch has run.
pub fn next_tick_future() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
    });
    rx
}

/// Run the pending batch. Returns how many callbacks ran.
pub fn flush_callbacks() -> usize {
    let batch = TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.pending = false;
        std::mem::take(&mut tick.callbacks)
    });

    let count = batch.len();
    for callback in batch {
        callback();
    }
    if count > 0 {
        tracing::trace!(count, "tick batch flushed");
    }
    count
}

/// Whether a batch is waiting to run.
pub fn has_pending() -> bool {
    TICK.with(|tick| !tick.borrow().callbacks.is_empty())
}
