//! Update Scheduler
//!
//! Watchers that are neither lazy nor sync do not re-run when a dependency
//! changes. They are queued, and the queue is flushed once on the next tick,
//! so any number of mutations made in one synchronous stretch of code cost a
//! single re-run per affected watcher.
//!
//! - `queue`: the deduplicating, id-ordered flush queue.
//! - `tick`: the deferred-callback primitive the flush is scheduled on.

pub mod queue;
pub mod tick;

pub use queue::{
    current_flush_timestamp, flush_scheduler_queue, is_flushing, is_waiting, queue_activated,
    queue_watcher, queued_len,
};
pub use tick::{
    flush_callbacks, next_tick, next_tick_future, set_driver, uses_microtask, ManualDriver,
    TickDriver, TokioDriver,
};

/// Run tick batches until none are pending. Returns how many callbacks ran.
///
/// Work queued by a batch (for example a watcher whose callback mutates
/// state) runs in a following batch and is drained too.
pub fn run_until_idle() -> usize {
    let mut total = 0;
    loop {
        let ran = tick::flush_callbacks();
        if ran == 0 {
            return total;
        }
        total += ran;
    }
}
