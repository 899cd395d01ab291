//! Runtime Configuration
//!
//! The reactive core is single-threaded: dependency tracking, the scheduler
//! queue and the patch engine all live on the thread that created them. The
//! configuration follows suit and is stored per thread, which also keeps
//! tests that flip `async_mode` from interfering with each other.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default re-entry bound for the scheduler's cycle breaker.
pub const DEFAULT_MAX_UPDATE_COUNT: usize = 100;

/// Recoverable-error sink: `(error, context, info)`.
pub type ErrorHandler = Rc<dyn Fn(&Error, Option<&str>, &str)>;

/// Warning sink: `(message, context)`.
pub type WarnHandler = Rc<dyn Fn(&str, Option<&str>)>;

/// Tunable behaviour of the reactive core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// When `true` the scheduler defers flushing to the next tick. When
    /// `false` every enqueue flushes synchronously.
    pub async_mode: bool,

    /// How many times one watcher may re-enter the queue during a single
    /// flush before the flush is aborted.
    pub max_update_count: usize,

    /// Suppress all warnings.
    pub silent: bool,

    /// Check sibling vnodes for duplicate keys before diffing.
    pub warn_duplicate_keys: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_mode: true,
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
            silent: false,
            warn_duplicate_keys: true,
        }
    }
}

impl Config {
    /// Parse a configuration document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

/// Snapshot of the current thread's configuration.
pub fn get() -> Config {
    CONFIG.with(|config| config.borrow().clone())
}

/// Replace the current thread's configuration.
pub fn set(config: Config) {
    CONFIG.with(|current| *current.borrow_mut() = config);
}

/// Modify the current thread's configuration in place.
pub fn update(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|config| f(&mut config.borrow_mut()));
}

/// Install (or clear) the recoverable-error sink.
pub fn set_error_handler(handler: Option<ErrorHandler>) {
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = handler);
}

/// Install (or clear) the warning sink.
pub fn set_warn_handler(handler: Option<WarnHandler>) {
    WARN_HANDLER.with(|slot| *slot.borrow_mut() = handler);
}

pub(crate) fn error_handler() -> Option<ErrorHandler> {
    ERROR_HANDLER.with(|slot| slot.borrow().clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    WARN_HANDLER.with(|slot| slot.borrow().clone())
}
