//! Errors and Diagnostics
//!
//! Three channels leave the core:
//!
//! - [`Error`] values, returned with `?` from anything that can fail.
//! - The recoverable-error sink ([`handle_error`]). User code (watcher
//!   callbacks, `user` getters, lifecycle hooks, render functions) never
//!   unwinds through the scheduler: its errors are caught where it is invoked
//!   and forwarded here together with the owning component and a short
//!   description of what was running.
//! - The warn channel ([`warn`]) for structural, advisory problems such as
//!   duplicate keys or mutating a prop directly.
//!
//! Both sinks default to `tracing` events and can be redirected per thread
//! through [`crate::config::set_error_handler`] and
//! [`crate::config::set_warn_handler`].

use thiserror::Error;

use crate::config;

/// Errors produced by the reactive core.
#[derive(Debug, Error)]
pub enum Error {
    /// An error raised by user code (a getter, callback, hook or render
    /// function).
    #[error("{0}")]
    Thrown(String),

    /// A watcher kept re-entering the scheduler queue during one flush.
    #[error("you may have an infinite update loop in watcher #{id} (\"{expression}\")")]
    InfiniteUpdateLoop { id: u64, expression: String },

    /// A watch path that is not a simple dot-delimited path.
    #[error("failed watching path \"{0}\": only simple dot-delimited paths are accepted")]
    InvalidPath(String),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Build an error raised by user code.
    pub fn thrown(message: impl Into<String>) -> Self {
        Error::Thrown(message.into())
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Thrown(message.to_string())
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Thrown(message)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Forward a recoverable error to the configured error sink.
///
/// `context` names the component (or other owner) the failing code belongs
/// to; `info` describes what was running, e.g. `callback for watcher "count"`.
pub fn handle_error(err: &Error, context: Option<&str>, info: &str) {
    match config::error_handler() {
        Some(handler) => handler(err, context, info),
        None => {
            tracing::error!(
                context = context.unwrap_or("<root>"),
                info,
                "error in {}: {}",
                info,
                err
            );
        }
    }
}

/// Run a fallible piece of user code, routing any error to [`handle_error`].
///
/// Returns the value on success and `None` if the call failed.
pub fn invoke_with_error_handling<T>(
    context: Option<&str>,
    info: &str,
    f: impl FnOnce() -> Result<T>,
) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(err) => {
            handle_error(&err, context, info);
            None
        }
    }
}

/// Emit a structural warning.
///
/// Warnings never interrupt execution.
pub fn warn(message: &str, context: Option<&str>) {
    if config::get().silent {
        return;
    }
    match config::warn_handler() {
        Some(handler) => handler(message, context),
        None => tracing::warn!(context = context.unwrap_or("<root>"), "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn handle_error_reaches_configured_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        config::set_error_handler(Some(Rc::new(move |err: &Error, ctx: Option<&str>, info: &str| {
            sink.borrow_mut()
                .push(format!("{}|{}|{}", err, ctx.unwrap_or("-"), info));
        })));

        handle_error(&Error::thrown("boom"), Some("App"), "render");
        assert_eq!(seen.borrow().as_slice(), ["boom|App|render"]);

        config::set_error_handler(None);
    }

    #[test]
    fn invoke_with_error_handling_swallows_errors() {
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        config::set_error_handler(Some(Rc::new(move |_: &Error, _: Option<&str>, _: &str| {
            *counter.borrow_mut() += 1;
        })));

        let ok = invoke_with_error_handling(None, "ok", || Ok(5));
        let failed: Option<i32> = invoke_with_error_handling(None, "fails", || Err("nope".into()));

        assert_eq!(ok, Some(5));
        assert_eq!(failed, None);
        assert_eq!(*calls.borrow(), 1);

        config::set_error_handler(None);
    }

    #[test]
    fn silent_config_suppresses_warnings() {
        let warned = Rc::new(RefCell::new(0));
        let counter = warned.clone();
        config::set_warn_handler(Some(Rc::new(move |_: &str, _: Option<&str>| {
            *counter.borrow_mut() += 1;
        })));

        warn("first", None);
        config::update(|c| c.silent = true);
        warn("second", None);

        assert_eq!(*warned.borrow(), 1);

        config::update(|c| c.silent = false);
        config::set_warn_handler(None);
    }
}
