//! Weft Core
//!
//! This crate provides the runtime core of the Weft UI framework.
//! It implements:
//!
//! - Observed state with fine-grained dependency tracking
//! - Watchers, computed values and a batching update scheduler
//! - A virtual DOM with a keyed patch engine
//! - Components with props, lifecycle hooks, keep-alive and async loading
//!
//! Everything runs on one thread. Tracking state, the scheduler queue and
//! the configuration are thread-local.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: observed values, dependencies and watchers
//! - `scheduler`: the update queue and the next-tick primitive
//! - `vdom`: virtual nodes, platform primitives and the patch engine
//! - `component`: component definitions and instances
//! - `config` and `error`: runtime configuration and diagnostics
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use weft_core::component::{Component, ComponentDef};
//! use weft_core::reactive::Value;
//! use weft_core::scheduler::run_until_idle;
//! use weft_core::vdom::{DataArg, MemoryDom, Patcher};
//!
//! let counter = ComponentDef::builder("Counter")
//!     .data(|| Ok(Value::from_json(serde_json::json!({ "count": 0 }))))
//!     .render(|ctx| {
//!         let text = ctx.get("count")?.to_display_string();
//!         Ok(ctx.h("p", DataArg::None, vec![text.into()]))
//!     })
//!     .build();
//!
//! let dom = Rc::new(MemoryDom::new());
//! let vm = Component::new(&counter, Rc::new(Patcher::with_default_modules(dom.clone())));
//! vm.mount(None)?;
//!
//! vm.set("count", 5)?;
//! run_until_idle();
//! // dom.to_html(vm.el().unwrap()) == "<p>5</p>"
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod vdom;

pub use config::Config;
pub use error::{Error, Result};
