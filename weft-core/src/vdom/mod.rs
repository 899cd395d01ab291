//! Virtual DOM
//!
//! Render functions produce trees of [`VNode`]s. The [`Patcher`] compares a
//! new tree against the previous one and applies the difference to a
//! platform through the [`NodeOps`] primitives, running the [`Module`]s
//! (attributes, classes, styles, events) on every element it creates,
//! updates or removes.
//!
//! - `node`: virtual nodes, their data and hooks.
//! - `create`: `create_element`, tag classification and namespaces.
//! - `ops`: the platform primitive trait.
//! - `modules`: the built-in element modules.
//! - `patch`: the patch engine and child reconciliation.
//! - `memory`: an in-memory platform with an operation log.

pub mod create;
pub mod memory;
pub mod modules;
pub mod node;
pub mod ops;
pub mod patch;

pub use create::{
    create_element, namespace_uri, normalize_children, platform, set_platform, Child, DataArg,
    HtmlPlatform, Platform, Tag,
};
pub use memory::{DomOp, MemoryDom, NodeKind};
pub use modules::{default_modules, AttrsModule, ClassModule, EventsModule, Module, StyleModule};
pub use node::{
    Children, ComponentVNodeOptions, EventHandler, Handlers, Key, NodeHook, PatchHook,
    RemoveHook, VNode, VNodeData, VNodeHooks,
};
pub use ops::{same_listener, DomRef, Event, EventListener, NodeOps};
pub use patch::{same_vnode, PatchTarget, Patcher, RemoveCallback};
