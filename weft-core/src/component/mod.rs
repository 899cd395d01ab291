//! Component System
//!
//! Components bundle reactive state with a render function. A
//! [`ComponentDef`] describes one; a [`Component`] is a live instance whose
//! render watcher re-renders and patches its subtree whenever state it read
//! changes.
//!
//! Components used inside a render function become placeholder nodes. The
//! placeholder's hooks create the child instance when the parent tree is
//! built, push new props into it when the parent re-renders, and destroy it
//! when it leaves the tree (or deactivate it, under a [`KeepAlive`]).

pub mod async_factory;
pub mod def;
pub mod instance;
pub mod keep_alive;
pub mod render;
mod vnode;

pub use async_factory::{resolve_async_component, AsyncFactory, AsyncLoader, AsyncResolver};
pub use def::{
    register, resolve_component, ComponentBuilder, ComponentDef, LifecycleHook, PropDef,
    PropDefaultFn, WatchOptions,
};
pub use instance::{current_rendering_instance, Component, WeakComponent};
pub use keep_alive::KeepAlive;
pub use render::RenderContext;

pub(crate) use vnode::create_component_vnode;
