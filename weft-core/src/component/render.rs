//! The argument of render functions.

use indexmap::IndexMap;

use super::instance::Component;
use crate::error::Result;
use crate::reactive::{Object, Value};
use crate::vdom::{create_element, Child, DataArg, Event, Handlers, Tag, VNode};

/// What a render function sees: the instance (absent for functional
/// components), its props and the children passed by the parent.
pub struct RenderContext {
    instance: Option<Component>,
    /// Owner of the nodes created through [`RenderContext::h`].
    context: Option<Component>,
    props: Object,
    children: Vec<VNode>,
    listeners: IndexMap<String, Handlers>,
}

impl RenderContext {
    pub(crate) fn for_instance(vm: &Component) -> Self {
        Self {
            instance: Some(vm.clone()),
            context: Some(vm.clone()),
            props: vm.props().clone(),
            children: vm.slot_children(),
            listeners: IndexMap::new(),
        }
    }

    pub(crate) fn functional(
        context: Option<&Component>,
        props: Object,
        children: Vec<VNode>,
        listeners: IndexMap<String, Handlers>,
    ) -> Self {
        Self {
            instance: None,
            context: context.cloned(),
            props,
            children,
            listeners,
        }
    }

    /// Create a node owned by the rendering component.
    pub fn h(&self, tag: impl Into<Tag>, data: impl Into<DataArg>, children: Vec<Child>) -> VNode {
        create_element(self.context.as_ref(), tag, data, children)
    }

    pub fn text(&self, text: impl Into<String>) -> VNode {
        VNode::text(text.into())
    }

    pub fn empty(&self) -> VNode {
        VNode::empty()
    }

    /// Read an instance key (prop, data or computed), or a prop of a
    /// functional component. Reads are tracked.
    pub fn get(&self, key: &str) -> Result<Value> {
        match &self.instance {
            Some(vm) => vm.get(key),
            None => Ok(self.props.get(key).unwrap_or_default()),
        }
    }

    pub fn prop(&self, name: &str) -> Value {
        self.props.get(name).unwrap_or_default()
    }

    pub fn children(&self) -> &[VNode] {
        &self.children
    }

    pub fn instance(&self) -> Option<&Component> {
        self.instance.as_ref()
    }

    /// Listeners passed to a functional component.
    pub fn listeners(&self) -> &IndexMap<String, Handlers> {
        &self.listeners
    }

    /// Wrap a handler that needs the instance. The handler does nothing
    /// once the instance is gone.
    pub fn listener(
        &self,
        f: impl Fn(&Component, &Event) -> Result<()> + 'static,
    ) -> impl Fn(&Event) -> Result<()> + 'static {
        let weak = self.instance.as_ref().map(Component::downgrade);
        move |event: &Event| match weak.as_ref().and_then(|w| w.upgrade()) {
            Some(vm) => f(&vm, event),
            None => Ok(()),
        }
    }
}
