//! Node construction.
//!
//! [`create_element`] classifies a tag into a platform element, a component
//! placeholder (or the output of a functional component) or an unknown
//! element, normalizes the children and propagates namespaces.

use std::cell::RefCell;
use std::rc::Rc;

use super::node::{Children, VNode, VNodeData};
use crate::component::{
    create_component_vnode, current_rendering_instance, resolve_async_component,
    resolve_component, AsyncFactory, Component, ComponentDef,
};
use crate::error::warn;
use crate::reactive::Value;

const HTML_TAGS: &[&str] = &[
    "html", "body", "base", "head", "link", "meta", "style", "title", "address", "article",
    "aside", "footer", "header", "h1", "h2", "h3", "h4", "h5", "h6", "hgroup", "nav", "section",
    "div", "dd", "dl", "dt", "figcaption", "figure", "picture", "hr", "img", "li", "main", "ol",
    "p", "pre", "ul", "a", "b", "abbr", "bdi", "bdo", "br", "cite", "code", "data", "dfn", "em",
    "i", "kbd", "mark", "q", "rp", "rt", "rtc", "ruby", "s", "samp", "small", "span", "strong",
    "sub", "sup", "time", "u", "var", "wbr", "area", "audio", "map", "track", "video", "embed",
    "object", "param", "source", "canvas", "script", "noscript", "del", "ins", "caption", "col",
    "colgroup", "table", "thead", "tbody", "td", "th", "tr", "button", "datalist", "fieldset",
    "form", "input", "label", "legend", "meter", "optgroup", "option", "output", "progress",
    "select", "textarea", "details", "dialog", "menu", "menuitem", "summary", "content",
    "element", "shadow", "template", "blockquote", "iframe", "tfoot",
];

const SVG_TAGS: &[&str] = &[
    "svg", "animate", "circle", "clippath", "cursor", "defs", "desc", "ellipse", "filter",
    "font-face", "foreignobject", "g", "glyph", "image", "line", "marker", "mask",
    "missing-glyph", "path", "pattern", "polygon", "polyline", "rect", "switch", "symbol",
    "text", "textpath", "tspan", "use", "view",
];

/// Tag policy of the rendering platform.
pub trait Platform {
    /// Tags that are platform primitives and never resolve to components.
    fn is_reserved_tag(&self, tag: &str) -> bool;

    /// Namespace a tag opens (`"svg"`, `"math"`), if any.
    fn tag_namespace(&self, tag: &str) -> Option<&'static str>;

    /// Whether an element with this tag would be meaningless to the
    /// platform. Custom-element names (with a dash) are never unknown.
    fn is_unknown_element(&self, tag: &str) -> bool {
        !self.is_reserved_tag(tag) && !tag.contains('-')
    }
}

/// HTML plus SVG.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlPlatform;

fn is_svg_tag(tag: &str) -> bool {
    SVG_TAGS.contains(&tag.to_ascii_lowercase().as_str())
}

impl Platform for HtmlPlatform {
    fn is_reserved_tag(&self, tag: &str) -> bool {
        HTML_TAGS.contains(&tag) || is_svg_tag(tag) || tag == "math"
    }

    fn tag_namespace(&self, tag: &str) -> Option<&'static str> {
        if is_svg_tag(tag) {
            Some("svg")
        } else if tag == "math" {
            Some("math")
        } else {
            None
        }
    }
}

thread_local! {
    static PLATFORM: RefCell<Rc<dyn Platform>> = RefCell::new(Rc::new(HtmlPlatform));
}

/// The active platform tag policy.
pub fn platform() -> Rc<dyn Platform> {
    PLATFORM.with(|p| p.borrow().clone())
}

pub fn set_platform(platform: Rc<dyn Platform>) {
    PLATFORM.with(|p| *p.borrow_mut() = platform);
}

/// Namespace URI for a namespace short name.
pub fn namespace_uri(ns: &str) -> &str {
    match ns {
        "svg" => "http://www.w3.org/2000/svg",
        "math" => "http://www.w3.org/1998/Math/MathML",
        other => other,
    }
}

/// What to create.
#[derive(Clone)]
pub enum Tag {
    /// A platform tag or a registered component name.
    Name(String),
    Component(ComponentDef),
    Async(AsyncFactory),
}

impl From<&str> for Tag {
    fn from(tag: &str) -> Self {
        Tag::Name(tag.to_string())
    }
}

impl From<String> for Tag {
    fn from(tag: String) -> Self {
        Tag::Name(tag)
    }
}

impl From<ComponentDef> for Tag {
    fn from(def: ComponentDef) -> Self {
        Tag::Component(def)
    }
}

impl From<&ComponentDef> for Tag {
    fn from(def: &ComponentDef) -> Self {
        Tag::Component(def.clone())
    }
}

impl From<AsyncFactory> for Tag {
    fn from(factory: AsyncFactory) -> Self {
        Tag::Async(factory)
    }
}

/// Node data, either typed or as a plain value.
#[derive(Clone, Default)]
pub enum DataArg {
    #[default]
    None,
    Data(VNodeData),
    Value(Value),
}

impl From<VNodeData> for DataArg {
    fn from(data: VNodeData) -> Self {
        DataArg::Data(data)
    }
}

impl From<Option<VNodeData>> for DataArg {
    fn from(data: Option<VNodeData>) -> Self {
        data.map_or(DataArg::None, DataArg::Data)
    }
}

impl From<Value> for DataArg {
    fn from(value: Value) -> Self {
        DataArg::Value(value)
    }
}

/// A child as written in a render function.
#[derive(Clone)]
pub enum Child {
    Node(VNode),
    Text(String),
    List(Vec<Child>),
    Empty,
}

impl From<VNode> for Child {
    fn from(node: VNode) -> Self {
        Child::Node(node)
    }
}

impl From<Option<VNode>> for Child {
    fn from(node: Option<VNode>) -> Self {
        node.map_or(Child::Empty, Child::Node)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

impl From<Vec<VNode>> for Child {
    fn from(nodes: Vec<VNode>) -> Self {
        Child::List(nodes.into_iter().map(Child::Node).collect())
    }
}

impl From<Vec<Child>> for Child {
    fn from(children: Vec<Child>) -> Self {
        Child::List(children)
    }
}

fn is_text_node(node: &VNode) -> bool {
    node.tag().is_none() && !node.is_comment() && node.text_content().is_some()
}

/// Flatten nested lists, turn strings into text nodes and merge adjacent
/// text.
pub fn normalize_children(children: Vec<Child>) -> Vec<VNode> {
    let mut out: Vec<VNode> = Vec::with_capacity(children.len());
    push_children(&mut out, children);
    out
}

fn push_children(out: &mut Vec<VNode>, children: Vec<Child>) {
    for child in children {
        match child {
            Child::Empty => {}
            Child::List(nested) => push_children(out, nested),
            Child::Text(text) => push_text(out, &text),
            Child::Node(node) if is_text_node(&node) && out.last().is_some_and(is_text_node) => {
                push_text(out, node.text_content().unwrap_or_default());
            }
            Child::Node(node) => out.push(node),
        }
    }
}

fn push_text(out: &mut Vec<VNode>, text: &str) {
    if let Some(last) = out.last_mut() {
        if is_text_node(last) {
            let merged = format!("{}{}", last.text_content().unwrap_or_default(), text);
            *last = VNode::text(merged);
            return;
        }
    }
    if !text.is_empty() {
        out.push(VNode::text(text));
    }
}

/// Create a node the way a render function does.
///
/// `context` is the component whose render is running; it owns the created
/// nodes and its local registry is consulted for component tags.
pub fn create_element(
    context: Option<&Component>,
    tag: impl Into<Tag>,
    data: impl Into<DataArg>,
    children: Vec<Child>,
) -> VNode {
    let context_name = context.map(Component::name);
    let data = match data.into() {
        DataArg::None => None,
        DataArg::Data(data) => Some(data),
        DataArg::Value(value) if value.observer().is_some() => {
            warn(
                "Avoid using observed data object as vnode data. Always create fresh vnode data objects in each render!",
                context_name.as_deref(),
            );
            return VNode::empty();
        }
        DataArg::Value(Value::Null) => None,
        DataArg::Value(value) => Some(VNodeData::from_value(&value)),
    };
    let children = normalize_children(children);
    let weak = context.map(Component::downgrade);
    let platform = platform();

    let (vnode, ns) = match tag.into() {
        Tag::Name(tag) if tag.is_empty() => return VNode::empty(),
        Tag::Name(tag) => {
            let ns = platform
                .tag_namespace(&tag)
                .map(Rc::<str>::from)
                .or_else(|| context.and_then(Component::placeholder).and_then(|p| p.ns()));
            let vnode = if platform.is_reserved_tag(&tag) {
                element(tag.as_str(), data, children).with_context(weak)
            } else if let Some(def) = resolve_component(context, &tag) {
                create_component_vnode(def, data, context, children, &tag, None)
            } else {
                // Unknown or namespaced: checked again at patch time.
                element(tag.as_str(), data, children).with_context(weak)
            };
            (vnode, ns)
        }
        Tag::Component(def) => {
            let tag = def.name().to_string();
            (create_component_vnode(def, data, context, children, &tag, None), None)
        }
        Tag::Async(factory) => {
            let owner = current_rendering_instance();
            let vnode = match resolve_async_component(&factory, owner.as_ref()) {
                Some(def) => {
                    let tag = def.name().to_string();
                    create_component_vnode(def, data, context, children, &tag, Some(factory))
                }
                None if factory.error().is_some() => VNode::empty(),
                None => VNode::async_placeholder(factory, data, weak),
            };
            (vnode, None)
        }
    };

    if ns.is_some() {
        apply_ns(&vnode, ns, false);
    }
    vnode
}

fn element(tag: &str, data: Option<VNodeData>, children: Vec<VNode>) -> VNode {
    let children = (!children.is_empty()).then(|| Children::new(children));
    VNode::element(tag, data, children)
}

/// Give a subtree its namespace. `foreignObject` switches back to plain
/// elements for its children.
fn apply_ns(vnode: &VNode, ns: Option<Rc<str>>, force: bool) {
    vnode.set_ns(ns.clone());
    let (ns, force) = if vnode.tag() == Some("foreignObject") {
        (None, true)
    } else {
        (ns, force)
    };
    if let Some(children) = vnode.children() {
        for child in children.to_vec() {
            if child.tag().is_some()
                && (child.ns().is_none() || (force && child.tag() != Some("svg")))
            {
                apply_ns(&child, ns.clone(), force);
            }
        }
    }
}
