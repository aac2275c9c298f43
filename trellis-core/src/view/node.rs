//! Node Descriptions
//!
//! A [`Node`] is an immutable description of one tree node before it
//! touches the host: plain text, a live text binding to a signal, or a
//! structured element with properties and children. What kind of node a
//! value becomes is decided once, when the tree is built.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::host::{Event, HostNode, Listener};
use crate::reactive::{Signal, TextSource};
use crate::runtime::{InstanceId, Scope};

/// A static property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Sibling key used by keyed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(Arc<str>);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key(value.into())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(value.into())
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key(value.to_string().into())
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key(value.to_string().into())
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key(value.to_string().into())
    }
}

/// One entry of an element's style mapping.
#[derive(Clone)]
pub enum StyleValue {
    Static(String),
    Reactive(Arc<dyn TextSource>),
}

impl PartialEq for StyleValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StyleValue::Static(a), StyleValue::Static(b)) => a == b,
            (StyleValue::Reactive(a), StyleValue::Reactive(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Debug for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleValue::Static(s) => f.debug_tuple("Static").field(s).finish(),
            StyleValue::Reactive(source) => f.debug_tuple("Reactive").field(&source.id()).finish(),
        }
    }
}

/// A property value.
#[derive(Clone)]
pub enum PropValue {
    Value(Value),
    /// Event handler, stored under `on<event>`.
    Handler(Listener),
    /// Written now and re-written whenever the signal changes.
    Reactive(Arc<dyn TextSource>),
    Style(IndexMap<String, StyleValue>),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Value(a), PropValue::Value(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => Arc::ptr_eq(a, b),
            (PropValue::Reactive(a), PropValue::Reactive(b)) => a.id() == b.id(),
            (PropValue::Style(a), PropValue::Style(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            PropValue::Handler(_) => f.write_str("Handler(..)"),
            PropValue::Reactive(source) => f.debug_tuple("Reactive").field(&source.id()).finish(),
            PropValue::Style(map) => f.debug_tuple("Style").field(map).finish(),
        }
    }
}

/// Callback receiving the host node an element was materialized into.
pub type NodeRef = Arc<dyn Fn(HostNode) + Send + Sync>;

/// Properties of an element, plus the two entries that are not written to
/// the host: the reconciliation key and the ref callback.
#[derive(Clone, Default)]
pub struct Props {
    entries: IndexMap<String, PropValue>,
    key: Option<Key>,
    node_ref: Option<NodeRef>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: PropValue) -> Self {
        self.entries.insert(name.into(), value);
        self
    }

    pub fn attr(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, PropValue::Value(value.into()))
    }

    /// Attach an event handler for `event`.
    pub fn on<F>(self, event: &str, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handler(event, Arc::new(handler))
    }

    /// Attach a prebuilt listener. Reusing the same listener across renders
    /// leaves the host untouched on patch.
    pub fn handler(self, event: &str, listener: Listener) -> Self {
        self.set(format!("on{}", event.to_lowercase()), PropValue::Handler(listener))
    }

    /// Bind a property to a signal.
    pub fn bind<T>(self, name: impl Into<String>, signal: &Signal<T>) -> Self
    where
        T: Clone + PartialEq + fmt::Display + Send + Sync + 'static,
    {
        self.set(name, PropValue::Reactive(signal.text_source()))
    }

    pub fn style(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.style_entry(name.into(), StyleValue::Static(value.into()))
    }

    pub fn style_bind<T>(self, name: impl Into<String>, signal: &Signal<T>) -> Self
    where
        T: Clone + PartialEq + fmt::Display + Send + Sync + 'static,
    {
        self.style_entry(name.into(), StyleValue::Reactive(signal.text_source()))
    }

    fn style_entry(mut self, name: String, value: StyleValue) -> Self {
        let entry = self
            .entries
            .entry("style".to_string())
            .or_insert_with(|| PropValue::Style(IndexMap::new()));
        match entry {
            PropValue::Style(map) => {
                map.insert(name, value);
            }
            other => {
                let mut map = IndexMap::new();
                map.insert(name, value);
                *other = PropValue::Style(map);
            }
        }
        self
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn node_ref<F>(mut self, callback: F) -> Self
    where
        F: Fn(HostNode) + Send + Sync + 'static,
    {
        self.node_ref = Some(Arc::new(callback));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get_key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn get_node_ref(&self) -> Option<&NodeRef> {
        self.node_ref.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn set_key_if_absent(&mut self, key: Option<Key>) {
        if self.key.is_none() {
            self.key = key;
        }
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("entries", &self.entries)
            .field("key", &self.key)
            .field("node_ref", &self.node_ref.is_some())
            .finish()
    }
}

/// A structured node.
#[derive(Clone)]
pub struct Element {
    pub(crate) tag: String,
    pub(crate) props: Props,
    pub(crate) children: Vec<Node>,
    /// Component that produced this element, outermost first.
    pub(crate) origin: Option<Arc<str>>,
    /// Instances whose root is this element, outermost first.
    pub(crate) instances: SmallVec<[InstanceId; 1]>,
}

impl Element {
    pub(crate) fn new(tag: String, props: Props, children: Vec<Node>) -> Self {
        Self {
            tag,
            props,
            children,
            origin: None,
            instances: SmallVec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn key(&self) -> Option<&Key> {
        self.props.key.as_ref()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn instances(&self) -> &[InstanceId] {
        &self.instances
    }

    /// The instance that owns this element's children.
    pub(crate) fn innermost_instance(&self) -> Option<InstanceId> {
        self.instances.last().copied()
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.tag)
            .field("props", &self.props)
            .field("children", &self.children)
            .field("instances", &self.instances)
            .finish()
    }
}

/// A text or live text node returned by a component instance.
#[derive(Clone)]
pub struct Leaf {
    pub(crate) node: Node,
    pub(crate) key: Option<Key>,
    pub(crate) origin: Arc<str>,
    /// Instances whose root is this node, outermost first.
    pub(crate) instances: SmallVec<[InstanceId; 1]>,
}

impl Leaf {
    /// The wrapped text or live text node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn instances(&self) -> &[InstanceId] {
        &self.instances
    }

    pub(crate) fn innermost_instance(&self) -> Option<InstanceId> {
        self.instances.last().copied()
    }
}

impl fmt::Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("node", &self.node)
            .field("origin", &self.origin)
            .field("instances", &self.instances)
            .finish()
    }
}

/// A node description.
#[derive(Clone)]
pub enum Node {
    Text(String),
    Reactive(Arc<dyn TextSource>),
    Element(Arc<Element>),
    /// Text produced by a component, carrying the component's instances.
    Leaf(Arc<Leaf>),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            Node::Element(element) => element.key(),
            Node::Leaf(leaf) => leaf.key.as_ref(),
            _ => None,
        }
    }

    /// Instances whose root is this node, outermost first.
    pub fn instances(&self) -> &[InstanceId] {
        match self {
            Node::Element(element) => element.instances(),
            Node::Leaf(leaf) => leaf.instances(),
            _ => &[],
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Whether `other` can be patched onto a host node built from `self`.
    /// Elements must share their tag and the instances that own them.
    pub fn same_kind(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Text(_), Node::Text(_)) => true,
            (Node::Reactive(_), Node::Reactive(_)) => true,
            (Node::Element(a), Node::Element(b)) => a.tag == b.tag && a.instances == b.instances,
            (Node::Leaf(a), Node::Leaf(b)) => a.instances == b.instances,
            _ => false,
        }
    }

    /// Label given to an instance rendering this node.
    pub fn label<'a>(&'a self, anonymous: &'a str) -> &'a str {
        match self {
            Node::Element(element) => element.origin().unwrap_or(element.tag.as_str()),
            Node::Leaf(leaf) => leaf.origin(),
            _ => anonymous,
        }
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::Text(text)
    }
}

impl<T> From<&Signal<T>> for Node
where
    T: Clone + PartialEq + fmt::Display + Send + Sync + 'static,
{
    fn from(signal: &Signal<T>) -> Self {
        Node::Reactive(signal.text_source())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Node::Reactive(source) => f.debug_tuple("Reactive").field(&source.id()).finish(),
            Node::Element(element) => fmt::Debug::fmt(element, f),
            Node::Leaf(leaf) => fmt::Debug::fmt(leaf, f),
        }
    }
}

/// Component body: receives its scope, properties, and flattened children.
pub type RenderFn = Arc<dyn Fn(&Scope, Props, Vec<Node>) -> Node + Send + Sync>;

/// A named component. Instances are matched across renders by name.
#[derive(Clone)]
pub struct Component {
    name: Arc<str>,
    render: RenderFn,
}

impl Component {
    pub fn new<F>(name: &str, render: F) -> Self
    where
        F: Fn(&Scope, Props, Vec<Node>) -> Node + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            render: Arc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, cx: &Scope, props: Props, children: Vec<Node>) -> Node {
        (self.render)(cx, props, children)
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("name", &self.name).finish()
    }
}

/// What `h` is called with: a host tag or a component.
#[derive(Clone, Debug)]
pub enum Tag {
    Element(String),
    Component(Component),
}

impl From<&str> for Tag {
    fn from(tag: &str) -> Self {
        Tag::Element(tag.to_string())
    }
}

impl From<String> for Tag {
    fn from(tag: String) -> Self {
        Tag::Element(tag)
    }
}

impl From<Component> for Tag {
    fn from(component: Component) -> Self {
        Tag::Component(component)
    }
}

impl From<&Component> for Tag {
    fn from(component: &Component) -> Self {
        Tag::Component(component.clone())
    }
}

/// A child argument before flattening.
pub enum Child {
    /// Dropped. `None`, `false` and `()` become this.
    Empty,
    Node(Node),
    /// Spliced in order.
    Many(Vec<Child>),
    /// Resolved once, at build time.
    Lazy(Box<dyn FnOnce() -> Child + Send>),
}

impl Child {
    pub fn lazy<F, C>(f: F) -> Self
    where
        F: FnOnce() -> C + Send + 'static,
        C: Into<Child>,
    {
        Child::Lazy(Box::new(move || f().into()))
    }
}

impl From<()> for Child {
    fn from(_: ()) -> Self {
        Child::Empty
    }
}

impl From<Node> for Child {
    fn from(node: Node) -> Self {
        Child::Node(node)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Node(Node::from(text))
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Node(Node::Text(text))
    }
}

impl From<&String> for Child {
    fn from(text: &String) -> Self {
        Child::Node(Node::Text(text.clone()))
    }
}

impl From<bool> for Child {
    fn from(value: bool) -> Self {
        if value {
            Child::Node(Node::text("true"))
        } else {
            Child::Empty
        }
    }
}

macro_rules! child_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Child {
                fn from(value: $ty) -> Self {
                    Child::Node(Node::Text(value.to_string()))
                }
            }
        )*
    };
}

child_from_display!(i32, i64, u32, u64, usize, f32, f64, char);

impl<T> From<&Signal<T>> for Child
where
    T: Clone + PartialEq + fmt::Display + Send + Sync + 'static,
{
    fn from(signal: &Signal<T>) -> Self {
        Child::Node(Node::from(signal))
    }
}

impl<T> From<Signal<T>> for Child
where
    T: Clone + PartialEq + fmt::Display + Send + Sync + 'static,
{
    fn from(signal: Signal<T>) -> Self {
        Child::Node(Node::from(&signal))
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(value: Option<T>) -> Self {
        value.map_or(Child::Empty, Into::into)
    }
}

impl<T: Into<Child>> From<Vec<T>> for Child {
    fn from(values: Vec<T>) -> Self {
        Child::Many(values.into_iter().map(Into::into).collect())
    }
}

/// Build a [`Child::Many`] from heterogeneous children.
///
/// ```rust
/// use trellis_core::children;
/// let list = children!["a", 1, Some("b"), false];
/// # let _ = list;
/// ```
#[macro_export]
macro_rules! children {
    () => { $crate::Child::Empty };
    ($($child:expr),+ $(,)?) => {
        $crate::Child::Many(vec![$($crate::Child::from($child)),+])
    };
}
