//! The tree description produced by view functions.
//!
//! Nodes are plain data. A render produces an entirely new tree, which the [`diff`](crate::diff) module
//! then reconciles against the live platform nodes.

use crate::value::{Event, Value};
use core::{
	any::{Any, TypeId},
	fmt,
};
use std::{collections::BTreeMap, rc::Rc};

/// A node of the tree description.
#[derive(Debug, Clone)]
pub struct Node {
	pub kind: NodeKind,
	pub props: Props,
	pub children: Vec<Node>,
}

/// What a [`Node`] stands for, resolved once at construction.
#[derive(Clone)]
pub enum NodeKind {
	/// A platform element, by tag name.
	Element(String),
	Text(String),
	/// A nested component. The reconciler hands these to the component runtime.
	Component(ComponentRef),
	/// A logical grouping whose children are spliced into the parent.
	///
	/// [`h`] never leaves these in a child list, but hand-built trees may contain them.
	Fragment,
	/// An already-live platform node that is inserted verbatim.
	Live(Live),
}

impl fmt::Debug for NodeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NodeKind::Element(tag) => f.debug_tuple("Element").field(tag).finish(),
			#[cfg(feature = "dangerous-logging")]
			NodeKind::Text(text) => f.debug_tuple("Text").field(text).finish(),
			#[cfg(not(feature = "dangerous-logging"))]
			NodeKind::Text(text) => write!(f, "Text(<{} bytes>)", text.len()),
			NodeKind::Component(component) => f.debug_tuple("Component").field(&component.name).finish(),
			NodeKind::Fragment => f.write_str("Fragment"),
			NodeKind::Live(_) => f.write_str("Live"),
		}
	}
}

impl Node {
	#[must_use]
	pub fn text(text: impl Into<String>) -> Self {
		Self {
			kind: NodeKind::Text(text.into()),
			props: Props::new(),
			children: Vec::new(),
		}
	}

	/// Wraps an already-live platform node (for example a `web_sys::Node` or [`MemNode`](crate::dom::memory::MemNode)).
	#[must_use]
	pub fn live<T: Any>(node: T) -> Self {
		Self {
			kind: NodeKind::Live(Live(Rc::new(node))),
			props: Props::new(),
			children: Vec::new(),
		}
	}

	/// The element tag, if this is an element node.
	#[must_use]
	pub fn tag(&self) -> Option<&str> {
		match &self.kind {
			NodeKind::Element(tag) => Some(tag.as_str()),
			_ => None,
		}
	}

	/// The identity key, if any.
	#[must_use]
	pub fn key(&self) -> Option<String> {
		match self.props.get("key") {
			Some(Prop::Value(value)) if !value.is_falsy() => Some(value.to_text()),
			_ => None,
		}
	}
}

/// Externally created platform node carried through the tree description.
#[derive(Clone)]
pub struct Live(Rc<dyn Any>);

impl Live {
	#[must_use]
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.0.downcast_ref()
	}
}

/// Reference to a component type, used as a [`Node`] tag.
///
/// Construct with [`ComponentRef::new`].
#[derive(Clone)]
pub struct ComponentRef {
	pub(crate) type_id: TypeId,
	pub(crate) name: &'static str,
	/// Takes the rendering `Rc<Context<D>>` and returns an `Rc<dyn Embedded<D>>`, both type-erased.
	pub(crate) factory: Rc<dyn Fn(&dyn Any) -> Option<Box<dyn Any>>>,
}

impl ComponentRef {
	#[must_use]
	pub fn name(&self) -> &'static str {
		self.name
	}
}

impl fmt::Debug for ComponentRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentRef").field("name", &self.name).finish_non_exhaustive()
	}
}

/// An event handler property (`on*`).
#[derive(Clone)]
pub struct Handler(pub(crate) Rc<dyn Fn(&Event)>);

impl Handler {
	pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
		Self(Rc::new(handler))
	}

	pub fn call(&self, event: &Event) {
		(self.0)(event)
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

/// A `ref` callback, invoked with the live element on the animation frame after it was patched.
#[derive(Clone)]
pub struct RefCallback(pub(crate) Rc<dyn Fn(&dyn Any)>);

impl RefCallback {
	/// Creates a callback for elements of type `E`. Other element types are ignored.
	pub fn new<E: Any>(callback: impl Fn(&E) + 'static) -> Self {
		Self(Rc::new(move |element: &dyn Any| {
			if let Some(element) = element.downcast_ref::<E>() {
				callback(element)
			}
		}))
	}

	pub fn call(&self, element: &dyn Any) {
		(self.0)(element)
	}
}

type TransformFn<S> = dyn Fn(&S, &[Value]) -> crate::component::Update<S>;

/// An inline state transform, used as the value of an event directive (`$onclick`).
#[derive(Clone)]
pub struct Transform(Rc<dyn Any>);

impl Transform {
	pub fn new<S: 'static>(transform: impl Fn(&S, &[Value]) -> crate::component::Update<S> + 'static) -> Self {
		let boxed: Box<TransformFn<S>> = Box::new(transform);
		Self(Rc::new(boxed))
	}

	/// Applies the transform if it was created for state type `S`.
	pub(crate) fn apply<S: 'static>(&self, state: &S, args: &[Value]) -> Option<crate::component::Update<S>> {
		self.0.downcast_ref::<Box<TransformFn<S>>>().map(|transform| transform(state, args))
	}
}

/// A property value.
#[derive(Clone)]
pub enum Prop {
	Value(Value),
	Handler(Handler),
	Ref(RefCallback),
	Transform(Transform),
	/// `[handler, ...partial arguments]`, as accepted by event directives.
	Tuple(Vec<Prop>),
}

impl Prop {
	pub fn handler(handler: impl Fn(&Event) + 'static) -> Self {
		Prop::Handler(Handler::new(handler))
	}

	pub fn on_ref<E: Any>(callback: impl Fn(&E) + 'static) -> Self {
		Prop::Ref(RefCallback::new(callback))
	}

	pub fn transform<S: 'static>(transform: impl Fn(&S, &[Value]) -> crate::component::Update<S> + 'static) -> Self {
		Prop::Transform(Transform::new(transform))
	}

	#[must_use]
	pub fn tuple(items: Vec<Prop>) -> Self {
		Prop::Tuple(items)
	}

	#[must_use]
	pub fn as_value(&self) -> Option<&Value> {
		match self {
			Prop::Value(value) => Some(value),
			_ => None,
		}
	}

	#[must_use]
	pub fn is_null(&self) -> bool {
		matches!(self, Prop::Value(Value::Null))
	}
}

impl PartialEq for Prop {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Prop::Value(a), Prop::Value(b)) => a == b,
			(Prop::Handler(a), Prop::Handler(b)) => a.ptr_eq(b),
			(Prop::Ref(a), Prop::Ref(b)) => Rc::ptr_eq(&a.0, &b.0),
			(Prop::Transform(a), Prop::Transform(b)) => Rc::ptr_eq(&a.0, &b.0),
			(Prop::Tuple(a), Prop::Tuple(b)) => a == b,
			_ => false,
		}
	}
}

impl fmt::Debug for Prop {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Prop::Value(value) => fmt::Debug::fmt(value, f),
			Prop::Handler(_) => f.write_str("Handler"),
			Prop::Ref(_) => f.write_str("Ref"),
			Prop::Transform(_) => f.write_str("Transform"),
			Prop::Tuple(items) => f.debug_list().entries(items).finish(),
		}
	}
}

impl<T: Into<Value>> From<T> for Prop {
	fn from(value: T) -> Self {
		Prop::Value(value.into())
	}
}

impl From<Handler> for Prop {
	fn from(handler: Handler) -> Self {
		Prop::Handler(handler)
	}
}

impl From<RefCallback> for Prop {
	fn from(callback: RefCallback) -> Self {
		Prop::Ref(callback)
	}
}

impl From<Transform> for Prop {
	fn from(transform: Transform) -> Self {
		Prop::Transform(transform)
	}
}

/// A property map. Iteration order is by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(BTreeMap<String, Prop>);

impl Props {
	#[must_use]
	pub fn new() -> Self {
		Self(BTreeMap::new())
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Prop> {
		self.0.get(name)
	}

	/// Shorthand for a [`Prop::Value`] lookup.
	#[must_use]
	pub fn value(&self, name: &str) -> Option<&Value> {
		self.get(name).and_then(Prop::as_value)
	}

	pub fn insert(&mut self, name: impl Into<String>, prop: impl Into<Prop>) -> Option<Prop> {
		self.0.insert(name.into(), prop.into())
	}

	pub fn remove(&mut self, name: &str) -> Option<Prop> {
		self.0.remove(name)
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.0.contains_key(name)
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Prop)> {
		self.0.iter().map(|(name, prop)| (name.as_str(), prop))
	}
}

impl From<()> for Props {
	fn from((): ()) -> Self {
		Self::new()
	}
}

impl From<Option<Props>> for Props {
	fn from(props: Option<Props>) -> Self {
		props.unwrap_or_default()
	}
}

impl<K: Into<String>, const N: usize> From<[(K, Prop); N]> for Props {
	fn from(entries: [(K, Prop); N]) -> Self {
		entries.into_iter().collect()
	}
}

impl<K: Into<String>> FromIterator<(K, Prop)> for Props {
	fn from_iter<I: IntoIterator<Item = (K, Prop)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(name, prop)| (name.into(), prop)).collect())
	}
}

impl IntoIterator for Props {
	type Item = (String, Prop);
	type IntoIter = std::collections::btree_map::IntoIter<String, Prop>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

/// Builds a [`Props`] map, converting each value with [`Into<Prop>`].
///
/// ```
/// use cambium::{props, vdom::Prop};
/// let props = props! { "class" => "done", "tabindex" => 1 };
/// assert_eq!(props.get("class"), Some(&Prop::from("done")));
/// ```
#[macro_export]
macro_rules! props {
	() => { $crate::vdom::Props::new() };
	($($name:expr => $value:expr),+ $(,)?) => {{
		let mut props = $crate::vdom::Props::new();
		$(props.insert($name, $crate::vdom::Prop::from($value));)+
		props
	}};
}

/// Anything that can appear in a child list.
///
/// Lists are spliced in one level, falsy scalars (`()`, `None`, `false`, `""`) are dropped,
/// and other scalars are stringified into text nodes.
pub trait IntoChildren {
	fn push_into(self, children: &mut Vec<Node>);
}

impl IntoChildren for Node {
	fn push_into(self, children: &mut Vec<Node>) {
		if let NodeKind::Fragment = self.kind {
			children.extend(self.children);
		} else {
			children.push(self);
		}
	}
}

impl IntoChildren for () {
	fn push_into(self, _: &mut Vec<Node>) {}
}

impl IntoChildren for &str {
	fn push_into(self, children: &mut Vec<Node>) {
		if !self.is_empty() {
			children.push(Node::text(self));
		}
	}
}

impl IntoChildren for String {
	fn push_into(self, children: &mut Vec<Node>) {
		if !self.is_empty() {
			children.push(Node::text(self));
		}
	}
}

impl IntoChildren for bool {
	fn push_into(self, children: &mut Vec<Node>) {
		if self {
			children.push(Node::text("true"));
		}
	}
}

macro_rules! display_children {
	($($ty:ty),*) => {$(
		impl IntoChildren for $ty {
			fn push_into(self, children: &mut Vec<Node>) {
				children.push(Node::text(self.to_string()));
			}
		}
	)*};
}
display_children!(i32, i64, u32, u64, usize, f64);

impl<T: IntoChildren> IntoChildren for Option<T> {
	fn push_into(self, children: &mut Vec<Node>) {
		if let Some(child) = self {
			child.push_into(children);
		}
	}
}

impl<T: IntoChildren> IntoChildren for Vec<T> {
	fn push_into(self, children: &mut Vec<Node>) {
		for child in self {
			child.push_into(children);
		}
	}
}

impl<T: IntoChildren, const N: usize> IntoChildren for [T; N] {
	fn push_into(self, children: &mut Vec<Node>) {
		for child in self {
			child.push_into(children);
		}
	}
}

/// What a [`Node`] can be built for.
#[derive(Debug, Clone)]
pub enum Tag {
	Element(String),
	Component(ComponentRef),
}

impl From<&str> for Tag {
	fn from(tag: &str) -> Self {
		Tag::Element(tag.to_owned())
	}
}

impl From<String> for Tag {
	fn from(tag: String) -> Self {
		Tag::Element(tag)
	}
}

impl From<ComponentRef> for Tag {
	fn from(component: ComponentRef) -> Self {
		Tag::Component(component)
	}
}

/// Builds a node. Children are flattened as described on [`IntoChildren`].
pub fn h(tag: impl Into<Tag>, props: impl Into<Props>, children: impl IntoChildren) -> Node {
	let mut flat = Vec::new();
	children.push_into(&mut flat);
	Node {
		kind: match tag.into() {
			Tag::Element(tag) => NodeKind::Element(tag),
			Tag::Component(component) => NodeKind::Component(component),
		},
		props: props.into(),
		children: flat,
	}
}

/// Returns the flattened children themselves rather than a wrapping node.
pub fn fragment(children: impl IntoChildren) -> Vec<Node> {
	let mut flat = Vec::new();
	children.push_into(&mut flat);
	flat
}

/// The result of a view function.
#[derive(Debug, Clone)]
pub enum Vdom {
	/// Render nothing this cycle. The live tree is left alone.
	Skip,
	Nodes(Vec<Node>),
}

impl From<()> for Vdom {
	fn from((): ()) -> Self {
		Vdom::Skip
	}
}

impl From<Node> for Vdom {
	fn from(node: Node) -> Self {
		Vdom::Nodes(fragment(node))
	}
}

impl From<Vec<Node>> for Vdom {
	fn from(nodes: Vec<Node>) -> Self {
		Vdom::Nodes(fragment(nodes))
	}
}

impl From<&str> for Vdom {
	fn from(text: &str) -> Self {
		Vdom::Nodes(vec![Node::text(text)])
	}
}

impl From<String> for Vdom {
	fn from(text: String) -> Self {
		Vdom::Nodes(vec![Node::text(text)])
	}
}

impl<T: Into<Vdom>> From<Option<T>> for Vdom {
	fn from(vdom: Option<T>) -> Self {
		vdom.map_or(Vdom::Skip, Into::into)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn children_are_flattened_and_falsy_scalars_dropped() {
		let node = h(
			"ul",
			(),
			vec![
				fragment(vec![h("li", (), "a"), h("li", (), "b")]),
				fragment(Some("")),
				fragment(false),
				fragment(3),
			],
		);
		assert_eq!(node.children.len(), 3);
		assert_eq!(node.children[0].tag(), Some("li"));
		assert!(matches!(&node.children[2].kind, NodeKind::Text(text) if text == "3"));
	}

	#[test]
	fn hand_built_fragments_splice() {
		let fragment_node = Node {
			kind: NodeKind::Fragment,
			props: Props::new(),
			children: vec![Node::text("x"), Node::text("y")],
		};
		let node = h("p", (), fragment_node);
		assert_eq!(node.children.len(), 2);
	}

	#[test]
	fn keys() {
		let keyed = h("li", props! { "key" => 7 }, ());
		assert_eq!(keyed.key().as_deref(), Some("7"));
		assert_eq!(h("li", (), ()).key(), None);
	}

	#[test]
	fn prop_equality_is_identity_for_callbacks() {
		let handler = Prop::handler(|_| ());
		assert_eq!(handler, handler.clone());
		assert_ne!(handler, Prop::handler(|_| ()));
	}
}
