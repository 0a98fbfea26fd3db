//! A small, self-contained document model.
//!
//! It keeps attributes, properties, inline style, dataset and `on*` handlers apart the way a browser does,
//! tracks the focused element and counts every mutation, which makes it suitable for headless use and tests.
//!
//! Methods prefixed with `user_` simulate interaction and are not counted as mutations.

use super::{camel_to_kebab, Dom, ElementState, Namespace};
use crate::{
	error::DomError,
	value::{Event, EventTarget, Value},
	vdom::{Handler, Props},
};
use core::{
	cell::{Cell, RefCell},
	fmt,
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::trace;

const GLOBAL_PROPERTIES: &[&str] = &[
	"id",
	"className",
	"title",
	"hidden",
	"tabIndex",
	"dir",
	"lang",
	"innerHTML",
	"textContent",
	"draggable",
	"scrollTop",
	"scrollLeft",
];

const READ_ONLY_PROPERTIES: &[&str] = &["tagName", "nodeName", "nodeType", "childElementCount", "isConnected", "offsetWidth", "offsetHeight", "clientWidth", "clientHeight"];

fn tag_properties(node_name: &str) -> &'static [&'static str] {
	match node_name {
		"INPUT" => &[
			"value",
			"checked",
			"type",
			"name",
			"disabled",
			"placeholder",
			"readOnly",
			"required",
			"multiple",
			"min",
			"max",
			"step",
			"autofocus",
			"selectionStart",
			"selectionEnd",
			"selectionDirection",
		],
		"TEXTAREA" => &["value", "name", "disabled", "placeholder", "readOnly", "required", "rows", "cols", "selectionStart", "selectionEnd", "selectionDirection"],
		"SELECT" => &["value", "selectedIndex", "multiple", "name", "disabled", "required"],
		"OPTION" => &["value", "selected", "disabled", "label"],
		"BUTTON" => &["disabled", "type", "name", "value"],
		"A" => &["href", "target", "download"],
		"AUDIO" | "VIDEO" => &["src", "currentTime", "paused", "playbackRate", "volume", "muted", "autoplay", "controls", "loop"],
		"IMG" => &["src", "alt"],
		"LABEL" => &["htmlFor"],
		"FORM" => &["action", "method", "noValidate"],
		"DETAILS" | "DIALOG" => &["open"],
		_ => &[],
	}
}

enum Kind {
	Element { tag: String, namespace: Namespace },
	Text,
}

struct Attr {
	namespace: Option<String>,
	name: String,
	value: String,
}

impl Attr {
	fn local_name(&self) -> &str {
		self.name.split_once(':').map_or(self.name.as_str(), |(_, local)| local)
	}
}

struct NodeData {
	kind: Kind,
	text: RefCell<String>,
	parent: RefCell<Weak<NodeData>>,
	children: RefCell<Vec<MemNode>>,
	attributes: RefCell<Vec<Attr>>,
	properties: RefCell<HashMap<String, Value>>,
	style: RefCell<Vec<(String, String)>>,
	handlers: RefCell<HashMap<String, Handler>>,
	state: Rc<ElementState>,
}

/// Handle to a node of a [`MemoryDom`].
#[derive(Clone)]
pub struct MemNode(Rc<NodeData>);

impl PartialEq for MemNode {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl Eq for MemNode {}

impl fmt::Debug for MemNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.0.kind {
			Kind::Element { tag, .. } => write!(f, "MemNode(<{}>)", tag),
			Kind::Text => f.write_str("MemNode(#text)"),
		}
	}
}

impl MemNode {
	fn new(kind: Kind, text: &str) -> Self {
		Self(Rc::new(NodeData {
			kind,
			text: RefCell::new(text.to_owned()),
			parent: RefCell::new(Weak::new()),
			children: RefCell::default(),
			attributes: RefCell::default(),
			properties: RefCell::default(),
			style: RefCell::default(),
			handlers: RefCell::default(),
			state: Rc::default(),
		}))
	}

	fn parent(&self) -> Option<MemNode> {
		self.0.parent.borrow().upgrade().map(MemNode)
	}

	fn is_element(&self) -> bool {
		matches!(self.0.kind, Kind::Element { .. })
	}

	fn node_name(&self) -> String {
		match &self.0.kind {
			Kind::Element { tag, namespace: Namespace::Html } => tag.to_ascii_uppercase(),
			Kind::Element { tag, namespace: Namespace::Svg } => tag.clone(),
			Kind::Text => "#text".to_owned(),
		}
	}

	fn index_in(&self, parent: &MemNode) -> Option<usize> {
		parent.0.children.borrow().iter().position(|child| child == self)
	}

	fn is_inclusive_ancestor_of(&self, other: &MemNode) -> bool {
		let mut current = Some(other.clone());
		while let Some(node) = current {
			if &node == self {
				return true;
			}
			current = node.parent();
		}
		false
	}

	fn detach(&self) {
		if let Some(parent) = self.parent() {
			parent.0.children.borrow_mut().retain(|child| child != self);
		}
		*self.0.parent.borrow_mut() = Weak::new();
	}

	fn attach(&self, parent: &MemNode, index: usize) {
		*self.0.parent.borrow_mut() = Rc::downgrade(&parent.0);
		parent.0.children.borrow_mut().insert(index, self.clone());
	}

	fn text_content(&self) -> String {
		match self.0.kind {
			Kind::Text => self.0.text.borrow().clone(),
			Kind::Element { .. } => self.0.children.borrow().iter().map(MemNode::text_content).collect(),
		}
	}

	fn attribute(&self, name: &str) -> Option<String> {
		self.0.attributes.borrow().iter().find(|attr| attr.namespace.is_none() && attr.name.eq_ignore_ascii_case(name)).map(|attr| attr.value.clone())
	}

	fn property(&self, name: &str) -> Option<Value> {
		self.0.properties.borrow().get(name).cloned()
	}

	fn write_html(&self, out: &mut String) {
		match &self.0.kind {
			Kind::Text => out.push_str(&self.0.text.borrow()),
			Kind::Element { tag, .. } => {
				out.push('<');
				out.push_str(tag);
				for attr in self.0.attributes.borrow().iter() {
					out.push(' ');
					out.push_str(&attr.name);
					out.push_str("=\"");
					out.push_str(&attr.value.replace('"', "&quot;"));
					out.push('"');
				}
				let style = style_text(&self.0.style.borrow());
				if !style.is_empty() {
					out.push_str(" style=\"");
					out.push_str(&style);
					out.push('"');
				}
				out.push('>');
				for child in self.0.children.borrow().iter() {
					child.write_html(out);
				}
				out.push_str("</");
				out.push_str(tag);
				out.push('>');
			}
		}
	}
}

fn style_text(declarations: &[(String, String)]) -> String {
	declarations.iter().map(|(name, value)| format!("{}: {};", name, value)).collect::<Vec<_>>().join(" ")
}

fn valid_name(name: &str) -> bool {
	!name.is_empty() && !name.chars().any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\'' | '/' | '='))
}

/// An in-memory document with a `<body>` root.
pub struct MemoryDom {
	body: MemNode,
	focused: RefCell<Option<MemNode>>,
	mutations: Cell<usize>,
}

impl fmt::Debug for MemoryDom {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryDom").field("mutations", &self.mutations.get()).finish_non_exhaustive()
	}
}

impl Default for MemoryDom {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryDom {
	#[must_use]
	pub fn new() -> Self {
		Self {
			body: MemNode::new(
				Kind::Element {
					tag: "body".to_owned(),
					namespace: Namespace::Html,
				},
				"",
			),
			focused: RefCell::new(None),
			mutations: Cell::new(0),
		}
	}

	#[must_use]
	pub fn body(&self) -> MemNode {
		self.body.clone()
	}

	/// Number of mutations applied through the [`Dom`] interface so far.
	#[must_use]
	pub fn mutations(&self) -> usize {
		self.mutations.get()
	}

	fn mutated(&self) {
		self.mutations.set(self.mutations.get() + 1);
	}

	/// Serializes `node` as markup. Inline style is emitted as a `style` attribute.
	#[must_use]
	pub fn to_html(&self, node: &MemNode) -> String {
		let mut out = String::new();
		node.write_html(&mut out);
		out
	}

	/// Serializes the children of `node`.
	#[must_use]
	pub fn inner_html(&self, node: &MemNode) -> String {
		let mut out = String::new();
		for child in node.0.children.borrow().iter() {
			child.write_html(&mut out);
		}
		out
	}

	#[must_use]
	pub fn children(&self, node: &MemNode) -> Vec<MemNode> {
		node.0.children.borrow().clone()
	}

	pub fn user_focus(&self, element: &MemNode) {
		*self.focused.borrow_mut() = Some(element.clone());
	}

	pub fn user_blur(&self) {
		*self.focused.borrow_mut() = None;
	}

	/// Sets a property as the user (or a media driver) would, for example an input's `value` or `scrollTop`.
	pub fn user_set(&self, element: &MemNode, name: &str, value: impl Into<Value>) {
		element.0.properties.borrow_mut().insert(name.to_owned(), value.into());
	}

	/// Types `text` into a text control and fires `input`.
	pub fn user_type(&self, element: &MemNode, text: &str) -> usize {
		let length = text.chars().count();
		self.user_set(element, "value", text);
		self.user_set(element, "selectionStart", length);
		self.user_set(element, "selectionEnd", length);
		self.dispatch_event(element, "input")
	}

	pub fn user_select(&self, element: &MemNode, start: usize, end: usize) {
		self.user_set(element, "selectionStart", start);
		self.user_set(element, "selectionEnd", end);
	}

	/// Clicks `element`, toggling checkboxes and checking radios first, like a browser does.
	pub fn user_click(&self, element: &MemNode) -> usize {
		if element.node_name() == "INPUT" {
			let kind = element.property("type").or_else(|| element.attribute("type").map(Value::Str)).map(|kind| kind.to_text());
			match kind.as_deref() {
				Some("checkbox") => {
					let checked = element.property("checked").and_then(|checked| checked.as_bool()).unwrap_or(false);
					self.user_set(element, "checked", !checked);
				}
				Some("radio") => self.user_set(element, "checked", true),
				_ => (),
			}
		}
		self.dispatch_event(element, "click")
	}

	/// Fires `kind` at `target` and bubbles it through its ancestors.
	///
	/// Returns the number of handlers invoked.
	pub fn dispatch_event(&self, target: &MemNode, kind: &str) -> usize {
		let event = Event::new(kind, self.event_target(target)).with_native(Rc::new(target.clone()));

		let mut handlers = Vec::new();
		let mut current = Some(target.clone());
		while let Some(node) = current {
			if let Some(handler) = node.0.handlers.borrow().get(kind) {
				handlers.push(handler.clone());
			}
			current = node.parent();
		}

		trace!(kind, handlers = handlers.len(), "Dispatching event.");
		for handler in &handlers {
			handler.call(&event);
		}
		handlers.len()
	}

	fn event_target(&self, target: &MemNode) -> EventTarget {
		let string = |name: &str| target.property(name).map(|value| value.to_text()).or_else(|| target.attribute(&name.to_ascii_lowercase()));
		EventTarget {
			name: string("name"),
			value: string("value"),
			checked: target.property("checked").and_then(|value| value.as_bool()),
			selected: target.property("selected").and_then(|value| value.as_bool()),
			multiple: target.property("multiple").and_then(|value| value.as_bool()).unwrap_or(false),
		}
	}

	fn find_by_id(node: &MemNode, id: &str) -> Option<MemNode> {
		if node.attribute("id").as_deref() == Some(id) || node.property("id").map(|value| value.to_text()).as_deref() == Some(id) {
			return Some(node.clone());
		}
		let children = node.0.children.borrow().clone();
		children.iter().find_map(|child| Self::find_by_id(child, id))
	}

	fn check_child(parent: &MemNode, child: &MemNode) -> Result<usize, DomError> {
		child.index_in(parent).ok_or(DomError::NotFound)
	}

	fn check_insertable(parent: &MemNode, node: &MemNode) -> Result<(), DomError> {
		if !parent.is_element() || node.is_inclusive_ancestor_of(parent) {
			return Err(DomError::HierarchyRequest);
		}
		Ok(())
	}

	fn replace_with_text(&self, element: &MemNode, text: &str) {
		for child in element.0.children.borrow_mut().drain(..) {
			*child.0.parent.borrow_mut() = Weak::new();
		}
		if !text.is_empty() {
			MemNode::new(Kind::Text, text).attach(element, 0);
		}
	}
}

impl Dom for MemoryDom {
	type Node = MemNode;

	fn create_element(&self, tag: &str, namespace: Namespace) -> Result<MemNode, DomError> {
		if !valid_name(tag) {
			return Err(DomError::InvalidName(tag.to_owned()));
		}
		Ok(MemNode::new(
			Kind::Element {
				tag: match namespace {
					Namespace::Html => tag.to_ascii_lowercase(),
					Namespace::Svg => tag.to_owned(),
				},
				namespace,
			},
			"",
		))
	}

	fn create_text(&self, text: &str) -> MemNode {
		MemNode::new(Kind::Text, text)
	}

	fn element_by_id(&self, id: &str) -> Option<MemNode> {
		Self::find_by_id(&self.body, id)
	}

	fn child_count(&self, parent: &MemNode) -> usize {
		parent.0.children.borrow().len()
	}

	fn child_at(&self, parent: &MemNode, index: usize) -> Option<MemNode> {
		parent.0.children.borrow().get(index).cloned()
	}

	fn parent(&self, node: &MemNode) -> Option<MemNode> {
		node.parent()
	}

	fn is_connected(&self, node: &MemNode) -> bool {
		self.body.is_inclusive_ancestor_of(node)
	}

	fn next_sibling(&self, node: &MemNode) -> Option<MemNode> {
		let parent = node.parent()?;
		let index = node.index_in(&parent)?;
		self.child_at(&parent, index + 1)
	}

	fn insert_before(&self, parent: &MemNode, node: &MemNode, reference: Option<&MemNode>) -> Result<(), DomError> {
		if reference == Some(node) {
			return Ok(());
		}
		Self::check_insertable(parent, node)?;
		if let Some(reference) = reference {
			Self::check_child(parent, reference)?;
		}
		node.detach();
		let index = match reference {
			Some(reference) => Self::check_child(parent, reference)?,
			None => self.child_count(parent),
		};
		node.attach(parent, index);
		self.mutated();
		Ok(())
	}

	fn append_all(&self, parent: &MemNode, nodes: Vec<MemNode>) -> Result<(), DomError> {
		for node in &nodes {
			Self::check_insertable(parent, node)?;
		}
		for node in nodes {
			node.detach();
			let index = self.child_count(parent);
			node.attach(parent, index);
		}
		self.mutated();
		Ok(())
	}

	fn replace_child(&self, parent: &MemNode, new: &MemNode, old: &MemNode) -> Result<(), DomError> {
		if new == old {
			return Ok(());
		}
		Self::check_insertable(parent, new)?;
		Self::check_child(parent, old)?;
		new.detach();
		let index = Self::check_child(parent, old)?;
		old.detach();
		new.attach(parent, index);
		self.mutated();
		Ok(())
	}

	fn remove_child(&self, parent: &MemNode, child: &MemNode) -> Result<(), DomError> {
		Self::check_child(parent, child)?;
		child.detach();
		if self.focused.borrow().as_ref().map_or(false, |focused| child.is_inclusive_ancestor_of(focused)) {
			*self.focused.borrow_mut() = None;
		}
		self.mutated();
		Ok(())
	}

	fn node_name(&self, node: &MemNode) -> String {
		node.node_name()
	}

	fn is_text(&self, node: &MemNode) -> bool {
		matches!(node.0.kind, Kind::Text)
	}

	fn namespace(&self, node: &MemNode) -> Namespace {
		match node.0.kind {
			Kind::Element { namespace, .. } => namespace,
			Kind::Text => Namespace::Html,
		}
	}

	fn text_content(&self, node: &MemNode) -> String {
		node.text_content()
	}

	fn set_text(&self, node: &MemNode, text: &str) {
		match node.0.kind {
			Kind::Text => *node.0.text.borrow_mut() = text.to_owned(),
			Kind::Element { .. } => self.replace_with_text(node, text),
		}
		self.mutated();
	}

	fn attribute(&self, element: &MemNode, name: &str) -> Option<String> {
		element.attribute(name)
	}

	fn attribute_names(&self, element: &MemNode) -> Vec<String> {
		element.0.attributes.borrow().iter().map(|attr| attr.name.clone()).collect()
	}

	fn set_attribute(&self, element: &MemNode, name: &str, value: &str) -> Result<(), DomError> {
		if !valid_name(name) {
			return Err(DomError::InvalidName(name.to_owned()));
		}
		let name = match self.namespace(element) {
			Namespace::Html => name.to_ascii_lowercase(),
			Namespace::Svg => name.to_owned(),
		};
		let mut attributes = element.0.attributes.borrow_mut();
		match attributes.iter_mut().find(|attr| attr.namespace.is_none() && attr.name == name) {
			Some(attr) => attr.value = value.to_owned(),
			None => attributes.push(Attr {
				namespace: None,
				name,
				value: value.to_owned(),
			}),
		}
		self.mutated();
		Ok(())
	}

	fn remove_attribute(&self, element: &MemNode, name: &str) -> Result<(), DomError> {
		let mut attributes = element.0.attributes.borrow_mut();
		let before = attributes.len();
		attributes.retain(|attr| !(attr.namespace.is_none() && attr.name.eq_ignore_ascii_case(name)));
		if attributes.len() != before {
			self.mutated();
		}
		Ok(())
	}

	fn attribute_ns(&self, element: &MemNode, namespace: &str, local_name: &str) -> Option<String> {
		element
			.0
			.attributes
			.borrow()
			.iter()
			.find(|attr| attr.namespace.as_deref() == Some(namespace) && attr.local_name() == local_name)
			.map(|attr| attr.value.clone())
	}

	fn set_attribute_ns(&self, element: &MemNode, namespace: &str, qualified_name: &str, value: &str) -> Result<(), DomError> {
		if !valid_name(qualified_name) {
			return Err(DomError::InvalidName(qualified_name.to_owned()));
		}
		let local_name = qualified_name.split_once(':').map_or(qualified_name, |(_, local)| local);
		let mut attributes = element.0.attributes.borrow_mut();
		attributes.retain(|attr| !(attr.namespace.as_deref() == Some(namespace) && attr.local_name() == local_name));
		attributes.push(Attr {
			namespace: Some(namespace.to_owned()),
			name: qualified_name.to_owned(),
			value: value.to_owned(),
		});
		self.mutated();
		Ok(())
	}

	fn remove_attribute_ns(&self, element: &MemNode, namespace: &str, local_name: &str) -> Result<(), DomError> {
		let mut attributes = element.0.attributes.borrow_mut();
		let before = attributes.len();
		attributes.retain(|attr| !(attr.namespace.as_deref() == Some(namespace) && attr.local_name() == local_name));
		if attributes.len() != before {
			self.mutated();
		}
		Ok(())
	}

	fn has_property(&self, element: &MemNode, name: &str) -> bool {
		match element.0.kind {
			Kind::Element { namespace: Namespace::Html, .. } => {
				GLOBAL_PROPERTIES.contains(&name) || READ_ONLY_PROPERTIES.contains(&name) || tag_properties(&element.node_name()).contains(&name) || element.0.properties.borrow().contains_key(name)
			}
			_ => READ_ONLY_PROPERTIES.contains(&name),
		}
	}

	fn property(&self, element: &MemNode, name: &str) -> Option<Value> {
		match name {
			"textContent" | "innerHTML" => Some(Value::Str(element.text_content())),
			_ => element.property(name),
		}
	}

	fn set_property(&self, element: &MemNode, name: &str, value: &Value) -> Result<(), DomError> {
		if READ_ONLY_PROPERTIES.contains(&name) || !element.is_element() {
			return Err(DomError::ReadOnly(name.to_owned()));
		}
		match name {
			"textContent" | "innerHTML" => self.replace_with_text(element, &value.to_text()),
			_ if matches!(value, Value::Null) => {
				element.0.properties.borrow_mut().remove(name);
			}
			_ => {
				element.0.properties.borrow_mut().insert(name.to_owned(), value.clone());
			}
		}
		self.mutated();
		Ok(())
	}

	fn set_handler(&self, element: &MemNode, event: &str, handler: Option<&Handler>) {
		let mut handlers = element.0.handlers.borrow_mut();
		match handler {
			// Swapping handlers keeps the listener slot, like `WebDom` does.
			Some(handler) => {
				if handlers.insert(event.to_owned(), handler.clone()).is_some() {
					return;
				}
			}
			None => {
				if handlers.remove(event).is_none() {
					return;
				}
			}
		}
		self.mutated();
	}

	fn style_text(&self, element: &MemNode) -> String {
		style_text(&element.0.style.borrow())
	}

	fn set_style_text(&self, element: &MemNode, text: &str) {
		*element.0.style.borrow_mut() = text
			.split(';')
			.filter_map(|declaration| declaration.split_once(':'))
			.map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
			.filter(|(name, value)| !name.is_empty() && !value.is_empty())
			.collect();
		self.mutated();
	}

	fn style(&self, element: &MemNode, name: &str) -> String {
		element.0.style.borrow().iter().find(|(n, _)| n == name).map(|(_, value)| value.clone()).unwrap_or_default()
	}

	fn set_style(&self, element: &MemNode, name: &str, value: &str) {
		if value.is_empty() {
			return self.remove_style(element, name);
		}
		let mut style = element.0.style.borrow_mut();
		match style.iter_mut().find(|(n, _)| n == name) {
			Some((_, existing)) => *existing = value.to_owned(),
			None => style.push((name.to_owned(), value.to_owned())),
		}
		self.mutated();
	}

	fn remove_style(&self, element: &MemNode, name: &str) {
		let mut style = element.0.style.borrow_mut();
		let before = style.len();
		style.retain(|(n, _)| n != name);
		if style.len() != before {
			self.mutated();
		}
	}

	fn data(&self, element: &MemNode, name: &str) -> Option<String> {
		element.attribute(&format!("data-{}", camel_to_kebab(name)))
	}

	fn set_data(&self, element: &MemNode, name: &str, value: &str) {
		if let Err(error) = self.set_attribute(element, &format!("data-{}", camel_to_kebab(name)), value) {
			tracing::error!("Failed to write dataset entry: {}", error);
		}
	}

	fn remove_data(&self, element: &MemNode, name: &str) {
		let _ = self.remove_attribute(element, &format!("data-{}", camel_to_kebab(name)));
	}

	fn is_focused(&self, element: &MemNode) -> bool {
		self.focused.borrow().as_ref() == Some(element)
	}

	fn state(&self, element: &MemNode) -> Rc<ElementState> {
		element.0.state.clone()
	}

	fn release(&self, node: &MemNode) {
		node.0.handlers.borrow_mut().clear();
		node.0.state.set_key(None);
		node.0.state.set_props(Props::new());
	}
}
