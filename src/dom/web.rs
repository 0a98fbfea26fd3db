//! The browser's DOM, through `web-sys`.
//!
//! All `on*` handlers share a single JavaScript closure, bound per (element, event) slot.
//! Per-element [`ElementState`] lives in a thread-local table indexed by an id stored on the element itself.

use super::{camel_to_kebab, closure_map, Dom, ElementState, Namespace, SVG_NAMESPACE};
use crate::{
	error::DomError,
	value::{Event, EventTarget, Value},
	vdom::Handler,
};
use core::cell::{Cell, RefCell};
use hashbrown::HashMap;
use js_sys::{Function, Object, Reflect};
use std::rc::Rc;
use tracing::{error, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue, UnwrapThrowExt};
use web_sys::{CssStyleDeclaration, Document, Element, HtmlElement, SvgElement};

const STATE_ID: &str = "__cambiumState";

thread_local! {
	/// Entries are dropped by [`Dom::release`]. Keyed elements keep theirs until their key is taken by another element.
	static ELEMENT_STATES: RefCell<HashMap<u32, Rc<ElementState>>> = RefCell::default();
	static NEXT_STATE_ID: Cell<u32> = Cell::new(1);
}

/// Renders into a live `web_sys::Document`.
#[derive(Debug)]
pub struct WebDom {
	document: Document,
	common_handler: Closure<dyn Fn(JsValue, JsValue, web_sys::Event)>,
}

impl Default for WebDom {
	fn default() -> Self {
		Self::new()
	}
}

impl WebDom {
	/// Uses the `window`'s document.
	#[must_use]
	pub fn new() -> Self {
		let document = web_sys::window()
			.and_then(|window| window.document())
			.expect_throw("cambium: No `window.document` found.");
		Self::with_document(document)
	}

	#[must_use]
	pub fn with_document(document: Document) -> Self {
		Self {
			document,
			common_handler: Closure::wrap(Box::new(|state_id: JsValue, event_name: JsValue, event: web_sys::Event| {
				let span = trace_span!("common_handler", kind = %event.type_());
				let _enter = span.enter();

				#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
				let state_id = state_id.as_f64().unwrap_or_default() as u32;
				let event_name = event_name.as_string().unwrap_or_default();
				match closure_map::get(state_id, &event_name) {
					Some(handler) => handler.call(&convert_event(event)),
					None => warn!("Event fired for a handler that was already removed."),
				}
			})),
		}
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.document
	}

	/// Number of elements with live [`ElementState`] on this thread.
	#[must_use]
	pub fn tracked_elements() -> usize {
		ELEMENT_STATES.with(|states| states.borrow().len())
	}

	/// The state id stored on `node`, without assigning one.
	fn stored_state_id(node: &web_sys::Node) -> Option<u32> {
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		Reflect::get(node, &JsValue::from_str(STATE_ID)).ok().and_then(|id| id.as_f64()).map(|id| id as u32)
	}

	fn state_id(element: &web_sys::Node) -> u32 {
		if let Some(id) = Self::stored_state_id(element) {
			return id;
		}
		let id = NEXT_STATE_ID.with(|next| {
			let id = next.get();
			next.set(id.wrapping_add(1));
			id
		});
		if let Err(error) = Reflect::set(element, &JsValue::from_str(STATE_ID), &JsValue::from(id)) {
			error!("Failed to tag element with its state id: {:?}", error);
		}
		id
	}
}

fn element(node: &web_sys::Node) -> Result<&Element, DomError> {
	node.dyn_ref::<Element>().ok_or(DomError::NotAnElement)
}

fn style_of(node: &web_sys::Node) -> Option<CssStyleDeclaration> {
	node.dyn_ref::<HtmlElement>()
		.map(HtmlElement::style)
		.or_else(|| node.dyn_ref::<SvgElement>().map(SvgElement::style))
}

fn to_js(value: &Value) -> JsValue {
	match value {
		Value::Null => JsValue::NULL,
		Value::Bool(bool) => JsValue::from_bool(*bool),
		Value::Number(number) => JsValue::from_f64(*number),
		Value::Str(string) => JsValue::from_str(string),
		other => JsValue::from_str(&other.to_text()),
	}
}

fn from_js(value: &JsValue) -> Option<Value> {
	if value.is_null() || value.is_undefined() {
		Some(Value::Null)
	} else if let Some(bool) = value.as_bool() {
		Some(Value::Bool(bool))
	} else if let Some(number) = value.as_f64() {
		Some(Value::Number(number))
	} else {
		value.as_string().map(Value::Str)
	}
}

fn convert_event(event: web_sys::Event) -> Event {
	let target = event.target().map(JsValue::from).unwrap_or(JsValue::UNDEFINED);
	let get = |name: &str| Reflect::get(&target, &JsValue::from_str(name)).ok().and_then(|value| from_js(&value)).filter(|value| *value != Value::Null);
	let snapshot = EventTarget {
		name: get("name").and_then(|name| name.as_str().map(str::to_owned)),
		value: get("value").map(|value| value.to_text()),
		checked: get("checked").and_then(|checked| checked.as_bool()),
		selected: get("selected").and_then(|selected| selected.as_bool()),
		multiple: get("multiple").and_then(|multiple| multiple.as_bool()).unwrap_or(false),
	};
	Event::new(event.type_(), snapshot).with_native(Rc::new(event))
}

impl Dom for WebDom {
	type Node = web_sys::Node;

	fn create_element(&self, tag: &str, namespace: Namespace) -> Result<web_sys::Node, DomError> {
		let element = match namespace {
			Namespace::Html => self.document.create_element(tag)?,
			Namespace::Svg => self.document.create_element_ns(Some(SVG_NAMESPACE), tag)?,
		};
		Ok(element.into())
	}

	fn create_text(&self, text: &str) -> web_sys::Node {
		self.document.create_text_node(text).into()
	}

	fn element_by_id(&self, id: &str) -> Option<web_sys::Node> {
		self.document.get_element_by_id(id).map(Into::into)
	}

	fn child_count(&self, parent: &web_sys::Node) -> usize {
		parent.child_nodes().length() as usize
	}

	fn child_at(&self, parent: &web_sys::Node, index: usize) -> Option<web_sys::Node> {
		parent.child_nodes().item(u32::try_from(index).ok()?)
	}

	fn parent(&self, node: &web_sys::Node) -> Option<web_sys::Node> {
		node.parent_node()
	}

	fn is_connected(&self, node: &web_sys::Node) -> bool {
		node.is_connected()
	}

	fn next_sibling(&self, node: &web_sys::Node) -> Option<web_sys::Node> {
		node.next_sibling()
	}

	fn insert_before(&self, parent: &web_sys::Node, node: &web_sys::Node, reference: Option<&web_sys::Node>) -> Result<(), DomError> {
		parent.insert_before(node, reference)?;
		Ok(())
	}

	fn append_all(&self, parent: &web_sys::Node, nodes: Vec<web_sys::Node>) -> Result<(), DomError> {
		if let [node] = nodes.as_slice() {
			parent.append_child(node)?;
			return Ok(());
		}
		let fragment = self.document.create_document_fragment();
		for node in &nodes {
			fragment.append_child(node)?;
		}
		parent.append_child(&fragment)?;
		Ok(())
	}

	fn replace_child(&self, parent: &web_sys::Node, new: &web_sys::Node, old: &web_sys::Node) -> Result<(), DomError> {
		parent.replace_child(new, old)?;
		Ok(())
	}

	fn remove_child(&self, parent: &web_sys::Node, child: &web_sys::Node) -> Result<(), DomError> {
		parent.remove_child(child)?;
		Ok(())
	}

	fn node_name(&self, node: &web_sys::Node) -> String {
		node.node_name()
	}

	fn is_text(&self, node: &web_sys::Node) -> bool {
		node.node_type() == web_sys::Node::TEXT_NODE
	}

	fn namespace(&self, node: &web_sys::Node) -> Namespace {
		match node.dyn_ref::<Element>().and_then(Element::namespace_uri) {
			Some(namespace) if namespace == SVG_NAMESPACE => Namespace::Svg,
			_ => Namespace::Html,
		}
	}

	fn text_content(&self, node: &web_sys::Node) -> String {
		node.text_content().unwrap_or_default()
	}

	fn set_text(&self, node: &web_sys::Node, text: &str) {
		node.set_text_content(Some(text));
	}

	fn attribute(&self, node: &web_sys::Node, name: &str) -> Option<String> {
		element(node).ok()?.get_attribute(name)
	}

	fn attribute_names(&self, node: &web_sys::Node) -> Vec<String> {
		element(node).map_or_else(|_| Vec::new(), |element| element.get_attribute_names().iter().filter_map(|name| name.as_string()).collect())
	}

	fn set_attribute(&self, node: &web_sys::Node, name: &str, value: &str) -> Result<(), DomError> {
		element(node)?.set_attribute(name, value)?;
		Ok(())
	}

	fn remove_attribute(&self, node: &web_sys::Node, name: &str) -> Result<(), DomError> {
		element(node)?.remove_attribute(name)?;
		Ok(())
	}

	fn attribute_ns(&self, node: &web_sys::Node, namespace: &str, local_name: &str) -> Option<String> {
		element(node).ok()?.get_attribute_ns(Some(namespace), local_name)
	}

	fn set_attribute_ns(&self, node: &web_sys::Node, namespace: &str, qualified_name: &str, value: &str) -> Result<(), DomError> {
		element(node)?.set_attribute_ns(Some(namespace), qualified_name, value)?;
		Ok(())
	}

	fn remove_attribute_ns(&self, node: &web_sys::Node, namespace: &str, local_name: &str) -> Result<(), DomError> {
		element(node)?.remove_attribute_ns(Some(namespace), local_name)?;
		Ok(())
	}

	fn has_property(&self, node: &web_sys::Node, name: &str) -> bool {
		Reflect::has(node, &JsValue::from_str(name)).unwrap_or(false)
	}

	fn property(&self, node: &web_sys::Node, name: &str) -> Option<Value> {
		Reflect::get(node, &JsValue::from_str(name)).ok().and_then(|value| from_js(&value))
	}

	fn set_property(&self, node: &web_sys::Node, name: &str, value: &Value) -> Result<(), DomError> {
		if Reflect::set(node, &JsValue::from_str(name), &to_js(value))? {
			Ok(())
		} else {
			Err(DomError::ReadOnly(name.to_owned()))
		}
	}

	fn set_handler(&self, node: &web_sys::Node, event: &str, handler: Option<&Handler>) {
		let state_id = Self::state_id(node);
		let property = JsValue::from_str(&format!("on{}", event));
		let assigned = match handler {
			Some(handler) => {
				if !closure_map::publish(state_id, event, handler) {
					return;
				}
				let function = self.common_handler.as_ref().unchecked_ref::<Function>().bind2(&JsValue::UNDEFINED, &JsValue::from(state_id), &JsValue::from_str(event));
				Reflect::set(node, &property, &function)
			}
			None => {
				if !closure_map::unpublish(state_id, event) {
					return;
				}
				Reflect::set(node, &property, &JsValue::NULL)
			}
		};
		if let Err(error) = assigned {
			error!(event, "Failed to assign event handler: {:?}", error);
		}
	}

	fn style_text(&self, node: &web_sys::Node) -> String {
		style_of(node).map(|style| style.css_text()).unwrap_or_default()
	}

	fn set_style_text(&self, node: &web_sys::Node, text: &str) {
		if let Some(style) = style_of(node) {
			style.set_css_text(text);
		}
	}

	fn style(&self, node: &web_sys::Node, name: &str) -> String {
		style_of(node).and_then(|style| style.get_property_value(name).ok()).unwrap_or_default()
	}

	fn set_style(&self, node: &web_sys::Node, name: &str, value: &str) {
		if let Some(Err(error)) = style_of(node).map(|style| style.set_property(name, value)) {
			error!("Failed to set style declaration: {:?}", error);
		}
	}

	fn remove_style(&self, node: &web_sys::Node, name: &str) {
		if let Some(Err(error)) = style_of(node).map(|style| style.remove_property(name)) {
			error!("Failed to remove style declaration: {:?}", error);
		}
	}

	fn data(&self, node: &web_sys::Node, name: &str) -> Option<String> {
		self.attribute(node, &format!("data-{}", camel_to_kebab(name)))
	}

	fn set_data(&self, node: &web_sys::Node, name: &str, value: &str) {
		if let Err(error) = self.set_attribute(node, &format!("data-{}", camel_to_kebab(name)), value) {
			error!("Failed to set data attribute: {}", error);
		}
	}

	fn remove_data(&self, node: &web_sys::Node, name: &str) {
		if let Err(error) = self.remove_attribute(node, &format!("data-{}", camel_to_kebab(name))) {
			error!("Failed to remove data attribute: {}", error);
		}
	}

	fn is_focused(&self, node: &web_sys::Node) -> bool {
		self.document.active_element().map_or(false, |active| {
			let active: &web_sys::Node = active.as_ref();
			active == node
		})
	}

	fn state(&self, node: &web_sys::Node) -> Rc<ElementState> {
		let id = Self::state_id(node);
		ELEMENT_STATES.with(|states| states.borrow_mut().entry(id).or_default().clone())
	}

	fn release(&self, node: &web_sys::Node) {
		let Some(id) = Self::stored_state_id(node) else { return };
		ELEMENT_STATES.with(|states| states.borrow_mut().remove(&id));
		for event in closure_map::unpublish_all(id) {
			if let Err(error) = Reflect::set(node, &JsValue::from_str(&format!("on{}", event)), &JsValue::NULL) {
				error!(event, "Failed to clear event handler: {:?}", error);
			}
		}
		if let Err(error) = Reflect::delete_property(node.unchecked_ref::<Object>(), &JsValue::from_str(STATE_ID)) {
			error!("Failed to untag released element: {:?}", error);
		}
	}
}
