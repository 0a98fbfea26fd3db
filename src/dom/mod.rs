//! Platform abstraction the differ and the property patcher write through.
//!
//! [`memory::MemoryDom`] is a self-contained implementation used natively and in tests.
//! On `wasm32`, `web::WebDom` drives the browser's DOM through `web-sys`.

use crate::{
	error::DomError,
	value::Value,
	vdom::{Handler, Props},
};
use core::{cell::RefCell, fmt};
use std::rc::Rc;

#[cfg(target_arch = "wasm32")]
mod closure_map;
pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
	Html,
	Svg,
}

/// Runtime state attached to each live element.
///
/// Owned by the element it is attached to and never shared across elements.
#[derive(Debug, Default)]
pub struct ElementState {
	key: RefCell<Option<String>>,
	props: RefCell<Props>,
}

impl ElementState {
	#[must_use]
	pub fn key(&self) -> Option<String> {
		self.key.borrow().clone()
	}

	pub fn set_key(&self, key: Option<String>) {
		*self.key.borrow_mut() = key;
	}

	/// The property map applied by the last patch.
	#[must_use]
	pub fn props(&self) -> Props {
		self.props.borrow().clone()
	}

	pub fn set_props(&self, props: Props) {
		*self.props.borrow_mut() = props;
	}
}

/// A platform document.
///
/// Nodes are handles: cloning one clones the reference, not the node, and equality is identity.
/// Implementations are single-threaded and are never re-entered by the differ while one of their methods runs.
pub trait Dom: 'static {
	type Node: Clone + PartialEq + fmt::Debug + 'static;

	fn create_element(&self, tag: &str, namespace: Namespace) -> Result<Self::Node, DomError>;
	fn create_text(&self, text: &str) -> Self::Node;
	fn element_by_id(&self, id: &str) -> Option<Self::Node>;

	fn child_count(&self, parent: &Self::Node) -> usize;
	fn child_at(&self, parent: &Self::Node, index: usize) -> Option<Self::Node>;
	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
	/// Whether `node` is part of the document.
	fn is_connected(&self, node: &Self::Node) -> bool;
	fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;
	/// Moves `node` (detaching it from its current parent, if any) before `reference`, or to the end.
	fn insert_before(&self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>) -> Result<(), DomError>;
	/// Appends all `nodes` at once, through a fragment where the platform has one.
	fn append_all(&self, parent: &Self::Node, nodes: Vec<Self::Node>) -> Result<(), DomError>;
	fn replace_child(&self, parent: &Self::Node, new: &Self::Node, old: &Self::Node) -> Result<(), DomError>;
	fn remove_child(&self, parent: &Self::Node, child: &Self::Node) -> Result<(), DomError>;

	/// The platform node name: upper-case tag names for HTML elements, `#text` for text nodes.
	fn node_name(&self, node: &Self::Node) -> String;
	fn is_text(&self, node: &Self::Node) -> bool;
	fn namespace(&self, node: &Self::Node) -> Namespace;
	fn text_content(&self, node: &Self::Node) -> String;
	fn set_text(&self, node: &Self::Node, text: &str);

	fn attribute(&self, element: &Self::Node, name: &str) -> Option<String>;
	fn attribute_names(&self, element: &Self::Node) -> Vec<String>;
	fn set_attribute(&self, element: &Self::Node, name: &str, value: &str) -> Result<(), DomError>;
	fn remove_attribute(&self, element: &Self::Node, name: &str) -> Result<(), DomError>;
	fn attribute_ns(&self, element: &Self::Node, namespace: &str, local_name: &str) -> Option<String>;
	fn set_attribute_ns(&self, element: &Self::Node, namespace: &str, qualified_name: &str, value: &str) -> Result<(), DomError>;
	fn remove_attribute_ns(&self, element: &Self::Node, namespace: &str, local_name: &str) -> Result<(), DomError>;

	fn has_property(&self, element: &Self::Node, name: &str) -> bool;
	fn property(&self, element: &Self::Node, name: &str) -> Option<Value>;
	/// Assigns `element[name]`. [`Value::Null`] resets the property to its platform default.
	fn set_property(&self, element: &Self::Node, name: &str, value: &Value) -> Result<(), DomError>;
	/// Assigns (or clears) the `on{event}` handler property.
	fn set_handler(&self, element: &Self::Node, event: &str, handler: Option<&Handler>);

	fn style_text(&self, element: &Self::Node) -> String;
	fn set_style_text(&self, element: &Self::Node, text: &str);
	/// Reads a single declaration by its kebab-case (or custom `--*`) name.
	fn style(&self, element: &Self::Node, name: &str) -> String;
	fn set_style(&self, element: &Self::Node, name: &str, value: &str);
	fn remove_style(&self, element: &Self::Node, name: &str);

	/// Dataset access by camel-case name.
	fn data(&self, element: &Self::Node, name: &str) -> Option<String>;
	fn set_data(&self, element: &Self::Node, name: &str, value: &str);
	fn remove_data(&self, element: &Self::Node, name: &str);

	/// Whether `element` is the document's active element.
	fn is_focused(&self, element: &Self::Node) -> bool;
	fn state(&self, element: &Self::Node) -> Rc<ElementState>;
	/// Drops the handlers and [`ElementState`] held for `node`, which has left the tree for good. Descendants are untouched.
	///
	/// A released element that is inserted again is patched from scratch.
	fn release(&self, node: &Self::Node);
}

/// `fooBar` → `foo-bar`. Custom property names (`--*`) are returned unchanged.
#[must_use]
pub fn camel_to_kebab(name: &str) -> String {
	if name.starts_with("--") {
		return name.to_owned();
	}
	let mut kebab = String::with_capacity(name.len() + 4);
	for c in name.chars() {
		if c.is_ascii_uppercase() {
			kebab.push('-');
			kebab.push(c.to_ascii_lowercase());
		} else {
			kebab.push(c);
		}
	}
	kebab
}

/// `foo-bar` → `fooBar`.
#[must_use]
pub fn kebab_to_camel(name: &str) -> String {
	let mut camel = String::with_capacity(name.len());
	let mut upper = false;
	for c in name.chars() {
		if c == '-' {
			upper = true;
		} else if upper {
			camel.push(c.to_ascii_uppercase());
			upper = false;
		} else {
			camel.push(c);
		}
	}
	camel
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn name_conversion() {
		assert_eq!(camel_to_kebab("backgroundColor"), "background-color");
		assert_eq!(camel_to_kebab("--main-color"), "--main-color");
		assert_eq!(kebab_to_camel("user-id"), "userId");
		assert_eq!(kebab_to_camel("plain"), "plain");
	}
}
