//! Reading live markup back into tree descriptions, for custom-element style adapters.

use crate::{
	component::{Component, MountOptions},
	dom::{Dom, Namespace},
	error::Error,
	vdom::{Node, NodeKind, Prop, Props},
};
use tracing::{instrument, trace};

/// The element's attributes as string properties.
pub fn load_attributes<D: Dom>(dom: &D, element: &D::Node) -> Props {
	dom.attribute_names(element)
		.into_iter()
		.filter_map(|name| {
			let value = dom.attribute(element, &name)?;
			Some((name, Prop::from(value)))
		})
		.collect()
}

/// Text and element children. Comments and other node types are skipped.
pub fn load_child_nodes<D: Dom>(dom: &D, parent: &D::Node) -> Vec<Node> {
	(0..dom.child_count(parent))
		.filter_map(|i| dom.child_at(parent, i))
		.filter_map(|child| load_node(dom, &child))
		.collect()
}

fn load_node<D: Dom>(dom: &D, node: &D::Node) -> Option<Node> {
	if dom.is_text(node) {
		return Some(Node::text(dom.text_content(node)));
	}
	let name = dom.node_name(node);
	if name.starts_with('#') {
		trace!(name = name.as_str(), "Skipping non-element node.");
		return None;
	}
	Some(load_element(dom, node))
}

pub fn load_element<D: Dom>(dom: &D, element: &D::Node) -> Node {
	let tag = match dom.namespace(element) {
		Namespace::Html => dom.node_name(element).to_ascii_lowercase(),
		Namespace::Svg => dom.node_name(element),
	};
	Node {
		kind: NodeKind::Element(tag),
		props: load_attributes(dom, element),
		children: load_child_nodes(dom, element),
	}
}

/// Starts `component` on `element`, handing the element's attributes and former content to its `mounted` hook.
///
/// # Errors
///
/// As [`Component::start`].
#[instrument(skip_all)]
pub fn start_on_element<S: 'static, D: Dom>(component: &Component<S, D>, element: D::Node, options: MountOptions) -> Result<Component<S, D>, Error> {
	let dom = component.context().dom();
	let props = load_attributes(dom, &element);
	let children = load_child_nodes(dom, &element);
	trace!(props = props.len(), children = children.len(), "Loaded element.");
	component.start_with(element, options, &props, &children)
}
