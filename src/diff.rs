//! Reconciles live child nodes against a list of [`Node`]s.
//!
//! Children are matched by position, except that keyed children are first looked up in the context's key cache,
//! so reordering a keyed list moves elements instead of recreating them.
//! Keyed elements that leave the tree stay in the cache until another element takes their key,
//! so inserting into a keyed list reinserts the displaced elements as well.
//! Unkeyed children of the same tag are patched in place. A different tag replaces the element.

use crate::{
	component::Embedded,
	context::Context,
	dom::{Dom, Namespace},
	patch::patch_props,
	vdom::{ComponentRef, Node, NodeKind},
};
use core::{any::TypeId, cell::RefCell};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span};

/// A nested component instance cached under its rendering parent.
pub(crate) struct ChildEntry<D: Dom> {
	type_id: TypeId,
	pub(crate) component: Rc<dyn Embedded<D>>,
}

/// Nested components by `id` prop or running index.
pub(crate) type ChildCache<D> = RefCell<HashMap<String, ChildEntry<D>>>;

/// One reconciliation pass over a subtree.
///
/// Nested components are cached in `components`, which belongs to the component whose view is being rendered.
pub(crate) struct Differ<'a, D: Dom> {
	context: &'a Rc<Context<D>>,
	components: &'a ChildCache<D>,
	component_index: usize,
}

fn flatten<'n>(nodes: &'n [Node], flat: &mut Vec<&'n Node>) {
	for node in nodes {
		match node.kind {
			NodeKind::Fragment => flatten(&node.children, flat),
			_ => flat.push(node),
		}
	}
}

impl<'a, D: Dom> Differ<'a, D> {
	pub(crate) fn new(context: &'a Rc<Context<D>>, components: &'a ChildCache<D>) -> Self {
		Self {
			context,
			components,
			component_index: 0,
		}
	}

	fn dom(&self) -> &'a D {
		self.context.dom()
	}

	/// Makes the children of `parent` match `nodes`.
	#[instrument(skip_all)]
	pub(crate) fn update_children(&mut self, parent: &D::Node, nodes: &[Node], namespace: Namespace) {
		let mut flat = Vec::with_capacity(nodes.len());
		flatten(nodes, &mut flat);
		let dom = self.dom();

		let mut index = 0;
		while let Some(node) = flat.get(index) {
			let Some(old) = dom.child_at(parent, index) else { break };
			self.update_child(parent, &old, node, namespace);
			index += 1;
		}

		let mut count = dom.child_count(parent);
		while count > flat.len() {
			if let Some(last) = dom.child_at(parent, count - 1) {
				if let Err(error) = dom.remove_child(parent, &last) {
					error!("Failed to remove child node: {}", error);
					break;
				}
				self.discard(&last);
			}
			count -= 1;
		}

		if index < flat.len() {
			let created: Vec<D::Node> = flat[index..].iter().map(|node| self.create(node, namespace)).collect();
			trace!(count = created.len(), "Appending.");
			if let Err(error) = dom.append_all(parent, created) {
				error!("Failed to append child nodes: {}", error);
			}
		}
	}

	fn update_child(&mut self, parent: &D::Node, old: &D::Node, node: &Node, namespace: Namespace) {
		let dom = self.dom();
		match &node.kind {
			NodeKind::Text(text) => {
				if dom.is_text(old) {
					if dom.text_content(old) != *text {
						dom.set_text(old, text);
					}
				} else {
					self.replace(parent, &dom.create_text(text), old);
				}
			}
			NodeKind::Live(live) => match live.downcast_ref::<D::Node>() {
				Some(live) if live == old => (),
				Some(live) => {
					if let Err(error) = dom.insert_before(parent, live, Some(old)) {
						error!("Failed to insert live node: {}", error);
					}
				}
				None => self.replace(parent, &self.diagnostic("live node of a foreign platform"), old),
			},
			NodeKind::Component(component) => {
				let host = self.component(component, node);
				if host != *old {
					if dom.parent(&host).as_ref() == Some(parent) {
						self.swap(parent, &host, old);
					} else {
						self.replace(parent, &host, old);
					}
				}
			}
			NodeKind::Element(tag) => match node.key() {
				Some(key) => self.update_keyed(parent, old, node, tag, &key, namespace),
				None if !dom.is_text(old) && dom.node_name(old).eq_ignore_ascii_case(tag) => self.update_element(old, node, tag, namespace),
				None => {
					let new = self.create(node, namespace);
					self.replace(parent, &new, old);
				}
			},
			NodeKind::Fragment => self.replace(parent, &self.diagnostic("unflattened fragment"), old),
		}
	}

	fn update_keyed(&mut self, parent: &D::Node, old: &D::Node, node: &Node, tag: &str, key: &str, namespace: Namespace) {
		let dom = self.dom();
		let old_key = if dom.is_text(old) { None } else { dom.state(old).key() };
		if old_key.as_deref() == Some(key) {
			return self.update_element(old, node, tag, namespace);
		}

		let cached = self.context.keys().borrow().get(key).cloned();
		let cached = cached.filter(|cached| dom.state(cached).key().as_deref() == Some(key) && dom.node_name(cached).eq_ignore_ascii_case(tag));
		match cached {
			Some(cached) if dom.parent(&cached).as_ref() == Some(parent) => {
				trace!("Moving keyed element into place.");
				self.swap(parent, &cached, old);
				self.update_element(&cached, node, tag, namespace);
			}
			Some(cached) if dom.parent(&cached).is_none() => {
				trace!("Reinserting detached keyed element.");
				if let Err(error) = dom.insert_before(parent, &cached, Some(old)) {
					error!("Failed to insert keyed element: {}", error);
				}
				self.update_element(&cached, node, tag, namespace);
			}
			// `old` may be wanted again further down the list.
			_ if old_key.is_some() => {
				let new = self.create(node, namespace);
				if let Err(error) = dom.insert_before(parent, &new, Some(old)) {
					error!("Failed to insert keyed element: {}", error);
				}
			}
			_ => {
				let new = self.create(node, namespace);
				self.replace(parent, &new, old);
			}
		}
	}

	/// Reconciles the children of `element`, then its properties.
	fn update_element(&mut self, element: &D::Node, node: &Node, tag: &str, namespace: Namespace) {
		let span = trace_span!("update_element", tag);
		let _enter = span.enter();

		let namespace = if tag.eq_ignore_ascii_case("svg") { Namespace::Svg } else { namespace };
		if !(node.props.contains("innerHTML") || node.props.contains("textContent")) {
			self.update_children(element, &node.children, namespace);
		}
		patch_props(self.context, element, &node.props, namespace);
	}

	/// Moves `moved`, a later sibling, into the place of `old`, and `old` into the place of `moved`.
	fn swap(&self, parent: &D::Node, moved: &D::Node, old: &D::Node) {
		let dom = self.dom();
		let after = dom.next_sibling(moved);
		let result = dom.insert_before(parent, moved, Some(old)).and_then(|()| {
			if after.as_ref() == Some(old) {
				Ok(())
			} else {
				dom.insert_before(parent, old, after.as_ref())
			}
		});
		if let Err(error) = result {
			error!("Failed to move element: {}", error);
		}
	}

	fn replace(&self, parent: &D::Node, new: &D::Node, old: &D::Node) {
		if let Err(error) = self.dom().replace_child(parent, new, old) {
			error!("Failed to replace child node: {}", error);
			return;
		}
		self.discard(old);
	}

	/// Releases the platform resources of `node`, which has just left the tree, and of its descendants.
	///
	/// Keyed elements stay in the key cache with their state, so a later render can reinsert them.
	/// Component hosts are left to their component.
	fn discard(&self, node: &D::Node) {
		let dom = self.dom();
		if dom.is_text(node) {
			return;
		}
		if dom.state(node).key().is_some() || self.components.borrow().values().any(|entry| entry.component.element().as_ref() == Some(node)) {
			return;
		}
		dom.release(node);
		for index in 0..dom.child_count(node) {
			if let Some(child) = dom.child_at(node, index) {
				self.discard(&child);
			}
		}
	}

	/// Creates the platform node for `node`.
	fn create(&mut self, node: &Node, namespace: Namespace) -> D::Node {
		let dom = self.dom();
		match &node.kind {
			NodeKind::Text(text) => dom.create_text(text),
			NodeKind::Live(live) => match live.downcast_ref::<D::Node>() {
				Some(live) => live.clone(),
				None => self.diagnostic("live node of a foreign platform"),
			},
			NodeKind::Component(component) => self.component(component, node),
			NodeKind::Fragment => self.diagnostic("unflattened fragment"),
			NodeKind::Element(tag) if tag.is_empty() => self.diagnostic("element without a tag"),
			NodeKind::Element(tag) => {
				let namespace = if tag.eq_ignore_ascii_case("svg") { Namespace::Svg } else { namespace };
				let element = match dom.create_element(tag, namespace) {
					Ok(element) => element,
					Err(error) => {
						error!("Failed to create element: {}", error);
						return self.diagnostic(&error.to_string());
					}
				};
				if !(node.props.contains("innerHTML") || node.props.contains("textContent")) {
					let mut flat = Vec::with_capacity(node.children.len());
					flatten(&node.children, &mut flat);
					let children: Vec<D::Node> = flat.into_iter().map(|child| self.create(child, namespace)).collect();
					if !children.is_empty() {
						if let Err(error) = dom.append_all(&element, children) {
							error!("Failed to append child nodes: {}", error);
						}
					}
				}
				patch_props(self.context, &element, &node.props, namespace);
				element
			}
		}
	}

	/// A text node standing in for a node that could not be rendered.
	fn diagnostic(&self, reason: &str) -> D::Node {
		error!(reason, "Malformed node.");
		self.dom().create_text(&format!("[invalid node: {}]", reason))
	}

	/// Resolves a nested component, creating and mounting it on first sight, and returns its host element.
	#[instrument(skip_all, fields(component = component.name()))]
	fn component(&mut self, component: &ComponentRef, node: &Node) -> D::Node {
		let dom = self.dom();
		let key = match node.props.value("id").filter(|id| !id.is_falsy()) {
			Some(id) => id.to_text(),
			None => format!("_{}", self.component_index),
		};
		self.component_index += 1;

		let mut props = node.props.clone();
		let host_tag = props.remove("as").and_then(|tag| tag.as_value().map(|tag| tag.to_text())).filter(|tag| !tag.is_empty());

		let cached = self
			.components
			.borrow()
			.get(&key)
			.filter(|entry| entry.type_id == component.type_id && entry.component.element().is_some())
			.map(|entry| entry.component.clone());

		let instance = match cached {
			Some(instance) => instance,
			None => {
				let host = match dom.create_element(host_tag.as_deref().unwrap_or("section"), Namespace::Html) {
					Ok(host) => host,
					Err(error) => return self.diagnostic(&error.to_string()),
				};
				let instance = (component.factory)(self.context).and_then(|instance| instance.downcast::<Rc<dyn Embedded<D>>>().ok());
				let Some(instance) = instance.map(|instance| *instance) else {
					return self.diagnostic("component for a different platform");
				};
				trace!(key = key.as_str(), "Creating nested component.");
				if let Err(error) = instance.attach(host) {
					error!("Failed to mount nested component: {}", error);
				}
				let displaced = self.components.borrow_mut().insert(
					key,
					ChildEntry {
						type_id: component.type_id,
						component: instance.clone(),
					},
				);
				// Mounted instances keep themselves alive.
				if let Some(displaced) = displaced.filter(|displaced| displaced.component.element().is_some()) {
					displaced.component.detach();
				}
				instance
			}
		};

		instance.receive(&props, &node.children);
		match instance.element() {
			Some(host) => {
				patch_props(self.context, &host, &props, Namespace::Html);
				host
			}
			None => self.diagnostic("nested component lost its element"),
		}
	}
}
