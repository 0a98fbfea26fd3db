//! Applies a node's properties to a live element.
//!
//! The previously applied map is kept on the element's [`ElementState`](crate::dom::ElementState).
//! Keys that disappear are reset. Everything else is compared against the live platform value before writing,
//! so that patching an element with the map it already carries mutates nothing.

use crate::{
	context::Context,
	dom::{camel_to_kebab, kebab_to_camel, Dom, Namespace, XLINK_NAMESPACE},
	value::Value,
	vdom::{Prop, Props},
};
use std::collections::BTreeMap;
use tracing::{debug, instrument, trace, warn};

/// How a name without special handling is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
	/// Present when truthy, absent otherwise.
	Boolean,
	/// Attribute reflecting `"true"` or `"false"`.
	Enumerated,
	/// Only meaningful as a property.
	Property,
	Attribute,
}

/// By lower-case name. Sorted for binary search.
const STANDARDS: &[(&str, Kind)] = &[
	("allowfullscreen", Kind::Boolean),
	("async", Kind::Boolean),
	("autofocus", Kind::Boolean),
	("autoplay", Kind::Boolean),
	("contenteditable", Kind::Enumerated),
	("controls", Kind::Boolean),
	("default", Kind::Boolean),
	("defer", Kind::Boolean),
	("disabled", Kind::Boolean),
	("download", Kind::Attribute),
	("draggable", Kind::Enumerated),
	("for", Kind::Attribute),
	("form", Kind::Attribute),
	("formnovalidate", Kind::Boolean),
	("height", Kind::Attribute),
	("hidden", Kind::Boolean),
	("href", Kind::Attribute),
	("id", Kind::Attribute),
	("innerhtml", Kind::Property),
	("innertext", Kind::Property),
	("ismap", Kind::Boolean),
	("list", Kind::Attribute),
	("loop", Kind::Boolean),
	("multiple", Kind::Boolean),
	("muted", Kind::Boolean),
	("nomodule", Kind::Boolean),
	("novalidate", Kind::Boolean),
	("open", Kind::Boolean),
	("playsinline", Kind::Boolean),
	("readonly", Kind::Boolean),
	("required", Kind::Boolean),
	("reversed", Kind::Boolean),
	("spellcheck", Kind::Enumerated),
	("src", Kind::Attribute),
	("tabindex", Kind::Attribute),
	("textcontent", Kind::Property),
	("translate", Kind::Enumerated),
	("type", Kind::Attribute),
	("width", Kind::Attribute),
];

fn standard_kind(name: &str) -> Option<Kind> {
	let name = name.to_ascii_lowercase();
	STANDARDS.binary_search_by(|(probe, _)| (*probe).cmp(name.as_str())).ok().map(|index| STANDARDS[index].1)
}

/// Kebab-case style properties that take plain numbers.
const UNITLESS: &[&str] = &[
	"animation-iteration-count",
	"column-count",
	"fill-opacity",
	"flex",
	"flex-grow",
	"flex-shrink",
	"font-weight",
	"grid-column",
	"grid-row",
	"line-height",
	"opacity",
	"order",
	"orphans",
	"stroke-opacity",
	"stroke-width",
	"tab-size",
	"widows",
	"z-index",
	"zoom",
];

/// Whether `name` belongs to the user or a media driver rather than to the view.
fn skipped(name: &str, node_name: &str, focused: bool) -> bool {
	matches!(name, "scrollTop" | "scrollLeft")
		|| (focused && matches!(name, "value" | "selectionStart" | "selectionEnd" | "selectionDirection"))
		|| (matches!(node_name, "AUDIO" | "VIDEO") && matches!(name, "currentTime" | "paused" | "playbackRate" | "volume"))
}

fn valid_name(name: &str) -> bool {
	!name.is_empty() && !name.chars().any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\'' | '=' | '/'))
}

fn is_form_property(name: &str, node_name: &str) -> bool {
	match name {
		"value" | "selected" | "selectedIndex" => matches!(node_name, "INPUT" | "TEXTAREA" | "SELECT" | "OPTION"),
		"checked" => node_name == "INPUT",
		_ => false,
	}
}

/// `className` is accepted as an alias of `class`.
fn normalize(props: &Props) -> Props {
	props
		.iter()
		.map(|(name, prop)| (if name == "className" { "class" } else { name }, prop.clone()))
		.collect()
}

/// Releases `element` and its unkeyed descendants.
fn release_detached<D: Dom>(dom: &D, element: &D::Node) {
	dom.release(element);
	for index in 0..dom.child_count(element) {
		let Some(child) = dom.child_at(element, index) else { continue };
		if !dom.is_text(&child) && dom.state(&child).key().is_none() {
			release_detached(dom, &child);
		}
	}
}

/// Patches `element` from its last applied properties to `props`.
#[instrument(skip_all)]
pub fn patch_props<D: Dom>(context: &Context<D>, element: &D::Node, props: &Props, namespace: Namespace) {
	let dom = context.dom();
	let state = dom.state(element);
	let previous = state.props();
	let props = normalize(props);

	let node_name = dom.node_name(element);
	let focused = dom.is_focused(element);
	let null = Prop::Value(Value::Null);

	let removed = previous.iter().filter(|(name, _)| !props.contains(name)).map(|(name, _)| (name, &null));
	let merged: Vec<(&str, &Prop)> = removed.chain(props.iter()).collect();

	for (name, prop) in merged {
		if skipped(name, &node_name, focused) {
			trace!(name, "Skipped.");
			continue;
		}
		if !valid_name(name) {
			warn!(name, "Refusing to write a property with an invalid name.");
			continue;
		}

		match (name, prop) {
			("key", _) => {
				let key = prop.as_value().filter(|value| !value.is_falsy()).map(Value::to_text);
				if let Some(key) = &key {
					let displaced = context.keys().borrow_mut().insert(key.clone(), element.clone());
					// Once its key is taken, a detached element can't be reinserted.
					if let Some(displaced) = displaced.filter(|displaced| displaced != element && !dom.is_connected(displaced)) {
						dom.state(&displaced).set_key(None);
						release_detached(dom, &displaced);
					}
				}
				state.set_key(key);
			}
			("ref", Prop::Ref(callback)) => {
				let callback = callback.clone();
				let element = element.clone();
				context.scheduler().request_frame(Box::new(move || callback.call(&element)));
			}
			("ref", _) => (),
			// The children were reconciled in their place already.
			("innerHTML" | "textContent", Prop::Value(Value::Null)) => (),
			("style", Prop::Value(value)) => patch_style(dom, element, value, previous.value("style")),
			(_, Prop::Value(value)) if name.starts_with("data-") => patch_data(dom, element, &name[5..], value),
			(_, _) if name.starts_with("on") => patch_handler(dom, element, name, prop, previous.get(name)),
			(_, Prop::Value(value)) => patch_value(dom, element, name, value, &node_name, namespace),
			(_, other) => warn!(name, ?other, "Property value not applicable to an element."),
		}
	}

	state.set_props(props);
}

fn patch_handler<D: Dom>(dom: &D, element: &D::Node, name: &str, prop: &Prop, previous: Option<&Prop>) {
	let event = name[2..].to_ascii_lowercase();
	match (prop, previous) {
		(Prop::Handler(handler), Some(Prop::Handler(old))) if handler.ptr_eq(old) => (),
		(Prop::Handler(handler), _) => {
			if let Some(Prop::Value(_)) = previous {
				set_attribute(dom, element, name, &Value::Null);
			}
			dom.set_handler(element, &event, Some(handler));
		}
		(Prop::Value(value), _) => {
			if let Some(Prop::Handler(_)) = previous {
				dom.set_handler(element, &event, None);
			}
			set_attribute(dom, element, name, value);
		}
		(other, _) => warn!(name, ?other, "Unprocessed directive value in an event property."),
	}
}

fn patch_data<D: Dom>(dom: &D, element: &D::Node, name: &str, value: &Value) {
	let name = kebab_to_camel(name);
	match value {
		Value::Null => {
			if dom.data(element, &name).is_some() {
				dom.remove_data(element, &name);
			}
		}
		value => {
			let text = value.to_text();
			if dom.data(element, &name).as_deref() != Some(text.as_str()) {
				dom.set_data(element, &name, &text);
			}
		}
	}
}

fn style_value(name: &str, value: &Value) -> String {
	match value {
		Value::Number(_) if !name.starts_with("--") && !UNITLESS.contains(&name) => format!("{}px", value.to_text()),
		value => value.to_text(),
	}
}

fn patch_style<D: Dom>(dom: &D, element: &D::Node, value: &Value, previous: Option<&Value>) {
	match value {
		Value::Map(declarations) => {
			match previous {
				Some(Value::Map(old)) => {
					for name in old.keys().filter(|name| !declarations.contains_key(*name)) {
						dom.remove_style(element, &camel_to_kebab(name));
					}
				}
				_ => {
					if !dom.style_text(element).is_empty() {
						dom.set_style_text(element, "");
					}
				}
			}
			patch_declarations(dom, element, declarations);
		}
		Value::Null => {
			if !dom.style_text(element).is_empty() {
				dom.set_style_text(element, "");
			}
		}
		text => {
			let text = text.to_text();
			if !same_css(&dom.style_text(element), &text) {
				dom.set_style_text(element, &text);
			}
		}
	}
}

/// Compares declaration lists, ignoring a trailing `;` and surrounding whitespace.
fn same_css(a: &str, b: &str) -> bool {
	a.trim().trim_end_matches(';') == b.trim().trim_end_matches(';')
}

fn patch_declarations<D: Dom>(dom: &D, element: &D::Node, declarations: &BTreeMap<String, Value>) {
	for (name, value) in declarations {
		let name = camel_to_kebab(name);
		if value.is_falsy() {
			if !dom.style(element, &name).is_empty() {
				dom.remove_style(element, &name);
			}
			continue;
		}
		let value = style_value(&name, value);
		if dom.style(element, &name) != value {
			dom.set_style(element, &name, &value);
		}
	}
}

fn patch_value<D: Dom>(dom: &D, element: &D::Node, name: &str, value: &Value, node_name: &str, namespace: Namespace) {
	if name == "class" {
		return set_attribute(dom, element, name, value);
	}
	if is_form_property(name, node_name) {
		let value = match name {
			"value" => Value::Str(value.to_text()),
			"selectedIndex" => value.as_f64().map_or(Value::Null, Value::Number),
			_ => Value::Bool(!value.is_falsy()),
		};
		set_property(dom, element, name, &value);
		if name == "checked" {
			set_boolean_attribute(dom, element, name, !value.is_falsy());
		}
		return;
	}

	match standard_kind(name) {
		Some(Kind::Boolean) => set_boolean_attribute(dom, element, name, !value.is_falsy()),
		Some(Kind::Enumerated) => match value {
			Value::Null => set_attribute(dom, element, name, value),
			Value::Bool(flag) => set_attribute(dom, element, name, &Value::Str(flag.to_string())),
			value => set_attribute(dom, element, name, value),
		},
		Some(Kind::Property) => set_property(dom, element, name, value),
		Some(Kind::Attribute) => set_attribute(dom, element, name, value),
		None if namespace == Namespace::Svg => match name.strip_prefix("xlink:") {
			Some(local_name) => set_attribute_ns(dom, element, name, local_name, value),
			None => set_attribute(dom, element, name, value),
		},
		None if name.starts_with("aria-") || name == "role" => set_attribute(dom, element, name, value),
		None if dom.has_property(element, name) => set_property(dom, element, name, value),
		None => set_attribute(dom, element, name, value),
	}
}

/// Writes `element[name]`, falling back to an attribute if the platform refuses.
fn set_property<D: Dom>(dom: &D, element: &D::Node, name: &str, value: &Value) {
	let live = dom.property(element, name).unwrap_or_default();
	if &live == value {
		return;
	}
	if let Err(error) = dom.set_property(element, name, value) {
		debug!(name, %error, "Property assignment failed. Retrying as attribute.");
		set_attribute(dom, element, name, value);
	}
}

/// Falsy values remove the attribute.
fn set_attribute<D: Dom>(dom: &D, element: &D::Node, name: &str, value: &Value) {
	let live = dom.attribute(element, name);
	let result = if value.is_falsy() {
		match live {
			Some(_) => dom.remove_attribute(element, name),
			None => Ok(()),
		}
	} else {
		let text = value.to_text();
		if live.as_deref() == Some(text.as_str()) {
			Ok(())
		} else {
			dom.set_attribute(element, name, &text)
		}
	};
	if let Err(error) = result {
		warn!(name, %error, "Attribute could not be written.");
	}
}

fn set_boolean_attribute<D: Dom>(dom: &D, element: &D::Node, name: &str, present: bool) {
	let result = match (present, dom.attribute(element, name).is_some()) {
		(true, false) => dom.set_attribute(element, name, ""),
		(false, true) => dom.remove_attribute(element, name),
		_ => Ok(()),
	};
	if let Err(error) = result {
		warn!(name, %error, "Attribute could not be written.");
	}
}

fn set_attribute_ns<D: Dom>(dom: &D, element: &D::Node, qualified_name: &str, local_name: &str, value: &Value) {
	let live = dom.attribute_ns(element, XLINK_NAMESPACE, local_name);
	let result = if value.is_falsy() {
		match live {
			Some(_) => dom.remove_attribute_ns(element, XLINK_NAMESPACE, local_name),
			None => Ok(()),
		}
	} else {
		let text = value.to_text();
		if live.as_deref() == Some(text.as_str()) {
			Ok(())
		} else {
			dom.set_attribute_ns(element, XLINK_NAMESPACE, qualified_name, &text)
		}
	};
	if let Err(error) = result {
		warn!(qualified_name, %error, "Namespaced attribute could not be written.");
	}
}
