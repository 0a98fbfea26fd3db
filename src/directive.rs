//! Rewrites `$`-prefixed shorthand properties into plain handlers before a tree is reconciled.
//!
//! | Shorthand | Rewritten to |
//! |---|---|
//! | `$onclick: true` | `onclick` running the action `onclick` |
//! | `$onclick: "name"` | `onclick` running the action `name` |
//! | `$onclick: Transform` | `onclick` applying the transform to the current state |
//! | `$onclick: [name or Transform, ...args]` | the same, with `args` bound before the event |
//! | `$bind: "field"` (or `true`, using the `name` property) | a value property plus the matching write-back handler |
//!
//! The event itself is always passed as the last argument.
//! Other `$` keys are handed to the handlers registered in a [`DirectiveRegistry`].
//! Keys without a registered handler are announced as the global [`DIRECTIVE_EVENT`] instead.

use crate::{
	dispatcher::DispatchResult,
	value::{Event, Value},
	vdom::{Handler, Node, NodeKind, Prop, Props, Transform},
};
use core::{cell::RefCell, fmt};
use hashbrown::HashMap;
use std::{
	collections::BTreeMap,
	rc::{Rc, Weak},
};
use tracing::{instrument, warn};

/// Fired globally for directives without a registered handler.
///
/// The single argument is a map of `key`, `tag`, `value`, the element's plain-value `props`,
/// and `component`, the [`id`](`crate::Component::id`) of the component whose view declared the directive.
pub const DIRECTIVE_EVENT: &str = "$";

/// The component a tree is being preprocessed for.
pub trait DirectiveHost {
	/// The host component's [`id`](`crate::Component::id`).
	fn id(&self) -> usize;
	/// Runs `event` in the host's scope.
	fn run(&self, event: &str, args: &[Value]) -> DispatchResult;
	fn run_global(&self, event: &str, args: &[Value]) -> DispatchResult;
	/// Applies `transform` to the host's current state.
	fn apply(&self, transform: &Transform, args: &[Value]);
	/// Reads the bound `field` of the current state.
	fn bound_value(&self, field: &str) -> Value;
	/// Writes the bound `field`, producing and committing a new state.
	fn bind(&self, field: &str, value: Value);
}

/// An unrecognized directive, as seen by its registered handler.
pub struct DirectiveCall<'a> {
	pub key: &'a str,
	pub value: Prop,
	pub tag: &'a str,
	/// The element's properties, with the directive itself already removed.
	pub props: &'a mut Props,
	pub host: &'a Weak<dyn DirectiveHost>,
}

type DirectiveFn = Rc<dyn Fn(&mut DirectiveCall<'_>)>;

/// Handlers for directives beyond `$on*` and `$bind`, by exact key.
#[derive(Default)]
pub struct DirectiveRegistry {
	handlers: RefCell<HashMap<String, DirectiveFn>>,
}

impl fmt::Debug for DirectiveRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.handlers.borrow().keys()).finish()
	}
}

impl DirectiveRegistry {
	/// Registers `handler` for `key` (including the `$`), replacing any previous one.
	pub fn register(&self, key: impl Into<String>, handler: impl Fn(&mut DirectiveCall<'_>) + 'static) {
		self.handlers.borrow_mut().insert(key.into(), Rc::new(handler));
	}

	pub fn unregister(&self, key: &str) -> bool {
		self.handlers.borrow_mut().remove(key).is_some()
	}

	fn get(&self, key: &str) -> Option<DirectiveFn> {
		self.handlers.borrow().get(key).cloned()
	}
}

/// Rewrites directives throughout `nodes`, depth-first.
///
/// Nested components are skipped. They preprocess their own views.
#[instrument(skip_all)]
pub fn preprocess(nodes: &mut [Node], host: &Weak<dyn DirectiveHost>, registry: &DirectiveRegistry) {
	for node in nodes {
		match &node.kind {
			NodeKind::Component(_) | NodeKind::Text(_) | NodeKind::Live(_) => continue,
			NodeKind::Element(tag) => {
				let tag = tag.to_ascii_lowercase();
				rewrite_props(&tag, &mut node.props, host, registry);
			}
			NodeKind::Fragment => (),
		}
		preprocess(&mut node.children, host, registry);
	}
}

fn rewrite_props(tag: &str, props: &mut Props, host: &Weak<dyn DirectiveHost>, registry: &DirectiveRegistry) {
	let keys: Vec<String> = props.keys().filter(|key| key.starts_with('$')).map(str::to_owned).collect();
	for key in keys {
		let Some(value) = props.remove(&key) else { continue };
		if key == "$bind" {
			bind(tag, value, props, host);
		} else if let Some(event) = key.strip_prefix("$on") {
			if let Some(handler) = event_handler(&key[1..], value, host) {
				props.insert(format!("on{}", event), handler);
			}
		} else if let Some(handler) = registry.get(&key) {
			handler(&mut DirectiveCall {
				key: &key,
				value,
				tag,
				props,
				host,
			});
		} else if let Some(host) = host.upgrade() {
			let mut directive = BTreeMap::new();
			directive.insert("key".to_owned(), Value::from(key.as_str()));
			directive.insert("tag".to_owned(), Value::from(tag));
			directive.insert("component".to_owned(), Value::from(host.id()));
			directive.insert("value".to_owned(), value.as_value().cloned().unwrap_or_default());
			directive.insert(
				"props".to_owned(),
				Value::Map(props.iter().filter_map(|(name, prop)| Some((name.to_owned(), prop.as_value()?.clone()))).collect()),
			);
			if !host.run_global(DIRECTIVE_EVENT, &[Value::Map(directive)]).matched {
				warn!(key = key.as_str(), tag, "Unknown directive.");
			}
		}
	}
}

/// What an event directive does when its event fires.
enum Target {
	Action(String),
	Transform(Transform),
	Handler(Handler),
}

fn event_handler(default_action: &str, value: Prop, host: &Weak<dyn DirectiveHost>) -> Option<Handler> {
	let (target, bound) = match value {
		Prop::Value(Value::Bool(true)) => (Target::Action(default_action.to_owned()), Vec::new()),
		Prop::Value(Value::Bool(false) | Value::Null) => return None,
		Prop::Value(Value::Str(action)) => (Target::Action(action), Vec::new()),
		Prop::Transform(transform) => (Target::Transform(transform), Vec::new()),
		Prop::Handler(handler) => (Target::Handler(handler), Vec::new()),
		Prop::Tuple(items) => {
			let mut items = items.into_iter();
			let target = match items.next() {
				Some(Prop::Value(Value::Str(action))) => Target::Action(action),
				Some(Prop::Transform(transform)) => Target::Transform(transform),
				Some(Prop::Handler(handler)) => Target::Handler(handler),
				other => {
					warn!(directive = default_action, ?other, "Unsupported event directive tuple head.");
					return None;
				}
			};
			let bound = items.filter_map(|item| item.as_value().cloned()).collect();
			(target, bound)
		}
		other => {
			warn!(directive = default_action, ?other, "Unsupported event directive value.");
			return None;
		}
	};

	let host = host.clone();
	Some(Handler::new(move |event: &Event| {
		let Some(host) = host.upgrade() else { return };
		let mut args = bound.clone();
		args.push(Value::Event(event.clone()));
		match &target {
			Target::Action(action) => {
				host.run(action, &args);
			}
			Target::Transform(transform) => host.apply(transform, &args),
			Target::Handler(handler) => handler.call(event),
		}
	}))
}

fn bind(tag: &str, value: Prop, props: &mut Props, host: &Weak<dyn DirectiveHost>) {
	let field = match &value {
		Prop::Value(Value::Str(field)) => Some(field.clone()),
		Prop::Value(Value::Bool(true)) => props.value("name").map(Value::to_text),
		_ => None,
	};
	let Some(field) = field.filter(|field| !field.is_empty()) else {
		return warn!(tag, "`$bind` needs a field name, either as its value or through `name`.");
	};
	let Some(strong) = host.upgrade() else { return };
	let current = strong.bound_value(&field);
	let input_type = props.value("type").map(Value::to_text).unwrap_or_default().to_ascii_lowercase();

	let (property, bound, event, read) = match (tag, input_type.as_str()) {
		("input", "checkbox") => ("checked", Value::Bool(!current.is_falsy()), "click", Read::Checked),
		("input", "radio") => {
			let own = props.value("value").cloned().unwrap_or_default();
			("checked", Value::Bool(current.to_text() == own.to_text()), "click", Read::Value)
		}
		("input", "number" | "range") => ("value", current, "input", Read::Number),
		("input", _) => ("value", current, "input", Read::Value),
		("select", _) => ("value", current, "change", Read::SingleValue),
		("option", _) => ("selected", Value::Bool(!current.is_falsy()), "click", Read::Selected),
		("textarea", _) => ("innerHTML", current, "input", Read::Value),
		_ => return warn!(tag, "`$bind` is not supported on this element."),
	};

	props.insert(property, bound);
	let host = host.clone();
	props.insert(
		format!("on{}", event),
		Handler::new(move |event: &Event| {
			if let (Some(host), Some(value)) = (host.upgrade(), read.read(event)) {
				host.bind(&field, value);
			}
		}),
	);
}

/// Where a binding's write-back handler reads the new value from.
#[derive(Clone, Copy)]
enum Read {
	Value,
	/// Like `Value`, but ignored for `<select multiple>`.
	SingleValue,
	Number,
	Checked,
	Selected,
}

impl Read {
	fn read(self, event: &Event) -> Option<Value> {
		let target = &event.target;
		match self {
			Read::SingleValue if target.multiple => None,
			Read::Value | Read::SingleValue => target.value.clone().map(Value::Str),
			Read::Number => Some(target.value.as_deref()?.trim().parse::<f64>().map_or(Value::Null, Value::Number)),
			Read::Checked => target.checked.map(Value::Bool),
			Read::Selected => target.selected.map(Value::Bool),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{props, value::EventTarget, vdom::h};
	use core::cell::RefCell;

	#[derive(Default)]
	struct Recorder {
		runs: RefCell<Vec<(String, Vec<Value>)>>,
		fields: RefCell<HashMap<String, Value>>,
	}

	impl DirectiveHost for Recorder {
		fn id(&self) -> usize {
			7
		}

		fn run(&self, event: &str, args: &[Value]) -> DispatchResult {
			self.runs.borrow_mut().push((event.to_owned(), args.to_vec()));
			DispatchResult::default()
		}

		fn run_global(&self, event: &str, args: &[Value]) -> DispatchResult {
			self.run(event, args)
		}

		fn apply(&self, _: &Transform, _: &[Value]) {}

		fn bound_value(&self, field: &str) -> Value {
			self.fields.borrow().get(field).cloned().unwrap_or_default()
		}

		fn bind(&self, field: &str, value: Value) {
			self.fields.borrow_mut().insert(field.to_owned(), value);
		}
	}

	fn host() -> (Rc<Recorder>, Weak<dyn DirectiveHost>) {
		let recorder = Rc::new(Recorder::default());
		let as_host: Rc<dyn DirectiveHost> = recorder.clone();
		let weak = Rc::downgrade(&as_host);
		(recorder, weak)
	}

	fn click(props: &Props, name: &str, target: EventTarget) {
		match props.get(name) {
			Some(Prop::Handler(handler)) => handler.call(&Event::new("click", target)),
			other => panic!("expected a handler under `{}`, found {:?}", name, other),
		}
	}

	#[test]
	fn event_shorthand_shapes() {
		let (recorder, weak) = host();
		let mut nodes = vec![h(
			"div",
			(),
			vec![
				h("button", props! { "$onclick" => true }, ()),
				h("button", props! { "$onclick" => "save" }, ()),
				h("button", props! { "$onclick" => Prop::tuple(vec![Prop::from("move"), Prop::from(1)]) }, ()),
			],
		)];
		preprocess(&mut nodes, &weak, &DirectiveRegistry::default());

		for child in &nodes[0].children {
			assert!(!child.props.contains("$onclick"));
			click(&child.props, "onclick", EventTarget::default());
		}
		let runs = recorder.runs.borrow();
		assert_eq!(runs[0].0, "onclick");
		assert_eq!(runs[1].0, "save");
		assert_eq!(runs[2].0, "move");
		assert_eq!(runs[2].1.len(), 2);
		assert_eq!(runs[2].1[0], Value::from(1));
		assert!(runs[2].1[1].as_event().is_some());
	}

	#[test]
	fn checkbox_binding() {
		let (recorder, weak) = host();
		recorder.fields.borrow_mut().insert("done".to_owned(), Value::Bool(true));
		let mut nodes = vec![h("input", props! { "type" => "checkbox", "$bind" => "done" }, ())];
		preprocess(&mut nodes, &weak, &DirectiveRegistry::default());

		let props = &nodes[0].props;
		assert_eq!(props.value("checked"), Some(&Value::Bool(true)));
		click(
			props,
			"onclick",
			EventTarget {
				checked: Some(false),
				..EventTarget::default()
			},
		);
		assert_eq!(recorder.fields.borrow()["done"], Value::Bool(false));
	}

	#[test]
	fn unknown_directives_go_to_the_registry() {
		let (recorder, weak) = host();
		let registry = DirectiveRegistry::default();
		registry.register("$focus", |call| {
			call.props.insert("autofocus", true);
		});
		let mut nodes = vec![h("input", props! { "$focus" => true, "$unknown" => 1 }, ())];
		preprocess(&mut nodes, &weak, &registry);
		assert_eq!(nodes[0].props.value("autofocus"), Some(&Value::Bool(true)));
		assert!(!nodes[0].props.contains("$unknown"));

		let runs = recorder.runs.borrow();
		assert_eq!(runs.len(), 1);
		assert_eq!(runs[0].0, DIRECTIVE_EVENT);
		assert_eq!(runs[0].1[0].get("key"), Some(&Value::from("$unknown")));
		assert_eq!(runs[0].1[0].get("tag"), Some(&Value::from("input")));
		assert_eq!(runs[0].1[0].get("component"), Some(&Value::from(7_usize)));
	}
}
