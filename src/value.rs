//! Dynamic data passed through dispatch: action arguments, scalar properties and event snapshots.

use core::{any::Any, fmt};
use std::{collections::BTreeMap, rc::Rc};

/// A loosely typed value.
///
/// Action arguments, scalar properties and inline style maps all use this representation,
/// so that a component's actions can be invoked by name from markup, the router or other components.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	Str(String),
	List(Vec<Value>),
	Map(BTreeMap<String, Value>),
	Event(Event),
}

impl Value {
	/// `null`, `false` and `""` are treated as absent by attribute and dataset writes.
	#[must_use]
	pub fn is_falsy(&self) -> bool {
		matches!(self, Value::Null | Value::Bool(false)) || matches!(self, Value::Str(s) if s.is_empty())
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(s) => Some(s.as_str()),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			Value::Str(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(b) => Some(*b),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_event(&self) -> Option<&Event> {
		match self {
			Value::Event(event) => Some(event),
			_ => None,
		}
	}

	/// Looks up a field of a [`Value::Map`].
	#[must_use]
	pub fn get(&self, key: &str) -> Option<&Value> {
		match self {
			Value::Map(map) => map.get(key),
			_ => None,
		}
	}

	/// Renders the value the way it would appear in an attribute or text node.
	///
	/// Integral numbers are printed without a fractional part.
	#[must_use]
	pub fn to_text(&self) -> String {
		match self {
			Value::Null => String::new(),
			Value::Bool(b) => b.to_string(),
			#[allow(clippy::cast_possible_truncation)]
			Value::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 => (*n as i64).to_string(),
			Value::Number(n) => n.to_string(),
			Value::Str(s) => s.clone(),
			Value::List(items) => items.iter().map(Value::to_text).collect::<Vec<_>>().join(","),
			Value::Map(_) => "[object Object]".to_owned(),
			Value::Event(event) => format!("[event {}]", event.kind),
		}
	}
}

impl Default for Value {
	fn default() -> Self {
		Value::Null
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_text())
	}
}

impl From<()> for Value {
	fn from((): ()) -> Self {
		Value::Null
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

macro_rules! number_from {
	($($ty:ty),*) => {$(
		impl From<$ty> for Value {
			fn from(value: $ty) -> Self {
				Value::Number(f64::from(value))
			}
		}
	)*};
}
number_from!(i8, i16, i32, u8, u16, u32, f32, f64);

impl From<i64> for Value {
	#[allow(clippy::cast_precision_loss)]
	fn from(value: i64) -> Self {
		Value::Number(value as f64)
	}
}

impl From<usize> for Value {
	#[allow(clippy::cast_precision_loss)]
	fn from(value: usize) -> Self {
		Value::Number(value as f64)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Str(value.to_owned())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::Str(value)
	}
}

impl From<Event> for Value {
	fn from(value: Event) -> Self {
		Value::Event(value)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(value: Vec<T>) -> Self {
		Value::List(value.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Value::Null, Into::into)
	}
}

/// Snapshot of the form-relevant state of an event's target, taken when the event fires.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTarget {
	pub name: Option<String>,
	pub value: Option<String>,
	pub checked: Option<bool>,
	pub selected: Option<bool>,
	pub multiple: bool,
}

/// A platform event as seen by handlers.
///
/// Backends translate their native events into this shape.
/// The native event object, if any, is available through [`Event::native`].
#[derive(Clone)]
pub struct Event {
	pub kind: String,
	pub target: EventTarget,
	native: Option<Rc<dyn Any>>,
}

impl Event {
	#[must_use]
	pub fn new(kind: impl Into<String>, target: EventTarget) -> Self {
		Self {
			kind: kind.into(),
			target,
			native: None,
		}
	}

	#[must_use]
	pub fn with_native(mut self, native: Rc<dyn Any>) -> Self {
		self.native = Some(native);
		self
	}

	/// Downcasts the backend's native event object.
	#[must_use]
	pub fn native<T: 'static>(&self) -> Option<&T> {
		self.native.as_deref().and_then(|native| native.downcast_ref::<T>())
	}
}

impl fmt::Debug for Event {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event")
			.field("kind", &self.kind)
			.field("target", &self.target)
			.field("native", &self.native.is_some())
			.finish()
	}
}

impl PartialEq for Event {
	fn eq(&self, other: &Self) -> bool {
		self.kind == other.kind && self.target == other.target
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn text_rendering() {
		assert_eq!(Value::from(3).to_text(), "3");
		assert_eq!(Value::from(1.5).to_text(), "1.5");
		assert_eq!(Value::Null.to_text(), "");
		assert_eq!(Value::from(vec![1, 2]).to_text(), "1,2");
	}

	#[test]
	fn falsy() {
		assert!(Value::Null.is_falsy());
		assert!(Value::from("").is_falsy());
		assert!(Value::from(false).is_falsy());
		assert!(!Value::from(0).is_falsy());
	}
}
