//! Navigation strings to dispatcher events.
//!
//! `#name/a/b` and `/name/a/b` dispatch to a handler registered under the leading segment with the remaining
//! segments as arguments, unless a handler is registered under a longer path (`/name/a`), which then takes precedence.
//! Any other string is dispatched verbatim.

use crate::{
	dispatcher::{DispatchResult, Dispatcher},
	value::Value,
};
use core::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, instrument, trace};

/// Fired after every routed navigation, with the resolved event name followed by its arguments.
pub const ROUTE_CHANGED: &str = "//";
/// Fired when no handler is registered for any candidate name, with the leading name followed by its arguments.
pub const NOT_FOUND: &str = "///";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOptions {
	/// How many path segments after the leading one may form part of an event name.
	pub max_fallback_depth: usize,
	/// Ignore a navigation to the same URL as the previous one.
	pub suppress_duplicates: bool,
}

impl Default for RouterOptions {
	fn default() -> Self {
		Self {
			max_fallback_depth: 3,
			suppress_duplicates: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
	/// The event that handled the navigation, if any did.
	pub event: Option<String>,
	pub args: Vec<Value>,
	/// Set when the navigation repeated the previous URL and was skipped.
	pub suppressed: bool,
	pub dispatch: DispatchResult,
}

/// The navigation contract the component runtime relies on.
pub trait Route {
	fn route(&self, url: &str) -> RouteResult;
}

#[derive(Debug)]
pub struct Router {
	dispatcher: Rc<Dispatcher>,
	options: RouterOptions,
	last: RefCell<Option<String>>,
}

impl Router {
	#[must_use]
	pub fn new(dispatcher: Rc<Dispatcher>, options: RouterOptions) -> Self {
		Self {
			dispatcher,
			options,
			last: RefCell::new(None),
		}
	}

	#[must_use]
	pub fn options(&self) -> RouterOptions {
		self.options
	}

	/// Forgets the previous URL, so that the next navigation is never treated as a duplicate.
	pub fn reset(&self) {
		self.last.take();
	}
}

impl Route for Router {
	#[instrument(skip(self))]
	fn route(&self, url: &str) -> RouteResult {
		let url = if url.is_empty() { "#" } else { url };
		if self.options.suppress_duplicates && self.last.borrow().as_deref() == Some(url) {
			debug!("Duplicate navigation suppressed.");
			return RouteResult {
				event: None,
				args: Vec::new(),
				suppressed: true,
				dispatch: DispatchResult::default(),
			};
		}
		*self.last.borrow_mut() = Some(url.to_owned());

		let candidates = candidates(url, self.options.max_fallback_depth);
		for (event, args) in &candidates {
			if self.dispatcher.subscriber_count(event) == 0 && !has_wildcard(&self.dispatcher, event) {
				trace!(event = event.as_str(), "No handler, falling back.");
				continue;
			}
			let dispatch = self.dispatcher.run(event, args);
			self.dispatcher.run(ROUTE_CHANGED, &with_name(event, args));
			return RouteResult {
				event: Some(event.clone()),
				args: args.clone(),
				suppressed: false,
				dispatch,
			};
		}

		let (event, args) = candidates.last().cloned().unwrap_or_else(|| (url.to_owned(), Vec::new()));
		let announced = with_name(&event, &args);
		self.dispatcher.run(NOT_FOUND, &announced);
		self.dispatcher.run(ROUTE_CHANGED, &announced);
		RouteResult {
			event: None,
			args,
			suppressed: false,
			dispatch: DispatchResult::default(),
		}
	}
}

fn has_wildcard(dispatcher: &Dispatcher, event: &str) -> bool {
	(0..event.len()).filter(|&end| event.is_char_boundary(end)).any(|end| dispatcher.subscriber_count(&format!("{}*", &event[..end])) > 0)
}

fn with_name(event: &str, args: &[Value]) -> Vec<Value> {
	core::iter::once(Value::from(event)).chain(args.iter().cloned()).collect()
}

/// Splits a navigation string into its leading event name and remaining path segments.
#[must_use]
pub fn split(url: &str) -> (String, Vec<String>) {
	let (sigil, path) = match url.as_bytes().first() {
		Some(b'#') => ("", url),
		Some(b'/') => ("/", &url[1..]),
		_ => return (url.to_owned(), Vec::new()),
	};
	let mut segments = path.split('/');
	let name = format!("{}{}", sigil, segments.next().unwrap_or_default());
	(name, segments.map(str::to_owned).collect())
}

/// Candidate `(event, args)` pairs, most specific first, ending with the leading segment.
fn candidates(url: &str, max_depth: usize) -> Vec<(String, Vec<Value>)> {
	let (name, rest) = split(url);
	if !url.starts_with(['#', '/']) {
		return vec![(name, Vec::new())];
	}
	(0..=rest.len().min(max_depth))
		.rev()
		.map(|depth| {
			let event = core::iter::once(name.as_str()).chain(rest[..depth].iter().map(String::as_str)).collect::<Vec<_>>().join("/");
			(event, rest[depth..].iter().map(|segment| Value::from(segment.as_str())).collect())
		})
		.collect()
}
