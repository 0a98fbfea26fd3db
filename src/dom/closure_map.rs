//! Handlers currently assigned to `on*` properties of live elements.
//!
//! A slot belongs to one (element, event) pair. Changing the handler of an occupied slot only swaps the map entry,
//! so the bound JavaScript function on the element stays the same.

use crate::vdom::Handler;
use core::cell::RefCell;
use hashbrown::{hash_map::Entry, HashMap};
use tracing::trace;

thread_local! {
	static CLOSURE_MAP: RefCell<HashMap<(u32, String), Handler>> = RefCell::default();
}

/// Stores `handler` for `event` on the element with state id `element`.
///
/// Returns `true` if the slot was vacant, in which case the caller must bind a function to the element.
pub(crate) fn publish(element: u32, event: &str, handler: &Handler) -> bool {
	CLOSURE_MAP.with(|closure_map| match closure_map.borrow_mut().entry((element, event.to_owned())) {
		Entry::Vacant(vacant) => {
			vacant.insert(handler.clone());
			trace!(event, "Published handler.");
			true
		}
		Entry::Occupied(mut occupied) => {
			occupied.insert(handler.clone());
			false
		}
	})
}

/// Returns `true` if a handler was removed.
pub(crate) fn unpublish(element: u32, event: &str) -> bool {
	let removed = CLOSURE_MAP.with(|closure_map| closure_map.borrow_mut().remove(&(element, event.to_owned())).is_some());
	if removed {
		trace!(event, "Unpublished handler.");
	}
	removed
}

/// Empties every slot of `element` and returns the events they were bound to.
pub(crate) fn unpublish_all(element: u32) -> Vec<String> {
	let mut events = Vec::new();
	CLOSURE_MAP.with(|closure_map| {
		closure_map.borrow_mut().retain(|(id, event), _| {
			if *id == element {
				events.push(event.clone());
				false
			} else {
				true
			}
		});
	});
	if !events.is_empty() {
		trace!(count = events.len(), "Unpublished handlers of a released element.");
	}
	events
}

/// The current handler of a slot, if any.
///
/// The map isn't borrowed while the handler runs, so handlers may re-render freely.
pub(crate) fn get(element: u32, event: &str) -> Option<Handler> {
	CLOSURE_MAP.with(|closure_map| closure_map.borrow().get(&(element, event.to_owned())).cloned())
}
