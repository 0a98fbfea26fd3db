//! Publish/subscribe by event name.

use crate::{
	scheduler::{Scheduler, TimerId},
	value::Value,
};
use core::{
	cell::{Cell, RefCell},
	fmt,
	time::Duration,
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
	/// Remove the subscription before its first invocation.
	pub once: bool,
	/// Debounce: invoke once `delay` after the latest dispatch, with that dispatch's arguments.
	pub delay: Option<Duration>,
}

impl SubscribeOptions {
	#[must_use]
	pub fn once() -> Self {
		Self { once: true, delay: None }
	}

	#[must_use]
	pub fn delay(delay: Duration) -> Self {
		Self { once: false, delay: Some(delay) }
	}
}

/// What a subscriber receives.
///
/// `event` is the dispatched name, which differs from the subscribed one for wildcard subscriptions.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
	pub event: &'a str,
	pub args: &'a [Value],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchResult {
	pub matched: bool,
	pub subscriber_count: usize,
}

type Callback = Rc<dyn Fn(&Invocation<'_>)>;

struct Subscriber {
	id: SubscriptionId,
	handler: Callback,
	options: SubscribeOptions,
	pending: Cell<Option<TimerId>>,
}

/// A subscriber table.
///
/// Names ending in `*` subscribe to every event starting with the part before the `*`.
/// These wildcard subscribers run after exact ones, longest prefix first.
///
/// No borrow of the table is held while handlers run, so handlers may freely dispatch, subscribe and unsubscribe.
pub struct Dispatcher {
	scheduler: Rc<dyn Scheduler>,
	next_id: Cell<u64>,
	events: RefCell<HashMap<String, Vec<Rc<Subscriber>>>>,
}

impl fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher").field("events", &self.events.borrow().len()).finish_non_exhaustive()
	}
}

impl Dispatcher {
	#[must_use]
	pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
		Self {
			scheduler,
			next_id: Cell::new(0),
			events: RefCell::default(),
		}
	}

	pub fn on(&self, name: &str, handler: impl Fn(&Invocation<'_>) + 'static, options: SubscribeOptions) -> SubscriptionId {
		let id = SubscriptionId(self.next_id.get());
		self.next_id.set(id.0 + 1);
		self.events.borrow_mut().entry_ref(name).or_default().push(Rc::new(Subscriber {
			id,
			handler: Rc::new(handler),
			options,
			pending: Cell::new(None),
		}));
		trace!(name, ?id, "Subscribed.");
		id
	}

	/// Removes one subscription and cancels its pending debounced invocation, if any.
	///
	/// Returns whether it was found.
	pub fn off(&self, name: &str, id: SubscriptionId) -> bool {
		let removed = {
			let mut events = self.events.borrow_mut();
			let Some(subscribers) = events.get_mut(name) else { return false };
			let removed = subscribers.iter().position(|s| s.id == id).map(|index| subscribers.remove(index));
			if subscribers.is_empty() {
				events.remove(name);
			}
			removed
		};
		match removed {
			Some(subscriber) => {
				if let Some(timer) = subscriber.pending.take() {
					self.scheduler.clear_timeout(timer);
				}
				true
			}
			None => false,
		}
	}

	/// The number of subscriptions made under exactly `name`.
	#[must_use]
	pub fn subscriber_count(&self, name: &str) -> usize {
		self.events.borrow().get(name).map_or(0, Vec::len)
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.events.borrow().is_empty()
	}

	/// Invokes every subscriber of `name` that exists when the call starts.
	///
	/// Undelayed subscribers run before this method returns, in subscription order.
	#[instrument(skip(self, args))]
	pub fn run(&self, name: &str, args: &[Value]) -> DispatchResult {
		let snapshot = self.snapshot(name);
		if snapshot.is_empty() {
			warn!(name, "No subscriber for event.");
			return DispatchResult::default();
		}

		let invocation = Invocation { event: name, args };
		for subscriber in &snapshot {
			match subscriber.options.delay {
				None => (subscriber.handler)(&invocation),
				Some(delay) => self.debounce(subscriber, name, args, delay),
			}
		}

		DispatchResult {
			matched: true,
			subscriber_count: snapshot.len(),
		}
	}

	/// Collects matching subscribers and removes the `once` ones among them from the table.
	fn snapshot(&self, name: &str) -> Vec<Rc<Subscriber>> {
		let mut events = self.events.borrow_mut();

		let mut wildcards: Vec<(usize, &String)> = events
			.keys()
			.filter_map(|key| key.strip_suffix('*').map(|prefix| (prefix, key)))
			.filter(|(prefix, key)| name.starts_with(prefix) && key.as_str() != name)
			.map(|(prefix, key)| (prefix.len(), key))
			.collect();
		wildcards.sort_by(|a, b| b.0.cmp(&a.0));
		let keys: Vec<String> = core::iter::once(name.to_owned()).chain(wildcards.into_iter().map(|(_, key)| key.clone())).collect();

		let mut snapshot = Vec::new();
		for key in keys {
			let Some(subscribers) = events.get_mut(&key) else { continue };
			snapshot.extend(subscribers.iter().cloned());
			subscribers.retain(|subscriber| !subscriber.options.once);
			if subscribers.is_empty() {
				events.remove(&key);
			}
		}
		snapshot
	}

	fn debounce(&self, subscriber: &Rc<Subscriber>, name: &str, args: &[Value], delay: Duration) {
		if let Some(timer) = subscriber.pending.take() {
			self.scheduler.clear_timeout(timer);
		}
		let event = name.to_owned();
		let args = args.to_vec();
		let delayed = Rc::downgrade(subscriber);
		let timer = self.scheduler.set_timeout(
			delay,
			Box::new(move || {
				if let Some(subscriber) = delayed.upgrade() {
					subscriber.pending.set(None);
					(subscriber.handler)(&Invocation { event: &event, args: &args });
				}
			}),
		);
		subscriber.pending.set(Some(timer));
	}
}
