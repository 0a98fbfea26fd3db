//! The state → view → update loop.
//!
//! A [`Component`] owns a state, a view function and a table of named actions.
//! Mounting subscribes the actions to a dispatcher. Whenever one of them returns a new state,
//! the state is committed, the view is called and the result is reconciled into the component's element.
//!
//! Events are local to the instance unless they are global: when the action is marked [`ActionOptions::global`],
//! the name starts with `#`, `/` or `@`, or the component was mounted with [`MountOptions::global_event`].
//! Global events go through the [`Context`]'s dispatcher, and so reach every component sharing it.

use crate::{
	context::{Context, DefaultDom},
	diff::{ChildCache, Differ},
	directive::{preprocess, DirectiveHost},
	dispatcher::{DispatchResult, Dispatcher, Invocation, SubscribeOptions, SubscriptionId},
	dom::Dom,
	error::Error,
	history::History,
	value::Value,
	vdom::{ComponentRef, Node, Props, Transform, Vdom},
};
use core::{
	any::{Any, TypeId},
	cell::{Cell, RefCell},
	fmt,
	future::Future,
	time::Duration,
};
use futures::{
	future::LocalBoxFuture,
	stream::{LocalBoxStream, Stream, StreamExt},
};
use hashbrown::HashSet;
use std::rc::{Rc, Weak};
use tracing::{debug, error, instrument, trace, trace_span, warn};

/// What an action (or [`Component::set_state`]) does to the state.
pub enum Update<S> {
	/// Nothing: no commit, no render.
	Keep,
	Set(S),
	/// Resolve later. Dropped if another update is made in the meantime.
	Future(LocalBoxFuture<'static, Update<S>>),
	/// Commit each yielded state in turn, until another update is made.
	Stream(LocalBoxStream<'static, S>),
	/// Commit each state in turn, synchronously.
	Iter(Box<dyn Iterator<Item = S>>),
}

impl<S> Update<S> {
	pub fn future(future: impl Future<Output = Update<S>> + 'static) -> Self {
		Update::Future(Box::pin(future))
	}

	pub fn stream(stream: impl Stream<Item = S> + 'static) -> Self {
		Update::Stream(Box::pin(stream))
	}

	pub fn iter<I>(states: I) -> Self
	where
		I: IntoIterator<Item = S>,
		I::IntoIter: 'static,
	{
		Update::Iter(Box::new(states.into_iter()))
	}
}

impl<S> fmt::Debug for Update<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Update::Keep => "Keep",
			Update::Set(_) => "Set",
			Update::Future(_) => "Future",
			Update::Stream(_) => "Stream",
			Update::Iter(_) => "Iter",
		})
	}
}

/// Return types accepted from actions.
///
/// An `Err` is logged and leaves the state untouched.
pub trait IntoUpdate<S> {
	fn into_update(self) -> anyhow::Result<Update<S>>;
}

impl<S> IntoUpdate<S> for Update<S> {
	fn into_update(self) -> anyhow::Result<Update<S>> {
		Ok(self)
	}
}

impl<S> IntoUpdate<S> for anyhow::Result<Update<S>> {
	fn into_update(self) -> anyhow::Result<Update<S>> {
		self
	}
}

impl<S> IntoUpdate<S> for Option<S> {
	fn into_update(self) -> anyhow::Result<Update<S>> {
		Ok(self.map_or(Update::Keep, Update::Set))
	}
}

impl<S> IntoUpdate<S> for () {
	fn into_update(self) -> anyhow::Result<Update<S>> {
		Ok(Update::Keep)
	}
}

/// How the first state is obtained when mounting.
pub enum Init<S> {
	Value(S),
	Lazy(Box<dyn FnOnce() -> S>),
	/// Nothing renders and no action runs until this resolves.
	Future(LocalBoxFuture<'static, S>),
}

impl<S> Init<S> {
	pub fn lazy(init: impl FnOnce() -> S + 'static) -> Self {
		Init::Lazy(Box::new(init))
	}

	pub fn future(init: impl Future<Output = S> + 'static) -> Self {
		Init::Future(Box::pin(init))
	}
}

pub struct ActionOptions<S> {
	pub once: bool,
	/// Debounce the action by this long.
	pub delay: Option<Duration>,
	pub global: bool,
	/// Call the view after committing. Defaults to `true`.
	pub render: bool,
	/// Record committed states, if the component keeps a history. Defaults to `true`.
	pub history: bool,
	/// Called with each state the action commits, after rendering.
	pub callback: Option<Rc<dyn Fn(&S)>>,
}

impl<S> Default for ActionOptions<S> {
	fn default() -> Self {
		Self {
			once: false,
			delay: None,
			global: false,
			render: true,
			history: true,
			callback: None,
		}
	}
}

impl<S> Clone for ActionOptions<S> {
	fn clone(&self) -> Self {
		Self {
			callback: self.callback.clone(),
			..*self
		}
	}
}

impl<S> fmt::Debug for ActionOptions<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActionOptions")
			.field("once", &self.once)
			.field("delay", &self.delay)
			.field("global", &self.global)
			.field("render", &self.render)
			.field("history", &self.history)
			.field("callback", &self.callback.is_some())
			.finish()
	}
}

impl<S> ActionOptions<S> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn once(mut self) -> Self {
		self.once = true;
		self
	}

	#[must_use]
	pub fn delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	#[must_use]
	pub fn global(mut self) -> Self {
		self.global = true;
		self
	}

	#[must_use]
	pub fn render(mut self, render: bool) -> Self {
		self.render = render;
		self
	}

	#[must_use]
	pub fn history(mut self, history: bool) -> Self {
		self.history = history;
		self
	}

	#[must_use]
	pub fn callback(mut self, callback: impl Fn(&S) + 'static) -> Self {
		self.callback = Some(Rc::new(callback));
		self
	}

	fn set_state_options(&self) -> SetStateOptions<S> {
		SetStateOptions {
			render: self.render,
			history: self.history,
			callback: self.callback.clone(),
		}
	}
}

pub struct SetStateOptions<S> {
	pub render: bool,
	pub history: bool,
	pub callback: Option<Rc<dyn Fn(&S)>>,
}

impl<S> Default for SetStateOptions<S> {
	fn default() -> Self {
		Self {
			render: true,
			history: true,
			callback: None,
		}
	}
}

impl<S> Clone for SetStateOptions<S> {
	fn clone(&self) -> Self {
		Self {
			callback: self.callback.clone(),
			..*self
		}
	}
}

/// Event names for stepping through a component's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOptions {
	pub prev: String,
	pub next: String,
}

impl Default for HistoryOptions {
	fn default() -> Self {
		Self {
			prev: "history-prev".to_owned(),
			next: "history-next".to_owned(),
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct MountOptions {
	/// Render the initial state. Defaults to `false` for [`Component::mount`] and `true` for [`Component::start`].
	pub render: Option<bool>,
	/// Treat every event of this component as global.
	pub global_event: bool,
	/// Keep a history of committed states.
	pub history: Option<HistoryOptions>,
	/// Route this component answers to. A refresh action is registered for it unless an action of that name exists.
	pub route: Option<String>,
}

impl MountOptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn render(mut self, render: bool) -> Self {
		self.render = Some(render);
		self
	}

	#[must_use]
	pub fn global_event(mut self) -> Self {
		self.global_event = true;
		self
	}

	#[must_use]
	pub fn history(mut self, history: HistoryOptions) -> Self {
		self.history = Some(history);
		self
	}

	#[must_use]
	pub fn route(mut self, route: impl Into<String>) -> Self {
		self.route = Some(route.into());
		self
	}
}

/// Where to mount.
#[derive(Debug, Clone)]
pub enum Target<N> {
	/// Run without an element. The view is still called.
	None,
	Element(N),
	/// Look up the element by id when mounting.
	Id(String),
}

impl<N> Target<N> {
	pub fn id(id: impl Into<String>) -> Self {
		Target::Id(id.into())
	}
}

impl<N> From<N> for Target<N> {
	fn from(element: N) -> Self {
		Target::Element(element)
	}
}

type ActionFn<S> = Rc<dyn Fn(&S, &[Value]) -> anyhow::Result<Update<S>>>;

enum Handler<S> {
	Run(ActionFn<S>),
	/// Re-renders the current state.
	Refresh,
}

/// A named entry of the action table.
///
/// The name may list comma-separated aliases.
pub struct Action<S> {
	name: String,
	handler: Handler<S>,
	options: ActionOptions<S>,
}

impl<S> Clone for Action<S> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			handler: match &self.handler {
				Handler::Run(run) => Handler::Run(run.clone()),
				Handler::Refresh => Handler::Refresh,
			},
			options: self.options.clone(),
		}
	}
}

impl<S> fmt::Debug for Action<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Action").field("name", &self.name).field("options", &self.options).finish_non_exhaustive()
	}
}

impl<S: 'static> Action<S> {
	pub fn new<R: IntoUpdate<S>>(name: impl Into<String>, handler: impl Fn(&S, &[Value]) -> R + 'static) -> Self {
		Self {
			name: name.into(),
			handler: Handler::Run(Rc::new(move |state: &S, args: &[Value]| handler(state, args).into_update())),
			options: ActionOptions::default(),
		}
	}

	fn refresh(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			handler: Handler::Refresh,
			options: ActionOptions::default(),
		}
	}

	#[must_use]
	pub fn with_options(mut self, options: ActionOptions<S>) -> Self {
		self.options = options;
		self
	}

	fn names(&self) -> impl Iterator<Item = &str> {
		self.name.split(',').map(str::trim).filter(|name| !name.is_empty())
	}
}

/// Field access for two-way bindings (`$bind`).
pub trait Bindable: Sized {
	fn field(&self, name: &str) -> Value;
	fn with_field(&self, name: &str, value: Value) -> Self;
}

impl Bindable for Value {
	fn field(&self, name: &str) -> Value {
		self.get(name).cloned().unwrap_or_default()
	}

	fn with_field(&self, name: &str, value: Value) -> Self {
		let mut map = match self {
			Value::Map(map) => map.clone(),
			_ => Default::default(),
		};
		map.insert(name.to_owned(), value);
		Value::Map(map)
	}
}

struct Binder<S> {
	get: fn(&S, &str) -> Value,
	set: fn(&S, &str, Value) -> S,
}

impl<S> Clone for Binder<S> {
	fn clone(&self) -> Self {
		Self { get: self.get, set: self.set }
	}
}

type MountedHook<S> = Rc<dyn Fn(&Props, &[Node], &S) -> Option<S>>;
type StateHook<S> = Rc<dyn Fn(&S)>;

struct Hooks<S> {
	mounted: Option<MountedHook<S>>,
	rendered: Option<StateHook<S>>,
	unload: Option<StateHook<S>>,
}

struct Subscription {
	global: bool,
	event: String,
	id: SubscriptionId,
}

/// Present while mounted.
struct Mount {
	global_event: bool,
	/// Action names registered as global because of their options.
	globals: HashSet<String>,
}

struct Inner<S: 'static, D: Dom> {
	this: Weak<Inner<S, D>>,
	/// Keeps a mounted instance alive after its last handle is dropped. Cleared by `unmount`.
	retained: RefCell<Option<Rc<Inner<S, D>>>>,
	id: usize,
	context: Rc<Context<D>>,
	local: Dispatcher,
	init: RefCell<Option<Init<S>>>,
	state: RefCell<Option<Rc<S>>>,
	view: RefCell<Option<Rc<dyn Fn(&S) -> Vdom>>>,
	actions: RefCell<Vec<Action<S>>>,
	hooks: RefCell<Hooks<S>>,
	binder: RefCell<Option<Binder<S>>>,
	element: RefCell<Option<D::Node>>,
	mount: RefCell<Option<Mount>>,
	subscriptions: RefCell<Vec<Subscription>>,
	generation: Cell<u64>,
	history: RefCell<Option<History<Rc<S>>>>,
	children: ChildCache<D>,
}

/// A handle to a component instance. Clones refer to the same instance.
pub struct Component<S: 'static, D: Dom = DefaultDom>(Rc<Inner<S, D>>);

impl<S: 'static, D: Dom> Clone for Component<S, D> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<S: 'static, D: Dom> fmt::Debug for Component<S, D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Component")
			.field("mounted", &self.is_mounted())
			.field("element", &self.0.element.borrow())
			.field("actions", &self.0.actions.borrow().len())
			.finish_non_exhaustive()
	}
}

impl<S: 'static> Component<S, DefaultDom> {
	/// Creates a component in the [global context](`Context::global`).
	pub fn new(state: S) -> Self {
		Self::with_context(&Context::global(), state)
	}
}

fn is_global_name(event: &str) -> bool {
	event.starts_with(['#', '/', '@'])
}

fn log_action_error(event: &str, args: &[Value], error: &anyhow::Error) {
	if cfg!(feature = "dangerous-logging") {
		error!(event, ?args, "Action failed: {:#}", error);
	} else {
		error!(event, args = args.len(), "Action failed: {:#}", error);
	}
}

impl<S: 'static, D: Dom> Component<S, D> {
	pub fn with_context(context: &Rc<Context<D>>, state: S) -> Self {
		Self::from_init(context, Init::Value(state))
	}

	pub fn from_init(context: &Rc<Context<D>>, init: Init<S>) -> Self {
		Self(Rc::new_cyclic(|this| Inner {
			this: this.clone(),
			retained: RefCell::new(None),
			id: context.next_component_id(),
			context: context.clone(),
			local: Dispatcher::new(context.scheduler().clone()),
			init: RefCell::new(Some(init)),
			state: RefCell::new(None),
			view: RefCell::new(None),
			actions: RefCell::new(Vec::new()),
			hooks: RefCell::new(Hooks {
				mounted: None,
				rendered: None,
				unload: None,
			}),
			binder: RefCell::new(None),
			element: RefCell::new(None),
			mount: RefCell::new(None),
			subscriptions: RefCell::new(Vec::new()),
			generation: Cell::new(0),
			history: RefCell::new(None),
			children: ChildCache::default(),
		}))
	}

	#[must_use]
	pub fn view<V: Into<Vdom>>(self, view: impl Fn(&S) -> V + 'static) -> Self {
		*self.0.view.borrow_mut() = Some(Rc::new(move |state: &S| view(state).into()));
		self
	}

	/// Adds an action. Actions are subscribed when mounting.
	#[must_use]
	pub fn action<R: IntoUpdate<S>>(self, name: impl Into<String>, handler: impl Fn(&S, &[Value]) -> R + 'static) -> Self {
		self.actions([Action::new(name, handler)])
	}

	#[must_use]
	pub fn action_with<R: IntoUpdate<S>>(self, name: impl Into<String>, handler: impl Fn(&S, &[Value]) -> R + 'static, options: ActionOptions<S>) -> Self {
		self.actions([Action::new(name, handler).with_options(options)])
	}

	#[must_use]
	pub fn actions(self, actions: impl IntoIterator<Item = Action<S>>) -> Self {
		self.0.actions.borrow_mut().extend(actions);
		self
	}

	/// Called after [`start`](`Component::start`) and, for nested components, on every render of the parent.
	/// Returning a state commits it.
	#[must_use]
	pub fn on_mounted(self, hook: impl Fn(&Props, &[Node], &S) -> Option<S> + 'static) -> Self {
		self.0.hooks.borrow_mut().mounted = Some(Rc::new(hook));
		self
	}

	#[must_use]
	pub fn on_rendered(self, hook: impl Fn(&S) + 'static) -> Self {
		self.0.hooks.borrow_mut().rendered = Some(Rc::new(hook));
		self
	}

	#[must_use]
	pub fn on_unload(self, hook: impl Fn(&S) + 'static) -> Self {
		self.0.hooks.borrow_mut().unload = Some(Rc::new(hook));
		self
	}

	pub fn context(&self) -> &Rc<Context<D>> {
		&self.0.context
	}

	#[must_use]
	pub fn state(&self) -> Option<Rc<S>> {
		self.0.state.borrow().clone()
	}

	#[must_use]
	pub fn element(&self) -> Option<D::Node> {
		self.0.element.borrow().clone()
	}

	/// Identifies this instance among the components of its context.
	#[must_use]
	pub fn id(&self) -> usize {
		self.0.id
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.0.mount.borrow().is_some()
	}

	/// Binds to `target`, subscribes the action table and commits the initial state.
	///
	/// # Errors
	///
	/// [`Error::AlreadyMounted`] if the component is mounted, [`Error::TargetNotFound`] if `target` names a missing id.
	#[instrument(skip_all)]
	pub fn mount(&self, target: impl Into<Target<D::Node>>, options: MountOptions) -> Result<Self, Error> {
		if self.is_mounted() {
			error!("Component is already mounted.");
			return Err(Error::AlreadyMounted);
		}
		let element = match target.into() {
			Target::None => None,
			Target::Element(element) => Some(element),
			Target::Id(id) => match self.0.context.dom().element_by_id(&id) {
				Some(element) => Some(element),
				None => {
					error!("Mount target not found.");
					return Err(Error::TargetNotFound(id));
				}
			},
		};
		*self.0.element.borrow_mut() = element;

		let mut actions = self.0.actions.borrow().clone();
		let declared = |name: &str| actions.iter().any(|action| action.names().any(|n| n == name));
		let mut extra = Vec::new();
		if !declared(".") {
			extra.push(Action::refresh("."));
		}
		if let Some(route) = options.route.as_deref().filter(|route| !declared(route)) {
			extra.push(Action::refresh(route));
		}
		actions.extend(extra);

		let globals = actions
			.iter()
			.filter(|action| action.options.global)
			.flat_map(|action| action.names().map(str::to_owned).collect::<Vec<_>>())
			.collect();
		*self.0.mount.borrow_mut() = Some(Mount {
			global_event: options.global_event,
			globals,
		});
		*self.0.retained.borrow_mut() = Some(self.0.clone());

		for action in actions {
			let subscribe_options = SubscribeOptions {
				once: action.options.once,
				delay: action.options.delay,
			};
			let action = Rc::new(action);
			for name in action.names() {
				let this = self.0.this.clone();
				let action = action.clone();
				self.on(
					name,
					move |invocation| {
						if let Some(inner) = this.upgrade() {
							Component(inner).invoke(&action, invocation);
						}
					},
					subscribe_options,
				);
			}
		}

		if let Some(history) = &options.history {
			*self.0.history.borrow_mut() = Some(History::new());
			for (event, back) in [(&history.prev, true), (&history.next, false)] {
				let this = self.0.this.clone();
				self.on(
					event,
					move |_| {
						if let Some(inner) = this.upgrade() {
							Component(inner).travel(back);
						}
					},
					SubscribeOptions::default(),
				);
			}
		}

		let options = SetStateOptions {
			render: options.render.unwrap_or(false),
			..SetStateOptions::default()
		};
		let init = self.0.init.borrow_mut().take();
		match init {
			Some(Init::Value(state)) => self.commit(state, &options),
			Some(Init::Lazy(init)) => self.commit(init(), &options),
			Some(Init::Future(init)) => self.set_state_with(Update::future(async move { Update::Set(init.await) }), options),
			None if options.render => self.render(),
			None => (),
		}
		Ok(self.clone())
	}

	/// [`mount`](`Component::mount`), rendering by default, then the `mounted` hook.
	///
	/// # Errors
	///
	/// As [`mount`](`Component::mount`).
	pub fn start(&self, target: impl Into<Target<D::Node>>, options: MountOptions) -> Result<Self, Error> {
		self.start_with(target, options, &Props::new(), &[])
	}

	/// [`start`](`Component::start`), handing `props` and `children` to the `mounted` hook.
	///
	/// # Errors
	///
	/// As [`mount`](`Component::mount`).
	pub fn start_with(&self, target: impl Into<Target<D::Node>>, options: MountOptions, props: &Props, children: &[Node]) -> Result<Self, Error> {
		let options = MountOptions {
			render: Some(options.render.unwrap_or(true)),
			..options
		};
		self.mount(target, options)?;
		self.call_mounted(props, children);
		Ok(self.clone())
	}

	/// Disconnects every subscription, unmounts nested components and calls the `unload` hook.
	///
	/// Pending asynchronous updates are dropped.
	///
	/// # Errors
	///
	/// [`Error::NotMounted`] if the component isn't mounted.
	#[instrument(skip_all)]
	pub fn unmount(&self) -> Result<(), Error> {
		if self.0.mount.borrow_mut().take().is_none() {
			warn!("Component is not mounted.");
			return Err(Error::NotMounted);
		}

		let subscriptions = self.0.subscriptions.take();
		trace!(count = subscriptions.len(), "Unsubscribing.");
		for subscription in subscriptions {
			self.dispatcher(subscription.global).off(&subscription.event, subscription.id);
		}
		self.supersede();

		let children: Vec<_> = self.0.children.borrow_mut().drain().map(|(_, entry)| entry.component).collect();
		for child in children {
			child.detach();
		}
		self.0.element.take();

		let unload = self.0.hooks.borrow().unload.clone();
		if let (Some(unload), Some(state)) = (unload, self.state()) {
			unload(&state);
		}
		self.0.retained.take();
		Ok(())
	}

	fn dispatcher(&self, global: bool) -> &Dispatcher {
		if global {
			self.0.context.dispatcher()
		} else {
			&self.0.local
		}
	}

	fn is_global(&self, event: &str) -> bool {
		is_global_name(event) || self.0.mount.borrow().as_ref().map_or(false, |mount| mount.global_event || mount.globals.contains(event))
	}

	/// Dispatches `event` in this component's scope.
	pub fn run(&self, event: &str, args: &[Value]) -> DispatchResult {
		self.dispatcher(self.is_global(event)).run(event, args)
	}

	/// Subscribes `handler` in this component's scope. The subscription ends when the component is unmounted.
	pub fn on(&self, event: &str, handler: impl Fn(&Invocation<'_>) + 'static, options: SubscribeOptions) -> SubscriptionId {
		let global = self.is_global(event);
		let id = self.dispatcher(global).on(event, handler, options);
		self.0.subscriptions.borrow_mut().push(Subscription {
			global,
			event: event.to_owned(),
			id,
		});
		id
	}

	pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
		let subscription = {
			let mut subscriptions = self.0.subscriptions.borrow_mut();
			let index = subscriptions.iter().position(|s| s.id == id && s.event == event);
			index.map(|index| subscriptions.remove(index))
		};
		subscription.map_or(false, |subscription| self.dispatcher(subscription.global).off(event, id))
	}

	pub fn set_state(&self, update: Update<S>) {
		self.set_state_with(update, SetStateOptions::default());
	}

	/// Applies `update`.
	///
	/// Every call supersedes pending asynchronous updates from earlier calls, which are then dropped when they resolve.
	pub fn set_state_with(&self, update: Update<S>, options: SetStateOptions<S>) {
		match update {
			Update::Keep => trace!("No state change."),
			Update::Set(state) => {
				self.supersede();
				self.commit(state, &options);
			}
			Update::Iter(states) => {
				self.supersede();
				for state in states {
					self.commit(state, &options);
				}
			}
			Update::Future(future) => {
				let generation = self.supersede();
				let this = self.0.this.clone();
				self.0.context.scheduler().spawn(Box::pin(async move {
					let update = future.await;
					let Some(inner) = this.upgrade() else { return };
					if inner.generation.get() == generation {
						Component(inner).set_state_with(update, options);
					} else {
						debug!("Dropping superseded asynchronous update.");
					}
				}));
			}
			Update::Stream(mut states) => {
				let generation = self.supersede();
				let this = self.0.this.clone();
				self.0.context.scheduler().spawn(Box::pin(async move {
					while let Some(state) = states.next().await {
						let Some(inner) = this.upgrade() else { return };
						if inner.generation.get() != generation {
							debug!("Abandoning superseded state stream.");
							return;
						}
						Component(inner).commit(state, &options);
					}
				}));
			}
		}
	}

	/// Re-renders the current state.
	pub fn render(&self) {
		if let Some(state) = self.state() {
			self.render_state(&state);
		}
	}

	fn supersede(&self) -> u64 {
		let generation = self.0.generation.get() + 1;
		self.0.generation.set(generation);
		generation
	}

	fn commit(&self, state: S, options: &SetStateOptions<S>) {
		let state = Rc::new(state);
		*self.0.state.borrow_mut() = Some(state.clone());
		debug!(render = options.render, "State committed.");
		if options.history {
			if let Some(history) = self.0.history.borrow_mut().as_mut() {
				history.record(state.clone());
			}
		}
		if options.render {
			self.render_state(&state);
		}
		if let Some(callback) = &options.callback {
			callback(&state);
		}
	}

	fn render_state(&self, state: &S) {
		let view = self.0.view.borrow().clone();
		let Some(view) = view else { return };
		let span = trace_span!("render");
		let _enter = span.enter();

		if let Vdom::Nodes(mut nodes) = view(state) {
			let host: Weak<dyn DirectiveHost> = self.0.this.clone();
			preprocess(&mut nodes, &host, self.0.context.directives());
			let element = self.element();
			if let Some(element) = element {
				let namespace = self.0.context.dom().namespace(&element);
				Differ::new(&self.0.context, &self.0.children).update_children(&element, &nodes, namespace);
			}
		} else {
			trace!("View skipped rendering.");
		}

		let rendered = self.0.hooks.borrow().rendered.clone();
		if let Some(rendered) = rendered {
			rendered(state);
		}
	}

	fn invoke(&self, action: &Action<S>, invocation: &Invocation<'_>) {
		match &action.handler {
			Handler::Refresh => self.render(),
			Handler::Run(handler) => {
				let Some(state) = self.state() else {
					warn!(event = invocation.event, "Action ignored: the state is not initialized yet.");
					return;
				};
				trace!(event = invocation.event, "Running action.");
				match handler(&state, invocation.args) {
					Ok(update) => self.set_state_with(update, action.options.set_state_options()),
					Err(error) => log_action_error(invocation.event, invocation.args, &error),
				}
			}
		}
	}

	fn travel(&self, back: bool) {
		let state = {
			let mut history = self.0.history.borrow_mut();
			let Some(history) = history.as_mut() else { return };
			if back {
				history.prev()
			} else {
				history.next()
			}
		};
		if let Some(state) = state {
			self.supersede();
			*self.0.state.borrow_mut() = Some(state.clone());
			self.render_state(&state);
		}
	}

	fn call_mounted(&self, props: &Props, children: &[Node]) {
		let hook = self.0.hooks.borrow().mounted.clone();
		if let (Some(hook), Some(state)) = (hook, self.state()) {
			if let Some(state) = hook(props, children, &state) {
				self.set_state(Update::Set(state));
			}
		}
	}
}

impl<S: Bindable + 'static, D: Dom> Component<S, D> {
	/// Enables `$bind` directives in this component's view.
	#[must_use]
	pub fn bindable(self) -> Self {
		*self.0.binder.borrow_mut() = Some(Binder {
			get: S::field,
			set: S::with_field,
		});
		self
	}
}

impl<S: 'static, D: Dom> DirectiveHost for Inner<S, D> {
	fn id(&self) -> usize {
		self.id
	}

	fn run(&self, event: &str, args: &[Value]) -> DispatchResult {
		self.this.upgrade().map_or_else(DispatchResult::default, |inner| Component(inner).run(event, args))
	}

	fn run_global(&self, event: &str, args: &[Value]) -> DispatchResult {
		self.context.run(event, args)
	}

	fn apply(&self, transform: &Transform, args: &[Value]) {
		let Some(component) = self.this.upgrade().map(Component) else { return };
		let Some(state) = component.state() else { return };
		match transform.apply::<S>(&state, args) {
			Some(update) => component.set_state(update),
			None => warn!("Transform was created for a different state type."),
		}
	}

	fn bound_value(&self, field: &str) -> Value {
		let binder = self.binder.borrow().clone();
		let state = self.state.borrow().clone();
		match (binder, state) {
			(Some(binder), Some(state)) => (binder.get)(&state, field),
			(None, _) => {
				warn!("`$bind` used in a component that is not bindable.");
				Value::Null
			}
			(_, None) => Value::Null,
		}
	}

	fn bind(&self, field: &str, value: Value) {
		let binder = self.binder.borrow().clone();
		let Some(component) = self.this.upgrade().map(Component) else { return };
		if let (Some(binder), Some(state)) = (binder, component.state()) {
			component.set_state(Update::Set((binder.set)(&state, field, value)));
		}
	}
}

/// A component as seen by the differ rendering its parent.
pub(crate) trait Embedded<D: Dom> {
	/// The host element, while mounted.
	fn element(&self) -> Option<D::Node>;
	fn attach(&self, host: D::Node) -> Result<(), Error>;
	fn receive(&self, props: &Props, children: &[Node]);
	fn detach(&self);
}

impl<S: 'static, D: Dom> Embedded<D> for Component<S, D> {
	fn element(&self) -> Option<D::Node> {
		if self.is_mounted() {
			Component::element(self)
		} else {
			None
		}
	}

	fn attach(&self, host: D::Node) -> Result<(), Error> {
		self.mount(host, MountOptions::new().render(true)).map(drop)
	}

	fn receive(&self, props: &Props, children: &[Node]) {
		self.call_mounted(props, children);
	}

	fn detach(&self) {
		if let Err(error) = self.unmount() {
			debug!("Nested component was already unmounted: {}", error);
		}
	}
}

impl ComponentRef {
	/// Refers to the components built by `constructor`, which is called once per nested instance.
	///
	/// Cached instances are reused only for the same constructor type.
	pub fn new<S, D, F>(name: &'static str, constructor: F) -> Self
	where
		S: 'static,
		D: Dom,
		F: Fn(&Rc<Context<D>>) -> Component<S, D> + 'static,
	{
		Self {
			type_id: TypeId::of::<F>(),
			name,
			factory: Rc::new(move |context: &dyn Any| {
				let context = context.downcast_ref::<Rc<Context<D>>>()?;
				let component: Rc<dyn Embedded<D>> = Rc::new(constructor(context));
				Some(Box::new(component) as Box<dyn Any>)
			}),
		}
	}
}
