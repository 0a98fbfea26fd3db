//! The state shared by everything rendering into one document.

use crate::{
	diff::{ChildCache, Differ},
	directive::DirectiveRegistry,
	dispatcher::{DispatchResult, Dispatcher, Invocation, SubscribeOptions, SubscriptionId},
	dom::Dom,
	router::{Route, RouteResult, Router, RouterOptions},
	scheduler::Scheduler,
	value::Value,
	vdom::Vdom,
};
use core::{
	cell::{Cell, RefCell},
	fmt,
};
use hashbrown::HashMap;
use std::rc::Rc;

#[cfg(not(target_arch = "wasm32"))]
pub type DefaultDom = crate::dom::memory::MemoryDom;
#[cfg(target_arch = "wasm32")]
pub type DefaultDom = crate::dom::web::WebDom;

/// A document, its global dispatcher and the caches that go with them.
///
/// Components created from the same context share its global events, key cache and directive registry.
/// Create one per test, or use [`Context::global`].
pub struct Context<D: Dom> {
	dom: D,
	scheduler: Rc<dyn Scheduler>,
	dispatcher: Rc<Dispatcher>,
	router: Router,
	directives: DirectiveRegistry,
	keys: RefCell<HashMap<String, D::Node>>,
	components: ChildCache<D>,
	next_component: Cell<usize>,
}

impl<D: Dom> fmt::Debug for Context<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context")
			.field("dispatcher", &self.dispatcher)
			.field("directives", &self.directives)
			.field("keys", &self.keys.borrow().len())
			.finish_non_exhaustive()
	}
}

impl<D: Dom> Context<D> {
	#[must_use]
	pub fn new(dom: D, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
		Self::with_router(dom, scheduler, RouterOptions::default())
	}

	#[must_use]
	pub fn with_router(dom: D, scheduler: Rc<dyn Scheduler>, router: RouterOptions) -> Rc<Self> {
		let dispatcher = Rc::new(Dispatcher::new(scheduler.clone()));
		Rc::new(Self {
			dom,
			router: Router::new(dispatcher.clone(), router),
			dispatcher,
			scheduler,
			directives: DirectiveRegistry::default(),
			keys: RefCell::default(),
			components: ChildCache::default(),
			next_component: Cell::new(0),
		})
	}

	pub fn dom(&self) -> &D {
		&self.dom
	}

	pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
		&self.scheduler
	}

	/// The global dispatcher.
	pub fn dispatcher(&self) -> &Rc<Dispatcher> {
		&self.dispatcher
	}

	pub fn directives(&self) -> &DirectiveRegistry {
		&self.directives
	}

	pub fn router(&self) -> &Router {
		&self.router
	}

	pub fn run(&self, event: &str, args: &[Value]) -> DispatchResult {
		self.dispatcher.run(event, args)
	}

	pub fn on(&self, event: &str, handler: impl Fn(&Invocation<'_>) + 'static, options: SubscribeOptions) -> SubscriptionId {
		self.dispatcher.on(event, handler, options)
	}

	pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
		self.dispatcher.off(event, id)
	}

	pub fn route(&self, url: &str) -> RouteResult {
		self.router.route(url)
	}

	/// Reconciles the children of `parent` against `vdom`, outside of any component.
	///
	/// Nested components met this way are cached on the context.
	pub fn render(self: &Rc<Self>, parent: &D::Node, vdom: impl Into<Vdom>) {
		if let Vdom::Nodes(nodes) = vdom.into() {
			let namespace = self.dom.namespace(parent);
			Differ::new(self, &self.components).update_children(parent, &nodes, namespace);
		}
	}

	pub(crate) fn next_component_id(&self) -> usize {
		let id = self.next_component.get();
		self.next_component.set(id + 1);
		id
	}

	pub(crate) fn keys(&self) -> &RefCell<HashMap<String, D::Node>> {
		&self.keys
	}
}

thread_local! {
	static GLOBAL: RefCell<Option<Rc<Context<DefaultDom>>>> = RefCell::new(None);
}

impl Context<DefaultDom> {
	/// The per-thread default context, created on first use.
	///
	/// Natively, it renders into a fresh [`MemoryDom`](crate::dom::memory::MemoryDom) and schedules on a
	/// [`LocalScheduler`](crate::scheduler::LocalScheduler) that only runs when driven. Use [`Context::set_global`] to drive it yourself.
	#[must_use]
	pub fn global() -> Rc<Self> {
		GLOBAL.with(|global| global.borrow_mut().get_or_insert_with(default_context).clone())
	}

	pub fn set_global(context: Rc<Self>) {
		GLOBAL.with(|global| *global.borrow_mut() = Some(context));
	}
}

#[cfg(not(target_arch = "wasm32"))]
fn default_context() -> Rc<Context<DefaultDom>> {
	Context::new(DefaultDom::new(), Rc::new(crate::scheduler::LocalScheduler::new()))
}

#[cfg(target_arch = "wasm32")]
fn default_context() -> Rc<Context<DefaultDom>> {
	Context::new(DefaultDom::new(), Rc::new(crate::scheduler::WebScheduler::new()))
}
