use cambium::{
	component::{ActionOptions, HistoryOptions, Init, Target},
	dispatcher::SubscribeOptions,
	dom::{
		memory::{MemNode, MemoryDom},
		Dom,
	},
	h, load, props,
	scheduler::{sleep, LocalScheduler},
	vdom::Prop,
	Component, Context, Error, MountOptions, Update, Value,
};
use std::{
	cell::{Cell, RefCell},
	collections::BTreeMap,
	rc::Rc,
	time::Duration,
};
use tracing_subscriber::EnvFilter;

fn setup() -> (Rc<Context<MemoryDom>>, Rc<LocalScheduler>, MemNode) {
	tracing_subscriber::fmt().with_test_writer().with_env_filter(EnvFilter::from_default_env()).try_init().ok();
	let scheduler = Rc::new(LocalScheduler::new());
	let dom = MemoryDom::new();
	let body = dom.body();
	(Context::new(dom, scheduler.clone()), scheduler, body)
}

type Log<T> = Rc<RefCell<Vec<T>>>;

/// A view that renders the state as text and logs each call.
fn logged<S: ToString>(log: &Log<String>) -> impl Fn(&S) -> cambium::Node {
	let log = log.clone();
	move |state: &S| {
		let text = state.to_string();
		log.borrow_mut().push(text.clone());
		h("p", (), text)
	}
}

fn text_of(state: &Value) -> String {
	state.to_text()
}

#[test]
fn counter() {
	let (context, _, body) = setup();
	let views = Log::default();
	let counter = Component::with_context(&context, 0)
		.view(logged::<i32>(&views))
		.action("+1", |count: &i32, _| Some(count + 1))
		.mount(body.clone(), MountOptions::new())
		.unwrap();
	assert!(views.borrow().is_empty());

	for _ in 0..3 {
		assert!(counter.run("+1", &[]).matched);
	}
	assert_eq!(*counter.state().unwrap(), 3);
	assert_eq!(*views.borrow(), ["1", "2", "3"]);
	assert_eq!(context.dom().inner_html(&body), "<p>3</p>");
}

#[test]
fn actions_without_a_new_state_do_not_render() {
	let (context, _, body) = setup();
	let views = Log::default();
	let component = Component::with_context(&context, 0)
		.view(logged::<i32>(&views))
		.action("nothing", |_: &i32, _| ())
		.action("none", |_: &i32, _| None::<i32>)
		.action("keep", |_: &i32, _| Update::Keep)
		.start(body, MountOptions::new())
		.unwrap();
	assert_eq!(*views.borrow(), ["0"]);

	for event in ["nothing", "none", "keep"] {
		assert!(component.run(event, &[]).matched);
	}
	assert_eq!(*views.borrow(), ["0"]);
}

#[test]
fn asynchronous_actions_render_when_they_resolve() {
	let (context, scheduler, body) = setup();
	let views = Log::default();
	let timer = scheduler.clone();
	let component = Component::with_context(&context, Value::from(-1))
		.view({
			let views = views.clone();
			move |state: &Value| {
				views.borrow_mut().push(text_of(state));
				h("p", (), text_of(state))
			}
		})
		.action("load", move |_: &Value, _| {
			let wait = sleep(&*timer, Duration::from_millis(10));
			Update::future(async move {
				wait.await;
				Update::Set(Value::from("xx"))
			})
		})
		.start(body.clone(), MountOptions::new())
		.unwrap();

	component.run("load", &[]);
	scheduler.run_until_stalled();
	assert_eq!(*views.borrow(), ["-1"]);

	scheduler.advance(Duration::from_millis(10));
	assert_eq!(*views.borrow(), ["-1", "xx"]);
	assert_eq!(context.dom().inner_html(&body), "<p>xx</p>");
}

#[test]
fn superseded_asynchronous_updates_are_dropped() {
	let (context, scheduler, body) = setup();
	let views = Log::default();
	let delayed = |scheduler: &Rc<LocalScheduler>, millis: u64, result: &'static str| {
		let scheduler = scheduler.clone();
		move |_: &String, _: &[Value]| {
			let wait = sleep(&*scheduler, Duration::from_millis(millis));
			Update::future(async move {
				wait.await;
				Update::Set(result.to_owned())
			})
		}
	};
	let component = Component::with_context(&context, String::from("initial"))
		.view(logged::<String>(&views))
		.action("slow", delayed(&scheduler, 20, "slow"))
		.action("fast", delayed(&scheduler, 5, "fast"))
		.start(body, MountOptions::new())
		.unwrap();

	component.run("slow", &[]);
	component.run("fast", &[]);
	scheduler.advance(Duration::from_millis(30));
	assert_eq!(*views.borrow(), ["initial", "fast"]);

	component.run("slow", &[]);
	component.set_state(Update::Set("sync".to_owned()));
	scheduler.advance(Duration::from_millis(30));
	assert_eq!(*component.state().unwrap(), "sync");
	assert_eq!(*views.borrow(), ["initial", "fast", "sync"]);
}

#[test]
fn streams_and_sequences_commit_every_state() {
	let (context, scheduler, body) = setup();
	let views = Log::default();
	let component = Component::with_context(&context, 0)
		.view(logged::<i32>(&views))
		.action("count", |_: &i32, _| Update::iter(vec![1, 2, 3]))
		.action("progress", |_: &i32, _| Update::stream(futures::stream::iter(vec![10, 20])))
		.start(body, MountOptions::new())
		.unwrap();

	component.run("count", &[]);
	assert_eq!(*views.borrow(), ["0", "1", "2", "3"]);

	component.run("progress", &[]);
	assert_eq!(views.borrow().len(), 4);
	scheduler.run_until_stalled();
	assert_eq!(*views.borrow(), ["0", "1", "2", "3", "10", "20"]);
}

#[test]
fn failing_actions_leave_the_state_alone() {
	let (context, _, body) = setup();
	let views = Log::default();
	let other = Rc::new(Cell::new(false));
	let component = Component::with_context(&context, 5)
		.view(logged::<i32>(&views))
		.action("fail", |_: &i32, _: &[Value]| -> anyhow::Result<Update<i32>> { Err(anyhow::anyhow!("nope")) })
		.start(body, MountOptions::new())
		.unwrap();
	component.on(
		"fail",
		{
			let other = other.clone();
			move |_| other.set(true)
		},
		SubscribeOptions::default(),
	);

	let result = component.run("fail", &[]);
	assert_eq!(result.subscriber_count, 2);
	assert!(other.get());
	assert_eq!(*component.state().unwrap(), 5);
	assert_eq!(*views.borrow(), ["5"]);
}

#[test]
fn history_steps_back_and_forth() {
	let (context, _, body) = setup();
	let component = Component::with_context(&context, 0)
		.view(|count: &i32| h("p", (), *count))
		.action("+1", |count: &i32, _| Some(count + 1))
		.start(body.clone(), MountOptions::new().history(HistoryOptions::default()))
		.unwrap();

	component.run("+1", &[]);
	component.run("+1", &[]);
	assert_eq!(*component.state().unwrap(), 2);

	component.run("history-prev", &[]);
	assert_eq!(*component.state().unwrap(), 1);
	assert_eq!(context.dom().inner_html(&body), "<p>1</p>");
	component.run("history-prev", &[]);
	component.run("history-prev", &[]);
	assert_eq!(*component.state().unwrap(), 0);

	component.run("history-next", &[]);
	assert_eq!(*component.state().unwrap(), 1);
	assert_eq!(context.dom().inner_html(&body), "<p>1</p>");
}

#[test]
fn action_options() {
	let (context, _, body) = setup();
	let views = Log::default();
	let committed = Log::default();
	let component = Component::with_context(&context, 0)
		.view(logged::<i32>(&views))
		.action_with("once", |count: &i32, _| Some(count + 100), ActionOptions::new().once())
		.action_with("quiet", |count: &i32, _| Some(count + 1), ActionOptions::new().render(false))
		.action_with(
			"noted",
			|count: &i32, _| Some(count + 1),
			ActionOptions::new().callback({
				let committed = committed.clone();
				move |count: &i32| committed.borrow_mut().push(count.to_string())
			}),
		)
		.start(body, MountOptions::new())
		.unwrap();

	component.run("once", &[]);
	assert!(!component.run("once", &[]).matched);
	assert_eq!(*component.state().unwrap(), 100);

	component.run("quiet", &[]);
	assert_eq!(*component.state().unwrap(), 101);
	assert_eq!(*views.borrow(), ["0", "100"]);

	component.run("noted", &[]);
	assert_eq!(*views.borrow(), ["0", "100", "102"]);
	assert_eq!(*committed.borrow(), ["102"]);
}

#[test]
fn delayed_actions_are_debounced() {
	let (context, scheduler, body) = setup();
	let views = Log::default();
	let component = Component::with_context(&context, 0)
		.view(logged::<i32>(&views))
		.action_with(
			"set",
			|_: &i32, args: &[Value]| args.first().and_then(Value::as_f64).map(|n| n as i32),
			ActionOptions::new().delay(Duration::from_millis(50)),
		)
		.start(body, MountOptions::new())
		.unwrap();

	for n in 1..=3 {
		component.run("set", &[Value::from(n)]);
		scheduler.advance(Duration::from_millis(10));
	}
	assert_eq!(*component.state().unwrap(), 0);

	scheduler.advance(Duration::from_millis(50));
	assert_eq!(*component.state().unwrap(), 3);
	assert_eq!(*views.borrow(), ["0", "3"]);
}

#[test]
fn lifecycle_hooks() {
	let (context, _, body) = setup();
	let rendered = Rc::new(Cell::new(0));
	let unloaded = Rc::new(Cell::new(None));
	let component = Component::with_context(&context, 1)
		.view(|count: &i32| h("p", (), *count))
		.on_mounted(|props, _, count| props.value("start").and_then(Value::as_f64).map(|start| start as i32 + count))
		.on_rendered({
			let rendered = rendered.clone();
			move |_| rendered.set(rendered.get() + 1)
		})
		.on_unload({
			let unloaded = unloaded.clone();
			move |count: &i32| unloaded.set(Some(*count))
		});

	component.start_with(body.clone(), MountOptions::new(), &props! { "start" => 41 }, &[]).unwrap();
	assert_eq!(*component.state().unwrap(), 42);
	assert_eq!(rendered.get(), 2);
	assert_eq!(context.dom().inner_html(&body), "<p>42</p>");

	component.unmount().unwrap();
	assert_eq!(unloaded.get(), Some(42));
	assert!(!component.is_mounted());
	assert!(matches!(component.unmount(), Err(Error::NotMounted)));
}

#[test]
fn mounting_twice_or_into_nothing_fails() {
	let (context, _, body) = setup();
	let component = Component::with_context(&context, 0).mount(body.clone(), MountOptions::new()).unwrap();
	assert!(matches!(component.mount(body, MountOptions::new()), Err(Error::AlreadyMounted)));

	let lost = Component::with_context(&context, 0);
	assert!(matches!(lost.mount(Target::id("missing"), MountOptions::new()), Err(Error::TargetNotFound(id)) if id == "missing"));
	assert!(!lost.is_mounted());
}

#[test]
fn mounting_by_id() {
	let (context, _, body) = setup();
	context.render(&body, h("main", props! { "id" => "app" }, ()));
	Component::with_context(&context, "found")
		.view(|text: &&str| h("p", (), *text))
		.start(Target::id("app"), MountOptions::new())
		.unwrap();
	assert_eq!(context.dom().inner_html(&body), r#"<main id="app"><p>found</p></main>"#);
}

#[test]
fn deferred_initial_states() {
	let (context, scheduler, body) = setup();
	let lazy = Component::from_init(&context, Init::lazy(|| 5)).mount(Target::None, MountOptions::new()).unwrap();
	assert_eq!(*lazy.state().unwrap(), 5);

	let views = Log::default();
	let pending = Component::from_init(&context, Init::future(async { 7 }))
		.view(logged::<i32>(&views))
		.action("+1", |count: &i32, _| Some(count + 1))
		.start(body, MountOptions::new())
		.unwrap();
	assert!(pending.state().is_none());
	pending.run("+1", &[]);
	assert!(views.borrow().is_empty());

	scheduler.run_until_stalled();
	assert_eq!(*pending.state().unwrap(), 7);
	assert_eq!(*views.borrow(), ["7"]);
}

#[test]
fn event_directives_run_actions_with_the_event() {
	let (context, _, body) = setup();
	let component = Component::with_context(&context, 0)
		.view(|count: &i32| {
			vec![
				h("button", props! { "$onclick" => "add", "id" => "one" }, "one"),
				h("button", props! { "$onclick" => Prop::tuple(vec![Prop::from("add"), Prop::from(10)]), "id" => "ten" }, "ten"),
				h("button", props! { "$onclick" => Prop::transform(|count: &i32, _: &[Value]| Update::Set(count * 2)) }, "double"),
				h("p", (), *count),
			]
		})
		.action("add", |count: &i32, args: &[Value]| {
			assert!(args.last().and_then(Value::as_event).is_some());
			let by = if args.len() > 1 { args[0].as_f64().unwrap_or_default() as i32 } else { 1 };
			Some(count + by)
		})
		.start(body.clone(), MountOptions::new())
		.unwrap();

	let dom = context.dom();
	let buttons = dom.children(&body);
	assert_eq!(dom.user_click(&buttons[0]), 1);
	dom.user_click(&buttons[1]);
	dom.user_click(&buttons[2]);
	assert_eq!(*component.state().unwrap(), 22);
	assert!(dom.inner_html(&body).ends_with("<p>22</p>"));
}

#[test]
fn bound_inputs_write_back() {
	let (context, _, body) = setup();
	let form = Component::with_context(&context, Value::Map(BTreeMap::new()))
		.view(|state: &Value| {
			vec![
				h("input", props! { "$bind" => "name" }, ()),
				h("input", props! { "type" => "checkbox", "$bind" => "subscribed" }, ()),
				h("p", (), state.get("name").map(Value::to_text).unwrap_or_default()),
			]
		})
		.bindable()
		.start(body.clone(), MountOptions::new())
		.unwrap();

	let dom = context.dom();
	let inputs = dom.children(&body);
	dom.user_type(&inputs[0], "Ada");
	dom.user_click(&inputs[1]);

	let state = form.state().unwrap();
	assert_eq!(state.get("name"), Some(&Value::from("Ada")));
	assert_eq!(state.get("subscribed"), Some(&Value::from(true)));
	assert_eq!(dom.property(&inputs[0], "value"), Some(Value::from("Ada")));
	assert!(dom.inner_html(&body).ends_with("<p>Ada</p>"));
}

#[test]
fn refresh_and_aliases() {
	let (context, _, body) = setup();
	let views = Log::default();
	let component = Component::with_context(&context, 0)
		.view(logged::<i32>(&views))
		.action("inc, increment,plus", |count: &i32, _| Some(count + 1))
		.start(body, MountOptions::new())
		.unwrap();

	for event in ["inc", "increment", "plus"] {
		component.run(event, &[]);
	}
	assert_eq!(*component.state().unwrap(), 3);

	component.run(".", &[]);
	assert_eq!(*views.borrow(), ["0", "1", "2", "3", "3"]);
}

#[test]
fn starting_on_existing_markup() {
	let (context, _, body) = setup();
	context.render(&body, h("my-widget", props! { "label" => "Hi" }, h("b", (), "old")));
	let dom = context.dom();
	let host = dom.children(&body)[0].clone();

	let widget = Component::with_context(&context, String::new())
		.view(|label: &String| h("span", (), label.clone()))
		.on_mounted(|props, children, _| Some(format!("{} ({} children)", props.value("label").map(Value::to_text).unwrap_or_default(), children.len())));
	load::start_on_element(&widget, host.clone(), MountOptions::new()).unwrap();

	assert_eq!(dom.inner_html(&host), "<span>Hi (1 children)</span>");
}

#[test]
fn unknown_directives_are_announced_globally() {
	let (context, _, body) = setup();
	let seen = Rc::new(RefCell::new(None));
	context.on(
		"$",
		{
			let seen = seen.clone();
			move |invocation| *seen.borrow_mut() = invocation.args.first().cloned()
		},
		SubscribeOptions::default(),
	);

	let other = Component::with_context(&context, ());
	let tooltip = Component::with_context(&context, ())
		.view(|()| h("div", props! { "$tooltip" => "hello", "class" => "tip" }, ()))
		.start(body.clone(), MountOptions::new())
		.unwrap();
	assert_ne!(other.id(), tooltip.id());

	let seen = seen.borrow();
	let directive = seen.as_ref().unwrap();
	assert_eq!(directive.get("key"), Some(&Value::from("$tooltip")));
	assert_eq!(directive.get("tag"), Some(&Value::from("div")));
	assert_eq!(directive.get("value"), Some(&Value::from("hello")));
	assert_eq!(directive.get("props").and_then(|props| props.get("class")), Some(&Value::from("tip")));
	assert_eq!(directive.get("component"), Some(&Value::from(tooltip.id())));
	assert_eq!(context.dom().inner_html(&body), r#"<div class="tip"></div>"#);
}

#[test]
fn started_components_outlive_their_handle() {
	let (context, _, body) = setup();
	Component::with_context(&context, 0)
		.view(|count: &i32| h("p", (), *count))
		.action("#inc", |count: &i32, _| Some(count + 1))
		.start(body.clone(), MountOptions::new())
		.unwrap();

	let result = context.run("#inc", &[]);
	assert!(result.matched);
	assert_eq!(result.subscriber_count, 1);
	assert_eq!(context.dom().inner_html(&body), "<p>1</p>");
}

/// Counts drops of whatever owns it.
struct DropCounter(Rc<Cell<usize>>);

impl Drop for DropCounter {
	fn drop(&mut self) {
		self.0.set(self.0.get() + 1);
	}
}

#[test]
fn unmounting_releases_the_instance() {
	let (context, _, body) = setup();
	let dropped = Rc::new(Cell::new(0));
	let guard = DropCounter(dropped.clone());
	let counter = Component::with_context(&context, 0)
		.view(move |count: &i32| {
			let _ = &guard;
			h("p", (), *count)
		})
		.action("#inc", |count: &i32, _| Some(count + 1))
		.start(body.clone(), MountOptions::new())
		.unwrap();

	counter.unmount().unwrap();
	assert_eq!(dropped.get(), 0);
	drop(counter);
	assert_eq!(dropped.get(), 1);
	assert!(!context.run("#inc", &[]).matched);
}
