use cambium::{
	component::{ActionOptions, Target},
	dispatcher::SubscribeOptions,
	dom::memory::{MemNode, MemoryDom},
	scheduler::LocalScheduler,
	Component, Context, MountOptions, Value,
};
use std::{
	cell::{Cell, RefCell},
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

fn counter(context: &Rc<Context<MemoryDom>>) -> Component<i32, MemoryDom> {
	Component::with_context(context, 0)
		.action("local", |count: &i32, _| Some(count + 1))
		.action("#global, @also-global", |count: &i32, _| Some(count + 10))
		.action_with("ping", |count: &i32, _| Some(count + 100), ActionOptions::new().global())
}

#[test]
fn once_subscribers_leave_before_running() {
	let (context, _, _) = setup();
	let calls = Rc::new(Cell::new(0));
	context.on(
		"ready",
		{
			let calls = calls.clone();
			move |_| calls.set(calls.get() + 1)
		},
		SubscribeOptions::once(),
	);

	let result = context.run("ready", &[]);
	assert!(result.matched);
	assert_eq!(result.subscriber_count, 1);
	assert_eq!(context.dispatcher().subscriber_count("ready"), 0);

	assert!(!context.run("ready", &[]).matched);
	assert_eq!(calls.get(), 1);
}

#[test]
fn local_actions_stay_local() {
	let (context, _, _) = setup();
	let component = counter(&context).mount(Target::None, MountOptions::new()).unwrap();

	assert!(!context.run("local", &[]).matched);
	assert_eq!(*component.state().unwrap(), 0);

	assert!(component.run("local", &[]).matched);
	assert!(context.run("#global", &[]).matched);
	assert!(context.run("@also-global", &[]).matched);
	assert!(context.run("ping", &[]).matched);
	assert_eq!(*component.state().unwrap(), 121);
}

#[test]
fn global_events_reach_every_component() {
	let (context, _, _) = setup();
	let first = counter(&context).mount(Target::None, MountOptions::new()).unwrap();
	let second = counter(&context).mount(Target::None, MountOptions::new()).unwrap();

	let result = first.run("#global", &[]);
	assert_eq!(result.subscriber_count, 2);
	assert_eq!(*first.state().unwrap(), 10);
	assert_eq!(*second.state().unwrap(), 10);

	first.run("local", &[]);
	assert_eq!(*second.state().unwrap(), 10);
}

#[test]
fn global_event_mounts_publish_every_action() {
	let (context, _, _) = setup();
	let component = counter(&context).mount(Target::None, MountOptions::new().global_event()).unwrap();
	assert!(context.run("local", &[]).matched);
	assert_eq!(*component.state().unwrap(), 1);
}

#[test]
fn unmounting_removes_every_subscription() {
	let (context, _, _) = setup();
	let component = counter(&context).mount(Target::None, MountOptions::new()).unwrap();
	let extra = Rc::new(Cell::new(0));
	component.on(
		"#extra",
		{
			let extra = extra.clone();
			move |_| extra.set(extra.get() + 1)
		},
		SubscribeOptions::default(),
	);
	assert_eq!(context.dispatcher().subscriber_count("#global"), 1);

	component.unmount().unwrap();
	for event in ["#global", "@also-global", "ping", "#extra"] {
		assert!(!context.run(event, &[]).matched, "{} is still subscribed", event);
	}
	assert!(!component.run("local", &[]).matched);
	assert!(!component.run(".", &[]).matched);
	assert!(context.dispatcher().is_empty());
	assert_eq!(extra.get(), 0);
	assert_eq!(*component.state().unwrap(), 0);
}

#[test]
fn unmounting_cancels_pending_debounces() {
	let (context, scheduler, _) = setup();
	let component = Component::with_context(&context, 0)
		.action_with("#later", |count: &i32, _| Some(count + 1), ActionOptions::new().delay(Duration::from_millis(10)))
		.mount(Target::None, MountOptions::new())
		.unwrap();

	component.run("#later", &[]);
	component.unmount().unwrap();
	scheduler.advance(Duration::from_millis(20));
	assert_eq!(*component.state().unwrap(), 0);
}

#[test]
fn off_removes_a_single_subscription() {
	let (context, _, _) = setup();
	let component = counter(&context).mount(Target::None, MountOptions::new()).unwrap();
	let id = component.on("local", |_| (), SubscribeOptions::default());
	assert_eq!(component.run("local", &[]).subscriber_count, 2);

	assert!(component.off("local", id));
	assert!(!component.off("local", id));
	assert_eq!(component.run("local", &[]).subscriber_count, 1);
}

#[test]
fn wildcards_receive_the_dispatched_name() {
	let (context, _, _) = setup();
	let seen = Rc::new(RefCell::new(Vec::new()));
	for pattern in ["#*", "#user*", "#user/profile"] {
		let seen = seen.clone();
		context.on(
			pattern,
			move |invocation| seen.borrow_mut().push(format!("{} <- {}", pattern, invocation.event)),
			SubscribeOptions::default(),
		);
	}

	let result = context.run("#user/profile", &[Value::from(1)]);
	assert_eq!(result.subscriber_count, 3);
	assert_eq!(
		*seen.borrow(),
		["#user/profile <- #user/profile", "#user* <- #user/profile", "#* <- #user/profile"]
	);
}

#[test]
fn handlers_may_dispatch_and_subscribe() {
	let (context, _, _) = setup();
	let order = Rc::new(RefCell::new(Vec::new()));
	let weak = Rc::downgrade(&context);
	context.on(
		"outer",
		{
			let order = order.clone();
			move |_| {
				order.borrow_mut().push("outer");
				let Some(context) = weak.upgrade() else { return };
				let order = order.clone();
				context.on("inner", move |_| order.borrow_mut().push("inner"), SubscribeOptions::once());
				context.run("inner", &[]);
			}
		},
		SubscribeOptions::default(),
	);

	context.run("outer", &[]);
	context.run("inner", &[]);
	assert_eq!(*order.borrow(), ["outer", "inner"]);
}
