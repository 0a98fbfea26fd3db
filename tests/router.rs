use cambium::{
	dispatcher::{Invocation, SubscribeOptions},
	dom::memory::{MemNode, MemoryDom},
	h,
	router::{RouterOptions, NOT_FOUND, ROUTE_CHANGED},
	scheduler::LocalScheduler,
	Component, Context, MountOptions, Value,
};
use std::{cell::RefCell, rc::Rc};
use tracing_subscriber::EnvFilter;

fn setup() -> (Rc<Context<MemoryDom>>, MemNode) {
	tracing_subscriber::fmt().with_test_writer().with_env_filter(EnvFilter::from_default_env()).try_init().ok();
	let dom = MemoryDom::new();
	let body = dom.body();
	(Context::new(dom, Rc::new(LocalScheduler::new())), body)
}

type Log = Rc<RefCell<Vec<String>>>;

fn listen(context: &Context<MemoryDom>, log: &Log, events: &[&str]) {
	for event in events {
		let log = log.clone();
		context.on(
			event,
			move |invocation: &Invocation<'_>| {
				let args: Vec<String> = invocation.args.iter().map(Value::to_text).collect();
				log.borrow_mut().push(format!("{}({})", invocation.event, args.join(",")));
			},
			SubscribeOptions::default(),
		);
	}
}

#[test]
fn the_most_specific_handler_wins() {
	let (context, _) = setup();
	let log = Log::default();
	listen(&context, &log, &["#user", "#user/42", "/docs/api", ROUTE_CHANGED]);

	let result = context.route("#user/42/edit");
	assert_eq!(result.event.as_deref(), Some("#user/42"));
	assert_eq!(result.args, [Value::from("edit")]);

	let result = context.route("#user/7");
	assert_eq!(result.event.as_deref(), Some("#user"));
	assert_eq!(result.args, [Value::from("7")]);

	context.route("/docs/api/v2/intro");
	assert_eq!(
		*log.borrow(),
		[
			"#user/42(edit)",
			"//(#user/42,edit)",
			"#user(7)",
			"//(#user,7)",
			"/docs/api(v2,intro)",
			"//(/docs/api,v2,intro)",
		]
	);
}

#[test]
fn unknown_routes_are_announced() {
	let (context, _) = setup();
	let log = Log::default();
	listen(&context, &log, &[NOT_FOUND, ROUTE_CHANGED]);

	let result = context.route("#missing/1");
	assert_eq!(result.event, None);
	assert!(!result.suppressed);
	assert_eq!(*log.borrow(), ["///(#missing,1)", "//(#missing,1)"]);
}

#[test]
fn repeated_navigation_is_suppressed() {
	let (context, _) = setup();
	let log = Log::default();
	listen(&context, &log, &["#home"]);

	context.route("#home");
	assert!(context.route("#home").suppressed);
	context.route("#home/again");
	context.route("#home");
	assert_eq!(*log.borrow(), ["#home()", "#home(again)", "#home()"]);

	context.router().reset();
	assert!(!context.route("#home").suppressed);
}

#[test]
fn duplicates_can_be_allowed() {
	let dom = MemoryDom::new();
	let context = Context::with_router(
		dom,
		Rc::new(LocalScheduler::new()),
		RouterOptions {
			suppress_duplicates: false,
			..RouterOptions::default()
		},
	);
	let log = Log::default();
	listen(&context, &log, &["#home"]);

	context.route("#home");
	context.route("#home");
	assert_eq!(log.borrow().len(), 2);
}

#[test]
fn empty_and_plain_urls() {
	let (context, _) = setup();
	let log = Log::default();
	listen(&context, &log, &["#", "home"]);

	assert_eq!(context.route("").event.as_deref(), Some("#"));
	assert_eq!(context.route("home").event.as_deref(), Some("home"));
	assert_eq!(*log.borrow(), ["#()", "home()"]);
}

#[test]
fn components_refresh_on_their_route() {
	let (context, body) = setup();
	let renders = Rc::new(RefCell::new(0));
	Component::with_context(&context, "About")
		.view({
			let renders = renders.clone();
			move |title: &&str| {
				*renders.borrow_mut() += 1;
				h("h1", (), *title)
			}
		})
		.start(body.clone(), MountOptions::new().route("#about"))
		.unwrap();
	assert_eq!(*renders.borrow(), 1);

	assert_eq!(context.route("#about").event.as_deref(), Some("#about"));
	assert_eq!(*renders.borrow(), 2);
	assert_eq!(context.dom().inner_html(&body), "<h1>About</h1>");
}

#[test]
fn route_actions_receive_path_segments() {
	let (context, body) = setup();
	let page = Component::with_context(&context, String::new())
		.view(|page: &String| h("p", (), page.clone()))
		.action("#page", |_: &String, args: &[Value]| Some(args.iter().map(Value::to_text).collect::<Vec<_>>().join(" / ")))
		.start(body.clone(), MountOptions::new())
		.unwrap();

	context.route("#page/guide/setup");
	assert_eq!(*page.state().unwrap(), "guide / setup");
	assert_eq!(context.dom().inner_html(&body), "<p>guide / setup</p>");
}
