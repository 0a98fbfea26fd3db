use cambium::{
	dom::memory::{MemNode, MemoryDom},
	h, props,
	scheduler::LocalScheduler,
	Component, ComponentRef, Context, MountOptions, Value,
};
use std::{cell::Cell, rc::Rc};
use tracing_subscriber::EnvFilter;

fn setup() -> (Rc<Context<MemoryDom>>, MemNode) {
	tracing_subscriber::fmt().with_test_writer().with_env_filter(EnvFilter::from_default_env()).try_init().ok();
	let dom = MemoryDom::new();
	let body = dom.body();
	(Context::new(dom, Rc::new(LocalScheduler::new())), body)
}

/// Renders its `label` prop, counting how often it is created and unloaded.
fn item(context: &Rc<Context<MemoryDom>>, created: &Rc<Cell<usize>>, unloaded: &Rc<Cell<usize>>) -> Component<String, MemoryDom> {
	created.set(created.get() + 1);
	let unloaded = unloaded.clone();
	Component::with_context(context, String::new())
		.view(|label: &String| h("b", (), label.clone()))
		.action("#reset", |_: &String, _| Some("reset".to_owned()))
		.on_mounted(|props, _, _| props.value("label").map(Value::to_text))
		.on_unload(move |_| unloaded.set(unloaded.get() + 1))
}

struct Fixture {
	context: Rc<Context<MemoryDom>>,
	body: MemNode,
	created: Rc<Cell<usize>>,
	unloaded: Rc<Cell<usize>>,
	list: Component<Vec<(String, String)>, MemoryDom>,
}

/// A list of `(id, label)` pairs rendered as nested items.
fn fixture(keyed: bool) -> Fixture {
	let (context, body) = setup();
	let created = Rc::new(Cell::new(0));
	let unloaded = Rc::new(Cell::new(0));
	let entry = {
		let (created, unloaded) = (created.clone(), unloaded.clone());
		ComponentRef::new("item", move |context: &Rc<Context<MemoryDom>>| item(context, &created, &unloaded))
	};

	let list = Component::with_context(&context, vec![("a".to_owned(), "A".to_owned()), ("b".to_owned(), "B".to_owned())])
		.view(move |entries: &Vec<(String, String)>| {
			let items: Vec<_> = entries
				.iter()
				.map(|(id, label)| {
					let mut props = props! { "label" => label.as_str(), "as" => "li" };
					if keyed {
						props.insert("id", id.as_str());
					}
					h(entry.clone(), props, ())
				})
				.collect();
			h("ul", (), items)
		})
		.action("set", |_: &Vec<(String, String)>, args: &[Value]| {
			Some(args.iter().map(|id| (id.to_text(), id.to_text().to_uppercase())).collect::<Vec<_>>())
		})
		.start(body.clone(), MountOptions::new())
		.unwrap();

	Fixture {
		context,
		body,
		created,
		unloaded,
		list,
	}
}

#[test]
fn nested_components_render_into_host_elements() {
	let fixture = fixture(false);
	assert_eq!(fixture.created.get(), 2);
	assert_eq!(
		fixture.context.dom().inner_html(&fixture.body),
		r#"<ul><li label="A"><b>A</b></li><li label="B"><b>B</b></li></ul>"#
	);
}

#[test]
fn instances_are_reused_across_parent_renders() {
	let fixture = fixture(false);
	let dom = fixture.context.dom();
	let ul = dom.children(&fixture.body)[0].clone();
	let hosts = dom.children(&ul);

	fixture.list.run("set", &[Value::from("x"), Value::from("y")]);
	assert_eq!(fixture.created.get(), 2);
	assert_eq!(dom.children(&ul), hosts);
	assert_eq!(dom.inner_html(&ul), r#"<li label="X"><b>X</b></li><li label="Y"><b>Y</b></li>"#);
}

#[test]
fn keyed_instances_follow_their_id() {
	let fixture = fixture(true);
	let dom = fixture.context.dom();
	let ul = dom.children(&fixture.body)[0].clone();
	let hosts = dom.children(&ul);

	fixture.list.run("set", &[Value::from("b"), Value::from("a"), Value::from("c")]);
	assert_eq!(fixture.created.get(), 3);
	let after = dom.children(&ul);
	assert_eq!(after[0], hosts[1]);
	assert_eq!(after[1], hosts[0]);
	assert_eq!(dom.inner_html(&after[2]), "<b>C</b>");
}

#[test]
fn global_events_reach_nested_components() {
	let fixture = fixture(false);
	let result = fixture.context.run("#reset", &[]);
	assert_eq!(result.subscriber_count, 2);
	assert_eq!(
		fixture.context.dom().inner_html(&fixture.body),
		r#"<ul><li label="A"><b>reset</b></li><li label="B"><b>reset</b></li></ul>"#
	);
}

#[test]
fn unmounting_the_parent_unmounts_its_children() {
	let fixture = fixture(false);
	fixture.list.unmount().unwrap();
	assert_eq!(fixture.unloaded.get(), 2);
	assert!(!fixture.context.run("#reset", &[]).matched);
}

#[test]
fn a_component_of_another_type_unmounts_the_previous_one() {
	let (context, body) = setup();
	let created = Rc::new(Cell::new(0));
	let unloaded = Rc::new(Cell::new(0));
	let first = {
		let (created, unloaded) = (created.clone(), unloaded.clone());
		ComponentRef::new("first", move |context: &Rc<Context<MemoryDom>>| item(context, &created, &unloaded))
	};
	let second = {
		let (created, unloaded) = (created.clone(), unloaded.clone());
		ComponentRef::new("second", move |context: &Rc<Context<MemoryDom>>| item(context, &created, &unloaded))
	};

	let page = Component::with_context(&context, false)
		.view(move |flipped: &bool| h(if *flipped { second.clone() } else { first.clone() }, props! { "label" => "x" }, ()))
		.action("flip", |flipped: &bool, _| Some(!flipped))
		.start(body.clone(), MountOptions::new())
		.unwrap();

	page.run("flip", &[]);
	assert_eq!(created.get(), 2);
	assert_eq!(unloaded.get(), 1);
	assert_eq!(context.run("#reset", &[]).subscriber_count, 1);
	assert_eq!(context.dom().inner_html(&body), "<section label=\"x\"><b>reset</b></section>");
}
