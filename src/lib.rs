//! A state → view → update component runtime with a keyed DOM reconciler.
//!
//! Components hold a state, render it through a view function into a [`Node`] tree, and replace it from named
//! actions dispatched by event handlers, timers or the [`Router`](router::Router).
//! The [`diff`](crate::diff) pass then patches the live document in place: keyed elements are moved rather than
//! recreated, and the [`patch`] module never overwrites what the user is currently interacting with
//! (focused values, selection, scroll and playback positions).
//!
//! Natively, everything renders into a [`MemoryDom`](dom::memory::MemoryDom) driven by a
//! [`LocalScheduler`](scheduler::LocalScheduler). On `wasm32`, the default is the browser document.
//!
//! ```
//! use cambium::{dom::memory::MemoryDom, h, props, scheduler::LocalScheduler, Component, Context, MountOptions};
//! use std::rc::Rc;
//!
//! let dom = MemoryDom::new();
//! let body = dom.body();
//! let context = Context::new(dom, Rc::new(LocalScheduler::new()));
//!
//! let counter = Component::with_context(&context, 0)
//! 	.view(|count: &i32| h("button", props! { "$onclick" => "+1" }, count.to_string()))
//! 	.action("+1", |count: &i32, _| Some(count + 1))
//! 	.start(body.clone(), MountOptions::new())
//! 	.unwrap();
//!
//! counter.run("+1", &[]);
//! assert_eq!(context.dom().inner_html(&body), "<button>1</button>");
//! ```

#![doc(html_root_url = "https://docs.rs/cambium/0.1.0")]
#![warn(clippy::pedantic)]

pub mod component;
pub mod context;
mod diff;
pub mod directive;
pub mod dispatcher;
pub mod dom;
pub mod error;
pub mod history;
pub mod load;
pub mod patch;
pub mod router;
pub mod scheduler;
pub mod value;
pub mod vdom;

pub use component::{Action, ActionOptions, Component, Init, MountOptions, Update};
pub use context::{Context, DefaultDom};
pub use error::{DomError, Error};
pub use value::{Event, Value};
pub use vdom::{fragment, h, ComponentRef, Node, Prop, Props, Vdom};
