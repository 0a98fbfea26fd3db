//! Deferred execution: spawned futures, timers and animation frames.
//!
//! Everything here is single-threaded. [`LocalScheduler`] runs on a virtual clock that only moves when told to,
//! which makes asynchronous actions and debounced subscriptions deterministic in tests.

use core::{
	cell::{Cell, RefCell},
	fmt,
	future::Future,
	time::Duration,
};
use futures::{
	channel::oneshot,
	executor::{LocalPool, LocalSpawner},
	future::LocalBoxFuture,
	task::LocalSpawnExt,
};
use std::collections::BTreeMap;
use tracing::{error, trace};

pub type TimerId = u64;

pub trait Scheduler {
	/// Runs `future` to completion on the current thread, interleaved with other work.
	fn spawn(&self, future: LocalBoxFuture<'static, ()>);
	fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;
	/// Cancels a pending timer. Unknown or already fired ids are ignored.
	fn clear_timeout(&self, id: TimerId);
	/// Runs `callback` before the next frame is painted.
	fn request_frame(&self, callback: Box<dyn FnOnce()>);
}

/// Resolves after `delay` has elapsed on `scheduler`'s clock.
pub fn sleep(scheduler: &dyn Scheduler, delay: Duration) -> impl Future<Output = ()> + 'static {
	let (sender, receiver) = oneshot::channel::<()>();
	scheduler.set_timeout(
		delay,
		Box::new(move || {
			sender.send(()).ok();
		}),
	);
	async move {
		receiver.await.ok();
	}
}

/// A deterministic scheduler backed by a [`LocalPool`].
///
/// Spawned futures only make progress inside [`run_until_stalled`](`LocalScheduler::run_until_stalled`),
/// timers only fire inside [`advance`](`LocalScheduler::advance`) and frames only inside [`run_frames`](`LocalScheduler::run_frames`).
pub struct LocalScheduler {
	pool: RefCell<LocalPool>,
	spawner: LocalSpawner,
	now: Cell<Duration>,
	next_timer: Cell<TimerId>,
	timers: RefCell<BTreeMap<(Duration, TimerId), Box<dyn FnOnce()>>>,
	frames: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl Default for LocalScheduler {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for LocalScheduler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LocalScheduler")
			.field("now", &self.now.get())
			.field("timers", &self.timers.borrow().len())
			.field("frames", &self.frames.borrow().len())
			.finish_non_exhaustive()
	}
}

impl LocalScheduler {
	#[must_use]
	pub fn new() -> Self {
		let pool = LocalPool::new();
		let spawner = pool.spawner();
		Self {
			pool: RefCell::new(pool),
			spawner,
			now: Cell::new(Duration::ZERO),
			next_timer: Cell::new(1),
			timers: RefCell::default(),
			frames: RefCell::default(),
		}
	}

	/// Time elapsed on the virtual clock.
	#[must_use]
	pub fn now(&self) -> Duration {
		self.now.get()
	}

	/// Polls spawned futures until none of them can make progress.
	pub fn run_until_stalled(&self) {
		match self.pool.try_borrow_mut() {
			Ok(mut pool) => pool.run_until_stalled(),
			Err(_) => trace!("Pool is already running. Skipping nested run."),
		}
	}

	/// Moves the clock forward by `duration`, firing due timers in order and running futures in between.
	pub fn advance(&self, duration: Duration) {
		let target = self.now.get() + duration;
		loop {
			self.run_until_stalled();
			let due = {
				let mut timers = self.timers.borrow_mut();
				match timers.keys().next().copied() {
					Some(key) if key.0 <= target => timers.remove(&key).map(|callback| (key.0, callback)),
					_ => None,
				}
			};
			match due {
				Some((at, callback)) => {
					self.now.set(at);
					callback();
				}
				None => break,
			}
		}
		self.now.set(target);
		self.run_until_stalled();
	}

	/// Runs all currently requested frame callbacks, then pending futures.
	///
	/// Returns the number of callbacks run.
	pub fn run_frames(&self) -> usize {
		let frames = self.frames.take();
		let count = frames.len();
		for frame in frames {
			frame();
		}
		self.run_until_stalled();
		count
	}

	#[must_use]
	pub fn pending_timers(&self) -> usize {
		self.timers.borrow().len()
	}
}

impl Scheduler for LocalScheduler {
	fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
		if let Err(error) = self.spawner.spawn_local(future) {
			error!("Failed to spawn future: {}", error);
		}
	}

	fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
		let id = self.next_timer.get();
		self.next_timer.set(id + 1);
		self.timers.borrow_mut().insert((self.now.get() + delay, id), callback);
		id
	}

	fn clear_timeout(&self, id: TimerId) {
		self.timers.borrow_mut().retain(|&(_, timer), _| timer != id);
	}

	fn request_frame(&self, callback: Box<dyn FnOnce()>) {
		self.frames.borrow_mut().push(callback);
	}
}

#[cfg(target_arch = "wasm32")]
pub use web::WebScheduler;

#[cfg(target_arch = "wasm32")]
mod web {
	use super::{Scheduler, TimerId};
	use core::time::Duration;
	use futures::future::LocalBoxFuture;
	use std::convert::TryFrom;
	use tracing::error;
	use wasm_bindgen::{closure::Closure, JsCast, UnwrapThrowExt};

	/// Schedules onto the browser's microtask queue, `setTimeout` and `requestAnimationFrame`.
	#[derive(Debug)]
	pub struct WebScheduler {
		window: web_sys::Window,
	}

	impl WebScheduler {
		#[must_use]
		pub fn new() -> Self {
			Self {
				window: web_sys::window().expect_throw("cambium: No `window` found."),
			}
		}
	}

	impl Default for WebScheduler {
		fn default() -> Self {
			Self::new()
		}
	}

	impl Scheduler for WebScheduler {
		fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
			wasm_bindgen_futures::spawn_local(future);
		}

		fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
			let callback = Closure::once_into_js(callback);
			let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
			match self.window.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis) {
				Ok(handle) => TimerId::from(handle.unsigned_abs()),
				Err(error) => {
					error!("`setTimeout` failed: {:?}", error);
					0
				}
			}
		}

		fn clear_timeout(&self, id: TimerId) {
			if let Ok(handle) = i32::try_from(id) {
				self.window.clear_timeout_with_handle(handle);
			}
		}

		fn request_frame(&self, callback: Box<dyn FnOnce()>) {
			let callback = Closure::once_into_js(callback);
			if let Err(error) = self.window.request_animation_frame(callback.unchecked_ref()) {
				error!("`requestAnimationFrame` failed: {:?}", error);
			}
		}
	}
}
