use std::{
	any::Any,
	fmt::{self, Debug, Formatter},
	io,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	thread,
	time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{error, trace};

type Task = Box<dyn 'static + Send + FnOnce()>;

/// Runs tasks on a tokio runtime's blocking thread pool and counts them for settling.
///
/// Worker threads are spawned on demand, up to `max_workers`. Surplus tasks queue in order.
pub(crate) struct ATaskPool {
	thread_name: String,
	handle: Handle,
	/// Taken on shutdown.
	runtime: Mutex<Option<Runtime>>,
	/// Submitted but not yet finished.
	pending: Mutex<usize>,
	settled: Condvar,
}

impl Debug for ATaskPool {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ATaskPool")
			.field("thread_name", &self.thread_name)
			.field("pending", &self.pending.try_lock().map(|pending| *pending))
			.field("shut_down", &self.runtime.try_lock().map(|runtime| runtime.is_none()))
			.finish_non_exhaustive()
	}
}

impl ATaskPool {
	pub(crate) fn new(thread_name: String, max_workers: usize) -> io::Result<Self> {
		let runtime = Builder::new_current_thread()
			.max_blocking_threads(max_workers.max(1))
			.thread_name_fn({
				let thread_name = thread_name.clone();
				let spawned = AtomicUsize::new(0);
				move || format!("{thread_name}-{}", spawned.fetch_add(1, Ordering::Relaxed) + 1)
			})
			.build()?;
		Ok(Self {
			thread_name,
			handle: runtime.handle().clone(),
			runtime: Mutex::new(Some(runtime)),
			pending: Mutex::new(0),
			settled: Condvar::new(),
		})
	}

	pub(crate) fn submit(self: &Arc<Self>, task: Task) {
		*self.pending.lock() += 1;
		let pool = Arc::clone(self);
		drop(self.handle.spawn_blocking(move || pool.run(task)));
	}

	fn run(&self, task: Task) {
		if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
			error!(
				pool = %self.thread_name,
				panic = panic_message(&*panic),
				"Task panicked."
			);
		}

		let mut pending = self.pending.lock();
		*pending -= 1;
		if *pending == 0 {
			self.settled.notify_all();
		}
	}

	/// Stops the runtime once every submitted task has finished.
	///
	/// The wait happens on a separate thread, so this is safe to call from inside a task.
	pub(crate) fn shut_down(self: &Arc<Self>) {
		let Some(runtime) = self.runtime.lock().take() else {
			return;
		};
		let pool = Arc::clone(self);
		let reaper = thread::Builder::new()
			.name(format!("{}-shutdown", self.thread_name))
			.spawn(move || {
				pool.settle();
				drop(runtime);
				trace!(pool = %pool.thread_name, "Shut down.");
			});
		if let Err(error) = reaper {
			// The runtime was dropped along with the closure, cancelling queued tasks.
			error!(pool = %self.thread_name, %error, "Failed to spawn the shutdown thread.");
		}
	}

	pub(crate) fn settle(&self) {
		let mut pending = self.pending.lock();
		while *pending > 0 {
			self.settled.wait(&mut pending);
		}
	}

	pub(crate) fn settle_for(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut pending = self.pending.lock();
		while *pending > 0 {
			if self.settled.wait_until(&mut pending, deadline).timed_out() {
				return *pending == 0;
			}
		}
		true
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
	payload
		.downcast_ref::<&'static str>()
		.copied()
		.or_else(|| payload.downcast_ref::<String>().map(String::as_str))
		.unwrap_or("(non-string panic payload)")
}
