use std::{
	fmt::{self, Debug, Formatter},
	io,
	sync::Arc,
	time::Duration,
};

use super::{a_task_pool::ATaskPool, default_parallelism, TaskRuntimeRef};
use crate::latency;

type Classifier = Arc<dyn 'static + Send + Sync + Fn() -> bool>;

/// A [`TaskRuntimeRef`] backed by the blocking thread pool of a dedicated tokio runtime.
///
/// Cloning the handle shares the pool. Once the last handle is dropped, the queued tasks
/// still run before the runtime is shut down.
///
/// # Logic
///
/// Tasks run in submission order as far as workers are available, but **may** overlap.  
/// A panicking task is logged and doesn't take its worker down.
#[derive(Clone)]
pub struct ThreadPoolRuntime {
	pool: Arc<PoolOwner>,
	classifier: Option<Classifier>,
}

struct PoolOwner(Arc<ATaskPool>);

impl Drop for PoolOwner {
	fn drop(&mut self) {
		self.0.shut_down();
	}
}

impl Debug for ThreadPoolRuntime {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ThreadPoolRuntime")
			.field("pool", &self.pool.0)
			.field("classifier", &self.classifier.as_ref().map(|_| "(custom)"))
			.finish()
	}
}

impl Default for ThreadPoolRuntime {
	fn default() -> Self {
		Self::new()
	}
}

impl ThreadPoolRuntime {
	/// Creates a pool with default settings.
	///
	/// See [`ThreadPoolBuilder`] for what those are.
	///
	/// # Panics
	///
	/// Iff the underlying runtime can't be created. Use [`ThreadPoolBuilder::build`] to handle that.
	#[must_use]
	pub fn new() -> Self {
		Self::builder()
			.build()
			.expect("failed to create the task runtime")
	}

	/// Starts configuring a pool.
	#[must_use]
	pub fn builder() -> ThreadPoolBuilder {
		ThreadPoolBuilder::default()
	}

	/// Blocks until no task is queued or running.
	///
	/// # Threading
	///
	/// Deadlocks when called from one of this pool's own tasks.
	pub fn settle(&self) {
		self.pool.0.settle();
	}

	/// Like [`settle`](`ThreadPoolRuntime::settle`), but gives up after `timeout`.
	///
	/// **Returns** whether the pool settled.
	#[must_use]
	pub fn settle_for(&self, timeout: Duration) -> bool {
		self.pool.0.settle_for(timeout)
	}
}

impl TaskRuntimeRef for ThreadPoolRuntime {
	fn spawn_detached(&self, f: impl 'static + Send + FnOnce()) {
		self.pool.0.submit(Box::new(f));
	}

	fn is_latency_sensitive(&self) -> bool {
		self.classifier
			.as_ref()
			.map_or_else(latency::is_latency_sensitive, |classify| classify())
	}
}

/// Configures a [`ThreadPoolRuntime`].
///
/// Defaults: at most as many workers as [`available_parallelism`](`std::thread::available_parallelism`)
/// (but at least two), threads named `stamen-pool-{n}`, and thread classification through
/// [`latency::is_latency_sensitive`].
#[must_use]
pub struct ThreadPoolBuilder {
	max_workers: usize,
	thread_name: String,
	classifier: Option<Classifier>,
}

impl Debug for ThreadPoolBuilder {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ThreadPoolBuilder")
			.field("max_workers", &self.max_workers)
			.field("thread_name", &self.thread_name)
			.field("classifier", &self.classifier.as_ref().map(|_| "(custom)"))
			.finish()
	}
}

impl Default for ThreadPoolBuilder {
	fn default() -> Self {
		Self {
			max_workers: default_parallelism(),
			thread_name: "stamen-pool".to_owned(),
			classifier: None,
		}
	}
}

impl ThreadPoolBuilder {
	/// Caps the number of worker threads. `0` is treated as `1`.
	pub fn max_workers(mut self, max_workers: usize) -> Self {
		self.max_workers = max_workers.max(1);
		self
	}

	/// Sets the worker thread name prefix. Workers are suffixed with `-{n}`.
	pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
		self.thread_name = prefix.into();
		self
	}

	/// Replaces the ambient thread classification used by
	/// [`TaskRuntimeRef::is_latency_sensitive`].
	pub fn classify_with(mut self, classify: impl 'static + Send + Sync + Fn() -> bool) -> Self {
		self.classifier = Some(Arc::new(classify));
		self
	}

	/// Creates the pool. Workers are only spawned once tasks arrive.
	///
	/// # Errors
	///
	/// Iff the tokio runtime can't be created.
	pub fn build(self) -> io::Result<ThreadPoolRuntime> {
		Ok(ThreadPoolRuntime {
			pool: Arc::new(PoolOwner(Arc::new(ATaskPool::new(
				self.thread_name,
				self.max_workers,
			)?))),
			classifier: self.classifier,
		})
	}
}
