//! The [`TaskRuntimeRef`] seam, a configurable [`ThreadPoolRuntime`] and (with the
//! `global_task_runtime` feature) a process-wide `GlobalTaskRuntime`.

use core::num::NonZeroUsize;
use std::thread;

mod a_task_pool;
mod thread_pool;

pub use thread_pool::{ThreadPoolBuilder, ThreadPoolRuntime};

#[cfg(feature = "global_task_runtime")]
mod global;
#[cfg(feature = "global_task_runtime")]
pub use global::GlobalTaskRuntime;

/// Trait for handles that let cache slots run work on a specific runtime (instance).
///
/// # Logic
///
/// [`spawn_detached`](`TaskRuntimeRef::spawn_detached`) **must not** run `f` on the calling
/// thread before returning. Callers rely on this to never block on their own callbacks.
///
/// The runtime **should** run every submitted task eventually, unless it is being shut down.
pub trait TaskRuntimeRef: Send + Sync + Clone {
	/// Submits `f` to run off the calling thread.
	///
	/// Panics inside `f` **should** be contained and reported by the runtime.
	fn spawn_detached(&self, f: impl 'static + Send + FnOnce());

	/// Whether the current thread is a latency-sensitive context (e.g. a UI thread),
	/// where blocking calls are worth a diagnostic.
	///
	/// This is purely advisory and **must not** change the behaviour of callers.
	///
	/// Defaults to [`latency::is_latency_sensitive`](`crate::latency::is_latency_sensitive`).
	fn is_latency_sensitive(&self) -> bool {
		crate::latency::is_latency_sensitive()
	}
}

fn default_parallelism() -> usize {
	thread::available_parallelism()
		.map_or(4, NonZeroUsize::get)
		.max(2)
}
