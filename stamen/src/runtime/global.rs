use std::{
	sync::{Arc, OnceLock},
	time::Duration,
};

use super::{a_task_pool::ATaskPool, default_parallelism, TaskRuntimeRef};

static GLOBAL_TASK_POOL: OnceLock<Arc<ATaskPool>> = OnceLock::new();

fn global_task_pool() -> &'static Arc<ATaskPool> {
	GLOBAL_TASK_POOL.get_or_init(|| {
		Arc::new(
			ATaskPool::new("stamen-global".to_owned(), default_parallelism())
				.expect("failed to create the global task runtime"),
		)
	})
}

/// A plain [`TaskRuntimeRef`] implementation that represents a static, process-wide worker pool.
///
/// The pool is created on first use and never shut down.
///
/// # Panics
///
/// On first use, iff the underlying tokio runtime can't be created.
///
/// # Logic
///
/// Thread classification uses [`latency::is_latency_sensitive`](`crate::latency::is_latency_sensitive`).
///
/// Otherwise, it makes no additional guarantees over those specified in [`TaskRuntimeRef`]'s documentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalTaskRuntime;

impl GlobalTaskRuntime {
	/// Blocks until the global pool has no queued or running task.
	///
	/// Other threads may keep submitting tasks, so prefer a dedicated
	/// [`ThreadPoolRuntime`](`super::ThreadPoolRuntime`) where this needs to be reliable.
	pub fn settle(self) {
		global_task_pool().settle();
	}

	/// Like [`settle`](`GlobalTaskRuntime::settle`), but gives up after `timeout`.
	#[must_use]
	pub fn settle_for(self, timeout: Duration) -> bool {
		global_task_pool().settle_for(timeout)
	}
}

impl TaskRuntimeRef for GlobalTaskRuntime {
	fn spawn_detached(&self, f: impl 'static + Send + FnOnce()) {
		global_task_pool().submit(Box::new(f));
	}
}
