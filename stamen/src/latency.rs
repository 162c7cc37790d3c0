//! The ambient "is this thread latency-sensitive?" classification.
//!
//! A UI (or other single-threaded event loop) marks its thread once with
//! [`mark_latency_sensitive`] and keeps the returned guard alive for as long as
//! the loop runs. [`TaskRuntimeRef`](`crate::runtime::TaskRuntimeRef`)
//! implementations consult [`is_latency_sensitive`] by default.

use core::{cell::Cell, marker::PhantomData};

thread_local! {
	static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as latency-sensitive until the returned guard is dropped.
///
/// Markings nest: the thread stays marked until every guard is gone.
pub fn mark_latency_sensitive() -> LatencySensitiveGuard {
	DEPTH.with(|depth| depth.set(depth.get() + 1));
	LatencySensitiveGuard {
		_not_send: PhantomData,
	}
}

/// Whether the current thread is marked as latency-sensitive.
#[must_use]
pub fn is_latency_sensitive() -> bool {
	DEPTH.with(|depth| depth.get() > 0)
}

/// Keeps the current thread marked as latency-sensitive.
///
/// `!Send`, so that it's always released on the thread it marked.
#[must_use = "The thread is unmarked again as soon as this guard is dropped."]
#[derive(Debug)]
pub struct LatencySensitiveGuard {
	_not_send: PhantomData<*const ()>,
}

impl Drop for LatencySensitiveGuard {
	fn drop(&mut self) {
		DEPTH.with(|depth| depth.set(depth.get() - 1));
	}
}
