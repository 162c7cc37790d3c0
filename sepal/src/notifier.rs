//! Ordered, off-thread delivery of value and status notifications.
//!
//! Each slot has one FIFO. The first notification enqueued while the queue is idle
//! spawns a single drain task on the slot's runtime, which delivers everything queued
//! until the FIFO is empty again. Listeners of one slot thus never run in parallel or
//! out of order, and never on the thread that caused the change.

use std::{
	collections::VecDeque,
	fmt::{self, Debug, Formatter},
	mem,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use stamen::runtime::TaskRuntimeRef;
use tracing::error;

use crate::Status;

pub(crate) type OnValueChanged<T> = Arc<dyn 'static + Send + Sync + Fn(Option<T>, Option<T>)>;
pub(crate) type OnStatusChanged<L> = Arc<dyn 'static + Send + Sync + Fn(Option<Status<L>>)>;

pub(crate) enum Notification<T, L> {
	Value { new: Option<T>, old: Option<T> },
	Status(Option<Status<L>>),
}

pub(crate) struct Notifier<T, L> {
	on_value_changed: RwLock<Option<OnValueChanged<T>>>,
	on_status_changed: RwLock<Option<OnStatusChanged<L>>>,
	queue: Mutex<Queue<T, L>>,
}

struct Queue<T, L> {
	pending: VecDeque<Notification<T, L>>,
	draining: bool,
}

impl<T, L> Debug for Notifier<T, L> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let queue = self.queue.try_lock();
		f.debug_struct("Notifier")
			.field("on_value_changed", &self.on_value_changed.read().is_some())
			.field("on_status_changed", &self.on_status_changed.read().is_some())
			.field("pending", &queue.as_ref().map(|queue| queue.pending.len()))
			.field("draining", &queue.as_ref().map(|queue| queue.draining))
			.finish()
	}
}

impl<T: 'static + Send, L: 'static + Send> Notifier<T, L> {
	pub(crate) fn new() -> Self {
		Self {
			on_value_changed: RwLock::new(None),
			on_status_changed: RwLock::new(None),
			queue: Mutex::new(Queue {
				pending: VecDeque::new(),
				draining: false,
			}),
		}
	}

	pub(crate) fn set_on_value_changed(&self, f: OnValueChanged<T>) {
		*self.on_value_changed.write() = Some(f);
	}

	pub(crate) fn set_on_status_changed(&self, f: OnStatusChanged<L>) {
		*self.on_status_changed.write() = Some(f);
	}

	/// Queues `notification` for delivery on `runtime`.
	///
	/// Notifications nobody is listening for at this point are discarded.
	pub(crate) fn notify(self: &Arc<Self>, runtime: &impl TaskRuntimeRef, notification: Notification<T, L>) {
		let listening = match notification {
			Notification::Value { .. } => self.on_value_changed.read().is_some(),
			Notification::Status(_) => self.on_status_changed.read().is_some(),
		};
		if !listening {
			return;
		}

		let mut queue = self.queue.lock();
		queue.pending.push_back(notification);
		if !mem::replace(&mut queue.draining, true) {
			drop(queue);
			let this = Arc::clone(self);
			runtime.spawn_detached(move || this.drain());
		}
	}

	fn drain(&self) {
		loop {
			let next = {
				let mut queue = self.queue.lock();
				if let Some(next) = queue.pending.pop_front() {
					next
				} else {
					queue.draining = false;
					return;
				}
			};
			self.deliver(next);
		}
	}

	fn deliver(&self, notification: Notification<T, L>) {
		// Listeners are cloned out so that they may re-register without deadlocking.
		let delivered = match notification {
			Notification::Value { new, old } => {
				let listener = self.on_value_changed.read().clone();
				listener.map(|listener| catch_unwind(AssertUnwindSafe(|| listener(new, old))))
			}
			Notification::Status(status) => {
				let listener = self.on_status_changed.read().clone();
				listener.map(|listener| catch_unwind(AssertUnwindSafe(|| listener(status))))
			}
		};
		if let Some(Err(_)) = delivered {
			error!("Cache slot listener panicked.");
		}
	}
}
