use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlightKind {
	Load,
	Update,
}

/// How a computation ended.
#[derive(Debug, Clone)]
pub(crate) enum Outcome<T> {
	Committed(T),
	Failed(Error),
	/// Lost its status compare-and-set and published nothing.
	Abandoned,
}

/// The slot's one in-flight computation. Late joiners wait here for its outcome.
#[derive(Debug)]
pub(crate) struct Flight<T> {
	kind: FlightKind,
	outcome: Mutex<Option<Outcome<T>>>,
	landed: Condvar,
}

impl<T> Flight<T> {
	pub(crate) fn new(kind: FlightKind) -> Arc<Self> {
		Arc::new(Self {
			kind,
			outcome: Mutex::new(None),
			landed: Condvar::new(),
		})
	}

	pub(crate) fn kind(&self) -> FlightKind {
		self.kind
	}

	pub(crate) fn land(&self, outcome: Outcome<T>) {
		let mut slot = self.outcome.lock();
		debug_assert!(slot.is_none(), "Flight landed twice.");
		*slot = Some(outcome);
		drop(slot);
		self.landed.notify_all();
	}

	/// Blocks until [`land`](`Flight::land`) was called.
	pub(crate) fn wait_landed(&self) {
		let mut outcome = self.outcome.lock();
		while outcome.is_none() {
			self.landed.wait(&mut outcome);
		}
	}

}

impl<T: Clone> Flight<T> {
	pub(crate) fn wait(&self) -> Outcome<T> {
		let mut outcome = self.outcome.lock();
		loop {
			if let Some(landed) = &*outcome {
				break landed.clone();
			}
			self.landed.wait(&mut outcome);
		}
	}
}
