//! The cache slot's state and its load/update coordination.
//!
//! # Locking
//!
//! `update_lock` → `state` → `status` → (notifier) → (runtime), never in the other direction.
//! No lock is held while a supplier, body or listener runs.

use core::{
	fmt::{self, Debug, Formatter},
	ptr,
};
use std::{
	backtrace::Backtrace,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::Arc,
};

use parking_lot::Mutex;
use scopeguard::{guard, ScopeGuard};
use stamen::runtime::TaskRuntimeRef;
use tracing::{debug, error, trace, warn};

use crate::{
	notifier::{Notification, Notifier},
	reentrancy::SlotId,
	BoxError, Error, Status,
};

mod flight;
use flight::{Flight, FlightKind, Outcome};

type Supplier<T> = Box<dyn 'static + Send + Sync + Fn() -> Result<T, Error>>;

pub(crate) struct RawCacheSlot<T, R, L> {
	id: SlotId,
	supplier: Supplier<T>,
	update_lock: Mutex<()>,
	state: Mutex<State<T>>,
	status: Mutex<Option<Status<L>>>,
	notifier: Arc<Notifier<T, L>>,
	runtime: R,
}

struct State<T> {
	/// Present while a committed value is published and not invalidated.
	memo: Option<T>,
	/// The last committed value. Survives invalidation and failures.
	latest: Option<T>,
	flight: Option<Arc<Flight<T>>>,
}

impl<T: Debug, R: Debug, L: Debug> Debug for RawCacheSlot<T, R, L> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("RawCacheSlot");
		debug.field("id", &self.id);
		match self.state.try_lock() {
			Some(state) => debug
				.field("memo", &state.memo)
				.field("latest", &state.latest)
				.field("flight", &state.flight.as_ref().map(|flight| flight.kind())),
			None => debug.field("state", &"(locked)"),
		};
		match self.status.try_lock() {
			Some(status) => debug.field("status", &*status),
			None => debug.field("status", &"(locked)"),
		};
		debug
			.field("notifier", &self.notifier)
			.field("runtime", &self.runtime)
			.finish_non_exhaustive()
	}
}

impl<T, R, L> RawCacheSlot<T, R, L>
where
	T: 'static + Send + Sync + Clone + PartialEq,
	R: 'static + TaskRuntimeRef,
	L: 'static + Send + Sync + Clone + PartialEq + Debug,
{
	pub(crate) fn new<E: Into<BoxError>>(
		supplier: impl 'static + Send + Sync + Fn() -> Result<T, E>,
		runtime: R,
	) -> Self {
		Self {
			id: SlotId::next(),
			supplier: Box::new(move || supplier().map_err(Error::new)),
			update_lock: Mutex::new(()),
			state: Mutex::new(State {
				memo: None,
				latest: None,
				flight: None,
			}),
			status: Mutex::new(None),
			notifier: Arc::new(Notifier::new()),
			runtime,
		}
	}

	pub(crate) fn notifier(&self) -> &Notifier<T, L> {
		&self.notifier
	}

	pub(crate) fn runtime(&self) -> &R {
		&self.runtime
	}

	pub(crate) fn supply(&self) -> Result<T, Error> {
		(self.supplier)()
	}

	pub(crate) fn status(&self) -> Option<Status<L>> {
		self.status.lock().clone()
	}

	pub(crate) fn is_processing(&self) -> bool {
		self.state.lock().flight.is_some()
	}

	fn latest(&self) -> Option<T> {
		self.state.lock().latest.clone()
	}

	pub(crate) fn get_if_present(self: &Arc<Self>, load_if_absent: bool) -> Option<T> {
		let state = self.state.lock();
		if self.id.is_computing() {
			return state.latest.clone();
		}
		if let Some(memo) = &state.memo {
			return Some(memo.clone());
		}
		let latest = state.latest.clone();
		drop(state);

		if load_if_absent {
			self.refresh();
		}
		latest
	}

	pub(crate) fn get(&self) -> Result<Option<T>, Error> {
		if self.id.is_computing() {
			return Ok(self.latest());
		}
		self.warn_if_latency_sensitive("get");

		loop {
			let mut state = self.state.lock();
			if let Some(memo) = &state.memo {
				return Ok(Some(memo.clone()));
			}

			if let Some(flight) = state.flight.clone() {
				drop(state);
				match (flight.kind(), flight.wait()) {
					(_, Outcome::Committed(value)) => return Ok(Some(value)),
					(FlightKind::Load, Outcome::Failed(error)) => return Err(error),
					(FlightKind::Load, Outcome::Abandoned) => return Ok(self.latest()),
					// The update left the slot empty without publishing anything, so load it.
					(FlightKind::Update, Outcome::Failed(_) | Outcome::Abandoned) => continue,
				}
			}

			let flight = self.take_off(&mut state, FlightKind::Load, Status::Loading);
			drop(state);
			return match self.load(&flight) {
				Outcome::Committed(value) => Ok(Some(value)),
				Outcome::Failed(error) => Err(error),
				Outcome::Abandoned => Ok(self.latest()),
			};
		}
	}

	pub(crate) fn refresh(self: &Arc<Self>) {
		let this = Arc::clone(self);
		self.runtime.spawn_detached(move || this.reload());
	}

	/// A passive load without a caller to report to.
	fn reload(&self) {
		let mut state = self.state.lock();
		if state.flight.is_some() {
			trace!(slot = ?self.id, "Reload coalesced with the computation in flight.");
			return;
		}
		let flight = self.take_off(&mut state, FlightKind::Load, Status::Loading);
		drop(state);

		if let Outcome::Failed(error) = self.load(&flight) {
			debug!(slot = ?self.id, %error, "Background reload failed.");
		}
	}

	fn load(&self, flight: &Flight<T>) -> Outcome<T> {
		let result = self.compute(|| (self.supplier)());
		self.land(flight, &Status::Loading, result)
	}

	pub(crate) fn update(
		&self,
		body: impl FnOnce() -> Result<T, Error>,
		status: Status<L>,
	) -> Result<Option<T>, Error> {
		if self.id.is_computing() {
			return Ok(self.latest());
		}
		self.warn_if_latency_sensitive("update");

		let _serial = self.update_lock.lock();
		let flight = loop {
			let mut state = self.state.lock();
			if let Some(in_flight) = state.flight.clone() {
				drop(state);
				in_flight.wait_landed();
				continue;
			}
			state.memo = None;
			break self.take_off(&mut state, FlightKind::Update, status.clone());
		};

		let result = self.compute(body);
		match self.land(&flight, &status, result) {
			Outcome::Committed(value) => Ok(Some(value)),
			Outcome::Failed(error) => {
				error!(slot = ?self.id, ?status, %error, "Cache slot update failed.");
				Err(error)
			}
			Outcome::Abandoned => Ok(self.latest()),
		}
	}

	pub(crate) fn invalidate(&self) {
		let mut state = self.state.lock();
		state.memo = None;
		if state.flight.is_some() {
			// The in-flight computation's commit compares against its own label, so it won't publish.
			self.set_status(None);
		}
	}

	/// Starts a computation. Status is set while `state` is locked, so that an
	/// `invalidate` can't slip in between.
	fn take_off(&self, state: &mut State<T>, kind: FlightKind, status: Status<L>) -> Arc<Flight<T>> {
		debug_assert!(state.flight.is_none());
		let flight = Flight::new(kind);
		state.flight = Some(Arc::clone(&flight));
		trace!(slot = ?self.id, ?kind, ?status, "Computation started.");
		self.set_status(Some(status));
		flight
	}

	fn compute(&self, f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
		self.id
			.computing(|| catch_unwind(AssertUnwindSafe(f)))
			.unwrap_or_else(|panic| Err(Error::panicked(&*panic)))
	}

	/// Publishes `result` iff the status is still `status`, then releases waiters.
	///
	/// Comparing and cloning values and labels runs user code. If that unwinds, the flight
	/// is still released (see [`crash_land`](`RawCacheSlot::crash_land`)) and the panic continues.
	fn land(&self, flight: &Flight<T>, status: &Status<L>, result: Result<T, Error>) -> Outcome<T> {
		let landing = guard((), |()| self.crash_land(flight));
		let mut state = self.state.lock();
		let outcome = match result {
			Ok(value) if self.compare_and_set_status(status, Status::Ok) => {
				let old = state.latest.replace(value.clone());
				state.memo = Some(value.clone());
				if old.as_ref() != Some(&value) {
					self.notify(Notification::Value {
						new: Some(value.clone()),
						old,
					});
				}
				Outcome::Committed(value)
			}
			Err(error) if self.compare_and_set_status(status, Status::Unknown) => Outcome::Failed(error),
			Ok(_) => {
				debug!(slot = ?self.id, "Dropped the value of an abandoned computation.");
				Outcome::Abandoned
			}
			Err(error) => {
				debug!(slot = ?self.id, %error, "Dropped the failure of an abandoned computation.");
				Outcome::Abandoned
			}
		};
		state.flight = None;
		drop(state);

		trace!(slot = ?self.id, kind = ?flight.kind(), "Computation landed.");
		flight.land(outcome.clone());
		ScopeGuard::into_inner(landing);
		outcome
	}

	#[cold]
	fn crash_land(&self, flight: &Flight<T>) {
		error!(slot = ?self.id, kind = ?flight.kind(), "Panicked while committing a computation's result.");
		let mut state = self.state.lock();
		// A later computation may have taken off already if this unwound after publishing.
		if state.flight.as_ref().is_some_and(|current| ptr::eq(&**current, flight)) {
			state.flight = None;
			let mut status = self.status.lock();
			if status.is_some() {
				*status = Some(Status::Unknown);
				self.notify(Notification::Status(Some(Status::Unknown)));
			}
		}
		drop(state);
		flight.land(Outcome::Failed(Error::Panicked(
			"comparing or cloning the committed value panicked".into(),
		)));
	}

	fn set_status(&self, new: Option<Status<L>>) {
		let mut status = self.status.lock();
		*status = new.clone();
		self.notify(Notification::Status(new));
	}

	fn compare_and_set_status(&self, expected: &Status<L>, new: Status<L>) -> bool {
		let mut status = self.status.lock();
		if status.as_ref() != Some(expected) {
			return false;
		}
		*status = Some(new.clone());
		self.notify(Notification::Status(Some(new)));
		true
	}

	fn notify(&self, notification: Notification<T, L>) {
		self.notifier.notify(&self.runtime, notification);
	}

	fn warn_if_latency_sensitive(&self, operation: &'static str) {
		if self.runtime.is_latency_sensitive() {
			warn!(slot = ?self.id, operation, "Blocking cache slot call on a latency-sensitive thread.");
			debug!(slot = ?self.id, backtrace = %Backtrace::capture(), "Blocking call site.");
		}
	}
}
