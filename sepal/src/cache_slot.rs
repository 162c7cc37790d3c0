use core::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use stamen::runtime::TaskRuntimeRef;

use crate::{raw::RawCacheSlot, BoxError, Error, Status};

/// A single memoized value that is loaded on demand, refreshed in the background,
/// invalidated or overwritten by explicit updates, and reports its [`Status`] along the way.
///
/// This is a cheaply clonable handle. Clones share the slot.
///
/// # Logic
///
/// At most one computation (a load through the supplier or an [`update`](`CacheSlot::update`))
/// runs at a time. Readers that need a value while one is in flight wait for its outcome instead
/// of starting another.
///
/// Each computation sets the status to its label when it starts and, when it ends, compares-and-sets
/// it from that label to [`Status::Ok`] or [`Status::Unknown`]. If that fails because
/// [`invalidate`](`CacheSlot::invalidate`) cleared the status in the meantime, the result is dropped:
/// nothing is published and no listener is notified.
///
/// Listeners run on the slot's runtime `R`, one notification at a time and in order.
///
/// # Threading
///
/// A supplier or update body that queries its own slot sees [`latest`](`CacheSlot::get_if_present`)
/// instead of blocking on itself.
///
/// [`get`](`CacheSlot::get`) and [`update`](`CacheSlot::update`) **may** block for as long as the
/// current computation takes. Calling them on a thread the runtime classifies as latency-sensitive
/// logs a warning.
pub struct CacheSlot<T, R: TaskRuntimeRef, L = &'static str>(Arc<RawCacheSlot<T, R, L>>);

impl<T, R: TaskRuntimeRef, L> Clone for CacheSlot<T, R, L> {
	fn clone(&self) -> Self {
		Self(Arc::clone(&self.0))
	}
}

impl<T: Debug, R: TaskRuntimeRef + Debug, L: Debug> Debug for CacheSlot<T, R, L> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("CacheSlot").field(&self.0).finish()
	}
}

impl<T, R, L> CacheSlot<T, R, L>
where
	T: 'static + Send + Sync + Clone + PartialEq,
	R: 'static + TaskRuntimeRef,
	L: 'static + Send + Sync + Clone + PartialEq + Debug,
{
	/// Creates an empty slot that loads through `supplier`, on a default-constructed runtime.
	pub fn new<E: Into<BoxError>>(supplier: impl 'static + Send + Sync + Fn() -> Result<T, E>) -> Self
	where
		R: Default,
	{
		Self::with_runtime(supplier, R::default())
	}

	/// Creates an empty slot that loads through `supplier` and notifies on `runtime`.
	pub fn with_runtime<E: Into<BoxError>>(
		supplier: impl 'static + Send + Sync + Fn() -> Result<T, E>,
		runtime: R,
	) -> Self {
		Self(Arc::new(RawCacheSlot::new(supplier, runtime)))
	}

	/// Registers `on_value_changed(new, old)`, replacing any previous registration.
	///
	/// Called after a computation commits a value that differs from the previous one.
	/// This includes loads: `old` is the latest value committed before, and reloading
	/// an equal value doesn't notify at all.
	#[must_use]
	pub fn on_value_changed(
		self,
		on_value_changed: impl 'static + Send + Sync + Fn(Option<T>, Option<T>),
	) -> Self {
		self.0.notifier().set_on_value_changed(Arc::new(on_value_changed));
		self
	}

	/// Registers `on_status_changed(new)`, replacing any previous registration.
	#[must_use]
	pub fn on_status_changed(
		self,
		on_status_changed: impl 'static + Send + Sync + Fn(Option<Status<L>>),
	) -> Self {
		self.0.notifier().set_on_status_changed(Arc::new(on_status_changed));
		self
	}

	/// The runtime listeners and background reloads run on.
	pub fn runtime(&self) -> &R {
		self.0.runtime()
	}

	/// The current value if one is published, otherwise the latest committed one (which may be `None`).
	///
	/// If nothing is published and `load_if_absent` is `true`, a background reload is requested
	/// (see [`refresh`](`CacheSlot::refresh`)).
	///
	/// Never blocks on a computation.
	#[must_use]
	pub fn get_if_present(&self, load_if_absent: bool) -> Option<T> {
		self.0.get_if_present(load_if_absent)
	}

	/// The current value, loading it through the supplier on this thread if necessary.
	///
	/// Concurrent callers share one supplier invocation.
	///
	/// # Errors
	///
	/// Iff the load this call waited for failed. Only the callers that waited for it see the error.
	pub fn get(&self) -> Result<Option<T>, Error> {
		self.0.get()
	}

	/// Runs `body` as the slot's next computation under `status` and commits its value.
	///
	/// Updates are serialised. The published value is invalidated before `body` runs, so readers
	/// see either the old or the new value, never a stale memo of a half-done update.
	///
	/// **Returns** the committed value, or the latest committed one if this update was abandoned
	/// through [`invalidate`](`CacheSlot::invalidate`).
	///
	/// # Errors
	///
	/// Iff `body` fails or panics. The error is wrapped in [`Error`] unless it already is one,
	/// and the status becomes [`Status::Unknown`].
	pub fn update<E: Into<BoxError>>(
		&self,
		body: impl FnOnce() -> Result<T, E>,
		status: Status<L>,
	) -> Result<Option<T>, Error> {
		self.0.update(|| body().map_err(Error::new), status)
	}

	/// Like [`update`](`CacheSlot::update`), but for a `body` that only has side effects.
	/// The value to commit is then fetched through the slot's supplier.
	///
	/// # Errors
	///
	/// Iff `body` or the supplier fails or panics.
	pub fn update_then_reload<E: Into<BoxError>>(
		&self,
		body: impl FnOnce() -> Result<(), E>,
		status: Status<L>,
	) -> Result<Option<T>, Error> {
		self.0.update(
			|| {
				body().map_err(Error::new)?;
				self.0.supply()
			},
			status,
		)
	}

	/// Requests a background reload through the supplier.
	///
	/// Coalesces with a computation that is already in flight. Failures are only logged.
	pub fn refresh(&self) {
		self.0.refresh();
	}

	/// Drops the published value, so that the next read loads a fresh one.
	///
	/// If a computation is in flight, it isn't interrupted. Instead the status is cleared to `None`,
	/// which makes that computation's result be discarded when it finishes.
	///
	/// The latest committed value stays available through [`get_if_present`](`CacheSlot::get_if_present`).
	pub fn invalidate(&self) {
		self.0.invalidate();
	}

	/// The current status.
	#[must_use]
	pub fn status(&self) -> Option<Status<L>> {
		self.0.status()
	}

	/// Whether a load or update is in flight.
	#[must_use]
	pub fn is_processing(&self) -> bool {
		self.0.is_processing()
	}
}
