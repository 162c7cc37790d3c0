//! Tracks which slots' computations the current thread is inside of.
//!
//! A supplier or update body that queries its own slot gets the slot's latest value
//! instead of waiting for itself.

use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	num::NonZeroU64,
	sync::atomic::{AtomicU64, Ordering},
};

use scopeguard::guard;

thread_local! {
	static COMPUTING: RefCell<Vec<SlotId>> = const { RefCell::new(Vec::new()) };
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SlotId(NonZeroU64);

impl Debug for SlotId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

impl SlotId {
	pub(crate) fn next() -> Self {
		static SLOT_COUNTER: AtomicU64 = AtomicU64::new(0);
		Self(
			(SLOT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
				.try_into()
				.expect("infallible within reasonable time"),
		)
	}

	/// Whether the current thread is running a computation for this slot.
	pub(crate) fn is_computing(self) -> bool {
		COMPUTING.with(|computing| computing.borrow().contains(&self))
	}

	/// Runs `f` marked as computing for this slot. The mark is removed even if `f` unwinds.
	pub(crate) fn computing<T>(self, f: impl FnOnce() -> T) -> T {
		COMPUTING.with(|computing| computing.borrow_mut().push(self));
		let _mark = guard((), |()| {
			COMPUTING.with(|computing| {
				let popped = computing.borrow_mut().pop();
				debug_assert_eq!(popped, Some(self));
			});
		});
		f()
	}
}

#[cfg(test)]
mod tests {
	use std::{
		panic::{catch_unwind, AssertUnwindSafe},
		thread,
	};

	use super::*;

	#[test]
	fn unique() {
		assert_ne!(SlotId::next(), SlotId::next());
	}

	#[test]
	fn nested_marks() {
		let (a, b) = (SlotId::next(), SlotId::next());
		a.computing(|| {
			assert!(a.is_computing());
			assert!(!b.is_computing());
			b.computing(|| assert!(a.is_computing() && b.is_computing()));
			assert!(!b.is_computing());
		});
		assert!(!a.is_computing());
	}

	#[test]
	fn per_thread() {
		let a = SlotId::next();
		a.computing(|| assert!(!thread::spawn(move || a.is_computing()).join().unwrap()));
	}

	#[test]
	fn cleared_on_unwind() {
		let a = SlotId::next();
		assert!(catch_unwind(AssertUnwindSafe(|| a.computing(|| panic!("expected test panic")))).is_err());
		assert!(!a.is_computing());
	}
}
