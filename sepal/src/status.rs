use core::fmt::{self, Display, Formatter};

/// The status a [`CacheSlot`](`crate::CacheSlot`) reports to observers.
///
/// The slot only imposes the transition discipline. [`Loading`](`Status::Loading`) is used for
/// passive loads, callers choose the label for their updates (usually
/// [`Updating`](`Status::Updating`) or a [`Custom`](`Status::Custom`) one like `"Deploying"`),
/// and every computation ends in [`Ok`](`Status::Ok`) or [`Unknown`](`Status::Unknown`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status<L = &'static str> {
	/// A passive (read-through or background) load is running.
	Loading,
	/// An update is running.
	Updating,
	/// The last computation committed its value.
	Ok,
	/// The last computation failed.
	Unknown,
	/// A caller-defined update label.
	Custom(L),
}

impl<L> Status<L> {
	/// Whether this is a label computations end in, rather than one they run under.
	#[must_use]
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Ok | Self::Unknown)
	}
}

impl<L: Display> Display for Status<L> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Loading => f.write_str("Loading"),
			Self::Updating => f.write_str("Updating"),
			Self::Ok => f.write_str("OK"),
			Self::Unknown => f.write_str("Unknown"),
			Self::Custom(label) => label.fmt(f),
		}
	}
}
