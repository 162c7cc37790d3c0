use std::{any::Any, error::Error as StdError, sync::Arc};

use thiserror::Error;

/// Any error a supplier or update body may fail with.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result type alias for cache slot operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The one error type surfaced by [`CacheSlot`](`crate::CacheSlot`).
///
/// Cheap to clone, so that one failed computation can be reported to every caller that waited for it.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	/// The supplier or update body failed.
	#[error(transparent)]
	Computation(Arc<dyn StdError + Send + Sync>),

	/// The supplier or update body panicked.
	#[error("value computation panicked: {0}")]
	Panicked(Arc<str>),
}

impl Error {
	/// Wraps `error`, unless it already is an [`Error`].
	pub fn new(error: impl Into<BoxError>) -> Self {
		match error.into().downcast::<Self>() {
			Ok(error) => *error,
			Err(other) => Self::Computation(Arc::from(other)),
		}
	}

	pub(crate) fn panicked(payload: &(dyn Any + Send)) -> Self {
		Self::Panicked(
			payload
				.downcast_ref::<&'static str>()
				.map(|message| Arc::from(*message))
				.or_else(|| payload.downcast_ref::<String>().map(|message| Arc::from(message.as_str())))
				.unwrap_or_else(|| Arc::from("(non-string panic payload)")),
		)
	}

	/// The wrapped computation error, if it is an `E`.
	#[must_use]
	pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
		match self {
			Self::Computation(error) => error.downcast_ref(),
			Self::Panicked(_) => None,
		}
	}
}
