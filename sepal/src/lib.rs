#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]

mod cache_slot;
mod error;
mod notifier;
mod raw;
mod reentrancy;
mod status;

pub use cache_slot::CacheSlot;
pub use error::{BoxError, Error, Result};
pub use status::Status;

pub use stamen::{
	latency,
	runtime::{TaskRuntimeRef, ThreadPoolBuilder, ThreadPoolRuntime},
};

#[cfg(feature = "global_task_runtime")]
pub use stamen::runtime::GlobalTaskRuntime;

#[doc = include_str!("../README.md")]
mod readme {}
