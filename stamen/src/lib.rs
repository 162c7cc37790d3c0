#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! Tasks submitted to the same runtime **may** run in parallel and in any order.  
//! Callers that need ordering (like sepal's listener notifications) serialise on their side.

#[cfg(all(
	feature = "global_task_runtime",
	feature = "forbid_global_task_runtime"
))]
compile_error!("A dependent enabled the `global_task_runtime` feature, but another forbid this with the `forbid_global_task_runtime` feature. Please do not enable `global_task_runtime` in libraries.");

pub mod latency;
pub mod runtime;

#[doc = include_str!("../README.md")]
mod readme {}
