//! # tealet-greenlet
//!
//! Greenlets on top of tealets: every greenlet has a parent, starts its
//! function lazily on the first switch, and hands its result (or failure)
//! to the nearest living ancestor when it finishes.
//!
//! ## Modules
//!
//! - `args` - Positional/keyword values carried by a switch
//! - `failure` - Failures raised across switches
//! - `error` - Error types
//! - `greenlet` - The greenlet handle and its lifecycle

pub mod args;
pub mod error;
pub mod failure;
mod greenlet;

pub use args::{Args, Reply};
pub use error::{GreenletError, GreenletResult};
pub use failure::{Failure, FailureKind};
pub use greenlet::{Greenlet, RunFn, Teardown};

/// The calling thread's current greenlet
///
/// Shorthand for [`Greenlet::current`].
#[inline]
pub fn getcurrent() -> GreenletResult<Greenlet> {
    Greenlet::current()
}
