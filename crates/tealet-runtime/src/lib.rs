//! # tealet-runtime
//!
//! Platform-specific half of the tealet engine.
//!
//! This crate provides:
//! - Stack switching (architecture-specific naked functions)
//! - Stack memory (mmap with guard pages)
//! - The per-thread registry (Main, Current, Previous)
//! - [`Tealet`]: create, anchor, run, switch, duplicate
//! - Stack configuration from build-time defaults and the environment
//!
//! ```rust,ignore
//! use tealet_runtime::{Exit, Tealet};
//!
//! let main = Tealet::main();
//! let t = Tealet::new();
//! let got = t.run(move |_me, arg| {
//!     let again = main.switch(arg).unwrap();
//!     Exit::Main(again)
//! }, Box::new(1))?;
//! let last = t.switch(got)?;
//! ```

pub mod arch;
pub mod config;
pub mod memory;
pub mod tealet;
mod tls;

// Re-exports
pub use config::StackConfig;
pub use memory::Stack;
pub use tealet::{Data, Exit, Frame, Panicked, Tealet, Value};
pub use tls::Stats;
