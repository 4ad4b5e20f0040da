//! # tealet - stackful switchable contexts for Rust
//!
//! A tealet is an execution context with its own machine stack. Any tealet
//! can switch directly to any other tealet on the same thread, handing over
//! a value; there is no scheduler in between.
//!
//! On top of that sits a greenlet layer: tealets with a parent, lazily
//! started functions, failures that travel across switches, and automatic
//! teardown of greenlets nobody refers to any more.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tealet::{Args, Greenlet};
//!
//! fn main() {
//!     let g = Greenlet::new(
//!         |mut args| {
//!             let n: i32 = args.take(0).unwrap_or(0);
//!             let main = Greenlet::current()?.parent().unwrap();
//!             let reply = main.switch(Args::one(n + 1))?;
//!             Ok(reply.into_args())
//!         },
//!         None,
//!     )
//!     .unwrap();
//!
//!     let first = g.switch(Args::one(41)).unwrap();
//!     assert_eq!(first.into_one::<i32>(), Some(42));
//!     g.switch(Args::new()).unwrap();
//!     assert!(g.dead());
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Greenlet layer                         │
//! │     parent chains, lazy start, failures, teardown           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Tealet engine                           │
//! │    per-thread registry, STUB/RUN/EXIT, value transfer       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┴───────────────────┐
//!          ▼                                       ▼
//!    ┌───────────────┐                     ┌───────────────┐
//!    │  Stack switch │                     │  Stack memory │
//!    │ x86_64/aarch64│                     │ mmap + guard  │
//!    └───────────────┘                     └───────────────┘
//! ```

// Re-export core types
pub use tealet_core::{
    RegistryId,
    TealetId,
    TealetState,
    MemoryError,
    TealetError,
    TealetResult,
};

// Re-export kprint macros for debug logging
pub use tealet_core::{kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use tealet_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use tealet_core::{env_get, env_get_bool, env_get_opt, env_get_size};

// Re-export engine types
pub use tealet_runtime::{
    Data,
    Exit,
    Frame,
    Panicked,
    Stack,
    StackConfig,
    Stats,
    Tealet,
    Value,
};

// Re-export the greenlet layer
pub use tealet_greenlet::{
    getcurrent,
    Args,
    Failure,
    FailureKind,
    Greenlet,
    GreenletError,
    GreenletResult,
    Reply,
    RunFn,
    Teardown,
};

/// The calling thread's current tealet
#[inline]
pub fn current() -> Tealet {
    Tealet::current()
}

/// The calling thread's Main tealet
#[inline]
pub fn main_tealet() -> Tealet {
    Tealet::main()
}

/// Counters of the calling thread's registry
#[inline]
pub fn stats() -> Stats {
    Tealet::stats()
}
