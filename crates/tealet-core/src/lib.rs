//! # tealet-core
//!
//! Core types and traits for tealets: stackful, switchable execution
//! contexts living in per-thread registries.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The stack-switch primitive, stack memory and the engine itself live in
//! `tealet-runtime`.
//!
//! ## Modules
//!
//! - `id` - Tealet and registry identifiers
//! - `state` - Tealet lifecycle state
//! - `error` - Error types
//! - `spinlock` - Small spinlock for cross-thread-readable fields
//! - `traits` - Stack switching and stack memory traits
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod error;
pub mod spinlock;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{RegistryId, TealetId};
pub use state::TealetState;
pub use error::{MemoryError, TealetError, TealetResult};
pub use spinlock::SpinLock;
pub use traits::{EntryFn, StackMemory, StackSwitch};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_size};

/// Constants shared by the engine and its tests
pub mod constants {
    /// Fallback page size when the OS cannot be asked
    pub const FALLBACK_PAGE_SIZE: usize = 4096;

    /// Required alignment of a stack pointer at a call boundary
    pub const STACK_ALIGN: usize = 16;
}
