//! Stack configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Priority (highest wins)
//!
//! 1. Builder calls on [`StackConfig`]
//! 2. Environment variables, read by [`StackConfig::from_env`]
//! 3. `TEALET_CONFIG_RS` file merged at build time
//! 4. Library defaults
//!
//! # Environment variables
//!
//! - `TEALET_STACK_SIZE` - usable bytes per tealet stack, k/m/g suffix allowed
//! - `TEALET_GUARD_PAGES` - inaccessible pages below each stack
//!
//! ```rust,ignore
//! use tealet_runtime::StackConfig;
//!
//! let cfg = StackConfig::from_env().stack_size(64 * 1024);
//! let stub = Tealet::with_config(&cfg)?;
//! ```

use std::sync::OnceLock;

use tealet_core::env::{env_get, env_get_size};

/// Compile-time defaults generated by build.rs
pub mod defaults {
    include!(concat!(env!("OUT_DIR"), "/tealet_merged_config.rs"));
}

/// Geometry of a tealet stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackConfig {
    /// Usable stack bytes (rounded up to whole pages when mapped)
    pub stack_size: usize,
    /// Guard pages below the stack
    pub guard_pages: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_size: defaults::STACK_SIZE,
            guard_pages: defaults::GUARD_PAGES,
        }
    }
}

impl StackConfig {
    /// Compile-time defaults, ignoring the environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile-time defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get_size("TEALET_STACK_SIZE", defaults::STACK_SIZE),
            guard_pages: env_get("TEALET_GUARD_PAGES", defaults::GUARD_PAGES),
        }
        .clamped()
    }

    /// Set usable stack size
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self.clamped()
    }

    /// Set number of guard pages
    pub fn guard_pages(mut self, pages: usize) -> Self {
        self.guard_pages = pages;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.stack_size < defaults::MIN_STACK_SIZE {
            return Err("stack_size below MIN_STACK_SIZE");
        }
        if self.stack_size.checked_add(self.guard_bytes()).is_none() {
            return Err("stack_size plus guard overflows");
        }
        Ok(())
    }

    /// Guard region size in bytes
    pub fn guard_bytes(&self) -> usize {
        self.guard_pages.saturating_mul(crate::memory::page_size())
    }

    fn clamped(mut self) -> Self {
        self.stack_size = self.stack_size.max(defaults::MIN_STACK_SIZE);
        self
    }
}

/// Process-wide configuration used by [`crate::Tealet::stub`]
///
/// Read from the environment once, on first use.
pub fn global() -> &'static StackConfig {
    static GLOBAL: OnceLock<StackConfig> = OnceLock::new();
    GLOBAL.get_or_init(StackConfig::from_env)
}
