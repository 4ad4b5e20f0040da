//! Tealet and registry identifier types

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_TEALET_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a tealet
///
/// Ids are allocated from a process-wide counter and never reused.
/// The value 0 is reserved as a sentinel for "no tealet".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TealetId(u64);

impl TealetId {
    /// Sentinel value indicating no tealet
    pub const NONE: TealetId = TealetId(0);

    /// Allocate the next process-unique id
    #[inline]
    pub fn next() -> Self {
        TealetId(NEXT_TEALET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a TealetId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        TealetId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<TealetId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Debug for TealetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "TealetId(NONE)")
        } else {
            write!(f, "TealetId({})", self.0)
        }
    }
}

impl fmt::Display for TealetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for TealetId {
    fn default() -> Self {
        TealetId::NONE
    }
}

/// Identity of a per-thread registry
///
/// Every OS thread that touches the engine gets its own registry, and every
/// tealet remembers the registry it was created in. Comparing two of these is
/// how cross-thread use is detected.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RegistryId(u64);

impl RegistryId {
    /// Allocate the next process-unique registry id
    #[inline]
    pub fn next() -> Self {
        RegistryId(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegistryId({})", self.0)
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tealet_id_basics() {
        let id = TealetId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert!(!id.is_none());
        assert_eq!(id.to_option(), Some(id));
    }

    #[test]
    fn test_tealet_id_none() {
        let none = TealetId::NONE;
        assert!(none.is_none());
        assert_eq!(none.to_option(), None);
        assert_eq!(format!("{}", none), "none");
        assert_eq!(TealetId::default(), TealetId::NONE);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = TealetId::next();
        let b = TealetId::next();
        assert_ne!(a, b);
        assert!(!a.is_none());

        let r1 = RegistryId::next();
        let r2 = RegistryId::next();
        assert_ne!(r1, r2);
        assert_eq!(format!("{}", r1), format!("registry#{}", r1.as_u64()));
    }
}
