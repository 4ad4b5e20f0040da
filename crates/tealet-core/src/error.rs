//! Error types for the tealet engine

use core::fmt;

use crate::id::RegistryId;
use crate::state::TealetState;

/// Result type for tealet operations
pub type TealetResult<T> = Result<T, TealetError>;

/// Errors that can occur in tealet operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TealetError {
    /// Operation is not legal for the tealet's current state
    /// (running a non-stub, switching into a stub or an exited tealet)
    InvalidState {
        op: &'static str,
        state: TealetState,
    },

    /// Tealet belongs to a different thread's registry
    CrossThread {
        owner: RegistryId,
        caller: RegistryId,
    },

    /// Object is not managed by the layer asked about it
    Foreign,

    /// Stack memory could not be obtained or protected
    Memory(MemoryError),
}

impl TealetError {
    /// Shorthand for an invalid-state error
    #[inline]
    pub const fn invalid_state(op: &'static str, state: TealetState) -> Self {
        TealetError::InvalidState { op, state }
    }

    /// Check if this is a state error
    #[inline]
    pub const fn is_state_error(&self) -> bool {
        matches!(self, TealetError::InvalidState { .. })
    }

    /// Check if this is a cross-thread error
    #[inline]
    pub const fn is_cross_thread(&self) -> bool {
        matches!(self, TealetError::CrossThread { .. })
    }
}

impl fmt::Display for TealetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TealetError::InvalidState { op, state } => {
                write!(f, "cannot {} a tealet in state {}", op, state)
            }
            TealetError::CrossThread { owner, caller } => write!(
                f,
                "tealet owned by {} used from {}",
                owner, caller
            ),
            TealetError::Foreign => write!(f, "foreign tealet"),
            TealetError::Memory(e) => write!(f, "memory error: {}", e),
        }
    }
}

impl std::error::Error for TealetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TealetError::Memory(e) => Some(e),
            _ => None,
        }
    }
}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect failed
    ProtectionFailed,

    /// Requested stack size is zero or overflows
    InvalidSize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "guard page protection failed"),
            MemoryError::InvalidSize => write!(f, "invalid stack size"),
        }
    }
}

impl std::error::Error for MemoryError {}

impl From<MemoryError> for TealetError {
    fn from(e: MemoryError) -> Self {
        TealetError::Memory(e)
    }
}
