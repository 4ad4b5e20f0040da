//! Tealet state type

use core::fmt;

/// State of a tealet
///
/// ```text
/// STUB --run--> RUN --(return | panic)--> EXIT
/// ```
///
/// The main tealet of a thread is created directly in `Run` and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TealetState {
    /// Created, not yet bound to a function
    Stub = 0,

    /// Bound to a function; either executing or suspended in a switch
    Run = 1,

    /// Function returned or unwound; terminal
    Exit = 2,
}

impl TealetState {
    /// Check if the tealet can still be run (bound to a function)
    #[inline]
    pub const fn is_stub(&self) -> bool {
        matches!(self, TealetState::Stub)
    }

    /// Check if the tealet can be switched into
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, TealetState::Run)
    }

    /// Check if the tealet has terminated
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, TealetState::Exit)
    }
}

impl From<u8> for TealetState {
    fn from(v: u8) -> Self {
        match v {
            0 => TealetState::Stub,
            1 => TealetState::Run,
            _ => TealetState::Exit,
        }
    }
}

impl From<TealetState> for u8 {
    fn from(state: TealetState) -> u8 {
        state as u8
    }
}

impl fmt::Display for TealetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TealetState::Stub => write!(f, "STUB"),
            TealetState::Run => write!(f, "RUN"),
            TealetState::Exit => write!(f, "EXIT"),
        }
    }
}
