//! Error types for the greenlet layer

use core::fmt;

use tealet_core::TealetError;

use crate::failure::Failure;

/// Result type for greenlet operations
pub type GreenletResult<T> = Result<T, GreenletError>;

/// Errors surfaced by greenlet operations
#[derive(Debug)]
pub enum GreenletError {
    /// The engine refused the operation (wrong thread, bad state, foreign tealet)
    Tealet(TealetError),

    /// A failure delivered by the greenlet that handed control back
    Raised(Failure),

    /// Reparenting would make a greenlet its own ancestor
    CyclicParent,
}

impl GreenletError {
    /// The delivered failure, if this is one
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            GreenletError::Raised(f) => Some(f),
            _ => None,
        }
    }

    /// Check if this is the designated exit failure
    pub fn is_exit(&self) -> bool {
        self.failure().is_some_and(Failure::is_exit)
    }
}

impl fmt::Display for GreenletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GreenletError::Tealet(e) => write!(f, "greenlet error: {}", e),
            GreenletError::Raised(failure) => write!(f, "{}", failure),
            GreenletError::CyclicParent => write!(f, "cyclic parent chain is not allowed"),
        }
    }
}

impl std::error::Error for GreenletError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GreenletError::Tealet(e) => Some(e),
            GreenletError::Raised(f) => Some(f),
            GreenletError::CyclicParent => None,
        }
    }
}

impl From<TealetError> for GreenletError {
    fn from(e: TealetError) -> Self {
        GreenletError::Tealet(e)
    }
}

impl From<Failure> for GreenletError {
    fn from(f: Failure) -> Self {
        GreenletError::Raised(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureKind;
    use tealet_core::TealetState;

    #[test]
    fn test_error_display() {
        let e: GreenletError = TealetError::Foreign.into();
        assert_eq!(e.to_string(), "greenlet error: foreign tealet");
        assert_eq!(
            GreenletError::CyclicParent.to_string(),
            "cyclic parent chain is not allowed"
        );

        let e: GreenletError = TealetError::invalid_state("switch", TealetState::Exit).into();
        assert!(e.failure().is_none());
    }

    #[test]
    fn test_error_failure_accessors() {
        let e: GreenletError = Failure::exit().into();
        assert!(e.is_exit());

        let e: GreenletError = Failure::new(FailureKind::Error).into();
        assert!(!e.is_exit());
        assert_eq!(e.failure().map(|f| &f.kind), Some(&FailureKind::Error));
    }
}
