//! Failures carried across switches
//!
//! A failure is data: it travels through a switch like any other payload and
//! is turned back into an `Err` on the receiving side.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;

use tealet_runtime::Value;

/// What kind of failure is travelling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Request to finish; caught at the greenlet boundary as a normal outcome
    Exit,
    /// An error returned by a greenlet's function
    Error,
    /// A panic inside a greenlet's function
    Panic,
    /// Application-defined kind
    Custom(Cow<'static, str>),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Exit => write!(f, "GreenletExit"),
            FailureKind::Error => write!(f, "error"),
            FailureKind::Panic => write!(f, "panic"),
            FailureKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A failure: kind, optional value, optional trace text
pub struct Failure {
    pub kind: FailureKind,
    pub value: Option<Value>,
    pub trace: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind) -> Self {
        Failure {
            kind,
            value: None,
            trace: None,
        }
    }

    /// The designated exit failure
    pub fn exit() -> Self {
        Self::new(FailureKind::Exit)
    }

    /// Wrap a panic payload
    pub fn panic(payload: Box<dyn Any + Send>) -> Self {
        Failure {
            kind: FailureKind::Panic,
            value: Some(payload),
            trace: None,
        }
    }

    pub fn with_value<T: Any + Send>(mut self, value: T) -> Self {
        self.value = Some(Box::new(value));
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    #[inline]
    pub fn is_exit(&self) -> bool {
        self.kind == FailureKind::Exit
    }

    /// Value as text, when it is a string
    pub fn message(&self) -> Option<&str> {
        let value = self.value.as_ref()?;
        if let Some(s) = value.downcast_ref::<&'static str>() {
            Some(s)
        } else {
            value.downcast_ref::<String>().map(String::as_str)
        }
    }

    /// Borrow the value as `T`
    pub fn value_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("kind", &self.kind)
            .field("message", &self.message())
            .field("has_value", &self.value.is_some())
            .field("trace", &self.trace)
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{}: {}", self.kind, msg)?,
            None => write!(f, "{}", self.kind)?,
        }
        if let Some(trace) = &self.trace {
            write!(f, "\n{}", trace)?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        assert_eq!(Failure::exit().to_string(), "GreenletExit");

        let f = Failure::new(FailureKind::Custom("ValueError".into())).with_value("bad input");
        assert_eq!(f.to_string(), "ValueError: bad input");

        let f = Failure::new(FailureKind::Error)
            .with_value(String::from("oops"))
            .with_trace("at step 3");
        assert_eq!(f.to_string(), "error: oops\nat step 3");
    }

    #[test]
    fn test_failure_values() {
        let f = Failure::new(FailureKind::Error).with_value(42u32);
        assert_eq!(f.value_ref::<u32>(), Some(&42));
        assert_eq!(f.message(), None);
        assert!(!f.is_exit());

        let p = Failure::panic(Box::new("boom"));
        assert_eq!(p.kind, FailureKind::Panic);
        assert_eq!(p.message(), Some("boom"));
    }
}
