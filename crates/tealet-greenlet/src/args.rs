//! Values handed through greenlet switches
//!
//! A switch carries positional and keyword values ([`Args`]); the receiving
//! side sees them decoded into a [`Reply`]. Internally both travel inside a
//! [`Payload`], which can also carry a [`Failure`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use tealet_runtime::Value;

use crate::error::{GreenletError, GreenletResult};
use crate::failure::Failure;

/// Positional and keyword values for a switch
#[derive(Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl Args {
    /// No values
    pub fn new() -> Self {
        Self::default()
    }

    /// A single positional value
    pub fn one<T: Any + Send>(value: T) -> Self {
        Self::new().arg(value)
    }

    /// A single, already boxed, positional value
    pub fn one_boxed(value: Value) -> Self {
        Args {
            positional: vec![value],
            keyword: BTreeMap::new(),
        }
    }

    /// Append a positional value
    pub fn arg<T: Any + Send>(mut self, value: T) -> Self {
        self.positional.push(Box::new(value));
        self
    }

    /// Set a keyword value
    pub fn kwarg<T: Any + Send>(mut self, name: impl Into<String>, value: T) -> Self {
        self.keyword.insert(name.into(), Box::new(value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Take positional value `idx` as `T`
    ///
    /// `None` if out of range, already taken, or of another type; a value of
    /// the wrong type is left in place.
    pub fn take<T: Any>(&mut self, idx: usize) -> Option<T> {
        let slot = self.positional.get_mut(idx)?;
        if !slot.is::<T>() {
            return None;
        }
        let value = std::mem::replace(slot, Box::new(()));
        value.downcast::<T>().ok().map(|b| *b)
    }

    /// Decode into what the receiver of a switch sees
    ///
    /// positional and keyword -> `Both`; only keyword -> `Keywords`;
    /// one positional -> `One`; several -> `Many`; nothing -> `Empty`.
    pub fn into_reply(self) -> Reply {
        let Args {
            mut positional,
            keyword,
        } = self;
        match (positional.len(), keyword.is_empty()) {
            (0, true) => Reply::Empty,
            (0, false) => Reply::Keywords(keyword),
            (_, false) => Reply::Both(positional, keyword),
            (1, true) => match positional.pop() {
                Some(v) => Reply::One(v),
                None => Reply::Empty,
            },
            (_, true) => Reply::Many(positional),
        }
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("positional", &self.positional.len())
            .field("keyword", &self.keyword.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Decoded result of a switch or throw
pub enum Reply {
    Empty,
    One(Value),
    Many(Vec<Value>),
    Keywords(BTreeMap<String, Value>),
    Both(Vec<Value>, BTreeMap<String, Value>),
}

impl Reply {
    pub fn is_empty(&self) -> bool {
        matches!(self, Reply::Empty)
    }

    /// The single value, downcast to `T`
    pub fn into_one<T: Any>(self) -> Option<T> {
        match self {
            Reply::One(v) => v.downcast::<T>().ok().map(|b| *b),
            _ => None,
        }
    }

    /// Back to positional/keyword form
    pub fn into_args(self) -> Args {
        match self {
            Reply::Empty => Args::new(),
            Reply::One(v) => Args::one_boxed(v),
            Reply::Many(positional) => Args {
                positional,
                keyword: BTreeMap::new(),
            },
            Reply::Keywords(keyword) => Args {
                positional: Vec::new(),
                keyword,
            },
            Reply::Both(positional, keyword) => Args {
                positional,
                keyword,
            },
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Empty => write!(f, "Reply::Empty"),
            Reply::One(_) => write!(f, "Reply::One(..)"),
            Reply::Many(v) => write!(f, "Reply::Many({} values)", v.len()),
            Reply::Keywords(k) => write!(f, "Reply::Keywords({:?})", k.keys().collect::<Vec<_>>()),
            Reply::Both(v, k) => write!(
                f,
                "Reply::Both({} values, {:?})",
                v.len(),
                k.keys().collect::<Vec<_>>()
            ),
        }
    }
}

/// What actually travels through the engine
pub(crate) enum Payload {
    Values(Args),
    Failure(Failure),
}

impl Payload {
    /// Recover a payload from an engine value
    ///
    /// Anything that is not a payload (a raw tealet handing over a value)
    /// is treated as a single positional value.
    pub(crate) fn from_value(value: Value) -> Self {
        match value.downcast::<Payload>() {
            Ok(payload) => *payload,
            Err(other) => Payload::Values(Args::one_boxed(other)),
        }
    }

    pub(crate) fn into_value(self) -> Value {
        Box::new(self)
    }

    /// Raise a failure, or decode values
    pub(crate) fn into_reply(self) -> GreenletResult<Reply> {
        match self {
            Payload::Values(args) => Ok(args.into_reply()),
            Payload::Failure(failure) => Err(GreenletError::Raised(failure)),
        }
    }
}
