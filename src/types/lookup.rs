//! Keyed lookup outcome
//!
//! Every keyed read returns `Lookup` so callers branch on presence instead of
//! treating "not there" as an error.

use crate::types::IamError;

/// Result of a keyed read: the value, or a definite absence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Absent => None,
        }
    }

    /// Turn an absence into the given error
    pub fn found_or_else<F>(self, err: F) -> Result<T, IamError>
    where
        F: FnOnce() -> IamError,
    {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::Absent => Err(err()),
        }
    }

    pub fn map<U, F>(self, f: F) -> Lookup<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::Absent => Lookup::Absent,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::Absent,
        }
    }
}
