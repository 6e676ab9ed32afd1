//! Error-related types.

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// A validation error.
///
/// Returned when a value doesn't fit its wire-level domain, e.g., a tag
/// containing `+`, an atom containing a space, or a literal containing NUL.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub struct ValidationError {
    kind: ValidationErrorKind,
}

impl ValidationError {
    pub(crate) fn new(kind: ValidationErrorKind) -> Self {
        Self { kind }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "validation failed: {}", self.kind)
    }
}

#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub(crate) enum ValidationErrorKind {
    #[error("must not be empty")]
    Empty,
    #[error("invalid byte b'\\x{byte:02x}' at index {at}")]
    InvalidByteAt { byte: u8, at: usize },
}
