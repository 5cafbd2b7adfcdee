#![forbid(unsafe_code)]

//! Errors raised while resolving or writing property paths.

use thiserror::Error;

/// A property path could not be parsed, or could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path string was empty.
    #[error("property path is empty")]
    Empty,

    /// A segment between separators was empty (`a..b`, `a[]`).
    #[error("property path `{path}` has an empty segment")]
    EmptySegment { path: String },

    /// A `[` without its closing `]`.
    #[error("property path `{path}` has an unclosed bracket")]
    UnclosedBracket { path: String },

    /// An intermediate segment does not exist in the model.
    #[error("`{segment}` of `{path}` does not exist in the model")]
    Missing { path: String, segment: String },

    /// An intermediate value is neither an object nor an array.
    #[error("`{segment}` of `{path}` is not an object or array")]
    NotAContainer { path: String, segment: String },

    /// An array segment is not a valid index for that array.
    #[error("index `{segment}` of `{path}` is out of range (len {len})")]
    IndexOutOfRange {
        path: String,
        segment: String,
        len: usize,
    },
}
