//! Error types for path parsing.

use thiserror::Error;

/// Result type alias for path parsing.
pub type PathResult<T> = Result<T, PathError>;

/// Errors produced by strict path parsing (`str::parse::<Path>()`).
///
/// The lenient `From<&str>` conversion never fails; it treats the
/// remainder of a malformed bracket as a plain key instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A `[` was opened and never closed.
    #[error("unterminated bracket at offset {offset} in {input:?}")]
    UnterminatedBracket {
        /// The full input text.
        input: String,
        /// Byte offset of the opening bracket.
        offset: usize,
    },

    /// A quoted key inside brackets was never closed.
    #[error("unterminated quote at offset {offset} in {input:?}")]
    UnterminatedQuote {
        /// The full input text.
        input: String,
        /// Byte offset of the opening quote.
        offset: usize,
    },

    /// A quoted key was closed but not followed by `]`.
    #[error("expected ']' at offset {offset} in {input:?}")]
    ExpectedCloseBracket {
        /// The full input text.
        input: String,
        /// Byte offset where `]` was expected.
        offset: usize,
    },
}

impl PathError {
    /// Byte offset in the input where parsing failed.
    pub fn offset(&self) -> usize {
        match self {
            PathError::UnterminatedBracket { offset, .. }
            | PathError::UnterminatedQuote { offset, .. }
            | PathError::ExpectedCloseBracket { offset, .. } => *offset,
        }
    }
}
