//! Error types for the form engine.

use formstate_tree::Path;
use thiserror::Error;

/// Result type alias for form operations.
pub type FormResult<T> = Result<T, FormError>;

/// Errors surfaced by the form engine.
///
/// Validation failures are not errors; they are recorded as field metadata
/// and reported through [`crate::ValidationStatus`] and
/// [`crate::SubmitFailure`].
#[derive(Debug, Error)]
pub enum FormError {
    /// Registering the computed field would close a dependency cycle.
    #[error("computed field {path} would form a dependency cycle")]
    DependencyCycle {
        /// The computed field that was being registered.
        path: Path,
    },

    /// The request cannot be carried out as asked.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Configuration text could not be parsed.
    #[error("invalid form configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl FormError {
    /// Create a dependency cycle error.
    #[inline]
    pub fn dependency_cycle(path: Path) -> Self {
        FormError::DependencyCycle { path }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        FormError::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Failure raised by a custom validator, as opposed to a validation message.
///
/// Any validator failure replaces the field's errors with the failure text
/// and clears its warnings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorError {
    /// The validator reported that it could not run.
    #[error("{0}")]
    Failed(String),
    /// The validator panicked.
    #[error("{0}")]
    Panicked(String),
}

impl ValidatorError {
    /// Create a failure from any displayable message.
    pub fn failed(message: impl Into<String>) -> Self {
        ValidatorError::Failed(message.into())
    }
}
