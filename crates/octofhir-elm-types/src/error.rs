//! Errors raised by value construction, parsing and value-level operations

use thiserror::Error;

/// Result alias for value-level operations
pub type ValueResult<T> = Result<T, ValueError>;

/// Failure of a value-level operation.
///
/// These never represent "unknown": an unknown result is `None` or
/// [`crate::CqlValue::Null`]. A `ValueError` means the operation itself was
/// not well-defined for its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Input text is not a valid literal for the target type
    #[error("invalid {target} format: '{input}'")]
    Format { target: &'static str, input: String },

    /// Field values outside their calendar or clock range
    #[error("invalid {target}: {reason}")]
    InvalidComponent { target: &'static str, reason: String },

    /// Operation not defined for the given operand kinds
    #[error("{operation} is not defined for {left} and {right}")]
    TypeMismatch {
        operation: &'static str,
        left: String,
        right: String,
    },

    /// Temporal result falls outside the representable range
    #[error("{operation} produced a value outside the supported range")]
    OutOfRange { operation: &'static str },

    /// Temporal subtraction where the finer operand carries non-minimal surplus fields
    #[error("cannot subtract {left} from {right}: precisions differ")]
    PrecisionMismatch { left: String, right: String },

    /// Unit string that does not name a calendar or clock unit
    #[error("'{unit}' is not a temporal unit")]
    InvalidUnit { unit: String },
}

impl ValueError {
    pub fn format(target: &'static str, input: impl Into<String>) -> Self {
        Self::Format {
            target,
            input: input.into(),
        }
    }

    pub fn mismatch(operation: &'static str, left: impl ToString, right: impl ToString) -> Self {
        Self::TypeMismatch {
            operation,
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}
