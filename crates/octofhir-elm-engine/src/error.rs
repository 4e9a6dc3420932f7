//! Evaluation errors for the ELM engine
//!
//! Null propagation is never an error: operators that cannot produce a
//! definite answer return [`CqlValue::Null`](octofhir_elm_types::CqlValue).
//! Everything here is fatal to the top-level evaluation that raised it.

use octofhir_elm_types::ValueError;
use thiserror::Error;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that can occur during evaluation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    /// Malformed literal or conversion input
    #[error("invalid {target} format: '{input}'")]
    Format { target: String, input: String },

    /// Parameter with neither a bound value nor a default
    #[error("parameter '{name}' is not bound")]
    UnboundParameter { name: String },

    /// Name not found in any enclosing scope or library
    #[error("unresolved reference '{name}'")]
    UnresolvedReference { name: String },

    /// Definition (or let) that depends on itself
    #[error("circular reference to '{name}'")]
    CircularReference { name: String },

    #[error("library '{name}' not found: {message}")]
    LibraryNotFound { name: String, message: String },

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    /// Operator or overload that is not defined for its operands
    #[error("{operation} is not supported for {operands}")]
    UnsupportedOperation { operation: String, operands: String },

    #[error("type mismatch in {operation}: expected {expected}, found {found}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("maximum recursion depth of {limit} exceeded")]
    RecursionLimit { limit: usize },

    /// Operand values outside an operator's domain
    #[error("invalid argument to {operation}: {message}")]
    InvalidArgument { operation: String, message: String },

    #[error(transparent)]
    Terminology(#[from] TerminologyError),

    /// Raised by a `Message` node with `Error` severity
    #[error("{code}: {message}")]
    Message { code: String, message: String },

    /// First failure raised beneath a node carrying a source locator
    #[error("{source} (at {locator})")]
    Located {
        locator: String,
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn format(target: impl Into<String>, input: impl Into<String>) -> Self {
        Self::Format {
            target: target.into(),
            input: input.into(),
        }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::UnresolvedReference { name: name.into() }
    }

    pub fn unsupported(operation: impl Into<String>, operands: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            operands: operands.into(),
        }
    }

    pub fn type_mismatch(
        operation: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            operation: operation.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn invalid_argument(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Attach a locator unless the error already carries one
    pub fn at(self, locator: &str) -> Self {
        match self {
            Self::Located { .. } => self,
            other => Self::Located {
                locator: locator.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any locator stripped
    pub fn root(&self) -> &EvalError {
        match self {
            Self::Located { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn locator(&self) -> Option<&str> {
        match self {
            Self::Located { locator, .. } => Some(locator),
            _ => None,
        }
    }
}

impl From<ValueError> for EvalError {
    fn from(error: ValueError) -> Self {
        match error {
            ValueError::Format { target, input } => Self::format(target, input),
            ValueError::TypeMismatch {
                operation,
                left,
                right,
            } => Self::type_mismatch(operation, left, right),
            ValueError::InvalidComponent { target, reason } => {
                Self::invalid_argument(target, reason)
            }
            ValueError::OutOfRange { operation } => {
                Self::invalid_argument(operation, "result outside the supported range")
            }
            other @ ValueError::PrecisionMismatch { .. } => {
                Self::invalid_argument("Subtract", other.to_string())
            }
            other @ ValueError::InvalidUnit { .. } => {
                Self::invalid_argument("Quantity", other.to_string())
            }
        }
    }
}

/// Failure reported by a data provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("data access failed for {data_type}: {message}")]
pub struct DataAccessError {
    pub data_type: String,
    pub message: String,
}

impl DataAccessError {
    pub fn new(data_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by a library resolver
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LibraryResolutionError {
    #[error("library {name} (version {version}) is unknown")]
    NotFound { name: String, version: String },

    #[error("failed to load library {name}: {message}")]
    Load { name: String, message: String },
}

impl LibraryResolutionError {
    pub fn not_found(name: &str, version: Option<&str>) -> Self {
        Self::NotFound {
            name: name.to_string(),
            version: version.unwrap_or("any").to_string(),
        }
    }
}

/// Failure reported by a terminology provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("terminology lookup for {vocabulary} failed: {message}")]
pub struct TerminologyError {
    pub vocabulary: String,
    pub message: String,
}

impl TerminologyError {
    pub fn new(vocabulary: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            vocabulary: vocabulary.into(),
            message: message.into(),
        }
    }
}

/// Invalid context configuration, detected once at construction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("data provider registered with an empty namespace URI")]
    EmptyNamespace,

    #[error("parameter binding with an empty name")]
    EmptyParameterName,

    #[error("max recursion depth must be at least 1")]
    ZeroRecursionDepth,

    #[error("timezone offset of {minutes} minutes is beyond +/-14:00")]
    InvalidTimezoneOffset { minutes: i16 },

    #[error("evaluation timestamp '{value}' is not a valid DateTime")]
    InvalidTimestamp { value: String },

    #[error("invalid options document: {message}")]
    Parse { message: String },
}
