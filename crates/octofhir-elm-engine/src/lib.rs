//! ELM Evaluation Engine
//!
//! This crate evaluates ELM expression trees (the compiled form of CQL)
//! against a configured [`EvaluationContext`]. It covers the full operator
//! set:
//!
//! - **Logical and Nullological**: And, Or, Xor, Implies, Not with
//!   three-valued logic; IsNull, Coalesce, If, Case
//! - **Comparison**: Equal, Equivalent, Less, Greater and friends
//! - **Arithmetic**: Add, Subtract, Divide, Power, Round, Successor, etc.
//! - **String**: Concatenate, Split, Substring, Matches, ReplaceMatches, etc.
//! - **Date and Time**: selectors, DurationBetween, DifferenceBetween, SameAs
//! - **Interval**: Contains, Overlaps, Meets, Union, Collapse, Expand, etc.
//! - **List and Aggregate**: Filter, Sort, Flatten, Sum, Median, StdDev, etc.
//! - **Type**: As, Is, Convert, To* and ConvertsTo*
//! - **Clinical**: CalculateAge, InValueSet, InCodeSystem
//! - **Queries**: sources, let, with/without, where, return, aggregate, sort
//! - **Retrieve**: delegated to a [`DataProvider`]
//!
//! # Example
//!
//! ```
//! use octofhir_elm_engine::{CqlEngine, EvaluationContext};
//! use octofhir_elm_model::{Expression, Library};
//! use octofhir_elm_types::CqlValue;
//!
//! let library = Library::new("Example", None)
//!     .with_expression("Answer", Expression::add(Expression::integer(40), Expression::integer(2)));
//! let mut ctx = EvaluationContext::builder(library).build().unwrap();
//!
//! let results = CqlEngine::new().evaluate_library(&mut ctx).unwrap();
//! assert_eq!(results["Answer"], CqlValue::Integer(42));
//! ```
//!
//! # Null propagation
//!
//! Operators return Null rather than failing when an answer is unknown:
//!
//! - `And`: false dominates (null and false = false)
//! - `Or`: true dominates (null or true = true)
//! - Comparisons of temporal values at different precisions may be null
//! - Arithmetic overflow and division by zero are null
//!
//! Errors ([`EvalError`]) are reserved for malformed input, unresolved
//! names, cycles and collaborator failures.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod operators;
pub mod provider;
pub mod query;
pub mod reference;
pub mod retrieve;

pub use config::EvaluationOptions;
pub use context::{
    Binding, ContextConfig, EvaluationContext, EvaluationContextBuilder, Scope, ScopedName,
};
pub use engine::CqlEngine;
pub use error::{
    ConfigError, DataAccessError, EvalError, EvalResult, LibraryResolutionError, TerminologyError,
};
pub use provider::{
    CodeFilter, DataProvider, InMemoryDataProvider, InMemoryLibraryResolver, LibraryResolver,
    RetrieveContext, RetrieveRequest, TerminologyProvider, VocabularyRef, json_to_value,
};
