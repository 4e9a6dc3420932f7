//! Value model for ELM evaluation
//!
//! This crate holds everything the evaluator knows about values without
//! needing an expression tree or an evaluation context:
//! - [`CqlValue`] and its component types
//! - precision-aware [`temporal`] values and calendar arithmetic
//! - strict equality, equivalence and ordering in [`compare`]
//! - the [`CqlType`] descriptors reported by [`CqlValue::point_type`]

pub mod compare;
pub mod error;
pub mod temporal;
pub mod type_system;
pub mod value;

pub use compare::{compare, compare_at, equal, equivalent, units_match};
pub use error::{ValueError, ValueResult};
pub use temporal::{
    CqlDate, CqlDateTime, CqlTime, DateTimePrecision, Temporal, TemporalUnit, TimezoneOffset,
};
pub use type_system::{CqlType, TupleTypeElement, SYSTEM_NAMESPACE_URI};
pub use value::{CqlCode, CqlConcept, CqlInterval, CqlList, CqlQuantity, CqlRatio, CqlTuple, CqlValue};
