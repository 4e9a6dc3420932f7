//! ELM Operator Implementations
//!
//! Each family exposes value-level functions that can be called without a
//! context, plus the `CqlEngine` methods for node kinds that need one:
//! - Logical operators (And, Or, Xor, Implies, Not)
//! - Nullological operators (IsNull, Coalesce, If, Case, etc.)
//! - Comparison operators (Equal, Equivalent, Less, etc.)
//! - Arithmetic operators (Add, Subtract, Round, Successor, etc.)
//! - String operators (Concatenate, Split, Matches, etc.)
//! - DateTime operators (selectors, DurationBetween, SameAs, etc.)
//! - Interval operators (Contains, Overlaps, Union, Collapse, etc.)
//! - List operators (Exists, Filter, Sort, Flatten, etc.)
//! - Aggregate operators (Count, Sum, Median, StdDev, etc.)
//! - Type operators (As, Is, Convert, To*, ConvertsTo*)
//! - Clinical operators (CalculateAge, InValueSet, InCodeSystem)

pub mod aggregate;
pub mod arithmetic;
pub mod clinical;
pub mod comparison;
pub mod datetime;
pub mod interval;
pub mod list;
pub mod logical;
pub mod nullological;
pub mod string;
pub mod type_ops;
