//! Comparison Operators
//!
//! Implements: Equal, NotEqual, Equivalent, Less, Greater, LessOrEqual,
//! GreaterOrEqual

use crate::error::EvalResult;
use octofhir_elm_types::{CqlValue, compare};
use std::cmp::Ordering;

pub fn equal(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    Ok(octofhir_elm_types::equal(left, right).into())
}

pub fn not_equal(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    Ok(octofhir_elm_types::equal(left, right).map(|b| !b).into())
}

/// Never Null: two Nulls are equivalent, Null and a value are not
pub fn equivalent(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    Ok(CqlValue::Boolean(octofhir_elm_types::equivalent(left, right)))
}

fn ordered(
    left: &CqlValue,
    right: &CqlValue,
    accept: impl Fn(Ordering) -> bool,
) -> EvalResult<CqlValue> {
    Ok(compare(left, right)?.map(accept).into())
}

pub fn less(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    ordered(left, right, Ordering::is_lt)
}

pub fn greater(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    ordered(left, right, Ordering::is_gt)
}

pub fn less_or_equal(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    ordered(left, right, Ordering::is_le)
}

pub fn greater_or_equal(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    ordered(left, right, Ordering::is_ge)
}
