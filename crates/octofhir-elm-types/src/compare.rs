//! Equality, equivalence and ordering
//!
//! Two notions of sameness coexist. [`equal`] admits uncertainty: it returns
//! `None` whenever an operand is Null or temporal precision prevents a
//! definite answer. [`equivalent`] always decides and is what deduplication
//! and membership use.

use crate::error::{ValueError, ValueResult};
use crate::temporal::{
    compare_temporal, equivalent_temporal, CqlDateTime, DateTimePrecision, TemporalUnit,
};
use crate::value::{CqlCode, CqlInterval, CqlQuantity, CqlTuple, CqlValue};
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Strict equality; `None` means unknown
pub fn equal(a: &CqlValue, b: &CqlValue) -> Option<bool> {
    use CqlValue as V;

    if a.is_null() || b.is_null() {
        return None;
    }

    match (a, b) {
        (V::Boolean(x), V::Boolean(y)) => Some(x == y),
        (V::String(x), V::String(y)) => Some(x == y),
        (V::Date(x), V::Date(y)) => compare_temporal(x, y, None).map(Ordering::is_eq),
        (V::Time(x), V::Time(y)) => compare_temporal(x, y, None).map(Ordering::is_eq),
        (V::DateTime(_) | V::Date(_), V::DateTime(_) | V::Date(_)) => {
            let (x, y) = (as_datetime(a)?, as_datetime(b)?);
            compare_temporal(&x, &y, None).map(Ordering::is_eq)
        }
        (V::Quantity(x), V::Quantity(y)) => quantity_equal(x, y),
        (V::Ratio(x), V::Ratio(y)) => all_of([
            quantity_equal(&x.numerator, &y.numerator),
            quantity_equal(&x.denominator, &y.denominator),
        ]),
        (V::Code(x), V::Code(y)) => Some(code_equal(x, y)),
        (V::Concept(x), V::Concept(y)) => Some(
            x.codes.len() == y.codes.len()
                && x.codes.iter().zip(&y.codes).all(|(c, d)| code_equal(c, d)),
        ),
        (V::List(x), V::List(y)) => {
            if x.len() != y.len() {
                return Some(false);
            }
            all_of(x.iter().zip(y.iter()).map(|(l, r)| equal(l, r)))
        }
        (V::Interval(x), V::Interval(y)) => interval_equal(x, y),
        (V::Tuple(x), V::Tuple(y)) => tuple_equal(x, y),
        _ => match (a.as_decimal(), b.as_decimal()) {
            (Some(x), Some(y)) => Some(x == y),
            _ => Some(false),
        },
    }
}

/// Equivalence; never unknown
pub fn equivalent(a: &CqlValue, b: &CqlValue) -> bool {
    use CqlValue as V;

    match (a, b) {
        (V::Null, V::Null) => true,
        (V::Null, _) | (_, V::Null) => false,
        (V::Boolean(x), V::Boolean(y)) => x == y,
        (V::String(x), V::String(y)) => normalize_text(x) == normalize_text(y),
        (V::Date(x), V::Date(y)) => equivalent_temporal(x, y),
        (V::Time(x), V::Time(y)) => equivalent_temporal(x, y),
        (V::DateTime(_) | V::Date(_), V::DateTime(_) | V::Date(_)) => {
            match (as_datetime(a), as_datetime(b)) {
                (Some(x), Some(y)) => equivalent_temporal(&x, &y),
                _ => false,
            }
        }
        (V::Quantity(x), V::Quantity(y)) => quantity_equivalent(x, y),
        (V::Ratio(x), V::Ratio(y)) => {
            quantity_equivalent(&x.numerator, &y.numerator)
                && quantity_equivalent(&x.denominator, &y.denominator)
        }
        (V::Code(x), V::Code(y)) => code_equivalent(x, y),
        (V::Concept(x), V::Concept(y)) => x
            .codes
            .iter()
            .any(|c| y.codes.iter().any(|d| code_equivalent(c, d))),
        (V::Code(code), V::Concept(concept)) | (V::Concept(concept), V::Code(code)) => {
            concept.codes.iter().any(|c| code_equivalent(c, code))
        }
        (V::List(x), V::List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| equivalent(l, r))
        }
        (V::Interval(x), V::Interval(y)) => {
            x.low_closed == y.low_closed
                && x.high_closed == y.high_closed
                && equivalent(&x.low_value(), &y.low_value())
                && equivalent(&x.high_value(), &y.high_value())
        }
        (V::Tuple(x), V::Tuple(y)) => {
            x.len() == y.len()
                && x.iter().all(|(name, value)| {
                    y.get(name).is_some_and(|other| equivalent(value, other))
                })
        }
        _ => match (a.as_decimal(), b.as_decimal()) {
            (Some(x), Some(y)) => decimal_equivalent(x, y),
            _ => false,
        },
    }
}

/// Ordering used by relational operators, Min/Max and sorting.
///
/// `Ok(None)` is an unknown ordering (a Null operand, temporal uncertainty,
/// or quantities in different units). Kinds without an ordering are an error.
pub fn compare(a: &CqlValue, b: &CqlValue) -> ValueResult<Option<Ordering>> {
    compare_with(a, b, None)
}

/// Ordering of two temporal values considering fields up to `precision` only
pub fn compare_at(
    a: &CqlValue,
    b: &CqlValue,
    precision: DateTimePrecision,
) -> ValueResult<Option<Ordering>> {
    match (a, b) {
        (CqlValue::Null, _) | (_, CqlValue::Null) => Ok(None),
        (
            CqlValue::Date(_) | CqlValue::DateTime(_) | CqlValue::Time(_),
            CqlValue::Date(_) | CqlValue::DateTime(_) | CqlValue::Time(_),
        ) => compare_with(a, b, Some(precision)),
        _ => Err(ValueError::mismatch("SameAs", a.type_name(), b.type_name())),
    }
}

fn compare_with(
    a: &CqlValue,
    b: &CqlValue,
    limit: Option<DateTimePrecision>,
) -> ValueResult<Option<Ordering>> {
    use CqlValue as V;

    let ordering = match (a, b) {
        (V::Null, _) | (_, V::Null) => None,
        (V::String(x), V::String(y)) => Some(x.cmp(y)),
        (V::Boolean(x), V::Boolean(y)) => Some(x.cmp(y)),
        (V::Date(x), V::Date(y)) => compare_temporal(x, y, limit),
        (V::Time(x), V::Time(y)) => compare_temporal(x, y, limit),
        (V::DateTime(_) | V::Date(_), V::DateTime(_) | V::Date(_)) => {
            match (as_datetime(a), as_datetime(b)) {
                (Some(x), Some(y)) => compare_temporal(&x, &y, limit),
                _ => None,
            }
        }
        (V::Quantity(x), V::Quantity(y)) => {
            units_match(&x.unit, &y.unit).then(|| x.value.cmp(&y.value))
        }
        _ => match (a.as_decimal(), b.as_decimal()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => return Err(ValueError::mismatch("Compare", a.type_name(), b.type_name())),
        },
    };
    Ok(ordering)
}

/// Index of the first element equivalent to `target`
pub fn position_equivalent<'a>(
    mut items: impl Iterator<Item = &'a CqlValue>,
    target: &CqlValue,
) -> Option<usize> {
    items.position(|item| equivalent(item, target))
}

/// Three-valued conjunction of pairwise results
fn all_of(results: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for result in results {
        match result {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }
    if unknown { None } else { Some(true) }
}

fn as_datetime(value: &CqlValue) -> Option<CqlDateTime> {
    match value {
        CqlValue::DateTime(dt) => Some(*dt),
        CqlValue::Date(d) => Some(d.to_datetime()),
        _ => None,
    }
}

/// Units are opaque strings, except that calendar spellings of the same
/// duration unit (`day`, `days`, `d`) are treated as one unit.
pub fn units_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (TemporalUnit::parse(a), TemporalUnit::parse(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

fn quantity_equal(a: &CqlQuantity, b: &CqlQuantity) -> Option<bool> {
    units_match(&a.unit, &b.unit).then(|| a.value == b.value)
}

fn quantity_equivalent(a: &CqlQuantity, b: &CqlQuantity) -> bool {
    units_match(&a.unit, &b.unit) && decimal_equivalent(a.value, b.value)
}

/// Decimals are equivalent when equal at the lesser of their scales
fn decimal_equivalent(a: Decimal, b: Decimal) -> bool {
    let scale = a.scale().min(b.scale());
    a.round_dp(scale) == b.round_dp(scale)
}

fn code_equal(a: &CqlCode, b: &CqlCode) -> bool {
    a.code == b.code && a.system == b.system && a.version == b.version
}

fn code_equivalent(a: &CqlCode, b: &CqlCode) -> bool {
    a.code == b.code && a.system == b.system
}

fn interval_equal(a: &CqlInterval, b: &CqlInterval) -> Option<bool> {
    if a.low_closed != b.low_closed || a.high_closed != b.high_closed {
        return Some(false);
    }
    all_of([
        equal(&a.low_value(), &b.low_value()),
        equal(&a.high_value(), &b.high_value()),
    ])
}

fn tuple_equal(a: &CqlTuple, b: &CqlTuple) -> Option<bool> {
    if a.len() != b.len() || a.iter().any(|(name, _)| b.get(name).is_none()) {
        return Some(false);
    }
    all_of(a.iter().map(|(name, value)| {
        b.get(name).map_or(Some(false), |other| equal(value, other))
    }))
}

/// Lower-case and collapse runs of whitespace
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
