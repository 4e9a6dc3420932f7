//! Interval Operators
//!
//! Implements: Start, End, PointFrom, Width, Size, Contains, In, Includes,
//! IncludedIn, ProperContains, ProperIn, ProperIncludes, ProperIncludedIn,
//! Before, After, Meets, MeetsBefore, MeetsAfter, Overlaps, OverlapsBefore,
//! OverlapsAfter, Starts, Ends, Collapse, Expand, Union, Intersect, Except
//!
//! A null bound is unknown, not unbounded: any relationship that needs it
//! evaluates to Null. Open bounds are normalised through Successor and
//! Predecessor before points are compared. Union, Intersect and Collapse
//! compare the normalised points but keep each bound as written.
//!
//! Most operators here also accept lists, in which case they defer to the
//! list module. Timing operators honour the node's precision attribute.

use crate::error::{EvalError, EvalResult};
use crate::operators::arithmetic::{DECIMAL_STEP, add, predecessor, subtract, successor};
use crate::operators::datetime::ordering_at;
use crate::operators::list;
use octofhir_elm_types::{CqlInterval, CqlList, CqlQuantity, CqlType, CqlValue, DateTimePrecision, Temporal, equal};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

type Precision = Option<DateTimePrecision>;

// ============================================================================
// Three-valued helpers
// ============================================================================

/// Conjunction: false wins, then unknown
fn all(results: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
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

/// Disjunction: true wins, then unknown
fn any(results: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for result in results {
        match result {
            Some(true) => return Some(true),
            None => unknown = true,
            Some(false) => {}
        }
    }
    if unknown { None } else { Some(false) }
}

fn holds(
    left: &CqlValue,
    right: &CqlValue,
    precision: Precision,
    accept: fn(Ordering) -> bool,
) -> EvalResult<Option<bool>> {
    Ok(ordering_at(left, right, precision)?.map(accept))
}

fn lt(a: &CqlValue, b: &CqlValue, p: Precision) -> EvalResult<Option<bool>> {
    holds(a, b, p, Ordering::is_lt)
}

fn le(a: &CqlValue, b: &CqlValue, p: Precision) -> EvalResult<Option<bool>> {
    holds(a, b, p, Ordering::is_le)
}

fn gt(a: &CqlValue, b: &CqlValue, p: Precision) -> EvalResult<Option<bool>> {
    holds(a, b, p, Ordering::is_gt)
}

fn ge(a: &CqlValue, b: &CqlValue, p: Precision) -> EvalResult<Option<bool>> {
    holds(a, b, p, Ordering::is_ge)
}

fn eq(a: &CqlValue, b: &CqlValue, p: Precision) -> EvalResult<Option<bool>> {
    holds(a, b, p, Ordering::is_eq)
}

fn mismatch(operation: &str, left: &CqlValue, right: &CqlValue) -> EvalError {
    EvalError::type_mismatch(
        operation,
        "Interval or List operands",
        format!("{} and {}", left.type_name(), right.type_name()),
    )
}

/// Drop fields finer than `precision` from a temporal point
fn truncate_to(value: &CqlValue, precision: Precision) -> CqlValue {
    match (value, precision) {
        (CqlValue::Date(d), Some(p)) => CqlValue::Date(d.truncate(p)),
        (CqlValue::DateTime(d), Some(p)) => CqlValue::DateTime(d.truncate(p)),
        (CqlValue::Time(t), Some(p)) => CqlValue::Time(t.truncate(p)),
        _ => value.clone(),
    }
}

// ============================================================================
// Bounds
// ============================================================================

/// First point of the interval; Null when the low bound is unknown
pub fn interval_start(interval: &CqlInterval) -> EvalResult<CqlValue> {
    match interval.low() {
        None => Ok(CqlValue::Null),
        Some(low) if interval.low_closed => Ok(low.clone()),
        Some(low) => successor(low),
    }
}

pub fn interval_end(interval: &CqlInterval) -> EvalResult<CqlValue> {
    match interval.high() {
        None => Ok(CqlValue::Null),
        Some(high) if interval.high_closed => Ok(high.clone()),
        Some(high) => predecessor(high),
    }
}

fn bounds(interval: &CqlInterval) -> EvalResult<(CqlValue, CqlValue)> {
    Ok((interval_start(interval)?, interval_end(interval)?))
}

fn interval_operand<'a>(value: &'a CqlValue, operation: &str) -> EvalResult<Option<&'a CqlInterval>> {
    match value {
        CqlValue::Null => Ok(None),
        CqlValue::Interval(i) => Ok(Some(i)),
        other => Err(EvalError::type_mismatch(operation, "Interval", other.type_name())),
    }
}

pub fn start(operand: &CqlValue) -> EvalResult<CqlValue> {
    interval_operand(operand, "Start")?.map_or(Ok(CqlValue::Null), interval_start)
}

pub fn end(operand: &CqlValue) -> EvalResult<CqlValue> {
    interval_operand(operand, "End")?.map_or(Ok(CqlValue::Null), interval_end)
}

/// The single point of a unit interval
pub fn point_from(operand: &CqlValue) -> EvalResult<CqlValue> {
    let Some(interval) = interval_operand(operand, "PointFrom")? else {
        return Ok(CqlValue::Null);
    };
    let (start, end) = bounds(interval)?;
    match equal(&start, &end) {
        Some(true) => Ok(start),
        None => Ok(CqlValue::Null),
        Some(false) => Err(EvalError::invalid_argument(
            "PointFrom",
            format!("{interval} is not a unit interval"),
        )),
    }
}

/// Distance between the end points
pub fn width(operand: &CqlValue) -> EvalResult<CqlValue> {
    let Some(interval) = interval_operand(operand, "Width")? else {
        return Ok(CqlValue::Null);
    };
    if interval.point_type.is_temporal() {
        return Err(EvalError::unsupported("Width", interval.point_type.name()));
    }
    let (start, end) = bounds(interval)?;
    subtract(&end, &start)
}

/// Number of points the interval covers at the point type's step
pub fn size(operand: &CqlValue) -> EvalResult<CqlValue> {
    let Some(interval) = interval_operand(operand, "Size")? else {
        return Ok(CqlValue::Null);
    };
    let span = width(operand)?;
    let step = match &interval.point_type {
        CqlType::Integer => CqlValue::Integer(1),
        CqlType::Long => CqlValue::Long(1),
        CqlType::Decimal => CqlValue::Decimal(DECIMAL_STEP),
        CqlType::Quantity => match interval.low().or(interval.high()) {
            Some(CqlValue::Quantity(q)) => CqlValue::Quantity(CqlQuantity::new(DECIMAL_STEP, q.unit.clone())),
            _ => return Ok(CqlValue::Null),
        },
        other => return Err(EvalError::unsupported("Size", other.name())),
    };
    add(&span, &step)
}

// ============================================================================
// Membership and inclusion
// ============================================================================

/// Whether `point` lies between the bounds, honouring each bound's closedness
pub fn point_in(point: &CqlValue, interval: &CqlInterval) -> EvalResult<Option<bool>> {
    point_in_at(point, interval, None)
}

fn point_in_at(point: &CqlValue, interval: &CqlInterval, precision: Precision) -> EvalResult<Option<bool>> {
    if point.is_null() {
        return Ok(None);
    }
    let above_low = match interval.low() {
        None => None,
        Some(low) if interval.low_closed => ge(point, low, precision)?,
        Some(low) => gt(point, low, precision)?,
    };
    let below_high = match interval.high() {
        None => None,
        Some(high) if interval.high_closed => le(point, high, precision)?,
        Some(high) => lt(point, high, precision)?,
    };
    Ok(all([above_low, below_high]))
}

/// Strictly inside: contained and equal to neither end point
fn point_properly_in(point: &CqlValue, interval: &CqlInterval, precision: Precision) -> EvalResult<Option<bool>> {
    let (start, end) = bounds(interval)?;
    Ok(all([
        point_in_at(point, interval, precision)?,
        eq(point, &start, precision)?.map(|b| !b),
        eq(point, &end, precision)?.map(|b| !b),
    ]))
}

fn interval_includes(a: &CqlInterval, b: &CqlInterval, precision: Precision) -> EvalResult<Option<bool>> {
    let ((sa, ea), (sb, eb)) = (bounds(a)?, bounds(b)?);
    Ok(all([le(&sa, &sb, precision)?, ge(&ea, &eb, precision)?]))
}

fn interval_properly_includes(a: &CqlInterval, b: &CqlInterval, precision: Precision) -> EvalResult<Option<bool>> {
    let ((sa, ea), (sb, eb)) = (bounds(a)?, bounds(b)?);
    Ok(all([
        interval_includes(a, b, precision)?,
        any([lt(&sa, &sb, precision)?, gt(&ea, &eb, precision)?]),
    ]))
}

/// Interval or list membership; `In` is this with the operands swapped
pub fn contains(container: &CqlValue, element: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    match container {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Interval(interval) => Ok(point_in_at(element, interval, precision)?.into()),
        CqlValue::List(items) => Ok(list::list_contains(items, element)),
        other => Err(mismatch("Contains", other, element)),
    }
}

pub fn in_container(element: &CqlValue, container: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    contains(container, element, precision)
}

pub fn proper_contains(container: &CqlValue, element: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    match container {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Interval(interval) => Ok(point_properly_in(element, interval, precision)?.into()),
        CqlValue::List(items) => Ok(list::list_properly_contains(items, element)),
        other => Err(mismatch("ProperContains", other, element)),
    }
}

pub fn proper_in(element: &CqlValue, container: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    proper_contains(container, element, precision)
}

pub fn includes(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::Interval(a), V::Interval(b)) => Ok(interval_includes(a, b, precision)?.into()),
        (V::Interval(a), point) => Ok(point_in_at(point, a, precision)?.into()),
        (V::List(a), V::List(b)) => Ok(list::list_includes(a, b)),
        (V::List(a), element) => Ok(list::list_contains(a, element)),
        _ => Err(mismatch("Includes", left, right)),
    }
}

pub fn included_in(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    includes(right, left, precision)
}

pub fn proper_includes(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::Interval(a), V::Interval(b)) => Ok(interval_properly_includes(a, b, precision)?.into()),
        (V::Interval(a), point) => Ok(point_properly_in(point, a, precision)?.into()),
        (V::List(a), V::List(b)) => Ok(list::list_properly_includes(a, b)),
        (V::List(a), element) => Ok(list::list_properly_contains(a, element)),
        _ => Err(mismatch("ProperIncludes", left, right)),
    }
}

pub fn proper_included_in(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    proper_includes(right, left, precision)
}

// ============================================================================
// Timing relationships
// ============================================================================

/// An interval as its end points; a point is its own start and end
fn span(value: &CqlValue) -> EvalResult<(CqlValue, CqlValue)> {
    match value {
        CqlValue::Interval(interval) => bounds(interval),
        point => Ok((point.clone(), point.clone())),
    }
}

fn timing(
    left: &CqlValue,
    right: &CqlValue,
    relation: impl FnOnce((CqlValue, CqlValue), (CqlValue, CqlValue)) -> EvalResult<Option<bool>>,
) -> EvalResult<CqlValue> {
    if left.is_null() || right.is_null() {
        return Ok(CqlValue::Null);
    }
    Ok(relation(span(left)?, span(right)?)?.into())
}

pub fn before(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |(_, ea), (sb, _)| lt(&ea, &sb, precision))
}

pub fn after(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |(sa, _), (_, eb)| gt(&sa, &eb, precision))
}

/// `end` is immediately followed by `start` at the given precision
fn adjacent(end: &CqlValue, start: &CqlValue, precision: Precision) -> EvalResult<Option<bool>> {
    if end.is_null() || start.is_null() {
        return Ok(None);
    }
    let next = successor(&truncate_to(end, precision))?;
    eq(&next, &truncate_to(start, precision), precision)
}

pub fn meets_before(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |(_, ea), (sb, _)| adjacent(&ea, &sb, precision))
}

pub fn meets_after(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    meets_before(right, left, precision)
}

pub fn meets(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |(sa, ea), (sb, eb)| {
        Ok(any([adjacent(&ea, &sb, precision)?, adjacent(&eb, &sa, precision)?]))
    })
}

/// Whether two intervals share at least one point
pub fn interval_overlaps(a: &CqlInterval, b: &CqlInterval) -> EvalResult<Option<bool>> {
    overlapping(bounds(a)?, bounds(b)?, None)
}

fn overlapping(
    (sa, ea): (CqlValue, CqlValue),
    (sb, eb): (CqlValue, CqlValue),
    precision: Precision,
) -> EvalResult<Option<bool>> {
    Ok(all([le(&sa, &eb, precision)?, le(&sb, &ea, precision)?]))
}

pub fn overlaps(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |a, b| overlapping(a, b, precision))
}

/// Overlaps, starting before the second operand starts
pub fn overlaps_before(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |a, b| {
        let starts_first = lt(&a.0, &b.0, precision)?;
        Ok(all([starts_first, overlapping(a, b, precision)?]))
    })
}

/// Overlaps, ending after the second operand ends
pub fn overlaps_after(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |a, b| {
        let ends_last = gt(&a.1, &b.1, precision)?;
        Ok(all([ends_last, overlapping(a, b, precision)?]))
    })
}

pub fn starts(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |(sa, ea), (sb, eb)| {
        Ok(all([eq(&sa, &sb, precision)?, le(&ea, &eb, precision)?]))
    })
}

pub fn ends(left: &CqlValue, right: &CqlValue, precision: Precision) -> EvalResult<CqlValue> {
    timing(left, right, |(sa, ea), (sb, eb)| {
        Ok(all([ge(&sa, &sb, precision)?, eq(&ea, &eb, precision)?]))
    })
}

// ============================================================================
// Set operations
// ============================================================================

fn closed(point_type: &CqlType, low: CqlValue, high: CqlValue) -> CqlValue {
    CqlValue::Interval(CqlInterval::typed(point_type.clone(), low, true, high, true))
}

/// A bound as written, alongside the point it normalises to
#[derive(Debug, Clone)]
struct Bound {
    value: CqlValue,
    closed: bool,
    point: CqlValue,
}

impl Bound {
    fn low(interval: &CqlInterval) -> EvalResult<Self> {
        Ok(Self {
            value: interval.low_value(),
            closed: interval.low_closed,
            point: interval_start(interval)?,
        })
    }

    fn high(interval: &CqlInterval) -> EvalResult<Self> {
        Ok(Self {
            value: interval.high_value(),
            closed: interval.high_closed,
            point: interval_end(interval)?,
        })
    }

    fn unknown() -> Self {
        Self {
            value: CqlValue::Null,
            closed: true,
            point: CqlValue::Null,
        }
    }
}

/// The bound whose point lies further towards `keep`. A bound value shared
/// by both sides takes the closedness `combine` gives.
fn pick(a: Bound, b: Bound, keep: Ordering, combine: fn(bool, bool) -> bool) -> EvalResult<Bound> {
    Ok(match ordering_at(&a.point, &b.point, None)? {
        None => Bound::unknown(),
        Some(Ordering::Equal) if equal(&a.value, &b.value) == Some(true) => Bound {
            closed: combine(a.closed, b.closed),
            ..a
        },
        Some(ordering) if ordering == keep.reverse() => b,
        Some(_) => a,
    })
}

fn between(point_type: &CqlType, low: Bound, high: Bound) -> CqlValue {
    CqlValue::Interval(CqlInterval::typed(
        point_type.clone(),
        low.value,
        low.closed,
        high.value,
        high.closed,
    ))
}

/// Overlapping part of two intervals; Null when they are disjoint
pub fn interval_intersect(a: &CqlInterval, b: &CqlInterval) -> EvalResult<CqlValue> {
    if interval_overlaps(a, b)? != Some(true) {
        return Ok(CqlValue::Null);
    }
    let low = pick(Bound::low(a)?, Bound::low(b)?, Ordering::Greater, |x, y| x && y)?;
    let high = pick(Bound::high(a)?, Bound::high(b)?, Ordering::Less, |x, y| x && y)?;
    Ok(between(&a.point_type, low, high))
}

/// Hull of two overlapping or adjacent intervals; disjoint inputs are an error
pub fn interval_union(a: &CqlInterval, b: &CqlInterval) -> EvalResult<CqlValue> {
    let (low_a, high_a) = (Bound::low(a)?, Bound::high(a)?);
    let (low_b, high_b) = (Bound::low(b)?, Bound::high(b)?);
    let joined = any([
        overlapping(
            (low_a.point.clone(), high_a.point.clone()),
            (low_b.point.clone(), high_b.point.clone()),
            None,
        )?,
        adjacent(&high_a.point, &low_b.point, None)?,
        adjacent(&high_b.point, &low_a.point, None)?,
    ]);
    match joined {
        Some(true) => {
            let low = pick(low_a, low_b, Ordering::Less, |x, y| x || y)?;
            let high = pick(high_a, high_b, Ordering::Greater, |x, y| x || y)?;
            Ok(between(&a.point_type, low, high))
        }
        None => Ok(CqlValue::Null),
        Some(false) => Err(EvalError::invalid_argument(
            "Union",
            format!("{a} and {b} neither overlap nor meet"),
        )),
    }
}

pub fn union(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::List(a), V::List(b)) => Ok(list::union_lists(a, b)),
        (V::Interval(a), V::Interval(b)) => interval_union(a, b),
        _ => Err(mismatch("Union", left, right)),
    }
}

pub fn intersect(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::List(a), V::List(b)) => Ok(list::intersect_lists(a, b)),
        (V::Interval(a), V::Interval(b)) => interval_intersect(a, b),
        _ => Err(mismatch("Intersect", left, right)),
    }
}

pub fn except(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::List(a), V::List(b)) => Ok(list::except_lists(a, b)),
        (V::Interval(_), V::Interval(_)) => Err(EvalError::unsupported("Except", "Interval, Interval")),
        _ => Err(mismatch("Except", left, right)),
    }
}

// ============================================================================
// Collapse and Expand
// ============================================================================

fn intervals_of<'a>(source: &'a CqlValue, operation: &str) -> EvalResult<Option<Vec<&'a CqlInterval>>> {
    match source {
        CqlValue::Null => Ok(None),
        CqlValue::Interval(i) => Ok(Some(vec![i])),
        CqlValue::List(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| interval_operand(v, operation)?.ok_or_else(|| EvalError::unresolved("interval")))
            .collect::<EvalResult<Vec<_>>>()
            .map(Some),
        other => Err(EvalError::type_mismatch(operation, "List<Interval>", other.type_name())),
    }
}

fn interval_list(element_type: CqlType, intervals: Vec<CqlValue>) -> CqlValue {
    CqlValue::List(CqlList::new(CqlType::interval(element_type), intervals))
}

/// Merge overlapping and adjacent intervals into a sorted, disjoint list
pub fn collapse(source: &CqlValue) -> EvalResult<CqlValue> {
    let Some(intervals) = intervals_of(source, "Collapse")? else {
        return Ok(CqlValue::Null);
    };
    let point_type = intervals.first().map_or(CqlType::Any, |i| i.point_type.clone());

    let mut spans = intervals
        .into_iter()
        .map(|i| -> EvalResult<(Bound, Bound)> { Ok((Bound::low(i)?, Bound::high(i)?)) })
        .collect::<EvalResult<Vec<_>>>()?;
    let mut failure = None;
    spans.sort_by(|(a, _), (b, _)| match ordering_at(&a.point, &b.point, None) {
        Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }

    let mut merged: Vec<(Bound, Bound)> = Vec::with_capacity(spans.len());
    for (low, high) in spans {
        if let Some((_, last_high)) = merged.last_mut() {
            let joins = any([
                le(&low.point, &last_high.point, None)?,
                adjacent(&last_high.point, &low.point, None)?,
            ]);
            if joins == Some(true) {
                *last_high = pick(last_high.clone(), high, Ordering::Greater, |x, y| x || y)?;
                continue;
            }
        }
        merged.push((low, high));
    }

    let collapsed = merged
        .into_iter()
        .map(|(low, high)| between(&point_type, low, high))
        .collect();
    Ok(interval_list(point_type, collapsed))
}

/// Unit step for a point value when no `per` quantity is given
fn default_per(point: &CqlValue) -> EvalResult<CqlValue> {
    Ok(match point {
        CqlValue::Integer(_) => CqlValue::Integer(1),
        CqlValue::Long(_) => CqlValue::Long(1),
        CqlValue::Decimal(_) => CqlValue::Decimal(Decimal::ONE),
        CqlValue::Quantity(q) => CqlValue::Quantity(CqlQuantity::new(Decimal::ONE, q.unit.clone())),
        CqlValue::Date(d) => CqlValue::quantity(Decimal::ONE, d.precision().name()),
        CqlValue::DateTime(d) => CqlValue::quantity(Decimal::ONE, d.precision().name()),
        CqlValue::Time(t) => CqlValue::quantity(Decimal::ONE, t.precision().name()),
        other => return Err(EvalError::type_mismatch("Expand", "ordered point type", other.type_name())),
    })
}

/// The step to add to `point`; a unitless quantity steps numeric points
fn step_for(point: &CqlValue, per: &CqlValue) -> EvalResult<CqlValue> {
    let step = match (point, per) {
        (CqlValue::Integer(_) | CqlValue::Long(_) | CqlValue::Decimal(_), CqlValue::Quantity(q)) => {
            match (point, q.value.fract().is_zero()) {
                (CqlValue::Integer(_), true) => q.value.to_i32().map_or(CqlValue::Null, CqlValue::Integer),
                (CqlValue::Long(_), true) => q.value.to_i64().map_or(CqlValue::Null, CqlValue::Long),
                _ => CqlValue::Decimal(q.value),
            }
        }
        _ => per.clone(),
    };
    let positive = match &step {
        CqlValue::Quantity(q) => q.value > Decimal::ZERO,
        other => other.as_decimal().is_some_and(|d| d > Decimal::ZERO),
    };
    if !positive {
        return Err(EvalError::invalid_argument("Expand", format!("per must be positive, got {per}")));
    }
    Ok(step)
}

fn expand_interval(interval: &CqlInterval, per: &CqlValue, out: &mut Vec<CqlValue>) -> EvalResult<()> {
    let (start, end) = bounds(interval)?;
    if start.is_null() || end.is_null() {
        return Ok(());
    }
    let per = if per.is_null() { default_per(&start)? } else { per.clone() };
    let step = step_for(&start, &per)?;

    let mut point = start;
    loop {
        let next = add(&point, &step)?;
        if next.is_null() {
            break;
        }
        let last = predecessor(&next)?;
        if le(&last, &end, None)? != Some(true) {
            break;
        }
        out.push(closed(&interval.point_type, point, last));
        point = next;
    }
    Ok(())
}

/// Split each interval into consecutive intervals of width `per`
pub fn expand(source: &CqlValue, per: &CqlValue) -> EvalResult<CqlValue> {
    let Some(intervals) = intervals_of(source, "Expand")? else {
        return Ok(CqlValue::Null);
    };
    let point_type = intervals.first().map_or(CqlType::Any, |i| i.point_type.clone());
    let mut out = Vec::new();
    for interval in intervals {
        expand_interval(interval, per, &mut out)?;
    }
    Ok(interval_list(point_type, out))
}
