//! Aggregate Operators
//!
//! Implements: Aggregate, Count, Sum, Product, Min, Max, Avg, GeometricMean,
//! Median, Mode, Variance, StdDev, PopulationVariance, PopulationStdDev,
//! AllTrue, AnyTrue
//!
//! Null elements are ignored. An empty (or Null) source gives Null, except
//! for Count (0), AllTrue (true) and AnyTrue (false).

use crate::context::{EvaluationContext, Scope, THIS, TOTAL};
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use crate::operators::arithmetic::{add, divide, multiply};
use crate::operators::list::{distinct, nulls_first};
use octofhir_elm_model::expression::{AggregateExpression, AggregateFold};
use octofhir_elm_types::compare::position_equivalent;
use octofhir_elm_types::{CqlList, CqlQuantity, CqlValue, compare, units_match};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;

const DIGITS: u32 = 8;

/// Non-null elements of the source
fn present<'a>(source: &'a CqlValue, operation: &str) -> EvalResult<Vec<&'a CqlValue>> {
    match source {
        CqlValue::Null => Ok(Vec::new()),
        CqlValue::List(list) => Ok(list.iter().filter(|v| !v.is_null()).collect()),
        other => Err(EvalError::type_mismatch(operation, "List", other.type_name())),
    }
}

fn fold(
    values: &[&CqlValue],
    op: fn(&CqlValue, &CqlValue) -> EvalResult<CqlValue>,
) -> EvalResult<CqlValue> {
    let Some((head, rest)) = values.split_first() else {
        return Ok(CqlValue::Null);
    };
    rest.iter().try_fold((*head).clone(), |acc, v| op(&acc, v))
}

fn as_decimal_result(value: CqlValue) -> CqlValue {
    match value {
        CqlValue::Integer(_) | CqlValue::Long(_) => value.as_decimal().into(),
        other => other,
    }
}

/// Element values as decimals plus the shared unit when they are quantities;
/// quantities in different units give `None`
fn samples(values: &[&CqlValue], operation: &str) -> EvalResult<Option<(Vec<Decimal>, Option<String>)>> {
    let mut unit: Option<String> = None;
    let mut decimals = Vec::with_capacity(values.len());
    for value in values {
        match value {
            CqlValue::Quantity(q) => {
                match &unit {
                    Some(u) if !units_match(u, &q.unit) => return Ok(None),
                    Some(_) => {}
                    None => unit = Some(q.unit.clone()),
                }
                decimals.push(q.value);
            }
            other => decimals.push(other.as_decimal().ok_or_else(|| {
                EvalError::type_mismatch(operation, "numeric or Quantity", other.type_name())
            })?),
        }
    }
    Ok(Some((decimals, unit)))
}

fn with_unit(value: Option<Decimal>, unit: Option<String>) -> CqlValue {
    match (value, unit) {
        (Some(v), Some(unit)) => CqlValue::Quantity(CqlQuantity::new(v, unit)),
        (value, None) => value.into(),
        (None, Some(_)) => CqlValue::Null,
    }
}

// ============================================================================
// Counting and folding
// ============================================================================

pub fn count(source: &CqlValue) -> EvalResult<CqlValue> {
    let n = present(source, "Count")?.len();
    Ok(CqlValue::Integer(i32::try_from(n).unwrap_or(i32::MAX)))
}

pub fn sum(source: &CqlValue) -> EvalResult<CqlValue> {
    fold(&present(source, "Sum")?, add)
}

pub fn product(source: &CqlValue) -> EvalResult<CqlValue> {
    fold(&present(source, "Product")?, multiply)
}

fn extreme(source: &CqlValue, operation: &str, keep: Ordering) -> EvalResult<CqlValue> {
    let mut best: Option<&CqlValue> = None;
    for value in present(source, operation)? {
        best = match best {
            None => Some(value),
            Some(current) => match compare(value, current)? {
                Some(ordering) if ordering == keep => Some(value),
                _ => Some(current),
            },
        };
    }
    Ok(best.cloned().unwrap_or(CqlValue::Null))
}

pub fn min(source: &CqlValue) -> EvalResult<CqlValue> {
    extreme(source, "Min", Ordering::Less)
}

pub fn max(source: &CqlValue) -> EvalResult<CqlValue> {
    extreme(source, "Max", Ordering::Greater)
}

// ============================================================================
// Statistics
// ============================================================================

pub fn avg(source: &CqlValue) -> EvalResult<CqlValue> {
    let values = present(source, "Avg")?;
    if values.is_empty() {
        return Ok(CqlValue::Null);
    }
    let total = fold(&values, add)?;
    divide(&total, &CqlValue::Decimal(Decimal::from(values.len())))
}

/// n-th root of the product, computed in floating point
pub fn geometric_mean(source: &CqlValue) -> EvalResult<CqlValue> {
    let values = present(source, "GeometricMean")?;
    let Some((decimals, _)) = samples(&values, "GeometricMean")? else {
        return Ok(CqlValue::Null);
    };
    if decimals.is_empty() || decimals.iter().any(|d| *d <= Decimal::ZERO) {
        return Ok(CqlValue::Null);
    }
    let log_sum: f64 = decimals.iter().filter_map(|d| d.to_f64()).map(f64::ln).sum();
    let mean = (log_sum / decimals.len() as f64).exp();
    Ok(Decimal::from_f64(mean).map(|d| d.round_dp(DIGITS).normalize()).into())
}

/// Middle element; the mean of the two middle elements for even counts
pub fn median(source: &CqlValue) -> EvalResult<CqlValue> {
    let mut values: Vec<CqlValue> = present(source, "Median")?.into_iter().cloned().collect();
    if values.is_empty() {
        return Ok(CqlValue::Null);
    }
    let mut failure = None;
    values.sort_by(|a, b| {
        nulls_first(a, b).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    if let Some(e) = failure {
        return Err(e);
    }
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        return Ok(as_decimal_result(values[mid].clone()));
    }
    let pair = add(&values[mid - 1], &values[mid])?;
    divide(&pair, &CqlValue::Decimal(Decimal::TWO))
}

/// Most frequent element; ties go to the one seen first
pub fn mode(source: &CqlValue) -> EvalResult<CqlValue> {
    let mut tallies: Vec<(CqlValue, usize)> = Vec::new();
    for value in present(source, "Mode")? {
        match position_equivalent(tallies.iter().map(|(v, _)| v), value) {
            Some(i) => tallies[i].1 += 1,
            None => tallies.push((value.clone(), 1)),
        }
    }
    let mut best: Option<(CqlValue, usize)> = None;
    for (value, n) in tallies {
        if best.as_ref().is_none_or(|(_, top)| n > *top) {
            best = Some((value, n));
        }
    }
    Ok(best.map_or(CqlValue::Null, |(value, _)| value))
}

/// Mean squared deviation; `sample` divides by n - 1
fn dispersion(source: &CqlValue, operation: &str, sample: bool, root: bool) -> EvalResult<CqlValue> {
    let values = present(source, operation)?;
    let Some((decimals, unit)) = samples(&values, operation)? else {
        return Ok(CqlValue::Null);
    };
    let n = decimals.len();
    let divisor = if sample { n.saturating_sub(1) } else { n };
    if divisor == 0 {
        return Ok(CqlValue::Null);
    }

    let total: Option<Decimal> = decimals.iter().try_fold(Decimal::ZERO, |acc, d| acc.checked_add(*d));
    let Some(mean) = total.and_then(|t| t.checked_div(Decimal::from(n))) else {
        return Ok(CqlValue::Null);
    };
    let squares = decimals.iter().try_fold(Decimal::ZERO, |acc, d| {
        let deviation = d.checked_sub(mean)?;
        acc.checked_add(deviation.checked_mul(deviation)?)
    });
    let variance = squares.and_then(|s| s.checked_div(Decimal::from(divisor)));

    let result = if root {
        variance
            .and_then(|v| v.to_f64())
            .and_then(|v| Decimal::from_f64(v.sqrt()))
    } else {
        variance
    };
    Ok(with_unit(result.map(|r| r.round_dp(DIGITS).normalize()), unit))
}

pub fn variance(source: &CqlValue) -> EvalResult<CqlValue> {
    dispersion(source, "Variance", true, false)
}

pub fn std_dev(source: &CqlValue) -> EvalResult<CqlValue> {
    dispersion(source, "StdDev", true, true)
}

pub fn population_variance(source: &CqlValue) -> EvalResult<CqlValue> {
    dispersion(source, "PopulationVariance", false, false)
}

pub fn population_std_dev(source: &CqlValue) -> EvalResult<CqlValue> {
    dispersion(source, "PopulationStdDev", false, true)
}

// ============================================================================
// Boolean aggregates
// ============================================================================

fn booleans(source: &CqlValue, operation: &str) -> EvalResult<Vec<bool>> {
    present(source, operation)?
        .into_iter()
        .map(|v| {
            v.as_boolean()
                .ok_or_else(|| EvalError::type_mismatch(operation, "Boolean", v.type_name()))
        })
        .collect()
}

pub fn all_true(source: &CqlValue) -> EvalResult<CqlValue> {
    Ok(CqlValue::Boolean(booleans(source, "AllTrue")?.into_iter().all(|b| b)))
}

pub fn any_true(source: &CqlValue) -> EvalResult<CqlValue> {
    Ok(CqlValue::Boolean(booleans(source, "AnyTrue")?.into_iter().any(|b| b)))
}

impl CqlEngine {
    /// Evaluate the source, project `path` from each element, then aggregate
    pub fn eval_aggregate(
        &self,
        expr: &AggregateExpression,
        ctx: &mut EvaluationContext,
        op: fn(&CqlValue) -> EvalResult<CqlValue>,
    ) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let source = match (&expr.path, &source) {
            (Some(path), CqlValue::List(list)) => CqlValue::List(CqlList::from_values(
                list.iter().map(|item| self.read_property(item, path, ctx)).collect(),
            )),
            _ => source,
        };
        op(&source)
    }

    /// Fold with the element bound as `$this` and the running value as `$total`
    pub fn eval_aggregate_fold(&self, expr: &AggregateFold, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let source = if expr.distinct { distinct(&source)? } else { source };
        let Some(list) = source.as_list() else {
            return match source {
                CqlValue::Null => Ok(CqlValue::Null),
                other => Err(EvalError::type_mismatch("Aggregate", "List", other.type_name())),
            };
        };

        let mut total = self.eval_optional(expr.initial_value.as_deref(), ctx)?;
        for item in list.iter() {
            let scope = Scope::new()
                .with_value(THIS, item.clone())
                .with_value(TOTAL, total);
            total = ctx.with_scope(scope, |ctx| self.evaluate(&expr.iteration, ctx))?;
        }
        Ok(total)
    }
}
