//! Arithmetic Operators
//!
//! Implements: Add, Subtract, Multiply, Divide, TruncatedDivide, Modulo,
//! Power, Negate, Successor, Predecessor, Abs, Ceiling, Floor, Round,
//! Truncate, Exp, Ln, Log, MinValue, MaxValue, Precision, LowBoundary,
//! HighBoundary
//!
//! Integer and Long overflow, division by zero and temporal results outside
//! the supported range all produce Null rather than an error.

use crate::context::EvaluationContext;
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use octofhir_elm_model::expression::{BinaryExpression, RoundExpression};
use octofhir_elm_types::temporal::difference;
use octofhir_elm_types::{
    CqlDate, CqlDateTime, CqlQuantity, CqlTime, CqlType, CqlValue, DateTimePrecision, Temporal,
    TemporalUnit, ValueError, units_match,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

/// Smallest representable Decimal step
pub const DECIMAL_STEP: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Largest Decimal value: 20 integer digits and 8 fractional digits
pub const DECIMAL_MAX: Decimal = Decimal::from_parts(0x0FFF_FFFF, 0x3E25_0261, 0x204F_CE5E, false, 8);

pub const DECIMAL_MIN: Decimal = Decimal::from_parts(0x0FFF_FFFF, 0x3E25_0261, 0x204F_CE5E, true, 8);

/// Digits of precision carried by results computed through floating point
const FLOAT_DIGITS: u32 = 8;

// ============================================================================
// Numeric promotion
// ============================================================================

/// Both operands lifted to the narrower of their shared numeric types
enum NumericPair {
    Integer(i32, i32),
    Long(i64, i64),
    Decimal(Decimal, Decimal),
}

fn numeric_pair(left: &CqlValue, right: &CqlValue) -> Option<NumericPair> {
    use CqlValue as V;
    match (left, right) {
        (V::Integer(a), V::Integer(b)) => Some(NumericPair::Integer(*a, *b)),
        (V::Integer(_) | V::Long(_), V::Integer(_) | V::Long(_)) => {
            Some(NumericPair::Long(left.as_long()?, right.as_long()?))
        }
        _ => Some(NumericPair::Decimal(left.as_decimal()?, right.as_decimal()?)),
    }
}

/// Apply a checked operation at the promoted type; `None` becomes Null
fn numeric(
    operation: &'static str,
    left: &CqlValue,
    right: &CqlValue,
    integer: fn(i32, i32) -> Option<i32>,
    long: fn(i64, i64) -> Option<i64>,
    decimal: fn(Decimal, Decimal) -> Option<Decimal>,
) -> EvalResult<CqlValue> {
    let pair = numeric_pair(left, right).ok_or_else(|| {
        EvalError::from(ValueError::mismatch(operation, left.type_name(), right.type_name()))
    })?;
    Ok(match pair {
        NumericPair::Integer(a, b) => integer(a, b).into(),
        NumericPair::Long(a, b) => long(a, b).into(),
        NumericPair::Decimal(a, b) => decimal(a, b).and_then(in_decimal_range).into(),
    })
}

fn in_decimal_range(value: Decimal) -> Option<Decimal> {
    (DECIMAL_MIN..=DECIMAL_MAX).contains(&value).then_some(value)
}

fn from_float(value: f64) -> CqlValue {
    if !value.is_finite() {
        return CqlValue::Null;
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp(FLOAT_DIGITS).normalize())
        .and_then(in_decimal_range)
        .into()
}

fn to_float(value: &CqlValue, operation: &str) -> EvalResult<Option<f64>> {
    match value {
        CqlValue::Null => Ok(None),
        other => other
            .as_decimal()
            .map(|d| d.to_f64())
            .ok_or_else(|| EvalError::type_mismatch(operation, "Decimal", other.type_name())),
    }
}

// ============================================================================
// Quantities and temporal offsets
// ============================================================================

/// Same-unit quantity arithmetic; differing units give Null
fn quantity_op(
    a: &CqlQuantity,
    b: &CqlQuantity,
    op: fn(Decimal, Decimal) -> Option<Decimal>,
) -> CqlValue {
    if !units_match(&a.unit, &b.unit) {
        return CqlValue::Null;
    }
    op(a.value, b.value)
        .map(|value| CqlValue::Quantity(CqlQuantity::new(value, a.unit.clone())))
        .into()
}

fn scale_quantity(quantity: &CqlQuantity, factor: Decimal) -> CqlValue {
    quantity
        .value
        .checked_mul(factor)
        .map(|value| CqlValue::Quantity(CqlQuantity::new(value, quantity.unit.clone())))
        .into()
}

fn product_unit(a: &str, b: &str) -> String {
    match (a, b) {
        (CqlQuantity::DEFAULT_UNIT, other) | (other, CqlQuantity::DEFAULT_UNIT) => other.to_string(),
        _ => format!("{a}.{b}"),
    }
}

fn quotient_unit(a: &str, b: &str) -> String {
    if units_match(a, b) {
        CqlQuantity::DEFAULT_UNIT.to_string()
    } else if b == CqlQuantity::DEFAULT_UNIT {
        a.to_string()
    } else {
        format!("{a}/{b}")
    }
}

/// Move a temporal value by a calendar quantity; the quantity value is
/// truncated to whole units
fn shift<T: Temporal + Into<CqlValue>>(
    value: &T,
    quantity: &CqlQuantity,
    sign: i64,
) -> EvalResult<CqlValue> {
    let unit = TemporalUnit::parse(&quantity.unit)?;
    let Some(amount) = quantity.value.trunc().to_i64().and_then(|a| a.checked_mul(sign)) else {
        return Ok(CqlValue::Null);
    };
    match value.add(amount, unit) {
        Ok(shifted) => Ok(shifted.into()),
        Err(ValueError::OutOfRange { .. }) => Ok(CqlValue::Null),
        Err(e) => Err(e.into()),
    }
}

/// `a - b` as a quantity of whole units at the precision both carry
fn elapsed<T: Temporal>(a: &T, b: &T) -> EvalResult<CqlValue> {
    match difference(a, b) {
        Ok((amount, precision)) => Ok(CqlValue::Quantity(CqlQuantity::new(
            Decimal::from(amount),
            precision.plural(),
        ))),
        Err(ValueError::OutOfRange { .. }) => Ok(CqlValue::Null),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Binary arithmetic
// ============================================================================

pub fn add(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::Quantity(a), V::Quantity(b)) => Ok(quantity_op(a, b, Decimal::checked_add)),
        (V::Date(d), V::Quantity(q)) => shift(d, q, 1),
        (V::DateTime(d), V::Quantity(q)) => shift(d, q, 1),
        (V::Time(t), V::Quantity(q)) => shift(t, q, 1),
        _ => numeric(
            "Add",
            left,
            right,
            i32::checked_add,
            i64::checked_add,
            Decimal::checked_add,
        ),
    }
}

/// Subtraction; two temporal values of the same kind give the elapsed
/// quantity between them
pub fn subtract(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::Quantity(a), V::Quantity(b)) => Ok(quantity_op(a, b, Decimal::checked_sub)),
        (V::Date(d), V::Quantity(q)) => shift(d, q, -1),
        (V::DateTime(d), V::Quantity(q)) => shift(d, q, -1),
        (V::Time(t), V::Quantity(q)) => shift(t, q, -1),
        (V::Date(a), V::Date(b)) => elapsed(a, b),
        (V::DateTime(a), V::DateTime(b)) => elapsed(a, b),
        (V::Time(a), V::Time(b)) => elapsed(a, b),
        (V::Date(a), V::DateTime(b)) => elapsed(&a.to_datetime(), b),
        (V::DateTime(a), V::Date(b)) => elapsed(a, &b.to_datetime()),
        _ => numeric(
            "Subtract",
            left,
            right,
            i32::checked_sub,
            i64::checked_sub,
            Decimal::checked_sub,
        ),
    }
}

pub fn multiply(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::Quantity(a), V::Quantity(b)) => Ok(a
            .value
            .checked_mul(b.value)
            .map(|value| V::Quantity(CqlQuantity::new(value, product_unit(&a.unit, &b.unit))))
            .into()),
        (V::Quantity(q), n) | (n, V::Quantity(q)) => match n.as_decimal() {
            Some(factor) => Ok(scale_quantity(q, factor)),
            None => Err(EvalError::type_mismatch("Multiply", "numeric", n.type_name())),
        },
        _ => numeric(
            "Multiply",
            left,
            right,
            i32::checked_mul,
            i64::checked_mul,
            Decimal::checked_mul,
        ),
    }
}

fn decimal_quotient(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_div(b).map(|q| q.round_dp(FLOAT_DIGITS).normalize())
}

/// Division always yields Decimal (or Quantity); a zero divisor gives Null
pub fn divide(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (left, right) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::Quantity(a), V::Quantity(b)) => Ok(decimal_quotient(a.value, b.value)
            .map(|value| V::Quantity(CqlQuantity::new(value, quotient_unit(&a.unit, &b.unit))))
            .into()),
        (V::Quantity(q), n) => match n.as_decimal() {
            Some(divisor) => Ok(decimal_quotient(q.value, divisor)
                .map(|value| V::Quantity(CqlQuantity::new(value, q.unit.clone())))
                .into()),
            None => Err(EvalError::type_mismatch("Divide", "numeric", n.type_name())),
        },
        _ => match (left.as_decimal(), right.as_decimal()) {
            (Some(a), Some(b)) => Ok(decimal_quotient(a, b).and_then(in_decimal_range).into()),
            _ => Err(ValueError::mismatch("Divide", left.type_name(), right.type_name()).into()),
        },
    }
}

pub fn truncated_divide(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    match (left, right) {
        (CqlValue::Null, _) | (_, CqlValue::Null) => Ok(CqlValue::Null),
        (CqlValue::Quantity(a), CqlValue::Quantity(b)) => {
            Ok(quantity_op(a, b, |x, y| x.checked_div(y).map(|q| q.trunc())))
        }
        _ => numeric(
            "TruncatedDivide",
            left,
            right,
            i32::checked_div,
            i64::checked_div,
            |a, b| a.checked_div(b).map(|q| q.trunc()),
        ),
    }
}

/// Remainder with the sign of the dividend
pub fn modulo(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    match (left, right) {
        (CqlValue::Null, _) | (_, CqlValue::Null) => Ok(CqlValue::Null),
        (CqlValue::Quantity(a), CqlValue::Quantity(b)) => Ok(quantity_op(a, b, Decimal::checked_rem)),
        _ => numeric(
            "Modulo",
            left,
            right,
            i32::checked_rem,
            i64::checked_rem,
            Decimal::checked_rem,
        ),
    }
}

/// Integer and Long powers stay integral for non-negative exponents
pub fn power(base: &CqlValue, exponent: &CqlValue) -> EvalResult<CqlValue> {
    use CqlValue as V;
    match (base, exponent) {
        (V::Null, _) | (_, V::Null) => Ok(V::Null),
        (V::Integer(b), V::Integer(e)) if *e >= 0 => {
            Ok(u32::try_from(*e).ok().and_then(|e| b.checked_pow(e)).into())
        }
        (V::Integer(_) | V::Long(_), V::Integer(_) | V::Long(_))
            if exponent.as_long().is_some_and(|e| e >= 0) =>
        {
            let (b, e) = (base.as_long(), exponent.as_long());
            Ok(b.zip(e)
                .and_then(|(b, e)| u32::try_from(e).ok().and_then(|e| b.checked_pow(e)))
                .into())
        }
        _ => match (to_float(base, "Power")?, to_float(exponent, "Power")?) {
            (Some(b), Some(e)) => Ok(from_float(b.powf(e))),
            _ => Ok(V::Null),
        },
    }
}

/// `Log(x, base)`; non-positive operands and base 1 give Null
pub fn log(value: &CqlValue, base: &CqlValue) -> EvalResult<CqlValue> {
    match (to_float(value, "Log")?, to_float(base, "Log")?) {
        (Some(x), Some(b)) if x > 0.0 && b > 0.0 && b != 1.0 => Ok(from_float(x.ln() / b.ln())),
        _ => Ok(CqlValue::Null),
    }
}

// ============================================================================
// Unary arithmetic
// ============================================================================

pub fn negate(operand: &CqlValue) -> EvalResult<CqlValue> {
    match operand {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Integer(i) => Ok(i.checked_neg().into()),
        CqlValue::Long(l) => Ok(l.checked_neg().into()),
        CqlValue::Decimal(d) => Ok(CqlValue::Decimal(-*d)),
        CqlValue::Quantity(q) => Ok(CqlValue::Quantity(CqlQuantity::new(-q.value, q.unit.clone()))),
        other => Err(EvalError::type_mismatch("Negate", "numeric", other.type_name())),
    }
}

pub fn abs(operand: &CqlValue) -> EvalResult<CqlValue> {
    match operand {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Integer(i) => Ok(i.checked_abs().into()),
        CqlValue::Long(l) => Ok(l.checked_abs().into()),
        CqlValue::Decimal(d) => Ok(CqlValue::Decimal(d.abs())),
        CqlValue::Quantity(q) => Ok(CqlValue::Quantity(CqlQuantity::new(q.value.abs(), q.unit.clone()))),
        other => Err(EvalError::type_mismatch("Abs", "numeric", other.type_name())),
    }
}

/// Shared shape of Ceiling, Floor and Truncate: Decimal to Integer
fn integral(operand: &CqlValue, operation: &str, round: fn(&Decimal) -> Decimal) -> EvalResult<CqlValue> {
    match operand {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Integer(i) => Ok(CqlValue::Integer(*i)),
        CqlValue::Long(l) => Ok(i32::try_from(*l).ok().into()),
        CqlValue::Decimal(d) => Ok(round(d).to_i32().into()),
        other => Err(EvalError::type_mismatch(operation, "Decimal", other.type_name())),
    }
}

pub fn ceiling(operand: &CqlValue) -> EvalResult<CqlValue> {
    integral(operand, "Ceiling", Decimal::ceil)
}

pub fn floor(operand: &CqlValue) -> EvalResult<CqlValue> {
    integral(operand, "Floor", Decimal::floor)
}

pub fn truncate(operand: &CqlValue) -> EvalResult<CqlValue> {
    integral(operand, "Truncate", Decimal::trunc)
}

fn power_of_ten(digits: u32) -> Option<Decimal> {
    (0..digits).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(Decimal::TEN))
}

/// Round half towards positive infinity at `precision` fractional digits
pub fn round(operand: &CqlValue, precision: &CqlValue) -> EvalResult<CqlValue> {
    let digits = match precision {
        CqlValue::Null => 0,
        CqlValue::Integer(p) => u32::try_from(*p)
            .map_err(|_| EvalError::invalid_argument("Round", format!("negative precision {p}")))?,
        other => return Err(EvalError::type_mismatch("Round", "Integer", other.type_name())),
    };
    let value = match operand {
        CqlValue::Null => return Ok(CqlValue::Null),
        other => other
            .as_decimal()
            .ok_or_else(|| EvalError::type_mismatch("Round", "Decimal", other.type_name()))?,
    };

    let rounded = power_of_ten(digits).and_then(|factor| {
        let shifted = value.checked_mul(factor)?.checked_add(Decimal::new(5, 1))?;
        let mut result = shifted.floor().checked_div(factor)?;
        result.rescale(digits);
        Some(result)
    });
    Ok(rounded.into())
}

pub fn ln(operand: &CqlValue) -> EvalResult<CqlValue> {
    match to_float(operand, "Ln")? {
        Some(x) if x > 0.0 => Ok(from_float(x.ln())),
        _ => Ok(CqlValue::Null),
    }
}

pub fn exp(operand: &CqlValue) -> EvalResult<CqlValue> {
    Ok(to_float(operand, "Exp")?.map_or(CqlValue::Null, |x| from_float(x.exp())))
}

// ============================================================================
// Successor and Predecessor
// ============================================================================

fn step_temporal<T: Temporal + Into<CqlValue>>(
    value: &T,
    direction: i64,
    operation: &str,
) -> EvalResult<CqlValue> {
    let unit = TemporalUnit::from(value.precision());
    let limit = || EvalError::invalid_argument(operation, format!("no value beyond {value}"));
    let moved = value.add(direction, unit).map_err(|_| limit())?;
    // Time arithmetic wraps around midnight
    let wrapped = octofhir_elm_types::temporal::compare_temporal(&moved, value, None)
        .is_some_and(|o| o == std::cmp::Ordering::Less) == (direction > 0);
    if wrapped {
        return Err(limit());
    }
    Ok(moved.into())
}

fn step(operand: &CqlValue, direction: i64, operation: &str) -> EvalResult<CqlValue> {
    let limit = || EvalError::invalid_argument(operation, format!("no value beyond {operand}"));
    match operand {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Integer(i) => i
            .checked_add(if direction > 0 { 1 } else { -1 })
            .map(CqlValue::Integer)
            .ok_or_else(limit),
        CqlValue::Long(l) => l.checked_add(direction).map(CqlValue::Long).ok_or_else(limit),
        CqlValue::Decimal(d) => d
            .checked_add(DECIMAL_STEP * Decimal::from(direction))
            .and_then(in_decimal_range)
            .map(CqlValue::Decimal)
            .ok_or_else(limit),
        CqlValue::Quantity(q) => q
            .value
            .checked_add(DECIMAL_STEP * Decimal::from(direction))
            .and_then(in_decimal_range)
            .map(|value| CqlValue::Quantity(CqlQuantity::new(value, q.unit.clone())))
            .ok_or_else(limit),
        CqlValue::Date(d) => step_temporal(d, direction, operation),
        CqlValue::DateTime(d) => step_temporal(d, direction, operation),
        CqlValue::Time(t) => step_temporal(t, direction, operation),
        other => Err(EvalError::type_mismatch(operation, "ordered type", other.type_name())),
    }
}

/// Next value at the operand's precision; an error past the maximum
pub fn successor(operand: &CqlValue) -> EvalResult<CqlValue> {
    step(operand, 1, "Successor")
}

pub fn predecessor(operand: &CqlValue) -> EvalResult<CqlValue> {
    step(operand, -1, "Predecessor")
}

// ============================================================================
// Type extremes, precision and boundaries
// ============================================================================

fn extreme(type_name: &str, max: bool) -> EvalResult<CqlValue> {
    let operation = if max { "MaxValue" } else { "MinValue" };
    let value = match CqlType::from_name(type_name) {
        CqlType::Integer => CqlValue::Integer(if max { i32::MAX } else { i32::MIN }),
        CqlType::Long => CqlValue::Long(if max { i64::MAX } else { i64::MIN }),
        CqlType::Decimal => CqlValue::Decimal(if max { DECIMAL_MAX } else { DECIMAL_MIN }),
        CqlType::Date => CqlValue::Date(if max { CqlDate::max_value() } else { CqlDate::min_value() }),
        CqlType::DateTime => CqlValue::DateTime(if max {
            CqlDateTime::max_value()
        } else {
            CqlDateTime::min_value()
        }),
        CqlType::Time => CqlValue::Time(if max { CqlTime::max_value() } else { CqlTime::min_value() }),
        other => return Err(EvalError::unsupported(operation, other.name())),
    };
    Ok(value)
}

pub fn min_value(type_name: &str) -> EvalResult<CqlValue> {
    extreme(type_name, false)
}

pub fn max_value(type_name: &str) -> EvalResult<CqlValue> {
    extreme(type_name, true)
}

/// Number of digits of precision in the value
pub fn precision(operand: &CqlValue) -> EvalResult<CqlValue> {
    let digits = match operand {
        CqlValue::Null => return Ok(CqlValue::Null),
        CqlValue::Decimal(d) => i32::try_from(d.scale()).unwrap_or(i32::MAX),
        CqlValue::Date(d) => d.precision_digits(),
        CqlValue::DateTime(d) => d.precision_digits(),
        CqlValue::Time(t) => t.precision_digits(),
        other => return Err(EvalError::type_mismatch("Precision", "Decimal or temporal", other.type_name())),
    };
    Ok(CqlValue::Integer(digits))
}

fn decimal_boundary(value: Decimal, digits: i32, high: bool) -> CqlValue {
    let Ok(digits) = u32::try_from(digits) else {
        return CqlValue::Null;
    };
    let scale = value.scale();
    if digits > FLOAT_DIGITS || digits < scale {
        return CqlValue::Null;
    }
    let span = Decimal::new(1, scale) - Decimal::new(1, digits);
    let mut bound = match (value.is_sign_negative(), high) {
        (false, true) => value + span,
        (true, false) => value - span,
        _ => value,
    };
    bound.rescale(digits);
    CqlValue::Decimal(bound)
}

fn temporal_boundary<T: Temporal + Into<CqlValue>>(value: &T, digits: i32, high: bool) -> CqlValue {
    DateTimePrecision::ALL[T::FIRST..]
        .iter()
        .map(|p| value.boundary(*p, high))
        .find(|bound| bound.precision_digits() == digits)
        .into()
}

fn boundary(operand: &CqlValue, digits: &CqlValue, high: bool) -> EvalResult<CqlValue> {
    let operation = if high { "HighBoundary" } else { "LowBoundary" };
    let digits = match digits {
        CqlValue::Null => None,
        CqlValue::Integer(d) => Some(*d),
        other => return Err(EvalError::type_mismatch(operation, "Integer", other.type_name())),
    };
    let value = match operand {
        CqlValue::Null => CqlValue::Null,
        CqlValue::Decimal(d) => decimal_boundary(*d, digits.unwrap_or(8), high),
        CqlValue::Date(d) => temporal_boundary(d, digits.unwrap_or(8), high),
        CqlValue::DateTime(d) => temporal_boundary(d, digits.unwrap_or(17), high),
        CqlValue::Time(t) => temporal_boundary(t, digits.unwrap_or(9), high),
        other => return Err(EvalError::type_mismatch(operation, "Decimal or temporal", other.type_name())),
    };
    Ok(value)
}

/// Least value the operand could stand for at `digits` of precision
pub fn low_boundary(operand: &CqlValue, digits: &CqlValue) -> EvalResult<CqlValue> {
    boundary(operand, digits, false)
}

pub fn high_boundary(operand: &CqlValue, digits: &CqlValue) -> EvalResult<CqlValue> {
    boundary(operand, digits, true)
}

impl CqlEngine {
    pub fn eval_round(&self, expr: &RoundExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let operand = self.evaluate(&expr.operand, ctx)?;
        let precision = self.eval_optional(expr.precision.as_deref(), ctx)?;
        round(&operand, &precision)
    }

    /// Boundary operators accept a Null precision as "use the default"
    pub fn eval_boundary(
        &self,
        expr: &BinaryExpression,
        ctx: &mut EvaluationContext,
        high: bool,
    ) -> EvalResult<CqlValue> {
        let (operand, digits) = self.eval_binary_operands(expr, ctx)?;
        boundary(&operand, &digits, high)
    }
}
