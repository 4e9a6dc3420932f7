//! Type Operators
//!
//! Implements: As, Is, Convert, CanConvert, ToBoolean, ToChars, ToConcept,
//! ToDate, ToDateTime, ToDecimal, ToInteger, ToLong, ToList, ToQuantity,
//! ToRatio, ToString, ToTime and the matching ConvertsTo* predicates
//!
//! Conversions of a Null operand are Null. A String that does not parse as
//! the target type is a format error; ConvertsTo* turns that error into
//! `false`.

use crate::context::EvaluationContext;
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use octofhir_elm_model::expression::{TypeOperatorExpression, UnaryExpression};
use octofhir_elm_types::{
    CqlConcept, CqlDate, CqlDateTime, CqlList, CqlQuantity, CqlRatio, CqlTime, CqlType, CqlValue,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;

/// Field read from a Tuple to decide membership of a named model type
const RESOURCE_TYPE: &str = "resourceType";

// ============================================================================
// Type tests
// ============================================================================

/// Whether `value` is an instance of `target`; Null is an instance of nothing
pub fn is_type(value: &CqlValue, target: &CqlType) -> bool {
    match (value, target) {
        (CqlValue::Null, _) => false,
        (CqlValue::Tuple(tuple), CqlType::Named { name, .. }) => tuple
            .get(RESOURCE_TYPE)
            .and_then(CqlValue::as_str)
            .is_some_and(|resource_type| resource_type == name),
        _ => value.point_type().is_subtype_of(target),
    }
}

/// Cast `value` to `target`.
///
/// A mismatching value is Null, or a type mismatch when `strict`.
pub fn as_type(value: &CqlValue, target: &CqlType, strict: bool) -> EvalResult<CqlValue> {
    if value.is_null() || is_type(value, target) {
        return Ok(value.clone());
    }
    if strict {
        return Err(EvalError::type_mismatch("As", target.name(), value.type_name()));
    }
    Ok(CqlValue::Null)
}

/// Convert `value` to `target`; `offset` is the zone given to DateTime and
/// Time results parsed without one
pub fn convert(value: &CqlValue, target: &CqlType, offset: i16) -> EvalResult<CqlValue> {
    if value.is_null() {
        return Ok(CqlValue::Null);
    }
    match target {
        CqlType::Boolean => to_boolean(value),
        CqlType::Integer => to_integer(value),
        CqlType::Long => to_long(value),
        CqlType::Decimal => to_decimal(value),
        CqlType::String => to_string(value),
        CqlType::Date => to_date(value),
        CqlType::DateTime => to_datetime(value, offset),
        CqlType::Time => to_time(value, offset),
        CqlType::Quantity => to_quantity(value),
        CqlType::Ratio => to_ratio(value),
        CqlType::Concept => to_concept(value),
        CqlType::List(_) if !matches!(value, CqlValue::List(_)) => to_list(value),
        _ if value.point_type().is_subtype_of(target) => Ok(value.clone()),
        _ => Err(EvalError::unsupported(
            "Convert",
            format!("{} to {}", value.type_name(), target.name()),
        )),
    }
}

/// Whether [`convert`] would succeed with a non-null result
pub fn can_convert(value: &CqlValue, target: &CqlType, offset: i16) -> CqlValue {
    if value.is_null() {
        return CqlValue::Null;
    }
    converts(convert(value, target, offset))
}

fn converts(result: EvalResult<CqlValue>) -> CqlValue {
    CqlValue::Boolean(matches!(result, Ok(ref value) if !value.is_null()))
}

fn unconvertible(target: &str, value: &CqlValue) -> EvalError {
    EvalError::type_mismatch(format!("To{target}"), target, value.type_name())
}

// ============================================================================
// Conversions
// ============================================================================

pub fn to_boolean(value: &CqlValue) -> EvalResult<CqlValue> {
    let flag = match value {
        CqlValue::Null => return Ok(CqlValue::Null),
        CqlValue::Boolean(b) => *b,
        CqlValue::Integer(i) => integral_flag(i64::from(*i), value)?,
        CqlValue::Long(l) => integral_flag(*l, value)?,
        CqlValue::Decimal(d) if *d == Decimal::ONE => true,
        CqlValue::Decimal(d) if d.is_zero() => false,
        CqlValue::Decimal(d) => return Err(EvalError::format("Boolean", d.to_string())),
        CqlValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => true,
            "false" | "f" | "no" | "n" | "0" => false,
            _ => return Err(EvalError::format("Boolean", s.as_str())),
        },
        _ => return Err(unconvertible("Boolean", value)),
    };
    Ok(CqlValue::Boolean(flag))
}

fn integral_flag(n: i64, value: &CqlValue) -> EvalResult<bool> {
    match n {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(EvalError::format("Boolean", value.to_string())),
    }
}

/// Out-of-range Long and Decimal inputs are Null
pub fn to_integer(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Integer(i) => Ok(CqlValue::Integer(*i)),
        CqlValue::Long(l) => Ok(i32::try_from(*l).map_or(CqlValue::Null, CqlValue::Integer)),
        CqlValue::Decimal(d) => Ok(d.trunc().to_i32().map_or(CqlValue::Null, CqlValue::Integer)),
        CqlValue::Boolean(b) => Ok(CqlValue::Integer(i32::from(*b))),
        CqlValue::String(s) => parse_integral::<i32>(s, "Integer").map(CqlValue::Integer),
        _ => Err(unconvertible("Integer", value)),
    }
}

pub fn to_long(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Integer(i) => Ok(CqlValue::Long(i64::from(*i))),
        CqlValue::Long(l) => Ok(CqlValue::Long(*l)),
        CqlValue::Decimal(d) => Ok(d.trunc().to_i64().map_or(CqlValue::Null, CqlValue::Long)),
        CqlValue::Boolean(b) => Ok(CqlValue::Long(i64::from(*b))),
        CqlValue::String(s) => parse_integral::<i64>(s, "Long").map(CqlValue::Long),
        _ => Err(unconvertible("Long", value)),
    }
}

fn parse_integral<T: FromStr>(text: &str, target: &str) -> EvalResult<T> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EvalError::format(target, text));
    }
    trimmed
        .parse::<T>()
        .map_err(|_| EvalError::format(target, text))
}

pub fn to_decimal(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Integer(i) => Ok(CqlValue::Decimal(Decimal::from(*i))),
        CqlValue::Long(l) => Ok(CqlValue::Decimal(Decimal::from(*l))),
        CqlValue::Decimal(d) => Ok(CqlValue::Decimal(*d)),
        CqlValue::Boolean(b) => Ok(CqlValue::Decimal(if *b { Decimal::ONE } else { Decimal::ZERO })),
        CqlValue::String(s) => parse_decimal(s)
            .map(CqlValue::Decimal)
            .ok_or_else(|| EvalError::format("Decimal", s.as_str())),
        _ => Err(unconvertible("Decimal", value)),
    }
}

/// `[+-]digits[.digits]`; exponents and bare points are rejected
fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    let unsigned = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !fraction.is_none_or(all_digits) {
        return None;
    }
    Decimal::from_str(trimmed.strip_prefix('+').unwrap_or(trimmed)).ok()
}

pub fn to_string(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::String(s) => Ok(CqlValue::String(s.clone())),
        CqlValue::Boolean(_)
        | CqlValue::Integer(_)
        | CqlValue::Long(_)
        | CqlValue::Decimal(_)
        | CqlValue::Date(_)
        | CqlValue::DateTime(_)
        | CqlValue::Time(_)
        | CqlValue::Quantity(_)
        | CqlValue::Ratio(_) => Ok(CqlValue::String(value.to_string())),
        _ => Err(unconvertible("String", value)),
    }
}

pub fn to_date(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Date(d) => Ok(CqlValue::Date(*d)),
        CqlValue::DateTime(dt) => Ok(CqlValue::Date(dt.date())),
        CqlValue::String(s) => match CqlDate::parse(s.trim()) {
            Ok(date) => Ok(CqlValue::Date(date)),
            Err(_) => CqlDateTime::parse(s.trim())
                .map(|dt| CqlValue::Date(dt.date()))
                .map_err(|_| EvalError::format("Date", s.as_str())),
        },
        _ => Err(unconvertible("Date", value)),
    }
}

/// A result without an explicit zone takes `offset`
pub fn to_datetime(value: &CqlValue, offset: i16) -> EvalResult<CqlValue> {
    let datetime = match value {
        CqlValue::Null => return Ok(CqlValue::Null),
        CqlValue::DateTime(dt) => return Ok(CqlValue::DateTime(*dt)),
        CqlValue::Date(d) => d.to_datetime(),
        CqlValue::String(s) => {
            CqlDateTime::parse(s.trim()).map_err(|_| EvalError::format("DateTime", s.as_str()))?
        }
        _ => return Err(unconvertible("DateTime", value)),
    };
    Ok(CqlValue::DateTime(datetime.or_inferred_offset(offset)?))
}

/// Accepts `hh:mm:ss.fff` with an optional `T` prefix and zone
pub fn to_time(value: &CqlValue, offset: i16) -> EvalResult<CqlValue> {
    let time = match value {
        CqlValue::Null => return Ok(CqlValue::Null),
        CqlValue::Time(t) => return Ok(CqlValue::Time(*t)),
        CqlValue::DateTime(dt) => match dt.time() {
            Some(time) => time,
            None => return Ok(CqlValue::Null),
        },
        CqlValue::String(s) => {
            CqlTime::parse(s.trim()).map_err(|_| EvalError::format("Time", s.as_str()))?
        }
        _ => return Err(unconvertible("Time", value)),
    };
    Ok(CqlValue::Time(time.or_inferred_offset(offset)?))
}

pub fn to_quantity(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Quantity(q) => Ok(CqlValue::Quantity(q.clone())),
        CqlValue::Integer(_) | CqlValue::Long(_) | CqlValue::Decimal(_) => Ok(value
            .as_decimal()
            .map_or(CqlValue::Null, |d| CqlValue::Quantity(CqlQuantity::unitless(d)))),
        CqlValue::String(s) => parse_quantity(s)
            .map(CqlValue::Quantity)
            .ok_or_else(|| EvalError::format("Quantity", s.as_str())),
        _ => Err(unconvertible("Quantity", value)),
    }
}

/// `5`, `5 'mg'` or `5 days`
fn parse_quantity(text: &str) -> Option<CqlQuantity> {
    let trimmed = text.trim();
    let (number, unit) = match trimmed.split_once(char::is_whitespace) {
        Some((number, unit)) => (number, Some(unit.trim())),
        None => (trimmed, None),
    };
    let value = parse_decimal(number)?;
    match unit {
        None => Some(CqlQuantity::unitless(value)),
        Some(unit) => {
            let unit = match unit.strip_prefix('\'') {
                Some(quoted) => quoted.strip_suffix('\'')?,
                None => unit,
            };
            if unit.is_empty() || unit.contains(['\'', ' ']) {
                return None;
            }
            Some(CqlQuantity::new(value, unit))
        }
    }
}

/// `<quantity>:<quantity>`
pub fn to_ratio(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Ratio(r) => Ok(CqlValue::Ratio(r.clone())),
        CqlValue::String(s) => s
            .split_once(':')
            .and_then(|(numerator, denominator)| {
                Some(CqlRatio::new(
                    parse_quantity(numerator)?,
                    parse_quantity(denominator)?,
                ))
            })
            .map(CqlValue::Ratio)
            .ok_or_else(|| EvalError::format("Ratio", s.as_str())),
        _ => Err(unconvertible("Ratio", value)),
    }
}

/// A Code becomes a one-code Concept; a list of Codes becomes a Concept of
/// its non-null codes
pub fn to_concept(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::Concept(c) => Ok(CqlValue::Concept(c.clone())),
        CqlValue::Code(code) => Ok(CqlValue::Concept(CqlConcept::from_code(code.clone()))),
        CqlValue::List(list) => {
            let mut codes = Vec::with_capacity(list.len());
            for element in list.iter() {
                match element {
                    CqlValue::Code(code) => codes.push(code.clone()),
                    CqlValue::Null => {}
                    other => return Err(unconvertible("Concept", other)),
                }
            }
            Ok(CqlValue::Concept(CqlConcept::new(codes, None)))
        }
        _ => Err(unconvertible("Concept", value)),
    }
}

/// Null is the empty list; any other non-list value a singleton
pub fn to_list(value: &CqlValue) -> EvalResult<CqlValue> {
    Ok(match value {
        CqlValue::Null => CqlValue::List(CqlList::empty(CqlType::Any)),
        CqlValue::List(_) => value.clone(),
        other => CqlValue::List(CqlList::new(other.point_type(), vec![other.clone()])),
    })
}

/// Characters of a String, each as a one-character String
pub fn to_chars(value: &CqlValue) -> EvalResult<CqlValue> {
    match value {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::String(s) => Ok(CqlValue::List(CqlList::new(
            CqlType::String,
            s.chars().map(|c| CqlValue::String(c.to_string())).collect(),
        ))),
        _ => Err(unconvertible("Chars", value)),
    }
}

/// ConvertsTo*: Null for Null, otherwise whether `op` yields a value
pub fn converts_to(
    value: &CqlValue,
    op: impl FnOnce(&CqlValue) -> EvalResult<CqlValue>,
) -> CqlValue {
    if value.is_null() {
        return CqlValue::Null;
    }
    converts(op(value))
}

// ============================================================================
// Engine Implementation
// ============================================================================

impl CqlEngine {
    fn target_type(expr: &TypeOperatorExpression) -> EvalResult<CqlType> {
        if let Some(specifier) = &expr.type_specifier {
            return Ok(specifier.to_cql_type());
        }
        expr.type_name
            .as_deref()
            .map(CqlType::from_name)
            .ok_or_else(|| EvalError::invalid_argument("type operator", "no target type given"))
    }

    pub fn eval_is(&self, expr: &TypeOperatorExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let target = Self::target_type(expr)?;
        let value = self.evaluate(&expr.operand, ctx)?;
        Ok(CqlValue::Boolean(is_type(&value, &target)))
    }

    pub fn eval_as(&self, expr: &TypeOperatorExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let target = Self::target_type(expr)?;
        let value = self.evaluate(&expr.operand, ctx)?;
        as_type(&value, &target, expr.strict)
    }

    pub fn eval_convert(
        &self,
        expr: &TypeOperatorExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let target = Self::target_type(expr)?;
        let value = self.evaluate(&expr.operand, ctx)?;
        convert(&value, &target, ctx.timezone_offset())
    }

    pub fn eval_can_convert(
        &self,
        expr: &TypeOperatorExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let target = Self::target_type(expr)?;
        let value = self.evaluate(&expr.operand, ctx)?;
        Ok(can_convert(&value, &target, ctx.timezone_offset()))
    }

    /// To* conversion; `op` receives the evaluation zone
    pub fn eval_conversion(
        &self,
        expr: &UnaryExpression,
        ctx: &mut EvaluationContext,
        op: impl FnOnce(&CqlValue, i16) -> EvalResult<CqlValue>,
    ) -> EvalResult<CqlValue> {
        let value = self.evaluate(&expr.operand, ctx)?;
        op(&value, ctx.timezone_offset())
    }

    pub fn eval_converts_to(
        &self,
        expr: &UnaryExpression,
        ctx: &mut EvaluationContext,
        op: impl FnOnce(&CqlValue, i16) -> EvalResult<CqlValue>,
    ) -> EvalResult<CqlValue> {
        let value = self.evaluate(&expr.operand, ctx)?;
        let offset = ctx.timezone_offset();
        Ok(converts_to(&value, |v| op(v, offset)))
    }
}
