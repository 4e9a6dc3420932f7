//! Operator families evaluated end to end through the engine
//!
//! Every test builds an expression tree, evaluates it in a context with a
//! fixed clock and checks the resulting value.

mod aggregate;
mod arithmetic;
mod clinical;
mod comparison;
mod datetime;
mod interval;
mod list;
mod logical;
mod nullological;
mod string;
mod type_ops;

use octofhir_elm_engine::{CqlEngine, EvalResult, EvaluationContext, EvaluationOptions};
use octofhir_elm_model::expression::{BinaryExpression, UnaryExpression};
use octofhir_elm_model::{Expression, Library};
use octofhir_elm_types::{CqlDate, CqlDateTime, CqlTime, CqlValue};
use rust_decimal::Decimal;
use std::str::FromStr;

/// `Now()` for every test context
pub const NOW: &str = "2024-06-15T12:00:00.000+00:00";

pub fn context() -> EvaluationContext {
    let options = EvaluationOptions::default()
        .with_timestamp(NOW)
        .with_timezone_offset(0);
    EvaluationContext::builder(Library::new("Operators", None))
        .options(options)
        .build()
        .unwrap()
}

pub fn try_eval(expr: &Expression) -> EvalResult<CqlValue> {
    CqlEngine::new().evaluate(expr, &mut context())
}

pub fn eval(expr: &Expression) -> CqlValue {
    try_eval(expr).unwrap_or_else(|e| panic!("{} failed: {e}", expr.kind()))
}

pub fn unary(variant: fn(UnaryExpression) -> Expression, operand: Expression) -> Expression {
    variant(UnaryExpression::new(operand))
}

pub fn binary(variant: fn(BinaryExpression) -> Expression, left: Expression, right: Expression) -> Expression {
    variant(BinaryExpression::new(left, right))
}

pub fn ints(values: &[i32]) -> Expression {
    Expression::list(values.iter().map(|v| Expression::integer(*v)).collect())
}

pub fn int_interval(low: i32, high: i32) -> Expression {
    Expression::interval(Expression::integer(low), true, Expression::integer(high), true)
}

pub fn int(value: i32) -> CqlValue {
    CqlValue::Integer(value)
}

pub fn dec(text: &str) -> CqlValue {
    CqlValue::Decimal(Decimal::from_str(text).unwrap())
}

pub fn string(value: &str) -> CqlValue {
    CqlValue::string(value)
}

pub fn int_list(values: &[i32]) -> CqlValue {
    CqlValue::list(values.iter().copied().map(CqlValue::Integer).collect())
}

pub fn date(text: &str) -> CqlValue {
    CqlValue::Date(CqlDate::parse(text).unwrap())
}

pub fn datetime(text: &str) -> CqlValue {
    CqlValue::DateTime(CqlDateTime::parse(text).unwrap())
}

pub fn time(text: &str) -> CqlValue {
    CqlValue::Time(CqlTime::parse(text).unwrap())
}
