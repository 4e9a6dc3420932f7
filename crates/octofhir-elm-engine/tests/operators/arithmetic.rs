use crate::{binary, date, datetime, dec, eval, int, try_eval, unary};
use octofhir_elm_engine::EvalError;
use octofhir_elm_model::expression::{RoundExpression, TypeNameExpression};
use octofhir_elm_model::{Element, Expression};
use octofhir_elm_types::CqlValue;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

fn round(operand: Expression, digits: Option<i32>) -> Expression {
    Expression::Round(RoundExpression {
        element: Element::default(),
        operand: Box::new(operand),
        precision: digits.map(|d| Box::new(Expression::integer(d))),
    })
}

fn type_named(variant: fn(TypeNameExpression) -> Expression, name: &str) -> Expression {
    variant(TypeNameExpression {
        element: Element::default(),
        value_type: format!("{{urn:hl7-org:elm-types:r1}}{name}"),
    })
}

fn days(n: i64) -> Expression {
    Expression::quantity(Decimal::from(n), "days")
}

#[rstest]
#[case::integers(Expression::add(Expression::integer(2), Expression::integer(3)), int(5))]
#[case::promoted(Expression::add(Expression::integer(1), Expression::decimal("0.5")), dec("1.5"))]
#[case::long(Expression::multiply(Expression::long(3), Expression::integer(4)), CqlValue::Long(12))]
#[case::overflow(Expression::add(Expression::integer(i32::MAX), Expression::integer(1)), CqlValue::Null)]
#[case::null_operand(Expression::subtract(Expression::integer(1), Expression::null()), CqlValue::Null)]
#[case::divide_integers(Expression::divide(Expression::integer(1), Expression::integer(3)), dec("0.33333333"))]
#[case::divide_by_zero(Expression::divide(Expression::integer(1), Expression::integer(0)), CqlValue::Null)]
#[case::truncated(binary(Expression::TruncatedDivide, Expression::integer(7), Expression::integer(2)), int(3))]
#[case::modulo(binary(Expression::Modulo, Expression::integer(-7), Expression::integer(3)), int(-1))]
#[case::power(binary(Expression::Power, Expression::integer(2), Expression::integer(3)), int(8))]
#[case::log(binary(Expression::Log, Expression::integer(8), Expression::integer(2)), dec("3"))]
#[case::log_of_zero(binary(Expression::Log, Expression::integer(0), Expression::integer(2)), CqlValue::Null)]
fn binary_arithmetic(#[case] expr: Expression, #[case] expected: CqlValue) {
    assert_eq!(eval(&expr), expected);
}

#[rstest]
#[case::negate(Expression::negate(Expression::integer(4)), int(-4))]
#[case::abs(unary(Expression::Abs, Expression::decimal("-2.5")), dec("2.5"))]
#[case::ceiling(unary(Expression::Ceiling, Expression::decimal("1.01")), int(2))]
#[case::floor(unary(Expression::Floor, Expression::decimal("-1.01")), int(-2))]
#[case::truncate(unary(Expression::Truncate, Expression::decimal("7.9")), int(7))]
#[case::exp(unary(Expression::Exp, Expression::integer(0)), dec("1"))]
#[case::ln_of_negative(unary(Expression::Ln, Expression::integer(-1)), CqlValue::Null)]
#[case::precision(unary(Expression::Precision, Expression::decimal("3.140")), int(3))]
#[case::successor(unary(Expression::Successor, Expression::integer(1)), int(2))]
#[case::predecessor(unary(Expression::Predecessor, Expression::date("2024-03-01")), date("2024-02-29"))]
fn unary_arithmetic(#[case] expr: Expression, #[case] expected: CqlValue) {
    assert_eq!(eval(&expr), expected);
}

#[rstest]
#[case(Expression::decimal("2.5"), None, dec("3"))]
#[case(Expression::decimal("-2.5"), None, dec("-2"))]
#[case(Expression::decimal("3.14159"), Some(3), dec("3.142"))]
#[case(Expression::null(), Some(1), CqlValue::Null)]
fn round_half_toward_positive_infinity(
    #[case] operand: Expression,
    #[case] digits: Option<i32>,
    #[case] expected: CqlValue,
) {
    assert_eq!(eval(&round(operand, digits)), expected);
}

#[test]
fn successor_past_the_maximum_is_an_error() {
    let expr = unary(Expression::Successor, Expression::integer(i32::MAX)).located("4:1-4:20");
    let err = try_eval(&expr).unwrap_err();
    assert!(matches!(err.root(), EvalError::InvalidArgument { .. }));
    assert_eq!(err.locator(), Some("4:1-4:20"));
}

#[test]
fn type_extremes() {
    assert_eq!(eval(&type_named(Expression::MaxValue, "Integer")), int(i32::MAX));
    assert_eq!(eval(&type_named(Expression::MinValue, "Long")), CqlValue::Long(i64::MIN));
    assert_eq!(eval(&type_named(Expression::MinValue, "Date")), date("0001-01-01"));
    assert!(try_eval(&type_named(Expression::MaxValue, "Boolean")).is_err());
}

#[test]
fn calendar_arithmetic() {
    assert_eq!(
        eval(&Expression::add(Expression::date("2024-01-31"), Expression::quantity(Decimal::ONE, "month"))),
        date("2024-02-29")
    );
    assert_eq!(
        eval(&Expression::subtract(Expression::datetime("2024-03-01T00:00:00"), days(1))),
        datetime("2024-02-29T00:00:00+00:00")
    );
    assert_eq!(
        eval(&Expression::subtract(Expression::date("2024-03-01"), Expression::date("2024-02-01"))),
        CqlValue::quantity(Decimal::from(29), "days")
    );
}

#[test]
fn quantities() {
    let mg = |n: i64| Expression::quantity(Decimal::from(n), "mg");
    assert_eq!(eval(&Expression::add(mg(5), mg(3))), CqlValue::quantity(Decimal::from(8), "mg"));
    assert_eq!(
        eval(&Expression::add(mg(5), Expression::quantity(Decimal::ONE, "mL"))),
        CqlValue::Null
    );
    assert_eq!(
        eval(&Expression::less(mg(5), mg(8))),
        CqlValue::Boolean(true)
    );
}
