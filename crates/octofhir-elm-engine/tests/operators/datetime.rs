use crate::{date, datetime, dec, eval, int, time, try_eval, unary};
use octofhir_elm_model::expression::{
    BinaryExpression, DateSelector, DateTimeComponentFromExpression, DateTimeSelector,
    NullaryExpression, TimeSelector,
};
use octofhir_elm_model::{Element, Expression};
use octofhir_elm_types::{CqlValue, TemporalUnit};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn at(
    variant: fn(BinaryExpression) -> Expression,
    left: Expression,
    right: Expression,
    unit: TemporalUnit,
) -> Expression {
    variant(BinaryExpression::new(left, right).with_precision(unit))
}

fn some(value: i32) -> Option<Box<Expression>> {
    Some(Box::new(Expression::integer(value)))
}

#[test]
fn clock_is_fixed_for_the_run() {
    assert_eq!(
        eval(&Expression::Now(NullaryExpression::default())),
        datetime("2024-06-15T12:00:00.000+00:00")
    );
    assert_eq!(eval(&Expression::Today(NullaryExpression::default())), date("2024-06-15"));
    assert_eq!(
        eval(&Expression::TimeOfDay(NullaryExpression::default())),
        time("12:00:00.000")
    );
}

#[test]
fn selectors_stop_at_first_missing_component() {
    let expr = Expression::Date(DateSelector {
        element: Element::default(),
        year: Box::new(Expression::integer(2024)),
        month: some(2),
        day: None,
    });
    assert_eq!(eval(&expr), date("2024-02"));

    let expr = Expression::DateTime(DateTimeSelector {
        element: Element::default(),
        year: Box::new(Expression::integer(2024)),
        month: some(1),
        day: some(2),
        hour: some(3),
        minute: Some(Box::new(Expression::null())),
        second: some(5),
        millisecond: None,
        timezone_offset: Some(Box::new(Expression::decimal("5.5"))),
    });
    let value = eval(&expr);
    assert_eq!(value.to_string(), "2024-01-02T03+05:30");

    let expr = Expression::Time(TimeSelector {
        element: Element::default(),
        hour: Box::new(Expression::integer(23)),
        minute: some(59),
        second: None,
        millisecond: None,
    });
    assert_eq!(eval(&expr), time("23:59"));
}

#[test]
fn invalid_selector_components_are_errors() {
    let expr = Expression::Date(DateSelector {
        element: Element::default(),
        year: Box::new(Expression::integer(2023)),
        month: some(2),
        day: some(29),
    });
    assert!(try_eval(&expr).is_err());
}

#[rstest]
#[case::whole_years(Expression::date("2000-06-16"), Expression::date("2024-06-15"), TemporalUnit::Year, int(23))]
#[case::months(Expression::date("2024-01-31"), Expression::date("2024-02-29"), TemporalUnit::Month, int(0))]
#[case::days(Expression::date("2024-01-01"), Expression::date("2024-03-01"), TemporalUnit::Day, int(60))]
#[case::reversed(Expression::date("2024-03-01"), Expression::date("2024-01-01"), TemporalUnit::Day, int(-60))]
#[case::hours(
    Expression::datetime("2024-01-01T10:00:00"),
    Expression::datetime("2024-01-01T12:30:00"),
    TemporalUnit::Hour,
    int(2)
)]
#[case::null_operand(Expression::null(), Expression::date("2024-01-01"), TemporalUnit::Day, CqlValue::Null)]
fn duration_between(
    #[case] left: Expression,
    #[case] right: Expression,
    #[case] unit: TemporalUnit,
    #[case] expected: CqlValue,
) {
    assert_eq!(eval(&at(Expression::DurationBetween, left, right, unit)), expected);
}

#[test]
fn difference_counts_boundaries_crossed() {
    let expr = at(
        Expression::DifferenceBetween,
        Expression::date("2023-12-31"),
        Expression::date("2024-01-01"),
        TemporalUnit::Year,
    );
    assert_eq!(eval(&expr), int(1));

    let expr = at(
        Expression::DurationBetween,
        Expression::date("2023-12-31"),
        Expression::date("2024-01-01"),
        TemporalUnit::Year,
    );
    assert_eq!(eval(&expr), int(0));
}

#[rstest]
#[case(Expression::SameAs, "2024-06-15T10:00:00", "2024-06-15T23:00:00", TemporalUnit::Day, Some(true))]
#[case(Expression::SameAs, "2024-06-15T10:00:00", "2024-06-15T23:00:00", TemporalUnit::Hour, Some(false))]
#[case(Expression::SameOrBefore, "2024-06-14", "2024-06-15T01:00:00", TemporalUnit::Day, Some(true))]
#[case(Expression::SameOrAfter, "2024-06-14", "2024-06-15", TemporalUnit::Month, Some(true))]
#[case(Expression::SameAs, "2024-06", "2024-06-15", TemporalUnit::Day, None)]
fn same_as_at_precision(
    #[case] variant: fn(BinaryExpression) -> Expression,
    #[case] left: &str,
    #[case] right: &str,
    #[case] unit: TemporalUnit,
    #[case] expected: Option<bool>,
) {
    let expr = at(variant, Expression::datetime(left), Expression::datetime(right), unit);
    assert_eq!(eval(&expr), expected.into());
}

#[test]
fn parts_of_a_datetime() {
    let value = || Expression::datetime("2024-06-15T10:20:30.400-05:00");
    assert_eq!(eval(&unary(Expression::DateFrom, value())), date("2024-06-15"));
    assert_eq!(eval(&unary(Expression::TimeFrom, value())), time("10:20:30.400"));
    assert_eq!(eval(&unary(Expression::TimezoneOffsetFrom, value())), dec("-5"));
    assert_eq!(
        eval(&unary(Expression::TimeFrom, Expression::datetime("2024-06-15"))),
        CqlValue::Null
    );

    let component = |unit| {
        Expression::DateTimeComponentFrom(DateTimeComponentFromExpression {
            element: Element::default(),
            operand: Box::new(value()),
            precision: unit,
        })
    };
    assert_eq!(eval(&component(TemporalUnit::Month)), int(6));
    assert_eq!(eval(&component(TemporalUnit::Millisecond)), int(400));
}
