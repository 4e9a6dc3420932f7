use crate::{dec, eval, int, ints};
use octofhir_elm_model::expression::{AggregateExpression, AggregateFold, ScopeExpression};
use octofhir_elm_model::{Element, Expression};
use octofhir_elm_types::CqlValue;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

type Variant = fn(AggregateExpression) -> Expression;

fn aggregate(variant: Variant, source: Expression) -> Expression {
    variant(AggregateExpression::new(source))
}

fn with_null(values: &[i32]) -> Expression {
    let mut elements: Vec<Expression> = values.iter().map(|v| Expression::integer(*v)).collect();
    elements.push(Expression::null());
    Expression::list(elements)
}

#[rstest]
#[case::count(Expression::Count, int(4))]
#[case::sum(Expression::Sum, int(10))]
#[case::product(Expression::Product, int(24))]
#[case::min(Expression::Min, int(1))]
#[case::max(Expression::Max, int(4))]
#[case::avg(Expression::Avg, dec("2.5"))]
#[case::median(Expression::Median, dec("2.5"))]
#[case::mode(Expression::Mode, int(1))]
#[case::variance(Expression::Variance, dec("1.66666667"))]
#[case::population_variance(Expression::PopulationVariance, dec("1.25"))]
fn numeric_aggregates_ignore_nulls(#[case] variant: Variant, #[case] expected: CqlValue) {
    assert_eq!(eval(&aggregate(variant, with_null(&[1, 2, 3, 4]))), expected);
}

#[rstest]
#[case::count(Expression::Count, int(0))]
#[case::sum(Expression::Sum, CqlValue::Null)]
#[case::avg(Expression::Avg, CqlValue::Null)]
#[case::max(Expression::Max, CqlValue::Null)]
#[case::std_dev(Expression::StdDev, CqlValue::Null)]
fn empty_sources(#[case] variant: Variant, #[case] expected: CqlValue) {
    assert_eq!(eval(&aggregate(variant, Expression::list(vec![]))), expected);
}

#[test]
fn standard_deviations() {
    let source = || ints(&[2, 4, 4, 4, 5, 5, 7, 9]);
    assert_eq!(eval(&aggregate(Expression::PopulationStdDev, source())), dec("2"));
    assert_eq!(eval(&aggregate(Expression::StdDev, source())), dec("2.13808994"));
}

#[test]
fn geometric_mean_and_odd_median() {
    assert_eq!(eval(&aggregate(Expression::GeometricMean, ints(&[2, 8]))), dec("4"));
    assert_eq!(eval(&aggregate(Expression::Median, ints(&[5, 1, 3]))), dec("3"));
}

#[test]
fn quantities_keep_their_unit() {
    let mg = |v: i64| Expression::quantity(Decimal::from(v), "mg");
    let source = || Expression::list(vec![mg(2), mg(4)]);
    assert_eq!(
        eval(&aggregate(Expression::Sum, source())),
        CqlValue::quantity(Decimal::from(6), "mg")
    );
    assert_eq!(
        eval(&aggregate(Expression::Max, source())),
        CqlValue::quantity(Decimal::from(4), "mg")
    );
    let mixed = Expression::list(vec![mg(2), Expression::quantity(Decimal::ONE, "g")]);
    assert_eq!(eval(&aggregate(Expression::Variance, mixed)), CqlValue::Null);
}

#[test]
fn boolean_aggregates() {
    let flags = |values: Vec<Expression>| Expression::list(values);
    let all = aggregate(
        Expression::AllTrue,
        flags(vec![Expression::boolean(true), Expression::null()]),
    );
    assert_eq!(eval(&all), CqlValue::Boolean(true));
    let any = aggregate(
        Expression::AnyTrue,
        flags(vec![Expression::boolean(false), Expression::null()]),
    );
    assert_eq!(eval(&any), CqlValue::Boolean(false));
    assert_eq!(eval(&aggregate(Expression::AllTrue, flags(vec![]))), CqlValue::Boolean(true));
}

#[test]
fn path_projects_each_element() {
    let source = Expression::list(vec![
        Expression::tuple(vec![("score", Expression::integer(3))]),
        Expression::tuple(vec![("score", Expression::integer(7))]),
    ]);
    let mut expr = AggregateExpression::new(source);
    expr.path = Some("score".to_string());
    assert_eq!(eval(&Expression::Sum(expr)), int(10));
}

#[test]
fn fold_with_running_total() {
    let fold = |distinct: bool| {
        Expression::Aggregate(AggregateFold {
            element: Element::default(),
            source: Box::new(ints(&[1, 2, 2, 3])),
            iteration: Box::new(Expression::add(
                Expression::Total(ScopeExpression::default()),
                Expression::Current(ScopeExpression::default()),
            )),
            initial_value: Some(Box::new(Expression::integer(0))),
            distinct,
        })
    };
    assert_eq!(eval(&fold(false)), int(8));
    assert_eq!(eval(&fold(true)), int(6));
}
