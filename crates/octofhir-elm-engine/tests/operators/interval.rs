use crate::{binary, date, dec, eval, int, int_interval, ints, try_eval, unary};
use octofhir_elm_engine::EvalError;
use octofhir_elm_model::expression::BinaryExpression;
use octofhir_elm_model::Expression;
use octofhir_elm_types::{CqlInterval, CqlValue, TemporalUnit};
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

type Variant = fn(BinaryExpression) -> Expression;

fn interval(low: i32, high: i32) -> CqlValue {
    CqlValue::interval(int(low), int(high))
}

fn intervals(bounds: &[(i32, i32)]) -> CqlValue {
    CqlValue::list(bounds.iter().map(|(l, h)| interval(*l, *h)).collect())
}

fn open_low(low: Expression, high: Expression) -> Expression {
    Expression::interval(low, false, high, true)
}

#[test]
fn selector_rejects_reversed_bounds() {
    let err = try_eval(&int_interval(5, 1)).unwrap_err();
    assert!(matches!(err.root(), EvalError::InvalidArgument { .. }));
}

#[test]
fn start_and_end_normalise_open_bounds() {
    let expr = || Expression::interval(Expression::integer(1), false, Expression::integer(5), false);
    assert_eq!(eval(&unary(Expression::Start, expr())), int(2));
    assert_eq!(eval(&unary(Expression::End, expr())), int(4));
    let decimals = open_low(Expression::decimal("1.0"), Expression::decimal("2.0"));
    assert_eq!(eval(&unary(Expression::Start, decimals)), dec("1.00000001"));
}

#[test]
fn width_size_and_point() {
    assert_eq!(eval(&unary(Expression::Width, int_interval(3, 7))), int(4));
    assert_eq!(eval(&unary(Expression::Size, int_interval(3, 7))), int(5));
    assert_eq!(eval(&unary(Expression::PointFrom, int_interval(4, 4))), int(4));
    assert!(try_eval(&unary(Expression::PointFrom, int_interval(4, 5))).is_err());
}

#[rstest]
#[case::inside(Expression::Contains, int_interval(1, 10), Expression::integer(5), Some(true))]
#[case::at_open_bound(
    Expression::Contains,
    Expression::interval(Expression::integer(1), true, Expression::integer(10), false),
    Expression::integer(10),
    Some(false)
)]
#[case::unknown_bound(
    Expression::Contains,
    Expression::interval(Expression::null(), true, Expression::integer(10), true),
    Expression::integer(5),
    None
)]
#[case::known_outside_unknown_bound(
    Expression::Contains,
    Expression::interval(Expression::null(), true, Expression::integer(10), true),
    Expression::integer(11),
    Some(false)
)]
#[case::list_membership(Expression::Contains, ints(&[1, 2]), Expression::integer(2), Some(true))]
#[case::proper_at_end(Expression::ProperContains, int_interval(1, 10), Expression::integer(10), Some(false))]
#[case::includes(Expression::Includes, int_interval(1, 10), int_interval(2, 5), Some(true))]
#[case::includes_overhang(Expression::Includes, int_interval(1, 10), int_interval(5, 11), Some(false))]
#[case::proper_includes_equal(Expression::ProperIncludes, int_interval(1, 10), int_interval(1, 10), Some(false))]
#[case::list_includes(Expression::Includes, ints(&[1, 2, 3]), ints(&[3, 1]), Some(true))]
fn membership(#[case] variant: Variant, #[case] left: Expression, #[case] right: Expression, #[case] expected: Option<bool>) {
    assert_eq!(eval(&binary(variant, left, right)), expected.into());
}

#[rstest]
#[case(Expression::In, Expression::integer(5), int_interval(1, 10), Some(true))]
#[case(Expression::ProperIn, Expression::integer(1), int_interval(1, 10), Some(false))]
#[case(Expression::IncludedIn, int_interval(2, 3), int_interval(1, 10), Some(true))]
#[case(Expression::ProperIncludedIn, int_interval(2, 3), int_interval(1, 10), Some(true))]
#[case(Expression::In, Expression::null(), int_interval(1, 10), None)]
fn reversed_membership(#[case] variant: Variant, #[case] left: Expression, #[case] right: Expression, #[case] expected: Option<bool>) {
    assert_eq!(eval(&binary(variant, left, right)), expected.into());
}

#[rstest]
#[case(Expression::Before, int_interval(1, 3), int_interval(4, 6), true)]
#[case(Expression::After, int_interval(1, 3), int_interval(4, 6), false)]
#[case(Expression::Meets, int_interval(1, 3), int_interval(4, 6), true)]
#[case(Expression::MeetsBefore, int_interval(1, 3), int_interval(4, 6), true)]
#[case(Expression::MeetsAfter, int_interval(1, 3), int_interval(4, 6), false)]
#[case(Expression::Meets, int_interval(1, 3), int_interval(5, 6), false)]
#[case(Expression::Overlaps, int_interval(1, 5), int_interval(4, 6), true)]
#[case(Expression::OverlapsBefore, int_interval(1, 5), int_interval(4, 6), true)]
#[case(Expression::OverlapsAfter, int_interval(1, 5), int_interval(4, 6), false)]
#[case(Expression::Starts, int_interval(1, 3), int_interval(1, 6), true)]
#[case(Expression::Ends, int_interval(4, 6), int_interval(1, 6), true)]
#[case(Expression::Before, Expression::integer(0), int_interval(1, 6), true)]
fn timing(#[case] variant: Variant, #[case] left: Expression, #[case] right: Expression, #[case] expected: bool) {
    assert_eq!(eval(&binary(variant, left, right)), CqlValue::Boolean(expected));
}

#[test]
fn timing_honours_precision() {
    let day = |low: &str, high: &str| {
        Expression::interval(Expression::datetime(low), true, Expression::datetime(high), true)
    };
    let left = day("2024-01-01T08:00:00", "2024-01-01T10:00:00");
    let right = day("2024-01-01T20:00:00", "2024-01-02T10:00:00");
    let plain = binary(Expression::Before, left.clone(), right.clone());
    assert_eq!(eval(&plain), CqlValue::Boolean(true));
    let by_day = Expression::Before(BinaryExpression::new(left, right).with_precision(TemporalUnit::Day));
    assert_eq!(eval(&by_day), CqlValue::Boolean(false));
}

#[test]
fn union_intersect_except() {
    assert_eq!(eval(&binary(Expression::Union, int_interval(1, 5), int_interval(6, 8))), interval(1, 8));
    assert_eq!(eval(&binary(Expression::Intersect, int_interval(1, 5), int_interval(3, 8))), interval(3, 5));
    assert_eq!(eval(&binary(Expression::Intersect, int_interval(1, 2), int_interval(3, 8))), CqlValue::Null);

    let disjoint = try_eval(&binary(Expression::Union, int_interval(1, 2), int_interval(5, 8))).unwrap_err();
    assert!(matches!(disjoint.root(), EvalError::InvalidArgument { .. }));
    let except = try_eval(&binary(Expression::Except, int_interval(1, 5), int_interval(3, 8))).unwrap_err();
    assert!(matches!(except.root(), EvalError::UnsupportedOperation { .. }));
}

#[test]
fn decimal_intersect_keeps_open_bound() {
    let left = Expression::interval(Expression::decimal("1.0"), true, Expression::decimal("5.0"), false);
    let right = Expression::interval(Expression::decimal("3.0"), true, Expression::decimal("8.0"), true);
    assert_eq!(
        eval(&binary(Expression::Intersect, left, right)),
        CqlValue::Interval(CqlInterval::closed_open(dec("3.0"), dec("5.0")))
    );
}

#[test]
fn collapse_merges_overlapping_and_adjacent() {
    let source = Expression::list(vec![
        int_interval(6, 8),
        int_interval(1, 3),
        int_interval(2, 4),
        int_interval(10, 12),
        int_interval(5, 5),
    ]);
    assert_eq!(
        eval(&binary(Expression::Collapse, source, Expression::null())),
        intervals(&[(1, 8), (10, 12)])
    );
}

#[test]
fn expand_into_unit_intervals() {
    assert_eq!(
        eval(&binary(Expression::Expand, Expression::list(vec![int_interval(1, 3)]), Expression::null())),
        intervals(&[(1, 1), (2, 2), (3, 3)])
    );
    let per_two = Expression::quantity(Decimal::TWO, "1");
    assert_eq!(
        eval(&binary(Expression::Expand, Expression::list(vec![int_interval(1, 6)]), per_two)),
        intervals(&[(1, 2), (3, 4), (5, 6)])
    );

    let months = Expression::interval(Expression::date("2024-01"), true, Expression::date("2024-03"), true);
    assert_eq!(
        eval(&binary(Expression::Expand, Expression::list(vec![months]), Expression::null())),
        CqlValue::list(
            ["2024-01", "2024-02", "2024-03"]
                .into_iter()
                .map(|m| CqlValue::Interval(CqlInterval::closed(date(m), date(m))))
                .collect()
        )
    );
}
