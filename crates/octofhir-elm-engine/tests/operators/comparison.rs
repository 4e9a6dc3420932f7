use crate::{binary, eval, ints, try_eval};
use octofhir_elm_model::Expression;
use octofhir_elm_types::CqlValue;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

fn boolean(value: Option<bool>) -> CqlValue {
    value.into()
}

#[rstest]
#[case::integer_and_decimal(Expression::integer(1), Expression::decimal("1.0"), Some(true))]
#[case::strings_are_case_sensitive(Expression::string("a"), Expression::string("A"), Some(false))]
#[case::null_operand(Expression::integer(1), Expression::null(), None)]
#[case::dates_at_different_precision(Expression::date("2024"), Expression::date("2024-06"), None)]
#[case::date_against_datetime(Expression::date("2024-06-15"), Expression::datetime("2024-06-15"), Some(true))]
#[case::lists(ints(&[1, 2]), ints(&[1, 2]), Some(true))]
#[case::lists_of_different_length(ints(&[1, 2]), ints(&[1]), Some(false))]
#[case::list_with_null(
    Expression::list(vec![Expression::null()]),
    Expression::list(vec![Expression::null()]),
    None
)]
#[case::quantities_in_other_units(
    Expression::quantity(Decimal::ONE, "mg"),
    Expression::quantity(Decimal::ONE, "g"),
    None
)]
#[case::calendar_unit_spellings(
    Expression::quantity(Decimal::TWO, "day"),
    Expression::quantity(Decimal::TWO, "days"),
    Some(true)
)]
fn equal(#[case] left: Expression, #[case] right: Expression, #[case] out: Option<bool>) {
    assert_eq!(eval(&Expression::equal(left.clone(), right.clone())), boolean(out));
    assert_eq!(
        eval(&binary(Expression::NotEqual, left, right)),
        boolean(out.map(|b| !b))
    );
}

#[rstest]
#[case::both_null(Expression::null(), Expression::null(), true)]
#[case::one_null(Expression::null(), Expression::integer(1), false)]
#[case::strings_ignore_case_and_spacing(Expression::string("Hello  World"), Expression::string("hello world"), true)]
#[case::decimals_at_lesser_scale(Expression::decimal("1.20"), Expression::decimal("1.2"), true)]
#[case::dates_at_different_precision(Expression::date("2024"), Expression::date("2024-06"), false)]
#[case::lists_with_nulls(
    Expression::list(vec![Expression::null(), Expression::integer(1)]),
    Expression::list(vec![Expression::null(), Expression::integer(1)]),
    true
)]
fn equivalent(#[case] left: Expression, #[case] right: Expression, #[case] out: bool) {
    assert_eq!(eval(&Expression::equivalent(left, right)), CqlValue::Boolean(out));
}

#[rstest]
#[case(Expression::integer(1), Expression::integer(2), Some(true), Some(false))]
#[case(Expression::decimal("2.5"), Expression::integer(2), Some(false), Some(true))]
#[case(Expression::string("abc"), Expression::string("abd"), Some(true), Some(false))]
#[case(Expression::date("2024-01-01"), Expression::date("2024-02"), Some(true), Some(false))]
#[case(Expression::date("2024-02-10"), Expression::date("2024-02"), None, None)]
#[case(Expression::time("10:00"), Expression::time("09:59:59"), Some(false), Some(true))]
#[case(Expression::null(), Expression::integer(2), None, None)]
fn ordering(
    #[case] left: Expression,
    #[case] right: Expression,
    #[case] less: Option<bool>,
    #[case] greater: Option<bool>,
) {
    assert_eq!(eval(&Expression::less(left.clone(), right.clone())), boolean(less));
    assert_eq!(eval(&Expression::greater(left, right)), boolean(greater));
}

#[test]
fn or_equal_variants_include_equality() {
    let one = Expression::integer(1);
    assert_eq!(
        eval(&binary(Expression::LessOrEqual, one.clone(), one.clone())),
        CqlValue::Boolean(true)
    );
    assert_eq!(
        eval(&binary(Expression::GreaterOrEqual, one, Expression::integer(2))),
        CqlValue::Boolean(false)
    );
}

#[test]
fn ordering_unrelated_kinds_is_an_error() {
    assert!(try_eval(&Expression::less(Expression::string("a"), Expression::boolean(true))).is_err());
}
