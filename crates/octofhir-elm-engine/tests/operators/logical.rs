use crate::{binary, eval, unary};
use octofhir_elm_model::Expression;
use octofhir_elm_types::CqlValue;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn truth(value: Option<bool>) -> Expression {
    value.map_or_else(Expression::null, Expression::boolean)
}

fn expected(value: Option<bool>) -> CqlValue {
    value.into()
}

#[rstest]
#[case(Some(true), Some(true), Some(true))]
#[case(Some(true), Some(false), Some(false))]
#[case(Some(true), None, None)]
#[case(Some(false), None, Some(false))]
#[case(None, Some(false), Some(false))]
#[case(None, None, None)]
fn and(#[case] a: Option<bool>, #[case] b: Option<bool>, #[case] out: Option<bool>) {
    assert_eq!(eval(&Expression::and(truth(a), truth(b))), expected(out));
}

#[rstest]
#[case(Some(true), None, Some(true))]
#[case(None, Some(true), Some(true))]
#[case(Some(false), Some(false), Some(false))]
#[case(Some(false), None, None)]
#[case(None, None, None)]
fn or(#[case] a: Option<bool>, #[case] b: Option<bool>, #[case] out: Option<bool>) {
    assert_eq!(eval(&Expression::or(truth(a), truth(b))), expected(out));
}

#[rstest]
#[case(Some(true), Some(false), Some(true))]
#[case(Some(true), Some(true), Some(false))]
#[case(Some(false), None, None)]
fn xor(#[case] a: Option<bool>, #[case] b: Option<bool>, #[case] out: Option<bool>) {
    assert_eq!(eval(&binary(Expression::Xor, truth(a), truth(b))), expected(out));
}

#[rstest]
#[case(Some(false), None, Some(true))]
#[case(Some(true), Some(false), Some(false))]
#[case(None, Some(true), Some(true))]
#[case(Some(true), None, None)]
fn implies(#[case] a: Option<bool>, #[case] b: Option<bool>, #[case] out: Option<bool>) {
    assert_eq!(eval(&binary(Expression::Implies, truth(a), truth(b))), expected(out));
}

#[test]
fn not_keeps_null() {
    assert_eq!(eval(&Expression::not(Expression::boolean(true))), CqlValue::Boolean(false));
    assert_eq!(eval(&Expression::not(Expression::null())), CqlValue::Null);
    assert_eq!(
        eval(&unary(Expression::Not, Expression::not(Expression::boolean(false)))),
        CqlValue::Boolean(false)
    );
}
