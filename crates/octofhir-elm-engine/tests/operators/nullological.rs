use crate::{eval, int, string, unary};
use octofhir_elm_model::expression::{CaseExpression, CaseItem, IfExpression, NaryExpression};
use octofhir_elm_model::{Element, Expression};
use octofhir_elm_types::CqlValue;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn coalesce(operands: Vec<Expression>) -> Expression {
    Expression::Coalesce(NaryExpression::new(operands))
}

/// Errors if it is ever evaluated
fn unresolvable() -> Expression {
    Expression::expression_ref("Nowhere", None)
}

#[rstest]
#[case(Expression::null(), true, false, false)]
#[case(Expression::boolean(true), false, true, false)]
#[case(Expression::boolean(false), false, false, true)]
fn null_tests_are_two_valued(
    #[case] operand: Expression,
    #[case] null: bool,
    #[case] true_: bool,
    #[case] false_: bool,
) {
    assert_eq!(eval(&unary(Expression::IsNull, operand.clone())), CqlValue::Boolean(null));
    assert_eq!(eval(&unary(Expression::IsTrue, operand.clone())), CqlValue::Boolean(true_));
    assert_eq!(eval(&unary(Expression::IsFalse, operand)), CqlValue::Boolean(false_));
}

#[test]
fn coalesce_stops_at_first_value() {
    let expr = coalesce(vec![Expression::null(), Expression::string("a"), unresolvable()]);
    assert_eq!(eval(&expr), string("a"));
    assert_eq!(eval(&coalesce(vec![Expression::null(), Expression::null()])), CqlValue::Null);
}

#[test]
fn coalesce_searches_a_single_list() {
    let list = Expression::list(vec![Expression::null(), Expression::integer(7)]);
    assert_eq!(eval(&coalesce(vec![list])), int(7));
}

fn if_then_else(condition: Expression) -> Expression {
    Expression::If(IfExpression {
        element: Element::default(),
        condition: Box::new(condition),
        then: Box::new(Expression::string("then")),
        else_: Box::new(Expression::string("else")),
    })
}

#[test]
fn null_condition_takes_else_branch() {
    assert_eq!(eval(&if_then_else(Expression::boolean(true))), string("then"));
    assert_eq!(eval(&if_then_else(Expression::null())), string("else"));
}

fn case(comparand: Option<Expression>, items: Vec<(Expression, &str)>) -> Expression {
    Expression::Case(CaseExpression {
        element: Element::default(),
        comparand: comparand.map(Box::new),
        case_item: items
            .into_iter()
            .map(|(when, then)| CaseItem {
                when,
                then: Expression::string(then),
            })
            .collect(),
        else_: Box::new(Expression::string("other")),
    })
}

#[test]
fn case_with_comparand_matches_by_equality() {
    let expr = case(
        Some(Expression::integer(2)),
        vec![(Expression::integer(1), "one"), (Expression::integer(2), "two")],
    );
    assert_eq!(eval(&expr), string("two"));

    let expr = case(Some(Expression::null()), vec![(Expression::null(), "null")]);
    assert_eq!(eval(&expr), string("other"));
}

#[test]
fn case_without_comparand_takes_first_true_condition() {
    let expr = case(
        None,
        vec![
            (Expression::null(), "unknown"),
            (Expression::less(Expression::integer(1), Expression::integer(2)), "less"),
            (Expression::boolean(true), "always"),
        ],
    );
    assert_eq!(eval(&expr), string("less"));
}
