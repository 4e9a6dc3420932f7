use crate::{binary, eval, int, string, try_eval, unary};
use octofhir_elm_model::expression::{
    BinaryExpression, CombineExpression, NaryExpression, PositionOfExpression, SplitExpression, SubstringExpression,
    TernaryExpression,
};
use octofhir_elm_model::{Element, Expression};
use octofhir_elm_types::CqlValue;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn strings(values: &[&str]) -> CqlValue {
    CqlValue::list(values.iter().map(|s| CqlValue::string(*s)).collect())
}

fn combine(source: Expression, separator: Option<&str>) -> Expression {
    Expression::Combine(CombineExpression {
        element: Element::default(),
        source: Box::new(source),
        separator: separator.map(|s| Box::new(Expression::string(s))),
    })
}

fn split(variant: fn(SplitExpression) -> Expression, text: &str, separator: &str) -> Expression {
    variant(SplitExpression {
        element: Element::default(),
        string_to_split: Box::new(Expression::string(text)),
        separator: Box::new(Expression::string(separator)),
    })
}

fn substring(text: &str, start: i32, length: Option<i32>) -> Expression {
    Expression::Substring(SubstringExpression {
        element: Element::default(),
        string_to_sub: Box::new(Expression::string(text)),
        start_index: Box::new(Expression::integer(start)),
        length: length.map(|n| Box::new(Expression::integer(n))),
    })
}

fn position(variant: fn(PositionOfExpression) -> Expression, pattern: &str, text: &str) -> Expression {
    variant(PositionOfExpression {
        element: Element::default(),
        pattern: Box::new(Expression::string(pattern)),
        string: Box::new(Expression::string(text)),
    })
}

#[test]
fn concatenate_is_null_when_any_part_is() {
    let parts = |third: Expression| {
        Expression::Concatenate(NaryExpression::new(vec![
            Expression::string("a"),
            Expression::string("b"),
            third,
        ]))
    };
    assert_eq!(eval(&parts(Expression::string("c"))), string("abc"));
    assert_eq!(eval(&parts(Expression::null())), CqlValue::Null);
}

#[test]
fn combine_skips_nulls() {
    let source = Expression::list(vec![
        Expression::string("a"),
        Expression::null(),
        Expression::string("b"),
    ]);
    assert_eq!(eval(&combine(source.clone(), Some(", "))), string("a, b"));
    assert_eq!(eval(&combine(source, None)), string("ab"));
    let nothing = Expression::list(vec![Expression::null()]);
    assert_eq!(eval(&combine(nothing, Some("-"))), CqlValue::Null);
}

#[test]
fn split_on_text_and_on_pattern() {
    assert_eq!(eval(&split(Expression::Split, "a,b,,c", ",")), strings(&["a", "b", "", "c"]));
    assert_eq!(eval(&split(Expression::Split, "abc", "")), strings(&["abc"]));
    assert_eq!(
        eval(&split(Expression::SplitOnMatches, "a1b22c", "[0-9]+")),
        strings(&["a", "b", "c"])
    );
}

#[rstest]
#[case::from_start("hello", 1, None, Some("ello"))]
#[case::with_length("hello", 1, Some(3), Some("ell"))]
#[case::length_past_end("hello", 3, Some(10), Some("lo"))]
#[case::start_past_end("hello", 5, None, None)]
#[case::negative_start("hello", -1, None, None)]
fn substrings(#[case] text: &str, #[case] start: i32, #[case] length: Option<i32>, #[case] expected: Option<&str>) {
    assert_eq!(eval(&substring(text, start, length)), expected.map(CqlValue::string).into());
}

#[test]
fn positions_count_characters() {
    assert_eq!(eval(&position(Expression::PositionOf, "b", "abcb")), int(1));
    assert_eq!(eval(&position(Expression::LastPositionOf, "b", "abcb")), int(3));
    assert_eq!(eval(&position(Expression::PositionOf, "z", "abc")), int(-1));
    assert_eq!(eval(&position(Expression::PositionOf, "c", "ébc")), int(2));
}

#[test]
fn length_case_and_indexing() {
    assert_eq!(eval(&unary(Expression::Length, Expression::string("héllo"))), int(5));
    assert_eq!(eval(&unary(Expression::Upper, Expression::string("abc"))), string("ABC"));
    assert_eq!(eval(&unary(Expression::Lower, Expression::null())), CqlValue::Null);
    assert_eq!(
        eval(&binary(Expression::Indexer, Expression::string("abc"), Expression::integer(2))),
        string("c")
    );
    assert_eq!(
        eval(&binary(Expression::Indexer, Expression::string("abc"), Expression::integer(3))),
        CqlValue::Null
    );
}

#[rstest]
#[case(Expression::StartsWith, "hello", "he", true)]
#[case(Expression::StartsWith, "hello", "lo", false)]
#[case(Expression::EndsWith, "hello", "lo", true)]
#[case(Expression::Matches, "abc123", "[a-z]+[0-9]+", true)]
#[case(Expression::Matches, "abc123x", "[a-z]+[0-9]+", false)]
fn string_predicates(
    #[case] variant: fn(BinaryExpression) -> Expression,
    #[case] text: &str,
    #[case] argument: &str,
    #[case] expected: bool,
) {
    let expr = binary(variant, Expression::string(text), Expression::string(argument));
    assert_eq!(eval(&expr), CqlValue::Boolean(expected));
}

#[test]
fn replace_matches_with_groups() {
    let expr = Expression::ReplaceMatches(TernaryExpression::new(
        Expression::string("2024-06-15"),
        Expression::string(r"(\d+)-(\d+)-(\d+)"),
        Expression::string("$3/$2/$1"),
    ));
    assert_eq!(eval(&expr), string("15/06/2024"));
}

#[test]
fn invalid_pattern_is_an_error() {
    let expr = binary(Expression::Matches, Expression::string("a"), Expression::string("("));
    assert!(try_eval(&expr).is_err());
}
