use crate::{binary, eval, int, int_list, ints, string, try_eval, unary};
use octofhir_elm_engine::EvalError;
use octofhir_elm_model::expression::{
    FilterExpression, FirstLastExpression, IfExpression, IndexOfExpression, IterationExpression,
    ScopeExpression, SliceExpression, SortByItem, SortDirection, SortExpression,
};
use octofhir_elm_model::{Element, Expression};
use octofhir_elm_types::CqlValue;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn current() -> Expression {
    Expression::Current(ScopeExpression::default())
}

fn people() -> Expression {
    Expression::list(vec![
        Expression::tuple(vec![("name", Expression::string("Cy")), ("age", Expression::integer(40))]),
        Expression::tuple(vec![("name", Expression::string("Al")), ("age", Expression::integer(30))]),
        Expression::tuple(vec![("name", Expression::string("Bo")), ("age", Expression::integer(35))]),
    ])
}

fn names(value: &CqlValue) -> Vec<String> {
    value
        .as_list()
        .unwrap()
        .iter()
        .filter_map(|person| person.as_tuple()?.get("name")?.as_str().map(str::to_string))
        .collect()
}

#[test]
fn exists_and_distinct() {
    assert_eq!(eval(&Expression::exists(Expression::list(vec![Expression::null()]))), CqlValue::Boolean(false));
    assert_eq!(eval(&Expression::exists(ints(&[0]))), CqlValue::Boolean(true));
    assert_eq!(eval(&unary(Expression::Distinct, ints(&[3, 1, 3, 2, 1]))), int_list(&[3, 1, 2]));
}

#[test]
fn set_operations_on_lists() {
    assert_eq!(eval(&binary(Expression::Union, ints(&[1, 2]), ints(&[2, 3]))), int_list(&[1, 2, 3]));
    assert_eq!(eval(&binary(Expression::Intersect, ints(&[1, 2, 3]), ints(&[3, 2]))), int_list(&[2, 3]));
    assert_eq!(eval(&binary(Expression::Except, ints(&[1, 2, 3]), ints(&[2]))), int_list(&[1, 3]));
    assert_eq!(eval(&binary(Expression::Intersect, ints(&[2, 2, 3]), ints(&[2, 3]))), int_list(&[2, 2, 3]));
    assert_eq!(eval(&binary(Expression::Except, ints(&[1, 2, 2, 3]), ints(&[3, 4]))), int_list(&[1, 2, 2]));
    assert_eq!(eval(&binary(Expression::Union, ints(&[1]), Expression::null())), CqlValue::Null);
}

#[test]
fn filter_binds_current_and_alias() {
    let by_current = Expression::Filter(FilterExpression {
        element: Element::default(),
        source: Box::new(ints(&[1, 5, 2, 8])),
        condition: Box::new(Expression::greater(current(), Expression::integer(2))),
        scope: None,
    });
    assert_eq!(eval(&by_current), int_list(&[5, 8]));

    let by_alias = Expression::Filter(FilterExpression {
        element: Element::default(),
        source: Box::new(ints(&[1, 5, 2, 8])),
        condition: Box::new(Expression::less(Expression::alias_ref("X"), Expression::integer(3))),
        scope: Some("X".to_string()),
    });
    assert_eq!(eval(&by_alias), int_list(&[1, 2]));
}

#[test]
fn first_and_last_with_ordering() {
    let pick = |variant: fn(FirstLastExpression) -> Expression, order_by: Option<&str>| {
        variant(FirstLastExpression {
            element: Element::default(),
            source: Box::new(people()),
            order_by: order_by.map(str::to_string),
        })
    };
    let name = |value: CqlValue| value.as_tuple().and_then(|t| t.get("name").cloned());
    assert_eq!(name(eval(&pick(Expression::First, None))), Some(string("Cy")));
    assert_eq!(name(eval(&pick(Expression::First, Some("age")))), Some(string("Al")));
    assert_eq!(name(eval(&pick(Expression::Last, Some("age")))), Some(string("Cy")));
}

#[rstest]
#[case(1, Some(3), &[20, 30])]
#[case(2, None, &[30, 40])]
#[case(3, Some(1), &[])]
fn slices(#[case] start: i32, #[case] end: Option<i32>, #[case] expected: &[i32]) {
    let expr = Expression::Slice(SliceExpression {
        element: Element::default(),
        source: Box::new(ints(&[10, 20, 30, 40])),
        start_index: Box::new(Expression::integer(start)),
        end_index: end.map(|e| Box::new(Expression::integer(e))),
    });
    assert_eq!(eval(&expr), int_list(expected));
}

#[test]
fn index_of_uses_equality() {
    let index_of = |target: Expression| {
        Expression::IndexOf(IndexOfExpression {
            element: Element::default(),
            source: Box::new(ints(&[4, 5, 6])),
            target: Box::new(target),
        })
    };
    assert_eq!(eval(&index_of(Expression::integer(6))), int(2));
    assert_eq!(eval(&index_of(Expression::integer(7))), int(-1));
    assert_eq!(eval(&index_of(Expression::null())), CqlValue::Null);
}

#[test]
fn flatten_and_singleton() {
    let nested = Expression::list(vec![ints(&[1, 2]), ints(&[3])]);
    assert_eq!(eval(&unary(Expression::Flatten, nested)), int_list(&[1, 2, 3]));
    assert_eq!(eval(&unary(Expression::SingletonFrom, ints(&[9]))), int(9));
    let err = try_eval(&unary(Expression::SingletonFrom, ints(&[1, 2]))).unwrap_err();
    assert!(matches!(err.root(), EvalError::InvalidArgument { .. }));
}

#[test]
fn sort_by_column_and_direction() {
    let sort = |source: Expression, by: Vec<SortByItem>| {
        Expression::Sort(SortExpression {
            element: Element::default(),
            source: Box::new(source),
            by,
        })
    };
    let descending = sort(
        Expression::list(vec![Expression::integer(2), Expression::null(), Expression::integer(9)]),
        vec![SortByItem::ByDirection { direction: SortDirection::Desc }],
    );
    assert_eq!(
        eval(&descending),
        CqlValue::list(vec![int(9), int(2), CqlValue::Null])
    );

    let by_age = sort(
        people(),
        vec![SortByItem::ByColumn {
            path: "age".to_string(),
            direction: SortDirection::Asc,
        }],
    );
    assert_eq!(names(&eval(&by_age)), ["Al", "Bo", "Cy"]);
}

#[test]
fn for_each_and_iteration_index() {
    let for_each = |body: Expression| {
        Expression::ForEach(IterationExpression {
            element: Element::default(),
            source: Box::new(ints(&[10, 20])),
            body: Box::new(body),
            scope: None,
        })
    };
    assert_eq!(
        eval(&for_each(Expression::multiply(current(), Expression::integer(2)))),
        int_list(&[20, 40])
    );
    assert_eq!(
        eval(&for_each(Expression::Iteration(ScopeExpression::default()))),
        int_list(&[0, 1])
    );
}

#[test]
fn repeat_until_nothing_new() {
    let step = Expression::If(IfExpression {
        element: Element::default(),
        condition: Box::new(Expression::less(current(), Expression::integer(4))),
        then: Box::new(Expression::add(current(), Expression::integer(1))),
        else_: Box::new(Expression::null()),
    });
    let expr = Expression::Repeat(IterationExpression {
        element: Element::default(),
        source: Box::new(ints(&[1])),
        body: Box::new(step),
        scope: None,
    });
    assert_eq!(eval(&expr), int_list(&[1, 2, 3, 4]));
}

#[test]
fn times_joins_tuples() {
    let left = Expression::list(vec![Expression::tuple(vec![("a", Expression::integer(1))])]);
    let right = Expression::list(vec![
        Expression::tuple(vec![("b", Expression::integer(2))]),
        Expression::tuple(vec![("b", Expression::integer(3))]),
    ]);
    let product = eval(&binary(Expression::Times, left, right));
    assert_eq!(
        product,
        CqlValue::list(vec![
            CqlValue::tuple([("a", int(1)), ("b", int(2))]),
            CqlValue::tuple([("a", int(1)), ("b", int(3))]),
        ])
    );
}
