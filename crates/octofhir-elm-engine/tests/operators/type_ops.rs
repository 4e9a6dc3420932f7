use crate::{date, datetime, dec, eval, int, ints, string, time, try_eval, unary};
use octofhir_elm_engine::EvalError;
use octofhir_elm_model::expression::{TypeOperatorExpression, UnaryExpression};
use octofhir_elm_model::{Element, Expression, TypeSpecifier};
use octofhir_elm_types::{CqlQuantity, CqlRatio, CqlValue};
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

type TypeOperator = fn(TypeOperatorExpression) -> Expression;
type Conversion = fn(UnaryExpression) -> Expression;

fn typed(variant: TypeOperator, operand: Expression, type_name: &str) -> Expression {
    variant(TypeOperatorExpression {
        element: Element::default(),
        operand: Box::new(operand),
        type_name: Some(type_name.to_string()),
        type_specifier: None,
        strict: false,
    })
}

fn specified(variant: TypeOperator, operand: Expression, specifier: TypeSpecifier) -> Expression {
    variant(TypeOperatorExpression {
        element: Element::default(),
        operand: Box::new(operand),
        type_name: None,
        type_specifier: Some(specifier),
        strict: false,
    })
}

fn list_of(name: &str) -> TypeSpecifier {
    TypeSpecifier::List {
        element_type: Box::new(TypeSpecifier::named(name)),
    }
}

#[rstest]
#[case::integer(Expression::integer(1), "Integer", true)]
#[case::qualified(Expression::integer(1), "{urn:hl7-org:elm-types:r1}Integer", true)]
#[case::not_decimal(Expression::integer(1), "Decimal", false)]
#[case::any(Expression::string("a"), "Any", true)]
#[case::null_is_nothing(Expression::null(), "String", false)]
#[case::date(Expression::date("2024-01-01"), "System.Date", true)]
fn is_checks_the_runtime_type(#[case] operand: Expression, #[case] type_name: &str, #[case] expected: bool) {
    assert_eq!(eval(&typed(Expression::Is, operand, type_name)), CqlValue::Boolean(expected));
}

#[test]
fn is_with_a_list_specifier() {
    assert_eq!(
        eval(&specified(Expression::Is, ints(&[1, 2]), list_of("Integer"))),
        CqlValue::Boolean(true)
    );
    assert_eq!(
        eval(&specified(Expression::Is, ints(&[1, 2]), list_of("String"))),
        CqlValue::Boolean(false)
    );
}

#[test]
fn is_matches_resource_type_of_model_tuples() {
    let patient = Expression::tuple(vec![
        ("resourceType", Expression::string("Patient")),
        ("id", Expression::string("p1")),
    ]);
    assert_eq!(
        eval(&typed(Expression::Is, patient.clone(), "FHIR.Patient")),
        CqlValue::Boolean(true)
    );
    assert_eq!(
        eval(&typed(Expression::Is, patient, "FHIR.Observation")),
        CqlValue::Boolean(false)
    );
}

#[test]
fn as_is_null_on_mismatch_unless_strict() {
    assert_eq!(eval(&typed(Expression::As, Expression::integer(5), "Integer")), int(5));
    assert_eq!(eval(&typed(Expression::As, Expression::integer(5), "String")), CqlValue::Null);

    let strict = Expression::As(TypeOperatorExpression {
        element: Element::default(),
        operand: Box::new(Expression::integer(5)),
        type_name: Some("String".to_string()),
        type_specifier: None,
        strict: true,
    });
    let err = try_eval(&strict).unwrap_err();
    assert!(matches!(err.root(), EvalError::TypeMismatch { .. }));
}

#[rstest]
#[case::to_decimal(Expression::integer(2), "Decimal", dec("2"))]
#[case::to_string(Expression::integer(42), "String", string("42"))]
#[case::parse_date(Expression::string("2024-03-01"), "Date", date("2024-03-01"))]
#[case::parse_integer(Expression::string(" -17 "), "Integer", int(-17))]
#[case::null(Expression::null(), "Integer", CqlValue::Null)]
fn convert_to_named_types(#[case] operand: Expression, #[case] type_name: &str, #[case] expected: CqlValue) {
    assert_eq!(eval(&typed(Expression::Convert, operand, type_name)), expected);
}

#[test]
fn convert_rejects_malformed_strings() {
    let err = try_eval(&typed(Expression::Convert, Expression::string("abc"), "Integer")).unwrap_err();
    assert!(matches!(err.root(), EvalError::Format { .. }));
}

#[rstest]
#[case::parseable(Expression::string("12"), "Integer", CqlValue::Boolean(true))]
#[case::malformed(Expression::string("12.5"), "Integer", CqlValue::Boolean(false))]
#[case::unsupported(Expression::date("2024-01-01"), "Integer", CqlValue::Boolean(false))]
#[case::null(Expression::null(), "Integer", CqlValue::Null)]
fn can_convert(#[case] operand: Expression, #[case] type_name: &str, #[case] expected: CqlValue) {
    assert_eq!(eval(&typed(Expression::CanConvert, operand, type_name)), expected);
}

#[rstest]
#[case::boolean_from_string(Expression::ToBoolean, Expression::string("yes"), CqlValue::Boolean(true))]
#[case::boolean_from_zero(Expression::ToBoolean, Expression::integer(0), CqlValue::Boolean(false))]
#[case::integer_truncates(Expression::ToInteger, Expression::decimal("7.9"), int(7))]
#[case::integer_out_of_range(Expression::ToInteger, Expression::long(5_000_000_000), CqlValue::Null)]
#[case::long_from_string(Expression::ToLong, Expression::string("5000000000"), CqlValue::Long(5_000_000_000))]
#[case::decimal_from_string(Expression::ToDecimal, Expression::string("+1.50"), dec("1.50"))]
#[case::string_from_boolean(Expression::ToString, Expression::boolean(false), string("false"))]
#[case::date_from_datetime(Expression::ToDate, Expression::datetime("2024-03-01T10:00:00.000+00:00"), date("2024-03-01"))]
#[case::time_from_string(Expression::ToTime, Expression::string("T14:30:00"), time("14:30:00+00:00"))]
#[case::null_stays_null(Expression::ToDecimal, Expression::null(), CqlValue::Null)]
fn scalar_conversions(#[case] variant: Conversion, #[case] operand: Expression, #[case] expected: CqlValue) {
    assert_eq!(eval(&unary(variant, operand)), expected);
}

#[test]
fn to_datetime_takes_the_evaluation_zone() {
    assert_eq!(
        eval(&unary(Expression::ToDateTime, Expression::string("2024-03-01T10:00:00"))),
        datetime("2024-03-01T10:00:00+00:00")
    );
    assert_eq!(
        eval(&unary(Expression::ToDateTime, Expression::date("2024-03-01"))).to_string(),
        "2024-03-01"
    );
}

#[test]
fn to_boolean_rejects_other_numbers() {
    let err = try_eval(&unary(Expression::ToBoolean, Expression::integer(2))).unwrap_err();
    assert!(matches!(err.root(), EvalError::Format { .. }));
}

#[rstest]
#[case::quoted_unit("5 'mg'", CqlQuantity::new(Decimal::from(5), "mg"))]
#[case::calendar_unit("3 days", CqlQuantity::new(Decimal::from(3), "days"))]
#[case::unitless("2.5", CqlQuantity::unitless(Decimal::new(25, 1)))]
fn to_quantity_from_strings(#[case] text: &str, #[case] expected: CqlQuantity) {
    assert_eq!(
        eval(&unary(Expression::ToQuantity, Expression::string(text))),
        CqlValue::Quantity(expected)
    );
}

#[test]
fn to_ratio_from_string() {
    let expected = CqlRatio::new(
        CqlQuantity::new(Decimal::ONE, "mg"),
        CqlQuantity::new(Decimal::from(10), "mL"),
    );
    assert_eq!(
        eval(&unary(Expression::ToRatio, Expression::string("1 'mg':10 'mL'"))),
        CqlValue::Ratio(expected)
    );
}

#[test]
fn to_chars_and_to_list() {
    assert_eq!(
        eval(&unary(Expression::ToChars, Expression::string("ab"))),
        CqlValue::list(vec![string("a"), string("b")])
    );
    assert_eq!(
        eval(&unary(Expression::ToList, Expression::integer(3))),
        CqlValue::list(vec![int(3)])
    );
    assert_eq!(
        eval(&unary(Expression::ToList, Expression::null())),
        CqlValue::list(vec![])
    );
}

#[rstest]
#[case::integer(Expression::ConvertsToInteger, Expression::string("12"), Some(true))]
#[case::integer_malformed(Expression::ConvertsToInteger, Expression::string("twelve"), Some(false))]
#[case::decimal_exponent(Expression::ConvertsToDecimal, Expression::string("1e3"), Some(false))]
#[case::date(Expression::ConvertsToDate, Expression::string("2024-02-30"), Some(false))]
#[case::datetime(Expression::ConvertsToDateTime, Expression::string("2024-02-01T10:00"), Some(true))]
#[case::time(Expression::ConvertsToTime, Expression::string("25:00"), Some(false))]
#[case::quantity(Expression::ConvertsToQuantity, Expression::string("5 'mg'"), Some(true))]
#[case::string(Expression::ConvertsToString, Expression::integer(1), Some(true))]
#[case::boolean(Expression::ConvertsToBoolean, Expression::string("maybe"), Some(false))]
#[case::null(Expression::ConvertsToLong, Expression::null(), None)]
fn converts_to_predicates(#[case] variant: Conversion, #[case] operand: Expression, #[case] expected: Option<bool>) {
    assert_eq!(eval(&unary(variant, operand)), CqlValue::from(expected));
}
