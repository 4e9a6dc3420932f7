use crate::{eval, int, string, NOW};
use mockall::predicate::{always, function};
use octofhir_elm_engine::{
    CqlEngine, EvalError, EvaluationContext, EvaluationOptions, TerminologyError,
    TerminologyProvider, VocabularyRef,
};
use octofhir_elm_model::expression::{
    BinaryExpression, CalculateAgeExpression, CodeSelector, ConceptSelector, DefinitionRef,
    MembershipExpression,
};
use octofhir_elm_model::{Element, Expression, Library};
use octofhir_elm_types::{CqlCode, CqlValue, TemporalUnit};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

const LOINC: &str = "http://loinc.org";
const DIABETES: &str = "urn:oid:2.16.840.1.113883.3.464.1003.103.12.1001";

mockall::mock! {
    Terminology {}
    impl TerminologyProvider for Terminology {
        fn in_value_set(&self, code: &CqlCode, value_set: &VocabularyRef) -> Result<bool, TerminologyError>;
        fn in_code_system(&self, code: &CqlCode, code_system: &VocabularyRef) -> Result<bool, TerminologyError>;
        fn expand_value_set(&self, value_set: &VocabularyRef) -> Result<Vec<CqlCode>, TerminologyError>;
    }
}

fn library() -> Library {
    Library::new("Clinical", None)
        .with_code_system("LOINC", LOINC, Some("2.76"))
        .with_value_set("Diabetes", DIABETES)
        .with_code("Glucose", "2345-7", "LOINC", Some("Glucose [Mass/volume] in Serum or Plasma"))
}

fn evaluate_in(expr: &Expression, terminology: Option<MockTerminology>) -> Result<CqlValue, EvalError> {
    let options = EvaluationOptions::default()
        .with_timestamp(NOW)
        .with_timezone_offset(0);
    let mut builder = EvaluationContext::builder(library()).options(options);
    if let Some(provider) = terminology {
        builder = builder.terminology(Arc::new(provider));
    }
    let mut ctx = builder.build().unwrap();
    CqlEngine::new().evaluate(expr, &mut ctx)
}

fn code(value: &str, system: &str) -> Expression {
    Expression::Code(CodeSelector {
        element: Element::default(),
        code: value.to_string(),
        system: DefinitionRef::named(system),
        display: None,
    })
}

fn membership(
    variant: fn(MembershipExpression) -> Expression,
    code: Expression,
    vocabulary: Expression,
) -> Expression {
    variant(MembershipExpression {
        element: Element::default(),
        code: Box::new(code),
        vocabulary: Box::new(vocabulary),
    })
}

fn value_set() -> Expression {
    Expression::ValueSetRef(DefinitionRef::named("Diabetes"))
}

#[test]
fn code_ref_resolves_its_system() {
    let value = evaluate_in(&Expression::CodeRef(DefinitionRef::named("Glucose")), None).unwrap();
    let CqlValue::Code(code) = value else {
        panic!("expected a Code, got {value:?}");
    };
    assert_eq!(code.code, "2345-7");
    assert_eq!(code.system.as_deref(), Some(LOINC));
    assert_eq!(code.version.as_deref(), Some("2.76"));
}

#[test]
fn value_set_ref_is_a_vocabulary_tuple() {
    let value = evaluate_in(&value_set(), None).unwrap();
    let tuple = value.as_tuple().unwrap();
    assert_eq!(tuple.get("id"), Some(&string(DIABETES)));
    assert_eq!(tuple.get("name"), Some(&string("Diabetes")));
}

#[test]
fn concept_selector_gathers_codes() {
    let concept = Expression::Concept(ConceptSelector {
        element: Element::default(),
        codes: vec![
            CodeSelector {
                element: Element::default(),
                code: "2345-7".to_string(),
                system: DefinitionRef::named("LOINC"),
                display: None,
            },
        ],
        display: Some("Glucose".to_string()),
    });
    let value = evaluate_in(&concept, None).unwrap();
    let CqlValue::Concept(concept) = value else {
        panic!("expected a Concept, got {value:?}");
    };
    assert_eq!(concept.codes.len(), 1);
    assert_eq!(concept.display.as_deref(), Some("Glucose"));
}

#[rstest]
#[case::same_system(code("2345-7", "LOINC"), true)]
#[case::bare_string(Expression::string("2345-7"), false)]
fn in_code_system_without_provider(#[case] candidate: Expression, #[case] expected: bool) {
    let expr = membership(
        Expression::InCodeSystem,
        candidate,
        Expression::CodeSystemRef(DefinitionRef::named("LOINC")),
    );
    assert_eq!(evaluate_in(&expr, None).unwrap(), CqlValue::Boolean(expected));
}

#[test]
fn in_code_system_of_null_system_is_null() {
    let expr = membership(Expression::InCodeSystem, code("2345-7", "LOINC"), Expression::null());
    assert_eq!(evaluate_in(&expr, None).unwrap(), CqlValue::Null);
}

#[test]
fn in_value_set_asks_the_provider() {
    let mut terminology = MockTerminology::new();
    terminology
        .expect_in_value_set()
        .with(
            function(|code: &CqlCode| code.code == "2345-7"),
            function(|set: &VocabularyRef| set.id == DIABETES),
        )
        .times(1)
        .returning(|_, _| Ok(true));

    let expr = membership(Expression::InValueSet, code("2345-7", "LOINC"), value_set());
    assert_eq!(evaluate_in(&expr, Some(terminology)).unwrap(), CqlValue::Boolean(true));
}

#[test]
fn in_value_set_provider_failure_propagates() {
    let mut terminology = MockTerminology::new();
    terminology
        .expect_in_value_set()
        .with(always(), always())
        .returning(|_, set| Err(TerminologyError::new(set.id.as_str(), "server unavailable")));

    let expr = membership(Expression::InValueSet, code("2345-7", "LOINC"), value_set());
    let err = evaluate_in(&expr, Some(terminology)).unwrap_err();
    assert!(matches!(err.root(), EvalError::Terminology(_)));
}

#[test]
fn in_value_set_without_provider_is_unsupported() {
    let expr = membership(Expression::InValueSet, code("2345-7", "LOINC"), value_set());
    let err = evaluate_in(&expr, None).unwrap_err();
    assert!(matches!(err.root(), EvalError::UnsupportedOperation { .. }));
}

#[test]
fn null_code_is_not_in_any_value_set() {
    let expr = membership(Expression::InValueSet, Expression::null(), value_set());
    assert_eq!(evaluate_in(&expr, None).unwrap(), CqlValue::Boolean(false));
}

fn age(operand: Expression, precision: TemporalUnit) -> Expression {
    Expression::CalculateAge(CalculateAgeExpression {
        element: Element::default(),
        operand: Box::new(operand),
        precision,
    })
}

#[rstest]
#[case::day_before_birthday(Expression::date("2000-06-16"), TemporalUnit::Year, int(23))]
#[case::on_birthday(Expression::date("2000-06-15"), TemporalUnit::Year, int(24))]
#[case::months(Expression::date("2024-01-20"), TemporalUnit::Month, int(4))]
#[case::datetime_birth(Expression::datetime("1990-01-01T00:00:00.000+00:00"), TemporalUnit::Year, int(34))]
#[case::null_birth(Expression::null(), TemporalUnit::Year, CqlValue::Null)]
fn calculate_age_uses_the_evaluation_clock(
    #[case] birth: Expression,
    #[case] precision: TemporalUnit,
    #[case] expected: CqlValue,
) {
    assert_eq!(eval(&age(birth, precision)), expected);
}

#[test]
fn calculate_age_at_a_given_date() {
    let expr = Expression::CalculateAgeAt(
        BinaryExpression::new(Expression::date("1980-03-01"), Expression::date("2020-02-29"))
            .with_precision(TemporalUnit::Year),
    );
    assert_eq!(eval(&expr), int(39));
}

#[test]
fn calculate_age_at_datetimes_in_days() {
    let expr = Expression::CalculateAgeAt(
        BinaryExpression::new(
            Expression::datetime("2024-06-01T12:00:00.000+00:00"),
            Expression::datetime("2024-06-15T11:00:00.000+00:00"),
        )
        .with_precision(TemporalUnit::Day),
    );
    assert_eq!(eval(&expr), int(13));
}
