//! Conversion round trips through the engine

use octofhir_elm_engine::{CqlEngine, EvaluationContext, EvaluationOptions};
use octofhir_elm_model::expression::UnaryExpression;
use octofhir_elm_model::{Expression, Library};
use octofhir_elm_types::CqlValue;
use proptest::prelude::*;

fn eval(expr: &Expression) -> CqlValue {
    let options = EvaluationOptions::default()
        .with_timestamp("2024-06-15T12:00:00.000+00:00")
        .with_timezone_offset(0);
    let mut ctx = EvaluationContext::builder(Library::new("Conversions", None))
        .options(options)
        .build()
        .unwrap();
    CqlEngine::new().evaluate(expr, &mut ctx).unwrap()
}

fn offset_text(minutes: i16) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.unsigned_abs();
    format!("{sign}{:02}:{:02}", abs / 60, abs % 60)
}

/// The first `count` of year, month, day, hour, minute, second and
/// millisecond, written as an ISO date and time
fn partial_text(parts: &[u32; 7], count: usize) -> String {
    let mut text = format!("{:04}", parts[0]);
    for (index, part) in parts.iter().enumerate().take(count).skip(1) {
        let piece = match index {
            1 | 2 => format!("-{part:02}"),
            3 => format!("T{part:02}"),
            4 | 5 => format!(":{part:02}"),
            _ => format!(".{part:03}"),
        };
        text.push_str(&piece);
    }
    text
}

fn parts() -> impl Strategy<Value = [u32; 7]> {
    (1u32..=9999, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60, 0u32..1000)
        .prop_map(|(year, month, day, hour, minute, second, ms)| [year, month, day, hour, minute, second, ms])
}

/// Year through millisecond precision; a zone only once there is a time part
fn datetime_text() -> impl Strategy<Value = String> {
    (parts(), 1usize..=7, prop::option::of(-48i16..=56)).prop_map(|(fields, count, quarters)| {
        let mut text = partial_text(&fields, count);
        if let Some(quarters) = quarters.filter(|_| count > 3) {
            text.push_str(&offset_text(quarters * 15));
        }
        text
    })
}

/// Hour through millisecond precision, with the time part as it prints
fn time_text() -> impl Strategy<Value = String> {
    (parts(), 4usize..=7, prop::option::of(-48i16..=56)).prop_map(|(fields, count, quarters)| {
        let full = partial_text(&fields, count);
        let mut text = full.split_once('T').map_or(full.clone(), |(_, time)| time.to_string());
        if let Some(quarters) = quarters {
            text.push_str(&offset_text(quarters * 15));
        }
        text
    })
}

fn round_trip(to: fn(Expression) -> Expression, text: &str) -> CqlValue {
    eval(&Expression::to_string_of(to(Expression::string(text))))
}

fn to_datetime(operand: Expression) -> Expression {
    Expression::ToDateTime(UnaryExpression::new(operand))
}

fn to_date(operand: Expression) -> Expression {
    Expression::ToDate(UnaryExpression::new(operand))
}

fn to_time(operand: Expression) -> Expression {
    Expression::ToTime(UnaryExpression::new(operand))
}

fn to_integer(operand: Expression) -> Expression {
    Expression::ToInteger(UnaryExpression::new(operand))
}

fn converts_to_integer(operand: Expression) -> Expression {
    Expression::ConvertsToInteger(UnaryExpression::new(operand))
}

proptest! {
    #[test]
    fn datetime_strings_survive_a_round_trip(text in datetime_text()) {
        prop_assert_eq!(round_trip(to_datetime, &text), CqlValue::string(text.as_str()));
    }

    #[test]
    fn date_strings_survive_a_round_trip(fields in parts(), count in 1usize..=3) {
        let text = partial_text(&fields, count);
        prop_assert_eq!(round_trip(to_date, &text), CqlValue::string(text.as_str()));
    }

    #[test]
    fn time_strings_survive_a_round_trip(text in time_text(), prefixed in any::<bool>()) {
        let input = if prefixed { format!("T{text}") } else { text.clone() };
        prop_assert_eq!(round_trip(to_time, &input), CqlValue::string(text.as_str()));
    }

    #[test]
    fn integers_survive_a_round_trip(n in any::<i32>()) {
        prop_assert_eq!(round_trip(to_integer, &n.to_string()), CqlValue::string(n.to_string().as_str()));
    }

    #[test]
    fn only_digit_strings_convert_to_integer(text in "[a-z]{1,8}") {
        prop_assert_eq!(eval(&converts_to_integer(Expression::string(text.as_str()))), CqlValue::Boolean(false));
    }
}
