//! Date and Time Operators
//!
//! Implements: Date, DateTime and Time selectors, Now, Today, TimeOfDay,
//! DateFrom, TimeFrom, TimezoneOffsetFrom, DateTimeComponentFrom,
//! DurationBetween, DifferenceBetween, SameAs, SameOrBefore, SameOrAfter

use crate::context::EvaluationContext;
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use octofhir_elm_model::expression::{
    BinaryExpression, DateSelector, DateTimeComponentFromExpression, DateTimeSelector, Expression,
    TimeSelector,
};
use octofhir_elm_types::temporal;
use octofhir_elm_types::{
    CqlDate, CqlDateTime, CqlTime, CqlValue, DateTimePrecision, Temporal, TemporalUnit, compare,
    compare_at,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

/// Two temporal operands brought to a common kind; a Date meeting a
/// DateTime is widened
pub(crate) enum TemporalPair {
    Date(CqlDate, CqlDate),
    DateTime(CqlDateTime, CqlDateTime),
    Time(CqlTime, CqlTime),
}

pub(crate) fn temporal_pair(left: &CqlValue, right: &CqlValue) -> Option<TemporalPair> {
    use CqlValue as V;
    match (left, right) {
        (V::Date(a), V::Date(b)) => Some(TemporalPair::Date(*a, *b)),
        (V::DateTime(a), V::DateTime(b)) => Some(TemporalPair::DateTime(*a, *b)),
        (V::Time(a), V::Time(b)) => Some(TemporalPair::Time(*a, *b)),
        (V::Date(a), V::DateTime(b)) => Some(TemporalPair::DateTime(a.to_datetime(), *b)),
        (V::DateTime(a), V::Date(b)) => Some(TemporalPair::DateTime(*a, b.to_datetime())),
        _ => None,
    }
}

fn between(
    operation: &str,
    left: &CqlValue,
    right: &CqlValue,
    unit: Option<TemporalUnit>,
    count: fn(&TemporalPair, TemporalUnit) -> Option<i64>,
) -> EvalResult<CqlValue> {
    if left.is_null() || right.is_null() {
        return Ok(CqlValue::Null);
    }
    let unit = unit.ok_or_else(|| EvalError::invalid_argument(operation, "a precision is required"))?;
    let pair = temporal_pair(left, right).ok_or_else(|| {
        EvalError::type_mismatch(
            operation,
            "two Date, DateTime or Time values",
            format!("{} and {}", left.type_name(), right.type_name()),
        )
    })?;
    Ok(match count(&pair, unit) {
        Some(n) => i32::try_from(n).map_or(CqlValue::Long(n), CqlValue::Integer),
        None => CqlValue::Null,
    })
}

/// Whole periods of `unit` from `left` to `right`
pub fn duration_between(left: &CqlValue, right: &CqlValue, unit: Option<TemporalUnit>) -> EvalResult<CqlValue> {
    between("DurationBetween", left, right, unit, |pair, unit| match pair {
        TemporalPair::Date(a, b) => temporal::duration_between(a, b, unit),
        TemporalPair::DateTime(a, b) => temporal::duration_between(a, b, unit),
        TemporalPair::Time(a, b) => temporal::duration_between(a, b, unit),
    })
}

/// Boundaries of `unit` crossed going from `left` to `right`
pub fn difference_between(left: &CqlValue, right: &CqlValue, unit: Option<TemporalUnit>) -> EvalResult<CqlValue> {
    between("DifferenceBetween", left, right, unit, |pair, unit| match pair {
        TemporalPair::Date(a, b) => temporal::difference_between(a, b, unit),
        TemporalPair::DateTime(a, b) => temporal::difference_between(a, b, unit),
        TemporalPair::Time(a, b) => temporal::difference_between(a, b, unit),
    })
}

pub(crate) fn ordering_at(left: &CqlValue, right: &CqlValue, precision: Option<DateTimePrecision>) -> EvalResult<Option<Ordering>> {
    Ok(match precision {
        Some(precision) => compare_at(left, right, precision)?,
        None => compare(left, right)?,
    })
}

pub fn same_as(left: &CqlValue, right: &CqlValue, precision: Option<DateTimePrecision>) -> EvalResult<CqlValue> {
    Ok(ordering_at(left, right, precision)?.map(Ordering::is_eq).into())
}

pub fn same_or_before(left: &CqlValue, right: &CqlValue, precision: Option<DateTimePrecision>) -> EvalResult<CqlValue> {
    Ok(ordering_at(left, right, precision)?.map(Ordering::is_le).into())
}

pub fn same_or_after(left: &CqlValue, right: &CqlValue, precision: Option<DateTimePrecision>) -> EvalResult<CqlValue> {
    Ok(ordering_at(left, right, precision)?.map(Ordering::is_ge).into())
}

pub fn date_from(operand: &CqlValue) -> EvalResult<CqlValue> {
    match operand {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::DateTime(dt) => Ok(CqlValue::Date(dt.date())),
        CqlValue::Date(d) => Ok(CqlValue::Date(*d)),
        other => Err(EvalError::type_mismatch("DateFrom", "DateTime", other.type_name())),
    }
}

/// Null when the DateTime has no time part
pub fn time_from(operand: &CqlValue) -> EvalResult<CqlValue> {
    match operand {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::DateTime(dt) => Ok(dt.time().into()),
        other => Err(EvalError::type_mismatch("TimeFrom", "DateTime", other.type_name())),
    }
}

/// Offset in hours, as a Decimal
pub fn timezone_offset_from(operand: &CqlValue) -> EvalResult<CqlValue> {
    match operand {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::DateTime(dt) => Ok(dt
            .offset_minutes()
            .and_then(|m| Decimal::from(m).checked_div(Decimal::from(60)))
            .map(|h| h.normalize())
            .into()),
        other => Err(EvalError::type_mismatch("TimezoneOffsetFrom", "DateTime", other.type_name())),
    }
}

pub fn component_from(operand: &CqlValue, unit: TemporalUnit) -> EvalResult<CqlValue> {
    let precision = unit.precision();
    let component = match operand {
        CqlValue::Null => None,
        CqlValue::Date(d) if precision <= DateTimePrecision::Day => d.component(precision),
        CqlValue::Date(_) => None,
        CqlValue::DateTime(dt) => dt.component(precision),
        CqlValue::Time(t) if precision >= DateTimePrecision::Hour => t.component(precision),
        CqlValue::Time(_) => None,
        other => {
            return Err(EvalError::type_mismatch(
                "DateTimeComponentFrom",
                "Date, DateTime or Time",
                other.type_name(),
            ));
        }
    };
    Ok(component.into())
}

// ============================================================================
// Selectors
// ============================================================================

/// Components evaluated in order, stopping at the first Null
fn component<T: TryFrom<i32>>(value: &CqlValue, name: &str) -> EvalResult<Option<T>> {
    match value {
        CqlValue::Null => Ok(None),
        CqlValue::Integer(i) => T::try_from(*i)
            .map(Some)
            .map_err(|_| EvalError::invalid_argument("DateTime", format!("{name} {i} is out of range"))),
        other => Err(EvalError::type_mismatch("DateTime", "Integer", other.type_name())),
    }
}

impl CqlEngine {
    /// Evaluate optional selector components until the first absent or Null one
    fn eval_components(
        &self,
        parts: &[Option<&Expression>],
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Vec<CqlValue>> {
        let mut values = Vec::with_capacity(parts.len());
        for part in parts {
            let Some(expression) = part else { break };
            let value = self.evaluate(expression, ctx)?;
            if value.is_null() {
                break;
            }
            values.push(value);
        }
        values.resize(parts.len(), CqlValue::Null);
        Ok(values)
    }

    pub fn eval_date_selector(&self, expr: &DateSelector, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let parts = [Some(&*expr.year), expr.month.as_deref(), expr.day.as_deref()];
        let values = self.eval_components(&parts, ctx)?;
        let Some(year) = component::<i32>(&values[0], "year")? else {
            return Ok(CqlValue::Null);
        };
        let date = CqlDate::try_new(year, component(&values[1], "month")?, component(&values[2], "day")?)?;
        Ok(CqlValue::Date(date))
    }

    /// A selector without an offset takes the evaluation zone's offset
    pub fn eval_datetime_selector(&self, expr: &DateTimeSelector, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let parts = [
            Some(&*expr.year),
            expr.month.as_deref(),
            expr.day.as_deref(),
            expr.hour.as_deref(),
            expr.minute.as_deref(),
            expr.second.as_deref(),
            expr.millisecond.as_deref(),
        ];
        let values = self.eval_components(&parts, ctx)?;
        let Some(year) = component::<i32>(&values[0], "year")? else {
            return Ok(CqlValue::Null);
        };
        let datetime = CqlDateTime::try_new(
            year,
            component(&values[1], "month")?,
            component(&values[2], "day")?,
            component(&values[3], "hour")?,
            component(&values[4], "minute")?,
            component(&values[5], "second")?,
            component(&values[6], "millisecond")?,
        )?;

        let offset = self.eval_optional(expr.timezone_offset.as_deref(), ctx)?;
        let datetime = match offset {
            CqlValue::Null => datetime.or_inferred_offset(ctx.timezone_offset())?,
            hours => {
                let minutes = hours
                    .as_decimal()
                    .and_then(|h| (h * Decimal::from(60)).round().to_i16())
                    .ok_or_else(|| {
                        EvalError::invalid_argument("DateTime", format!("timezone offset {hours}"))
                    })?;
                datetime.with_offset(minutes)?
            }
        };
        Ok(CqlValue::DateTime(datetime))
    }

    pub fn eval_time_selector(&self, expr: &TimeSelector, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let parts = [
            Some(&*expr.hour),
            expr.minute.as_deref(),
            expr.second.as_deref(),
            expr.millisecond.as_deref(),
        ];
        let values = self.eval_components(&parts, ctx)?;
        let Some(hour) = component::<u8>(&values[0], "hour")? else {
            return Ok(CqlValue::Null);
        };
        let time = CqlTime::try_new(
            hour,
            component(&values[1], "minute")?,
            component(&values[2], "second")?,
            component(&values[3], "millisecond")?,
        )?;
        Ok(CqlValue::Time(time))
    }

    pub fn eval_component_from(
        &self,
        expr: &DateTimeComponentFromExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let operand = self.evaluate(&expr.operand, ctx)?;
        component_from(&operand, expr.precision)
    }

    /// DurationBetween, DifferenceBetween and the Same* family share the
    /// node's precision attribute
    pub fn eval_temporal_binary(
        &self,
        expr: &BinaryExpression,
        ctx: &mut EvaluationContext,
        op: fn(&CqlValue, &CqlValue, Option<TemporalUnit>) -> EvalResult<CqlValue>,
    ) -> EvalResult<CqlValue> {
        let (left, right) = self.eval_binary_operands(expr, ctx)?;
        op(&left, &right, expr.precision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(text: &str) -> CqlValue {
        CqlValue::Date(CqlDate::parse(text).unwrap())
    }

    fn datetime(text: &str) -> CqlValue {
        CqlValue::DateTime(CqlDateTime::parse(text).unwrap())
    }

    #[rstest]
    #[case("2000-06-15", "2020-06-14", TemporalUnit::Year, 19)]
    #[case("2000-06-15", "2020-06-15", TemporalUnit::Year, 20)]
    #[case("2020-01-31", "2020-02-29", TemporalUnit::Month, 0)]
    #[case("2020-01-01", "2020-01-15", TemporalUnit::Week, 2)]
    fn whole_periods(#[case] a: &str, #[case] b: &str, #[case] unit: TemporalUnit, #[case] expected: i32) {
        assert_eq!(
            duration_between(&date(a), &date(b), Some(unit)).unwrap(),
            CqlValue::Integer(expected)
        );
    }

    #[test]
    fn boundaries_crossed_differ_from_whole_periods() {
        let (a, b) = (date("2020-12-31"), date("2021-01-01"));
        assert_eq!(duration_between(&a, &b, Some(TemporalUnit::Year)).unwrap(), CqlValue::Integer(0));
        assert_eq!(difference_between(&a, &b, Some(TemporalUnit::Year)).unwrap(), CqlValue::Integer(1));
    }

    #[test]
    fn missing_precision_or_null_operands() {
        assert_eq!(
            duration_between(&CqlValue::Null, &date("2020"), Some(TemporalUnit::Year)).unwrap(),
            CqlValue::Null
        );
        assert_eq!(
            duration_between(&date("2020"), &date("2021-05-01"), Some(TemporalUnit::Month)).unwrap(),
            CqlValue::Null
        );
        assert!(duration_between(&date("2020"), &date("2021"), None).is_err());
    }

    #[test]
    fn same_as_at_precision() {
        let (a, b) = (datetime("2020-01-01T10:00"), datetime("2020-01-01T11:30"));
        assert_eq!(same_as(&a, &b, Some(DateTimePrecision::Day)).unwrap(), CqlValue::Boolean(true));
        assert_eq!(same_as(&a, &b, Some(DateTimePrecision::Hour)).unwrap(), CqlValue::Boolean(false));
        assert_eq!(same_or_before(&a, &b, Some(DateTimePrecision::Hour)).unwrap(), CqlValue::Boolean(true));
        assert_eq!(same_or_after(&a, &b, None).unwrap(), CqlValue::Boolean(false));
        assert_eq!(
            same_as(&date("2020"), &date("2020-01-01"), Some(DateTimePrecision::Day)).unwrap(),
            CqlValue::Null
        );
    }

    #[test]
    fn extraction() {
        let dt = datetime("2020-03-04T05:06:07.008-05:00");
        assert_eq!(date_from(&dt).unwrap(), date("2020-03-04"));
        assert_eq!(
            time_from(&dt).unwrap(),
            CqlValue::Time(CqlTime::parse("05:06:07.008").unwrap())
        );
        assert_eq!(time_from(&datetime("2020-03-04")).unwrap(), CqlValue::Null);
        assert_eq!(timezone_offset_from(&dt).unwrap(), CqlValue::Decimal(Decimal::from(-5)));
        assert_eq!(component_from(&dt, TemporalUnit::Month).unwrap(), CqlValue::Integer(3));
        assert_eq!(component_from(&date("2020"), TemporalUnit::Month).unwrap(), CqlValue::Null);
    }
}
