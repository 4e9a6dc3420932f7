//! Logical Operators
//!
//! Implements: And, Or, Xor, Implies, Not
//! All logical operators implement three-valued logic: Null stands for an
//! unknown truth value.

use crate::context::EvaluationContext;
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use octofhir_elm_model::expression::BinaryExpression;
use octofhir_elm_types::CqlValue;

/// Read a three-valued truth value
fn truth(value: &CqlValue, operation: &str) -> EvalResult<Option<bool>> {
    match value {
        CqlValue::Boolean(b) => Ok(Some(*b)),
        CqlValue::Null => Ok(None),
        other => Err(EvalError::type_mismatch(operation, "Boolean", other.type_name())),
    }
}

fn from_truth(value: Option<bool>) -> CqlValue {
    value.map_or(CqlValue::Null, CqlValue::Boolean)
}

/// And with three-valued logic
///
/// | A     | B     | A and B |
/// |-------|-------|---------|
/// | true  | true  | true    |
/// | true  | false | false   |
/// | true  | null  | null    |
/// | false | any   | false   |
/// | null  | false | false   |
/// | null  | null  | null    |
pub fn and(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    let result = match (truth(left, "And")?, truth(right, "And")?) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    };
    Ok(from_truth(result))
}

/// Or with three-valued logic
///
/// | A     | B     | A or B |
/// |-------|-------|--------|
/// | true  | any   | true   |
/// | false | false | false  |
/// | false | null  | null   |
/// | null  | true  | true   |
/// | null  | null  | null   |
pub fn or(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    let result = match (truth(left, "Or")?, truth(right, "Or")?) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    };
    Ok(from_truth(result))
}

/// True when exactly one operand is true; Null if either is Null
pub fn xor(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    let result = match (truth(left, "Xor")?, truth(right, "Xor")?) {
        (Some(a), Some(b)) => Some(a != b),
        _ => None,
    };
    Ok(from_truth(result))
}

/// `A implies B` is `(not A) or B`
pub fn implies(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    let result = match (truth(left, "Implies")?, truth(right, "Implies")?) {
        (Some(false), _) | (_, Some(true)) => Some(true),
        (Some(true), b) => b,
        (None, _) => None,
    };
    Ok(from_truth(result))
}

pub fn not(operand: &CqlValue) -> EvalResult<CqlValue> {
    Ok(from_truth(truth(operand, "Not")?.map(|b| !b)))
}

impl CqlEngine {
    /// And, skipping the right operand once the left one is false
    pub fn eval_and(&self, expr: &BinaryExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let left = self.evaluate(expr.left(), ctx)?;
        if left.is_false() {
            return Ok(CqlValue::Boolean(false));
        }
        let right = self.evaluate(expr.right(), ctx)?;
        and(&left, &right)
    }

    /// Or, skipping the right operand once the left one is true
    pub fn eval_or(&self, expr: &BinaryExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let left = self.evaluate(expr.left(), ctx)?;
        if left.is_true() {
            return Ok(CqlValue::Boolean(true));
        }
        let right = self.evaluate(expr.right(), ctx)?;
        or(&left, &right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const T: CqlValue = CqlValue::Boolean(true);
    const F: CqlValue = CqlValue::Boolean(false);
    const N: CqlValue = CqlValue::Null;

    #[rstest]
    #[case(T, T, T)]
    #[case(T, F, F)]
    #[case(T, N, N)]
    #[case(F, N, F)]
    #[case(N, F, F)]
    #[case(N, N, N)]
    fn and_truth_table(#[case] a: CqlValue, #[case] b: CqlValue, #[case] expected: CqlValue) {
        assert_eq!(and(&a, &b).unwrap(), expected);
    }

    #[rstest]
    #[case(T, N, T)]
    #[case(N, T, T)]
    #[case(F, F, F)]
    #[case(F, N, N)]
    #[case(N, N, N)]
    fn or_truth_table(#[case] a: CqlValue, #[case] b: CqlValue, #[case] expected: CqlValue) {
        assert_eq!(or(&a, &b).unwrap(), expected);
    }

    #[rstest]
    #[case(F, N, T)]
    #[case(N, T, T)]
    #[case(T, F, F)]
    #[case(T, N, N)]
    #[case(N, F, N)]
    fn implies_truth_table(#[case] a: CqlValue, #[case] b: CqlValue, #[case] expected: CqlValue) {
        assert_eq!(implies(&a, &b).unwrap(), expected);
    }

    #[test]
    fn xor_and_not() {
        assert_eq!(xor(&T, &F).unwrap(), T);
        assert_eq!(xor(&T, &T).unwrap(), F);
        assert_eq!(xor(&T, &N).unwrap(), N);
        assert_eq!(not(&T).unwrap(), F);
        assert_eq!(not(&N).unwrap(), N);
    }

    #[test]
    fn non_boolean_operand_is_a_type_mismatch() {
        let err = and(&CqlValue::Integer(1), &T).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }
}
