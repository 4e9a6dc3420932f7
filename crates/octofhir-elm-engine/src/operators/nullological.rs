//! Nullological and Conditional Operators
//!
//! Implements: IsNull, IsTrue, IsFalse, Coalesce, If, Case
//! None of these propagate Null: they exist to inspect or replace it.

use crate::context::EvaluationContext;
use crate::engine::CqlEngine;
use crate::error::EvalResult;
use octofhir_elm_model::expression::{CaseExpression, IfExpression, NaryExpression};
use octofhir_elm_types::{CqlValue, equal};

pub fn is_null(operand: &CqlValue) -> EvalResult<CqlValue> {
    Ok(CqlValue::Boolean(operand.is_null()))
}

pub fn is_true(operand: &CqlValue) -> EvalResult<CqlValue> {
    Ok(CqlValue::Boolean(operand.is_true()))
}

pub fn is_false(operand: &CqlValue) -> EvalResult<CqlValue> {
    Ok(CqlValue::Boolean(operand.is_false()))
}

/// First non-null value; a single list operand is searched element-wise
pub fn coalesce(values: &[CqlValue]) -> CqlValue {
    if let [CqlValue::List(list)] = values {
        return list
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(CqlValue::Null);
    }
    values
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(CqlValue::Null)
}

impl CqlEngine {
    /// Operands are evaluated left to right and only until one is non-null
    pub fn eval_coalesce(&self, expr: &NaryExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        if let [only] = expr.operand.as_slice() {
            let value = self.evaluate(only, ctx)?;
            return Ok(coalesce(std::slice::from_ref(&value)));
        }
        for operand in &expr.operand {
            let value = self.evaluate(operand, ctx)?;
            if !value.is_null() {
                return Ok(value);
            }
        }
        Ok(CqlValue::Null)
    }

    /// A Null condition selects the else branch
    pub fn eval_if(&self, expr: &IfExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let condition = self.evaluate(&expr.condition, ctx)?;
        if condition.is_true() {
            self.evaluate(&expr.then, ctx)
        } else {
            self.evaluate(&expr.else_, ctx)
        }
    }

    pub fn eval_case(&self, expr: &CaseExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let comparand = match &expr.comparand {
            Some(comparand) => Some(self.evaluate(comparand, ctx)?),
            None => None,
        };

        for item in &expr.case_item {
            let when = self.evaluate(&item.when, ctx)?;
            let selected = match &comparand {
                Some(value) => equal(value, &when) == Some(true),
                None => when.is_true(),
            };
            if selected {
                return self.evaluate(&item.then, ctx);
            }
        }

        self.evaluate(&expr.else_, ctx)
    }
}
