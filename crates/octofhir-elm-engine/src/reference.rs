//! Reference Evaluation
//!
//! Names are resolved in this order: the scope stack (operands, aliases,
//! lets, iteration variables), then fields of `$this`, then definitions and
//! parameters of the library the reference names or the active library.

use crate::context::{Binding, EvaluationContext, Scope, ScopedName, THIS};
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use log::debug;
use octofhir_elm_model::expression::{
    ExpressionRef, FunctionRef, IdentifierRef, NameRef, ParameterRef, Property,
};
use octofhir_elm_model::library::AccessModifier;
use octofhir_elm_model::Library;
use octofhir_elm_types::{CqlList, CqlValue};
use std::sync::Arc;

impl CqlEngine {
    /// Library a reference points into: the include named by `library_name`,
    /// or the active library
    pub(crate) fn library_for(
        library_name: Option<&str>,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Arc<Library>> {
        match library_name {
            Some(alias) => ctx.included_library(alias),
            None => Ok(Arc::clone(ctx.library())),
        }
    }

    pub(crate) fn eval_expression_ref(
        &self,
        reference: &ExpressionRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let Some(alias) = reference.library_name.as_deref() else {
            return self.evaluate_expression(&reference.name, ctx);
        };
        let library = ctx.included_library(alias)?;
        let private = library
            .expression_def(&reference.name)
            .is_some_and(|def| def.access_level == AccessModifier::Private);
        if private {
            return Err(EvalError::unresolved(format!("{alias}.{}", reference.name)));
        }
        ctx.with_library(library, |ctx| self.evaluate_expression(&reference.name, ctx))
    }

    /// Call a user-defined function. Operands are evaluated in the caller's
    /// scope; the body runs in the defining library with only the operands
    /// in scope.
    pub(crate) fn eval_function_ref(
        &self,
        reference: &FunctionRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let library = Self::library_for(reference.library_name.as_deref(), ctx)?;
        let arguments = self.eval_operands(&reference.operand, ctx)?;
        let def = library
            .function_def(&reference.name, arguments.len())
            .ok_or_else(|| {
                EvalError::unresolved(format!("{}({} arguments)", reference.name, arguments.len()))
            })?;
        let body = match &def.expression {
            Some(body) if !def.external => body,
            _ => {
                return Err(EvalError::unsupported(
                    "FunctionRef",
                    format!("external function {}", reference.name),
                ));
            }
        };

        let mut scope = Scope::new();
        for (operand, argument) in def.operand.iter().zip(arguments) {
            scope.bind(operand.name.as_str(), argument);
        }
        ctx.with_library(Arc::clone(&library), |ctx| {
            ctx.with_scope(scope, |ctx| self.evaluate(body, ctx))
        })
    }

    /// A caller-bound value wins over the declared default
    pub(crate) fn eval_parameter_ref(
        &self,
        reference: &ParameterRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let library = Self::library_for(reference.library_name.as_deref(), ctx)?;
        ctx.with_library(library, |ctx| self.parameter_value(&reference.name, ctx))
    }

    fn parameter_value(&self, name: &str, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        if let Some(value) = ctx.bound_parameter(name) {
            return Ok(value.clone());
        }
        let library = Arc::clone(ctx.library());
        let def = library
            .parameter(name)
            .ok_or_else(|| EvalError::unresolved(name))?;
        match &def.default_expr {
            Some(default) => {
                debug!("parameter {}.{} takes its default", library.name(), name);
                self.evaluate(default, ctx)
            }
            None => Err(EvalError::UnboundParameter {
                name: name.to_string(),
            }),
        }
    }

    /// OperandRef, AliasRef and QueryLetRef
    pub(crate) fn eval_scoped_ref(&self, reference: &NameRef, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        self.resolve_scoped(&reference.name, ctx)?
            .ok_or_else(|| EvalError::unresolved(&reference.name))
    }

    pub(crate) fn eval_identifier_ref(
        &self,
        reference: &IdentifierRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let name = reference.name.as_str();
        if reference.library_name.is_none() {
            if let Some(value) = self.resolve_scoped(name, ctx)? {
                return Ok(value);
            }
            if let Some(ScopedName::Value(CqlValue::Tuple(this))) = ctx.lookup(THIS) {
                if let Some(value) = this.get(name) {
                    return Ok(value.clone());
                }
            }
        }

        let library = Self::library_for(reference.library_name.as_deref(), ctx)?;
        if library.expression_def(name).is_some() {
            return ctx.with_library(library, |ctx| self.evaluate_expression(name, ctx));
        }
        if library.parameter(name).is_some() {
            return ctx.with_library(library, |ctx| self.parameter_value(name, ctx));
        }
        Err(EvalError::unresolved(name))
    }

    /// Read `path` from the source, or from the alias named by `scope`, or
    /// from `$this`
    pub(crate) fn eval_property(&self, property: &Property, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = match (&property.source, &property.scope) {
            (Some(source), _) => self.evaluate(source, ctx)?,
            (None, Some(scope)) => self
                .resolve_scoped(scope, ctx)?
                .ok_or_else(|| EvalError::unresolved(scope))?,
            (None, None) => self
                .resolve_scoped(THIS, ctx)?
                .ok_or_else(|| EvalError::unresolved(&property.path))?,
        };
        Ok(self.read_property(&source, &property.path, ctx))
    }

    /// Navigate a dotted path. Lists are projected element-wise and any
    /// missing step yields Null.
    pub(crate) fn read_property(&self, value: &CqlValue, path: &str, ctx: &EvaluationContext) -> CqlValue {
        path.split('.')
            .fold(value.clone(), |current, segment| property_of(&current, segment, ctx))
    }

    /// Value bound to `name` in the scope stack, forcing a deferred let.
    ///
    /// A let is evaluated at most once per frame, seeing only the frames up
    /// to its own; reaching it again while it is being evaluated is a cycle.
    pub(crate) fn resolve_scoped(&self, name: &str, ctx: &mut EvaluationContext) -> EvalResult<Option<CqlValue>> {
        match ctx.lookup(name) {
            None => Ok(None),
            Some(ScopedName::Value(value)) => Ok(Some(value)),
            Some(ScopedName::Evaluating) => Err(EvalError::CircularReference {
                name: name.to_string(),
            }),
            Some(ScopedName::Deferred { frame, expression }) => {
                ctx.rebind(frame, name, Binding::Evaluating);
                let result = ctx.with_frames(frame, |ctx| self.evaluate(&expression, ctx));
                match result {
                    Ok(value) => {
                        ctx.rebind(frame, name, Binding::Value(value.clone()));
                        Ok(Some(value))
                    }
                    Err(error) => {
                        ctx.rebind(frame, name, Binding::Deferred(expression));
                        Err(error)
                    }
                }
            }
        }
    }
}

fn property_of(value: &CqlValue, name: &str, ctx: &EvaluationContext) -> CqlValue {
    match value {
        CqlValue::Null => CqlValue::Null,
        CqlValue::List(list) => CqlValue::List(CqlList::from_values(
            list.iter().map(|item| property_of(item, name, ctx)).collect(),
        )),
        _ => ctx
            .data_providers()
            .find_map(|provider| provider.property(value, name))
            .unwrap_or_else(|| component(value, name)),
    }
}

/// Named components of the structured system types
fn component(value: &CqlValue, name: &str) -> CqlValue {
    match (value, name) {
        (CqlValue::Tuple(tuple), _) => tuple.get(name).cloned().unwrap_or(CqlValue::Null),
        (CqlValue::Code(code), "code") => CqlValue::string(code.code.as_str()),
        (CqlValue::Code(code), "system") => code.system.clone().into(),
        (CqlValue::Code(code), "version") => code.version.clone().into(),
        (CqlValue::Code(code), "display") => code.display.clone().into(),
        (CqlValue::Concept(concept), "codes") => CqlValue::list(
            concept.codes.iter().cloned().map(CqlValue::Code).collect(),
        ),
        (CqlValue::Concept(concept), "display") => concept.display.clone().into(),
        (CqlValue::Quantity(quantity), "value") => CqlValue::Decimal(quantity.value),
        (CqlValue::Quantity(quantity), "unit") => CqlValue::string(quantity.unit.as_str()),
        (CqlValue::Ratio(ratio), "numerator") => CqlValue::Quantity(ratio.numerator.clone()),
        (CqlValue::Ratio(ratio), "denominator") => CqlValue::Quantity(ratio.denominator.clone()),
        (CqlValue::Interval(interval), "low") => interval.low_value(),
        (CqlValue::Interval(interval), "high") => interval.high_value(),
        (CqlValue::Interval(interval), "lowClosed") => CqlValue::Boolean(interval.low_closed),
        (CqlValue::Interval(interval), "highClosed") => CqlValue::Boolean(interval.high_closed),
        _ => CqlValue::Null,
    }
}
