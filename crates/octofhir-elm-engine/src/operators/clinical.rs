//! Clinical Operators
//!
//! Implements:
//! - CalculateAge, CalculateAgeAt
//! - InValueSet, InCodeSystem
//! - CodeSystemRef, ValueSetRef, CodeRef, ConceptRef
//! - Code and Concept selectors
//!
//! Code systems and value sets evaluate to a Tuple `{ id, version, name }`
//! so they can flow through expressions and reach the terminology provider.

use crate::context::EvaluationContext;
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use crate::operators::datetime::duration_between;
use crate::provider::{TerminologyProvider, VocabularyRef};
use octofhir_elm_model::expression::{
    BinaryExpression, CalculateAgeExpression, CodeSelector, ConceptSelector, DefinitionRef,
    MembershipExpression,
};
use octofhir_elm_types::{CqlCode, CqlConcept, CqlValue, TemporalUnit};

// ============================================================================
// Vocabularies
// ============================================================================

/// Tuple form of a code system or value set declaration
pub fn vocabulary_value(id: &str, version: Option<&str>, name: &str) -> CqlValue {
    CqlValue::tuple([
        ("id", CqlValue::string(id)),
        ("version", version.map(CqlValue::string).into()),
        ("name", CqlValue::string(name)),
    ])
}

/// Read a vocabulary from its Tuple form or a bare URI string
pub fn vocabulary_ref(value: &CqlValue) -> EvalResult<Option<VocabularyRef>> {
    match value {
        CqlValue::Null => Ok(None),
        CqlValue::String(id) => Ok(Some(VocabularyRef::new(id.as_str(), None))),
        CqlValue::Tuple(tuple) => {
            let id = tuple.get("id").and_then(CqlValue::as_str).ok_or_else(|| {
                EvalError::invalid_argument("vocabulary", "tuple has no 'id' element")
            })?;
            let version = tuple.get("version").and_then(CqlValue::as_str);
            Ok(Some(VocabularyRef::new(id, version)))
        }
        other => Err(EvalError::type_mismatch(
            "vocabulary",
            "CodeSystem or ValueSet",
            other.type_name(),
        )),
    }
}

/// Codes carried by a String, Code, Concept or a list of those
pub fn codes_of(value: &CqlValue) -> EvalResult<Vec<CqlCode>> {
    let mut codes = Vec::new();
    collect_codes(value, &mut codes)?;
    Ok(codes)
}

fn collect_codes(value: &CqlValue, codes: &mut Vec<CqlCode>) -> EvalResult<()> {
    match value {
        CqlValue::Null => {}
        CqlValue::String(code) => codes.push(CqlCode::new(code.as_str(), None)),
        CqlValue::Code(code) => codes.push(code.clone()),
        CqlValue::Concept(concept) => codes.extend(concept.codes.iter().cloned()),
        CqlValue::List(list) => {
            for element in list.iter() {
                collect_codes(element, codes)?;
            }
        }
        other => {
            return Err(EvalError::type_mismatch(
                "terminology membership",
                "String, Code or Concept",
                other.type_name(),
            ));
        }
    }
    Ok(())
}

/// A missing code is not a member of anything
pub fn in_code_system(
    code: &CqlValue,
    code_system: &CqlValue,
    terminology: Option<&dyn TerminologyProvider>,
) -> EvalResult<CqlValue> {
    let Some(system) = vocabulary_ref(code_system)? else {
        return Ok(CqlValue::Null);
    };
    let codes = codes_of(code)?;
    let member = match terminology {
        Some(provider) => {
            let mut found = false;
            for code in &codes {
                if provider.in_code_system(code, &system)? {
                    found = true;
                    break;
                }
            }
            found
        }
        None => codes
            .iter()
            .any(|code| code.system.as_deref() == Some(system.id.as_str())),
    };
    Ok(CqlValue::Boolean(member))
}

pub fn in_value_set(
    code: &CqlValue,
    value_set: &CqlValue,
    terminology: Option<&dyn TerminologyProvider>,
) -> EvalResult<CqlValue> {
    let Some(value_set) = vocabulary_ref(value_set)? else {
        return Ok(CqlValue::Null);
    };
    let codes = codes_of(code)?;
    if codes.is_empty() {
        return Ok(CqlValue::Boolean(false));
    }
    let provider = terminology.ok_or_else(|| {
        EvalError::unsupported("InValueSet", "value sets without a terminology provider")
    })?;
    for code in &codes {
        if provider.in_value_set(code, &value_set)? {
            return Ok(CqlValue::Boolean(true));
        }
    }
    Ok(CqlValue::Boolean(false))
}

// ============================================================================
// Age
// ============================================================================

/// Whole `unit`s between `birth_date` and `as_of`
pub fn calculate_age_at(
    birth_date: &CqlValue,
    as_of: &CqlValue,
    unit: TemporalUnit,
) -> EvalResult<CqlValue> {
    duration_between(birth_date, as_of, Some(unit))
}

// ============================================================================
// Engine Implementation
// ============================================================================

impl CqlEngine {
    pub fn eval_in_code_system(
        &self,
        expr: &MembershipExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let code = self.evaluate(&expr.code, ctx)?;
        let system = self.evaluate(&expr.vocabulary, ctx)?;
        in_code_system(&code, &system, ctx.terminology().map(|provider| provider.as_ref()))
    }

    pub fn eval_in_value_set(
        &self,
        expr: &MembershipExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let code = self.evaluate(&expr.code, ctx)?;
        let value_set = self.evaluate(&expr.vocabulary, ctx)?;
        in_value_set(&code, &value_set, ctx.terminology().map(|provider| provider.as_ref()))
    }

    /// Age as of the evaluation timestamp: today for a Date, now for a DateTime
    pub fn eval_calculate_age(
        &self,
        expr: &CalculateAgeExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let birth_date = self.evaluate(&expr.operand, ctx)?;
        let as_of = match birth_date {
            CqlValue::Null => return Ok(CqlValue::Null),
            CqlValue::Date(_) => CqlValue::Date(ctx.today()),
            _ => CqlValue::DateTime(ctx.now()),
        };
        calculate_age_at(&birth_date, &as_of, expr.precision)
    }

    pub fn eval_calculate_age_at(
        &self,
        expr: &BinaryExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let (birth_date, as_of) = self.eval_binary_operands(expr, ctx)?;
        calculate_age_at(&birth_date, &as_of, expr.precision.unwrap_or(TemporalUnit::Year))
    }

    // ------------------------------------------------------------------
    // Terminology declarations
    // ------------------------------------------------------------------

    pub fn eval_code_system_ref(
        &self,
        reference: &DefinitionRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let library = Self::library_for(reference.library_name.as_deref(), ctx)?;
        let def = library
            .code_system(&reference.name)
            .ok_or_else(|| EvalError::unresolved(&reference.name))?;
        Ok(vocabulary_value(&def.id, def.version.as_deref(), &def.name))
    }

    pub fn eval_value_set_ref(
        &self,
        reference: &DefinitionRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let library = Self::library_for(reference.library_name.as_deref(), ctx)?;
        let def = library
            .value_set(&reference.name)
            .ok_or_else(|| EvalError::unresolved(&reference.name))?;
        Ok(vocabulary_value(&def.id, def.version.as_deref(), &def.name))
    }

    pub fn eval_code_ref(
        &self,
        reference: &DefinitionRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        Ok(CqlValue::Code(self.resolve_code(reference, ctx)?))
    }

    pub fn eval_concept_ref(
        &self,
        reference: &DefinitionRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let library = Self::library_for(reference.library_name.as_deref(), ctx)?;
        let def = library
            .concept_def(&reference.name)
            .ok_or_else(|| EvalError::unresolved(&reference.name))?
            .clone();
        let codes = ctx.with_library(library, |ctx| {
            def.code
                .iter()
                .map(|code| self.resolve_code(code, ctx))
                .collect::<EvalResult<Vec<_>>>()
        })?;
        Ok(CqlValue::Concept(CqlConcept::new(codes, def.display)))
    }

    pub fn eval_code_selector(
        &self,
        expr: &CodeSelector,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        Ok(CqlValue::Code(self.select_code(expr, ctx)?))
    }

    pub fn eval_concept_selector(
        &self,
        expr: &ConceptSelector,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let codes = expr
            .codes
            .iter()
            .map(|code| self.select_code(code, ctx))
            .collect::<EvalResult<Vec<_>>>()?;
        Ok(CqlValue::Concept(CqlConcept::new(codes, expr.display.clone())))
    }

    fn select_code(&self, expr: &CodeSelector, ctx: &mut EvaluationContext) -> EvalResult<CqlCode> {
        let (system, version) = Self::code_system_of(&expr.system, ctx)?;
        let mut code = CqlCode::new(expr.code.as_str(), Some(system));
        code.version = version;
        code.display = expr.display.clone();
        Ok(code)
    }

    /// Code declared by a `code` definition, resolved in its own library
    fn resolve_code(&self, reference: &DefinitionRef, ctx: &mut EvaluationContext) -> EvalResult<CqlCode> {
        let library = Self::library_for(reference.library_name.as_deref(), ctx)?;
        let def = library
            .code_def(&reference.name)
            .ok_or_else(|| EvalError::unresolved(&reference.name))?
            .clone();
        let (system, version) =
            ctx.with_library(library, |ctx| Self::code_system_of(&def.code_system, ctx))?;
        let mut code = CqlCode::new(def.id, Some(system));
        code.version = version;
        code.display = def.display;
        Ok(code)
    }

    /// URI and version of a code system declaration
    fn code_system_of(
        reference: &DefinitionRef,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<(String, Option<String>)> {
        let library = Self::library_for(reference.library_name.as_deref(), ctx)?;
        let def = library
            .code_system(&reference.name)
            .ok_or_else(|| EvalError::unresolved(&reference.name))?;
        Ok((def.id.clone(), def.version.clone()))
    }
}
