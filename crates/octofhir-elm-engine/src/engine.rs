//! ELM Evaluation Engine
//!
//! [`CqlEngine`] walks an expression tree against an [`EvaluationContext`].
//! Dispatch is a single exhaustive match over [`Expression`]; the operator
//! families in [`crate::operators`] hold the per-kind rules.

use crate::context::{CacheState, EvaluationContext};
use crate::error::{EvalError, EvalResult};
use crate::operators::string::RegexCache;
use crate::operators::{
    aggregate, arithmetic, comparison, datetime, interval, list, logical, nullological, string,
    type_ops,
};
use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use octofhir_elm_model::expression::{
    BinaryExpression, InstanceSelector, IntervalSelector, ListSelector, Literal, MessageExpression,
    QuantityLiteral, RatioLiteral, TupleSelector, TypeSpecifier, UnaryExpression,
};
use octofhir_elm_model::library::AccessModifier;
use octofhir_elm_model::Expression;
use octofhir_elm_types::{
    CqlCode, CqlDate, CqlDateTime, CqlInterval, CqlList, CqlQuantity, CqlRatio, CqlTime, CqlType,
    CqlValue, DateTimePrecision, TemporalUnit, compare,
};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

/// The ELM evaluation engine
///
/// An engine holds no per-run state, so one instance can serve any number
/// of contexts, including from several threads.
#[derive(Debug, Default)]
pub struct CqlEngine {
    /// Compiled patterns for Matches, ReplaceMatches and SplitOnMatches
    pub(crate) regex_cache: RegexCache,
}

impl CqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every public definition of the active library, in
    /// declaration order
    pub fn evaluate_library(&self, ctx: &mut EvaluationContext) -> EvalResult<IndexMap<String, CqlValue>> {
        let library = Arc::clone(ctx.library());
        let mut results = IndexMap::new();
        for def in library.statements.iter() {
            if def.access_level == AccessModifier::Private {
                continue;
            }
            let value = self.evaluate_expression(&def.name, ctx)?;
            results.insert(def.name.clone(), value);
        }
        Ok(results)
    }

    /// Evaluate a named definition of the active library.
    ///
    /// Results are cached for the rest of the run. A definition reached
    /// again while it is still being evaluated is a circular reference.
    pub fn evaluate_expression(&self, name: &str, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let key = ctx.definition_key(name);
        match ctx.cache_state(&key) {
            Some(CacheState::Resolved(value)) => {
                debug!("definition cache hit for {}.{}", key.0, name);
                return Ok(value.clone());
            }
            Some(CacheState::InProgress) => {
                return Err(EvalError::CircularReference {
                    name: name.to_string(),
                });
            }
            None => {}
        }

        let library = Arc::clone(ctx.library());
        let def = library
            .expression_def(name)
            .ok_or_else(|| EvalError::unresolved(name))?;
        debug!("evaluating definition {}.{}", key.0, name);

        ctx.mark_in_progress(key.clone());
        let result = ctx.with_library(Arc::clone(&library), |ctx| self.evaluate(&def.expression, ctx));
        match result {
            Ok(value) => {
                ctx.complete(key, &value);
                Ok(value)
            }
            Err(error) => {
                ctx.abandon(&key);
                Err(error)
            }
        }
    }

    /// Main expression evaluation dispatcher
    pub fn evaluate(&self, expr: &Expression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        if !ctx.enter_recursion() {
            return Err(EvalError::RecursionLimit {
                limit: ctx.options().max_recursion_depth,
            });
        }
        let result = self.dispatch(expr, ctx);
        ctx.exit_recursion();

        result.map_err(|error| match expr.locator() {
            Some(locator) => error.at(locator),
            None => error,
        })
    }

    fn dispatch(&self, expr: &Expression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        match expr {
            // === Literals and selectors ===
            Expression::Null(_) => Ok(CqlValue::Null),
            Expression::Literal(lit) => self.eval_literal(lit, ctx),
            Expression::List(e) => self.eval_list_selector(e, ctx),
            Expression::Interval(e) => self.eval_interval_selector(e, ctx),
            Expression::Tuple(e) => self.eval_tuple_selector(e, ctx),
            Expression::Instance(e) => self.eval_instance_selector(e, ctx),
            Expression::Code(e) => self.eval_code_selector(e, ctx),
            Expression::Concept(e) => self.eval_concept_selector(e, ctx),
            Expression::Quantity(e) => Ok(CqlValue::Quantity(quantity_literal(e))),
            Expression::Ratio(e) => Ok(ratio_literal(e)),
            Expression::Date(e) => self.eval_date_selector(e, ctx),
            Expression::DateTime(e) => self.eval_datetime_selector(e, ctx),
            Expression::Time(e) => self.eval_time_selector(e, ctx),

            // === References ===
            Expression::ExpressionRef(r) => self.eval_expression_ref(r, ctx),
            Expression::FunctionRef(r) => self.eval_function_ref(r, ctx),
            Expression::ParameterRef(r) => self.eval_parameter_ref(r, ctx),
            Expression::OperandRef(r) | Expression::AliasRef(r) | Expression::QueryLetRef(r) => {
                self.eval_scoped_ref(r, ctx)
            }
            Expression::IdentifierRef(r) => self.eval_identifier_ref(r, ctx),
            Expression::Property(p) => self.eval_property(p, ctx),
            Expression::CodeSystemRef(r) => self.eval_code_system_ref(r, ctx),
            Expression::ValueSetRef(r) => self.eval_value_set_ref(r, ctx),
            Expression::CodeRef(r) => self.eval_code_ref(r, ctx),
            Expression::ConceptRef(r) => self.eval_concept_ref(r, ctx),

            // === Logical ===
            Expression::And(e) => self.eval_and(e, ctx),
            Expression::Or(e) => self.eval_or(e, ctx),
            Expression::Xor(e) => self.binary(e, ctx, logical::xor),
            Expression::Implies(e) => self.binary(e, ctx, logical::implies),
            Expression::Not(e) => self.unary(e, ctx, logical::not),

            // === Nullological ===
            Expression::IsNull(e) => self.unary(e, ctx, nullological::is_null),
            Expression::IsTrue(e) => self.unary(e, ctx, nullological::is_true),
            Expression::IsFalse(e) => self.unary(e, ctx, nullological::is_false),
            Expression::Coalesce(e) => self.eval_coalesce(e, ctx),
            Expression::If(e) => self.eval_if(e, ctx),
            Expression::Case(e) => self.eval_case(e, ctx),

            // === Comparison ===
            Expression::Equal(e) => self.binary(e, ctx, comparison::equal),
            Expression::Equivalent(e) => self.binary(e, ctx, comparison::equivalent),
            Expression::NotEqual(e) => self.binary(e, ctx, comparison::not_equal),
            Expression::Less(e) => self.binary(e, ctx, comparison::less),
            Expression::Greater(e) => self.binary(e, ctx, comparison::greater),
            Expression::LessOrEqual(e) => self.binary(e, ctx, comparison::less_or_equal),
            Expression::GreaterOrEqual(e) => self.binary(e, ctx, comparison::greater_or_equal),

            // === Arithmetic ===
            Expression::Add(e) => self.binary(e, ctx, arithmetic::add),
            Expression::Subtract(e) => self.binary(e, ctx, arithmetic::subtract),
            Expression::Multiply(e) => self.binary(e, ctx, arithmetic::multiply),
            Expression::Divide(e) => self.binary(e, ctx, arithmetic::divide),
            Expression::TruncatedDivide(e) => self.binary(e, ctx, arithmetic::truncated_divide),
            Expression::Modulo(e) => self.binary(e, ctx, arithmetic::modulo),
            Expression::Ceiling(e) => self.unary(e, ctx, arithmetic::ceiling),
            Expression::Floor(e) => self.unary(e, ctx, arithmetic::floor),
            Expression::Truncate(e) => self.unary(e, ctx, arithmetic::truncate),
            Expression::Abs(e) => self.unary(e, ctx, arithmetic::abs),
            Expression::Negate(e) => self.unary(e, ctx, arithmetic::negate),
            Expression::Round(e) => self.eval_round(e, ctx),
            Expression::Ln(e) => self.unary(e, ctx, arithmetic::ln),
            Expression::Exp(e) => self.unary(e, ctx, arithmetic::exp),
            Expression::Log(e) => self.binary(e, ctx, arithmetic::log),
            Expression::Power(e) => self.binary(e, ctx, arithmetic::power),
            Expression::Successor(e) => self.unary(e, ctx, arithmetic::successor),
            Expression::Predecessor(e) => self.unary(e, ctx, arithmetic::predecessor),
            Expression::MinValue(e) => arithmetic::min_value(&e.value_type),
            Expression::MaxValue(e) => arithmetic::max_value(&e.value_type),
            Expression::Precision(e) => self.unary(e, ctx, arithmetic::precision),
            Expression::LowBoundary(e) => self.eval_boundary(e, ctx, false),
            Expression::HighBoundary(e) => self.eval_boundary(e, ctx, true),

            // === String ===
            Expression::Concatenate(e) => self.eval_concatenate(e, ctx),
            Expression::Combine(e) => self.eval_combine(e, ctx),
            Expression::Split(e) => self.eval_split(e, ctx, false),
            Expression::SplitOnMatches(e) => self.eval_split(e, ctx, true),
            Expression::Length(e) => self.unary(e, ctx, string::length),
            Expression::Upper(e) => self.unary(e, ctx, string::upper),
            Expression::Lower(e) => self.unary(e, ctx, string::lower),
            Expression::Indexer(e) => self.binary(e, ctx, string::indexer),
            Expression::PositionOf(e) => self.eval_position_of(e, ctx, false),
            Expression::LastPositionOf(e) => self.eval_position_of(e, ctx, true),
            Expression::Substring(e) => self.eval_substring(e, ctx),
            Expression::StartsWith(e) => self.binary(e, ctx, string::starts_with),
            Expression::EndsWith(e) => self.binary(e, ctx, string::ends_with),
            Expression::Matches(e) => {
                let (value, pattern) = self.eval_binary_operands(e, ctx)?;
                string::matches(&self.regex_cache, &value, &pattern)
            }
            Expression::ReplaceMatches(e) => self.eval_replace_matches(e, ctx),

            // === Date and time ===
            Expression::Now(_) => Ok(CqlValue::DateTime(ctx.now())),
            Expression::Today(_) => Ok(CqlValue::Date(ctx.today())),
            Expression::TimeOfDay(_) => Ok(CqlValue::Time(ctx.time_of_day())),
            Expression::DateFrom(e) => self.unary(e, ctx, datetime::date_from),
            Expression::TimeFrom(e) => self.unary(e, ctx, datetime::time_from),
            Expression::TimezoneOffsetFrom(e) => self.unary(e, ctx, datetime::timezone_offset_from),
            Expression::DateTimeComponentFrom(e) => self.eval_component_from(e, ctx),
            Expression::DurationBetween(e) => self.eval_temporal_binary(e, ctx, datetime::duration_between),
            Expression::DifferenceBetween(e) => {
                self.eval_temporal_binary(e, ctx, datetime::difference_between)
            }
            Expression::SameAs(e) => self.binary_at(e, ctx, datetime::same_as),
            Expression::SameOrBefore(e) => self.binary_at(e, ctx, datetime::same_or_before),
            Expression::SameOrAfter(e) => self.binary_at(e, ctx, datetime::same_or_after),

            // === Interval ===
            Expression::Start(e) => self.unary(e, ctx, interval::start),
            Expression::End(e) => self.unary(e, ctx, interval::end),
            Expression::PointFrom(e) => self.unary(e, ctx, interval::point_from),
            Expression::Width(e) => self.unary(e, ctx, interval::width),
            Expression::Size(e) => self.unary(e, ctx, interval::size),
            Expression::Contains(e) => self.binary_at(e, ctx, interval::contains),
            Expression::In(e) => self.binary_at(e, ctx, interval::in_container),
            Expression::Includes(e) => self.binary_at(e, ctx, interval::includes),
            Expression::IncludedIn(e) => self.binary_at(e, ctx, interval::included_in),
            Expression::ProperContains(e) => self.binary_at(e, ctx, interval::proper_contains),
            Expression::ProperIn(e) => self.binary_at(e, ctx, interval::proper_in),
            Expression::ProperIncludes(e) => self.binary_at(e, ctx, interval::proper_includes),
            Expression::ProperIncludedIn(e) => self.binary_at(e, ctx, interval::proper_included_in),
            Expression::Before(e) => self.binary_at(e, ctx, interval::before),
            Expression::After(e) => self.binary_at(e, ctx, interval::after),
            Expression::Meets(e) => self.binary_at(e, ctx, interval::meets),
            Expression::MeetsBefore(e) => self.binary_at(e, ctx, interval::meets_before),
            Expression::MeetsAfter(e) => self.binary_at(e, ctx, interval::meets_after),
            Expression::Overlaps(e) => self.binary_at(e, ctx, interval::overlaps),
            Expression::OverlapsBefore(e) => self.binary_at(e, ctx, interval::overlaps_before),
            Expression::OverlapsAfter(e) => self.binary_at(e, ctx, interval::overlaps_after),
            Expression::Starts(e) => self.binary_at(e, ctx, interval::starts),
            Expression::Ends(e) => self.binary_at(e, ctx, interval::ends),
            Expression::Collapse(e) => {
                let source = self.evaluate(e.left(), ctx)?;
                interval::collapse(&source)
            }
            Expression::Expand(e) => self.binary(e, ctx, interval::expand),
            Expression::Union(e) => self.binary(e, ctx, interval::union),
            Expression::Intersect(e) => self.binary(e, ctx, interval::intersect),
            Expression::Except(e) => self.binary(e, ctx, interval::except),

            // === List ===
            Expression::Exists(e) => self.unary(e, ctx, list::exists),
            Expression::Times(e) => self.binary(e, ctx, list::times),
            Expression::Filter(e) => self.eval_filter(e, ctx),
            Expression::First(e) => self.eval_first_last(e, ctx, false),
            Expression::Last(e) => self.eval_first_last(e, ctx, true),
            Expression::Slice(e) => self.eval_slice(e, ctx),
            Expression::IndexOf(e) => self.eval_index_of(e, ctx),
            Expression::Flatten(e) => self.unary(e, ctx, list::flatten),
            Expression::Sort(e) => self.eval_sort(e, ctx),
            Expression::ForEach(e) => self.eval_for_each(e, ctx),
            Expression::Repeat(e) => self.eval_repeat(e, ctx),
            Expression::Distinct(e) => self.unary(e, ctx, list::distinct),
            Expression::Current(e) => self.eval_current(e, ctx),
            Expression::Iteration(e) => self.eval_iteration(e, ctx),
            Expression::Total(e) => self.eval_total(e, ctx),
            Expression::SingletonFrom(e) => self.unary(e, ctx, list::singleton_from),

            // === Aggregate ===
            Expression::Aggregate(e) => self.eval_aggregate_fold(e, ctx),
            Expression::Count(e) => self.eval_aggregate(e, ctx, aggregate::count),
            Expression::Sum(e) => self.eval_aggregate(e, ctx, aggregate::sum),
            Expression::Product(e) => self.eval_aggregate(e, ctx, aggregate::product),
            Expression::Min(e) => self.eval_aggregate(e, ctx, aggregate::min),
            Expression::Max(e) => self.eval_aggregate(e, ctx, aggregate::max),
            Expression::Avg(e) => self.eval_aggregate(e, ctx, aggregate::avg),
            Expression::GeometricMean(e) => self.eval_aggregate(e, ctx, aggregate::geometric_mean),
            Expression::Median(e) => self.eval_aggregate(e, ctx, aggregate::median),
            Expression::Mode(e) => self.eval_aggregate(e, ctx, aggregate::mode),
            Expression::Variance(e) => self.eval_aggregate(e, ctx, aggregate::variance),
            Expression::StdDev(e) => self.eval_aggregate(e, ctx, aggregate::std_dev),
            Expression::PopulationVariance(e) => {
                self.eval_aggregate(e, ctx, aggregate::population_variance)
            }
            Expression::PopulationStdDev(e) => {
                self.eval_aggregate(e, ctx, aggregate::population_std_dev)
            }
            Expression::AllTrue(e) => self.eval_aggregate(e, ctx, aggregate::all_true),
            Expression::AnyTrue(e) => self.eval_aggregate(e, ctx, aggregate::any_true),

            // === Type operators ===
            Expression::As(e) => self.eval_as(e, ctx),
            Expression::Convert(e) => self.eval_convert(e, ctx),
            Expression::Is(e) => self.eval_is(e, ctx),
            Expression::CanConvert(e) => self.eval_can_convert(e, ctx),
            Expression::ToBoolean(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_boolean(v)),
            Expression::ToChars(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_chars(v)),
            Expression::ToConcept(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_concept(v)),
            Expression::ToDate(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_date(v)),
            Expression::ToDateTime(e) => self.eval_conversion(e, ctx, type_ops::to_datetime),
            Expression::ToDecimal(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_decimal(v)),
            Expression::ToInteger(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_integer(v)),
            Expression::ToLong(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_long(v)),
            Expression::ToList(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_list(v)),
            Expression::ToQuantity(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_quantity(v)),
            Expression::ToRatio(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_ratio(v)),
            Expression::ToString(e) => self.eval_conversion(e, ctx, |v, _| type_ops::to_string(v)),
            Expression::ToTime(e) => self.eval_conversion(e, ctx, type_ops::to_time),
            Expression::ConvertsToBoolean(e) => {
                self.eval_converts_to(e, ctx, |v, _| type_ops::to_boolean(v))
            }
            Expression::ConvertsToDate(e) => self.eval_converts_to(e, ctx, |v, _| type_ops::to_date(v)),
            Expression::ConvertsToDateTime(e) => self.eval_converts_to(e, ctx, type_ops::to_datetime),
            Expression::ConvertsToDecimal(e) => {
                self.eval_converts_to(e, ctx, |v, _| type_ops::to_decimal(v))
            }
            Expression::ConvertsToInteger(e) => {
                self.eval_converts_to(e, ctx, |v, _| type_ops::to_integer(v))
            }
            Expression::ConvertsToLong(e) => self.eval_converts_to(e, ctx, |v, _| type_ops::to_long(v)),
            Expression::ConvertsToQuantity(e) => {
                self.eval_converts_to(e, ctx, |v, _| type_ops::to_quantity(v))
            }
            Expression::ConvertsToRatio(e) => self.eval_converts_to(e, ctx, |v, _| type_ops::to_ratio(v)),
            Expression::ConvertsToString(e) => {
                self.eval_converts_to(e, ctx, |v, _| type_ops::to_string(v))
            }
            Expression::ConvertsToTime(e) => self.eval_converts_to(e, ctx, type_ops::to_time),

            // === Clinical ===
            Expression::InCodeSystem(e) => self.eval_in_code_system(e, ctx),
            Expression::InValueSet(e) => self.eval_in_value_set(e, ctx),
            Expression::CalculateAge(e) => self.eval_calculate_age(e, ctx),
            Expression::CalculateAgeAt(e) => self.eval_calculate_age_at(e, ctx),

            // === Queries and data access ===
            Expression::Query(q) => self.eval_query(q, ctx),
            Expression::Retrieve(r) => self.eval_retrieve(r, ctx),

            // === Diagnostics ===
            Expression::Message(e) => self.eval_message(e, ctx),
        }
    }

    // =========================================================================
    // Operand helpers
    // =========================================================================

    /// Evaluate an optional operand; an absent one is Null
    pub(crate) fn eval_optional(
        &self,
        expr: Option<&Expression>,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        match expr {
            Some(expr) => self.evaluate(expr, ctx),
            None => Ok(CqlValue::Null),
        }
    }

    pub(crate) fn eval_operands(
        &self,
        operands: &[Expression],
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Vec<CqlValue>> {
        operands.iter().map(|operand| self.evaluate(operand, ctx)).collect()
    }

    pub(crate) fn eval_binary_operands(
        &self,
        expr: &BinaryExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<(CqlValue, CqlValue)> {
        let left = self.evaluate(expr.left(), ctx)?;
        let right = self.evaluate(expr.right(), ctx)?;
        Ok((left, right))
    }

    fn unary(
        &self,
        expr: &UnaryExpression,
        ctx: &mut EvaluationContext,
        op: fn(&CqlValue) -> EvalResult<CqlValue>,
    ) -> EvalResult<CqlValue> {
        let operand = self.evaluate(&expr.operand, ctx)?;
        op(&operand)
    }

    fn binary(
        &self,
        expr: &BinaryExpression,
        ctx: &mut EvaluationContext,
        op: fn(&CqlValue, &CqlValue) -> EvalResult<CqlValue>,
    ) -> EvalResult<CqlValue> {
        let (left, right) = self.eval_binary_operands(expr, ctx)?;
        op(&left, &right)
    }

    /// Binary operator honouring the node's precision attribute
    fn binary_at(
        &self,
        expr: &BinaryExpression,
        ctx: &mut EvaluationContext,
        op: fn(&CqlValue, &CqlValue, Option<DateTimePrecision>) -> EvalResult<CqlValue>,
    ) -> EvalResult<CqlValue> {
        let (left, right) = self.eval_binary_operands(expr, ctx)?;
        op(&left, &right, expr.precision.map(TemporalUnit::precision))
    }

    // =========================================================================
    // Literals and selectors
    // =========================================================================

    fn eval_literal(&self, lit: &Literal, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let Some(text) = lit.value.as_deref() else {
            return Ok(CqlValue::Null);
        };
        let value_type = CqlType::from_name(&lit.value_type);
        let format = || EvalError::format(value_type.name(), text);

        let value = match &value_type {
            CqlType::Boolean => match text {
                "true" => CqlValue::Boolean(true),
                "false" => CqlValue::Boolean(false),
                _ => return Err(format()),
            },
            CqlType::Integer => CqlValue::Integer(text.parse().map_err(|_| format())?),
            CqlType::Long => {
                let digits = text.strip_suffix('L').unwrap_or(text);
                CqlValue::Long(digits.parse().map_err(|_| format())?)
            }
            CqlType::Decimal => CqlValue::Decimal(Decimal::from_str(text).map_err(|_| format())?),
            CqlType::String => CqlValue::String(text.to_string()),
            CqlType::Date => CqlValue::Date(CqlDate::parse(text)?),
            CqlType::DateTime => CqlValue::DateTime(
                CqlDateTime::parse(text)?.or_inferred_offset(ctx.timezone_offset())?,
            ),
            CqlType::Time => CqlValue::Time(CqlTime::parse(text)?),
            other => {
                return Err(EvalError::unsupported("Literal", other.name()));
            }
        };
        Ok(value)
    }

    fn eval_list_selector(&self, expr: &ListSelector, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let elements = self.eval_operands(&expr.elements, ctx)?;
        let list = match &expr.type_specifier {
            Some(TypeSpecifier::List { element_type }) => {
                CqlList::new(element_type.to_cql_type(), elements)
            }
            _ => CqlList::from_values(elements),
        };
        Ok(CqlValue::List(list))
    }

    /// Bounds must be ordered when both are known
    fn eval_interval_selector(
        &self,
        expr: &IntervalSelector,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let low = self.eval_optional(expr.low.as_deref(), ctx)?;
        let high = self.eval_optional(expr.high.as_deref(), ctx)?;
        if compare(&low, &high)? == Some(Ordering::Greater) {
            return Err(EvalError::invalid_argument(
                "Interval",
                format!("low bound {low} is greater than high bound {high}"),
            ));
        }
        Ok(CqlValue::Interval(CqlInterval::new(
            low,
            expr.low_closed,
            high,
            expr.high_closed,
        )))
    }

    fn eval_tuple_selector(&self, expr: &TupleSelector, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let mut elements = Vec::with_capacity(expr.elements.len());
        for element in &expr.elements {
            elements.push((element.name.as_str(), self.evaluate(&element.value, ctx)?));
        }
        Ok(CqlValue::tuple(elements))
    }

    /// System structured types become their own value kinds; model types
    /// become Tuples tagged with their type name
    fn eval_instance_selector(
        &self,
        expr: &InstanceSelector,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let mut fields = IndexMap::with_capacity(expr.elements.len());
        for element in &expr.elements {
            fields.insert(element.name.as_str(), self.evaluate(&element.value, ctx)?);
        }
        let text = |name: &str| fields.get(name).and_then(CqlValue::as_str).map(str::to_string);

        match CqlType::from_name(&expr.class_type) {
            CqlType::Code => {
                let code = text("code").ok_or_else(|| {
                    EvalError::invalid_argument("Instance", "Code requires a 'code' element")
                })?;
                Ok(CqlValue::Code(CqlCode {
                    code,
                    system: text("system"),
                    version: text("version"),
                    display: text("display"),
                }))
            }
            CqlType::Quantity => {
                let Some(value) = fields.get("value").and_then(CqlValue::as_decimal) else {
                    return Ok(CqlValue::Null);
                };
                let unit = text("unit").unwrap_or_else(|| CqlQuantity::DEFAULT_UNIT.to_string());
                Ok(CqlValue::Quantity(CqlQuantity::new(value, unit)))
            }
            CqlType::Named { name, .. } => {
                let mut tuple = vec![("resourceType".to_string(), CqlValue::String(name))];
                tuple.extend(
                    fields
                        .into_iter()
                        .filter(|(field, _)| *field != "resourceType")
                        .map(|(field, value)| (field.to_string(), value)),
                );
                Ok(CqlValue::tuple(tuple))
            }
            _ => Ok(CqlValue::tuple(fields)),
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Log a message when the condition holds and pass the source through.
    ///
    /// Severity `Error` aborts the evaluation instead.
    fn eval_message(&self, expr: &MessageExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let condition = self.eval_optional(expr.condition.as_deref(), ctx)?;
        if expr.condition.is_some() && !condition.is_true() {
            return Ok(source);
        }

        let code = self.eval_optional(expr.code.as_deref(), ctx)?;
        let severity = self.eval_optional(expr.severity.as_deref(), ctx)?;
        let message = self.eval_optional(expr.message.as_deref(), ctx)?;
        let code = if code.is_null() { String::new() } else { code.to_string() };
        let message = if message.is_null() { String::new() } else { message.to_string() };

        match severity.as_str().map(str::to_ascii_lowercase).as_deref() {
            Some("error") => return Err(EvalError::Message { code, message }),
            Some("warning") => warn!("{code}: {message}"),
            Some("trace") => trace!("{code}: {message} ({source})"),
            _ => info!("{code}: {message}"),
        }
        Ok(source)
    }
}

fn quantity_literal(lit: &QuantityLiteral) -> CqlQuantity {
    CqlQuantity::new(
        lit.value,
        lit.unit.as_deref().unwrap_or(CqlQuantity::DEFAULT_UNIT),
    )
}

fn ratio_literal(lit: &RatioLiteral) -> CqlValue {
    CqlValue::Ratio(CqlRatio::new(
        quantity_literal(&lit.numerator),
        quantity_literal(&lit.denominator),
    ))
}
