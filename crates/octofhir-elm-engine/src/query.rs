//! Query Evaluation
//!
//! A query runs over the cartesian product of its sources. Each row gets
//! its own scope holding the source aliases and the let clauses, so every
//! clause of that row sees the same bindings and nothing leaks past the row.
//!
//! Per row: with/without, then where, then return (or the aggregate step).
//! Over the results: distinct, then sort.

use crate::context::{EvaluationContext, Scope};
use crate::engine::CqlEngine;
use crate::error::EvalResult;
use crate::operators::list;
use octofhir_elm_model::expression::{AggregateClause, LetClause, Query, RelationshipKind};
use octofhir_elm_model::Expression;
use octofhir_elm_types::compare::position_equivalent;
use octofhir_elm_types::{CqlList, CqlValue};
use std::sync::Arc;

/// Alias bindings of one combination of source elements
type Row = Vec<(String, CqlValue)>;

struct Sources {
    rows: Vec<Row>,
    /// Every source was a single value rather than a list
    singular: bool,
}

impl CqlEngine {
    pub(crate) fn eval_query(&self, query: &Query, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let Some(sources) = self.query_sources(query, ctx)? else {
            return Ok(CqlValue::Null);
        };
        let lets = deferred_lets(&query.let_clause);

        if let Some(aggregate) = &query.aggregate {
            return self.aggregate_rows(query, aggregate, sources.rows, &lets, ctx);
        }

        let mut results = Vec::with_capacity(sources.rows.len());
        for row in &sources.rows {
            let produced = ctx.with_scope(row_scope(row, &lets), |ctx| -> EvalResult<Option<CqlValue>> {
                if !self.row_passes(query, ctx)? {
                    return Ok(None);
                }
                match &query.return_clause {
                    Some(clause) => self.evaluate(&clause.expression, ctx).map(Some),
                    None => Ok(Some(row_value(row))),
                }
            })?;
            results.extend(produced);
        }

        if sources.singular {
            return Ok(results.into_iter().next().unwrap_or(CqlValue::Null));
        }

        let mut results = CqlValue::List(CqlList::from_values(results));
        if query.return_clause.as_ref().is_some_and(|clause| clause.distinct) {
            results = list::distinct(&results)?;
        }
        if let Some(sort) = &query.sort {
            if let CqlValue::List(list) = results {
                let sorted = self.sort_rows(list.elements, &sort.by, ctx)?;
                results = CqlValue::List(CqlList::new(list.element_type, sorted));
            }
        }
        Ok(results)
    }

    /// Cartesian product of the sources; `None` when a source is Null
    fn query_sources(&self, query: &Query, ctx: &mut EvaluationContext) -> EvalResult<Option<Sources>> {
        let mut rows: Vec<Row> = vec![Vec::new()];
        let mut singular = true;
        for source in &query.source {
            let items = match self.evaluate(&source.expression, ctx)? {
                CqlValue::Null => return Ok(None),
                CqlValue::List(list) => {
                    singular = false;
                    list.elements
                }
                single => vec![single],
            };
            rows = rows
                .into_iter()
                .flat_map(|row| {
                    items.iter().map(move |item| {
                        let mut combined = row.clone();
                        combined.push((source.alias.clone(), item.clone()));
                        combined
                    })
                })
                .collect();
        }
        Ok(Some(Sources { rows, singular }))
    }

    /// with/without and where, evaluated inside the row's scope
    fn row_passes(&self, query: &Query, ctx: &mut EvaluationContext) -> EvalResult<bool> {
        for relationship in &query.relationship {
            let related = match self.evaluate(&relationship.expression, ctx)? {
                CqlValue::List(list) => list.elements,
                CqlValue::Null => Vec::new(),
                single => vec![single],
            };
            let mut found = false;
            for item in related {
                let scope = Scope::new().with_value(relationship.alias.as_str(), item);
                if ctx
                    .with_scope(scope, |ctx| self.evaluate(&relationship.such_that, ctx))?
                    .is_true()
                {
                    found = true;
                    break;
                }
            }
            let keep = match relationship.kind {
                RelationshipKind::With => found,
                RelationshipKind::Without => !found,
            };
            if !keep {
                return Ok(false);
            }
        }

        match &query.where_clause {
            Some(condition) => Ok(self.evaluate(condition, ctx)?.is_true()),
            None => Ok(true),
        }
    }

    /// Fold the passing rows with the running value bound to the clause's
    /// identifier; the result is the final value, not a list. With
    /// `distinct`, only rows that passed are remembered.
    fn aggregate_rows(
        &self,
        query: &Query,
        clause: &AggregateClause,
        rows: Vec<Row>,
        lets: &[(String, Arc<Expression>)],
        ctx: &mut EvaluationContext,
    ) -> EvalResult<CqlValue> {
        let mut total = self.eval_optional(clause.starting.as_deref(), ctx)?;
        let mut seen: Vec<CqlValue> = Vec::new();
        for row in rows {
            let mut scope = row_scope(&row, lets);
            scope.bind(clause.identifier.as_str(), total.clone());
            let step = ctx.with_scope(scope, |ctx| -> EvalResult<Option<CqlValue>> {
                if !self.row_passes(query, ctx)? {
                    return Ok(None);
                }
                if clause.distinct {
                    let value = row_value(&row);
                    if position_equivalent(seen.iter(), &value).is_some() {
                        return Ok(None);
                    }
                    seen.push(value);
                }
                self.evaluate(&clause.expression, ctx).map(Some)
            })?;
            if let Some(next) = step {
                total = next;
            }
        }
        Ok(total)
    }
}

fn deferred_lets(clauses: &[LetClause]) -> Vec<(String, Arc<Expression>)> {
    clauses
        .iter()
        .map(|clause| (clause.identifier.clone(), Arc::new((*clause.expression).clone())))
        .collect()
}

fn row_scope(row: &Row, lets: &[(String, Arc<Expression>)]) -> Scope {
    let mut scope = Scope::new();
    for (alias, value) in row {
        scope.bind(alias.as_str(), value.clone());
    }
    for (name, expression) in lets {
        scope.defer(name.as_str(), Arc::clone(expression));
    }
    scope
}

/// Implicit return: the element for one source, a Tuple of aliases for several
fn row_value(row: &Row) -> CqlValue {
    match row.as_slice() {
        [(_, value)] => value.clone(),
        _ => CqlValue::tuple(row.iter().map(|(alias, value)| (alias.as_str(), value.clone()))),
    }
}
