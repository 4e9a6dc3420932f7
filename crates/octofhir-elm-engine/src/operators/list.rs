//! List Operators
//!
//! Implements: Exists, Times, Filter, First, Last, Slice, IndexOf, Flatten,
//! Sort, ForEach, Repeat, Distinct, Current, Iteration, Total,
//! SingletonFrom, and the list forms of Contains, In, Includes, Union,
//! Intersect and Except
//!
//! Membership and set operations use equivalence, so a Null element matches
//! a Null element. IndexOf uses equality.

use crate::context::{EvaluationContext, INDEX, Scope, THIS, TOTAL};
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use octofhir_elm_model::expression::{
    FilterExpression, FirstLastExpression, IndexOfExpression, IterationExpression,
    ScopeExpression, SliceExpression, SortByItem, SortDirection, SortExpression,
};
use octofhir_elm_types::compare::position_equivalent;
use octofhir_elm_types::{CqlList, CqlTuple, CqlType, CqlValue, compare, equal, equivalent};
use std::cmp::Ordering;

fn list_operand<'a>(value: &'a CqlValue, operation: &str) -> EvalResult<Option<&'a CqlList>> {
    match value {
        CqlValue::Null => Ok(None),
        CqlValue::List(list) => Ok(Some(list)),
        other => Err(EvalError::type_mismatch(operation, "List", other.type_name())),
    }
}

fn same_type(list: &CqlList, elements: Vec<CqlValue>) -> CqlValue {
    CqlValue::List(CqlList::new(list.element_type.clone(), elements))
}

fn has(list: &CqlList, element: &CqlValue) -> bool {
    position_equivalent(list.iter(), element).is_some()
}

/// Elements in first-seen order with equivalent repeats removed
fn dedup<'a>(items: impl IntoIterator<Item = &'a CqlValue>) -> Vec<CqlValue> {
    let mut seen: Vec<CqlValue> = Vec::new();
    for item in items {
        if position_equivalent(seen.iter(), item).is_none() {
            seen.push(item.clone());
        }
    }
    seen
}

// ============================================================================
// Membership
// ============================================================================

/// List membership by equivalence; a Null element gives Null
pub fn list_contains(list: &CqlList, element: &CqlValue) -> CqlValue {
    if element.is_null() {
        return CqlValue::Null;
    }
    CqlValue::Boolean(has(list, element))
}

/// Contains `element` and at least one element that is not equivalent to it
pub fn list_properly_contains(list: &CqlList, element: &CqlValue) -> CqlValue {
    if element.is_null() {
        return CqlValue::Null;
    }
    let found = has(list, element);
    let other = list.iter().any(|item| !equivalent(item, element));
    CqlValue::Boolean(found && other)
}

pub fn list_includes(list: &CqlList, subset: &CqlList) -> CqlValue {
    CqlValue::Boolean(subset.iter().all(|item| has(list, item)))
}

pub fn list_properly_includes(list: &CqlList, subset: &CqlList) -> CqlValue {
    let includes = subset.iter().all(|item| has(list, item));
    let larger = list.iter().any(|item| !has(subset, item));
    CqlValue::Boolean(includes && larger)
}

// ============================================================================
// Set operations
// ============================================================================

pub fn union_lists(a: &CqlList, b: &CqlList) -> CqlValue {
    same_type(a, dedup(a.iter().chain(b.iter())))
}

/// Left elements that are members of `b`, in left order
pub fn intersect_lists(a: &CqlList, b: &CqlList) -> CqlValue {
    same_type(a, a.iter().filter(|item| has(b, item)).cloned().collect())
}

pub fn except_lists(a: &CqlList, b: &CqlList) -> CqlValue {
    same_type(a, a.iter().filter(|item| !has(b, item)).cloned().collect())
}

// ============================================================================
// Value-level operators
// ============================================================================

/// True when the list has a non-null element; a Null list is empty
pub fn exists(operand: &CqlValue) -> EvalResult<CqlValue> {
    let list = list_operand(operand, "Exists")?;
    Ok(CqlValue::Boolean(
        list.is_some_and(|l| l.iter().any(|v| !v.is_null())),
    ))
}

/// Cartesian product of two lists of tuples, each pair merged into one tuple
pub fn times(left: &CqlValue, right: &CqlValue) -> EvalResult<CqlValue> {
    let (Some(a), Some(b)) = (list_operand(left, "Times")?, list_operand(right, "Times")?) else {
        return Ok(CqlValue::Null);
    };
    let tuple = |v: &CqlValue| -> EvalResult<CqlTuple> {
        match v {
            CqlValue::Tuple(t) => Ok(t.clone()),
            other => Err(EvalError::type_mismatch("Times", "Tuple", other.type_name())),
        }
    };

    let mut rows = Vec::with_capacity(a.len() * b.len());
    for x in a.iter() {
        for y in b.iter() {
            let mut merged = tuple(x)?;
            for (name, value) in tuple(y)?.iter() {
                merged.set(name.clone(), value.clone());
            }
            rows.push(CqlValue::Tuple(merged));
        }
    }
    Ok(CqlValue::List(CqlList::from_values(rows)))
}

/// Elements from `start` (inclusive) to `end` (exclusive); Null bounds mean
/// the start or end of the list
pub fn slice(source: &CqlValue, start: &CqlValue, end: &CqlValue) -> EvalResult<CqlValue> {
    let Some(list) = list_operand(source, "Slice")? else {
        return Ok(CqlValue::Null);
    };
    let bound = |v: &CqlValue, default: usize| -> EvalResult<usize> {
        match v {
            CqlValue::Null => Ok(default),
            CqlValue::Integer(i) => Ok(usize::try_from(*i).unwrap_or(0).min(list.len())),
            other => Err(EvalError::type_mismatch("Slice", "Integer", other.type_name())),
        }
    };
    let from = bound(start, 0)?;
    let to = bound(end, list.len())?;
    let elements = if from < to { list.elements[from..to].to_vec() } else { Vec::new() };
    Ok(same_type(list, elements))
}

/// Position of the first element equal to `target`, or -1
pub fn index_of(source: &CqlValue, target: &CqlValue) -> EvalResult<CqlValue> {
    let Some(list) = list_operand(source, "IndexOf")? else {
        return Ok(CqlValue::Null);
    };
    if target.is_null() {
        return Ok(CqlValue::Null);
    }
    let mut unknown = false;
    for (i, item) in list.iter().enumerate() {
        match equal(item, target) {
            Some(true) => return Ok(CqlValue::Integer(i32::try_from(i).unwrap_or(i32::MAX))),
            None => unknown = true,
            Some(false) => {}
        }
    }
    Ok(if unknown { CqlValue::Null } else { CqlValue::Integer(-1) })
}

/// One level of nesting removed; non-list elements are kept as they are
pub fn flatten(operand: &CqlValue) -> EvalResult<CqlValue> {
    let Some(list) = list_operand(operand, "Flatten")? else {
        return Ok(CqlValue::Null);
    };
    let mut elements = Vec::new();
    for item in list.iter() {
        match item {
            CqlValue::List(inner) => elements.extend(inner.iter().cloned()),
            other => elements.push(other.clone()),
        }
    }
    let element_type = list.element_type.inner().cloned().unwrap_or(CqlType::Any);
    Ok(CqlValue::List(CqlList::new(element_type, elements)))
}

pub fn distinct(operand: &CqlValue) -> EvalResult<CqlValue> {
    let Some(list) = list_operand(operand, "Distinct")? else {
        return Ok(CqlValue::Null);
    };
    Ok(same_type(list, dedup(list.iter())))
}

/// The only element of a list; more than one is an error
pub fn singleton_from(operand: &CqlValue) -> EvalResult<CqlValue> {
    let Some(list) = list_operand(operand, "SingletonFrom")? else {
        return Ok(CqlValue::Null);
    };
    match list.elements.as_slice() {
        [] => Ok(CqlValue::Null),
        [only] => Ok(only.clone()),
        many => Err(EvalError::invalid_argument(
            "SingletonFrom",
            format!("list has {} elements", many.len()),
        )),
    }
}

pub fn first(operand: &CqlValue) -> EvalResult<CqlValue> {
    let list = list_operand(operand, "First")?;
    Ok(list.and_then(|l| l.elements.first().cloned()).unwrap_or(CqlValue::Null))
}

pub fn last(operand: &CqlValue) -> EvalResult<CqlValue> {
    let list = list_operand(operand, "Last")?;
    Ok(list.and_then(|l| l.elements.last().cloned()).unwrap_or(CqlValue::Null))
}

// ============================================================================
// Sorting
// ============================================================================

/// Ascending order with Null before every value
pub(crate) fn nulls_first(a: &CqlValue, b: &CqlValue) -> EvalResult<Ordering> {
    Ok(match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare(a, b)?.unwrap_or(Ordering::Equal),
    })
}

/// Stable sort of rows by precomputed keys, one key per direction
pub(crate) fn sort_by_keys(
    mut keyed: Vec<(Vec<CqlValue>, CqlValue)>,
    directions: &[SortDirection],
) -> EvalResult<Vec<CqlValue>> {
    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), direction) in a.iter().zip(b).zip(directions) {
            let ordering = match nulls_first(x, y) {
                Ok(ordering) => ordering,
                Err(e) => {
                    failure.get_or_insert(e);
                    Ordering::Equal
                }
            };
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        Ordering::Equal
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(keyed.into_iter().map(|(_, row)| row).collect()),
    }
}

fn direction(item: &SortByItem) -> SortDirection {
    match item {
        SortByItem::ByDirection { direction }
        | SortByItem::ByColumn { direction, .. }
        | SortByItem::ByExpression { direction, .. } => *direction,
    }
}

/// Scope for one element of an iterating operator
fn iteration_scope(alias: Option<&str>, item: &CqlValue, index: usize) -> Scope {
    let mut scope = Scope::new()
        .with_value(THIS, item.clone())
        .with_value(INDEX, CqlValue::Integer(i32::try_from(index).unwrap_or(i32::MAX)));
    if let Some(alias) = alias {
        scope.bind(alias, item.clone());
    }
    scope
}

impl CqlEngine {
    /// Order `rows` by the sort items; later items break ties
    pub(crate) fn sort_rows(
        &self,
        rows: Vec<CqlValue>,
        by: &[SortByItem],
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Vec<CqlValue>> {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut keys = Vec::with_capacity(by.len());
            for item in by {
                let key = match item {
                    SortByItem::ByDirection { .. } => row.clone(),
                    SortByItem::ByColumn { path, .. } => self.read_property(&row, path, ctx),
                    SortByItem::ByExpression { expression, .. } => {
                        let scope = Scope::new().with_value(THIS, row.clone());
                        ctx.with_scope(scope, |ctx| self.evaluate(expression, ctx))?
                    }
                };
                keys.push(key);
            }
            keyed.push((keys, row));
        }
        let directions: Vec<SortDirection> = by.iter().map(direction).collect();
        sort_by_keys(keyed, &directions)
    }

    pub fn eval_sort(&self, expr: &SortExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let Some(list) = list_operand(&source, "Sort")? else {
            return Ok(CqlValue::Null);
        };
        let sorted = self.sort_rows(list.elements.clone(), &expr.by, ctx)?;
        Ok(same_type(list, sorted))
    }

    /// Elements for which the condition is true; Null conditions drop the element
    pub fn eval_filter(&self, expr: &FilterExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let Some(list) = list_operand(&source, "Filter")? else {
            return Ok(CqlValue::Null);
        };
        let mut kept = Vec::new();
        for (i, item) in list.iter().enumerate() {
            let scope = iteration_scope(expr.scope.as_deref(), item, i);
            let condition = ctx.with_scope(scope, |ctx| self.evaluate(&expr.condition, ctx))?;
            if condition.is_true() {
                kept.push(item.clone());
            }
        }
        Ok(same_type(list, kept))
    }

    /// First or last element, after ordering by `order_by` when present
    pub fn eval_first_last(
        &self,
        expr: &FirstLastExpression,
        ctx: &mut EvaluationContext,
        from_end: bool,
    ) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let pick = if from_end { last } else { first };
        let Some(path) = &expr.order_by else {
            return pick(&source);
        };
        let Some(list) = list_operand(&source, "First")? else {
            return Ok(CqlValue::Null);
        };
        let by = [SortByItem::ByColumn {
            path: path.clone(),
            direction: SortDirection::Asc,
        }];
        let sorted = self.sort_rows(list.elements.clone(), &by, ctx)?;
        pick(&same_type(list, sorted))
    }

    pub fn eval_slice(&self, expr: &SliceExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let start = self.evaluate(&expr.start_index, ctx)?;
        let end = self.eval_optional(expr.end_index.as_deref(), ctx)?;
        slice(&source, &start, &end)
    }

    pub fn eval_index_of(&self, expr: &IndexOfExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let target = self.evaluate(&expr.target, ctx)?;
        index_of(&source, &target)
    }

    /// Body evaluated once per element; Null results are kept
    pub fn eval_for_each(&self, expr: &IterationExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let Some(list) = list_operand(&source, "ForEach")? else {
            return Ok(CqlValue::Null);
        };
        let mut results = Vec::with_capacity(list.len());
        for (i, item) in list.iter().enumerate() {
            let scope = iteration_scope(expr.scope.as_deref(), item, i);
            results.push(ctx.with_scope(scope, |ctx| self.evaluate(&expr.body, ctx))?);
        }
        Ok(CqlValue::List(CqlList::from_values(results)))
    }

    /// Apply the body to the source and then to each newly produced element
    /// until nothing new appears
    pub fn eval_repeat(&self, expr: &IterationExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let Some(list) = list_operand(&source, "Repeat")? else {
            return Ok(CqlValue::Null);
        };
        let limit = ctx.options().max_recursion_depth;
        let mut results = dedup(list.iter());
        let mut frontier = results.clone();
        let mut rounds = 0;

        while !frontier.is_empty() {
            rounds += 1;
            if rounds > limit {
                return Err(EvalError::RecursionLimit { limit });
            }
            let mut fresh = Vec::new();
            for (i, item) in frontier.iter().enumerate() {
                let scope = iteration_scope(expr.scope.as_deref(), item, i);
                let produced = ctx.with_scope(scope, |ctx| self.evaluate(&expr.body, ctx))?;
                let produced = match produced {
                    CqlValue::List(inner) => inner.elements,
                    CqlValue::Null => Vec::new(),
                    single => vec![single],
                };
                for value in produced {
                    if position_equivalent(results.iter(), &value).is_none() {
                        results.push(value.clone());
                        fresh.push(value);
                    }
                }
            }
            frontier = fresh;
        }
        Ok(CqlValue::List(CqlList::from_values(results)))
    }

    fn scoped_value(&self, name: &str, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        self.resolve_scoped(name, ctx)?
            .ok_or_else(|| EvalError::unresolved(name))
    }

    pub fn eval_current(&self, expr: &ScopeExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        self.scoped_value(expr.scope.as_deref().unwrap_or(THIS), ctx)
    }

    pub fn eval_iteration(&self, _expr: &ScopeExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        self.scoped_value(INDEX, ctx)
    }

    pub fn eval_total(&self, _expr: &ScopeExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        self.scoped_value(TOTAL, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(values: &[i32]) -> CqlValue {
        CqlValue::List(CqlList::new(
            CqlType::Integer,
            values.iter().copied().map(CqlValue::Integer).collect(),
        ))
    }

    fn as_list(value: &CqlValue) -> &CqlList {
        value.as_list().expect("list")
    }

    #[test]
    fn union_deduplicates() {
        let (a, b) = (ints(&[1, 2, 2, 3]), ints(&[3, 4]));
        assert_eq!(union_lists(as_list(&a), as_list(&b)), ints(&[1, 2, 3, 4]));
    }

    #[test]
    fn intersect_and_except_keep_left_duplicates() {
        let (a, b) = (ints(&[2, 2, 3]), ints(&[2, 3]));
        assert_eq!(intersect_lists(as_list(&a), as_list(&b)), ints(&[2, 2, 3]));

        let (a, b) = (ints(&[1, 2, 2, 3]), ints(&[3, 4]));
        assert_eq!(intersect_lists(as_list(&a), as_list(&b)), ints(&[3]));
        assert_eq!(except_lists(as_list(&a), as_list(&b)), ints(&[1, 2, 2]));
    }

    #[test]
    fn membership_uses_equivalence() {
        let list = CqlValue::list(vec![CqlValue::string("Abc"), CqlValue::Null]);
        let list = as_list(&list);
        assert_eq!(list_contains(list, &CqlValue::string("abc")), CqlValue::Boolean(true));
        assert_eq!(list_contains(list, &CqlValue::Null), CqlValue::Null);
        assert_eq!(
            list_properly_contains(as_list(&ints(&[1])), &CqlValue::Integer(1)),
            CqlValue::Boolean(false)
        );
    }

    #[test]
    fn exists_ignores_nulls() {
        assert_eq!(exists(&CqlValue::list(vec![CqlValue::Null])).unwrap(), CqlValue::Boolean(false));
        assert_eq!(exists(&ints(&[1])).unwrap(), CqlValue::Boolean(true));
        assert_eq!(exists(&CqlValue::Null).unwrap(), CqlValue::Boolean(false));
    }

    #[test]
    fn slicing_and_indexing() {
        let list = ints(&[10, 20, 30, 40]);
        assert_eq!(slice(&list, &CqlValue::Integer(1), &CqlValue::Integer(3)).unwrap(), ints(&[20, 30]));
        assert_eq!(slice(&list, &CqlValue::Integer(3), &CqlValue::Null).unwrap(), ints(&[40]));
        assert_eq!(slice(&list, &CqlValue::Integer(5), &CqlValue::Null).unwrap(), ints(&[]));
        assert_eq!(index_of(&list, &CqlValue::Integer(30)).unwrap(), CqlValue::Integer(2));
        assert_eq!(index_of(&list, &CqlValue::Integer(99)).unwrap(), CqlValue::Integer(-1));
        assert_eq!(index_of(&list, &CqlValue::Null).unwrap(), CqlValue::Null);
    }

    #[test]
    fn singleton_from_rejects_many() {
        assert_eq!(singleton_from(&ints(&[])).unwrap(), CqlValue::Null);
        assert_eq!(singleton_from(&ints(&[7])).unwrap(), CqlValue::Integer(7));
        assert!(matches!(
            singleton_from(&ints(&[1, 2])).unwrap_err(),
            EvalError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn flatten_one_level() {
        let nested = CqlValue::list(vec![ints(&[1, 2]), ints(&[3])]);
        assert_eq!(
            as_list(&flatten(&nested).unwrap()).elements,
            as_list(&ints(&[1, 2, 3])).elements
        );
    }

    #[test]
    fn times_merges_tuples() {
        let a = CqlValue::list(vec![CqlValue::tuple([("a", CqlValue::Integer(1))])]);
        let b = CqlValue::list(vec![
            CqlValue::tuple([("b", CqlValue::Integer(2))]),
            CqlValue::tuple([("b", CqlValue::Integer(3))]),
        ]);
        let product = times(&a, &b).unwrap();
        let rows = as_list(&product);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows.elements[1],
            CqlValue::tuple([("a", CqlValue::Integer(1)), ("b", CqlValue::Integer(3))])
        );
    }

    #[test]
    fn sort_puts_nulls_first_and_reverses_for_desc() {
        let rows = vec![CqlValue::Integer(2), CqlValue::Null, CqlValue::Integer(1)];
        let keyed = |rows: &[CqlValue]| rows.iter().map(|r| (vec![r.clone()], r.clone())).collect();
        assert_eq!(
            sort_by_keys(keyed(&rows), &[SortDirection::Asc]).unwrap(),
            vec![CqlValue::Null, CqlValue::Integer(1), CqlValue::Integer(2)]
        );
        assert_eq!(
            sort_by_keys(keyed(&rows), &[SortDirection::Desc]).unwrap(),
            vec![CqlValue::Integer(2), CqlValue::Integer(1), CqlValue::Null]
        );
    }
}
