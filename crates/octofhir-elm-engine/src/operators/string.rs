//! String Operators
//!
//! Implements: Concatenate, Combine, Split, SplitOnMatches, Length, Upper,
//! Lower, Indexer, PositionOf, LastPositionOf, Substring, StartsWith,
//! EndsWith, Matches, ReplaceMatches
//!
//! Indexes count characters, not bytes, and are zero-based.

use crate::context::EvaluationContext;
use crate::engine::CqlEngine;
use crate::error::{EvalError, EvalResult};
use octofhir_elm_model::expression::{
    CombineExpression, NaryExpression, PositionOfExpression, SplitExpression, SubstringExpression,
    TernaryExpression,
};
use octofhir_elm_types::{CqlType, CqlValue};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;

/// Compiled patterns shared across evaluations
#[derive(Debug, Default)]
pub struct RegexCache {
    patterns: Mutex<HashMap<String, Regex>>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `pattern`, or reuse an earlier compilation
    pub fn get(&self, pattern: &str) -> EvalResult<Regex> {
        let mut patterns = self.patterns.lock();
        if let Some(regex) = patterns.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)
            .map_err(|e| EvalError::invalid_argument("regular expression", e.to_string()))?;
        patterns.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.patterns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn text<'a>(value: &'a CqlValue, operation: &str) -> EvalResult<Option<&'a str>> {
    match value {
        CqlValue::Null => Ok(None),
        CqlValue::String(s) => Ok(Some(s)),
        other => Err(EvalError::type_mismatch(operation, "String", other.type_name())),
    }
}

fn index(value: &CqlValue, operation: &str) -> EvalResult<Option<i32>> {
    match value {
        CqlValue::Null => Ok(None),
        CqlValue::Integer(i) => Ok(Some(*i)),
        other => Err(EvalError::type_mismatch(operation, "Integer", other.type_name())),
    }
}

fn strings(parts: impl IntoIterator<Item = String>) -> CqlValue {
    CqlValue::List(octofhir_elm_types::CqlList::new(
        CqlType::String,
        parts.into_iter().map(CqlValue::String).collect(),
    ))
}

/// Null if any operand is Null
pub fn concatenate(values: &[CqlValue]) -> EvalResult<CqlValue> {
    let mut result = String::new();
    for value in values {
        match text(value, "Concatenate")? {
            Some(s) => result.push_str(s),
            None => return Ok(CqlValue::Null),
        }
    }
    Ok(CqlValue::String(result))
}

/// Join the non-null elements of a list; Null when none remain
pub fn combine(source: &CqlValue, separator: &CqlValue) -> EvalResult<CqlValue> {
    let list = match source {
        CqlValue::Null => return Ok(CqlValue::Null),
        CqlValue::List(list) => list,
        other => return Err(EvalError::type_mismatch("Combine", "List<String>", other.type_name())),
    };
    let separator = text(separator, "Combine")?.unwrap_or("");
    let mut parts = Vec::with_capacity(list.len());
    for element in list.iter() {
        if let Some(s) = text(element, "Combine")? {
            parts.push(s);
        }
    }
    if parts.is_empty() {
        return Ok(CqlValue::Null);
    }
    Ok(CqlValue::String(parts.join(separator)))
}

pub fn split(value: &CqlValue, separator: &CqlValue) -> EvalResult<CqlValue> {
    let Some(s) = text(value, "Split")? else {
        return Ok(CqlValue::Null);
    };
    match text(separator, "Split")? {
        Some(sep) if !sep.is_empty() => Ok(strings(s.split(sep).map(str::to_string))),
        _ => Ok(strings([s.to_string()])),
    }
}

/// Characters in a string, or elements in a list
pub fn length(value: &CqlValue) -> EvalResult<CqlValue> {
    let count = match value {
        CqlValue::Null => return Ok(CqlValue::Null),
        CqlValue::String(s) => s.chars().count(),
        CqlValue::List(list) => list.len(),
        other => return Err(EvalError::type_mismatch("Length", "String or List", other.type_name())),
    };
    Ok(i32::try_from(count).ok().into())
}

pub fn upper(value: &CqlValue) -> EvalResult<CqlValue> {
    Ok(text(value, "Upper")?.map(str::to_uppercase).into())
}

pub fn lower(value: &CqlValue) -> EvalResult<CqlValue> {
    Ok(text(value, "Lower")?.map(str::to_lowercase).into())
}

/// Character of a string or element of a list; Null out of range
pub fn indexer(source: &CqlValue, position: &CqlValue) -> EvalResult<CqlValue> {
    let Some(position) = index(position, "Indexer")? else {
        return Ok(CqlValue::Null);
    };
    let Ok(position) = usize::try_from(position) else {
        return Ok(CqlValue::Null);
    };
    match source {
        CqlValue::Null => Ok(CqlValue::Null),
        CqlValue::String(s) => Ok(s.chars().nth(position).map(String::from).into()),
        CqlValue::List(list) => Ok(list.elements.get(position).cloned().unwrap_or(CqlValue::Null)),
        other => Err(EvalError::type_mismatch("Indexer", "String or List", other.type_name())),
    }
}

fn char_index(s: &str, byte_index: usize) -> i32 {
    i32::try_from(s[..byte_index].chars().count()).unwrap_or(i32::MAX)
}

/// Index of the first occurrence of `pattern`, -1 when absent
pub fn position_of(pattern: &CqlValue, value: &CqlValue) -> EvalResult<CqlValue> {
    match (text(pattern, "PositionOf")?, text(value, "PositionOf")?) {
        (Some(p), Some(s)) => Ok(CqlValue::Integer(s.find(p).map_or(-1, |i| char_index(s, i)))),
        _ => Ok(CqlValue::Null),
    }
}

pub fn last_position_of(pattern: &CqlValue, value: &CqlValue) -> EvalResult<CqlValue> {
    match (text(pattern, "LastPositionOf")?, text(value, "LastPositionOf")?) {
        (Some(p), Some(s)) => Ok(CqlValue::Integer(s.rfind(p).map_or(-1, |i| char_index(s, i)))),
        _ => Ok(CqlValue::Null),
    }
}

/// Characters from `start`, up to `length` of them; Null when `start` is
/// outside the string
pub fn substring(value: &CqlValue, start: &CqlValue, length: &CqlValue) -> EvalResult<CqlValue> {
    let (Some(s), Some(start)) = (text(value, "Substring")?, index(start, "Substring")?) else {
        return Ok(CqlValue::Null);
    };
    let count = s.chars().count();
    let Ok(start) = usize::try_from(start) else {
        return Ok(CqlValue::Null);
    };
    if start >= count {
        return Ok(CqlValue::Null);
    }
    let take = match index(length, "Substring")? {
        None => count - start,
        Some(n) if n < 0 => return Ok(CqlValue::Null),
        Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
    };
    Ok(CqlValue::String(s.chars().skip(start).take(take).collect()))
}

pub fn starts_with(value: &CqlValue, prefix: &CqlValue) -> EvalResult<CqlValue> {
    match (text(value, "StartsWith")?, text(prefix, "StartsWith")?) {
        (Some(s), Some(p)) => Ok(CqlValue::Boolean(s.starts_with(p))),
        _ => Ok(CqlValue::Null),
    }
}

pub fn ends_with(value: &CqlValue, suffix: &CqlValue) -> EvalResult<CqlValue> {
    match (text(value, "EndsWith")?, text(suffix, "EndsWith")?) {
        (Some(s), Some(p)) => Ok(CqlValue::Boolean(s.ends_with(p))),
        _ => Ok(CqlValue::Null),
    }
}

/// True when the whole string matches the pattern
pub fn matches(cache: &RegexCache, value: &CqlValue, pattern: &CqlValue) -> EvalResult<CqlValue> {
    match (text(value, "Matches")?, text(pattern, "Matches")?) {
        (Some(s), Some(p)) => {
            let regex = cache.get(&format!("^(?:{p})$"))?;
            Ok(CqlValue::Boolean(regex.is_match(s)))
        }
        _ => Ok(CqlValue::Null),
    }
}

/// Replace every match; `$1` in the substitution names a capture group
pub fn replace_matches(
    cache: &RegexCache,
    value: &CqlValue,
    pattern: &CqlValue,
    substitution: &CqlValue,
) -> EvalResult<CqlValue> {
    match (
        text(value, "ReplaceMatches")?,
        text(pattern, "ReplaceMatches")?,
        text(substitution, "ReplaceMatches")?,
    ) {
        (Some(s), Some(p), Some(r)) => {
            let regex = cache.get(p)?;
            Ok(CqlValue::String(regex.replace_all(s, r).into_owned()))
        }
        _ => Ok(CqlValue::Null),
    }
}

pub fn split_on_matches(cache: &RegexCache, value: &CqlValue, pattern: &CqlValue) -> EvalResult<CqlValue> {
    match (text(value, "SplitOnMatches")?, text(pattern, "SplitOnMatches")?) {
        (Some(s), Some(p)) => {
            let regex = cache.get(p)?;
            Ok(strings(regex.split(s).map(str::to_string)))
        }
        (Some(s), None) => Ok(strings([s.to_string()])),
        _ => Ok(CqlValue::Null),
    }
}

impl CqlEngine {
    pub fn eval_concatenate(&self, expr: &NaryExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let values = self.eval_operands(&expr.operand, ctx)?;
        concatenate(&values)
    }

    pub fn eval_combine(&self, expr: &CombineExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let source = self.evaluate(&expr.source, ctx)?;
        let separator = self.eval_optional(expr.separator.as_deref(), ctx)?;
        combine(&source, &separator)
    }

    pub fn eval_split(
        &self,
        expr: &SplitExpression,
        ctx: &mut EvaluationContext,
        on_matches: bool,
    ) -> EvalResult<CqlValue> {
        let value = self.evaluate(&expr.string_to_split, ctx)?;
        let separator = self.evaluate(&expr.separator, ctx)?;
        if on_matches {
            split_on_matches(&self.regex_cache, &value, &separator)
        } else {
            split(&value, &separator)
        }
    }

    pub fn eval_position_of(
        &self,
        expr: &PositionOfExpression,
        ctx: &mut EvaluationContext,
        last: bool,
    ) -> EvalResult<CqlValue> {
        let pattern = self.evaluate(&expr.pattern, ctx)?;
        let value = self.evaluate(&expr.string, ctx)?;
        if last {
            last_position_of(&pattern, &value)
        } else {
            position_of(&pattern, &value)
        }
    }

    pub fn eval_substring(&self, expr: &SubstringExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let value = self.evaluate(&expr.string_to_sub, ctx)?;
        let start = self.evaluate(&expr.start_index, ctx)?;
        let length = self.eval_optional(expr.length.as_deref(), ctx)?;
        substring(&value, &start, &length)
    }

    pub fn eval_replace_matches(&self, expr: &TernaryExpression, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let [value, pattern, substitution] = &*expr.operand;
        let value = self.evaluate(value, ctx)?;
        let pattern = self.evaluate(pattern, ctx)?;
        let substitution = self.evaluate(substitution, ctx)?;
        replace_matches(&self.regex_cache, &value, &pattern, &substitution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(value: &str) -> CqlValue {
        CqlValue::string(value)
    }

    fn list(values: &[&str]) -> CqlValue {
        strings(values.iter().map(|v| v.to_string()))
    }

    #[test]
    fn concatenate_propagates_null() {
        assert_eq!(concatenate(&[s("a"), s("b")]).unwrap(), s("ab"));
        assert_eq!(concatenate(&[s("a"), CqlValue::Null]).unwrap(), CqlValue::Null);
    }

    #[test]
    fn combine_skips_null_elements() {
        let source = CqlValue::list(vec![s("a"), CqlValue::Null, s("c")]);
        assert_eq!(combine(&source, &s(", ")).unwrap(), s("a, c"));
        assert_eq!(combine(&source, &CqlValue::Null).unwrap(), s("ac"));
        assert_eq!(
            combine(&CqlValue::list(vec![CqlValue::Null]), &s(",")).unwrap(),
            CqlValue::Null
        );
    }

    #[test]
    fn split_and_split_on_matches() {
        let cache = RegexCache::new();
        assert_eq!(split(&s("a,b,c"), &s(",")).unwrap(), list(&["a", "b", "c"]));
        assert_eq!(split(&s("abc"), &CqlValue::Null).unwrap(), list(&["abc"]));
        assert_eq!(
            split_on_matches(&cache, &s("a1b22c"), &s("[0-9]+")).unwrap(),
            list(&["a", "b", "c"])
        );
    }

    #[test]
    fn character_positions() {
        assert_eq!(position_of(&s("b"), &s("abcb")).unwrap(), CqlValue::Integer(1));
        assert_eq!(last_position_of(&s("b"), &s("abcb")).unwrap(), CqlValue::Integer(3));
        assert_eq!(position_of(&s("z"), &s("abc")).unwrap(), CqlValue::Integer(-1));
        assert_eq!(position_of(&s("c"), &s("ébc")).unwrap(), CqlValue::Integer(2));
        assert_eq!(indexer(&s("abc"), &CqlValue::Integer(1)).unwrap(), s("b"));
        assert_eq!(indexer(&s("abc"), &CqlValue::Integer(5)).unwrap(), CqlValue::Null);
    }

    #[test]
    fn substring_bounds() {
        assert_eq!(
            substring(&s("abcdef"), &CqlValue::Integer(2), &CqlValue::Null).unwrap(),
            s("cdef")
        );
        assert_eq!(
            substring(&s("abcdef"), &CqlValue::Integer(2), &CqlValue::Integer(2)).unwrap(),
            s("cd")
        );
        assert_eq!(
            substring(&s("abc"), &CqlValue::Integer(3), &CqlValue::Null).unwrap(),
            CqlValue::Null
        );
        assert_eq!(
            substring(&s("abc"), &CqlValue::Integer(-1), &CqlValue::Null).unwrap(),
            CqlValue::Null
        );
    }

    #[test]
    fn patterns_are_cached_and_anchored() {
        let cache = RegexCache::new();
        assert_eq!(matches(&cache, &s("12345"), &s("\\d+")).unwrap(), CqlValue::Boolean(true));
        assert_eq!(matches(&cache, &s("a12345"), &s("\\d+")).unwrap(), CqlValue::Boolean(false));
        assert_eq!(matches(&cache, &s("999"), &s("\\d+")).unwrap(), CqlValue::Boolean(true));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            replace_matches(&cache, &s("John Smith"), &s("(\\w+) (\\w+)"), &s("$2, $1")).unwrap(),
            s("Smith, John")
        );
        assert!(matches(&cache, &s("x"), &s("(")).is_err());
    }

    #[test]
    fn length_counts_characters() {
        assert_eq!(length(&s("héllo")).unwrap(), CqlValue::Integer(5));
        assert_eq!(length(&CqlValue::Null).unwrap(), CqlValue::Null);
        assert_eq!(upper(&s("abc")).unwrap(), s("ABC"));
    }
}
