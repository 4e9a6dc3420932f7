//! Runtime values
//!
//! [`CqlValue`] is the closed set of values the evaluator produces and
//! consumes. Construction and type tagging live here; equality and
//! equivalence between values are defined in [`crate::compare`].

use crate::temporal::{CqlDate, CqlDateTime, CqlTime};
use crate::type_system::{CqlType, TupleTypeElement};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// A runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CqlValue {
    /// Absent or unknown
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Decimal(Decimal),
    String(String),
    Date(CqlDate),
    DateTime(CqlDateTime),
    Time(CqlTime),
    Quantity(CqlQuantity),
    Ratio(CqlRatio),
    Code(CqlCode),
    Concept(CqlConcept),
    List(CqlList),
    Interval(CqlInterval),
    /// Structured record: query rows, retrieved resources, tuple selectors
    Tuple(CqlTuple),
}

impl CqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::Boolean(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Self::Boolean(false))
    }

    /// Type of the value; Null reports `Any`
    pub fn point_type(&self) -> CqlType {
        match self {
            Self::Null => CqlType::Any,
            Self::Boolean(_) => CqlType::Boolean,
            Self::Integer(_) => CqlType::Integer,
            Self::Long(_) => CqlType::Long,
            Self::Decimal(_) => CqlType::Decimal,
            Self::String(_) => CqlType::String,
            Self::Date(_) => CqlType::Date,
            Self::DateTime(_) => CqlType::DateTime,
            Self::Time(_) => CqlType::Time,
            Self::Quantity(_) => CqlType::Quantity,
            Self::Ratio(_) => CqlType::Ratio,
            Self::Code(_) => CqlType::Code,
            Self::Concept(_) => CqlType::Concept,
            Self::List(list) => CqlType::list(list.element_type.clone()),
            Self::Interval(interval) => CqlType::interval(interval.point_type.clone()),
            Self::Tuple(tuple) => tuple.tuple_type(),
        }
    }

    pub fn type_name(&self) -> String {
        self.point_type().name()
    }

    pub fn boolean(value: bool) -> Self {
        Self::Boolean(value)
    }

    pub fn integer(value: i32) -> Self {
        Self::Integer(value)
    }

    pub fn long(value: i64) -> Self {
        Self::Long(value)
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::Decimal(value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn quantity(value: Decimal, unit: impl Into<String>) -> Self {
        Self::Quantity(CqlQuantity::new(value, unit))
    }

    pub fn code(code: impl Into<String>, system: impl Into<String>) -> Self {
        Self::Code(CqlCode::new(code, Some(system.into())))
    }

    /// List whose element type is taken from the first non-null element
    pub fn list(elements: Vec<CqlValue>) -> Self {
        Self::List(CqlList::from_values(elements))
    }

    /// Closed interval; the point type comes from whichever bound is known
    pub fn interval(low: CqlValue, high: CqlValue) -> Self {
        Self::Interval(CqlInterval::closed(low, high))
    }

    pub fn tuple(elements: impl IntoIterator<Item = (impl Into<String>, CqlValue)>) -> Self {
        Self::Tuple(CqlTuple::from_elements(elements))
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer or Long widened to i64
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(i64::from(*i)),
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Any numeric kind widened to Decimal
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Long(l) => Some(Decimal::from(*l)),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&CqlList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_interval(&self) -> Option<&CqlInterval> {
        match self {
            Self::Interval(interval) => Some(interval),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&CqlTuple> {
        match self {
            Self::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }
}

impl From<bool> for CqlValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for CqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for CqlValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<Decimal> for CqlValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for CqlValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for CqlValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<CqlDate> for CqlValue {
    fn from(value: CqlDate) -> Self {
        Self::Date(value)
    }
}

impl From<CqlDateTime> for CqlValue {
    fn from(value: CqlDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<CqlTime> for CqlValue {
    fn from(value: CqlTime) -> Self {
        Self::Time(value)
    }
}

impl From<CqlQuantity> for CqlValue {
    fn from(value: CqlQuantity) -> Self {
        Self::Quantity(value)
    }
}

impl From<CqlCode> for CqlValue {
    fn from(value: CqlCode) -> Self {
        Self::Code(value)
    }
}

impl<T: Into<CqlValue>> From<Option<T>> for CqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Canonical string form, as produced by `ToString`
impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::Quantity(q) => write!(f, "{q}"),
            Self::Ratio(r) => write!(f, "{r}"),
            Self::Code(c) => write!(f, "{c}"),
            Self::Concept(c) => write!(f, "{c}"),
            Self::List(l) => write!(f, "{l}"),
            Self::Interval(i) => write!(f, "{i}"),
            Self::Tuple(t) => write!(f, "{t}"),
        }
    }
}

/// Decimal value with an uninterpreted unit string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CqlQuantity {
    pub value: Decimal,
    pub unit: String,
}

impl CqlQuantity {
    /// Unit used for quantities written without one
    pub const DEFAULT_UNIT: &'static str = "1";

    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    pub fn unitless(value: Decimal) -> Self {
        Self::new(value, Self::DEFAULT_UNIT)
    }

    pub fn has_same_unit(&self, other: &Self) -> bool {
        self.unit == other.unit
    }
}

impl fmt::Display for CqlQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.value, self.unit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CqlRatio {
    pub numerator: CqlQuantity,
    pub denominator: CqlQuantity,
}

impl CqlRatio {
    pub fn new(numerator: CqlQuantity, denominator: CqlQuantity) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl fmt::Display for CqlRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.numerator, self.denominator)
    }
}

/// Terminology code; only `code` is mandatory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CqlCode {
    pub code: String,
    pub system: Option<String>,
    pub version: Option<String>,
    pub display: Option<String>,
}

impl CqlCode {
    pub fn new(code: impl Into<String>, system: Option<String>) -> Self {
        Self {
            code: code.into(),
            system,
            version: None,
            display: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

impl fmt::Display for CqlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code '{}'", self.code)?;
        if let Some(system) = &self.system {
            write!(f, " from \"{system}\"")?;
        }
        if let Some(display) = &self.display {
            write!(f, " display '{display}'")?;
        }
        Ok(())
    }
}

/// Ordered set of codes naming the same clinical idea
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CqlConcept {
    pub codes: SmallVec<[CqlCode; 2]>,
    pub display: Option<String>,
}

impl CqlConcept {
    pub fn new(codes: impl IntoIterator<Item = CqlCode>, display: Option<String>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
            display,
        }
    }

    pub fn from_code(code: CqlCode) -> Self {
        let display = code.display.clone();
        Self {
            codes: smallvec::smallvec![code],
            display,
        }
    }
}

impl fmt::Display for CqlConcept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Concept { ")?;
        for (i, code) in self.codes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{code}")?;
        }
        f.write_str(" }")?;
        if let Some(display) = &self.display {
            write!(f, " display '{display}'")?;
        }
        Ok(())
    }
}

/// Ordered sequence of individually nullable values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CqlList {
    pub element_type: CqlType,
    pub elements: Vec<CqlValue>,
}

impl CqlList {
    pub fn new(element_type: CqlType, elements: Vec<CqlValue>) -> Self {
        Self {
            element_type,
            elements,
        }
    }

    pub fn empty(element_type: CqlType) -> Self {
        Self::new(element_type, Vec::new())
    }

    /// Infer the element type from the first non-null element
    pub fn from_values(elements: Vec<CqlValue>) -> Self {
        let element_type = elements
            .iter()
            .find(|e| !e.is_null())
            .map_or(CqlType::Any, CqlValue::point_type);
        Self::new(element_type, elements)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CqlValue> {
        self.elements.iter()
    }
}

/// Lists compare by their elements; the declared type is metadata
impl PartialEq for CqlList {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl fmt::Display for CqlList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match element {
                CqlValue::String(s) => write!(f, "'{s}'")?,
                other => write!(f, "{other}")?,
            }
        }
        f.write_str("}")
    }
}

/// Range over an ordered point type; a `None` bound is null (unknown)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CqlInterval {
    pub point_type: CqlType,
    pub low: Option<Box<CqlValue>>,
    pub low_closed: bool,
    pub high: Option<Box<CqlValue>>,
    pub high_closed: bool,
}

impl CqlInterval {
    pub fn new(low: CqlValue, low_closed: bool, high: CqlValue, high_closed: bool) -> Self {
        let point_type = [&low, &high]
            .into_iter()
            .find(|b| !b.is_null())
            .map_or(CqlType::Any, |b| b.point_type());
        Self::typed(point_type, low, low_closed, high, high_closed)
    }

    pub fn typed(
        point_type: CqlType,
        low: CqlValue,
        low_closed: bool,
        high: CqlValue,
        high_closed: bool,
    ) -> Self {
        let bound = |v: CqlValue| (!v.is_null()).then(|| Box::new(v));
        Self {
            point_type,
            low: bound(low),
            low_closed,
            high: bound(high),
            high_closed,
        }
    }

    pub fn closed(low: CqlValue, high: CqlValue) -> Self {
        Self::new(low, true, high, true)
    }

    pub fn closed_open(low: CqlValue, high: CqlValue) -> Self {
        Self::new(low, true, high, false)
    }

    pub fn open(low: CqlValue, high: CqlValue) -> Self {
        Self::new(low, false, high, false)
    }

    pub fn low(&self) -> Option<&CqlValue> {
        self.low.as_deref()
    }

    pub fn high(&self) -> Option<&CqlValue> {
        self.high.as_deref()
    }

    /// Low bound as a value, Null when unknown
    pub fn low_value(&self) -> CqlValue {
        self.low().cloned().unwrap_or(CqlValue::Null)
    }

    pub fn high_value(&self) -> CqlValue {
        self.high().cloned().unwrap_or(CqlValue::Null)
    }
}

impl PartialEq for CqlInterval {
    fn eq(&self, other: &Self) -> bool {
        self.low == other.low
            && self.low_closed == other.low_closed
            && self.high == other.high
            && self.high_closed == other.high_closed
    }
}

impl fmt::Display for CqlInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.low_closed { '[' } else { '(' };
        let close = if self.high_closed { ']' } else { ')' };
        write!(
            f,
            "Interval{open}{}, {}{close}",
            self.low_value(),
            self.high_value()
        )
    }
}

/// Named elements in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CqlTuple {
    pub elements: IndexMap<String, CqlValue>,
}

impl CqlTuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: impl IntoIterator<Item = (impl Into<String>, CqlValue)>) -> Self {
        Self {
            elements: elements.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.elements.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: CqlValue) {
        self.elements.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, CqlValue> {
        self.elements.iter()
    }

    fn tuple_type(&self) -> CqlType {
        CqlType::Tuple(
            self.elements
                .iter()
                .map(|(name, value)| TupleTypeElement {
                    name: name.clone(),
                    element_type: value.point_type(),
                })
                .collect(),
        )
    }
}

impl fmt::Display for CqlTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tuple { ")?;
        for (i, (name, value)) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str(" }")
    }
}
