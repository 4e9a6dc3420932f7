//! Expression tree nodes
//!
//! A tree is built once by a translator and then evaluated any number of
//! times; nodes carry no evaluation state. Every operator kind is a variant
//! of [`Expression`], and each variant wraps a node struct holding an
//! [`Element`] plus the operator's operand slots.

use octofhir_elm_types::{CqlType, SYSTEM_NAMESPACE_URI, TemporalUnit, TupleTypeElement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Attributes shared by every node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Source position, used only in diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type_name: Option<String>,
}

impl Element {
    pub fn at(locator: impl Into<String>) -> Self {
        Self {
            locator: Some(locator.into()),
            result_type_name: None,
        }
    }
}

macro_rules! expression_kinds {
    ($($variant:ident($node:ty)),* $(,)?) => {
        /// An operator node; the variant names the operator kind
        #[derive(Debug, Clone, Serialize, Deserialize)]
        #[serde(tag = "type")]
        pub enum Expression {
            $($variant($node)),*
        }

        impl Expression {
            /// Operator name, e.g. `Add`
            pub fn kind(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => stringify!($variant)),*
                }
            }

            pub fn element(&self) -> &Element {
                match self {
                    $(Self::$variant(node) => &node.element),*
                }
            }

            pub fn element_mut(&mut self) -> &mut Element {
                match self {
                    $(Self::$variant(node) => &mut node.element),*
                }
            }
        }
    };
}

expression_kinds! {
    // Literals and selectors
    Null(NullLiteral),
    Literal(Literal),
    List(ListSelector),
    Interval(IntervalSelector),
    Tuple(TupleSelector),
    Instance(InstanceSelector),
    Code(CodeSelector),
    Concept(ConceptSelector),
    Quantity(QuantityLiteral),
    Ratio(RatioLiteral),
    Date(DateSelector),
    DateTime(DateTimeSelector),
    Time(TimeSelector),

    // References
    ExpressionRef(ExpressionRef),
    FunctionRef(FunctionRef),
    ParameterRef(ParameterRef),
    OperandRef(NameRef),
    AliasRef(NameRef),
    QueryLetRef(NameRef),
    IdentifierRef(IdentifierRef),
    Property(Property),
    CodeSystemRef(DefinitionRef),
    ValueSetRef(DefinitionRef),
    CodeRef(DefinitionRef),
    ConceptRef(DefinitionRef),

    // Logical
    And(BinaryExpression),
    Or(BinaryExpression),
    Xor(BinaryExpression),
    Implies(BinaryExpression),
    Not(UnaryExpression),

    // Nullological and conditional
    IsNull(UnaryExpression),
    IsTrue(UnaryExpression),
    IsFalse(UnaryExpression),
    Coalesce(NaryExpression),
    If(IfExpression),
    Case(CaseExpression),

    // Comparison
    Equal(BinaryExpression),
    Equivalent(BinaryExpression),
    NotEqual(BinaryExpression),
    Less(BinaryExpression),
    Greater(BinaryExpression),
    LessOrEqual(BinaryExpression),
    GreaterOrEqual(BinaryExpression),

    // Arithmetic
    Add(BinaryExpression),
    Subtract(BinaryExpression),
    Multiply(BinaryExpression),
    Divide(BinaryExpression),
    TruncatedDivide(BinaryExpression),
    Modulo(BinaryExpression),
    Ceiling(UnaryExpression),
    Floor(UnaryExpression),
    Truncate(UnaryExpression),
    Abs(UnaryExpression),
    Negate(UnaryExpression),
    Round(RoundExpression),
    Ln(UnaryExpression),
    Exp(UnaryExpression),
    Log(BinaryExpression),
    Power(BinaryExpression),
    Successor(UnaryExpression),
    Predecessor(UnaryExpression),
    MinValue(TypeNameExpression),
    MaxValue(TypeNameExpression),
    Precision(UnaryExpression),
    LowBoundary(BinaryExpression),
    HighBoundary(BinaryExpression),

    // String
    Concatenate(NaryExpression),
    Combine(CombineExpression),
    Split(SplitExpression),
    SplitOnMatches(SplitExpression),
    Length(UnaryExpression),
    Upper(UnaryExpression),
    Lower(UnaryExpression),
    Indexer(BinaryExpression),
    PositionOf(PositionOfExpression),
    LastPositionOf(PositionOfExpression),
    Substring(SubstringExpression),
    StartsWith(BinaryExpression),
    EndsWith(BinaryExpression),
    Matches(BinaryExpression),
    ReplaceMatches(TernaryExpression),

    // Date and time
    Now(NullaryExpression),
    Today(NullaryExpression),
    TimeOfDay(NullaryExpression),
    DateFrom(UnaryExpression),
    TimeFrom(UnaryExpression),
    TimezoneOffsetFrom(UnaryExpression),
    DateTimeComponentFrom(DateTimeComponentFromExpression),
    DurationBetween(BinaryExpression),
    DifferenceBetween(BinaryExpression),
    SameAs(BinaryExpression),
    SameOrBefore(BinaryExpression),
    SameOrAfter(BinaryExpression),

    // Interval
    Start(UnaryExpression),
    End(UnaryExpression),
    PointFrom(UnaryExpression),
    Width(UnaryExpression),
    Size(UnaryExpression),
    Contains(BinaryExpression),
    In(BinaryExpression),
    Includes(BinaryExpression),
    IncludedIn(BinaryExpression),
    ProperContains(BinaryExpression),
    ProperIn(BinaryExpression),
    ProperIncludes(BinaryExpression),
    ProperIncludedIn(BinaryExpression),
    Before(BinaryExpression),
    After(BinaryExpression),
    Meets(BinaryExpression),
    MeetsBefore(BinaryExpression),
    MeetsAfter(BinaryExpression),
    Overlaps(BinaryExpression),
    OverlapsBefore(BinaryExpression),
    OverlapsAfter(BinaryExpression),
    Starts(BinaryExpression),
    Ends(BinaryExpression),
    Collapse(BinaryExpression),
    Expand(BinaryExpression),
    Union(BinaryExpression),
    Intersect(BinaryExpression),
    Except(BinaryExpression),

    // List
    Exists(UnaryExpression),
    Times(BinaryExpression),
    Filter(FilterExpression),
    First(FirstLastExpression),
    Last(FirstLastExpression),
    Slice(SliceExpression),
    IndexOf(IndexOfExpression),
    Flatten(UnaryExpression),
    Sort(SortExpression),
    ForEach(IterationExpression),
    Repeat(IterationExpression),
    Distinct(UnaryExpression),
    Current(ScopeExpression),
    Iteration(ScopeExpression),
    Total(ScopeExpression),
    SingletonFrom(UnaryExpression),

    // Aggregate
    Aggregate(AggregateFold),
    Count(AggregateExpression),
    Sum(AggregateExpression),
    Product(AggregateExpression),
    Min(AggregateExpression),
    Max(AggregateExpression),
    Avg(AggregateExpression),
    GeometricMean(AggregateExpression),
    Median(AggregateExpression),
    Mode(AggregateExpression),
    Variance(AggregateExpression),
    StdDev(AggregateExpression),
    PopulationVariance(AggregateExpression),
    PopulationStdDev(AggregateExpression),
    AllTrue(AggregateExpression),
    AnyTrue(AggregateExpression),

    // Type operators and conversions
    As(TypeOperatorExpression),
    Convert(TypeOperatorExpression),
    Is(TypeOperatorExpression),
    CanConvert(TypeOperatorExpression),
    ToBoolean(UnaryExpression),
    ToChars(UnaryExpression),
    ToConcept(UnaryExpression),
    ToDate(UnaryExpression),
    ToDateTime(UnaryExpression),
    ToDecimal(UnaryExpression),
    ToInteger(UnaryExpression),
    ToLong(UnaryExpression),
    ToList(UnaryExpression),
    ToQuantity(UnaryExpression),
    ToRatio(UnaryExpression),
    ToString(UnaryExpression),
    ToTime(UnaryExpression),
    ConvertsToBoolean(UnaryExpression),
    ConvertsToDate(UnaryExpression),
    ConvertsToDateTime(UnaryExpression),
    ConvertsToDecimal(UnaryExpression),
    ConvertsToInteger(UnaryExpression),
    ConvertsToLong(UnaryExpression),
    ConvertsToQuantity(UnaryExpression),
    ConvertsToRatio(UnaryExpression),
    ConvertsToString(UnaryExpression),
    ConvertsToTime(UnaryExpression),

    // Clinical
    InCodeSystem(MembershipExpression),
    InValueSet(MembershipExpression),
    CalculateAge(CalculateAgeExpression),
    CalculateAgeAt(BinaryExpression),

    // Queries and data access
    Query(Query),
    Retrieve(Retrieve),

    // Diagnostics
    Message(MessageExpression),
}

// ---------------------------------------------------------------------------
// Operand shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NullaryExpression {
    #[serde(flatten)]
    pub element: Element,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnaryExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
}

/// Two operands; timing and duration operators also carry a precision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<[Expression; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<TemporalUnit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TernaryExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<[Expression; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaryExpression {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default)]
    pub operand: Vec<Expression>,
}

impl UnaryExpression {
    pub fn new(operand: Expression) -> Self {
        Self {
            element: Element::default(),
            operand: Box::new(operand),
        }
    }
}

impl BinaryExpression {
    pub fn new(left: Expression, right: Expression) -> Self {
        Self {
            element: Element::default(),
            operand: Box::new([left, right]),
            precision: None,
        }
    }

    pub fn with_precision(mut self, precision: TemporalUnit) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn left(&self) -> &Expression {
        &self.operand[0]
    }

    pub fn right(&self) -> &Expression {
        &self.operand[1]
    }
}

impl TernaryExpression {
    pub fn new(first: Expression, second: Expression, third: Expression) -> Self {
        Self {
            element: Element::default(),
            operand: Box::new([first, second, third]),
        }
    }
}

impl NaryExpression {
    pub fn new(operand: Vec<Expression>) -> Self {
        Self {
            element: Element::default(),
            operand,
        }
    }
}

// ---------------------------------------------------------------------------
// Literals and selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NullLiteral {
    #[serde(flatten)]
    pub element: Element,
}

/// System-typed literal; `value` is the lexical form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Literal {
    #[serde(flatten)]
    pub element: Element,
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSelector {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_specifier: Option<TypeSpecifier>,
    #[serde(default)]
    pub elements: Vec<Expression>,
}

/// Absent bounds evaluate to null
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSelector {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Box<Expression>>,
    #[serde(default = "default_true")]
    pub low_closed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Box<Expression>>,
    #[serde(default = "default_true")]
    pub high_closed: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleElementExpression {
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleSelector {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default)]
    pub elements: Vec<TupleElementExpression>,
}

/// Structured value of a named model or system type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSelector {
    #[serde(flatten)]
    pub element: Element,
    pub class_type: String,
    #[serde(default)]
    pub elements: Vec<TupleElementExpression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSelector {
    #[serde(flatten)]
    pub element: Element,
    pub code: String,
    pub system: DefinitionRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptSelector {
    #[serde(flatten)]
    pub element: Element,
    pub codes: Vec<CodeSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityLiteral {
    #[serde(flatten)]
    pub element: Element,
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioLiteral {
    #[serde(flatten)]
    pub element: Element,
    pub numerator: QuantityLiteral,
    pub denominator: QuantityLiteral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateSelector {
    #[serde(flatten)]
    pub element: Element,
    pub year: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<Box<Expression>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeSelector {
    #[serde(flatten)]
    pub element: Element,
    pub year: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub millisecond: Option<Box<Expression>>,
    /// Offset in (possibly fractional) hours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset: Option<Box<Expression>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSelector {
    #[serde(flatten)]
    pub element: Element,
    pub hour: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub millisecond: Option<Box<Expression>>,
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Reference to a named expression, optionally in an included library
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
    #[serde(default)]
    pub operand: Vec<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
}

/// Reference to a scoped name: function operand, query alias or let
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
}

/// Unqualified identifier resolved against scopes, then library definitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
}

/// Reference to a code system, value set, code or concept definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
}

impl DefinitionRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            element: Element::default(),
            name: name.into(),
            library_name: None,
        }
    }
}

/// Navigation into a structured value; without `source` the path is read
/// from the alias named by `scope`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<Expression>>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

// ---------------------------------------------------------------------------
// Operator-specific nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfExpression {
    #[serde(flatten)]
    pub element: Element,
    pub condition: Box<Expression>,
    pub then: Box<Expression>,
    #[serde(rename = "else")]
    pub else_: Box<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseItem {
    pub when: Expression,
    pub then: Expression,
}

/// Without a comparand each `when` is a condition; with one, each `when`
/// is compared to it by equality
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseExpression {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparand: Option<Box<Expression>>,
    pub case_item: Vec<CaseItem>,
    #[serde(rename = "else")]
    pub else_: Box<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<Box<Expression>>,
}

/// Operator parameterised by a type name, e.g. `MinValue`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeNameExpression {
    #[serde(flatten)]
    pub element: Element,
    pub value_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<Box<Expression>>,
}

/// `Split` splits on a literal separator, `SplitOnMatches` on a pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitExpression {
    #[serde(flatten)]
    pub element: Element,
    pub string_to_split: Box<Expression>,
    pub separator: Box<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOfExpression {
    #[serde(flatten)]
    pub element: Element,
    pub pattern: Box<Expression>,
    pub string: Box<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstringExpression {
    #[serde(flatten)]
    pub element: Element,
    pub string_to_sub: Box<Expression>,
    pub start_index: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<Box<Expression>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateTimeComponentFromExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    pub precision: TemporalUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub condition: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstLastExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub start_index: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<Box<Expression>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOfExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(rename = "element")]
    pub target: Box<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub by: Vec<SortByItem>,
}

/// `ForEach` and `Repeat`: `element` is evaluated once per item with the
/// item bound as `Current`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(rename = "element")]
    pub body: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// `Current`, `Iteration` and `Total` read the innermost iteration scope,
/// or the one named by `scope`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeExpression {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Fold over a list with the running value available as `Total`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateFold {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub iteration: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<Box<Expression>>,
    #[serde(default)]
    pub distinct: bool,
}

/// Aggregate over a list, optionally over one property of each element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl AggregateExpression {
    pub fn new(source: Expression) -> Self {
        Self {
            element: Element::default(),
            source: Box::new(source),
            path: None,
        }
    }
}

/// `As`, `Is`, `Convert` and `CanConvert`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeOperatorExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_specifier: Option<TypeSpecifier>,
    /// For `As`: a mismatching non-null operand is an error instead of Null
    #[serde(default)]
    pub strict: bool,
}

/// `InCodeSystem` / `InValueSet`; `vocabulary` evaluates to the system or set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipExpression {
    #[serde(flatten)]
    pub element: Element,
    pub code: Box<Expression>,
    pub vocabulary: Box<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculateAgeExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    pub precision: TemporalUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<Expression>>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(flatten)]
    pub element: Element,
    pub source: Vec<AliasedQuerySource>,
    #[serde(rename = "let", default)]
    pub let_clause: Vec<LetClause>,
    #[serde(default)]
    pub relationship: Vec<RelationshipClause>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Box<Expression>>,
    #[serde(rename = "return", default, skip_serializing_if = "Option::is_none")]
    pub return_clause: Option<ReturnClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortClause>,
}

impl Query {
    pub fn new(source: Vec<AliasedQuerySource>) -> Self {
        Self {
            element: Element::default(),
            source,
            let_clause: Vec::new(),
            relationship: Vec::new(),
            where_clause: None,
            return_clause: None,
            aggregate: None,
            sort: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasedQuerySource {
    pub expression: Box<Expression>,
    pub alias: String,
}

impl AliasedQuerySource {
    pub fn new(alias: impl Into<String>, expression: Expression) -> Self {
        Self {
            expression: Box::new(expression),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetClause {
    pub identifier: String,
    pub expression: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    With,
    Without,
}

/// `with`/`without` clause: keeps (or drops) a row when some related item
/// satisfies `such_that`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipClause {
    pub kind: RelationshipKind,
    pub expression: Box<Expression>,
    pub alias: String,
    pub such_that: Box<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnClause {
    pub expression: Box<Expression>,
    /// Return clauses deduplicate unless told otherwise
    #[serde(default = "default_true")]
    pub distinct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateClause {
    pub identifier: String,
    pub expression: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting: Option<Box<Expression>>,
    #[serde(default)]
    pub distinct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortClause {
    pub by: Vec<SortByItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SortByItem {
    /// Sort by the row value itself
    ByDirection { direction: SortDirection },
    /// Sort by a property of each row
    ByColumn { path: String, direction: SortDirection },
    /// Sort by an expression evaluated with the row bound as `$this`
    ByExpression {
        expression: Box<Expression>,
        direction: SortDirection,
    },
}

/// Clinical-data request; filtering is delegated to the data provider
/// registered for the data type's model namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retrieve {
    #[serde(flatten)]
    pub element: Element,
    /// Qualified type name, e.g. `{http://hl7.org/fhir}Condition`
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codes: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<Box<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Retrieve {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            element: Element::default(),
            data_type: data_type.into(),
            template_id: None,
            code_property: None,
            codes: None,
            date_property: None,
            date_range: None,
            context: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Type specifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypeSpecifier {
    #[serde(rename = "NamedTypeSpecifier")]
    Named { name: String },
    #[serde(rename = "ListTypeSpecifier")]
    List { element_type: Box<TypeSpecifier> },
    #[serde(rename = "IntervalTypeSpecifier")]
    Interval { point_type: Box<TypeSpecifier> },
    #[serde(rename = "TupleTypeSpecifier")]
    Tuple { elements: Vec<(String, TypeSpecifier)> },
    #[serde(rename = "ChoiceTypeSpecifier")]
    Choice { choices: Vec<TypeSpecifier> },
}

impl TypeSpecifier {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    pub fn to_cql_type(&self) -> CqlType {
        match self {
            Self::Named { name } => CqlType::from_name(name),
            Self::List { element_type } => CqlType::list(element_type.to_cql_type()),
            Self::Interval { point_type } => CqlType::interval(point_type.to_cql_type()),
            Self::Tuple { elements } => CqlType::Tuple(
                elements
                    .iter()
                    .map(|(name, spec)| TupleTypeElement {
                        name: name.clone(),
                        element_type: spec.to_cql_type(),
                    })
                    .collect(),
            ),
            Self::Choice { choices } => {
                CqlType::Choice(choices.iter().map(TypeSpecifier::to_cql_type).collect())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

fn system_type(name: &str) -> String {
    format!("{{{SYSTEM_NAMESPACE_URI}}}{name}")
}

impl Expression {
    pub fn null() -> Self {
        Self::Null(NullLiteral::default())
    }

    /// Literal of a system type, e.g. `literal("Integer", "5")`
    pub fn literal(type_name: &str, value: impl Into<String>) -> Self {
        Self::Literal(Literal {
            element: Element::default(),
            value_type: system_type(type_name),
            value: Some(value.into()),
        })
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal("Boolean", value.to_string())
    }

    pub fn integer(value: i32) -> Self {
        Self::literal("Integer", value.to_string())
    }

    pub fn long(value: i64) -> Self {
        Self::literal("Long", value.to_string())
    }

    pub fn decimal(value: &str) -> Self {
        Self::literal("Decimal", value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal("String", value)
    }

    pub fn date(value: &str) -> Self {
        Self::literal("Date", value)
    }

    pub fn datetime(value: &str) -> Self {
        Self::literal("DateTime", value)
    }

    pub fn time(value: &str) -> Self {
        Self::literal("Time", value)
    }

    pub fn quantity(value: Decimal, unit: impl Into<String>) -> Self {
        Self::Quantity(QuantityLiteral {
            element: Element::default(),
            value,
            unit: Some(unit.into()),
        })
    }

    pub fn list(elements: Vec<Expression>) -> Self {
        Self::List(ListSelector {
            element: Element::default(),
            type_specifier: None,
            elements,
        })
    }

    pub fn interval(low: Expression, low_closed: bool, high: Expression, high_closed: bool) -> Self {
        Self::Interval(IntervalSelector {
            element: Element::default(),
            low: Some(Box::new(low)),
            low_closed,
            high: Some(Box::new(high)),
            high_closed,
        })
    }

    pub fn tuple(elements: Vec<(&str, Expression)>) -> Self {
        Self::Tuple(TupleSelector {
            element: Element::default(),
            elements: elements
                .into_iter()
                .map(|(name, value)| TupleElementExpression {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        })
    }

    pub fn expression_ref(name: impl Into<String>, library_name: Option<&str>) -> Self {
        Self::ExpressionRef(ExpressionRef {
            element: Element::default(),
            name: name.into(),
            library_name: library_name.map(str::to_string),
        })
    }

    pub fn parameter_ref(name: impl Into<String>) -> Self {
        Self::ParameterRef(ParameterRef {
            element: Element::default(),
            name: name.into(),
            library_name: None,
        })
    }

    pub fn alias_ref(name: impl Into<String>) -> Self {
        Self::AliasRef(NameRef {
            element: Element::default(),
            name: name.into(),
        })
    }

    pub fn let_ref(name: impl Into<String>) -> Self {
        Self::QueryLetRef(NameRef {
            element: Element::default(),
            name: name.into(),
        })
    }

    pub fn operand_ref(name: impl Into<String>) -> Self {
        Self::OperandRef(NameRef {
            element: Element::default(),
            name: name.into(),
        })
    }

    pub fn property(source: Expression, path: impl Into<String>) -> Self {
        Self::Property(Property {
            element: Element::default(),
            source: Some(Box::new(source)),
            path: path.into(),
            scope: None,
        })
    }

    /// Attach a source locator to this node
    pub fn located(mut self, locator: impl Into<String>) -> Self {
        self.element_mut().locator = Some(locator.into());
        self
    }

    pub fn locator(&self) -> Option<&str> {
        self.element().locator.as_deref()
    }
}

macro_rules! unary_constructor {
    ($($fn_name:ident => $variant:ident),* $(,)?) => {
        impl Expression {
            $(
                pub fn $fn_name(operand: Expression) -> Self {
                    Self::$variant(UnaryExpression::new(operand))
                }
            )*
        }
    };
}

macro_rules! binary_constructor {
    ($($fn_name:ident => $variant:ident),* $(,)?) => {
        impl Expression {
            $(
                pub fn $fn_name(left: Expression, right: Expression) -> Self {
                    Self::$variant(BinaryExpression::new(left, right))
                }
            )*
        }
    };
}

unary_constructor! {
    not => Not,
    is_null => IsNull,
    exists => Exists,
    negate => Negate,
    to_string_of => ToString,
}

binary_constructor! {
    and => And,
    or => Or,
    equal => Equal,
    equivalent => Equivalent,
    less => Less,
    greater => Greater,
    add => Add,
    subtract => Subtract,
    multiply => Multiply,
    divide => Divide,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_names_the_variant() {
        let expr = Expression::add(Expression::integer(1), Expression::integer(2));
        assert_eq!(expr.kind(), "Add");
        assert_eq!(Expression::null().kind(), "Null");
    }

    #[test]
    fn located_sets_locator() {
        let expr = Expression::integer(1).located("3:5-3:6");
        assert_eq!(expr.locator(), Some("3:5-3:6"));
    }

    #[test]
    fn literal_uses_system_namespace() {
        let Expression::Literal(lit) = Expression::integer(7) else {
            panic!("expected literal");
        };
        assert_eq!(lit.value_type, "{urn:hl7-org:elm-types:r1}Integer");
        assert_eq!(lit.value.as_deref(), Some("7"));
    }

    #[test]
    fn deserializes_tagged_tree() {
        let json = r#"{
            "type": "Add",
            "locator": "1:1-1:5",
            "operand": [
                {"type": "Literal", "valueType": "{urn:hl7-org:elm-types:r1}Integer", "value": "1"},
                {"type": "Null"}
            ]
        }"#;
        let expr: Expression = serde_json::from_str(json).expect("valid tree");
        assert_eq!(expr.kind(), "Add");
        assert_eq!(expr.locator(), Some("1:1-1:5"));
        let Expression::Add(bin) = expr else {
            panic!("expected Add");
        };
        assert_eq!(bin.right().kind(), "Null");
    }

    #[test]
    fn interval_selector_defaults_to_closed() {
        let json = r#"{"type": "Interval", "low": {"type": "Null"}}"#;
        let Expression::Interval(sel) = serde_json::from_str(json).expect("valid tree") else {
            panic!("expected Interval");
        };
        assert!(sel.low_closed && sel.high_closed);
        assert!(sel.high.is_none());
    }
}
