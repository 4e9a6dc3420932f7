//! Type descriptors for runtime values
//!
//! Every non-null value reports a [`CqlType`]. The evaluator uses these
//! descriptors for `Is`/`As` checks, for the declared element type of lists
//! and for the point type of intervals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace prefix used by translated trees for system types
pub const SYSTEM_NAMESPACE_URI: &str = "urn:hl7-org:elm-types:r1";

/// A type in the expression language's type system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CqlType {
    /// Supertype of all types, also the type reported for Null
    Any,
    Boolean,
    Integer,
    Long,
    Decimal,
    String,
    Date,
    DateTime,
    Time,
    Quantity,
    Ratio,
    Code,
    Concept,
    #[serde(rename = "List")]
    List(Box<CqlType>),
    #[serde(rename = "Interval")]
    Interval(Box<CqlType>),
    #[serde(rename = "Tuple")]
    Tuple(Vec<TupleTypeElement>),
    #[serde(rename = "Choice")]
    Choice(Vec<CqlType>),
    /// Model type such as `FHIR.Observation`
    #[serde(rename = "NamedType")]
    Named {
        namespace: Option<String>,
        name: String,
    },
}

/// A named element of a tuple type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleTypeElement {
    pub name: String,
    pub element_type: CqlType,
}

impl CqlType {
    pub fn list(element_type: CqlType) -> Self {
        Self::List(Box::new(element_type))
    }

    pub fn interval(point_type: CqlType) -> Self {
        Self::Interval(Box::new(point_type))
    }

    pub fn named(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self::Named {
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }

    /// Resolve a type name as written in a translated tree.
    ///
    /// Accepts bare names (`Integer`), dotted names (`System.Integer`,
    /// `FHIR.Patient`) and qualified names (`{urn:hl7-org:elm-types:r1}Integer`).
    /// Anything that is not a system type becomes [`CqlType::Named`].
    pub fn from_name(raw: &str) -> Self {
        let (namespace, local) = split_qualified(raw);
        let is_system = matches!(namespace, None | Some("System" | SYSTEM_NAMESPACE_URI));

        if is_system {
            if let Some(system) = Self::system_type(local) {
                return system;
            }
        }

        Self::Named {
            namespace: namespace.map(str::to_string),
            name: local.to_string(),
        }
    }

    fn system_type(local: &str) -> Option<Self> {
        let ty = match local {
            "Any" => Self::Any,
            "Boolean" => Self::Boolean,
            "Integer" => Self::Integer,
            "Long" => Self::Long,
            "Decimal" => Self::Decimal,
            "String" => Self::String,
            "Date" => Self::Date,
            "DateTime" => Self::DateTime,
            "Time" => Self::Time,
            "Quantity" => Self::Quantity,
            "Ratio" => Self::Ratio,
            "Code" => Self::Code,
            "Concept" => Self::Concept,
            _ => return None,
        };
        Some(ty)
    }

    /// Short name, e.g. `Integer` or `List<Integer>`
    pub fn name(&self) -> String {
        match self {
            Self::Any => "Any".into(),
            Self::Boolean => "Boolean".into(),
            Self::Integer => "Integer".into(),
            Self::Long => "Long".into(),
            Self::Decimal => "Decimal".into(),
            Self::String => "String".into(),
            Self::Date => "Date".into(),
            Self::DateTime => "DateTime".into(),
            Self::Time => "Time".into(),
            Self::Quantity => "Quantity".into(),
            Self::Ratio => "Ratio".into(),
            Self::Code => "Code".into(),
            Self::Concept => "Concept".into(),
            Self::List(inner) => format!("List<{}>", inner.name()),
            Self::Interval(inner) => format!("Interval<{}>", inner.name()),
            Self::Tuple(elements) => {
                let fields: Vec<String> = elements
                    .iter()
                    .map(|e| format!("{} {}", e.name, e.element_type.name()))
                    .collect();
                format!("Tuple {{ {} }}", fields.join(", "))
            }
            Self::Choice(types) => {
                let names: Vec<String> = types.iter().map(Self::name).collect();
                format!("Choice<{}>", names.join(", "))
            }
            Self::Named { name, .. } => name.clone(),
        }
    }

    /// Name including the model namespace, e.g. `System.Integer` or `FHIR.Patient`
    pub fn qualified_name(&self) -> String {
        match self {
            Self::Named {
                namespace: Some(ns),
                name,
            } => format!("{ns}.{name}"),
            Self::Named { name, .. } => name.clone(),
            Self::List(_) | Self::Interval(_) | Self::Tuple(_) | Self::Choice(_) => self.name(),
            _ => format!("System.{}", self.name()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Decimal)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }

    /// Element type for lists, point type for intervals
    pub fn inner(&self) -> Option<&CqlType> {
        match self {
            Self::List(inner) | Self::Interval(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether a value of type `self` may be used where `other` is expected.
    ///
    /// Lists and intervals are covariant. A choice is satisfied if any of its
    /// alternatives is. Named types match on name, and on namespace when both
    /// sides carry one.
    pub fn is_subtype_of(&self, other: &CqlType) -> bool {
        match (self, other) {
            (_, Self::Any) => true,
            (Self::Any, _) => false,
            (Self::List(a), Self::List(b)) | (Self::Interval(a), Self::Interval(b)) => {
                a.is_subtype_of(b)
            }
            (_, Self::Choice(options)) => options.iter().any(|o| self.is_subtype_of(o)),
            (Self::Choice(options), _) => options.iter().all(|o| o.is_subtype_of(other)),
            (
                Self::Named {
                    namespace: ns_a,
                    name: a,
                },
                Self::Named {
                    namespace: ns_b,
                    name: b,
                },
            ) => a == b && (ns_a.is_none() || ns_b.is_none() || ns_a == ns_b),
            (Self::Tuple(a), Self::Tuple(b)) => b.iter().all(|expected| {
                a.iter().any(|actual| {
                    actual.name == expected.name
                        && actual.element_type.is_subtype_of(&expected.element_type)
                })
            }),
            _ => self == other,
        }
    }
}

/// Split `{uri}Local` or `Namespace.Local` into its parts
fn split_qualified(raw: &str) -> (Option<&str>, &str) {
    if let Some(rest) = raw.strip_prefix('{') {
        if let Some((uri, local)) = rest.split_once('}') {
            return (Some(uri), local);
        }
    }
    match raw.rsplit_once('.') {
        Some((ns, local)) => (Some(ns), local),
        None => (None, raw),
    }
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
