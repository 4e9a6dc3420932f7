//! Collaborators supplied by the embedding application
//!
//! The engine never fetches anything itself. Clinical records come from a
//! [`DataProvider`] registered under a model namespace URI, other libraries
//! from a [`LibraryResolver`], and value set membership from an optional
//! [`TerminologyProvider`]. All three are `Send + Sync` so a single instance
//! can be shared through `Arc` by every context of a multi-threaded host.
//!
//! In-memory implementations of the first two are provided for embedding
//! and testing.

use crate::error::{DataAccessError, LibraryResolutionError, TerminologyError};
use crate::operators::interval::{interval_overlaps, point_in};
use octofhir_elm_model::Library;
use octofhir_elm_types::{CqlCode, CqlInterval, CqlList, CqlValue, equivalent};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// Requests
// ============================================================================

/// A code system or value set, by URI and optional version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VocabularyRef {
    pub id: String,
    pub version: Option<String>,
}

impl VocabularyRef {
    pub fn new(id: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            id: id.into(),
            version: version.map(str::to_string),
        }
    }
}

/// Terminology restriction on a retrieve
#[derive(Debug, Clone, PartialEq)]
pub enum CodeFilter {
    /// Keep records whose code property matches one of these codes
    Codes(Vec<CqlCode>),
    /// Keep records whose code property is in the value set
    ValueSet(VocabularyRef),
}

/// Subject a run is scoped to, e.g. `Patient` plus the patient record
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveContext {
    pub name: String,
    pub value: CqlValue,
}

/// Everything a data provider needs to answer one `Retrieve` node
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveRequest {
    /// Model namespace the data type belongs to
    pub model_uri: String,
    /// Unqualified type name, e.g. `Condition`
    pub data_type: String,
    pub template_id: Option<String>,
    pub context: Option<RetrieveContext>,
    pub code_property: Option<String>,
    pub codes: Option<CodeFilter>,
    pub date_property: Option<String>,
    pub date_range: Option<CqlInterval>,
}

impl RetrieveRequest {
    pub fn new(model_uri: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            model_uri: model_uri.into(),
            data_type: data_type.into(),
            template_id: None,
            context: None,
            code_property: None,
            codes: None,
            date_property: None,
            date_range: None,
        }
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Source of clinical records for one data model
pub trait DataProvider: Send + Sync {
    /// Records matching the request; an empty list when nothing matches
    fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<CqlValue>, DataAccessError>;

    /// Read `path` from a record produced by this provider.
    ///
    /// `None` means the provider does not know the path, in which case the
    /// engine reads Tuple fields itself.
    fn property(&self, value: &CqlValue, path: &str) -> Option<CqlValue> {
        value.as_tuple().and_then(|tuple| tuple.get(path)).cloned()
    }
}

/// Source of libraries referenced through `include` declarations
pub trait LibraryResolver: Send + Sync {
    fn resolve(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Arc<Library>, LibraryResolutionError>;
}

/// Terminology service used by `InValueSet`, `InCodeSystem` and value set
/// filtered retrieves
pub trait TerminologyProvider: Send + Sync {
    fn in_value_set(
        &self,
        code: &CqlCode,
        value_set: &VocabularyRef,
    ) -> Result<bool, TerminologyError>;

    fn in_code_system(
        &self,
        code: &CqlCode,
        code_system: &VocabularyRef,
    ) -> Result<bool, TerminologyError>;

    fn expand_value_set(&self, value_set: &VocabularyRef) -> Result<Vec<CqlCode>, TerminologyError>;
}

// ============================================================================
// In-memory library resolver
// ============================================================================

/// Libraries registered up front, looked up by name and version
#[derive(Default)]
pub struct InMemoryLibraryResolver {
    libraries: RwLock<HashMap<String, Vec<Arc<Library>>>>,
}

impl InMemoryLibraryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(self, library: Library) -> Self {
        self.register(library);
        self
    }

    pub fn register(&self, library: Library) {
        self.libraries
            .write()
            .entry(library.name().to_string())
            .or_default()
            .push(Arc::new(library));
    }

    pub fn len(&self) -> usize {
        self.libraries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LibraryResolver for InMemoryLibraryResolver {
    /// Without a version the most recently registered library wins
    fn resolve(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Arc<Library>, LibraryResolutionError> {
        let libraries = self.libraries.read();
        let candidates = libraries
            .get(name)
            .ok_or_else(|| LibraryResolutionError::not_found(name, version))?;
        let found = match version {
            Some(version) => candidates.iter().rev().find(|lib| lib.version() == Some(version)),
            None => candidates.last(),
        };
        found
            .cloned()
            .ok_or_else(|| LibraryResolutionError::not_found(name, version))
    }
}

// ============================================================================
// In-memory data provider
// ============================================================================

/// Records held in memory, keyed by unqualified type name.
///
/// Records are expected to be Tuples. Code filters match the record's
/// code property by equivalence (a Code, a Concept, or a list of either);
/// date filters keep records whose date property falls in, or overlaps,
/// the requested range. Value set filters are not supported here: run
/// with a terminology provider so the engine expands them first.
#[derive(Default)]
pub struct InMemoryDataProvider {
    records: RwLock<HashMap<String, Vec<CqlValue>>>,
}

impl InMemoryDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, data_type: &str, records: Vec<CqlValue>) -> Self {
        self.records
            .write()
            .entry(data_type.to_string())
            .or_default()
            .extend(records);
        self
    }

    pub fn insert(&self, data_type: &str, record: CqlValue) {
        self.records
            .write()
            .entry(data_type.to_string())
            .or_default()
            .push(record);
    }

    fn matches(&self, record: &CqlValue, request: &RetrieveRequest) -> Result<bool, DataAccessError> {
        if let (Some(path), Some(filter)) = (&request.code_property, &request.codes) {
            let codes = match filter {
                CodeFilter::Codes(codes) => codes,
                CodeFilter::ValueSet(value_set) => {
                    return Err(DataAccessError::new(
                        &request.data_type,
                        format!("value set filter '{}' needs a terminology provider", value_set.id),
                    ));
                }
            };
            let field = self.property(record, path).unwrap_or(CqlValue::Null);
            if !codes_match(&field, codes) {
                return Ok(false);
            }
        }

        if let (Some(path), Some(range)) = (&request.date_property, &request.date_range) {
            let field = self.property(record, path).unwrap_or(CqlValue::Null);
            let inside = match &field {
                CqlValue::Null => Ok(Some(false)),
                CqlValue::Interval(period) => interval_overlaps(period, range),
                point => point_in(point, range),
            }
            .map_err(|e| DataAccessError::new(&request.data_type, e.to_string()))?;
            if inside != Some(true) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

fn codes_match(field: &CqlValue, codes: &[CqlCode]) -> bool {
    match field {
        CqlValue::List(list) => list.iter().any(|item| codes_match(item, codes)),
        CqlValue::Code(_) | CqlValue::Concept(_) => codes
            .iter()
            .any(|code| equivalent(field, &CqlValue::Code(code.clone()))),
        _ => false,
    }
}

impl DataProvider for InMemoryDataProvider {
    fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<CqlValue>, DataAccessError> {
        let records = self.records.read();
        let Some(candidates) = records.get(&request.data_type) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for record in candidates {
            if self.matches(record, request)? {
                found.push(record.clone());
            }
        }
        Ok(found)
    }
}

// ============================================================================
// JSON records
// ============================================================================

/// Convert a JSON document into a value: objects become Tuples, arrays
/// Lists, and numbers the narrowest of Integer, Long and Decimal.
///
/// Strings stay Strings; the provider is responsible for typing dates.
pub fn json_to_value(json: &serde_json::Value) -> CqlValue {
    use serde_json::Value as Json;

    match json {
        Json::Null => CqlValue::Null,
        Json::Bool(b) => CqlValue::Boolean(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                i32::try_from(i).map_or(CqlValue::Long(i), CqlValue::Integer)
            } else {
                Decimal::from_str(&n.to_string())
                    .or_else(|_| Decimal::from_scientific(&n.to_string()))
                    .map_or(CqlValue::Null, CqlValue::Decimal)
            }
        }
        Json::String(s) => CqlValue::String(s.clone()),
        Json::Array(items) => CqlValue::List(CqlList::from_values(
            items.iter().map(json_to_value).collect(),
        )),
        Json::Object(fields) => {
            CqlValue::tuple(fields.iter().map(|(name, value)| (name.clone(), json_to_value(value))))
        }
    }
}
