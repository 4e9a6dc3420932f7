//! Evaluation context for ELM execution
//!
//! One context serves one evaluation run. It owns every piece of mutable
//! state the evaluator needs: the scope stack, the active library, the
//! definition and library caches and the recursion counter. Collaborators
//! and parameter bindings are fixed when the context is built and are
//! validated once, up front.

use crate::config::EvaluationOptions;
use crate::error::{ConfigError, EvalError, EvalResult};
use crate::provider::{DataProvider, LibraryResolver, TerminologyProvider};
use chrono::{Duration, Utc};
use log::{debug, trace};
use octofhir_elm_model::{Expression, Library};
use octofhir_elm_types::{CqlDate, CqlDateTime, CqlTime, CqlValue};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Scopes
// ============================================================================

/// Element under consideration in Filter, ForEach, Repeat, Aggregate and
/// expression sorts
pub const THIS: &str = "$this";
/// Zero-based position of `$this` in its source
pub const INDEX: &str = "$index";
/// Running value of an Aggregate fold
pub const TOTAL: &str = "$total";

/// What a scoped name is bound to
#[derive(Debug, Clone)]
pub enum Binding {
    Value(CqlValue),
    /// Let clause not evaluated yet
    Deferred(Arc<Expression>),
    /// Let clause currently being evaluated; seeing it again is a cycle
    Evaluating,
}

/// One lexical frame: query aliases, lets, function operands or iteration
/// variables
#[derive(Debug, Clone, Default)]
pub struct Scope {
    entries: SmallVec<[(String, Binding); 4]>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: CqlValue) -> Self {
        self.bind(name, value);
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, value: CqlValue) {
        self.set(name.into(), Binding::Value(value));
    }

    pub fn defer(&mut self, name: impl Into<String>, expression: Arc<Expression>) {
        self.set(name.into(), Binding::Deferred(expression));
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, binding)| binding)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn set(&mut self, name: String, binding: Binding) {
        match self.entries.iter_mut().find(|(entry, _)| *entry == name) {
            Some((_, slot)) => *slot = binding,
            None => self.entries.push((name, binding)),
        }
    }
}

/// Result of looking a name up in the scope stack
#[derive(Debug, Clone)]
pub enum ScopedName {
    Value(CqlValue),
    /// Unevaluated let in frame `frame`
    Deferred {
        frame: usize,
        expression: Arc<Expression>,
    },
    Evaluating,
}

// ============================================================================
// Caches
// ============================================================================

/// Cached state of a named definition
#[derive(Debug, Clone)]
pub enum CacheState {
    InProgress,
    Resolved(CqlValue),
}

/// `(library name, library version, definition name)`
pub type ExpressionKey = (String, Option<String>, String);

type LibraryKey = (String, Option<String>);

// ============================================================================
// Configuration
// ============================================================================

/// Everything a context is built from
#[derive(Clone)]
pub struct ContextConfig {
    /// Library whose definitions are evaluated
    pub library: Arc<Library>,
    pub options: EvaluationOptions,
    /// Bindings for the active library's parameters; parameters of an
    /// included library are keyed `LibraryName.ParameterName`
    pub parameters: HashMap<String, CqlValue>,
    /// Data providers keyed by model namespace URI
    pub data_providers: HashMap<String, Arc<dyn DataProvider>>,
    pub library_resolver: Option<Arc<dyn LibraryResolver>>,
    pub terminology: Option<Arc<dyn TerminologyProvider>>,
    /// Record the run is scoped to, e.g. the patient
    pub context_value: Option<CqlValue>,
}

impl ContextConfig {
    pub fn new(library: impl Into<Arc<Library>>) -> Self {
        Self {
            library: library.into(),
            options: EvaluationOptions::default(),
            parameters: HashMap::new(),
            data_providers: HashMap::new(),
            library_resolver: None,
            terminology: None,
            context_value: None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;
        if self.data_providers.keys().any(|uri| uri.trim().is_empty()) {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.parameters.keys().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::EmptyParameterName);
        }
        Ok(())
    }
}

// ============================================================================
// Context
// ============================================================================

/// Mutable state of one evaluation run
pub struct EvaluationContext {
    root: Arc<Library>,
    library: Arc<Library>,
    options: EvaluationOptions,
    parameters: HashMap<String, CqlValue>,
    data_providers: HashMap<String, Arc<dyn DataProvider>>,
    library_resolver: Option<Arc<dyn LibraryResolver>>,
    terminology: Option<Arc<dyn TerminologyProvider>>,
    context_value: Option<CqlValue>,
    now: CqlDateTime,
    timezone_offset: i16,
    scopes: Vec<Scope>,
    expression_cache: HashMap<ExpressionKey, CacheState>,
    library_cache: HashMap<LibraryKey, Arc<Library>>,
    depth: usize,
}

impl EvaluationContext {
    /// Validate `config` and capture the evaluation timestamp
    pub fn new(config: ContextConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ContextConfig {
            library,
            options,
            parameters,
            data_providers,
            library_resolver,
            terminology,
            context_value,
        } = config;

        let timezone_offset = options.timezone_offset();
        let now = match &options.evaluation_timestamp {
            Some(text) => CqlDateTime::parse(text)
                .and_then(|dt| dt.or_inferred_offset(timezone_offset))
                .map_err(|_| ConfigError::InvalidTimestamp { value: text.clone() })?,
            None => {
                let local = Utc::now().naive_utc() + Duration::minutes(i64::from(timezone_offset));
                CqlDateTime::from_naive(local, timezone_offset).map_err(|_| {
                    ConfigError::InvalidTimezoneOffset {
                        minutes: timezone_offset,
                    }
                })?
            }
        };

        Ok(Self {
            root: Arc::clone(&library),
            library,
            options,
            parameters,
            data_providers,
            library_resolver,
            terminology,
            context_value,
            now,
            timezone_offset,
            scopes: Vec::new(),
            expression_cache: HashMap::new(),
            library_cache: HashMap::new(),
            depth: 0,
        })
    }

    pub fn builder(library: impl Into<Arc<Library>>) -> EvaluationContextBuilder {
        EvaluationContextBuilder::new(library)
    }

    // ------------------------------------------------------------------
    // Configuration accessors
    // ------------------------------------------------------------------

    /// Library whose definitions are currently being evaluated
    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    pub fn context_value(&self) -> Option<&CqlValue> {
        self.context_value.as_ref()
    }

    pub fn terminology(&self) -> Option<&Arc<dyn TerminologyProvider>> {
        self.terminology.as_ref()
    }

    pub fn data_provider(&self, model_uri: &str) -> Option<&Arc<dyn DataProvider>> {
        self.data_providers.get(model_uri)
    }

    /// The provider to use when a data type names no model; only defined
    /// when exactly one provider is registered
    pub fn sole_data_provider(&self) -> Option<(&str, &Arc<dyn DataProvider>)> {
        let mut providers = self.data_providers.iter();
        match (providers.next(), providers.next()) {
            (Some((uri, provider)), None) => Some((uri.as_str(), provider)),
            _ => None,
        }
    }

    pub fn data_providers(&self) -> impl Iterator<Item = &Arc<dyn DataProvider>> {
        self.data_providers.values()
    }

    /// Value bound by the caller for a parameter of the active library
    pub fn bound_parameter(&self, name: &str) -> Option<&CqlValue> {
        if Arc::ptr_eq(&self.library, &self.root) {
            self.parameters.get(name)
        } else {
            self.parameters
                .get(&format!("{}.{}", self.library.name(), name))
        }
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// Evaluation timestamp, fixed for the whole run
    pub fn now(&self) -> CqlDateTime {
        self.now
    }

    pub fn today(&self) -> CqlDate {
        self.now.date()
    }

    pub fn time_of_day(&self) -> CqlTime {
        self.now.time().unwrap_or_else(CqlTime::min_value)
    }

    /// Zone given to DateTime and Time values written without one
    pub fn timezone_offset(&self) -> i16 {
        self.timezone_offset
    }

    // ------------------------------------------------------------------
    // Scope stack
    // ------------------------------------------------------------------

    pub fn push_scope(&mut self, scope: Scope) {
        trace!("push scope #{} ({} names)", self.scopes.len(), scope.len());
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) -> Option<Scope> {
        let scope = self.scopes.pop();
        trace!("pop scope #{}", self.scopes.len());
        scope
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Run `f` with `scope` pushed; the scope is popped whatever `f` returns
    pub fn with_scope<R>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> R) -> R {
        let depth = self.scopes.len();
        self.push_scope(scope);
        let result = f(self);
        self.scopes.truncate(depth + 1);
        self.pop_scope();
        result
    }

    /// Innermost binding of `name`
    pub fn lookup(&self, name: &str) -> Option<ScopedName> {
        self.scopes.iter().enumerate().rev().find_map(|(frame, scope)| {
            scope.get(name).map(|binding| match binding {
                Binding::Value(value) => ScopedName::Value(value.clone()),
                Binding::Deferred(expression) => ScopedName::Deferred {
                    frame,
                    expression: Arc::clone(expression),
                },
                Binding::Evaluating => ScopedName::Evaluating,
            })
        })
    }

    /// Replace the binding of `name` in frame `frame`
    pub fn rebind(&mut self, frame: usize, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.get_mut(frame) {
            scope.set(name.to_string(), binding);
        }
    }

    /// Run `f` seeing only frames `0..=frame`; inner frames are restored
    /// afterwards
    pub fn with_frames<R>(&mut self, frame: usize, f: impl FnOnce(&mut Self) -> R) -> R {
        let keep = (frame + 1).min(self.scopes.len());
        let hidden = self.scopes.split_off(keep);
        let result = f(self);
        self.scopes.truncate(keep);
        self.scopes.extend(hidden);
        result
    }

    // ------------------------------------------------------------------
    // Libraries
    // ------------------------------------------------------------------

    /// Run `f` with `library` active and an empty scope stack, restoring the
    /// caller's library and scopes afterwards
    pub fn with_library<R>(&mut self, library: Arc<Library>, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved_library = std::mem::replace(&mut self.library, library);
        let saved_scopes = std::mem::take(&mut self.scopes);
        let result = f(self);
        self.library = saved_library;
        self.scopes = saved_scopes;
        result
    }

    /// Library included by the active library under `alias`.
    ///
    /// The resolver is consulted at most once per library and version.
    pub fn included_library(&mut self, alias: &str) -> EvalResult<Arc<Library>> {
        if alias == self.library.name() {
            return Ok(Arc::clone(&self.library));
        }
        let include = self
            .library
            .include(alias)
            .ok_or_else(|| EvalError::LibraryNotFound {
                name: alias.to_string(),
                message: format!("no include named '{alias}' in {}", self.library.identifier),
            })?;
        let key = (include.path.clone(), include.version.clone());

        if let Some(library) = self.library_cache.get(&key) {
            debug!("library cache hit for {}", include.identifier());
            return Ok(Arc::clone(library));
        }
        if key.0 == self.root.name() && (key.1.is_none() || key.1.as_deref() == self.root.version()) {
            return Ok(Arc::clone(&self.root));
        }

        let resolver = self
            .library_resolver
            .as_ref()
            .ok_or_else(|| EvalError::LibraryNotFound {
                name: key.0.clone(),
                message: "no library resolver is configured".to_string(),
            })?;
        debug!("resolving library {}", include.identifier());
        let library = resolver
            .resolve(&key.0, key.1.as_deref())
            .map_err(|e| EvalError::LibraryNotFound {
                name: key.0.clone(),
                message: e.to_string(),
            })?;
        self.library_cache.insert(key, Arc::clone(&library));
        Ok(library)
    }

    // ------------------------------------------------------------------
    // Definition cache
    // ------------------------------------------------------------------

    pub fn definition_key(&self, name: &str) -> ExpressionKey {
        (
            self.library.name().to_string(),
            self.library.version().map(str::to_string),
            name.to_string(),
        )
    }

    pub fn cache_state(&self, key: &ExpressionKey) -> Option<&CacheState> {
        self.expression_cache.get(key)
    }

    pub fn mark_in_progress(&mut self, key: ExpressionKey) {
        self.expression_cache.insert(key, CacheState::InProgress);
    }

    /// Record a finished definition; without result caching the in-progress
    /// marker is simply cleared
    pub fn complete(&mut self, key: ExpressionKey, value: &CqlValue) {
        if self.options.cache_expression_results {
            self.expression_cache
                .insert(key, CacheState::Resolved(value.clone()));
        } else {
            self.expression_cache.remove(&key);
        }
    }

    pub fn abandon(&mut self, key: &ExpressionKey) {
        self.expression_cache.remove(key);
    }

    // ------------------------------------------------------------------
    // Recursion
    // ------------------------------------------------------------------

    /// Count one more nested evaluation; false once the limit is reached
    pub fn enter_recursion(&mut self) -> bool {
        if self.depth >= self.options.max_recursion_depth {
            return false;
        }
        self.depth += 1;
        true
    }

    pub fn exit_recursion(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent assembly of a [`ContextConfig`]
pub struct EvaluationContextBuilder {
    config: ContextConfig,
}

impl EvaluationContextBuilder {
    pub fn new(library: impl Into<Arc<Library>>) -> Self {
        Self {
            config: ContextConfig::new(library),
        }
    }

    pub fn options(mut self, options: EvaluationOptions) -> Self {
        self.config.options = options;
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: CqlValue) -> Self {
        self.config.parameters.insert(name.into(), value);
        self
    }

    pub fn data_provider(mut self, model_uri: impl Into<String>, provider: Arc<dyn DataProvider>) -> Self {
        self.config.data_providers.insert(model_uri.into(), provider);
        self
    }

    pub fn library_resolver(mut self, resolver: Arc<dyn LibraryResolver>) -> Self {
        self.config.library_resolver = Some(resolver);
        self
    }

    pub fn terminology(mut self, provider: Arc<dyn TerminologyProvider>) -> Self {
        self.config.terminology = Some(provider);
        self
    }

    pub fn context_value(mut self, value: CqlValue) -> Self {
        self.config.context_value = Some(value);
        self
    }

    pub fn config(self) -> ContextConfig {
        self.config
    }

    pub fn build(self) -> Result<EvaluationContext, ConfigError> {
        EvaluationContext::new(self.config)
    }
}
