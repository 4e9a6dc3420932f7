//! Library structure: the unit of evaluation
//!
//! A library names its expression and function definitions, parameters,
//! terminology declarations and the other libraries it includes. Lookups
//! are linear; libraries are small and lookups are cached by the engine.

use crate::expression::{DefinitionRef, Expression, TypeSpecifier};
use serde::{Deserialize, Serialize};

// ============================================================================
// Library Structure
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub identifier: VersionedIdentifier,
    #[serde(default)]
    pub usings: Definitions<UsingDef>,
    #[serde(default)]
    pub includes: Definitions<IncludeDef>,
    #[serde(default)]
    pub parameters: Definitions<ParameterDef>,
    #[serde(default)]
    pub code_systems: Definitions<CodeSystemDef>,
    #[serde(default)]
    pub value_sets: Definitions<ValueSetDef>,
    #[serde(default)]
    pub codes: Definitions<CodeDef>,
    #[serde(default)]
    pub concepts: Definitions<ConceptDef>,
    #[serde(default)]
    pub statements: Definitions<ExpressionDef>,
    #[serde(default)]
    pub functions: Definitions<FunctionDef>,
}

impl Library {
    pub fn new(id: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            identifier: VersionedIdentifier::new(id, version),
            usings: Definitions::default(),
            includes: Definitions::default(),
            parameters: Definitions::default(),
            code_systems: Definitions::default(),
            value_sets: Definitions::default(),
            codes: Definitions::default(),
            concepts: Definitions::default(),
            statements: Definitions::default(),
            functions: Definitions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.identifier.id
    }

    pub fn version(&self) -> Option<&str> {
        self.identifier.version.as_deref()
    }

    pub fn expression_def(&self, name: &str) -> Option<&ExpressionDef> {
        self.statements.find(|def| def.name == name)
    }

    /// First overload of `name` taking `arity` operands
    pub fn function_def(&self, name: &str, arity: usize) -> Option<&FunctionDef> {
        self.functions
            .find(|def| def.name == name && def.operand.len() == arity)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.find(|def| def.name == name)
    }

    /// Include declared under the local alias `local_identifier`
    pub fn include(&self, local_identifier: &str) -> Option<&IncludeDef> {
        self.includes
            .find(|def| def.local_identifier == local_identifier)
    }

    pub fn code_system(&self, name: &str) -> Option<&CodeSystemDef> {
        self.code_systems.find(|def| def.name == name)
    }

    pub fn value_set(&self, name: &str) -> Option<&ValueSetDef> {
        self.value_sets.find(|def| def.name == name)
    }

    pub fn code_def(&self, name: &str) -> Option<&CodeDef> {
        self.codes.find(|def| def.name == name)
    }

    pub fn concept_def(&self, name: &str) -> Option<&ConceptDef> {
        self.concepts.find(|def| def.name == name)
    }

    /// Model URI declared for the local model name, e.g. `FHIR`
    pub fn using_uri(&self, local_identifier: &str) -> Option<&str> {
        self.usings
            .find(|def| def.local_identifier == local_identifier)
            .map(|def| def.uri.as_str())
    }

    // Builder helpers used when assembling libraries in code

    pub fn with_expression(mut self, name: impl Into<String>, expression: Expression) -> Self {
        self.statements.defs.push(ExpressionDef::new(name, expression));
        self
    }

    pub fn with_function(mut self, def: FunctionDef) -> Self {
        self.functions.defs.push(def);
        self
    }

    pub fn with_parameter(mut self, def: ParameterDef) -> Self {
        self.parameters.defs.push(def);
        self
    }

    pub fn with_include(mut self, local_identifier: &str, path: &str, version: Option<&str>) -> Self {
        self.includes.defs.push(IncludeDef {
            local_identifier: local_identifier.to_string(),
            path: path.to_string(),
            version: version.map(str::to_string),
        });
        self
    }

    pub fn with_code_system(mut self, name: &str, id: &str, version: Option<&str>) -> Self {
        self.code_systems.defs.push(CodeSystemDef {
            name: name.to_string(),
            id: id.to_string(),
            version: version.map(str::to_string),
            access_level: AccessModifier::Public,
        });
        self
    }

    pub fn with_value_set(mut self, name: &str, id: &str) -> Self {
        self.value_sets.defs.push(ValueSetDef {
            name: name.to_string(),
            id: id.to_string(),
            version: None,
            access_level: AccessModifier::Public,
            code_system: Vec::new(),
        });
        self
    }

    pub fn with_code(mut self, name: &str, id: &str, code_system: &str, display: Option<&str>) -> Self {
        self.codes.defs.push(CodeDef {
            name: name.to_string(),
            id: id.to_string(),
            display: display.map(str::to_string),
            access_level: AccessModifier::Public,
            code_system: DefinitionRef::named(code_system),
        });
        self
    }

    pub fn with_using(mut self, local_identifier: &str, uri: &str) -> Self {
        self.usings.defs.push(UsingDef {
            local_identifier: local_identifier.to_string(),
            uri: uri.to_string(),
            version: None,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedIdentifier {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl VersionedIdentifier {
    pub fn new(id: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            id: id.into(),
            system: None,
            version: version.map(str::to_string),
        }
    }
}

impl std::fmt::Display for VersionedIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}|{}", self.id, version),
            None => f.write_str(&self.id),
        }
    }
}

// ============================================================================
// Definition Containers
// ============================================================================

/// `{"def": [...]}` wrapper used by every definition list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definitions<T> {
    #[serde(rename = "def", default = "Vec::new")]
    pub defs: Vec<T>,
}

impl<T> Default for Definitions<T> {
    fn default() -> Self {
        Self { defs: Vec::new() }
    }
}

impl<T> Definitions<T> {
    fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.defs.iter().find(|def| predicate(def))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

// ============================================================================
// Definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessModifier {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsingDef {
    pub local_identifier: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeDef {
    pub local_identifier: String,
    /// Included library's name
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl IncludeDef {
    pub fn identifier(&self) -> VersionedIdentifier {
        VersionedIdentifier::new(self.path.clone(), self.version.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDef {
    pub name: String,
    #[serde(default)]
    pub access_level: AccessModifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_type_specifier: Option<TypeSpecifier>,
    /// Used when the caller supplies no value for the parameter
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_expr: Option<Box<Expression>>,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, default_expr: Option<Expression>) -> Self {
        Self {
            name: name.into(),
            access_level: AccessModifier::Public,
            parameter_type_specifier: None,
            default_expr: default_expr.map(Box::new),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystemDef {
    pub name: String,
    /// Code system URI
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub access_level: AccessModifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetDef {
    pub name: String,
    /// Value set URI
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub access_level: AccessModifier,
    #[serde(default)]
    pub code_system: Vec<DefinitionRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDef {
    pub name: String,
    /// The code itself
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default)]
    pub access_level: AccessModifier,
    pub code_system: DefinitionRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default)]
    pub access_level: AccessModifier,
    pub code: Vec<DefinitionRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub access_level: AccessModifier,
    pub expression: Box<Expression>,
}

impl ExpressionDef {
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        Self {
            name: name.into(),
            context: None,
            access_level: AccessModifier::Public,
            expression: Box::new(expression),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperandDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand_type_specifier: Option<TypeSpecifier>,
}

/// User-defined function; `expression` is absent for external functions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub access_level: AccessModifier,
    #[serde(default)]
    pub operand: Vec<OperandDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Box<Expression>>,
    #[serde(default)]
    pub external: bool,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, operands: &[&str], body: Expression) -> Self {
        Self {
            name: name.into(),
            context: None,
            access_level: AccessModifier::Public,
            operand: operands
                .iter()
                .map(|name| OperandDef {
                    name: (*name).to_string(),
                    operand_type_specifier: None,
                })
                .collect(),
            expression: Some(Box::new(body)),
            external: false,
        }
    }
}
