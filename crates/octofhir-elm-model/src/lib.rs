//! ELM expression trees and library definitions
//!
//! The model is purely structural: it is produced by a translator (or
//! deserialized from ELM JSON) and consumed by the evaluation engine.

pub mod expression;
pub mod library;

pub use expression::{Element, Expression, TypeSpecifier};
pub use library::{
    AccessModifier, CodeDef, CodeSystemDef, ConceptDef, ExpressionDef, FunctionDef, IncludeDef,
    Library, OperandDef, ParameterDef, ValueSetDef, VersionedIdentifier,
};
