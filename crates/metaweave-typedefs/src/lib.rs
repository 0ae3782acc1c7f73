//! Metaweave type definition modules (`.typedefs`)
//!
//! The mapping engine never hard-codes the open-metadata type hierarchy. Types
//! are declared in a small line-oriented module format and parsed into a typed
//! AST here; the engine's `TypeRegistry` turns that AST into supertype
//! closures, stable type ids and relationship cardinality defaults.

pub mod digest;
pub mod typedefs_v1;

pub use typedefs_v1::{
    parse_typedefs_v1, ClassificationDefV1, EndDefV1, EndSelectorV1, EntityDefV1,
    RelationshipDefV1, TypeDefModuleV1, TypeDefParseError,
};
