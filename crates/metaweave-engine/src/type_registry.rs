//! Type registry: name/id resolution and subtype queries.
//!
//! Built once from a parsed `.typedefs` module. Subtype checks are answered
//! from a precomputed supertype closure, so `is_type_of` never walks the
//! chain at call time:
//!
//! ```text
//! EventType ──► ComplexSchemaType ──► SchemaType ──► SchemaElement ──► Referenceable ──► OpenMetadataRoot
//!
//! supertypes_of["EventType"] = { EventType, ComplexSchemaType, SchemaType,
//!                                SchemaElement, Referenceable, OpenMetadataRoot }
//! ```

use metaweave_typedefs::digest::{type_id_v1, typedefs_digest_v1};
use metaweave_typedefs::{parse_typedefs_v1, EndSelectorV1, TypeDefModuleV1};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, EngineResult};

const OPEN_METADATA_TYPEDEFS: &str = include_str!("../typedefs/open_metadata.typedefs");

// ============================================================================
// Definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCategory {
    Entity,
    Classification,
    Relationship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub type_id: String,
    pub name: String,
    pub category: TypeCategory,
    pub supertype: Option<String>,
    /// Entity types only: no existence independent of the attaching relationship.
    pub relationship_owned: bool,
}

/// One end of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum End {
    End1,
    End2,
}

impl End {
    pub fn opposite(self) -> End {
        match self {
            End::End1 => End::End2,
            End::End2 => End::End1,
        }
    }
}

impl From<EndSelectorV1> for End {
    fn from(selector: EndSelectorV1) -> Self {
        match selector {
            EndSelectorV1::End1 => End::End1,
            EndSelectorV1::End2 => End::End2,
        }
    }
}

/// Per-end relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    Unbounded,
    /// The element at this end carries at most one relationship of the type.
    AtMostOne(End),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEndDef {
    pub attribute: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub type_id: String,
    pub name: String,
    pub end1: RelationshipEndDef,
    pub end2: RelationshipEndDef,
    pub cardinality: Cardinality,
}

impl RelationshipDef {
    pub fn end(&self, end: End) -> &RelationshipEndDef {
        match end {
            End::End1 => &self.end1,
            End::End2 => &self.end2,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone)]
pub struct TypeRegistry {
    module_name: String,
    module_digest: String,
    types: HashMap<String, TypeDef>,
    names_by_id: HashMap<String, String>,
    /// type -> all supertypes, including itself
    supertypes_of: HashMap<String, HashSet<String>>,
    relationships: HashMap<String, RelationshipDef>,
}

impl TypeRegistry {
    /// The bundled open-metadata type module.
    pub fn open_metadata() -> EngineResult<Self> {
        Self::from_typedefs(OPEN_METADATA_TYPEDEFS)
    }

    pub fn from_typedefs(text: &str) -> EngineResult<Self> {
        let module = parse_typedefs_v1(text)
            .map_err(|err| EngineError::invalid_parameter("typedefs", err.to_string()))?;
        let mut registry = Self::from_module(&module)?;
        registry.module_digest = typedefs_digest_v1(text);
        Ok(registry)
    }

    pub fn from_module(module: &TypeDefModuleV1) -> EngineResult<Self> {
        let mut types: HashMap<String, TypeDef> = HashMap::new();
        let mut declare = |def: TypeDef| -> EngineResult<()> {
            if types.contains_key(&def.name) {
                return Err(EngineError::invalid_parameter(
                    "typedefs",
                    format!("type {} is declared more than once", def.name),
                ));
            }
            types.insert(def.name.clone(), def);
            Ok(())
        };

        for entity in &module.entities {
            declare(TypeDef {
                type_id: type_id_v1(&entity.name),
                name: entity.name.clone(),
                category: TypeCategory::Entity,
                supertype: entity.supertype.clone(),
                relationship_owned: entity.relationship_owned,
            })?;
        }
        for classification in &module.classifications {
            declare(TypeDef {
                type_id: type_id_v1(&classification.name),
                name: classification.name.clone(),
                category: TypeCategory::Classification,
                supertype: classification.supertype.clone(),
                relationship_owned: false,
            })?;
        }
        for relationship in &module.relationships {
            declare(TypeDef {
                type_id: type_id_v1(&relationship.name),
                name: relationship.name.clone(),
                category: TypeCategory::Relationship,
                supertype: None,
                relationship_owned: false,
            })?;
        }

        // Supertypes must exist and be of the same category.
        for def in types.values() {
            if let Some(supertype) = &def.supertype {
                match types.get(supertype) {
                    Some(sup) if sup.category == def.category => {}
                    Some(_) => {
                        return Err(EngineError::invalid_parameter(
                            "typedefs",
                            format!("{} cannot extend {supertype}: category differs", def.name),
                        ))
                    }
                    None => {
                        return Err(EngineError::invalid_parameter(
                            "typedefs",
                            format!("{} extends unknown type {supertype}", def.name),
                        ))
                    }
                }
            }
        }

        let mut relationships = HashMap::new();
        for relationship in &module.relationships {
            for end in [&relationship.end1, &relationship.end2] {
                let known_entity = types
                    .get(&end.entity_type)
                    .map_or(false, |def| def.category == TypeCategory::Entity);
                if !known_entity {
                    return Err(EngineError::invalid_parameter(
                        "typedefs",
                        format!(
                            "relationship {} end {} refers to unknown entity type {}",
                            relationship.name, end.attribute, end.entity_type
                        ),
                    ));
                }
            }
            relationships.insert(
                relationship.name.clone(),
                RelationshipDef {
                    type_id: type_id_v1(&relationship.name),
                    name: relationship.name.clone(),
                    end1: RelationshipEndDef {
                        attribute: relationship.end1.attribute.clone(),
                        entity_type: relationship.end1.entity_type.clone(),
                    },
                    end2: RelationshipEndDef {
                        attribute: relationship.end2.attribute.clone(),
                        entity_type: relationship.end2.entity_type.clone(),
                    },
                    cardinality: relationship
                        .at_most_one
                        .map_or(Cardinality::Unbounded, |end| Cardinality::AtMostOne(end.into())),
                },
            );
        }

        let supertypes_of = compute_supertypes_closure(&types)?;
        let names_by_id = types
            .values()
            .map(|def| (def.type_id.clone(), def.name.clone()))
            .collect();

        tracing::debug!(
            module = %module.module_name,
            types = types.len(),
            relationships = relationships.len(),
            "built type registry"
        );

        Ok(Self {
            module_name: module.module_name.clone(),
            module_digest: String::new(),
            types,
            names_by_id,
            supertypes_of,
            relationships,
        })
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Digest of the source text; empty when built from an AST directly.
    pub fn module_digest(&self) -> &str {
        &self.module_digest
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeDef> {
        self.types.get(type_name)
    }

    /// `(typeId, typeName)` for a registered name.
    pub fn resolve_type(&self, type_name: &str) -> EngineResult<(String, String)> {
        self.types
            .get(type_name)
            .map(|def| (def.type_id.clone(), def.name.clone()))
            .ok_or_else(|| EngineError::unknown_type(type_name))
    }

    pub fn resolve_type_by_id(&self, type_id: &str) -> EngineResult<(String, String)> {
        let name = self
            .names_by_id
            .get(type_id)
            .ok_or_else(|| EngineError::unknown_type(type_id))?;
        self.resolve_type(name)
    }

    /// Validate a caller-supplied `(typeId?, typeName?)` pair.
    pub fn resolve(
        &self,
        type_id: Option<&str>,
        type_name: Option<&str>,
    ) -> EngineResult<(String, String)> {
        match (type_id, type_name) {
            (None, None) => Err(EngineError::invalid_parameter(
                "typeName",
                "either a type id or a type name is required",
            )),
            (Some(id), None) => self.resolve_type_by_id(id),
            (None, Some(name)) => self.resolve_type(name),
            (Some(id), Some(name)) => {
                let resolved = self.resolve_type(name)?;
                if resolved.0 != id {
                    return Err(EngineError::invalid_parameter(
                        "typeId",
                        format!("type id {id} does not identify type {name}"),
                    ));
                }
                Ok(resolved)
            }
        }
    }

    /// True when `candidate` equals `ancestor` or inherits from it.
    /// Unregistered names are never a type of anything.
    pub fn is_type_of(&self, candidate: &str, ancestor: &str) -> bool {
        self.supertypes_of
            .get(candidate)
            .map_or(false, |supers| supers.contains(ancestor))
    }

    /// Resolve an optional subtype override against a family base type.
    pub fn validate_subtype(&self, requested: Option<&str>, family: &str) -> EngineResult<String> {
        let Some(requested) = requested else {
            self.resolve_type(family)?;
            return Ok(family.to_string());
        };
        self.resolve_type(requested)?;
        if !self.is_type_of(requested, family) {
            return Err(EngineError::invalid_parameter(
                "typeName",
                format!("{requested} is not a subtype of {family}"),
            ));
        }
        Ok(requested.to_string())
    }

    /// The type and every registered descendant, sorted by name.
    pub fn subtypes_of(&self, type_name: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .supertypes_of
            .iter()
            .filter(|(_, supers)| supers.contains(type_name))
            .map(|(name, _)| name.clone())
            .collect();
        out.sort();
        out
    }

    /// Length of the supertype chain (`0` for a root type).
    pub fn depth(&self, type_name: &str) -> usize {
        self.supertypes_of
            .get(type_name)
            .map_or(0, |supers| supers.len().saturating_sub(1))
    }

    pub fn is_relationship_owned(&self, entity_type: &str) -> bool {
        self.types
            .get(entity_type)
            .map_or(false, |def| def.relationship_owned)
    }

    pub fn is_classification(&self, type_name: &str) -> bool {
        self.types
            .get(type_name)
            .map_or(false, |def| def.category == TypeCategory::Classification)
    }

    pub fn relationship_def(&self, relationship_type: &str) -> EngineResult<&RelationshipDef> {
        self.relationships
            .get(relationship_type)
            .ok_or_else(|| EngineError::unknown_type(relationship_type))
    }
}

/// `type -> {type} ∪ all supertypes`. Rejects inheritance cycles.
fn compute_supertypes_closure(
    types: &HashMap<String, TypeDef>,
) -> EngineResult<HashMap<String, HashSet<String>>> {
    let mut supertypes_of: HashMap<String, HashSet<String>> = HashMap::new();
    for (name, def) in types {
        let mut supers = HashSet::new();
        supers.insert(name.clone());
        let mut next = def.supertype.clone();
        while let Some(sup) = next {
            if !supers.insert(sup.clone()) {
                return Err(EngineError::invalid_parameter(
                    "typedefs",
                    format!("inheritance cycle through {sup}"),
                ));
            }
            next = types.get(&sup).and_then(|def| def.supertype.clone());
        }
        supertypes_of.insert(name.clone(), supers);
    }
    Ok(supertypes_of)
}
