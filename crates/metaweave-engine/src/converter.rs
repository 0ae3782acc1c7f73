//! Entity -> bean conversion with ordered type dispatch.
//!
//! Each bean family registers `(typeName, constructor)` entries. The table is
//! sorted most-specific-first once, and the winning entry for every registered
//! type in the family is resolved up front, so conversion is a map lookup:
//!
//! ```text
//! actual type ──► resolved[actual] ──► Some(entry) ──► entry.construct(cursor, input)
//!                                 └──► None        ──► family base bean
//! not in family ────────────────────────────────────► InvalidInstanceType
//! ```

use metaweave_store::{EntityDetail, Relationship};
use std::collections::HashMap;
use std::fmt;

use crate::error::{EngineError, EngineResult};
use crate::names;
use crate::property_codec::PropertyCursor;
use crate::type_registry::TypeRegistry;

/// Converts stored instances into beans of one family.
pub trait ElementConverter: Send + Sync {
    type Bean: Clone + fmt::Debug + Send;

    /// Base type of the family; every convertible entity is at least this.
    fn family_type(&self) -> &str;

    /// Properties matched by `find` and, by default, `get_by_value`.
    fn searchable_properties(&self) -> &[&'static str] {
        &[names::QUALIFIED_NAME]
    }

    /// Relationship types fetched alongside the primary entity.
    fn supplementary_relationship_types(&self) -> &[&'static str] {
        &[]
    }

    /// Far-end entity types of those relationships loaded as supplementary
    /// entities.
    fn supplementary_entity_types(&self) -> &[&'static str] {
        &[]
    }

    fn convert(
        &self,
        primary: Option<&EntityDetail>,
        supplementary: &[EntityDetail],
        relationships: &[Relationship],
    ) -> EngineResult<Self::Bean>;
}

/// Everything a subtype constructor may look at.
#[derive(Debug, Clone, Copy)]
pub struct ConversionInput<'a> {
    pub primary: &'a EntityDetail,
    pub supplementary: &'a [EntityDetail],
    pub relationships: &'a [Relationship],
}

impl<'a> ConversionInput<'a> {
    /// Relationships of the type whose end 1 is the primary entity.
    pub fn outgoing(&self, relationship_type: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        let guid = self.primary.guid.as_str();
        self.relationships
            .iter()
            .filter(move |r| r.type_name() == relationship_type && r.end1.guid == guid)
    }

    /// Relationships of the type whose end 2 is the primary entity.
    pub fn incoming(&self, relationship_type: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        let guid = self.primary.guid.as_str();
        self.relationships
            .iter()
            .filter(move |r| r.type_name() == relationship_type && r.end2.guid == guid)
    }
}

pub type Constructor<K> = fn(&mut PropertyCursor, &ConversionInput<'_>) -> EngineResult<K>;

pub struct DispatchEntry<K> {
    pub type_name: String,
    pub construct: Constructor<K>,
}

pub enum Dispatch<'t, K> {
    Specific(&'t DispatchEntry<K>),
    Base,
}

pub struct DispatchTable<K> {
    family: String,
    entries: Vec<DispatchEntry<K>>,
    /// actual type -> index of the winning entry (`None` = base bean)
    resolved: HashMap<String, Option<usize>>,
}

impl<K> fmt::Debug for DispatchTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("family", &self.family)
            .field("entries", &self.type_order())
            .finish()
    }
}

impl<K> DispatchTable<K> {
    /// `entries` are given in preference order; ties at equal depth keep it.
    pub fn build(
        registry: &TypeRegistry,
        family: &str,
        entries: Vec<(&str, Constructor<K>)>,
    ) -> EngineResult<Self> {
        registry.resolve_type(family)?;

        let mut table: Vec<DispatchEntry<K>> = Vec::with_capacity(entries.len());
        for (type_name, construct) in entries {
            registry.resolve_type(type_name)?;
            if !registry.is_type_of(type_name, family) {
                return Err(EngineError::InvalidBeanClass(format!(
                    "{type_name} is registered for the {family} converter but is not a {family}"
                )));
            }
            table.push(DispatchEntry {
                type_name: type_name.to_string(),
                construct,
            });
        }
        table.sort_by(|a, b| registry.depth(&b.type_name).cmp(&registry.depth(&a.type_name)));

        let resolved = registry
            .subtypes_of(family)
            .into_iter()
            .map(|actual| {
                let winner = table
                    .iter()
                    .position(|entry| registry.is_type_of(&actual, &entry.type_name));
                (actual, winner)
            })
            .collect();

        Ok(Self {
            family: family.to_string(),
            entries: table,
            resolved,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Entry type names, most specific first.
    pub fn type_order(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.type_name.as_str()).collect()
    }

    pub fn dispatch(&self, entity: &EntityDetail) -> EngineResult<Dispatch<'_, K>> {
        let actual = entity.type_name();
        match self.resolved.get(actual) {
            Some(Some(index)) => {
                let entry = &self.entries[*index];
                tracing::debug!(actual, matched = %entry.type_name, "dispatched converter");
                Ok(Dispatch::Specific(entry))
            }
            Some(None) => Ok(Dispatch::Base),
            None => Err(EngineError::InvalidInstanceType {
                guid: entity.guid.clone(),
                actual: actual.to_string(),
                expected: self.family.clone(),
            }),
        }
    }
}

/// Step 1 of every conversion: a primary entity with a type.
pub fn require_primary<'a>(
    primary: Option<&'a EntityDetail>,
    family: &str,
) -> EngineResult<&'a EntityDetail> {
    match primary {
        Some(entity) if !entity.type_name().is_empty() => Ok(entity),
        _ => Err(EngineError::MissingMetadataInstance {
            family: family.to_string(),
        }),
    }
}
