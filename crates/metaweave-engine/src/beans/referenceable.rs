//! Generic bean for any `Referenceable` subtype without a dedicated family.

use metaweave_store::{EntityDetail, PropertyValue, Relationship};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ElementHeader;
use crate::converter::{require_primary, DispatchTable, ElementConverter};
use crate::element_builder::ElementBuilder;
use crate::error::EngineResult;
use crate::names;
use crate::property_codec::PropertyCursor;
use crate::type_registry::TypeRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceableElement {
    pub header: ElementHeader,
    pub qualified_name: Option<String>,
    pub additional_properties: BTreeMap<String, String>,
    /// Everything else, including subtype-specific properties.
    pub extended_properties: BTreeMap<String, PropertyValue>,
}

impl ReferenceableElement {
    pub fn builder(
        type_name: &str,
        qualified_name: &str,
        extended_properties: &BTreeMap<String, PropertyValue>,
    ) -> ElementBuilder {
        ElementBuilder::new(type_name)
            .with_qualified_name(Some(qualified_name.to_string()))
            .with_extended_properties(extended_properties)
    }
}

pub struct ReferenceableConverter {
    family: String,
    table: DispatchTable<()>,
}

impl ReferenceableConverter {
    /// `family` must be `Referenceable` or one of its subtypes.
    pub fn new(registry: &TypeRegistry, family: &str) -> EngineResult<Self> {
        let family = registry.validate_subtype(Some(family), names::REFERENCEABLE)?;
        let table = DispatchTable::build(registry, &family, Vec::new())?;
        Ok(Self { family, table })
    }
}

impl ElementConverter for ReferenceableConverter {
    type Bean = ReferenceableElement;

    fn family_type(&self) -> &str {
        &self.family
    }

    fn convert(
        &self,
        primary: Option<&EntityDetail>,
        _supplementary: &[EntityDetail],
        _relationships: &[Relationship],
    ) -> EngineResult<ReferenceableElement> {
        let primary = require_primary(primary, &self.family)?;
        self.table.dispatch(primary)?;

        let mut cursor = PropertyCursor::new(&primary.properties);
        Ok(ReferenceableElement {
            header: ElementHeader::from_entity(primary),
            qualified_name: cursor.take(names::QUALIFIED_NAME),
            additional_properties: cursor.take_map(names::ADDITIONAL_PROPERTIES),
            extended_properties: cursor.into_remaining(),
        })
    }
}
