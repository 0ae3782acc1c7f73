//! Property bag and classification assembly for new and updated elements.
//!
//! `ElementBuilder` is an immutable value: every `with_*` consumes the builder
//! and returns a new one, and nothing is assembled until [`ElementBuilder::build`].
//! Each classification setter stages an independent classification, so setting
//! one never disturbs another already staged.

use chrono::{DateTime, Utc};
use metaweave_store::{EffectivityWindow, InstanceProperties, InstanceStatus, PropertyValue};
use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::names;
use crate::property_codec::{self, PropertyType};

/// Builder output, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementPayload {
    pub type_name: String,
    pub properties: InstanceProperties,
    pub classifications: BTreeMap<String, InstanceProperties>,
    pub status: Option<InstanceStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementBuilder {
    type_name: String,
    properties: InstanceProperties,
    classifications: BTreeMap<String, InstanceProperties>,
    status: Option<InstanceStatus>,
    window: EffectivityWindow,
}

impl ElementBuilder {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: InstanceProperties::new(),
            classifications: BTreeMap::new(),
            status: None,
            window: EffectivityWindow::default(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains(name)
    }

    pub fn has_classification(&self, name: &str) -> bool {
        self.classifications.contains_key(name)
    }

    pub fn window(&self) -> EffectivityWindow {
        self.window
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub fn with_property<T: PropertyType>(self, name: &str, value: T) -> Self {
        self.with_optional_property(name, Some(value))
    }

    pub fn with_optional_property<T: PropertyType>(mut self, name: &str, value: Option<T>) -> Self {
        self.properties = property_codec::put(self.properties, name, value);
        self
    }

    pub fn with_enum_property<E: property_codec::OrdinalEnum>(mut self, name: &str, value: Option<E>) -> Self {
        self.properties = property_codec::put_enum(self.properties, name, value);
        self
    }

    pub fn with_qualified_name(self, qualified_name: Option<String>) -> Self {
        self.with_optional_property(names::QUALIFIED_NAME, qualified_name)
    }

    pub fn with_additional_properties(self, additional: BTreeMap<String, String>) -> Self {
        self.with_optional_property(names::ADDITIONAL_PROPERTIES, Some(additional))
    }

    /// Write back values a converter could not place on a bean. Names already
    /// staged by a typed setter win.
    pub fn with_extended_properties(mut self, extended: &BTreeMap<String, PropertyValue>) -> Self {
        for (name, value) in extended {
            if !self.properties.contains(name) {
                self.properties.insert(name.clone(), value.clone());
            }
        }
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Validity window applied to every bag this builder produces.
    pub fn with_effectivity(
        mut self,
        effective_from: Option<DateTime<Utc>>,
        effective_to: Option<DateTime<Utc>>,
    ) -> Self {
        self.window = EffectivityWindow::new(effective_from, effective_to);
        self
    }

    // ------------------------------------------------------------------
    // Classifications
    // ------------------------------------------------------------------

    pub fn with_classification(mut self, name: &str, properties: InstanceProperties) -> Self {
        self.classifications.insert(name.to_string(), properties);
        self
    }

    pub fn with_ownership(self, owner: &str, owner_type_name: Option<&str>) -> Self {
        let bag = InstanceProperties::new();
        let bag = property_codec::put(bag, "owner", Some(owner.to_string()));
        let bag = property_codec::put(bag, "ownerTypeName", owner_type_name.map(str::to_string));
        self.with_classification(names::OWNERSHIP, bag)
    }

    pub fn with_template(self, name: Option<&str>, description: Option<&str>) -> Self {
        let bag = InstanceProperties::new();
        let bag = property_codec::put(bag, "name", name.map(str::to_string));
        let bag = property_codec::put(bag, "description", description.map(str::to_string));
        self.with_classification(names::TEMPLATE, bag)
    }

    /// Archive marker: archived elements read as not found.
    pub fn with_memento(self, archive_date: DateTime<Utc>, archive_user: Option<&str>) -> Self {
        let bag = InstanceProperties::new();
        let bag = property_codec::put(bag, "archiveDate", Some(archive_date));
        let bag = property_codec::put(bag, "archiveUser", archive_user.map(str::to_string));
        self.with_classification(names::MEMENTO, bag)
    }

    pub fn with_security_tags(
        self,
        security_labels: Vec<String>,
        security_properties: BTreeMap<String, String>,
    ) -> Self {
        let bag = InstanceProperties::new();
        let bag = property_codec::put(bag, "securityLabels", Some(security_labels));
        let bag = property_codec::put(bag, "securityProperties", Some(security_properties));
        self.with_classification(names::SECURITY_TAGS, bag)
    }

    pub fn with_business_significance(
        self,
        description: Option<&str>,
        scope: Option<&str>,
        business_capability_guid: Option<&str>,
    ) -> Self {
        let bag = InstanceProperties::new();
        let bag = property_codec::put(bag, "description", description.map(str::to_string));
        let bag = property_codec::put(bag, "scope", scope.map(str::to_string));
        let bag = property_codec::put(
            bag,
            "businessCapabilityGUID",
            business_capability_guid.map(str::to_string),
        );
        self.with_classification(names::BUSINESS_SIGNIFICANCE, bag)
    }

    pub fn with_anchor(self, anchor_guid: &str, anchor_type_name: Option<&str>) -> Self {
        let bag = InstanceProperties::new();
        let bag = property_codec::put(bag, names::ANCHOR_GUID, Some(anchor_guid.to_string()));
        let bag = property_codec::put(bag, names::ANCHOR_TYPE_NAME, anchor_type_name.map(str::to_string));
        self.with_classification(names::ANCHORS, bag)
    }

    pub fn with_zones(self, zones: Vec<String>) -> Self {
        let bag = property_codec::put(InstanceProperties::new(), names::ZONE_MEMBERSHIP, Some(zones));
        self.with_classification(names::ZONE_MEMBERSHIP_CLASSIFICATION, bag)
    }

    pub fn has_zones(&self) -> bool {
        self.classifications
            .get(names::ZONE_MEMBERSHIP_CLASSIFICATION)
            .and_then(|c| c.get_string_list(names::ZONE_MEMBERSHIP))
            .map_or(false, |zones| !zones.is_empty())
    }

    // ------------------------------------------------------------------
    // Assembly
    // ------------------------------------------------------------------

    pub fn build(&self) -> EngineResult<ElementPayload> {
        if !self.window.is_well_formed() {
            return Err(EngineError::invalid_parameter(
                "effectiveFrom",
                "effectiveFrom must not be later than effectiveTo",
            ));
        }

        let mut properties = self.properties.clone();
        let mut classifications = self.classifications.clone();
        if !self.window.is_open() {
            properties.set_window(self.window);
            for bag in classifications.values_mut() {
                bag.set_window(self.window);
            }
        }

        Ok(ElementPayload {
            type_name: self.type_name.clone(),
            properties,
            classifications,
            status: self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classification_setters_are_independent() {
        let builder = ElementBuilder::new("Asset")
            .with_ownership("erin", Some("UserIdentity"))
            .with_template(Some("t"), None)
            .with_security_tags(vec!["PII".into()], BTreeMap::new())
            .with_business_significance(Some("core"), None, None)
            .with_zones(vec!["data-lake".into()])
            .with_anchor("anchor-guid", Some("Asset"));
        let payload = builder.build().unwrap();
        let names: Vec<_> = payload.classifications.keys().cloned().collect();
        assert_eq!(
            names,
            vec![
                "Anchors",
                "AssetZoneMembership",
                "BusinessSignificance",
                "Ownership",
                "SecurityTags",
                "Template"
            ]
        );
        // The empty map was not written.
        assert!(!payload.classifications["SecurityTags"].contains("securityProperties"));
    }

    #[test]
    fn builders_are_values() {
        let base = ElementBuilder::new("Asset").with_qualified_name(Some("a".into()));
        let with_zones = base.clone().with_zones(vec!["z".into()]);
        assert!(!base.has_zones());
        assert!(with_zones.has_zones());
    }

    #[test]
    fn effectivity_is_applied_to_every_bag() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let payload = ElementBuilder::new("Asset")
            .with_ownership("erin", None)
            .with_effectivity(Some(from), Some(to))
            .with_memento(from, None)
            .build()
            .unwrap();
        assert_eq!(payload.properties.effective_to, Some(to));
        assert!(payload
            .classifications
            .values()
            .all(|bag| bag.effective_from == Some(from) && bag.effective_to == Some(to)));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = ElementBuilder::new("Asset")
            .with_effectivity(Some(from), Some(to))
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }

    #[test]
    fn extended_properties_do_not_override_typed_fields() {
        let mut extended = BTreeMap::new();
        extended.insert("qualifiedName".to_string(), PropertyValue::String("old".into()));
        extended.insert("futureField".to_string(), PropertyValue::Long(9));
        let payload = ElementBuilder::new("Asset")
            .with_qualified_name(Some("new".into()))
            .with_extended_properties(&extended)
            .build()
            .unwrap();
        assert_eq!(payload.properties.get_string("qualifiedName"), Some("new"));
        assert_eq!(payload.properties.get("futureField"), Some(&PropertyValue::Long(9)));
    }
}
