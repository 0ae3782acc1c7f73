//! Zone and effectivity filtering.
//!
//! A read that fails here must be indistinguishable from a read of a GUID
//! that does not exist: callers turn `false` into `EngineError::unknown_guid`.

use chrono::{DateTime, Utc};
use metaweave_store::{EntityDetail, Relationship};
use std::collections::BTreeSet;

use crate::config::GovernanceZones;
use crate::element::{self, MetadataElement};
use crate::element_builder::ElementBuilder;

#[derive(Debug, Clone, Default)]
pub struct VisibilityFilter {
    zones: GovernanceZones,
}

impl VisibilityFilter {
    pub fn new(zones: GovernanceZones) -> Self {
        Self { zones }
    }

    pub fn zones(&self) -> &GovernanceZones {
        &self.zones
    }

    /// Zone check alone. Elements without zones are visible to everyone.
    pub fn is_visible(&self, element: &MetadataElement) -> bool {
        zones_visible(&element.zone_membership, self.zones.supported.as_ref())
    }

    pub fn is_entity_visible(&self, entity: &EntityDetail) -> bool {
        zones_visible(&element::zone_membership(entity), self.zones.supported.as_ref())
    }

    /// Everything a read path requires: zones, not archived, active at `time`.
    pub fn is_readable(&self, entity: &EntityDetail, effective_time: DateTime<Utc>) -> bool {
        self.is_entity_visible(entity)
            && !element::is_archived(entity)
            && is_entity_active(entity, effective_time)
    }

    /// Default zones, only when the caller supplied none.
    pub fn assign_default_zones(&self, builder: ElementBuilder) -> ElementBuilder {
        if builder.has_zones() || self.zones.default.is_empty() {
            builder
        } else {
            builder.with_zones(self.zones.default.clone())
        }
    }

    pub fn publish_zones(&self) -> &[String] {
        &self.zones.publish
    }

    pub fn default_zones(&self) -> &[String] {
        &self.zones.default
    }
}

/// `None` supported zones means the caller is unrestricted.
pub fn zones_visible(element_zones: &BTreeSet<String>, supported: Option<&BTreeSet<String>>) -> bool {
    match supported {
        None => true,
        Some(_) if element_zones.is_empty() => true,
        Some(supported) => !element_zones.is_disjoint(supported),
    }
}

pub fn is_entity_active(entity: &EntityDetail, effective_time: DateTime<Utc>) -> bool {
    entity.properties.is_active_at(effective_time)
}

pub fn is_relationship_active(relationship: &Relationship, effective_time: DateTime<Utc>) -> bool {
    relationship.properties.is_active_at(effective_time)
}
