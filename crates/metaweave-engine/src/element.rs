//! Engine view of a stored entity.
//!
//! Anchors and zones are not first-class store fields: they ride on the
//! `Anchors` and `AssetZoneMembership` classifications. `MetadataElement`
//! lifts them out so the rest of the engine can treat them as plain fields.

use chrono::{DateTime, Utc};
use metaweave_store::{EntityDetail, InstanceProperties, InstanceStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::names;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataElement {
    pub guid: String,
    pub type_id: String,
    pub type_name: String,
    pub properties: InstanceProperties,
    pub classifications: BTreeMap<String, InstanceProperties>,
    pub status: InstanceStatus,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,
    pub anchor_guid: Option<String>,
    pub zone_membership: BTreeSet<String>,
}

impl MetadataElement {
    pub fn from_entity(entity: &EntityDetail) -> Self {
        Self {
            guid: entity.guid.clone(),
            type_id: entity.instance_type.type_id.clone(),
            type_name: entity.instance_type.type_name.clone(),
            properties: entity.properties.clone(),
            classifications: entity.classifications.clone(),
            status: entity.status,
            effective_from: entity.properties.effective_from,
            effective_to: entity.properties.effective_to,
            anchor_guid: anchor_guid(entity).map(str::to_string),
            zone_membership: zone_membership(entity),
        }
    }

    pub fn qualified_name(&self) -> Option<&str> {
        self.properties.get_string(names::QUALIFIED_NAME)
    }
}

/// GUID recorded in the entity's `Anchors` classification.
pub fn anchor_guid(entity: &EntityDetail) -> Option<&str> {
    entity
        .classification(names::ANCHORS)?
        .get_string(names::ANCHOR_GUID)
}

/// Zones from the entity's `AssetZoneMembership` classification; empty when
/// the classification is absent.
pub fn zone_membership(entity: &EntityDetail) -> BTreeSet<String> {
    entity
        .classification(names::ZONE_MEMBERSHIP_CLASSIFICATION)
        .and_then(|c| c.get_string_list(names::ZONE_MEMBERSHIP))
        .map(|zones| zones.iter().cloned().collect())
        .unwrap_or_default()
}

/// Archived elements carry the `Memento` classification.
pub fn is_archived(entity: &EntityDetail) -> bool {
    entity.classification(names::MEMENTO).is_some()
}

pub fn qualified_name(entity: &EntityDetail) -> Option<&str> {
    entity.properties.get_string(names::QUALIFIED_NAME)
}
