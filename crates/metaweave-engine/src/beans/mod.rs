//! Bean families produced by the bundled converters.

pub mod annotation;
pub mod feedback;
pub mod referenceable;

use chrono::{DateTime, Utc};
use metaweave_store::{EntityDetail, InstanceStatus};
use serde::{Deserialize, Serialize};

use crate::element;

/// Server-maintained part of every bean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHeader {
    pub guid: String,
    pub type_id: String,
    pub type_name: String,
    pub status: InstanceStatus,
    pub version: u64,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: Option<DateTime<Utc>>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,
    pub classifications: Vec<String>,
    pub anchor_guid: Option<String>,
    pub zone_membership: Vec<String>,
}

impl ElementHeader {
    pub fn from_entity(entity: &EntityDetail) -> Self {
        Self {
            guid: entity.guid.clone(),
            type_id: entity.instance_type.type_id.clone(),
            type_name: entity.instance_type.type_name.clone(),
            status: entity.status,
            version: entity.header.version,
            created_by: entity.header.created_by.clone(),
            updated_by: entity.header.updated_by.clone(),
            create_time: entity.header.create_time,
            update_time: entity.header.update_time,
            effective_from: entity.properties.effective_from,
            effective_to: entity.properties.effective_to,
            classifications: entity.classifications.keys().cloned().collect(),
            anchor_guid: element::anchor_guid(entity).map(str::to_string),
            zone_membership: element::zone_membership(entity).into_iter().collect(),
        }
    }
}
