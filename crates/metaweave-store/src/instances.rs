//! Entity, relationship and request types exchanged with a repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::properties::InstanceProperties;

/// Property names copied onto entity proxies when they are present.
pub const UNIQUE_PROPERTY_NAMES: &[&str] = &["qualifiedName"];

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceStatus {
    Draft,
    Proposed,
    Approved,
    Rejected,
    #[default]
    Active,
    Deprecated,
    Other,
}

/// Type of an instance: stable id plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceType {
    pub type_id: String,
    pub type_name: String,
}

impl InstanceType {
    pub fn new(type_id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            type_name: type_name.into(),
        }
    }
}

/// Repository-maintained bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceAuditHeader {
    pub created_by: String,
    pub updated_by: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: Option<DateTime<Utc>>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetail {
    pub guid: String,
    pub instance_type: InstanceType,
    pub status: InstanceStatus,
    pub properties: InstanceProperties,
    /// Classification name -> classification properties.
    pub classifications: BTreeMap<String, InstanceProperties>,
    pub header: InstanceAuditHeader,
}

impl EntityDetail {
    pub fn type_name(&self) -> &str {
        &self.instance_type.type_name
    }

    pub fn classification(&self, name: &str) -> Option<&InstanceProperties> {
        self.classifications.get(name)
    }

    pub fn proxy(&self) -> EntityProxy {
        let mut unique_properties = InstanceProperties::new();
        for name in UNIQUE_PROPERTY_NAMES {
            if let Some(value) = self.properties.get(name) {
                unique_properties.insert(*name, value.clone());
            }
        }
        EntityProxy {
            guid: self.guid.clone(),
            type_name: self.instance_type.type_name.clone(),
            unique_properties,
        }
    }
}

/// Lightweight reference to the entity at one end of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProxy {
    pub guid: String,
    pub type_name: String,
    pub unique_properties: InstanceProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub guid: String,
    pub instance_type: InstanceType,
    pub end1: EntityProxy,
    pub end2: EntityProxy,
    pub properties: InstanceProperties,
    pub header: InstanceAuditHeader,
}

impl Relationship {
    pub fn type_name(&self) -> &str {
        &self.instance_type.type_name
    }

    /// The proxy at the opposite end from `guid`, if `guid` is one of the ends.
    pub fn other_end(&self, guid: &str) -> Option<&EntityProxy> {
        if self.end1.guid == guid {
            Some(&self.end2)
        } else if self.end2.guid == guid {
            Some(&self.end1)
        } else {
            None
        }
    }

    /// True when the relationship joins `end1_guid` (at end 1) to `end2_guid`.
    pub fn joins(&self, end1_guid: &str, end2_guid: &str) -> bool {
        self.end1.guid == end1_guid && self.end2.guid == end2_guid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub instance_type: InstanceType,
    pub status: InstanceStatus,
    pub properties: InstanceProperties,
    pub classifications: BTreeMap<String, InstanceProperties>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelationship {
    pub instance_type: InstanceType,
    pub end1_guid: String,
    pub end2_guid: String,
    pub properties: InstanceProperties,
}

/// Offset paging. A `page_size` of zero means "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub start_from: usize,
    pub page_size: usize,
}

impl Paging {
    pub fn new(start_from: usize, page_size: usize) -> Self {
        Self {
            start_from,
            page_size,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    /// Apply the page to an already ordered sequence.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.start_from);
        if self.page_size == 0 {
            iter.collect()
        } else {
            iter.take(self.page_size).collect()
        }
    }
}

/// How multiple match properties combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchCriteria {
    #[default]
    Any,
    All,
}
