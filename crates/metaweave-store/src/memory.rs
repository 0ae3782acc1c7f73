//! Indexed in-memory repository.
//!
//! Layout follows a columnar, slot-indexed design:
//!
//! - entities and relationships live in slot vectors (`u32` slot ids, tombstoned
//!   on delete so slots never move),
//! - a Roaring bitmap per entity type and per classification name answers
//!   "all entities of type T" without scanning,
//! - relationships are indexed forward `(end1 slot, type)`, backward
//!   `(end2 slot, type)` and per entity (any type).
//!
//! A single `RwLock` serialises writers, which gives the per-call atomicity
//! the store contract promises and nothing stronger.

use ahash::AHashMap;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use regex::Regex;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::instances::{
    EntityDetail, InstanceAuditHeader, InstanceStatus, MatchCriteria, NewEntity,
    NewRelationship, Paging, Relationship,
};
use crate::properties::{InstanceProperties, PropertyValue};
use crate::{RepositoryStore, StoreError, StoreResult};

// ============================================================================
// Entity Table
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct EntityTable {
    slots: Vec<Option<EntityDetail>>,
    by_guid: AHashMap<String, u32>,
    /// type name -> entity slots
    type_index: AHashMap<String, RoaringBitmap>,
    /// classification name -> entity slots
    classification_index: AHashMap<String, RoaringBitmap>,
}

impl EntityTable {
    fn insert(&mut self, entity: EntityDetail) -> u32 {
        let slot = self.slots.len() as u32;
        self.type_index
            .entry(entity.instance_type.type_name.clone())
            .or_default()
            .insert(slot);
        for name in entity.classifications.keys() {
            self.classification_index
                .entry(name.clone())
                .or_default()
                .insert(slot);
        }
        self.by_guid.insert(entity.guid.clone(), slot);
        self.slots.push(Some(entity));
        slot
    }

    fn slot_of(&self, guid: &str) -> Option<u32> {
        self.by_guid.get(guid).copied()
    }

    fn by_slot(&self, slot: u32) -> Option<&EntityDetail> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    fn get(&self, guid: &str) -> Option<&EntityDetail> {
        self.by_slot(self.slot_of(guid)?)
    }

    fn get_mut(&mut self, guid: &str) -> Option<&mut EntityDetail> {
        let slot = self.slot_of(guid)?;
        self.slots.get_mut(slot as usize).and_then(Option::as_mut)
    }

    fn index_classification(&mut self, guid: &str, name: &str, present: bool) {
        let Some(slot) = self.slot_of(guid) else {
            return;
        };
        if present {
            self.classification_index
                .entry(name.to_string())
                .or_default()
                .insert(slot);
        } else if let Some(slots) = self.classification_index.get_mut(name) {
            slots.remove(slot);
        }
    }

    fn remove(&mut self, guid: &str) -> Option<EntityDetail> {
        let slot = self.by_guid.remove(guid)?;
        let entity = self.slots.get_mut(slot as usize)?.take()?;
        if let Some(slots) = self.type_index.get_mut(entity.type_name()) {
            slots.remove(slot);
        }
        for name in entity.classifications.keys() {
            if let Some(slots) = self.classification_index.get_mut(name) {
                slots.remove(slot);
            }
        }
        Some(entity)
    }

    fn live_slots(&self) -> RoaringBitmap {
        self.by_guid.values().copied().collect()
    }

    fn slots_of_types(&self, type_names: &[String]) -> RoaringBitmap {
        if type_names.is_empty() {
            return self.live_slots();
        }
        let mut out = RoaringBitmap::new();
        for type_name in type_names {
            if let Some(slots) = self.type_index.get(type_name) {
                out |= slots;
            }
        }
        out
    }
}

// ============================================================================
// Relationship Table
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRelationship {
    relationship: Relationship,
    end1_slot: u32,
    end2_slot: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RelationshipTable {
    slots: Vec<Option<StoredRelationship>>,
    by_guid: AHashMap<String, u32>,
    /// (end1 entity slot, relationship type) -> relationship slots
    forward_index: AHashMap<(u32, String), Vec<u32>>,
    /// (end2 entity slot, relationship type) -> relationship slots
    backward_index: AHashMap<(u32, String), Vec<u32>>,
    /// entity slot -> relationship slots touching it (any type, either end)
    by_entity: AHashMap<u32, RoaringBitmap>,
}

impl RelationshipTable {
    fn insert(&mut self, relationship: Relationship, end1_slot: u32, end2_slot: u32) -> u32 {
        let slot = self.slots.len() as u32;
        let type_name = relationship.instance_type.type_name.clone();

        self.forward_index
            .entry((end1_slot, type_name.clone()))
            .or_default()
            .push(slot);
        self.backward_index
            .entry((end2_slot, type_name))
            .or_default()
            .push(slot);
        self.by_entity.entry(end1_slot).or_default().insert(slot);
        self.by_entity.entry(end2_slot).or_default().insert(slot);

        self.by_guid.insert(relationship.guid.clone(), slot);
        self.slots.push(Some(StoredRelationship {
            relationship,
            end1_slot,
            end2_slot,
        }));
        slot
    }

    fn by_slot(&self, slot: u32) -> Option<&StoredRelationship> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    fn get(&self, guid: &str) -> Option<&StoredRelationship> {
        self.by_slot(*self.by_guid.get(guid)?)
    }

    fn get_mut(&mut self, guid: &str) -> Option<&mut StoredRelationship> {
        let slot = *self.by_guid.get(guid)?;
        self.slots.get_mut(slot as usize).and_then(Option::as_mut)
    }

    fn remove(&mut self, guid: &str) -> Option<Relationship> {
        let slot = self.by_guid.remove(guid)?;
        let stored = self.slots.get_mut(slot as usize)?.take()?;
        let type_name = stored.relationship.instance_type.type_name.clone();

        for (index, end_slot) in [
            (&mut self.forward_index, stored.end1_slot),
            (&mut self.backward_index, stored.end2_slot),
        ] {
            let key = (end_slot, type_name.clone());
            if let Some(ids) = index.get_mut(&key) {
                ids.retain(|&id| id != slot);
                if ids.is_empty() {
                    index.remove(&key);
                }
            }
        }
        for end_slot in [stored.end1_slot, stored.end2_slot] {
            if let Some(ids) = self.by_entity.get_mut(&end_slot) {
                ids.remove(slot);
                if ids.is_empty() {
                    self.by_entity.remove(&end_slot);
                }
            }
        }
        Some(stored.relationship)
    }

    /// Relationship slots touching an entity, ascending (creation order).
    fn for_entity(&self, entity_slot: u32, relationship_type: Option<&str>) -> Vec<u32> {
        match relationship_type {
            Some(type_name) => {
                let key = (entity_slot, type_name.to_string());
                let mut out: Vec<u32> = self.forward_index.get(&key).cloned().unwrap_or_default();
                if let Some(ids) = self.backward_index.get(&key) {
                    out.extend(ids.iter().copied());
                }
                out.sort_unstable();
                out.dedup();
                out
            }
            None => self
                .by_entity
                .get(&entity_slot)
                .map(|ids| ids.iter().collect())
                .unwrap_or_default(),
        }
    }

    fn count_for_entity(&self, entity_slot: u32) -> u64 {
        self.by_entity
            .get(&entity_slot)
            .map(RoaringBitmap::len)
            .unwrap_or(0)
    }
}

// ============================================================================
// Matching
// ============================================================================

enum Expected<'a> {
    Pattern(Regex),
    Exact(&'a PropertyValue),
}

struct PropertyMatcher<'a> {
    wanted: Vec<(&'a str, Expected<'a>)>,
    criteria: MatchCriteria,
}

impl<'a> PropertyMatcher<'a> {
    fn new(
        match_properties: &'a InstanceProperties,
        criteria: MatchCriteria,
        exact_match: bool,
    ) -> StoreResult<Self> {
        let mut wanted = Vec::with_capacity(match_properties.len());
        for (name, value) in match_properties.iter() {
            let expected = match value {
                // Patterns match the whole value.
                PropertyValue::String(pattern) if !exact_match => {
                    let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
                        StoreError::InvalidRequest(format!(
                            "invalid search pattern for property {name}: {err}"
                        ))
                    })?;
                    Expected::Pattern(regex)
                }
                other => Expected::Exact(other),
            };
            wanted.push((name, expected));
        }
        Ok(Self { wanted, criteria })
    }

    fn matches(&self, properties: &InstanceProperties) -> bool {
        if self.wanted.is_empty() {
            return true;
        }
        let mut results = self.wanted.iter().map(|(name, expected)| {
            let Some(actual) = properties.get(name) else {
                return false;
            };
            match expected {
                Expected::Pattern(regex) => actual
                    .searchable_strings()
                    .iter()
                    .any(|candidate| regex.is_match(candidate)),
                Expected::Exact(PropertyValue::String(wanted)) => actual
                    .searchable_strings()
                    .iter()
                    .any(|candidate| candidate == wanted),
                Expected::Exact(wanted) => actual == *wanted,
            }
        });
        match self.criteria {
            MatchCriteria::Any => results.any(|m| m),
            MatchCriteria::All => results.all(|m| m),
        }
    }
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryState {
    entities: EntityTable,
    relationships: RelationshipTable,
    last_timestamp: Option<DateTime<Utc>>,
}

impl RepositoryState {
    /// Strictly increasing timestamps keep creation-time ordering total.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn new_header(&mut self, user_id: &str) -> InstanceAuditHeader {
        InstanceAuditHeader {
            created_by: user_id.to_string(),
            updated_by: None,
            create_time: self.next_timestamp(),
            update_time: None,
            version: 1,
        }
    }

    /// Copy of a stored relationship with proxies refreshed from the live ends.
    fn hydrate(&self, stored: &StoredRelationship) -> Relationship {
        let mut relationship = stored.relationship.clone();
        if let Some(end1) = self.entities.by_slot(stored.end1_slot) {
            relationship.end1 = end1.proxy();
        }
        if let Some(end2) = self.entities.by_slot(stored.end2_slot) {
            relationship.end2 = end2.proxy();
        }
        relationship
    }

    fn entity_mut(&mut self, guid: &str) -> StoreResult<&mut EntityDetail> {
        self.entities
            .get_mut(guid)
            .ok_or_else(|| StoreError::EntityNotKnown {
                guid: guid.to_string(),
            })
    }
}

fn touch(header: &mut InstanceAuditHeader, user_id: &str, now: DateTime<Utc>) {
    header.updated_by = Some(user_id.to_string());
    header.update_time = Some(now);
    header.version += 1;
}

/// Thread-safe in-memory [`RepositoryStore`].
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.state.read().entities.by_guid.len()
    }

    /// Number of live relationships.
    pub fn relationship_count(&self) -> usize {
        self.state.read().relationships.by_guid.len()
    }

    /// Serialize the full repository state.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(bincode::serialize(&*self.state.read())?)
    }

    /// Restore a repository from [`InMemoryRepository::to_bytes`] output.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let state: RepositoryState = bincode::deserialize(bytes)?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

impl RepositoryStore for InMemoryRepository {
    fn create_entity(&self, user_id: &str, entity: NewEntity) -> StoreResult<EntityDetail> {
        let mut state = self.state.write();
        let header = state.new_header(user_id);
        let detail = EntityDetail {
            guid: Uuid::new_v4().to_string(),
            instance_type: entity.instance_type,
            status: entity.status,
            properties: entity.properties,
            classifications: entity.classifications,
            header,
        };
        state.entities.insert(detail.clone());
        tracing::debug!(guid = %detail.guid, type_name = %detail.type_name(), "created entity");
        Ok(detail)
    }

    fn update_entity_properties(
        &self,
        user_id: &str,
        guid: &str,
        properties: InstanceProperties,
    ) -> StoreResult<EntityDetail> {
        let mut state = self.state.write();
        let now = state.next_timestamp();
        let entity = state.entity_mut(guid)?;
        entity.properties = properties;
        touch(&mut entity.header, user_id, now);
        Ok(entity.clone())
    }

    fn update_entity_status(
        &self,
        user_id: &str,
        guid: &str,
        status: InstanceStatus,
    ) -> StoreResult<EntityDetail> {
        let mut state = self.state.write();
        let now = state.next_timestamp();
        let entity = state.entity_mut(guid)?;
        entity.status = status;
        touch(&mut entity.header, user_id, now);
        Ok(entity.clone())
    }

    fn get_entity(&self, guid: &str) -> StoreResult<EntityDetail> {
        self.state
            .read()
            .entities
            .get(guid)
            .cloned()
            .ok_or_else(|| StoreError::EntityNotKnown {
                guid: guid.to_string(),
            })
    }

    fn delete_entity(&self, user_id: &str, guid: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        let slot = state
            .entities
            .slot_of(guid)
            .ok_or_else(|| StoreError::EntityNotKnown {
                guid: guid.to_string(),
            })?;
        let remaining = state.relationships.count_for_entity(slot);
        if remaining > 0 {
            return Err(StoreError::InvalidRequest(format!(
                "entity {guid} is still referenced by {remaining} relationship(s)"
            )));
        }
        state.entities.remove(guid);
        tracing::debug!(guid, user_id, "deleted entity");
        Ok(())
    }

    fn set_classification(
        &self,
        user_id: &str,
        guid: &str,
        classification_name: &str,
        properties: InstanceProperties,
    ) -> StoreResult<EntityDetail> {
        let mut state = self.state.write();
        let now = state.next_timestamp();
        let entity = state.entity_mut(guid)?;
        entity
            .classifications
            .insert(classification_name.to_string(), properties);
        touch(&mut entity.header, user_id, now);
        let detail = entity.clone();
        state
            .entities
            .index_classification(guid, classification_name, true);
        Ok(detail)
    }

    fn remove_classification(
        &self,
        user_id: &str,
        guid: &str,
        classification_name: &str,
    ) -> StoreResult<EntityDetail> {
        let mut state = self.state.write();
        let now = state.next_timestamp();
        let entity = state.entity_mut(guid)?;
        if entity.classifications.remove(classification_name).is_none() {
            return Err(StoreError::ClassificationNotKnown {
                guid: guid.to_string(),
                classification: classification_name.to_string(),
            });
        }
        touch(&mut entity.header, user_id, now);
        let detail = entity.clone();
        state
            .entities
            .index_classification(guid, classification_name, false);
        Ok(detail)
    }

    fn create_relationship(
        &self,
        user_id: &str,
        relationship: NewRelationship,
    ) -> StoreResult<Relationship> {
        let mut state = self.state.write();
        let end_slot = |guid: &str| {
            state
                .entities
                .slot_of(guid)
                .ok_or_else(|| StoreError::EntityNotKnown {
                    guid: guid.to_string(),
                })
        };
        let end1_slot = end_slot(&relationship.end1_guid)?;
        let end2_slot = end_slot(&relationship.end2_guid)?;

        let (Some(end1), Some(end2)) = (
            state.entities.by_slot(end1_slot).map(EntityDetail::proxy),
            state.entities.by_slot(end2_slot).map(EntityDetail::proxy),
        ) else {
            return Err(StoreError::InvalidRequest(
                "relationship end vanished during create".to_string(),
            ));
        };

        let header = state.new_header(user_id);
        let created = Relationship {
            guid: Uuid::new_v4().to_string(),
            instance_type: relationship.instance_type,
            end1,
            end2,
            properties: relationship.properties,
            header,
        };
        state
            .relationships
            .insert(created.clone(), end1_slot, end2_slot);
        tracing::debug!(
            guid = %created.guid,
            type_name = %created.type_name(),
            end1 = %created.end1.guid,
            end2 = %created.end2.guid,
            "created relationship"
        );
        Ok(created)
    }

    fn update_relationship_properties(
        &self,
        user_id: &str,
        guid: &str,
        properties: InstanceProperties,
    ) -> StoreResult<Relationship> {
        let mut state = self.state.write();
        let now = state.next_timestamp();
        let stored = state
            .relationships
            .get_mut(guid)
            .ok_or_else(|| StoreError::RelationshipNotKnown {
                guid: guid.to_string(),
            })?;
        stored.relationship.properties = properties;
        touch(&mut stored.relationship.header, user_id, now);
        let stored = stored.clone();
        Ok(state.hydrate(&stored))
    }

    fn get_relationship(&self, guid: &str) -> StoreResult<Relationship> {
        let state = self.state.read();
        state
            .relationships
            .get(guid)
            .map(|stored| state.hydrate(stored))
            .ok_or_else(|| StoreError::RelationshipNotKnown {
                guid: guid.to_string(),
            })
    }

    fn get_relationships_for_entity(
        &self,
        entity_guid: &str,
        relationship_type: Option<&str>,
    ) -> StoreResult<Vec<Relationship>> {
        let state = self.state.read();
        let slot = state
            .entities
            .slot_of(entity_guid)
            .ok_or_else(|| StoreError::EntityNotKnown {
                guid: entity_guid.to_string(),
            })?;
        Ok(state
            .relationships
            .for_entity(slot, relationship_type)
            .into_iter()
            .filter_map(|id| state.relationships.by_slot(id))
            .map(|stored| state.hydrate(stored))
            .collect())
    }

    fn delete_relationship(&self, user_id: &str, guid: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        state
            .relationships
            .remove(guid)
            .ok_or_else(|| StoreError::RelationshipNotKnown {
                guid: guid.to_string(),
            })?;
        tracing::debug!(guid, user_id, "deleted relationship");
        Ok(())
    }

    fn find_entities_by_property_value(
        &self,
        type_names: &[String],
        match_properties: &InstanceProperties,
        criteria: MatchCriteria,
        exact_match: bool,
        paging: Paging,
    ) -> StoreResult<Vec<EntityDetail>> {
        let matcher = PropertyMatcher::new(match_properties, criteria, exact_match)?;
        let state = self.state.read();
        let candidates = state.entities.slots_of_types(type_names);
        let matches = candidates
            .iter()
            .filter_map(|slot| state.entities.by_slot(slot))
            .filter(|entity| matcher.matches(&entity.properties))
            .cloned();
        Ok(paging.apply(matches))
    }

    fn find_entities_by_classification(
        &self,
        classification_name: &str,
        match_properties: &InstanceProperties,
        paging: Paging,
    ) -> StoreResult<Vec<EntityDetail>> {
        let matcher = PropertyMatcher::new(match_properties, MatchCriteria::All, true)?;
        let state = self.state.read();
        let Some(candidates) = state.entities.classification_index.get(classification_name) else {
            return Ok(Vec::new());
        };
        let matches = candidates
            .iter()
            .filter_map(|slot| state.entities.by_slot(slot))
            .filter(|entity| {
                entity
                    .classification(classification_name)
                    .map_or(false, |properties| matcher.matches(properties))
            })
            .cloned();
        Ok(paging.apply(matches))
    }
}
