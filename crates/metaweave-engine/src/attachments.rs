//! Typed attachments between elements.
//!
//! Cardinality is enforced per end:
//!
//! ```text
//!            look up relationships of type T where `guid` sits at `end`
//!                               │
//!          ┌──────────┬─────────┴──────────┬──────────────────────┐
//!          0          1 (same far end)     1 (other far end)      >1
//!        create     return it           remove, then create   AmbiguousRelationship
//! ```
//!
//! The replace path is two store calls and is not atomic. A concurrent writer
//! on the same end can leave zero or two relationships behind; the latter
//! surfaces on the next lookup as `AmbiguousRelationship`.

use chrono::{DateTime, Utc};
use metaweave_store::{
    EntityDetail, EntityProxy, InstanceProperties, InstanceType, NewRelationship, Paging,
    Relationship, RepositoryStore, StoreError,
};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::anchors::AnchorPropagator;
use crate::config::capped_page_size;
use crate::error::{EngineError, EngineResult};
use crate::type_registry::{Cardinality, End, TypeRegistry};
use crate::visibility::{self, VisibilityFilter};

/// Which end the start element of a traversal occupies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Any,
    /// Start element at end 1; results are end-2 elements.
    FromEnd1,
    /// Start element at end 2; results are end-1 elements.
    FromEnd2,
}

impl Direction {
    fn admits(self, relationship: &Relationship, start_guid: &str) -> bool {
        match self {
            Direction::Any => true,
            Direction::FromEnd1 => relationship.end1.guid == start_guid,
            Direction::FromEnd2 => relationship.end2.guid == start_guid,
        }
    }
}

/// Result ordering for attached elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Sequencing {
    #[default]
    CreationOldest,
    CreationRecent,
    PropertyAscending(String),
    PropertyDescending(String),
}

impl Sequencing {
    fn compare(&self, a: &EntityDetail, b: &EntityDetail) -> Ordering {
        let by_property = |name: &str| {
            match (a.properties.get_string(name), b.properties.get_string(name)) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        };
        match self {
            Sequencing::CreationOldest => a.header.create_time.cmp(&b.header.create_time),
            Sequencing::CreationRecent => b.header.create_time.cmp(&a.header.create_time),
            Sequencing::PropertyAscending(name) => by_property(name),
            Sequencing::PropertyDescending(name) => by_property(name).reverse(),
        }
    }
}

/// A caller's reference to one end: GUID plus the type it expects there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementRef<'a> {
    pub guid: &'a str,
    pub type_name: &'a str,
}

impl<'a> ElementRef<'a> {
    pub fn new(guid: &'a str, type_name: &'a str) -> Self {
        Self { guid, type_name }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachedElement {
    pub relationship: Relationship,
    pub element: EntityDetail,
}

#[derive(Debug, Clone)]
pub struct AttachedQuery<'a> {
    pub start: ElementRef<'a>,
    pub relationship_type: Option<&'a str>,
    pub result_type: Option<&'a str>,
    pub direction: Direction,
    pub paging: Paging,
    pub sequencing: Sequencing,
    pub effective_time: DateTime<Utc>,
}

impl<'a> AttachedQuery<'a> {
    pub fn new(start: ElementRef<'a>, effective_time: DateTime<Utc>) -> Self {
        Self {
            start,
            relationship_type: None,
            result_type: None,
            direction: Direction::Any,
            paging: Paging::all(),
            sequencing: Sequencing::default(),
            effective_time,
        }
    }

    pub fn relationship_type(mut self, relationship_type: &'a str) -> Self {
        self.relationship_type = Some(relationship_type);
        self
    }

    pub fn result_type(mut self, result_type: &'a str) -> Self {
        self.result_type = Some(result_type);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    pub fn sequencing(mut self, sequencing: Sequencing) -> Self {
        self.sequencing = sequencing;
        self
    }
}

// ============================================================================
// Manager
// ============================================================================

#[derive(Clone)]
pub struct AttachmentManager {
    store: Arc<dyn RepositoryStore>,
    registry: Arc<TypeRegistry>,
    visibility: VisibilityFilter,
    anchors: AnchorPropagator,
    max_page_size: usize,
}

impl AttachmentManager {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        registry: Arc<TypeRegistry>,
        visibility: VisibilityFilter,
        max_page_size: usize,
    ) -> Self {
        let anchors = AnchorPropagator::new(store.clone());
        Self {
            store,
            registry,
            visibility,
            anchors,
            max_page_size,
        }
    }

    /// Cardinality declared for the relationship type in the typedefs.
    pub fn default_cardinality(&self, relationship_type: &str) -> EngineResult<Cardinality> {
        Ok(self.registry.relationship_def(relationship_type)?.cardinality)
    }

    // ------------------------------------------------------------------
    // Link
    // ------------------------------------------------------------------

    pub fn link(
        &self,
        user_id: &str,
        end1: ElementRef<'_>,
        end2: ElementRef<'_>,
        relationship_type: &str,
        properties: InstanceProperties,
        cardinality: Cardinality,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Relationship> {
        let def = self.registry.relationship_def(relationship_type)?;
        check_window(&properties)?;
        self.validate_end(end1, &def.end1.entity_type, effective_time)?;
        self.validate_end(end2, &def.end2.entity_type, effective_time)?;

        match cardinality {
            Cardinality::Unbounded => {
                let existing = self
                    .relationships_at(end1.guid, relationship_type, End::End1)?
                    .into_iter()
                    .find(|r| r.joins(end1.guid, end2.guid));
                if let Some(existing) = existing {
                    return Ok(existing);
                }
            }
            Cardinality::AtMostOne(end) => {
                let start_guid = match end {
                    End::End1 => end1.guid,
                    End::End2 => end2.guid,
                };
                let mut existing = self.relationships_at(start_guid, relationship_type, end)?;
                match existing.len() {
                    0 => {}
                    1 => {
                        let current = existing.remove(0);
                        if current.joins(end1.guid, end2.guid) {
                            return Ok(current);
                        }
                        tracing::debug!(
                            relationship = %current.guid,
                            relationship_type,
                            "replacing at-most-one relationship"
                        );
                        self.store.delete_relationship(user_id, &current.guid)?;
                    }
                    _ => return Err(ambiguous(start_guid, relationship_type, existing)),
                }
            }
        }

        self.create(user_id, end1.guid, end2.guid, relationship_type, properties)
    }

    /// Create without probing for an existing relationship.
    pub fn link_unchecked(
        &self,
        user_id: &str,
        end1_guid: &str,
        end2_guid: &str,
        relationship_type: &str,
        properties: InstanceProperties,
    ) -> EngineResult<Relationship> {
        self.registry.relationship_def(relationship_type)?;
        check_window(&properties)?;
        self.create(user_id, end1_guid, end2_guid, relationship_type, properties)
    }

    fn create(
        &self,
        user_id: &str,
        end1_guid: &str,
        end2_guid: &str,
        relationship_type: &str,
        properties: InstanceProperties,
    ) -> EngineResult<Relationship> {
        let (type_id, type_name) = self.registry.resolve_type(relationship_type)?;
        Ok(self.store.create_relationship(
            user_id,
            NewRelationship {
                instance_type: InstanceType::new(type_id, type_name),
                end1_guid: end1_guid.to_string(),
                end2_guid: end2_guid.to_string(),
                properties,
            },
        )?)
    }

    // ------------------------------------------------------------------
    // Single-relationship operations
    // ------------------------------------------------------------------

    /// Update the one relationship of the type at `end` of `guid`.
    pub fn update_single(
        &self,
        user_id: &str,
        guid: &str,
        end: End,
        relationship_type: &str,
        properties: InstanceProperties,
        is_merge_update: bool,
    ) -> EngineResult<Relationship> {
        check_window(&properties)?;
        let current = self.single(guid, relationship_type, end)?;
        let updated = if is_merge_update {
            current.properties.merged_with(&properties)
        } else {
            properties
        };
        Ok(self
            .store
            .update_relationship_properties(user_id, &current.guid, updated)?)
    }

    /// Remove the one relationship of the type at `end` of `guid`.
    pub fn unlink_single(
        &self,
        user_id: &str,
        guid: &str,
        end: End,
        relationship_type: &str,
        delete_orphan_end: bool,
    ) -> EngineResult<Relationship> {
        let current = self.single(guid, relationship_type, end)?;
        self.store.delete_relationship(user_id, &current.guid)?;
        if delete_orphan_end {
            let far = match end {
                End::End1 => &current.end2,
                End::End2 => &current.end1,
            };
            self.delete_orphan(user_id, far)?;
        }
        Ok(current)
    }

    fn single(&self, guid: &str, relationship_type: &str, end: End) -> EngineResult<Relationship> {
        self.registry.relationship_def(relationship_type)?;
        let mut existing = self.relationships_at(guid, relationship_type, end)?;
        match existing.len() {
            0 => {
                tracing::warn!(guid, relationship_type, "expected relationship is missing");
                Err(EngineError::MissingRelationship {
                    guid: guid.to_string(),
                    relationship_type: relationship_type.to_string(),
                })
            }
            1 => Ok(existing.remove(0)),
            _ => Err(ambiguous(guid, relationship_type, existing)),
        }
    }

    // ------------------------------------------------------------------
    // Unlink
    // ------------------------------------------------------------------

    /// Remove every `relationship_type` relationship from `end1_guid` to
    /// `end2_guid`. Returns how many were removed.
    pub fn unlink(
        &self,
        user_id: &str,
        end1_guid: &str,
        end2_guid: &str,
        relationship_type: &str,
        delete_orphan_end: bool,
    ) -> EngineResult<usize> {
        self.registry.relationship_def(relationship_type)?;
        let matching: Vec<Relationship> = self
            .relationships_at(end1_guid, relationship_type, End::End1)?
            .into_iter()
            .filter(|r| r.joins(end1_guid, end2_guid))
            .collect();
        if matching.is_empty() {
            tracing::debug!(end1 = end1_guid, end2 = end2_guid, relationship_type, "nothing to unlink");
            return Ok(0);
        }
        for relationship in &matching {
            self.store.delete_relationship(user_id, &relationship.guid)?;
        }
        if delete_orphan_end {
            self.delete_orphan(user_id, &matching[0].end2)?;
        }
        Ok(matching.len())
    }

    fn delete_orphan(&self, user_id: &str, far: &EntityProxy) -> EngineResult<()> {
        if !self.registry.is_relationship_owned(&far.type_name) {
            return Ok(());
        }
        self.anchors.cascade_delete(user_id, &far.guid)?;
        self.anchors.purge(user_id, &far.guid)?;
        tracing::debug!(guid = %far.guid, type_name = %far.type_name, "deleted orphaned element");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// A page of far-end elements that are visible and active at the query
    /// time, attached through active relationships.
    pub fn get_attached(&self, query: &AttachedQuery<'_>) -> EngineResult<Vec<AttachedElement>> {
        let attached = self.all_attached(query)?;
        Ok(self.page(query, attached))
    }

    pub fn count(&self, query: &AttachedQuery<'_>) -> EngineResult<usize> {
        Ok(self.all_attached(query)?.len())
    }

    /// Apply the query's paging, capped by the configured page size.
    pub fn page<T>(&self, query: &AttachedQuery<'_>, items: Vec<T>) -> Vec<T> {
        let page_size = capped_page_size(query.paging.page_size, self.max_page_size);
        Paging::new(query.paging.start_from, page_size).apply(items)
    }

    /// Every match in sequencing order, before paging.
    pub fn all_attached(&self, query: &AttachedQuery<'_>) -> EngineResult<Vec<AttachedElement>> {
        if let Some(relationship_type) = query.relationship_type {
            self.registry.relationship_def(relationship_type)?;
        }
        self.validate_end(query.start, query.start.type_name, query.effective_time)?;

        let relationships = self
            .store
            .get_relationships_for_entity(query.start.guid, query.relationship_type)?;

        let mut attached = Vec::new();
        for relationship in relationships {
            if !query.direction.admits(&relationship, query.start.guid)
                || !visibility::is_relationship_active(&relationship, query.effective_time)
            {
                continue;
            }
            let Some(far) = relationship.other_end(query.start.guid) else {
                continue;
            };
            if let Some(result_type) = query.result_type {
                if !self.registry.is_type_of(&far.type_name, result_type) {
                    continue;
                }
            }
            let element = match self.store.get_entity(&far.guid) {
                Ok(element) => element,
                Err(StoreError::EntityNotKnown { .. }) => continue,
                Err(err) => return Err(err.into()),
            };
            if !self.visibility.is_readable(&element, query.effective_time) {
                continue;
            }
            attached.push(AttachedElement {
                relationship,
                element,
            });
        }
        attached.sort_by(|a, b| query.sequencing.compare(&a.element, &b.element));
        Ok(attached)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Relationships of the type where `guid` sits at `end`.
    fn relationships_at(&self, guid: &str, relationship_type: &str, end: End) -> EngineResult<Vec<Relationship>> {
        Ok(self
            .store
            .get_relationships_for_entity(guid, Some(relationship_type))?
            .into_iter()
            .filter(|r| match end {
                End::End1 => r.end1.guid == guid,
                End::End2 => r.end2.guid == guid,
            })
            .collect())
    }

    fn validate_end(
        &self,
        end: ElementRef<'_>,
        required_type: &str,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<EntityDetail> {
        let entity = self.store.get_entity(end.guid)?;
        if !self.visibility.is_readable(&entity, effective_time) {
            return Err(EngineError::unknown_guid(end.guid));
        }
        for expected in [end.type_name, required_type] {
            if !self.registry.is_type_of(entity.type_name(), expected) {
                return Err(EngineError::invalid_parameter(
                    "guid",
                    format!("{} is a {}, not a {expected}", end.guid, entity.type_name()),
                ));
            }
        }
        Ok(entity)
    }
}

fn check_window(properties: &InstanceProperties) -> EngineResult<()> {
    if properties.window().is_well_formed() {
        Ok(())
    } else {
        Err(EngineError::invalid_parameter(
            "effectiveFrom",
            "effectiveFrom must not be later than effectiveTo",
        ))
    }
}

fn ambiguous(guid: &str, relationship_type: &str, relationships: Vec<Relationship>) -> EngineError {
    tracing::warn!(
        guid,
        relationship_type,
        count = relationships.len(),
        "ambiguous relationships where at most one is allowed"
    );
    EngineError::AmbiguousRelationship {
        guid: guid.to_string(),
        relationship_type: relationship_type.to_string(),
        relationships,
    }
}
