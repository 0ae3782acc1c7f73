//! Metaweave repository store
//!
//! The mapping engine persists nothing itself. Everything durable lives behind
//! the [`RepositoryStore`] contract defined here:
//!
//! ```text
//! ┌──────────────────────┐      RepositoryStore       ┌─────────────────────┐
//! │  metaweave-engine    │ ─────────────────────────► │  repository         │
//! │  (mapping, zones,    │  entities, relationships,  │  (InMemoryRepository│
//! │   anchors, links)    │  classifications, search   │   or a connector)   │
//! └──────────────────────┘                            └─────────────────────┘
//! ```
//!
//! Every call is atomic for the single instance it touches and nothing more;
//! callers must not assume multi-instance transactions.

pub mod instances;
pub mod memory;
pub mod properties;

pub use instances::{
    EntityDetail, EntityProxy, InstanceAuditHeader, InstanceStatus, InstanceType,
    MatchCriteria, NewEntity, NewRelationship, Paging, Relationship, UNIQUE_PROPERTY_NAMES,
};
pub use memory::InMemoryRepository;
pub use properties::{EffectivityWindow, InstanceProperties, PropertyValue};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity {guid} is not known to the repository")]
    EntityNotKnown { guid: String },

    #[error("relationship {guid} is not known to the repository")]
    RelationshipNotKnown { guid: String },

    #[error("classification {classification} is not present on entity {guid}")]
    ClassificationNotKnown { guid: String, classification: String },

    #[error("invalid repository request: {0}")]
    InvalidRequest(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Contract the mapping engine requires from a metadata repository.
pub trait RepositoryStore: Send + Sync {
    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    fn create_entity(&self, user_id: &str, entity: NewEntity) -> StoreResult<EntityDetail>;

    /// Replace the entity's property bag wholesale.
    fn update_entity_properties(
        &self,
        user_id: &str,
        guid: &str,
        properties: InstanceProperties,
    ) -> StoreResult<EntityDetail>;

    fn update_entity_status(
        &self,
        user_id: &str,
        guid: &str,
        status: InstanceStatus,
    ) -> StoreResult<EntityDetail>;

    fn get_entity(&self, guid: &str) -> StoreResult<EntityDetail>;

    /// Fails with `InvalidRequest` while relationships still reference the entity.
    fn delete_entity(&self, user_id: &str, guid: &str) -> StoreResult<()>;

    /// Add or replace a classification.
    fn set_classification(
        &self,
        user_id: &str,
        guid: &str,
        classification_name: &str,
        properties: InstanceProperties,
    ) -> StoreResult<EntityDetail>;

    fn remove_classification(
        &self,
        user_id: &str,
        guid: &str,
        classification_name: &str,
    ) -> StoreResult<EntityDetail>;

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    fn create_relationship(
        &self,
        user_id: &str,
        relationship: NewRelationship,
    ) -> StoreResult<Relationship>;

    fn update_relationship_properties(
        &self,
        user_id: &str,
        guid: &str,
        properties: InstanceProperties,
    ) -> StoreResult<Relationship>;

    fn get_relationship(&self, guid: &str) -> StoreResult<Relationship>;

    /// Relationships touching the entity at either end, oldest first.
    fn get_relationships_for_entity(
        &self,
        entity_guid: &str,
        relationship_type: Option<&str>,
    ) -> StoreResult<Vec<Relationship>>;

    fn delete_relationship(&self, user_id: &str, guid: &str) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Entities whose type is one of `type_names` (any type when empty) and
    /// whose properties match. String match values are regular expressions
    /// unless `exact_match` is set. Results are in creation order.
    fn find_entities_by_property_value(
        &self,
        type_names: &[String],
        match_properties: &InstanceProperties,
        criteria: MatchCriteria,
        exact_match: bool,
        paging: Paging,
    ) -> StoreResult<Vec<EntityDetail>>;

    /// Entities carrying the classification whose properties equal every
    /// value in `match_properties`. Results are in creation order.
    fn find_entities_by_classification(
        &self,
        classification_name: &str,
        match_properties: &InstanceProperties,
        paging: Paging,
    ) -> StoreResult<Vec<EntityDetail>>;
}
