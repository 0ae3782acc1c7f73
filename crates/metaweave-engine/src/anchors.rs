//! Anchor bookkeeping and cascade deletion.
//!
//! An anchor is a weak back-reference `dependent -> anchor` held in the
//! dependent's `Anchors` classification. It only decides cascade scope:
//!
//! ```text
//! Topic ◄── anchor ── EventTypeList ◄── anchor ── EventType
//!   │                                  ◄── anchor ── EventType
//! delete(Topic) => delete(EventType)*, delete(EventTypeList), delete(Topic)
//! ```

use metaweave_store::{
    EntityDetail, InstanceProperties, Paging, PropertyValue, RepositoryStore, StoreError,
};
use std::collections::HashSet;
use std::sync::Arc;

use crate::element::anchor_guid;
use crate::element_builder::ElementBuilder;
use crate::error::EngineResult;
use crate::names;

#[derive(Clone)]
pub struct AnchorPropagator {
    store: Arc<dyn RepositoryStore>,
}

impl AnchorPropagator {
    pub fn new(store: Arc<dyn RepositoryStore>) -> Self {
        Self { store }
    }

    pub fn set_anchor(
        builder: ElementBuilder,
        anchor_guid: &str,
        anchor_type_name: Option<&str>,
    ) -> ElementBuilder {
        builder.with_anchor(anchor_guid, anchor_type_name)
    }

    pub fn resolve_anchor(&self, guid: &str) -> EngineResult<Option<String>> {
        let entity = self.store.get_entity(guid)?;
        Ok(anchor_guid(&entity).map(str::to_string))
    }

    /// Anchor a dependent attached to `parent` inherits: the parent's own
    /// anchor, or the parent itself when it is a root.
    pub fn derive_anchor(parent: &EntityDetail) -> (String, String) {
        match parent.classification(names::ANCHORS) {
            Some(anchors) => {
                let guid = anchors
                    .get_string(names::ANCHOR_GUID)
                    .unwrap_or(&parent.guid)
                    .to_string();
                let type_name = anchors
                    .get_string(names::ANCHOR_TYPE_NAME)
                    .unwrap_or(parent.type_name())
                    .to_string();
                (guid, type_name)
            }
            None => (parent.guid.clone(), parent.type_name().to_string()),
        }
    }

    /// Elements whose anchor is exactly `anchor_guid`.
    pub fn anchored_to(&self, anchor_guid: &str) -> EngineResult<Vec<EntityDetail>> {
        let match_properties = InstanceProperties::new()
            .with(names::ANCHOR_GUID, PropertyValue::String(anchor_guid.to_string()));
        Ok(self
            .store
            .find_entities_by_classification(names::ANCHORS, &match_properties, Paging::all())?)
    }

    /// Delete every element anchored (transitively) to `anchor_guid`,
    /// deepest first. The anchor itself is left in place. Returns the
    /// deleted GUIDs in deletion order.
    pub fn cascade_delete(&self, user_id: &str, anchor_guid: &str) -> EngineResult<Vec<String>> {
        let mut visited = HashSet::new();
        visited.insert(anchor_guid.to_string());
        let mut deleted = Vec::new();
        self.cascade_from(user_id, anchor_guid, &mut visited, &mut deleted)?;
        if !deleted.is_empty() {
            tracing::debug!(anchor = anchor_guid, count = deleted.len(), "cascade deleted dependents");
        }
        Ok(deleted)
    }

    fn cascade_from(
        &self,
        user_id: &str,
        anchor_guid: &str,
        visited: &mut HashSet<String>,
        deleted: &mut Vec<String>,
    ) -> EngineResult<()> {
        for dependent in self.anchored_to(anchor_guid)? {
            if !visited.insert(dependent.guid.clone()) {
                continue;
            }
            self.cascade_from(user_id, &dependent.guid, visited, deleted)?;
            self.purge(user_id, &dependent.guid)?;
            deleted.push(dependent.guid);
        }
        Ok(())
    }

    /// Remove every relationship touching `guid`, then the entity. Instances
    /// that vanish concurrently are skipped.
    pub fn purge(&self, user_id: &str, guid: &str) -> EngineResult<()> {
        let relationships = match self.store.get_relationships_for_entity(guid, None) {
            Ok(relationships) => relationships,
            Err(StoreError::EntityNotKnown { .. }) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for relationship in relationships {
            match self.store.delete_relationship(user_id, &relationship.guid) {
                Ok(()) | Err(StoreError::RelationshipNotKnown { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        match self.store.delete_entity(user_id, guid) {
            Ok(()) | Err(StoreError::EntityNotKnown { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
