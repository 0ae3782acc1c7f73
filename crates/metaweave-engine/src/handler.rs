//! Per-family orchestration over the repository store.
//!
//! ```text
//!   caller ──► GenericElementHandler<C>
//!                 │ validate type / text        (TypeRegistry)
//!                 │ zones + effectivity          (VisibilityFilter)
//!                 │ access                       (SecurityVerifier)
//!                 ├──► RepositoryStore           (persist / fetch / search)
//!                 ├──► AnchorPropagator          (cascade on delete)
//!                 ├──► AttachmentManager         (link / unlink / traverse)
//!                 │ convert                      (C: ElementConverter)
//!                 └──► AuditLog                  (one event per mutation)
//! ```
//!
//! Reads never reveal more than "not found": a hidden, archived, expired or
//! missing element all produce the same unknown-GUID `InvalidParameter`.

use chrono::{DateTime, Utc};
use metaweave_store::{
    EntityDetail, InstanceProperties, InstanceStatus, InstanceType, MatchCriteria, NewEntity,
    Paging, PropertyValue, Relationship, RepositoryStore, StoreError,
};
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

use crate::anchors::AnchorPropagator;
use crate::attachments::{AttachedElement, AttachedQuery, AttachmentManager, ElementRef};
use crate::audit::{AuditEvent, AuditLog, AuditOutcome, TracingAuditLog};
use crate::config::EngineConfig;
use crate::converter::ElementConverter;
use crate::element::{self, qualified_name};
use crate::element_builder::ElementBuilder;
use crate::error::{require_text, EngineError, EngineResult};
use crate::names;
use crate::property_codec;
use crate::security::{AccessAction, AccessRequest, AllowAllVerifier, SecurityVerifier};
use crate::type_registry::{Cardinality, End, TypeRegistry};
use crate::visibility::{self, VisibilityFilter};

/// Shared collaborators for every handler of one calling service.
#[derive(Clone)]
pub struct EngineServices {
    pub config: Arc<EngineConfig>,
    pub registry: Arc<TypeRegistry>,
    pub store: Arc<dyn RepositoryStore>,
    pub security: Arc<dyn SecurityVerifier>,
    pub audit: Arc<dyn AuditLog>,
}

impl EngineServices {
    /// Allow-all security and a `tracing` audit sink.
    pub fn new(
        config: EngineConfig,
        registry: Arc<TypeRegistry>,
        store: Arc<dyn RepositoryStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            store,
            security: Arc::new(AllowAllVerifier),
            audit: Arc::new(TracingAuditLog),
        }
    }

    pub fn with_security(mut self, security: Arc<dyn SecurityVerifier>) -> Self {
        self.security = security;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }
}

pub struct GenericElementHandler<C: ElementConverter> {
    services: EngineServices,
    converter: C,
    visibility: VisibilityFilter,
    anchors: AnchorPropagator,
    attachments: AttachmentManager,
}

impl<C: ElementConverter> GenericElementHandler<C> {
    pub fn new(services: EngineServices, converter: C) -> EngineResult<Self> {
        services.registry.resolve_type(converter.family_type())?;
        let visibility = VisibilityFilter::new(services.config.zones.clone());
        let anchors = AnchorPropagator::new(services.store.clone());
        let attachments = AttachmentManager::new(
            services.store.clone(),
            services.registry.clone(),
            visibility.clone(),
            services.config.max_page_size,
        );
        Ok(Self {
            services,
            converter,
            visibility,
            anchors,
            attachments,
        })
    }

    pub fn services(&self) -> &EngineServices {
        &self.services
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn visibility(&self) -> &VisibilityFilter {
        &self.visibility
    }

    pub fn anchors(&self) -> &AnchorPropagator {
        &self.anchors
    }

    pub fn attachments(&self) -> &AttachmentManager {
        &self.attachments
    }

    fn family(&self) -> &str {
        self.converter.family_type()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Persist a new element of the family (or a subtype). Returns its GUID.
    pub fn create(&self, user_id: &str, builder: ElementBuilder) -> EngineResult<String> {
        let type_name = builder.type_name().to_string();
        let result = self.create_element(user_id, builder);
        self.record(
            user_id,
            "create",
            &type_name,
            result.as_ref().ok().map(String::as_str),
            &result,
        );
        result
    }

    fn create_element(&self, user_id: &str, builder: ElementBuilder) -> EngineResult<String> {
        require_text("userId", user_id)?;
        let registry = &self.services.registry;
        let type_name = registry.validate_subtype(Some(builder.type_name()), self.family())?;

        let builder = if registry.is_type_of(&type_name, names::REFERENCEABLE)
            && !builder.has_property(names::QUALIFIED_NAME)
        {
            let generated = format!("{type_name}::{}", Uuid::new_v4());
            tracing::debug!(type_name = %type_name, qualified_name = %generated, "generated qualified name");
            builder.with_qualified_name(Some(generated))
        } else {
            builder
        };
        let payload = self.visibility.assign_default_zones(builder).build()?;

        self.services.security.check_write_access(&AccessRequest {
            user_id,
            action: AccessAction::Create,
            type_name: &type_name,
            guid: None,
        })?;

        let (type_id, type_name) = registry.resolve_type(&type_name)?;
        let entity = self.services.store.create_entity(
            user_id,
            NewEntity {
                instance_type: InstanceType::new(type_id, type_name),
                status: payload.status.unwrap_or_default(),
                properties: payload.properties,
                classifications: payload.classifications,
            },
        )?;
        Ok(entity.guid)
    }

    /// Merge keeps properties the builder does not mention; replace drops
    /// them. Staged classifications follow the same choice.
    pub fn update(
        &self,
        user_id: &str,
        guid: &str,
        builder: ElementBuilder,
        is_merge_update: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let type_name = builder.type_name().to_string();
        let result = self.update_element(user_id, guid, builder, is_merge_update, effective_time);
        self.record(user_id, "update", &type_name, Some(guid), &result);
        result
    }

    fn update_element(
        &self,
        user_id: &str,
        guid: &str,
        builder: ElementBuilder,
        is_merge_update: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        require_text("userId", user_id)?;
        let current = self.fetch_readable(user_id, guid, effective_time)?;
        if !self
            .services
            .registry
            .is_type_of(current.type_name(), builder.type_name())
        {
            return Err(EngineError::InvalidInstanceType {
                guid: guid.to_string(),
                actual: current.type_name().to_string(),
                expected: builder.type_name().to_string(),
            });
        }
        self.check_write(user_id, AccessAction::Update, &current)?;
        let payload = builder.build()?;

        let store = &self.services.store;
        let properties = if is_merge_update {
            current.properties.clone().merged_with(&payload.properties)
        } else {
            payload.properties
        };
        store.update_entity_properties(user_id, guid, properties)?;

        for (name, bag) in payload.classifications {
            let bag = match current.classification(&name) {
                Some(existing) if is_merge_update => existing.clone().merged_with(&bag),
                _ => bag,
            };
            store.set_classification(user_id, guid, &name, bag)?;
        }
        if let Some(status) = payload.status.filter(|s| *s != current.status) {
            store.update_entity_status(user_id, guid, status)?;
        }
        Ok(())
    }

    /// Cascade anchored dependents, then the element and its relationships.
    /// `qualified_name_guard`, when given, must match the stored name.
    pub fn delete(
        &self,
        user_id: &str,
        guid: &str,
        qualified_name_guard: Option<&str>,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let result = self.delete_element(user_id, guid, qualified_name_guard, effective_time);
        self.record(user_id, "delete", self.family(), Some(guid), &result);
        result
    }

    fn delete_element(
        &self,
        user_id: &str,
        guid: &str,
        qualified_name_guard: Option<&str>,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        require_text("userId", user_id)?;
        let current = self.fetch_readable(user_id, guid, effective_time)?;
        if let Some(guard) = qualified_name_guard {
            if qualified_name(&current) != Some(guard) {
                return Err(EngineError::invalid_parameter(
                    "qualifiedName",
                    format!("{guard} does not name element {guid}"),
                ));
            }
        }
        self.check_write(user_id, AccessAction::Delete, &current)?;

        self.anchors.cascade_delete(user_id, guid)?;
        self.anchors.purge(user_id, guid)
    }

    pub fn update_status(
        &self,
        user_id: &str,
        guid: &str,
        status: InstanceStatus,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let result = (|| -> EngineResult<_> {
            require_text("userId", user_id)?;
            let current = self.fetch_readable(user_id, guid, effective_time)?;
            self.check_write(user_id, AccessAction::Update, &current)?;
            self.services.store.update_entity_status(user_id, guid, status)?;
            Ok(())
        })();
        self.record(user_id, "update-status", self.family(), Some(guid), &result);
        result
    }

    // ------------------------------------------------------------------
    // Zones
    // ------------------------------------------------------------------

    /// Replace the element's zones with the configured publish zones.
    pub fn publish(&self, user_id: &str, guid: &str, effective_time: DateTime<Utc>) -> EngineResult<()> {
        let zones = self.visibility.publish_zones().to_vec();
        let result = self.set_zones(user_id, guid, zones, effective_time);
        self.record(user_id, "publish", self.family(), Some(guid), &result);
        result
    }

    /// Return the element to the configured default zones.
    pub fn withdraw(&self, user_id: &str, guid: &str, effective_time: DateTime<Utc>) -> EngineResult<()> {
        let zones = self.visibility.default_zones().to_vec();
        let result = self.set_zones(user_id, guid, zones, effective_time);
        self.record(user_id, "withdraw", self.family(), Some(guid), &result);
        result
    }

    fn set_zones(
        &self,
        user_id: &str,
        guid: &str,
        zones: Vec<String>,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        require_text("userId", user_id)?;
        let current = self.fetch_readable(user_id, guid, effective_time)?;
        self.check_write(user_id, AccessAction::Update, &current)?;
        let bag = property_codec::put(InstanceProperties::new(), names::ZONE_MEMBERSHIP, Some(zones));
        self.services.store.set_classification(
            user_id,
            guid,
            names::ZONE_MEMBERSHIP_CLASSIFICATION,
            bag,
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Classifications
    // ------------------------------------------------------------------

    pub fn classify(
        &self,
        user_id: &str,
        guid: &str,
        classification_name: &str,
        properties: InstanceProperties,
        is_merge_update: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let result = (|| -> EngineResult<_> {
            require_text("userId", user_id)?;
            self.require_classification(classification_name)?;
            if !properties.window().is_well_formed() {
                return Err(EngineError::invalid_parameter(
                    "effectiveFrom",
                    "effectiveFrom must not be later than effectiveTo",
                ));
            }
            let current = self.fetch_readable(user_id, guid, effective_time)?;
            self.check_write(user_id, AccessAction::Update, &current)?;
            let bag = match current.classification(classification_name) {
                Some(existing) if is_merge_update => existing.clone().merged_with(&properties),
                _ => properties,
            };
            self.services
                .store
                .set_classification(user_id, guid, classification_name, bag)?;
            Ok(())
        })();
        self.record(user_id, "classify", classification_name, Some(guid), &result);
        result
    }

    pub fn declassify(
        &self,
        user_id: &str,
        guid: &str,
        classification_name: &str,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let result = (|| -> EngineResult<_> {
            require_text("userId", user_id)?;
            self.require_classification(classification_name)?;
            let current = self.fetch_readable(user_id, guid, effective_time)?;
            if current.classification(classification_name).is_none() {
                return Err(EngineError::invalid_parameter(
                    "classificationName",
                    format!("element {guid} is not classified as {classification_name}"),
                ));
            }
            self.check_write(user_id, AccessAction::Update, &current)?;
            self.services
                .store
                .remove_classification(user_id, guid, classification_name)?;
            Ok(())
        })();
        self.record(user_id, "declassify", classification_name, Some(guid), &result);
        result
    }

    fn require_classification(&self, classification_name: &str) -> EngineResult<()> {
        if self.services.registry.is_classification(classification_name) {
            Ok(())
        } else {
            Err(EngineError::unknown_type(classification_name))
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_by_guid(
        &self,
        user_id: &str,
        guid: &str,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<C::Bean> {
        let entity = self.fetch_readable(user_id, guid, effective_time)?;
        self.convert(&entity, effective_time)
    }

    /// Regular-expression search across the family's searchable properties.
    pub fn find(
        &self,
        user_id: &str,
        search_string: &str,
        paging: Paging,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Vec<C::Bean>> {
        require_text("searchString", search_string)?;
        let searchable = self.converter.searchable_properties();
        if searchable.is_empty() {
            return Err(EngineError::invalid_parameter(
                "searchString",
                format!("{} elements have no searchable properties", self.family()),
            ));
        }
        Regex::new(&format!("^(?:{search_string})$"))
            .map_err(|err| EngineError::invalid_parameter("searchString", err.to_string()))?;
        let match_properties: InstanceProperties = searchable
            .iter()
            .map(|name| (name.to_string(), PropertyValue::String(search_string.to_string())))
            .collect();
        let matches = self.readable_matches(user_id, &match_properties, false, effective_time)?;
        self.convert_page(matches, paging, effective_time)
    }

    /// Exact match of `value` against `property_names`, which must be drawn
    /// from the family's searchable properties (all of them when `None`).
    pub fn get_by_value(
        &self,
        user_id: &str,
        value: &str,
        property_names: Option<&[&str]>,
        paging: Paging,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Vec<C::Bean>> {
        require_text("value", value)?;
        let whitelist = self.converter.searchable_properties();
        let names: Vec<&str> = match property_names {
            None => whitelist.to_vec(),
            Some(requested) => {
                if let Some(bad) = requested
                    .iter()
                    .find(|n| !whitelist.iter().any(|w| w == *n))
                {
                    return Err(EngineError::invalid_parameter(
                        "propertyNames",
                        format!("{bad} is not searchable for {}", self.family()),
                    ));
                }
                requested.to_vec()
            }
        };
        if names.is_empty() {
            return Err(EngineError::invalid_parameter(
                "propertyNames",
                format!("{} elements have no searchable properties", self.family()),
            ));
        }
        let match_properties: InstanceProperties = names
            .iter()
            .map(|name| (name.to_string(), PropertyValue::String(value.to_string())))
            .collect();
        let matches = self.readable_matches(user_id, &match_properties, true, effective_time)?;
        self.convert_page(matches, paging, effective_time)
    }

    /// The single visible element with this qualified name.
    pub fn get_by_unique_name(
        &self,
        user_id: &str,
        unique_name: &str,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<C::Bean> {
        require_text("qualifiedName", unique_name)?;
        let match_properties = InstanceProperties::new()
            .with(names::QUALIFIED_NAME, PropertyValue::String(unique_name.to_string()));
        let mut matches = self.readable_matches(user_id, &match_properties, true, effective_time)?;
        match matches.len() {
            0 => Err(EngineError::invalid_parameter(
                "qualifiedName",
                format!("no visible {} named {unique_name}", self.family()),
            )),
            1 => self.convert(&matches.remove(0), effective_time),
            n => {
                tracing::warn!(unique_name, count = n, "duplicate unique names");
                Err(EngineError::PropertyServer(format!(
                    "{n} {} elements share the unique name {unique_name}",
                    self.family()
                )))
            }
        }
    }

    /// Every family element matching the bag, filtered for the caller, in
    /// creation order.
    fn readable_matches(
        &self,
        user_id: &str,
        match_properties: &InstanceProperties,
        exact_match: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Vec<EntityDetail>> {
        let type_names = self.services.registry.subtypes_of(self.family());
        let found = self.services.store.find_entities_by_property_value(
            &type_names,
            match_properties,
            MatchCriteria::Any,
            exact_match,
            Paging::all(),
        )?;
        Ok(found
            .into_iter()
            .filter(|e| self.visibility.is_readable(e, effective_time))
            .filter(|e| !self.services.config.check_read_access || self.check_read(user_id, e).is_ok())
            .collect())
    }

    fn convert_page(
        &self,
        entities: Vec<EntityDetail>,
        paging: Paging,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Vec<C::Bean>> {
        let page_size = self.services.config.effective_page_size(paging.page_size);
        Paging::new(paging.start_from, page_size)
            .apply(entities)
            .iter()
            .map(|e| self.convert(e, effective_time))
            .collect()
    }

    /// Gather the converter's supplementary relationships and far-end
    /// entities (active and visible only), then convert.
    fn convert(&self, entity: &EntityDetail, effective_time: DateTime<Utc>) -> EngineResult<C::Bean> {
        let store = &self.services.store;
        let registry = &self.services.registry;

        let mut relationships: Vec<Relationship> = Vec::new();
        for &relationship_type in self.converter.supplementary_relationship_types() {
            relationships.extend(
                store
                    .get_relationships_for_entity(&entity.guid, Some(relationship_type))?
                    .into_iter()
                    .filter(|r| visibility::is_relationship_active(r, effective_time)),
            );
        }

        let entity_types = self.converter.supplementary_entity_types();
        let mut supplementary = Vec::new();
        for relationship in &relationships {
            let Some(far) = relationship.other_end(&entity.guid) else {
                continue;
            };
            if !entity_types
                .iter()
                .any(|t| registry.is_type_of(&far.type_name, t))
            {
                continue;
            }
            match store.get_entity(&far.guid) {
                Ok(detail) if self.visibility.is_readable(&detail, effective_time) => {
                    supplementary.push(detail)
                }
                Ok(_) | Err(StoreError::EntityNotKnown { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        self.converter
            .convert(Some(entity), &supplementary, &relationships)
    }

    /// Fetch an element of this family the caller may see at `effective_time`.
    pub(crate) fn fetch_readable(
        &self,
        user_id: &str,
        guid: &str,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<EntityDetail> {
        let entity = self.fetch_visible(guid, effective_time)?;
        if !self
            .services
            .registry
            .is_type_of(entity.type_name(), self.family())
        {
            return Err(EngineError::InvalidInstanceType {
                guid: guid.to_string(),
                actual: entity.type_name().to_string(),
                expected: self.family().to_string(),
            });
        }
        if self.services.config.check_read_access {
            self.check_read(user_id, &entity)?;
        }
        Ok(entity)
    }

    /// Any element, whatever its family, the caller may see.
    pub(crate) fn fetch_visible(&self, guid: &str, effective_time: DateTime<Utc>) -> EngineResult<EntityDetail> {
        require_text("guid", guid)?;
        let entity = self.services.store.get_entity(guid)?;
        if !self.visibility.is_readable(&entity, effective_time) {
            tracing::debug!(
                guid,
                archived = element::is_archived(&entity),
                "element not readable; reporting unknown"
            );
            return Err(EngineError::unknown_guid(guid));
        }
        Ok(entity)
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Link two elements. `cardinality` defaults to the relationship type's
    /// declared cardinality.
    pub fn link(
        &self,
        user_id: &str,
        end1: ElementRef<'_>,
        end2: ElementRef<'_>,
        relationship_type: &str,
        properties: InstanceProperties,
        cardinality: Option<Cardinality>,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Relationship> {
        let result = (|| -> EngineResult<_> {
            require_text("userId", user_id)?;
            self.check_relationship_write(user_id, AccessAction::Create, relationship_type)?;
            let cardinality = match cardinality {
                Some(cardinality) => cardinality,
                None => self.attachments.default_cardinality(relationship_type)?,
            };
            self.attachments.link(
                user_id,
                end1,
                end2,
                relationship_type,
                properties,
                cardinality,
                effective_time,
            )
        })();
        self.record(
            user_id,
            "link",
            relationship_type,
            result.as_ref().ok().map(|r| r.guid.as_str()),
            &result,
        );
        result
    }

    /// Link without probing for an existing relationship. Both ends must
    /// still be visible.
    pub fn link_unchecked(
        &self,
        user_id: &str,
        end1_guid: &str,
        end2_guid: &str,
        relationship_type: &str,
        properties: InstanceProperties,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Relationship> {
        let result = (|| -> EngineResult<_> {
            require_text("userId", user_id)?;
            self.fetch_visible(end1_guid, effective_time)?;
            self.fetch_visible(end2_guid, effective_time)?;
            self.check_relationship_write(user_id, AccessAction::Create, relationship_type)?;
            self.attachments
                .link_unchecked(user_id, end1_guid, end2_guid, relationship_type, properties)
        })();
        self.record(
            user_id,
            "link",
            relationship_type,
            result.as_ref().ok().map(|r| r.guid.as_str()),
            &result,
        );
        result
    }

    /// Remove the relationships joining the two ends. Returns how many went.
    pub fn unlink(
        &self,
        user_id: &str,
        end1_guid: &str,
        end2_guid: &str,
        relationship_type: &str,
        delete_orphan_end: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<usize> {
        let result = (|| -> EngineResult<_> {
            require_text("userId", user_id)?;
            self.fetch_visible(end1_guid, effective_time)?;
            self.fetch_visible(end2_guid, effective_time)?;
            self.check_relationship_write(user_id, AccessAction::Delete, relationship_type)?;
            self.attachments
                .unlink(user_id, end1_guid, end2_guid, relationship_type, delete_orphan_end)
        })();
        self.record(user_id, "unlink", relationship_type, Some(end1_guid), &result);
        result
    }

    pub fn unlink_single(
        &self,
        user_id: &str,
        guid: &str,
        end: End,
        relationship_type: &str,
        delete_orphan_end: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Relationship> {
        let result = (|| -> EngineResult<_> {
            require_text("userId", user_id)?;
            self.fetch_visible(guid, effective_time)?;
            self.check_relationship_write(user_id, AccessAction::Delete, relationship_type)?;
            self.attachments
                .unlink_single(user_id, guid, end, relationship_type, delete_orphan_end)
        })();
        self.record(user_id, "unlink", relationship_type, Some(guid), &result);
        result
    }

    pub fn update_single(
        &self,
        user_id: &str,
        guid: &str,
        end: End,
        relationship_type: &str,
        properties: InstanceProperties,
        is_merge_update: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Relationship> {
        let result = (|| -> EngineResult<_> {
            require_text("userId", user_id)?;
            self.fetch_visible(guid, effective_time)?;
            self.check_relationship_write(user_id, AccessAction::Update, relationship_type)?;
            self.attachments.update_single(
                user_id,
                guid,
                end,
                relationship_type,
                properties,
                is_merge_update,
            )
        })();
        self.record(
            user_id,
            "update-relationship",
            relationship_type,
            result.as_ref().ok().map(|r| r.guid.as_str()),
            &result,
        );
        result
    }

    /// Attached elements of this family, converted. The query's result type
    /// defaults to the family and must lie within it.
    pub fn get_attached(&self, user_id: &str, query: &AttachedQuery<'_>) -> EngineResult<Vec<C::Bean>> {
        let readable = self.readable_attached(user_id, query)?;
        self.attachments
            .page(query, readable)
            .iter()
            .map(|a| self.convert(&a.element, query.effective_time))
            .collect()
    }

    /// Same filtering as [`Self::get_attached`], without paging.
    pub fn count_attached(&self, user_id: &str, query: &AttachedQuery<'_>) -> EngineResult<usize> {
        Ok(self.readable_attached(user_id, query)?.len())
    }

    /// Read checks run before paging so denied elements never take a slot.
    fn readable_attached(&self, user_id: &str, query: &AttachedQuery<'_>) -> EngineResult<Vec<AttachedElement>> {
        let scoped = self.scope_query(query)?;
        Ok(self
            .attachments
            .all_attached(&scoped)?
            .into_iter()
            .filter(|a| !self.services.config.check_read_access || self.check_read(user_id, &a.element).is_ok())
            .collect())
    }

    fn scope_query<'q>(&'q self, query: &AttachedQuery<'q>) -> EngineResult<AttachedQuery<'q>> {
        let mut scoped = query.clone();
        match query.result_type {
            None => scoped.result_type = Some(self.family()),
            Some(result_type) => {
                if !self.services.registry.is_type_of(result_type, self.family()) {
                    return Err(EngineError::invalid_parameter(
                        "resultTypeName",
                        format!("{result_type} is not a {}", self.family()),
                    ));
                }
            }
        }
        Ok(scoped)
    }

    // ========================================================================
    // Access and audit
    // ========================================================================

    fn check_read(&self, user_id: &str, entity: &EntityDetail) -> EngineResult<()> {
        self.services.security.check_read_access(&AccessRequest {
            user_id,
            action: AccessAction::Read,
            type_name: entity.type_name(),
            guid: Some(&entity.guid),
        })
    }

    fn check_write(&self, user_id: &str, action: AccessAction, entity: &EntityDetail) -> EngineResult<()> {
        self.services.security.check_write_access(&AccessRequest {
            user_id,
            action,
            type_name: entity.type_name(),
            guid: Some(&entity.guid),
        })
    }

    fn check_relationship_write(
        &self,
        user_id: &str,
        action: AccessAction,
        relationship_type: &str,
    ) -> EngineResult<()> {
        self.services.security.check_write_access(&AccessRequest {
            user_id,
            action,
            type_name: relationship_type,
            guid: None,
        })
    }

    fn record<T>(
        &self,
        user_id: &str,
        operation: &'static str,
        type_name: &str,
        guid: Option<&str>,
        result: &EngineResult<T>,
    ) {
        let outcome = match result {
            Ok(_) => AuditOutcome::Success,
            Err(err) => AuditOutcome::Failure(err.to_string()),
        };
        self.services.audit.record(&AuditEvent {
            server_name: &self.services.config.server_name,
            user_id,
            operation,
            type_name,
            guid,
            outcome,
        });
    }
}
