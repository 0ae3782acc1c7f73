//! Discovery annotations.
//!
//! One bean type, [`Annotation`], with the subtype-specific fields held in the
//! closed [`AnnotationKind`] enum. Dispatch preference (most specific first):
//!
//! ```text
//! ClassificationAnnotation          -> ClassificationFinding
//! DataClassAnnotation               -> DataClassMatch
//! DataProfileAnnotation             -> ResourceProfile
//! DataProfileLogAnnotation          -> ResourceProfileLog
//! ResourcePhysicalStatusAnnotation  -> ResourcePhysicalStatus   (< ResourceMeasureAnnotation)
//! ResourceMeasureAnnotation         -> ResourceMeasurement
//! QualityAnnotation                 -> Quality
//! RelationshipAdviceAnnotation      -> RelationshipAdvice
//! RequestForAction                  -> RequestForAction
//! SchemaAnalysisAnnotation          -> SchemaAnalysis
//! SemanticAnnotation                -> SemanticHint
//! any other Annotation              -> Base
//! ```

use chrono::{DateTime, Utc};
use metaweave_store::{EntityDetail, InstanceProperties, PropertyValue, Relationship};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::ElementHeader;
use crate::converter::{
    require_primary, ConversionInput, Constructor, Dispatch, DispatchTable, ElementConverter,
};
use crate::element_builder::ElementBuilder;
use crate::error::{EngineError, EngineResult};
use crate::names;
use crate::property_codec::{get_enum, put_enum, OrdinalEnum, PropertyCursor};
use crate::type_registry::TypeRegistry;

// Common annotation properties.
const ANNOTATION_TYPE: &str = "annotationType";
const SUMMARY: &str = "summary";
const CONFIDENCE_LEVEL: &str = "confidenceLevel";
const EXPRESSION: &str = "expression";
const EXPLANATION: &str = "explanation";
const ANALYSIS_STEP: &str = "analysisStep";
const JSON_PROPERTIES: &str = "jsonProperties";

// Review entity and link.
const REVIEW_DATE: &str = "reviewDate";
const STEWARD: &str = "steward";
const REVIEW_COMMENT: &str = "comment";
const ANNOTATION_STATUS: &str = "annotationStatus";

const DATA_SOURCE_PROPERTIES: &str = "dataSourceProperties";

/// Annotation subtypes in dispatch preference order.
pub const ANNOTATION_SUBTYPES: &[&str] = &[
    "ClassificationAnnotation",
    "DataClassAnnotation",
    "DataProfileAnnotation",
    "DataProfileLogAnnotation",
    "ResourcePhysicalStatusAnnotation",
    "ResourceMeasureAnnotation",
    "QualityAnnotation",
    "RelationshipAdviceAnnotation",
    "RequestForAction",
    "SchemaAnalysisAnnotation",
    "SemanticAnnotation",
];

// ============================================================================
// Bean
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub profile_properties: BTreeMap<String, String>,
    pub profile_flags: BTreeMap<String, bool>,
    pub profile_counts: BTreeMap<String, i64>,
    pub value_list: Vec<String>,
    pub value_count: BTreeMap<String, i32>,
    pub value_range_from: Option<String>,
    pub value_range_to: Option<String>,
    pub average_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum AnnotationKind {
    #[default]
    Base,
    ClassificationFinding {
        candidate_classifications: BTreeMap<String, String>,
    },
    DataClassMatch {
        candidate_data_class_guids: Vec<String>,
        matching_values: Option<i64>,
        non_matching_values: Option<i64>,
    },
    ResourceProfile(ResourceProfile),
    /// Log file names are derived from `DataProfileLogFile` relationships,
    /// never stored on the annotation.
    ResourceProfileLog {
        log_file_names: Vec<String>,
    },
    ResourcePhysicalStatus {
        measurements: BTreeMap<String, String>,
        source_create_time: Option<DateTime<Utc>>,
        source_update_time: Option<DateTime<Utc>>,
        size: Option<i64>,
        encoding: Option<String>,
    },
    ResourceMeasurement {
        measurements: BTreeMap<String, String>,
    },
    Quality {
        quality_dimension: Option<String>,
        quality_score: Option<i32>,
    },
    RelationshipAdvice {
        related_entity_guid: Option<String>,
        relationship_type_name: Option<String>,
        relationship_properties: BTreeMap<String, String>,
    },
    RequestForAction {
        discovery_activity: Option<String>,
        action_requested: Option<String>,
        action_properties: BTreeMap<String, String>,
    },
    SchemaAnalysis {
        schema_name: Option<String>,
        schema_type_name: Option<String>,
    },
    SemanticHint {
        informal_term: Option<String>,
        candidate_glossary_term_guids: Vec<String>,
        informal_topic: Option<String>,
        candidate_glossary_category_guids: Vec<String>,
    },
}

impl AnnotationKind {
    /// Entity type this kind is stored as; `None` for the base kind.
    pub fn type_name(&self) -> Option<&'static str> {
        let index = match self {
            AnnotationKind::Base => return None,
            AnnotationKind::ClassificationFinding { .. } => 0,
            AnnotationKind::DataClassMatch { .. } => 1,
            AnnotationKind::ResourceProfile(_) => 2,
            AnnotationKind::ResourceProfileLog { .. } => 3,
            AnnotationKind::ResourcePhysicalStatus { .. } => 4,
            AnnotationKind::ResourceMeasurement { .. } => 5,
            AnnotationKind::Quality { .. } => 6,
            AnnotationKind::RelationshipAdvice { .. } => 7,
            AnnotationKind::RequestForAction { .. } => 8,
            AnnotationKind::SchemaAnalysis { .. } => 9,
            AnnotationKind::SemanticHint { .. } => 10,
        };
        Some(ANNOTATION_SUBTYPES[index])
    }

    fn label(&self) -> &'static str {
        self.type_name().unwrap_or(names::ANNOTATION)
    }

    /// Stage this kind's properties. Derived fields are not written.
    fn write(&self, builder: ElementBuilder) -> ElementBuilder {
        match self.clone() {
            AnnotationKind::Base | AnnotationKind::ResourceProfileLog { .. } => builder,
            AnnotationKind::ClassificationFinding {
                candidate_classifications,
            } => builder.with_property("candidateClassifications", candidate_classifications),
            AnnotationKind::DataClassMatch {
                candidate_data_class_guids,
                matching_values,
                non_matching_values,
            } => builder
                .with_property("candidateDataClassGUIDs", candidate_data_class_guids)
                .with_optional_property("matchingValues", matching_values)
                .with_optional_property("nonMatchingValues", non_matching_values),
            AnnotationKind::ResourceProfile(profile) => builder
                .with_property("profileProperties", profile.profile_properties)
                .with_property("profileFlags", profile.profile_flags)
                .with_property("profileCounts", profile.profile_counts)
                .with_property("valueList", profile.value_list)
                .with_property("valueCount", profile.value_count)
                .with_optional_property("valueRangeFrom", profile.value_range_from)
                .with_optional_property("valueRangeTo", profile.value_range_to)
                .with_optional_property("averageValue", profile.average_value),
            AnnotationKind::ResourcePhysicalStatus {
                measurements,
                source_create_time,
                source_update_time,
                size,
                encoding,
            } => builder
                .with_property(DATA_SOURCE_PROPERTIES, measurements)
                .with_optional_property("sourceCreateTime", source_create_time)
                .with_optional_property("sourceUpdateTime", source_update_time)
                .with_optional_property("size", size)
                .with_optional_property("encoding", encoding),
            AnnotationKind::ResourceMeasurement { measurements } => {
                builder.with_property(DATA_SOURCE_PROPERTIES, measurements)
            }
            AnnotationKind::Quality {
                quality_dimension,
                quality_score,
            } => builder
                .with_optional_property("qualityDimension", quality_dimension)
                .with_optional_property("qualityScore", quality_score),
            AnnotationKind::RelationshipAdvice {
                related_entity_guid,
                relationship_type_name,
                relationship_properties,
            } => builder
                .with_optional_property("relatedEntityGUID", related_entity_guid)
                .with_optional_property("relationshipTypeName", relationship_type_name)
                .with_property("relationshipProperties", relationship_properties),
            AnnotationKind::RequestForAction {
                discovery_activity,
                action_requested,
                action_properties,
            } => builder
                .with_optional_property("discoveryActivity", discovery_activity)
                .with_optional_property("actionRequested", action_requested)
                .with_property("actionProperties", action_properties),
            AnnotationKind::SchemaAnalysis {
                schema_name,
                schema_type_name,
            } => builder
                .with_optional_property("schemaName", schema_name)
                .with_optional_property("schemaTypeName", schema_type_name),
            AnnotationKind::SemanticHint {
                informal_term,
                candidate_glossary_term_guids,
                informal_topic,
                candidate_glossary_category_guids,
            } => builder
                .with_optional_property("informalTerm", informal_term)
                .with_property("candidateGlossaryTermGUIDs", candidate_glossary_term_guids)
                .with_optional_property("informalTopic", informal_topic)
                .with_property(
                    "candidateGlossaryCategoryGUIDs",
                    candidate_glossary_category_guids,
                ),
        }
    }
}

/// Review state recorded on the `AnnotationReviewLink` relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationStatus {
    New,
    Reviewed,
    Approved,
    Actioned,
    Invalid,
    Ignore,
    Other,
    Unknown,
}

impl OrdinalEnum for AnnotationStatus {
    fn ordinal(&self) -> i32 {
        match self {
            AnnotationStatus::New => 0,
            AnnotationStatus::Reviewed => 1,
            AnnotationStatus::Approved => 2,
            AnnotationStatus::Actioned => 3,
            AnnotationStatus::Invalid => 4,
            AnnotationStatus::Ignore => 5,
            AnnotationStatus::Other => 99,
            AnnotationStatus::Unknown => -1,
        }
    }

    fn symbolic_name(&self) -> &'static str {
        match self {
            AnnotationStatus::New => "New",
            AnnotationStatus::Reviewed => "Reviewed",
            AnnotationStatus::Approved => "Approved",
            AnnotationStatus::Actioned => "Actioned",
            AnnotationStatus::Invalid => "Invalid",
            AnnotationStatus::Ignore => "Ignore",
            AnnotationStatus::Other => "Other",
            AnnotationStatus::Unknown => "Unknown",
        }
    }

    fn from_ordinal(ordinal: i32) -> Self {
        match ordinal {
            0 => AnnotationStatus::New,
            1 => AnnotationStatus::Reviewed,
            2 => AnnotationStatus::Approved,
            3 => AnnotationStatus::Actioned,
            4 => AnnotationStatus::Invalid,
            5 => AnnotationStatus::Ignore,
            99 => AnnotationStatus::Other,
            _ => AnnotationStatus::Unknown,
        }
    }
}

/// Copied from the companion `AnnotationReview` entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationReview {
    pub review_date: Option<DateTime<Utc>>,
    pub steward: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// `None` until the annotation has been stored.
    pub header: Option<ElementHeader>,
    pub annotation_type: Option<String>,
    pub summary: Option<String>,
    pub confidence_level: Option<i32>,
    pub expression: Option<String>,
    pub explanation: Option<String>,
    pub analysis_step: Option<String>,
    pub json_properties: Option<String>,
    pub additional_properties: BTreeMap<String, String>,
    pub kind: AnnotationKind,
    pub review: Option<AnnotationReview>,
    pub annotation_status: Option<AnnotationStatus>,
    pub extended_properties: BTreeMap<String, PropertyValue>,
}

impl Annotation {
    pub fn log_file_count(&self) -> usize {
        match &self.kind {
            AnnotationKind::ResourceProfileLog { log_file_names } => log_file_names.len(),
            _ => 0,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Stages an [`Annotation`] for storage as `type_name`.
#[derive(Debug, Clone)]
pub struct AnnotationBuilder {
    element: ElementBuilder,
}

impl AnnotationBuilder {
    /// The kind must be the one `type_name` dispatches to, so a bean is never
    /// stored under a type that would read back as a different kind.
    pub fn new(registry: &TypeRegistry, type_name: &str, annotation: &Annotation) -> EngineResult<Self> {
        registry.validate_subtype(Some(type_name), names::ANNOTATION)?;

        let expected = ANNOTATION_SUBTYPES
            .iter()
            .copied()
            .filter(|candidate| registry.is_type_of(type_name, candidate))
            .max_by_key(|candidate| registry.depth(candidate));
        if expected != annotation.kind.type_name() {
            return Err(EngineError::InvalidBeanClass(format!(
                "{} annotation cannot be stored as {type_name}",
                annotation.kind.label()
            )));
        }

        let element = ElementBuilder::new(type_name)
            .with_optional_property(ANNOTATION_TYPE, annotation.annotation_type.clone())
            .with_optional_property(SUMMARY, annotation.summary.clone())
            .with_optional_property(CONFIDENCE_LEVEL, annotation.confidence_level)
            .with_optional_property(EXPRESSION, annotation.expression.clone())
            .with_optional_property(EXPLANATION, annotation.explanation.clone())
            .with_optional_property(ANALYSIS_STEP, annotation.analysis_step.clone())
            .with_optional_property(JSON_PROPERTIES, annotation.json_properties.clone())
            .with_additional_properties(annotation.additional_properties.clone());
        let element = annotation
            .kind
            .write(element)
            .with_extended_properties(&annotation.extended_properties);

        Ok(Self { element })
    }

    pub fn element(&self) -> &ElementBuilder {
        &self.element
    }

    pub fn into_element(self) -> ElementBuilder {
        self.element
    }
}

// ============================================================================
// Converter
// ============================================================================

pub struct AnnotationConverter {
    registry: Arc<TypeRegistry>,
    table: DispatchTable<AnnotationKind>,
}

impl AnnotationConverter {
    pub fn new(registry: Arc<TypeRegistry>) -> EngineResult<Self> {
        let constructors: [Constructor<AnnotationKind>; 11] = [
            classification_finding,
            data_class_match,
            resource_profile,
            resource_profile_log,
            resource_physical_status,
            resource_measurement,
            quality,
            relationship_advice,
            request_for_action,
            schema_analysis,
            semantic_hint,
        ];
        let entries = ANNOTATION_SUBTYPES
            .iter()
            .copied()
            .zip(constructors)
            .collect();
        let table = DispatchTable::build(&registry, names::ANNOTATION, entries)?;
        Ok(Self { registry, table })
    }

    pub fn dispatch_order(&self) -> Vec<&str> {
        self.table.type_order()
    }
}

impl ElementConverter for AnnotationConverter {
    type Bean = Annotation;

    fn family_type(&self) -> &str {
        names::ANNOTATION
    }

    fn searchable_properties(&self) -> &[&'static str] {
        &[ANNOTATION_TYPE, SUMMARY, EXPLANATION]
    }

    fn supplementary_relationship_types(&self) -> &[&'static str] {
        &[names::ANNOTATION_REVIEW_LINK, names::DATA_PROFILE_LOG_FILE]
    }

    fn supplementary_entity_types(&self) -> &[&'static str] {
        &[names::ANNOTATION_REVIEW]
    }

    fn convert(
        &self,
        primary: Option<&EntityDetail>,
        supplementary: &[EntityDetail],
        relationships: &[Relationship],
    ) -> EngineResult<Annotation> {
        let primary = require_primary(primary, names::ANNOTATION)?;
        let input = ConversionInput {
            primary,
            supplementary,
            relationships,
        };
        let dispatch = self.table.dispatch(primary)?;

        let mut cursor = PropertyCursor::new(&primary.properties);
        let mut annotation = Annotation {
            header: Some(ElementHeader::from_entity(primary)),
            annotation_type: cursor.take(ANNOTATION_TYPE),
            summary: cursor.take(SUMMARY),
            confidence_level: cursor.take(CONFIDENCE_LEVEL),
            expression: cursor.take(EXPRESSION),
            explanation: cursor.take(EXPLANATION),
            analysis_step: cursor.take(ANALYSIS_STEP),
            json_properties: cursor.take(JSON_PROPERTIES),
            additional_properties: cursor.take_map(names::ADDITIONAL_PROPERTIES),
            ..Annotation::default()
        };

        annotation.kind = match dispatch {
            Dispatch::Specific(entry) => (entry.construct)(&mut cursor, &input)?,
            Dispatch::Base => AnnotationKind::Base,
        };
        if let Some(kind_type) = annotation.kind.type_name() {
            if !self.registry.is_type_of(primary.type_name(), kind_type) {
                return Err(EngineError::InvalidBeanClass(format!(
                    "{} entity {} produced a {kind_type} bean",
                    primary.type_name(),
                    primary.guid
                )));
            }
        }

        if let Some(link) = input.outgoing(names::ANNOTATION_REVIEW_LINK).last() {
            annotation.annotation_status = get_enum(&link.properties, ANNOTATION_STATUS);
            annotation.review = supplementary
                .iter()
                .find(|e| {
                    e.guid == link.end2.guid
                        && self.registry.is_type_of(e.type_name(), names::ANNOTATION_REVIEW)
                })
                .map(review_from);
        }

        annotation.extended_properties = cursor.into_remaining();
        Ok(annotation)
    }
}

fn review_from(entity: &EntityDetail) -> AnnotationReview {
    let mut cursor = PropertyCursor::new(&entity.properties);
    AnnotationReview {
        review_date: cursor.take(REVIEW_DATE),
        steward: cursor.take(STEWARD),
        comment: cursor.take(REVIEW_COMMENT),
    }
}

/// Properties for a new `AnnotationReview` entity.
pub fn review_builder(review: &AnnotationReview) -> ElementBuilder {
    ElementBuilder::new(names::ANNOTATION_REVIEW)
        .with_optional_property(REVIEW_DATE, review.review_date)
        .with_optional_property(STEWARD, review.steward.clone())
        .with_optional_property(REVIEW_COMMENT, review.comment.clone())
}

/// Properties for the `AnnotationReviewLink` relationship.
pub fn review_link_properties(status: AnnotationStatus) -> InstanceProperties {
    put_enum(InstanceProperties::new(), ANNOTATION_STATUS, Some(status))
}

// ============================================================================
// Subtype constructors
// ============================================================================

fn classification_finding(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::ClassificationFinding {
        candidate_classifications: cursor.take_map("candidateClassifications"),
    })
}

fn data_class_match(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::DataClassMatch {
        candidate_data_class_guids: cursor.take_list("candidateDataClassGUIDs"),
        matching_values: cursor.take("matchingValues"),
        non_matching_values: cursor.take("nonMatchingValues"),
    })
}

fn resource_profile(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::ResourceProfile(ResourceProfile {
        profile_properties: cursor.take_map("profileProperties"),
        profile_flags: cursor.take("profileFlags").unwrap_or_default(),
        profile_counts: cursor.take("profileCounts").unwrap_or_default(),
        value_list: cursor.take_list("valueList"),
        value_count: cursor.take("valueCount").unwrap_or_default(),
        value_range_from: cursor.take("valueRangeFrom"),
        value_range_to: cursor.take("valueRangeTo"),
        average_value: cursor.take("averageValue"),
    }))
}

/// Names of the attached log files: the far end's qualified name, or its
/// GUID when it has none.
fn resource_profile_log(_: &mut PropertyCursor, input: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    let log_file_names = input
        .outgoing(names::DATA_PROFILE_LOG_FILE)
        .map(|r| {
            r.end2
                .unique_properties
                .get_string(names::QUALIFIED_NAME)
                .unwrap_or(&r.end2.guid)
                .to_string()
        })
        .collect();
    Ok(AnnotationKind::ResourceProfileLog { log_file_names })
}

fn resource_physical_status(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::ResourcePhysicalStatus {
        measurements: cursor.take_map(DATA_SOURCE_PROPERTIES),
        source_create_time: cursor.take("sourceCreateTime"),
        source_update_time: cursor.take("sourceUpdateTime"),
        size: cursor.take("size"),
        encoding: cursor.take("encoding"),
    })
}

fn resource_measurement(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::ResourceMeasurement {
        measurements: cursor.take_map(DATA_SOURCE_PROPERTIES),
    })
}

fn quality(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::Quality {
        quality_dimension: cursor.take("qualityDimension"),
        quality_score: cursor.take("qualityScore"),
    })
}

fn relationship_advice(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::RelationshipAdvice {
        related_entity_guid: cursor.take("relatedEntityGUID"),
        relationship_type_name: cursor.take("relationshipTypeName"),
        relationship_properties: cursor.take_map("relationshipProperties"),
    })
}

fn request_for_action(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::RequestForAction {
        discovery_activity: cursor.take("discoveryActivity"),
        action_requested: cursor.take("actionRequested"),
        action_properties: cursor.take_map("actionProperties"),
    })
}

fn schema_analysis(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::SchemaAnalysis {
        schema_name: cursor.take("schemaName"),
        schema_type_name: cursor.take("schemaTypeName"),
    })
}

fn semantic_hint(cursor: &mut PropertyCursor, _: &ConversionInput<'_>) -> EngineResult<AnnotationKind> {
    Ok(AnnotationKind::SemanticHint {
        informal_term: cursor.take("informalTerm"),
        candidate_glossary_term_guids: cursor.take_list("candidateGlossaryTermGUIDs"),
        informal_topic: cursor.take("informalTopic"),
        candidate_glossary_category_guids: cursor.take_list("candidateGlossaryCategoryGUIDs"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use metaweave_store::{InstanceAuditHeader, InstanceStatus, InstanceType};

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::open_metadata().unwrap())
    }

    fn header() -> InstanceAuditHeader {
        InstanceAuditHeader {
            created_by: "tester".into(),
            updated_by: None,
            create_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            update_time: None,
            version: 1,
        }
    }

    fn entity(guid: &str, type_name: &str, properties: InstanceProperties) -> EntityDetail {
        EntityDetail {
            guid: guid.into(),
            instance_type: InstanceType::new(format!("id-{type_name}"), type_name),
            status: InstanceStatus::Active,
            properties,
            classifications: BTreeMap::new(),
            header: header(),
        }
    }

    fn relationship(type_name: &str, end1: &EntityDetail, end2: &EntityDetail, properties: InstanceProperties) -> Relationship {
        Relationship {
            guid: format!("{}-{}", end1.guid, end2.guid),
            instance_type: InstanceType::new(format!("id-{type_name}"), type_name),
            end1: end1.proxy(),
            end2: end2.proxy(),
            properties,
            header: header(),
        }
    }

    #[test]
    fn dispatch_order_is_most_specific_first() {
        let converter = AnnotationConverter::new(registry()).unwrap();
        let order = converter.dispatch_order();
        let physical = order
            .iter()
            .position(|t| *t == "ResourcePhysicalStatusAnnotation")
            .unwrap();
        let measure = order
            .iter()
            .position(|t| *t == "ResourceMeasureAnnotation")
            .unwrap();
        assert!(physical < measure);
    }

    #[test]
    fn missing_primary_is_reported() {
        let converter = AnnotationConverter::new(registry()).unwrap();
        assert!(matches!(
            converter.convert(None, &[], &[]),
            Err(EngineError::MissingMetadataInstance { .. })
        ));
    }

    #[test]
    fn non_annotation_is_invalid_instance_type() {
        let converter = AnnotationConverter::new(registry()).unwrap();
        let comment = entity("c1", "Comment", InstanceProperties::new());
        assert!(matches!(
            converter.convert(Some(&comment), &[], &[]),
            Err(EngineError::InvalidInstanceType { .. })
        ));
    }

    #[test]
    fn physical_status_wins_over_measurement() {
        let converter = AnnotationConverter::new(registry()).unwrap();
        let properties = InstanceProperties::new()
            .with(SUMMARY, PropertyValue::String("disk usage".into()))
            .with("size", PropertyValue::Long(4096))
            .with("encoding", PropertyValue::String("utf-8".into()));
        let primary = entity("a1", "ResourcePhysicalStatusAnnotation", properties);
        let bean = converter.convert(Some(&primary), &[], &[]).unwrap();
        assert!(matches!(
            bean.kind,
            AnnotationKind::ResourcePhysicalStatus { size: Some(4096), .. }
        ));
        assert_eq!(bean.summary.as_deref(), Some("disk usage"));
        assert!(bean.extended_properties.is_empty());
    }

    #[test]
    fn log_names_fall_back_to_guid() {
        let converter = AnnotationConverter::new(registry()).unwrap();
        let primary = entity("a1", "DataProfileLogAnnotation", InstanceProperties::new());
        let named = entity(
            "log-1",
            "LogFile",
            InstanceProperties::new().with(names::QUALIFIED_NAME, PropertyValue::String("/var/log/profile.log".into())),
        );
        let unnamed = entity("log-2", "LogFile", InstanceProperties::new());
        let relationships = vec![
            relationship(names::DATA_PROFILE_LOG_FILE, &primary, &named, InstanceProperties::new()),
            relationship(names::DATA_PROFILE_LOG_FILE, &primary, &unnamed, InstanceProperties::new()),
        ];
        let bean = converter.convert(Some(&primary), &[], &relationships).unwrap();
        assert_eq!(
            bean.kind,
            AnnotationKind::ResourceProfileLog {
                log_file_names: vec!["/var/log/profile.log".into(), "log-2".into()]
            }
        );
        assert_eq!(bean.log_file_count(), 2);
    }

    #[test]
    fn review_entity_and_status_are_copied() {
        let converter = AnnotationConverter::new(registry()).unwrap();
        let primary = entity("a1", "QualityAnnotation", InstanceProperties::new());
        let review_date = Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0).unwrap();
        let review = entity(
            "r1",
            names::ANNOTATION_REVIEW,
            InstanceProperties::new()
                .with(REVIEW_DATE, PropertyValue::Date(review_date))
                .with(STEWARD, PropertyValue::String("peter".into()))
                .with(REVIEW_COMMENT, PropertyValue::String("looks right".into())),
        );
        let link = relationship(
            names::ANNOTATION_REVIEW_LINK,
            &primary,
            &review,
            review_link_properties(AnnotationStatus::Approved),
        );
        let bean = converter
            .convert(Some(&primary), &[review], &[link])
            .unwrap();
        assert_eq!(bean.annotation_status, Some(AnnotationStatus::Approved));
        let copied = bean.review.unwrap();
        assert_eq!(copied.review_date, Some(review_date));
        assert_eq!(copied.steward.as_deref(), Some("peter"));
        assert_eq!(copied.comment.as_deref(), Some("looks right"));
    }

    #[test]
    fn unrecognised_status_ordinal_is_unknown() {
        let converter = AnnotationConverter::new(registry()).unwrap();
        let primary = entity("a1", "Annotation", InstanceProperties::new());
        let review = entity("r1", names::ANNOTATION_REVIEW, InstanceProperties::new());
        let link = Relationship {
            properties: InstanceProperties::new().with(ANNOTATION_STATUS, PropertyValue::Int(42)),
            ..relationship(names::ANNOTATION_REVIEW_LINK, &primary, &review, InstanceProperties::new())
        };
        let bean = converter.convert(Some(&primary), &[], &[link]).unwrap();
        assert_eq!(bean.annotation_status, Some(AnnotationStatus::Unknown));
        assert_eq!(bean.kind, AnnotationKind::Base);
        assert!(bean.review.is_none());
    }

    #[test]
    fn builder_rejects_kind_for_other_type() {
        let registry = registry();
        let annotation = Annotation {
            kind: AnnotationKind::ResourceMeasurement {
                measurements: BTreeMap::new(),
            },
            ..Annotation::default()
        };
        let err = AnnotationBuilder::new(&registry, "ResourcePhysicalStatusAnnotation", &annotation).unwrap_err();
        assert!(matches!(err, EngineError::InvalidBeanClass(_)));
        assert!(AnnotationBuilder::new(&registry, "ResourceMeasureAnnotation", &annotation).is_ok());

        let base = Annotation::default();
        assert!(AnnotationBuilder::new(&registry, "Annotation", &base).is_ok());
        assert!(AnnotationBuilder::new(&registry, "QualityAnnotation", &base).is_err());
    }
}
