//! Annotation beans through the full build -> persist -> convert path

use chrono::{TimeZone, Utc};
use metaweave_engine::beans::annotation::{review_builder, review_link_properties};
use metaweave_engine::{
    Annotation, AnnotationBuilder, AnnotationConverter, AnnotationKind, AnnotationReview,
    AnnotationStatus, ElementBuilder, ElementRef, EngineConfig, EngineError, EngineServices,
    GenericElementHandler, ReferenceableConverter, ResourceProfile, TypeRegistry,
};
use metaweave_store::{
    InMemoryRepository, InstanceType, NewEntity, Paging, PropertyValue, RepositoryStore,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn annotation_handler() -> GenericElementHandler<AnnotationConverter> {
    let registry = Arc::new(TypeRegistry::open_metadata().unwrap());
    let services = EngineServices::new(
        EngineConfig::default(),
        registry.clone(),
        Arc::new(InMemoryRepository::new()),
    );
    GenericElementHandler::new(services, AnnotationConverter::new(registry).unwrap()).unwrap()
}

fn map<V: Clone>(pairs: &[(&str, V)]) -> BTreeMap<String, V> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn common(summary: &str) -> Annotation {
    Annotation {
        annotation_type: Some("profiling".into()),
        summary: Some(summary.into()),
        confidence_level: Some(80),
        expression: Some("col > 0".into()),
        explanation: Some("sampled 1000 rows".into()),
        analysis_step: Some("profile".into()),
        json_properties: Some(r#"{"sample":1000}"#.into()),
        additional_properties: map(&[("engine", "spark".to_string())]),
        ..Annotation::default()
    }
}

/// One populated bean per annotation type.
fn samples() -> Vec<(&'static str, Annotation)> {
    let with_kind = |summary: &str, kind: AnnotationKind| Annotation {
        kind,
        ..common(summary)
    };
    vec![
        ("Annotation", common("base")),
        (
            "ClassificationAnnotation",
            with_kind(
                "classification",
                AnnotationKind::ClassificationFinding {
                    candidate_classifications: map(&[("Confidentiality", "level=2".to_string())]),
                },
            ),
        ),
        (
            "DataClassAnnotation",
            with_kind(
                "data class",
                AnnotationKind::DataClassMatch {
                    candidate_data_class_guids: vec!["dc-1".into(), "dc-2".into()],
                    matching_values: Some(950),
                    non_matching_values: Some(50),
                },
            ),
        ),
        (
            "DataProfileAnnotation",
            with_kind(
                "profile",
                AnnotationKind::ResourceProfile(ResourceProfile {
                    profile_properties: map(&[("format", "csv".to_string())]),
                    profile_flags: map(&[("nullable", true)]),
                    profile_counts: map(&[("rows", 1_000_000_i64)]),
                    value_list: vec!["red".into(), "green".into()],
                    value_count: map(&[("red", 3_i32), ("green", 7_i32)]),
                    value_range_from: Some("a".into()),
                    value_range_to: Some("z".into()),
                    average_value: Some("m".into()),
                }),
            ),
        ),
        (
            "DataProfileLogAnnotation",
            with_kind(
                "log",
                AnnotationKind::ResourceProfileLog {
                    log_file_names: Vec::new(),
                },
            ),
        ),
        (
            "ResourcePhysicalStatusAnnotation",
            with_kind(
                "physical",
                AnnotationKind::ResourcePhysicalStatus {
                    measurements: map(&[("blocks", "12".to_string())]),
                    source_create_time: Some(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap()),
                    source_update_time: Some(Utc.with_ymd_and_hms(2024, 6, 7, 8, 9, 10).unwrap()),
                    size: Some(4096),
                    encoding: Some("utf-8".into()),
                },
            ),
        ),
        (
            "ResourceMeasureAnnotation",
            with_kind(
                "measure",
                AnnotationKind::ResourceMeasurement {
                    measurements: map(&[("files", "3".to_string())]),
                },
            ),
        ),
        (
            "QualityAnnotation",
            with_kind(
                "quality",
                AnnotationKind::Quality {
                    quality_dimension: Some("completeness".into()),
                    quality_score: Some(97),
                },
            ),
        ),
        (
            "RelationshipAdviceAnnotation",
            with_kind(
                "advice",
                AnnotationKind::RelationshipAdvice {
                    related_entity_guid: Some("other-guid".into()),
                    relationship_type_name: Some("SemanticAssignment".into()),
                    relationship_properties: map(&[("confidence", "high".to_string())]),
                },
            ),
        ),
        (
            "RequestForAction",
            with_kind(
                "action",
                AnnotationKind::RequestForAction {
                    discovery_activity: Some("pii-scan".into()),
                    action_requested: Some("mask".into()),
                    action_properties: map(&[("column", "ssn".to_string())]),
                },
            ),
        ),
        (
            "SchemaAnalysisAnnotation",
            with_kind(
                "schema",
                AnnotationKind::SchemaAnalysis {
                    schema_name: Some("orders".into()),
                    schema_type_name: Some("TabularSchemaType".into()),
                },
            ),
        ),
        (
            "SemanticAnnotation",
            with_kind(
                "semantic",
                AnnotationKind::SemanticHint {
                    informal_term: Some("customer".into()),
                    candidate_glossary_term_guids: vec!["term-1".into()],
                    informal_topic: Some("sales".into()),
                    candidate_glossary_category_guids: vec!["cat-1".into(), "cat-2".into()],
                },
            ),
        ),
    ]
}

fn store_annotation(
    handler: &GenericElementHandler<AnnotationConverter>,
    type_name: &str,
    annotation: &Annotation,
) -> String {
    let builder = AnnotationBuilder::new(&handler.services().registry, type_name, annotation)
        .unwrap()
        .into_element();
    handler.create("discovery", builder).unwrap()
}

#[test]
fn test_every_annotation_type_round_trips() {
    let handler = annotation_handler();
    for (type_name, original) in samples() {
        let guid = store_annotation(&handler, type_name, &original);
        let mut read = handler.get_by_guid("discovery", &guid, Utc::now()).unwrap();

        let header = read.header.take().expect("stored annotation has a header");
        assert_eq!(header.type_name, type_name);
        assert_eq!(read, original, "round trip of {type_name}");
    }
}

#[test]
fn test_unknown_properties_land_in_extended_properties() {
    let handler = annotation_handler();
    let mut original = samples()
        .into_iter()
        .find(|(t, _)| *t == "QualityAnnotation")
        .map(|(_, a)| a)
        .unwrap();
    original.extended_properties = map(&[
        ("toolVersion", PropertyValue::String("2.1".into())),
        ("sampleRatio", PropertyValue::Double(0.25)),
    ]);

    let guid = store_annotation(&handler, "QualityAnnotation", &original);
    let read = handler.get_by_guid("discovery", &guid, Utc::now()).unwrap();
    assert_eq!(read.extended_properties, original.extended_properties);
    assert_eq!(read.summary, original.summary);
}

#[test]
fn test_typed_fields_win_over_colliding_extended_properties() {
    let handler = annotation_handler();
    let mut original = common("typed summary");
    original.extended_properties = map(&[("summary", PropertyValue::String("overflow".into()))]);

    let guid = store_annotation(&handler, "Annotation", &original);
    let read = handler.get_by_guid("discovery", &guid, Utc::now()).unwrap();
    assert_eq!(read.summary.as_deref(), Some("typed summary"));
    assert!(read.extended_properties.is_empty());
}

#[test]
fn test_builder_rejects_mismatched_kind() {
    let handler = annotation_handler();
    let quality = samples()
        .into_iter()
        .find(|(t, _)| *t == "QualityAnnotation")
        .map(|(_, a)| a)
        .unwrap();
    let err = AnnotationBuilder::new(&handler.services().registry, "SemanticAnnotation", &quality)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidBeanClass(_)));

    let err = AnnotationBuilder::new(&handler.services().registry, "Comment", &quality).unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter { .. }));
}

#[test]
fn test_profile_log_names_follow_relationships() {
    let handler = annotation_handler();
    let services = handler.services().clone();
    let files = GenericElementHandler::new(
        services.clone(),
        ReferenceableConverter::new(&services.registry, "Asset").unwrap(),
    )
    .unwrap();

    let (_, log_annotation) = samples()
        .into_iter()
        .find(|(t, _)| *t == "DataProfileLogAnnotation")
        .unwrap();
    let annotation_guid = store_annotation(&handler, "DataProfileLogAnnotation", &log_annotation);
    let log_guid = files
        .create(
            "discovery",
            ElementBuilder::new("LogFile").with_qualified_name(Some("/logs/profile-1.log".into())),
        )
        .unwrap();

    let now = Utc::now();
    handler
        .link(
            "discovery",
            ElementRef::new(&annotation_guid, "DataProfileLogAnnotation"),
            ElementRef::new(&log_guid, "LogFile"),
            "DataProfileLogFile",
            Default::default(),
            None,
            now,
        )
        .unwrap();

    let read = handler.get_by_guid("discovery", &annotation_guid, Utc::now()).unwrap();
    assert_eq!(
        read.kind,
        AnnotationKind::ResourceProfileLog {
            log_file_names: vec!["/logs/profile-1.log".into()]
        }
    );
    assert_eq!(read.log_file_count(), 1);
}

#[test]
fn test_review_and_status_are_read_from_review_link() {
    let handler = annotation_handler();
    let services = handler.services().clone();
    let annotation_guid = store_annotation(&handler, "Annotation", &common("needs review"));

    let review = AnnotationReview {
        review_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        steward: Some("peter".into()),
        comment: Some("confirmed".into()),
    };
    let payload = review_builder(&review).build().unwrap();
    let (type_id, type_name) = services.registry.resolve_type("AnnotationReview").unwrap();
    let review_entity = services
        .store
        .create_entity(
            "peter",
            NewEntity {
                instance_type: InstanceType::new(type_id, type_name),
                status: Default::default(),
                properties: payload.properties,
                classifications: payload.classifications,
            },
        )
        .unwrap();

    handler
        .link_unchecked(
            "peter",
            &annotation_guid,
            &review_entity.guid,
            "AnnotationReviewLink",
            review_link_properties(AnnotationStatus::Approved),
            Utc::now(),
        )
        .unwrap();

    let read = handler.get_by_guid("discovery", &annotation_guid, Utc::now()).unwrap();
    assert_eq!(read.annotation_status, Some(AnnotationStatus::Approved));
    assert_eq!(read.review, Some(review));
}

#[test]
fn test_find_searches_summary_and_explanation() {
    let handler = annotation_handler();
    for (type_name, annotation) in samples() {
        store_annotation(&handler, type_name, &annotation);
    }
    let found = handler
        .find("discovery", "qual.*", Paging::all(), Utc::now())
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(matches!(found[0].kind, AnnotationKind::Quality { .. }));

    let sampled = handler
        .find("discovery", "sampled .* rows", Paging::all(), Utc::now())
        .unwrap();
    assert_eq!(sampled.len(), samples().len());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_quality_annotation_round_trips(
        summary in "[a-z][a-z ]{0,20}",
        dimension in "[a-z]{1,12}",
        score in -1000i32..1000,
        confidence in proptest::option::of(0i32..100),
    ) {
        let handler = annotation_handler();
        let original = Annotation {
            summary: Some(summary),
            confidence_level: confidence,
            kind: AnnotationKind::Quality {
                quality_dimension: Some(dimension),
                quality_score: Some(score),
            },
            ..Annotation::default()
        };
        let guid = store_annotation(&handler, "QualityAnnotation", &original);
        let mut read = handler.get_by_guid("discovery", &guid, Utc::now()).unwrap();
        read.header = None;
        prop_assert_eq!(read, original);
    }
}
