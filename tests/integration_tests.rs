//! Integration tests for the complete Metaweave pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - `.typedefs` parsing → TypeRegistry
//! - ElementBuilder → InMemoryRepository → converters
//! - Feedback and annotations → anchors → cascade delete
//! - Snapshots and JSON configuration on disk
//!
//! Run with: cargo test --test integration_tests

use chrono::Utc;
use metaweave_engine::{
    Annotation, AnnotationBuilder, AnnotationConverter, AnnotationKind, CommentType,
    ElementBuilder, ElementRef, EngineConfig, EngineServices, FeedbackHandler,
    GenericElementHandler, ReferenceableConverter, StarRating, TypeRegistry,
};
use metaweave_store::{InMemoryRepository, InstanceProperties, Paging, RepositoryStore};
use metaweave_typedefs::digest::{type_id_v1, typedefs_digest_v1};
use metaweave_typedefs::parse_typedefs_v1;
use std::sync::Arc;
use tempfile::tempdir;

const OPEN_METADATA: &str = include_str!("../crates/metaweave-engine/typedefs/open_metadata.typedefs");

struct Session {
    registry: Arc<TypeRegistry>,
    store: Arc<InMemoryRepository>,
    assets: GenericElementHandler<ReferenceableConverter>,
    annotations: GenericElementHandler<AnnotationConverter>,
    feedback: FeedbackHandler,
}

impl Session {
    fn new(config: EngineConfig, store: Arc<InMemoryRepository>) -> Self {
        let registry = Arc::new(TypeRegistry::from_typedefs(OPEN_METADATA).unwrap());
        let services = EngineServices::new(config, registry.clone(), store.clone());
        Self {
            assets: GenericElementHandler::new(
                services.clone(),
                ReferenceableConverter::new(&registry, "Asset").unwrap(),
            )
            .unwrap(),
            annotations: GenericElementHandler::new(
                services.clone(),
                AnnotationConverter::new(registry.clone()).unwrap(),
            )
            .unwrap(),
            feedback: FeedbackHandler::new(services).unwrap(),
            registry,
            store,
        }
    }

    fn fresh() -> Self {
        Self::new(EngineConfig::default(), Arc::new(InMemoryRepository::new()))
    }

    fn asset(&self, type_name: &str, qualified_name: &str) -> String {
        self.assets
            .create(
                "erin",
                ElementBuilder::new(type_name).with_qualified_name(Some(qualified_name.into())),
            )
            .unwrap()
    }
}

// ============================================================================
// Type definitions
// ============================================================================

#[test]
fn test_bundled_typedefs_parse_and_register() {
    let module = parse_typedefs_v1(OPEN_METADATA).unwrap();
    assert!(module.entities.iter().any(|e| e.name == "LogFile"));
    assert!(module.relationships.iter().any(|r| r.name == "AttachedComment"));

    let registry = TypeRegistry::from_typedefs(OPEN_METADATA).unwrap();
    assert_eq!(registry.module_digest(), typedefs_digest_v1(OPEN_METADATA));
    assert!(registry.is_type_of("LogFile", "Asset"));
    assert!(registry.is_type_of("EventType", "Referenceable"));
    assert!(!registry.is_type_of("Rating", "Referenceable"));

    let (type_id, type_name) = registry.resolve_type("DataFile").unwrap();
    assert_eq!(type_id, type_id_v1("DataFile"));
    assert_eq!(type_name, "DataFile");

    let bundled = TypeRegistry::open_metadata().unwrap();
    assert_eq!(bundled.module_digest(), registry.module_digest());
}

// ============================================================================
// Assets, feedback and annotations
// ============================================================================

#[test]
fn test_catalog_workflow_and_cascade() {
    let session = Session::fresh();
    let now = Utc::now();
    let dataset = session.asset("DataSet", "warehouse.orders");
    let log = session.asset("LogFile", "profiler/2024-05-01.log");

    let comment = session
        .feedback
        .add_comment(
            "erin",
            ElementRef::new(&dataset, "Asset"),
            CommentType::Suggestion,
            "Partition by day",
            true,
            now,
        )
        .unwrap();
    session
        .feedback
        .add_reply("peter", &comment, CommentType::Answer, "Done", true, now)
        .unwrap();
    session
        .feedback
        .set_rating("peter", ElementRef::new(&dataset, "Asset"), StarRating::FourStars, None, true, now)
        .unwrap();

    let profile = Annotation {
        summary: Some("daily profile run".into()),
        kind: AnnotationKind::ResourceProfileLog {
            log_file_names: Vec::new(),
        },
        ..Annotation::default()
    };
    let builder = AnnotationBuilder::new(&session.registry, "DataProfileLogAnnotation", &profile)
        .unwrap()
        .into_element()
        .with_anchor(&dataset, Some("DataSet"));
    let annotation = session.annotations.create("profiler", builder).unwrap();
    session
        .annotations
        .link(
            "profiler",
            ElementRef::new(&dataset, "Asset"),
            ElementRef::new(&annotation, "Annotation"),
            "AssetAnnotation",
            InstanceProperties::new(),
            None,
            now,
        )
        .unwrap();
    session
        .annotations
        .link_unchecked("profiler", &annotation, &log, "DataProfileLogFile", InstanceProperties::new(), now)
        .unwrap();

    let read = session
        .annotations
        .get_by_guid("erin", &annotation, Utc::now())
        .unwrap();
    assert_eq!(read.summary.as_deref(), Some("daily profile run"));
    assert_eq!(
        read.kind,
        AnnotationKind::ResourceProfileLog {
            log_file_names: vec!["profiler/2024-05-01.log".to_string()],
        }
    );
    assert_eq!(session.store.entity_count(), 6);

    session.assets.delete("erin", &dataset, Some("warehouse.orders"), Utc::now()).unwrap();

    // The log file was linked, never anchored, so it survives.
    assert_eq!(session.store.entity_count(), 1);
    assert_eq!(session.store.relationship_count(), 0);
    assert!(session.store.get_entity(&log).is_ok());
}

// ============================================================================
// On-disk snapshot and configuration
// ============================================================================

#[test]
fn test_snapshot_restores_comments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("repository.bin");

    let session = Session::fresh();
    let dataset = session.asset("DataSet", "warehouse.customers");
    session
        .feedback
        .add_comment(
            "erin",
            ElementRef::new(&dataset, "Asset"),
            CommentType::Standard,
            "Contains PII",
            false,
            Utc::now(),
        )
        .unwrap();
    std::fs::write(&path, session.store.to_bytes().unwrap()).unwrap();

    let restored = Arc::new(InMemoryRepository::from_bytes(&std::fs::read(&path).unwrap()).unwrap());
    let reopened = Session::new(EngineConfig::default(), restored);
    let comments = reopened
        .feedback
        .get_comments("peter", ElementRef::new(&dataset, "Asset"), Paging::all(), Utc::now())
        .unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].text.as_deref(), Some("Contains PII"));
    assert!(!comments[0].is_public);
    assert_eq!(comments[0].header.anchor_guid.as_deref(), Some(dataset.as_str()));
}

#[test]
fn test_config_file_restricts_zones() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(
        &path,
        r#"{
            "server_name": "cocoMDS1",
            "zones": { "supported": ["data-lake"], "default": ["quarantine"] }
        }"#,
    )
    .unwrap();
    let config = EngineConfig::from_json_file(&path).unwrap();
    assert_eq!(config.server_name, "cocoMDS1");

    let store = Arc::new(InMemoryRepository::new());
    let writer = Session::new(EngineConfig::default(), store.clone());
    let reader = Session::new(config, store);

    let lake = writer
        .assets
        .create(
            "erin",
            ElementBuilder::new("DataSet")
                .with_qualified_name(Some("lake".into()))
                .with_zones(vec!["data-lake".into()]),
        )
        .unwrap();
    let hidden = writer
        .assets
        .create(
            "erin",
            ElementBuilder::new("DataSet")
                .with_qualified_name(Some("hidden".into()))
                .with_zones(vec!["finance".into()]),
        )
        .unwrap();
    // Created through the restricted service: lands in its default zone,
    // which it cannot read.
    let quarantined = reader.asset("DataSet", "incoming");

    assert!(reader.assets.get_by_guid("peter", &lake, Utc::now()).is_ok());
    assert!(reader
        .assets
        .get_by_guid("peter", &hidden, Utc::now())
        .unwrap_err()
        .is_unknown_guid());
    assert!(reader
        .assets
        .get_by_guid("peter", &quarantined, Utc::now())
        .unwrap_err()
        .is_unknown_guid());
    assert!(writer.assets.get_by_guid("erin", &quarantined, Utc::now()).is_ok());

    let found = reader
        .assets
        .find("peter", ".*", Paging::all(), Utc::now())
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].qualified_name.as_deref(), Some("lake"));
}
