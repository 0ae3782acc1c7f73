//! Comments, ratings and likes end to end

use chrono::Utc;
use metaweave_engine::{
    AccessRequest, CommentType, ElementBuilder, ElementRef, EngineConfig, EngineError,
    EngineResult, EngineServices, FeedbackHandler, GenericElementHandler, ReferenceableConverter,
    SecurityVerifier, StarRating, TypeRegistry,
};
use metaweave_store::{InMemoryRepository, InstanceProperties, Paging, PropertyValue, RepositoryStore};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Hides the listed elements from one user.
struct HiddenFrom {
    user_id: &'static str,
    guids: Mutex<HashSet<String>>,
}

impl HiddenFrom {
    fn hide(&self, guid: &str) {
        self.guids.lock().insert(guid.to_string());
    }
}

impl SecurityVerifier for HiddenFrom {
    fn check_read_access(&self, request: &AccessRequest<'_>) -> EngineResult<()> {
        let hidden = request.user_id == self.user_id
            && request.guid.map_or(false, |guid| self.guids.lock().contains(guid));
        if hidden {
            Err(request.denied())
        } else {
            Ok(())
        }
    }

    fn check_write_access(&self, _request: &AccessRequest<'_>) -> EngineResult<()> {
        Ok(())
    }
}

struct Fixture {
    assets: GenericElementHandler<ReferenceableConverter>,
    feedback: FeedbackHandler,
    store: Arc<InMemoryRepository>,
    asset: String,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(EngineConfig::default(), None)
    }

    fn with_read_checks(verifier: Arc<HiddenFrom>) -> Self {
        let config = EngineConfig {
            check_read_access: true,
            ..EngineConfig::default()
        };
        Self::with_config(config, Some(verifier))
    }

    fn with_config(config: EngineConfig, verifier: Option<Arc<HiddenFrom>>) -> Self {
        let store = Arc::new(InMemoryRepository::new());
        let registry = Arc::new(TypeRegistry::open_metadata().unwrap());
        let mut services = EngineServices::new(config, registry.clone(), store.clone());
        if let Some(verifier) = verifier {
            services = services.with_security(verifier);
        }
        let assets = GenericElementHandler::new(
            services.clone(),
            ReferenceableConverter::new(&registry, "Asset").unwrap(),
        )
        .unwrap();
        let feedback = FeedbackHandler::new(services).unwrap();
        let asset = assets
            .create(
                "erin",
                ElementBuilder::new("DataFile").with_qualified_name(Some("sales.csv".into())),
            )
            .unwrap();
        Self {
            assets,
            feedback,
            store,
            asset,
        }
    }

    fn asset_ref(&self) -> ElementRef<'_> {
        ElementRef::new(&self.asset, "Asset")
    }
}

#[test]
fn test_comment_lifecycle() {
    let fx = Fixture::new();
    let now = Utc::now();

    let guid = fx
        .feedback
        .add_comment("erin", fx.asset_ref(), CommentType::Question, "Is this current?", true, now)
        .unwrap();

    let comment = fx.feedback.get_comment("erin", &guid, Utc::now()).unwrap();
    assert!(comment.qualified_name.as_deref().unwrap().starts_with("Comment::"));
    assert_eq!(comment.comment_type, CommentType::Question);
    assert!(comment.is_public);
    assert_eq!(comment.header.anchor_guid.as_deref(), Some(fx.asset.as_str()));

    // A caller-set property on the attachment survives later updates.
    fx.feedback
        .update_comment_attachment(
            "erin",
            &guid,
            InstanceProperties::new().with("label", PropertyValue::String("pinned".into())),
            true,
            Utc::now(),
        )
        .unwrap();

    fx.feedback
        .update_comment("erin", &guid, None, Some("Is this still current?"), None, true, Utc::now())
        .unwrap();

    let comment = fx.feedback.get_comment("erin", &guid, Utc::now()).unwrap();
    assert_eq!(comment.text.as_deref(), Some("Is this still current?"));
    assert_eq!(comment.comment_type, CommentType::Question);
    assert!(comment.is_public);
    let relationships = fx
        .store
        .get_relationships_for_entity(&guid, Some("AttachedComment"))
        .unwrap();
    assert_eq!(relationships.len(), 1);
    assert_eq!(
        relationships[0].properties.get_string("label"),
        Some("pinned")
    );

    fx.feedback
        .update_comment("erin", &guid, None, None, Some(false), true, Utc::now())
        .unwrap();
    assert!(!fx.feedback.get_comment("erin", &guid, Utc::now()).unwrap().is_public);

    fx.feedback.remove_comment("erin", &guid, Utc::now()).unwrap();
    assert!(fx
        .feedback
        .get_comment("erin", &guid, Utc::now())
        .unwrap_err()
        .is_unknown_guid());
    assert_eq!(fx.store.relationship_count(), 0);
    assert_eq!(fx.store.entity_count(), 1);
    assert!(fx
        .feedback
        .get_comments("erin", fx.asset_ref(), Paging::all(), Utc::now())
        .unwrap()
        .is_empty());
}

#[test]
fn test_replies_share_the_parent_anchor() {
    let fx = Fixture::new();
    let now = Utc::now();
    let comment = fx
        .feedback
        .add_comment("erin", fx.asset_ref(), CommentType::Standard, "first", true, now)
        .unwrap();
    let reply = fx
        .feedback
        .add_reply("peter", &comment, CommentType::Answer, "agreed", false, Utc::now())
        .unwrap();

    let read = fx.feedback.get_comment("peter", &reply, Utc::now()).unwrap();
    assert_eq!(read.header.anchor_guid.as_deref(), Some(fx.asset.as_str()));
    assert!(!read.is_public);

    let thread = fx
        .feedback
        .get_comments("erin", ElementRef::new(&comment, "Comment"), Paging::all(), Utc::now())
        .unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].header.guid, reply);
    assert_eq!(fx.feedback.count_comments("erin", fx.asset_ref(), Utc::now()).unwrap(), 1);

    fx.feedback.remove_comment("erin", &comment, Utc::now()).unwrap();
    assert_eq!(fx.store.entity_count(), 1);
}

#[test]
fn test_comment_text_is_required() {
    let fx = Fixture::new();
    let err = fx
        .feedback
        .add_comment("erin", fx.asset_ref(), CommentType::Standard, "  ", true, Utc::now())
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter { .. }));
    assert_eq!(fx.store.entity_count(), 1);
}

#[test]
fn test_one_rating_per_user() {
    let fx = Fixture::new();
    fx.feedback
        .set_rating("erin", fx.asset_ref(), StarRating::TwoStars, None, true, Utc::now())
        .unwrap();
    fx.feedback
        .set_rating(
            "erin",
            fx.asset_ref(),
            StarRating::FourStars,
            Some("better after the fix".into()),
            true,
            Utc::now(),
        )
        .unwrap();
    fx.feedback
        .set_rating("peter", fx.asset_ref(), StarRating::OneStar, None, false, Utc::now())
        .unwrap();

    let ratings = fx
        .feedback
        .get_ratings("erin", fx.asset_ref(), Paging::all(), Utc::now())
        .unwrap();
    assert_eq!(ratings.len(), 2);
    let erin = ratings.iter().find(|r| r.header.created_by == "erin").unwrap();
    assert_eq!(erin.stars, StarRating::FourStars);
    assert_eq!(erin.review.as_deref(), Some("better after the fix"));
    assert!(erin.is_public);

    fx.feedback
        .remove_rating("peter", fx.asset_ref(), Utc::now())
        .unwrap();
    assert!(matches!(
        fx.feedback.remove_rating("peter", fx.asset_ref(), Utc::now()),
        Err(EngineError::MissingRelationship { .. })
    ));
}

#[test]
fn test_likes_are_idempotent_per_user() {
    let fx = Fixture::new();
    let first = fx
        .feedback
        .add_like("erin", fx.asset_ref(), true, Utc::now())
        .unwrap();
    let again = fx
        .feedback
        .add_like("erin", fx.asset_ref(), true, Utc::now())
        .unwrap();
    assert_eq!(first, again);
    fx.feedback
        .add_like("peter", fx.asset_ref(), false, Utc::now())
        .unwrap();

    let likes = fx
        .feedback
        .get_likes("erin", fx.asset_ref(), Paging::all(), Utc::now())
        .unwrap();
    assert_eq!(likes.len(), 2);

    fx.feedback.remove_like("erin", fx.asset_ref(), Utc::now()).unwrap();
    assert_eq!(
        fx.feedback
            .get_likes("erin", fx.asset_ref(), Paging::all(), Utc::now())
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_deleting_the_asset_removes_all_feedback() {
    let fx = Fixture::new();
    let comment = fx
        .feedback
        .add_comment("erin", fx.asset_ref(), CommentType::Standard, "c", true, Utc::now())
        .unwrap();
    fx.feedback
        .add_reply("peter", &comment, CommentType::Answer, "r", true, Utc::now())
        .unwrap();
    fx.feedback
        .set_rating("erin", fx.asset_ref(), StarRating::FiveStars, None, true, Utc::now())
        .unwrap();
    fx.feedback
        .add_like("peter", fx.asset_ref(), true, Utc::now())
        .unwrap();
    assert_eq!(fx.store.entity_count(), 5);

    fx.assets.delete("erin", &fx.asset, None, Utc::now()).unwrap();
    assert_eq!(fx.store.entity_count(), 0);
    assert_eq!(fx.store.relationship_count(), 0);
}

#[test]
fn test_feedback_on_unknown_parent_creates_nothing() {
    let fx = Fixture::new();
    let err = fx
        .feedback
        .add_comment(
            "erin",
            ElementRef::new("no-such-guid", "Asset"),
            CommentType::Standard,
            "hello",
            true,
            Utc::now(),
        )
        .unwrap_err();
    assert!(err.is_unknown_guid());
    assert_eq!(fx.store.entity_count(), 1);
}

#[test]
fn test_denied_comments_neither_take_page_slots_nor_count() {
    let verifier = Arc::new(HiddenFrom {
        user_id: "mallory",
        guids: Mutex::new(HashSet::new()),
    });
    let fx = Fixture::with_read_checks(verifier.clone());
    let hidden = fx
        .feedback
        .add_comment("erin", fx.asset_ref(), CommentType::Standard, "internal only", true, Utc::now())
        .unwrap();
    let shown = fx
        .feedback
        .add_comment("erin", fx.asset_ref(), CommentType::Standard, "for everyone", true, Utc::now())
        .unwrap();
    verifier.hide(&hidden);

    let first_page = fx
        .feedback
        .get_comments("mallory", fx.asset_ref(), Paging::new(0, 1), Utc::now())
        .unwrap();
    assert_eq!(first_page.len(), 1);
    assert_eq!(first_page[0].header.guid, shown);

    let all = fx
        .feedback
        .get_comments("mallory", fx.asset_ref(), Paging::all(), Utc::now())
        .unwrap();
    let counted = fx
        .feedback
        .count_comments("mallory", fx.asset_ref(), Utc::now())
        .unwrap();
    assert_eq!(all.len(), counted);
    assert_eq!(counted, 1);
    assert_eq!(fx.feedback.count_comments("erin", fx.asset_ref(), Utc::now()).unwrap(), 2);
}

#[test]
fn test_removing_a_comment_removes_the_whole_thread() {
    let fx = Fixture::new();
    let comment = fx
        .feedback
        .add_comment("erin", fx.asset_ref(), CommentType::Question, "why?", true, Utc::now())
        .unwrap();
    let reply = fx
        .feedback
        .add_reply("peter", &comment, CommentType::Answer, "because", true, Utc::now())
        .unwrap();
    let nested = fx
        .feedback
        .add_reply("erin", &reply, CommentType::Standard, "thanks", true, Utc::now())
        .unwrap();
    assert_eq!(fx.store.entity_count(), 4);

    fx.feedback.remove_comment("erin", &comment, Utc::now()).unwrap();
    for guid in [&comment, &reply, &nested] {
        assert!(fx.store.get_entity(guid).is_err());
    }
    assert_eq!(fx.store.entity_count(), 1);
    assert_eq!(fx.store.relationship_count(), 0);
}
