//! Comments, ratings and likes on any `Referenceable`.
//!
//! ```text
//! parent ──AttachedComment{isPublic}──► Comment ──AttachedComment──► reply
//!        ──AttachedRating{isPublic}───► Rating   (one per user)
//!        ──AttachedLike{isPublic}─────► Like     (one per user)
//! ```
//!
//! Every feedback element is anchored to the parent's anchor (or the parent
//! itself), so deleting the anchor removes the whole thread.

use chrono::{DateTime, Utc};
use metaweave_store::{InstanceProperties, Paging, PropertyValue};

use crate::anchors::AnchorPropagator;
use crate::attachments::{AttachedQuery, Direction, ElementRef};
use crate::beans::feedback::{
    comment_builder, like_builder, rating_builder, Comment, CommentConverter, CommentType, Like,
    LikeConverter, Rating, RatingConverter, StarRating,
};
use crate::converter::ElementConverter;
use crate::element_builder::ElementBuilder;
use crate::error::{require_text, EngineError, EngineResult};
use crate::handler::{EngineServices, GenericElementHandler};
use crate::names;
use crate::type_registry::End;

pub struct FeedbackHandler {
    comments: GenericElementHandler<CommentConverter>,
    ratings: GenericElementHandler<RatingConverter>,
    likes: GenericElementHandler<LikeConverter>,
}

impl FeedbackHandler {
    pub fn new(services: EngineServices) -> EngineResult<Self> {
        let registry = services.registry.clone();
        Ok(Self {
            comments: GenericElementHandler::new(services.clone(), CommentConverter::new(&registry)?)?,
            ratings: GenericElementHandler::new(services.clone(), RatingConverter::new(&registry)?)?,
            likes: GenericElementHandler::new(services, LikeConverter::new(&registry)?)?,
        })
    }

    // ========================================================================
    // Comments
    // ========================================================================

    pub fn add_comment(
        &self,
        user_id: &str,
        parent: ElementRef<'_>,
        comment_type: CommentType,
        text: &str,
        is_public: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<String> {
        require_text("commentText", text)?;
        let builder = comment_builder(None, Some(comment_type), Some(text.to_string()));
        attach(
            &self.comments,
            user_id,
            parent,
            builder,
            names::ATTACHED_COMMENT,
            is_public,
            effective_time,
        )
    }

    /// A comment on a comment.
    pub fn add_reply(
        &self,
        user_id: &str,
        comment_guid: &str,
        comment_type: CommentType,
        text: &str,
        is_public: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<String> {
        self.add_comment(
            user_id,
            ElementRef::new(comment_guid, names::COMMENT),
            comment_type,
            text,
            is_public,
            effective_time,
        )
    }

    /// `None` fields are left alone on a merge update. `is_public` updates
    /// the attachment relationship, keeping its other properties.
    pub fn update_comment(
        &self,
        user_id: &str,
        guid: &str,
        comment_type: Option<CommentType>,
        text: Option<&str>,
        is_public: Option<bool>,
        is_merge_update: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let builder = comment_builder(None, comment_type, text.map(str::to_string));
        self.comments
            .update(user_id, guid, builder, is_merge_update, effective_time)?;
        if let Some(is_public) = is_public {
            self.comments.update_single(
                user_id,
                guid,
                End::End2,
                names::ATTACHED_COMMENT,
                public_flag(is_public),
                true,
                effective_time,
            )?;
        }
        Ok(())
    }

    /// Change properties of the relationship attaching the comment to its
    /// parent.
    pub fn update_comment_attachment(
        &self,
        user_id: &str,
        guid: &str,
        properties: InstanceProperties,
        is_merge_update: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.comments.update_single(
            user_id,
            guid,
            End::End2,
            names::ATTACHED_COMMENT,
            properties,
            is_merge_update,
            effective_time,
        )?;
        Ok(())
    }

    /// Delete the comment, its replies first. Comments are only removed
    /// through here so a thread never leaves replies behind.
    pub fn remove_comment(&self, user_id: &str, guid: &str, effective_time: DateTime<Utc>) -> EngineResult<()> {
        let replies = self
            .comments
            .get_attached(user_id, &replies_of(guid, effective_time))?;
        for reply in replies {
            self.remove_comment(user_id, &reply.header.guid, effective_time)?;
        }
        self.comments.delete(user_id, guid, None, effective_time)
    }

    pub fn get_comment(&self, user_id: &str, guid: &str, effective_time: DateTime<Utc>) -> EngineResult<Comment> {
        self.comments.get_by_guid(user_id, guid, effective_time)
    }

    pub fn get_comments(
        &self,
        user_id: &str,
        parent: ElementRef<'_>,
        paging: Paging,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Vec<Comment>> {
        let query = feedback_query(parent, names::ATTACHED_COMMENT, effective_time).paging(paging);
        self.comments.get_attached(user_id, &query)
    }

    pub fn count_comments(
        &self,
        user_id: &str,
        parent: ElementRef<'_>,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<usize> {
        self.comments
            .count_attached(user_id, &feedback_query(parent, names::ATTACHED_COMMENT, effective_time))
    }

    // ========================================================================
    // Ratings
    // ========================================================================

    /// One rating per user: an existing rating from `user_id` is removed
    /// first. The remove and create are separate store calls.
    pub fn set_rating(
        &self,
        user_id: &str,
        parent: ElementRef<'_>,
        stars: StarRating,
        review: Option<String>,
        is_public: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<String> {
        if let Err(err) = self.remove_rating(user_id, parent, effective_time) {
            tracing::debug!(user_id, parent = parent.guid, error = %err, "no previous rating to replace");
        }
        attach(
            &self.ratings,
            user_id,
            parent,
            rating_builder(stars, review),
            names::ATTACHED_RATING,
            is_public,
            effective_time,
        )
    }

    pub fn remove_rating(
        &self,
        user_id: &str,
        parent: ElementRef<'_>,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let existing = self
            .get_ratings(user_id, parent, Paging::all(), effective_time)?
            .into_iter()
            .find(|r| r.header.created_by == user_id)
            .ok_or_else(|| EngineError::MissingRelationship {
                guid: parent.guid.to_string(),
                relationship_type: names::ATTACHED_RATING.to_string(),
            })?;
        self.ratings
            .delete(user_id, &existing.header.guid, None, effective_time)
    }

    pub fn get_ratings(
        &self,
        user_id: &str,
        parent: ElementRef<'_>,
        paging: Paging,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Vec<Rating>> {
        let query = feedback_query(parent, names::ATTACHED_RATING, effective_time).paging(paging);
        self.ratings.get_attached(user_id, &query)
    }

    // ========================================================================
    // Likes
    // ========================================================================

    /// One like per user; a repeat returns the existing like.
    pub fn add_like(
        &self,
        user_id: &str,
        parent: ElementRef<'_>,
        is_public: bool,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<String> {
        let existing = self
            .get_likes(user_id, parent, Paging::all(), effective_time)?
            .into_iter()
            .find(|l| l.header.created_by == user_id);
        if let Some(existing) = existing {
            return Ok(existing.header.guid);
        }
        attach(
            &self.likes,
            user_id,
            parent,
            like_builder(),
            names::ATTACHED_LIKE,
            is_public,
            effective_time,
        )
    }

    pub fn remove_like(&self, user_id: &str, parent: ElementRef<'_>, effective_time: DateTime<Utc>) -> EngineResult<()> {
        let existing = self
            .get_likes(user_id, parent, Paging::all(), effective_time)?
            .into_iter()
            .find(|l| l.header.created_by == user_id)
            .ok_or_else(|| EngineError::MissingRelationship {
                guid: parent.guid.to_string(),
                relationship_type: names::ATTACHED_LIKE.to_string(),
            })?;
        self.likes
            .delete(user_id, &existing.header.guid, None, effective_time)
    }

    pub fn get_likes(
        &self,
        user_id: &str,
        parent: ElementRef<'_>,
        paging: Paging,
        effective_time: DateTime<Utc>,
    ) -> EngineResult<Vec<Like>> {
        let query = feedback_query(parent, names::ATTACHED_LIKE, effective_time).paging(paging);
        self.likes.get_attached(user_id, &query)
    }
}

/// Create a feedback element anchored with `parent` and attach it. A failed
/// attach removes the new element again.
fn attach<C: ElementConverter>(
    handler: &GenericElementHandler<C>,
    user_id: &str,
    parent: ElementRef<'_>,
    builder: ElementBuilder,
    relationship_type: &str,
    is_public: bool,
    effective_time: DateTime<Utc>,
) -> EngineResult<String> {
    let parent_entity = handler.fetch_visible(parent.guid, effective_time)?;
    let (anchor_guid, anchor_type) = AnchorPropagator::derive_anchor(&parent_entity);
    let builder = AnchorPropagator::set_anchor(builder, &anchor_guid, Some(&anchor_type));
    let guid = handler.create(user_id, builder)?;

    let linked = handler.link(
        user_id,
        parent,
        ElementRef::new(&guid, handler.converter().family_type()),
        relationship_type,
        public_flag(is_public),
        None,
        effective_time,
    );
    if let Err(err) = linked {
        tracing::warn!(guid = %guid, relationship_type, error = %err, "attach failed; removing new element");
        if let Err(cleanup) = handler.anchors().purge(user_id, &guid) {
            tracing::warn!(guid = %guid, error = %cleanup, "could not remove unattached element");
        }
        return Err(err);
    }
    Ok(guid)
}

fn public_flag(is_public: bool) -> InstanceProperties {
    InstanceProperties::new().with(names::IS_PUBLIC, PropertyValue::Boolean(is_public))
}

fn feedback_query<'a>(
    parent: ElementRef<'a>,
    relationship_type: &'a str,
    effective_time: DateTime<Utc>,
) -> AttachedQuery<'a> {
    AttachedQuery::new(parent, effective_time)
        .relationship_type(relationship_type)
        .direction(Direction::FromEnd1)
}

fn replies_of(comment_guid: &str, effective_time: DateTime<Utc>) -> AttachedQuery<'_> {
    feedback_query(
        ElementRef::new(comment_guid, names::COMMENT),
        names::ATTACHED_COMMENT,
        effective_time,
    )
}
