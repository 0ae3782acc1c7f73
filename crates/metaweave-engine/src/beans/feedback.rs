//! Comments, ratings and likes.
//!
//! Feedback is relationship-owned: each element hangs off the element it
//! describes through an `Attached*` relationship, and the relationship holds
//! `isPublic`.

use metaweave_store::{EntityDetail, PropertyValue, Relationship};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ElementHeader;
use crate::converter::{require_primary, ConversionInput, DispatchTable, ElementConverter};
use crate::element_builder::ElementBuilder;
use crate::error::EngineResult;
use crate::names;
use crate::property_codec::{OrdinalEnum, PropertyCursor};
use crate::type_registry::TypeRegistry;

const COMMENT_TYPE: &str = "commentType";
const COMMENT_TEXT: &str = "text";
const STARS: &str = "stars";
const REVIEW: &str = "review";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentType {
    #[default]
    Standard,
    Question,
    Answer,
    Suggestion,
    UsageExperience,
    Requirement,
    Other,
    Unknown,
}

impl OrdinalEnum for CommentType {
    fn ordinal(&self) -> i32 {
        match self {
            CommentType::Standard => 0,
            CommentType::Question => 1,
            CommentType::Answer => 2,
            CommentType::Suggestion => 3,
            CommentType::UsageExperience => 4,
            CommentType::Requirement => 5,
            CommentType::Other => 99,
            CommentType::Unknown => -1,
        }
    }

    fn symbolic_name(&self) -> &'static str {
        match self {
            CommentType::Standard => "StandardComment",
            CommentType::Question => "Question",
            CommentType::Answer => "Answer",
            CommentType::Suggestion => "Suggestion",
            CommentType::UsageExperience => "UsageExperience",
            CommentType::Requirement => "Requirement",
            CommentType::Other => "Other",
            CommentType::Unknown => "Unknown",
        }
    }

    fn from_ordinal(ordinal: i32) -> Self {
        match ordinal {
            0 => CommentType::Standard,
            1 => CommentType::Question,
            2 => CommentType::Answer,
            3 => CommentType::Suggestion,
            4 => CommentType::UsageExperience,
            5 => CommentType::Requirement,
            99 => CommentType::Other,
            _ => CommentType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StarRating {
    #[default]
    NotRecommended,
    OneStar,
    TwoStars,
    ThreeStars,
    FourStars,
    FiveStars,
    Unknown,
}

impl OrdinalEnum for StarRating {
    fn ordinal(&self) -> i32 {
        match self {
            StarRating::NotRecommended => 0,
            StarRating::OneStar => 1,
            StarRating::TwoStars => 2,
            StarRating::ThreeStars => 3,
            StarRating::FourStars => 4,
            StarRating::FiveStars => 5,
            StarRating::Unknown => -1,
        }
    }

    fn symbolic_name(&self) -> &'static str {
        match self {
            StarRating::NotRecommended => "NotRecommended",
            StarRating::OneStar => "OneStar",
            StarRating::TwoStars => "TwoStar",
            StarRating::ThreeStars => "ThreeStar",
            StarRating::FourStars => "FourStar",
            StarRating::FiveStars => "FiveStar",
            StarRating::Unknown => "Unknown",
        }
    }

    fn from_ordinal(ordinal: i32) -> Self {
        match ordinal {
            0 => StarRating::NotRecommended,
            1 => StarRating::OneStar,
            2 => StarRating::TwoStars,
            3 => StarRating::ThreeStars,
            4 => StarRating::FourStars,
            5 => StarRating::FiveStars,
            _ => StarRating::Unknown,
        }
    }
}

// ============================================================================
// Beans
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub header: ElementHeader,
    pub qualified_name: Option<String>,
    pub comment_type: CommentType,
    pub text: Option<String>,
    pub is_public: bool,
    pub additional_properties: BTreeMap<String, String>,
    pub extended_properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub header: ElementHeader,
    pub stars: StarRating,
    pub review: Option<String>,
    pub is_public: bool,
    pub extended_properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub header: ElementHeader,
    pub is_public: bool,
}

/// Absent fields are left out, so the same builder serves create and merge
/// update.
pub fn comment_builder(
    qualified_name: Option<String>,
    comment_type: Option<CommentType>,
    text: Option<String>,
) -> ElementBuilder {
    ElementBuilder::new(names::COMMENT)
        .with_qualified_name(qualified_name)
        .with_enum_property(COMMENT_TYPE, comment_type)
        .with_optional_property(COMMENT_TEXT, text)
}

pub fn rating_builder(stars: StarRating, review: Option<String>) -> ElementBuilder {
    ElementBuilder::new(names::RATING)
        .with_enum_property(STARS, Some(stars))
        .with_optional_property(REVIEW, review)
}

pub fn like_builder() -> ElementBuilder {
    ElementBuilder::new(names::LIKE)
}

/// `isPublic` from the attachment relationship where the element is end 2.
fn is_public(input: &ConversionInput<'_>, relationship_type: &'static str) -> bool {
    input
        .incoming(relationship_type)
        .last()
        .and_then(|r| r.properties.get(names::IS_PUBLIC))
        .map_or(false, |value| matches!(value, PropertyValue::Boolean(true)))
}

// ============================================================================
// Converters
// ============================================================================

pub struct CommentConverter {
    table: DispatchTable<()>,
}

impl CommentConverter {
    pub fn new(registry: &TypeRegistry) -> EngineResult<Self> {
        Ok(Self {
            table: DispatchTable::build(registry, names::COMMENT, Vec::new())?,
        })
    }
}

impl ElementConverter for CommentConverter {
    type Bean = Comment;

    fn family_type(&self) -> &str {
        names::COMMENT
    }

    fn searchable_properties(&self) -> &[&'static str] {
        &[names::QUALIFIED_NAME, COMMENT_TEXT]
    }

    fn supplementary_relationship_types(&self) -> &[&'static str] {
        &[names::ATTACHED_COMMENT]
    }

    fn convert(
        &self,
        primary: Option<&EntityDetail>,
        supplementary: &[EntityDetail],
        relationships: &[Relationship],
    ) -> EngineResult<Comment> {
        let primary = require_primary(primary, names::COMMENT)?;
        self.table.dispatch(primary)?;
        let input = ConversionInput {
            primary,
            supplementary,
            relationships,
        };

        let mut cursor = PropertyCursor::new(&primary.properties);
        Ok(Comment {
            header: ElementHeader::from_entity(primary),
            qualified_name: cursor.take(names::QUALIFIED_NAME),
            comment_type: cursor.take_enum(COMMENT_TYPE).unwrap_or_default(),
            text: cursor.take(COMMENT_TEXT),
            is_public: is_public(&input, names::ATTACHED_COMMENT),
            additional_properties: cursor.take_map(names::ADDITIONAL_PROPERTIES),
            extended_properties: cursor.into_remaining(),
        })
    }
}

pub struct RatingConverter {
    table: DispatchTable<()>,
}

impl RatingConverter {
    pub fn new(registry: &TypeRegistry) -> EngineResult<Self> {
        Ok(Self {
            table: DispatchTable::build(registry, names::RATING, Vec::new())?,
        })
    }
}

impl ElementConverter for RatingConverter {
    type Bean = Rating;

    fn family_type(&self) -> &str {
        names::RATING
    }

    fn searchable_properties(&self) -> &[&'static str] {
        &[REVIEW]
    }

    fn supplementary_relationship_types(&self) -> &[&'static str] {
        &[names::ATTACHED_RATING]
    }

    fn convert(
        &self,
        primary: Option<&EntityDetail>,
        supplementary: &[EntityDetail],
        relationships: &[Relationship],
    ) -> EngineResult<Rating> {
        let primary = require_primary(primary, names::RATING)?;
        self.table.dispatch(primary)?;
        let input = ConversionInput {
            primary,
            supplementary,
            relationships,
        };

        let mut cursor = PropertyCursor::new(&primary.properties);
        Ok(Rating {
            header: ElementHeader::from_entity(primary),
            stars: cursor.take_enum(STARS).unwrap_or(StarRating::Unknown),
            review: cursor.take(REVIEW),
            is_public: is_public(&input, names::ATTACHED_RATING),
            extended_properties: cursor.into_remaining(),
        })
    }
}

pub struct LikeConverter {
    table: DispatchTable<()>,
}

impl LikeConverter {
    pub fn new(registry: &TypeRegistry) -> EngineResult<Self> {
        Ok(Self {
            table: DispatchTable::build(registry, names::LIKE, Vec::new())?,
        })
    }
}

impl ElementConverter for LikeConverter {
    type Bean = Like;

    fn family_type(&self) -> &str {
        names::LIKE
    }

    fn searchable_properties(&self) -> &[&'static str] {
        &[]
    }

    fn supplementary_relationship_types(&self) -> &[&'static str] {
        &[names::ATTACHED_LIKE]
    }

    fn convert(
        &self,
        primary: Option<&EntityDetail>,
        supplementary: &[EntityDetail],
        relationships: &[Relationship],
    ) -> EngineResult<Like> {
        let primary = require_primary(primary, names::LIKE)?;
        self.table.dispatch(primary)?;
        let input = ConversionInput {
            primary,
            supplementary,
            relationships,
        };
        Ok(Like {
            header: ElementHeader::from_entity(primary),
            is_public: is_public(&input, names::ATTACHED_LIKE),
        })
    }
}
