//! Well-known type, classification and property names.

// ============================================================================
// Types
// ============================================================================

pub const OPEN_METADATA_ROOT: &str = "OpenMetadataRoot";
pub const REFERENCEABLE: &str = "Referenceable";

pub const COMMENT: &str = "Comment";
pub const RATING: &str = "Rating";
pub const LIKE: &str = "Like";
pub const ATTACHED_COMMENT: &str = "AttachedComment";
pub const ATTACHED_RATING: &str = "AttachedRating";
pub const ATTACHED_LIKE: &str = "AttachedLike";

pub const ANNOTATION: &str = "Annotation";
pub const ANNOTATION_REVIEW: &str = "AnnotationReview";
pub const ANNOTATION_REVIEW_LINK: &str = "AnnotationReviewLink";
pub const DATA_PROFILE_LOG_FILE: &str = "DataProfileLogFile";

// ============================================================================
// Classifications
// ============================================================================

pub const ANCHORS: &str = "Anchors";
pub const ZONE_MEMBERSHIP_CLASSIFICATION: &str = "AssetZoneMembership";
pub const MEMENTO: &str = "Memento";
pub const OWNERSHIP: &str = "Ownership";
pub const TEMPLATE: &str = "Template";
pub const SECURITY_TAGS: &str = "SecurityTags";
pub const BUSINESS_SIGNIFICANCE: &str = "BusinessSignificance";

// ============================================================================
// Properties
// ============================================================================

pub const QUALIFIED_NAME: &str = "qualifiedName";
pub const ADDITIONAL_PROPERTIES: &str = "additionalProperties";
pub const ANCHOR_GUID: &str = "anchorGUID";
pub const ANCHOR_TYPE_NAME: &str = "anchorTypeName";
pub const ZONE_MEMBERSHIP: &str = "zoneMembership";
pub const IS_PUBLIC: &str = "isPublic";
