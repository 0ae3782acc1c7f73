//! Engine error taxonomy.
//!
//! Every failure is scoped to the single operation that raised it. Input and
//! type errors are raised before any store call; store failures surface
//! without retry.

use metaweave_store::{Relationship, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameter {parameter}: {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("type {type_name} is not registered")]
    UnknownType { type_name: String },

    #[error("instance {guid} of type {actual} is not a {expected}")]
    InvalidInstanceType {
        guid: String,
        actual: String,
        expected: String,
    },

    #[error("no metadata instance supplied to the {family} converter")]
    MissingMetadataInstance { family: String },

    #[error("bean class mismatch: {0}")]
    InvalidBeanClass(String),

    #[error("no {relationship_type} relationship found for element {guid}")]
    MissingRelationship {
        guid: String,
        relationship_type: String,
    },

    #[error(
        "{} {relationship_type} relationships found for element {guid} where at most one is allowed",
        .relationships.len()
    )]
    AmbiguousRelationship {
        guid: String,
        relationship_type: String,
        relationships: Vec<Relationship>,
    },

    #[error("user {user_id} is not authorized to {action} {target}")]
    UserNotAuthorized {
        user_id: String,
        action: String,
        target: String,
    },

    #[error("property server error: {0}")]
    PropertyServer(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn invalid_parameter(parameter: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    /// Raised identically for a GUID that does not exist and for one the
    /// caller may not see.
    pub fn unknown_guid(guid: &str) -> Self {
        Self::invalid_parameter("guid", format!("no visible element with guid {guid}"))
    }

    pub fn unknown_type(type_name: &str) -> Self {
        EngineError::UnknownType {
            type_name: type_name.to_string(),
        }
    }

    /// True for the not-found flavour of `InvalidParameter`.
    pub fn is_unknown_guid(&self) -> bool {
        matches!(self, EngineError::InvalidParameter { parameter, .. } if parameter == "guid")
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EntityNotKnown { guid } | StoreError::RelationshipNotKnown { guid } => {
                EngineError::unknown_guid(&guid)
            }
            other => EngineError::PropertyServer(other.to_string()),
        }
    }
}

/// Reject empty identifiers and required text up front.
pub(crate) fn require_text(parameter: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid_parameter(parameter, "must not be empty"));
    }
    Ok(())
}
