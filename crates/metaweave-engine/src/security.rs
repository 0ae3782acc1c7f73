//! Authorization collaborator.

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    Read,
    Create,
    Update,
    Delete,
}

impl AccessAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessAction::Read => "read",
            AccessAction::Create => "create",
            AccessAction::Update => "update",
            AccessAction::Delete => "delete",
        }
    }
}

/// What a caller is trying to touch.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub user_id: &'a str,
    pub action: AccessAction,
    pub type_name: &'a str,
    /// `None` for an element that does not exist yet.
    pub guid: Option<&'a str>,
}

impl AccessRequest<'_> {
    /// The error a verifier returns when it rejects this request.
    pub fn denied(&self) -> EngineError {
        EngineError::UserNotAuthorized {
            user_id: self.user_id.to_string(),
            action: self.action.as_str().to_string(),
            target: match self.guid {
                Some(guid) => format!("{} {guid}", self.type_name),
                None => format!("a new {}", self.type_name),
            },
        }
    }
}

/// Decides whether a user may read or change an element.
pub trait SecurityVerifier: Send + Sync {
    fn check_read_access(&self, request: &AccessRequest<'_>) -> EngineResult<()>;

    fn check_write_access(&self, request: &AccessRequest<'_>) -> EngineResult<()>;
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllVerifier;

impl SecurityVerifier for AllowAllVerifier {
    fn check_read_access(&self, _request: &AccessRequest<'_>) -> EngineResult<()> {
        Ok(())
    }

    fn check_write_access(&self, _request: &AccessRequest<'_>) -> EngineResult<()> {
        Ok(())
    }
}
