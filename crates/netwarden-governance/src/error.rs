//! Governance error types.

use thiserror::Error;

use netwarden_state::{CatalogEntryId, RequestId, StateError, TemplateId};

/// Errors surfaced to the caller of a governance operation. When one is
/// returned, nothing the operation attempted has been committed.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("{0} is not an administrator")]
    Unauthorized(String),

    #[error("change request {0} not found")]
    RequestNotFound(RequestId),

    #[error("{kind} {id} not found")]
    TargetNotFound { kind: &'static str, id: u64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("catalog entry {0} is not approved")]
    CatalogEntryNotApproved(CatalogEntryId),

    #[error("template {0} is not approved")]
    TemplateNotApproved(TemplateId),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type GovernanceResult<T> = Result<T, GovernanceError>;

impl GovernanceError {
    pub(crate) fn missing(kind: &'static str, id: u64) -> Self {
        GovernanceError::TargetNotFound { kind, id }
    }
}
