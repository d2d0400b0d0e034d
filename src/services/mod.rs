pub mod accounts;
pub mod dashboard;
pub mod provisioning;

use thiserror::Error;

use crate::database::store::StoreError;
use crate::identity::IdentityError;

/// Business-level error taxonomy. The first six variants are expected
/// outcomes whose messages go to the caller verbatim; `InconsistentState`
/// and `Store` are logged in full at the HTTP boundary and surfaced as
/// generic messages.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// The external identity call failed; nothing was persisted locally.
    #[error("{0}")]
    ProvisioningFailed(String),

    /// The identity provider reported success but the local mirror is
    /// missing: the two systems have diverged and need attention.
    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}
