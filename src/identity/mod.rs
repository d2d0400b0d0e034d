pub mod keycloak;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::user::Role;

/// Errors from the external identity provider
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider rejected the request: {0}")]
    Provider(String),

    /// Credential rejection; the message is safe to show to the caller.
    #[error("{0}")]
    Auth(String),
}

/// Payload for creating a provider identity. The username is the lowercased
/// email and is also used as the provider email address.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Token pair returned by the provider on authentication or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub token_type: String,
}

/// Thin RPC contract around the external identity provider. The core treats
/// the provider as opaque: no retries, no token caching beyond a single call.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Create an identity and return the provider-side id.
    async fn create_identity(&self, identity: NewIdentity) -> Result<String, IdentityError>;

    /// Compensating delete for a provisioning run whose local half failed.
    async fn delete_identity(&self, identity_id: &str) -> Result<(), IdentityError>;

    /// Ask the provider to email a credential-setup link to a fresh identity.
    async fn send_credential_setup_email(&self, identity_id: &str) -> Result<bool, IdentityError>;

    /// `Ok(false)` specifically means "identity not found", not a transport
    /// failure.
    async fn send_password_reset_email(&self, username: &str) -> Result<bool, IdentityError>;

    async fn authenticate(&self, username: &str, password: &str)
        -> Result<TokenPair, IdentityError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, IdentityError>;
}
