use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::database::models::user::{NewUser, Role, User};
use crate::database::store::EntityStore;
use crate::identity::{IdentityError, IdentityService, NewIdentity, TokenPair};
use crate::services::ServiceError;

/// Input for creating an account: a local mirror row plus its provider
/// identity. The username must be the admin's email; it is lowercased here.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub contact: Option<String>,
    pub role: Role,
}

/// A freshly registered account: the mirror row and the provider-side id.
#[derive(Debug, Clone)]
pub struct RegisteredAccount {
    pub user: User,
    pub identity_id: String,
}

/// Outcome of the standalone registration endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOutcome {
    pub user_id: String,
    pub status: &'static str,
}

/// Account lifecycle against the identity provider: registration (mirror row
/// + provider identity), login, password reset and token refresh.
pub struct AccountService<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
}

impl<S, I> Clone for AccountService<S, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            identity: Arc::clone(&self.identity),
        }
    }
}

impl<S: EntityStore, I: IdentityService> AccountService<S, I> {
    pub fn new(store: Arc<S>, identity: Arc<I>) -> Self {
        Self { store, identity }
    }

    /// Create the local mirror row, then the provider identity. If the
    /// provider call fails the mirror row is removed again so a failed
    /// registration persists nothing.
    pub async fn register(&self, account: NewAccount) -> Result<RegisteredAccount, ServiceError> {
        let username = account.username.trim().to_lowercase();
        if username.is_empty() || !username.contains('@') {
            return Err(ServiceError::Validation(
                "A valid email address is required as the username".to_string(),
            ));
        }

        if self.store.find_user_by_username(&username).await?.is_some() {
            return Err(ServiceError::Conflict("User already exists".to_string()));
        }

        let user = self
            .store
            .create_user(NewUser {
                username: username.clone(),
                email: username.clone(),
                first_name: account.first_name.clone(),
                last_name: account.last_name.clone(),
                role: account.role,
                contact: account.contact.clone(),
            })
            .await?;

        let identity_id = match self
            .identity
            .create_identity(NewIdentity {
                username: username.clone(),
                first_name: account.first_name,
                last_name: account.last_name,
                role: account.role,
            })
            .await
        {
            Ok(id) => id,
            Err(err) => {
                error!("identity creation failed for {}: {}", username, err);
                if let Err(cleanup_err) = self.store.delete_user(user.id).await {
                    warn!(
                        "could not remove mirror row for failed registration {}: {}",
                        username, cleanup_err
                    );
                }
                return Err(ServiceError::ProvisioningFailed(
                    "The admin identity could not be created in the identity provider".to_string(),
                ));
            }
        };

        Ok(RegisteredAccount { user, identity_id })
    }

    /// Registration as exposed by the auth endpoint: register, then ask the
    /// provider to email the credential-setup link.
    pub async fn register_with_notification(
        &self,
        account: NewAccount,
    ) -> Result<RegistrationOutcome, ServiceError> {
        let registered = self.register(account).await?;

        match self
            .identity
            .send_credential_setup_email(&registered.identity_id)
            .await
        {
            Ok(true) => Ok(RegistrationOutcome {
                user_id: registered.user.username,
                status: "Pending",
            }),
            Ok(false) => Err(ServiceError::ProvisioningFailed(
                "Error sending the verification email".to_string(),
            )),
            Err(err) => {
                warn!(
                    "credential setup email failed for {}: {}",
                    registered.user.username, err
                );
                Err(ServiceError::ProvisioningFailed(
                    "Error sending the verification email".to_string(),
                ))
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ServiceError> {
        let username = username.trim().to_lowercase();

        if self.store.find_user_by_username(&username).await?.is_none() {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }

        match self.identity.authenticate(&username, password).await {
            Ok(tokens) => Ok(tokens),
            Err(IdentityError::Auth(message)) => Err(ServiceError::Unauthorized(message)),
            Err(other) => Err(other.into()),
        }
    }

    /// `Ok(false)` means the provider knows no such identity; transport
    /// failures propagate as errors instead.
    pub async fn forgot_password(&self, email: &str) -> Result<bool, ServiceError> {
        let email = email.trim().to_lowercase();
        Ok(self.identity.send_password_reset_email(&email).await?)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        match self.identity.refresh_token(refresh_token).await {
            Ok(tokens) => Ok(tokens),
            Err(IdentityError::Auth(message)) => Err(ServiceError::Unauthorized(message)),
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, ScriptedIdentity};

    fn service(
        store: &Arc<MemoryStore>,
        identity: &Arc<ScriptedIdentity>,
    ) -> AccountService<MemoryStore, ScriptedIdentity> {
        AccountService::new(Arc::clone(store), Arc::clone(identity))
    }

    fn account(username: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            contact: None,
            role: Role::OrgAdmin,
        }
    }

    #[tokio::test]
    async fn register_lowercases_the_username() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let registered = service(&store, &identity)
            .register(account("Ada@Example.COM"))
            .await
            .unwrap();
        assert_eq!(registered.user.username, "ada@example.com");
        assert_eq!(registered.user.email, "ada@example.com");
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let svc = service(&store, &identity);
        svc.register(account("ada@example.com")).await.unwrap();
        let err = svc.register(account("ada@example.com")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(identity.create_calls(), 1);
    }

    #[tokio::test]
    async fn failed_identity_creation_leaves_no_mirror_row() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        identity.fail_next_create();
        let err = service(&store, &identity)
            .register(account("ada@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ProvisioningFailed(_)));
        assert!(store
            .find_user_by_username("ada@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn login_requires_a_mirror_row() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let err = service(&store, &identity)
            .login("ghost@example.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(identity.authenticate_calls(), 0);
    }

    #[tokio::test]
    async fn forgot_password_false_means_unknown_identity() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let sent = service(&store, &identity)
            .forgot_password("ghost@example.com")
            .await
            .unwrap();
        assert!(!sent);
    }
}
