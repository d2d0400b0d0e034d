use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

use crate::config::IdentityConfig;
use crate::identity::{IdentityError, IdentityService, NewIdentity, TokenPair};

#[derive(Debug, Deserialize)]
struct AdminToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

impl ProviderErrorBody {
    fn describe(self, fallback: &str) -> String {
        self.error_description
            .or(self.error_message)
            .or(self.error)
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct UserRepresentation {
    id: String,
}

/// Keycloak admin + token API client. Administrative calls authenticate with
/// a fresh password-grant token on the master realm per operation; user-facing
/// authentication goes through the realm token endpoint with the configured
/// confidential client.
pub struct KeycloakClient {
    http: reqwest::Client,
    config: IdentityConfig,
}

impl KeycloakClient {
    pub fn new(config: IdentityConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn admin_url(&self, path: &str) -> String {
        format!(
            "{}/admin/realms/{}{}",
            self.config.base_url, self.config.realm, path
        )
    }

    fn token_url(&self, realm: &str) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.config.base_url, realm
        )
    }

    async fn admin_token(&self) -> Result<String, IdentityError> {
        let response = self
            .http
            .post(self.token_url("master"))
            .form(&[
                ("client_id", self.config.admin_client_id.as_str()),
                ("username", self.config.admin_username.as_str()),
                ("password", self.config.admin_password.as_str()),
                ("grant_type", "password"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let detail = response
                .json::<ProviderErrorBody>()
                .await
                .map(|b| b.describe("admin token request failed"))
                .unwrap_or_else(|_| "admin token request failed".to_string());
            error!("Failed to get admin token: {}", detail);
            return Err(IdentityError::Provider(detail));
        }

        Ok(response.json::<AdminToken>().await?.access_token)
    }

    async fn request_token_pair(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenPair, IdentityError> {
        let response = self
            .http
            .post(self.token_url(&self.config.realm))
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            let detail = response
                .json::<ProviderErrorBody>()
                .await
                .map(|b| b.describe("Invalid credentials"))
                .unwrap_or_else(|_| "Invalid credentials".to_string());
            return Err(IdentityError::Auth(detail));
        }
        if !status.is_success() {
            return Err(IdentityError::Provider(format!(
                "token endpoint returned {status}"
            )));
        }

        Ok(response.json::<TokenPair>().await?)
    }

    /// Resolve a provider user id by email; `None` when no identity matches.
    async fn find_identity_id_by_email(
        &self,
        admin_token: &str,
        email: &str,
    ) -> Result<Option<String>, IdentityError> {
        let response = self
            .http
            .get(self.admin_url("/users"))
            .bearer_auth(admin_token)
            .query(&[("email", email), ("exact", "true")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Provider(format!(
                "user lookup returned {}",
                response.status()
            )));
        }

        let users: Vec<UserRepresentation> = response.json().await?;
        Ok(users.into_iter().next().map(|u| u.id))
    }

    /// Fire the provider's action email asking the user to set a password.
    async fn execute_password_action_email(
        &self,
        admin_token: &str,
        identity_id: &str,
    ) -> Result<(), IdentityError> {
        let response = self
            .http
            .put(self.admin_url(&format!("/users/{identity_id}/execute-actions-email")))
            .bearer_auth(admin_token)
            .query(&[
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
            ])
            .json(&json!(["UPDATE_PASSWORD"]))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .json::<ProviderErrorBody>()
                .await
                .map(|b| b.describe("action email request failed"))
                .unwrap_or_else(|_| "action email request failed".to_string());
            error!("Failed to send action email ({}): {}", status, detail);
            return Err(IdentityError::Provider(detail));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityService for KeycloakClient {
    async fn create_identity(&self, identity: NewIdentity) -> Result<String, IdentityError> {
        let admin_token = self.admin_token().await?;

        let response = self
            .http
            .post(self.admin_url("/users"))
            .bearer_auth(&admin_token)
            .json(&json!({
                "username": identity.username,
                "email": identity.username,
                "firstName": identity.first_name,
                "lastName": identity.last_name,
                "enabled": true,
                "attributes": { "role": [identity.role.as_str()] },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ProviderErrorBody>()
                .await
                .map(|b| b.describe("user creation failed"))
                .unwrap_or_else(|_| "user creation failed".to_string());
            error!("Failed to register identity ({}): {}", status, detail);
            return Err(IdentityError::Provider(detail));
        }

        // Keycloak returns the new user's id only in the Location header.
        let identity_id = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| location.rsplit('/').next())
            .map(str::to_string)
            .ok_or_else(|| {
                IdentityError::Provider("user creation response had no Location header".to_string())
            })?;

        info!("Created identity {} for {}", identity_id, identity.username);
        Ok(identity_id)
    }

    async fn delete_identity(&self, identity_id: &str) -> Result<(), IdentityError> {
        let admin_token = self.admin_token().await?;
        let response = self
            .http
            .delete(self.admin_url(&format!("/users/{identity_id}")))
            .bearer_auth(&admin_token)
            .send()
            .await?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(IdentityError::Provider(format!(
                "identity deletion returned {}",
                response.status()
            )));
        }
        info!("Deleted identity {}", identity_id);
        Ok(())
    }

    async fn send_credential_setup_email(&self, identity_id: &str) -> Result<bool, IdentityError> {
        let admin_token = self.admin_token().await?;
        self.execute_password_action_email(&admin_token, identity_id)
            .await?;
        Ok(true)
    }

    async fn send_password_reset_email(&self, username: &str) -> Result<bool, IdentityError> {
        let admin_token = self.admin_token().await?;

        let identity_id = match self.find_identity_id_by_email(&admin_token, username).await? {
            Some(id) => id,
            None => return Ok(false),
        };

        self.execute_password_action_email(&admin_token, &identity_id)
            .await?;
        info!("Password reset email sent to {}", username);
        Ok(true)
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, IdentityError> {
        self.request_token_pair(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", username),
            ("password", password),
            ("grant_type", "password"),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, IdentityError> {
        self.request_token_pair(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}
