use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Connection settings for the external identity provider (Keycloak).
/// Secrets are only ever read from the environment, never from tier defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub admin_client_id: String,
    pub admin_username: String,
    pub admin_password: String,
    /// Redirect target embedded in credential-setup and password-reset emails.
    pub redirect_uri: String,
    /// Realm RSA public key used to verify inbound access tokens. Accepts a
    /// full PEM block or the bare base64 body as exported by the realm settings.
    pub realm_public_key: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT_SECS") {
            self.database.connect_timeout_secs =
                v.parse().unwrap_or(self.database.connect_timeout_secs);
        }

        if let Ok(v) = env::var("KEYCLOAK_URL") {
            self.identity.base_url = v;
        }
        if let Ok(v) = env::var("KEYCLOAK_REALM") {
            self.identity.realm = v;
        }
        if let Ok(v) = env::var("KEYCLOAK_CLIENT_ID") {
            self.identity.client_id = v;
        }
        if let Ok(v) = env::var("KEYCLOAK_CLIENT_SECRET") {
            self.identity.client_secret = v;
        }
        if let Ok(v) = env::var("KEYCLOAK_ADMIN_CLIENT_ID") {
            self.identity.admin_client_id = v;
        }
        if let Ok(v) = env::var("KEYCLOAK_ADMIN_USERNAME") {
            self.identity.admin_username = v;
        }
        if let Ok(v) = env::var("KEYCLOAK_ADMIN_PASSWORD") {
            self.identity.admin_password = v;
        }
        if let Ok(v) = env::var("APP_REDIRECT_URI") {
            self.identity.redirect_uri = v;
        }
        if let Ok(v) = env::var("KEYCLOAK_REALM_PUBLIC_KEY") {
            self.identity.realm_public_key = v;
        }
        if let Ok(v) = env::var("IDENTITY_REQUEST_TIMEOUT_SECS") {
            self.identity.request_timeout_secs =
                v.parse().unwrap_or(self.identity.request_timeout_secs);
        }

        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    fn base_identity() -> IdentityConfig {
        IdentityConfig {
            base_url: "http://localhost:8080".to_string(),
            realm: "estate".to_string(),
            client_id: "EstateClient".to_string(),
            client_secret: String::new(),
            admin_client_id: "admin-cli".to_string(),
            admin_username: String::new(),
            admin_password: String::new(),
            redirect_uri: "http://localhost:5173".to_string(),
            realm_public_key: String::new(),
            request_timeout_secs: 10,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                max_connections: 10,
                connect_timeout_secs: 30,
            },
            identity: Self::base_identity(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                max_connections: 20,
                connect_timeout_secs: 10,
            },
            identity: Self::base_identity(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig { port: 3000 },
            database: DatabaseConfig {
                max_connections: 50,
                connect_timeout_secs: 5,
            },
            identity: Self::base_identity(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults() {
        let config = AppConfig::development();
        assert_eq!(config.database.max_connections, 10);
        assert!(config.security.enable_cors);
        assert_eq!(config.identity.admin_client_id, "admin-cli");
    }

    #[test]
    fn production_defaults_tighten_database() {
        let config = AppConfig::production();
        assert_eq!(config.database.max_connections, 50);
        assert_eq!(config.database.connect_timeout_secs, 5);
    }
}
