use serde::Deserialize;
use std::collections::HashMap;

use crate::database::models::user::Role;
use crate::scope::Principal;

/// Per-client role grants inside an access token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims of a verified access token issued by the identity provider.
/// Only the fields this service reads are modelled.
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub resource_access: HashMap<String, ClientAccess>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

impl Claims {
    /// Reduce the token to the explicit principal value the rest of the
    /// system works with. Unrecognized role strings are dropped here, so an
    /// empty role set downstream means "nothing we grant access for".
    pub fn principal(&self, client_id: &str) -> Principal {
        let roles = self
            .resource_access
            .get(client_id)
            .map(|access| {
                access
                    .roles
                    .iter()
                    .filter_map(|role| Role::parse(role))
                    .collect()
            })
            .unwrap_or_default();

        let email = self
            .email
            .clone()
            .or_else(|| self.preferred_username.clone())
            .unwrap_or_default();

        Principal::new(email, roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_with_roles(roles: &[&str]) -> Claims {
        let mut resource_access = HashMap::new();
        resource_access.insert(
            "EstateClient".to_string(),
            ClientAccess {
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        Claims {
            sub: "abc".to_string(),
            email: Some("admin@acme.test".to_string()),
            preferred_username: None,
            resource_access,
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn extracts_roles_for_the_configured_client() {
        let principal = claims_with_roles(&["OrgAdmin"]).principal("EstateClient");
        assert_eq!(principal.roles, vec![Role::OrgAdmin]);
        assert_eq!(principal.email, "admin@acme.test");
    }

    #[test]
    fn other_clients_grant_nothing() {
        let principal = claims_with_roles(&["SuperAdmin"]).principal("OtherClient");
        assert!(principal.roles.is_empty());
    }

    #[test]
    fn unknown_role_strings_are_dropped() {
        let principal = claims_with_roles(&["Landlord", "CommunityAdmin"]).principal("EstateClient");
        assert_eq!(principal.roles, vec![Role::CommunityAdmin]);
    }
}
