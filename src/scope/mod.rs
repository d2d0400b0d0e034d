use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::user::Role;
use crate::database::store::EntityStore;
use crate::services::ServiceError;

/// Explicit caller identity: email plus recognized role claims. Built once
/// per request from the verified token; nothing reads ambient session state.
#[derive(Debug, Clone)]
pub struct Principal {
    pub email: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(email: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            email: email.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn require_any(&self, allowed: &[Role]) -> Result<(), ServiceError> {
        if allowed.iter().any(|role| self.has_role(*role)) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "User does not have permission to access this resource".to_string(),
            ))
        }
    }
}

/// The slice of the hierarchy a principal may read and aggregate over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scope {
    Global,
    Organization(Uuid),
    Community(Uuid),
}

/// Derives a principal's scope from its role claims and email. Entity
/// resolution is a single indexed lookup by the bound admin user's email.
pub struct RoleResolver<S> {
    store: Arc<S>,
}

impl<S: EntityStore> RoleResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Role precedence when several claims are present:
    /// SuperAdmin > OrgAdmin > CommunityAdmin.
    pub async fn resolve(&self, principal: &Principal) -> Result<Scope, ServiceError> {
        if principal.roles.is_empty() || principal.email.is_empty() {
            return Err(ServiceError::Unauthorized(
                "User roles or email are missing from the token".to_string(),
            ));
        }

        if principal.has_role(Role::SuperAdmin) {
            return Ok(Scope::Global);
        }

        let email = principal.email.trim().to_lowercase();

        if principal.has_role(Role::OrgAdmin) {
            return match self.store.organization_id_for_admin_email(&email).await? {
                Some(org_id) => Ok(Scope::Organization(org_id)),
                None => Err(ServiceError::NotFound(format!(
                    "No organization found for admin \"{}\"",
                    principal.email
                ))),
            };
        }

        if principal.has_role(Role::CommunityAdmin) {
            return match self.store.community_id_for_admin_email(&email).await? {
                Some(community_id) => Ok(Scope::Community(community_id)),
                None => Err(ServiceError::NotFound(format!(
                    "No community found for admin \"{}\"",
                    principal.email
                ))),
            };
        }

        Err(ServiceError::Unauthorized(
            "User does not have a recognized role".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    fn resolver(store: Arc<MemoryStore>) -> RoleResolver<MemoryStore> {
        RoleResolver::new(store)
    }

    #[tokio::test]
    async fn empty_role_set_is_unauthorized() {
        let store = Arc::new(MemoryStore::new());
        let principal = Principal::new("nobody@acme.test", vec![]);
        let err = resolver(store).resolve(&principal).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn missing_email_is_unauthorized() {
        let store = Arc::new(MemoryStore::new());
        let principal = Principal::new("", vec![Role::SuperAdmin]);
        let err = resolver(store).resolve(&principal).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn super_admin_wins_over_other_roles() {
        let store = Arc::new(MemoryStore::new());
        let principal = Principal::new(
            "root@acme.test",
            vec![Role::OrgAdmin, Role::SuperAdmin],
        );
        let scope = resolver(store).resolve(&principal).await.unwrap();
        assert_eq!(scope, Scope::Global);
    }

    #[tokio::test]
    async fn org_admin_resolves_to_its_organization() {
        let store = Arc::new(MemoryStore::new());
        let org_id = store.seed_organization("Acme", "boss@acme.test");
        let principal = Principal::new("Boss@Acme.test", vec![Role::OrgAdmin]);
        let scope = resolver(store).resolve(&principal).await.unwrap();
        assert_eq!(scope, Scope::Organization(org_id));
    }

    #[tokio::test]
    async fn org_admin_without_matching_chain_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let principal = Principal::new("ghost@acme.test", vec![Role::OrgAdmin]);
        let err = resolver(store).resolve(&principal).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn community_admin_resolves_to_its_community() {
        let store = Arc::new(MemoryStore::new());
        let org_id = store.seed_organization("Acme", "boss@acme.test");
        let comm_id = store.seed_community(org_id, "north", 2, 10, "warden@acme.test");
        let principal = Principal::new("warden@acme.test", vec![Role::CommunityAdmin]);
        let scope = resolver(store).resolve(&principal).await.unwrap();
        assert_eq!(scope, Scope::Community(comm_id));
    }

    #[tokio::test]
    async fn inactive_organization_breaks_the_chain() {
        let store = Arc::new(MemoryStore::new());
        let org_id = store.seed_organization("Acme", "boss@acme.test");
        store.deactivate_org_raw(org_id);
        let principal = Principal::new("boss@acme.test", vec![Role::OrgAdmin]);
        let err = resolver(store).resolve(&principal).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
