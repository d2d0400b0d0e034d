use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Administrative roles recognized by this system. Stored as text in the
/// local mirror and mirrored as client roles in the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    SuperAdmin,
    OrgAdmin,
    CommunityAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SuperAdmin",
            Role::OrgAdmin => "OrgAdmin",
            Role::CommunityAdmin => "CommunityAdmin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "SuperAdmin" => Some(Role::SuperAdmin),
            "OrgAdmin" => Some(Role::OrgAdmin),
            "CommunityAdmin" => Some(Role::CommunityAdmin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local mirror of an identity held by the external provider. The username is
/// the lowercased email and doubles as the provider username; the optional
/// organization/community relation marks the entity this user administers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub contact: Option<String>,
    pub organization_id: Option<Uuid>,
    pub community_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

/// Column values for a new mirror row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub contact: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::SuperAdmin, Role::OrgAdmin, Role::CommunityAdmin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("Landlord"), None);
    }
}
