use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Organization row. Top of the tenant hierarchy; soft-deleted via `active`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub org_name: String,
    pub org_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub reg_num: Option<String>,
    pub vat_id: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub doc_upload: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Column values for a new organization row
#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub org_name: String,
    pub org_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub reg_num: Option<String>,
    pub vat_id: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub doc_upload: Option<String>,
}

/// Profile fields replaced by an update. A `Some` name means a rename and is
/// subject to the same active-row uniqueness rule as creation.
#[derive(Debug, Clone)]
pub struct OrganizationChanges {
    pub org_name: Option<String>,
    pub org_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub reg_num: Option<String>,
    pub vat_id: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub doc_upload: Option<String>,
}

/// Slim projection used for scope checks and aggregation parent sets
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrganizationRef {
    pub id: Uuid,
    pub org_name: String,
}
