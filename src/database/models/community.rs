use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Community row. Belongs to exactly one organization; soft-deleted via `active`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Community {
    pub id: Uuid,
    pub org_id: Uuid,
    pub comm_name: String,
    pub comm_type: Option<String>,
    pub block_num: i32,
    pub units_in_block: i32,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub features: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Column values for a new community row
#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub org_id: Uuid,
    pub comm_name: String,
    pub comm_type: Option<String>,
    pub block_num: i32,
    pub units_in_block: i32,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub features: Option<String>,
}

/// Profile fields replaced by an update. The community name is part of its
/// identity and is not changed through updates.
#[derive(Debug, Clone)]
pub struct CommunityChanges {
    pub comm_type: Option<String>,
    pub block_num: i32,
    pub units_in_block: i32,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub features: Option<String>,
}
