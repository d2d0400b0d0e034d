use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Landlord row. Pure child record of a community with no bound identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Landlord {
    pub id: Uuid,
    pub community_id: Uuid,
    pub block_name: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub contact: Option<String>,
}
