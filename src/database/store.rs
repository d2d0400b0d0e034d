use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::community::{Community, CommunityChanges, NewCommunity};
use crate::database::models::landlord::Landlord;
use crate::database::models::organization::{
    NewOrganization, Organization, OrganizationChanges, OrganizationRef,
};
use crate::database::models::user::{NewUser, User};

/// Errors from the entity store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// The database's own unique constraint fired. This is the final arbiter
    /// for concurrent creates racing past the application-level check.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::UniqueViolation(db_err.message().to_string());
            }
        }
        StoreError::Sqlx(err)
    }
}

/// Transactional access to the relational schema.
///
/// Methods taking `&mut Self::Tx` run inside a caller-held transaction;
/// dropping the transaction without committing rolls it back, so every exit
/// path (error, panic, cancellation) releases the connection cleanly. The
/// remaining methods are single-shot pooled reads/writes used for scope
/// resolution, login lookups and the batched aggregation queries.
#[async_trait]
pub trait EntityStore: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;

    // ---- transactional primitives ----

    async fn org_by_name(
        &self,
        tx: &mut Self::Tx,
        org_name: &str,
    ) -> Result<Option<Organization>, StoreError>;

    async fn org_by_id(&self, tx: &mut Self::Tx, id: Uuid)
        -> Result<Option<Organization>, StoreError>;

    async fn community_by_name(
        &self,
        tx: &mut Self::Tx,
        comm_name: &str,
    ) -> Result<Option<Community>, StoreError>;

    async fn community_by_id(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<Option<Community>, StoreError>;

    async fn user_by_username(
        &self,
        tx: &mut Self::Tx,
        username: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn admin_for_org(
        &self,
        tx: &mut Self::Tx,
        org_id: Uuid,
    ) -> Result<Option<User>, StoreError>;

    async fn admin_for_community(
        &self,
        tx: &mut Self::Tx,
        community_id: Uuid,
    ) -> Result<Option<User>, StoreError>;

    async fn insert_organization(
        &self,
        tx: &mut Self::Tx,
        org: NewOrganization,
    ) -> Result<Organization, StoreError>;

    async fn insert_community(
        &self,
        tx: &mut Self::Tx,
        community: NewCommunity,
    ) -> Result<Community, StoreError>;

    /// Bind `user_id` as the organization's admin. Fails with
    /// `UniqueViolation` when the organization already has a bound admin of
    /// the same role; one admin per entity is enforced at write time.
    async fn bind_admin_to_org(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<(), StoreError>;

    /// Bind `user_id` as the community's admin (and record its parent
    /// organization on the user). Same single-admin rule as organizations.
    async fn bind_admin_to_community(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        community_id: Uuid,
        org_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn update_organization(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        changes: &OrganizationChanges,
    ) -> Result<u64, StoreError>;

    async fn update_community(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        changes: &CommunityChanges,
    ) -> Result<u64, StoreError>;

    async fn update_admin_profile(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
        contact: Option<&str>,
    ) -> Result<u64, StoreError>;

    /// Soft delete: returns the number of rows flipped to inactive.
    async fn deactivate_organization(&self, tx: &mut Self::Tx, id: Uuid)
        -> Result<u64, StoreError>;

    async fn deactivate_community(&self, tx: &mut Self::Tx, id: Uuid) -> Result<u64, StoreError>;

    // ---- pooled single-shot operations ----

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Hard delete of a mirror row that never got a matching entity; used to
    /// unwind a half-finished registration.
    async fn delete_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn get_active_organization_by_name(
        &self,
        org_name: &str,
    ) -> Result<Option<Organization>, StoreError>;

    async fn get_active_organization_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Organization>, StoreError>;

    async fn get_active_community_by_id(&self, id: Uuid) -> Result<Option<Community>, StoreError>;

    /// Organization name regardless of `active`: inactive rows stay joinable
    /// for historical views.
    async fn organization_name(&self, id: Uuid) -> Result<Option<String>, StoreError>;

    async fn admin_user_for_organization(&self, org_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn admin_user_for_community(
        &self,
        community_id: Uuid,
    ) -> Result<Option<User>, StoreError>;

    /// Scope resolution: the active organization administered by this email.
    /// Single indexed lookup on the admin user's email, never a table scan.
    async fn organization_id_for_admin_email(
        &self,
        email: &str,
    ) -> Result<Option<Uuid>, StoreError>;

    async fn community_id_for_admin_email(&self, email: &str) -> Result<Option<Uuid>, StoreError>;

    // ---- batched aggregation reads ----

    async fn list_active_organizations(&self) -> Result<Vec<OrganizationRef>, StoreError>;

    async fn list_active_communities_by_org_ids(
        &self,
        org_ids: &[Uuid],
    ) -> Result<Vec<Community>, StoreError>;

    async fn list_landlords_by_community_ids(
        &self,
        community_ids: &[Uuid],
    ) -> Result<Vec<Landlord>, StoreError>;

    /// CommunityAdmin users for a community-id set, one `IN (...)` pass.
    async fn community_admins_by_community_ids(
        &self,
        community_ids: &[Uuid],
    ) -> Result<Vec<User>, StoreError>;

    async fn count_active_organizations(&self) -> Result<i64, StoreError>;

    /// Active community count, optionally restricted to one organization.
    async fn count_active_communities(&self, org_id: Option<Uuid>) -> Result<i64, StoreError>;

    async fn count_landlords_in(&self, community_ids: &[Uuid]) -> Result<i64, StoreError>;

    /// `(SUM(block_num), SUM(units_in_block))` over a community-id set,
    /// computed by the database in one pass.
    async fn sum_blocks_and_units(&self, community_ids: &[Uuid])
        -> Result<(i64, i64), StoreError>;
}

/// Run `work` inside a transaction: commit on `Ok`, roll back on `Err`.
/// Callers that need to interleave non-store work with the transaction (the
/// provisioning coordinator) drive begin/commit/rollback themselves instead.
pub async fn with_transaction<S, T, E, F>(store: &S, work: F) -> Result<T, E>
where
    S: EntityStore,
    E: From<StoreError>,
    F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, Result<T, E>>,
{
    let mut tx = store.begin().await?;
    match work(&mut tx).await {
        Ok(value) => {
            store.commit(tx).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = store.rollback(tx).await {
                tracing::warn!("transaction rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}
