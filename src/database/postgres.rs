use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::manager::DatabaseManager;
use crate::database::models::community::{Community, CommunityChanges, NewCommunity};
use crate::database::models::landlord::Landlord;
use crate::database::models::organization::{
    NewOrganization, Organization, OrganizationChanges, OrganizationRef,
};
use crate::database::models::user::{NewUser, Role, User};
use crate::database::store::{EntityStore, StoreError};

const ORG_COLS: &str = "id, org_name, org_type, address, city, state, country, reg_num, vat_id, \
                        website, logo, doc_upload, active, created_at";
const COMM_COLS: &str = "id, org_id, comm_name, comm_type, block_num, units_in_block, address, \
                         city, state, country, features, active, created_at";
const LANDLORD_COLS: &str = "id, community_id, block_name, first_name, last_name, email, contact";
const USER_COLS: &str = "id, username, email, first_name, last_name, role, contact, \
                         organization_id, community_id, created_at";

/// sqlx-backed entity store over a single shared pool
#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        DatabaseManager::health_check(&self.pool).await
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        Ok(tx.rollback().await?)
    }

    async fn org_by_name(
        &self,
        tx: &mut Self::Tx,
        org_name: &str,
    ) -> Result<Option<Organization>, StoreError> {
        let sql = format!("SELECT {ORG_COLS} FROM organizations WHERE org_name = $1 AND active");
        Ok(sqlx::query_as(&sql)
            .bind(org_name)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn org_by_id(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<Option<Organization>, StoreError> {
        let sql = format!("SELECT {ORG_COLS} FROM organizations WHERE id = $1 AND active");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&mut **tx).await?)
    }

    async fn community_by_name(
        &self,
        tx: &mut Self::Tx,
        comm_name: &str,
    ) -> Result<Option<Community>, StoreError> {
        let sql = format!("SELECT {COMM_COLS} FROM communities WHERE comm_name = $1 AND active");
        Ok(sqlx::query_as(&sql)
            .bind(comm_name)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn community_by_id(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<Option<Community>, StoreError> {
        let sql = format!("SELECT {COMM_COLS} FROM communities WHERE id = $1 AND active");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&mut **tx).await?)
    }

    async fn user_by_username(
        &self,
        tx: &mut Self::Tx,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLS} FROM users WHERE username = $1");
        Ok(sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn admin_for_org(
        &self,
        tx: &mut Self::Tx,
        org_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLS} FROM users WHERE organization_id = $1 AND role = $2 LIMIT 1"
        );
        Ok(sqlx::query_as(&sql)
            .bind(org_id)
            .bind(Role::OrgAdmin.as_str())
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn admin_for_community(
        &self,
        tx: &mut Self::Tx,
        community_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        let sql =
            format!("SELECT {USER_COLS} FROM users WHERE community_id = $1 AND role = $2 LIMIT 1");
        Ok(sqlx::query_as(&sql)
            .bind(community_id)
            .bind(Role::CommunityAdmin.as_str())
            .fetch_optional(&mut **tx)
            .await?)
    }

    async fn insert_organization(
        &self,
        tx: &mut Self::Tx,
        org: NewOrganization,
    ) -> Result<Organization, StoreError> {
        let sql = format!(
            "INSERT INTO organizations \
             (org_name, org_type, address, city, state, country, reg_num, vat_id, website, logo, doc_upload, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, TRUE) \
             RETURNING {ORG_COLS}"
        );
        Ok(sqlx::query_as(&sql)
            .bind(org.org_name)
            .bind(org.org_type)
            .bind(org.address)
            .bind(org.city)
            .bind(org.state)
            .bind(org.country)
            .bind(org.reg_num)
            .bind(org.vat_id)
            .bind(org.website)
            .bind(org.logo)
            .bind(org.doc_upload)
            .fetch_one(&mut **tx)
            .await?)
    }

    async fn insert_community(
        &self,
        tx: &mut Self::Tx,
        community: NewCommunity,
    ) -> Result<Community, StoreError> {
        let sql = format!(
            "INSERT INTO communities \
             (org_id, comm_name, comm_type, block_num, units_in_block, address, city, state, country, features, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE) \
             RETURNING {COMM_COLS}"
        );
        Ok(sqlx::query_as(&sql)
            .bind(community.org_id)
            .bind(community.comm_name)
            .bind(community.comm_type)
            .bind(community.block_num)
            .bind(community.units_in_block)
            .bind(community.address)
            .bind(community.city)
            .bind(community.state)
            .bind(community.country)
            .bind(community.features)
            .fetch_one(&mut **tx)
            .await?)
    }

    async fn bind_admin_to_org(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<(), StoreError> {
        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM users WHERE organization_id = $1 AND role = $2 AND id <> $3 LIMIT 1",
        )
        .bind(org_id)
        .bind(Role::OrgAdmin.as_str())
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        if existing.is_some() {
            return Err(StoreError::UniqueViolation(
                "organization already has a bound admin".to_string(),
            ));
        }

        let result = sqlx::query("UPDATE users SET organization_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(org_id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::QueryError(format!(
                "user {user_id} not found for admin binding"
            )));
        }
        Ok(())
    }

    async fn bind_admin_to_community(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        community_id: Uuid,
        org_id: Uuid,
    ) -> Result<(), StoreError> {
        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM users WHERE community_id = $1 AND role = $2 AND id <> $3 LIMIT 1",
        )
        .bind(community_id)
        .bind(Role::CommunityAdmin.as_str())
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        if existing.is_some() {
            return Err(StoreError::UniqueViolation(
                "community already has a bound admin".to_string(),
            ));
        }

        let result =
            sqlx::query("UPDATE users SET community_id = $2, organization_id = $3 WHERE id = $1")
                .bind(user_id)
                .bind(community_id)
                .bind(org_id)
                .execute(&mut **tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::QueryError(format!(
                "user {user_id} not found for admin binding"
            )));
        }
        Ok(())
    }

    async fn update_organization(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        changes: &OrganizationChanges,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE organizations SET \
             org_name = COALESCE($2, org_name), org_type = $3, address = $4, city = $5, \
             state = $6, country = $7, reg_num = $8, vat_id = $9, website = $10, logo = $11, \
             doc_upload = $12 \
             WHERE id = $1 AND active",
        )
        .bind(id)
        .bind(&changes.org_name)
        .bind(&changes.org_type)
        .bind(&changes.address)
        .bind(&changes.city)
        .bind(&changes.state)
        .bind(&changes.country)
        .bind(&changes.reg_num)
        .bind(&changes.vat_id)
        .bind(&changes.website)
        .bind(&changes.logo)
        .bind(&changes.doc_upload)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_community(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        changes: &CommunityChanges,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE communities SET \
             comm_type = $2, block_num = $3, units_in_block = $4, address = $5, city = $6, \
             state = $7, country = $8, features = $9 \
             WHERE id = $1 AND active",
        )
        .bind(id)
        .bind(&changes.comm_type)
        .bind(changes.block_num)
        .bind(changes.units_in_block)
        .bind(&changes.address)
        .bind(&changes.city)
        .bind(&changes.state)
        .bind(&changes.country)
        .bind(&changes.features)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_admin_profile(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
        contact: Option<&str>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET first_name = $2, last_name = $3, contact = $4 WHERE id = $1",
        )
        .bind(user_id)
        .bind(first_name)
        .bind(last_name)
        .bind(contact)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_organization(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE organizations SET active = FALSE WHERE id = $1 AND active")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_community(&self, tx: &mut Self::Tx, id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE communities SET active = FALSE WHERE id = $1 AND active")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (username, email, first_name, last_name, role, contact) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLS}"
        );
        Ok(sqlx::query_as(&sql)
            .bind(user.username)
            .bind(user.email)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.role.as_str())
            .bind(user.contact)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLS} FROM users WHERE username = $1");
        Ok(sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_active_organization_by_name(
        &self,
        org_name: &str,
    ) -> Result<Option<Organization>, StoreError> {
        let sql = format!("SELECT {ORG_COLS} FROM organizations WHERE org_name = $1 AND active");
        Ok(sqlx::query_as(&sql)
            .bind(org_name)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_active_organization_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Organization>, StoreError> {
        let sql = format!("SELECT {ORG_COLS} FROM organizations WHERE id = $1 AND active");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn get_active_community_by_id(&self, id: Uuid) -> Result<Option<Community>, StoreError> {
        let sql = format!("SELECT {COMM_COLS} FROM communities WHERE id = $1 AND active");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn organization_name(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT org_name FROM organizations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    async fn admin_user_for_organization(&self, org_id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLS} FROM users WHERE organization_id = $1 AND role = $2 LIMIT 1"
        );
        Ok(sqlx::query_as(&sql)
            .bind(org_id)
            .bind(Role::OrgAdmin.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn admin_user_for_community(
        &self,
        community_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        let sql =
            format!("SELECT {USER_COLS} FROM users WHERE community_id = $1 AND role = $2 LIMIT 1");
        Ok(sqlx::query_as(&sql)
            .bind(community_id)
            .bind(Role::CommunityAdmin.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn organization_id_for_admin_email(
        &self,
        email: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT o.id FROM organizations o \
             JOIN users u ON u.organization_id = o.id \
             WHERE u.email = $1 AND u.role = $2 AND o.active",
        )
        .bind(email)
        .bind(Role::OrgAdmin.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    async fn community_id_for_admin_email(&self, email: &str) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT c.id FROM communities c \
             JOIN users u ON u.community_id = c.id \
             WHERE u.email = $1 AND u.role = $2 AND c.active",
        )
        .bind(email)
        .bind(Role::CommunityAdmin.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    async fn list_active_organizations(&self) -> Result<Vec<OrganizationRef>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT id, org_name FROM organizations WHERE active ORDER BY org_name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_active_communities_by_org_ids(
        &self,
        org_ids: &[Uuid],
    ) -> Result<Vec<Community>, StoreError> {
        if org_ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT {COMM_COLS} FROM communities WHERE org_id = ANY($1) AND active ORDER BY comm_name"
        );
        Ok(sqlx::query_as(&sql).bind(org_ids).fetch_all(&self.pool).await?)
    }

    async fn list_landlords_by_community_ids(
        &self,
        community_ids: &[Uuid],
    ) -> Result<Vec<Landlord>, StoreError> {
        if community_ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!("SELECT {LANDLORD_COLS} FROM landlords WHERE community_id = ANY($1)");
        Ok(sqlx::query_as(&sql)
            .bind(community_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn community_admins_by_community_ids(
        &self,
        community_ids: &[Uuid],
    ) -> Result<Vec<User>, StoreError> {
        if community_ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT {USER_COLS} FROM users WHERE community_id = ANY($1) AND role = $2"
        );
        Ok(sqlx::query_as(&sql)
            .bind(community_ids)
            .bind(Role::CommunityAdmin.as_str())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_active_organizations(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM organizations WHERE active")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn count_active_communities(&self, org_id: Option<Uuid>) -> Result<i64, StoreError> {
        let row: (i64,) = match org_id {
            Some(org_id) => {
                sqlx::query_as("SELECT COUNT(*) FROM communities WHERE org_id = $1 AND active")
                    .bind(org_id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM communities WHERE active")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(row.0)
    }

    async fn count_landlords_in(&self, community_ids: &[Uuid]) -> Result<i64, StoreError> {
        if community_ids.is_empty() {
            return Ok(0);
        }
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM landlords WHERE community_id = ANY($1)")
                .bind(community_ids)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn sum_blocks_and_units(
        &self,
        community_ids: &[Uuid],
    ) -> Result<(i64, i64), StoreError> {
        if community_ids.is_empty() {
            return Ok((0, 0));
        }
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(block_num), 0), COALESCE(SUM(units_in_block), 0) \
             FROM communities WHERE id = ANY($1)",
        )
        .bind(community_ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
