//! Test doubles: an instrumented in-memory entity store and a scripted
//! identity provider. The store counts every issued query so tests can pin
//! batching behavior, and both doubles support one-shot failure injection.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::database::models::community::{Community, CommunityChanges, NewCommunity};
use crate::database::models::landlord::Landlord;
use crate::database::models::organization::{
    NewOrganization, Organization, OrganizationChanges, OrganizationRef,
};
use crate::database::models::user::{NewUser, Role, User};
use crate::database::store::{EntityStore, StoreError};
use crate::identity::{IdentityError, IdentityService, NewIdentity, TokenPair};

#[derive(Debug, Default, Clone)]
struct MemState {
    orgs: Vec<Organization>,
    comms: Vec<Community>,
    landlords: Vec<Landlord>,
    users: Vec<User>,
}

/// Uncommitted changes of one open transaction. Reads inside the transaction
/// see committed state overlaid with these changes (read-committed, like the
/// real store); dropping the value without commit discards everything.
#[derive(Debug, Default)]
pub struct MemTx {
    new_orgs: Vec<Organization>,
    new_comms: Vec<Community>,
    org_updates: HashMap<Uuid, Organization>,
    comm_updates: HashMap<Uuid, Community>,
    user_updates: HashMap<Uuid, User>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemState>,
    queries: AtomicUsize,
    fail_insert_organization: AtomicBool,
    fail_insert_community: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of queries issued so far (every store call counts as one).
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    pub fn fail_next_insert_organization(&self) {
        self.fail_insert_organization.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_insert_community(&self) {
        self.fail_insert_community.store(true, Ordering::SeqCst);
    }

    // ---- direct seeding and inspection, bypassing the store contract ----

    pub fn seed_organization(&self, org_name: &str, admin_email: &str) -> Uuid {
        let org_id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap();
        state.orgs.push(Organization {
            id: org_id,
            org_name: org_name.to_string(),
            org_type: None,
            address: None,
            city: None,
            state: None,
            country: None,
            reg_num: None,
            vat_id: None,
            website: None,
            logo: None,
            doc_upload: None,
            active: true,
            created_at: Utc::now(),
        });
        state.users.push(sample_user(admin_email, Role::OrgAdmin, Some(org_id), None));
        org_id
    }

    pub fn seed_community(
        &self,
        org_id: Uuid,
        comm_name: &str,
        block_num: i32,
        units_in_block: i32,
        admin_email: &str,
    ) -> Uuid {
        let community_id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap();
        state.comms.push(Community {
            id: community_id,
            org_id,
            comm_name: comm_name.to_string(),
            comm_type: None,
            block_num,
            units_in_block,
            address: None,
            city: None,
            state: None,
            country: None,
            features: None,
            active: true,
            created_at: Utc::now(),
        });
        state.users.push(sample_user(
            admin_email,
            Role::CommunityAdmin,
            Some(org_id),
            Some(community_id),
        ));
        community_id
    }

    pub fn seed_landlord(&self, community_id: Uuid, first: &str, last: &str, block: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().landlords.push(Landlord {
            id,
            community_id,
            block_name: Some(block.to_string()),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: None,
            contact: None,
        });
        id
    }

    /// Raw storage view, including inactive rows
    pub fn raw_organizations(&self) -> Vec<Organization> {
        self.state.lock().unwrap().orgs.clone()
    }

    pub fn raw_communities(&self) -> Vec<Community> {
        self.state.lock().unwrap().comms.clone()
    }

    pub fn raw_users(&self) -> Vec<User> {
        self.state.lock().unwrap().users.clone()
    }

    pub fn deactivate_org_raw(&self, org_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        if let Some(org) = state.orgs.iter_mut().find(|o| o.id == org_id) {
            org.active = false;
        }
    }

    pub fn deactivate_community_raw(&self, community_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        if let Some(comm) = state.comms.iter_mut().find(|c| c.id == community_id) {
            comm.active = false;
        }
    }

    // ---- read-committed views: committed state overlaid with tx changes ----

    fn effective_orgs(&self, tx: &MemTx) -> Vec<Organization> {
        let state = self.state.lock().unwrap();
        let mut orgs: Vec<Organization> = state
            .orgs
            .iter()
            .map(|org| tx.org_updates.get(&org.id).cloned().unwrap_or_else(|| org.clone()))
            .collect();
        orgs.extend(tx.new_orgs.iter().cloned());
        orgs
    }

    fn effective_comms(&self, tx: &MemTx) -> Vec<Community> {
        let state = self.state.lock().unwrap();
        let mut comms: Vec<Community> = state
            .comms
            .iter()
            .map(|c| tx.comm_updates.get(&c.id).cloned().unwrap_or_else(|| c.clone()))
            .collect();
        comms.extend(tx.new_comms.iter().cloned());
        comms
    }

    fn effective_users(&self, tx: &MemTx) -> Vec<User> {
        let state = self.state.lock().unwrap();
        state
            .users
            .iter()
            .map(|u| tx.user_updates.get(&u.id).cloned().unwrap_or_else(|| u.clone()))
            .collect()
    }
}

fn sample_user(email: &str, role: Role, org_id: Option<Uuid>, community_id: Option<Uuid>) -> User {
    let email = email.to_lowercase();
    User {
        id: Uuid::new_v4(),
        username: email.clone(),
        email,
        first_name: "Admin".to_string(),
        last_name: "User".to_string(),
        role: role.as_str().to_string(),
        contact: None,
        organization_id: org_id,
        community_id,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    type Tx = MemTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemTx::default())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for org in state.orgs.iter_mut() {
            if let Some(updated) = tx.org_updates.get(&org.id) {
                *org = updated.clone();
            }
        }
        for comm in state.comms.iter_mut() {
            if let Some(updated) = tx.comm_updates.get(&comm.id) {
                *comm = updated.clone();
            }
        }
        for user in state.users.iter_mut() {
            if let Some(updated) = tx.user_updates.get(&user.id) {
                *user = updated.clone();
            }
        }
        state.orgs.extend(tx.new_orgs);
        state.comms.extend(tx.new_comms);
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<(), StoreError> {
        Ok(())
    }

    async fn org_by_name(
        &self,
        tx: &mut Self::Tx,
        org_name: &str,
    ) -> Result<Option<Organization>, StoreError> {
        self.bump();
        Ok(self
            .effective_orgs(tx)
            .into_iter()
            .find(|o| o.active && o.org_name == org_name))
    }

    async fn org_by_id(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<Option<Organization>, StoreError> {
        self.bump();
        Ok(self
            .effective_orgs(tx)
            .into_iter()
            .find(|o| o.active && o.id == id))
    }

    async fn community_by_name(
        &self,
        tx: &mut Self::Tx,
        comm_name: &str,
    ) -> Result<Option<Community>, StoreError> {
        self.bump();
        Ok(self
            .effective_comms(tx)
            .into_iter()
            .find(|c| c.active && c.comm_name == comm_name))
    }

    async fn community_by_id(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<Option<Community>, StoreError> {
        self.bump();
        Ok(self
            .effective_comms(tx)
            .into_iter()
            .find(|c| c.active && c.id == id))
    }

    async fn user_by_username(
        &self,
        tx: &mut Self::Tx,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        self.bump();
        Ok(self
            .effective_users(tx)
            .into_iter()
            .find(|u| u.username == username))
    }

    async fn admin_for_org(
        &self,
        tx: &mut Self::Tx,
        org_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        self.bump();
        Ok(self.effective_users(tx).into_iter().find(|u| {
            u.organization_id == Some(org_id) && u.role == Role::OrgAdmin.as_str()
        }))
    }

    async fn admin_for_community(
        &self,
        tx: &mut Self::Tx,
        community_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        self.bump();
        Ok(self.effective_users(tx).into_iter().find(|u| {
            u.community_id == Some(community_id) && u.role == Role::CommunityAdmin.as_str()
        }))
    }

    async fn insert_organization(
        &self,
        tx: &mut Self::Tx,
        org: NewOrganization,
    ) -> Result<Organization, StoreError> {
        self.bump();
        if self.fail_insert_organization.swap(false, Ordering::SeqCst) {
            return Err(StoreError::QueryError(
                "injected organization insert failure".to_string(),
            ));
        }
        if self
            .effective_orgs(tx)
            .iter()
            .any(|o| o.active && o.org_name == org.org_name)
        {
            return Err(StoreError::UniqueViolation(
                "organizations_active_name_key".to_string(),
            ));
        }
        let row = Organization {
            id: Uuid::new_v4(),
            org_name: org.org_name,
            org_type: org.org_type,
            address: org.address,
            city: org.city,
            state: org.state,
            country: org.country,
            reg_num: org.reg_num,
            vat_id: org.vat_id,
            website: org.website,
            logo: org.logo,
            doc_upload: org.doc_upload,
            active: true,
            created_at: Utc::now(),
        };
        tx.new_orgs.push(row.clone());
        Ok(row)
    }

    async fn insert_community(
        &self,
        tx: &mut Self::Tx,
        community: NewCommunity,
    ) -> Result<Community, StoreError> {
        self.bump();
        if self.fail_insert_community.swap(false, Ordering::SeqCst) {
            return Err(StoreError::QueryError(
                "injected community insert failure".to_string(),
            ));
        }
        if self
            .effective_comms(tx)
            .iter()
            .any(|c| c.active && c.comm_name == community.comm_name)
        {
            return Err(StoreError::UniqueViolation(
                "communities_active_name_key".to_string(),
            ));
        }
        let row = Community {
            id: Uuid::new_v4(),
            org_id: community.org_id,
            comm_name: community.comm_name,
            comm_type: community.comm_type,
            block_num: community.block_num,
            units_in_block: community.units_in_block,
            address: community.address,
            city: community.city,
            state: community.state,
            country: community.country,
            features: community.features,
            active: true,
            created_at: Utc::now(),
        };
        tx.new_comms.push(row.clone());
        Ok(row)
    }

    async fn bind_admin_to_org(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<(), StoreError> {
        self.bump();
        let users = self.effective_users(tx);
        if users.iter().any(|u| {
            u.organization_id == Some(org_id)
                && u.role == Role::OrgAdmin.as_str()
                && u.id != user_id
        }) {
            return Err(StoreError::UniqueViolation(
                "organization already has a bound admin".to_string(),
            ));
        }
        let mut user = users
            .into_iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::QueryError(format!("user {user_id} not found")))?;
        user.organization_id = Some(org_id);
        tx.user_updates.insert(user_id, user);
        Ok(())
    }

    async fn bind_admin_to_community(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        community_id: Uuid,
        org_id: Uuid,
    ) -> Result<(), StoreError> {
        self.bump();
        let users = self.effective_users(tx);
        if users.iter().any(|u| {
            u.community_id == Some(community_id)
                && u.role == Role::CommunityAdmin.as_str()
                && u.id != user_id
        }) {
            return Err(StoreError::UniqueViolation(
                "community already has a bound admin".to_string(),
            ));
        }
        let mut user = users
            .into_iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::QueryError(format!("user {user_id} not found")))?;
        user.community_id = Some(community_id);
        user.organization_id = Some(org_id);
        tx.user_updates.insert(user_id, user);
        Ok(())
    }

    async fn update_organization(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        changes: &OrganizationChanges,
    ) -> Result<u64, StoreError> {
        self.bump();
        let Some(mut org) = self
            .effective_orgs(tx)
            .into_iter()
            .find(|o| o.active && o.id == id)
        else {
            return Ok(0);
        };
        if let Some(name) = &changes.org_name {
            org.org_name = name.clone();
        }
        org.org_type = changes.org_type.clone();
        org.address = changes.address.clone();
        org.city = changes.city.clone();
        org.state = changes.state.clone();
        org.country = changes.country.clone();
        org.reg_num = changes.reg_num.clone();
        org.vat_id = changes.vat_id.clone();
        org.website = changes.website.clone();
        org.logo = changes.logo.clone();
        org.doc_upload = changes.doc_upload.clone();
        tx.org_updates.insert(id, org);
        Ok(1)
    }

    async fn update_community(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        changes: &CommunityChanges,
    ) -> Result<u64, StoreError> {
        self.bump();
        let Some(mut comm) = self
            .effective_comms(tx)
            .into_iter()
            .find(|c| c.active && c.id == id)
        else {
            return Ok(0);
        };
        comm.comm_type = changes.comm_type.clone();
        comm.block_num = changes.block_num;
        comm.units_in_block = changes.units_in_block;
        comm.address = changes.address.clone();
        comm.city = changes.city.clone();
        comm.state = changes.state.clone();
        comm.country = changes.country.clone();
        comm.features = changes.features.clone();
        tx.comm_updates.insert(id, comm);
        Ok(1)
    }

    async fn update_admin_profile(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
        contact: Option<&str>,
    ) -> Result<u64, StoreError> {
        self.bump();
        let Some(mut user) = self.effective_users(tx).into_iter().find(|u| u.id == user_id)
        else {
            return Ok(0);
        };
        user.first_name = first_name.to_string();
        user.last_name = last_name.to_string();
        user.contact = contact.map(str::to_string);
        tx.user_updates.insert(user_id, user);
        Ok(1)
    }

    async fn deactivate_organization(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<u64, StoreError> {
        self.bump();
        let Some(mut org) = self
            .effective_orgs(tx)
            .into_iter()
            .find(|o| o.active && o.id == id)
        else {
            return Ok(0);
        };
        org.active = false;
        tx.org_updates.insert(id, org);
        Ok(1)
    }

    async fn deactivate_community(&self, tx: &mut Self::Tx, id: Uuid) -> Result<u64, StoreError> {
        self.bump();
        let Some(mut comm) = self
            .effective_comms(tx)
            .into_iter()
            .find(|c| c.active && c.id == id)
        else {
            return Ok(0);
        };
        comm.active = false;
        tx.comm_updates.insert(id, comm);
        Ok(1)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.bump();
        let mut state = self.state.lock().unwrap();
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation("users_username_key".to_string()));
        }
        let row = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role.as_str().to_string(),
            contact: user.contact,
            organization_id: None,
            community_id: None,
            created_at: Utc::now(),
        };
        state.users.push(row.clone());
        Ok(row)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        self.bump();
        let mut state = self.state.lock().unwrap();
        let before = state.users.len();
        state.users.retain(|u| u.id != user_id);
        Ok((before - state.users.len()) as u64)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_active_organization_by_name(
        &self,
        org_name: &str,
    ) -> Result<Option<Organization>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .orgs
            .iter()
            .find(|o| o.active && o.org_name == org_name)
            .cloned())
    }

    async fn get_active_organization_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Organization>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .orgs
            .iter()
            .find(|o| o.active && o.id == id)
            .cloned())
    }

    async fn get_active_community_by_id(&self, id: Uuid) -> Result<Option<Community>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .comms
            .iter()
            .find(|c| c.active && c.id == id)
            .cloned())
    }

    async fn organization_name(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .orgs
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.org_name.clone()))
    }

    async fn admin_user_for_organization(&self, org_id: Uuid) -> Result<Option<User>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.organization_id == Some(org_id) && u.role == Role::OrgAdmin.as_str())
            .cloned())
    }

    async fn admin_user_for_community(
        &self,
        community_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| {
                u.community_id == Some(community_id) && u.role == Role::CommunityAdmin.as_str()
            })
            .cloned())
    }

    async fn organization_id_for_admin_email(
        &self,
        email: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        self.bump();
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .filter(|u| u.email == email && u.role == Role::OrgAdmin.as_str())
            .filter_map(|u| u.organization_id)
            .find(|org_id| state.orgs.iter().any(|o| o.id == *org_id && o.active)))
    }

    async fn community_id_for_admin_email(&self, email: &str) -> Result<Option<Uuid>, StoreError> {
        self.bump();
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .filter(|u| u.email == email && u.role == Role::CommunityAdmin.as_str())
            .filter_map(|u| u.community_id)
            .find(|community_id| state.comms.iter().any(|c| c.id == *community_id && c.active)))
    }

    async fn list_active_organizations(&self) -> Result<Vec<OrganizationRef>, StoreError> {
        self.bump();
        let mut orgs: Vec<OrganizationRef> = self
            .state
            .lock()
            .unwrap()
            .orgs
            .iter()
            .filter(|o| o.active)
            .map(|o| OrganizationRef {
                id: o.id,
                org_name: o.org_name.clone(),
            })
            .collect();
        orgs.sort_by(|a, b| a.org_name.cmp(&b.org_name));
        Ok(orgs)
    }

    async fn list_active_communities_by_org_ids(
        &self,
        org_ids: &[Uuid],
    ) -> Result<Vec<Community>, StoreError> {
        self.bump();
        let mut comms: Vec<Community> = self
            .state
            .lock()
            .unwrap()
            .comms
            .iter()
            .filter(|c| c.active && org_ids.contains(&c.org_id))
            .cloned()
            .collect();
        comms.sort_by(|a, b| a.comm_name.cmp(&b.comm_name));
        Ok(comms)
    }

    async fn list_landlords_by_community_ids(
        &self,
        community_ids: &[Uuid],
    ) -> Result<Vec<Landlord>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .landlords
            .iter()
            .filter(|l| community_ids.contains(&l.community_id))
            .cloned()
            .collect())
    }

    async fn community_admins_by_community_ids(
        &self,
        community_ids: &[Uuid],
    ) -> Result<Vec<User>, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .filter(|u| {
                u.role == Role::CommunityAdmin.as_str()
                    && u.community_id.is_some_and(|id| community_ids.contains(&id))
            })
            .cloned()
            .collect())
    }

    async fn count_active_organizations(&self) -> Result<i64, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .orgs
            .iter()
            .filter(|o| o.active)
            .count() as i64)
    }

    async fn count_active_communities(&self, org_id: Option<Uuid>) -> Result<i64, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .comms
            .iter()
            .filter(|c| c.active && org_id.map_or(true, |org_id| c.org_id == org_id))
            .count() as i64)
    }

    async fn count_landlords_in(&self, community_ids: &[Uuid]) -> Result<i64, StoreError> {
        self.bump();
        Ok(self
            .state
            .lock()
            .unwrap()
            .landlords
            .iter()
            .filter(|l| community_ids.contains(&l.community_id))
            .count() as i64)
    }

    async fn sum_blocks_and_units(
        &self,
        community_ids: &[Uuid],
    ) -> Result<(i64, i64), StoreError> {
        self.bump();
        let state = self.state.lock().unwrap();
        let mut blocks = 0i64;
        let mut units = 0i64;
        for comm in state.comms.iter().filter(|c| community_ids.contains(&c.id)) {
            blocks += i64::from(comm.block_num);
            units += i64::from(comm.units_in_block);
        }
        Ok((blocks, units))
    }
}

/// Scripted identity provider: deterministic ids, call counters and one-shot
/// failure switches.
#[derive(Default)]
pub struct ScriptedIdentity {
    next_id: AtomicUsize,
    create_calls: AtomicUsize,
    authenticate_calls: AtomicUsize,
    email_calls: AtomicUsize,
    created_usernames: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    fail_create: AtomicBool,
    fail_credential_email: AtomicBool,
}

impl ScriptedIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_credential_email(&self) {
        self.fail_credential_email.store(true, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn email_calls(&self) -> usize {
        self.email_calls.load(Ordering::SeqCst)
    }

    pub fn deleted_identities(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn token_pair() -> TokenPair {
        TokenPair {
            access_token: "scripted-access-token".to_string(),
            refresh_token: Some("scripted-refresh-token".to_string()),
            expires_in: 300,
            token_type: "Bearer".to_string(),
        }
    }
}

#[async_trait]
impl IdentityService for ScriptedIdentity {
    async fn create_identity(&self, identity: NewIdentity) -> Result<String, IdentityError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(IdentityError::Provider(
                "identity provider unavailable".to_string(),
            ));
        }
        let id = format!("kc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.created_usernames
            .lock()
            .unwrap()
            .push(identity.username);
        Ok(id)
    }

    async fn delete_identity(&self, identity_id: &str) -> Result<(), IdentityError> {
        self.deleted.lock().unwrap().push(identity_id.to_string());
        Ok(())
    }

    async fn send_credential_setup_email(&self, _identity_id: &str) -> Result<bool, IdentityError> {
        self.email_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_credential_email.swap(false, Ordering::SeqCst) {
            return Err(IdentityError::Provider("email delivery failed".to_string()));
        }
        Ok(true)
    }

    async fn send_password_reset_email(&self, username: &str) -> Result<bool, IdentityError> {
        self.email_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .created_usernames
            .lock()
            .unwrap()
            .iter()
            .any(|u| u == username))
    }

    async fn authenticate(
        &self,
        username: &str,
        _password: &str,
    ) -> Result<TokenPair, IdentityError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .created_usernames
            .lock()
            .unwrap()
            .iter()
            .any(|u| u == username)
        {
            Ok(Self::token_pair())
        } else {
            Err(IdentityError::Auth("Invalid user credentials".to_string()))
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenPair, IdentityError> {
        Ok(Self::token_pair())
    }
}
