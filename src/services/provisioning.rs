use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::database::models::community::{Community, CommunityChanges, NewCommunity};
use crate::database::models::organization::{NewOrganization, Organization, OrganizationChanges};
use crate::database::models::user::{Role, User};
use crate::database::store::{with_transaction, EntityStore, StoreError};
use crate::identity::IdentityService;
use crate::services::accounts::{AccountService, NewAccount, RegisteredAccount};
use crate::services::ServiceError;

/// Organization creation payload: profile fields plus the admin identity to
/// provision alongside it. Wire names follow the existing frontend contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganization {
    pub org_name: String,
    pub org_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub reg_num: Option<String>,
    #[serde(rename = "vatID")]
    pub vat_id: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub doc_upload: Option<String>,
    pub admin_first: String,
    pub admin_last: String,
    pub admin_email: String,
    pub admin_contact: Option<String>,
}

impl CreateOrganization {
    fn validate(&self) -> Result<(), ServiceError> {
        validate_entity_name("Organization", &self.org_name)?;
        validate_admin_fields(&self.admin_first, &self.admin_last, &self.admin_email)
    }

    fn organization_row(&self) -> NewOrganization {
        NewOrganization {
            org_name: self.org_name.clone(),
            org_type: self.org_type.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
            reg_num: self.reg_num.clone(),
            vat_id: self.vat_id.clone(),
            website: self.website.clone(),
            logo: self.logo.clone(),
            doc_upload: self.doc_upload.clone(),
        }
    }
}

/// Organization update payload. The admin email must match the bound admin;
/// it identifies the user whose profile fields are updated, never a
/// reassignment of ownership.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrganization {
    pub org_name: Option<String>,
    pub org_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub reg_num: Option<String>,
    #[serde(rename = "vatID")]
    pub vat_id: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub doc_upload: Option<String>,
    pub admin_first: String,
    pub admin_last: String,
    pub admin_email: String,
    pub admin_contact: Option<String>,
}

impl UpdateOrganization {
    fn changes(&self) -> OrganizationChanges {
        OrganizationChanges {
            org_name: self.org_name.clone(),
            org_type: self.org_type.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
            reg_num: self.reg_num.clone(),
            vat_id: self.vat_id.clone(),
            website: self.website.clone(),
            logo: self.logo.clone(),
            doc_upload: self.doc_upload.clone(),
        }
    }
}

/// Community creation payload, including the parent organization by name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommunity {
    pub org_name: String,
    pub comm_name: String,
    pub comm_type: Option<String>,
    pub block_num: Option<i32>,
    #[serde(rename = "unitsinBlock")]
    pub units_in_block: Option<i32>,
    pub comm_address: Option<String>,
    pub comm_city: Option<String>,
    pub comm_state: Option<String>,
    pub comm_country: Option<String>,
    pub comm_features: Option<String>,
    pub comm_admin_first: String,
    pub comm_admin_last: String,
    pub comm_admin_email: String,
    pub comm_admin_contact: Option<String>,
}

impl CreateCommunity {
    fn validate(&self) -> Result<(), ServiceError> {
        validate_entity_name("Community", &self.comm_name)?;
        validate_admin_fields(
            &self.comm_admin_first,
            &self.comm_admin_last,
            &self.comm_admin_email,
        )
    }

    fn community_row(&self, org_id: Uuid) -> NewCommunity {
        NewCommunity {
            org_id,
            comm_name: self.comm_name.clone(),
            comm_type: self.comm_type.clone(),
            block_num: self.block_num.unwrap_or(0),
            units_in_block: self.units_in_block.unwrap_or(0),
            address: self.comm_address.clone(),
            city: self.comm_city.clone(),
            state: self.comm_state.clone(),
            country: self.comm_country.clone(),
            features: self.comm_features.clone(),
        }
    }
}

/// Community update payload. The community name and parent are part of its
/// identity and are not changed here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommunity {
    pub comm_type: Option<String>,
    pub block_num: Option<i32>,
    #[serde(rename = "unitsinBlock")]
    pub units_in_block: Option<i32>,
    pub comm_address: Option<String>,
    pub comm_city: Option<String>,
    pub comm_state: Option<String>,
    pub comm_country: Option<String>,
    pub comm_features: Option<String>,
    pub comm_admin_first: String,
    pub comm_admin_last: String,
    pub comm_admin_email: String,
    pub comm_admin_contact: Option<String>,
}

impl UpdateCommunity {
    fn changes(&self) -> CommunityChanges {
        CommunityChanges {
            comm_type: self.comm_type.clone(),
            block_num: self.block_num.unwrap_or(0),
            units_in_block: self.units_in_block.unwrap_or(0),
            address: self.comm_address.clone(),
            city: self.comm_city.clone(),
            state: self.comm_state.clone(),
            country: self.comm_country.clone(),
            features: self.comm_features.clone(),
        }
    }
}

/// Merged entity-plus-admin view returned by reads and updates
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationWithAdmin {
    pub id: Uuid,
    pub org_name: String,
    pub org_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub reg_num: Option<String>,
    #[serde(rename = "vatID")]
    pub vat_id: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub doc_upload: Option<String>,
    pub admin_first: String,
    pub admin_last: String,
    pub admin_email: String,
    pub admin_contact: Option<String>,
}

impl OrganizationWithAdmin {
    fn from_parts(org: &Organization, admin: &User) -> Self {
        Self {
            id: org.id,
            org_name: org.org_name.clone(),
            org_type: org.org_type.clone(),
            address: org.address.clone(),
            city: org.city.clone(),
            state: org.state.clone(),
            country: org.country.clone(),
            reg_num: org.reg_num.clone(),
            vat_id: org.vat_id.clone(),
            website: org.website.clone(),
            logo: org.logo.clone(),
            doc_upload: org.doc_upload.clone(),
            admin_first: admin.first_name.clone(),
            admin_last: admin.last_name.clone(),
            admin_email: admin.email.clone(),
            admin_contact: admin.contact.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityWithAdmin {
    pub id: Uuid,
    pub comm_name: String,
    pub comm_type: Option<String>,
    pub block_num: i32,
    #[serde(rename = "unitsinBlock")]
    pub units_in_block: i32,
    pub comm_address: Option<String>,
    pub comm_city: Option<String>,
    pub comm_state: Option<String>,
    pub comm_country: Option<String>,
    pub comm_features: Option<String>,
    pub comm_admin_first: String,
    pub comm_admin_last: String,
    pub comm_admin_email: String,
    pub comm_admin_contact: Option<String>,
    pub org_name: String,
}

impl CommunityWithAdmin {
    fn from_parts(community: &Community, admin: &User, org_name: String) -> Self {
        Self {
            id: community.id,
            comm_name: community.comm_name.clone(),
            comm_type: community.comm_type.clone(),
            block_num: community.block_num,
            units_in_block: community.units_in_block,
            comm_address: community.address.clone(),
            comm_city: community.city.clone(),
            comm_state: community.state.clone(),
            comm_country: community.country.clone(),
            comm_features: community.features.clone(),
            comm_admin_first: admin.first_name.clone(),
            comm_admin_last: admin.last_name.clone(),
            comm_admin_email: admin.email.clone(),
            comm_admin_contact: admin.contact.clone(),
            org_name,
        }
    }
}

/// Creation result. The entity committed even when the credential email did
/// not go out; the flag lets callers surface the partial success.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provisioned<T> {
    #[serde(flatten)]
    pub entity: T,
    pub credential_email_sent: bool,
}

/// Orchestrates two-phase creation: a provider identity and the owning local
/// entity as one logical unit of work. The local transaction is held from the
/// uniqueness check through the insert; if the local half fails after the
/// identity exists, the identity is deleted again (compensation) so neither
/// system keeps a half-provisioned record.
pub struct ProvisioningCoordinator<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
    accounts: AccountService<S, I>,
}

impl<S: EntityStore + 'static, I: IdentityService> ProvisioningCoordinator<S, I> {
    pub fn new(store: Arc<S>, identity: Arc<I>) -> Self {
        let accounts = AccountService::new(Arc::clone(&store), Arc::clone(&identity));
        Self {
            store,
            identity,
            accounts,
        }
    }

    pub async fn create_organization(
        &self,
        dto: CreateOrganization,
    ) -> Result<Provisioned<OrganizationWithAdmin>, ServiceError> {
        dto.validate()?;
        let admin_email = dto.admin_email.trim().to_lowercase();

        let mut tx = self.store.begin().await?;

        match self.store.org_by_name(&mut tx, &dto.org_name).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                self.abort(tx).await;
                return Err(ServiceError::Conflict(format!(
                    "Organization \"{}\" already exists",
                    dto.org_name
                )));
            }
            Err(err) => {
                self.abort(tx).await;
                return Err(err.into());
            }
        }

        let registered = match self
            .accounts
            .register(NewAccount {
                username: admin_email.clone(),
                first_name: dto.admin_first.clone(),
                last_name: dto.admin_last.clone(),
                contact: dto.admin_contact.clone(),
                role: Role::OrgAdmin,
            })
            .await
        {
            Ok(registered) => registered,
            Err(err) => {
                self.abort(tx).await;
                return Err(err);
            }
        };

        // A provider identity now exists; every local failure below must
        // unwind it before surfacing.
        let admin = match self.locate_mirror(&mut tx, &admin_email, &registered).await {
            Ok(admin) => admin,
            Err(err) => {
                self.abort(tx).await;
                return Err(err);
            }
        };

        let org = match self
            .store
            .insert_organization(&mut tx, dto.organization_row())
            .await
        {
            Ok(org) => org,
            Err(err) => {
                self.unwind_registration(&registered).await;
                self.abort(tx).await;
                return Err(match err {
                    StoreError::UniqueViolation(_) => ServiceError::Conflict(format!(
                        "Organization \"{}\" already exists",
                        dto.org_name
                    )),
                    other => other.into(),
                });
            }
        };

        if let Err(err) = self.store.bind_admin_to_org(&mut tx, admin.id, org.id).await {
            self.unwind_registration(&registered).await;
            self.abort(tx).await;
            return Err(match err {
                StoreError::UniqueViolation(_) => ServiceError::Conflict(
                    "Organization already has a bound admin".to_string(),
                ),
                other => other.into(),
            });
        }

        if let Err(err) = self.store.commit(tx).await {
            self.unwind_registration(&registered).await;
            return Err(err.into());
        }

        let credential_email_sent = self.send_credential_email(&registered).await;
        Ok(Provisioned {
            entity: OrganizationWithAdmin::from_parts(&org, &admin),
            credential_email_sent,
        })
    }

    pub async fn create_community(
        &self,
        dto: CreateCommunity,
    ) -> Result<Provisioned<CommunityWithAdmin>, ServiceError> {
        dto.validate()?;
        let admin_email = dto.comm_admin_email.trim().to_lowercase();

        let mut tx = self.store.begin().await?;

        match self.store.community_by_name(&mut tx, &dto.comm_name).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                self.abort(tx).await;
                return Err(ServiceError::Conflict(format!(
                    "Community \"{}\" already exists",
                    dto.comm_name
                )));
            }
            Err(err) => {
                self.abort(tx).await;
                return Err(err.into());
            }
        }

        // Cheap local precondition before the expensive external call: the
        // parent must exist and be active, otherwise no identity is created.
        let parent = match self.store.org_by_name(&mut tx, &dto.org_name).await {
            Ok(Some(org)) => org,
            Ok(None) => {
                self.abort(tx).await;
                return Err(ServiceError::NotFound(format!(
                    "Organization \"{}\" not found or inactive",
                    dto.org_name
                )));
            }
            Err(err) => {
                self.abort(tx).await;
                return Err(err.into());
            }
        };

        let registered = match self
            .accounts
            .register(NewAccount {
                username: admin_email.clone(),
                first_name: dto.comm_admin_first.clone(),
                last_name: dto.comm_admin_last.clone(),
                contact: dto.comm_admin_contact.clone(),
                role: Role::CommunityAdmin,
            })
            .await
        {
            Ok(registered) => registered,
            Err(err) => {
                self.abort(tx).await;
                return Err(err);
            }
        };

        let admin = match self.locate_mirror(&mut tx, &admin_email, &registered).await {
            Ok(admin) => admin,
            Err(err) => {
                self.abort(tx).await;
                return Err(err);
            }
        };

        let community = match self
            .store
            .insert_community(&mut tx, dto.community_row(parent.id))
            .await
        {
            Ok(community) => community,
            Err(err) => {
                self.unwind_registration(&registered).await;
                self.abort(tx).await;
                return Err(match err {
                    StoreError::UniqueViolation(_) => ServiceError::Conflict(format!(
                        "Community \"{}\" already exists",
                        dto.comm_name
                    )),
                    other => other.into(),
                });
            }
        };

        if let Err(err) = self
            .store
            .bind_admin_to_community(&mut tx, admin.id, community.id, parent.id)
            .await
        {
            self.unwind_registration(&registered).await;
            self.abort(tx).await;
            return Err(match err {
                StoreError::UniqueViolation(_) => {
                    ServiceError::Conflict("Community already has a bound admin".to_string())
                }
                other => other.into(),
            });
        }

        if let Err(err) = self.store.commit(tx).await {
            self.unwind_registration(&registered).await;
            return Err(err.into());
        }

        let credential_email_sent = self.send_credential_email(&registered).await;
        Ok(Provisioned {
            entity: CommunityWithAdmin::from_parts(&community, &admin, parent.org_name),
            credential_email_sent,
        })
    }

    /// Update entity profile and admin name/contact fields in one
    /// transaction. The payload's admin email must match the bound admin;
    /// otherwise the update is refused with no field mutation.
    pub async fn update_organization(
        &self,
        id: Uuid,
        dto: UpdateOrganization,
    ) -> Result<OrganizationWithAdmin, ServiceError> {
        let store = Arc::clone(&self.store);
        with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let org = store
                    .org_by_id(tx, id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Organization with ID \"{id}\" not found"))
                    })?;

                let admin = store.admin_for_org(tx, org.id).await?.ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Admin user not found for organization \"{}\"",
                        org.org_name
                    ))
                })?;

                let admin_email = dto.admin_email.trim().to_lowercase();
                if admin.email != admin_email {
                    return Err(ServiceError::NotFound(format!(
                        "Admin user with email \"{}\" not found in organization",
                        dto.admin_email
                    )));
                }

                if let Some(new_name) = dto.org_name.as_deref() {
                    if new_name != org.org_name
                        && store.org_by_name(tx, new_name).await?.is_some()
                    {
                        return Err(ServiceError::Conflict(format!(
                            "Organization \"{new_name}\" already exists"
                        )));
                    }
                }

                let changes = dto.changes();
                match store.update_organization(tx, org.id, &changes).await {
                    Ok(_) => {}
                    Err(StoreError::UniqueViolation(_)) => {
                        return Err(ServiceError::Conflict(format!(
                            "Organization \"{}\" already exists",
                            changes.org_name.as_deref().unwrap_or(&org.org_name)
                        )))
                    }
                    Err(err) => return Err(err.into()),
                }
                store
                    .update_admin_profile(
                        tx,
                        admin.id,
                        &dto.admin_first,
                        &dto.admin_last,
                        dto.admin_contact.as_deref(),
                    )
                    .await?;

                let updated_org = store.org_by_id(tx, org.id).await?.ok_or_else(|| {
                    StoreError::QueryError("organization vanished mid-update".to_string())
                })?;
                let updated_admin = store.admin_for_org(tx, org.id).await?.ok_or_else(|| {
                    StoreError::QueryError("admin vanished mid-update".to_string())
                })?;

                Ok(OrganizationWithAdmin::from_parts(&updated_org, &updated_admin))
            })
        })
        .await
    }

    pub async fn update_community(
        &self,
        id: Uuid,
        dto: UpdateCommunity,
    ) -> Result<CommunityWithAdmin, ServiceError> {
        let store = Arc::clone(&self.store);
        let view = with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let community = store.community_by_id(tx, id).await?.ok_or_else(|| {
                    ServiceError::NotFound(format!("Community with ID \"{id}\" not found"))
                })?;

                let admin = store
                    .admin_for_community(tx, community.id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Admin user not found for community \"{}\"",
                            community.comm_name
                        ))
                    })?;

                let admin_email = dto.comm_admin_email.trim().to_lowercase();
                if admin.email != admin_email {
                    return Err(ServiceError::NotFound(format!(
                        "Admin user with email \"{}\" not found in community",
                        dto.comm_admin_email
                    )));
                }

                store
                    .update_community(tx, community.id, &dto.changes())
                    .await?;
                store
                    .update_admin_profile(
                        tx,
                        admin.id,
                        &dto.comm_admin_first,
                        &dto.comm_admin_last,
                        dto.comm_admin_contact.as_deref(),
                    )
                    .await?;

                let updated = store.community_by_id(tx, community.id).await?.ok_or_else(|| {
                    StoreError::QueryError("community vanished mid-update".to_string())
                })?;
                let updated_admin = store
                    .admin_for_community(tx, community.id)
                    .await?
                    .ok_or_else(|| {
                        StoreError::QueryError("admin vanished mid-update".to_string())
                    })?;

                Ok((updated, updated_admin))
            })
        })
        .await?;

        let (updated, updated_admin) = view;
        let org_name = self
            .store
            .organization_name(updated.org_id)
            .await?
            .unwrap_or_default();
        Ok(CommunityWithAdmin::from_parts(&updated, &updated_admin, org_name))
    }

    /// Soft delete: flips `active` off and nothing else. Children are not
    /// cascaded; an external batch process owns that.
    pub async fn remove_organization(&self, id: Uuid) -> Result<(), ServiceError> {
        let store = Arc::clone(&self.store);
        with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let affected = store.deactivate_organization(tx, id).await?;
                if affected == 0 {
                    return Err(ServiceError::NotFound(format!(
                        "Organization with ID \"{id}\" not found"
                    )));
                }
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_community(&self, id: Uuid) -> Result<(), ServiceError> {
        let store = Arc::clone(&self.store);
        with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let affected = store.deactivate_community(tx, id).await?;
                if affected == 0 {
                    return Err(ServiceError::NotFound(format!(
                        "Community with ID \"{id}\" not found"
                    )));
                }
                Ok(())
            })
        })
        .await
    }

    /// Entity-with-admin view by name; inactive organizations read as absent.
    pub async fn find_organization(
        &self,
        org_name: &str,
    ) -> Result<OrganizationWithAdmin, ServiceError> {
        let org = self
            .store
            .get_active_organization_by_name(org_name)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Organization \"{org_name}\" not found"))
            })?;

        let admin = self
            .store
            .admin_user_for_organization(org.id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Organization admin not found for \"{org_name}\""
                ))
            })?;

        Ok(OrganizationWithAdmin::from_parts(&org, &admin))
    }

    pub async fn find_community(&self, id: Uuid) -> Result<CommunityWithAdmin, ServiceError> {
        let community = self
            .store
            .get_active_community_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Community \"{id}\" not found")))?;

        let admin = self
            .store
            .admin_user_for_community(community.id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Community admin not found for community \"{id}\""))
            })?;

        let org_name = self
            .store
            .organization_name(community.org_id)
            .await?
            .unwrap_or_default();

        Ok(CommunityWithAdmin::from_parts(&community, &admin, org_name))
    }

    async fn locate_mirror(
        &self,
        tx: &mut S::Tx,
        admin_email: &str,
        registered: &RegisteredAccount,
    ) -> Result<User, ServiceError> {
        match self.store.user_by_username(tx, admin_email).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                self.unwind_registration(registered).await;
                Err(ServiceError::InconsistentState(format!(
                    "identity {} exists but no mirror row was found for \"{}\"",
                    registered.identity_id, admin_email
                )))
            }
            Err(err) => {
                self.unwind_registration(registered).await;
                Err(err.into())
            }
        }
    }

    /// Compensating action: the provider identity (and its mirror row) are
    /// removed when the local half of the provisioning failed. Best effort;
    /// failures are logged for operator follow-up, never surfaced.
    async fn unwind_registration(&self, registered: &RegisteredAccount) {
        if let Err(err) = self.identity.delete_identity(&registered.identity_id).await {
            error!(
                "compensation failed: identity {} could not be deleted: {}",
                registered.identity_id, err
            );
        }
        if let Err(err) = self.store.delete_user(registered.user.id).await {
            error!(
                "compensation failed: mirror row {} could not be deleted: {}",
                registered.user.id, err
            );
        }
    }

    async fn send_credential_email(&self, registered: &RegisteredAccount) -> bool {
        match self
            .identity
            .send_credential_setup_email(&registered.identity_id)
            .await
        {
            Ok(sent) => sent,
            Err(err) => {
                warn!(
                    "credential setup email failed for {}: {}",
                    registered.user.username, err
                );
                false
            }
        }
    }

    async fn abort(&self, tx: S::Tx) {
        if let Err(err) = self.store.rollback(tx).await {
            warn!("transaction rollback failed: {}", err);
        }
    }
}

fn validate_entity_name(kind: &str, name: &str) -> Result<(), ServiceError> {
    let len = name.trim().chars().count();
    if !(3..=50).contains(&len) {
        return Err(ServiceError::Validation(format!(
            "{kind} name must be between 3 and 50 characters"
        )));
    }
    Ok(())
}

fn validate_admin_fields(first: &str, last: &str, email: &str) -> Result<(), ServiceError> {
    if first.trim().is_empty() || first.chars().count() > 30 {
        return Err(ServiceError::Validation(
            "Admin first name must be between 1 and 30 characters".to_string(),
        ));
    }
    if last.trim().is_empty() || last.chars().count() > 30 {
        return Err(ServiceError::Validation(
            "Admin last name must be between 1 and 30 characters".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(ServiceError::Validation(
            "A valid admin email address is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::user::NewUser;
    use crate::testing::{MemoryStore, ScriptedIdentity};

    fn coordinator(
        store: &Arc<MemoryStore>,
        identity: &Arc<ScriptedIdentity>,
    ) -> ProvisioningCoordinator<MemoryStore, ScriptedIdentity> {
        ProvisioningCoordinator::new(Arc::clone(store), Arc::clone(identity))
    }

    fn org_dto(name: &str, admin_email: &str) -> CreateOrganization {
        CreateOrganization {
            org_name: name.to_string(),
            org_type: Some("HOA".to_string()),
            address: Some("1 Main St".to_string()),
            city: None,
            state: None,
            country: None,
            reg_num: None,
            vat_id: None,
            website: None,
            logo: None,
            doc_upload: None,
            admin_first: "Ada".to_string(),
            admin_last: "Lovelace".to_string(),
            admin_email: admin_email.to_string(),
            admin_contact: Some("555-0100".to_string()),
        }
    }

    fn comm_dto(org_name: &str, comm_name: &str, admin_email: &str) -> CreateCommunity {
        CreateCommunity {
            org_name: org_name.to_string(),
            comm_name: comm_name.to_string(),
            comm_type: Some("gated".to_string()),
            block_num: Some(2),
            units_in_block: Some(10),
            comm_address: None,
            comm_city: None,
            comm_state: None,
            comm_country: None,
            comm_features: None,
            comm_admin_first: "Cora".to_string(),
            comm_admin_last: "Warden".to_string(),
            comm_admin_email: admin_email.to_string(),
            comm_admin_contact: None,
        }
    }

    fn update_comm_dto(admin_email: &str) -> UpdateCommunity {
        UpdateCommunity {
            comm_type: Some("open".to_string()),
            block_num: Some(9),
            units_in_block: Some(99),
            comm_address: Some("9 New Rd".to_string()),
            comm_city: None,
            comm_state: None,
            comm_country: None,
            comm_features: None,
            comm_admin_first: "Renamed".to_string(),
            comm_admin_last: "Warden".to_string(),
            comm_admin_email: admin_email.to_string(),
            comm_admin_contact: Some("555-0199".to_string()),
        }
    }

    #[tokio::test]
    async fn create_organization_binds_admin_and_sends_email() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());

        let provisioned = coordinator(&store, &identity)
            .create_organization(org_dto("Acme", "Boss@Acme.test"))
            .await
            .unwrap();

        assert!(provisioned.credential_email_sent);
        assert_eq!(provisioned.entity.org_name, "Acme");
        assert_eq!(provisioned.entity.admin_email, "boss@acme.test");

        let orgs = store.raw_organizations();
        assert_eq!(orgs.len(), 1);
        assert!(orgs[0].active);

        let users = store.raw_users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].organization_id, Some(orgs[0].id));
        assert_eq!(identity.create_calls(), 1);
        assert_eq!(identity.email_calls(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_yields_one_success_and_one_conflict() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let coordinator = coordinator(&store, &identity);

        coordinator
            .create_organization(org_dto("Acme", "one@acme.test"))
            .await
            .unwrap();
        let err = coordinator
            .create_organization(org_dto("Acme", "two@acme.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(store.raw_organizations().len(), 1);
        // The losing create bailed before touching the identity provider.
        assert_eq!(identity.create_calls(), 1);
    }

    #[tokio::test]
    async fn identity_failure_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        identity.fail_next_create();

        let err = coordinator(&store, &identity)
            .create_organization(org_dto("Acme", "boss@acme.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::ProvisioningFailed(_)));
        assert!(store.raw_organizations().is_empty());
        assert!(store.raw_users().is_empty());
    }

    #[tokio::test]
    async fn local_insert_failure_rolls_back_and_deletes_the_identity() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        store.fail_next_insert_organization();

        let err = coordinator(&store, &identity)
            .create_organization(org_dto("Acme", "boss@acme.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Store(_)));
        assert!(store.raw_organizations().is_empty());
        // The identity was created and then compensated away again.
        assert_eq!(identity.create_calls(), 1);
        assert_eq!(identity.deleted_identities(), vec!["kc-1".to_string()]);
        assert!(store.raw_users().is_empty());
    }

    #[tokio::test]
    async fn community_without_parent_makes_no_identity_calls() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());

        let err = coordinator(&store, &identity)
            .create_community(comm_dto("Ghost", "north", "warden@ghost.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(identity.create_calls(), 0);
        assert!(store.raw_communities().is_empty());
    }

    #[tokio::test]
    async fn community_under_inactive_parent_is_rejected_before_identity_calls() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let org_id = store.seed_organization("Acme", "boss@acme.test");
        store.deactivate_org_raw(org_id);

        let err = coordinator(&store, &identity)
            .create_community(comm_dto("Acme", "north", "warden@acme.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(identity.create_calls(), 0);
    }

    #[tokio::test]
    async fn community_creation_binds_admin_to_both_levels() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let org_id = store.seed_organization("Acme", "boss@acme.test");

        let provisioned = coordinator(&store, &identity)
            .create_community(comm_dto("Acme", "north", "warden@acme.test"))
            .await
            .unwrap();

        assert_eq!(provisioned.entity.org_name, "Acme");
        let comms = store.raw_communities();
        assert_eq!(comms.len(), 1);
        assert_eq!(comms[0].org_id, org_id);

        let admin = store
            .raw_users()
            .into_iter()
            .find(|u| u.username == "warden@acme.test")
            .unwrap();
        assert_eq!(admin.community_id, Some(comms[0].id));
        assert_eq!(admin.organization_id, Some(org_id));
    }

    #[tokio::test]
    async fn failed_credential_email_is_a_partial_success() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        identity.fail_next_credential_email();

        let provisioned = coordinator(&store, &identity)
            .create_organization(org_dto("Acme", "boss@acme.test"))
            .await
            .unwrap();

        assert!(!provisioned.credential_email_sent);
        // The entity committed regardless.
        assert_eq!(store.raw_organizations().len(), 1);
    }

    #[tokio::test]
    async fn update_with_unknown_admin_email_mutates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let org_id = store.seed_organization("Acme", "boss@acme.test");
        let comm_id = store.seed_community(org_id, "north", 2, 10, "warden@acme.test");

        let err = coordinator(&store, &identity)
            .update_community(comm_id, update_comm_dto("stranger@acme.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
        let comm = store.raw_communities().into_iter().next().unwrap();
        assert_eq!(comm.block_num, 2);
        assert_eq!(comm.units_in_block, 10);
        let admin = store
            .raw_users()
            .into_iter()
            .find(|u| u.username == "warden@acme.test")
            .unwrap();
        assert_eq!(admin.first_name, "Admin");
    }

    #[tokio::test]
    async fn update_applies_entity_and_admin_fields_together() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let org_id = store.seed_organization("Acme", "boss@acme.test");
        let comm_id = store.seed_community(org_id, "north", 2, 10, "warden@acme.test");

        let view = coordinator(&store, &identity)
            .update_community(comm_id, update_comm_dto("warden@acme.test"))
            .await
            .unwrap();

        assert_eq!(view.block_num, 9);
        assert_eq!(view.units_in_block, 99);
        assert_eq!(view.comm_admin_first, "Renamed");
        assert_eq!(view.org_name, "Acme");

        let comm = store.raw_communities().into_iter().next().unwrap();
        assert_eq!(comm.block_num, 9);
        let admin = store
            .raw_users()
            .into_iter()
            .find(|u| u.username == "warden@acme.test")
            .unwrap();
        assert_eq!(admin.first_name, "Renamed");
        assert_eq!(admin.contact.as_deref(), Some("555-0199"));
    }

    #[tokio::test]
    async fn updating_a_missing_community_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());

        let err = coordinator(&store, &identity)
            .update_community(Uuid::new_v4(), update_comm_dto("warden@acme.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn organization_rename_collision_is_a_conflict() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let acme = store.seed_organization("Acme", "boss@acme.test");
        store.seed_organization("Beta", "boss@beta.test");

        let dto = UpdateOrganization {
            org_name: Some("Beta".to_string()),
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
            admin_first: "Ada".to_string(),
            admin_last: "Lovelace".to_string(),
            admin_email: "boss@acme.test".to_string(),
            admin_contact: None,
        };
        let err = coordinator(&store, &identity)
            .update_organization(acme, dto)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn remove_soft_deletes_and_hides_the_organization() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let coordinator = coordinator(&store, &identity);

        let provisioned = coordinator
            .create_organization(org_dto("Acme", "boss@acme.test"))
            .await
            .unwrap();

        coordinator
            .remove_organization(provisioned.entity.id)
            .await
            .unwrap();

        let err = coordinator.find_organization("Acme").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        // The row is retained in storage with active=false.
        let orgs = store.raw_organizations();
        assert_eq!(orgs.len(), 1);
        assert!(!orgs[0].active);
    }

    #[tokio::test]
    async fn removing_a_missing_entity_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let coordinator = coordinator(&store, &identity);

        let err = coordinator
            .remove_organization(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = coordinator
            .remove_community(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn a_second_admin_binding_is_rejected_at_write_time() {
        let store = Arc::new(MemoryStore::new());
        let org_id = store.seed_organization("Acme", "boss@acme.test");

        let intruder = store
            .create_user(NewUser {
                username: "second@acme.test".to_string(),
                email: "second@acme.test".to_string(),
                first_name: "Second".to_string(),
                last_name: "Admin".to_string(),
                role: Role::OrgAdmin,
                contact: None,
            })
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = store
            .bind_admin_to_org(&mut tx, intruder.id, org_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn reused_admin_email_is_a_conflict() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let coordinator = coordinator(&store, &identity);

        coordinator
            .create_organization(org_dto("Acme", "boss@acme.test"))
            .await
            .unwrap();
        let err = coordinator
            .create_organization(org_dto("Other", "boss@acme.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(store.raw_organizations().len(), 1);
    }

    #[tokio::test]
    async fn validation_rejects_bad_input_before_any_side_effect() {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(ScriptedIdentity::new());
        let coordinator = coordinator(&store, &identity);

        let err = coordinator
            .create_organization(org_dto("Ax", "boss@acme.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = coordinator
            .create_organization(org_dto("Acme", "not-an-email"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        assert_eq!(identity.create_calls(), 0);
        assert!(store.raw_organizations().is_empty());
        assert!(store.raw_users().is_empty());
    }
}
