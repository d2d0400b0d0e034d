use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ApiResult};
use crate::database::models::user::Role;
use crate::error::ApiError;
use crate::scope::Principal;
use crate::services::provisioning::{
    CreateOrganization, OrganizationWithAdmin, Provisioned, UpdateOrganization,
};
use crate::state::AppState;

const ALLOWED: &[Role] = &[Role::SuperAdmin, Role::OrgAdmin];

/// POST /api/org - provision an organization and its admin identity
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(dto): Json<CreateOrganization>,
) -> ApiResult<Provisioned<OrganizationWithAdmin>> {
    principal.require_any(ALLOWED)?;

    let provisioned = state.provisioning.create_organization(dto).await?;
    let message = if provisioned.credential_email_sent {
        "Organization created"
    } else {
        "Organization created, but the credential setup email could not be sent"
    };
    Ok(ApiResponse::created(message, provisioned))
}

/// GET /api/org/:org - fetch the entity-with-admin view by name
pub async fn find_one(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(org_name): Path<String>,
) -> ApiResult<OrganizationWithAdmin> {
    principal.require_any(ALLOWED)?;

    let view = state.provisioning.find_organization(&org_name).await?;
    Ok(ApiResponse::ok(
        format!("Fetched organization \"{}\"", view.org_name),
        view,
    ))
}

/// PUT /api/org/:org - update profile and admin fields together
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(dto): Json<UpdateOrganization>,
) -> ApiResult<OrganizationWithAdmin> {
    principal.require_any(ALLOWED)?;
    let id = parse_id(&id)?;

    let view = state.provisioning.update_organization(id, dto).await?;
    Ok(ApiResponse::ok(
        format!("Organization \"{}\" updated", view.org_name),
        view,
    ))
}

/// DELETE /api/org/:org - soft delete
pub async fn remove(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    principal.require_any(ALLOWED)?;
    let id = parse_id(&id)?;

    state.provisioning.remove_organization(id).await?;
    Ok(ApiResponse::message_only("Organization deleted successfully"))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid organization id"))
}
