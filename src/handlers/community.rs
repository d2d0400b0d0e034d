use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ApiResult};
use crate::database::models::user::Role;
use crate::error::ApiError;
use crate::scope::Principal;
use crate::services::provisioning::{
    CommunityWithAdmin, CreateCommunity, Provisioned, UpdateCommunity,
};
use crate::state::AppState;

const ALLOWED: &[Role] = &[Role::SuperAdmin, Role::OrgAdmin, Role::CommunityAdmin];

/// POST /api/community - provision a community and its admin identity under
/// an existing active organization
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(dto): Json<CreateCommunity>,
) -> ApiResult<Provisioned<CommunityWithAdmin>> {
    principal.require_any(ALLOWED)?;

    let provisioned = state.provisioning.create_community(dto).await?;
    let message = if provisioned.credential_email_sent {
        "Community created"
    } else {
        "Community created, but the credential setup email could not be sent"
    };
    Ok(ApiResponse::created(message, provisioned))
}

/// GET /api/community/:id
pub async fn find_one(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<CommunityWithAdmin> {
    principal.require_any(ALLOWED)?;
    let id = parse_id(&id)?;

    let view = state.provisioning.find_community(id).await?;
    Ok(ApiResponse::ok(
        format!("Fetched community \"{}\"", view.comm_name),
        view,
    ))
}

/// PUT /api/community/:id - update profile and admin fields together
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(dto): Json<UpdateCommunity>,
) -> ApiResult<CommunityWithAdmin> {
    principal.require_any(ALLOWED)?;
    let id = parse_id(&id)?;

    let view = state.provisioning.update_community(id, dto).await?;
    Ok(ApiResponse::ok(
        format!("Community \"{}\" updated", view.comm_name),
        view,
    ))
}

/// DELETE /api/community/:id - soft delete
pub async fn remove(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    principal.require_any(ALLOWED)?;
    let id = parse_id(&id)?;

    state.provisioning.remove_community(id).await?;
    Ok(ApiResponse::message_only("Community deleted successfully"))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid community id"))
}
