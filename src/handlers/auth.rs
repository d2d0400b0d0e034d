use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::response::{ApiResponse, ApiResult};
use crate::database::models::user::Role;
use crate::error::ApiError;
use crate::identity::TokenPair;
use crate::services::accounts::{NewAccount, RegistrationOutcome};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub contact: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// POST /api/auth/register - create a mirror row and provider identity, then
/// email the credential-setup link
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<RegistrationOutcome> {
    let role = Role::parse(&request.role)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown role \"{}\"", request.role)))?;

    let outcome = state
        .accounts
        .register_with_notification(NewAccount {
            username: request.username,
            first_name: request.first_name,
            last_name: request.last_name,
            contact: request.contact,
            role,
        })
        .await?;

    Ok(ApiResponse::created(
        "Registration complete! Please check your email to set your password and activate your account.",
        outcome,
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<TokenPair> {
    let tokens = state
        .accounts
        .login(&request.username, &request.password)
        .await?;
    Ok(ApiResponse::ok("User logged in successfully", tokens))
}

/// POST /api/auth/forget-password
pub async fn forget_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> ApiResult<bool> {
    let sent = state.accounts.forgot_password(&request.email).await?;
    if sent {
        Ok(ApiResponse::ok(
            "Password reset request successful. Check your email for instructions to reset your password.",
            true,
        ))
    } else {
        // false from the provider means the identity does not exist
        Err(ApiError::not_found(
            "Invalid email address. Please check and enter a valid email to reset your password.",
        ))
    }
}

/// POST /api/auth/refreshtoken
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> ApiResult<TokenPair> {
    let tokens = state.accounts.refresh(&request.refresh_token).await?;
    Ok(ApiResponse::ok("Token refreshed", tokens))
}
