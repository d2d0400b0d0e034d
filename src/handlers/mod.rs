pub mod auth;
pub mod community;
pub mod dashboard;
pub mod org;

use axum::extract::State;
use serde_json::{json, Value};

use crate::api::response::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET /health - liveness plus a database ping
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => Ok(ApiResponse::ok(
            "ok",
            json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok",
            }),
        )),
        Err(err) => {
            tracing::error!("health check failed: {}", err);
            Err(crate::error::ApiError::service_unavailable(
                "database unavailable",
            ))
        }
    }
}
