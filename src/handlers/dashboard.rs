use axum::extract::State;
use axum::Extension;

use crate::api::response::{ApiResponse, ApiResult};
use crate::scope::Principal;
use crate::services::dashboard::Dashboard;
use crate::state::AppState;

/// GET /api/dashboard - role-scoped totals and breakdown. The caller's scope
/// comes entirely from its verified role claims and email; there is no way to
/// request a wider scope than the resolver grants.
pub async fn show(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Dashboard> {
    let scope = state.resolver.resolve(&principal).await?;
    let dashboard = state.aggregation.dashboard(&scope).await?;
    Ok(ApiResponse::ok(
        "Dashboard data fetched successfully",
        dashboard,
    ))
}
