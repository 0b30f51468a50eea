//! Tenant configuration served to agents

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::model::TenantConfiguration;

/// GET /api/v1/:env/tenants/:tenant
///
/// A 404 tells the agent to stop monitoring the tenant.
pub async fn get_tenant(
    State(state): State<ApiState>,
    Path((environment, tenant)): Path<(String, String)>,
) -> ApiResult<Json<TenantConfiguration>> {
    state
        .hierarchy()
        .tenant(&environment, &tenant)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("tenant {environment}/{tenant} not found")))
}
