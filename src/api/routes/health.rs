//! Health endpoints: the hub itself, tenants and environments

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::warn;

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{HealthResponse, StorageStatus},
};
use crate::hub::{EnvironmentHealth, TenantHealth};

/// GET /api/v1/health
///
/// Reports `degraded` while the status cache is unreachable.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let storage = match state.cache.health_check().await {
        Ok(health) => StorageStatus {
            healthy: health.healthy,
            message: health.message,
        },
        Err(e) => {
            warn!("storage health check failed: {e}");
            StorageStatus {
                healthy: false,
                message: e.to_string(),
            }
        }
    };

    Json(HealthResponse {
        status: if storage.healthy { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
    })
}

/// GET /api/v1/:env/tenants/:tenant/health
pub async fn tenant_health(
    State(state): State<ApiState>,
    Path((environment, tenant)): Path<(String, String)>,
) -> ApiResult<Json<TenantHealth>> {
    Ok(Json(state.health.service_health(&environment, &tenant).await?))
}

/// GET /api/v1/:env/health
pub async fn environment_health(
    State(state): State<ApiState>,
    Path(environment): Path<String>,
) -> ApiResult<Json<EnvironmentHealth>> {
    Ok(Json(state.health.environment_health(&environment).await?))
}
