//! Maintenance window endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::MaintenanceResponse,
};
use crate::maintenance::{MaintenanceRecord, MaintenanceScope, NewMaintenance};

/// GET /api/v1/maintenance
pub async fn list_maintenance(State(state): State<ApiState>) -> ApiResult<Json<MaintenanceResponse>> {
    let maintenance = state.maintenance.list().await?;
    Ok(Json(MaintenanceResponse { maintenance }))
}

/// POST /api/v1/maintenance
///
/// The scope must name a configured environment (and tenant, if given).
/// Services are not checked: a service scope for an unconfigured service
/// still records that service alone.
pub async fn create_maintenance(
    State(state): State<ApiState>,
    Json(maintenance): Json<NewMaintenance>,
) -> ApiResult<(StatusCode, Json<MaintenanceRecord>)> {
    if maintenance.end_time <= maintenance.start_time {
        return Err(ApiError::InvalidRequest(
            "endTime must be after startTime".to_string(),
        ));
    }

    let hierarchy = state.hierarchy();
    match &maintenance.scope {
        MaintenanceScope::Environment { environment } => {
            if hierarchy.tenants(environment).await.is_empty() {
                return Err(ApiError::NotFound(format!("environment {environment} not found")));
            }
        }
        MaintenanceScope::Tenant { environment, tenant }
        | MaintenanceScope::Service {
            environment, tenant, ..
        } => {
            if hierarchy.tenant(environment, tenant).await.is_none() {
                return Err(ApiError::NotFound(format!(
                    "tenant {environment}/{tenant} not found"
                )));
            }
        }
    }

    let record = state.maintenance.insert(maintenance).await?;
    info!(id = record.id, scope = %record.scope, "scheduled maintenance");
    Ok((StatusCode::CREATED, Json(record)))
}

/// DELETE /api/v1/maintenance/:id
pub async fn delete_maintenance(State(state): State<ApiState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.maintenance.delete(id).await?;
    info!(id, "cancelled maintenance");
    Ok(StatusCode::NO_CONTENT)
}
