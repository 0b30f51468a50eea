//! Status reports and raw samples posted by agents

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::{error::ApiResult, state::ApiState, types::SamplesResponse};
use crate::model::ServiceHealthReport;
use crate::timeseries::CheckSamples;

/// POST /api/v1/:env/tenants/:tenant/services/:service/health
pub async fn record_status(
    State(state): State<ApiState>,
    Path((environment, tenant, service)): Path<(String, String, String)>,
    Json(report): Json<ServiceHealthReport>,
) -> ApiResult<StatusCode> {
    state
        .health
        .record_status(&environment, &tenant, &service, report)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/:env/tenants/:tenant/services/:service/samples
pub async fn record_samples(
    State(state): State<ApiState>,
    Path((environment, tenant, service)): Path<(String, String, String)>,
    Json(samples): Json<CheckSamples>,
) -> ApiResult<Json<SamplesResponse>> {
    let accepted = state
        .health
        .record_check_samples(&environment, &tenant, &service, samples)
        .await?;
    Ok(Json(SamplesResponse { accepted }))
}
