//! Error reports filed by agents

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::agent::api::ErrorReportDetails;
use crate::api::{state::ApiState, types::ErrorReportsResponse};

/// POST /api/v1/:env/error-reports
pub async fn create_error_report(
    State(state): State<ApiState>,
    Path(environment): Path<String>,
    Json(details): Json<ErrorReportDetails>,
) -> StatusCode {
    state.error_reports.record(&environment, details);
    StatusCode::ACCEPTED
}

/// GET /api/v1/:env/error-reports
///
/// Newest first.
pub async fn list_error_reports(
    State(state): State<ApiState>,
    Path(environment): Path<String>,
) -> Json<ErrorReportsResponse> {
    let reports = state.error_reports.recent(&environment);
    Json(ErrorReportsResponse { environment, reports })
}
