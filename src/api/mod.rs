//! REST API of the hub
//!
//! Agents use it to fetch tenant hierarchies, post status reports, raw check
//! samples and error reports. Operators use it to read aggregated health and
//! to schedule maintenance windows.
//!
//! ## Architecture
//!
//! - **Axum** router, Tower layers for tracing and CORS
//! - **Hub services** ([`HealthDataService`](crate::hub::HealthDataService),
//!   [`ErrorReportLog`](crate::hub::ErrorReportLog), a maintenance store)
//!   shared through [`ApiState`]
//! - **Bearer token** checked on every route except `/api/v1/health`
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Hub health
//! - `GET /api/v1/:env/health` - Rollup of every tenant
//! - `GET /api/v1/:env/tenants/:tenant` - Tenant service hierarchy
//! - `GET /api/v1/:env/tenants/:tenant/health` - Aggregated tenant health
//! - `POST /api/v1/:env/tenants/:tenant/services/:service/health` - Status report
//! - `POST /api/v1/:env/tenants/:tenant/services/:service/samples` - Raw check samples
//! - `GET|POST /api/v1/:env/error-reports` - Agent error reports
//! - `GET|POST /api/v1/maintenance` - Maintenance windows
//! - `DELETE /api/v1/maintenance/:id` - Cancel a maintenance window
//!
//! An environment literally named `maintenance` is shadowed by the
//! maintenance routes.

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{ErrorReportsResponse, HealthResponse, MaintenanceResponse, SamplesResponse, StorageStatus};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
#[cfg(feature = "api")]
use tracing::{error, info};

/// Where and how the hub API listens
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    /// Shared agent/operator token; `None` leaves the API open
    pub auth_token: Option<String>,

    /// Allow browser dashboards on other origins
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), crate::util::DEFAULT_HUB_PORT),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Routes agents and operators call; these sit behind the token check.
#[cfg(feature = "api")]
fn tenant_routes() -> Router<ApiState> {
    use routes::{error_reports, health, maintenance, reports, tenants};

    let tenant = "/api/v1/:env/tenants/:tenant";
    let service = "/api/v1/:env/tenants/:tenant/services/:service";

    Router::new()
        .route("/api/v1/:env/health", get(health::environment_health))
        .route(tenant, get(tenants::get_tenant))
        .route(&format!("{tenant}/health"), get(health::tenant_health))
        .route(&format!("{service}/health"), post(reports::record_status))
        .route(&format!("{service}/samples"), post(reports::record_samples))
        .route(
            "/api/v1/:env/error-reports",
            get(error_reports::list_error_reports).post(error_reports::create_error_report),
        )
        .route(
            "/api/v1/maintenance",
            get(maintenance::list_maintenance).post(maintenance::create_maintenance),
        )
        .route("/api/v1/maintenance/:id", delete(maintenance::delete_maintenance))
}

/// Assemble the full hub router for `config`.
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut protected = tenant_routes();
    match &config.auth_token {
        Some(token) => {
            protected = protected.route_layer(axum::middleware::from_fn_with_state(
                token.clone(),
                middleware::auth::auth_middleware,
            ));
        }
        None => info!("hub API runs without authentication"),
    }

    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}

/// Bind the hub API and serve it from a background task.
///
/// Returns the bound address, which differs from the configured one when
/// port 0 was requested.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("hub API listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("hub API server stopped: {}", e);
        }
    });

    Ok(addr)
}
