//! Client side of the hub's status API

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::model::{ServiceHealthReport, TenantConfiguration};
use crate::timeseries::CheckSamples;

/// Errors returned by the status API
#[derive(Debug, Clone, PartialEq)]
pub enum StatusApiError {
    /// The requested environment or tenant does not exist
    NotFound,

    /// The hub rejected the bearer token
    Unauthorized,

    /// Any other non-success response
    Http(u16),

    /// Connection failure, timeout or other transport problem
    Transport(String),

    /// The response body could not be decoded
    Decode(String),
}

impl fmt::Display for StatusApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusApiError::NotFound => write!(f, "resource not found"),
            StatusApiError::Unauthorized => write!(f, "request was not authorized"),
            StatusApiError::Http(status) => write!(f, "status API returned HTTP {}", status),
            StatusApiError::Transport(msg) => write!(f, "status API request failed: {}", msg),
            StatusApiError::Decode(msg) => write!(f, "failed to decode status API response: {}", msg),
        }
    }
}

impl std::error::Error for StatusApiError {}

impl From<reqwest::Error> for StatusApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StatusApiError::Decode(err.to_string())
        } else {
            StatusApiError::Transport(err.to_string())
        }
    }
}

pub type StatusApiResult<T> = Result<T, StatusApiError>;

/// Problem report an agent files with the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportDetails {
    pub tenant: Option<String>,
    pub service: Option<String>,
    pub health_check: Option<String>,
    pub level: ErrorLevel,
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ErrorReportDetails {
    pub fn new(level: ErrorLevel, message: impl Into<String>) -> Self {
        Self {
            tenant: None,
            service: None,
            health_check: None,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorLevel {
    Warning,
    Error,
}

/// Calls the agent makes against the hub.
#[async_trait]
pub trait StatusApi: Send + Sync {
    async fn get_tenant(&self, environment: &str, tenant: &str) -> StatusApiResult<TenantConfiguration>;

    async fn record_status(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        report: &ServiceHealthReport,
    ) -> StatusApiResult<()>;

    async fn record_check_samples(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        samples: &CheckSamples,
    ) -> StatusApiResult<()>;

    async fn create_error_report(&self, environment: &str, report: &ErrorReportDetails) -> StatusApiResult<()>;
}

/// [`StatusApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStatusApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStatusApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, token: Option<String>) -> StatusApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StatusApiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> StatusApiResult<()> {
        let url = self.url(path);
        trace!("POST {url}");

        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        check_status(response.status())
    }
}

fn check_status(status: StatusCode) -> StatusApiResult<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(StatusApiError::NotFound),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StatusApiError::Unauthorized),
        s => Err(StatusApiError::Http(s.as_u16())),
    }
}

#[async_trait]
impl StatusApi for HttpStatusApiClient {
    #[instrument(skip(self))]
    async fn get_tenant(&self, environment: &str, tenant: &str) -> StatusApiResult<TenantConfiguration> {
        let url = self.url(&format!("{environment}/tenants/{tenant}"));
        trace!("GET {url}");

        let response = self.authorize(self.client.get(&url)).send().await?;
        check_status(response.status())?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| StatusApiError::Decode(e.to_string()))
    }

    #[instrument(skip(self, report))]
    async fn record_status(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        report: &ServiceHealthReport,
    ) -> StatusApiResult<()> {
        self.post(
            &format!("{environment}/tenants/{tenant}/services/{service}/health"),
            report,
        )
        .await
    }

    #[instrument(skip(self, samples))]
    async fn record_check_samples(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        samples: &CheckSamples,
    ) -> StatusApiResult<()> {
        self.post(
            &format!("{environment}/tenants/{tenant}/services/{service}/samples"),
            samples,
        )
        .await
    }

    #[instrument(skip(self, report))]
    async fn create_error_report(&self, environment: &str, report: &ErrorReportDetails) -> StatusApiResult<()> {
        self.post(&format!("{environment}/error-reports"), report).await
    }
}
