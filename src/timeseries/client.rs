//! Prometheus / Loki HTTP query client

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{instrument, trace};

use super::error::{TimeSeriesError, TimeSeriesResult};
use super::{BackendKind, Sample};

/// One labelled series returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: HashMap<String, String>,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Matrix(Vec<RangeSeries>),
    Vector(Vec<InstantSeries>),
    Scalar(RawSample),
    Streams(serde_json::Value),
    String(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<RawSample>,
}

#[derive(Debug, Deserialize)]
struct InstantSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: RawSample,
}

/// `[unixSeconds, "value"]`; values are strings so `NaN` and `+Inf` survive JSON.
#[derive(Debug, Deserialize)]
struct RawSample(f64, String);

impl RawSample {
    fn into_sample(self) -> TimeSeriesResult<Sample> {
        let value = self
            .1
            .parse::<f64>()
            .map_err(|e| TimeSeriesError::Decode(format!("invalid sample value '{}': {}", self.1, e)))?;
        Sample::from_unix_seconds(self.0, value)
            .ok_or_else(|| TimeSeriesError::Decode(format!("invalid sample timestamp {}", self.0)))
    }
}

/// Query client for a Prometheus- or Loki-compatible backend.
#[derive(Debug, Clone)]
pub struct TimeSeriesClient {
    client: Client,
    base_url: String,
    kind: BackendKind,
    auth_token: Option<String>,
}

impl TimeSeriesClient {
    pub fn new(
        kind: BackendKind,
        base_url: impl Into<String>,
        timeout: Duration,
        auth_token: Option<String>,
    ) -> TimeSeriesResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimeSeriesError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            kind,
            auth_token,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Instant query evaluated at `time`.
    #[instrument(skip(self), fields(backend = ?self.kind))]
    pub async fn query(&self, expression: &str, time: DateTime<Utc>) -> TimeSeriesResult<Vec<Series>> {
        let params = [
            ("query", expression.to_string()),
            ("time", self.format_time(time)),
        ];
        self.execute("query", &params).await
    }

    /// Range query over `[start, end]` at resolution `step`.
    #[instrument(skip(self), fields(backend = ?self.kind))]
    pub async fn query_range(
        &self,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> TimeSeriesResult<Vec<Series>> {
        if end < start {
            return Err(TimeSeriesError::InvalidWindow);
        }

        let params = [
            ("query", expression.to_string()),
            ("start", self.format_time(start)),
            ("end", self.format_time(end)),
            ("step", format!("{}s", step.as_secs().max(1))),
        ];
        self.execute("query_range", &params).await
    }

    async fn execute(&self, endpoint: &str, params: &[(&str, String)]) -> TimeSeriesResult<Vec<Series>> {
        let url = format!("{}{}/{}", self.base_url, self.kind.api_prefix(), endpoint);
        trace!("querying {url}");

        let mut request = self.client.get(&url).query(params);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        parse_response(status, &body)
    }

    /// Loki takes nanosecond epochs; Prometheus takes RFC 3339.
    fn format_time(&self, time: DateTime<Utc>) -> String {
        match self.kind {
            BackendKind::Prometheus => time.to_rfc3339_opts(SecondsFormat::Millis, true),
            BackendKind::Loki => time
                .timestamp_nanos_opt()
                .map(|nanos| nanos.to_string())
                .unwrap_or_else(|| time.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        }
    }
}

fn parse_response(status: StatusCode, body: &str) -> TimeSeriesResult<Vec<Series>> {
    let parsed: ApiResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => return Err(TimeSeriesError::Http(status.as_u16())),
        Err(e) => return Err(TimeSeriesError::Decode(e.to_string())),
    };

    if parsed.status != "success" {
        let kind = parsed.error_type.unwrap_or_else(|| "unknown".to_string());
        let message = parsed.error.unwrap_or_default();
        return Err(TimeSeriesError::Backend(format!("{kind}: {message}")));
    }

    match parsed.data {
        Some(QueryData::Matrix(series)) => series
            .into_iter()
            .map(|s| -> TimeSeriesResult<Series> {
                Ok(Series {
                    labels: s.metric,
                    samples: s
                        .values
                        .into_iter()
                        .map(RawSample::into_sample)
                        .collect::<TimeSeriesResult<_>>()?,
                })
            })
            .collect(),
        Some(QueryData::Vector(series)) => series
            .into_iter()
            .map(|s| -> TimeSeriesResult<Series> {
                Ok(Series {
                    labels: s.metric,
                    samples: vec![s.value.into_sample()?],
                })
            })
            .collect(),
        Some(QueryData::Scalar(sample)) => Ok(vec![Series {
            labels: HashMap::new(),
            samples: vec![sample.into_sample()?],
        }]),
        Some(QueryData::Streams(_)) => Err(TimeSeriesError::UnsupportedResultType("streams".into())),
        Some(QueryData::String(_)) => Err(TimeSeriesError::UnsupportedResultType("string".into())),
        None => Err(TimeSeriesError::Decode("response has no data".into())),
    }
}
