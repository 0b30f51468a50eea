//! Writing samples to the time-series backend
//!
//! Samples are pushed as Prometheus text exposition lines with explicit
//! millisecond timestamps, the format accepted by the import endpoints of
//! Prometheus-compatible stores:
//!
//! ```text
//! canopy_service_status{environment="prod",service="api",status="Online",tenant="acme"} 1 1700000000000
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, instrument};

use super::error::{TimeSeriesError, TimeSeriesResult};

/// One sample of one series, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricLine {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricLine {
    pub fn new(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            value,
            timestamp,
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Render in text exposition format.
    pub fn to_exposition(&self) -> String {
        let labels = self
            .labels
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", key, escape_label(value)))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}{{{}}} {} {}",
            self.name,
            labels,
            format_value(self.value),
            self.timestamp.timestamp_millis()
        )
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// Sink for metric lines.
#[async_trait]
pub trait MetricWriter: Send + Sync {
    async fn write(&self, lines: Vec<MetricLine>) -> TimeSeriesResult<()>;
}

/// Writes lines by POSTing them to an HTTP import endpoint.
#[derive(Debug, Clone)]
pub struct HttpImportWriter {
    client: Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpImportWriter {
    pub fn new(url: impl Into<String>, timeout: Duration, auth_token: Option<String>) -> TimeSeriesResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimeSeriesError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            auth_token,
        })
    }
}

#[async_trait]
impl MetricWriter for HttpImportWriter {
    #[instrument(skip(self, lines), fields(count = lines.len()))]
    async fn write(&self, lines: Vec<MetricLine>) -> TimeSeriesResult<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let body = lines
            .iter()
            .map(MetricLine::to_exposition)
            .collect::<Vec<_>>()
            .join("\n");

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(body + "\n");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TimeSeriesError::Http(response.status().as_u16()));
        }

        debug!("wrote {} metric lines", lines.len());
        Ok(())
    }
}

/// Keeps written lines in memory; used when no backend is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryMetricWriter {
    lines: Mutex<Vec<MetricLine>>,
}

impl MemoryMetricWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<MetricLine> {
        self.lines.lock().clone()
    }

    pub fn lines_named(&self, name: &str) -> Vec<MetricLine> {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricWriter for MemoryMetricWriter {
    async fn write(&self, lines: Vec<MetricLine>) -> TimeSeriesResult<()> {
        self.lines.lock().extend(lines);
        Ok(())
    }
}
