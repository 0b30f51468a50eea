//! HTTP health check evaluation
//!
//! One GET request per evaluation. Each condition is tested against the
//! response and the most severe matched status wins:
//!
//! | Condition      | Matches when                                         |
//! |----------------|------------------------------------------------------|
//! | `StatusCode`   | the response code is listed                          |
//! | `ResponseTime` | the response took longer than the threshold          |
//! | `HttpBodyJson` | every node selected by the JSONPath matches the regex |
//! | `HttpBodyXml`  | the string value of the XPath result matches the regex |
//!
//! Body conditions are judged against one document kind per response. A
//! check with both JSON and XML conditions uses the kind named by the
//! `Content-Type` header, or whichever parse succeeds, and skips the others.
//!
//! When nothing matched, the check is `Offline` if a `StatusCode` condition
//! with status `Online` lists the acceptable codes (the response had to match
//! one of them to pass), and `Online` otherwise.
//!
//! Transport failures and timeouts are `Offline`; malformed bodies, bad paths
//! and anything else unexpected are `Unknown`.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, redirect};
use serde_json_path::JsonPath;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::HealthCheckEvaluator;
use crate::model::{CheckIdentifier, HealthStatus, HttpCheckDefinition, HttpCondition};

/// Maximum redirects followed when a check allows redirects
const MAX_REDIRECTS: usize = 10;

/// Why a response could not be judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    MalformedJson(String),
    MalformedXml(String),
    InvalidPath(String),
    NothingSelected(String),
    InvalidPattern(String),
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionError::MalformedJson(msg) => write!(f, "response is not valid JSON: {}", msg),
            ConditionError::MalformedXml(msg) => write!(f, "response is not valid XML: {}", msg),
            ConditionError::InvalidPath(msg) => write!(f, "invalid document path: {}", msg),
            ConditionError::NothingSelected(path) => write!(f, "path '{}' selected nothing", path),
            ConditionError::InvalidPattern(msg) => write!(f, "invalid value pattern: {}", msg),
        }
    }
}

impl std::error::Error for ConditionError {}

/// The parts of a response conditions look at.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    pub elapsed: Duration,
    pub content_type: Option<String>,
    pub body: String,
}

/// A response body parsed for body conditions.
enum Document {
    Json(serde_json::Value),
    Xml(sxd_document::Package),
}

fn parse_json(body: &str) -> Result<Document, ConditionError> {
    serde_json::from_str(body)
        .map(Document::Json)
        .map_err(|e| ConditionError::MalformedJson(e.to_string()))
}

fn parse_xml(body: &str) -> Result<Document, ConditionError> {
    sxd_document::parser::parse(body)
        .map(Document::Xml)
        .map_err(|e| ConditionError::MalformedXml(format!("{e:?}")))
}

/// Parse the body as the document kind the conditions ask for.
///
/// `None` when no condition looks at the body.
fn parse_body(conditions: &[HttpCondition], response: &ResponseSnapshot) -> Result<Option<Document>, ConditionError> {
    let wants_json = conditions
        .iter()
        .any(|c| matches!(c, HttpCondition::HttpBodyJson { .. }));
    let wants_xml = conditions
        .iter()
        .any(|c| matches!(c, HttpCondition::HttpBodyXml { .. }));

    let document = match (wants_json, wants_xml) {
        (false, false) => return Ok(None),
        (true, false) => parse_json(&response.body)?,
        (false, true) => parse_xml(&response.body)?,
        (true, true) => {
            let content_type = response
                .content_type
                .as_deref()
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            if content_type.contains("json") {
                parse_json(&response.body)?
            } else if content_type.contains("xml") {
                parse_xml(&response.body)?
            } else {
                parse_json(&response.body).or_else(|_| parse_xml(&response.body))?
            }
        }
    };

    Ok(Some(document))
}

/// Judge a response against a check's conditions.
pub fn evaluate_conditions(
    conditions: &[HttpCondition],
    response: &ResponseSnapshot,
) -> Result<HealthStatus, ConditionError> {
    let document = parse_body(conditions, response)?;

    let mut matched = Vec::new();
    for condition in conditions {
        let is_match = match condition {
            HttpCondition::StatusCode { status_codes, .. } => {
                status_codes.contains(&response.status_code)
            }
            HttpCondition::ResponseTime { response_time, .. } => response.elapsed > *response_time,
            HttpCondition::HttpBodyJson { path, value, .. } => match &document {
                Some(Document::Json(document)) => json_matches(document, path, value)?,
                _ => false,
            },
            HttpCondition::HttpBodyXml { path, value, .. } => match &document {
                Some(Document::Xml(package)) => xml_matches(package, path, value)?,
                _ => false,
            },
        };

        if is_match {
            trace!(?condition, "condition matched");
            matched.push(condition.status());
        }
    }

    if let Some(status) = HealthStatus::most_severe(matched) {
        return Ok(status);
    }

    let requires_listed_code = conditions.iter().any(|c| {
        matches!(
            c,
            HttpCondition::StatusCode {
                status: HealthStatus::Online,
                ..
            }
        )
    });

    Ok(if requires_listed_code {
        HealthStatus::Offline
    } else {
        HealthStatus::Online
    })
}

fn compile(pattern: &str) -> Result<Regex, ConditionError> {
    Regex::new(pattern).map_err(|e| ConditionError::InvalidPattern(e.to_string()))
}

fn json_matches(document: &serde_json::Value, path: &str, pattern: &str) -> Result<bool, ConditionError> {
    let path_expr = JsonPath::parse(path).map_err(|e| ConditionError::InvalidPath(e.to_string()))?;
    let regex = compile(pattern)?;

    let nodes = path_expr.query(document).all();
    if nodes.is_empty() {
        return Err(ConditionError::NothingSelected(path.to_string()));
    }

    Ok(nodes.into_iter().all(|node| {
        let text = match node {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        regex.is_match(&text)
    }))
}

fn xml_matches(package: &sxd_document::Package, path: &str, pattern: &str) -> Result<bool, ConditionError> {
    let regex = compile(pattern)?;
    let document = package.as_document();

    let value = sxd_xpath::evaluate_xpath(&document, path)
        .map_err(|e| ConditionError::InvalidPath(format!("{e:?}")))?;

    if let sxd_xpath::Value::Nodeset(nodes) = &value
        && nodes.size() == 0
    {
        return Err(ConditionError::NothingSelected(path.to_string()));
    }

    Ok(regex.is_match(&value.string()))
}

/// One client per (follow redirects, skip certificate validation) pair.
#[derive(Debug, Clone)]
struct ClientSet {
    follow: Client,
    no_follow: Client,
    follow_insecure: Client,
    no_follow_insecure: Client,
}

impl ClientSet {
    fn new(timeout: Duration) -> reqwest::Result<Self> {
        let build = |follow: bool, insecure: bool| {
            let policy = if follow {
                redirect::Policy::limited(MAX_REDIRECTS)
            } else {
                redirect::Policy::none()
            };
            Client::builder()
                .timeout(timeout)
                .redirect(policy)
                .danger_accept_invalid_certs(insecure)
                .build()
        };

        Ok(Self {
            follow: build(true, false)?,
            no_follow: build(false, false)?,
            follow_insecure: build(true, true)?,
            no_follow_insecure: build(false, true)?,
        })
    }

    fn select(&self, definition: &HttpCheckDefinition) -> &Client {
        match (definition.follow_redirects, definition.skip_certificate_validation) {
            (true, false) => &self.follow,
            (false, false) => &self.no_follow,
            (true, true) => &self.follow_insecure,
            (false, true) => &self.no_follow_insecure,
        }
    }
}

/// Outcome of the request itself, before conditions are applied.
enum RequestOutcome {
    Response(ResponseSnapshot),
    Unreachable(String),
    Failed(String),
    Cancelled,
}

/// Evaluates [`HttpCheckDefinition`]s.
#[derive(Debug, Clone)]
pub struct HttpCheckEvaluator {
    clients: ClientSet,
}

impl HttpCheckEvaluator {
    /// Create an evaluator whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            clients: ClientSet::new(timeout)?,
        })
    }

    async fn execute(&self, definition: &HttpCheckDefinition, cancel: &CancellationToken) -> RequestOutcome {
        let mut request = self.clients.select(definition).get(&definition.url);
        if let Some(header) = &definition.authorization_header {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let start = Instant::now();
        let response = tokio::select! {
            _ = cancel.cancelled() => return RequestOutcome::Cancelled,
            response = request.send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_builder() => return RequestOutcome::Failed(e.to_string()),
            Err(e) => return RequestOutcome::Unreachable(e.to_string()),
        };
        let elapsed = start.elapsed();
        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let needs_body = definition.conditions.iter().any(|c| {
            matches!(
                c,
                HttpCondition::HttpBodyJson { .. } | HttpCondition::HttpBodyXml { .. }
            )
        });

        let body = if needs_body {
            let body = tokio::select! {
                _ = cancel.cancelled() => return RequestOutcome::Cancelled,
                body = response.text() => body,
            };
            match body {
                Ok(body) => body,
                Err(e) if e.is_timeout() => return RequestOutcome::Unreachable(e.to_string()),
                Err(e) => return RequestOutcome::Failed(e.to_string()),
            }
        } else {
            String::new()
        };

        RequestOutcome::Response(ResponseSnapshot {
            status_code,
            elapsed,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl HealthCheckEvaluator<HttpCheckDefinition> for HttpCheckEvaluator {
    #[instrument(skip_all, fields(check = %identifier, url = %definition.url))]
    async fn evaluate(
        &self,
        identifier: &CheckIdentifier,
        definition: &HttpCheckDefinition,
        cancel: &CancellationToken,
    ) -> HealthStatus {
        match self.execute(definition, cancel).await {
            RequestOutcome::Response(response) => {
                debug!(
                    status_code = response.status_code,
                    elapsed_ms = response.elapsed.as_millis() as u64,
                    "received response"
                );
                match evaluate_conditions(&definition.conditions, &response) {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("unable to evaluate response: {e}");
                        HealthStatus::Unknown
                    }
                }
            }
            RequestOutcome::Unreachable(e) => {
                warn!("request failed: {e}");
                HealthStatus::Offline
            }
            RequestOutcome::Failed(e) => {
                warn!("unexpected error: {e}");
                HealthStatus::Unknown
            }
            RequestOutcome::Cancelled => {
                debug!("evaluation cancelled");
                HealthStatus::Unknown
            }
        }
    }
}
