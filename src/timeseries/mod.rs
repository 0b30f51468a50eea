//! Time-series backend access
//!
//! Both the agent (metric checks) and the hub (status history) talk to a
//! Prometheus-compatible backend. Loki speaks the same query protocol under a
//! different path prefix, so one client covers both.

pub mod client;
pub mod error;
pub mod writer;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

pub use client::{Series, TimeSeriesClient};
pub use error::{TimeSeriesError, TimeSeriesResult};
pub use writer::{HttpImportWriter, MemoryMetricWriter, MetricLine, MetricWriter};

/// Which query protocol flavour a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Prometheus,
    Loki,
}

impl BackendKind {
    pub(crate) fn api_prefix(self) -> &'static str {
        match self {
            BackendKind::Prometheus => "/api/v1",
            BackendKind::Loki => "/loki/api/v1",
        }
    }
}

/// A single value at a point in time.
///
/// On the wire a sample is the Prometheus pair `[unixSeconds, value]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub(crate) fn unix_seconds(&self) -> f64 {
        self.timestamp.timestamp_millis() as f64 / 1000.0
    }

    pub(crate) fn from_unix_seconds(seconds: f64, value: f64) -> Option<Self> {
        let millis = (seconds * 1000.0).round() as i64;
        DateTime::from_timestamp_millis(millis).map(|timestamp| Self { timestamp, value })
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.unix_seconds())?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SampleVisitor;

        impl<'de> Visitor<'de> for SampleVisitor {
            type Value = Sample;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a [unixSeconds, value] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Sample, A::Error> {
                let seconds: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let value: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Sample::from_unix_seconds(seconds, value)
                    .ok_or_else(|| de::Error::custom("sample timestamp out of range"))
            }
        }

        deserializer.deserialize_tuple(2, SampleVisitor)
    }
}

/// Raw samples per check name, as uploaded by agents.
pub type CheckSamples = BTreeMap<String, Vec<Sample>>;
