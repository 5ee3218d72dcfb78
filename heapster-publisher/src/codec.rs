//! Measurement batches as handed over by the host.
//!
//! One codec is supported: `snap.bincode`, a bincode-encoded `Vec<Measurement>`.

use crate::error::CodecError;
use crate::models::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

pub const CONTENT_TYPE_BINARY: &str = "snap.bincode";

/// Ordered namespace segments, e.g. `intel/docker/<id>/cpu_stats/cpu_usage/total_usage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parses a slash-delimited namespace string.
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('/').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Second-to-last segment: the interface name in
    /// `/intel/docker/<id>/network/<iface>/<metric>`.
    pub fn interface_name(&self) -> Option<&str> {
        let len = self.0.len();
        if len < 2 {
            return None;
        }
        self.0.get(len - 2).map(String::as_str)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Value carried by a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricData {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl From<&MetricData> for Scalar {
    fn from(data: &MetricData) -> Self {
        match data {
            MetricData::Int(i) => Scalar::Int(*i),
            MetricData::UInt(u) => Scalar::UInt(*u),
            MetricData::Float(f) => Scalar::Float(*f),
            MetricData::Bool(b) => Scalar::Bool(*b),
            MetricData::Text(s) => Scalar::Str(s.clone()),
        }
    }
}

impl From<i64> for MetricData {
    fn from(value: i64) -> Self {
        MetricData::Int(value)
    }
}

impl From<u64> for MetricData {
    fn from(value: u64) -> Self {
        MetricData::UInt(value)
    }
}

impl From<f64> for MetricData {
    fn from(value: f64) -> Self {
        MetricData::Float(value)
    }
}

impl From<&str> for MetricData {
    fn from(value: &str) -> Self {
        MetricData::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub namespace: Namespace,
    pub data: MetricData,
    pub timestamp: OffsetDateTime,
}

pub fn decode_batch(content_type: &str, content: &[u8]) -> Result<Vec<Measurement>, CodecError> {
    match content_type {
        CONTENT_TYPE_BINARY => Ok(bincode::deserialize(content)?),
        other => Err(CodecError::UnsupportedContentType(other.to_string())),
    }
}

pub fn encode_batch(batch: &[Measurement]) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(batch)?)
}
