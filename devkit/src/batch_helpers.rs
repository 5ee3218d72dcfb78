/*!
Builders for measurement batches and template fixtures

Namespaces follow the docker collector layout:
`/intel/docker/<id>/<metric path>` and
`/intel/docker/<id>/network/<iface>/<counter>`.
*/

use anyhow::Result;
use heapster_publisher::{encode_batch, Measurement, MetricData, Namespace};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

pub const DOCKER_PREFIX: &str = "/intel/docker";

pub fn docker_namespace(container: &str, path: &str) -> Namespace {
    Namespace::parse(&format!("{DOCKER_PREFIX}/{container}/{}", path.trim_start_matches('/')))
}

pub fn interface_namespace(container: &str, iface: &str, counter: &str) -> Namespace {
    docker_namespace(container, &format!("network/{iface}/{counter}"))
}

/// Accumulates measurements sharing a timestamp (changeable with `at`).
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    timestamp: OffsetDateTime,
    measurements: Vec<Measurement>,
}

impl BatchBuilder {
    pub fn new(timestamp: OffsetDateTime) -> Self {
        Self {
            timestamp,
            measurements: Vec::new(),
        }
    }

    pub fn at(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn advance(self, by: Duration) -> Self {
        let next = self.timestamp + by;
        self.at(next)
    }

    pub fn metric(self, container: &str, path: &str, data: impl Into<MetricData>) -> Self {
        self.raw(docker_namespace(container, path), data)
    }

    pub fn interface(self, container: &str, iface: &str, counter: &str, data: impl Into<MetricData>) -> Self {
        self.raw(interface_namespace(container, iface, counter), data)
    }

    pub fn raw(mut self, namespace: Namespace, data: impl Into<MetricData>) -> Self {
        self.measurements.push(Measurement {
            namespace,
            data: data.into(),
            timestamp: self.timestamp,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn build(&self) -> Vec<Measurement> {
        self.measurements.clone()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(encode_batch(&self.measurements)?)
    }
}

/// Minimal template with one alias pair and compact specs at every level.
pub const ALIAS_TEMPLATE: &str = r#"{
    "id": "",
    "name": "",
    "spec": {"image": "__tmpl:src=/spec/image_name;type=string;default=none"},
    "stats": [{
        "timestamp": "",
        "memory": {
            "usage": {"__tmpl": true, "src": "/memory_stats/usage/usage", "default": 0},
            "working_set": "__tmpl:src=/memory_stats/usage/usage;default=0",
            "limit": "__tmpl:src=/memory_stats/limit;type=uint;default=1024",
            "ratio": "__tmpl:src=/memory_stats/ratio;default=0.5",
            "oom": "__tmpl:src=/memory_stats/oom;default=false"
        },
        "network": {"interfaces": [{"name": "", "rx_bytes": "__tmpl:src=/rx_bytes;default=0"}]}
    }]
}"#;

pub fn write_template(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_namespaces() {
        assert_eq!(
            docker_namespace("abc", "/cpu_stats/cpu_usage/total_usage").to_string(),
            "/intel/docker/abc/cpu_stats/cpu_usage/total_usage"
        );
        assert_eq!(
            interface_namespace("root", "eth0", "rx_bytes").to_string(),
            "/intel/docker/root/network/eth0/rx_bytes"
        );
    }

    #[test]
    fn test_builder_stamps_measurements() {
        let t0 = datetime!(2024-01-01 00:00 UTC);
        let batch = BatchBuilder::new(t0)
            .metric("abc", "memory_stats/cache", 1u64)
            .advance(Duration::seconds(5))
            .interface("abc", "eth0", "rx_bytes", 2u64);
        let built = batch.build();
        assert_eq!(built.len(), 2);
        assert_eq!(built[0].timestamp, t0);
        assert_eq!(built[1].timestamp, t0 + Duration::seconds(5));
        assert!(!batch.to_bytes().unwrap().is_empty());
    }
}
