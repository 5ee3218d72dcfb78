/*!
Test harness for the heapster publisher

Wraps a `Publisher` wired to a `MockExposure`, with:
- option setup before the first batch
- batch publishing from `BatchBuilder`s
- assertions on the served container documents (JSON pointer paths)
*/

use crate::batch_helpers::BatchBuilder;
use crate::exposure_stub::MockExposure;
use anyhow::{Context, Result};
use heapster_publisher::health::CoreStats;
use heapster_publisher::{BatchReport, ConfigMap, ConfigValue, PublishError, Publisher, CONTENT_TYPE_BINARY};
use serde_json::Value;
use std::sync::Arc;

pub struct TestHarness {
    pub publisher: Arc<Publisher>,
    pub exposure: MockExposure,
    config: ConfigMap,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_exposure(MockExposure::new())
    }

    pub fn with_exposure(exposure: MockExposure) -> Self {
        env_logger::try_init().ok();

        Self {
            publisher: Arc::new(Publisher::new(Arc::new(exposure.clone()))),
            exposure,
            config: ConfigMap::new(),
        }
    }

    /// Sets a publisher option. Only effective before the first batch.
    pub fn with_option(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    pub fn config(&self) -> &ConfigMap {
        &self.config
    }

    pub fn publish(&self, batch: &BatchBuilder) -> Result<BatchReport> {
        let bytes = batch.to_bytes()?;
        let report = self.publish_raw(CONTENT_TYPE_BINARY, &bytes)?;
        log::info!("published {} measurements: {:?}", batch.len(), report);
        Ok(report)
    }

    pub fn publish_raw(&self, content_type: &str, content: &[u8]) -> Result<BatchReport, PublishError> {
        self.publisher.publish(content_type, content, &self.config)
    }

    pub fn container_count(&self) -> usize {
        self.publisher.store().container_count()
    }

    /// History length of a container by id (`root` for the host).
    pub fn history_len(&self, id: &str) -> usize {
        self.publisher.store().history_len(&routing_key(id)).unwrap_or(0)
    }

    pub fn document(&self, id: &str) -> Result<Value> {
        let doc = self
            .publisher
            .store()
            .document(&routing_key(id))?
            .with_context(|| format!("container '{id}' is not tracked"))?;
        Ok(doc.to_json())
    }

    /// `pointer` is a JSON pointer into the container document, e.g.
    /// `/stats/0/memory/usage`.
    pub fn assert_field_equals(&self, id: &str, pointer: &str, expected: &Value) -> Result<()> {
        let doc = self.document(id)?;
        match doc.pointer(pointer) {
            Some(actual) if actual == expected => {
                log::info!("field '{}' of '{}' = {}", pointer, id, expected);
                Ok(())
            }
            Some(actual) => anyhow::bail!("field '{}' mismatch: expected {}, got {}", pointer, expected, actual),
            None => anyhow::bail!("field '{}' not found in container '{}'", pointer, id),
        }
    }

    pub fn get_stats(&self) -> CoreStats {
        self.publisher.store().stats()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn routing_key(id: &str) -> String {
    if id == "root" {
        "/".to_string()
    } else {
        format!("/{id}")
    }
}
