//! The publisher entry point: one-time setup, then batch ingestion.
//!
//! Setup runs on the first `publish` (or an explicit `start`): options are
//! resolved, the template compiled and the exposure server started. Callers
//! racing on the first batch wait for the winner and share its outcome; a
//! failed setup leaves the publisher unstarted.

use crate::codec::decode_batch;
use crate::config::{ConfigMap, Settings};
use crate::error::{PublishError, SetupError};
use crate::health::HealthTracker;
use crate::http::{ExposureServer, HttpExposure};
use crate::pipeline::BatchReport;
use crate::state::EntityStore;
use crate::template::{CompiledTemplate, TemplateSource};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

struct Runtime {
    settings: Settings,
    template: RwLock<Arc<CompiledTemplate>>,
}

pub struct Publisher {
    store: Arc<EntityStore>,
    health: HealthTracker,
    exposure: Arc<dyn ExposureServer>,
    runtime: OnceCell<Runtime>,
}

impl Publisher {
    pub fn new(exposure: Arc<dyn ExposureServer>) -> Self {
        Self {
            store: Arc::new(EntityStore::new()),
            health: HealthTracker::new(),
            exposure,
            runtime: OnceCell::new(),
        }
    }

    pub fn with_http_exposure() -> Self {
        Self::new(Arc::new(HttpExposure::new()))
    }

    /// Runs setup now instead of on the first batch. A no-op once started.
    pub fn start(&self, config: &ConfigMap) -> Result<&Settings, SetupError> {
        self.ensure_initialized(config).map(|rt| &rt.settings)
    }

    fn ensure_initialized(&self, config: &ConfigMap) -> Result<&Runtime, SetupError> {
        self.runtime.get_or_try_init(|| self.initialize(config))
    }

    fn initialize(&self, config: &ConfigMap) -> Result<Runtime, SetupError> {
        let settings = Settings::resolve(config);
        let template = settings.template_source.compile()?;
        self.exposure
            .ensure_started(self.store.clone(), self.health.clone(), settings.server_port)?;
        info!(
            port = settings.server_port,
            depth = settings.stats_depth,
            span = %settings.stats_span,
            "publisher initialized"
        );
        Ok(Runtime {
            settings,
            template: RwLock::new(Arc::new(template)),
        })
    }

    /// Decodes one batch and folds it into the store. `config` is only read
    /// by the first call.
    pub fn publish(&self, content_type: &str, content: &[u8], config: &ConfigMap) -> Result<BatchReport, PublishError> {
        let runtime = self.ensure_initialized(config)?;
        let batch = decode_batch(content_type, content).map_err(|e| {
            warn!(error = %e, content_type, "dropping batch");
            PublishError::from(e)
        })?;
        let template = runtime.template.read().clone();
        self.store.ingest(&batch, &template, &runtime.settings)
    }

    /// Recompiles and swaps all three template regions at once. Batches
    /// already running keep the template they started with.
    pub fn reload_template(&self, source: &TemplateSource) -> Result<(), SetupError> {
        let runtime = self.runtime.get().ok_or(SetupError::NotStarted)?;
        let compiled = source.compile()?;
        *runtime.template.write() = Arc::new(compiled);
        info!(?source, "metric template reloaded");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.runtime.get().is_some()
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.runtime.get().map(|rt| &rt.settings)
    }

    pub fn template(&self) -> Option<Arc<CompiledTemplate>> {
        self.runtime.get().map(|rt| rt.template.read().clone())
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }
}
