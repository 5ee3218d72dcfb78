//! Heapster publisher: reshapes flat container measurements into nested
//! per-container documents with a bounded sample history, and serves them
//! over HTTP.

pub mod codec;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod plugins;
pub mod publisher;
pub mod state;
pub mod template;
pub mod walker;

pub use codec::{decode_batch, encode_batch, Measurement, MetricData, Namespace, CONTENT_TYPE_BINARY};
pub use config::{ConfigMap, ConfigValue, Settings};
pub use error::{PathError, PublishError, SetupError, TemplateError};
pub use http::{ExposureServer, HttpExposure};
pub use models::{Node, Scalar};
pub use pipeline::BatchReport;
pub use publisher::Publisher;
pub use state::EntityStore;
pub use template::{CompiledTemplate, TemplateSource};
