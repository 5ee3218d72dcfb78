use crate::codec::CONTENT_TYPE_BINARY;
use crate::config::{config_policy, ConfigRule};
use serde::Serialize;

pub const PLUGIN_NAME: &str = "heapster";
pub const PLUGIN_VERSION: u32 = 4;
pub const CONCURRENCY_COUNT: u32 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Collector,
    Processor,
    Publisher,
}

/// What the host needs to know before sending batches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginDescriptor {
    pub name: &'static str,
    pub version: u32,
    pub plugin_type: PluginType,
    pub accepted_content_types: Vec<&'static str>,
    pub returned_content_types: Vec<&'static str>,
    pub concurrency_count: u32,
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor {
        name: PLUGIN_NAME,
        version: PLUGIN_VERSION,
        plugin_type: PluginType::Publisher,
        accepted_content_types: vec![CONTENT_TYPE_BINARY],
        returned_content_types: vec![CONTENT_TYPE_BINARY],
        concurrency_count: CONCURRENCY_COUNT,
    }
}

/// Descriptor plus declared options, as served on `GET /plugin`.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    #[serde(flatten)]
    pub descriptor: PluginDescriptor,
    pub config_policy: Vec<ConfigRule>,
}

pub fn plugin_info() -> PluginInfo {
    PluginInfo {
        descriptor: descriptor(),
        config_policy: config_policy(),
    }
}
