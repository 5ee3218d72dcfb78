//! Publisher options handed over by the host, plus the YAML file read by the
//! standalone binary.

use crate::error::ConfigParseError;
use crate::template::{TemplateSource, BUILTIN_TEMPLATE_NAME};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use time::Duration;
use tokio::fs;
use tracing::{debug, warn};

pub const CFG_SERVER_PORT: &str = "server_port";
pub const CFG_STATS_DEPTH: &str = "stats_depth";
pub const CFG_STATS_SPAN: &str = "stats_span";
pub const CFG_EXPORT_TMPL_FILE: &str = "export_tmpl_file";
pub const CFG_TIMESTAMP_DELTA: &str = "timestamp_delta";
pub const CFG_METRIC_PREFIX: &str = "metric_prefix";

pub const DEF_SERVER_PORT: i64 = 8777;
pub const DEF_STATS_DEPTH: i64 = 10;
pub const DEF_STATS_SPAN: &str = "10m";
pub const DEF_TIMESTAMP_DELTA: &str = "0";
pub const DEF_METRIC_PREFIX: &str = "/intel/docker";

/// One option value as the host passes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

pub type ConfigMap = HashMap<String, ConfigValue>;

/// Typed lookups with fallback; a value of the wrong kind is reported and ignored.
pub trait ConfigLookup {
    fn get_int(&self, key: &str, default: i64) -> i64;
    fn get_str(&self, key: &str, default: &str) -> String;
}

impl ConfigLookup for ConfigMap {
    fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            None => default,
            Some(ConfigValue::Int(value)) => *value,
            Some(other) => {
                warn!(key, value = ?other, default, "option is not an integer, using default");
                default
            }
        }
    }

    fn get_str(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            None => default.to_string(),
            Some(ConfigValue::Str(value)) => value.clone(),
            Some(other) => {
                warn!(key, value = ?other, default, "option is not a string, using default");
                default.to_string()
            }
        }
    }
}

/// Resolved publisher settings. A zero depth or a non-positive span disables
/// that eviction rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_port: u16,
    pub stats_depth: usize,
    pub stats_span: Duration,
    pub template_source: TemplateSource,
    pub timestamp_delta: Duration,
    pub metric_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve(&ConfigMap::new())
    }
}

impl Settings {
    pub fn resolve(config: &ConfigMap) -> Self {
        let port = config.get_int(CFG_SERVER_PORT, DEF_SERVER_PORT);
        let server_port = u16::try_from(port).unwrap_or_else(|_| {
            warn!(port, "server_port out of range, using default");
            DEF_SERVER_PORT as u16
        });
        let stats_depth = usize::try_from(config.get_int(CFG_STATS_DEPTH, DEF_STATS_DEPTH)).unwrap_or(0);
        let stats_span = duration_option(config, CFG_STATS_SPAN, DEF_STATS_SPAN);
        let timestamp_delta = duration_option(config, CFG_TIMESTAMP_DELTA, DEF_TIMESTAMP_DELTA);
        let template_source =
            TemplateSource::from_option(&config.get_str(CFG_EXPORT_TMPL_FILE, BUILTIN_TEMPLATE_NAME));

        Self {
            server_port,
            stats_depth,
            stats_span,
            template_source,
            timestamp_delta,
            metric_prefix: config.get_str(CFG_METRIC_PREFIX, DEF_METRIC_PREFIX),
        }
    }
}

fn duration_option(config: &ConfigMap, key: &str, default: &str) -> Duration {
    let raw = config.get_str(key, default);
    parse_duration(&raw).unwrap_or_else(|e| {
        debug!(key, error = %e, "falling back to default duration");
        parse_duration(default).unwrap_or(Duration::ZERO)
    })
}

/// Parses `10m`, `1h 30m`, `0` or a negated form such as `-5s`.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigParseError> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };
    if body == "0" {
        return Ok(Duration::ZERO);
    }
    let fail = |reason: String| ConfigParseError {
        value: raw.to_string(),
        reason,
    };
    let parsed = humantime::parse_duration(body).map_err(|e| fail(e.to_string()))?;
    let duration = Duration::try_from(parsed).map_err(|e| fail(e.to_string()))?;
    Ok(if negative { -duration } else { duration })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Integer,
    String,
}

/// Declared option, as listed to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigRule {
    pub key: &'static str,
    pub kind: RuleKind,
    pub required: bool,
    pub default: ConfigValue,
}

pub fn config_policy() -> Vec<ConfigRule> {
    let rule = |key, kind, default: ConfigValue| ConfigRule {
        key,
        kind,
        required: false,
        default,
    };
    vec![
        rule(CFG_SERVER_PORT, RuleKind::Integer, DEF_SERVER_PORT.into()),
        rule(CFG_STATS_DEPTH, RuleKind::Integer, DEF_STATS_DEPTH.into()),
        rule(CFG_STATS_SPAN, RuleKind::String, DEF_STATS_SPAN.into()),
        rule(CFG_EXPORT_TMPL_FILE, RuleKind::String, BUILTIN_TEMPLATE_NAME.into()),
        rule(CFG_TIMESTAMP_DELTA, RuleKind::String, DEF_TIMESTAMP_DELTA.into()),
        rule(CFG_METRIC_PREFIX, RuleKind::String, DEF_METRIC_PREFIX.into()),
    ]
}

/// `publisher.yaml` for the standalone binary.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HostConfig {
    pub ingest_port: u16,
    /// Run setup before the first batch arrives.
    pub eager_start: bool,
    pub options: ConfigMap,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            ingest_port: 8778,
            eager_start: false,
            options: ConfigMap::new(),
        }
    }
}

pub async fn load_config() -> HostConfig {
    let path = std::env::var("HEAPSTER_PUBLISHER_CONFIG").unwrap_or_else(|_| "publisher.yaml".into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: &str) -> HostConfig {
    if !Path::new(path).exists() {
        warn!(path, "no host config file, using defaults");
        return HostConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return HostConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!(path, error = %e, "invalid host config, using defaults");
        HostConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10m").unwrap(), Duration::minutes(10));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("-5s").unwrap(), Duration::seconds(-5));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server_port, 8777);
        assert_eq!(settings.stats_depth, 10);
        assert_eq!(settings.stats_span, Duration::minutes(10));
        assert_eq!(settings.template_source, TemplateSource::Builtin);
        assert_eq!(settings.timestamp_delta, Duration::ZERO);
        assert_eq!(settings.metric_prefix, "/intel/docker");
    }

    #[test]
    fn test_resolve_with_fallbacks() {
        let mut config = ConfigMap::new();
        config.insert(CFG_SERVER_PORT.into(), ConfigValue::Str("9000".into()));
        config.insert(CFG_STATS_DEPTH.into(), ConfigValue::Int(0));
        config.insert(CFG_STATS_SPAN.into(), ConfigValue::Str("not a duration".into()));
        config.insert(CFG_TIMESTAMP_DELTA.into(), ConfigValue::Str("-1h".into()));
        config.insert(CFG_EXPORT_TMPL_FILE.into(), ConfigValue::Str("/etc/tmpl.json".into()));

        let settings = Settings::resolve(&config);
        assert_eq!(settings.server_port, 8777);
        assert_eq!(settings.stats_depth, 0);
        assert_eq!(settings.stats_span, Duration::minutes(10));
        assert_eq!(settings.timestamp_delta, Duration::hours(-1));
        assert_eq!(
            settings.template_source,
            TemplateSource::File(PathBuf::from("/etc/tmpl.json"))
        );
    }

    #[test]
    fn test_config_policy_lists_every_option() {
        let policy = config_policy();
        let keys: Vec<_> = policy.iter().map(|r| r.key).collect();
        assert_eq!(
            keys,
            vec![
                "server_port",
                "stats_depth",
                "stats_span",
                "export_tmpl_file",
                "timestamp_delta",
                "metric_prefix"
            ]
        );
        assert!(policy.iter().all(|r| !r.required));
        assert_eq!(policy[0].default, ConfigValue::Int(8777));
    }

    #[tokio::test]
    async fn test_load_host_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publisher.yaml");
        std::fs::write(
            &path,
            "ingest_port: 9100\noptions:\n  stats_depth: 3\n  stats_span: 1h\n",
        )
        .unwrap();

        let cfg = load_config_from(path.to_str().unwrap()).await;
        assert_eq!(cfg.ingest_port, 9100);
        assert!(!cfg.eager_start);
        assert_eq!(cfg.options.get("stats_depth"), Some(&ConfigValue::Int(3)));
        assert_eq!(cfg.options.get("stats_span"), Some(&ConfigValue::Str("1h".into())));

        let missing = load_config_from(dir.path().join("nope.yaml").to_str().unwrap()).await;
        assert_eq!(missing.ingest_port, 8778);
    }
}
