//! Value specs embedded in a metric template and the per-region mapping tables
//! built from them.
//!
//! Two encodings are recognized:
//! - full spec: `{"__tmpl": true, "src": "/memory_stats/usage/usage", "default": 0, "type": "int"}`
//! - compact spec: `"__tmpl:src=/rx_bytes;default=0;type=int"`

use crate::error::TemplateError;
use crate::models::{DocumentMap, Node, Scalar};
use std::collections::HashMap;

pub const TMPL_MARKER: &str = "__tmpl";
const COMPACT_PREFIX: &str = "__tmpl:";
const ALIAS_KEY_PREFIX: &str = "alias#";

/// Mapping rule linking a source suffix to a target path inside one region.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSpec {
    pub source_suffix: String,
    pub target_path: String,
    pub default_value: Option<Scalar>,
    /// Keys of sibling specs sharing this spec's source suffix.
    pub aliases: Vec<String>,
}

impl TemplateSpec {
    /// Parses `node` as a value spec found at `path`; `Ok(None)` for ordinary
    /// schema nodes.
    pub fn from_node(path: &str, node: &Node) -> Result<Option<Self>, TemplateError> {
        match node {
            Node::Map(map) if map.contains_key(TMPL_MARKER) => Self::from_full(path, map).map(Some),
            Node::Leaf(Scalar::Str(text)) => match text.strip_prefix(COMPACT_PREFIX) {
                Some(packed) => Self::from_compact(path, packed).map(Some),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn from_full(path: &str, map: &DocumentMap) -> Result<Self, TemplateError> {
        let source_suffix = map
            .get("src")
            .and_then(Node::as_str)
            .ok_or_else(|| invalid(path, "missing string field 'src'"))?;
        let kind = match map.get("type") {
            Some(node) => Some(node.as_str().ok_or_else(|| invalid(path, "'type' must be a string"))?),
            None => None,
        };
        let default_value = match (map.get("default"), kind) {
            (None, _) => None,
            (Some(Node::Leaf(Scalar::Str(raw))), Some(kind)) => Some(parse_typed(path, raw, kind)?),
            (Some(Node::Leaf(scalar)), _) => Some(scalar.clone()),
            (Some(_), _) => return Err(invalid(path, "'default' must be a scalar")),
        };
        Self::new(path, source_suffix, default_value)
    }

    fn from_compact(path: &str, packed: &str) -> Result<Self, TemplateError> {
        let mut src = None;
        let mut raw_default = None;
        let mut kind = None;
        for field in packed.split(';').map(str::trim).filter(|f| !f.is_empty()) {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| invalid(path, &format!("expected key=value, got '{field}'")))?;
            match key.trim() {
                "src" => src = Some(value.trim()),
                "default" => raw_default = Some(value.trim()),
                "type" => kind = Some(value.trim()),
                _ => {}
            }
        }
        let source_suffix = src.ok_or_else(|| invalid(path, "missing field 'src'"))?;
        let default_value = match (raw_default, kind) {
            (Some(raw), Some(kind)) => Some(parse_typed(path, raw, kind)?),
            (Some(raw), None) => Some(Scalar::infer(raw)),
            (None, _) => None,
        };
        Self::new(path, source_suffix, default_value)
    }

    fn new(path: &str, source_suffix: &str, default_value: Option<Scalar>) -> Result<Self, TemplateError> {
        if source_suffix.is_empty() {
            return Err(invalid(path, "'src' must not be empty"));
        }
        Ok(Self {
            source_suffix: source_suffix.to_string(),
            target_path: path.to_string(),
            default_value,
            aliases: Vec::new(),
        })
    }
}

fn invalid(path: &str, reason: &str) -> TemplateError {
    TemplateError::InvalidSpec {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_typed(path: &str, raw: &str, kind: &str) -> Result<Scalar, TemplateError> {
    let bad = || invalid(path, &format!("default '{raw}' is not a valid {kind}"));
    match kind {
        "int" => raw.parse::<i64>().map(Scalar::Int).map_err(|_| bad()),
        "uint" => raw.parse::<u64>().map(Scalar::UInt).map_err(|_| bad()),
        "float" => raw.parse::<f64>().map(Scalar::Float).map_err(|_| bad()),
        "bool" => raw.parse::<bool>().map(Scalar::Bool).map_err(|_| bad()),
        "string" => Ok(Scalar::Str(raw.to_string())),
        other => Err(invalid(path, &format!("unknown type '{other}'"))),
    }
}

/// Source suffix (or generated alias key) → spec, for one nesting level.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    specs: HashMap<String, TemplateSpec>,
    alias_seq: u64,
}

impl MappingTable {
    /// Registers a spec. A second spec for an already-known suffix is stored
    /// under a fresh alias key recorded on the first one.
    pub fn register(&mut self, spec: TemplateSpec) {
        if !self.specs.contains_key(&spec.source_suffix) {
            self.specs.insert(spec.source_suffix.clone(), spec);
            return;
        }
        self.alias_seq += 1;
        let alias_key = format!("{ALIAS_KEY_PREFIX}{}", self.alias_seq);
        if let Some(root) = self.specs.get_mut(&spec.source_suffix) {
            root.aliases.push(alias_key.clone());
        }
        self.specs.insert(alias_key, spec);
    }

    pub fn get(&self, key: &str) -> Option<&TemplateSpec> {
        self.specs.get(key)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> impl Iterator<Item = &TemplateSpec> {
        self.specs.values()
    }

    /// Finds a registered suffix the namespace ends with and returns its spec
    /// followed by its aliases. When several suffixes match, which one wins
    /// depends on hash order.
    pub fn resolve(&self, namespace: &str) -> Option<Vec<&TemplateSpec>> {
        let root = self
            .specs
            .iter()
            .find(|(key, spec)| **key == spec.source_suffix && namespace.ends_with(key.as_str()))
            .map(|(_, spec)| spec)?;
        let mut targets = Vec::with_capacity(1 + root.aliases.len());
        targets.push(root);
        targets.extend(root.aliases.iter().filter_map(|key| self.specs.get(key)));
        Some(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_spec() {
        let node = Node::parse(r#"{"__tmpl": true, "src": "/cpu/total", "default": 7}"#).unwrap();
        let spec = TemplateSpec::from_node("/cpu/usage", &node).unwrap().unwrap();
        assert_eq!(spec.source_suffix, "/cpu/total");
        assert_eq!(spec.target_path, "/cpu/usage");
        assert_eq!(spec.default_value, Some(Scalar::Int(7)));

        let typed = Node::parse(r#"{"__tmpl": "", "src": "/x", "default": "1.5", "type": "float"}"#).unwrap();
        let spec = TemplateSpec::from_node("/x", &typed).unwrap().unwrap();
        assert_eq!(spec.default_value, Some(Scalar::Float(1.5)));
    }

    #[test]
    fn test_compact_spec() {
        let node = Node::string("__tmpl:src=/rx_bytes;default=0");
        let spec = TemplateSpec::from_node("/rx_bytes", &node).unwrap().unwrap();
        assert_eq!(spec.default_value, Some(Scalar::Int(0)));

        let no_default = Node::string("__tmpl:src=/spec/labels");
        let spec = TemplateSpec::from_node("/labels", &no_default).unwrap().unwrap();
        assert_eq!(spec.default_value, None);

        let typed = Node::string("__tmpl: src=/a ; type=string ; default=42");
        let spec = TemplateSpec::from_node("/a", &typed).unwrap().unwrap();
        assert_eq!(spec.default_value, Some(Scalar::Str("42".into())));
    }

    #[test]
    fn test_ordinary_nodes_are_not_specs() {
        assert!(TemplateSpec::from_node("/", &Node::string("plain")).unwrap().is_none());
        let map = Node::parse(r#"{"src": "/x"}"#).unwrap();
        assert!(TemplateSpec::from_node("/", &map).unwrap().is_none());
    }

    #[test]
    fn test_invalid_specs() {
        let missing_src = Node::parse(r#"{"__tmpl": true, "default": 1}"#).unwrap();
        assert!(matches!(
            TemplateSpec::from_node("/a", &missing_src),
            Err(TemplateError::InvalidSpec { .. })
        ));
        let bad_default = Node::string("__tmpl:src=/a;type=int;default=abc");
        assert!(TemplateSpec::from_node("/a", &bad_default).is_err());
        assert!(TemplateSpec::from_node("/a", &Node::string("__tmpl:default=1")).is_err());
    }

    #[test]
    fn test_aliases_are_deterministic() {
        let mut table = MappingTable::default();
        for target in ["/memory/usage", "/memory/working_set", "/memory/total"] {
            let node = Node::string("__tmpl:src=/memory_stats/usage/usage");
            table.register(TemplateSpec::from_node(target, &node).unwrap().unwrap());
        }
        assert_eq!(table.len(), 3);
        let root = table.get("/memory_stats/usage/usage").unwrap();
        assert_eq!(root.aliases, vec!["alias#1", "alias#2"]);
        assert_eq!(table.get("alias#2").unwrap().target_path, "/memory/total");

        let targets = table.resolve("/intel/docker/abc/memory_stats/usage/usage").unwrap();
        let paths: Vec<_> = targets.iter().map(|s| s.target_path.as_str()).collect();
        assert_eq!(paths, vec!["/memory/usage", "/memory/working_set", "/memory/total"]);
        assert!(table.resolve("/intel/docker/abc/memory_stats/usage/max_usage").is_none());
    }
}
