use serde::Serialize;
use std::collections::BTreeMap;

/// Scalar carried by a document leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

/// Weakly-shaped document tree: the compiled template and every
/// container/sample/interface instance are built from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Map(BTreeMap<String, Node>),
    List(Vec<Node>),
    Leaf(Scalar),
}

pub type DocumentMap = BTreeMap<String, Node>;

impl Node {
    pub fn empty_map() -> Self {
        Node::Map(BTreeMap::new())
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Ok(Node::from(value))
    }

    pub fn string<S: Into<String>>(value: S) -> Self {
        Node::Leaf(Scalar::Str(value.into()))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Node::Map(_))
    }

    pub fn as_map(&self) -> Option<&DocumentMap> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut DocumentMap> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Leaf(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Leaf(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Shorthand for map field lookup, used heavily by tests and HTTP views.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map().and_then(|map| map.get(key))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Node::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Node::List(items) => serde_json::Value::Array(items.iter().map(Node::to_json).collect()),
            Node::Leaf(scalar) => scalar.to_json(),
        }
    }
}

impl Scalar {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Int(i) => serde_json::Value::from(*i),
            Scalar::UInt(u) => serde_json::Value::from(*u),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Scalar::Str(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Reads a default written as text: `null`, bool, integer, float, else string.
    pub fn infer(raw: &str) -> Self {
        if raw == "null" {
            Scalar::Null
        } else if let Ok(b) = raw.parse::<bool>() {
            Scalar::Bool(b)
        } else if let Ok(i) = raw.parse::<i64>() {
            Scalar::Int(i)
        } else if let Ok(u) = raw.parse::<u64>() {
            Scalar::UInt(u)
        } else if let Ok(f) = raw.parse::<f64>() {
            Scalar::Float(f)
        } else {
            Scalar::Str(raw.to_string())
        }
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Object(map) => Node::Map(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect()),
            Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Null => Node::Leaf(Scalar::Null),
            Value::Bool(b) => Node::Leaf(Scalar::Bool(b)),
            Value::Number(n) => {
                let scalar = if let Some(i) = n.as_i64() {
                    Scalar::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Scalar::UInt(u)
                } else {
                    Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
                };
                Node::Leaf(scalar)
            }
            Value::String(s) => Node::Leaf(Scalar::Str(s)),
        }
    }
}

impl From<Scalar> for Node {
    fn from(scalar: Scalar) -> Self {
        Node::Leaf(scalar)
    }
}
