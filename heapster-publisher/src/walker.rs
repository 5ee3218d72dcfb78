//! Path addressing and depth-first traversal over [`Node`] trees.
//!
//! Paths are slash-delimited (`/network/interfaces/0/name`); `/` is the root.
//! Map children are addressed by key, list children by decimal index.

use crate::error::PathError;
use crate::models::{Node, Scalar};

/// Visitor verdict for [`walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    /// Do not descend into the node just visited.
    Prune,
}

pub const ROOT: &str = "/";

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn not_found(path: &str) -> PathError {
    PathError::NotFound { path: path.to_string() }
}

pub fn join(parent: &str, child: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Splits `/a/b/c` into (`/a/b`, `c`). The root has an empty leaf.
pub fn parent_and_leaf(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => (ROOT, &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None if trimmed.is_empty() => (ROOT, ""),
        None => (ROOT, trimmed),
    }
}

pub fn seek<'a>(root: &'a Node, path: &str) -> Result<&'a Node, PathError> {
    let mut current = root;
    for segment in segments(path) {
        current = match current {
            Node::Map(map) => map.get(segment),
            Node::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Node::Leaf(_) => None,
        }
        .ok_or_else(|| not_found(path))?;
    }
    Ok(current)
}

pub fn seek_mut<'a>(root: &'a mut Node, path: &str) -> Result<&'a mut Node, PathError> {
    let mut current = root;
    for segment in segments(path) {
        current = match { current } {
            Node::Map(map) => map.get_mut(segment),
            Node::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            Node::Leaf(_) => None,
        }
        .ok_or_else(|| not_found(path))?;
    }
    Ok(current)
}

/// Writes `value` at `path`. The parent must exist; map parents gain the key,
/// list parents only accept an in-bounds index.
pub fn set(root: &mut Node, path: &str, value: Node) -> Result<(), PathError> {
    let (parent_path, leaf) = parent_and_leaf(path);
    if leaf.is_empty() {
        *root = value;
        return Ok(());
    }
    match seek_mut(root, parent_path)? {
        Node::Map(map) => {
            map.insert(leaf.to_string(), value);
            Ok(())
        }
        Node::List(items) => {
            let slot = leaf
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| not_found(path))?;
            *slot = value;
            Ok(())
        }
        Node::Leaf(_) => Err(PathError::NotAContainer { path: parent_path.to_string() }),
    }
}

/// Removes a map entry. List entries are nulled so sibling indices stay valid.
pub fn remove(root: &mut Node, path: &str) -> Result<Option<Node>, PathError> {
    let (parent_path, leaf) = parent_and_leaf(path);
    match seek_mut(root, parent_path)? {
        Node::Map(map) => Ok(map.remove(leaf)),
        Node::List(items) => {
            let slot = leaf
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| not_found(path))?;
            Ok(Some(std::mem::replace(slot, Node::Leaf(Scalar::Null))))
        }
        Node::Leaf(_) => Err(PathError::NotAContainer { path: parent_path.to_string() }),
    }
}

/// Pre-order depth-first traversal starting at the root path `/`.
pub fn walk<F>(root: &Node, visitor: &mut F)
where
    F: FnMut(&str, &Node) -> Walk,
{
    walk_node(ROOT, root, visitor);
}

fn walk_node<F>(path: &str, node: &Node, visitor: &mut F)
where
    F: FnMut(&str, &Node) -> Walk,
{
    if visitor(path, node) == Walk::Prune {
        return;
    }
    match node {
        Node::Map(map) => {
            for (key, child) in map {
                walk_node(&join(path, key), child, visitor);
            }
        }
        Node::List(items) => {
            for (idx, child) in items.iter().enumerate() {
                walk_node(&join(path, &idx.to_string()), child, visitor);
            }
        }
        Node::Leaf(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::parse(r#"{"network": {"interfaces": [{"name": "eth0"}], "rx": 1}, "id": "x"}"#).unwrap()
    }

    #[test]
    fn test_parent_and_leaf() {
        assert_eq!(parent_and_leaf("/a/b/c"), ("/a/b", "c"));
        assert_eq!(parent_and_leaf("/a"), ("/", "a"));
        assert_eq!(parent_and_leaf("/"), ("/", ""));
    }

    #[test]
    fn test_seek_through_maps_and_lists() {
        let doc = sample();
        assert_eq!(seek(&doc, "/network/interfaces/0/name").unwrap().as_str(), Some("eth0"));
        assert_eq!(seek(&doc, "/").unwrap(), &doc);
        assert_eq!(
            seek(&doc, "/network/interfaces/3"),
            Err(PathError::NotFound { path: "/network/interfaces/3".into() })
        );
        assert!(seek(&doc, "/id/deeper").is_err());
    }

    #[test]
    fn test_set_and_remove() {
        let mut doc = sample();
        set(&mut doc, "/network/tx", Node::Leaf(Scalar::Int(5))).unwrap();
        assert_eq!(seek(&doc, "/network/tx").unwrap(), &Node::Leaf(Scalar::Int(5)));

        set(&mut doc, "/network/interfaces/0", Node::string("eth1")).unwrap();
        assert_eq!(seek(&doc, "/network/interfaces/0").unwrap().as_str(), Some("eth1"));
        assert!(set(&mut doc, "/missing/leaf", Node::string("x")).is_err());
        assert_eq!(
            set(&mut doc, "/id/leaf", Node::string("x")),
            Err(PathError::NotAContainer { path: "/id".into() })
        );

        let removed = remove(&mut doc, "/network/rx").unwrap();
        assert_eq!(removed, Some(Node::Leaf(Scalar::Int(1))));
        assert!(seek(&doc, "/network/rx").is_err());
    }

    #[test]
    fn test_walk_preorder_with_prune() {
        let doc = sample();
        let mut visited = Vec::new();
        walk(&doc, &mut |path, _| {
            visited.push(path.to_string());
            if path == "/network/interfaces" {
                Walk::Prune
            } else {
                Walk::Continue
            }
        });
        assert_eq!(
            visited,
            vec!["/", "/id", "/network", "/network/interfaces", "/network/rx"]
        );
    }
}
