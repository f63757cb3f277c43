//! Trie-node reference counts for visualization
//!
//! The patricia engine counts how often each node is traversed; this
//! module turns those counts into a nested tree of percentages relative
//! to total traffic, serialized for the locality viewer. Never on the
//! hot path.

use serde::Serialize;
use std::collections::BTreeMap;

/// Counts per trie-node path. Keys are the node prefixes along the
/// descent joined with `'-'`; the root is the empty key and holds the
/// total search count.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalityMap(BTreeMap<String, u64>);

impl LocalityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, count: u64) {
        self.0.insert(path.into(), count);
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.0.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds the nested percentage tree. The root renders as
    /// "Entry Node" at 100%; every other node carries its share of the
    /// root count.
    pub fn to_tree(&self) -> LocalityNode {
        let total = self.get("").unwrap_or(0);
        let mut head = LocalityNode {
            name: "Entry Node".to_string(),
            value: 100.0,
            children: Vec::new(),
        };
        for (path, count) in &self.0 {
            let segments: Vec<&str> = path.split('-').collect();
            if segments.len() == 1 {
                // Root node
                continue;
            }
            let locality = if total == 0 {
                0.0
            } else {
                100.0 * *count as f32 / total as f32
            };
            head.insert_locality(&segments, locality);
        }
        head
    }

    /// The tree as JSON, wrapped in a single-element array the way the
    /// locality viewer expects it.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&[self.to_tree()])
    }
}

impl FromIterator<(String, u64)> for LocalityMap {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Usage locality for one group of identifiers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LocalityNode {
    pub name: String,
    pub value: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LocalityNode>,
}

impl LocalityNode {
    /// Recursively places `locality` at the end of `path`, creating
    /// intermediate nodes as needed.
    fn insert_locality(&mut self, path: &[&str], locality: f32) {
        if self.name.is_empty() {
            self.name = path[0].to_string();
        }
        let rest = &path[1..];
        if rest.is_empty() {
            self.value = locality;
            return;
        }
        if let Some(child) = self.children.iter_mut().find(|child| child.name == rest[0]) {
            child.insert_locality(rest, locality);
            return;
        }
        let mut child = LocalityNode::default();
        child.insert_locality(rest, locality);
        self.children.push(child);
    }
}
