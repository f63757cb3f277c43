//! Patricia-trie engine
//!
//! Binary radix tree over filter bits. Each node stores the bit string
//! common to its subtree; a search walks the identifier bits once,
//! collecting the notification URI of every node it fully traverses.
//! Nodes also count traversals, which feeds the locality map.

use crate::bits;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::locality::LocalityMap;
use crate::subscription::{Info, Subscriptions};
use std::sync::atomic::{AtomicU64, Ordering};

pub const NAME: &str = "PatriciaTrie";

pub fn build(set: &Subscriptions) -> Result<Box<dyn Engine>, EngineError> {
    super::validate_snapshot(NAME, set)?;
    let mut engine = PatriciaTrieEngine { root: Node::new(String::new()) };
    for (filter, info) in set.iter() {
        engine.insert(filter, info.clone());
    }
    Ok(Box::new(engine))
}

struct Node {
    /// Bits consumed at this node; empty only at the root.
    prefix: String,
    /// Subscription terminating here, if any. Its offset is the bit
    /// position at which `prefix` begins.
    info: Option<Info>,
    /// Search descents that fully traversed this node.
    visits: AtomicU64,
    zero: Option<Box<Node>>,
    one: Option<Box<Node>>,
}

impl Node {
    fn new(prefix: String) -> Self {
        Self { prefix, info: None, visits: AtomicU64::new(0), zero: None, one: None }
    }

    fn leaf(prefix: String, mut info: Info, offset: u64) -> Self {
        info.offset = offset;
        Self { prefix, info: Some(info), visits: AtomicU64::new(0), zero: None, one: None }
    }

    fn branch(&mut self, bit: char) -> &mut Option<Box<Node>> {
        if bit == '1' { &mut self.one } else { &mut self.zero }
    }

    fn child_count(&self) -> usize {
        usize::from(self.zero.is_some()) + usize::from(self.one.is_some())
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            info: self.info.clone(),
            visits: AtomicU64::new(self.visits.load(Ordering::Relaxed)),
            zero: self.zero.clone(),
            one: self.one.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PatriciaTrieEngine {
    root: Node,
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Tests `prefix` against the identifier bits starting at `pos`.
fn prefix_matches(prefix: &str, id: &[u8], pos: usize) -> bool {
    prefix
        .bytes()
        .enumerate()
        .all(|(index, ch)| bits::bit_at(id, pos + index) == Some(ch == b'1'))
}

impl PatriciaTrieEngine {
    fn insert(&mut self, filter: &str, info: Info) {
        insert_below(&mut self.root, filter, info, 0);
    }

    fn delete(&mut self, filter: &str) {
        let Some(first) = filter.chars().next() else { return };
        delete_below(self.root.branch(first), filter);
    }

    /// Reference counts per trie-node path, for the locality dump.
    pub fn locality_map(&self) -> LocalityMap {
        let mut map = LocalityMap::new();
        collect_locality(&self.root, String::new(), &mut map);
        map
    }
}

fn insert_below(node: &mut Node, key: &str, info: Info, depth: u64) {
    if key.is_empty() {
        // Full filter already consumed by the path; first writer wins
        if node.info.is_none() {
            let mut info = info;
            info.offset = depth.saturating_sub(node.prefix.len() as u64);
            node.info = Some(info);
        }
        return;
    }
    let Some(first) = key.chars().next() else { return };
    let branch = node.branch(first);
    match branch {
        None => {
            *branch = Some(Box::new(Node::leaf(key.to_string(), info, depth)));
        }
        Some(child) => {
            let common = common_prefix_len(&child.prefix, key);
            if common == child.prefix.len() {
                let depth = depth + common as u64;
                insert_below(child, &key[common..], info, depth);
                return;
            }
            // Split the edge at the divergence point
            let Some(mut old) = branch.take() else { return };
            let mut split = Node::new(old.prefix[..common].to_string());
            old.prefix = old.prefix[common..].to_string();
            if let Some(info) = old.info.as_mut() {
                // The surviving node's prefix now begins past the split
                info.offset = depth + common as u64;
            }
            let old_first = old.prefix.chars().next().unwrap_or('0');
            *split.branch(old_first) = Some(old);
            if key.len() == common {
                let mut info = info;
                info.offset = depth;
                split.info = Some(info);
            } else {
                let rest = key[common..].to_string();
                let rest_first = key[common..].chars().next().unwrap_or('0');
                *split.branch(rest_first) =
                    Some(Box::new(Node::leaf(rest, info, depth + common as u64)));
            }
            *branch = Some(Box::new(split));
        }
    }
}

fn delete_below(branch: &mut Option<Box<Node>>, key: &str) {
    let Some(child) = branch else { return };
    if !key.starts_with(child.prefix.as_str()) {
        return;
    }
    let rest = &key[child.prefix.len()..];
    if rest.is_empty() {
        child.info = None;
    } else if let Some(first) = rest.chars().next() {
        delete_below(child.branch(first), rest);
    }
    compact(branch);
}

/// Removes empty leaves and merges pass-through nodes after a delete.
fn compact(branch: &mut Option<Box<Node>>) {
    let Some(node) = branch else { return };
    if node.info.is_some() {
        return;
    }
    match node.child_count() {
        0 => {
            *branch = None;
        }
        1 => {
            let Some(mut only) = node.zero.take().or_else(|| node.one.take()) else {
                return;
            };
            only.prefix = format!("{}{}", node.prefix, only.prefix);
            if let Some(info) = only.info.as_mut() {
                info.offset = info.offset.saturating_sub(node.prefix.len() as u64);
            }
            *branch = Some(only);
        }
        _ => {}
    }
}

fn collect_locality(node: &Node, path: String, map: &mut LocalityMap) {
    map.insert(path.clone(), node.visits.load(Ordering::Relaxed));
    for child in [node.zero.as_deref(), node.one.as_deref()].into_iter().flatten() {
        let child_path = format!("{}-{}", path, child.prefix);
        collect_locality(child, child_path, map);
    }
}

impl Engine for PatriciaTrieEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn search(&self, id: &[u8]) -> Vec<String> {
        let mut matched = Vec::new();
        self.root.visits.fetch_add(1, Ordering::Relaxed);
        let total_bits = id.len() * 8;
        let mut node = &self.root;
        let mut pos = 0usize;
        while pos < total_bits {
            let next = match bits::bit_at(id, pos) {
                Some(true) => node.one.as_deref(),
                Some(false) => node.zero.as_deref(),
                None => None,
            };
            let Some(child) = next else { break };
            if !prefix_matches(&child.prefix, id, pos) {
                break;
            }
            child.visits.fetch_add(1, Ordering::Relaxed);
            if let Some(info) = &child.info {
                info.record_match();
                matched.push(info.notification_uri.clone());
            }
            pos += child.prefix.len();
            node = child;
        }
        matched
    }

    fn add_subscriptions(&mut self, set: Subscriptions) {
        for (filter, info) in set.iter() {
            self.insert(filter, info.clone());
        }
    }

    fn delete_subscriptions(&mut self, set: Subscriptions) {
        for filter in set.keys() {
            self.delete(filter);
        }
    }

    fn boxed_clone(&self) -> Box<dyn Engine> {
        Box::new(self.clone())
    }
}
