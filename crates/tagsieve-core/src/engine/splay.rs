//! Splay-tree engine
//!
//! Binary search tree keyed by filter string, splayed on every hit so
//! recently matched filters sit near the root. A search probes each
//! prefix of the identifier bits up to the longest stored filter.
//! Splaying rotates the tree during reads, so the tree itself lives
//! behind a mutex; generators still never touch a published instance.

use crate::bits;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::subscription::{Info, Subscriptions};
use parking_lot::Mutex;
use std::cmp::Ordering;

pub const NAME: &str = "SplayTree";

pub fn build(set: &Subscriptions) -> Result<Box<dyn Engine>, EngineError> {
    super::validate_snapshot(NAME, set)?;
    let mut tree = Tree::default();
    for (filter, info) in set.iter() {
        tree.insert(filter, info.clone());
    }
    Ok(Box::new(SplayTreeEngine { tree: Mutex::new(tree) }))
}

type Link = Option<Box<Node>>;

#[derive(Clone)]
struct Node {
    key: String,
    info: Info,
    left: Link,
    right: Link,
}

impl Node {
    fn new(key: String, info: Info) -> Box<Self> {
        Box::new(Self { key, info, left: None, right: None })
    }
}

#[derive(Clone, Default)]
struct Tree {
    root: Link,
    /// Longest stored key, bounds the probe loop in `search`.
    max_key_len: usize,
}

fn rotate_right(mut node: Box<Node>) -> Box<Node> {
    match node.left.take() {
        Some(mut left) => {
            node.left = left.right.take();
            left.right = Some(node);
            left
        }
        None => node,
    }
}

fn rotate_left(mut node: Box<Node>) -> Box<Node> {
    match node.right.take() {
        Some(mut right) => {
            node.right = right.left.take();
            right.left = Some(node);
            right
        }
        None => node,
    }
}

/// Splays `key` (or the last node on its search path) to the root.
fn splay(link: Link, key: &str) -> Link {
    let mut node = link?;
    match key.cmp(node.key.as_str()) {
        Ordering::Equal => Some(node),
        Ordering::Less => {
            let Some(mut left) = node.left.take() else { return Some(node) };
            match key.cmp(left.key.as_str()) {
                Ordering::Less => {
                    left.left = splay(left.left.take(), key);
                    node.left = Some(left);
                    let node = rotate_right(node);
                    if node.left.is_some() { Some(rotate_right(node)) } else { Some(node) }
                }
                Ordering::Greater => {
                    left.right = splay(left.right.take(), key);
                    if left.right.is_some() {
                        left = rotate_left(left);
                    }
                    node.left = Some(left);
                    Some(rotate_right(node))
                }
                Ordering::Equal => {
                    node.left = Some(left);
                    Some(rotate_right(node))
                }
            }
        }
        Ordering::Greater => {
            let Some(mut right) = node.right.take() else { return Some(node) };
            match key.cmp(right.key.as_str()) {
                Ordering::Greater => {
                    right.right = splay(right.right.take(), key);
                    node.right = Some(right);
                    let node = rotate_left(node);
                    if node.right.is_some() { Some(rotate_left(node)) } else { Some(node) }
                }
                Ordering::Less => {
                    right.left = splay(right.left.take(), key);
                    if right.left.is_some() {
                        right = rotate_right(right);
                    }
                    node.right = Some(right);
                    Some(rotate_left(node))
                }
                Ordering::Equal => {
                    node.right = Some(right);
                    Some(rotate_left(node))
                }
            }
        }
    }
}

impl Tree {
    fn insert(&mut self, key: &str, info: Info) {
        match splay(self.root.take(), key) {
            None => {
                self.root = Some(Node::new(key.to_string(), info));
            }
            Some(mut old_root) => {
                if old_root.key == key {
                    // Existing filters keep their entry
                    self.root = Some(old_root);
                    return;
                }
                let mut node = Node::new(key.to_string(), info);
                if key < old_root.key.as_str() {
                    node.left = old_root.left.take();
                    node.right = Some(old_root);
                } else {
                    node.right = old_root.right.take();
                    node.left = Some(old_root);
                }
                self.root = Some(node);
            }
        }
        self.max_key_len = self.max_key_len.max(key.len());
    }

    fn remove(&mut self, key: &str) {
        self.root = splay(self.root.take(), key);
        let Some(root) = self.root.take() else { return };
        if root.key != key {
            self.root = Some(root);
            return;
        }
        let Node { left, right, .. } = *root;
        match left {
            None => self.root = right,
            Some(left) => {
                // key is greater than every key in the left subtree, so
                // splaying it there surfaces the maximum, which has no
                // right child.
                let mut new_root = splay(Some(left), key);
                if let Some(root) = new_root.as_mut() {
                    root.right = right;
                }
                self.root = new_root;
            }
        }
        if key.len() == self.max_key_len {
            self.max_key_len = max_key_len(&self.root);
        }
    }

    /// Splays `key` to the root and returns whether it is present.
    fn access(&mut self, key: &str) -> bool {
        self.root = splay(self.root.take(), key);
        matches!(&self.root, Some(root) if root.key == key)
    }
}

fn max_key_len(link: &Link) -> usize {
    link.as_ref().map_or(0, |node| {
        node.key
            .len()
            .max(max_key_len(&node.left))
            .max(max_key_len(&node.right))
    })
}

pub struct SplayTreeEngine {
    tree: Mutex<Tree>,
}

impl Engine for SplayTreeEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn search(&self, id: &[u8]) -> Vec<String> {
        let mut tree = self.tree.lock();
        let limit = tree.max_key_len.min(id.len() * 8);
        let mut matched = Vec::new();
        let mut prefix = String::with_capacity(limit);
        for index in 0..limit {
            prefix.push(if bits::bit_at(id, index) == Some(true) { '1' } else { '0' });
            if tree.access(&prefix) {
                if let Some(root) = &tree.root {
                    root.info.record_match();
                    matched.push(root.info.notification_uri.clone());
                }
            }
        }
        matched
    }

    fn add_subscriptions(&mut self, set: Subscriptions) {
        let tree = self.tree.get_mut();
        for (filter, info) in set.iter() {
            tree.insert(filter, info.clone());
        }
    }

    fn delete_subscriptions(&mut self, set: Subscriptions) {
        let tree = self.tree.get_mut();
        for filter in set.keys() {
            tree.remove(filter);
        }
    }

    fn boxed_clone(&self) -> Box<dyn Engine> {
        Box::new(Self { tree: Mutex::new(self.tree.lock().clone()) })
    }
}
