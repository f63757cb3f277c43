//! Filter-keyed subscription set
//!
//! The supervisor owns one authoritative [`Subscriptions`] instance;
//! generators only ever see cloned snapshots passed through their
//! mailboxes, so the type is optimized for cheap deep copies rather
//! than sharing.

use crate::bits;
use crate::error::SubscriptionError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metadata attached to one filter pattern.
#[derive(Debug, Default)]
pub struct Info {
    /// Bit offset at which the pattern begins within the identifier.
    /// Zero at top level; engine-private trie nodes use non-zero offsets.
    pub offset: u64,
    /// Endpoint to notify when a tag matches.
    pub notification_uri: String,
    /// Bumped by engines on every match against this entry.
    pub match_count: AtomicU64,
}

impl Info {
    pub fn new(offset: u64, notification_uri: impl Into<String>) -> Self {
        Self {
            offset,
            notification_uri: notification_uri.into(),
            match_count: AtomicU64::new(0),
        }
    }

    /// Records one match.
    pub fn record_match(&self) {
        self.match_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn matches(&self) -> u64 {
        self.match_count.load(Ordering::Relaxed)
    }
}

impl Clone for Info {
    fn clone(&self) -> Self {
        Self {
            offset: self.offset,
            notification_uri: self.notification_uri.clone(),
            match_count: AtomicU64::new(self.matches()),
        }
    }
}

impl PartialEq for Info {
    /// Identity is the offset and the target; the match counter is
    /// engine-local bookkeeping.
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.notification_uri == other.notification_uri
    }
}

/// Unordered mapping from filter pattern to subscription metadata.
///
/// Keys are unique, non-empty strings over `{'0','1'}`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subscriptions(HashMap<String, Info>);

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A one-entry set, the payload shape of add/delete deltas.
    pub fn single(filter: impl Into<String>, notification_uri: impl Into<String>) -> Self {
        let mut map = HashMap::with_capacity(1);
        map.insert(filter.into(), Info::new(0, notification_uri));
        Self(map)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.0.contains_key(filter)
    }

    pub fn get(&self, filter: &str) -> Option<&Info> {
        self.0.get(filter)
    }

    /// Inserts a new entry, rejecting malformed and duplicate filters.
    pub fn insert(&mut self, filter: impl Into<String>, info: Info) -> Result<(), SubscriptionError> {
        let filter = filter.into();
        if !bits::is_valid_filter(&filter) {
            return Err(SubscriptionError::InvalidFilter(filter));
        }
        if self.0.contains_key(&filter) {
            return Err(SubscriptionError::DuplicateFilter(filter));
        }
        self.0.insert(filter, info);
        Ok(())
    }

    /// Removes an entry, rejecting unknown filters.
    pub fn remove(&mut self, filter: &str) -> Result<Info, SubscriptionError> {
        self.0
            .remove(filter)
            .ok_or_else(|| SubscriptionError::UnknownFilter(filter.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Info)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Longest filter in the set, in bits.
    pub fn max_filter_len(&self) -> usize {
        self.0.keys().map(String::len).max().unwrap_or(0)
    }
}

impl FromIterator<(String, Info)> for Subscriptions {
    fn from_iter<T: IntoIterator<Item = (String, Info)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
