//! Linear-scan engine
//!
//! Sorted vector of entries, bit-level prefix test, no per-search
//! allocation of the identifier bits. O(N·L); the baseline the indexed
//! engines have to beat.

use crate::bits;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::subscription::{Info, Subscriptions};

pub const NAME: &str = "List";

pub fn build(set: &Subscriptions) -> Result<Box<dyn Engine>, EngineError> {
    super::validate_snapshot(NAME, set)?;
    let mut entries: Vec<Entry> = set
        .iter()
        .map(|(filter, info)| Entry { filter: filter.clone(), info: info.clone() })
        .collect();
    entries.sort_by(|a, b| a.filter.cmp(&b.filter));
    Ok(Box::new(ListEngine { entries }))
}

#[derive(Clone)]
struct Entry {
    filter: String,
    info: Info,
}

#[derive(Clone)]
pub struct ListEngine {
    /// Sorted by filter; keeps searches deterministic and lookups binary.
    entries: Vec<Entry>,
}

impl ListEngine {
    fn position(&self, filter: &str) -> Result<usize, usize> {
        self.entries.binary_search_by(|entry| entry.filter.as_str().cmp(filter))
    }
}

impl Engine for ListEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn search(&self, id: &[u8]) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| bits::filter_matches(&entry.filter, id))
            .map(|entry| {
                entry.info.record_match();
                entry.info.notification_uri.clone()
            })
            .collect()
    }

    fn add_subscriptions(&mut self, set: Subscriptions) {
        for (filter, info) in set.iter() {
            if let Err(slot) = self.position(filter) {
                self.entries.insert(
                    slot,
                    Entry { filter: filter.clone(), info: info.clone() },
                );
            }
        }
    }

    fn delete_subscriptions(&mut self, set: Subscriptions) {
        for filter in set.keys() {
            if let Ok(slot) = self.position(filter) {
                self.entries.remove(slot);
            }
        }
    }

    fn boxed_clone(&self) -> Box<dyn Engine> {
        Box::new(self.clone())
    }
}
