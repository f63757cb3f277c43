//! The matching-engine capability and its registry
//!
//! Every variant classifies a raw identifier into the set of notification
//! URIs whose filter is a bit-prefix of it. Variants differ only in data
//! structure and cost; for one subscription set they must produce the
//! same match set.

use crate::error::EngineError;
use crate::subscription::Subscriptions;
use std::collections::HashMap;

pub mod legacy;
pub mod list;
pub mod patricia;
pub mod splay;

pub use legacy::LegacyEngine;
pub use list::ListEngine;
pub use patricia::PatriciaTrieEngine;
pub use splay::SplayTreeEngine;

/// A built classification structure over one subscription snapshot.
///
/// `search` order is unspecified but deterministic per instance. The
/// mutators are not concurrency-safe; the owning generator guarantees
/// exclusive use during `generating`/`rebuilding`, and a published
/// instance is only ever searched.
pub trait Engine: Send + Sync {
    /// Variant name, stable across the process lifetime.
    fn name(&self) -> &'static str;

    /// Notification URIs of every subscription whose filter is a
    /// bit-prefix of the identifier.
    fn search(&self, id: &[u8]) -> Vec<String>;

    /// Merges the entries into the structure. Existing filters keep
    /// their current entry.
    fn add_subscriptions(&mut self, set: Subscriptions);

    /// Removes the entries from the structure. Absent filters are
    /// ignored.
    fn delete_subscriptions(&mut self, set: Subscriptions);

    /// Deep copy for delta rebuilds; published instances stay read-only.
    fn boxed_clone(&self) -> Box<dyn Engine>;
}

impl Clone for Box<dyn Engine> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Constructor signature shared by every variant.
pub type EngineConstructor = fn(&Subscriptions) -> Result<Box<dyn Engine>, EngineError>;

/// One registry entry: `{name -> constructor}`.
pub struct EngineVariant {
    pub name: &'static str,
    pub build: EngineConstructor,
}

/// Process-wide read-only registry. Order defines deployment priority:
/// the index is the priority and higher wins, so the patricia trie
/// replaces everything else once it is ready.
pub fn available_engines() -> &'static [EngineVariant] {
    &ENGINE_VARIANTS
}

static ENGINE_VARIANTS: [EngineVariant; 4] = [
    EngineVariant { name: legacy::NAME, build: legacy::build },
    EngineVariant { name: list::NAME, build: list::build },
    EngineVariant { name: splay::NAME, build: splay::build },
    EngineVariant { name: patricia::NAME, build: patricia::build },
];

/// Deployment priority per variant name, derived from registry order.
pub fn deployment_priorities() -> HashMap<&'static str, u8> {
    ENGINE_VARIANTS
        .iter()
        .enumerate()
        .map(|(index, variant)| (variant.name, index as u8))
        .collect()
}

/// Registry index of a variant name, used as its code in stats points.
pub fn variant_index(name: &str) -> Option<u8> {
    ENGINE_VARIANTS
        .iter()
        .position(|variant| variant.name == name)
        .map(|index| index as u8)
}

/// Rejects snapshots containing malformed filters before a build runs.
pub(crate) fn validate_snapshot(
    variant: &'static str,
    set: &Subscriptions,
) -> Result<(), EngineError> {
    for filter in set.keys() {
        if !crate::bits::is_valid_filter(filter) {
            return Err(EngineError::BuildFailed {
                variant,
                cause: format!("malformed filter {filter:?}"),
            });
        }
    }
    Ok(())
}
