//! Subscription snapshot persistence
//!
//! A flat JSON list of `{filter, notification_uri, offset}` records,
//! loaded at startup when present and written at shutdown. Match
//! counters are runtime state and are not persisted.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tagsieve_core::subscription::{Info, Subscriptions};
use tracing::warn;

/// One persisted subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub filter: String,
    pub notification_uri: String,
    pub offset: u64,
}

/// Loads a snapshot file into a subscription set. Malformed entries
/// are skipped with a warning.
pub fn load(path: &Path) -> anyhow::Result<Subscriptions> {
    let raw = fs::read_to_string(path)?;
    let records: Vec<SubscriptionRecord> = serde_json::from_str(&raw)?;
    let mut subscriptions = Subscriptions::new();
    for record in records {
        if let Err(error) = subscriptions.insert(
            record.filter,
            Info::new(record.offset, record.notification_uri),
        ) {
            warn!(%error, "skipping snapshot entry");
        }
    }
    Ok(subscriptions)
}

/// Writes the set as a snapshot file, creating parent directories as
/// needed. Records are sorted by filter so the file diffs cleanly.
pub fn save(path: &Path, subscriptions: &Subscriptions) -> anyhow::Result<()> {
    let mut records: Vec<SubscriptionRecord> = subscriptions
        .iter()
        .map(|(filter, info)| SubscriptionRecord {
            filter: filter.clone(),
            notification_uri: info.notification_uri.clone(),
            offset: info.offset,
        })
        .collect();
    records.sort_by(|a, b| a.filter.cmp(&b.filter));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&records)?)?;
    Ok(())
}
