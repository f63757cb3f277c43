//! Naive reference engine
//!
//! The first engine this system ever had, kept for benchmarking. Renders
//! the identifier to a bit string on every search and tests each filter
//! with `starts_with`. Everything else is measured against it.

use crate::bits;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::subscription::Subscriptions;

pub const NAME: &str = "Legacy";

pub fn build(set: &Subscriptions) -> Result<Box<dyn Engine>, EngineError> {
    super::validate_snapshot(NAME, set)?;
    Ok(Box::new(LegacyEngine { subscriptions: set.clone() }))
}

#[derive(Clone)]
pub struct LegacyEngine {
    subscriptions: Subscriptions,
}

impl Engine for LegacyEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn search(&self, id: &[u8]) -> Vec<String> {
        let id_bits = bits::bit_string(id);
        let mut matched: Vec<(&String, &str)> = self
            .subscriptions
            .iter()
            .filter(|(filter, _)| id_bits.starts_with(filter.as_str()))
            .map(|(filter, info)| {
                info.record_match();
                (filter, info.notification_uri.as_str())
            })
            .collect();
        // The map iterates in hash order; sort so repeated searches on
        // this instance return the same sequence.
        matched.sort_by(|a, b| a.0.cmp(b.0));
        matched.into_iter().map(|(_, uri)| uri.to_string()).collect()
    }

    fn add_subscriptions(&mut self, set: Subscriptions) {
        for (filter, info) in set.iter() {
            let _ = self.subscriptions.insert(filter.clone(), info.clone());
        }
    }

    fn delete_subscriptions(&mut self, set: Subscriptions) {
        for filter in set.keys() {
            let _ = self.subscriptions.remove(filter);
        }
    }

    fn boxed_clone(&self) -> Box<dyn Engine> {
        Box::new(self.clone())
    }
}
