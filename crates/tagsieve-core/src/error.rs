//! Error types for the tagsieve core

use thiserror::Error;

/// Engine lifecycle errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// No engine has been installed yet
    #[error("no engine is currently serving")]
    NotReady,

    /// An engine build failed; the owning generator stays unavailable
    #[error("engine build failed for {variant}: {cause}")]
    BuildFailed { variant: &'static str, cause: String },
}

/// Subscription set errors; logged warnings, never fatal
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The filter is already subscribed
    #[error("duplicate filter: {0}")]
    DuplicateFilter(String),

    /// The filter is not in the set
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// The filter is not a non-empty string over {'0','1'}
    #[error("invalid filter: {0:?}")]
    InvalidFilter(String),
}
