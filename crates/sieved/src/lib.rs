//! sieved - tagsieve filter-and-classify daemon
//!
//! This daemon provides:
//! - The engine-selection supervisor over the competing matching engines
//! - One background generator per engine variant
//! - The typed control bus for subscription mutations
//! - Stats export to a time-series endpoint
//! - Subscription snapshot persistence

pub mod bus;
pub mod config;
pub mod generator;
pub mod snapshot;
pub mod stats;
pub mod supervisor;

pub use bus::{BusSender, ControlBusError, ManagementMessage};
pub use config::Config;
pub use generator::EngineGenerator;
pub use stats::{StatsEvent, StatsHandle, StatsSink};
pub use supervisor::{ClassifiedTag, EngineFactory, SearchHandle};
