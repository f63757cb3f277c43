//! Configuration for sieved

use clap::Parser;
use std::path::PathBuf;

/// sieved - tagsieve filter-and-classify daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "sieved")]
#[command(about = "RFID filter-and-classify daemon with hot-swapped matching engines")]
pub struct Config {
    /// Subscription snapshot file (loaded at startup, written at shutdown)
    #[arg(short, long, default_value = "./data/sieved/subscriptions.json")]
    pub subscriptions: PathBuf,

    /// Control bus queue depth
    #[arg(long, default_value = "256")]
    pub bus_capacity: usize,

    /// Time-series endpoint for stats export
    #[arg(long, default_value = "http://127.0.0.1:8086")]
    pub stats_endpoint: String,

    /// Time-series database name
    #[arg(long, env = "SIEVED_STATS_DB", default_value = "tagsieve")]
    pub stats_database: String,

    /// Stats reporting interval in seconds
    #[arg(long, default_value = "60")]
    pub stats_interval_secs: u64,

    /// Undelivered stats events kept before dropping
    #[arg(long, default_value = "1024")]
    pub stats_queue: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bus_capacity == 0 {
            anyhow::bail!("Bus capacity must be at least 1");
        }
        if self.stats_interval_secs == 0 {
            anyhow::bail!("Stats interval must be at least 1 second");
        }
        if self.log_format != "json" && self.log_format != "pretty" {
            anyhow::bail!("Log format must be 'json' or 'pretty'");
        }
        Ok(())
    }
}
