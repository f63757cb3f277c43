//! sieved - tagsieve filter-and-classify daemon
//!
//! Loads the subscription snapshot, builds one generator per matching
//! engine variant, and serves the control bus until interrupted. Tag
//! sources and the notification dispatcher attach through the library
//! handles.

use clap::Parser;
use sieved::config::Config;
use sieved::snapshot;
use sieved::stats::StatsSink;
use sieved::supervisor::EngineFactory;
use std::process::ExitCode;
use std::time::Duration;
use tagsieve_core::subscription::Subscriptions;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("sieved=info".parse().unwrap()))
        .init();

    // Parse configuration
    let config = Config::parse();
    if let Err(error) = config.validate() {
        error!("Invalid configuration: {}", error);
        return ExitCode::FAILURE;
    }

    info!(
        "sieved v{} - tagsieve filter-and-classify daemon",
        env!("CARGO_PKG_VERSION")
    );

    // Load persisted subscriptions when the snapshot exists
    let subscriptions = if config.subscriptions.exists() {
        match snapshot::load(&config.subscriptions) {
            Ok(subscriptions) => {
                info!(
                    count = subscriptions.len(),
                    path = %config.subscriptions.display(),
                    "loaded subscription snapshot"
                );
                subscriptions
            }
            Err(error) => {
                warn!(%error, "snapshot unreadable, starting empty");
                Subscriptions::new()
            }
        }
    } else {
        Subscriptions::new()
    };

    // Stats sink
    let (stats, sink) = StatsSink::new(
        &config.stats_endpoint,
        &config.stats_database,
        Duration::from_secs(config.stats_interval_secs),
        config.stats_queue,
    );
    tokio::spawn(sink.run());

    // Engine factory
    let factory = EngineFactory::new(config, subscriptions, stats);
    let shutdown = factory.shutdown_trigger();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown.trigger();
    });

    factory.run().await;

    ExitCode::SUCCESS
}
