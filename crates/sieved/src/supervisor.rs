//! Engine factory
//!
//! The control plane. Owns the authoritative subscription set, fans
//! mutations out to every generator, and arbitrates which engine
//! serves queries: when a generator announces readiness, its engine
//! replaces the current one only if its deployment priority is higher.
//! The search path reads the current engine through a shared slot and
//! never waits on a rebuild.

use crate::bus::{self, BusReceiver, BusSender, GeneratorId, ManagementMessage};
use crate::config::Config;
use crate::generator::{DeltaOp, EngineGenerator, GeneratorCommand, GeneratorHandle};
use crate::snapshot;
use crate::stats::{StatsEvent, StatsHandle};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagsieve_core::engine::{available_engines, Engine};
use tagsieve_core::error::EngineError;
use tagsieve_core::subscription::{Info, Subscriptions};
use tagsieve_tdt::DecodeError;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// The installed engine and the priority it won with.
struct CurrentEngine {
    engine: Arc<dyn Engine>,
    priority: u8,
}

/// A decoded tag and where to send it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedTag {
    pub urn: String,
    pub destinations: Vec<String>,
}

/// Cheap clone handed to every caller thread on the query path.
#[derive(Clone)]
pub struct SearchHandle {
    current: Arc<RwLock<Option<CurrentEngine>>>,
    ingress: Arc<AtomicU64>,
    matched: Arc<AtomicU64>,
}

impl SearchHandle {
    /// Whether any engine is installed yet.
    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    /// Name of the serving engine, if any.
    pub fn engine_name(&self) -> Option<&'static str> {
        self.current.read().as_ref().map(|current| current.engine.name())
    }

    /// The serving engine itself.
    pub fn current_engine(&self) -> Result<Arc<dyn Engine>, EngineError> {
        self.current
            .read()
            .as_ref()
            .map(|current| current.engine.clone())
            .ok_or(EngineError::NotReady)
    }

    /// Matches the identifier against the serving engine. Takes the
    /// read lock only long enough to clone the engine reference, so a
    /// concurrent swap never stalls callers; with no engine installed
    /// the result is empty.
    pub fn search(&self, id: &[u8]) -> Vec<String> {
        self.ingress.fetch_add(1, Ordering::Relaxed);
        let engine = {
            let guard = self.current.read();
            match guard.as_ref() {
                Some(current) => current.engine.clone(),
                None => return Vec::new(),
            }
        };
        let matches = engine.search(id);
        if !matches.is_empty() {
            self.matched.fetch_add(1, Ordering::Relaxed);
        }
        matches
    }

    /// Decodes the tag to its URN and matches it in one step. Decode
    /// errors surface to the caller.
    pub fn classify(&self, pc: &[u8], id: &[u8]) -> Result<ClassifiedTag, DecodeError> {
        let urn = tagsieve_tdt::translate(pc, id)?;
        let destinations = self.search(id);
        debug!(id = %hex::encode(id), %urn, matches = destinations.len(), "classified tag");
        Ok(ClassifiedTag { urn, destinations })
    }
}

/// Closes down the factory and its generators.
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: broadcast::Sender<()>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

/// The engine-selection supervisor.
pub struct EngineFactory {
    config: Config,
    subscriptions: Subscriptions,
    production_lines: Vec<GeneratorHandle>,
    generators: Vec<EngineGenerator>,
    current: Arc<RwLock<Option<CurrentEngine>>>,
    ingress: Arc<AtomicU64>,
    matched: Arc<AtomicU64>,
    bus_tx: BusSender,
    bus_rx: BusReceiver,
    stats: StatsHandle,
    shutdown_tx: broadcast::Sender<()>,
}

impl EngineFactory {
    /// Wires one generator per registry entry; priority is the registry
    /// index, so later entries win.
    pub fn new(config: Config, subscriptions: Subscriptions, stats: StatsHandle) -> Self {
        let (bus_tx, bus_rx) = bus::channel(config.bus_capacity);
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut production_lines = Vec::new();
        let mut generators = Vec::new();
        for (index, variant) in available_engines().iter().enumerate() {
            let (generator, handle) = EngineGenerator::new(
                GeneratorId(index),
                variant,
                index as u8,
                bus_tx.clone(),
                stats.clone(),
                shutdown_tx.subscribe(),
            );
            production_lines.push(handle);
            generators.push(generator);
        }

        Self {
            config,
            subscriptions,
            production_lines,
            generators,
            current: Arc::new(RwLock::new(None)),
            ingress: Arc::new(AtomicU64::new(0)),
            matched: Arc::new(AtomicU64::new(0)),
            bus_tx,
            bus_rx,
            stats,
            shutdown_tx,
        }
    }

    /// Sender endpoint for external subscription clients.
    pub fn bus_sender(&self) -> BusSender {
        self.bus_tx.clone()
    }

    /// Query-path handle; clone freely across threads.
    pub fn search_handle(&self) -> SearchHandle {
        SearchHandle {
            current: self.current.clone(),
            ingress: self.ingress.clone(),
            matched: self.matched.clone(),
        }
    }

    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger { tx: self.shutdown_tx.clone() }
    }

    /// Runs the factory: spawns the production lines, initializes them
    /// with cloned snapshots, then services the control bus until it
    /// closes or shutdown fires.
    pub async fn run(mut self) {
        let priorities: Vec<(&str, u8)> = self
            .production_lines
            .iter()
            .map(|line| (line.name, line.priority))
            .collect();
        info!(
            subscriptions = self.subscriptions.len(),
            ?priorities,
            "engine factory starting"
        );

        for generator in self.generators.drain(..) {
            generator.spawn();
        }
        for line in &self.production_lines {
            let snapshot = self.subscriptions.clone();
            if line.mailbox.send(GeneratorCommand::Init(snapshot)).is_err() {
                warn!(engine = line.name, "generator mailbox closed before init");
            }
        }

        let monitor = self.spawn_monitor_task();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                message = self.bus_rx.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        info!("control bus closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        // Drain whatever was already queued before letting go
        while let Some(message) = self.bus_rx.try_recv() {
            self.handle_message(message);
        }
        let _ = self.shutdown_tx.send(());
        monitor.abort();

        if let Err(error) = snapshot::save(&self.config.subscriptions, &self.subscriptions) {
            warn!(%error, "failed to persist subscription snapshot");
        }
        *self.current.write() = None;
        info!("engine factory stopped");
    }

    fn handle_message(&mut self, message: ManagementMessage) {
        match message {
            ManagementMessage::AddSubscription { filter, notification_uri } => {
                let entry = Info::new(0, notification_uri.clone());
                match self.subscriptions.insert(filter.clone(), entry) {
                    Ok(()) => {
                        self.forward_update(ManagementMessage::AddSubscription {
                            filter,
                            notification_uri,
                        });
                    }
                    Err(error) => warn!(%error, "add subscription ignored"),
                }
            }
            ManagementMessage::DeleteSubscription { filter, notification_uri } => {
                match self.subscriptions.remove(&filter) {
                    Ok(_) => {
                        self.forward_update(ManagementMessage::DeleteSubscription {
                            filter,
                            notification_uri,
                        });
                    }
                    Err(error) => warn!(%error, "delete subscription ignored"),
                }
            }
            ManagementMessage::EngineReady { generator } => {
                self.handle_engine_ready(generator);
            }
            ManagementMessage::DeployEngine => {
                debug!("deploy-engine is reserved, ignoring");
            }
        }
    }

    /// Routes a mutation to every production line in bus order.
    fn forward_update(&self, message: ManagementMessage) {
        let Some(delta) = DeltaOp::from_message(&message) else { return };
        for line in &self.production_lines {
            if line.mailbox.send(GeneratorCommand::Update(delta.clone())).is_err() {
                warn!(engine = line.name, "generator mailbox closed");
            }
        }
    }

    /// Installs the announcing engine if it outranks the current one.
    fn handle_engine_ready(&self, id: GeneratorId) {
        let Some(line) = self.production_lines.get(id.0) else {
            warn!(%id, "ready from unknown generator");
            return;
        };
        let Some(engine) = line.engine_slot.read().clone() else {
            warn!(engine = line.name, "ready announcement without a published engine");
            return;
        };

        // Equal priority means the serving generator re-announced after
        // a rebuild; its fresh instance must replace the stale one.
        // Strictly lower priority never displaces the current engine.
        let mut current = self.current.write();
        let install = match current.as_ref() {
            None => true,
            Some(serving) => line.priority >= serving.priority,
        };
        if !install {
            debug!(engine = line.name, "announced engine does not outrank current");
            return;
        }
        let replaced = current
            .replace(CurrentEngine { engine, priority: line.priority })
            .map(|previous| previous.engine.name());
        drop(current);

        match replaced {
            Some(previous) => info!(engine = line.name, previous, "engine swapped"),
            None => info!(engine = line.name, "initial engine installed"),
        }
        self.stats.record(StatsEvent::SelectedEngine { engine_name: line.name.to_string() });
    }

    /// Periodic traffic/throughput reporting; the only time-bounded
    /// loop in the daemon.
    fn spawn_monitor_task(&self) -> tokio::task::JoinHandle<()> {
        let current = self.current.clone();
        let ingress = self.ingress.clone();
        let matched = self.matched.clone();
        let stats = self.stats.clone();
        let period = Duration::from_secs(self.config.stats_interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // the first tick fires immediately
            let mut last_ingress = 0u64;
            let mut last_matched = 0u64;
            let mut last_sampled = Instant::now();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let engine_name = match current.read().as_ref() {
                            Some(serving) => serving.engine.name().to_string(),
                            None => continue,
                        };
                        let total_ingress = ingress.load(Ordering::Relaxed);
                        let total_matched = matched.load(Ordering::Relaxed);
                        let delta_ingress = total_ingress - last_ingress;
                        let delta_matched = total_matched - last_matched;
                        let elapsed_us = last_sampled.elapsed().as_micros().max(1) as f64;
                        last_ingress = total_ingress;
                        last_matched = total_matched;
                        last_sampled = Instant::now();

                        stats.record(StatsEvent::Traffic {
                            engine_name: engine_name.clone(),
                            ingress: delta_ingress,
                            matches: delta_matched,
                        });
                        stats.record(StatsEvent::EngineThroughput {
                            engine_name,
                            event_per_us: delta_ingress as f64 / elapsed_us,
                        });
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            subscriptions: dir.join("subscriptions.json"),
            bus_capacity: 64,
            stats_endpoint: "http://127.0.0.1:8086".to_string(),
            stats_database: "tagsieve".to_string(),
            stats_interval_secs: 60,
            stats_queue: 64,
            verbose: false,
            log_format: "pretty".to_string(),
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    fn ready_line(id: usize, name: &'static str, priority: u8) -> GeneratorHandle {
        ready_line_with(id, name, priority, "1")
    }

    fn ready_line_with(
        id: usize,
        name: &'static str,
        priority: u8,
        filter: &str,
    ) -> GeneratorHandle {
        let variant = available_engines()
            .iter()
            .find(|variant| variant.name == name)
            .expect("known variant");
        let engine: Arc<dyn Engine> =
            Arc::from((variant.build)(&Subscriptions::single(filter, "u")).unwrap());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        GeneratorHandle {
            id: GeneratorId(id),
            name,
            priority,
            mailbox: tx,
            engine_slot: Arc::new(RwLock::new(Some(engine))),
        }
    }

    /// The literal hot-swap scenario: List at priority 1, PatriciaTrie
    /// at priority 3, both arrival orders end on the trie.
    #[test]
    fn test_priority_swap_either_arrival_order() {
        for order in [[0usize, 1], [1, 0]] {
            let dir = tempdir().unwrap();
            let mut factory = EngineFactory::new(
                test_config(dir.path()),
                Subscriptions::new(),
                StatsHandle::disabled(),
            );
            factory.production_lines =
                vec![ready_line(0, "List", 1), ready_line(1, "PatriciaTrie", 3)];
            let handle = factory.search_handle();

            for id in order {
                factory.handle_engine_ready(GeneratorId(id));
            }
            assert_eq!(handle.engine_name(), Some("PatriciaTrie"), "order {order:?}");
        }
    }

    /// Once a higher-priority engine serves, lower-priority announcers
    /// never replace it, however often they re-announce.
    #[test]
    fn test_priority_monotonicity() {
        let dir = tempdir().unwrap();
        let mut factory = EngineFactory::new(
            test_config(dir.path()),
            Subscriptions::new(),
            StatsHandle::disabled(),
        );
        factory.production_lines = vec![
            ready_line(0, "Legacy", 0),
            ready_line(1, "List", 1),
            ready_line(2, "PatriciaTrie", 3),
        ];
        let handle = factory.search_handle();

        factory.handle_engine_ready(GeneratorId(2));
        for _ in 0..3 {
            factory.handle_engine_ready(GeneratorId(0));
            factory.handle_engine_ready(GeneratorId(1));
        }
        assert_eq!(handle.engine_name(), Some("PatriciaTrie"));
    }

    /// A rebuild by the serving generator re-announces at equal
    /// priority and must refresh the installed instance.
    #[test]
    fn test_rebuild_reinstalls_serving_engine() {
        let dir = tempdir().unwrap();
        let mut factory = EngineFactory::new(
            test_config(dir.path()),
            Subscriptions::new(),
            StatsHandle::disabled(),
        );
        factory.production_lines = vec![ready_line_with(0, "PatriciaTrie", 3, "1100")];
        factory.handle_engine_ready(GeneratorId(0));
        let handle = factory.search_handle();
        assert_eq!(handle.search(&[0xC0]), vec!["u".to_string()]);

        // The generator rebuilt against a changed set and re-announced
        let variant = available_engines()
            .iter()
            .find(|variant| variant.name == "PatriciaTrie")
            .expect("known variant");
        let rebuilt: Arc<dyn Engine> =
            Arc::from((variant.build)(&Subscriptions::single("1111", "v")).unwrap());
        *factory.production_lines[0].engine_slot.write() = Some(rebuilt);
        factory.handle_engine_ready(GeneratorId(0));

        assert_eq!(handle.search(&[0xC0]), Vec::<String>::new());
        assert_eq!(handle.search(&[0xF0]), vec!["v".to_string()]);
    }

    /// Duplicate adds and unknown deletes are logged no-ops.
    #[test]
    fn test_add_delete_idempotence() {
        let dir = tempdir().unwrap();
        let mut factory = EngineFactory::new(
            test_config(dir.path()),
            Subscriptions::new(),
            StatsHandle::disabled(),
        );

        let add = ManagementMessage::AddSubscription {
            filter: "1100".to_string(),
            notification_uri: "u".to_string(),
        };
        factory.handle_message(add.clone());
        factory.handle_message(add);
        assert_eq!(factory.subscriptions.len(), 1);

        factory.handle_message(ManagementMessage::DeleteSubscription {
            filter: "0101".to_string(),
            notification_uri: "u".to_string(),
        });
        assert_eq!(factory.subscriptions.len(), 1);

        factory.handle_message(ManagementMessage::DeleteSubscription {
            filter: "1100".to_string(),
            notification_uri: "u".to_string(),
        });
        assert!(factory.subscriptions.is_empty());
    }

    /// End to end: add a filter, wait for the generators, search both
    /// a matching and a non-matching identifier.
    #[tokio::test]
    async fn test_add_then_search() {
        let dir = tempdir().unwrap();
        let factory = EngineFactory::new(
            test_config(dir.path()),
            Subscriptions::new(),
            StatsHandle::disabled(),
        );
        let handle = factory.search_handle();
        let bus = factory.bus_sender();
        let shutdown = factory.shutdown_trigger();
        let running = tokio::spawn(factory.run());

        bus.send(ManagementMessage::AddSubscription {
            filter: "1100".to_string(),
            notification_uri: "http://localhost:8888/notify".to_string(),
        })
        .await
        .unwrap();

        // Every generator acknowledges through the priority ladder; the
        // trie ends up serving and reflects the add.
        wait_until(
            || {
                handle.engine_name() == Some("PatriciaTrie")
                    && handle.search(&[0xC0, 0x00]).len() == 1
            },
            "patricia trie serving the new filter",
        )
        .await;

        assert_eq!(
            handle.search(&[0xC0, 0x00]),
            vec!["http://localhost:8888/notify".to_string()]
        );
        assert_eq!(handle.search(&[0x80, 0x00]), Vec::<String>::new());

        shutdown.trigger();
        running.await.unwrap();
        // The snapshot survives shutdown
        let persisted = snapshot::load(&dir.path().join("subscriptions.json")).unwrap();
        assert!(persisted.contains("1100"));
    }

    /// Searches stay empty (not blocked, not failing) before any
    /// engine is installed.
    #[test]
    fn test_search_before_ready_is_empty() {
        let dir = tempdir().unwrap();
        let factory = EngineFactory::new(
            test_config(dir.path()),
            Subscriptions::new(),
            StatsHandle::disabled(),
        );
        let handle = factory.search_handle();
        assert!(!handle.is_active());
        assert!(handle.search(&[0xFF]).is_empty());
        assert!(matches!(handle.current_engine(), Err(EngineError::NotReady)));
    }

    /// The classify path joins the decoder to the search path.
    #[test]
    fn test_classify_decodes_and_matches() {
        let dir = tempdir().unwrap();
        let mut factory = EngineFactory::new(
            test_config(dir.path()),
            Subscriptions::new(),
            StatsHandle::disabled(),
        );
        // SGTIN-96 identifiers start 0011 0000
        factory.production_lines = vec![ready_line_with(0, "PatriciaTrie", 3, "0011")];
        factory.handle_engine_ready(GeneratorId(0));
        let handle = factory.search_handle();

        let classified = handle
            .classify(&[0x30, 0x00], &[48, 112, 94, 48, 167, 0, 0, 64, 0, 0, 0, 1])
            .unwrap();
        assert_eq!(classified.urn, "urn:epc:id:sgtin:3.12345678.1.1");
        assert_eq!(classified.destinations, vec!["u".to_string()]);

        assert!(handle.classify(&[0x30, 0x00], &[0x99, 0x00]).is_err());
    }

    /// Searches keep completing promptly while a mutation storm runs.
    #[tokio::test]
    async fn test_search_during_update_storm() {
        let dir = tempdir().unwrap();
        let factory = EngineFactory::new(
            test_config(dir.path()),
            Subscriptions::single("1", "seed"),
            StatsHandle::disabled(),
        );
        let handle = factory.search_handle();
        let bus = factory.bus_sender();
        let shutdown = factory.shutdown_trigger();
        let running = tokio::spawn(factory.run());

        wait_until(|| handle.is_active(), "an initial engine").await;

        let storm_bus = bus.clone();
        let storm = tokio::spawn(async move {
            for round in 0..200u32 {
                let filter = format!("{:08b}", round % 256);
                let message = if round % 2 == 0 {
                    ManagementMessage::AddSubscription {
                        filter,
                        notification_uri: "storm".to_string(),
                    }
                } else {
                    ManagementMessage::DeleteSubscription {
                        filter,
                        notification_uri: "storm".to_string(),
                    }
                };
                if storm_bus.send(message).await.is_err() {
                    break;
                }
            }
        });

        for round in 0..200u32 {
            let id = [(round % 256) as u8, 0xA5];
            let started = Instant::now();
            let matches = handle.search(&id);
            assert!(
                started.elapsed() < Duration::from_secs(1),
                "search stalled behind a rebuild"
            );
            // The seed filter "1" matches any identifier with a high bit
            if id[0] >= 0x80 {
                assert!(matches.iter().any(|uri| uri == "seed"));
            }
            tokio::task::yield_now().await;
        }

        storm.await.unwrap();
        shutdown.trigger();
        running.await.unwrap();
    }
}
