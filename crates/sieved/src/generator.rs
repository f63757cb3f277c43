//! Engine generator
//!
//! One generator per engine variant. Each owns a state machine that
//! rebuilds its engine in the background when the subscription set
//! changes and announces readiness on the control bus. Transitions are
//! explicit; build work happens in spawned tasks that report back
//! through the generator's own mailbox, so the driver loop is a single
//! receive.

use crate::bus::{BusSender, GeneratorId, ManagementMessage};
use crate::stats::{StatsEvent, StatsHandle};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tagsieve_core::engine::{Engine, EngineVariant};
use tagsieve_core::error::EngineError;
use tagsieve_core::subscription::Subscriptions;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Generator lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorState {
    Unavailable,
    Generating,
    Ready,
    Pending,
    Rebuilding,
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unavailable => "unavailable",
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Pending => "pending",
            Self::Rebuilding => "rebuilding",
        };
        f.write_str(name)
    }
}

/// FSM events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorEvent {
    Init,
    Deploy,
    Update,
    Rebuild,
}

/// The transition table. Returns the destination state, or `None` for
/// an event fired from a non-source state.
pub(crate) fn transition(
    state: GeneratorState,
    event: GeneratorEvent,
) -> Option<GeneratorState> {
    use GeneratorEvent::*;
    use GeneratorState::*;
    match (event, state) {
        (Init, Unavailable) => Some(Generating),
        (Deploy, Generating | Rebuilding) => Some(Ready),
        (Update, Ready) => Some(Pending),
        (Rebuild, Pending) => Some(Rebuilding),
        _ => None,
    }
}

/// A subscription mutation routed to the engines.
#[derive(Clone, Debug)]
pub enum DeltaOp {
    Add(Subscriptions),
    Delete(Subscriptions),
}

impl DeltaOp {
    /// Builds the delta for a bus mutation message, if it is one.
    pub fn from_message(message: &ManagementMessage) -> Option<Self> {
        match message {
            ManagementMessage::AddSubscription { filter, notification_uri } => {
                Some(Self::Add(Subscriptions::single(filter.clone(), notification_uri.clone())))
            }
            ManagementMessage::DeleteSubscription { filter, notification_uri } => {
                Some(Self::Delete(Subscriptions::single(filter.clone(), notification_uri.clone())))
            }
            _ => None,
        }
    }
}

/// Commands delivered through a generator's mailbox.
pub enum GeneratorCommand {
    /// Start the first build from a cloned snapshot
    Init(Subscriptions),
    /// A subscription mutation forwarded by the supervisor
    Update(DeltaOp),
    /// An in-flight build task finished
    BuildDone(Result<Box<dyn Engine>, EngineError>),
}

/// Coalescing single-slot backlog for updates arriving mid-build. One
/// queued delta replays as a delta-apply; anything more collapses into
/// one full rebuild from the generator's snapshot.
#[derive(Debug, Default)]
enum Backlog {
    #[default]
    Empty,
    Delta(DeltaOp),
    Full,
}

impl Backlog {
    fn push(&mut self, delta: DeltaOp) {
        *self = match std::mem::take(self) {
            Self::Empty => Self::Delta(delta),
            Self::Delta(_) | Self::Full => Self::Full,
        };
    }

    fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// What the supervisor keeps per production line.
///
/// The mailbox is unbounded so routing an update can never stall the
/// supervisor behind a generator that is itself waiting on the bus;
/// the coalescing backlog keeps the queue shallow in practice.
pub struct GeneratorHandle {
    pub id: GeneratorId,
    pub name: &'static str,
    pub priority: u8,
    pub mailbox: mpsc::UnboundedSender<GeneratorCommand>,
    /// Latest published engine, written only by the owning generator.
    pub engine_slot: Arc<RwLock<Option<Arc<dyn Engine>>>>,
}

/// The generator task state.
pub struct EngineGenerator {
    id: GeneratorId,
    variant: &'static EngineVariant,
    state: GeneratorState,
    /// The generator's causally-consistent view of the subscriptions:
    /// every update is applied here in mailbox order, whatever the FSM
    /// is doing.
    subscriptions: Subscriptions,
    engine: Option<Arc<dyn Engine>>,
    backlog: Backlog,
    engine_slot: Arc<RwLock<Option<Arc<dyn Engine>>>>,
    bus: BusSender,
    mailbox: mpsc::UnboundedReceiver<GeneratorCommand>,
    self_tx: mpsc::UnboundedSender<GeneratorCommand>,
    stats: StatsHandle,
    shutdown: broadcast::Receiver<()>,
}

impl EngineGenerator {
    pub fn new(
        id: GeneratorId,
        variant: &'static EngineVariant,
        priority: u8,
        bus: BusSender,
        stats: StatsHandle,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, GeneratorHandle) {
        let (self_tx, mailbox) = mpsc::unbounded_channel();
        let engine_slot = Arc::new(RwLock::new(None));
        let handle = GeneratorHandle {
            id,
            name: variant.name,
            priority,
            mailbox: self_tx.clone(),
            engine_slot: engine_slot.clone(),
        };
        let generator = Self {
            id,
            variant,
            state: GeneratorState::Unavailable,
            subscriptions: Subscriptions::new(),
            engine: None,
            backlog: Backlog::Empty,
            engine_slot,
            bus,
            mailbox,
            self_tx,
            stats,
            shutdown,
        };
        (generator, handle)
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = self.shutdown.recv() => {
                    debug!(engine = self.variant.name, "shutdown, skipping further publication");
                    break;
                }
            }
        }
    }

    /// Fires an FSM event; a transition attempted from a non-source
    /// state is reported and ignored.
    fn fire(&mut self, event: GeneratorEvent) -> bool {
        match transition(self.state, event) {
            Some(next) => {
                debug!(
                    engine = self.variant.name,
                    from = %self.state,
                    to = %next,
                    ?event,
                    "transition"
                );
                self.state = next;
                true
            }
            None => {
                warn!(
                    engine = self.variant.name,
                    state = %self.state,
                    ?event,
                    "transition from non-source state ignored"
                );
                false
            }
        }
    }

    async fn handle(&mut self, command: GeneratorCommand) {
        match command {
            GeneratorCommand::Init(snapshot) => {
                if self.fire(GeneratorEvent::Init) {
                    self.subscriptions = snapshot.clone();
                    self.start_build(snapshot);
                }
            }
            GeneratorCommand::Update(delta) => {
                apply_delta(&mut self.subscriptions, &delta);
                match self.state {
                    GeneratorState::Generating | GeneratorState::Rebuilding => {
                        self.backlog.push(delta);
                    }
                    _ => {
                        if self.fire(GeneratorEvent::Update) {
                            self.fire(GeneratorEvent::Rebuild);
                            self.start_rebuild(delta);
                        }
                    }
                }
            }
            GeneratorCommand::BuildDone(Ok(engine)) => {
                self.engine = Some(Arc::from(engine));
                if !self.fire(GeneratorEvent::Deploy) {
                    return;
                }
                match self.backlog.take() {
                    Backlog::Empty => self.publish().await,
                    Backlog::Delta(delta) => {
                        // The finished engine predates this delta; apply
                        // it before anyone sees the engine.
                        self.fire(GeneratorEvent::Update);
                        self.fire(GeneratorEvent::Rebuild);
                        self.start_rebuild(delta);
                    }
                    Backlog::Full => {
                        self.fire(GeneratorEvent::Update);
                        self.fire(GeneratorEvent::Rebuild);
                        self.start_build(self.subscriptions.clone());
                    }
                }
            }
            GeneratorCommand::BuildDone(Err(error)) => {
                error!(engine = self.variant.name, %error, "build failed");
                self.state = GeneratorState::Unavailable;
                self.backlog = Backlog::Empty;
            }
        }
    }

    /// Full build from a snapshot, off the driver loop.
    fn start_build(&self, snapshot: Subscriptions) {
        let build = self.variant.build;
        let name = self.variant.name;
        let tx = self.self_tx.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let entries = snapshot.len();
            let result = build(&snapshot);
            if result.is_ok() {
                let elapsed_us = started.elapsed().as_micros().max(1) as f64;
                stats.record(StatsEvent::Simulation {
                    engine_name: name.to_string(),
                    event_per_us: entries as f64 / elapsed_us,
                });
            }
            let _ = tx.send(GeneratorCommand::BuildDone(result));
        });
    }

    /// Delta-apply onto a clone of the current engine, off the driver
    /// loop. The published instance stays read-only.
    fn start_rebuild(&self, delta: DeltaOp) {
        let Some(current) = self.engine.clone() else {
            // No engine to patch; fall back to a full build
            self.start_build(self.subscriptions.clone());
            return;
        };
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let mut engine = current.boxed_clone();
            match delta {
                DeltaOp::Add(set) => engine.add_subscriptions(set),
                DeltaOp::Delete(set) => engine.delete_subscriptions(set),
            }
            let _ = tx.send(GeneratorCommand::BuildDone(Ok(engine)));
        });
    }

    /// Publishes the engine to the slot and announces it on the bus.
    async fn publish(&mut self) {
        let Some(engine) = self.engine.clone() else { return };
        *self.engine_slot.write() = Some(engine);
        info!(engine = self.variant.name, "engine ready");
        if self
            .bus
            .send(ManagementMessage::EngineReady { generator: self.id })
            .await
            .is_err()
        {
            debug!(engine = self.variant.name, "control bus closed, engine not announced");
        }
    }
}

fn apply_delta(subscriptions: &mut Subscriptions, delta: &DeltaOp) {
    match delta {
        DeltaOp::Add(set) => {
            for (filter, info) in set.iter() {
                let _ = subscriptions.insert(filter.clone(), info.clone());
            }
        }
        DeltaOp::Delete(set) => {
            for filter in set.keys() {
                let _ = subscriptions.remove(filter);
            }
        }
    }
}
