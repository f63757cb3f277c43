//! Control bus
//!
//! One ordered queue of typed management messages at the supervisor.
//! External subscription clients and every generator hold cheap sender
//! clones; delivery order to the supervisor is application order.

use thiserror::Error;
use tokio::sync::mpsc;

/// Default queue depth for the bus and the generator mailboxes.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Control bus errors
#[derive(Debug, Error)]
pub enum ControlBusError {
    /// The receiving side is gone; terminal for the supervisor
    #[error("control bus closed")]
    Closed,
}

/// Stable handle for one engine generator, resolved through the
/// supervisor's registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GeneratorId(pub usize);

impl std::fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "generator#{}", self.0)
    }
}

/// Management actions for the engine factory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagementMessage {
    /// Subscribe `notification_uri` to tags matching `filter`
    AddSubscription { filter: String, notification_uri: String },
    /// Remove the subscription for `filter`
    DeleteSubscription { filter: String, notification_uri: String },
    /// A generator finished (re)building its engine
    EngineReady { generator: GeneratorId },
    /// Reserved: supervisor-initiated force-swap
    DeployEngine,
}

/// Sending endpoint of the control bus.
#[derive(Clone)]
pub struct BusSender {
    tx: mpsc::Sender<ManagementMessage>,
}

impl BusSender {
    pub async fn send(&self, message: ManagementMessage) -> Result<(), ControlBusError> {
        self.tx.send(message).await.map_err(|_| ControlBusError::Closed)
    }
}

/// Receiving endpoint, owned by the supervisor.
pub struct BusReceiver {
    rx: mpsc::Receiver<ManagementMessage>,
}

impl BusReceiver {
    /// Next message, or `None` once the bus is closed and drained.
    pub async fn recv(&mut self) -> Option<ManagementMessage> {
        self.rx.recv().await
    }

    /// Non-blocking drain step, used during shutdown.
    pub fn try_recv(&mut self) -> Option<ManagementMessage> {
        self.rx.try_recv().ok()
    }
}

/// Creates a connected control bus pair.
pub fn channel(capacity: usize) -> (BusSender, BusReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (BusSender { tx }, BusReceiver { rx })
}
