//! Status change notification.

use tapcharge_core::PaymentSnapshot;
use tokio::sync::broadcast;

/// Receives every published status change, in order, per invoice.
pub trait StatusObserver: Send + Sync {
    fn on_status(&self, snapshot: &PaymentSnapshot);
}

/// Fans snapshots out over a tokio broadcast channel.
///
/// Slow receivers lag and lose old snapshots rather than block the
/// orchestrator.
pub struct BroadcastObserver {
    tx: broadcast::Sender<PaymentSnapshot>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StatusObserver for BroadcastObserver {
    fn on_status(&self, snapshot: &PaymentSnapshot) {
        // No receivers is fine: nobody is watching this terminal.
        let _ = self.tx.send(snapshot.clone());
    }
}
