use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;

use crate::error::RelayError;
use crate::event::RelayEvent;
use crate::filter::RelayFilter;
use crate::traits::{EventStream, RelayClient};

const LIVE_CHANNEL_CAPACITY: usize = 256;

/// In-process relay.
///
/// Stores every published event and fans new ones out to live
/// subscriptions. Used by tests and by single-host deployments where the
/// ledger runs next to the terminal.
pub struct InMemoryRelay {
    events: RwLock<Vec<RelayEvent>>,
    live: broadcast::Sender<RelayEvent>,
    fetches: AtomicUsize,
}

impl InMemoryRelay {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            events: RwLock::new(Vec::new()),
            live,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Store an event and deliver it to open subscriptions.
    pub fn publish(&self, event: RelayEvent) {
        tracing::debug!(event_id = %event.id, kind = event.kind, "relay event published");
        match self.events.write() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        // No live subscribers is fine: the event stays queryable.
        let _ = self.live.send(event);
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        match self.events.read() {
            Ok(events) => events.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of one-shot queries served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayClient for InMemoryRelay {
    async fn fetch_events(&self, filter: &RelayFilter) -> Result<Vec<RelayEvent>, RelayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let events = self
            .events
            .read()
            .map_err(|_| RelayError::Unreachable("event store poisoned".into()))?;
        Ok(events.iter().filter(|e| filter.matches(e)).cloned().collect())
    }

    async fn subscribe(&self, filter: &RelayFilter) -> Result<EventStream, RelayError> {
        let rx = self.live.subscribe();
        let filter = filter.clone();

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "relay subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |event| futures::future::ready(filter.matches(event)));

        Ok(stream.boxed())
    }
}
