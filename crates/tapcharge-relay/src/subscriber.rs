//! Confirmation look-up for submitted transfer assertions.
//!
//! The first record observed for a correlation id is authoritative. Later
//! records for the same id (relay replays, a second ledger emission) are
//! logged and ignored, so repeated look-ups always agree.

use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RelayError;
use crate::event::{ConfirmationCategory, ConfirmationRecord, RelayEvent};
use crate::filter::RelayFilter;
use crate::traits::RelayClient;

/// Looks up ledger confirmation records on the relay set.
pub struct EventConfirmationSubscriber {
    relay: Arc<dyn RelayClient>,
    /// Public key of the ledger; records from anyone else are ignored.
    ledger_identity: String,
    /// First record seen per correlation id.
    first_seen: DashMap<String, ConfirmationRecord>,
}

impl EventConfirmationSubscriber {
    pub fn new(relay: Arc<dyn RelayClient>, ledger_identity: impl Into<String>) -> Self {
        Self {
            relay,
            ledger_identity: ledger_identity.into(),
            first_seen: DashMap::new(),
        }
    }

    pub fn ledger_identity(&self) -> &str {
        &self.ledger_identity
    }

    /// Filter used for `correlation_id` restricted to `expected` categories.
    pub fn filter_for(&self, correlation_id: &str, expected: &[ConfirmationCategory]) -> RelayFilter {
        RelayFilter::confirmation(correlation_id, &self.ledger_identity, expected)
    }

    /// Single query: return the authoritative record if one is stored on the
    /// relay set, `None` otherwise.
    pub async fn query(
        &self,
        correlation_id: &str,
        expected: &[ConfirmationCategory],
    ) -> Result<Option<ConfirmationRecord>, RelayError> {
        if let Some(record) = self.cached(correlation_id, expected) {
            return Ok(Some(record));
        }
        let filter = self.filter_for(correlation_id, expected);
        let events = self.relay.fetch_events(&filter).await?;
        Ok(self.first_match(&filter, correlation_id, events))
    }

    /// Wait up to `window` for a record.
    ///
    /// Subscribes before querying stored events so a record published in
    /// between is not missed. Returns `None` when the window elapses.
    pub async fn await_confirmation(
        &self,
        correlation_id: &str,
        expected: &[ConfirmationCategory],
        window: Duration,
    ) -> Result<Option<ConfirmationRecord>, RelayError> {
        if let Some(record) = self.cached(correlation_id, expected) {
            return Ok(Some(record));
        }

        let filter = self.filter_for(correlation_id, expected);
        let deadline = tokio::time::Instant::now() + window;
        let mut live = self.relay.subscribe(&filter).await?;

        let stored = self.relay.fetch_events(&filter).await?;
        if let Some(record) = self.first_match(&filter, correlation_id, stored) {
            return Ok(Some(record));
        }

        loop {
            match tokio::time::timeout_at(deadline, live.next()).await {
                Ok(Some(event)) => {
                    if let Some(record) = self.accept(&filter, correlation_id, event) {
                        return Ok(Some(record));
                    }
                }
                Ok(None) => {
                    tracing::warn!(correlation_id, "relay subscription closed before confirmation");
                    return Ok(None);
                }
                Err(_) => {
                    tracing::info!(
                        correlation_id,
                        window_ms = window.as_millis() as u64,
                        "no confirmation within observation window"
                    );
                    return Ok(None);
                }
            }
        }
    }

    /// Drop the recorded verdict for a transfer that has been resolved.
    pub fn forget(&self, correlation_id: &str) -> bool {
        self.first_seen.remove(correlation_id).is_some()
    }

    /// Number of transfers with a recorded verdict.
    pub fn tracked(&self) -> usize {
        self.first_seen.len()
    }

    fn cached(
        &self,
        correlation_id: &str,
        expected: &[ConfirmationCategory],
    ) -> Option<ConfirmationRecord> {
        let record = self.first_seen.get(correlation_id)?.clone();
        let category = if record.is_ok() {
            ConfirmationCategory::Ok
        } else {
            ConfirmationCategory::Error
        };
        expected.contains(&category).then_some(record)
    }

    fn first_match(
        &self,
        filter: &RelayFilter,
        correlation_id: &str,
        events: Vec<RelayEvent>,
    ) -> Option<ConfirmationRecord> {
        let mut found: Option<ConfirmationRecord> = None;
        for event in events {
            match &found {
                None => found = self.accept(filter, correlation_id, event),
                Some(first) => tracing::warn!(
                    correlation_id = %first.correlation_id,
                    kept = %first.event_id,
                    ignored = %event.id,
                    "duplicate confirmation ignored"
                ),
            }
        }
        found
    }

    /// Check an event against the filter, parse it as the verdict on
    /// `correlation_id`, and record it as the authoritative answer unless
    /// one was already recorded.
    fn accept(
        &self,
        filter: &RelayFilter,
        correlation_id: &str,
        event: RelayEvent,
    ) -> Option<ConfirmationRecord> {
        // Relays are not trusted to apply the filter.
        if !filter.matches(&event) {
            tracing::debug!(event_id = %event.id, "event does not match confirmation filter");
            return None;
        }
        let record = match ConfirmationRecord::from_event(&event, correlation_id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable confirmation event");
                return None;
            }
        };

        let entry = self
            .first_seen
            .entry(correlation_id.to_string())
            .or_insert_with(|| record.clone());
        if entry.event_id != record.event_id {
            tracing::warn!(
                correlation_id = %record.correlation_id,
                kept = %entry.event_id,
                ignored = %record.event_id,
                "duplicate confirmation ignored"
            );
        } else {
            tracing::info!(record = %record, "ledger confirmation observed");
        }
        Some(entry.clone())
    }
}
