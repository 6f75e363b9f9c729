use dashmap::DashMap;
use std::sync::Arc;

use crate::error::RelayError;
use crate::event::{ConfirmationCategory, ConfirmationRecord};
use crate::subscriber::EventConfirmationSubscriber;

/// Manual re-query path for transfers whose confirmation was not observed.
///
/// `recheck` only reads from the relay set. It never touches the transfer
/// itself, so it can be called any number of times.
pub struct EmergencyRecovery {
    subscriber: Arc<EventConfirmationSubscriber>,
    rechecks: DashMap<String, u32>,
}

impl EmergencyRecovery {
    pub fn new(subscriber: Arc<EventConfirmationSubscriber>) -> Self {
        Self {
            subscriber,
            rechecks: DashMap::new(),
        }
    }

    /// One-shot look-up of the ledger verdict for `correlation_id`.
    pub async fn recheck(
        &self,
        correlation_id: &str,
    ) -> Result<Option<ConfirmationRecord>, RelayError> {
        let attempt = {
            let mut count = self.rechecks.entry(correlation_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        tracing::info!(correlation_id, attempt, "emergency recheck");

        let record = self
            .subscriber
            .query(correlation_id, &ConfirmationCategory::ALL)
            .await?;
        if record.is_none() {
            tracing::warn!(correlation_id, attempt, "confirmation still not found");
        }
        Ok(record)
    }

    /// Release everything held for a resolved transfer.
    pub fn forget(&self, correlation_id: &str) {
        self.rechecks.remove(correlation_id);
        self.subscriber.forget(correlation_id);
    }

    pub fn subscriber(&self) -> &EventConfirmationSubscriber {
        &self.subscriber
    }

    /// How many rechecks were run for `correlation_id`.
    pub fn recheck_count(&self, correlation_id: &str) -> u32 {
        self.rechecks.get(correlation_id).map(|c| *c).unwrap_or(0)
    }
}
