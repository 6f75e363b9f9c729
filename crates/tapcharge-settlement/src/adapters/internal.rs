//! Internal ledger transfer executor.
//!
//! Builds a signed [`TransferAssertion`], posts it to the card service and
//! looks for the ledger's confirmation record on the relay set. When the
//! submission itself fails, the card's balance is consulted: it can prove a
//! transfer impossible but never that it happened.

use std::sync::Arc;
use std::time::Duration;
use tapcharge_core::{Invoice, WithdrawRequest};
use tapcharge_crypto::KeyPair;
use tapcharge_relay::{ConfirmationCategory, ConfirmationOutcome, EventConfirmationSubscriber};

use crate::assertion::TransferAssertion;
use crate::error::SettlementError;
use crate::traits::{CallbackChannel, CardClient};

/// Reason reported when the fallback balance check proves the card short.
pub const INSUFFICIENT_BALANCE: &str = "insufficient balance";

/// Result of an internal transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The ledger emitted an `ok` record.
    Confirmed,
    /// The ledger refused the transfer, or the card cannot cover it.
    Rejected { reasons: Vec<String> },
    /// Submitted, but no record within the observation window.
    Indeterminate,
}

/// An [`Outcome`] tagged with the assertion it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub correlation_id: String,
    pub outcome: Outcome,
}

pub struct InternalTransferExecutor {
    callbacks: Arc<dyn CallbackChannel>,
    card: Arc<dyn CardClient>,
    subscriber: Arc<EventConfirmationSubscriber>,
    signer: Arc<KeyPair>,
    destination: String,
    relays: Vec<String>,
}

impl InternalTransferExecutor {
    pub fn new(
        callbacks: Arc<dyn CallbackChannel>,
        card: Arc<dyn CardClient>,
        subscriber: Arc<EventConfirmationSubscriber>,
        signer: Arc<KeyPair>,
        destination: impl Into<String>,
        relays: Vec<String>,
    ) -> Self {
        Self {
            callbacks,
            card,
            subscriber,
            signer,
            destination: destination.into(),
            relays,
        }
    }

    /// Build and sign the assertion for `invoice` without sending it.
    pub fn prepare(
        &self,
        request: &WithdrawRequest,
        invoice: &Invoice,
    ) -> Result<TransferAssertion, SettlementError> {
        TransferAssertion::build(
            invoice.ledger_amount(),
            &self.destination,
            &request.k1,
            &self.relays,
            &self.signer,
        )
    }

    /// Prepare, submit and observe in one call.
    pub async fn execute(
        &self,
        request: &WithdrawRequest,
        invoice: &Invoice,
        window: Duration,
    ) -> Result<TransferOutcome, SettlementError> {
        let assertion = self.prepare(request, invoice)?;
        self.execute_prepared(&assertion, request, invoice, window).await
    }

    /// Submit a prepared assertion and wait up to `window` for its record.
    ///
    /// `Err(Submission)` means the submission failed and the balance check
    /// could not rule the transfer out; the ledger may still apply it.
    pub async fn execute_prepared(
        &self,
        assertion: &TransferAssertion,
        request: &WithdrawRequest,
        invoice: &Invoice,
        window: Duration,
    ) -> Result<TransferOutcome, SettlementError> {
        let correlation_id = assertion.correlation_id();
        tracing::info!(
            invoice_id = %invoice.id,
            correlation_id = %correlation_id,
            amount = invoice.ledger_amount(),
            "submitting internal transfer"
        );

        if let Err(reason) = self.submit(assertion, request).await {
            tracing::warn!(
                correlation_id = %correlation_id,
                %reason,
                "transfer submission failed, checking card balance"
            );
            return self.fallback(correlation_id, request, invoice, reason).await;
        }

        let record = self
            .subscriber
            .await_confirmation(&correlation_id, &ConfirmationCategory::ALL, window)
            .await?;

        let outcome = match record.map(|r| r.outcome) {
            Some(ConfirmationOutcome::Ok) => Outcome::Confirmed,
            Some(ConfirmationOutcome::Error { reasons }) => Outcome::Rejected { reasons },
            None => Outcome::Indeterminate,
        };
        Ok(TransferOutcome {
            correlation_id,
            outcome,
        })
    }

    /// POST the assertion. Any failure is returned as a reason string.
    async fn submit(
        &self,
        assertion: &TransferAssertion,
        request: &WithdrawRequest,
    ) -> Result<(), String> {
        let body = assertion.to_json().map_err(|e| e.to_string())?;
        match self.callbacks.post_json(&request.callback, &body).await {
            Ok(response) if response.is_success_status() => Ok(()),
            Ok(response) => Err(response
                .body
                .and_then(|b| b.reason)
                .map(|r| format!("HTTP {}: {r}", response.http_status))
                .unwrap_or_else(|| format!("HTTP {}", response.http_status))),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn fallback(
        &self,
        correlation_id: String,
        request: &WithdrawRequest,
        invoice: &Invoice,
        reason: String,
    ) -> Result<TransferOutcome, SettlementError> {
        let submission = |reason: String| SettlementError::Submission {
            correlation_id: correlation_id.clone(),
            reason,
        };

        let holder = match self.card.card_info(&request.card).await {
            Ok(Some(info)) => info.holder,
            Ok(None) => {
                tracing::warn!(correlation_id = %correlation_id, "card holder unknown");
                return Err(submission(reason));
            }
            Err(e) => {
                tracing::warn!(correlation_id = %correlation_id, error = %e, "card info failed");
                return Err(submission(reason));
            }
        };

        let balance = match self.card.balance(&holder).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(correlation_id = %correlation_id, error = %e, "balance read failed");
                return Err(submission(reason));
            }
        };

        let required = invoice.ledger_amount();
        if balance < required {
            tracing::info!(
                correlation_id = %correlation_id,
                balance,
                required,
                "card balance cannot cover transfer"
            );
            return Ok(TransferOutcome {
                correlation_id,
                outcome: Outcome::Rejected {
                    reasons: vec![INSUFFICIENT_BALANCE.to_string()],
                },
            });
        }

        Err(submission(reason))
    }
}
