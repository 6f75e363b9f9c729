use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::InvoiceId;

/// Externally visible status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    /// No attempt running.
    Idle,
    /// Waiting for a card to be presented.
    Scanning,
    /// The card answered; choosing and preparing the settlement protocol.
    Requesting,
    /// Handshake sent, waiting for the callback or the ledger confirmation.
    AwaitingCallback,
    /// Payment settled. Final for the attempt.
    Done,
    /// Payment failed. Final for the attempt.
    Error,
}

impl PaymentStatus {
    /// Whether the attempt has reached `done` or `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether an attempt is running and owns its invoice.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Scanning | Self::Requesting | Self::AwaitingCallback
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Requesting => write!(f, "requesting"),
            Self::AwaitingCallback => write!(f, "awaiting-callback"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Events that trigger status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    /// The card reader was started.
    ScanStarted,
    /// The card answered with a withdraw request.
    CardResponded,
    /// The card reader was stopped before a card answered.
    ScanCancelled,
    /// The regular or extended handshake was sent.
    HandshakeSent,
    /// Callback accepted (regular) or ledger confirmed (extended).
    Settled,
    /// Scan, protocol, callback or ledger failure.
    Failed,
    /// No confirmation observed yet; a recheck is pending.
    Inconclusive,
    /// New attempt started or the view was abandoned.
    Reset,
}

/// Status transition table.
///
/// Valid transitions:
/// - Idle → Scanning (ScanStarted)
/// - Scanning → Requesting (CardResponded)
/// - Scanning → Idle (ScanCancelled)
/// - Scanning → Error (Failed)
/// - Requesting → AwaitingCallback (HandshakeSent)
/// - Requesting → Error (Failed)
/// - AwaitingCallback → Done (Settled)
/// - AwaitingCallback → Error (Failed)
/// - AwaitingCallback → AwaitingCallback (Inconclusive)
/// - Done | Error | Idle → Idle (Reset)
pub struct PaymentStateMachine;

impl PaymentStateMachine {
    /// Attempt a transition. Returns the new status or an error for invalid
    /// transitions.
    pub fn transition(
        current: PaymentStatus,
        event: PaymentEvent,
    ) -> Result<PaymentStatus, CoreError> {
        use PaymentEvent as E;
        use PaymentStatus as S;

        let next = match (current, event) {
            (S::Idle, E::ScanStarted) => S::Scanning,

            (S::Scanning, E::CardResponded) => S::Requesting,
            (S::Scanning, E::ScanCancelled) => S::Idle,
            (S::Scanning, E::Failed) => S::Error,

            (S::Requesting, E::HandshakeSent) => S::AwaitingCallback,
            (S::Requesting, E::Failed) => S::Error,

            (S::AwaitingCallback, E::Settled) => S::Done,
            (S::AwaitingCallback, E::Failed) => S::Error,
            (S::AwaitingCallback, E::Inconclusive) => S::AwaitingCallback,

            (S::Done | S::Error | S::Idle, E::Reset) => S::Idle,

            _ => {
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    event,
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %next,
            event = ?event,
            "payment status transition"
        );

        Ok(next)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: PaymentStatus, event: PaymentEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

/// Point-in-time view of one payment attempt, as published to observers.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaymentSnapshot {
    pub invoice_id: InvoiceId,
    /// Attempt this snapshot belongs to; `None` while idle.
    pub attempt_id: Option<Uuid>,
    pub status: PaymentStatus,
    /// Set while awaiting a ledger confirmation that has not been observed.
    pub indeterminate: bool,
    /// Identifier of the submitted transfer assertion, if any.
    pub correlation_id: Option<String>,
    pub reasons: Vec<String>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSnapshot {
    pub fn idle(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id,
            attempt_id: None,
            status: PaymentStatus::Idle,
            indeterminate: false,
            correlation_id: None,
            reasons: Vec::new(),
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    /// Fresh state instance for a new attempt, already in `scanning`.
    pub fn begin(invoice_id: InvoiceId, attempt_id: Uuid) -> Result<Self, CoreError> {
        let mut snapshot = Self::idle(invoice_id);
        snapshot.attempt_id = Some(attempt_id);
        snapshot.apply(PaymentEvent::ScanStarted)?;
        Ok(snapshot)
    }

    /// Apply an event through the transition table.
    pub fn apply(&mut self, event: PaymentEvent) -> Result<PaymentStatus, CoreError> {
        let next = PaymentStateMachine::transition(self.status, event)?;
        self.status = next;
        self.indeterminate = event == PaymentEvent::Inconclusive;
        if next == PaymentStatus::Idle {
            self.attempt_id = None;
            self.correlation_id = None;
            self.reasons.clear();
            self.error_message = None;
        }
        self.updated_at = Utc::now();
        Ok(next)
    }

    /// Move to `error`, recording the reasons. The message is the reasons
    /// joined with `"; "`.
    pub fn fail(&mut self, reasons: Vec<String>) -> Result<PaymentStatus, CoreError> {
        let status = self.apply(PaymentEvent::Failed)?;
        self.error_message = Some(reasons.join("; "));
        self.reasons = reasons;
        Ok(status)
    }

    /// Stay in `awaiting-callback` as indeterminate, keeping an optional note.
    pub fn mark_inconclusive(&mut self, note: Option<String>) -> Result<PaymentStatus, CoreError> {
        let status = self.apply(PaymentEvent::Inconclusive)?;
        if note.is_some() {
            self.error_message = note;
        }
        Ok(status)
    }
}
