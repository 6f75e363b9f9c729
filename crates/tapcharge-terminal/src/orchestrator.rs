//! Payment attempt driver.
//!
//! One [`PaymentOrchestrator`] serves every invoice on a terminal. Each
//! invoice has a session holding the published view, the transfer that is
//! still waiting for a ledger verdict (if any), and the paid/printed flags.
//! Session state is only touched between suspension points; no map guard is
//! held across an `.await`.

use dashmap::DashMap;
use std::sync::Arc;
use tapcharge_core::{
    Invoice, InvoiceId, PaymentEvent, PaymentSnapshot, PaymentStateMachine, PaymentStatus,
    ScanMode, WithdrawRequest,
};
use tapcharge_relay::{ConfirmationOutcome, EmergencyRecovery, EventConfirmationSubscriber};
use tapcharge_settlement::{
    CallbackChannel, CardClient, ExecutorKind, HttpCallbackChannel, InternalTransferExecutor,
    Outcome, ProtocolSelector, RegularWithdrawExecutor, TransferOutcome,
};
use tokio::sync::Notify;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::context::PaymentContext;
use crate::error::TerminalError;
use crate::notifier::StatusObserver;
use crate::order::OrderSink;

/// A submitted transfer whose ledger verdict has not been observed.
struct PendingTransfer {
    correlation_id: String,
    /// View of the attempt that submitted it, restored on re-entry.
    attempt: PaymentSnapshot,
}

struct Session {
    view: PaymentSnapshot,
    pending: Option<PendingTransfer>,
    /// A `pay` call is running for this invoice.
    in_flight: bool,
    cancel: Option<Arc<Notify>>,
    paid: bool,
    printed: bool,
}

impl Session {
    fn new(invoice_id: InvoiceId) -> Self {
        Self {
            view: PaymentSnapshot::idle(invoice_id),
            pending: None,
            in_flight: false,
            cancel: None,
            paid: false,
            printed: false,
        }
    }
}

/// Ledger verdict applied to a pending transfer.
enum Verdict {
    Settled,
    Rejected(Vec<String>),
}

impl From<ConfirmationOutcome> for Verdict {
    fn from(outcome: ConfirmationOutcome) -> Self {
        match outcome {
            ConfirmationOutcome::Ok => Self::Settled,
            ConfirmationOutcome::Error { reasons } => Self::Rejected(reasons),
        }
    }
}

/// Clears the in-flight mark when a `pay` call ends, including when its
/// future is dropped.
struct InFlight<'a> {
    sessions: &'a DashMap<InvoiceId, Session>,
    invoice_id: &'a InvoiceId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(mut session) = self.sessions.get_mut(self.invoice_id) {
            session.in_flight = false;
            session.cancel = None;
        }
    }
}

/// Sequences scan, protocol selection, settlement and confirmation for
/// each invoice and publishes every status change.
pub struct PaymentOrchestrator {
    context: PaymentContext,
    card: Arc<dyn CardClient>,
    orders: Arc<dyn OrderSink>,
    observer: Arc<dyn StatusObserver>,
    recovery: EmergencyRecovery,
    regular: RegularWithdrawExecutor,
    internal: InternalTransferExecutor,
    sessions: DashMap<InvoiceId, Session>,
}

impl PaymentOrchestrator {
    pub fn new(
        context: PaymentContext,
        card: Arc<dyn CardClient>,
        callbacks: Arc<dyn CallbackChannel>,
        orders: Arc<dyn OrderSink>,
        observer: Arc<dyn StatusObserver>,
    ) -> Self {
        let subscriber = Arc::new(EventConfirmationSubscriber::new(
            context.relay.clone(),
            context.ledger_identity.clone(),
        ));
        let internal = InternalTransferExecutor::new(
            callbacks.clone(),
            card.clone(),
            subscriber.clone(),
            context.signer.clone(),
            context.destination.clone(),
            context.relays.clone(),
        );
        Self {
            recovery: EmergencyRecovery::new(subscriber),
            regular: RegularWithdrawExecutor::new(callbacks),
            internal,
            context,
            card,
            orders,
            observer,
            sessions: DashMap::new(),
        }
    }

    /// Orchestrator with the reqwest callback channel.
    pub fn with_http(
        context: PaymentContext,
        http: &HttpConfig,
        card: Arc<dyn CardClient>,
        orders: Arc<dyn OrderSink>,
        observer: Arc<dyn StatusObserver>,
    ) -> Result<Self, TerminalError> {
        let callbacks = Arc::new(HttpCallbackChannel::new(http.timeout())?);
        Ok(Self::new(context, card, callbacks, orders, observer))
    }

    pub fn context(&self) -> &PaymentContext {
        &self.context
    }

    /// Current view of `invoice_id`, if the terminal has seen it.
    pub fn status(&self, invoice_id: &InvoiceId) -> Option<PaymentSnapshot> {
        self.sessions.get(invoice_id).map(|s| s.view.clone())
    }

    /// Correlation id of the unconfirmed transfer for `invoice_id`.
    pub fn pending_transfer(&self, invoice_id: &InvoiceId) -> Option<String> {
        self.sessions
            .get(invoice_id)
            .and_then(|s| s.pending.as_ref().map(|p| p.correlation_id.clone()))
    }

    /// Run one payment attempt for `invoice` to its outcome.
    ///
    /// Attempt outcomes are returned as snapshots: `done`, `error`, `idle`
    /// after a cancelled scan, or `awaiting-callback` flagged indeterminate.
    /// `Err` is reserved for attempts that could not start.
    pub async fn pay(&self, invoice: &Invoice) -> Result<PaymentSnapshot, TerminalError> {
        let (attempt_id, cancel) = self.begin(invoice)?;
        let _in_flight = InFlight {
            sessions: &self.sessions,
            invoice_id: &invoice.id,
        };

        let span = tracing::info_span!("payment", invoice_id = %invoice.id, attempt_id = %attempt_id);
        let result = self.run(invoice, cancel).instrument(span).await;
        match &result {
            Ok(snapshot) => tracing::info!(
                invoice_id = %invoice.id,
                attempt_id = %attempt_id,
                status = %snapshot.status,
                indeterminate = snapshot.indeterminate,
                "payment attempt finished"
            ),
            Err(e) => tracing::error!(
                invoice_id = %invoice.id,
                attempt_id = %attempt_id,
                error = %e,
                "payment attempt aborted"
            ),
        }
        result
    }

    /// Claim the invoice for a new attempt, or refuse.
    fn begin(&self, invoice: &Invoice) -> Result<(Uuid, Arc<Notify>), TerminalError> {
        let id = &invoice.id;
        let mut published = Vec::with_capacity(2);
        let (attempt_id, cancel) = {
            let mut session = self
                .sessions
                .entry(id.clone())
                .or_insert_with(|| Session::new(id.clone()));

            if session.in_flight || session.view.status.is_active() {
                tracing::warn!(invoice_id = %id, status = %session.view.status, "attempt refused, one is running");
                return Err(TerminalError::AttemptInProgress(id.clone()));
            }
            if let Some(pending) = &session.pending {
                tracing::warn!(
                    invoice_id = %id,
                    correlation_id = %pending.correlation_id,
                    "attempt refused, unconfirmed transfer outstanding"
                );
                return Err(TerminalError::UnconfirmedTransferPending {
                    invoice_id: id.clone(),
                    correlation_id: pending.correlation_id.clone(),
                });
            }
            if session.paid {
                return Err(TerminalError::AlreadyPaid(id.clone()));
            }

            if session.view.status.is_terminal() {
                session.view.apply(PaymentEvent::Reset)?;
                published.push(session.view.clone());
            }
            let attempt_id = Uuid::now_v7();
            session.view = PaymentSnapshot::begin(id.clone(), attempt_id)?;
            let cancel = Arc::new(Notify::new());
            session.in_flight = true;
            session.cancel = Some(cancel.clone());
            published.push(session.view.clone());
            (attempt_id, cancel)
        };

        for snapshot in &published {
            self.observer.on_status(snapshot);
        }
        tracing::info!(
            invoice_id = %id,
            attempt_id = %attempt_id,
            amount = invoice.amount,
            currency = %invoice.currency,
            "payment attempt started"
        );
        Ok((attempt_id, cancel))
    }

    async fn run(
        &self,
        invoice: &Invoice,
        cancel: Arc<Notify>,
    ) -> Result<PaymentSnapshot, TerminalError> {
        let id = &invoice.id;

        let scanned = tokio::select! {
            result = self.card.scan(ScanMode::Extended) => Some(result),
            _ = cancel.notified() => None,
        };
        let request = match scanned {
            None => {
                tracing::info!(invoice_id = %id, "scan cancelled");
                return self.update(id, |s| s.view.apply(PaymentEvent::ScanCancelled).map(drop));
            }
            Some(Err(e)) => {
                tracing::warn!(invoice_id = %id, reason = %e.reason, error = %e, "card scan failed");
                return self.fail(id, vec![e.to_string()]);
            }
            Some(Ok(request)) => request,
        };
        self.update(id, |s| s.view.apply(PaymentEvent::CardResponded).map(drop))?;

        let kind = match ProtocolSelector::select(&request) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(invoice_id = %id, tag = %request.tag, "unsupported withdraw protocol");
                return self.fail(id, vec![e.to_string()]);
            }
        };
        tracing::debug!(invoice_id = %id, executor = %kind, "protocol selected");

        match kind {
            ExecutorKind::Regular => self.run_regular(invoice, &request).await,
            ExecutorKind::Internal => self.run_internal(invoice, &request).await,
        }
    }

    async fn run_regular(
        &self,
        invoice: &Invoice,
        request: &WithdrawRequest,
    ) -> Result<PaymentSnapshot, TerminalError> {
        let id = &invoice.id;
        self.update(id, |s| s.view.apply(PaymentEvent::HandshakeSent).map(drop))?;

        match self.regular.execute(request, invoice).await {
            Ok(receipt) => {
                tracing::info!(invoice_id = %id, http_status = receipt.http_status, "withdraw accepted");
                self.settle(id).await
            }
            Err(e) => {
                tracing::warn!(invoice_id = %id, error = %e, "withdraw failed");
                self.fail(id, vec![e.to_string()])
            }
        }
    }

    async fn run_internal(
        &self,
        invoice: &Invoice,
        request: &WithdrawRequest,
    ) -> Result<PaymentSnapshot, TerminalError> {
        let id = &invoice.id;
        let assertion = match self.internal.prepare(request, invoice) {
            Ok(assertion) => assertion,
            Err(e) => {
                tracing::error!(invoice_id = %id, error = %e, "could not build transfer assertion");
                return self.fail(id, vec![e.to_string()]);
            }
        };
        let correlation_id = assertion.correlation_id();

        // Registered before submission: from here on the ledger may apply it.
        self.update(id, |s| {
            s.view.apply(PaymentEvent::HandshakeSent)?;
            s.view.correlation_id = Some(correlation_id.clone());
            s.pending = Some(PendingTransfer {
                correlation_id: correlation_id.clone(),
                attempt: s.view.clone(),
            });
            Ok(())
        })?;

        let window = self.context.policy.window();
        match self
            .internal
            .execute_prepared(&assertion, request, invoice, window)
            .await
        {
            Ok(TransferOutcome { outcome, .. }) => match outcome {
                Outcome::Confirmed => self.resolve(id, &correlation_id, Verdict::Settled).await,
                Outcome::Rejected { reasons } => {
                    self.resolve(id, &correlation_id, Verdict::Rejected(reasons)).await
                }
                Outcome::Indeterminate => self.unresolved(id, &correlation_id, None).await,
            },
            Err(e) => {
                tracing::warn!(
                    invoice_id = %id,
                    correlation_id = %correlation_id,
                    error = %e,
                    "transfer outcome unknown"
                );
                self.unresolved(id, &correlation_id, Some(e.to_string())).await
            }
        }
    }

    /// No verdict came back within the attempt: flag it and fall through to
    /// the automatic rechecks, unless a manual recheck already resolved it.
    async fn unresolved(
        &self,
        invoice_id: &InvoiceId,
        correlation_id: &str,
        note: Option<String>,
    ) -> Result<PaymentSnapshot, TerminalError> {
        match self.inconclusive(invoice_id, correlation_id, note)? {
            Some(_) => self.auto_recheck(invoice_id, correlation_id).await,
            None => {
                tracing::debug!(invoice_id = %invoice_id, correlation_id, "transfer resolved during the attempt");
                self.current(invoice_id)
            }
        }
    }

    /// Scheduled one-shot rechecks after the observation window.
    async fn auto_recheck(
        &self,
        invoice_id: &InvoiceId,
        correlation_id: &str,
    ) -> Result<PaymentSnapshot, TerminalError> {
        for (attempt, delay) in self.context.policy.backoff_schedule().into_iter().enumerate() {
            tokio::time::sleep(delay).await;
            if self.pending_transfer(invoice_id).as_deref() != Some(correlation_id) {
                // Resolved by a manual recheck meanwhile
                return self.current(invoice_id);
            }
            match self.recovery.recheck(correlation_id).await {
                Ok(Some(record)) => {
                    return self.resolve(invoice_id, correlation_id, record.outcome.into()).await;
                }
                Ok(None) => {
                    tracing::debug!(invoice_id = %invoice_id, correlation_id, attempt, "no confirmation yet");
                }
                Err(e) => {
                    tracing::warn!(invoice_id = %invoice_id, correlation_id, error = %e, "automatic recheck failed");
                }
            }
        }
        tracing::warn!(
            invoice_id = %invoice_id,
            correlation_id,
            "confirmation not observed, manual recheck required"
        );
        self.current(invoice_id)
    }

    /// Run one emergency recheck for the invoice's unconfirmed transfer.
    ///
    /// Only reads from the relay set; the transfer is never resubmitted.
    pub async fn recheck(&self, invoice_id: &InvoiceId) -> Result<PaymentSnapshot, TerminalError> {
        let correlation_id = self
            .pending_transfer(invoice_id)
            .ok_or_else(|| TerminalError::NoPendingTransfer(invoice_id.clone()))?;

        match self.recovery.recheck(&correlation_id).await? {
            Some(record) => self.resolve(invoice_id, &correlation_id, record.outcome.into()).await,
            None => self.current(invoice_id),
        }
    }

    /// Re-enter the payment view: restore the unconfirmed attempt and run
    /// one recheck.
    pub async fn resume(&self, invoice_id: &InvoiceId) -> Result<PaymentSnapshot, TerminalError> {
        let snapshot = {
            let mut session = self
                .sessions
                .get_mut(invoice_id)
                .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))?;
            let attempt = session
                .pending
                .as_ref()
                .map(|p| p.attempt.clone())
                .ok_or_else(|| TerminalError::NoPendingTransfer(invoice_id.clone()))?;
            if session.view.attempt_id != attempt.attempt_id {
                session.view = attempt;
            }
            session.view.clone()
        };
        tracing::info!(
            invoice_id = %invoice_id,
            correlation_id = ?snapshot.correlation_id,
            "re-attached to unconfirmed transfer"
        );
        self.observer.on_status(&snapshot);
        self.recheck(invoice_id).await
    }

    /// Leave the payment view. An unconfirmed transfer stays registered.
    pub fn abandon(&self, invoice_id: &InvoiceId) -> Result<PaymentSnapshot, TerminalError> {
        let (snapshot, pending) = {
            let mut session = self
                .sessions
                .get_mut(invoice_id)
                .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))?;
            if session.in_flight {
                return Err(TerminalError::AttemptInProgress(invoice_id.clone()));
            }
            if PaymentStateMachine::can_transition(session.view.status, PaymentEvent::Reset) {
                session.view.apply(PaymentEvent::Reset)?;
            } else {
                session.view = PaymentSnapshot::idle(invoice_id.clone());
            }
            let pending = session.pending.as_ref().map(|p| p.correlation_id.clone());
            (session.view.clone(), pending)
        };
        if let Some(correlation_id) = pending {
            tracing::info!(
                invoice_id = %invoice_id,
                correlation_id = %correlation_id,
                "payment view abandoned with unconfirmed transfer"
            );
        }
        self.observer.on_status(&snapshot);
        Ok(snapshot)
    }

    /// Stop the card reader for the invoice's running scan.
    pub async fn cancel_scan(&self, invoice_id: &InvoiceId) -> Result<(), TerminalError> {
        let cancel = {
            let session = self
                .sessions
                .get(invoice_id)
                .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))?;
            if session.view.status != PaymentStatus::Scanning {
                return Err(TerminalError::NotScanning {
                    invoice_id: invoice_id.clone(),
                    status: session.view.status,
                });
            }
            session.cancel.clone()
        };
        self.card.stop().await;
        if let Some(cancel) = cancel {
            cancel.notify_one();
        }
        Ok(())
    }

    /// Drop the session of an invoice the terminal is done with.
    ///
    /// Refused while an attempt runs or a transfer awaits its verdict. A
    /// forgotten paid invoice is no longer guarded against a second payment,
    /// so release it only once its order is closed.
    pub fn forget(&self, invoice_id: &InvoiceId) -> Result<(), TerminalError> {
        {
            let session = self
                .sessions
                .get(invoice_id)
                .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))?;
            if let Some(pending) = &session.pending {
                return Err(TerminalError::UnconfirmedTransferPending {
                    invoice_id: invoice_id.clone(),
                    correlation_id: pending.correlation_id.clone(),
                });
            }
        }
        let removed = self.sessions.remove_if(invoice_id, |_, s| {
            !s.in_flight && s.pending.is_none() && !s.view.status.is_active()
        });
        if removed.is_none() {
            return Err(TerminalError::AttemptInProgress(invoice_id.clone()));
        }
        tracing::debug!(invoice_id = %invoice_id, "session released");
        Ok(())
    }

    /// Number of invoices with a session.
    pub fn tracked(&self) -> usize {
        self.sessions.len()
    }

    /// Record that the receipt for a paid invoice was printed.
    ///
    /// Returns `false` when it was already recorded.
    pub async fn mark_printed(&self, invoice_id: &InvoiceId) -> Result<bool, TerminalError> {
        {
            let mut session = self
                .sessions
                .get_mut(invoice_id)
                .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))?;
            if !session.paid {
                return Err(TerminalError::NotPaid(invoice_id.clone()));
            }
            if session.printed {
                return Ok(false);
            }
            session.printed = true;
        }

        if let Err(e) = self.orders.set_printed(invoice_id, true).await {
            if let Some(mut session) = self.sessions.get_mut(invoice_id) {
                session.printed = false;
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Apply a ledger verdict once. Later verdicts for the same transfer
    /// find nothing pending and leave the view alone.
    async fn resolve(
        &self,
        invoice_id: &InvoiceId,
        correlation_id: &str,
        verdict: Verdict,
    ) -> Result<PaymentSnapshot, TerminalError> {
        let resolved = {
            let mut session = self
                .sessions
                .get_mut(invoice_id)
                .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))?;
            match session.pending.take() {
                Some(pending) if pending.correlation_id == correlation_id => {
                    if session.view.attempt_id != pending.attempt.attempt_id {
                        session.view = pending.attempt;
                    }
                    let paid = match verdict {
                        Verdict::Settled => {
                            session.view.apply(PaymentEvent::Settled)?;
                            session.paid = true;
                            true
                        }
                        Verdict::Rejected(reasons) => {
                            session.view.fail(reasons)?;
                            false
                        }
                    };
                    Some((session.view.clone(), paid))
                }
                other => {
                    session.pending = other;
                    None
                }
            }
        };

        let Some((snapshot, paid)) = resolved else {
            tracing::debug!(invoice_id = %invoice_id, correlation_id, "transfer already resolved");
            return self.current(invoice_id);
        };
        self.recovery.forget(correlation_id);
        self.observer.on_status(&snapshot);
        if paid {
            tracing::info!(invoice_id = %invoice_id, correlation_id, "transfer confirmed");
        } else {
            tracing::warn!(
                invoice_id = %invoice_id,
                correlation_id,
                reasons = ?snapshot.reasons,
                "transfer rejected"
            );
        }
        self.write_paid(invoice_id, paid).await;
        Ok(snapshot)
    }

    async fn settle(&self, invoice_id: &InvoiceId) -> Result<PaymentSnapshot, TerminalError> {
        let snapshot = self.update(invoice_id, |s| {
            s.view.apply(PaymentEvent::Settled)?;
            s.paid = true;
            Ok(())
        })?;
        self.write_paid(invoice_id, true).await;
        Ok(snapshot)
    }

    /// Money already moved (or provably did not); an order write failure
    /// does not change the attempt outcome.
    async fn write_paid(&self, invoice_id: &InvoiceId, paid: bool) {
        if let Err(e) = self.orders.set_paid(invoice_id, paid).await {
            tracing::error!(invoice_id = %invoice_id, paid, error = %e, "failed to update order");
        }
    }

    fn fail(
        &self,
        invoice_id: &InvoiceId,
        reasons: Vec<String>,
    ) -> Result<PaymentSnapshot, TerminalError> {
        self.update(invoice_id, |s| s.view.fail(reasons).map(drop))
    }

    /// Flag the attempt indeterminate. `None` when `correlation_id` is no
    /// longer pending.
    fn inconclusive(
        &self,
        invoice_id: &InvoiceId,
        correlation_id: &str,
        note: Option<String>,
    ) -> Result<Option<PaymentSnapshot>, TerminalError> {
        let snapshot = {
            let mut session = self
                .sessions
                .get_mut(invoice_id)
                .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))?;
            let s = session.value_mut();
            match s.pending.as_mut() {
                Some(pending) if pending.correlation_id == correlation_id => {
                    s.view.mark_inconclusive(note)?;
                    pending.attempt = s.view.clone();
                }
                _ => return Ok(None),
            }
            s.view.clone()
        };
        self.observer.on_status(&snapshot);
        Ok(Some(snapshot))
    }

    fn current(&self, invoice_id: &InvoiceId) -> Result<PaymentSnapshot, TerminalError> {
        self.status(invoice_id)
            .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))
    }

    /// Mutate a session and publish the resulting view.
    fn update<F>(&self, invoice_id: &InvoiceId, f: F) -> Result<PaymentSnapshot, TerminalError>
    where
        F: FnOnce(&mut Session) -> Result<(), tapcharge_core::CoreError>,
    {
        let snapshot = {
            let mut session = self
                .sessions
                .get_mut(invoice_id)
                .ok_or_else(|| TerminalError::UnknownInvoice(invoice_id.clone()))?;
            f(session.value_mut())?;
            session.view.clone()
        };
        self.observer.on_status(&snapshot);
        Ok(snapshot)
    }
}
