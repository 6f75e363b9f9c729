use tapcharge_core::{CoreError, InvoiceId, PaymentStatus};
use tapcharge_crypto::CryptoError;
use tapcharge_relay::RelayError;
use tapcharge_settlement::SettlementError;

/// Terminal-level errors.
///
/// Attempt outcomes (`error`, indeterminate) are reported through
/// [`tapcharge_core::PaymentSnapshot`], not through this type.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("a payment attempt is already running for invoice {0}")]
    AttemptInProgress(InvoiceId),

    #[error("invoice {invoice_id} has an unconfirmed transfer {correlation_id}; recheck it first")]
    UnconfirmedTransferPending {
        invoice_id: InvoiceId,
        correlation_id: String,
    },

    #[error("invoice {0} is already paid")]
    AlreadyPaid(InvoiceId),

    #[error("invoice {0} is not paid")]
    NotPaid(InvoiceId),

    #[error("no scan to cancel for invoice {invoice_id} (status {status})")]
    NotScanning {
        invoice_id: InvoiceId,
        status: PaymentStatus,
    },

    #[error("no unconfirmed transfer for invoice {0}")]
    NoPendingTransfer(InvoiceId),

    #[error("unknown invoice {0}")]
    UnknownInvoice(InvoiceId),

    #[error("order collaborator error: {0}")]
    Order(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("logging initialization failed: {0}")]
    Logging(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to write configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}
