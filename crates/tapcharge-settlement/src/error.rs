use tapcharge_core::ScanErrorReason;
use tapcharge_relay::RelayError;

/// Card reader failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("card scan failed ({reason}): {detail}")]
pub struct ScanError {
    pub reason: ScanErrorReason,
    pub detail: String,
}

impl ScanError {
    pub fn new(reason: ScanErrorReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Settlement-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("unsupported withdraw protocol: {0:?}")]
    UnsupportedProtocol(String),

    #[error("callback rejected (HTTP {http_status}): {reason}")]
    CallbackRejected { http_status: u16, reason: String },

    #[error("callback transport error: {0}")]
    Transport(String),

    /// Posting a transfer assertion failed. The ledger may still have
    /// applied it, so the outcome is unknown rather than failed.
    #[error("transfer submission failed for {correlation_id}: {reason}")]
    Submission {
        correlation_id: String,
        reason: String,
    },

    #[error("card collaborator error: {0}")]
    Card(String),

    #[error("invalid transfer assertion: {0}")]
    InvalidAssertion(String),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
