use crate::state_machine::{PaymentEvent, PaymentStatus};

/// Core errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid status transition from {from} on {event:?}")]
    InvalidStateTransition {
        from: PaymentStatus,
        event: PaymentEvent,
    },

    #[error("invoice validation failed: {0}")]
    InvalidInvoice(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
