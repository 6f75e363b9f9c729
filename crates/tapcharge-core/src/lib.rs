pub mod error;
pub mod types;
pub mod state_machine;
pub mod config;

pub use config::ConfirmationPolicy;
pub use error::CoreError;
pub use state_machine::{PaymentEvent, PaymentSnapshot, PaymentStateMachine, PaymentStatus};
pub use types::{
    CardHandle, Invoice, InvoiceId, LineItem, ProtocolTag, Receipt, ScanErrorReason, ScanMode,
    WithdrawRequest, MSATS_PER_SAT,
};
