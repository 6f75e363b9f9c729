//! Tapcharge settlement layer
//!
//! Executes the two settlement protocols a card can request: the external
//! LNURL-withdraw callback and the internal ledger transfer confirmed
//! through the relay set.

pub mod error;
pub mod traits;
pub mod selector;
pub mod assertion;
pub mod http;
pub mod adapters;

pub use adapters::internal::{InternalTransferExecutor, Outcome, TransferOutcome, INSUFFICIENT_BALANCE};
pub use adapters::regular::RegularWithdrawExecutor;
pub use assertion::TransferAssertion;
pub use error::{ScanError, SettlementError};
pub use http::HttpCallbackChannel;
pub use selector::{ExecutorKind, ProtocolSelector};
pub use traits::{CallbackChannel, CallbackResponse, CardClient, CardInfo, LnurlStatus};
