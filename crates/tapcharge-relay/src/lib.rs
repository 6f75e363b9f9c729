//! Tapcharge relay layer
//!
//! Looks up the ledger's out-of-band confirmation records for submitted
//! transfer assertions. The relay transport itself sits behind
//! [`RelayClient`]; [`InMemoryRelay`] is the in-process implementation.

pub mod error;
pub mod event;
pub mod filter;
pub mod traits;
pub mod subscriber;
pub mod recovery;
pub mod memory;

pub use error::RelayError;
pub use event::{ConfirmationCategory, ConfirmationOutcome, ConfirmationRecord, RelayEvent, LEDGER_EVENT_KIND};
pub use filter::RelayFilter;
pub use memory::InMemoryRelay;
pub use recovery::EmergencyRecovery;
pub use subscriber::EventConfirmationSubscriber;
pub use traits::{EventStream, RelayClient};
