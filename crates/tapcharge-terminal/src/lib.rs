//! Tapcharge terminal
//!
//! Drives a point-of-sale payment from card scan to a confirmed settlement
//! and publishes one consistent status per invoice.

pub mod error;
pub mod config;
pub mod logging;
pub mod context;
pub mod notifier;
pub mod order;
pub mod orchestrator;

pub use config::{HttpConfig, IdentityConfig, LoggingConfig, RelayConfig, TerminalConfig};
pub use context::PaymentContext;
pub use error::TerminalError;
pub use logging::init_logging;
pub use notifier::{BroadcastObserver, StatusObserver};
pub use orchestrator::PaymentOrchestrator;
pub use order::OrderSink;
