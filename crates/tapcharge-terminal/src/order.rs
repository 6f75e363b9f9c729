use async_trait::async_trait;
use tapcharge_core::InvoiceId;

use crate::error::TerminalError;

/// Order collaborator that owns invoices and their paid/printed flags.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn set_paid(&self, invoice: &InvoiceId, paid: bool) -> Result<(), TerminalError>;

    async fn set_printed(&self, invoice: &InvoiceId, printed: bool) -> Result<(), TerminalError>;
}
