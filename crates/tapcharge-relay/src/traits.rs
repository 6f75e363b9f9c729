use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RelayError;
use crate::event::RelayEvent;
use crate::filter::RelayFilter;

/// Live stream of events matching a subscription filter.
pub type EventStream = BoxStream<'static, RelayEvent>;

/// Relay connection interface.
///
/// Implementations bridge to a concrete relay set. The handle is shared
/// process-wide by every payment attempt, so implementations must tolerate
/// concurrent use.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Return the stored events matching `filter`, in the order the relay
    /// delivered them.
    async fn fetch_events(&self, filter: &RelayFilter) -> Result<Vec<RelayEvent>, RelayError>;

    /// Open a subscription delivering events matching `filter` as they arrive.
    async fn subscribe(&self, filter: &RelayFilter) -> Result<EventStream, RelayError>;
}
