//! Relay error types.

/// Errors raised while querying or subscribing to relays.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No relay could be reached.
    #[error("relay unreachable: {0}")]
    Unreachable(String),

    /// An event did not carry the tags a confirmation record needs.
    #[error("malformed event {event_id}: {reason}")]
    MalformedEvent { event_id: String, reason: String },

    /// Serialization / deserialization error.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
