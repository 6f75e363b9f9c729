//! Relay event model and the confirmation records derived from it.
//!
//! The ledger publishes one event per processed transfer assertion. The
//! event references the assertion through an `e` tag and states the outcome
//! through a `t` (category) tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RelayError;

/// Event kind used by the ledger for internal transactions.
pub const LEDGER_EVENT_KIND: u16 = 1112;

/// Reason recorded when an error event carries no readable message list.
pub const UNREADABLE_ERROR_REASON: &str = "could not read confirmation event";

/// A raw event as stored and forwarded by a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Event identifier.
    pub id: String,
    /// Hex public key of the author.
    #[serde(rename = "pubkey")]
    pub author: String,
    pub kind: u16,
    /// Tags as `[name, value, ...]` lists.
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

impl RelayEvent {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// Whether any `e` tag of the event references `event_id`.
    pub fn references(&self, event_id: &str) -> bool {
        self.tags.iter().any(|t| {
            t.first().map(String::as_str) == Some("e")
                && t.get(1).map(String::as_str) == Some(event_id)
        })
    }

    /// Build a ledger confirmation event.
    pub fn confirmation(
        author: impl Into<String>,
        correlation_id: impl Into<String>,
        category: ConfirmationCategory,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().simple().to_string(),
            author: author.into(),
            kind: LEDGER_EVENT_KIND,
            tags: vec![
                vec!["e".into(), correlation_id.into()],
                vec!["t".into(), category.as_tag().into()],
            ],
            content: content.into(),
            created_at: Utc::now().timestamp(),
        }
    }
}

/// Category tags the ledger uses for terminal transfer outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationCategory {
    Ok,
    Error,
}

impl ConfirmationCategory {
    pub const OK_TAG: &'static str = "internal-transaction-ok";
    pub const ERROR_TAG: &'static str = "internal-transaction-error";

    /// Both terminal categories.
    pub const ALL: [ConfirmationCategory; 2] = [Self::Ok, Self::Error];

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Ok => Self::OK_TAG,
            Self::Error => Self::ERROR_TAG,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            Self::OK_TAG => Some(Self::Ok),
            Self::ERROR_TAG => Some(Self::Error),
            _ => None,
        }
    }
}

/// Outcome carried by a confirmation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationOutcome {
    Ok,
    Error { reasons: Vec<String> },
}

/// Ledger verdict on one transfer assertion, observed through a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    /// Assertion identifier this record answers.
    pub correlation_id: String,
    pub outcome: ConfirmationOutcome,
    /// Relay event the record was read from.
    pub event_id: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ErrorContent {
    messages: Vec<String>,
}

impl ConfirmationRecord {
    /// Interpret a relay event as the verdict on `correlation_id`.
    ///
    /// The event may reference several ids; it only answers for ids it
    /// carries an `e` tag for.
    pub fn from_event(event: &RelayEvent, correlation_id: &str) -> Result<Self, RelayError> {
        let malformed = |reason: &str| RelayError::MalformedEvent {
            event_id: event.id.clone(),
            reason: reason.to_string(),
        };

        if !event.references(correlation_id) {
            return Err(malformed("no e tag for the queried assertion"));
        }
        let category = event
            .tag_value("t")
            .and_then(ConfirmationCategory::from_tag)
            .ok_or_else(|| malformed("missing or unknown category tag"))?;

        let outcome = match category {
            ConfirmationCategory::Ok => ConfirmationOutcome::Ok,
            ConfirmationCategory::Error => {
                let reasons = serde_json::from_str::<ErrorContent>(&event.content)
                    .ok()
                    .map(|c| c.messages)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| vec![UNREADABLE_ERROR_REASON.to_string()]);
                ConfirmationOutcome::Error { reasons }
            }
        };

        Ok(Self {
            correlation_id: correlation_id.to_string(),
            outcome,
            event_id: event.id.clone(),
            observed_at: Utc::now(),
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ConfirmationOutcome::Ok)
    }
}

impl fmt::Display for ConfirmationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ConfirmationOutcome::Ok => write!(f, "{}: ok", self.correlation_id),
            ConfirmationOutcome::Error { reasons } => {
                write!(f, "{}: error ({})", self.correlation_id, reasons.join("; "))
            }
        }
    }
}
