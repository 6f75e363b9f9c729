use serde::{Deserialize, Serialize};

use crate::event::{ConfirmationCategory, RelayEvent, LEDGER_EVENT_KIND};

/// Relay query filter. Empty lists place no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,
    /// Trusted author public keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Referenced event ids (`e` tags).
    #[serde(rename = "#e", default, skip_serializing_if = "Vec::is_empty")]
    pub correlation_ids: Vec<String>,
    /// Category tags (`t` tags).
    #[serde(rename = "#t", default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl RelayFilter {
    /// Filter for the ledger's verdict on one assertion.
    pub fn confirmation(
        correlation_id: &str,
        ledger_identity: &str,
        expected: &[ConfirmationCategory],
    ) -> Self {
        Self {
            kinds: vec![LEDGER_EVENT_KIND],
            authors: vec![ledger_identity.to_string()],
            correlation_ids: vec![correlation_id.to_string()],
            categories: expected.iter().map(|c| c.as_tag().to_string()).collect(),
        }
    }

    /// Whether `event` satisfies every constraint of this filter.
    pub fn matches(&self, event: &RelayEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.author) {
            return false;
        }
        if !Self::tag_matches(event, "e", &self.correlation_ids) {
            return false;
        }
        Self::tag_matches(event, "t", &self.categories)
    }

    fn tag_matches(event: &RelayEvent, name: &str, wanted: &[String]) -> bool {
        wanted.is_empty()
            || event.tags.iter().any(|t| {
                t.first().map(String::as_str) == Some(name)
                    && t.get(1).is_some_and(|v| wanted.contains(v))
            })
    }
}
