use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tapcharge_core::{CardHandle, ScanMode, WithdrawRequest};

use crate::error::{ScanError, SettlementError};

/// Card reader and card service interface.
#[async_trait]
pub trait CardClient: Send + Sync {
    /// Read a card and resolve its withdraw request. Single shot, no retries.
    async fn scan(&self, mode: ScanMode) -> Result<WithdrawRequest, ScanError>;

    /// Cancel any in-flight scan. No further results are delivered for it.
    async fn stop(&self);

    /// Read the card's holder information, if the card service exposes it.
    async fn card_info(&self, card: &CardHandle) -> Result<Option<CardInfo>, SettlementError>;

    /// Current settleable funds of `identity`, in ledger units.
    async fn balance(&self, identity: &str) -> Result<u64, SettlementError>;
}

/// Holder information returned by the card's info action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    /// Ledger identity (public key) of the card holder.
    pub holder: String,
}

/// Application-level LNURL status body: `{"status": "OK"}` or
/// `{"status": "ERROR", "reason": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LnurlStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LnurlStatus {
    pub fn ok() -> Self {
        Self {
            status: "OK".into(),
            reason: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: "ERROR".into(),
            reason: Some(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

/// What came back from a callback round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    pub http_status: u16,
    /// Parsed body, `None` when it was not an LNURL status object.
    pub body: Option<LnurlStatus>,
}

impl CallbackResponse {
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.http_status)
    }
}

/// HTTP callback channel towards withdraw services and the ledger.
#[async_trait]
pub trait CallbackChannel: Send + Sync {
    /// GET `url` with the given query parameters.
    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<CallbackResponse, SettlementError>;

    /// POST `body` as JSON to `url`.
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<CallbackResponse, SettlementError>;
}
