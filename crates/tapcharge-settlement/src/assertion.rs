//! Signed internal transfer assertion.
//!
//! The identifier is the BLAKE3 hash of the canonical payload
//! `[0, author, created_at, kind, tags, content]`, and the signature covers
//! the identifier bytes. Any change to the content, or re-signing at another
//! time, yields a different identifier.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tapcharge_crypto::{content_id, sign, verify, ContentId, KeyPair, PublicKey, Signature};
use tapcharge_relay::LEDGER_EVENT_KIND;

use crate::error::SettlementError;

/// Category tag marking the start of an internal transfer.
pub const TRANSFER_START_TAG: &str = "internal-transaction-start";

/// A signed request to move `amount` ledger units to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAssertion {
    pub id: ContentId,
    #[serde(rename = "pubkey")]
    pub author: PublicKey,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    #[serde(rename = "sig")]
    pub signature: Signature,
}

#[derive(Serialize, Deserialize)]
struct TransferContent {
    tokens: TokenAmounts,
}

#[derive(Serialize, Deserialize)]
struct TokenAmounts {
    #[serde(rename = "BTC")]
    btc: u64,
}

impl TransferAssertion {
    /// Build and sign a new assertion.
    pub fn build(
        amount: u64,
        destination: &str,
        k1: &str,
        relays: &[String],
        signer: &KeyPair,
    ) -> Result<Self, SettlementError> {
        if amount == 0 {
            return Err(SettlementError::InvalidAssertion("zero amount".into()));
        }
        if destination.is_empty() {
            return Err(SettlementError::InvalidAssertion("empty destination".into()));
        }

        let author = signer.public_key();
        let created_at = Utc::now().timestamp_millis();
        let mut tags = vec![
            vec!["p".to_string(), destination.to_string()],
            vec!["t".to_string(), TRANSFER_START_TAG.to_string()],
            vec!["k1".to_string(), k1.to_string()],
        ];
        if !relays.is_empty() {
            let mut relay_tag = vec!["relays".to_string()];
            relay_tag.extend(relays.iter().cloned());
            tags.push(relay_tag);
        }
        let content = serde_json::to_string(&TransferContent {
            tokens: TokenAmounts { btc: amount },
        })?;

        let id = content_id(&Self::canonical(&author, created_at, LEDGER_EVENT_KIND, &tags, &content)?);
        let signature = sign(id.as_bytes(), signer);

        Ok(Self {
            id,
            author,
            created_at,
            kind: LEDGER_EVENT_KIND,
            tags,
            content,
            signature,
        })
    }

    fn canonical(
        author: &PublicKey,
        created_at: i64,
        kind: u16,
        tags: &[Vec<String>],
        content: &str,
    ) -> Result<Vec<u8>, SettlementError> {
        Ok(serde_json::to_vec(&(
            0u8,
            author.to_hex(),
            created_at,
            kind,
            tags,
            content,
        ))?)
    }

    /// Check that the identifier matches the content and the signature
    /// matches the identifier.
    pub fn verify(&self) -> Result<(), SettlementError> {
        let expected = content_id(&Self::canonical(
            &self.author,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?);
        if expected != self.id {
            return Err(SettlementError::InvalidAssertion(
                "identifier does not match content".into(),
            ));
        }
        verify(self.id.as_bytes(), &self.signature, &self.author)
            .map_err(|e| SettlementError::InvalidAssertion(e.to_string()))
    }

    /// Identifier used to correlate the ledger's confirmation record.
    pub fn correlation_id(&self) -> String {
        self.id.to_hex()
    }

    /// Transferred amount in ledger units.
    pub fn amount(&self) -> Result<u64, SettlementError> {
        let content: TransferContent = serde_json::from_str(&self.content)?;
        Ok(content.tokens.btc)
    }

    pub fn destination(&self) -> Option<&str> {
        self.tag("p")
    }

    pub fn k1(&self) -> Option<&str> {
        self.tag("k1")
    }

    fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, SettlementError> {
        Ok(serde_json::to_value(self)?)
    }
}
