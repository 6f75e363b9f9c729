use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Millisatoshis per satoshi. The internal ledger accounts in millisatoshis.
pub const MSATS_PER_SAT: u64 = 1000;

/// Identifier of an invoice issued by the order collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub String);

impl InvoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single product line on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    /// Unit price in the invoice currency's minor unit.
    pub price: u64,
    pub qty: u32,
}

/// A pending invoice. Immutable once issued; the core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Amount in satoshis.
    pub amount: u64,
    /// Display currency code (e.g. "MXN", "SAT").
    pub currency: String,
    pub items: Vec<LineItem>,
    /// BOLT11 payment request handed to LNURL-withdraw services.
    pub payment_request: String,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Create an invoice, rejecting zero amounts and empty payment requests.
    pub fn new(
        id: InvoiceId,
        amount: u64,
        currency: impl Into<String>,
        items: Vec<LineItem>,
        payment_request: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let payment_request = payment_request.into();
        if amount == 0 {
            return Err(CoreError::InvalidAmount(
                "invoice amount must be greater than zero".into(),
            ));
        }
        if payment_request.is_empty() {
            return Err(CoreError::MissingField("payment_request".into()));
        }
        if id.0.is_empty() {
            return Err(CoreError::InvalidInvoice("empty invoice id".into()));
        }
        Ok(Self {
            id,
            amount,
            currency: currency.into(),
            items,
            payment_request,
            created_at: Utc::now(),
        })
    }

    /// Amount expressed in the ledger's smallest unit (millisatoshis).
    pub fn ledger_amount(&self) -> u64 {
        self.amount.saturating_mul(MSATS_PER_SAT)
    }
}

/// Opaque handle identifying the card that produced a withdraw request.
///
/// For NFC cards this is the LNURL the card emitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardHandle(pub String);

impl fmt::Display for CardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the card reader should interrogate the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Plain LNURL-withdraw read.
    Default,
    /// Read that allows the card service to answer with the extended tag.
    Extended,
}

/// Why a card scan failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanErrorReason {
    Denied,
    Timeout,
    Io,
}

impl fmt::Display for ScanErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied => write!(f, "denied"),
            Self::Timeout => write!(f, "timeout"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// Recognized withdraw protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolTag {
    /// Standard LNURL-withdraw.
    Regular,
    /// Internal ledger transfer authorized by the card.
    Extended,
}

impl ProtocolTag {
    pub const REGULAR_WIRE: &'static str = "withdrawRequest";
    pub const EXTENDED_WIRE: &'static str = "laWallet:withdrawRequest";

    /// Parse the `tag` field of an LNURL response.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            Self::REGULAR_WIRE => Some(Self::Regular),
            Self::EXTENDED_WIRE => Some(Self::Extended),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Regular => Self::REGULAR_WIRE,
            Self::Extended => Self::EXTENDED_WIRE,
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Extended => write!(f, "extended"),
        }
    }
}

/// Withdraw-request descriptor returned by a card scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Callback URL of the withdraw service.
    pub callback: String,
    /// Challenge token.
    pub k1: String,
    /// Raw protocol tag as sent by the card service.
    pub tag: String,
    /// Card that produced this request.
    pub card: CardHandle,
}

impl WithdrawRequest {
    pub fn new(
        callback: impl Into<String>,
        k1: impl Into<String>,
        tag: impl Into<String>,
        card: CardHandle,
    ) -> Self {
        Self {
            callback: callback.into(),
            k1: k1.into(),
            tag: tag.into(),
            card,
        }
    }

    /// The recognized protocol, if any.
    pub fn protocol(&self) -> Option<ProtocolTag> {
        ProtocolTag::from_wire(&self.tag)
    }
}

/// Proof that a regular LNURL-withdraw callback accepted the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub callback: String,
    pub http_status: u16,
    pub completed_at: DateTime<Utc>,
}
