use std::fmt;

use tapcharge_core::{ProtocolTag, WithdrawRequest};

use crate::error::SettlementError;

/// Which executor settles a withdraw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// LNURL-withdraw callback.
    Regular,
    /// Signed internal ledger transfer.
    Internal,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Routes a withdraw request to its executor by protocol tag.
pub struct ProtocolSelector;

impl ProtocolSelector {
    /// Unrecognized tags are fatal; there is no default executor.
    pub fn select(request: &WithdrawRequest) -> Result<ExecutorKind, SettlementError> {
        match request.protocol() {
            Some(ProtocolTag::Regular) => Ok(ExecutorKind::Regular),
            Some(ProtocolTag::Extended) => Ok(ExecutorKind::Internal),
            None => Err(SettlementError::UnsupportedProtocol(request.tag.clone())),
        }
    }
}
