use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An externally-finalized settlement as reported by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub settlement_ref: String,
    pub successful: bool,
    pub settled_at: DateTime<Utc>,
    pub operations: Vec<SettlementOperation>,
}

/// One operation contained in a settlement.
///
/// Only `Transfer` operations can pay a recipient; everything else the
/// ledger may report (account management, trustlines, ...) is `Other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementOperation {
    pub kind: OperationKind,
    pub destination: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub asset_code: String,
    pub asset_issuer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Transfer,
    Other,
}

impl Settlement {
    /// First transfer operation whose destination is the given wallet.
    pub fn transfer_to(&self, wallet: &str) -> Option<&SettlementOperation> {
        self.operations
            .iter()
            .find(|op| op.kind == OperationKind::Transfer && op.destination == wallet)
    }
}

impl SettlementOperation {
    pub fn is_native(&self) -> bool {
        self.asset_issuer.is_none()
    }
}
