use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::Type;
use uuid::Uuid;

use crate::ledger::models::SettlementOperation;

/// Payment lifecycle status.
///
/// Normal path is `Pending -> Verified`; `Failed` and `Reversed` are later
/// corrections and terminal. Leaving `Verified` is the one transition that
/// forces reconciliation of the resource aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Verified,
    Failed,
    Reversed,
}

impl PaymentStatus {
    pub fn can_transition(self, to: PaymentStatus) -> bool {
        matches!(
            (self, to),
            (PaymentStatus::Pending, PaymentStatus::Verified)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Verified, PaymentStatus::Failed)
                | (PaymentStatus::Verified, PaymentStatus::Reversed)
        )
    }

    /// True when a transition into `to` removes this payment from the
    /// verified set and the resource aggregate must be reconciled.
    pub fn leaves_verified_set(self, to: PaymentStatus) -> bool {
        self == PaymentStatus::Verified
            && matches!(to, PaymentStatus::Failed | PaymentStatus::Reversed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "asset_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Native,
    Issued,
}

/// The internal record of one admitted settlement.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    /// External settlement reference; exactly one payment ever exists per
    /// reference (unique at the storage layer).
    pub settlement_ref: String,

    /// Payer reference resolved once at admission; stays `None` when the
    /// payer principal could not be resolved (removed account).
    pub payer_id: Option<Uuid>,
    pub payer_wallet: Option<String>,
    pub payee_wallet: String,

    pub amount: Decimal,
    pub asset_code: String,
    pub asset_issuer: Option<String>,
    pub asset_kind: AssetKind,

    pub resource_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub message: Option<String>,

    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn payer_wallet_display(&self) -> &str {
        self.payer_wallet.as_deref().unwrap_or("anonymous")
    }

    /// Build a verified payment from the matched settlement operation.
    pub fn from_settlement_operation(
        request: &AdmitPayment,
        op: &SettlementOperation,
        payer: Option<&crate::principals::Principal>,
        settled_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        let asset_kind = if op.is_native() {
            AssetKind::Native
        } else {
            AssetKind::Issued
        };

        Self {
            id: Uuid::new_v4(),
            settlement_ref: request.settlement_ref.clone(),
            payer_id: payer.map(|p| p.id),
            payer_wallet: payer.and_then(|p| p.wallet_address.clone()),
            payee_wallet: op.destination.clone(),
            amount: op.amount,
            asset_code: op.asset_code.clone(),
            asset_issuer: op.asset_issuer.clone(),
            asset_kind,
            resource_id: request.resource_id,
            recipient_id: request.recipient_id,
            message: request.message.clone(),
            status: PaymentStatus::Verified,
            created_at: now,
            settled_at,
            verified_at: Some(now),
        }
    }
}

/// Input to the admission operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AdmitPayment {
    pub payer_id: Uuid,
    pub recipient_id: Uuid,
    pub resource_id: Option<Uuid>,
    pub settlement_ref: String,
    pub message: Option<String>,
}

/// Denormalized running total stored alongside the resource it summarizes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResourceAggregate {
    pub resource_id: Uuid,
    pub cached_total: Decimal,
    pub last_recalculated_at: Option<DateTime<Utc>>,
}

/// Aggregate statistics over a recipient's verified payments.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStats {
    pub payment_count: i64,
    pub total_amount: Decimal,
    pub average_amount: Decimal,
}
