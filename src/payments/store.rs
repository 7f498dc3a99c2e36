use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use crate::payments::models::{Payment, PaymentStats, PaymentStatus, ResourceAggregate};

/// Persistence boundary for payments.
///
/// `insert` is insert-if-absent on `settlement_ref`: implementations must
/// enforce uniqueness in storage (constraint, not check-then-insert) and
/// surface a violation as `PaymentError::DuplicateSettlement`, closing the
/// race between two concurrent admissions for the same settlement.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> AppResult<Payment>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Payment>>;

    async fn find_by_settlement_ref(&self, settlement_ref: &str) -> AppResult<Option<Payment>>;

    /// Applies the status and stamps `verified_at` when entering `Verified`.
    /// Transition validity is the service's concern.
    async fn set_status(&self, id: Uuid, status: PaymentStatus) -> AppResult<Payment>;

    /// Decimal-exact `SUM(amount)` over verified payments for the resource;
    /// zero when there are none.
    async fn verified_total(&self, resource_id: Uuid) -> AppResult<Decimal>;

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>>;

    async fn list_by_payer(
        &self,
        payer_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>>;

    async fn stats_for_recipient(&self, recipient_id: Uuid) -> AppResult<PaymentStats>;
}

/// Persistence boundary for the denormalized per-resource totals.
///
/// Writes are last-writer-wins by design: reconciliation tolerates a stale
/// overwrite because the next pass corrects it.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Every resource that owns an aggregate cache.
    async fn resource_ids(&self) -> AppResult<Vec<Uuid>>;

    async fn get(&self, resource_id: Uuid) -> AppResult<Option<ResourceAggregate>>;

    /// Overwrite the cached total and stamp the recalculation time.
    async fn put_total(
        &self,
        resource_id: Uuid,
        total: Decimal,
        recalculated_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Stamp the recalculation time without touching the total (records
    /// that a check was performed even when no correction was needed).
    async fn touch(&self, resource_id: Uuid, recalculated_at: DateTime<Utc>) -> AppResult<()>;

    /// Register a resource with a zeroed aggregate; no-op when present.
    async fn register_resource(&self, resource_id: Uuid) -> AppResult<()>;
}
