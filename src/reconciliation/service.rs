use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::payments::store::{AggregateStore, PaymentStore};

/// Margin for decimal precision drift between differently-scaled columns
/// (payments are stored at scale 7, cached totals at scale 2).
pub const RECONCILIATION_TOLERANCE: Decimal = dec!(0.01);

/// Produced by a read-only reconciliation pass for every resource whose
/// cached total drifts beyond tolerance. Not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DiscrepancyReport {
    pub resource_id: Uuid,
    /// Sum over verified payments - what the cache should hold.
    pub expected_total: Decimal,
    /// What the cache currently holds.
    pub actual_total: Decimal,
    pub difference: Decimal,
}

/// Recomputes cached per-resource totals from the authoritative set of
/// verified payments and corrects drift beyond tolerance.
pub struct ReconciliationService {
    payments: Arc<dyn PaymentStore>,
    aggregates: Arc<dyn AggregateStore>,
}

impl ReconciliationService {
    pub fn new(payments: Arc<dyn PaymentStore>, aggregates: Arc<dyn AggregateStore>) -> Self {
        Self {
            payments,
            aggregates,
        }
    }

    /// Recalculates the cached total for a single resource.
    ///
    /// Idempotent and safe to run concurrently with admissions on the same
    /// resource: the write is last-writer-wins and a stale overwrite is
    /// corrected by the next pass.
    pub async fn reconcile_one(&self, resource_id: Uuid) -> AppResult<()> {
        let Some(aggregate) = self.aggregates.get(resource_id).await? else {
            return Ok(());
        };

        let actual_total = self.payments.verified_total(resource_id).await?;
        let now = Utc::now();

        if (actual_total - aggregate.cached_total).abs() > RECONCILIATION_TOLERANCE {
            warn!(
                %resource_id,
                cached = %aggregate.cached_total,
                actual = %actual_total,
                "aggregate discrepancy found, correcting"
            );
            self.aggregates
                .put_total(resource_id, actual_total, now)
                .await?;
        } else {
            self.aggregates.touch(resource_id, now).await?;
        }

        Ok(())
    }

    /// Full sweep over every resource owning an aggregate cache. An error on
    /// one resource is logged and does not abort the sweep.
    pub async fn reconcile_all(&self) -> AppResult<()> {
        info!("starting aggregate reconciliation sweep");
        let resource_ids = self.aggregates.resource_ids().await?;
        let total = resource_ids.len();

        for resource_id in resource_ids {
            if let Err(e) = self.reconcile_one(resource_id).await {
                error!(%resource_id, error = %e, "reconciliation failed, skipping until next pass");
            }
        }

        info!(resources = total, "aggregate reconciliation sweep completed");
        Ok(())
    }

    /// Read-only variant of the sweep: reports drift without correcting it.
    pub async fn find_discrepancies(&self) -> AppResult<Vec<DiscrepancyReport>> {
        let mut discrepancies = Vec::new();

        for resource_id in self.aggregates.resource_ids().await? {
            let Some(aggregate) = self.aggregates.get(resource_id).await? else {
                continue;
            };
            let expected_total = self.payments.verified_total(resource_id).await?;
            let difference = (expected_total - aggregate.cached_total).abs();

            if difference > RECONCILIATION_TOLERANCE {
                discrepancies.push(DiscrepancyReport {
                    resource_id,
                    expected_total,
                    actual_total: aggregate.cached_total,
                    difference,
                });
            }
        }

        Ok(discrepancies)
    }
}
