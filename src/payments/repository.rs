use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppResult, PaymentError};
use crate::payments::models::{Payment, PaymentStats, PaymentStatus, ResourceAggregate};
use crate::payments::store::{AggregateStore, PaymentStore};

const PAYMENT_COLUMNS: &str = "id, settlement_ref, payer_id, payer_wallet, payee_wallet, \
     amount, asset_code, asset_issuer, asset_kind, resource_id, recipient_id, message, \
     status, created_at, settled_at, verified_at";

/// Postgres-backed payment store. The `settlement_ref` uniqueness that
/// closes the concurrent-admission race lives in the table's unique index,
/// not here.
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentRepository {
    async fn insert(&self, payment: Payment) -> AppResult<Payment> {
        let result = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (
                id, settlement_ref, payer_id, payer_wallet, payee_wallet,
                amount, asset_code, asset_issuer, asset_kind, resource_id,
                recipient_id, message, status, created_at, settled_at, verified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment.id)
        .bind(&payment.settlement_ref)
        .bind(payment.payer_id)
        .bind(&payment.payer_wallet)
        .bind(&payment.payee_wallet)
        .bind(payment.amount)
        .bind(&payment.asset_code)
        .bind(&payment.asset_issuer)
        .bind(payment.asset_kind)
        .bind(payment.resource_id)
        .bind(payment.recipient_id)
        .bind(&payment.message)
        .bind(payment.status)
        .bind(payment.created_at)
        .bind(payment.settled_at)
        .bind(payment.verified_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(payment) => Ok(payment),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(PaymentError::DuplicateSettlement.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn find_by_settlement_ref(&self, settlement_ref: &str) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE settlement_ref = $1"
        ))
        .bind(settlement_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn set_status(&self, id: Uuid, status: PaymentStatus) -> AppResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = $2,
                verified_at = CASE
                    WHEN $2 = 'verified'::payment_status THEN COALESCE(verified_at, NOW())
                    ELSE verified_at
                END
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn verified_total(&self, resource_id: Uuid) -> AppResult<Decimal> {
        let total = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM payments
            WHERE resource_id = $1 AND status = $2
            "#,
        )
        .bind(resource_id)
        .bind(PaymentStatus::Verified)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE recipient_id = $1
              AND ($2::payment_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(recipient_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    async fn list_by_payer(
        &self,
        payer_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE payer_id = $1
              AND ($2::payment_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(payer_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    async fn stats_for_recipient(&self, recipient_id: Uuid) -> AppResult<PaymentStats> {
        let (payment_count, total_amount, average_amount) =
            sqlx::query_as::<_, (i64, Decimal, Decimal)>(
                r#"
                SELECT COUNT(*), COALESCE(SUM(amount), 0), COALESCE(AVG(amount), 0)
                FROM payments
                WHERE recipient_id = $1 AND status = $2
                "#,
            )
            .bind(recipient_id)
            .bind(PaymentStatus::Verified)
            .fetch_one(&self.pool)
            .await?;

        Ok(PaymentStats {
            payment_count,
            total_amount,
            average_amount,
        })
    }
}

#[async_trait]
impl AggregateStore for PgPaymentRepository {
    async fn resource_ids(&self) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT resource_id FROM resource_aggregates")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn get(&self, resource_id: Uuid) -> AppResult<Option<ResourceAggregate>> {
        let aggregate = sqlx::query_as::<_, ResourceAggregate>(
            r#"
            SELECT resource_id, cached_total, last_recalculated_at
            FROM resource_aggregates
            WHERE resource_id = $1
            "#,
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(aggregate)
    }

    async fn put_total(
        &self,
        resource_id: Uuid,
        total: Decimal,
        recalculated_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE resource_aggregates
            SET cached_total = $2, last_recalculated_at = $3
            WHERE resource_id = $1
            "#,
        )
        .bind(resource_id)
        .bind(total)
        .bind(recalculated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch(&self, resource_id: Uuid, recalculated_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            "UPDATE resource_aggregates SET last_recalculated_at = $2 WHERE resource_id = $1",
        )
        .bind(resource_id)
        .bind(recalculated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn register_resource(&self, resource_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO resource_aggregates (resource_id, cached_total)
            VALUES ($1, 0)
            ON CONFLICT (resource_id) DO NOTHING
            "#,
        )
        .bind(resource_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
