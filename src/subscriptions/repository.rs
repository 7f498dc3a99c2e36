use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppResult, PaymentError, SubscriptionError};
use crate::subscriptions::models::{
    Subscription, SubscriptionRevenueEntry, SubscriptionStatus, SubscriptionTier,
};
use crate::subscriptions::store::{SubscriptionStore, TierLease};

const TIER_COLUMNS: &str = "id, provider_id, name, price_native, price_fiat, \
     max_subscribers, current_subscribers, is_active, created_at";

const SUBSCRIPTION_COLUMNS: &str = "id, subscriber_id, provider_id, tier_id, status, \
     settlement_ref, start_date, next_billing_date, cancelled_at, created_at";

/// Postgres-backed subscription store.
///
/// The per-tier admission lock is a `SELECT ... FOR UPDATE` on the tier row;
/// the lease owns the transaction, so dropping it without committing rolls
/// everything back.
pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgTierLease {
    tx: Transaction<'static, Postgres>,
    tier: SubscriptionTier,
}

#[async_trait]
impl TierLease for PgTierLease {
    fn tier(&self) -> &SubscriptionTier {
        &self.tier
    }

    async fn has_active_subscription(&mut self, subscriber_id: Uuid) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM subscriptions
                WHERE subscriber_id = $1 AND provider_id = $2 AND status = $3
            )
            "#,
        )
        .bind(subscriber_id)
        .bind(self.tier.provider_id)
        .bind(SubscriptionStatus::Active)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn commit_enrollment(
        self: Box<Self>,
        subscription: Subscription,
    ) -> AppResult<Subscription> {
        let Self { mut tx, tier } = *self;

        let result = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (
                id, subscriber_id, provider_id, tier_id, status,
                settlement_ref, start_date, next_billing_date, cancelled_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription.id)
        .bind(subscription.subscriber_id)
        .bind(subscription.provider_id)
        .bind(subscription.tier_id)
        .bind(subscription.status)
        .bind(&subscription.settlement_ref)
        .bind(subscription.start_date)
        .bind(subscription.next_billing_date)
        .bind(subscription.cancelled_at)
        .bind(subscription.created_at)
        .fetch_one(&mut *tx)
        .await;

        let inserted = match result {
            Ok(subscription) => subscription,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(PaymentError::DuplicateSettlement.into());
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query(
            "UPDATE subscription_tiers SET current_subscribers = current_subscribers + 1 WHERE id = $1",
        )
        .bind(tier.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO subscription_revenue (
                id, provider_id, subscription_id, amount_native, amount_fiat,
                settlement_ref, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tier.provider_id)
        .bind(inserted.id)
        .bind(tier.price_native)
        .bind(tier.price_fiat)
        .bind(&inserted.settlement_ref)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(inserted)
    }
}

impl PgSubscriptionRepository {
    /// Terminal status write plus capacity release in one transaction.
    async fn close_subscription(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> AppResult<Subscription> {
        let mut tx = self.pool.begin().await?;

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET status = $2, cancelled_at = COALESCE($3, cancelled_at)
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .bind(status)
        .bind(cancelled_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| SubscriptionError::SubscriptionNotFound(subscription_id.to_string()))?;

        sqlx::query(
            r#"
            UPDATE subscription_tiers
            SET current_subscribers = GREATEST(current_subscribers - 1, 0)
            WHERE id = $1
            "#,
        )
        .bind(subscription.tier_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(subscription)
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionRepository {
    async fn lock_tier(&self, tier_id: Uuid) -> AppResult<Option<Box<dyn TierLease>>> {
        let mut tx = self.pool.begin().await?;

        let tier = sqlx::query_as::<_, SubscriptionTier>(&format!(
            "SELECT {TIER_COLUMNS} FROM subscription_tiers WHERE id = $1 AND is_active FOR UPDATE"
        ))
        .bind(tier_id)
        .fetch_optional(&mut *tx)
        .await?;

        match tier {
            Some(tier) => Ok(Some(Box::new(PgTierLease { tx, tier }))),
            None => Ok(None),
        }
    }

    async fn insert_tier(&self, tier: SubscriptionTier) -> AppResult<SubscriptionTier> {
        let tier = sqlx::query_as::<_, SubscriptionTier>(&format!(
            r#"
            INSERT INTO subscription_tiers (
                id, provider_id, name, price_native, price_fiat,
                max_subscribers, current_subscribers, is_active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {TIER_COLUMNS}
            "#
        ))
        .bind(tier.id)
        .bind(tier.provider_id)
        .bind(&tier.name)
        .bind(tier.price_native)
        .bind(tier.price_fiat)
        .bind(tier.max_subscribers)
        .bind(tier.current_subscribers)
        .bind(tier.is_active)
        .bind(tier.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(tier)
    }

    async fn get_tier(&self, tier_id: Uuid) -> AppResult<Option<SubscriptionTier>> {
        let tier = sqlx::query_as::<_, SubscriptionTier>(&format!(
            "SELECT {TIER_COLUMNS} FROM subscription_tiers WHERE id = $1"
        ))
        .bind(tier_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tier)
    }

    async fn tiers_for_provider(&self, provider_id: Uuid) -> AppResult<Vec<SubscriptionTier>> {
        let tiers = sqlx::query_as::<_, SubscriptionTier>(&format!(
            r#"
            SELECT {TIER_COLUMNS}
            FROM subscription_tiers
            WHERE provider_id = $1 AND is_active
            ORDER BY price_native ASC
            "#
        ))
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tiers)
    }

    async fn delete_tier(&self, tier_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM subscription_tiers WHERE id = $1")
            .bind(tier_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get(&self, subscription_id: Uuid) -> AppResult<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn set_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> AppResult<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "UPDATE subscriptions SET status = $2 WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(subscription_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SubscriptionError::SubscriptionNotFound(subscription_id.to_string()))?;

        Ok(subscription)
    }

    async fn cancel(
        &self,
        subscription_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> AppResult<Subscription> {
        self.close_subscription(
            subscription_id,
            SubscriptionStatus::Cancelled,
            Some(cancelled_at),
        )
        .await
    }

    async fn expire(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        self.close_subscription(subscription_id, SubscriptionStatus::Expired, None)
            .await
    }

    async fn advance_billing(
        &self,
        subscription_id: Uuid,
        next_billing_date: DateTime<Utc>,
    ) -> AppResult<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET next_billing_date = $2
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .bind(next_billing_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SubscriptionError::SubscriptionNotFound(subscription_id.to_string()))?;

        Ok(subscription)
    }

    async fn due_for_billing(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE status = $1 AND next_billing_date <= $2
            ORDER BY next_billing_date ASC
            "#
        ))
        .bind(SubscriptionStatus::Active)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: Uuid,
        status: Option<SubscriptionStatus>,
    ) -> AppResult<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE subscriber_id = $1
              AND ($2::subscription_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(subscriber_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    async fn revenue_for_provider(
        &self,
        provider_id: Uuid,
    ) -> AppResult<Vec<SubscriptionRevenueEntry>> {
        let entries = sqlx::query_as::<_, SubscriptionRevenueEntry>(
            r#"
            SELECT id, provider_id, subscription_id, amount_native, amount_fiat,
                   settlement_ref, created_at
            FROM subscription_revenue
            WHERE provider_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
