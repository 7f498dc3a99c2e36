//! In-memory store implementations.
//!
//! They honour the same contracts as the Postgres repositories (settlement
//! reference uniqueness enforced atomically at insert, per-tier admission
//! locks, capacity release on cancel/expiry) and back the test-suite and
//! local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult, PaymentError, SubscriptionError};
use crate::payments::models::{Payment, PaymentStats, PaymentStatus, ResourceAggregate};
use crate::payments::store::{AggregateStore, PaymentStore};
use crate::principals::{Principal, PrincipalDirectory};
use crate::subscriptions::models::{
    Subscription, SubscriptionRevenueEntry, SubscriptionStatus, SubscriptionTier,
};
use crate::subscriptions::store::{SubscriptionStore, TierLease};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    payments: RwLock<HashMap<Uuid, Payment>>,
    aggregates: RwLock<HashMap<Uuid, ResourceAggregate>>,
    tiers: RwLock<HashMap<Uuid, SubscriptionTier>>,
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
    revenue: RwLock<Vec<SubscriptionRevenueEntry>>,
    /// One admission lock per tier; admissions against different tiers do
    /// not contend.
    tier_locks: parking_lot::Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn admission_lock(&self, tier_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.tier_locks.lock();
        locks
            .entry(tier_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert(&self, payment: Payment) -> AppResult<Payment> {
        let mut payments = self.inner.payments.write().await;
        // Insert-if-absent under the write lock stands in for the unique
        // index: concurrent admissions for the same settlement cannot both
        // pass this check.
        if payments
            .values()
            .any(|p| p.settlement_ref == payment.settlement_ref)
        {
            return Err(PaymentError::DuplicateSettlement.into());
        }
        payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Payment>> {
        Ok(self.inner.payments.read().await.get(&id).cloned())
    }

    async fn find_by_settlement_ref(&self, settlement_ref: &str) -> AppResult<Option<Payment>> {
        Ok(self
            .inner
            .payments
            .read()
            .await
            .values()
            .find(|p| p.settlement_ref == settlement_ref)
            .cloned())
    }

    async fn set_status(&self, id: Uuid, status: PaymentStatus) -> AppResult<Payment> {
        let mut payments = self.inner.payments.write().await;
        let payment = payments
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", id)))?;

        payment.status = status;
        if status == PaymentStatus::Verified && payment.verified_at.is_none() {
            payment.verified_at = Some(Utc::now());
        }

        Ok(payment.clone())
    }

    async fn verified_total(&self, resource_id: Uuid) -> AppResult<Decimal> {
        let payments = self.inner.payments.read().await;
        Ok(payments
            .values()
            .filter(|p| p.resource_id == Some(resource_id) && p.status == PaymentStatus::Verified)
            .map(|p| p.amount)
            .sum())
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>> {
        let payments = self.inner.payments.read().await;
        let mut matching: Vec<Payment> = payments
            .values()
            .filter(|p| p.recipient_id == recipient_id)
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, limit, offset))
    }

    async fn list_by_payer(
        &self,
        payer_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>> {
        let payments = self.inner.payments.read().await;
        let mut matching: Vec<Payment> = payments
            .values()
            .filter(|p| p.payer_id == Some(payer_id))
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, limit, offset))
    }

    async fn stats_for_recipient(&self, recipient_id: Uuid) -> AppResult<PaymentStats> {
        let payments = self.inner.payments.read().await;
        let amounts: Vec<Decimal> = payments
            .values()
            .filter(|p| p.recipient_id == recipient_id && p.status == PaymentStatus::Verified)
            .map(|p| p.amount)
            .collect();

        let payment_count = amounts.len() as i64;
        let total_amount: Decimal = amounts.iter().copied().sum();
        let average_amount = if payment_count > 0 {
            total_amount / Decimal::from(payment_count)
        } else {
            Decimal::ZERO
        };

        Ok(PaymentStats {
            payment_count,
            total_amount,
            average_amount,
        })
    }
}

fn paginate<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn resource_ids(&self) -> AppResult<Vec<Uuid>> {
        Ok(self.inner.aggregates.read().await.keys().copied().collect())
    }

    async fn get(&self, resource_id: Uuid) -> AppResult<Option<ResourceAggregate>> {
        Ok(self.inner.aggregates.read().await.get(&resource_id).cloned())
    }

    async fn put_total(
        &self,
        resource_id: Uuid,
        total: Decimal,
        recalculated_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(aggregate) = self.inner.aggregates.write().await.get_mut(&resource_id) {
            aggregate.cached_total = total;
            aggregate.last_recalculated_at = Some(recalculated_at);
        }
        Ok(())
    }

    async fn touch(&self, resource_id: Uuid, recalculated_at: DateTime<Utc>) -> AppResult<()> {
        if let Some(aggregate) = self.inner.aggregates.write().await.get_mut(&resource_id) {
            aggregate.last_recalculated_at = Some(recalculated_at);
        }
        Ok(())
    }

    async fn register_resource(&self, resource_id: Uuid) -> AppResult<()> {
        self.inner
            .aggregates
            .write()
            .await
            .entry(resource_id)
            .or_insert(ResourceAggregate {
                resource_id,
                cached_total: Decimal::ZERO,
                last_recalculated_at: None,
            });
        Ok(())
    }
}

struct MemoryTierLease {
    store: MemoryStore,
    tier: SubscriptionTier,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

#[async_trait]
impl TierLease for MemoryTierLease {
    fn tier(&self) -> &SubscriptionTier {
        &self.tier
    }

    async fn has_active_subscription(&mut self, subscriber_id: Uuid) -> AppResult<bool> {
        let subscriptions = self.store.inner.subscriptions.read().await;
        Ok(subscriptions.values().any(|s| {
            s.subscriber_id == subscriber_id
                && s.provider_id == self.tier.provider_id
                && s.status == SubscriptionStatus::Active
        }))
    }

    async fn commit_enrollment(
        self: Box<Self>,
        subscription: Subscription,
    ) -> AppResult<Subscription> {
        let Self { store, tier, _guard } = *self;

        {
            let mut subscriptions = store.inner.subscriptions.write().await;
            if subscriptions
                .values()
                .any(|s| s.settlement_ref == subscription.settlement_ref)
            {
                return Err(PaymentError::DuplicateSettlement.into());
            }
            subscriptions.insert(subscription.id, subscription.clone());
        }

        if let Some(stored) = store.inner.tiers.write().await.get_mut(&tier.id) {
            stored.current_subscribers += 1;
        }

        store
            .inner
            .revenue
            .write()
            .await
            .push(SubscriptionRevenueEntry {
                id: Uuid::new_v4(),
                provider_id: tier.provider_id,
                subscription_id: subscription.id,
                amount_native: tier.price_native,
                amount_fiat: tier.price_fiat,
                settlement_ref: subscription.settlement_ref.clone(),
                created_at: Utc::now(),
            });

        Ok(subscription)
    }
}

impl MemoryStore {
    async fn close_subscription(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> AppResult<Subscription> {
        let closed = {
            let mut subscriptions = self.inner.subscriptions.write().await;
            let subscription = subscriptions.get_mut(&subscription_id).ok_or_else(|| {
                SubscriptionError::SubscriptionNotFound(subscription_id.to_string())
            })?;
            subscription.status = status;
            if cancelled_at.is_some() {
                subscription.cancelled_at = cancelled_at;
            }
            subscription.clone()
        };

        if let Some(tier) = self.inner.tiers.write().await.get_mut(&closed.tier_id) {
            tier.current_subscribers = (tier.current_subscribers - 1).max(0);
        }

        Ok(closed)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn lock_tier(&self, tier_id: Uuid) -> AppResult<Option<Box<dyn TierLease>>> {
        let guard = self.admission_lock(tier_id).lock_owned().await;

        let tier = self
            .inner
            .tiers
            .read()
            .await
            .get(&tier_id)
            .filter(|t| t.is_active)
            .cloned();

        Ok(tier.map(|tier| {
            Box::new(MemoryTierLease {
                store: self.clone(),
                tier,
                _guard: guard,
            }) as Box<dyn TierLease>
        }))
    }

    async fn insert_tier(&self, tier: SubscriptionTier) -> AppResult<SubscriptionTier> {
        self.inner.tiers.write().await.insert(tier.id, tier.clone());
        Ok(tier)
    }

    async fn get_tier(&self, tier_id: Uuid) -> AppResult<Option<SubscriptionTier>> {
        Ok(self.inner.tiers.read().await.get(&tier_id).cloned())
    }

    async fn tiers_for_provider(&self, provider_id: Uuid) -> AppResult<Vec<SubscriptionTier>> {
        let tiers = self.inner.tiers.read().await;
        let mut matching: Vec<SubscriptionTier> = tiers
            .values()
            .filter(|t| t.provider_id == provider_id && t.is_active)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.price_native.cmp(&b.price_native));
        Ok(matching)
    }

    async fn delete_tier(&self, tier_id: Uuid) -> AppResult<()> {
        self.inner.tiers.write().await.remove(&tier_id);
        Ok(())
    }

    async fn get(&self, subscription_id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self
            .inner
            .subscriptions
            .read()
            .await
            .get(&subscription_id)
            .cloned())
    }

    async fn set_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> AppResult<Subscription> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| SubscriptionError::SubscriptionNotFound(subscription_id.to_string()))?;
        subscription.status = status;
        Ok(subscription.clone())
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
        let mut subscriptions = self.inner.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| SubscriptionError::SubscriptionNotFound(subscription_id.to_string()))?;
        subscription.next_billing_date = next_billing_date;
        Ok(subscription.clone())
    }

    async fn due_for_billing(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        let subscriptions = self.inner.subscriptions.read().await;
        let mut due: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active && s.next_billing_date <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_billing_date.cmp(&b.next_billing_date));
        Ok(due)
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: Uuid,
        status: Option<SubscriptionStatus>,
    ) -> AppResult<Vec<Subscription>> {
        let subscriptions = self.inner.subscriptions.read().await;
        let mut matching: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.subscriber_id == subscriber_id)
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn revenue_for_provider(
        &self,
        provider_id: Uuid,
    ) -> AppResult<Vec<SubscriptionRevenueEntry>> {
        Ok(self
            .inner
            .revenue
            .read()
            .await
            .iter()
            .filter(|e| e.provider_id == provider_id)
            .cloned()
            .collect())
    }
}

/// Fixed principal directory for tests and local development.
#[derive(Default)]
pub struct StaticPrincipalDirectory {
    principals: parking_lot::RwLock<HashMap<Uuid, Principal>>,
}

impl StaticPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, principal: Principal) {
        self.principals.write().insert(principal.id, principal);
    }

    pub fn remove(&self, principal_id: Uuid) {
        self.principals.write().remove(&principal_id);
    }
}

#[async_trait]
impl PrincipalDirectory for StaticPrincipalDirectory {
    async fn find(&self, principal_id: Uuid) -> AppResult<Option<Principal>> {
        Ok(self.principals.read().get(&principal_id).cloned())
    }
}
