use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::subscriptions::models::{
    Subscription, SubscriptionRevenueEntry, SubscriptionStatus, SubscriptionTier,
};

/// Exclusive hold on one tier's capacity counter for the duration of an
/// admission. Obtained from [`SubscriptionStore::lock_tier`]; dropping the
/// lease without committing abandons the enrollment with no effect.
///
/// The lock is scoped per tier, so admissions against different tiers
/// proceed concurrently.
#[async_trait]
pub trait TierLease: Send {
    /// Snapshot of the tier as loaded under the lock.
    fn tier(&self) -> &SubscriptionTier;

    /// Whether the subscriber already holds an active subscription to this
    /// tier's provider.
    async fn has_active_subscription(&mut self, subscriber_id: Uuid) -> AppResult<bool>;

    /// Atomically insert the subscription, increment the tier's subscriber
    /// counter and append the revenue entry. Reuse of the settlement
    /// reference fails with `DuplicateSettlement` and persists nothing.
    async fn commit_enrollment(self: Box<Self>, subscription: Subscription)
        -> AppResult<Subscription>;
}

/// Persistence boundary for tiers, subscriptions and the revenue ledger.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Load an active tier under a mutual-exclusion lock scoped to that
    /// tier. `None` when the tier does not exist or is inactive.
    async fn lock_tier(&self, tier_id: Uuid) -> AppResult<Option<Box<dyn TierLease>>>;

    async fn insert_tier(&self, tier: SubscriptionTier) -> AppResult<SubscriptionTier>;

    async fn get_tier(&self, tier_id: Uuid) -> AppResult<Option<SubscriptionTier>>;

    /// Active tiers for a provider, cheapest first.
    async fn tiers_for_provider(&self, provider_id: Uuid) -> AppResult<Vec<SubscriptionTier>>;

    async fn delete_tier(&self, tier_id: Uuid) -> AppResult<()>;

    async fn get(&self, subscription_id: Uuid) -> AppResult<Option<Subscription>>;

    /// Plain status write for pause/resume; transition validity is the
    /// service's concern.
    async fn set_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> AppResult<Subscription>;

    /// Mark cancelled and release the tier's capacity in one atomic step.
    async fn cancel(
        &self,
        subscription_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> AppResult<Subscription>;

    /// Mark expired and release the tier's capacity in one atomic step.
    async fn expire(&self, subscription_id: Uuid) -> AppResult<Subscription>;

    async fn advance_billing(
        &self,
        subscription_id: Uuid,
        next_billing_date: DateTime<Utc>,
    ) -> AppResult<Subscription>;

    /// Every active subscription whose billing date is due.
    async fn due_for_billing(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>>;

    async fn list_for_subscriber(
        &self,
        subscriber_id: Uuid,
        status: Option<SubscriptionStatus>,
    ) -> AppResult<Vec<Subscription>>;

    async fn revenue_for_provider(
        &self,
        provider_id: Uuid,
    ) -> AppResult<Vec<SubscriptionRevenueEntry>>;
}
