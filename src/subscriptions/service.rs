use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, LedgerError, PaymentError, SubscriptionError};
use crate::ledger::LedgerClient;
use crate::principals::PrincipalDirectory;
use crate::subscriptions::models::{
    next_billing_date, NewTier, RevenueSummary, Subscription, SubscriptionRevenueEntry,
    SubscriptionStatus, SubscriptionTier,
};
use crate::subscriptions::store::SubscriptionStore;

/// Capability to charge a due subscription. Real settlement mechanics live
/// outside this core; the billing job only needs success or failure.
#[async_trait]
pub trait ChargeProvider: Send + Sync {
    async fn charge(&self, subscription: &Subscription) -> AppResult<()>;
}

/// Outcome of one billing pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BillingRunSummary {
    pub due: usize,
    pub renewed: usize,
    pub expired: usize,
}

/// Enrolls principals into capacity-limited tiers and advances their
/// billing cycle.
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    principals: Arc<dyn PrincipalDirectory>,
    ledger: Arc<dyn LedgerClient>,
    charge: Option<Arc<dyn ChargeProvider>>,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        principals: Arc<dyn PrincipalDirectory>,
        ledger: Arc<dyn LedgerClient>,
        charge: Option<Arc<dyn ChargeProvider>>,
    ) -> Self {
        Self {
            store,
            principals,
            ledger,
            charge,
        }
    }

    /// Enroll a subscriber into a tier. Runs as one atomic unit of work:
    /// the tier lock is held from load to commit, so the read-check-increment
    /// sequence on the capacity counter is serialized per tier.
    pub async fn subscribe(
        &self,
        subscriber_id: Uuid,
        tier_id: Uuid,
        settlement_ref: String,
    ) -> AppResult<Subscription> {
        let mut lease = self
            .store
            .lock_tier(tier_id)
            .await?
            .ok_or(SubscriptionError::TierNotFound)?;
        let tier = lease.tier().clone();

        if lease.has_active_subscription(subscriber_id).await? {
            return Err(SubscriptionError::AlreadySubscribed.into());
        }

        if tier.at_capacity() {
            return Err(SubscriptionError::CapacityReached.into());
        }

        let provider_wallet = self
            .principals
            .find(tier.provider_id)
            .await?
            .and_then(|p| p.wallet_address)
            .ok_or(PaymentError::RecipientNotPayable)?;

        let settlement = self
            .ledger
            .get_settlement(&settlement_ref)
            .await
            .map_err(LedgerError::into_admission_error)?;

        if !settlement.successful {
            return Err(PaymentError::SettlementFailed.into());
        }

        // The matching transfer must cover the tier price; an overpaying
        // settlement still funds the enrollment.
        settlement
            .transfer_to(&provider_wallet)
            .filter(|op| op.amount >= tier.price_native)
            .ok_or(PaymentError::PaymentNotFound)?;

        let subscription = Subscription::new(subscriber_id, &tier, settlement_ref);
        let subscription = lease.commit_enrollment(subscription).await?;

        info!(
            subscription_id = %subscription.id,
            tier_id = %tier.id,
            subscriber = %subscriber_id,
            "subscription enrolled"
        );

        Ok(subscription)
    }

    pub async fn cancel(&self, subscription_id: Uuid, principal: Uuid) -> AppResult<Subscription> {
        let subscription = self.owned_subscription(subscription_id, principal).await?;

        if !subscription.status.can_cancel() {
            return Err(invalid_transition(subscription.status, SubscriptionStatus::Cancelled));
        }

        self.store.cancel(subscription_id, Utc::now()).await
    }

    pub async fn pause(&self, subscription_id: Uuid, principal: Uuid) -> AppResult<Subscription> {
        let subscription = self.owned_subscription(subscription_id, principal).await?;

        if !subscription.status.can_pause() {
            return Err(invalid_transition(subscription.status, SubscriptionStatus::Paused));
        }

        self.store
            .set_status(subscription_id, SubscriptionStatus::Paused)
            .await
    }

    pub async fn resume(&self, subscription_id: Uuid, principal: Uuid) -> AppResult<Subscription> {
        let subscription = self.owned_subscription(subscription_id, principal).await?;

        if !subscription.status.can_resume() {
            return Err(invalid_transition(subscription.status, SubscriptionStatus::Active));
        }

        self.store
            .set_status(subscription_id, SubscriptionStatus::Active)
            .await
    }

    /// Billing pass over every due subscription. Each item is processed
    /// independently; one failure never aborts the rest of the batch.
    pub async fn process_billing(&self) -> AppResult<BillingRunSummary> {
        let due = self.store.due_for_billing(Utc::now()).await?;
        let mut summary = BillingRunSummary {
            due: due.len(),
            ..Default::default()
        };

        for subscription in due {
            match self.charge_subscription(&subscription).await {
                Ok(()) => {
                    let next = next_billing_date(Utc::now());
                    match self.store.advance_billing(subscription.id, next).await {
                        Ok(_) => summary.renewed += 1,
                        Err(e) => {
                            error!(subscription_id = %subscription.id, error = %e, "failed to advance billing date")
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "charge failed, expiring subscription"
                    );
                    match self.store.expire(subscription.id).await {
                        Ok(_) => summary.expired += 1,
                        Err(e) => {
                            error!(subscription_id = %subscription.id, error = %e, "failed to expire subscription")
                        }
                    }
                }
            }
        }

        info!(
            due = summary.due,
            renewed = summary.renewed,
            expired = summary.expired,
            "billing pass completed"
        );

        Ok(summary)
    }

    // ─── Tier management ────────────────────────────────────────────────

    pub async fn create_tier(&self, provider_id: Uuid, new_tier: NewTier) -> AppResult<SubscriptionTier> {
        let tier = SubscriptionTier {
            id: Uuid::new_v4(),
            provider_id,
            name: new_tier.name,
            price_native: new_tier.price_native,
            price_fiat: new_tier.price_fiat,
            max_subscribers: new_tier.max_subscribers,
            current_subscribers: 0,
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.insert_tier(tier).await
    }

    pub async fn tiers_for_provider(&self, provider_id: Uuid) -> AppResult<Vec<SubscriptionTier>> {
        self.store.tiers_for_provider(provider_id).await
    }

    pub async fn delete_tier(&self, tier_id: Uuid, principal: Uuid) -> AppResult<()> {
        let tier = self
            .store
            .get_tier(tier_id)
            .await?
            .ok_or(SubscriptionError::TierNotFound)?;

        if tier.provider_id != principal {
            return Err(SubscriptionError::NotOwner.into());
        }
        if tier.current_subscribers > 0 {
            return Err(SubscriptionError::TierHasSubscribers.into());
        }

        self.store.delete_tier(tier_id).await
    }

    // ─── Queries ────────────────────────────────────────────────────────

    pub async fn subscriptions_for(
        &self,
        subscriber_id: Uuid,
        status: Option<SubscriptionStatus>,
    ) -> AppResult<Vec<Subscription>> {
        self.store.list_for_subscriber(subscriber_id, status).await
    }

    pub async fn revenue_for_provider(
        &self,
        provider_id: Uuid,
    ) -> AppResult<Vec<SubscriptionRevenueEntry>> {
        self.store.revenue_for_provider(provider_id).await
    }

    pub async fn revenue_summary(&self, provider_id: Uuid) -> AppResult<RevenueSummary> {
        let entries = self.store.revenue_for_provider(provider_id).await?;
        Ok(RevenueSummary {
            entry_count: entries.len(),
            total_native: entries.iter().map(|e| e.amount_native).sum::<Decimal>(),
            total_fiat: entries.iter().map(|e| e.amount_fiat).sum::<Decimal>(),
        })
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    async fn owned_subscription(
        &self,
        subscription_id: Uuid,
        principal: Uuid,
    ) -> AppResult<Subscription> {
        let subscription = self.store.get(subscription_id).await?.ok_or_else(|| {
            SubscriptionError::SubscriptionNotFound(subscription_id.to_string())
        })?;

        if subscription.subscriber_id != principal {
            return Err(SubscriptionError::NotOwner.into());
        }

        Ok(subscription)
    }

    async fn charge_subscription(&self, subscription: &Subscription) -> AppResult<()> {
        match &self.charge {
            Some(charge) => charge.charge(subscription).await,
            None => Err(AppError::Internal(
                "no charge capability configured".to_string(),
            )),
        }
    }
}

fn invalid_transition(from: SubscriptionStatus, to: SubscriptionStatus) -> AppError {
    SubscriptionError::InvalidStateTransition { from, to }.into()
}
