use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::Type;
use uuid::Uuid;

/// Subscription lifecycle.
///
/// `active <-> paused`; `active|paused -> cancelled` (user-initiated) and
/// `active -> expired` (billing-initiated) are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn can_pause(self) -> bool {
        self == SubscriptionStatus::Active
    }

    pub fn can_resume(self) -> bool {
        self == SubscriptionStatus::Paused
    }

    pub fn can_cancel(self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Paused
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
        )
    }
}

/// A capacity-limited recurring plan owned by a provider principal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionTier {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub price_native: Decimal,
    /// Tier-fixed fiat-equivalent price used for revenue entries.
    pub price_fiat: Decimal,
    /// `None` means unlimited.
    pub max_subscribers: Option<i32>,
    pub current_subscribers: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionTier {
    pub fn at_capacity(&self) -> bool {
        self.max_subscribers
            .is_some_and(|max| self.current_subscribers >= max)
    }
}

/// Input to tier creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTier {
    pub name: String,
    pub price_native: Decimal,
    pub price_fiat: Decimal,
    pub max_subscribers: Option<i32>,
}

/// Binds a subscriber principal to a tier.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub provider_id: Uuid,
    pub tier_id: Uuid,
    pub status: SubscriptionStatus,
    /// One settlement funds exactly one subscription (unique in storage).
    pub settlement_ref: String,
    pub start_date: DateTime<Utc>,
    pub next_billing_date: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(subscriber_id: Uuid, tier: &SubscriptionTier, settlement_ref: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subscriber_id,
            provider_id: tier.provider_id,
            tier_id: tier.id,
            status: SubscriptionStatus::Active,
            settlement_ref,
            start_date: now,
            next_billing_date: next_billing_date(now),
            cancelled_at: None,
            created_at: now,
        }
    }
}

/// One billing period from the given instant. Month arithmetic clamps the
/// day-of-month (Jan 31 -> Feb 28).
pub fn next_billing_date(from: DateTime<Utc>) -> DateTime<Utc> {
    from.checked_add_months(Months::new(1))
        .unwrap_or(from + Duration::days(31))
}

/// Append-only revenue ledger row written at admission time; never mutated,
/// independent of the subscription's later status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRevenueEntry {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub subscription_id: Uuid,
    pub amount_native: Decimal,
    pub amount_fiat: Decimal,
    pub settlement_ref: String,
    pub created_at: DateTime<Utc>,
}

/// Totals over a provider's revenue entries.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueSummary {
    pub entry_count: usize,
    pub total_native: Decimal,
    pub total_fiat: Decimal,
}
