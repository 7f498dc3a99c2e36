pub mod models;
pub mod repository;
pub mod service;
pub mod store;

pub use models::{
    NewTier, RevenueSummary, Subscription, SubscriptionRevenueEntry, SubscriptionStatus,
    SubscriptionTier,
};
pub use repository::PgSubscriptionRepository;
pub use service::{BillingRunSummary, ChargeProvider, SubscriptionService};
pub use store::{SubscriptionStore, TierLease};
