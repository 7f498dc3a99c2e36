use thiserror::Error;

use crate::payments::models::PaymentStatus;
use crate::subscriptions::models::SubscriptionStatus;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Payment admission errors
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payer and recipient are the same principal")]
    SelfPaymentNotAllowed,

    #[error("A payment for this settlement reference already exists")]
    DuplicateSettlement,

    #[error("Recipient has no payout wallet configured")]
    RecipientNotPayable,

    #[error("Settlement could not be verified: {0}")]
    VerificationUnavailable(String),

    #[error("Settlement failed on the ledger")]
    SettlementFailed,

    #[error("Settlement does not contain a transfer to the recipient")]
    PaymentNotFound,

    #[error("Invalid payment status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

/// Subscription admission and lifecycle errors
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Tier not found or inactive")]
    TierNotFound,

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("An active subscription to this provider already exists")]
    AlreadySubscribed,

    #[error("Tier subscriber limit reached")]
    CapacityReached,

    #[error("Acting principal does not own this subscription")]
    NotOwner,

    #[error("Invalid subscription status transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    #[error("Tier still has subscribers")]
    TierHasSubscribers,
}

/// Ledger client errors - the network boundary
///
/// `Unavailable` means the call could not be completed and the caller may
/// retry; `NotFound` means the ledger answered and knows no such settlement.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Settlement not found on ledger: {0}")]
    NotFound(String),

    #[error("Malformed ledger response: {0}")]
    Malformed(String),
}

/// Error taxonomy surfaced to callers so they can decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input, surfaced immediately; no retry implied
    Validation,
    /// The request conflicts with existing state; do not retry with the same input
    Conflict,
    /// Upstream unavailable; safe to retry thanks to idempotency guarantees
    Retryable,
    /// Permanent for this settlement reference; retrying cannot succeed
    Permanent,
    Internal,
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Payment(PaymentError::SelfPaymentNotAllowed)
            | AppError::Payment(PaymentError::RecipientNotPayable)
            | AppError::Payment(PaymentError::InvalidStatusTransition { .. })
            | AppError::Subscription(SubscriptionError::NotOwner)
            | AppError::Subscription(SubscriptionError::InvalidStateTransition { .. })
            | AppError::Subscription(SubscriptionError::TierNotFound)
            | AppError::Subscription(SubscriptionError::SubscriptionNotFound(_))
            | AppError::NotFound(_) => ErrorCategory::Validation,
            AppError::Payment(PaymentError::DuplicateSettlement)
            | AppError::Subscription(SubscriptionError::AlreadySubscribed)
            | AppError::Subscription(SubscriptionError::CapacityReached)
            | AppError::Subscription(SubscriptionError::TierHasSubscribers) => {
                ErrorCategory::Conflict
            }
            AppError::Payment(PaymentError::VerificationUnavailable(_))
            | AppError::Ledger(LedgerError::Unavailable(_)) => ErrorCategory::Retryable,
            AppError::Payment(PaymentError::SettlementFailed)
            | AppError::Payment(PaymentError::PaymentNotFound)
            | AppError::Ledger(LedgerError::NotFound(_)) => ErrorCategory::Permanent,
            AppError::Database(_)
            | AppError::Ledger(LedgerError::Malformed(_))
            | AppError::Config(_)
            | AppError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code for logs and API layers
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Payment(PaymentError::SelfPaymentNotAllowed) => "SELF_PAYMENT_NOT_ALLOWED",
            AppError::Payment(PaymentError::DuplicateSettlement) => "DUPLICATE_SETTLEMENT",
            AppError::Payment(PaymentError::RecipientNotPayable) => "RECIPIENT_NOT_PAYABLE",
            AppError::Payment(PaymentError::VerificationUnavailable(_)) => {
                "VERIFICATION_UNAVAILABLE"
            }
            AppError::Payment(PaymentError::SettlementFailed) => "SETTLEMENT_FAILED",
            AppError::Payment(PaymentError::PaymentNotFound) => "PAYMENT_NOT_FOUND",
            AppError::Payment(PaymentError::InvalidStatusTransition { .. }) => {
                "INVALID_STATUS_TRANSITION"
            }
            AppError::Subscription(SubscriptionError::TierNotFound) => "TIER_NOT_FOUND",
            AppError::Subscription(SubscriptionError::SubscriptionNotFound(_)) => {
                "SUBSCRIPTION_NOT_FOUND"
            }
            AppError::Subscription(SubscriptionError::AlreadySubscribed) => "ALREADY_SUBSCRIBED",
            AppError::Subscription(SubscriptionError::CapacityReached) => "CAPACITY_REACHED",
            AppError::Subscription(SubscriptionError::NotOwner) => "NOT_OWNER",
            AppError::Subscription(SubscriptionError::InvalidStateTransition { .. }) => {
                "INVALID_STATE_TRANSITION"
            }
            AppError::Subscription(SubscriptionError::TierHasSubscribers) => {
                "TIER_HAS_SUBSCRIBERS"
            }
            AppError::Ledger(LedgerError::Unavailable(_)) => "LEDGER_UNAVAILABLE",
            AppError::Ledger(LedgerError::NotFound(_)) => "SETTLEMENT_UNKNOWN",
            AppError::Ledger(LedgerError::Malformed(_)) => "LEDGER_MALFORMED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl LedgerError {
    /// Fold a ledger failure into the admission taxonomy: transport
    /// problems are retryable, an unknown reference is permanent for that
    /// reference.
    pub fn into_admission_error(self) -> PaymentError {
        match self {
            LedgerError::Unavailable(m) | LedgerError::Malformed(m) => {
                PaymentError::VerificationUnavailable(m)
            }
            LedgerError::NotFound(_) => PaymentError::PaymentNotFound,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::Internal(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_for_unavailable_verification() {
        let err: AppError = PaymentError::VerificationUnavailable("timeout".into()).into();
        assert_eq!(err.category(), ErrorCategory::Retryable);

        let err: AppError = PaymentError::SettlementFailed.into();
        assert_eq!(err.category(), ErrorCategory::Permanent);

        let err: AppError = PaymentError::PaymentNotFound.into();
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn conflicts_are_not_retryable() {
        for err in [
            AppError::from(PaymentError::DuplicateSettlement),
            AppError::from(SubscriptionError::AlreadySubscribed),
            AppError::from(SubscriptionError::CapacityReached),
        ] {
            assert_eq!(err.category(), ErrorCategory::Conflict);
        }
    }

    #[test]
    fn error_codes_are_stable() {
        let err: AppError = PaymentError::DuplicateSettlement.into();
        assert_eq!(err.error_code(), "DUPLICATE_SETTLEMENT");

        let err: AppError = SubscriptionError::NotOwner.into();
        assert_eq!(err.error_code(), "NOT_OWNER");
    }
}
