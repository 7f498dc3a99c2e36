use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppResult;
use crate::payments::models::Payment;
use crate::principals::Principal;

/// Fire-and-forget collaborators invoked after a payment is admitted.
///
/// None of these participate in admission correctness: a failure is logged
/// by the caller and never rolls back the persisted payment.
#[async_trait]
pub trait FeeRecorder: Send + Sync {
    async fn record_fee(&self, payment: &Payment) -> AppResult<()>;
}

#[async_trait]
pub trait ModerationScanner: Send + Sync {
    async fn scan_message(&self, payment_id: Uuid, message: &str) -> AppResult<()>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn payment_received(&self, payment: &Payment, payer: Option<&Principal>)
        -> AppResult<()>;
}

#[async_trait]
pub trait ActivityPublisher: Send + Sync {
    async fn payment_verified(&self, payment: &Payment) -> AppResult<()>;
}

/// Bundle of admission side-effect collaborators.
#[derive(Clone)]
pub struct PaymentHooks {
    pub fees: Arc<dyn FeeRecorder>,
    pub moderation: Arc<dyn ModerationScanner>,
    pub notifications: Arc<dyn NotificationSink>,
    pub activity: Arc<dyn ActivityPublisher>,
}

impl PaymentHooks {
    /// Hooks that only emit trace output; used until the real collaborators
    /// are wired in and by the test-suite as a baseline.
    pub fn logging() -> Self {
        let hooks = Arc::new(LoggingCollaborators);
        Self {
            fees: hooks.clone(),
            moderation: hooks.clone(),
            notifications: hooks.clone(),
            activity: hooks,
        }
    }
}

struct LoggingCollaborators;

#[async_trait]
impl FeeRecorder for LoggingCollaborators {
    async fn record_fee(&self, payment: &Payment) -> AppResult<()> {
        debug!(payment_id = %payment.id, amount = %payment.amount, "fee recording skipped (logging collaborator)");
        Ok(())
    }
}

#[async_trait]
impl ModerationScanner for LoggingCollaborators {
    async fn scan_message(&self, payment_id: Uuid, _message: &str) -> AppResult<()> {
        debug!(%payment_id, "moderation scan skipped (logging collaborator)");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for LoggingCollaborators {
    async fn payment_received(
        &self,
        payment: &Payment,
        payer: Option<&Principal>,
    ) -> AppResult<()> {
        let from = payer
            .map(|p| p.display_name_or_anonymous().to_string())
            .unwrap_or_else(|| "a supporter".to_string());
        debug!(
            recipient = %payment.recipient_id,
            amount = %payment.amount,
            asset = %payment.asset_code,
            %from,
            "notification skipped (logging collaborator)"
        );
        Ok(())
    }
}

#[async_trait]
impl ActivityPublisher for LoggingCollaborators {
    async fn payment_verified(&self, payment: &Payment) -> AppResult<()> {
        debug!(payment_id = %payment.id, "activity event skipped (logging collaborator)");
        Ok(())
    }
}
