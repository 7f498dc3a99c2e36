use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::PaymentHooks;
use crate::error::{AppError, AppResult, LedgerError, PaymentError};
use crate::ledger::LedgerClient;
use crate::payments::models::{AdmitPayment, Payment, PaymentStats, PaymentStatus};
use crate::payments::store::PaymentStore;
use crate::principals::{Principal, PrincipalDirectory};
use crate::reconciliation::ReconciliationService;

/// Admits externally-settled payments as internal records.
///
/// Verification order matters: cheap local checks first, the ledger lookup
/// (the only blocking point) last, and the storage-layer uniqueness
/// constraint as the final word on idempotency.
pub struct PaymentService {
    payments: Arc<dyn PaymentStore>,
    ledger: Arc<dyn LedgerClient>,
    principals: Arc<dyn PrincipalDirectory>,
    hooks: PaymentHooks,
    reconciliation: Arc<ReconciliationService>,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        ledger: Arc<dyn LedgerClient>,
        principals: Arc<dyn PrincipalDirectory>,
        hooks: PaymentHooks,
        reconciliation: Arc<ReconciliationService>,
    ) -> Self {
        Self {
            payments,
            ledger,
            principals,
            hooks,
            reconciliation,
        }
    }

    pub async fn admit_payment(&self, request: AdmitPayment) -> AppResult<Payment> {
        if request.payer_id == request.recipient_id {
            return Err(PaymentError::SelfPaymentNotAllowed.into());
        }

        if self
            .payments
            .find_by_settlement_ref(&request.settlement_ref)
            .await?
            .is_some()
        {
            return Err(PaymentError::DuplicateSettlement.into());
        }

        let recipient = self
            .principals
            .find(request.recipient_id)
            .await?
            .ok_or(PaymentError::RecipientNotPayable)?;
        let recipient_wallet = recipient
            .wallet_address
            .clone()
            .ok_or(PaymentError::RecipientNotPayable)?;

        let settlement = self
            .ledger
            .get_settlement(&request.settlement_ref)
            .await
            .map_err(LedgerError::into_admission_error)?;

        if !settlement.successful {
            return Err(PaymentError::SettlementFailed.into());
        }

        let operation = settlement
            .transfer_to(&recipient_wallet)
            .ok_or(PaymentError::PaymentNotFound)?;

        // A payment already settled on-chain must not be lost because of a
        // local identity gap: an unresolvable payer is recorded as anonymous.
        let payer = match self.principals.find(request.payer_id).await {
            Ok(payer) => payer,
            Err(e) => {
                warn!(payer_id = %request.payer_id, error = %e, "payer lookup failed, recording as anonymous");
                None
            }
        };

        let payment = Payment::from_settlement_operation(
            &request,
            operation,
            payer.as_ref(),
            settlement.settled_at,
        );
        let payment = self.payments.insert(payment).await?;

        info!(
            payment_id = %payment.id,
            settlement_ref = %payment.settlement_ref,
            amount = %payment.amount,
            asset = %payment.asset_code,
            "payment admitted"
        );

        self.run_admission_hooks(&payment, payer.as_ref()).await;

        Ok(payment)
    }

    pub async fn update_status(
        &self,
        payment_id: Uuid,
        new_status: PaymentStatus,
    ) -> AppResult<Payment> {
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        if !payment.status.can_transition(new_status) {
            return Err(PaymentError::InvalidStatusTransition {
                from: payment.status,
                to: new_status,
            }
            .into());
        }

        let leaves_verified = payment.status.leaves_verified_set(new_status);
        let updated = self.payments.set_status(payment_id, new_status).await?;

        // A payment leaving the verified set must not leave a stale positive
        // aggregate behind; the correction runs off the request path.
        if leaves_verified {
            if let Some(resource_id) = updated.resource_id {
                let reconciliation = self.reconciliation.clone();
                tokio::spawn(async move {
                    if let Err(e) = reconciliation.reconcile_one(resource_id).await {
                        error!(%resource_id, error = %e, "post-status-change reconciliation failed");
                    }
                });
            }
        }

        Ok(updated)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.payments
            .get(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))
    }

    pub async fn payments_for_recipient(
        &self,
        recipient_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>> {
        self.payments
            .list_for_recipient(recipient_id, status, limit, offset)
            .await
    }

    pub async fn payments_by_payer(
        &self,
        payer_id: Uuid,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Payment>> {
        self.payments
            .list_by_payer(payer_id, status, limit, offset)
            .await
    }

    pub async fn stats_for_recipient(&self, recipient_id: Uuid) -> AppResult<PaymentStats> {
        self.payments.stats_for_recipient(recipient_id).await
    }

    async fn run_admission_hooks(&self, payment: &Payment, payer: Option<&Principal>) {
        if let Err(e) = self.hooks.fees.record_fee(payment).await {
            warn!(payment_id = %payment.id, error = %e, "fee recording failed");
        }

        if let Some(message) = payment.message.as_deref() {
            if let Err(e) = self.hooks.moderation.scan_message(payment.id, message).await {
                warn!(payment_id = %payment.id, error = %e, "moderation scan failed");
            }
        }

        if let Err(e) = self
            .hooks
            .notifications
            .payment_received(payment, payer)
            .await
        {
            warn!(payment_id = %payment.id, error = %e, "recipient notification failed");
        }

        if let Err(e) = self.hooks.activity.payment_verified(payment).await {
            warn!(payment_id = %payment.id, error = %e, "activity event emission failed");
        }
    }
}
