#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use patronage_backend::collaborators::{
    ActivityPublisher, FeeRecorder, ModerationScanner, NotificationSink, PaymentHooks,
};
use patronage_backend::error::{AppError, AppResult, LedgerError};
use patronage_backend::ledger::{LedgerClient, OperationKind, Settlement, SettlementOperation};
use patronage_backend::memory::{MemoryStore, StaticPrincipalDirectory};
use patronage_backend::payments::{AdmitPayment, PaymentService};
use patronage_backend::payments::store::AggregateStore;
use patronage_backend::principals::Principal;
use patronage_backend::reconciliation::ReconciliationService;
use patronage_backend::subscriptions::{ChargeProvider, Subscription, SubscriptionService};

/// Programmable ledger stub: settlements are registered per reference and
/// the whole client can be flipped to "unavailable".
#[derive(Default)]
pub struct StubLedger {
    settlements: parking_lot::RwLock<HashMap<String, Settlement>>,
    unavailable: AtomicBool,
}

impl StubLedger {
    pub fn add(&self, settlement: Settlement) {
        self.settlements
            .write()
            .insert(settlement.settlement_ref.clone(), settlement);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerClient for StubLedger {
    async fn get_settlement(&self, settlement_ref: &str) -> Result<Settlement, LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        self.settlements
            .read()
            .get(settlement_ref)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(settlement_ref.to_string()))
    }
}

pub fn transfer_op(destination: &str, amount: Decimal) -> SettlementOperation {
    SettlementOperation {
        kind: OperationKind::Transfer,
        destination: destination.to_string(),
        amount,
        asset_code: "XLM".to_string(),
        asset_issuer: None,
    }
}

pub fn settled_transfer(settlement_ref: &str, destination: &str, amount: Decimal) -> Settlement {
    Settlement {
        settlement_ref: settlement_ref.to_string(),
        successful: true,
        settled_at: Utc::now(),
        operations: vec![transfer_op(destination, amount)],
    }
}

pub fn failed_settlement(settlement_ref: &str) -> Settlement {
    Settlement {
        settlement_ref: settlement_ref.to_string(),
        successful: false,
        settled_at: Utc::now(),
        operations: vec![],
    }
}

/// Everything an admission/reconciliation test needs, wired over the
/// in-memory store.
pub struct World {
    pub store: MemoryStore,
    pub directory: Arc<StaticPrincipalDirectory>,
    pub ledger: Arc<StubLedger>,
    pub payments: Arc<PaymentService>,
    pub reconciliation: Arc<ReconciliationService>,
}

pub fn world() -> World {
    world_with_hooks(PaymentHooks::logging())
}

pub fn world_with_hooks(hooks: PaymentHooks) -> World {
    let store = MemoryStore::new();
    let directory = Arc::new(StaticPrincipalDirectory::new());
    let ledger = Arc::new(StubLedger::default());

    let reconciliation = Arc::new(ReconciliationService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    ));

    let payments = Arc::new(PaymentService::new(
        Arc::new(store.clone()),
        ledger.clone(),
        directory.clone(),
        hooks,
        reconciliation.clone(),
    ));

    World {
        store,
        directory,
        ledger,
        payments,
        reconciliation,
    }
}

impl World {
    pub fn subscription_service(
        &self,
        charge: Option<Arc<dyn ChargeProvider>>,
    ) -> Arc<SubscriptionService> {
        Arc::new(SubscriptionService::new(
            Arc::new(self.store.clone()),
            self.directory.clone(),
            self.ledger.clone(),
            charge,
        ))
    }

    pub fn add_principal(&self, wallet: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.directory.insert(Principal {
            id,
            display_name: Some(format!("principal-{}", &id.to_string()[..8])),
            wallet_address: wallet.map(str::to_string),
        });
        id
    }

    pub async fn add_resource(&self) -> Uuid {
        let resource_id = Uuid::new_v4();
        self.store.register_resource(resource_id).await.unwrap();
        resource_id
    }

    /// The resource's aggregate row; panics if it was never registered.
    pub async fn store_aggregate(
        &self,
        resource_id: Uuid,
    ) -> patronage_backend::payments::ResourceAggregate {
        AggregateStore::get(&self.store, resource_id)
            .await
            .unwrap()
            .expect("aggregate registered")
    }
}

pub fn admit_request(
    payer: Uuid,
    recipient: Uuid,
    resource: Option<Uuid>,
    settlement_ref: &str,
) -> AdmitPayment {
    AdmitPayment {
        payer_id: payer,
        recipient_id: recipient,
        resource_id: resource,
        settlement_ref: settlement_ref.to_string(),
        message: Some("great track!".to_string()),
    }
}

// ─── Charge providers ───────────────────────────────────────────────────

pub struct AlwaysCharge {
    pub charged: AtomicUsize,
}

impl AlwaysCharge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            charged: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChargeProvider for AlwaysCharge {
    async fn charge(&self, _subscription: &Subscription) -> AppResult<()> {
        self.charged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct NeverCharge;

#[async_trait]
impl ChargeProvider for NeverCharge {
    async fn charge(&self, _subscription: &Subscription) -> AppResult<()> {
        Err(AppError::Internal("card declined".to_string()))
    }
}

/// Fails only for one specific subscription.
pub struct SelectiveCharge {
    pub fail_for: Uuid,
}

#[async_trait]
impl ChargeProvider for SelectiveCharge {
    async fn charge(&self, subscription: &Subscription) -> AppResult<()> {
        if subscription.id == self.fail_for {
            Err(AppError::Internal("card declined".to_string()))
        } else {
            Ok(())
        }
    }
}

// ─── Hooks ──────────────────────────────────────────────────────────────

/// Collaborator bundle that counts invocations and can be made to fail,
/// proving side-effect failures never roll back an admission.
pub struct CountingHooks {
    pub fees: AtomicUsize,
    pub moderation: AtomicUsize,
    pub notifications: AtomicUsize,
    pub activity: AtomicUsize,
    pub failing: AtomicBool,
}

impl CountingHooks {
    pub fn new(failing: bool) -> Arc<Self> {
        Arc::new(Self {
            fees: AtomicUsize::new(0),
            moderation: AtomicUsize::new(0),
            notifications: AtomicUsize::new(0),
            activity: AtomicUsize::new(0),
            failing: AtomicBool::new(failing),
        })
    }

    pub fn into_hooks(self: Arc<Self>) -> PaymentHooks {
        PaymentHooks {
            fees: self.clone(),
            moderation: self.clone(),
            notifications: self.clone(),
            activity: self,
        }
    }

    fn outcome(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::Internal("collaborator down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FeeRecorder for CountingHooks {
    async fn record_fee(&self, _payment: &patronage_backend::payments::Payment) -> AppResult<()> {
        self.fees.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}

#[async_trait]
impl ModerationScanner for CountingHooks {
    async fn scan_message(&self, _payment_id: Uuid, _message: &str) -> AppResult<()> {
        self.moderation.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}

#[async_trait]
impl NotificationSink for CountingHooks {
    async fn payment_received(
        &self,
        _payment: &patronage_backend::payments::Payment,
        _payer: Option<&Principal>,
    ) -> AppResult<()> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}

#[async_trait]
impl ActivityPublisher for CountingHooks {
    async fn payment_verified(
        &self,
        _payment: &patronage_backend::payments::Payment,
    ) -> AppResult<()> {
        self.activity.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}
