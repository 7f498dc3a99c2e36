use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::collaborators::PaymentHooks;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::ledger::HorizonLedgerClient;
use crate::payments::{PaymentService, PgPaymentRepository};
use crate::principals::PgPrincipalDirectory;
use crate::reconciliation::ReconciliationService;
use crate::scheduler::{JobScheduler, JobSchedulerConfig};
use crate::subscriptions::{PgSubscriptionRepository, SubscriptionService};

/// Fully wired application services.
pub struct Services {
    pub payments: Arc<PaymentService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub scheduler: JobScheduler,
}

/// Wire concrete instances in dependency order: ledger client, payment
/// admission, reconciliation, subscription engine, scheduler.
pub async fn initialize_services(config: &Config) -> AppResult<Services> {
    info!("initializing application components");

    let pool = initialize_database(&config.database_url).await?;

    let payment_repository = Arc::new(PgPaymentRepository::new(pool.clone()));
    let subscription_repository = Arc::new(PgSubscriptionRepository::new(pool.clone()));
    let principals = Arc::new(PgPrincipalDirectory::new(pool.clone()));

    let ledger = Arc::new(
        HorizonLedgerClient::new(
            config.horizon_url.clone(),
            Duration::from_secs(config.ledger_timeout_secs),
        )
        .map_err(|e| AppError::Config(e.to_string()))?,
    );
    info!(horizon_url = %config.horizon_url, "ledger client initialized");

    let reconciliation = Arc::new(ReconciliationService::new(
        payment_repository.clone(),
        payment_repository.clone(),
    ));

    let payments = Arc::new(PaymentService::new(
        payment_repository,
        ledger.clone(),
        principals.clone(),
        PaymentHooks::logging(),
        reconciliation.clone(),
    ));

    // No charge capability is wired yet: due subscriptions expire until a
    // real provider is injected here.
    let subscriptions = Arc::new(SubscriptionService::new(
        subscription_repository,
        principals,
        ledger,
        None,
    ));

    let scheduler = JobScheduler::new(
        JobSchedulerConfig {
            execution_hour: config.jobs_execution_hour,
            reconciliation_enabled: config.reconciliation_enabled,
            billing_enabled: config.billing_enabled,
        },
        reconciliation.clone(),
        subscriptions.clone(),
    );

    info!("application components initialized");

    Ok(Services {
        payments,
        reconciliation,
        subscriptions,
        scheduler,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("database initialized");
    Ok(pool)
}
