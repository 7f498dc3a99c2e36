// Job scheduler - drives the nightly reconciliation sweep and the billing
// pass. Both jobs are idempotent per item, so a run that overlaps a manual
// invocation is safe.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info};

use crate::reconciliation::ReconciliationService;
use crate::subscriptions::SubscriptionService;

#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// UTC hour to execute the daily jobs (0-23)
    pub execution_hour: u32,
    pub reconciliation_enabled: bool,
    pub billing_enabled: bool,
}

/// Periodic caller for the idempotent maintenance operations; the jobs
/// themselves are the same ones exposed synchronously.
pub struct JobScheduler {
    config: JobSchedulerConfig,
    reconciliation: Arc<ReconciliationService>,
    subscriptions: Arc<SubscriptionService>,
}

impl JobScheduler {
    pub fn new(
        config: JobSchedulerConfig,
        reconciliation: Arc<ReconciliationService>,
        subscriptions: Arc<SubscriptionService>,
    ) -> Self {
        Self {
            config,
            reconciliation,
            subscriptions,
        }
    }

    /// Start the scheduler (runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let config = self.config.clone();
        let reconciliation = self.reconciliation.clone();
        let subscriptions = self.subscriptions.clone();

        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next_execution = calculate_next_daily_execution(now, config.execution_hour);
                let duration_until_execution = next_execution.signed_duration_since(now);

                if duration_until_execution.num_seconds() > 0 {
                    info!(
                        "next maintenance run scheduled for {} UTC",
                        next_execution.format("%Y-%m-%d %H:%M:%S")
                    );
                    tokio::time::sleep(Duration::from_secs(
                        duration_until_execution.num_seconds() as u64,
                    ))
                    .await;
                }

                info!("starting daily maintenance cycle");

                if config.reconciliation_enabled {
                    if let Err(e) = reconciliation.reconcile_all().await {
                        error!(error = %e, "reconciliation sweep failed");
                    }
                }

                if config.billing_enabled {
                    if let Err(e) = subscriptions.process_billing().await {
                        error!(error = %e, "billing pass failed");
                    }
                }

                info!("daily maintenance cycle completed");
            }
        })
    }
}

/// Next occurrence of the configured UTC hour, today or tomorrow.
fn calculate_next_daily_execution(now: DateTime<Utc>, execution_hour: u32) -> DateTime<Utc> {
    let today = now.date_naive().and_hms_opt(execution_hour, 0, 0).unwrap();
    let today_dt = Utc.from_utc_datetime(&today);

    if today_dt <= now {
        let tomorrow = (now.date_naive() + chrono::Duration::days(1))
            .and_hms_opt(execution_hour, 0, 0)
            .unwrap();
        Utc.from_utc_datetime(&tomorrow)
    } else {
        today_dt
    }
}
