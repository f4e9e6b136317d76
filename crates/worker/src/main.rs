#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Billhook Background Worker
//!
//! Handles scheduled jobs:
//! - Claim ledger audit (every 5 minutes by default, `CLAIM_AUDIT_CRON`)
//! - Worker heartbeat (hourly)

mod claim_audit;

use std::sync::Arc;
use std::time::Duration;

use billhook_billing::{
    config::stuck_after_from_env, ClaimPolicy, IdempotencyLedger, PgBillingStore,
};
use billhook_shared::{create_pool, PoolSettings};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

const DEFAULT_AUDIT_CRON: &str = "0 */5 * * * *";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Billhook Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(
        &database_url,
        &PoolSettings {
            max_connections: 2,
            ..PoolSettings::default()
        },
    )
    .await?;

    let stuck_after = stuck_after_from_env()?;
    let audit_cron =
        std::env::var("CLAIM_AUDIT_CRON").unwrap_or_else(|_| DEFAULT_AUDIT_CRON.to_string());

    // The worker never claims events, so the policy is irrelevant here
    let ledger = IdempotencyLedger::new(Arc::new(PgBillingStore::new(pool)), ClaimPolicy::Never);

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Claim ledger audit
    let audit_ledger = ledger.clone();
    scheduler
        .add(Job::new_async(audit_cron.as_str(), move |_uuid, _l| {
            let ledger = audit_ledger.clone();
            Box::pin(async move {
                info!("Running claim ledger audit");
                if let Err(e) = claim_audit::run_sweep(&ledger, stuck_after).await {
                    error!(error = %e, "Claim ledger audit failed");
                }
            })
        })?)
        .await?;
    info!(cron = %audit_cron, "Scheduled: Claim ledger audit");

    // Job 2: Heartbeat (hourly)
    scheduler
        .add(Job::new_async("0 0 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Heartbeat (hourly)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Billhook Worker started successfully with {} scheduled jobs", 2);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
