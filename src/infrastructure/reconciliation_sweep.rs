use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tracing::{error, info};

use crate::{
    application::usercases::billing_dispatcher::BillingDispatcher,
    domain::{
        errors::BillingResult,
        repositories::{
            audit_sink::AuditSink, billing_portal::BillingPortalGateway, billing_store::BillingStore,
        },
    },
};

const SWEEP_BATCH: i64 = 100;

/// Settles period-end cancellations, expiries and scheduled changes that
/// came due without any request touching their subscription.
pub async fn run<S, A, P>(dispatcher: Arc<BillingDispatcher<S, A, P>>, interval: Duration) -> Result<()>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    info!(interval_secs = interval.as_secs(), "reconciliation_sweep: started");
    loop {
        if let Err(e) = sweep_once(&dispatcher).await {
            error!(error = %e, retryable = e.is_retryable(), "reconciliation_sweep: pass failed");
        }

        tokio::time::sleep(interval).await;
    }
}

async fn sweep_once<S, A, P>(dispatcher: &BillingDispatcher<S, A, P>) -> BillingResult<()>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    let settled = dispatcher.settle_due(SWEEP_BATCH).await?;
    if settled > 0 {
        info!(settled, "reconciliation_sweep: subscriptions settled");
    }
    Ok(())
}
