pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod observability;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    application::usercases::{
        billing_dispatcher::{BillingDispatcher, BillingSettings},
        clock::{Clock, SystemClock},
        plan_catalog::PlanCatalog,
    },
    config::config_model::{DotEnvyConfig, StoreBackend},
    domain::repositories::{audit_sink::AuditSink, billing_store::BillingStore},
    infrastructure::{
        axum_http::http_serve,
        billing_portal::portal_client::PortalClient,
        memory::{audit_sink::InMemoryAuditSink, billing_store::InMemoryBillingStore},
        postgres::{
            postgres_connection,
            repositories::{
                audit_logs::AuditLogPostgres, billing_store::BillingStorePostgres, plans::PlanPostgres,
            },
        },
        reconciliation_sweep,
    },
};

pub async fn run() -> Result<()> {
    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!(stage = %dotenvy_env.stage, backend = ?dotenvy_env.database.backend, "ENV has been loaded");

    match dotenvy_env.database.backend {
        StoreBackend::Memory => {
            warn!("STORE_BACKEND=memory: billing state is lost on restart");
            serve(
                dotenvy_env,
                Arc::new(InMemoryBillingStore::new()),
                Arc::new(InMemoryAuditSink::new()),
                PlanCatalog::builtin(),
            )
            .await
        }
        StoreBackend::Postgres => {
            let database_url = dotenvy_env
                .database
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is invalid"))?;
            let postgres_pool = postgres_connection::establish_connection(
                database_url,
                dotenvy_env.database.max_connections,
                dotenvy_env.billing.lock_timeout,
            )?;
            info!("Postgres connection has been established");

            let db_pool = Arc::new(postgres_pool);
            let catalog = PlanCatalog::load(&PlanPostgres::new(Arc::clone(&db_pool))).await?;
            serve(
                Arc::clone(&dotenvy_env),
                Arc::new(BillingStorePostgres::new(
                    Arc::clone(&db_pool),
                    dotenvy_env.billing.lock_timeout,
                )),
                Arc::new(AuditLogPostgres::new(Arc::clone(&db_pool))),
                catalog,
            )
            .await
        }
    }
}

async fn serve<S, A>(config: Arc<DotEnvyConfig>, store: Arc<S>, audit_sink: Arc<A>, catalog: PlanCatalog) -> Result<()>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
{
    let portal = Arc::new(PortalClient::new(
        config.billing_portal.api_base.clone(),
        config.billing_portal.api_key.clone(),
    ));
    if config.billing_portal.api_base.is_none() {
        warn!("BILLING_PORTAL_API_BASE is not set: billing portal requests will fail");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let settings = BillingSettings {
        lock_timeout: config.billing.lock_timeout,
        reactivation_grace: chrono::Duration::days(config.billing.reactivation_grace_days),
        audit_timeout: config.billing.audit_timeout,
    };
    let dispatcher = Arc::new(BillingDispatcher::new(
        store,
        audit_sink,
        portal,
        Arc::new(catalog),
        clock,
        settings,
    ));

    let server = tokio::spawn(http_serve::start(Arc::clone(&config), Arc::clone(&dispatcher)));

    match config.billing.sweep_interval {
        Some(interval) => {
            let sweep = tokio::spawn(reconciliation_sweep::run(Arc::clone(&dispatcher), interval));
            tokio::select! {
                result = server => result??,
                result = sweep => result??,
            };
        }
        None => {
            info!("BILLING_SWEEP_INTERVAL_SECS is unset: due work settles on access only");
            server.await??;
        }
    }

    Ok(())
}
