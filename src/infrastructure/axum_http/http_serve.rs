use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{Extension, Router, routing::get};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    application::usercases::billing_dispatcher::BillingDispatcher,
    config::config_model::DotEnvyConfig,
    domain::repositories::{
        audit_sink::AuditSink, billing_portal::BillingPortalGateway, billing_store::BillingStore,
    },
    infrastructure::axum_http::{auth::AuthKeys, default_routers, routers},
};

pub fn app<S, A, P>(config: &DotEnvyConfig, dispatcher: Arc<BillingDispatcher<S, A, P>>) -> Result<Router>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    let auth_keys = Arc::new(AuthKeys::new(&config.auth.jwt_secret));

    let router = Router::new()
        .fallback(default_routers::not_found)
        .nest("/api/v1/billing", routers::billing_events::routes(Arc::clone(&dispatcher)))
        .nest("/api/v1/subscriptions", routers::subscriptions::routes(Arc::clone(&dispatcher)))
        .nest("/api/v1/organizations", routers::organizations::routes(Arc::clone(&dispatcher)))
        .nest("/api/v1/plans", routers::plans::routes(Arc::clone(&dispatcher)))
        .route("/api/v1/health-check", get(default_routers::health_check))
        .layer(Extension(auth_keys))
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.timeout)))
        .layer(RequestBodyLimitLayer::new(
            (config.server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

pub async fn start<S, A, P>(config: Arc<DotEnvyConfig>, dispatcher: Arc<BillingDispatcher<S, A, P>>) -> Result<()>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    let app = app(&config, dispatcher)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = config.server.port, stage = %config.stage, "Server is running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "http_serve: failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
